//! Data-flow verification of JVM method bodies
//!
//! The heart of this crate is [`jvm::verifier`], a structural verifier in the style of the classic
//! "pass 3b" type inference verifier: starting from the method's declared signature, it
//! symbolically executes every instruction over an abstract frame of local variables and operand
//! stack types until a fixpoint is reached. Historical `jsr`/`ret` subroutines are supported under
//! a deliberately restrictive definition of what a subroutine may look like.
//!
//! Around the verifier sit the pieces needed to run it on real class files:
//!
//!   - [`jvm::class_file`] reads the binary class file format
//!   - [`jvm::code`] decodes bytecode into instructions with resolved operands
//!   - [`jvm::class_graph`] answers subtyping questions, loading classes from a class path
//!

pub mod jvm;
pub mod util;
