//! Bytecode representation and decoding
//!
//! ### Structure
//!
//! Despite being pushed off into [just another method attribute](crate::jvm::class_file::Code),
//! the bytecode is arguably the most important part of the class file - it contains the actual
//! executable instructions. For the purpose of verification, a method body is a flat list of
//! [`Instruction`]s (jumps refer to other instructions by [`InstructionIndex`]), an exception
//! table, and the declared maximum sizes of the operand stack and local variables. That is what
//! [`MethodBody`] holds.
//!
//! ### Decoding
//!
//! [`decode_method_body`] reads the [list of bytecode instructions][0] out of a `Code`
//! attribute, resolving constant pool operands along the way.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se18/html/jvms-6.html#jvms-6.5

mod body;
mod decoder;
mod instruction;
mod stack_effect;

pub use body::*;
pub use decoder::*;
pub use instruction::*;
