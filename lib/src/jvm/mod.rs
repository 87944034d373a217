//! Read and verify JVM classes
//!
//! The pieces fit together in a pipeline:
//!
//!   - [`class_file::ClassFile`] is the raw binary class file, with an unresolved constant pool
//!   - [`code::decode_method_body`] turns a `Code` attribute into a [`code::MethodBody`] whose
//!     instructions carry resolved operands and index-based jump targets
//!   - [`class_graph::ClassGraph`] knows the class hierarchy, and loads classes as needed
//!   - [`verifier::verify_method`] runs the data-flow analysis on one method body
//!

mod access_flags;
mod binary_format;
pub mod class_file;
pub mod class_graph;
pub mod code;
mod descriptors;
mod errors;
mod names;
pub mod verifier;

pub use access_flags::*;
pub use binary_format::*;
pub use descriptors::*;
pub use errors::*;
pub use names::*;
