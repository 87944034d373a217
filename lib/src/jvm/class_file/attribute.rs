use super::{ClassConstantIndex, ConstantPool, Utf8ConstantIndex};
use crate::jvm::{read_bytes, Deserialize, Error};
use byteorder::ReadBytesExt;
use std::io::Cursor;

/// Attributes (used in classes, fields, methods, and even on some attributes)
///
/// Only a handful of attributes matter for verification, so the rest are kept as raw bytes and
/// parsed on demand (see `AttributeLike`).
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name_index: Utf8ConstantIndex,
    pub info: Vec<u8>,
}

impl Deserialize for Attribute {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let name_index = Utf8ConstantIndex::deserialize(reader)?;

        // Attribute info length is 4 bytes
        let len = u32::deserialize(reader)?;
        let info = read_bytes(reader, len as usize)?;

        Ok(Attribute { name_index, info })
    }
}

impl Attribute {
    /// Parse the attribute contents, which must use up all of the attribute bytes
    pub fn parse_as<A: AttributeLike>(&self) -> Result<A, Error> {
        let mut cursor = Cursor::new(&self.info[..]);
        let parsed = A::deserialize(&mut cursor)?;
        if cursor.position() as usize != self.info.len() {
            return Err(Error::MalformedClassFile(format!(
                "Leftover bytes at the end of the {} attribute",
                A::NAME
            )));
        }
        Ok(parsed)
    }

    /// Find and parse the first attribute with the right name
    pub fn find<A: AttributeLike>(
        attributes: &[Attribute],
        constants: &ConstantPool,
    ) -> Result<Option<A>, Error> {
        for attribute in attributes {
            if constants.utf8(attribute.name_index)? == A::NAME {
                return attribute.parse_as().map(Some);
            }
        }
        Ok(None)
    }
}

/// Attributes are all stored in the same way (see `Attribute`), but internally
/// they represent very different things. This trait is implemented by things
/// which can be parsed out of attributes.
pub trait AttributeLike: Deserialize {
    /// Name of the attribute
    const NAME: &'static str;
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.3
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code_array: Vec<u8>,
    pub exception_table: Vec<ExceptionHandler>,
    pub attributes: Vec<Attribute>,
}

impl Deserialize for Code {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let max_stack = u16::deserialize(reader)?;
        let max_locals = u16::deserialize(reader)?;
        let code_len = u32::deserialize(reader)?;
        if code_len == 0 || code_len >= 65536 {
            return Err(Error::MalformedClassFile(format!(
                "Code length {} is not between 1 and 65535",
                code_len
            )));
        }
        let code_array = read_bytes(reader, code_len as usize)?;
        let exception_table = Vec::deserialize(reader)?;
        let attributes = Vec::deserialize(reader)?;
        Ok(Code {
            max_stack,
            max_locals,
            code_array,
            exception_table,
            attributes,
        })
    }
}

impl AttributeLike for Code {
    const NAME: &'static str = "Code";
}

/// Entry in the exception table of a `Code` attribute (offsets are into the code array)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Start of exception handler range (inclusive)
    pub start_pc: u16,

    /// End of exception handler range (exclusive)
    pub end_pc: u16,

    /// Start of the exception handler
    pub handler_pc: u16,

    /// `None` catches everything (used for `finally` blocks)
    pub catch_type: Option<ClassConstantIndex>,
}

impl Deserialize for ExceptionHandler {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let start_pc = u16::deserialize(reader)?;
        let end_pc = u16::deserialize(reader)?;
        let handler_pc = u16::deserialize(reader)?;
        let catch_type = ClassConstantIndex::deserialize(reader)?;
        Ok(ExceptionHandler {
            start_pc,
            end_pc,
            handler_pc,
            catch_type: if (catch_type.0).0 == 0 {
                None
            } else {
                Some(catch_type)
            },
        })
    }
}
