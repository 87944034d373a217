use crate::jvm::class_file::{Attribute, ClassConstantIndex, ConstantPool, Field, Method};
use crate::jvm::{BinaryName, ClassAccessFlags, Deserialize, Error};
use byteorder::ReadBytesExt;
use std::fs;
use std::io::Cursor;
use std::path::Path;

/// Representation of the [`class` file format of the JVM][0]
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html
#[derive(Debug, Clone, PartialEq)]
pub struct ClassFile {
    pub version: Version,
    pub constants: ConstantPool,
    pub access_flags: ClassAccessFlags,
    pub this_class: ClassConstantIndex,

    /// Only `java/lang/Object` has no superclass
    pub super_class: Option<ClassConstantIndex>,
    pub interfaces: Vec<ClassConstantIndex>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub attributes: Vec<Attribute>,
}

/// Class file version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
}

impl ClassFile {
    /// Magic header bytes that go at the front of the serialized class file
    const MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

    /// Parse a full class file
    pub fn parse(bytes: &[u8]) -> Result<ClassFile, Error> {
        let mut cursor = Cursor::new(bytes);
        let class_file = ClassFile::deserialize(&mut cursor)?;
        if cursor.position() as usize != bytes.len() {
            return Err(Error::MalformedClassFile(String::from(
                "Extra bytes after the end of the class file",
            )));
        }
        Ok(class_file)
    }

    /// Read and parse a class file from disk
    pub fn read_from_path<P: AsRef<Path>>(path: P) -> Result<ClassFile, Error> {
        let bytes = fs::read(path)?;
        ClassFile::parse(&bytes)
    }

    pub fn this_class_name(&self) -> Result<BinaryName, Error> {
        self.constants.binary_class_name(self.this_class)
    }

    pub fn super_class_name(&self) -> Result<Option<BinaryName>, Error> {
        self.super_class
            .map(|super_class| self.constants.binary_class_name(super_class))
            .transpose()
    }

    pub fn interface_names(&self) -> Result<Vec<BinaryName>, Error> {
        self.interfaces
            .iter()
            .map(|interface| self.constants.binary_class_name(*interface))
            .collect()
    }
}

impl Deserialize for ClassFile {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != ClassFile::MAGIC {
            return Err(Error::MalformedClassFile(format!(
                "Bad magic number {:02x?}",
                magic
            )));
        }

        let minor = u16::deserialize(reader)?;
        let major = u16::deserialize(reader)?;
        let constants = ConstantPool::deserialize(reader)?;
        let access_flags = ClassAccessFlags::deserialize(reader)?;
        let this_class = ClassConstantIndex::deserialize(reader)?;
        let super_class = ClassConstantIndex::deserialize(reader)?;
        let interfaces = Vec::deserialize(reader)?;
        let fields = Vec::deserialize(reader)?;
        let methods = Vec::deserialize(reader)?;
        let attributes = Vec::deserialize(reader)?;

        Ok(ClassFile {
            version: Version { major, minor },
            constants,
            access_flags,
            this_class,
            super_class: if (super_class.0).0 == 0 {
                None
            } else {
                Some(super_class)
            },
            interfaces,
            fields,
            methods,
            attributes,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bad_magic() {
        let bytes = [0xCA, 0xFE, 0xBA, 0xBF, 0, 0, 0, 52];
        assert!(matches!(
            ClassFile::parse(&bytes),
            Err(Error::MalformedClassFile(_))
        ));
    }

    #[test]
    fn truncated_class() {
        let bytes = [0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 52, 0];
        assert!(matches!(ClassFile::parse(&bytes), Err(Error::IoError(_))));
    }
}
