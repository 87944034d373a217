use crate::jvm::class_file::{Attribute, ConstantPool, Utf8ConstantIndex};
use crate::jvm::{
    BinaryName, Deserialize, Error, FieldAccessFlags, FieldType, Name, ParseDescriptor,
    UnqualifiedName,
};
use byteorder::ReadBytesExt;

/// Field declared by a class or interface
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.5
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub access_flags: FieldAccessFlags,
    pub name_index: Utf8ConstantIndex,
    pub descriptor_index: Utf8ConstantIndex,
    pub attributes: Vec<Attribute>,
}

impl Deserialize for Field {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(Field {
            access_flags: FieldAccessFlags::deserialize(reader)?,
            name_index: Utf8ConstantIndex::deserialize(reader)?,
            descriptor_index: Utf8ConstantIndex::deserialize(reader)?,
            attributes: Vec::deserialize(reader)?,
        })
    }
}

impl Field {
    pub fn name(&self, constants: &ConstantPool) -> Result<UnqualifiedName, Error> {
        UnqualifiedName::from_string(constants.utf8(self.name_index)?.to_string())
            .map_err(Error::BadName)
    }

    pub fn descriptor(&self, constants: &ConstantPool) -> Result<FieldType<BinaryName>, Error> {
        let descriptor = constants.utf8(self.descriptor_index)?;
        FieldType::parse(descriptor)
            .map_err(|err| Error::BadDescriptor(descriptor.to_string(), err.to_string()))
    }
}
