use crate::jvm::class_file::{Attribute, Code, ConstantPool, Utf8ConstantIndex};
use crate::jvm::{
    BinaryName, Deserialize, Error, MethodAccessFlags, MethodDescriptor, Name, ParseDescriptor,
    UnqualifiedName,
};
use byteorder::ReadBytesExt;

/// Method declared by a class or interface
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.6
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Method {
    pub access_flags: MethodAccessFlags,
    pub name_index: Utf8ConstantIndex,
    pub descriptor_index: Utf8ConstantIndex,
    pub attributes: Vec<Attribute>,
}

impl Deserialize for Method {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(Method {
            access_flags: MethodAccessFlags::deserialize(reader)?,
            name_index: Utf8ConstantIndex::deserialize(reader)?,
            descriptor_index: Utf8ConstantIndex::deserialize(reader)?,
            attributes: Vec::deserialize(reader)?,
        })
    }
}

impl Method {
    pub fn name(&self, constants: &ConstantPool) -> Result<UnqualifiedName, Error> {
        UnqualifiedName::from_string(constants.utf8(self.name_index)?.to_string())
            .map_err(Error::BadName)
    }

    pub fn descriptor(
        &self,
        constants: &ConstantPool,
    ) -> Result<MethodDescriptor<BinaryName>, Error> {
        let descriptor = constants.utf8(self.descriptor_index)?;
        MethodDescriptor::parse(descriptor)
            .map_err(|err| Error::BadDescriptor(descriptor.to_string(), err.to_string()))
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    /// The `Code` attribute (missing for `abstract` and `native` methods)
    pub fn code(&self, constants: &ConstantPool) -> Result<Option<Code>, Error> {
        Attribute::find(&self.attributes, constants)
    }
}
