use crate::jvm::{
    read_bytes, BinaryName, Deserialize, Error, FieldType, MethodDescriptor, Name,
    ParseDescriptor, RefType, UnqualifiedName,
};
use crate::util::{Offset, OffsetVec, Width};
use byteorder::ReadBytesExt;

/// Constants as in the constant pool
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.4
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Constant UTF-8 encoded raw string value
    ///
    /// Despite the name, the encoding is not quite UTF-8 (the encoding of the
    /// null character `\u{0000}` and the encoding of supplementary characters
    /// is different).
    Utf8(String),

    /// Constant primitive of type `int`
    Integer(i32),

    /// Constant primitive of type `float`
    Float(f32),

    /// Constant primitive of type `long`
    Long(i64),

    /// Constant primitive of type `double`
    Double(f64),

    /// Class or an interface
    Class(Utf8ConstantIndex),

    /// Constant object of type `java.lang.String`
    String(Utf8ConstantIndex),

    /// Field
    FieldRef(ClassConstantIndex, NameAndTypeConstantIndex),

    /// Method (this combines `Methodref` and `InterfaceMethodref`
    MethodRef {
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
        is_interface: bool,
    },

    /// Name and a type (eg. for a field or a method)
    NameAndType {
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    },

    /// Constant object of type `java.lang.invoke.MethodHandle`
    MethodHandle {
        handle_kind: HandleKind,

        /// Depending on the method kind, this points to different things:
        ///
        ///   - `FieldRef` for `GetField`, `GetStatic`, `PutField`, `PutStatic`
        ///   - `MethodRef` for the rest
        member: ConstantIndex,
    },

    /// Method type
    MethodType { descriptor: Utf8ConstantIndex },

    /// Dynamically-computed constant
    Dynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        name_and_type: NameAndTypeConstantIndex,
    },

    /// Dynamically-computed call site
    InvokeDynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        method_descriptor: NameAndTypeConstantIndex,
    },

    Module(Utf8ConstantIndex),
    Package(Utf8ConstantIndex),
}

impl Constant {
    /// Name of the kind of constant, for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Constant::Utf8(_) => "Utf8",
            Constant::Integer(_) => "Integer",
            Constant::Float(_) => "Float",
            Constant::Long(_) => "Long",
            Constant::Double(_) => "Double",
            Constant::Class(_) => "Class",
            Constant::String(_) => "String",
            Constant::FieldRef(_, _) => "Fieldref",
            Constant::MethodRef {
                is_interface: false,
                ..
            } => "Methodref",
            Constant::MethodRef {
                is_interface: true, ..
            } => "InterfaceMethodref",
            Constant::NameAndType { .. } => "NameAndType",
            Constant::MethodHandle { .. } => "MethodHandle",
            Constant::MethodType { .. } => "MethodType",
            Constant::Dynamic { .. } => "Dynamic",
            Constant::InvokeDynamic { .. } => "InvokeDynamic",
            Constant::Module(_) => "Module",
            Constant::Package(_) => "Package",
        }
    }
}

impl Deserialize for Constant {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let tag = u8::deserialize(reader)?;
        let constant = match tag {
            1 => {
                let len = u16::deserialize(reader)?;
                let bytes = read_bytes(reader, len as usize)?;
                let string = decode_modified_utf8(&bytes).map_err(Error::MalformedClassFile)?;
                Constant::Utf8(string)
            }
            3 => Constant::Integer(i32::deserialize(reader)?),
            4 => Constant::Float(f32::deserialize(reader)?),
            5 => Constant::Long(i64::deserialize(reader)?),
            6 => Constant::Double(f64::deserialize(reader)?),
            7 => Constant::Class(Utf8ConstantIndex::deserialize(reader)?),
            8 => Constant::String(Utf8ConstantIndex::deserialize(reader)?),
            9 => Constant::FieldRef(
                ClassConstantIndex::deserialize(reader)?,
                NameAndTypeConstantIndex::deserialize(reader)?,
            ),
            10 | 11 => Constant::MethodRef {
                class: ClassConstantIndex::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
                is_interface: tag == 11,
            },
            12 => Constant::NameAndType {
                name: Utf8ConstantIndex::deserialize(reader)?,
                descriptor: Utf8ConstantIndex::deserialize(reader)?,
            },
            15 => Constant::MethodHandle {
                handle_kind: HandleKind::deserialize(reader)?,
                member: ConstantIndex::deserialize(reader)?,
            },
            16 => Constant::MethodType {
                descriptor: Utf8ConstantIndex::deserialize(reader)?,
            },
            17 => Constant::Dynamic {
                bootstrap_method: u16::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
            },
            18 => Constant::InvokeDynamic {
                bootstrap_method: u16::deserialize(reader)?,
                method_descriptor: NameAndTypeConstantIndex::deserialize(reader)?,
            },
            19 => Constant::Module(Utf8ConstantIndex::deserialize(reader)?),
            20 => Constant::Package(Utf8ConstantIndex::deserialize(reader)?),
            other => {
                return Err(Error::MalformedClassFile(format!(
                    "Unknown constant pool tag {}",
                    other
                )))
            }
        };
        Ok(constant)
    }
}

/// Almost all constants have width 1, except for `Constant::Long` and `Constant::Double`. Quoting
/// the JVM specification:
///
/// > All 8-byte constants take up two entries in the constant_pool table of the class file. If a
/// > CONSTANT_Long_info or CONSTANT_Double_info structure is the item in the constant_pool table
/// > at index n, then the next usable item in the pool is located at index n+2. The constant_pool
/// > index n+1 must be valid but is considered unusable.
impl Width for Constant {
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

/// Decode the modified UTF-8 format used in class files
///
/// Characters are decoded into UTF-16 code units (supplementary characters show up as surrogate
/// pairs of 3-byte sequences) which are then turned back into a string.
///
/// [0]: https://docs.oracle.com/en/java/javase/17/docs/api/java.base/java/io/DataInput.html#modified-utf-8
pub fn decode_modified_utf8(bytes: &[u8]) -> Result<String, String> {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut bytes = bytes.iter().copied();

    let continuation = |byte: Option<u8>| -> Result<u16, String> {
        match byte {
            Some(b) if b & 0b1100_0000 == 0b1000_0000 => Ok((b & 0x3F) as u16),
            Some(b) => Err(format!("Invalid continuation byte {:#x}", b)),
            None => Err(String::from("Truncated modified UTF-8 sequence")),
        }
    };

    while let Some(byte) = bytes.next() {
        let unit = if byte & 0b1000_0000 == 0 && byte != 0 {
            byte as u16
        } else if byte & 0b1110_0000 == 0b1100_0000 {
            let b2 = continuation(bytes.next())?;
            ((byte & 0x1F) as u16) << 6 | b2
        } else if byte & 0b1111_0000 == 0b1110_0000 {
            let b2 = continuation(bytes.next())?;
            let b3 = continuation(bytes.next())?;
            ((byte & 0x0F) as u16) << 12 | b2 << 6 | b3
        } else {
            return Err(format!("Invalid modified UTF-8 byte {:#x}", byte));
        };
        units.push(unit);
    }

    String::from_utf16(&units).map_err(|err| err.to_string())
}

#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub struct ConstantIndex(pub u16);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct Utf8ConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct NameAndTypeConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct ClassConstantIndex(pub ConstantIndex);

impl From<Utf8ConstantIndex> for ConstantIndex {
    fn from(index: Utf8ConstantIndex) -> ConstantIndex {
        index.0
    }
}
impl From<NameAndTypeConstantIndex> for ConstantIndex {
    fn from(index: NameAndTypeConstantIndex) -> ConstantIndex {
        index.0
    }
}
impl From<ClassConstantIndex> for ConstantIndex {
    fn from(index: ClassConstantIndex) -> ConstantIndex {
        index.0
    }
}

impl Deserialize for ConstantIndex {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(ConstantIndex(u16::deserialize(reader)?))
    }
}
impl Deserialize for Utf8ConstantIndex {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(Utf8ConstantIndex(ConstantIndex::deserialize(reader)?))
    }
}
impl Deserialize for NameAndTypeConstantIndex {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(NameAndTypeConstantIndex(ConstantIndex::deserialize(reader)?))
    }
}
impl Deserialize for ClassConstantIndex {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(ClassConstantIndex(ConstantIndex::deserialize(reader)?))
    }
}

/// Type of method handle
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-5.html#jvms-5.4.3.5-220
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum HandleKind {
    GetField,
    GetStatic,
    PutField,
    PutStatic,
    InvokeVirtual,
    InvokeStatic,
    InvokeSpecial,
    NewInvokeSpecial,
    InvokeInterface,
}

impl Deserialize for HandleKind {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let kind = match u8::deserialize(reader)? {
            1 => HandleKind::GetField,
            2 => HandleKind::GetStatic,
            3 => HandleKind::PutField,
            4 => HandleKind::PutStatic,
            5 => HandleKind::InvokeVirtual,
            6 => HandleKind::InvokeStatic,
            7 => HandleKind::InvokeSpecial,
            8 => HandleKind::NewInvokeSpecial,
            9 => HandleKind::InvokeInterface,
            other => {
                return Err(Error::MalformedClassFile(format!(
                    "Unknown method handle kind {}",
                    other
                )))
            }
        };
        Ok(kind)
    }
}

/// Field reference, with its constant pool indirections resolved
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: FieldType<BinaryName>,
}

/// Method reference, with its constant pool indirections resolved
///
/// The class is a reference type since methods can be invoked on arrays (eg. `clone`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub class: RefType<BinaryName>,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor<BinaryName>,
    pub is_interface: bool,
}

/// Call site of an `invokedynamic`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InvokeDynamicRef {
    pub bootstrap_method: u16,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor<BinaryName>,
}

/// Constants which can be pushed with `ldc`, `ldc_w`, or `ldc2_w`
#[derive(Debug, Clone, PartialEq)]
pub enum LoadableConstant {
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),
    Class(RefType<BinaryName>),
    MethodType(String),
    MethodHandle(HandleKind),

    /// Dynamically-computed constant, along with the type it computes
    Dynamic(FieldType<BinaryName>),
}

impl Width for LoadableConstant {
    fn width(&self) -> usize {
        match self {
            LoadableConstant::Long(_) | LoadableConstant::Double(_) => 2,
            LoadableConstant::Dynamic(field_type) => field_type.width(),
            _ => 1,
        }
    }
}

/// Constant pool of a class file
///
/// Constant pool indices start at 1 and two-slot constants occupy two indices, which is exactly
/// what an `OffsetVec` starting at offset 1 models.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantPool(OffsetVec<Constant>);

impl ConstantPool {
    pub fn new() -> ConstantPool {
        ConstantPool(OffsetVec::new_starting_at(Offset(1)))
    }

    /// Append a constant, returning its index
    pub fn push(&mut self, constant: Constant) -> ConstantIndex {
        ConstantIndex(self.0.push(constant).0 as u16)
    }

    /// Number of constant pool entries
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Look up any constant
    pub fn get(&self, index: impl Into<ConstantIndex>) -> Result<&Constant, Error> {
        let index = index.into();
        self.0
            .get_offset(Offset(index.0 as usize))
            .ok()
            .ok_or_else(|| bad_constant(index, "index is not a valid constant pool entry"))
    }

    /// Look up a `CONSTANT_Utf8_info`
    pub fn utf8(&self, index: Utf8ConstantIndex) -> Result<&str, Error> {
        match self.get(index)? {
            Constant::Utf8(string) => Ok(string),
            other => Err(wrong_kind(index.0, "Utf8", other)),
        }
    }

    /// Look up a `CONSTANT_Class_info`
    ///
    /// The name is usually a binary name, but array types are written out as descriptors.
    pub fn class_name(&self, index: ClassConstantIndex) -> Result<RefType<BinaryName>, Error> {
        let name = match self.get(index)? {
            Constant::Class(name) => self.utf8(*name)?,
            other => return Err(wrong_kind(index.0, "Class", other)),
        };
        if name.starts_with('[') {
            RefType::parse(name)
                .map_err(|err| Error::BadDescriptor(name.to_string(), err.to_string()))
        } else {
            BinaryName::from_string(name.to_string())
                .map(RefType::Object)
                .map_err(Error::BadName)
        }
    }

    /// Look up a `CONSTANT_Class_info` which must not be an array type
    pub fn binary_class_name(&self, index: ClassConstantIndex) -> Result<BinaryName, Error> {
        match self.class_name(index)? {
            RefType::Object(name) => Ok(name),
            other => Err(bad_constant(
                index.0,
                format!("expected a class, not the array type {:?}", other),
            )),
        }
    }

    /// Look up a `CONSTANT_NameAndType_info` (the descriptor is left unparsed)
    pub fn name_and_type(
        &self,
        index: NameAndTypeConstantIndex,
    ) -> Result<(UnqualifiedName, &str), Error> {
        match self.get(index)? {
            Constant::NameAndType { name, descriptor } => {
                let name = UnqualifiedName::from_string(self.utf8(*name)?.to_string())
                    .map_err(Error::BadName)?;
                Ok((name, self.utf8(*descriptor)?))
            }
            other => Err(wrong_kind(index.0, "NameAndType", other)),
        }
    }

    /// Look up and resolve a `CONSTANT_Fieldref_info`
    pub fn field_ref(&self, index: ConstantIndex) -> Result<FieldRef, Error> {
        match self.get(index)? {
            Constant::FieldRef(class, name_and_type) => {
                let class = self.binary_class_name(*class)?;
                let (name, descriptor) = self.name_and_type(*name_and_type)?;
                Ok(FieldRef {
                    class,
                    name,
                    descriptor: parse_descriptor(descriptor)?,
                })
            }
            other => Err(wrong_kind(index, "Fieldref", other)),
        }
    }

    /// Look up and resolve a `CONSTANT_Methodref_info` or `CONSTANT_InterfaceMethodref_info`
    pub fn method_ref(&self, index: ConstantIndex) -> Result<MethodRef, Error> {
        match self.get(index)? {
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                let class = self.class_name(*class)?;
                let (name, descriptor) = self.name_and_type(*name_and_type)?;
                Ok(MethodRef {
                    class,
                    name,
                    descriptor: parse_descriptor(descriptor)?,
                    is_interface: *is_interface,
                })
            }
            other => Err(wrong_kind(index, "Methodref", other)),
        }
    }

    /// Look up and resolve a `CONSTANT_InvokeDynamic_info`
    pub fn invoke_dynamic(&self, index: ConstantIndex) -> Result<InvokeDynamicRef, Error> {
        match self.get(index)? {
            Constant::InvokeDynamic {
                bootstrap_method,
                method_descriptor,
            } => {
                let (name, descriptor) = self.name_and_type(*method_descriptor)?;
                Ok(InvokeDynamicRef {
                    bootstrap_method: *bootstrap_method,
                    name,
                    descriptor: parse_descriptor(descriptor)?,
                })
            }
            other => Err(wrong_kind(index, "InvokeDynamic", other)),
        }
    }

    /// Look up a constant that can be loaded onto the stack
    pub fn loadable_constant(&self, index: ConstantIndex) -> Result<LoadableConstant, Error> {
        let loadable = match self.get(index)? {
            Constant::Integer(i) => LoadableConstant::Integer(*i),
            Constant::Float(f) => LoadableConstant::Float(*f),
            Constant::Long(l) => LoadableConstant::Long(*l),
            Constant::Double(d) => LoadableConstant::Double(*d),
            Constant::String(utf8) => LoadableConstant::String(self.utf8(*utf8)?.to_string()),
            Constant::Class(_) => {
                LoadableConstant::Class(self.class_name(ClassConstantIndex(index))?)
            }
            Constant::MethodType { descriptor } => {
                LoadableConstant::MethodType(self.utf8(*descriptor)?.to_string())
            }
            Constant::MethodHandle { handle_kind, .. } => {
                LoadableConstant::MethodHandle(*handle_kind)
            }
            Constant::Dynamic { name_and_type, .. } => {
                let (_, descriptor) = self.name_and_type(*name_and_type)?;
                LoadableConstant::Dynamic(parse_descriptor(descriptor)?)
            }
            other => {
                return Err(bad_constant(
                    index,
                    format!("{} constants are not loadable", other.kind()),
                ))
            }
        };
        Ok(loadable)
    }
}

impl Default for ConstantPool {
    fn default() -> Self {
        ConstantPool::new()
    }
}

/// The count in the class file is one more than the largest valid index
impl Deserialize for ConstantPool {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let count = u16::deserialize(reader)? as usize;
        let mut pool = ConstantPool::new();
        while pool.0.offset_len().0 < count {
            pool.0.push(Constant::deserialize(reader)?);
        }
        if pool.0.offset_len().0 != count.max(1) {
            return Err(Error::MalformedClassFile(String::from(
                "Two-slot constant overflows the constant pool",
            )));
        }
        Ok(pool)
    }
}

fn parse_descriptor<D: ParseDescriptor>(descriptor: &str) -> Result<D, Error> {
    D::parse(descriptor)
        .map_err(|err| Error::BadDescriptor(descriptor.to_string(), err.to_string()))
}

fn bad_constant(index: ConstantIndex, message: impl Into<String>) -> Error {
    Error::BadConstant {
        index: index.0,
        message: message.into(),
    }
}

fn wrong_kind(index: ConstantIndex, expected: &str, found: &Constant) -> Error {
    bad_constant(
        index,
        format!("expected {} constant but found {}", expected, found.kind()),
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    fn utf8(pool: &mut ConstantPool, string: &str) -> Utf8ConstantIndex {
        Utf8ConstantIndex(pool.push(Constant::Utf8(string.to_string())))
    }

    #[test]
    fn modified_utf8_null_byte() {
        assert_eq!(decode_modified_utf8(&[97, 192, 128, 97]).unwrap(), "a\x00a");
        assert!(decode_modified_utf8(&[97, 0, 97]).is_err());
    }

    #[test]
    fn modified_utf8_ascii_and_multibyte() {
        assert_eq!(decode_modified_utf8(&[102, 111, 111]).unwrap(), "foo");
        assert_eq!(
            decode_modified_utf8(&[196, 132, 199, 141, 224, 164, 132]).unwrap(),
            "ĄǍऄ"
        );
        assert!(decode_modified_utf8(&[224, 164]).is_err());
    }

    #[test]
    fn modified_utf8_supplementary_characters() {
        assert_eq!(
            decode_modified_utf8(&[
                237, 160, 128, 237, 176, 128, 237, 172, 191, 237, 191, 191, 237, 175, 191, 237,
                191, 191
            ])
            .unwrap(),
            "\u{10000}\u{dffff}\u{10FFFF}"
        );
    }

    #[test]
    fn wide_constants_take_two_indices() {
        let bytes: Vec<u8> = vec![
            0x00, 0x05, // count (4 usable indices)
            0x05, 0, 0, 0, 0, 0, 0, 0, 42, // #1 long 42 (#2 unusable)
            0x03, 0, 0, 0, 7, // #3 int 7
            0x01, 0x00, 0x01, b'x', // #4 utf8 "x"
        ];
        let pool = ConstantPool::deserialize(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(pool.len(), 3);
        assert_eq!(
            pool.loadable_constant(ConstantIndex(1)).unwrap(),
            LoadableConstant::Long(42)
        );
        assert!(pool.get(ConstantIndex(2)).is_err());
        assert_eq!(
            pool.loadable_constant(ConstantIndex(3)).unwrap(),
            LoadableConstant::Integer(7)
        );
        assert_eq!(pool.utf8(Utf8ConstantIndex(ConstantIndex(4))).unwrap(), "x");
        assert!(pool.loadable_constant(ConstantIndex(4)).is_err());
    }

    #[test]
    fn member_references_resolve() {
        let mut pool = ConstantPool::new();
        let class_name = utf8(&mut pool, "java/lang/String");
        let class = ClassConstantIndex(pool.push(Constant::Class(class_name)));
        let name = utf8(&mut pool, "length");
        let descriptor = utf8(&mut pool, "()I");
        let name_and_type =
            NameAndTypeConstantIndex(pool.push(Constant::NameAndType { name, descriptor }));
        let method = pool.push(Constant::MethodRef {
            class,
            name_and_type,
            is_interface: false,
        });

        let method_ref = pool.method_ref(method).unwrap();
        assert_eq!(method_ref.class, RefType::Object(BinaryName::STRING));
        assert_eq!(method_ref.name.as_str(), "length");
        assert_eq!(method_ref.descriptor.return_type, Some(FieldType::int()));
        assert!(pool.field_ref(method).is_err());
    }

    #[test]
    fn array_class_constants() {
        let mut pool = ConstantPool::new();
        let array_name = utf8(&mut pool, "[[I");
        let array = ClassConstantIndex(pool.push(Constant::Class(array_name)));
        assert_eq!(
            pool.class_name(array).unwrap(),
            RefType::array(FieldType::array(FieldType::int()))
        );
        assert!(pool.binary_class_name(array).is_err());
    }
}
