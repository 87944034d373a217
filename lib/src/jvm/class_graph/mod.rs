//! The class hierarchy, as needed to answer subtyping questions during verification
//!
//! Classes live in arenas and are referred to by `&'g ClassData<'g>`. The graph is append-only:
//! classes get added either up front (for instance the `java.lang` core types) or on demand, the
//! first time verification needs to know about them, by looking them up on the class path.

use crate::jvm::class_file::ClassFile;
use crate::jvm::verifier::{ClassHierarchy, ClassStatus};
use crate::jvm::{
    BinaryName, ClassAccessFlags, Error, FieldAccessFlags, FieldType, Name, RefType,
    RenderDescriptor, UnqualifiedName,
};
use elsa::map::FrozenMap;
use elsa::FrozenVec;
use std::cell::RefCell;
use std::fmt;
use std::fmt::Debug;
use typed_arena::Arena;

mod assignable;
mod class_path;
mod java_classes;

pub use assignable::*;
pub use class_path::*;
pub use java_classes::*;

pub struct ClassGraphArenas<'g> {
    class_arena: Arena<ClassData<'g>>,
    field_arena: Arena<FieldData<'g>>,
}

impl<'g> ClassGraphArenas<'g> {
    pub fn new() -> Self {
        ClassGraphArenas {
            class_arena: Arena::new(),
            field_arena: Arena::new(),
        }
    }
}

impl<'g> Default for ClassGraphArenas<'g> {
    fn default() -> Self {
        ClassGraphArenas::new()
    }
}

/// Tracks the relationships between classes/interfaces and the fields on those classes
///
/// Verification of a single method can end up touching a lot of classes (every type that gets
/// merged at a control flow join, every field and method owner). Rather than requiring all of
/// those up front, the graph loads classes lazily from its `class_path`.
pub struct ClassGraph<'g> {
    arenas: &'g ClassGraphArenas<'g>,
    classes: FrozenMap<&'g BinaryName, &'g ClassData<'g>>,

    /// Where to look for classes that are not in the graph yet
    pub class_path: ClassPath,

    /// Model classes that cannot be found as subclasses of `java/lang/Object` instead of failing
    pub assume_missing_classes: bool,

    /// Results of `verify_class`
    statuses: FrozenMap<BinaryName, Box<ClassStatus>>,

    /// Classes currently being loaded (used to detect superclass cycles)
    loading: RefCell<Vec<BinaryName>>,
}

impl<'g> ClassGraph<'g> {
    /// New empty graph
    pub fn new(arenas: &'g ClassGraphArenas<'g>) -> Self {
        ClassGraph {
            arenas,
            classes: FrozenMap::new(),
            class_path: ClassPath::new(),
            assume_missing_classes: false,
            statuses: FrozenMap::new(),
            loading: RefCell::new(vec![]),
        }
    }

    /// Find a class already in the graph
    pub fn lookup_class(&self, name: &BinaryName) -> Option<&'g ClassData<'g>> {
        self.classes.map_get(name, |class| *class)
    }

    /// Find a class in the graph, loading it from the class path if it is not there yet
    pub fn resolve_class(&self, name: &BinaryName) -> Result<&'g ClassData<'g>, Error> {
        if let Some(class) = self.lookup_class(name) {
            return Ok(class);
        }
        if self.loading.borrow().contains(name) {
            return Err(Error::ClassCircularity(name.to_string()));
        }

        match self.class_path.load(name)? {
            Some(class_file) => {
                let found_name = class_file.this_class_name()?;
                if &found_name != name {
                    return Err(Error::MalformedClassFile(format!(
                        "Expected class {} but found {}",
                        name, found_name
                    )));
                }
                log::debug!("Loading {} from the class path", name);
                self.loading.borrow_mut().push(name.clone());
                let loaded = self.add_class_file(&class_file);
                self.loading.borrow_mut().pop();
                loaded
            }
            None if self.assume_missing_classes => {
                log::warn!(
                    "Class {} could not be found, assuming it directly extends {}",
                    name,
                    BinaryName::OBJECT
                );
                let superclass = if name == &BinaryName::OBJECT {
                    None
                } else {
                    Some(self.resolve_class(&BinaryName::OBJECT)?)
                };
                Ok(self.add_class(ClassData {
                    name: name.clone(),
                    superclass,
                    interfaces: FrozenVec::new(),
                    access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
                    fields: FrozenVec::new(),
                }))
            }
            None => Err(Error::MissingClass(name.to_string())),
        }
    }

    /// Resolve every class mentioned in a reference type
    pub fn resolve_ref_type(
        &self,
        ref_type: &RefType<BinaryName>,
    ) -> Result<RefType<&'g ClassData<'g>>, Error> {
        Ok(match ref_type {
            RefType::Object(name) => RefType::Object(self.resolve_class(name)?),
            RefType::ObjectArray(arr) => {
                let element = self.resolve_class(&arr.element_type)?;
                RefType::ObjectArray(arr.map(|_| element))
            }
            RefType::PrimitiveArray(arr) => RefType::PrimitiveArray(*arr),
        })
    }

    /// Add a new class to the class graph
    pub fn add_class(&self, data: ClassData<'g>) -> &'g ClassData<'g> {
        let data = &*self.arenas.class_arena.alloc(data);
        self.classes.insert(&data.name, data);
        data
    }

    /// Add a field to the class graph and to its class
    pub fn add_field(&self, field: FieldData<'g>) -> &'g FieldData<'g> {
        let data = &*self.arenas.field_arena.alloc(field);
        data.class.fields.push(data);
        data
    }

    /// Add a parsed class file (along with its fields) to the graph
    ///
    /// The superclass and interfaces get resolved first, so they may end up being loaded too.
    pub fn add_class_file(&self, class_file: &ClassFile) -> Result<&'g ClassData<'g>, Error> {
        let name = class_file.this_class_name()?;
        if let Some(existing) = self.lookup_class(&name) {
            return Ok(existing);
        }

        let superclass = match class_file.super_class_name()? {
            Some(superclass) => Some(self.resolve_class(&superclass)?),
            None => None,
        };
        let interfaces = FrozenVec::new();
        for interface in class_file.interface_names()? {
            interfaces.push(self.resolve_class(&interface)?);
        }

        let class = self.add_class(ClassData {
            name,
            superclass,
            interfaces,
            access_flags: class_file.access_flags,
            fields: FrozenVec::new(),
        });
        for field in &class_file.fields {
            self.add_field(FieldData {
                class,
                name: field.name(&class_file.constants)?,
                descriptor: field.descriptor(&class_file.constants)?,
                access_flags: field.access_flags,
            });
        }
        Ok(class)
    }

    /// Add standard types to the class graph
    pub fn insert_java_library_types(&self) -> JavaClasses<'g> {
        JavaClasses::add_to_graph(self)
    }

    /// Nearest common superclass of two resolved reference types
    ///
    /// Interfaces are not considered: if either side is an interface, the result is
    /// `java/lang/Object`. Arrays of classes with the same dimensions merge element-wise, other
    /// arrays merge to `java/lang/Object`.
    pub fn common_superclass(
        &self,
        type1: &RefType<&'g ClassData<'g>>,
        type2: &RefType<&'g ClassData<'g>>,
    ) -> Result<RefType<&'g ClassData<'g>>, Error> {
        let object = self.resolve_class(&BinaryName::OBJECT)?;
        if type1 == type2 {
            return Ok(*type1);
        }

        let common = match (type1, type2) {
            (RefType::ObjectArray(arr1), RefType::ObjectArray(arr2))
                if arr1.additional_dimensions == arr2.additional_dimensions =>
            {
                first_common_superclass(arr1.element_type, arr2.element_type)
                    .map(|element| RefType::ObjectArray(arr1.map(|_| element)))
            }
            (RefType::Object(cls1), RefType::Object(cls2)) => {
                first_common_superclass(*cls1, *cls2).map(RefType::Object)
            }
            _ => Some(RefType::Object(object)),
        };

        common.ok_or_else(|| {
            Error::MissingClass(format!(
                "common superclass of {} and {}",
                type1.render(),
                type2.render()
            ))
        })
    }

    fn check_class(&self, name: &BinaryName) -> Result<ClassStatus, Error> {
        let class = match self.resolve_class(name) {
            Ok(class) => class,
            Err(Error::ClassCircularity(involved)) => {
                return Ok(ClassStatus::Rejected(format!(
                    "Class circularity involving {}",
                    involved
                )))
            }
            Err(other) => return Err(other),
        };

        match class.superclass {
            None if class.name != BinaryName::OBJECT => {
                return Ok(ClassStatus::Rejected(format!(
                    "{} has no superclass",
                    class.name
                )))
            }
            None => (),
            Some(superclass) => {
                if superclass.is_interface() {
                    return Ok(ClassStatus::Rejected(format!(
                        "Superclass {} of {} is an interface",
                        superclass.name, class.name
                    )));
                }
                if superclass.access_flags.contains(ClassAccessFlags::FINAL) {
                    return Ok(ClassStatus::Rejected(format!(
                        "{} extends final class {}",
                        class.name, superclass.name
                    )));
                }
                if let ClassStatus::Rejected(reason) = self.verify_class(&superclass.name)? {
                    return Ok(ClassStatus::Rejected(format!(
                        "Superclass {} of {} is invalid: {}",
                        superclass.name, class.name, reason
                    )));
                }
            }
        }

        for interface in &class.interfaces {
            if !interface.is_interface() {
                return Ok(ClassStatus::Rejected(format!(
                    "{} implements {}, which is not an interface",
                    class.name, interface.name
                )));
            }
        }

        Ok(ClassStatus::Verified)
    }
}

/// The verifier sees the class graph only through names
impl<'g> ClassHierarchy for ClassGraph<'g> {
    fn is_assignable(
        &self,
        sub_type: &RefType<BinaryName>,
        super_type: &RefType<BinaryName>,
    ) -> Result<bool, Error> {
        if sub_type == super_type {
            return Ok(true);
        }
        let sub_type = self.resolve_ref_type(sub_type)?;
        let super_type = self.resolve_ref_type(super_type)?;
        Ok(is_java_assignable(&sub_type, &super_type))
    }

    fn common_supertype(
        &self,
        type1: &RefType<BinaryName>,
        type2: &RefType<BinaryName>,
    ) -> Result<RefType<BinaryName>, Error> {
        if type1 == type2 {
            return Ok(type1.clone());
        }
        let type1 = self.resolve_ref_type(type1)?;
        let type2 = self.resolve_ref_type(type2)?;
        let common = self.common_superclass(&type1, &type2)?;
        Ok(common.map(|class| class.name.clone()))
    }

    fn is_interface(&self, name: &BinaryName) -> Result<bool, Error> {
        Ok(self.resolve_class(name)?.is_interface())
    }

    fn declares_field(
        &self,
        class: &BinaryName,
        name: &UnqualifiedName,
        descriptor: &FieldType<BinaryName>,
    ) -> Result<bool, Error> {
        let class = self.resolve_class(class)?;
        Ok(class.find_field(name, descriptor).is_some())
    }

    fn verify_class(&self, name: &BinaryName) -> Result<ClassStatus, Error> {
        if let Some(status) = self.statuses.get(name) {
            return Ok(status.clone());
        }
        let status = self.check_class(name)?;
        if let ClassStatus::Rejected(reason) = &status {
            log::debug!("Class {} is rejected: {}", name, reason);
        }
        self.statuses.insert(name.clone(), Box::new(status.clone()));
        Ok(status)
    }
}

pub struct ClassData<'g> {
    /// Name of the class
    pub name: BinaryName,

    /// Superclass is only ever missing for `java/lang/Object` itself
    pub superclass: Option<&'g ClassData<'g>>,

    /// Interfaces implemented (or super-interfaces)
    pub interfaces: FrozenVec<&'g ClassData<'g>>,

    /// Access flags
    pub access_flags: ClassAccessFlags,

    /// Fields
    pub fields: FrozenVec<&'g FieldData<'g>>,
}

impl<'g> ClassData<'g> {
    pub fn new(
        name: BinaryName,
        superclass: &'g ClassData<'g>,
        access_flags: ClassAccessFlags,
    ) -> ClassData<'g> {
        ClassData {
            name,
            superclass: Some(superclass),
            interfaces: FrozenVec::new(),
            access_flags,
            fields: FrozenVec::new(),
        }
    }

    /// Is this an interface?
    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::INTERFACE)
    }

    /// Find a field declared directly on this class
    pub fn find_field(
        &self,
        name: &UnqualifiedName,
        descriptor: &FieldType<BinaryName>,
    ) -> Option<&FieldData<'g>> {
        self.fields
            .iter()
            .find(|field| &field.name == name && &field.descriptor == descriptor)
    }
}

impl<'g> PartialEq for ClassData<'g> {
    fn eq(&self, other: &ClassData<'g>) -> bool {
        self.name == other.name
    }
}

impl<'g> Eq for ClassData<'g> {}

impl<'g> RenderDescriptor for ClassData<'g> {
    fn render_to(&self, write_to: &mut String) {
        self.name.render_to(write_to)
    }
}

impl<'a, 'g> RenderDescriptor for &'a ClassData<'g> {
    fn render_to(&self, write_to: &mut String) {
        self.name.render_to(write_to)
    }
}

impl<'g> Debug for ClassData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name.as_str())
    }
}

pub struct FieldData<'g> {
    /// Class
    ///
    /// Note: this is a pointer back to the class (so don't derive `Debug`)
    pub class: &'g ClassData<'g>,

    /// Name of the field
    pub name: UnqualifiedName,

    /// Type of the field
    pub descriptor: FieldType<BinaryName>,

    /// Access flags
    pub access_flags: FieldAccessFlags,
}

impl<'g> FieldData<'g> {
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(FieldAccessFlags::STATIC)
    }
}

impl<'g> Debug for FieldData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "{}.{}:{}",
            self.class.name.as_str(),
            self.name.as_str(),
            self.descriptor.render(),
        ))
    }
}
