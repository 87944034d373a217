use crate::jvm::class_graph::ClassData;
use crate::jvm::{BinaryName, RefType};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Subtyping relationship between types
pub trait Assignable {
    /// Is the first type assignable to the second?
    fn is_assignable(&self, super_type: &Self) -> bool;
}

/// This does a traversal of super types in the class graph to determine assignability
impl<'g> Assignable for &'g ClassData<'g> {
    fn is_assignable(&self, super_type: &&'g ClassData<'g>) -> bool {
        let this: &'g ClassData<'g> = *self;
        let mut supertypes_to_visit: Vec<&'g ClassData<'g>> = vec![this];
        let mut dont_revisit: HashSet<&'g BinaryName> = HashSet::new();
        dont_revisit.insert(&this.name);

        // Optimization: if the super type is a class, then skip visiting interfaces
        let super_is_class: bool = !super_type.is_interface();

        while let Some(class_data) = supertypes_to_visit.pop() {
            if class_data == *super_type {
                return true;
            }

            // Enqueue next types to visit
            if let Some(superclass) = class_data.superclass {
                if dont_revisit.insert(&superclass.name) {
                    supertypes_to_visit.push(superclass);
                }
            }
            if !super_is_class {
                for interface in &class_data.interfaces {
                    if dont_revisit.insert(&interface.name) {
                        supertypes_to_visit.push(interface);
                    }
                }
            }
        }

        false
    }
}

/// Strict subtyping between reference types, with the usual (unsound) covariance of arrays
impl<'g> Assignable for RefType<&'g ClassData<'g>> {
    fn is_assignable(&self, super_type: &RefType<&'g ClassData<'g>>) -> bool {
        match (self, super_type) {
            // Special superclass and interfaces of all arrays
            (
                RefType::PrimitiveArray(_) | RefType::ObjectArray(_),
                RefType::Object(object_type),
            ) => is_array_type_assignable(&object_type.name),

            // Primitive arrays must match in dimension and type
            (RefType::PrimitiveArray(arr1), RefType::PrimitiveArray(arr2)) => arr1 == arr2,

            // Higher dimensional primitive arrays can be subtypes of object arrays
            (RefType::PrimitiveArray(arr1), RefType::ObjectArray(arr2)) => {
                match arr1.additional_dimensions.cmp(&arr2.additional_dimensions) {
                    Ordering::Less | Ordering::Equal => false,
                    Ordering::Greater => is_array_type_assignable(&arr2.element_type.name),
                }
            }

            // Cursed (unsound) covariance of arrays
            (RefType::ObjectArray(arr1), RefType::ObjectArray(arr2)) => {
                match arr1.additional_dimensions.cmp(&arr2.additional_dimensions) {
                    Ordering::Less => false,
                    Ordering::Equal => arr1.element_type.is_assignable(&arr2.element_type),
                    Ordering::Greater => is_array_type_assignable(&arr2.element_type.name),
                }
            }

            // Object-to-object assignability holds if there is a path through super type edges
            (RefType::Object(cls1), RefType::Object(cls2)) => cls1.is_assignable(cls2),

            _ => false,
        }
    }
}

/// Check if arrays can be assigned to a super type
///
/// This bakes in knowledge of the small, finite set of super types arrays have.
fn is_array_type_assignable(super_type: &BinaryName) -> bool {
    super_type == &BinaryName::OBJECT
        || super_type == &BinaryName::CLONEABLE
        || super_type == &BinaryName::SERIALIZABLE
}

/// This matches the semantics of the prolog predicate `isJavaAssignable(sub_type, super_type)` in
/// the JVM verifier specification.
///
/// The difference with `Assignable` is that any class (or array of classes) is assignable to an
/// interface (or array of interfaces of the same dimension). Interface types are checked at run
/// time by `invokeinterface`.
pub fn is_java_assignable<'g>(
    sub_type: &RefType<&'g ClassData<'g>>,
    super_type: &RefType<&'g ClassData<'g>>,
) -> bool {
    match (sub_type, super_type) {
        (RefType::Object(_), RefType::Object(interface)) if interface.is_interface() => true,
        (RefType::ObjectArray(arr1), RefType::ObjectArray(arr2))
            if arr1.additional_dimensions == arr2.additional_dimensions
                && arr2.element_type.is_interface() =>
        {
            true
        }
        _ => sub_type.is_assignable(super_type),
    }
}

/// Superclass chain of a class, starting with the class itself
pub fn superclasses<'g>(class: &'g ClassData<'g>) -> impl Iterator<Item = &'g ClassData<'g>> {
    std::iter::successors(Some(class), |class| class.superclass)
}

/// First class on the superclass chain of `class1` that is also on the chain of `class2`
///
/// If either class is an interface, this is the root of the hierarchy.
pub fn first_common_superclass<'g>(
    class1: &'g ClassData<'g>,
    class2: &'g ClassData<'g>,
) -> Option<&'g ClassData<'g>> {
    if class1.is_interface() || class2.is_interface() {
        return superclasses(class1).last();
    }
    let ancestors: HashSet<&BinaryName> = superclasses(class1).map(|class| &class.name).collect();
    superclasses(class2).find(|class| ancestors.contains(&class.name))
}
