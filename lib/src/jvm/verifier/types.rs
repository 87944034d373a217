use super::{ClassHierarchy, VerifierError};
use crate::jvm::code::{class_operand, InstructionIndex};
use crate::jvm::{BaseType, BinaryName, FieldType, RefType};
use crate::util::Width;
use std::fmt;

/// Where an uninitialized object came from
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum UninitializedOrigin {
    /// The `this` parameter of a constructor
    This,

    /// Object allocated by the `new` instruction at this index
    New(InstructionIndex),
}

/// Types tracked for local variables and stack slots during verification
///
/// Booleans, bytes, chars, and shorts are all just `Integer` at this level.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum VerificationType {
    /// Only used as the "returned type" of a `return` instruction
    Void,

    Integer,
    Float,
    Long,
    Double,
    Null,

    /// Initialized object or array
    Object(RefType<BinaryName>),

    /// Object of the given class, on which no constructor has been invoked yet
    Uninitialized(BinaryName, UninitializedOrigin),

    /// Pushed by `jsr`, holding the index of the instruction after that `jsr`
    ReturnAddress(InstructionIndex),

    /// Slot which cannot be read: never written, upper half of a `long` or `double`, or the
    /// result of merging incompatible types
    Unknown,
}

impl VerificationType {
    pub fn object(class: BinaryName) -> VerificationType {
        VerificationType::Object(RefType::Object(class))
    }

    /// Type of a value loaded from a field, array, or method of this type
    pub fn from_field_type(field_type: &FieldType<BinaryName>) -> VerificationType {
        match field_type {
            FieldType::Base(BaseType::Int)
            | FieldType::Base(BaseType::Char)
            | FieldType::Base(BaseType::Short)
            | FieldType::Base(BaseType::Byte)
            | FieldType::Base(BaseType::Boolean) => VerificationType::Integer,
            FieldType::Base(BaseType::Float) => VerificationType::Float,
            FieldType::Base(BaseType::Long) => VerificationType::Long,
            FieldType::Base(BaseType::Double) => VerificationType::Double,
            FieldType::Ref(ref_type) => VerificationType::Object(ref_type.clone()),
        }
    }

    /// Like [`VerificationType::from_field_type`], but with `None` meaning `void`
    pub fn from_return_type(return_type: &Option<FieldType<BinaryName>>) -> VerificationType {
        match return_type {
            None => VerificationType::Void,
            Some(field_type) => VerificationType::from_field_type(field_type),
        }
    }

    /// Is this type is a reference type (including null and uninitialized objects)?
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            VerificationType::Null
                | VerificationType::Object(_)
                | VerificationType::Uninitialized(_, _)
        )
    }

    pub fn is_uninitialized(&self) -> bool {
        matches!(self, VerificationType::Uninitialized(_, _))
    }

    /// Type the value will have once its constructor has run
    pub fn initialized(&self) -> VerificationType {
        match self {
            VerificationType::Uninitialized(class, _) => VerificationType::object(class.clone()),
            other => other.clone(),
        }
    }

    /// Merge a type flowing into a local variable slot with the type already recorded there
    ///
    /// Returns the merged type, which may be the same as `self`. The result does not depend on
    /// which side is recorded and which is incoming. Initialized and uninitialized versions of
    /// the same object merge to the initialized one, two different uninitialized objects never
    /// merge, and an uninitialized object merged with anything else leaves the slot `Unknown`.
    ///
    /// Uninitialized objects flowing along backwards branches are rejected before any merge
    /// happens, in the data-flow analysis itself.
    pub fn merge(
        &self,
        incoming: &VerificationType,
        hierarchy: &dyn ClassHierarchy,
    ) -> Result<VerificationType, VerifierError> {
        if self == incoming {
            return Ok(self.clone());
        }

        match (self.is_uninitialized(), incoming.is_uninitialized()) {
            (true, true) => Err(VerifierError::rejected(format!(
                "Cannot merge different uninitialized objects in the local variables ({} and {})",
                self, incoming
            ))),
            (true, false) | (false, true) => Ok(self
                .initialization_of(incoming)
                .unwrap_or(VerificationType::Unknown)),
            (false, false) => VerificationType::merge_initialized(self, incoming, hierarchy),
        }
    }

    /// Merge a type flowing into a stack slot with the type already recorded there
    ///
    /// Unlike local variables, stack slots of different kinds cannot be merged into `Unknown`:
    /// there would be no way to ever pop them.
    pub fn merge_stack(
        &self,
        incoming: &VerificationType,
        hierarchy: &dyn ClassHierarchy,
    ) -> Result<VerificationType, VerifierError> {
        if self == incoming {
            return Ok(self.clone());
        }

        if self.is_uninitialized() || incoming.is_uninitialized() {
            return self.initialization_of(incoming).ok_or_else(|| {
                VerifierError::rejected(format!(
                    "Cannot merge an uninitialized object on the stack with a different type                      ({} and {})",
                    self, incoming
                ))
            });
        }

        match VerificationType::merge_initialized(self, incoming, hierarchy)? {
            VerificationType::Unknown => Err(VerifierError::rejected(format!(
                "Cannot merge stacks of different types: {} and {}",
                self, incoming
            ))),
            merged => Ok(merged),
        }
    }

    /// If one of the types is uninitialized and the other is its initialized form, the latter
    fn initialization_of(&self, other: &VerificationType) -> Option<VerificationType> {
        match (self, other) {
            (VerificationType::Uninitialized(..), VerificationType::Object(_))
                if &self.initialized() == other =>
            {
                Some(other.clone())
            }
            (VerificationType::Object(_), VerificationType::Uninitialized(..))
                if &other.initialized() == self =>
            {
                Some(self.clone())
            }
            _ => None,
        }
    }

    fn merge_initialized(
        recorded: &VerificationType,
        incoming: &VerificationType,
        hierarchy: &dyn ClassHierarchy,
    ) -> Result<VerificationType, VerifierError> {
        let merged = match (recorded, incoming) {
            _ if recorded == incoming => recorded.clone(),
            (VerificationType::Null, VerificationType::Object(_)) => incoming.clone(),
            (VerificationType::Object(_), VerificationType::Null) => recorded.clone(),
            (VerificationType::Object(type1), VerificationType::Object(type2)) => {
                let common = hierarchy.common_supertype(type1, type2).map_err(|err| {
                    VerifierError::internal(format!(
                        "No common supertype for {} and {}: {}",
                        class_operand(type1),
                        class_operand(type2),
                        err
                    ))
                })?;
                VerificationType::Object(common)
            }
            _ => VerificationType::Unknown,
        };
        log::trace!("Merged {} and {} into {}", recorded, incoming, merged);
        Ok(merged)
    }
}

impl Width for VerificationType {
    fn width(&self) -> usize {
        match self {
            VerificationType::Void => 0,
            VerificationType::Long | VerificationType::Double => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for VerificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationType::Void => f.write_str("void"),
            VerificationType::Integer => f.write_str("int"),
            VerificationType::Float => f.write_str("float"),
            VerificationType::Long => f.write_str("long"),
            VerificationType::Double => f.write_str("double"),
            VerificationType::Null => f.write_str("null"),
            VerificationType::Object(ref_type) => f.write_str(&class_operand(ref_type)),
            VerificationType::Uninitialized(class, UninitializedOrigin::This) => {
                write!(f, "uninitializedThis({})", class)
            }
            VerificationType::Uninitialized(class, UninitializedOrigin::New(index)) => {
                write!(f, "uninitialized({}, new at {})", class, index)
            }
            VerificationType::ReturnAddress(target) => write!(f, "returnAddress({})", target),
            VerificationType::Unknown => f.write_str("unknown"),
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::jvm::verifier::ClassStatus;
    use crate::jvm::{ArrayType, Error, Name, UnqualifiedName};

    /// Tiny hierarchy: `a/Animal` with subclasses `a/Cat` and `a/Dog`, everything else directly
    /// under `java/lang/Object`
    pub struct Animals;

    impl Animals {
        fn superclass(name: &BinaryName) -> Option<BinaryName> {
            match name.as_ref() {
                "java/lang/Object" => None,
                "a/Cat" | "a/Dog" => Some(BinaryName::from_string("a/Animal".to_string()).ok()?),
                _ => Some(BinaryName::OBJECT),
            }
        }

        fn chain(name: &BinaryName) -> Vec<BinaryName> {
            std::iter::successors(Some(name.clone()), Animals::superclass).collect()
        }
    }

    impl ClassHierarchy for Animals {
        fn is_assignable(
            &self,
            sub_type: &RefType<BinaryName>,
            super_type: &RefType<BinaryName>,
        ) -> Result<bool, Error> {
            Ok(match (sub_type, super_type) {
                (_, RefType::Object(sup)) if *sup == BinaryName::OBJECT => true,
                (RefType::Object(sub), RefType::Object(sup)) => Animals::chain(sub).contains(sup),
                (sub, sup) => sub == sup,
            })
        }

        fn common_supertype(
            &self,
            type1: &RefType<BinaryName>,
            type2: &RefType<BinaryName>,
        ) -> Result<RefType<BinaryName>, Error> {
            Ok(match (type1, type2) {
                (RefType::Object(cls1), RefType::Object(cls2)) => {
                    let chain2 = Animals::chain(cls2);
                    let common = Animals::chain(cls1)
                        .into_iter()
                        .find(|cls| chain2.contains(cls))
                        .unwrap_or(BinaryName::OBJECT);
                    RefType::Object(common)
                }
                _ if type1 == type2 => type1.clone(),
                _ => RefType::Object(BinaryName::OBJECT),
            })
        }

        fn is_interface(&self, _name: &BinaryName) -> Result<bool, Error> {
            Ok(false)
        }

        fn declares_field(
            &self,
            _class: &BinaryName,
            name: &UnqualifiedName,
            _descriptor: &FieldType<BinaryName>,
        ) -> Result<bool, Error> {
            Ok(name.as_ref() == "legs")
        }

        fn verify_class(&self, name: &BinaryName) -> Result<ClassStatus, Error> {
            if name.as_ref() == "a/Broken" {
                Ok(ClassStatus::Rejected("a/Broken extends a final class".to_string()))
            } else {
                Ok(ClassStatus::Verified)
            }
        }
    }

    pub fn class(name: &str) -> BinaryName {
        BinaryName::from_string(name.to_string()).unwrap()
    }

    fn obj(name: &str) -> VerificationType {
        VerificationType::object(class(name))
    }

    #[test]
    fn identical_types_merge_to_themselves() {
        for vtype in [
            VerificationType::Integer,
            VerificationType::Long,
            VerificationType::Null,
            obj("a/Cat"),
            VerificationType::ReturnAddress(InstructionIndex(4)),
            VerificationType::Uninitialized(class("a/Cat"), UninitializedOrigin::New(InstructionIndex(2))),
            VerificationType::Unknown,
        ] {
            assert_eq!(vtype.merge(&vtype, &Animals).unwrap(), vtype);
            assert_eq!(vtype.merge_stack(&vtype, &Animals).unwrap(), vtype);
        }
    }

    #[test]
    fn references_merge_to_common_supertype() {
        let merged = obj("a/Cat").merge(&obj("a/Dog"), &Animals).unwrap();
        assert_eq!(merged, obj("a/Animal"));
        let flipped = obj("a/Dog").merge(&obj("a/Cat"), &Animals).unwrap();
        assert_eq!(merged, flipped);

        assert_eq!(
            VerificationType::Null.merge(&obj("a/Cat"), &Animals).unwrap(),
            obj("a/Cat")
        );
        assert_eq!(
            obj("a/Cat").merge(&VerificationType::Null, &Animals).unwrap(),
            obj("a/Cat")
        );

        let int_array = VerificationType::Object(RefType::PrimitiveArray(ArrayType {
            additional_dimensions: 0,
            element_type: BaseType::Int,
        }));
        assert_eq!(
            int_array.merge_stack(&obj("a/Cat"), &Animals).unwrap(),
            obj("java/lang/Object")
        );
    }

    #[test]
    fn mismatches_become_unknown_in_locals() {
        let cases = [
            (VerificationType::Integer, VerificationType::Float),
            (VerificationType::Long, VerificationType::Double),
            (VerificationType::Integer, obj("a/Cat")),
            (
                VerificationType::ReturnAddress(InstructionIndex(3)),
                VerificationType::ReturnAddress(InstructionIndex(9)),
            ),
            (VerificationType::ReturnAddress(InstructionIndex(3)), VerificationType::Null),
        ];
        for (a, b) in cases {
            assert_eq!(a.merge(&b, &Animals).unwrap(), VerificationType::Unknown);
            assert_eq!(b.merge(&a, &Animals).unwrap(), VerificationType::Unknown);
            assert!(matches!(a.merge_stack(&b, &Animals), Err(VerifierError::Rejected(_))));
        }
    }

    #[test]
    fn uninitialized_objects() {
        let new_cat =
            VerificationType::Uninitialized(class("a/Cat"), UninitializedOrigin::New(InstructionIndex(1)));
        let other_new_cat =
            VerificationType::Uninitialized(class("a/Cat"), UninitializedOrigin::New(InstructionIndex(5)));

        // Initialized along one of the paths, in either order
        assert_eq!(new_cat.merge(&obj("a/Cat"), &Animals).unwrap(), obj("a/Cat"));
        assert_eq!(obj("a/Cat").merge(&new_cat, &Animals).unwrap(), obj("a/Cat"));
        assert_eq!(new_cat.merge_stack(&obj("a/Cat"), &Animals).unwrap(), obj("a/Cat"));
        assert_eq!(obj("a/Cat").merge_stack(&new_cat, &Animals).unwrap(), obj("a/Cat"));

        // Anything else
        for other in [obj("a/Dog"), VerificationType::Unknown, VerificationType::Null] {
            assert_eq!(new_cat.merge(&other, &Animals).unwrap(), VerificationType::Unknown);
            assert_eq!(other.merge(&new_cat, &Animals).unwrap(), VerificationType::Unknown);
            assert!(matches!(
                new_cat.merge_stack(&other, &Animals),
                Err(VerifierError::Rejected(_))
            ));
            assert!(matches!(
                other.merge_stack(&new_cat, &Animals),
                Err(VerifierError::Rejected(_))
            ));
        }

        // Different allocations
        assert!(matches!(new_cat.merge(&other_new_cat, &Animals), Err(VerifierError::Rejected(_))));
        assert!(matches!(other_new_cat.merge(&new_cat, &Animals), Err(VerifierError::Rejected(_))));
        assert!(matches!(
            new_cat.merge_stack(&other_new_cat, &Animals),
            Err(VerifierError::Rejected(_))
        ));
    }

    #[test]
    fn field_types_normalize() {
        assert_eq!(
            VerificationType::from_field_type(&FieldType::boolean()),
            VerificationType::Integer
        );
        assert_eq!(
            VerificationType::from_field_type(&FieldType::char()),
            VerificationType::Integer
        );
        assert_eq!(VerificationType::from_return_type(&None), VerificationType::Void);
        assert_eq!(VerificationType::Double.width(), 2);
        assert_eq!(VerificationType::Void.width(), 0);
        assert_eq!(obj("a/Cat").to_string(), "a/Cat");
    }
}
