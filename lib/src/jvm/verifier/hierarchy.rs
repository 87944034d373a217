use crate::jvm::{BinaryName, Error, FieldType, RefType, UnqualifiedName};

/// Everything the verifier needs to know about classes other than the method being verified
///
/// Implementations are expected to load classes lazily and memoize the results of
/// [`ClassHierarchy::verify_class`]: the verifier calls it every time an instruction refers to a
/// class.
pub trait ClassHierarchy {
    /// Can a value of type `sub_type` be used where `super_type` is expected?
    fn is_assignable(
        &self,
        sub_type: &RefType<BinaryName>,
        super_type: &RefType<BinaryName>,
    ) -> Result<bool, Error>;

    /// Nearest common supertype, used when merging two reference types
    fn common_supertype(
        &self,
        type1: &RefType<BinaryName>,
        type2: &RefType<BinaryName>,
    ) -> Result<RefType<BinaryName>, Error>;

    fn is_interface(&self, name: &BinaryName) -> Result<bool, Error>;

    fn is_throwable(&self, ref_type: &RefType<BinaryName>) -> Result<bool, Error> {
        self.is_assignable(ref_type, &RefType::Object(BinaryName::THROWABLE))
    }

    /// Does the class itself (not a superclass) declare this field?
    fn declares_field(
        &self,
        class: &BinaryName,
        name: &UnqualifiedName,
        descriptor: &FieldType<BinaryName>,
    ) -> Result<bool, Error>;

    /// Load the class and run the class-level checks on it
    ///
    /// `Err` is for classes that cannot be found or read at all. A class that can be read but is
    /// malformed is `Ok(ClassStatus::Rejected(..))`.
    fn verify_class(&self, name: &BinaryName) -> Result<ClassStatus, Error>;
}

/// Outcome of the class-level checks on a referenced class
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClassStatus {
    Verified,
    Rejected(String),
}
