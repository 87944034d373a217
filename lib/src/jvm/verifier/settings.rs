/// Knobs for the method verifier
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// Reject methods in which an instruction belonging to a subroutine is covered by an
    /// exception handler
    pub forbid_protected_subroutines: bool,

    /// Report (but don't reject) return instructions that may leave an uninitialized object
    /// behind in the frame
    pub warn_uninitialized_at_return: bool,

    /// Give up with an internal error after this many worklist steps
    pub max_pump_iterations: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            forbid_protected_subroutines: true,
            warn_uninitialized_at_return: true,
            max_pump_iterations: None,
        }
    }
}
