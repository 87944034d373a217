use crate::jvm::code::InstructionIndex;
use crate::jvm;
use std::fmt;
use thiserror::Error;

/// Why a method was rejected, and where
///
/// Diagnostics are built from the inside out: the check that fails only knows the reason, the
/// worklist knows the instruction, frame, and execution path, and the entry point knows the
/// method. Each layer fills in what it knows without overwriting what is already there.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    /// Offending instruction
    pub index: Option<InstructionIndex>,

    /// Rendering of the offending instruction
    pub instruction: Option<String>,

    pub reason: String,

    /// Instructions executed from the start of the method to reach the offending one
    pub path: Vec<InstructionIndex>,

    /// Frame on entry to the offending instruction
    pub frame: Option<String>,

    /// Extra lines appended by outer layers
    pub context: Vec<String>,
}

impl Diagnostic {
    pub fn new(reason: impl Into<String>) -> Diagnostic {
        Diagnostic {
            index: None,
            instruction: None,
            reason: reason.into(),
            path: vec![],
            frame: None,
            context: vec![],
        }
    }

    /// Attach the offending instruction, unless one is already known
    pub fn at(mut self, index: InstructionIndex, instruction: impl fmt::Display) -> Diagnostic {
        if self.index.is_none() {
            self.index = Some(index);
            self.instruction = Some(instruction.to_string());
        }
        self
    }

    pub fn with_frame(mut self, frame: impl fmt::Display) -> Diagnostic {
        if self.frame.is_none() {
            self.frame = Some(frame.to_string());
        }
        self
    }

    pub fn with_path(mut self, path: Vec<InstructionIndex>) -> Diagnostic {
        if self.path.is_empty() {
            self.path = path;
        }
        self
    }

    /// Append a line of context
    pub fn extend(&mut self, line: impl Into<String>) {
        self.context.push(line.into());
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.index, &self.instruction) {
            (Some(index), Some(instruction)) => {
                write!(f, "Instruction {} `{}`: {}", index, instruction, self.reason)?
            }
            _ => f.write_str(&self.reason)?,
        }
        if !self.path.is_empty() {
            f.write_str("\n  Execution path:")?;
            for index in &self.path {
                write!(f, " {}", index)?;
            }
        }
        if let Some(frame) = &self.frame {
            f.write_str("\n  Frame:")?;
            for line in frame.lines() {
                write!(f, "\n    {}", line)?;
            }
        }
        for line in &self.context {
            write!(f, "\n  {}", line)?;
        }
        Ok(())
    }
}

/// Verification failure
///
/// Lookup failures from the class hierarchy (missing or unreadable classes) surface as
/// `Internal`: by the time a method body gets verified, everything it refers to should be
/// resolvable.
#[derive(Debug, Error)]
pub enum VerifierError {
    /// The method is not type-safe
    #[error("{0}")]
    Rejected(Diagnostic),

    /// An assumption of the verifier itself does not hold
    #[error("Internal error: {0}")]
    Internal(String),
}

impl VerifierError {
    pub fn rejected(reason: impl Into<String>) -> VerifierError {
        VerifierError::Rejected(Diagnostic::new(reason))
    }

    pub fn internal(message: impl Into<String>) -> VerifierError {
        VerifierError::Internal(message.into())
    }

    /// Update the diagnostic of a rejection (internal errors are left alone)
    pub fn map_diagnostic(self, update: impl FnOnce(Diagnostic) -> Diagnostic) -> VerifierError {
        match self {
            VerifierError::Rejected(diagnostic) => VerifierError::Rejected(update(diagnostic)),
            internal => internal,
        }
    }

    /// Append a line of context, whatever the kind of error
    pub fn extend(self, line: impl Into<String>) -> VerifierError {
        match self {
            VerifierError::Rejected(mut diagnostic) => {
                diagnostic.extend(line);
                VerifierError::Rejected(diagnostic)
            }
            VerifierError::Internal(message) => {
                VerifierError::Internal(format!("{}\n  {}", message, line.into()))
            }
        }
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, VerifierError::Rejected(_))
    }
}

impl From<jvm::Error> for VerifierError {
    fn from(err: jvm::Error) -> VerifierError {
        VerifierError::Internal(err.to_string())
    }
}
