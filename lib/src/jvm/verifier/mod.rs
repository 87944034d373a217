//! Data-flow verification of method bodies
//!
//! For any specific instruction inside a method body, the stack and locals must have the same
//! structure regardless of which control flow was used to reach that instruction. Although the
//! values in the stack and locals may differ, their types (as far as the verifier can tell, see
//! [`VerificationType`]) have to line up. The set of such types at one point is a [`Frame`].
//!
//! Verification is a fix-point computation over those frames:
//!
//!   1. [`ExceptionHandlers`] figure out which handlers protect which instructions
//!   2. [`Subroutines`] partition the body into `jsr`/`ret` subroutines and the top level, and
//!      reject subroutines that are shared, recursive, or left through a wrong `ret`
//!   3. [`ControlFlowGraph`] holds the successors of every instruction and the frames recorded
//!      at it, separately for every subroutine context
//!   4. the pump executes instructions symbolically (first checking that they _can_ execute in
//!      the frame they see, then computing their effect) until no frame changes any more
//!   5. finally, every reachable return instruction is checked against the method's return type
//!
//! Anything the verifier needs to know about other classes comes from a [`ClassHierarchy`].
//!
//! Outcomes are either a [`VerifiedMethod`] (with the converged frames), a rejection with a
//! [`Diagnostic`] pointing at the offending instruction, or an internal error when one of the
//! verifier's own assumptions fails.

mod checker;
mod control_flow;
mod errors;
mod frame;
mod handlers;
mod hierarchy;
mod pump;
mod settings;
mod simulator;
mod subroutines;
mod types;

pub use control_flow::*;
pub use errors::*;
pub use frame::*;
pub use handlers::*;
pub use hierarchy::*;
pub use settings::*;
pub use subroutines::*;
pub use types::*;

use crate::jvm::code::{InstructionIndex, MethodBody};
use crate::jvm::{BinaryName, MethodDescriptor, RenderDescriptor, UnqualifiedName};
use pump::{Environment, PumpOutcome};
use std::fmt;

/// Identity of the method being verified
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodSignature {
    /// Class declaring the method
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor<BinaryName>,
    pub is_static: bool,
}

impl MethodSignature {
    pub fn is_constructor(&self) -> bool {
        self.name == UnqualifiedName::INIT
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}{}",
            self.class,
            self.name,
            self.descriptor.render()
        )
    }
}

/// Method that passed verification, along with everything the analysis learned about it
#[derive(Debug)]
pub struct VerifiedMethod {
    signature: MethodSignature,
    outcome: PumpOutcome,
}

impl VerifiedMethod {
    pub fn signature(&self) -> &MethodSignature {
        &self.signature
    }

    /// Frame in which an instruction executes in some subroutine context
    pub fn in_frame(&self, index: InstructionIndex, context: SubroutineContext) -> Option<&Frame> {
        self.outcome.graph.context_of(index).ok()?.in_frame(context)
    }

    /// Frame after an instruction has executed in some subroutine context
    pub fn out_frame(&self, index: InstructionIndex, context: SubroutineContext) -> Option<&Frame> {
        self.outcome.graph.context_of(index).ok()?.out_frame(context)
    }

    /// Every in frame recorded for an instruction, by context
    ///
    /// Empty for unreachable instructions.
    pub fn frames_at(&self, index: InstructionIndex) -> Vec<(SubroutineContext, &Frame)> {
        match self.outcome.graph.context_of(index) {
            Ok(node) => node
                .contexts()
                .filter_map(|context| Some((context, node.in_frame(context)?)))
                .collect(),
            Err(_) => vec![],
        }
    }

    /// Non-fatal warnings about the method
    pub fn advisories(&self) -> &[String] {
        &self.outcome.advisories
    }

    /// How many worklist steps the analysis took
    pub fn pump_steps(&self) -> usize {
        self.outcome.steps
    }

    pub fn subroutines(&self) -> &Subroutines {
        self.outcome.graph.subroutines()
    }
}

/// Final outcome of verifying a method
#[derive(Debug)]
pub enum Verdict {
    Verified(VerifiedMethod),

    /// The method is not type-safe
    Rejected(String),

    /// The verifier could not reach a conclusion
    InternalError(String),
}

impl Verdict {
    pub fn is_verified(&self) -> bool {
        matches!(self, Verdict::Verified(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Verdict::Rejected(_))
    }
}

impl From<Result<VerifiedMethod, VerifierError>> for Verdict {
    fn from(result: Result<VerifiedMethod, VerifierError>) -> Verdict {
        match result {
            Ok(verified) => Verdict::Verified(verified),
            Err(err @ VerifierError::Rejected(_)) => Verdict::Rejected(err.to_string()),
            Err(VerifierError::Internal(message)) => Verdict::InternalError(message),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Verified(_) => f.write_str("VERIFIED"),
            Verdict::Rejected(message) => write!(f, "REJECTED: {}", message),
            Verdict::InternalError(message) => write!(f, "INTERNAL ERROR: {}", message),
        }
    }
}

/// Verify a method body, keeping the structured error on failure
pub fn try_verify_method(
    signature: &MethodSignature,
    body: &MethodBody,
    hierarchy: &dyn ClassHierarchy,
    settings: &Settings,
) -> Result<VerifiedMethod, VerifierError> {
    log::debug!("Verifying {}", signature);
    let context_line = format!("While verifying method {}", signature);

    if let Err(err) = body.validate() {
        return Err(VerifierError::rejected(err.to_string()).extend(context_line));
    }

    let env = Environment {
        signature,
        hierarchy,
        settings,
    };
    match pump::run(env, body) {
        Ok(outcome) => Ok(VerifiedMethod {
            signature: signature.clone(),
            outcome,
        }),
        Err(err) => {
            log::debug!("Verification of {} failed: {}", signature, err);
            Err(err.extend(context_line))
        }
    }
}

/// Verify a method body
pub fn verify_method(
    signature: &MethodSignature,
    body: &MethodBody,
    hierarchy: &dyn ClassHierarchy,
    settings: &Settings,
) -> Verdict {
    Verdict::from(try_verify_method(signature, body, hierarchy, settings))
}
