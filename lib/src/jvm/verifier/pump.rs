//! The data-flow fix-point
//!
//! Starting from the frame at the method entry, instructions are executed symbolically and the
//! frames they produce are propagated to their successors. Whenever the frame recorded at an
//! instruction changes (because a new path reached it with different types), the instruction is
//! executed again. Since merging only ever generalizes types, this terminates.
//!
//! Frames are recorded per [`SubroutineContext`], so the code of a subroutine is analyzed
//! separately for every `jsr` calling it. The `ret` at the end of a subroutine then knows exactly
//! which caller it returns to.

use super::checker::check;
use super::simulator::simulate;
use super::{
    ClassHierarchy, ControlFlowGraph, ExecutionChain, Frame, MethodSignature, OperandStack,
    Settings, SubroutineContext, UninitializedOrigin, VerificationType, VerifierError,
};
use crate::jvm::code::{class_operand, Instruction, InstructionIndex, MethodBody};
use crate::jvm::BinaryName;
use crate::util::Width;
use std::collections::VecDeque;

/// Fixed inputs to the analysis of one method
pub struct Environment<'a> {
    pub signature: &'a MethodSignature,
    pub hierarchy: &'a dyn ClassHierarchy,
    pub settings: &'a Settings,
}

/// Mutable state of the analysis that isn't part of any frame
#[derive(Clone, Debug)]
pub struct RunState {
    /// Has a constructor been invoked on `this`, along any path?
    ///
    /// Only ever `false` inside constructors.
    pub this_initialized: bool,
}

/// Result of running the data-flow analysis to completion
#[derive(Debug)]
pub struct PumpOutcome {
    pub graph: ControlFlowGraph,
    pub advisories: Vec<String>,
    pub steps: usize,
}

/// Worklist driving the analysis
struct Pump<'a> {
    env: Environment<'a>,
    body: &'a MethodBody,
    graph: ControlFlowGraph,
    state: RunState,

    /// Instructions whose out frame changed, along with the chain of instructions executed to
    /// reach them (not including themselves)
    queue: VecDeque<(InstructionIndex, ExecutionChain)>,
    steps: usize,
}

/// Run the analysis of a method body to its fix-point
pub fn run(env: Environment, body: &MethodBody) -> Result<PumpOutcome, VerifierError> {
    let graph = ControlFlowGraph::new(body, env.settings)?;
    let entry_frame = entry_frame(env.signature, body)?;
    let state = RunState {
        this_initialized: !this_starts_uninitialized(env.signature),
    };
    let mut pump = Pump {
        env,
        body,
        graph,
        state,
        queue: VecDeque::new(),
        steps: 0,
    };

    pump.execute(InstructionIndex(0), ExecutionChain::new(), entry_frame)?;
    while let Some((index, chain)) = pump.queue.pop_front() {
        pump.steps += 1;
        if let Some(max) = pump.env.settings.max_pump_iterations {
            if pump.steps > max {
                return Err(VerifierError::internal(format!(
                    "Gave up after {} iterations of the data-flow analysis",
                    max
                )));
            }
        }
        pump.propagate(index, chain)?;
    }
    log::debug!(
        "Data-flow analysis of {} converged after {} steps",
        pump.env.signature,
        pump.steps
    );

    let advisories = pump.check_returns()?;
    Ok(PumpOutcome {
        graph: pump.graph,
        advisories,
        steps: pump.steps,
    })
}

/// Only constructors of classes other than `Object` start with an uninitialized `this`
fn this_starts_uninitialized(signature: &MethodSignature) -> bool {
    signature.is_constructor() && signature.class != BinaryName::OBJECT
}

/// Frame at the start of the method: `this` and the parameters in the locals, empty stack
pub fn entry_frame(signature: &MethodSignature, body: &MethodBody) -> Result<Frame, VerifierError> {
    let max_locals = body.max_locals as usize;
    let needed = signature.descriptor.parameter_length(!signature.is_static);
    if needed > max_locals {
        return Err(VerifierError::rejected(format!(
            "The parameters of {} need {} local variable slot(s), but max_locals is only {}",
            signature, needed, max_locals
        )));
    }

    let mut frame = Frame::new(max_locals, body.max_stack as usize);
    let mut local = 0;
    if !signature.is_static {
        let this = if this_starts_uninitialized(signature) {
            VerificationType::Uninitialized(signature.class.clone(), UninitializedOrigin::This)
        } else {
            VerificationType::object(signature.class.clone())
        };
        frame.locals.set(local, this)?;
        local += 1;
    }
    for parameter in &signature.descriptor.parameters {
        let vtype = VerificationType::from_field_type(parameter);
        let width = vtype.width();
        frame.locals.set(local, vtype)?;
        local += width;
    }
    Ok(frame)
}

impl<'a> Pump<'a> {
    fn instruction(&self, index: InstructionIndex) -> Result<&'a Instruction, VerifierError> {
        self.body.get(index).ok_or_else(|| {
            VerifierError::internal(format!("No instruction at {} in the method body", index))
        })
    }

    /// Leader of the subroutine that a context says we are in
    fn context_leader(&self, context: SubroutineContext) -> Result<InstructionIndex, VerifierError> {
        match context {
            None => Ok(self.graph.subroutines().top_level().leader),
            Some(jsr) => match self.instruction(jsr)? {
                Instruction::Jsr(target) => Ok(*target),
                other => Err(VerifierError::internal(format!(
                    "Subroutine context {} is not a jsr but `{}`",
                    jsr, other
                ))),
            },
        }
    }

    /// Record a frame arriving at an instruction, and execute the instruction if that changed
    /// its in frame
    ///
    /// `chain` is the path leading up to the instruction (not including it).
    fn execute(
        &mut self,
        index: InstructionIndex,
        chain: ExecutionChain,
        incoming: Frame,
    ) -> Result<(), VerifierError> {
        let instruction = self.instruction(index)?;
        let context = chain.context();
        let located = |err: VerifierError, frame: &Frame| {
            let mut path = chain.path();
            path.push(index);
            err.map_diagnostic(|diagnostic| {
                diagnostic
                    .at(index, instruction)
                    .with_frame(frame)
                    .with_path(path)
            })
        };

        let owner = self
            .graph
            .subroutines()
            .subroutine_of(index)
            .map(|subroutine| subroutine.leader);
        let expected = self.context_leader(context)?;
        if owner != Some(expected) {
            return Err(VerifierError::internal(format!(
                "Instruction {} reached in the context of the subroutine at {}, but it belongs \
                 to {:?}",
                index, expected, owner
            )));
        }

        let hierarchy = self.env.hierarchy;
        let node = self.graph.context_of_mut(index)?;
        let changed = match node.record_in_frame(context, incoming.clone(), hierarchy) {
            Ok(changed) => changed,
            Err(err) => return Err(located(err, &incoming)),
        };
        if !changed {
            return Ok(());
        }
        let in_frame = match node.in_frame(context) {
            Some(frame) => frame.clone(),
            None => {
                return Err(VerifierError::internal(format!(
                    "No in frame recorded at {} after merging",
                    index
                )))
            }
        };

        if let Err(err) = check(instruction, &in_frame, &self.env, &self.state) {
            return Err(located(err, &in_frame));
        }
        let mut out_frame = in_frame.clone();
        if let Err(err) = simulate(index, instruction, &mut out_frame, &mut self.state) {
            return Err(located(err, &in_frame));
        }
        log::trace!("{} `{}` in context {:?}: {}", index, instruction, context, out_frame);

        self.graph.context_of_mut(index)?.set_out_frame(context, out_frame);
        self.queue.push_back((index, chain));
        Ok(())
    }

    /// Push the out frame of an executed instruction to its successors and handlers
    fn propagate(
        &mut self,
        index: InstructionIndex,
        chain: ExecutionChain,
    ) -> Result<(), VerifierError> {
        let instruction = self.instruction(index)?;
        let context = chain.context();
        let node = self.graph.context_of(index)?;
        let out_frame = node.out_frame(context).cloned().ok_or_else(|| {
            VerifierError::internal(format!(
                "Instruction {} was queued without being executed in context {:?}",
                index, context
            ))
        })?;
        let handlers = node.handlers().to_vec();
        let successors = match instruction {
            Instruction::Ret(local) => vec![self.ret_target(index, *local, context, &out_frame)?],
            _ => node.successors().to_vec(),
        };

        if let Some(location) = Pump::uninitialized_on_backwards_branch(&out_frame) {
            if let Some(target) = successors.iter().find(|successor| **successor <= index) {
                let mut path = chain.path();
                path.push(index);
                return Err(VerifierError::rejected(format!(
                    "Backwards branch to {} with an uninitialized object {} detected",
                    target, location
                ))
                .map_diagnostic(|diagnostic| {
                    diagnostic
                        .at(index, instruction)
                        .with_frame(&out_frame)
                        .with_path(path)
                }));
            }
        }

        let next_chain = chain.extend(index, instruction)?;
        for successor in successors {
            self.execute(successor, next_chain.clone(), out_frame.clone())?;
        }

        // The stack is cleared and holds only the exception, the locals are kept
        for handler in handlers {
            let mut stack = OperandStack::new(out_frame.stack.max_stack());
            stack.push(VerificationType::Object(handler.caught_type()))?;
            let frame = Frame {
                locals: out_frame.locals.clone(),
                stack,
            };
            self.execute(handler.handler, ExecutionChain::new(), frame)?;
        }
        Ok(())
    }

    /// Where an uninitialized object sits in a frame, if there is one
    fn uninitialized_on_backwards_branch(frame: &Frame) -> Option<&'static str> {
        if frame.locals_hold_uninitialized() {
            Some("in the local variables")
        } else if frame.stack_holds_uninitialized() {
            Some("on the stack")
        } else {
            None
        }
    }

    /// Where a `ret` returns to, given the context it executes in
    fn ret_target(
        &self,
        index: InstructionIndex,
        local: u16,
        context: SubroutineContext,
        out_frame: &Frame,
    ) -> Result<InstructionIndex, VerifierError> {
        let target = match out_frame.locals.get(local as usize)? {
            VerificationType::ReturnAddress(target) => *target,
            other => {
                return Err(VerifierError::internal(format!(
                    "The ret at {} found {} instead of a return address",
                    index, other
                )))
            }
        };
        match context {
            Some(jsr) if jsr.next() == target => Ok(target),
            _ => Err(VerifierError::internal(format!(
                "The ret at {} would return to {}, which does not follow the jsr of its context \
                 {:?}",
                index, target, context
            ))),
        }
    }

    /// Check what every reachable return instruction actually returns
    ///
    /// Returns advisories about uninitialized objects left behind.
    fn check_returns(&self) -> Result<Vec<String>, VerifierError> {
        let signature = self.env.signature;
        let declared = VerificationType::from_return_type(&signature.descriptor.return_type);
        let mut advisories = vec![];

        for node in self.graph.nodes() {
            let instruction = self.instruction(node.index)?;
            if !instruction.is_return() {
                continue;
            }
            for context in node.contexts() {
                let (in_frame, out_frame) = match (node.in_frame(context), node.out_frame(context))
                {
                    (Some(in_frame), Some(out_frame)) => (in_frame, out_frame),
                    _ => continue,
                };

                if self.env.settings.warn_uninitialized_at_return {
                    if out_frame.locals_hold_uninitialized() {
                        let advisory = format!(
                            "Instruction {} `{}` may leave {} with an uninitialized object in \
                             the local variables: {}",
                            node.index, instruction, signature, out_frame.locals
                        );
                        log::warn!("{}", advisory);
                        advisories.push(advisory);
                    }
                    if out_frame.stack_holds_uninitialized() {
                        let advisory = format!(
                            "Instruction {} `{}` may leave {} with an uninitialized object on \
                             the operand stack: {}",
                            node.index, instruction, signature, out_frame.stack
                        );
                        log::warn!("{}", advisory);
                        advisories.push(advisory);
                    }
                }

                let returned = match instruction {
                    Instruction::Return => VerificationType::Void,
                    _ => in_frame.stack.peek(0)?.clone(),
                };
                if !self.returns_compatible(&returned, &declared)? {
                    return Err(VerifierError::rejected(format!(
                        "Returned type {} does not match the return type {} of the method",
                        returned, declared
                    ))
                    .map_diagnostic(|diagnostic| {
                        diagnostic.at(node.index, instruction).with_frame(in_frame)
                    }));
                }
            }
        }
        Ok(advisories)
    }

    fn returns_compatible(
        &self,
        returned: &VerificationType,
        declared: &VerificationType,
    ) -> Result<bool, VerifierError> {
        match (returned, declared) {
            (VerificationType::Null, VerificationType::Object(_)) => Ok(true),
            (VerificationType::Object(returned), VerificationType::Object(declared)) => {
                let assignable = self.env.hierarchy.is_assignable(returned, declared)?;
                if !assignable {
                    log::debug!(
                        "{} is not assignable to {}",
                        class_operand(returned),
                        class_operand(declared)
                    );
                }
                Ok(assignable)
            }
            _ => Ok(returned == declared),
        }
    }
}
