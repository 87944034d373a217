use super::{
    ClassHierarchy, ExceptionHandler, ExceptionHandlers, Frame, Settings, Subroutines,
    VerifierError,
};
use crate::jvm::code::{Instruction, InstructionIndex, MethodBody};
use std::collections::BTreeMap;
use std::rc::Rc;

/// Subroutine context in which an instruction executes
///
/// This is the `jsr` which entered the innermost active subroutine, or `None` at the top level.
/// Frames are tracked separately per context, so that a subroutine called from two different
/// places does not mix up the states of its callers.
pub type SubroutineContext = Option<InstructionIndex>;

/// Path of instructions executed to reach some point
///
/// Chains are persistent: extending one shares the existing prefix, so handing chains to every
/// successor is cheap.
#[derive(Clone, Debug, Default)]
pub struct ExecutionChain {
    path: Option<Rc<PathNode>>,

    /// `jsr` instructions not yet matched by a `ret`, innermost first
    calls: Option<Rc<CallNode>>,
}

#[derive(Debug)]
struct PathNode {
    index: InstructionIndex,
    previous: Option<Rc<PathNode>>,
}

#[derive(Debug)]
struct CallNode {
    jsr: InstructionIndex,
    caller: Option<Rc<CallNode>>,
}

impl ExecutionChain {
    /// Chain of nothing, at the top level
    pub fn new() -> ExecutionChain {
        ExecutionChain::default()
    }

    pub fn context(&self) -> SubroutineContext {
        self.calls.as_ref().map(|call| call.jsr)
    }

    /// Chain after also executing the given instruction
    pub fn extend(
        &self,
        index: InstructionIndex,
        instruction: &Instruction,
    ) -> Result<ExecutionChain, VerifierError> {
        let calls = match instruction {
            Instruction::Jsr(_) => Some(Rc::new(CallNode {
                jsr: index,
                caller: self.calls.clone(),
            })),
            Instruction::Ret(_) => match &self.calls {
                Some(call) => call.caller.clone(),
                None => {
                    return Err(VerifierError::internal(format!(
                        "The ret at {} has no jsr before it in the execution chain",
                        index
                    )))
                }
            },
            _ => self.calls.clone(),
        };
        Ok(ExecutionChain {
            path: Some(Rc::new(PathNode {
                index,
                previous: self.path.clone(),
            })),
            calls,
        })
    }

    /// Instructions executed, from the method entry onwards
    pub fn path(&self) -> Vec<InstructionIndex> {
        let mut path = vec![];
        let mut node = self.path.as_deref();
        while let Some(PathNode { index, previous }) = node {
            path.push(*index);
            node = previous.as_deref();
        }
        path.reverse();
        path
    }

}

/// Control flow information and converging frames for one instruction
#[derive(Debug)]
pub struct InstructionNode {
    pub index: InstructionIndex,

    /// Static successors
    ///
    /// For `jsr` this is the subroutine, not the next instruction. For `ret` this is empty: where
    /// it returns to depends on the execution chain.
    successors: Vec<InstructionIndex>,

    handlers: Vec<ExceptionHandler>,

    in_frames: BTreeMap<SubroutineContext, Frame>,
    out_frames: BTreeMap<SubroutineContext, Frame>,
}

impl InstructionNode {
    pub fn successors(&self) -> &[InstructionIndex] {
        &self.successors
    }

    /// Exception handlers protecting this instruction
    pub fn handlers(&self) -> &[ExceptionHandler] {
        &self.handlers
    }

    pub fn in_frame(&self, context: SubroutineContext) -> Option<&Frame> {
        self.in_frames.get(&context)
    }

    pub fn out_frame(&self, context: SubroutineContext) -> Option<&Frame> {
        self.out_frames.get(&context)
    }

    /// Contexts in which the instruction has been reached
    pub fn contexts(&self) -> impl Iterator<Item = SubroutineContext> + '_ {
        self.in_frames.keys().copied()
    }

    /// Record a frame arriving at this instruction, merging it with whatever was recorded before
    /// in the same context
    ///
    /// Returns whether the recorded frame changed (and so the instruction needs to be executed
    /// again).
    pub fn record_in_frame(
        &mut self,
        context: SubroutineContext,
        incoming: Frame,
        hierarchy: &dyn ClassHierarchy,
    ) -> Result<bool, VerifierError> {
        match self.in_frames.get_mut(&context) {
            None => {
                self.in_frames.insert(context, incoming);
                Ok(true)
            }
            Some(recorded) if *recorded == incoming => Ok(false),
            Some(recorded) => recorded.merge(&incoming, hierarchy),
        }
    }

    pub fn set_out_frame(&mut self, context: SubroutineContext, frame: Frame) {
        self.out_frames.insert(context, frame);
    }
}

/// Control flow graph of a method body
///
/// One node per instruction. Nodes for instructions which are in no subroutine (because they
/// are unreachable) are still present, but are never executed.
#[derive(Debug)]
pub struct ControlFlowGraph {
    nodes: Vec<InstructionNode>,
    subroutines: Subroutines,
}

impl ControlFlowGraph {
    pub fn new(body: &MethodBody, settings: &Settings) -> Result<ControlFlowGraph, VerifierError> {
        let handlers = ExceptionHandlers::new(body);
        let subroutines = Subroutines::new(body, &handlers, settings)?;

        let nodes = body
            .iter()
            .map(|(index, instruction)| InstructionNode {
                index,
                successors: ControlFlowGraph::static_successors(index, instruction),
                handlers: handlers.handlers_of(index).to_vec(),
                in_frames: BTreeMap::new(),
                out_frames: BTreeMap::new(),
            })
            .collect();

        Ok(ControlFlowGraph { nodes, subroutines })
    }

    fn static_successors(index: InstructionIndex, instruction: &Instruction) -> Vec<InstructionIndex> {
        match instruction {
            Instruction::Jsr(target) => vec![*target],
            Instruction::Ret(_) => vec![],
            _ => {
                let mut successors = vec![];
                if instruction.falls_through() {
                    successors.push(index.next());
                }
                for target in instruction.branch_targets() {
                    if !successors.contains(&target) {
                        successors.push(target);
                    }
                }
                successors
            }
        }
    }

    pub fn context_of(&self, index: InstructionIndex) -> Result<&InstructionNode, VerifierError> {
        self.nodes.get(index.0).ok_or_else(|| {
            VerifierError::internal(format!("No instruction at {} in the control flow graph", index))
        })
    }

    pub fn context_of_mut(
        &mut self,
        index: InstructionIndex,
    ) -> Result<&mut InstructionNode, VerifierError> {
        self.nodes.get_mut(index.0).ok_or_else(|| {
            VerifierError::internal(format!("No instruction at {} in the control flow graph", index))
        })
    }

    /// Nodes for several instructions at once
    pub fn contexts_of(
        &self,
        indices: &[InstructionIndex],
    ) -> Result<Vec<&InstructionNode>, VerifierError> {
        indices.iter().map(|index| self.context_of(*index)).collect()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &InstructionNode> {
        self.nodes.iter()
    }

    /// Is the instruction unreachable (part of no subroutine, not even the top level)?
    pub fn is_dead(&self, index: InstructionIndex) -> bool {
        self.subroutines.subroutine_of(index).is_none()
    }

    pub fn subroutines(&self) -> &Subroutines {
        &self.subroutines
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::OrdComparison;

    #[test]
    fn chains() {
        let top = ExecutionChain::new();
        assert_eq!(top.context(), None);
        assert!(top.path().is_empty());

        let jsr = Instruction::Jsr(InstructionIndex(5));
        let ret = Instruction::Ret(1);
        let chain = top
            .extend(InstructionIndex(0), &Instruction::Nop)
            .and_then(|c| c.extend(InstructionIndex(1), &jsr))
            .unwrap();
        assert_eq!(chain.context(), Some(InstructionIndex(1)));

        let nested = chain
            .extend(InstructionIndex(5), &Instruction::AStore(1))
            .and_then(|c| c.extend(InstructionIndex(6), &jsr))
            .unwrap();
        assert_eq!(nested.context(), Some(InstructionIndex(6)));

        let returned = nested.extend(InstructionIndex(9), &ret).unwrap();
        assert_eq!(returned.context(), Some(InstructionIndex(1)));
        let returned = returned.extend(InstructionIndex(10), &ret).unwrap();
        assert_eq!(returned.context(), None);
        assert_eq!(
            returned.path(),
            [0, 1, 5, 6, 9, 10].into_iter().map(InstructionIndex).collect::<Vec<_>>()
        );

        // The original chain is untouched
        assert_eq!(chain.path().len(), 2);
        assert!(matches!(
            top.extend(InstructionIndex(3), &ret),
            Err(VerifierError::Internal(_))
        ));
    }

    #[test]
    fn successors() {
        let body = MethodBody::new(
            vec![
                Instruction::ILoad(0),                                   // 0
                Instruction::If(OrdComparison::EQ, InstructionIndex(4)), // 1
                Instruction::Jsr(InstructionIndex(5)),                   // 2
                Instruction::Return,                                     // 3
                Instruction::Goto(InstructionIndex(3)),                  // 4
                Instruction::AStore(1),                                  // 5
                Instruction::Ret(1),                                     // 6
                Instruction::Return,                                     // 7
            ],
            1,
            2,
            vec![],
        );
        let cfg = ControlFlowGraph::new(&body, &Settings::default()).unwrap();
        let successors = |i: usize| cfg.context_of(InstructionIndex(i)).unwrap().successors().to_vec();

        assert_eq!(successors(0), vec![InstructionIndex(1)]);
        assert_eq!(successors(1), vec![InstructionIndex(2), InstructionIndex(4)]);
        assert_eq!(successors(2), vec![InstructionIndex(5)]);
        assert!(successors(3).is_empty());
        assert_eq!(successors(4), vec![InstructionIndex(3)]);
        assert!(successors(6).is_empty());

        assert!(!cfg.is_dead(InstructionIndex(6)));
        assert!(cfg.is_dead(InstructionIndex(7)));
        assert!(cfg.context_of(InstructionIndex(8)).is_err());
        assert_eq!(
            cfg.contexts_of(&[InstructionIndex(0), InstructionIndex(5)])
                .unwrap()
                .len(),
            2
        );
    }
}
