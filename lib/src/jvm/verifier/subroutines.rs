//! Partitioning of a method body into subroutines
//!
//! Subroutines here are more restricted than what the JVM allows: a subroutine is everything
//! reachable from the target of a `jsr` without going through another `jsr` or a `ret`, it must
//! start by storing its return address with `astore`, and it must leave through exactly one
//! `ret` on that same local variable. The code reachable from the start of the method (and from
//! exception handlers) is the "top level" pseudo-subroutine. No instruction may belong to more
//! than one subroutine, and no subroutine may (even indirectly) call a subroutine using the same
//! return address local as itself.

use super::{ExceptionHandlers, Settings, VerifierError};
use crate::jvm::code::{Instruction, InstructionIndex, MethodBody};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Subroutine, or the top level of the method
#[derive(Clone, Debug)]
pub struct Subroutine {
    /// First instruction (the method entry for the top level)
    pub leader: InstructionIndex,

    /// Local variable holding the return address (`None` for the top level)
    pub return_address_local: Option<u16>,

    /// `jsr` instructions that enter this subroutine
    pub entering_jsrs: BTreeSet<InstructionIndex>,

    /// The single `ret` leaving this subroutine (`None` for the top level)
    pub leaving_ret: Option<InstructionIndex>,

    /// Instructions belonging to this subroutine
    pub instructions: BTreeSet<InstructionIndex>,

    /// Leaders of the subroutines called from this one
    called: BTreeSet<InstructionIndex>,

    /// Local variables read or written by instructions of this subroutine
    accessed_locals: BTreeSet<u16>,
}

impl Subroutine {
    fn new(leader: InstructionIndex, return_address_local: Option<u16>) -> Subroutine {
        Subroutine {
            leader,
            return_address_local,
            entering_jsrs: BTreeSet::new(),
            leaving_ret: None,
            instructions: BTreeSet::new(),
            called: BTreeSet::new(),
            accessed_locals: BTreeSet::new(),
        }
    }

    pub fn is_top_level(&self) -> bool {
        self.return_address_local.is_none()
    }

    pub fn contains(&self, index: InstructionIndex) -> bool {
        self.instructions.contains(&index)
    }

    /// Local variables accessed by the instructions of this subroutine (not its callees)
    ///
    /// A `long` or `double` access counts for both slots.
    pub fn accessed_locals(&self) -> &BTreeSet<u16> {
        &self.accessed_locals
    }

    /// Leaders of the subroutines this one calls directly
    pub fn subroutines_called(&self) -> impl Iterator<Item = InstructionIndex> + '_ {
        self.called.iter().copied()
    }

    /// Local variables accessed by this subroutine or anything it calls
    pub fn recursively_accessed_locals(&self, subroutines: &Subroutines) -> BTreeSet<u16> {
        let mut accessed = BTreeSet::new();
        let mut visited = BTreeSet::new();
        let mut to_visit = vec![self];
        while let Some(subroutine) = to_visit.pop() {
            if !visited.insert(subroutine.leader) {
                continue;
            }
            accessed.extend(subroutine.accessed_locals.iter().copied());
            to_visit.extend(
                subroutine
                    .called
                    .iter()
                    .filter_map(|leader| subroutines.get(*leader)),
            );
        }
        accessed
    }

    fn describe(&self) -> String {
        match self.return_address_local {
            None => "top level".to_string(),
            Some(local) => format!(
                "subroutine at {} (return address in local {}, entered from {})",
                self.leader,
                local,
                self.entering_jsrs
                    .iter()
                    .map(InstructionIndex::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

/// Graph colouring for the breadth-first traversal of a subroutine
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Colour {
    White,
    Grey,
    Black,
}

/// Every subroutine of a method body
#[derive(Clone, Debug)]
pub struct Subroutines {
    /// Keyed by leader, including the top level (keyed by the first instruction)
    subroutines: BTreeMap<InstructionIndex, Subroutine>,

    /// Leader of the subroutine each instruction belongs to (`None` for dead code)
    owners: Vec<Option<InstructionIndex>>,
}

impl Subroutines {
    /// Find the subroutines of a method and check that they are well-formed
    pub fn new(
        body: &MethodBody,
        handlers: &ExceptionHandlers,
        settings: &Settings,
    ) -> Result<Subroutines, VerifierError> {
        let top_leader = InstructionIndex(0);
        let mut subroutines = BTreeMap::new();
        subroutines.insert(top_leader, Subroutine::new(top_leader, None));

        // Leaders are the targets of `jsr`, and must store the return address
        for (index, instruction) in body.iter() {
            if let Instruction::Jsr(target) = instruction {
                if *target == top_leader {
                    return Err(VerifierError::rejected(format!(
                        "The jsr at {} targets the first instruction of the method",
                        index
                    )));
                }
                let local = match body.get(*target) {
                    Some(Instruction::AStore(local)) => *local,
                    Some(other) => {
                        return Err(VerifierError::rejected(format!(
                            "Subroutine entry {} is `{}`, but must be an astore of the return \
                             address",
                            target, other
                        )))
                    }
                    None => {
                        return Err(VerifierError::internal(format!(
                            "The jsr at {} targets {} which is out of range",
                            index, target
                        )))
                    }
                };
                subroutines
                    .entry(*target)
                    .or_insert_with(|| Subroutine::new(*target, Some(local)))
                    .entering_jsrs
                    .insert(index);
            }
        }

        let mut owners: Vec<Option<InstructionIndex>> = vec![None; body.len()];
        for (leader, subroutine) in subroutines.iter_mut() {
            let mut roots = vec![*leader];
            if subroutine.is_top_level() {
                roots.extend(handlers.entry_points());
            }

            for index in Subroutines::reachable(body, &roots) {
                if let Some(other) = owners[index.0] {
                    return Err(VerifierError::rejected(format!(
                        "Instruction {} is part of more than one subroutine (or of the top level \
                         and a subroutine): reached from both {} and {}",
                        index, other, leader
                    )));
                }
                owners[index.0] = Some(*leader);
                subroutine.instructions.insert(index);
            }
        }

        for subroutine in subroutines.values_mut() {
            for index in &subroutine.instructions {
                match body.get(*index) {
                    Some(Instruction::Jsr(target)) => {
                        subroutine.called.insert(*target);
                    }
                    Some(instruction) => {
                        if let Some((local, width)) = instruction.local_variable() {
                            for offset in 0..width {
                                subroutine.accessed_locals.insert(local + offset as u16);
                            }
                        }
                    }
                    None => (),
                }
            }
            if subroutine.is_top_level() {
                Subroutines::reject_top_level_ret(body, subroutine)?;
            } else {
                Subroutines::find_leaving_ret(body, subroutine)?;
            }
        }

        let subroutines = Subroutines {
            subroutines,
            owners,
        };

        if settings.forbid_protected_subroutines {
            for index in (0..body.len()).map(InstructionIndex) {
                let owner = match subroutines.subroutine_of(index) {
                    Some(owner) if !owner.is_top_level() => owner,
                    _ => continue,
                };
                if let Some(handler) = handlers.handlers_of(index).first() {
                    return Err(VerifierError::rejected(format!(
                        "Instruction {} of the {} is protected by the exception handler at {}, \
                         but subroutines may not be protected by exception handlers",
                        index,
                        owner.describe(),
                        handler.handler
                    )));
                }
            }
        }

        subroutines.check_no_recursive_calls(subroutines.top_level(), &mut BTreeSet::new())?;
        Ok(subroutines)
    }

    /// Instructions reachable from the roots without following `jsr` or `ret`
    fn reachable(body: &MethodBody, roots: &[InstructionIndex]) -> Vec<InstructionIndex> {
        let mut colours = vec![Colour::White; body.len()];
        let mut queue = VecDeque::new();
        for root in roots {
            if let Some(colour @ Colour::White) = colours.get_mut(root.0) {
                *colour = Colour::Grey;
                queue.push_back(*root);
            }
        }

        while let Some(index) = queue.pop_front() {
            if let Some(instruction) = body.get(index) {
                for successor in Subroutines::local_successors(index, instruction) {
                    if let Some(colour @ Colour::White) = colours.get_mut(successor.0) {
                        *colour = Colour::Grey;
                        queue.push_back(successor);
                    }
                }
            }
            colours[index.0] = Colour::Black;
        }

        colours
            .iter()
            .enumerate()
            .filter(|(_, colour)| **colour == Colour::Black)
            .map(|(index, _)| InstructionIndex(index))
            .collect()
    }

    /// Successors inside the same subroutine: `jsr` continues at the next instruction (where the
    /// matching `ret` will return to), and `ret` has no successors.
    fn local_successors(index: InstructionIndex, instruction: &Instruction) -> Vec<InstructionIndex> {
        match instruction {
            Instruction::Jsr(_) => vec![index.next()],
            Instruction::Ret(_) => vec![],
            _ => {
                let mut successors = instruction.branch_targets();
                if instruction.falls_through() {
                    successors.push(index.next());
                }
                successors
            }
        }
    }

    /// Code outside of subroutines has nowhere to return to
    fn reject_top_level_ret(body: &MethodBody, top_level: &Subroutine) -> Result<(), VerifierError> {
        for index in &top_level.instructions {
            if let Some(Instruction::Ret(_)) = body.get(*index) {
                return Err(VerifierError::rejected(format!(
                    "The ret at {} is not part of any subroutine",
                    index
                )));
            }
        }
        Ok(())
    }

    fn find_leaving_ret(
        body: &MethodBody,
        subroutine: &mut Subroutine,
    ) -> Result<(), VerifierError> {
        let mut leaving_ret = None;
        for index in &subroutine.instructions {
            if let Some(Instruction::Ret(local)) = body.get(*index) {
                if let Some(previous) = leaving_ret {
                    return Err(VerifierError::rejected(format!(
                        "Subroutine at {} has more than one ret: {} and {}",
                        subroutine.leader, previous, index
                    )));
                }
                if Some(*local) != subroutine.return_address_local {
                    return Err(VerifierError::rejected(format!(
                        "The ret at {} uses local variable {}, but the {} keeps its return \
                         address elsewhere",
                        index,
                        local,
                        subroutine.describe()
                    )));
                }
                leaving_ret = Some(*index);
            }
        }

        match leaving_ret {
            None => Err(VerifierError::rejected(format!(
                "Subroutine at {} has no ret",
                subroutine.leader
            ))),
            Some(ret) => {
                subroutine.leaving_ret = Some(ret);
                Ok(())
            }
        }
    }

    /// Walk the call tree, checking no subroutine is called while another with the same return
    /// address local is still active
    fn check_no_recursive_calls(
        &self,
        subroutine: &Subroutine,
        active_locals: &mut BTreeSet<u16>,
    ) -> Result<(), VerifierError> {
        for leader in &subroutine.called {
            let callee = self.get(*leader).ok_or_else(|| {
                VerifierError::internal(format!("No subroutine starts at {}", leader))
            })?;
            let local = match callee.return_address_local {
                Some(local) => local,
                None => continue,
            };
            if !active_locals.insert(local) {
                return Err(VerifierError::rejected(format!(
                    "The {} is called by a subroutine which uses the same local variable for \
                     its return address; recursive calls are not allowed",
                    callee.describe()
                )));
            }
            self.check_no_recursive_calls(callee, active_locals)?;
            active_locals.remove(&local);
        }
        Ok(())
    }

    /// The top level pseudo-subroutine
    pub fn top_level(&self) -> &Subroutine {
        &self.subroutines[&InstructionIndex(0)]
    }

    /// Subroutine starting at this leader
    pub fn get(&self, leader: InstructionIndex) -> Option<&Subroutine> {
        self.subroutines.get(&leader)
    }

    /// Subroutine an instruction belongs to (`None` for unreachable code)
    pub fn subroutine_of(&self, index: InstructionIndex) -> Option<&Subroutine> {
        let leader = (*self.owners.get(index.0)?)?;
        self.subroutines.get(&leader)
    }

    /// Every subroutine, the top level first
    pub fn iter(&self) -> impl Iterator<Item = &Subroutine> {
        self.subroutines.values()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::ExceptionTableEntry;
    use crate::jvm::BinaryName;

    fn analyze(instructions: Vec<Instruction>) -> Result<Subroutines, VerifierError> {
        analyze_with(instructions, vec![], &Settings::default())
    }

    fn analyze_with(
        instructions: Vec<Instruction>,
        exception_table: Vec<ExceptionTableEntry>,
        settings: &Settings,
    ) -> Result<Subroutines, VerifierError> {
        let body = MethodBody::new(instructions, 2, 3, exception_table);
        let handlers = ExceptionHandlers::new(&body);
        Subroutines::new(&body, &handlers, settings)
    }

    fn rejection(result: Result<Subroutines, VerifierError>) -> String {
        match result {
            Err(VerifierError::Rejected(diagnostic)) => diagnostic.reason,
            other => panic!("expected a rejection, got {:?}", other.map(|_| ())),
        }
    }

    /// `jsr` into a subroutine that stores into local 2, then returns
    fn single_subroutine() -> Vec<Instruction> {
        vec![
            Instruction::Jsr(InstructionIndex(3)), // 0
            Instruction::IConst0,                  // 1
            Instruction::IReturn,                  // 2
            Instruction::AStore(2),                // 3
            Instruction::IInc(0, 1),               // 4
            Instruction::Ret(2),                   // 5
            Instruction::Nop,                      // 6 (dead)
            Instruction::Return,                   // 7 (dead)
        ]
    }

    #[test]
    fn partition() {
        let subroutines = analyze(single_subroutine()).unwrap();

        let top = subroutines.top_level();
        assert!(top.is_top_level());
        assert_eq!(
            top.instructions.iter().copied().collect::<Vec<_>>(),
            vec![InstructionIndex(0), InstructionIndex(1), InstructionIndex(2)]
        );

        let sub = subroutines.get(InstructionIndex(3)).unwrap();
        assert_eq!(sub.return_address_local, Some(2));
        assert_eq!(sub.leaving_ret, Some(InstructionIndex(5)));
        assert!(sub.entering_jsrs.contains(&InstructionIndex(0)));
        assert!(sub.contains(InstructionIndex(4)));
        assert_eq!(sub.accessed_locals().iter().copied().collect::<Vec<_>>(), vec![0, 2]);

        assert_eq!(
            top.subroutines_called().collect::<Vec<_>>(),
            vec![InstructionIndex(3)]
        );
        assert_eq!(
            top.recursively_accessed_locals(&subroutines)
                .into_iter()
                .collect::<Vec<_>>(),
            vec![0, 2]
        );

        assert!(subroutines.subroutine_of(InstructionIndex(6)).is_none());
        assert_eq!(
            subroutines
                .subroutine_of(InstructionIndex(4))
                .map(|sub| sub.leader),
            Some(InstructionIndex(3))
        );
        assert_eq!(subroutines.iter().count(), 2);
    }

    #[test]
    fn shared_code() {
        // Both subroutines jump into the same return sequence
        let result = analyze(vec![
            Instruction::Jsr(InstructionIndex(4)), // 0
            Instruction::Jsr(InstructionIndex(6)), // 1
            Instruction::Return,                   // 2
            Instruction::Nop,                      // 3
            Instruction::AStore(2),                // 4
            Instruction::Goto(InstructionIndex(7)), // 5
            Instruction::AStore(2),                // 6
            Instruction::Ret(2),                   // 7
        ]);
        assert!(rejection(result).contains("more than one subroutine"));
    }

    #[test]
    fn leaders_must_store_return_address() {
        let result = analyze(vec![
            Instruction::Jsr(InstructionIndex(2)),
            Instruction::Return,
            Instruction::Pop,
            Instruction::Ret(1),
        ]);
        assert!(rejection(result).contains("must be an astore"));
    }

    #[test]
    fn exactly_one_matching_ret() {
        let no_ret = analyze(vec![
            Instruction::Jsr(InstructionIndex(2)),
            Instruction::Return,
            Instruction::AStore(1),
            Instruction::Return,
        ]);
        assert!(rejection(no_ret).contains("has no ret"));

        let two_rets = analyze(vec![
            Instruction::Jsr(InstructionIndex(2)),          // 0
            Instruction::Return,                            // 1
            Instruction::AStore(1),                         // 2
            Instruction::IfNull(crate::jvm::code::EqComparison::EQ, InstructionIndex(5)), // 3
            Instruction::Ret(1),                            // 4
            Instruction::Ret(1),                            // 5
        ]);
        assert!(rejection(two_rets).contains("more than one ret"));

        let wrong_local = analyze(vec![
            Instruction::Jsr(InstructionIndex(2)),
            Instruction::Return,
            Instruction::AStore(1),
            Instruction::Ret(2),
        ]);
        assert!(rejection(wrong_local).contains("uses local variable 2"));
    }

    #[test]
    fn ret_outside_of_subroutines() {
        let result = analyze(vec![
            Instruction::Jsr(InstructionIndex(2)), // 0
            Instruction::Ret(0),                   // 1
            Instruction::AStore(0),                // 2
            Instruction::Ret(0),                   // 3
        ]);
        assert!(rejection(result).contains("not part of any subroutine"));
    }

    #[test]
    fn recursive_calls() {
        // The subroutine calls itself
        let direct = analyze(vec![
            Instruction::Jsr(InstructionIndex(2)), // 0
            Instruction::Return,                   // 1
            Instruction::AStore(1),                // 2
            Instruction::Jsr(InstructionIndex(2)), // 3
            Instruction::Ret(1),                   // 4
        ]);
        assert!(rejection(direct).contains("recursive calls"));

        // Two subroutines calling each other, sharing a return address local
        let indirect = analyze(vec![
            Instruction::Jsr(InstructionIndex(2)), // 0
            Instruction::Return,                   // 1
            Instruction::AStore(1),                // 2
            Instruction::Jsr(InstructionIndex(5)), // 3
            Instruction::Ret(1),                   // 4
            Instruction::AStore(1),                // 5
            Instruction::Ret(1),                   // 6
        ]);
        assert!(rejection(indirect).contains("recursive calls"));

        // Nesting with different locals is fine
        let nested = analyze(vec![
            Instruction::Jsr(InstructionIndex(2)), // 0
            Instruction::Return,                   // 1
            Instruction::AStore(1),                // 2
            Instruction::Jsr(InstructionIndex(5)), // 3
            Instruction::Ret(1),                   // 4
            Instruction::AStore(2),                // 5
            Instruction::Ret(2),                   // 6
        ]);
        let nested = nested.unwrap();
        let outer = nested.get(InstructionIndex(2)).unwrap();
        assert_eq!(
            outer
                .recursively_accessed_locals(&nested)
                .into_iter()
                .collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[test]
    fn protected_subroutines() {
        let table = vec![ExceptionTableEntry {
            start: InstructionIndex(3),
            end: InstructionIndex(5),
            handler: InstructionIndex(6),
            catch_type: Some(BinaryName::EXCEPTION),
        }];
        let mut instructions = single_subroutine();
        instructions[6] = Instruction::Pop;

        let result = analyze_with(instructions.clone(), table.clone(), &Settings::default());
        assert!(rejection(result).contains("protected by the exception handler"));

        let lenient = Settings {
            forbid_protected_subroutines: false,
            ..Settings::default()
        };
        let subroutines = analyze_with(instructions, table, &lenient).unwrap();
        assert!(subroutines.top_level().contains(InstructionIndex(6)));
        assert!(subroutines.top_level().contains(InstructionIndex(7)));
    }
}
