use super::{ClassHierarchy, VerificationType, VerifierError};
use crate::util::{OffsetVec, Width};
use std::fmt;

/// Local variables of a frame
///
/// Every slot always holds a type. A `long` or `double` in slot `i` is followed by `Unknown` in
/// slot `i + 1`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LocalVariables {
    slots: Vec<VerificationType>,
}

impl LocalVariables {
    /// Fresh local variables, all `Unknown`
    pub fn new(max_locals: usize) -> LocalVariables {
        LocalVariables {
            slots: vec![VerificationType::Unknown; max_locals],
        }
    }

    pub fn max_locals(&self) -> usize {
        self.slots.len()
    }

    pub fn get(&self, index: usize) -> Result<&VerificationType, VerifierError> {
        self.slots.get(index).ok_or_else(|| {
            VerifierError::rejected(format!(
                "Local variable {} is out of range (max_locals is {})",
                index,
                self.slots.len()
            ))
        })
    }

    /// Store a value, clobbering whatever was in the slots it overlaps
    pub fn set(&mut self, index: usize, value: VerificationType) -> Result<(), VerifierError> {
        let width = value.width();
        if index + width > self.slots.len() {
            return Err(VerifierError::rejected(format!(
                "Cannot store {} into local variable {} (max_locals is {})",
                value,
                index,
                self.slots.len()
            )));
        }

        // Overwriting the upper half of a two-slot value destroys it
        if index > 0 && self.slots[index - 1].width() == 2 {
            self.slots[index - 1] = VerificationType::Unknown;
        }
        self.slots[index] = value;
        if width == 2 {
            self.slots[index + 1] = VerificationType::Unknown;
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &VerificationType> {
        self.slots.iter()
    }

    /// Replace every occurrence of one type with another
    pub fn replace_all(&mut self, from: &VerificationType, to: &VerificationType) {
        for slot in self.slots.iter_mut() {
            if slot == from {
                *slot = to.clone();
            }
        }
    }

    /// Merge incoming local variables into these, returning whether anything changed
    pub fn merge(
        &mut self,
        incoming: &LocalVariables,
        hierarchy: &dyn ClassHierarchy,
    ) -> Result<bool, VerifierError> {
        if self.slots.len() != incoming.slots.len() {
            return Err(VerifierError::internal(format!(
                "Merging local variables of different sizes ({} and {})",
                self.slots.len(),
                incoming.slots.len()
            )));
        }

        let mut changed = false;
        for (index, (slot, incoming)) in self.slots.iter_mut().zip(&incoming.slots).enumerate() {
            let merged = slot
                .merge(incoming, hierarchy)
                .map_err(|err| err.extend(format!("While merging local variable {}", index)))?;
            if merged != *slot {
                *slot = merged;
                changed = true;
            }
        }
        Ok(changed)
    }
}

impl fmt::Display for LocalVariables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (index, slot) in self.slots.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", index, slot)?;
        }
        f.write_str("]")
    }
}

/// Operand stack of a frame
///
/// `long` and `double` values take up two of the `max_stack` slots.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OperandStack {
    values: OffsetVec<VerificationType>,
    max_stack: usize,
}

impl OperandStack {
    pub fn new(max_stack: usize) -> OperandStack {
        OperandStack {
            values: OffsetVec::new(),
            max_stack,
        }
    }

    pub fn max_stack(&self) -> usize {
        self.max_stack
    }

    /// Number of slots used (counting `long` and `double` twice)
    pub fn slots_used(&self) -> usize {
        self.values.offset_len().0
    }

    /// Number of values on the stack
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Look at a value counting from the top (`0` is the top of the stack)
    pub fn peek(&self, depth: usize) -> Result<&VerificationType, VerifierError> {
        self.values.peek(depth).ok_or_else(|| {
            VerifierError::rejected(format!(
                "Cannot look {} values deep into a stack holding {} value(s)",
                depth,
                self.values.len()
            ))
        })
    }

    pub fn push(&mut self, value: VerificationType) -> Result<(), VerifierError> {
        if self.slots_used() + value.width() > self.max_stack {
            return Err(VerifierError::rejected(format!(
                "Pushing {} overflows the operand stack (max_stack is {})",
                value, self.max_stack
            )));
        }
        self.values.push(value);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<VerificationType, VerifierError> {
        match self.values.pop() {
            Some((_, _, value)) => Ok(value),
            None => Err(VerifierError::rejected("Cannot pop from an empty operand stack")),
        }
    }

    /// Is there a value boundary exactly `slots` slots down from the top of the stack?
    pub fn splits_at(&self, slots: usize) -> bool {
        let mut seen = 0;
        for (_, _, value) in self.values.iter().rev() {
            if seen == slots {
                return true;
            }
            if seen > slots {
                return false;
            }
            seen += value.width();
        }
        seen == slots
    }

    /// Pop values covering exactly this many slots, returning them bottom first
    pub fn pop_slots(&mut self, slots: usize) -> Result<Vec<VerificationType>, VerifierError> {
        let mut popped = vec![];
        let mut seen = 0;
        while seen < slots {
            let value = self.pop()?;
            seen += value.width();
            popped.push(value);
        }
        if seen != slots {
            return Err(VerifierError::rejected(format!(
                "Cannot split the top {} slot(s) of the stack: a two-slot value is in the way",
                slots
            )));
        }
        popped.reverse();
        Ok(popped)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Values from the bottom of the stack to the top
    pub fn iter(&self) -> impl Iterator<Item = &VerificationType> {
        self.values.iter().map(|(_, _, value)| value)
    }

    pub fn replace_all(&mut self, from: &VerificationType, to: &VerificationType) {
        self.values.map_in_place(|value| {
            if value == *from {
                to.clone()
            } else {
                value
            }
        });
    }

    /// Merge an incoming stack into this one, returning whether anything changed
    ///
    /// Stacks of different depths are a rejection of the method, not an internal error.
    pub fn merge(
        &mut self,
        incoming: &OperandStack,
        hierarchy: &dyn ClassHierarchy,
    ) -> Result<bool, VerifierError> {
        if self.len() != incoming.len() || self.slots_used() != incoming.slots_used() {
            return Err(VerifierError::rejected(format!(
                "Cannot merge stacks of different size: {} and {}",
                self, incoming
            )));
        }

        let mut merged_values = OffsetVec::new();
        let mut changed = false;
        for (recorded, incoming) in self.iter().zip(incoming.iter()) {
            let merged = recorded.merge_stack(incoming, hierarchy)?;
            changed |= merged != *recorded;
            merged_values.push(merged);
        }
        if changed {
            self.values = merged_values;
        }
        Ok(changed)
    }
}

impl fmt::Display for OperandStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (index, value) in self.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", value)?;
        }
        write!(f, "] ({}/{} slots)", self.slots_used(), self.max_stack)
    }
}

/// Symbolic machine state at one point in the method
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Frame {
    pub locals: LocalVariables,
    pub stack: OperandStack,
}

impl Frame {
    /// Empty stack and all locals `Unknown`
    pub fn new(max_locals: usize, max_stack: usize) -> Frame {
        Frame {
            locals: LocalVariables::new(max_locals),
            stack: OperandStack::new(max_stack),
        }
    }

    /// Merge an incoming frame into this one, returning whether anything changed
    pub fn merge(
        &mut self,
        incoming: &Frame,
        hierarchy: &dyn ClassHierarchy,
    ) -> Result<bool, VerifierError> {
        let stack_changed = self.stack.merge(&incoming.stack, hierarchy)?;
        let locals_changed = self.locals.merge(&incoming.locals, hierarchy)?;
        Ok(stack_changed || locals_changed)
    }

    /// Replace an uninitialized object everywhere with its initialized form
    pub fn initialize(&mut self, uninitialized: &VerificationType) {
        let initialized = uninitialized.initialized();
        self.locals.replace_all(uninitialized, &initialized);
        self.stack.replace_all(uninitialized, &initialized);
    }

    pub fn locals_hold_uninitialized(&self) -> bool {
        self.locals.iter().any(VerificationType::is_uninitialized)
    }

    pub fn stack_holds_uninitialized(&self) -> bool {
        self.stack.iter().any(VerificationType::is_uninitialized)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Locals: {}", self.locals)?;
        write!(f, "Stack: {}", self.stack)
    }
}
