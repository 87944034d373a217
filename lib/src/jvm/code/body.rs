use super::{Instruction, InstructionIndex};
use crate::jvm::{BinaryName, Error};
use std::fmt;

/// Decoded body of a method: the instructions, the exception table, and the declared sizes of
/// the frame
#[derive(Clone, Debug, PartialEq)]
pub struct MethodBody {
    pub instructions: Vec<Instruction>,

    /// Byte offset of each instruction in the original code array (empty if the body was not
    /// decoded from bytes)
    pub byte_offsets: Vec<usize>,

    pub max_stack: u16,
    pub max_locals: u16,
    pub exception_table: Vec<ExceptionTableEntry>,
}

/// Entry in the exception table, in terms of instruction indices
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExceptionTableEntry {
    /// First protected instruction
    pub start: InstructionIndex,

    /// First instruction after the protected range (exclusive)
    pub end: InstructionIndex,

    /// Entry point of the handler
    pub handler: InstructionIndex,

    /// `None` catches everything
    pub catch_type: Option<BinaryName>,
}

impl ExceptionTableEntry {
    /// Is the instruction inside the protected range?
    pub fn covers(&self, index: InstructionIndex) -> bool {
        self.start <= index && index < self.end
    }
}

impl fmt::Display for ExceptionTableEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let catch_type = self
            .catch_type
            .as_ref()
            .map_or("<any>", |name| name.as_ref());
        write!(
            f,
            "[{}, {}) -> {} catching {}",
            self.start, self.end, self.handler, catch_type
        )
    }
}

impl MethodBody {
    /// Build a body by hand (no byte offsets are known)
    pub fn new(
        instructions: Vec<Instruction>,
        max_stack: u16,
        max_locals: u16,
        exception_table: Vec<ExceptionTableEntry>,
    ) -> MethodBody {
        MethodBody {
            instructions,
            byte_offsets: vec![],
            max_stack,
            max_locals,
            exception_table,
        }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn get(&self, index: InstructionIndex) -> Option<&Instruction> {
        self.instructions.get(index.0)
    }

    /// Iterate over the instructions along with their indices
    pub fn iter(&self) -> impl Iterator<Item = (InstructionIndex, &Instruction)> {
        self.instructions
            .iter()
            .enumerate()
            .map(|(idx, insn)| (InstructionIndex(idx), insn))
    }

    /// Byte offset of an instruction, if the body was decoded from bytes
    pub fn byte_offset(&self, index: InstructionIndex) -> Option<usize> {
        self.byte_offsets.get(index.0).copied()
    }

    /// Check the structural properties that the analysis takes for granted
    ///
    ///   - the body is not empty
    ///   - every jump target and exception table index is in range
    ///   - the protected range of every exception handler is not empty
    ///   - execution cannot fall off the end of the method
    ///
    pub fn validate(&self) -> Result<(), Error> {
        let len = self.instructions.len();
        let bad = |index: usize, message: String| Error::BadBytecode {
            offset: self.byte_offsets.get(index).copied().unwrap_or(index),
            message,
        };

        let last = match self.instructions.last() {
            None => return Err(bad(0, String::from("Method body has no instructions"))),
            Some(last) => last,
        };

        for (index, insn) in self.iter() {
            for target in insn.branch_targets() {
                if target.0 >= len {
                    return Err(bad(
                        index.0,
                        format!("Jump target {} of '{}' is out of range", target, insn),
                    ));
                }
            }
        }

        for entry in &self.exception_table {
            if entry.start >= entry.end || entry.end.0 > len || entry.handler.0 >= len {
                return Err(bad(
                    entry.handler.0.min(len - 1),
                    format!("Exception table entry {} is out of range", entry),
                ));
            }
        }

        if last.falls_through() {
            return Err(bad(
                len - 1,
                format!("Execution can fall off the end of the method after '{}'", last),
            ));
        }

        Ok(())
    }
}
