use crate::jvm::code::{InstructionIndex, MethodBody};
use crate::jvm::{BinaryName, RefType};

/// Exception handler protecting some instruction
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// `None` catches everything
    pub catch_type: Option<BinaryName>,

    /// First instruction of the handler
    pub handler: InstructionIndex,
}

impl ExceptionHandler {
    /// Type of the exception on the stack when the handler starts
    pub fn caught_type(&self) -> RefType<BinaryName> {
        RefType::Object(
            self.catch_type
                .clone()
                .unwrap_or(BinaryName::THROWABLE),
        )
    }
}

/// Which exception handlers protect which instructions
#[derive(Clone, Debug)]
pub struct ExceptionHandlers {
    handlers: Vec<Vec<ExceptionHandler>>,
}

impl ExceptionHandlers {
    pub fn new(body: &MethodBody) -> ExceptionHandlers {
        let mut handlers: Vec<Vec<ExceptionHandler>> = vec![vec![]; body.len()];
        for entry in &body.exception_table {
            let handler = ExceptionHandler {
                catch_type: entry.catch_type.clone(),
                handler: entry.handler,
            };
            let end = entry.end.0.min(body.len());
            for protected in &mut handlers[entry.start.0.min(end)..end] {
                if !protected.contains(&handler) {
                    protected.push(handler.clone());
                }
            }
        }
        ExceptionHandlers { handlers }
    }

    /// Handlers protecting an instruction, in exception table order
    pub fn handlers_of(&self, index: InstructionIndex) -> &[ExceptionHandler] {
        self.handlers.get(index.0).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All distinct handler entry points
    pub fn entry_points(&self) -> impl Iterator<Item = InstructionIndex> + '_ {
        let mut seen = vec![];
        self.handlers
            .iter()
            .flatten()
            .filter_map(move |handler| {
                if seen.contains(&handler.handler) {
                    None
                } else {
                    seen.push(handler.handler);
                    Some(handler.handler)
                }
            })
    }
}
