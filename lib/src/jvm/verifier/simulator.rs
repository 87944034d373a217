//! Effect of instructions on frames
//!
//! By the time [`simulate`] runs, [`check`](super::checker::check) has already accepted the
//! instruction in this frame, so this only needs to compute the resulting frame.

use super::pump::RunState;
use super::{Frame, UninitializedOrigin, VerificationType, VerifierError};
use crate::jvm::class_file::LoadableConstant;
use crate::jvm::code::{Instruction, InstructionIndex, InvokeType};
use crate::jvm::{BinaryName, FieldType, RefType, UnqualifiedName};

/// Update the frame as if the instruction at `index` had executed
pub fn simulate(
    index: InstructionIndex,
    instruction: &Instruction,
    frame: &mut Frame,
    state: &mut RunState,
) -> Result<(), VerifierError> {
    use VerificationType::{Double, Float, Integer, Long};

    let pushed: Option<VerificationType> = match instruction {
        Instruction::Nop
        | Instruction::IInc(_, _)
        | Instruction::Goto(_)
        | Instruction::Ret(_) => None,

        Instruction::AConstNull => Some(VerificationType::Null),
        Instruction::IConstM1
        | Instruction::IConst0
        | Instruction::IConst1
        | Instruction::IConst2
        | Instruction::IConst3
        | Instruction::IConst4
        | Instruction::IConst5
        | Instruction::BiPush(_)
        | Instruction::SiPush(_) => Some(Integer),
        Instruction::LConst0 | Instruction::LConst1 => Some(Long),
        Instruction::FConst0 | Instruction::FConst1 | Instruction::FConst2 => Some(Float),
        Instruction::DConst0 | Instruction::DConst1 => Some(Double),
        Instruction::Ldc(constant) | Instruction::Ldc2(constant) => Some(constant_type(constant)),

        Instruction::ILoad(_)
        | Instruction::LLoad(_)
        | Instruction::FLoad(_)
        | Instruction::DLoad(_)
        | Instruction::ALoad(_) => {
            let (local, _) = local_operand(instruction)?;
            Some(frame.locals.get(local)?.clone())
        }

        Instruction::IStore(_)
        | Instruction::LStore(_)
        | Instruction::FStore(_)
        | Instruction::DStore(_)
        | Instruction::AStore(_) => {
            let (local, _) = local_operand(instruction)?;
            let value = frame.stack.pop()?;
            frame.locals.set(local, value)?;
            None
        }

        Instruction::AALoad => {
            frame.stack.pop()?;
            let element = match frame.stack.pop()? {
                VerificationType::Object(array_type) => match array_type.component_type() {
                    Some(component) => VerificationType::from_field_type(&component),
                    None => VerificationType::Null,
                },
                _ => VerificationType::Null,
            };
            Some(element)
        }

        Instruction::Pop => {
            frame.stack.pop_slots(1)?;
            None
        }
        Instruction::Pop2 => {
            frame.stack.pop_slots(2)?;
            None
        }
        Instruction::Dup => return duplicate(frame, 1, 0),
        Instruction::DupX1 => return duplicate(frame, 1, 1),
        Instruction::DupX2 => return duplicate(frame, 1, 2),
        Instruction::Dup2 => return duplicate(frame, 2, 0),
        Instruction::Dup2X1 => return duplicate(frame, 2, 1),
        Instruction::Dup2X2 => return duplicate(frame, 2, 2),
        Instruction::Swap => {
            let first = frame.stack.pop()?;
            let second = frame.stack.pop()?;
            frame.stack.push(first)?;
            frame.stack.push(second)?;
            None
        }

        Instruction::Jsr(_) => Some(VerificationType::ReturnAddress(index.next())),

        Instruction::GetStatic(field) | Instruction::GetField(field) => {
            frame.stack.pop_slots(instruction.stack_consumed())?;
            Some(VerificationType::from_field_type(&field.descriptor))
        }

        Instruction::Invoke(invoke_type, method) => {
            let has_this = *invoke_type != InvokeType::Static;
            let receiver = if has_this {
                Some(frame.stack.peek(method.descriptor.parameters.len())?.clone())
            } else {
                None
            };
            frame
                .stack
                .pop_slots(method.descriptor.parameter_length(has_this))?;

            if method.name == UnqualifiedName::INIT {
                if let Some(receiver @ VerificationType::Uninitialized(_, origin)) = &receiver {
                    frame.initialize(receiver);
                    if *origin == UninitializedOrigin::This {
                        state.this_initialized = true;
                    }
                }
            }
            method
                .descriptor
                .return_type
                .as_ref()
                .map(VerificationType::from_field_type)
        }
        Instruction::InvokeDynamic(indy) => {
            frame
                .stack
                .pop_slots(indy.descriptor.parameter_length(false))?;
            indy.descriptor
                .return_type
                .as_ref()
                .map(VerificationType::from_field_type)
        }

        Instruction::New(ref_type) => match ref_type {
            RefType::Object(class) => Some(VerificationType::Uninitialized(
                class.clone(),
                UninitializedOrigin::New(index),
            )),
            _ => {
                return Err(VerifierError::internal(format!(
                    "new of a non-class type at {}",
                    index
                )))
            }
        },
        Instruction::NewArray(base_type) => {
            frame.stack.pop()?;
            Some(VerificationType::Object(RefType::array(FieldType::Base(
                *base_type,
            ))))
        }
        Instruction::ANewArray(component) => {
            frame.stack.pop()?;
            Some(VerificationType::Object(RefType::array(FieldType::Ref(
                component.clone(),
            ))))
        }
        Instruction::MultiANewArray(array_type, dimensions) => {
            frame.stack.pop_slots(*dimensions as usize)?;
            Some(VerificationType::Object(array_type.clone()))
        }
        Instruction::CheckCast(ref_type) => {
            frame.stack.pop()?;
            Some(VerificationType::Object(ref_type.clone()))
        }

        Instruction::AThrow => {
            let thrown = match frame.stack.pop()? {
                VerificationType::Null => {
                    VerificationType::object(BinaryName::NULLPOINTEREXCEPTION)
                }
                other => other,
            };
            frame.stack.clear();
            Some(thrown)
        }

        // Everything else pops its operands and pushes a result that depends only on the opcode
        _ => {
            frame.stack.pop_slots(instruction.stack_consumed())?;
            result_type(instruction)
        }
    };

    if let Some(pushed) = pushed {
        frame.stack.push(pushed)?;
    }
    Ok(())
}

fn local_operand(instruction: &Instruction) -> Result<(usize, usize), VerifierError> {
    instruction
        .local_variable()
        .map(|(local, width)| (local as usize, width))
        .ok_or_else(|| VerifierError::internal(format!("{} has no local variable", instruction)))
}

/// Type of the value pushed by `ldc` and `ldc2_w`
fn constant_type(constant: &LoadableConstant) -> VerificationType {
    match constant {
        LoadableConstant::Integer(_) => VerificationType::Integer,
        LoadableConstant::Float(_) => VerificationType::Float,
        LoadableConstant::Long(_) => VerificationType::Long,
        LoadableConstant::Double(_) => VerificationType::Double,
        LoadableConstant::String(_) => VerificationType::object(BinaryName::STRING),
        LoadableConstant::Class(_) => VerificationType::object(BinaryName::CLASS),
        LoadableConstant::MethodType(_) => VerificationType::object(BinaryName::METHODTYPE),
        LoadableConstant::MethodHandle(_) => VerificationType::object(BinaryName::METHODHANDLE),
        LoadableConstant::Dynamic(field_type) => VerificationType::from_field_type(field_type),
    }
}

/// Result of instructions which pop operands and push one value determined by the opcode
fn result_type(instruction: &Instruction) -> Option<VerificationType> {
    use VerificationType::{Double, Float, Integer, Long};

    match instruction {
        Instruction::IALoad
        | Instruction::BALoad
        | Instruction::CALoad
        | Instruction::SALoad
        | Instruction::IAdd
        | Instruction::ISub
        | Instruction::IMul
        | Instruction::IDiv
        | Instruction::IRem
        | Instruction::INeg
        | Instruction::ISh(_)
        | Instruction::IAnd
        | Instruction::IOr
        | Instruction::IXor
        | Instruction::L2I
        | Instruction::F2I
        | Instruction::D2I
        | Instruction::I2B
        | Instruction::I2C
        | Instruction::I2S
        | Instruction::LCmp
        | Instruction::FCmp(_)
        | Instruction::DCmp(_)
        | Instruction::ArrayLength
        | Instruction::InstanceOf(_) => Some(Integer),

        Instruction::LALoad
        | Instruction::LAdd
        | Instruction::LSub
        | Instruction::LMul
        | Instruction::LDiv
        | Instruction::LRem
        | Instruction::LNeg
        | Instruction::LSh(_)
        | Instruction::LAnd
        | Instruction::LOr
        | Instruction::LXor
        | Instruction::I2L
        | Instruction::F2L
        | Instruction::D2L => Some(Long),

        Instruction::FALoad
        | Instruction::FAdd
        | Instruction::FSub
        | Instruction::FMul
        | Instruction::FDiv
        | Instruction::FRem
        | Instruction::FNeg
        | Instruction::I2F
        | Instruction::L2F
        | Instruction::D2F => Some(Float),

        Instruction::DALoad
        | Instruction::DAdd
        | Instruction::DSub
        | Instruction::DMul
        | Instruction::DDiv
        | Instruction::DRem
        | Instruction::DNeg
        | Instruction::I2D
        | Instruction::L2D
        | Instruction::F2D => Some(Double),

        _ => None,
    }
}

/// Duplicate the top `top_slots` stack slots, inserting the copy below the next `under_slots`
fn duplicate(frame: &mut Frame, top_slots: usize, under_slots: usize) -> Result<(), VerifierError> {
    let top = frame.stack.pop_slots(top_slots)?;
    let under = frame.stack.pop_slots(under_slots)?;
    for value in top.iter().chain(under.iter()).chain(top.iter()) {
        frame.stack.push(value.clone())?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::MethodRef;
    use crate::jvm::verifier::types::test::class;
    use crate::jvm::{BaseType, MethodDescriptor};

    fn run(frame: &mut Frame, index: usize, instruction: Instruction) {
        let mut state = RunState {
            this_initialized: false,
        };
        simulate(InstructionIndex(index), &instruction, frame, &mut state).unwrap();
    }

    fn stack(frame: &Frame) -> Vec<VerificationType> {
        frame.stack.iter().cloned().collect()
    }

    #[test]
    fn stack_shuffling() {
        let mut frame = Frame::new(0, 8);
        run(&mut frame, 0, Instruction::IConst0);
        run(&mut frame, 1, Instruction::LConst0);
        run(&mut frame, 2, Instruction::Dup2X1);
        assert_eq!(
            stack(&frame),
            vec![
                VerificationType::Long,
                VerificationType::Integer,
                VerificationType::Long
            ]
        );

        run(&mut frame, 3, Instruction::Pop2);
        run(&mut frame, 4, Instruction::FConst0);
        run(&mut frame, 5, Instruction::Swap);
        run(&mut frame, 6, Instruction::DupX1);
        assert_eq!(
            stack(&frame),
            vec![
                VerificationType::Long,
                VerificationType::Integer,
                VerificationType::Float,
                VerificationType::Integer,
            ]
        );
    }

    #[test]
    fn locals_and_subroutines() {
        let mut frame = Frame::new(3, 4);
        run(&mut frame, 0, Instruction::DConst1);
        run(&mut frame, 1, Instruction::DStore(1));
        assert_eq!(frame.locals.get(1).unwrap(), &VerificationType::Double);
        assert_eq!(frame.locals.get(2).unwrap(), &VerificationType::Unknown);

        run(&mut frame, 2, Instruction::Jsr(InstructionIndex(7)));
        run(&mut frame, 7, Instruction::AStore(0));
        assert_eq!(
            frame.locals.get(0).unwrap(),
            &VerificationType::ReturnAddress(InstructionIndex(3))
        );
        assert!(frame.stack.is_empty());
    }

    #[test]
    fn construction() {
        let animal = class("a/Animal");
        let mut frame = Frame::new(1, 4);
        frame
            .locals
            .set(
                0,
                VerificationType::Uninitialized(animal.clone(), UninitializedOrigin::This),
            )
            .unwrap();
        run(&mut frame, 0, Instruction::New(RefType::Object(animal.clone())));
        run(&mut frame, 1, Instruction::Dup);
        let uninitialized = VerificationType::Uninitialized(
            animal.clone(),
            UninitializedOrigin::New(InstructionIndex(0)),
        );
        assert_eq!(stack(&frame), vec![uninitialized.clone(), uninitialized]);

        let mut state = RunState {
            this_initialized: false,
        };
        let init = Instruction::Invoke(
            InvokeType::Special,
            MethodRef {
                class: RefType::Object(animal.clone()),
                name: UnqualifiedName::INIT,
                descriptor: MethodDescriptor {
                    parameters: vec![],
                    return_type: None,
                },
                is_interface: false,
            },
        );
        simulate(InstructionIndex(2), &init, &mut frame, &mut state).unwrap();
        assert_eq!(stack(&frame), vec![VerificationType::object(animal.clone())]);
        assert!(!state.this_initialized);
        assert!(frame.locals.get(0).unwrap().is_uninitialized());

        run(&mut frame, 3, Instruction::Pop);
        run(&mut frame, 4, Instruction::ALoad(0));
        simulate(InstructionIndex(5), &init, &mut frame, &mut state).unwrap();
        assert!(state.this_initialized);
        assert_eq!(
            frame.locals.get(0).unwrap(),
            &VerificationType::object(animal)
        );
    }

    #[test]
    fn arrays_and_exceptions() {
        let mut frame = Frame::new(0, 4);
        run(&mut frame, 0, Instruction::IConst2);
        run(&mut frame, 1, Instruction::ANewArray(RefType::Object(BinaryName::STRING)));
        run(&mut frame, 2, Instruction::IConst0);
        run(&mut frame, 3, Instruction::AALoad);
        assert_eq!(stack(&frame), vec![VerificationType::object(BinaryName::STRING)]);

        run(&mut frame, 4, Instruction::IConst0);
        run(&mut frame, 5, Instruction::AConstNull);
        run(&mut frame, 6, Instruction::AThrow);
        assert_eq!(
            stack(&frame),
            vec![VerificationType::object(BinaryName::NULLPOINTEREXCEPTION)]
        );

        run(&mut frame, 7, Instruction::IConst1);
        run(&mut frame, 8, Instruction::NewArray(BaseType::Int));
        run(&mut frame, 9, Instruction::ArrayLength);
        assert_eq!(stack(&frame).last(), Some(&VerificationType::Integer));
    }
}
