//! Preconditions of instructions
//!
//! [`check`] looks at the frame an instruction would execute in and decides whether the
//! instruction can execute there at all. It never modifies the frame: that is the job of the
//! [simulator](super::simulator), which only runs once the checks pass.

use super::pump::{Environment, RunState};
use super::{ClassStatus, Frame, UninitializedOrigin, VerificationType, VerifierError};
use crate::jvm::class_file::{FieldRef, MethodRef};
use crate::jvm::code::{class_operand, Instruction, InvokeType};
use crate::jvm::{BaseType, BinaryName, FieldType, RefType, UnqualifiedName};
use crate::util::Width;

type CheckResult = Result<(), VerifierError>;

fn violation(reason: impl Into<String>) -> CheckResult {
    Err(VerifierError::rejected(reason))
}

/// Check that an instruction can execute in a frame
pub fn check(
    instruction: &Instruction,
    frame: &Frame,
    env: &Environment,
    state: &RunState,
) -> CheckResult {
    check_stack_size(instruction, frame)?;

    use VerificationType::{Double, Float, Integer, Long};
    match instruction {
        Instruction::Nop
        | Instruction::AConstNull
        | Instruction::IConstM1
        | Instruction::IConst0
        | Instruction::IConst1
        | Instruction::IConst2
        | Instruction::IConst3
        | Instruction::IConst4
        | Instruction::IConst5
        | Instruction::LConst0
        | Instruction::LConst1
        | Instruction::FConst0
        | Instruction::FConst1
        | Instruction::FConst2
        | Instruction::DConst0
        | Instruction::DConst1
        | Instruction::BiPush(_)
        | Instruction::SiPush(_)
        | Instruction::Goto(_)
        | Instruction::Jsr(_) => Ok(()),

        Instruction::Ldc(constant) if constant.width() != 1 => violation(format!(
            "ldc cannot load the two-slot constant {:?}; use ldc2_w",
            constant
        )),
        Instruction::Ldc2(constant) if constant.width() != 2 => violation(format!(
            "ldc2_w can only load long and double constants, not {:?}",
            constant
        )),
        Instruction::Ldc(_) | Instruction::Ldc2(_) => Ok(()),

        Instruction::ILoad(local) => check_load(frame, *local, &Integer),
        Instruction::LLoad(local) => check_load(frame, *local, &Long),
        Instruction::FLoad(local) => check_load(frame, *local, &Float),
        Instruction::DLoad(local) => check_load(frame, *local, &Double),
        Instruction::ALoad(local) => check_reference_load(frame, *local),

        Instruction::IStore(local) => check_store(frame, *local, &Integer),
        Instruction::LStore(local) => check_store(frame, *local, &Long),
        Instruction::FStore(local) => check_store(frame, *local, &Float),
        Instruction::DStore(local) => check_store(frame, *local, &Double),
        Instruction::AStore(local) => check_reference_store(frame, *local),

        Instruction::IALoad => check_array_load(frame, "int", is_base(BaseType::Int)),
        Instruction::LALoad => check_array_load(frame, "long", is_base(BaseType::Long)),
        Instruction::FALoad => check_array_load(frame, "float", is_base(BaseType::Float)),
        Instruction::DALoad => check_array_load(frame, "double", is_base(BaseType::Double)),
        Instruction::AALoad => check_array_load(frame, "reference", is_reference),
        Instruction::BALoad => check_array_load(frame, "byte or boolean", is_byte_or_boolean),
        Instruction::CALoad => check_array_load(frame, "char", is_base(BaseType::Char)),
        Instruction::SALoad => check_array_load(frame, "short", is_base(BaseType::Short)),

        Instruction::IAStore => check_array_store(frame, &Integer, "int", is_base(BaseType::Int)),
        Instruction::LAStore => check_array_store(frame, &Long, "long", is_base(BaseType::Long)),
        Instruction::FAStore => {
            check_array_store(frame, &Float, "float", is_base(BaseType::Float))
        }
        Instruction::DAStore => {
            check_array_store(frame, &Double, "double", is_base(BaseType::Double))
        }
        Instruction::AAStore => {
            expect_initialized_reference(frame, 0, "Value stored into the array")?;
            expect_type(frame, 1, &Integer, "Array index")?;
            check_array_ref(frame, 2, "reference", is_reference)
        }
        Instruction::BAStore => {
            check_array_store(frame, &Integer, "byte or boolean", is_byte_or_boolean)
        }
        Instruction::CAStore => check_array_store(frame, &Integer, "char", is_base(BaseType::Char)),
        Instruction::SAStore => {
            check_array_store(frame, &Integer, "short", is_base(BaseType::Short))
        }

        Instruction::Pop | Instruction::Dup => check_stack_splits(instruction, frame, &[1]),
        Instruction::Pop2 | Instruction::Dup2 => check_stack_splits(instruction, frame, &[2]),
        Instruction::DupX1 | Instruction::Swap => check_stack_splits(instruction, frame, &[1, 2]),
        Instruction::DupX2 => check_stack_splits(instruction, frame, &[1, 3]),
        Instruction::Dup2X1 => check_stack_splits(instruction, frame, &[2, 3]),
        Instruction::Dup2X2 => check_stack_splits(instruction, frame, &[2, 4]),

        Instruction::IAdd
        | Instruction::ISub
        | Instruction::IMul
        | Instruction::IDiv
        | Instruction::IRem
        | Instruction::IAnd
        | Instruction::IOr
        | Instruction::IXor
        | Instruction::ISh(_)
        | Instruction::IfICmp(_, _) => expect_types(frame, &[&Integer, &Integer]),
        Instruction::LAdd
        | Instruction::LSub
        | Instruction::LMul
        | Instruction::LDiv
        | Instruction::LRem
        | Instruction::LAnd
        | Instruction::LOr
        | Instruction::LXor
        | Instruction::LCmp => expect_types(frame, &[&Long, &Long]),
        Instruction::FAdd
        | Instruction::FSub
        | Instruction::FMul
        | Instruction::FDiv
        | Instruction::FRem
        | Instruction::FCmp(_) => expect_types(frame, &[&Float, &Float]),
        Instruction::DAdd
        | Instruction::DSub
        | Instruction::DMul
        | Instruction::DDiv
        | Instruction::DRem
        | Instruction::DCmp(_) => expect_types(frame, &[&Double, &Double]),
        Instruction::LSh(_) => expect_types(frame, &[&Integer, &Long]),

        Instruction::INeg
        | Instruction::I2L
        | Instruction::I2F
        | Instruction::I2D
        | Instruction::I2B
        | Instruction::I2C
        | Instruction::I2S
        | Instruction::If(_, _)
        | Instruction::TableSwitch { .. }
        | Instruction::LookupSwitch { .. }
        | Instruction::NewArray(_) => expect_types(frame, &[&Integer]),
        Instruction::LNeg | Instruction::L2I | Instruction::L2F | Instruction::L2D => {
            expect_types(frame, &[&Long])
        }
        Instruction::FNeg | Instruction::F2I | Instruction::F2L | Instruction::F2D => {
            expect_types(frame, &[&Float])
        }
        Instruction::DNeg | Instruction::D2I | Instruction::D2L | Instruction::D2F => {
            expect_types(frame, &[&Double])
        }

        Instruction::IInc(local, _) => {
            let value = frame.locals.get(*local as usize)?;
            if *value != Integer {
                return violation(format!(
                    "Local variable {} should be int for iinc, but is {}",
                    local, value
                ));
            }
            Ok(())
        }

        Instruction::IfACmp(_, _) => {
            expect_reference(frame, 0, "First operand of the comparison")?;
            expect_reference(frame, 1, "Second operand of the comparison")
        }
        Instruction::IfNull(_, _) => expect_reference(frame, 0, "Operand of the null check"),

        Instruction::Ret(local) => match frame.locals.get(*local as usize)? {
            VerificationType::ReturnAddress(_) => Ok(()),
            other => violation(format!(
                "Expecting a return address in local variable {}, but found {}",
                local, other
            )),
        },

        Instruction::IReturn
        | Instruction::LReturn
        | Instruction::FReturn
        | Instruction::DReturn
        | Instruction::AReturn
        | Instruction::Return => check_return(instruction, frame, env, state),

        Instruction::GetStatic(field) => check_referenced_class(env, &field.class),
        Instruction::PutStatic(field) => {
            check_referenced_class(env, &field.class)?;
            expect_assignable(env, frame.stack.peek(0)?, &field.descriptor, "Value put into the field")
        }
        Instruction::GetField(field) => {
            check_referenced_class(env, &field.class)?;
            check_field_receiver(env, frame, 0, field, false)
        }
        Instruction::PutField(field) => {
            check_referenced_class(env, &field.class)?;
            expect_assignable(env, frame.stack.peek(0)?, &field.descriptor, "Value put into the field")?;
            check_field_receiver(env, frame, 1, field, true)
        }

        Instruction::Invoke(invoke_type, method) => check_invoke(env, frame, *invoke_type, method),
        Instruction::InvokeDynamic(indy) => {
            if indy.name == UnqualifiedName::INIT || indy.name == UnqualifiedName::CLINIT {
                return violation(format!("invokedynamic cannot call {}", indy.name));
            }
            check_arguments(env, frame, &indy.descriptor.parameters)
        }

        Instruction::New(RefType::Object(class)) => {
            check_referenced_class(env, class)?;
            if env.hierarchy.is_interface(class)? {
                return violation(format!("Cannot instantiate the interface {}", class));
            }
            Ok(())
        }
        Instruction::New(other) => violation(format!(
            "new expects a class type, but found {}",
            class_operand(other)
        )),
        Instruction::ANewArray(component) => {
            check_referenced_ref_type(env, component)?;
            expect_types(frame, &[&Integer])
        }
        Instruction::MultiANewArray(array_type, dimensions) => {
            check_referenced_ref_type(env, array_type)?;
            if *dimensions == 0 || *dimensions as usize > array_type.dimensions() {
                return violation(format!(
                    "Cannot create a {}-dimensional array of type {}",
                    dimensions,
                    class_operand(array_type)
                ));
            }
            for depth in 0..*dimensions as usize {
                expect_type(frame, depth, &Integer, "Array dimension")?;
            }
            Ok(())
        }
        Instruction::ArrayLength => match frame.stack.peek(0)? {
            VerificationType::Null => Ok(()),
            VerificationType::Object(ref_type) if ref_type.dimensions() > 0 => Ok(()),
            other => violation(format!(
                "arraylength expects an array reference, but found {}",
                other
            )),
        },
        Instruction::AThrow => match frame.stack.peek(0)? {
            VerificationType::Null => Ok(()),
            VerificationType::Object(ref_type @ RefType::Object(_)) => {
                if env.hierarchy.is_throwable(ref_type)? {
                    Ok(())
                } else {
                    violation(format!(
                        "The thrown object is of class {}, which is not a subclass of {}",
                        class_operand(ref_type),
                        BinaryName::THROWABLE
                    ))
                }
            }
            other => violation(format!(
                "athrow expects an object of a subclass of {}, but found {}",
                BinaryName::THROWABLE,
                other
            )),
        },
        Instruction::CheckCast(ref_type) | Instruction::InstanceOf(ref_type) => {
            check_referenced_ref_type(env, ref_type)?;
            expect_initialized_reference(frame, 0, "Operand of the type check")
        }
        Instruction::MonitorEnter | Instruction::MonitorExit => {
            expect_initialized_reference(frame, 0, "Monitor")
        }
    }
}

/// Every instruction must find the values it consumes, and have room for what it produces
fn check_stack_size(instruction: &Instruction, frame: &Frame) -> CheckResult {
    let consumed = instruction.stack_consumed();
    let produced = instruction.stack_produced();
    let used = frame.stack.slots_used();
    let max = frame.stack.max_stack();

    if consumed > used {
        return violation(format!(
            "Cannot consume {} stack slots: only {} slot(s) left on stack!",
            consumed, used
        ));
    }
    let growth = produced as isize - consumed as isize;
    if used as isize + growth > max as isize {
        return violation(format!(
            "Cannot produce {} stack slots: only {} free stack slot(s) left.",
            growth,
            max - used
        ));
    }
    Ok(())
}

/// Stack manipulation instructions must not tear apart `long` or `double` values
fn check_stack_splits(instruction: &Instruction, frame: &Frame, splits: &[usize]) -> CheckResult {
    for split in splits {
        if !frame.stack.splits_at(*split) {
            return violation(format!(
                "{} would split a two-slot value ({} slot(s) from the top of the stack)",
                instruction.mnemonic(),
                split
            ));
        }
    }
    Ok(())
}

fn expect_type(
    frame: &Frame,
    depth: usize,
    expected: &VerificationType,
    what: &str,
) -> CheckResult {
    let found = frame.stack.peek(depth)?;
    if found != expected {
        return violation(format!(
            "{} should be of type {}, but is {}",
            what, expected, found
        ));
    }
    Ok(())
}

/// Check the types at the top of the stack, top first
fn expect_types(frame: &Frame, expected: &[&VerificationType]) -> CheckResult {
    for (depth, expected) in expected.iter().enumerate() {
        let found = frame.stack.peek(depth)?;
        if found != *expected {
            return violation(format!(
                "Stack slot {} (from the top) should be of type {}, but is {}",
                depth, expected, found
            ));
        }
    }
    Ok(())
}

/// Any reference, including uninitialized objects
fn expect_reference(frame: &Frame, depth: usize, what: &str) -> CheckResult {
    let found = frame.stack.peek(depth)?;
    if !found.is_reference() {
        return violation(format!("{} should be a reference, but is {}", what, found));
    }
    Ok(())
}

fn expect_initialized_reference(frame: &Frame, depth: usize, what: &str) -> CheckResult {
    expect_reference(frame, depth, what)?;
    let found = frame.stack.peek(depth)?;
    if found.is_uninitialized() {
        return violation(format!(
            "{} is an object whose constructor has not been called yet: {}",
            what, found
        ));
    }
    Ok(())
}

/// Check that a value can be used where a value of the given type is expected
fn expect_assignable(
    env: &Environment,
    found: &VerificationType,
    expected: &FieldType<BinaryName>,
    what: &str,
) -> CheckResult {
    match expected {
        FieldType::Base(_) => {
            let expected = VerificationType::from_field_type(expected);
            if *found != expected {
                return violation(format!(
                    "{} should be of type {}, but is {}",
                    what, expected, found
                ));
            }
            Ok(())
        }
        FieldType::Ref(expected) => match found {
            VerificationType::Null => Ok(()),
            VerificationType::Object(found_type) => {
                if env.hierarchy.is_assignable(found_type, expected)? {
                    Ok(())
                } else {
                    violation(format!(
                        "{} of type {} is not assignment compatible with {}",
                        what,
                        class_operand(found_type),
                        class_operand(expected)
                    ))
                }
            }
            VerificationType::Uninitialized(_, _) => violation(format!(
                "{} is an object whose constructor has not been called yet: {}",
                what, found
            )),
            other => violation(format!(
                "{} should be a reference of type {}, but is {}",
                what,
                class_operand(expected),
                other
            )),
        },
    }
}

fn check_load(frame: &Frame, local: u16, expected: &VerificationType) -> CheckResult {
    let index = local as usize;
    if index + expected.width() > frame.locals.max_locals() {
        return violation(format!(
            "Local variable {} is not a valid index into the local variables (max_locals is {})",
            local,
            frame.locals.max_locals()
        ));
    }
    let found = frame.locals.get(index)?;
    if *found == VerificationType::Unknown {
        return violation(format!(
            "Reading local variable {}, whose content is unknown",
            local
        ));
    }
    if expected.width() == 2 && *frame.locals.get(index + 1)? != VerificationType::Unknown {
        return violation(format!(
            "Reading a two-slot value from local variables {} and {} where the latter has been \
             overwritten",
            local,
            index + 1
        ));
    }
    if found != expected {
        return violation(format!(
            "Local variable {} is {}, but the instruction expects {}",
            local, found, expected
        ));
    }
    Ok(())
}

/// `aload` may load uninitialized objects, but not return addresses
fn check_reference_load(frame: &Frame, local: u16) -> CheckResult {
    let found = frame.locals.get(local as usize)?;
    if *found == VerificationType::Unknown {
        return violation(format!(
            "Reading local variable {}, whose content is unknown",
            local
        ));
    }
    if !found.is_reference() {
        return violation(format!(
            "Local variable {} is {}, but aload expects a reference",
            local, found
        ));
    }
    Ok(())
}

fn check_store(frame: &Frame, local: u16, expected: &VerificationType) -> CheckResult {
    if local as usize + expected.width() > frame.locals.max_locals() {
        return violation(format!(
            "Local variable {} is not a valid index into the local variables (max_locals is {})",
            local,
            frame.locals.max_locals()
        ));
    }
    expect_type(frame, 0, expected, "Value stored")
}

/// `astore` may store references (initialized or not) and return addresses
fn check_reference_store(frame: &Frame, local: u16) -> CheckResult {
    frame.locals.get(local as usize)?;
    let found = frame.stack.peek(0)?;
    if !found.is_reference() && !matches!(found, VerificationType::ReturnAddress(_)) {
        return violation(format!(
            "astore expects a reference or return address on top of the stack, but found {}",
            found
        ));
    }
    Ok(())
}

fn is_base(base_type: BaseType) -> impl Fn(&FieldType<BinaryName>) -> bool {
    move |element| *element == FieldType::Base(base_type)
}

fn is_reference(element: &FieldType<BinaryName>) -> bool {
    matches!(element, FieldType::Ref(_))
}

fn is_byte_or_boolean(element: &FieldType<BinaryName>) -> bool {
    matches!(
        element,
        FieldType::Base(BaseType::Byte) | FieldType::Base(BaseType::Boolean)
    )
}

/// Check the array reference at some depth (`null` is always acceptable)
fn check_array_ref(
    frame: &Frame,
    depth: usize,
    element_name: &str,
    element_ok: impl Fn(&FieldType<BinaryName>) -> bool,
) -> CheckResult {
    match frame.stack.peek(depth)? {
        VerificationType::Null => Ok(()),
        VerificationType::Object(ref_type) => match ref_type.component_type() {
            Some(component) if element_ok(&component) => Ok(()),
            _ => violation(format!(
                "Expected an array of {} elements, but found {}",
                element_name,
                class_operand(ref_type)
            )),
        },
        other => violation(format!(
            "Expected an array of {} elements, but found {}",
            element_name, other
        )),
    }
}

fn check_array_load(
    frame: &Frame,
    element_name: &str,
    element_ok: impl Fn(&FieldType<BinaryName>) -> bool,
) -> CheckResult {
    expect_type(frame, 0, &VerificationType::Integer, "Array index")?;
    check_array_ref(frame, 1, element_name, element_ok)
}

fn check_array_store(
    frame: &Frame,
    value: &VerificationType,
    element_name: &str,
    element_ok: impl Fn(&FieldType<BinaryName>) -> bool,
) -> CheckResult {
    expect_type(frame, 0, value, "Value stored into the array")?;
    expect_type(frame, 1, &VerificationType::Integer, "Array index")?;
    check_array_ref(frame, 2, element_name, element_ok)
}

/// Referenced classes must themselves pass the class-level checks
fn check_referenced_class(env: &Environment, class: &BinaryName) -> CheckResult {
    match env.hierarchy.verify_class(class)? {
        ClassStatus::Verified => Ok(()),
        ClassStatus::Rejected(reason) => violation(format!(
            "Class {} is referenced, but cannot be loaded and resolved: {}",
            class, reason
        )),
    }
}

fn check_referenced_ref_type(env: &Environment, ref_type: &RefType<BinaryName>) -> CheckResult {
    match ref_type.element_class() {
        Some(class) => check_referenced_class(env, class),
        None => Ok(()),
    }
}

fn check_field_receiver(
    env: &Environment,
    frame: &Frame,
    depth: usize,
    field: &FieldRef,
    assigning: bool,
) -> CheckResult {
    let current_class = &env.signature.class;
    match frame.stack.peek(depth)? {
        VerificationType::Null => Ok(()),
        VerificationType::Object(found @ RefType::Object(_)) => {
            let expected = RefType::Object(field.class.clone());
            if env.hierarchy.is_assignable(found, &expected)? {
                Ok(())
            } else {
                violation(format!(
                    "Object of class {} does not have field {}.{}",
                    class_operand(found),
                    field.class,
                    field.name
                ))
            }
        }

        // Constructors may assign their own fields before calling the super constructor
        VerificationType::Uninitialized(class, UninitializedOrigin::This)
            if assigning && class == current_class && field.class == *current_class =>
        {
            if env
                .hierarchy
                .declares_field(&field.class, &field.name, &field.descriptor)?
            {
                Ok(())
            } else {
                violation(format!(
                    "Field {} is not declared by {}, so it cannot be assigned before the \
                     constructor of the superclass is called",
                    field.name, current_class
                ))
            }
        }
        found @ VerificationType::Uninitialized(_, _) => violation(format!(
            "Cannot access field {}.{} of an object whose constructor has not been called yet: {}",
            field.class, field.name, found
        )),
        other => violation(format!(
            "Field access expects an object reference that's not an array reference, but found {}",
            other
        )),
    }
}

/// Arguments at the top of the stack, last argument on top
fn check_arguments(
    env: &Environment,
    frame: &Frame,
    parameters: &[FieldType<BinaryName>],
) -> CheckResult {
    for (depth, parameter) in parameters.iter().rev().enumerate() {
        let found = frame.stack.peek(depth)?;
        let what = format!("Argument {}", parameters.len() - depth);
        expect_assignable(env, found, parameter, &what)?;
    }
    Ok(())
}

fn check_invoke(
    env: &Environment,
    frame: &Frame,
    invoke_type: InvokeType,
    method: &MethodRef,
) -> CheckResult {
    check_referenced_ref_type(env, &method.class)?;

    let is_init = method.name == UnqualifiedName::INIT;
    if method.name == UnqualifiedName::CLINIT {
        return violation("Class initializers cannot be invoked");
    }
    if is_init && invoke_type != InvokeType::Special {
        return violation("Constructors can only be invoked with invokespecial");
    }
    if is_init && method.descriptor.return_type.is_some() {
        return violation("Constructors must return void");
    }
    if let InvokeType::Interface(count) = invoke_type {
        let expected = method.descriptor.parameter_length(true);
        if count as usize != expected {
            return violation(format!(
                "The count operand of invokeinterface should be {}, but is {}",
                expected, count
            ));
        }
    }

    let parameters = &method.descriptor.parameters;
    check_arguments(env, frame, parameters)?;

    if invoke_type == InvokeType::Static {
        return Ok(());
    }

    let receiver = frame.stack.peek(parameters.len())?;
    if is_init {
        return match receiver {
            VerificationType::Uninitialized(class, _) => {
                let found = RefType::Object(class.clone());
                if env.hierarchy.is_assignable(&found, &method.class)? {
                    Ok(())
                } else {
                    violation(format!(
                        "The receiver {} is not a {}, so {}.<init> cannot initialize it",
                        receiver,
                        class_operand(&method.class),
                        class_operand(&method.class)
                    ))
                }
            }
            other => violation(format!(
                "Possibly initializing an object twice: the receiver of <init> must be an \
                 uninitialized object, but is {}",
                other
            )),
        };
    }

    match receiver {
        VerificationType::Null => Ok(()),
        VerificationType::Object(found) => {
            if matches!(invoke_type, InvokeType::Interface(_))
                || env.hierarchy.is_assignable(found, &method.class)?
            {
                Ok(())
            } else {
                violation(format!(
                    "The receiver of type {} does not implement {}",
                    class_operand(found),
                    class_operand(&method.class)
                ))
            }
        }
        VerificationType::Uninitialized(_, _) => violation(format!(
            "Cannot invoke {} on an object whose constructor has not been called yet: {}",
            method.name, receiver
        )),
        other => violation(format!(
            "The receiver of {} should be a reference, but is {}",
            method.name, other
        )),
    }
}

fn check_return(
    instruction: &Instruction,
    frame: &Frame,
    env: &Environment,
    state: &RunState,
) -> CheckResult {
    let declared = VerificationType::from_return_type(&env.signature.descriptor.return_type);

    match instruction {
        Instruction::Return => {
            if declared != VerificationType::Void {
                return violation(format!(
                    "return instruction in a method returning {}",
                    declared
                ));
            }
            let this_uninitialized = frame
                .locals
                .iter()
                .chain(frame.stack.iter())
                .any(|vtype| {
                    matches!(vtype, VerificationType::Uninitialized(_, UninitializedOrigin::This))
                });
            if env.signature.is_constructor() && (!state.this_initialized || this_uninitialized) {
                return violation(
                    "Leaving a constructor that itself did not call a constructor",
                );
            }
            Ok(())
        }
        Instruction::AReturn => {
            if !matches!(declared, VerificationType::Object(_)) {
                return violation(format!(
                    "areturn instruction in a method returning {}",
                    declared
                ));
            }
            expect_initialized_reference(frame, 0, "Returned value")
        }
        _ => {
            let kind = match instruction {
                Instruction::IReturn => VerificationType::Integer,
                Instruction::LReturn => VerificationType::Long,
                Instruction::FReturn => VerificationType::Float,
                _ => VerificationType::Double,
            };
            if declared != kind {
                return violation(format!(
                    "{} instruction in a method returning {}",
                    instruction.mnemonic(),
                    declared
                ));
            }
            expect_type(frame, 0, &kind, "Returned value")
        }
    }
}

#[cfg(test)]
mod test {
    use super::super::types::test::{class, Animals};
    use super::*;
    use crate::jvm::verifier::{MethodSignature, Settings};
    use crate::jvm::{MethodDescriptor, Name};

    fn constructor_of(class_name: &str) -> MethodSignature {
        MethodSignature {
            class: class(class_name),
            name: UnqualifiedName::INIT,
            descriptor: MethodDescriptor {
                parameters: vec![],
                return_type: None,
            },
            is_static: false,
        }
    }

    fn frame_with(stack: Vec<VerificationType>) -> Frame {
        let mut frame = Frame::new(2, 6);
        for value in stack {
            frame.stack.push(value).unwrap();
        }
        frame
    }

    fn run_check(
        signature: &MethodSignature,
        instruction: &Instruction,
        frame: &Frame,
    ) -> CheckResult {
        let settings = Settings::default();
        let env = Environment {
            signature,
            hierarchy: &Animals,
            settings: &settings,
        };
        let state = RunState {
            this_initialized: false,
        };
        check(instruction, frame, &env, &state)
    }

    fn field(owner: &str, name: &str) -> FieldRef {
        FieldRef {
            class: class(owner),
            name: UnqualifiedName::from_string(name.to_string()).unwrap(),
            descriptor: FieldType::Base(BaseType::Int),
        }
    }

    #[test]
    fn two_slot_values_stay_whole() {
        let signature = constructor_of("a/Dog");
        let frame = frame_with(vec![VerificationType::Integer, VerificationType::Long]);
        assert!(run_check(&signature, &Instruction::Pop2, &frame).is_ok());
        assert!(run_check(&signature, &Instruction::Pop, &frame).is_err());
        assert!(run_check(&signature, &Instruction::Dup2X1, &frame).is_ok());
        assert!(run_check(&signature, &Instruction::Swap, &frame).is_err());
        assert!(run_check(&signature, &Instruction::LNeg, &frame).is_ok());
        assert!(run_check(&signature, &Instruction::INeg, &frame).is_err());
    }

    #[test]
    fn constructors_assign_their_own_fields() {
        let signature = constructor_of("a/Dog");
        let this = VerificationType::Uninitialized(class("a/Dog"), UninitializedOrigin::This);
        let frame = frame_with(vec![this.clone(), VerificationType::Integer]);

        let own = Instruction::PutField(field("a/Dog", "legs"));
        assert!(run_check(&signature, &own, &frame).is_ok());

        let undeclared = Instruction::PutField(field("a/Dog", "tail"));
        assert!(run_check(&signature, &undeclared, &frame).is_err());

        let inherited = Instruction::PutField(field("a/Animal", "legs"));
        assert!(run_check(&signature, &inherited, &frame).is_err());

        let read = Instruction::GetField(field("a/Dog", "legs"));
        let frame = frame_with(vec![this]);
        assert!(run_check(&signature, &read, &frame).is_err());
    }

    #[test]
    fn referenced_classes_must_verify() {
        let signature = constructor_of("a/Dog");
        let frame = frame_with(vec![]);
        let broken = Instruction::GetStatic(field("a/Broken", "count"));
        let err = run_check(&signature, &broken, &frame).unwrap_err();
        assert!(err.is_rejection());
        assert!(err.to_string().contains("cannot be loaded and resolved"));
    }

    #[test]
    fn invocations() {
        let signature = constructor_of("a/Dog");
        let speak = |invoke_type| {
            Instruction::Invoke(
                invoke_type,
                MethodRef {
                    class: RefType::Object(class("a/Animal")),
                    name: UnqualifiedName::from_string("speak".to_string()).unwrap(),
                    descriptor: MethodDescriptor {
                        parameters: vec![FieldType::Base(BaseType::Int)],
                        return_type: None,
                    },
                    is_interface: false,
                },
            )
        };
        let cat = VerificationType::object(class("a/Cat"));
        let frame = frame_with(vec![cat, VerificationType::Integer]);
        assert!(run_check(&signature, &speak(InvokeType::Virtual), &frame).is_ok());
        assert!(run_check(&signature, &speak(InvokeType::Interface(2)), &frame).is_ok());
        assert!(run_check(&signature, &speak(InvokeType::Interface(1)), &frame).is_err());

        let wrong_receiver = frame_with(vec![
            VerificationType::object(BinaryName::STRING),
            VerificationType::Integer,
        ]);
        assert!(run_check(&signature, &speak(InvokeType::Virtual), &wrong_receiver).is_err());

        let wrong_argument = frame_with(vec![
            VerificationType::object(class("a/Cat")),
            VerificationType::Float,
        ]);
        assert!(run_check(&signature, &speak(InvokeType::Virtual), &wrong_argument).is_err());
    }

    #[test]
    fn stack_bounds() {
        let signature = constructor_of("a/Dog");
        let full = frame_with(vec![VerificationType::Integer; 6]);
        let err = run_check(&signature, &Instruction::Dup, &full).unwrap_err();
        assert!(err.to_string().contains("Cannot produce 1 stack slots"));

        let empty = frame_with(vec![]);
        let err = run_check(&signature, &Instruction::IAdd, &empty).unwrap_err();
        assert!(err.to_string().contains("Cannot consume 2 stack slots"));
    }
}
