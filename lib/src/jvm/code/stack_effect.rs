use super::{Instruction, InvokeType};
use crate::jvm::FieldType;
use crate::util::Width;

/// Operand stack effects, measured in stack slots (`long` and `double` take two)
///
/// Values are always consumed first, then produced.
impl Instruction {
    /// Number of stack slots popped by the instruction
    pub fn stack_consumed(&self) -> usize {
        use Instruction::*;

        match self {
            Nop | AConstNull | IConstM1 | IConst0 | IConst1 | IConst2 | IConst3 | IConst4
            | IConst5 | LConst0 | LConst1 | FConst0 | FConst1 | FConst2 | DConst0 | DConst1
            | BiPush(_) | SiPush(_) | Ldc(_) | Ldc2(_) => 0,

            ILoad(_) | LLoad(_) | FLoad(_) | DLoad(_) | ALoad(_) => 0,
            IALoad | LALoad | FALoad | DALoad | AALoad | BALoad | CALoad | SALoad => 2,

            IStore(_) | FStore(_) | AStore(_) => 1,
            LStore(_) | DStore(_) => 2,
            IAStore | FAStore | AAStore | BAStore | CAStore | SAStore => 3,
            LAStore | DAStore => 4,

            Pop => 1,
            Pop2 => 2,
            Dup => 1,
            DupX1 => 2,
            DupX2 => 3,
            Dup2 => 2,
            Dup2X1 => 3,
            Dup2X2 => 4,
            Swap => 2,

            IAdd | FAdd | ISub | FSub | IMul | FMul | IDiv | FDiv | IRem | FRem => 2,
            LAdd | DAdd | LSub | DSub | LMul | DMul | LDiv | DDiv | LRem | DRem => 4,
            INeg | FNeg => 1,
            LNeg | DNeg => 2,
            ISh(_) => 2,
            LSh(_) => 3,
            IAnd | IOr | IXor => 2,
            LAnd | LOr | LXor => 4,
            IInc(_, _) => 0,

            I2L | I2F | I2D | F2I | F2L | F2D | I2B | I2C | I2S => 1,
            L2I | L2F | L2D | D2I | D2L | D2F => 2,

            LCmp | DCmp(_) => 4,
            FCmp(_) => 2,

            If(_, _) | IfNull(_, _) => 1,
            IfICmp(_, _) | IfACmp(_, _) => 2,
            Goto(_) | Jsr(_) | Ret(_) => 0,
            TableSwitch { .. } | LookupSwitch { .. } => 1,

            IReturn | FReturn | AReturn => 1,
            LReturn | DReturn => 2,
            Return => 0,

            GetStatic(_) => 0,
            PutStatic(field) => field.descriptor.width(),
            GetField(_) => 1,
            PutField(field) => 1 + field.descriptor.width(),
            Invoke(invoke_type, method) => method
                .descriptor
                .parameter_length(!matches!(invoke_type, InvokeType::Static)),
            InvokeDynamic(indy) => indy.descriptor.parameter_length(false),

            New(_) => 0,
            NewArray(_) | ANewArray(_) | ArrayLength => 1,
            AThrow => 1,
            CheckCast(_) | InstanceOf(_) => 1,
            MonitorEnter | MonitorExit => 1,
            MultiANewArray(_, dimensions) => *dimensions as usize,
        }
    }

    /// Number of stack slots pushed by the instruction
    pub fn stack_produced(&self) -> usize {
        use Instruction::*;

        match self {
            Nop => 0,
            AConstNull | IConstM1 | IConst0 | IConst1 | IConst2 | IConst3 | IConst4 | IConst5
            | FConst0 | FConst1 | FConst2 | BiPush(_) | SiPush(_) => 1,
            LConst0 | LConst1 | DConst0 | DConst1 => 2,
            Ldc(constant) | Ldc2(constant) => constant.width(),

            ILoad(_) | FLoad(_) | ALoad(_) => 1,
            LLoad(_) | DLoad(_) => 2,
            IALoad | FALoad | AALoad | BALoad | CALoad | SALoad => 1,
            LALoad | DALoad => 2,

            IStore(_) | LStore(_) | FStore(_) | DStore(_) | AStore(_) => 0,
            IAStore | LAStore | FAStore | DAStore | AAStore | BAStore | CAStore | SAStore => 0,

            Pop | Pop2 => 0,
            Dup => 2,
            DupX1 => 3,
            DupX2 => 4,
            Dup2 => 4,
            Dup2X1 => 5,
            Dup2X2 => 6,
            Swap => 2,

            IAdd | FAdd | ISub | FSub | IMul | FMul | IDiv | FDiv | IRem | FRem => 1,
            LAdd | DAdd | LSub | DSub | LMul | DMul | LDiv | DDiv | LRem | DRem => 2,
            INeg | FNeg => 1,
            LNeg | DNeg => 2,
            ISh(_) => 1,
            LSh(_) => 2,
            IAnd | IOr | IXor => 1,
            LAnd | LOr | LXor => 2,
            IInc(_, _) => 0,

            I2F | L2I | L2F | F2I | D2I | D2F | I2B | I2C | I2S => 1,
            I2L | I2D | L2D | F2L | F2D | D2L => 2,

            LCmp | FCmp(_) | DCmp(_) => 1,

            If(_, _) | IfNull(_, _) | IfICmp(_, _) | IfACmp(_, _) => 0,
            Goto(_) | Ret(_) => 0,
            Jsr(_) => 1,
            TableSwitch { .. } | LookupSwitch { .. } => 0,

            IReturn | LReturn | FReturn | DReturn | AReturn | Return => 0,

            GetStatic(field) | GetField(field) => field.descriptor.width(),
            PutStatic(_) | PutField(_) => 0,
            Invoke(_, method) => return_width(&method.descriptor.return_type),
            InvokeDynamic(indy) => return_width(&indy.descriptor.return_type),

            New(_) | NewArray(_) | ANewArray(_) | ArrayLength => 1,
            AThrow => 0,
            CheckCast(_) | InstanceOf(_) => 1,
            MonitorEnter | MonitorExit => 0,
            MultiANewArray(_, _) => 1,
        }
    }
}

fn return_width<C>(return_type: &Option<FieldType<C>>) -> usize {
    return_type.as_ref().map_or(0, |typ| typ.width())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::{FieldRef, MethodRef};
    use crate::jvm::code::{InstructionIndex, ShiftType};
    use crate::jvm::{BinaryName, MethodDescriptor, Name, RefType, UnqualifiedName};

    #[test]
    fn simple_effects() {
        assert_eq!(Instruction::LAdd.stack_consumed(), 4);
        assert_eq!(Instruction::LAdd.stack_produced(), 2);
        assert_eq!(Instruction::LSh(ShiftType::Left).stack_consumed(), 3);
        assert_eq!(Instruction::Dup2X2.stack_produced(), 6);
        assert_eq!(Instruction::Jsr(InstructionIndex(0)).stack_produced(), 1);
        assert_eq!(Instruction::LAStore.stack_consumed(), 4);
    }

    #[test]
    fn member_effects() {
        let field = FieldRef {
            class: BinaryName::from_string(String::from("me/Point")).unwrap(),
            name: UnqualifiedName::from_string(String::from("x")).unwrap(),
            descriptor: FieldType::double(),
        };
        assert_eq!(Instruction::PutField(field.clone()).stack_consumed(), 3);
        assert_eq!(Instruction::GetStatic(field).stack_produced(), 2);

        let method = MethodRef {
            class: RefType::Object(BinaryName::OBJECT),
            name: UnqualifiedName::from_string(String::from("m")).unwrap(),
            descriptor: MethodDescriptor {
                parameters: vec![FieldType::long(), FieldType::int()],
                return_type: Some(FieldType::long()),
            },
            is_interface: false,
        };
        let virtual_call = Instruction::Invoke(InvokeType::Virtual, method.clone());
        let static_call = Instruction::Invoke(InvokeType::Static, method);
        assert_eq!(virtual_call.stack_consumed(), 4);
        assert_eq!(static_call.stack_consumed(), 3);
        assert_eq!(static_call.stack_produced(), 2);
    }
}
