//! This module contains the AST of JVM bytecode as seen by the verifier. The representation is
//! slightly different from the usual presentation to make it more convenient to analyze:
//!
//!   - The "wide" instruction doesn't show up at all, but instead gets merged into the
//!     instructions it is allowed to modify
//!
//!   - Some instructions (like the branches) get abstracted into one instruction with a field.
//!     This helps with repetitive pattern matches.
//!
//!   - Constant pool operands are already resolved, and jump targets are indices into the
//!     instruction list (not byte offsets)
//!

use crate::jvm::class_file::{FieldRef, InvokeDynamicRef, LoadableConstant, MethodRef};
use crate::jvm::{BaseType, BinaryName, Name, RefType, RenderDescriptor};
use std::fmt;

/// Position of an instruction in a method body's instruction list
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct InstructionIndex(pub usize);

impl InstructionIndex {
    /// Index of the physically next instruction
    pub fn next(self) -> InstructionIndex {
        InstructionIndex(self.0 + 1)
    }
}

impl fmt::Display for InstructionIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// JVM bytecode instruction
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    Nop,
    AConstNull,
    IConstM1,
    IConst0,
    IConst1,
    IConst2,
    IConst3,
    IConst4,
    IConst5,
    LConst0,
    LConst1,
    FConst0,
    FConst1,
    FConst2,
    DConst0,
    DConst1,
    BiPush(i8),
    SiPush(i16),
    Ldc(LoadableConstant), // covers both `ldc` and `ldc_w`
    Ldc2(LoadableConstant),
    ILoad(u16), // covers `iload`, `iload{0,3}`, and `wide iload`
    LLoad(u16),
    FLoad(u16),
    DLoad(u16),
    ALoad(u16),
    IALoad,
    LALoad,
    FALoad,
    DALoad,
    AALoad,
    BALoad,
    CALoad,
    SALoad,
    IStore(u16), // covers `istore`, `istore{0,3}`, and `wide istore`
    LStore(u16),
    FStore(u16),
    DStore(u16),
    AStore(u16),
    IAStore,
    LAStore,
    FAStore,
    DAStore,
    AAStore,
    BAStore,
    CAStore,
    SAStore,
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
    IAdd,
    LAdd,
    FAdd,
    DAdd,
    ISub,
    LSub,
    FSub,
    DSub,
    IMul,
    LMul,
    FMul,
    DMul,
    IDiv,
    LDiv,
    FDiv,
    DDiv,
    IRem,
    LRem,
    FRem,
    DRem,
    INeg,
    LNeg,
    FNeg,
    DNeg,
    ISh(ShiftType), // covers `ishr`, `ishl`, and `iushr`
    LSh(ShiftType), // covers `lshr`, `lshl`, and `lushr`
    IAnd,
    LAnd,
    IOr,
    LOr,
    IXor,
    LXor,
    IInc(u16, i16), // covers `iinc` and `wide iinc`
    I2L,
    I2F,
    I2D,
    L2I,
    L2F,
    L2D,
    F2I,
    F2L,
    F2D,
    D2I,
    D2L,
    D2F,
    I2B,
    I2C,
    I2S,
    LCmp,
    FCmp(CompareMode), // covers `fcmpl` and `fcmpg`
    DCmp(CompareMode), // covers `dcmpl` and `dcmpg`
    If(OrdComparison, InstructionIndex), // covers `ifeq`, `ifne`, `iflt`, `ifge`, `ifgt`, `ifle`
    IfICmp(OrdComparison, InstructionIndex), // covers `if_icmpeq`, `if_icmpne`, ... `if_icmple`
    IfACmp(EqComparison, InstructionIndex), // covers `if_acmpeq`, `if_acmpne`
    Goto(InstructionIndex),                 // covers `goto` and `goto_w`
    Jsr(InstructionIndex),                  // covers `jsr` and `jsr_w`
    Ret(u16),
    TableSwitch {
        default: InstructionIndex,
        low: i32,
        targets: Vec<InstructionIndex>,
    },
    LookupSwitch {
        default: InstructionIndex,
        targets: Vec<(i32, InstructionIndex)>,
    },
    IReturn,
    LReturn,
    FReturn,
    DReturn,
    AReturn,
    Return,
    GetStatic(FieldRef),
    PutStatic(FieldRef),
    GetField(FieldRef),
    PutField(FieldRef),
    Invoke(InvokeType, MethodRef),
    InvokeDynamic(InvokeDynamicRef),
    New(RefType<BinaryName>),
    NewArray(BaseType),
    ANewArray(RefType<BinaryName>), // component type of the array
    ArrayLength,
    AThrow,
    CheckCast(RefType<BinaryName>),
    InstanceOf(RefType<BinaryName>),
    MonitorEnter,
    MonitorExit,
    MultiANewArray(RefType<BinaryName>, u8),
    IfNull(EqComparison, InstructionIndex), // covers `ifnull`, `ifnonnull`
}

impl Instruction {
    /// Jump targets encoded in the instruction itself
    ///
    /// This does not include the physically next instruction, nor the dynamic target of `ret`.
    pub fn branch_targets(&self) -> Vec<InstructionIndex> {
        match self {
            Instruction::If(_, target)
            | Instruction::IfICmp(_, target)
            | Instruction::IfACmp(_, target)
            | Instruction::IfNull(_, target)
            | Instruction::Goto(target)
            | Instruction::Jsr(target) => vec![*target],
            Instruction::TableSwitch {
                default, targets, ..
            } => std::iter::once(*default)
                .chain(targets.iter().copied())
                .collect(),
            Instruction::LookupSwitch { default, targets } => std::iter::once(*default)
                .chain(targets.iter().map(|(_, target)| *target))
                .collect(),
            _ => vec![],
        }
    }

    /// Rewrite every jump target
    pub fn map_targets<E>(
        &mut self,
        mut map: impl FnMut(InstructionIndex) -> Result<InstructionIndex, E>,
    ) -> Result<(), E> {
        match self {
            Instruction::If(_, target)
            | Instruction::IfICmp(_, target)
            | Instruction::IfACmp(_, target)
            | Instruction::IfNull(_, target)
            | Instruction::Goto(target)
            | Instruction::Jsr(target) => *target = map(*target)?,
            Instruction::TableSwitch {
                default, targets, ..
            } => {
                *default = map(*default)?;
                for target in targets {
                    *target = map(*target)?;
                }
            }
            Instruction::LookupSwitch { default, targets } => {
                *default = map(*default)?;
                for (_, target) in targets {
                    *target = map(*target)?;
                }
            }
            _ => (),
        }
        Ok(())
    }

    /// Can execution continue to the physically next instruction?
    ///
    /// `jsr` counts as falling through since the matching `ret` comes back to the next
    /// instruction.
    pub fn falls_through(&self) -> bool {
        !matches!(
            self,
            Instruction::Goto(_)
                | Instruction::Ret(_)
                | Instruction::TableSwitch { .. }
                | Instruction::LookupSwitch { .. }
                | Instruction::IReturn
                | Instruction::LReturn
                | Instruction::FReturn
                | Instruction::DReturn
                | Instruction::AReturn
                | Instruction::Return
                | Instruction::AThrow
        )
    }

    /// Is this one of the method return instructions?
    pub fn is_return(&self) -> bool {
        matches!(
            self,
            Instruction::IReturn
                | Instruction::LReturn
                | Instruction::FReturn
                | Instruction::DReturn
                | Instruction::AReturn
                | Instruction::Return
        )
    }

    /// Is this a two-way conditional branch?
    pub fn is_conditional(&self) -> bool {
        matches!(
            self,
            Instruction::If(_, _)
                | Instruction::IfICmp(_, _)
                | Instruction::IfACmp(_, _)
                | Instruction::IfNull(_, _)
        )
    }

    /// Local variable slot touched by the instruction, along with the width of the access
    pub fn local_variable(&self) -> Option<(u16, usize)> {
        match self {
            Instruction::ILoad(idx)
            | Instruction::FLoad(idx)
            | Instruction::ALoad(idx)
            | Instruction::IStore(idx)
            | Instruction::FStore(idx)
            | Instruction::AStore(idx)
            | Instruction::IInc(idx, _)
            | Instruction::Ret(idx) => Some((*idx, 1)),
            Instruction::LLoad(idx)
            | Instruction::DLoad(idx)
            | Instruction::LStore(idx)
            | Instruction::DStore(idx) => Some((*idx, 2)),
            _ => None,
        }
    }

    /// Name of the instruction as it appears in the JVM specification
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::Nop => "nop",
            Instruction::AConstNull => "aconst_null",
            Instruction::IConstM1 => "iconst_m1",
            Instruction::IConst0 => "iconst_0",
            Instruction::IConst1 => "iconst_1",
            Instruction::IConst2 => "iconst_2",
            Instruction::IConst3 => "iconst_3",
            Instruction::IConst4 => "iconst_4",
            Instruction::IConst5 => "iconst_5",
            Instruction::LConst0 => "lconst_0",
            Instruction::LConst1 => "lconst_1",
            Instruction::FConst0 => "fconst_0",
            Instruction::FConst1 => "fconst_1",
            Instruction::FConst2 => "fconst_2",
            Instruction::DConst0 => "dconst_0",
            Instruction::DConst1 => "dconst_1",
            Instruction::BiPush(_) => "bipush",
            Instruction::SiPush(_) => "sipush",
            Instruction::Ldc(_) => "ldc",
            Instruction::Ldc2(_) => "ldc2_w",
            Instruction::ILoad(_) => "iload",
            Instruction::LLoad(_) => "lload",
            Instruction::FLoad(_) => "fload",
            Instruction::DLoad(_) => "dload",
            Instruction::ALoad(_) => "aload",
            Instruction::IALoad => "iaload",
            Instruction::LALoad => "laload",
            Instruction::FALoad => "faload",
            Instruction::DALoad => "daload",
            Instruction::AALoad => "aaload",
            Instruction::BALoad => "baload",
            Instruction::CALoad => "caload",
            Instruction::SALoad => "saload",
            Instruction::IStore(_) => "istore",
            Instruction::LStore(_) => "lstore",
            Instruction::FStore(_) => "fstore",
            Instruction::DStore(_) => "dstore",
            Instruction::AStore(_) => "astore",
            Instruction::IAStore => "iastore",
            Instruction::LAStore => "lastore",
            Instruction::FAStore => "fastore",
            Instruction::DAStore => "dastore",
            Instruction::AAStore => "aastore",
            Instruction::BAStore => "bastore",
            Instruction::CAStore => "castore",
            Instruction::SAStore => "sastore",
            Instruction::Pop => "pop",
            Instruction::Pop2 => "pop2",
            Instruction::Dup => "dup",
            Instruction::DupX1 => "dup_x1",
            Instruction::DupX2 => "dup_x2",
            Instruction::Dup2 => "dup2",
            Instruction::Dup2X1 => "dup2_x1",
            Instruction::Dup2X2 => "dup2_x2",
            Instruction::Swap => "swap",
            Instruction::IAdd => "iadd",
            Instruction::LAdd => "ladd",
            Instruction::FAdd => "fadd",
            Instruction::DAdd => "dadd",
            Instruction::ISub => "isub",
            Instruction::LSub => "lsub",
            Instruction::FSub => "fsub",
            Instruction::DSub => "dsub",
            Instruction::IMul => "imul",
            Instruction::LMul => "lmul",
            Instruction::FMul => "fmul",
            Instruction::DMul => "dmul",
            Instruction::IDiv => "idiv",
            Instruction::LDiv => "ldiv",
            Instruction::FDiv => "fdiv",
            Instruction::DDiv => "ddiv",
            Instruction::IRem => "irem",
            Instruction::LRem => "lrem",
            Instruction::FRem => "frem",
            Instruction::DRem => "drem",
            Instruction::INeg => "ineg",
            Instruction::LNeg => "lneg",
            Instruction::FNeg => "fneg",
            Instruction::DNeg => "dneg",
            Instruction::ISh(ShiftType::Left) => "ishl",
            Instruction::ISh(ShiftType::ArithmeticRight) => "ishr",
            Instruction::ISh(ShiftType::LogicalRight) => "iushr",
            Instruction::LSh(ShiftType::Left) => "lshl",
            Instruction::LSh(ShiftType::ArithmeticRight) => "lshr",
            Instruction::LSh(ShiftType::LogicalRight) => "lushr",
            Instruction::IAnd => "iand",
            Instruction::LAnd => "land",
            Instruction::IOr => "ior",
            Instruction::LOr => "lor",
            Instruction::IXor => "ixor",
            Instruction::LXor => "lxor",
            Instruction::IInc(_, _) => "iinc",
            Instruction::I2L => "i2l",
            Instruction::I2F => "i2f",
            Instruction::I2D => "i2d",
            Instruction::L2I => "l2i",
            Instruction::L2F => "l2f",
            Instruction::L2D => "l2d",
            Instruction::F2I => "f2i",
            Instruction::F2L => "f2l",
            Instruction::F2D => "f2d",
            Instruction::D2I => "d2i",
            Instruction::D2L => "d2l",
            Instruction::D2F => "d2f",
            Instruction::I2B => "i2b",
            Instruction::I2C => "i2c",
            Instruction::I2S => "i2s",
            Instruction::LCmp => "lcmp",
            Instruction::FCmp(CompareMode::L) => "fcmpl",
            Instruction::FCmp(CompareMode::G) => "fcmpg",
            Instruction::DCmp(CompareMode::L) => "dcmpl",
            Instruction::DCmp(CompareMode::G) => "dcmpg",
            Instruction::If(OrdComparison::EQ, _) => "ifeq",
            Instruction::If(OrdComparison::NE, _) => "ifne",
            Instruction::If(OrdComparison::LT, _) => "iflt",
            Instruction::If(OrdComparison::GE, _) => "ifge",
            Instruction::If(OrdComparison::GT, _) => "ifgt",
            Instruction::If(OrdComparison::LE, _) => "ifle",
            Instruction::IfICmp(OrdComparison::EQ, _) => "if_icmpeq",
            Instruction::IfICmp(OrdComparison::NE, _) => "if_icmpne",
            Instruction::IfICmp(OrdComparison::LT, _) => "if_icmplt",
            Instruction::IfICmp(OrdComparison::GE, _) => "if_icmpge",
            Instruction::IfICmp(OrdComparison::GT, _) => "if_icmpgt",
            Instruction::IfICmp(OrdComparison::LE, _) => "if_icmple",
            Instruction::IfACmp(EqComparison::EQ, _) => "if_acmpeq",
            Instruction::IfACmp(EqComparison::NE, _) => "if_acmpne",
            Instruction::Goto(_) => "goto",
            Instruction::Jsr(_) => "jsr",
            Instruction::Ret(_) => "ret",
            Instruction::TableSwitch { .. } => "tableswitch",
            Instruction::LookupSwitch { .. } => "lookupswitch",
            Instruction::IReturn => "ireturn",
            Instruction::LReturn => "lreturn",
            Instruction::FReturn => "freturn",
            Instruction::DReturn => "dreturn",
            Instruction::AReturn => "areturn",
            Instruction::Return => "return",
            Instruction::GetStatic(_) => "getstatic",
            Instruction::PutStatic(_) => "putstatic",
            Instruction::GetField(_) => "getfield",
            Instruction::PutField(_) => "putfield",
            Instruction::Invoke(InvokeType::Virtual, _) => "invokevirtual",
            Instruction::Invoke(InvokeType::Special, _) => "invokespecial",
            Instruction::Invoke(InvokeType::Static, _) => "invokestatic",
            Instruction::Invoke(InvokeType::Interface(_), _) => "invokeinterface",
            Instruction::InvokeDynamic(_) => "invokedynamic",
            Instruction::New(_) => "new",
            Instruction::NewArray(_) => "newarray",
            Instruction::ANewArray(_) => "anewarray",
            Instruction::ArrayLength => "arraylength",
            Instruction::AThrow => "athrow",
            Instruction::CheckCast(_) => "checkcast",
            Instruction::InstanceOf(_) => "instanceof",
            Instruction::MonitorEnter => "monitorenter",
            Instruction::MonitorExit => "monitorexit",
            Instruction::MultiANewArray(_, _) => "multianewarray",
            Instruction::IfNull(EqComparison::EQ, _) => "ifnull",
            Instruction::IfNull(EqComparison::NE, _) => "ifnonnull",
        }
    }
}

/// Class operands print as binary names, array operands as descriptors
pub(crate) fn class_operand(ref_type: &RefType<BinaryName>) -> String {
    match ref_type {
        RefType::Object(name) => name.as_str().to_string(),
        other => other.render(),
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())?;
        match self {
            Instruction::BiPush(b) => write!(f, " {}", b),
            Instruction::SiPush(s) => write!(f, " {}", s),
            Instruction::Ldc(constant) | Instruction::Ldc2(constant) => {
                write!(f, " {:?}", constant)
            }
            Instruction::ILoad(idx)
            | Instruction::LLoad(idx)
            | Instruction::FLoad(idx)
            | Instruction::DLoad(idx)
            | Instruction::ALoad(idx)
            | Instruction::IStore(idx)
            | Instruction::LStore(idx)
            | Instruction::FStore(idx)
            | Instruction::DStore(idx)
            | Instruction::AStore(idx)
            | Instruction::Ret(idx) => write!(f, " {}", idx),
            Instruction::IInc(idx, by) => write!(f, " {} {}", idx, by),
            Instruction::If(_, target)
            | Instruction::IfICmp(_, target)
            | Instruction::IfACmp(_, target)
            | Instruction::IfNull(_, target)
            | Instruction::Goto(target)
            | Instruction::Jsr(target) => write!(f, " {}", target),
            Instruction::TableSwitch {
                default,
                low,
                targets,
            } => {
                for (i, target) in targets.iter().enumerate() {
                    write!(f, " {}:{}", *low as i64 + i as i64, target)?;
                }
                write!(f, " default:{}", default)
            }
            Instruction::LookupSwitch { default, targets } => {
                for (key, target) in targets {
                    write!(f, " {}:{}", key, target)?;
                }
                write!(f, " default:{}", default)
            }
            Instruction::GetStatic(field)
            | Instruction::PutStatic(field)
            | Instruction::GetField(field)
            | Instruction::PutField(field) => write!(
                f,
                " {}.{}:{}",
                field.class,
                field.name,
                field.descriptor.render()
            ),
            Instruction::Invoke(_, method) => write!(
                f,
                " {}.{}:{}",
                class_operand(&method.class),
                method.name,
                method.descriptor.render()
            ),
            Instruction::InvokeDynamic(indy) => write!(
                f,
                " [{}]{}:{}",
                indy.bootstrap_method,
                indy.name,
                indy.descriptor.render()
            ),
            Instruction::New(class)
            | Instruction::ANewArray(class)
            | Instruction::CheckCast(class)
            | Instruction::InstanceOf(class) => write!(f, " {}", class_operand(class)),
            Instruction::NewArray(base_type) => write!(f, " {}", base_type.render()),
            Instruction::MultiANewArray(class, dimensions) => {
                write!(f, " {} {}", class_operand(class), dimensions)
            }
            _ => Ok(()),
        }
    }
}

/// Possible bit shifts
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum ShiftType {
    Left,
    LogicalRight,
    ArithmeticRight,
}

/// Comparison modes for floating point
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum CompareMode {
    /// -1 on NaN
    L,

    /// 1 on NaN
    G,
}

/// Binary comparison operators available for `int` branches
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum OrdComparison {
    EQ,
    GE,
    GT,
    LE,
    LT,
    NE,
}

/// Equality/inequality comparison operators
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum EqComparison {
    EQ,
    NE,
}

/// Type of method to invoke
///
/// Note: `InvokeDynamic` is kept separate because the constant argument it expects is not to a
/// `Constant::MethodRef`.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum InvokeType {
    Virtual,
    Special,
    Static,
    Interface(u8), // `count` is of total arguments, where `long`/`double` count for 2
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::{FieldType, MethodDescriptor, UnqualifiedName};

    #[test]
    fn targets_and_fall_through() {
        let switch = Instruction::TableSwitch {
            default: InstructionIndex(9),
            low: 3,
            targets: vec![InstructionIndex(4), InstructionIndex(7)],
        };
        assert_eq!(
            switch.branch_targets(),
            vec![InstructionIndex(9), InstructionIndex(4), InstructionIndex(7)]
        );
        assert!(!switch.falls_through());

        let jsr = Instruction::Jsr(InstructionIndex(5));
        assert_eq!(jsr.branch_targets(), vec![InstructionIndex(5)]);
        assert!(jsr.falls_through());

        assert!(Instruction::If(OrdComparison::LT, InstructionIndex(0)).falls_through());
        assert!(!Instruction::AThrow.falls_through());
        assert!(Instruction::AReturn.is_return());
        assert!(!Instruction::Ret(1).is_return());
    }

    #[test]
    fn remap_targets() {
        let mut lookup = Instruction::LookupSwitch {
            default: InstructionIndex(10),
            targets: vec![(-1, InstructionIndex(20)), (8, InstructionIndex(30))],
        };
        lookup
            .map_targets(|InstructionIndex(off)| Ok::<_, ()>(InstructionIndex(off / 10)))
            .unwrap();
        assert_eq!(
            lookup,
            Instruction::LookupSwitch {
                default: InstructionIndex(1),
                targets: vec![(-1, InstructionIndex(2)), (8, InstructionIndex(3))],
            }
        );

        let mut goto = Instruction::Goto(InstructionIndex(3));
        assert_eq!(goto.map_targets(|_| Err("not a boundary")), Err("not a boundary"));
    }

    #[test]
    fn display() {
        assert_eq!(Instruction::ILoad(3).to_string(), "iload 3");
        assert_eq!(
            Instruction::IfNull(EqComparison::NE, InstructionIndex(4)).to_string(),
            "ifnonnull #4"
        );
        let length = MethodRef {
            class: RefType::Object(BinaryName::STRING),
            name: UnqualifiedName::from_string(String::from("length")).unwrap(),
            descriptor: MethodDescriptor {
                parameters: vec![],
                return_type: Some(FieldType::int()),
            },
            is_interface: false,
        };
        assert_eq!(
            Instruction::Invoke(InvokeType::Virtual, length).to_string(),
            "invokevirtual java/lang/String.length:()I"
        );
        assert_eq!(
            Instruction::ANewArray(RefType::array(FieldType::int())).to_string(),
            "anewarray [I"
        );
    }

    #[test]
    fn local_variables() {
        assert_eq!(Instruction::DStore(4).local_variable(), Some((4, 2)));
        assert_eq!(Instruction::Ret(2).local_variable(), Some((2, 1)));
        assert_eq!(Instruction::IInc(7, -1).local_variable(), Some((7, 1)));
        assert_eq!(Instruction::IAdd.local_variable(), None);
    }
}
