use super::*;
use crate::jvm::class_file::{ClassConstantIndex, Code, ConstantIndex, ConstantPool};
use crate::jvm::{BaseType, BinaryName, Error, RefType};
use byteorder::{BigEndian, ReadBytesExt};
use std::collections::HashMap;
use std::io::Cursor;

/// Decode the `Code` attribute of a method into a `MethodBody`
///
/// Jump targets and exception table ranges are turned from byte offsets into instruction
/// indices. A jump into the middle of an instruction is an error.
pub fn decode_method_body(code: &Code, constants: &ConstantPool) -> Result<MethodBody, Error> {
    let bytes = &code.code_array;
    let mut cursor = Cursor::new(bytes.as_slice());
    let mut instructions = vec![];
    let mut byte_offsets = vec![];

    while (cursor.position() as usize) < bytes.len() {
        let offset = cursor.position() as usize;
        let insn = decode_instruction(&mut cursor, offset, constants).map_err(|err| match err {
            Error::IoError(_) => Error::BadBytecode {
                offset,
                message: String::from("Truncated instruction"),
            },
            other => other,
        })?;
        instructions.push(insn);
        byte_offsets.push(offset);
    }

    let indices: HashMap<usize, usize> = byte_offsets
        .iter()
        .enumerate()
        .map(|(idx, off)| (*off, idx))
        .collect();
    let resolve = |offset: usize| -> Result<InstructionIndex, Error> {
        indices
            .get(&offset)
            .map(|idx| InstructionIndex(*idx))
            .ok_or_else(|| Error::BadBytecode {
                offset,
                message: String::from("Offset is not the start of an instruction"),
            })
    };

    for insn in instructions.iter_mut() {
        insn.map_targets(|InstructionIndex(target)| resolve(target))?;
    }

    let mut exception_table = vec![];
    for handler in &code.exception_table {
        let end_pc = handler.end_pc as usize;
        let end = if end_pc == bytes.len() {
            InstructionIndex(instructions.len())
        } else {
            resolve(end_pc)?
        };
        let catch_type = match handler.catch_type {
            None => None,
            Some(class) => Some(constants.binary_class_name(class)?),
        };
        exception_table.push(ExceptionTableEntry {
            start: resolve(handler.start_pc as usize)?,
            end,
            handler: resolve(handler.handler_pc as usize)?,
            catch_type,
        });
    }

    Ok(MethodBody {
        instructions,
        byte_offsets,
        max_stack: code.max_stack,
        max_locals: code.max_locals,
        exception_table,
    })
}

/// Compute an absolute jump target (still a byte offset)
fn jump(offset: usize, relative: i32) -> Result<InstructionIndex, Error> {
    let target = offset as i64 + relative as i64;
    if target < 0 {
        Err(Error::BadBytecode {
            offset,
            message: format!("Jump to negative offset {}", target),
        })
    } else {
        Ok(InstructionIndex(target as usize))
    }
}

fn constant_index<R: ReadBytesExt>(cursor: &mut R) -> Result<ConstantIndex, Error> {
    Ok(ConstantIndex(cursor.read_u16::<BigEndian>()?))
}

fn class_type<R: ReadBytesExt>(
    cursor: &mut R,
    constants: &ConstantPool,
) -> Result<RefType<BinaryName>, Error> {
    let index = ClassConstantIndex(constant_index(cursor)?);
    constants.class_name(index)
}

/// Decode the instruction at `offset`, leaving jump targets as absolute byte offsets
fn decode_instruction(
    cursor: &mut Cursor<&[u8]>,
    offset: usize,
    constants: &ConstantPool,
) -> Result<Instruction, Error> {
    use Instruction::*;

    let opcode = cursor.read_u8()?;
    let insn = match opcode {
        0x00 => Nop,
        0x01 => AConstNull,
        0x02 => IConstM1,
        0x03 => IConst0,
        0x04 => IConst1,
        0x05 => IConst2,
        0x06 => IConst3,
        0x07 => IConst4,
        0x08 => IConst5,
        0x09 => LConst0,
        0x0a => LConst1,
        0x0b => FConst0,
        0x0c => FConst1,
        0x0d => FConst2,
        0x0e => DConst0,
        0x0f => DConst1,
        0x10 => BiPush(cursor.read_i8()?),
        0x11 => SiPush(cursor.read_i16::<BigEndian>()?),
        0x12 => {
            let index = ConstantIndex(cursor.read_u8()? as u16);
            Ldc(constants.loadable_constant(index)?)
        }
        0x13 => Ldc(constants.loadable_constant(constant_index(cursor)?)?),
        0x14 => Ldc2(constants.loadable_constant(constant_index(cursor)?)?),

        0x15 => ILoad(cursor.read_u8()? as u16),
        0x16 => LLoad(cursor.read_u8()? as u16),
        0x17 => FLoad(cursor.read_u8()? as u16),
        0x18 => DLoad(cursor.read_u8()? as u16),
        0x19 => ALoad(cursor.read_u8()? as u16),
        0x1a..=0x1d => ILoad((opcode - 0x1a) as u16),
        0x1e..=0x21 => LLoad((opcode - 0x1e) as u16),
        0x22..=0x25 => FLoad((opcode - 0x22) as u16),
        0x26..=0x29 => DLoad((opcode - 0x26) as u16),
        0x2a..=0x2d => ALoad((opcode - 0x2a) as u16),
        0x2e => IALoad,
        0x2f => LALoad,
        0x30 => FALoad,
        0x31 => DALoad,
        0x32 => AALoad,
        0x33 => BALoad,
        0x34 => CALoad,
        0x35 => SALoad,

        0x36 => IStore(cursor.read_u8()? as u16),
        0x37 => LStore(cursor.read_u8()? as u16),
        0x38 => FStore(cursor.read_u8()? as u16),
        0x39 => DStore(cursor.read_u8()? as u16),
        0x3a => AStore(cursor.read_u8()? as u16),
        0x3b..=0x3e => IStore((opcode - 0x3b) as u16),
        0x3f..=0x42 => LStore((opcode - 0x3f) as u16),
        0x43..=0x46 => FStore((opcode - 0x43) as u16),
        0x47..=0x4a => DStore((opcode - 0x47) as u16),
        0x4b..=0x4e => AStore((opcode - 0x4b) as u16),
        0x4f => IAStore,
        0x50 => LAStore,
        0x51 => FAStore,
        0x52 => DAStore,
        0x53 => AAStore,
        0x54 => BAStore,
        0x55 => CAStore,
        0x56 => SAStore,

        0x57 => Pop,
        0x58 => Pop2,
        0x59 => Dup,
        0x5a => DupX1,
        0x5b => DupX2,
        0x5c => Dup2,
        0x5d => Dup2X1,
        0x5e => Dup2X2,
        0x5f => Swap,

        0x60 => IAdd,
        0x61 => LAdd,
        0x62 => FAdd,
        0x63 => DAdd,
        0x64 => ISub,
        0x65 => LSub,
        0x66 => FSub,
        0x67 => DSub,
        0x68 => IMul,
        0x69 => LMul,
        0x6a => FMul,
        0x6b => DMul,
        0x6c => IDiv,
        0x6d => LDiv,
        0x6e => FDiv,
        0x6f => DDiv,
        0x70 => IRem,
        0x71 => LRem,
        0x72 => FRem,
        0x73 => DRem,
        0x74 => INeg,
        0x75 => LNeg,
        0x76 => FNeg,
        0x77 => DNeg,
        0x78 => ISh(ShiftType::Left),
        0x79 => LSh(ShiftType::Left),
        0x7a => ISh(ShiftType::ArithmeticRight),
        0x7b => LSh(ShiftType::ArithmeticRight),
        0x7c => ISh(ShiftType::LogicalRight),
        0x7d => LSh(ShiftType::LogicalRight),
        0x7e => IAnd,
        0x7f => LAnd,
        0x80 => IOr,
        0x81 => LOr,
        0x82 => IXor,
        0x83 => LXor,
        0x84 => IInc(cursor.read_u8()? as u16, cursor.read_i8()? as i16),

        0x85 => I2L,
        0x86 => I2F,
        0x87 => I2D,
        0x88 => L2I,
        0x89 => L2F,
        0x8a => L2D,
        0x8b => F2I,
        0x8c => F2L,
        0x8d => F2D,
        0x8e => D2I,
        0x8f => D2L,
        0x90 => D2F,
        0x91 => I2B,
        0x92 => I2C,
        0x93 => I2S,

        0x94 => LCmp,
        0x95 => FCmp(CompareMode::L),
        0x96 => FCmp(CompareMode::G),
        0x97 => DCmp(CompareMode::L),
        0x98 => DCmp(CompareMode::G),

        0x99..=0x9e => {
            let target = jump(offset, cursor.read_i16::<BigEndian>()? as i32)?;
            If(ord_comparison(opcode - 0x99), target)
        }
        0x9f..=0xa4 => {
            let target = jump(offset, cursor.read_i16::<BigEndian>()? as i32)?;
            IfICmp(ord_comparison(opcode - 0x9f), target)
        }
        0xa5 | 0xa6 => {
            let target = jump(offset, cursor.read_i16::<BigEndian>()? as i32)?;
            let comparison = if opcode == 0xa5 {
                EqComparison::EQ
            } else {
                EqComparison::NE
            };
            IfACmp(comparison, target)
        }
        0xa7 => Goto(jump(offset, cursor.read_i16::<BigEndian>()? as i32)?),
        0xa8 => Jsr(jump(offset, cursor.read_i16::<BigEndian>()? as i32)?),
        0xa9 => Ret(cursor.read_u8()? as u16),
        0xaa => {
            skip_switch_padding(cursor)?;
            let default = jump(offset, cursor.read_i32::<BigEndian>()?)?;
            let low = cursor.read_i32::<BigEndian>()?;
            let high = cursor.read_i32::<BigEndian>()?;
            if high < low {
                return Err(Error::BadBytecode {
                    offset,
                    message: format!("tableswitch has low {} above high {}", low, high),
                });
            }
            let count = (high as i64 - low as i64 + 1) as usize;
            let mut targets = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                targets.push(jump(offset, cursor.read_i32::<BigEndian>()?)?);
            }
            TableSwitch {
                default,
                low,
                targets,
            }
        }
        0xab => {
            skip_switch_padding(cursor)?;
            let default = jump(offset, cursor.read_i32::<BigEndian>()?)?;
            let npairs = cursor.read_i32::<BigEndian>()?;
            if npairs < 0 {
                return Err(Error::BadBytecode {
                    offset,
                    message: format!("lookupswitch has negative pair count {}", npairs),
                });
            }
            let mut targets = Vec::with_capacity((npairs as usize).min(1024));
            for _ in 0..npairs {
                let key = cursor.read_i32::<BigEndian>()?;
                targets.push((key, jump(offset, cursor.read_i32::<BigEndian>()?)?));
            }
            LookupSwitch { default, targets }
        }

        0xac => IReturn,
        0xad => LReturn,
        0xae => FReturn,
        0xaf => DReturn,
        0xb0 => AReturn,
        0xb1 => Return,

        0xb2 => GetStatic(constants.field_ref(constant_index(cursor)?)?),
        0xb3 => PutStatic(constants.field_ref(constant_index(cursor)?)?),
        0xb4 => GetField(constants.field_ref(constant_index(cursor)?)?),
        0xb5 => PutField(constants.field_ref(constant_index(cursor)?)?),
        0xb6 => Invoke(
            InvokeType::Virtual,
            constants.method_ref(constant_index(cursor)?)?,
        ),
        0xb7 => Invoke(
            InvokeType::Special,
            constants.method_ref(constant_index(cursor)?)?,
        ),
        0xb8 => Invoke(
            InvokeType::Static,
            constants.method_ref(constant_index(cursor)?)?,
        ),
        0xb9 => {
            let method = constants.method_ref(constant_index(cursor)?)?;
            let count = cursor.read_u8()?;
            let _zero = cursor.read_u8()?;
            Invoke(InvokeType::Interface(count), method)
        }
        0xba => {
            let indy = constants.invoke_dynamic(constant_index(cursor)?)?;
            let _zeros = cursor.read_u16::<BigEndian>()?;
            InvokeDynamic(indy)
        }

        0xbb => New(class_type(cursor, constants)?),
        0xbc => {
            let atype = cursor.read_u8()?;
            let base_type = match atype {
                4 => BaseType::Boolean,
                5 => BaseType::Char,
                6 => BaseType::Float,
                7 => BaseType::Double,
                8 => BaseType::Byte,
                9 => BaseType::Short,
                10 => BaseType::Int,
                11 => BaseType::Long,
                other => {
                    return Err(Error::BadBytecode {
                        offset,
                        message: format!("Unknown newarray element type {}", other),
                    })
                }
            };
            NewArray(base_type)
        }
        0xbd => ANewArray(class_type(cursor, constants)?),
        0xbe => ArrayLength,
        0xbf => AThrow,
        0xc0 => CheckCast(class_type(cursor, constants)?),
        0xc1 => InstanceOf(class_type(cursor, constants)?),
        0xc2 => MonitorEnter,
        0xc3 => MonitorExit,
        0xc4 => decode_wide(cursor, offset)?,
        0xc5 => {
            let class = class_type(cursor, constants)?;
            MultiANewArray(class, cursor.read_u8()?)
        }
        0xc6 => IfNull(
            EqComparison::EQ,
            jump(offset, cursor.read_i16::<BigEndian>()? as i32)?,
        ),
        0xc7 => IfNull(
            EqComparison::NE,
            jump(offset, cursor.read_i16::<BigEndian>()? as i32)?,
        ),
        0xc8 => Goto(jump(offset, cursor.read_i32::<BigEndian>()?)?),
        0xc9 => Jsr(jump(offset, cursor.read_i32::<BigEndian>()?)?),

        other => {
            return Err(Error::BadBytecode {
                offset,
                message: format!("Unknown opcode 0x{:02x}", other),
            })
        }
    };
    Ok(insn)
}

/// Operand layout of `ifeq`..`ifle` (and `if_icmpeq`..`if_icmple`)
fn ord_comparison(relative_opcode: u8) -> OrdComparison {
    match relative_opcode {
        0 => OrdComparison::EQ,
        1 => OrdComparison::NE,
        2 => OrdComparison::LT,
        3 => OrdComparison::GE,
        4 => OrdComparison::GT,
        _ => OrdComparison::LE,
    }
}

/// Switch operands start at the next multiple of 4 (counted from the start of the code)
fn skip_switch_padding(cursor: &mut Cursor<&[u8]>) -> Result<(), Error> {
    while cursor.position() % 4 != 0 {
        cursor.read_u8()?;
    }
    Ok(())
}

fn decode_wide(cursor: &mut Cursor<&[u8]>, offset: usize) -> Result<Instruction, Error> {
    use Instruction::*;

    let opcode = cursor.read_u8()?;
    let index = cursor.read_u16::<BigEndian>()?;
    let insn = match opcode {
        0x15 => ILoad(index),
        0x16 => LLoad(index),
        0x17 => FLoad(index),
        0x18 => DLoad(index),
        0x19 => ALoad(index),
        0x36 => IStore(index),
        0x37 => LStore(index),
        0x38 => FStore(index),
        0x39 => DStore(index),
        0x3a => AStore(index),
        0xa9 => Ret(index),
        0x84 => IInc(index, cursor.read_i16::<BigEndian>()?),
        other => {
            return Err(Error::BadBytecode {
                offset,
                message: format!("Opcode 0x{:02x} cannot be made wide", other),
            })
        }
    };
    Ok(insn)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::{Constant, ExceptionHandler, Utf8ConstantIndex};

    fn code(code_array: Vec<u8>, exception_table: Vec<ExceptionHandler>) -> Code {
        Code {
            max_stack: 4,
            max_locals: 4,
            code_array,
            exception_table,
            attributes: vec![],
        }
    }

    #[test]
    fn straight_line() {
        let pool = ConstantPool::new();
        let body = decode_method_body(
            &code(vec![0x1b, 0x1c, 0x60, 0xac], vec![]),
            &pool,
        )
        .unwrap();
        assert_eq!(
            body.instructions,
            vec![
                Instruction::ILoad(1),
                Instruction::ILoad(2),
                Instruction::IAdd,
                Instruction::IReturn
            ]
        );
        assert_eq!(body.byte_offsets, vec![0, 1, 2, 3]);
    }

    #[test]
    fn branches_become_indices() {
        let pool = ConstantPool::new();
        // 0: iload_0; 1: ifeq +7 (-> 8); 4: iconst_1; 5: goto +4 (-> 9); 8: nop; 9: ireturn
        let bytes = vec![0x1a, 0x99, 0x00, 0x07, 0x04, 0xa7, 0x00, 0x04, 0x00, 0xac];
        let body = decode_method_body(&code(bytes, vec![]), &pool).unwrap();
        assert_eq!(
            body.instructions,
            vec![
                Instruction::ILoad(0),
                Instruction::If(OrdComparison::EQ, InstructionIndex(4)),
                Instruction::IConst1,
                Instruction::Goto(InstructionIndex(5)),
                Instruction::Nop,
                Instruction::IReturn,
            ]
        );
    }

    #[test]
    fn jump_into_an_instruction() {
        let pool = ConstantPool::new();
        // goto +1 lands in the middle of the goto itself
        let bytes = vec![0xa7, 0x00, 0x01, 0xb1];
        assert!(matches!(
            decode_method_body(&code(bytes, vec![]), &pool),
            Err(Error::BadBytecode { offset: 1, .. })
        ));
    }

    #[test]
    fn wide_and_switches() {
        let pool = ConstantPool::new();
        let bytes = vec![
            0xc4, 0x84, 0x01, 0x00, 0xff, 0xfe, // 0: wide iinc 256 -2
            0x1a, // 6: iload_0
            0xaa, // 7: tableswitch (no padding needed)
            0x00, 0x00, 0x00, 0x11, // default -> 24
            0x00, 0x00, 0x00, 0x01, // low
            0x00, 0x00, 0x00, 0x01, // high
            0x00, 0x00, 0x00, 0x11, // 1 -> 24
            0xb1, // 24: return
        ];
        let body = decode_method_body(&code(bytes, vec![]), &pool).unwrap();
        assert_eq!(
            body.instructions,
            vec![
                Instruction::IInc(256, -2),
                Instruction::ILoad(0),
                Instruction::TableSwitch {
                    default: InstructionIndex(3),
                    low: 1,
                    targets: vec![InstructionIndex(3)],
                },
                Instruction::Return,
            ]
        );
        assert_eq!(body.byte_offsets, vec![0, 6, 7, 24]);
    }

    #[test]
    fn exception_table() {
        let mut pool = ConstantPool::new();
        let utf8 = pool.push(Constant::Utf8(String::from("java/lang/Exception")));
        let class = pool.push(Constant::Class(Utf8ConstantIndex(utf8)));

        // 0: aconst_null; 1: athrow; 2: astore_1; 3: return
        let bytes = vec![0x01, 0xbf, 0x4c, 0xb1];
        let handlers = vec![ExceptionHandler {
            start_pc: 0,
            end_pc: 2,
            handler_pc: 2,
            catch_type: Some(ClassConstantIndex(class)),
        }];
        let body = decode_method_body(&code(bytes, handlers), &pool).unwrap();
        assert_eq!(
            body.exception_table,
            vec![ExceptionTableEntry {
                start: InstructionIndex(0),
                end: InstructionIndex(2),
                handler: InstructionIndex(2),
                catch_type: Some(BinaryName::EXCEPTION),
            }]
        );
    }

    #[test]
    fn truncated_and_unknown() {
        let pool = ConstantPool::new();
        assert!(matches!(
            decode_method_body(&code(vec![0x10], vec![]), &pool),
            Err(Error::BadBytecode { offset: 0, .. })
        ));
        assert!(matches!(
            decode_method_body(&code(vec![0x00, 0xfe], vec![]), &pool),
            Err(Error::BadBytecode { offset: 1, .. })
        ));
    }
}
