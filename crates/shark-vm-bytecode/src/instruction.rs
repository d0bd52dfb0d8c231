//! Decoded instructions

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::error::{BytecodeError, Result};
use crate::module::ModuleImage;
use crate::opcode::{ArithOp, Opcode};
use crate::operand::{ConstantIndex, JumpOffset, LocalIndex};

/// A decoded instruction with its operands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum Instruction {
    End,
    Null,
    True,
    False,
    LoadGlobal { name: ConstantIndex },
    Load { slot: LocalIndex },
    GetField { name: ConstantIndex },
    EnterClass { name: ConstantIndex },
    ExitClass,
    Define { name: ConstantIndex },
    DefineField { name: ConstantIndex },
    /// Function header; `body_len` bytes of inline body follow it
    Function {
        arity: u16,
        name: ConstantIndex,
        body_len: u32,
    },
    NotImplemented,
    Exit { count: u16 },
    Dup,
    Drop,
    Swap,
    Mul,
    Div,
    Mod,
    Add,
    Sub,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    In,
    NotIn,
    Neg,
    Not,
    FunctionCall { argc: u8 },
    MethodCall { argc: u8, name: ConstantIndex },
    GetSlice,
    GetIndex,
    SelfRef,
    SuperCall { argc: u8 },
    Sizeof,
    New { argc: u8 },
    Instanceof,
    ArrayNew,
    ArrayNewAppend,
    TableNew,
    TableNewInsert,
    Const { index: ConstantIndex },
    Return,
    Insert,
    Append,
    StoreGlobal { name: ConstantIndex },
    Store { slot: LocalIndex },
    SetStatic { name: ConstantIndex },
    SetField { name: ConstantIndex },
    SetSlice,
    SetIndex,
    GetFieldTop { name: ConstantIndex },
    GetIndexTop,
    GetStatic { name: ConstantIndex },
    GetStaticTop { name: ConstantIndex },
    If { offset: JumpOffset },
    Jump { offset: JumpOffset },
    Loop { offset: JumpOffset },
    Zero,
    Inc { slot: LocalIndex },
    Or { offset: JumpOffset },
    And { offset: JumpOffset },
    SetIndexAu { op: ArithOp },
    SetFieldAu { op: ArithOp, name: ConstantIndex },
    SetStaticAu { op: ArithOp, name: ConstantIndex },
    ArrayClose,
    TableClose,
}

struct Cursor<'a> {
    code: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn u8(&mut self) -> Result<u8> {
        let byte = *self.code.get(self.pos).ok_or(BytecodeError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(byte)
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes([self.u8()?, self.u8()?]))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes([self.u8()?, self.u8()?, self.u8()?, self.u8()?]))
    }

    fn constant(&mut self) -> Result<ConstantIndex> {
        self.u32().map(ConstantIndex)
    }

    fn local(&mut self) -> Result<LocalIndex> {
        self.u16().map(LocalIndex)
    }

    fn jump(&mut self) -> Result<JumpOffset> {
        self.u16().map(JumpOffset)
    }

    fn arith(&mut self) -> Result<ArithOp> {
        let byte = self.u8()?;
        ArithOp::from_byte(byte).ok_or(BytecodeError::InvalidOpcode(byte))
    }
}

impl Instruction {
    /// Decode the instruction at `pc`, returning it with the offset just
    /// past its operands (an inline function body is not skipped)
    pub fn decode(code: &[u8], pc: usize) -> Result<(Self, usize)> {
        let mut c = Cursor { code, pos: pc };
        let byte = c.u8()?;
        let opcode = Opcode::from_byte(byte).ok_or(BytecodeError::InvalidOpcode(byte))?;
        let insn = match opcode {
            Opcode::End => Self::End,
            Opcode::Null => Self::Null,
            Opcode::True => Self::True,
            Opcode::False => Self::False,
            Opcode::LoadGlobal => Self::LoadGlobal { name: c.constant()? },
            Opcode::Load => Self::Load { slot: c.local()? },
            Opcode::GetField => Self::GetField { name: c.constant()? },
            Opcode::EnterClass => Self::EnterClass { name: c.constant()? },
            Opcode::ExitClass => Self::ExitClass,
            Opcode::Define => Self::Define { name: c.constant()? },
            Opcode::DefineField => Self::DefineField { name: c.constant()? },
            Opcode::Function => Self::Function {
                arity: c.u16()?,
                name: c.constant()?,
                body_len: c.u32()?,
            },
            Opcode::NotImplemented => Self::NotImplemented,
            Opcode::Exit => Self::Exit { count: c.u16()? },
            Opcode::Dup => Self::Dup,
            Opcode::Drop => Self::Drop,
            Opcode::Swap => Self::Swap,
            Opcode::Mul => Self::Mul,
            Opcode::Div => Self::Div,
            Opcode::Mod => Self::Mod,
            Opcode::Add => Self::Add,
            Opcode::Sub => Self::Sub,
            Opcode::Lt => Self::Lt,
            Opcode::Le => Self::Le,
            Opcode::Gt => Self::Gt,
            Opcode::Ge => Self::Ge,
            Opcode::Eq => Self::Eq,
            Opcode::Ne => Self::Ne,
            Opcode::In => Self::In,
            Opcode::NotIn => Self::NotIn,
            Opcode::Neg => Self::Neg,
            Opcode::Not => Self::Not,
            Opcode::FunctionCall => Self::FunctionCall { argc: c.u8()? },
            Opcode::MethodCall => Self::MethodCall {
                argc: c.u8()?,
                name: c.constant()?,
            },
            Opcode::GetSlice => Self::GetSlice,
            Opcode::GetIndex => Self::GetIndex,
            Opcode::SelfRef => Self::SelfRef,
            Opcode::SuperCall => Self::SuperCall { argc: c.u8()? },
            Opcode::Sizeof => Self::Sizeof,
            Opcode::New => Self::New { argc: c.u8()? },
            Opcode::Instanceof => Self::Instanceof,
            Opcode::ArrayNew => Self::ArrayNew,
            Opcode::ArrayNewAppend => Self::ArrayNewAppend,
            Opcode::TableNew => Self::TableNew,
            Opcode::TableNewInsert => Self::TableNewInsert,
            Opcode::Const => Self::Const { index: c.constant()? },
            Opcode::Return => Self::Return,
            Opcode::Insert => Self::Insert,
            Opcode::Append => Self::Append,
            Opcode::StoreGlobal => Self::StoreGlobal { name: c.constant()? },
            Opcode::Store => Self::Store { slot: c.local()? },
            Opcode::SetStatic => Self::SetStatic { name: c.constant()? },
            Opcode::SetField => Self::SetField { name: c.constant()? },
            Opcode::SetSlice => Self::SetSlice,
            Opcode::SetIndex => Self::SetIndex,
            Opcode::GetFieldTop => Self::GetFieldTop { name: c.constant()? },
            Opcode::GetIndexTop => Self::GetIndexTop,
            Opcode::GetStatic => Self::GetStatic { name: c.constant()? },
            Opcode::GetStaticTop => Self::GetStaticTop { name: c.constant()? },
            Opcode::If => Self::If { offset: c.jump()? },
            Opcode::Jump => Self::Jump { offset: c.jump()? },
            Opcode::Loop => Self::Loop { offset: c.jump()? },
            Opcode::Zero => Self::Zero,
            Opcode::Inc => Self::Inc { slot: c.local()? },
            Opcode::Or => Self::Or { offset: c.jump()? },
            Opcode::And => Self::And { offset: c.jump()? },
            Opcode::SetIndexAu => Self::SetIndexAu { op: c.arith()? },
            Opcode::SetFieldAu => Self::SetFieldAu {
                op: c.arith()?,
                name: c.constant()?,
            },
            Opcode::SetStaticAu => Self::SetStaticAu {
                op: c.arith()?,
                name: c.constant()?,
            },
            Opcode::ArrayClose => Self::ArrayClose,
            Opcode::TableClose => Self::TableClose,
        };
        Ok((insn, c.pos))
    }

    /// Opcode of this instruction
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::End => Opcode::End,
            Self::Null => Opcode::Null,
            Self::True => Opcode::True,
            Self::False => Opcode::False,
            Self::LoadGlobal { .. } => Opcode::LoadGlobal,
            Self::Load { .. } => Opcode::Load,
            Self::GetField { .. } => Opcode::GetField,
            Self::EnterClass { .. } => Opcode::EnterClass,
            Self::ExitClass => Opcode::ExitClass,
            Self::Define { .. } => Opcode::Define,
            Self::DefineField { .. } => Opcode::DefineField,
            Self::Function { .. } => Opcode::Function,
            Self::NotImplemented => Opcode::NotImplemented,
            Self::Exit { .. } => Opcode::Exit,
            Self::Dup => Opcode::Dup,
            Self::Drop => Opcode::Drop,
            Self::Swap => Opcode::Swap,
            Self::Mul => Opcode::Mul,
            Self::Div => Opcode::Div,
            Self::Mod => Opcode::Mod,
            Self::Add => Opcode::Add,
            Self::Sub => Opcode::Sub,
            Self::Lt => Opcode::Lt,
            Self::Le => Opcode::Le,
            Self::Gt => Opcode::Gt,
            Self::Ge => Opcode::Ge,
            Self::Eq => Opcode::Eq,
            Self::Ne => Opcode::Ne,
            Self::In => Opcode::In,
            Self::NotIn => Opcode::NotIn,
            Self::Neg => Opcode::Neg,
            Self::Not => Opcode::Not,
            Self::FunctionCall { .. } => Opcode::FunctionCall,
            Self::MethodCall { .. } => Opcode::MethodCall,
            Self::GetSlice => Opcode::GetSlice,
            Self::GetIndex => Opcode::GetIndex,
            Self::SelfRef => Opcode::SelfRef,
            Self::SuperCall { .. } => Opcode::SuperCall,
            Self::Sizeof => Opcode::Sizeof,
            Self::New { .. } => Opcode::New,
            Self::Instanceof => Opcode::Instanceof,
            Self::ArrayNew => Opcode::ArrayNew,
            Self::ArrayNewAppend => Opcode::ArrayNewAppend,
            Self::TableNew => Opcode::TableNew,
            Self::TableNewInsert => Opcode::TableNewInsert,
            Self::Const { .. } => Opcode::Const,
            Self::Return => Opcode::Return,
            Self::Insert => Opcode::Insert,
            Self::Append => Opcode::Append,
            Self::StoreGlobal { .. } => Opcode::StoreGlobal,
            Self::Store { .. } => Opcode::Store,
            Self::SetStatic { .. } => Opcode::SetStatic,
            Self::SetField { .. } => Opcode::SetField,
            Self::SetSlice => Opcode::SetSlice,
            Self::SetIndex => Opcode::SetIndex,
            Self::GetFieldTop { .. } => Opcode::GetFieldTop,
            Self::GetIndexTop => Opcode::GetIndexTop,
            Self::GetStatic { .. } => Opcode::GetStatic,
            Self::GetStaticTop { .. } => Opcode::GetStaticTop,
            Self::If { .. } => Opcode::If,
            Self::Jump { .. } => Opcode::Jump,
            Self::Loop { .. } => Opcode::Loop,
            Self::Zero => Opcode::Zero,
            Self::Inc { .. } => Opcode::Inc,
            Self::Or { .. } => Opcode::Or,
            Self::And { .. } => Opcode::And,
            Self::SetIndexAu { .. } => Opcode::SetIndexAu,
            Self::SetFieldAu { .. } => Opcode::SetFieldAu,
            Self::SetStaticAu { .. } => Opcode::SetStaticAu,
            Self::ArrayClose => Opcode::ArrayClose,
            Self::TableClose => Opcode::TableClose,
        }
    }

    /// Append the wire encoding to `out`
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.opcode().to_byte());
        match *self {
            Self::LoadGlobal { name }
            | Self::GetField { name }
            | Self::EnterClass { name }
            | Self::Define { name }
            | Self::DefineField { name }
            | Self::StoreGlobal { name }
            | Self::SetStatic { name }
            | Self::SetField { name }
            | Self::GetFieldTop { name }
            | Self::GetStatic { name }
            | Self::GetStaticTop { name }
            | Self::Const { index: name } => out.extend_from_slice(&name.0.to_le_bytes()),
            Self::Load { slot } | Self::Store { slot } | Self::Inc { slot } => {
                out.extend_from_slice(&slot.0.to_le_bytes())
            }
            Self::Exit { count } => out.extend_from_slice(&count.to_le_bytes()),
            Self::Function {
                arity,
                name,
                body_len,
            } => {
                out.extend_from_slice(&arity.to_le_bytes());
                out.extend_from_slice(&name.0.to_le_bytes());
                out.extend_from_slice(&body_len.to_le_bytes());
            }
            Self::FunctionCall { argc } | Self::SuperCall { argc } | Self::New { argc } => {
                out.push(argc)
            }
            Self::MethodCall { argc, name } => {
                out.push(argc);
                out.extend_from_slice(&name.0.to_le_bytes());
            }
            Self::If { offset }
            | Self::Jump { offset }
            | Self::Loop { offset }
            | Self::Or { offset }
            | Self::And { offset } => out.extend_from_slice(&offset.0.to_le_bytes()),
            Self::SetIndexAu { op } => out.push(op.to_byte()),
            Self::SetFieldAu { op, name } | Self::SetStaticAu { op, name } => {
                out.push(op.to_byte());
                out.extend_from_slice(&name.0.to_le_bytes());
            }
            _ => {}
        }
    }
}

/// Render a module's code as a listing, one instruction per line.
///
/// Function bodies are listed inline and indented under their header.
pub fn disassemble(module: &ModuleImage) -> Result<String> {
    let code = &module.code;
    let mut out = String::new();
    // End offsets of the function bodies enclosing the cursor
    let mut bodies: Vec<usize> = Vec::new();
    let mut pc = 0;
    while pc < code.len() {
        while bodies.last().is_some_and(|end| pc >= *end) {
            bodies.pop();
        }
        let (insn, next) = Instruction::decode(code, pc)?;
        let indent = "  ".repeat(bodies.len());
        let _ = write!(out, "{pc:06} {indent}{}", insn.opcode().name());
        match insn {
            Instruction::Function {
                arity,
                name,
                body_len,
            } => {
                let _ = write!(
                    out,
                    " {} arity={arity} len={body_len}",
                    describe(module, name)
                );
                bodies.push(next + body_len as usize);
            }
            Instruction::MethodCall { argc, name } => {
                let _ = write!(out, " {} argc={argc}", describe(module, name));
            }
            Instruction::SetFieldAu { op, name } | Instruction::SetStaticAu { op, name } => {
                let _ = write!(out, " {op:?} {}", describe(module, name));
            }
            Instruction::SetIndexAu { op } => {
                let _ = write!(out, " {op:?}");
            }
            Instruction::FunctionCall { argc }
            | Instruction::SuperCall { argc }
            | Instruction::New { argc } => {
                let _ = write!(out, " argc={argc}");
            }
            Instruction::Load { slot } | Instruction::Store { slot } | Instruction::Inc { slot } => {
                let _ = write!(out, " {}", slot.0);
            }
            Instruction::Exit { count } => {
                let _ = write!(out, " {count}");
            }
            Instruction::If { offset }
            | Instruction::Jump { offset }
            | Instruction::Or { offset }
            | Instruction::And { offset } => {
                let _ = write!(out, " -> {}", pc + 1 + offset.0 as usize);
            }
            Instruction::Loop { offset } => {
                let _ = write!(out, " -> {}", (pc + 1).saturating_sub(offset.0 as usize));
            }
            Instruction::LoadGlobal { name }
            | Instruction::GetField { name }
            | Instruction::EnterClass { name }
            | Instruction::Define { name }
            | Instruction::DefineField { name }
            | Instruction::StoreGlobal { name }
            | Instruction::SetStatic { name }
            | Instruction::SetField { name }
            | Instruction::GetFieldTop { name }
            | Instruction::GetStatic { name }
            | Instruction::GetStaticTop { name }
            | Instruction::Const { index: name } => {
                let _ = write!(out, " {}", describe(module, name));
            }
            _ => {}
        }
        out.push('\n');
        pc = next;
    }
    Ok(out)
}

fn describe(module: &ModuleImage, index: ConstantIndex) -> String {
    match module.constants.get(index.0) {
        Some(constant) => format!("#{} {constant}", index.0),
        None => format!("#{} <missing>", index.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant::Constant;

    #[test]
    fn test_decode_encode() {
        let samples = [
            Instruction::Load {
                slot: LocalIndex(3),
            },
            Instruction::MethodCall {
                argc: 2,
                name: ConstantIndex(7),
            },
            Instruction::Function {
                arity: 1,
                name: ConstantIndex(0),
                body_len: 12,
            },
            Instruction::SetFieldAu {
                op: ArithOp::Add,
                name: ConstantIndex(1),
            },
            Instruction::Loop {
                offset: JumpOffset(9),
            },
        ];
        for insn in samples {
            let mut bytes = Vec::new();
            insn.encode(&mut bytes);
            assert_eq!(bytes.len(), insn.opcode().encoded_len());
            let (decoded, next) = Instruction::decode(&bytes, 0).unwrap();
            assert_eq!(decoded, insn);
            assert_eq!(next, bytes.len());
        }
    }

    #[test]
    fn test_decode_truncated() {
        let result = Instruction::decode(&[Opcode::Const.to_byte(), 1, 0], 0);
        assert!(matches!(result, Err(BytecodeError::UnexpectedEnd)));
    }

    #[test]
    fn test_decode_bad_arith() {
        let result = Instruction::decode(&[Opcode::SetIndexAu.to_byte(), Opcode::Lt.to_byte()], 0);
        assert!(matches!(result, Err(BytecodeError::InvalidOpcode(22))));
    }

    #[test]
    fn test_disassemble() {
        let mut module = ModuleImage::new("m");
        module.constants.push(Constant::Int(5));
        let mut code = Vec::new();
        Instruction::Const {
            index: ConstantIndex(0),
        }
        .encode(&mut code);
        Instruction::Return.encode(&mut code);
        module.code = code;

        let listing = disassemble(&module).unwrap();
        assert_eq!(listing, "000000 Const #0 5\n000005 Return\n");
    }
}
