//! Hand assembler for module images
//!
//! Used by hosts that build small modules at run time and by the tests of
//! every crate in the workspace.

use crate::constant::{Constant, ConstantPool};
use crate::error::{BytecodeError, Result};
use crate::instruction::Instruction;
use crate::module::{Import, ModuleImage};
use crate::opcode::Opcode;
use crate::operand::{ConstantIndex, JumpOffset, LocalIndex};

/// Jump target inside the code being assembled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

#[derive(Debug)]
struct Patch {
    /// Position of the two operand bytes
    operand: usize,
    label: Label,
}

/// Builds one module's code, constants and imports
#[derive(Debug)]
pub struct Assembler {
    name: String,
    imports: Vec<Import>,
    constants: ConstantPool,
    code: Vec<u8>,
    labels: Vec<Option<usize>>,
    patches: Vec<Patch>,
    /// Positions of the body length fields of open functions
    open_functions: Vec<usize>,
}

impl Assembler {
    /// Start assembling a module
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            imports: Vec::new(),
            constants: ConstantPool::new(),
            code: Vec::new(),
            labels: Vec::new(),
            patches: Vec::new(),
            open_functions: Vec::new(),
        }
    }

    /// Current code offset
    pub fn position(&self) -> usize {
        self.code.len()
    }

    /// Add an import record
    pub fn import(&mut self, import: Import) -> &mut Self {
        self.imports.push(import);
        self
    }

    /// Intern a constant
    pub fn constant(&mut self, constant: Constant) -> ConstantIndex {
        ConstantIndex(self.constants.add(constant))
    }

    /// Intern a symbol constant
    pub fn symbol(&mut self, name: &str) -> ConstantIndex {
        ConstantIndex(self.constants.add_symbol(name))
    }

    /// Emit one instruction
    pub fn emit(&mut self, insn: Instruction) -> &mut Self {
        insn.encode(&mut self.code);
        self
    }

    /// Emit `Const` for an integer literal
    pub fn int(&mut self, value: i32) -> &mut Self {
        let index = self.constant(Constant::Int(value));
        self.emit(Instruction::Const { index })
    }

    /// Emit `Const` for a float literal
    pub fn float(&mut self, value: f64) -> &mut Self {
        let index = self.constant(Constant::Float(value));
        self.emit(Instruction::Const { index })
    }

    /// Emit `Const` for a string literal
    pub fn string(&mut self, value: &str) -> &mut Self {
        let index = self.constant(Constant::string(value));
        self.emit(Instruction::Const { index })
    }

    /// Emit `LoadGlobal` for a name
    pub fn load_global(&mut self, name: &str) -> &mut Self {
        let name = self.symbol(name);
        self.emit(Instruction::LoadGlobal { name })
    }

    /// Emit `Define` for a name
    pub fn define(&mut self, name: &str) -> &mut Self {
        let name = self.symbol(name);
        self.emit(Instruction::Define { name })
    }

    /// Emit `StoreGlobal` for a name
    pub fn store_global(&mut self, name: &str) -> &mut Self {
        let name = self.symbol(name);
        self.emit(Instruction::StoreGlobal { name })
    }

    /// Emit `Load` of a frame slot
    pub fn load(&mut self, slot: u16) -> &mut Self {
        self.emit(Instruction::Load {
            slot: LocalIndex(slot),
        })
    }

    /// Emit `Store` into a frame slot
    pub fn store(&mut self, slot: u16) -> &mut Self {
        self.emit(Instruction::Store {
            slot: LocalIndex(slot),
        })
    }

    /// Emit `MethodCall`
    pub fn method_call(&mut self, name: &str, argc: u8) -> &mut Self {
        let name = self.symbol(name);
        self.emit(Instruction::MethodCall { argc, name })
    }

    /// Emit `GetField`
    pub fn get_field(&mut self, name: &str) -> &mut Self {
        let name = self.symbol(name);
        self.emit(Instruction::GetField { name })
    }

    /// Emit `SetField`
    pub fn set_field(&mut self, name: &str) -> &mut Self {
        let name = self.symbol(name);
        self.emit(Instruction::SetField { name })
    }

    /// Emit `GetStatic`
    pub fn get_static(&mut self, name: &str) -> &mut Self {
        let name = self.symbol(name);
        self.emit(Instruction::GetStatic { name })
    }

    /// Emit `EnterClass`; the parent class (or null) must already be on the stack
    pub fn enter_class(&mut self, name: &str) -> &mut Self {
        let name = self.symbol(name);
        self.emit(Instruction::EnterClass { name })
    }

    /// Create an unplaced label
    pub fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind a label to the current position
    pub fn place(&mut self, label: Label) -> &mut Self {
        self.labels[label.0] = Some(self.code.len());
        self
    }

    /// Emit a jump-family instruction (`If`, `Jump`, `Loop`, `Or`, `And`)
    /// targeting `label`; the offset is resolved by [`Assembler::finish`]
    pub fn jump(&mut self, opcode: Opcode, label: Label) -> &mut Self {
        let offset = JumpOffset(0);
        let insn = match opcode {
            Opcode::If => Instruction::If { offset },
            Opcode::Loop => Instruction::Loop { offset },
            Opcode::Or => Instruction::Or { offset },
            Opcode::And => Instruction::And { offset },
            _ => Instruction::Jump { offset },
        };
        let operand = self.code.len() + 1;
        self.emit(insn);
        self.patches.push(Patch { operand, label });
        self
    }

    /// Emit a `Function` header and open its inline body
    pub fn begin_function(&mut self, name: &str, arity: u16) -> &mut Self {
        let name = self.symbol(name);
        self.emit(Instruction::Function {
            arity,
            name,
            body_len: 0,
        });
        self.open_functions.push(self.code.len() - 4);
        self
    }

    /// Close the innermost open function body
    pub fn end_function(&mut self) -> Result<&mut Self> {
        let len_at = self
            .open_functions
            .pop()
            .ok_or(BytecodeError::NoOpenFunction)?;
        let body_len = self.code.len() - (len_at + 4);
        let body_len = u32::try_from(body_len).map_err(|_| BytecodeError::CountOverflow {
            count: body_len,
            width: 4,
        })?;
        self.code[len_at..len_at + 4].copy_from_slice(&body_len.to_le_bytes());
        Ok(self)
    }

    /// Resolve labels and produce the module image
    pub fn finish(mut self) -> Result<ModuleImage> {
        if !self.open_functions.is_empty() {
            return Err(BytecodeError::UnclosedFunction);
        }
        for patch in &self.patches {
            let target = self.labels[patch.label.0].ok_or(BytecodeError::UnresolvedLabel)?;
            let opcode = self.code[patch.operand - 1];
            let distance = if opcode == Opcode::Loop.to_byte() {
                patch.operand.checked_sub(target)
            } else {
                target.checked_sub(patch.operand)
            }
            .ok_or(BytecodeError::JumpTooFar(target))?;
            let distance =
                u16::try_from(distance).map_err(|_| BytecodeError::JumpTooFar(distance))?;
            self.code[patch.operand..patch.operand + 2].copy_from_slice(&distance.to_le_bytes());
        }
        Ok(ModuleImage {
            name: self.name,
            imports: self.imports,
            constants: self.constants,
            code: self.code,
        })
    }
}
