//! # Shark VM Bytecode
//!
//! This crate defines the compiled form of Shark programs: the opcode set,
//! constant pools, module images and the archive container that bundles them.
//!
//! ## Design Principles
//!
//! - **Stack-based**: Operations consume and produce values on one operand stack
//! - **Bit-exact**: The archive layout matches archives produced by the existing compiler
//! - **Inline bodies**: Function bodies live inside the code of the module that defines them
//! - **Pure data**: Nothing here executes code or owns runtime objects

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod archive;
pub mod assembler;
pub mod constant;
pub mod error;
pub mod instruction;
pub mod module;
pub mod opcode;
pub mod operand;
mod wire;

pub use archive::ArchiveImage;
pub use assembler::{Assembler, Label};
pub use constant::{Constant, ConstantPool};
pub use error::{BytecodeError, Result};
pub use instruction::{Instruction, disassemble};
pub use module::{Import, ImportMode, ModuleBuilder, ModuleImage};
pub use opcode::{ArithOp, Opcode};
pub use operand::{ConstantIndex, JumpOffset, LocalIndex};
