//! # Shark VM Core
//!
//! Core execution engine for the Shark language.
//!
//! ## Design Principles
//!
//! - **Handles, not pointers**: Objects live in a slot heap and are addressed by generation-checked handles
//! - **Reference counting**: Objects die the moment their last reference goes away; cycles leak
//! - **Stack-based**: One operand stack shared by every frame, addressed by index
//! - **No process exits**: Fatal errors are returned to the host with a stack trace

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod array;
pub mod class;
pub mod config;
pub mod error;
mod frame;
pub mod function;
pub mod heap;
mod interpreter;
mod loader;
pub mod module;
pub mod native;
pub mod natives;
pub mod string;
pub mod table;
pub mod value;
pub mod vm;

pub use array::Array;
pub use class::{Class, ClassKind};
pub use config::VmConfig;
pub use error::{FatalError, VmError, VmResult};
pub use function::{Function, FunctionBody, NativeFn};
pub use heap::{Body, Builtins, Heap, ObjRef};
pub use module::Module;
pub use native::{Args, NativeObject};
pub use string::SharkString;
pub use table::Table;
pub use value::Value;
pub use vm::Vm;
