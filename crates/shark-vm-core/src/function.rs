//! Functions and methods

use std::fmt;
use std::rc::Rc;

use crate::error::VmResult;
use crate::heap::ObjRef;
use crate::native::Args;
use crate::value::Value;
use crate::vm::Vm;

/// Host implementation of a function.
///
/// The returned value is owned by the caller.
pub type NativeFn = Rc<dyn Fn(&mut Vm, Args) -> VmResult<Value>>;

/// What runs when a function is called
#[derive(Clone)]
pub enum FunctionBody {
    /// Inline body inside the owning module's code, starting at `entry`
    Bytecode {
        /// Offset of the first instruction of the body
        entry: usize,
    },
    /// Host function
    Native(NativeFn),
}

impl fmt::Debug for FunctionBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytecode { entry } => f.debug_struct("Bytecode").field("entry", entry).finish(),
            Self::Native(_) => f.write_str("Native(..)"),
        }
    }
}

/// Function object body
#[derive(Debug, Clone)]
pub struct Function {
    /// Declared name
    pub name: String,
    /// Declared parameter count (excluding `self` for methods)
    pub arity: u16,
    /// Module whose names and constants the body uses (not counted)
    pub module: ObjRef,
    /// Class the method was defined in (not counted)
    pub class: Option<ObjRef>,
    /// Method this one overrides (counted)
    pub supermethod: Option<ObjRef>,
    /// Implementation
    pub body: FunctionBody,
}

impl Function {
    /// Is this a method
    #[inline]
    pub fn is_method(&self) -> bool {
        self.class.is_some()
    }

    /// Is this a host function
    #[inline]
    pub fn is_native(&self) -> bool {
        matches!(self.body, FunctionBody::Native(_))
    }
}
