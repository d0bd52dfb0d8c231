//! Loaded modules

use std::rc::Rc;

use shark_vm_bytecode::Import;

use crate::heap::ObjRef;
use crate::value::Value;

/// Module object body
#[derive(Debug, Clone)]
pub struct Module {
    /// Module name
    pub name: String,
    /// Imports resolved before the top-level code runs
    pub imports: Vec<Import>,
    /// Name table object (the module's globals)
    pub names: ObjRef,
    /// Constant pool; string and symbol constants are counted string objects
    pub constants: Rc<[Value]>,
    /// Code shared by the top-level code and every function defined in it
    pub code: Rc<[u8]>,
}
