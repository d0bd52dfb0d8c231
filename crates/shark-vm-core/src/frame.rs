//! Call frames

use std::rc::Rc;

use crate::heap::ObjRef;
use crate::value::Value;

/// Record of an active call, kept on the VM for stack traces
#[derive(Debug, Clone, Copy)]
pub(crate) struct CallInfo {
    pub module: ObjRef,
    /// None for a module's top-level code
    pub function: Option<ObjRef>,
}

/// Literal aggregate under construction
#[derive(Debug, Clone, Copy)]
pub(crate) enum Builder {
    Array(ObjRef),
    Table(ObjRef),
}

impl Builder {
    pub fn object(self) -> ObjRef {
        match self {
            Self::Array(r) | Self::Table(r) => r,
        }
    }
}

/// Execution state of one running body
pub(crate) struct Frame {
    pub module: ObjRef,
    pub function: Option<ObjRef>,
    /// Name table used for globals
    pub globals: ObjRef,
    pub code: Rc<[u8]>,
    pub constants: Rc<[Value]>,
    pub pc: usize,
    /// Stack index of local slot 0
    pub base: usize,
    /// Class being defined and the symbol it will be bound to (counted)
    pub class: Option<(ObjRef, Value)>,
    /// Innermost last; each builder is counted
    pub builders: Vec<Builder>,
}

impl Frame {
    pub fn new(
        module: ObjRef,
        function: Option<ObjRef>,
        globals: ObjRef,
        code: Rc<[u8]>,
        constants: Rc<[Value]>,
        pc: usize,
        base: usize,
    ) -> Self {
        Self {
            module,
            function,
            globals,
            code,
            constants,
            pc,
            base,
            class: None,
            builders: Vec::new(),
        }
    }
}
