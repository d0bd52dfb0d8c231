//! Classes
//!
//! A class owns a method table (a plain table object mapping method names
//! to functions). Deriving a class copies the parent's method table at that
//! moment, so later changes to the parent never reach the child.

use std::fmt;
use std::rc::Rc;

use crate::heap::ObjRef;
use crate::native::NativeObject;

/// Builds the body of a host-defined object for `new`
pub type NativeFactory = Rc<dyn Fn() -> Box<dyn NativeObject>>;

/// Instance layout of a class
#[derive(Clone)]
pub enum ClassKind {
    /// Instances are field tables (user classes and `object`)
    Fields,
    /// One of the built-in classes (`str`, `array`, `table`, ...)
    Builtin,
    /// Host class; instances are created by the factory
    Native(NativeFactory),
}

impl fmt::Debug for ClassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fields => f.write_str("Fields"),
            Self::Builtin => f.write_str("Builtin"),
            Self::Native(_) => f.write_str("Native(..)"),
        }
    }
}

/// Class object body
#[derive(Debug, Clone)]
pub struct Class {
    /// Class name
    pub name: String,
    /// Parent class; only `object` has none
    pub parent: Option<ObjRef>,
    /// Instance layout
    pub kind: ClassKind,
    /// Method table object
    pub methods: ObjRef,
}

impl Class {
    /// Are instances field tables
    #[inline]
    pub fn has_fields(&self) -> bool {
        matches!(self.kind, ClassKind::Fields)
    }
}
