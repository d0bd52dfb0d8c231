//! Constant pool for bytecode modules

use serde::{Deserialize, Serialize};

/// Wire tag of an integer constant
pub const TAG_INT: u8 = 0;
/// Wire tag of a float constant
pub const TAG_FLOAT: u8 = 1;
/// Wire tag of a char constant
pub const TAG_CHAR: u8 = 2;
/// Wire tag of a string constant
pub const TAG_STR: u8 = 3;
/// Wire tag of a symbol constant
pub const TAG_SYMBOL: u8 = 4;

/// A constant value in the constant pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    /// Integer literal (becomes a number at run time)
    Int(i32),
    /// Float literal, stored on the wire as decimal text
    Float(f64),
    /// Single byte character
    Char(u8),
    /// String literal
    Str(String),
    /// Identifier: global, field, method or class name
    Symbol(String),
}

impl Constant {
    /// Create a string constant
    #[inline]
    pub fn string(s: impl Into<String>) -> Self {
        Self::Str(s.into())
    }

    /// Create a symbol constant
    #[inline]
    pub fn symbol(s: impl Into<String>) -> Self {
        Self::Symbol(s.into())
    }

    /// Wire tag of this constant
    pub fn tag(&self) -> u8 {
        match self {
            Self::Int(_) => TAG_INT,
            Self::Float(_) => TAG_FLOAT,
            Self::Char(_) => TAG_CHAR,
            Self::Str(_) => TAG_STR,
            Self::Symbol(_) => TAG_SYMBOL,
        }
    }

    /// Numeric value of an integer or float constant
    #[inline]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(f64::from(*n)),
            Self::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Text of a string or symbol constant
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) | Self::Symbol(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for Constant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n:?}"),
            Self::Char(c) => write!(f, "{:?}", char::from(*c)),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Symbol(s) => write!(f, "{s}"),
        }
    }
}

/// Constant pool with deduplication
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstantPool {
    constants: Vec<Constant>,
}

impl ConstantPool {
    /// Create a new empty constant pool
    pub fn new() -> Self {
        Self {
            constants: Vec::new(),
        }
    }

    /// Create constant pool with pre-allocated capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            constants: Vec::with_capacity(capacity),
        }
    }

    /// Add a constant to the pool, returns its index
    ///
    /// Deduplicates identical constants to save space.
    pub fn add(&mut self, constant: Constant) -> u32 {
        if let Some(idx) = self.constants.iter().position(|c| *c == constant) {
            return idx as u32;
        }

        let idx = self.constants.len() as u32;
        self.constants.push(constant);
        idx
    }

    /// Append a constant without deduplication (used by the archive reader,
    /// which must keep indices exactly as written)
    pub fn push(&mut self, constant: Constant) -> u32 {
        let idx = self.constants.len() as u32;
        self.constants.push(constant);
        idx
    }

    /// Add a symbol constant
    #[inline]
    pub fn add_symbol(&mut self, s: &str) -> u32 {
        self.add(Constant::symbol(s))
    }

    /// Add a string constant
    #[inline]
    pub fn add_string(&mut self, s: &str) -> u32 {
        self.add(Constant::string(s))
    }

    /// Get a constant by index
    #[inline]
    pub fn get(&self, index: u32) -> Option<&Constant> {
        self.constants.get(index as usize)
    }

    /// Number of constants in the pool
    #[inline]
    pub fn len(&self) -> usize {
        self.constants.len()
    }

    /// Check if the pool is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    /// Iterate over constants
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Constant> {
        self.constants.iter()
    }
}

impl FromIterator<Constant> for ConstantPool {
    fn from_iter<I: IntoIterator<Item = Constant>>(iter: I) -> Self {
        Self {
            constants: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_pool_dedup() {
        let mut pool = ConstantPool::new();

        let idx1 = pool.add_symbol("hello");
        let idx2 = pool.add_symbol("world");
        let idx3 = pool.add_symbol("hello");

        assert_eq!(idx1, 0);
        assert_eq!(idx2, 1);
        assert_eq!(idx3, 0);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_symbol_and_string_are_distinct() {
        let mut pool = ConstantPool::new();
        let a = pool.add_symbol("x");
        let b = pool.add_string("x");
        assert_ne!(a, b);
    }

    #[test]
    fn test_push_keeps_duplicates() {
        let mut pool = ConstantPool::new();
        pool.push(Constant::Int(1));
        pool.push(Constant::Int(1));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_as_number() {
        assert_eq!(Constant::Int(-3).as_number(), Some(-3.0));
        assert_eq!(Constant::Float(0.5).as_number(), Some(0.5));
        assert_eq!(Constant::Char(b'a').as_number(), None);
    }
}
