//! Bytecode errors

use thiserror::Error;

/// Errors that can occur while reading, writing or assembling bytecode
#[derive(Debug, Error)]
pub enum BytecodeError {
    /// Input ended in the middle of a field
    #[error("Unexpected end of bytecode")]
    UnexpectedEnd,

    /// Unknown opcode byte
    #[error("Invalid opcode: {0}")]
    InvalidOpcode(u8),

    /// Unknown constant pool tag
    #[error("Invalid constant tag: {0}")]
    InvalidConstantTag(u8),

    /// Char constants must hold exactly one byte
    #[error("Can't decode non ascii character (payload of {0} bytes)")]
    NonAsciiChar(u32),

    /// Float constant text that does not parse as a decimal
    #[error("Invalid float constant: {0:?}")]
    InvalidFloat(String),

    /// A name or string constant is not valid UTF-8
    #[error("Invalid UTF-8 in string data")]
    InvalidUtf8,

    /// Archive-level names are limited to 255 bytes
    #[error("Name too long for archive header: {0} bytes")]
    NameTooLong(usize),

    /// A count does not fit the width of its length prefix
    #[error("Too many entries for a {width}-byte count: {count}")]
    CountOverflow {
        /// Entries that were requested
        count: usize,
        /// Width of the prefix in bytes
        width: usize,
    },

    /// An assembler label was used but never placed
    #[error("Unresolved label")]
    UnresolvedLabel,

    /// Jump distance does not fit 16 bits
    #[error("Jump offset too large: {0}")]
    JumpTooFar(usize),

    /// `end_function` without a matching `begin_function`
    #[error("No open function body")]
    NoOpenFunction,

    /// `finish` with a function body still open
    #[error("Function body left open")]
    UnclosedFunction,

    /// IO error during reading or writing
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for bytecode operations
pub type Result<T> = std::result::Result<T, BytecodeError>;
