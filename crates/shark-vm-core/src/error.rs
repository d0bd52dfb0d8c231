//! VM error types

use std::fmt;
use std::path::PathBuf;

use shark_vm_bytecode::BytecodeError;
use thiserror::Error;

/// VM errors.
///
/// Every fatal runtime condition (type, arity and range violations, missing
/// methods, unprotected raises, stack overflow) is a [`VmError::Fatal`]
/// carrying the call stack at the point of failure. The VM never exits the
/// process; hosts decide what to do with the error.
#[derive(Debug, Error)]
pub enum VmError {
    /// Fatal runtime error
    #[error("{0}")]
    Fatal(Box<FatalError>),

    /// A dependency archive was not found on any import path
    #[error("can't locate archive '{0}'.")]
    ArchiveNotFound(String),

    /// An import names a module no loaded archive provides
    #[error("missing module '{0}', execution aborted.")]
    MissingModule(String),

    /// Malformed archive
    #[error("Bytecode error: {0}")]
    Bytecode(#[from] BytecodeError),

    /// IO error while reading an archive
    #[error("IO error: {path}: {source}")]
    Io {
        /// File being read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

/// A fatal error with the call stack it happened in
#[derive(Debug, Clone)]
pub struct FatalError {
    /// Message
    pub message: String,
    /// Active calls, innermost first
    pub trace: Vec<String>,
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl FatalError {
    /// Message followed by the stack trace, as printed by hosts
    pub fn report(&self) -> String {
        let mut out = self.message.clone();
        if !self.trace.is_empty() {
            out.push_str("\ncall stack trace (most recent call first):");
            for line in &self.trace {
                out.push_str("\n\t");
                out.push_str(line);
            }
        }
        out
    }
}

impl VmError {
    /// Create a fatal error
    pub fn fatal(message: impl Into<String>, trace: Vec<String>) -> Self {
        Self::Fatal(Box::new(FatalError {
            message: message.into(),
            trace,
        }))
    }

    /// Create an IO error for `path`
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The fatal error payload, if this is one
    pub fn as_fatal(&self) -> Option<&FatalError> {
        match self {
            Self::Fatal(fatal) => Some(fatal),
            _ => None,
        }
    }

    /// Message and stack trace (if any) for display
    pub fn report(&self) -> String {
        match self {
            Self::Fatal(fatal) => fatal.report(),
            other => other.to_string(),
        }
    }
}

/// Result type for VM operations
pub type VmResult<T> = std::result::Result<T, VmError>;
