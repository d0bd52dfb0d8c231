//! VM configuration

use std::path::PathBuf;

/// Default limit on nested calls
pub const DEFAULT_MAX_CALL_DEPTH: usize = 1024;

/// Default operand stack capacity
pub const DEFAULT_STACK_CAPACITY: usize = 32;

/// Settings fixed at VM construction
#[derive(Debug, Clone)]
pub struct VmConfig {
    /// Nested calls allowed before a "stack overflow" fatal error
    pub max_call_depth: usize,
    /// Operand stack slots reserved up front
    pub initial_stack_capacity: usize,
    /// Directories searched for dependency archives, in order
    pub import_paths: Vec<PathBuf>,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            initial_stack_capacity: DEFAULT_STACK_CAPACITY,
            import_paths: Vec::new(),
        }
    }
}

impl VmConfig {
    /// Set the call depth limit
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// Append an import path
    pub fn with_import_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.import_paths.push(path.into());
        self
    }
}
