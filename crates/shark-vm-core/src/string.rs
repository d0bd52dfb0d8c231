//! Immutable byte strings
//!
//! Strings are not interned; equality and hashing are by content. The hash
//! is computed once at creation and cached.

use std::fmt;

/// djb2 over the bytes, truncated to 32 bits
pub fn hash_bytes(bytes: &[u8]) -> u64 {
    bytes.iter().fold(5381u64, |hash, &b| {
        ((hash << 5).wrapping_add(hash).wrapping_add(u64::from(b))) & 0xFFFF_FFFF
    })
}

/// A string object body
#[derive(Clone, PartialEq, Eq)]
pub struct SharkString {
    bytes: Box<[u8]>,
    hash: u64,
}

impl SharkString {
    /// Create from raw bytes
    pub fn new(bytes: impl Into<Box<[u8]>>) -> Self {
        let bytes = bytes.into();
        let hash = hash_bytes(&bytes);
        Self { bytes, hash }
    }

    /// Concatenate two strings
    pub fn concat(&self, other: &SharkString) -> Self {
        let mut bytes = Vec::with_capacity(self.len() + other.len());
        bytes.extend_from_slice(&self.bytes);
        bytes.extend_from_slice(&other.bytes);
        Self::new(bytes)
    }

    /// Raw bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Length in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Is the string empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Cached content hash
    #[inline]
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Content as text, replacing invalid UTF-8
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

impl From<&str> for SharkString {
    fn from(s: &str) -> Self {
        Self::new(s.as_bytes())
    }
}

impl fmt::Display for SharkString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.bytes))
    }
}

impl fmt::Debug for SharkString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(&self.bytes))
    }
}
