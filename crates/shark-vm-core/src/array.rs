//! Growable array storage
//!
//! Capacity follows a fixed policy: start at [`INITIAL_CAPACITY`], double
//! once the length reaches capacity, halve when the length drops to a
//! quarter of a capacity of at least [`SHRINK_THRESHOLD`]. The storage
//! itself does no reference counting; [`crate::heap::Heap`] does that around
//! every mutation.

use crate::value::Value;

/// Capacity of a fresh array
pub const INITIAL_CAPACITY: usize = 2;

/// Arrays below this capacity never shrink
pub const SHRINK_THRESHOLD: usize = 16;

/// Array object body
#[derive(Debug, Clone)]
pub struct Array {
    items: Vec<Value>,
    capacity: usize,
}

impl Default for Array {
    fn default() -> Self {
        Self::new()
    }
}

impl Array {
    /// Empty array
    pub fn new() -> Self {
        Self {
            items: Vec::with_capacity(INITIAL_CAPACITY),
            capacity: INITIAL_CAPACITY,
        }
    }

    /// Array holding `items`
    pub fn from_values(items: Vec<Value>) -> Self {
        let mut capacity = INITIAL_CAPACITY;
        while capacity <= items.len() {
            capacity <<= 1;
        }
        Self { items, capacity }
    }

    /// Number of elements
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Is the array empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Logical capacity
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Element at `index`
    #[inline]
    pub fn get(&self, index: usize) -> Option<Value> {
        self.items.get(index).copied()
    }

    /// Replace the element at `index`, returning the old one
    pub fn set(&mut self, index: usize, value: Value) -> Option<Value> {
        let slot = self.items.get_mut(index)?;
        Some(std::mem::replace(slot, value))
    }

    /// Append a value
    pub fn push(&mut self, value: Value) {
        self.items.push(value);
        self.grow();
    }

    /// Insert at `index` (`0..=len`), shifting later elements up
    pub fn insert(&mut self, index: usize, value: Value) -> bool {
        if index > self.items.len() {
            return false;
        }
        self.items.insert(index, value);
        self.grow();
        true
    }

    /// Remove and return the last element
    pub fn pop(&mut self) -> Option<Value> {
        let value = self.items.pop()?;
        self.shrink();
        Some(value)
    }

    /// Elements in order
    #[inline]
    pub fn as_slice(&self) -> &[Value] {
        &self.items
    }

    /// Take every element out, leaving the array empty
    pub fn take_values(&mut self) -> Vec<Value> {
        self.capacity = INITIAL_CAPACITY;
        std::mem::take(&mut self.items)
    }

    fn grow(&mut self) {
        if self.items.len() >= self.capacity {
            self.capacity <<= 1;
            self.items.reserve(self.capacity - self.items.len());
        }
    }

    fn shrink(&mut self) {
        if self.items.len() <= self.capacity >> 2 && self.capacity >= SHRINK_THRESHOLD {
            self.capacity >>= 1;
            self.items.shrink_to(self.capacity);
        }
    }
}
