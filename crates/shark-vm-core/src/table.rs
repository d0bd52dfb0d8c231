//! Open-addressing hash table storage
//!
//! Slots hold `(hash, key, value)`; a stored hash of 0 marks an empty slot,
//! so real hashes of 0 are stored as 1. Collisions probe with triangular
//! steps (`step += 1; index = (index + step) & mask`), which visits every
//! slot of a power-of-two table. There are no tombstones: removal empties
//! the slot and the table is rebuilt so that no probe chain is cut.
//!
//! The table does not know how to hash or compare values (strings need the
//! heap for that). Callers pass the key's hash and a predicate that matches
//! stored keys; [`crate::heap::Heap`] wraps this with reference counting.

use crate::value::Value;

/// Slot count of a fresh table
pub const INITIAL_SIZE: usize = 4;

const EMPTY: u64 = 0;

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    hash: u64,
    key: Value,
    value: Value,
}

/// Table object body
#[derive(Debug, Clone)]
pub struct Table {
    slots: Vec<Slot>,
    count: usize,
}

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn stored_hash(hash: u64) -> u64 {
    if hash == EMPTY { 1 } else { hash }
}

/// Smallest power of two strictly above `max(n, INITIAL_SIZE)`
fn closest_size(n: usize) -> usize {
    let n = n.max(INITIAL_SIZE);
    1 << (usize::BITS - n.leading_zeros())
}

impl Table {
    /// Empty table
    pub fn new() -> Self {
        Self {
            slots: vec![Slot::default(); INITIAL_SIZE],
            count: 0,
        }
    }

    /// Slotless stand-in, held by the heap while the real table is checked
    /// out. Allocates nothing and must not be probed.
    pub(crate) const fn detached() -> Self {
        Self {
            slots: Vec::new(),
            count: 0,
        }
    }

    /// Number of live entries
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Is the table empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Slot capacity (always a power of two)
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    fn mask(&self) -> usize {
        self.slots.len() - 1
    }

    /// Index of the slot holding the key, or of the empty slot where it
    /// would go
    fn lookup_slot(&self, hash: u64, matches: impl Fn(Value) -> bool) -> usize {
        let mask = self.mask();
        let mut index = (hash as usize) & mask;
        let mut step = 0;
        loop {
            let slot = &self.slots[index];
            if slot.hash == EMPTY || (slot.hash == hash && matches(slot.key)) {
                return index;
            }
            step += 1;
            index = (index + step) & mask;
        }
    }

    /// Value stored under the key
    pub fn get(&self, hash: u64, matches: impl Fn(Value) -> bool) -> Option<Value> {
        let slot = &self.slots[self.lookup_slot(stored_hash(hash), matches)];
        (slot.hash != EMPTY).then_some(slot.value)
    }

    /// Is the key present
    pub fn contains(&self, hash: u64, matches: impl Fn(Value) -> bool) -> bool {
        self.get(hash, matches).is_some()
    }

    /// Store `value` under `key`, returning the `(key, value)` pair it
    /// replaced
    pub fn insert(
        &mut self,
        hash: u64,
        key: Value,
        value: Value,
        matches: impl Fn(Value) -> bool,
    ) -> Option<(Value, Value)> {
        let hash = stored_hash(hash);
        let index = self.lookup_slot(hash, matches);
        let old = std::mem::replace(&mut self.slots[index], Slot { hash, key, value });
        if old.hash != EMPTY {
            return Some((old.key, old.value));
        }
        self.count += 1;
        self.maybe_resize();
        None
    }

    /// Remove the key, returning the stored `(key, value)` pair
    pub fn remove(&mut self, hash: u64, matches: impl Fn(Value) -> bool) -> Option<(Value, Value)> {
        let index = self.lookup_slot(stored_hash(hash), matches);
        let old = std::mem::take(&mut self.slots[index]);
        if old.hash == EMPTY {
            return None;
        }
        self.count -= 1;
        if !self.maybe_resize() {
            // Entries probed past the emptied slot must be re-placed
            self.rebuild(self.slots.len());
        }
        Some((old.key, old.value))
    }

    /// Live entries in slot order
    pub fn iter(&self) -> impl Iterator<Item = (Value, Value)> + '_ {
        self.slots
            .iter()
            .filter(|slot| slot.hash != EMPTY)
            .map(|slot| (slot.key, slot.value))
    }

    /// Take every key and value out, leaving the table empty
    pub fn take_entries(&mut self) -> Vec<(Value, Value)> {
        let entries = self.iter().collect();
        *self = Self::new();
        entries
    }

    fn maybe_resize(&mut self) -> bool {
        let size = self.slots.len();
        let count = self.count;
        if (size > count * 4 && size > INITIAL_SIZE) || size <= count + count / 16 {
            self.rebuild(closest_size((count as f64 * 1.333) as usize));
            return true;
        }
        false
    }

    fn rebuild(&mut self, size: usize) {
        let old = std::mem::replace(&mut self.slots, vec![Slot::default(); size]);
        let mask = size - 1;
        for slot in old.into_iter().filter(|slot| slot.hash != EMPTY) {
            let mut index = (slot.hash as usize) & mask;
            let mut step = 0;
            while self.slots[index].hash != EMPTY {
                step += 1;
                index = (index + step) & mask;
            }
            self.slots[index] = slot;
        }
    }
}
