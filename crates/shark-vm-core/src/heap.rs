//! Object heap with manual reference counting
//!
//! Every object lives in a slot of the heap and is addressed by an
//! [`ObjRef`] (slot index plus generation), never by pointer. Counts change
//! only through [`Heap::inc_ref`] / [`Heap::dec_ref`]; when a count reaches
//! zero the object's children are released iteratively and its slot is
//! recycled with a new generation, so stale handles never alias a new
//! object.
//!
//! ## Ownership
//!
//! - A new object starts with one reference, owned by whoever allocated it.
//! - An object holds a counted reference to its class.
//! - Arrays and tables hold counted references to their elements, keys and
//!   values; a class holds its parent and method table; a module holds its
//!   name table and constants; a function holds its supermethod.
//! - A function's links to its module and class are not counted.
//! - Built-in classes and their method tables are pinned and never freed.
//!
//! There is no cycle collector: a cycle of counted references leaks.

use std::fmt;

use crate::array::Array;
use crate::class::{Class, ClassKind};
use crate::function::Function;
use crate::module::Module;
use crate::native::NativeObject;
use crate::string::{SharkString, hash_bytes};
use crate::table::Table;
use crate::value::Value;

/// Handle to a heap object
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjRef {
    index: u32,
    generation: u32,
}

impl ObjRef {
    const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index
    #[inline]
    pub fn index(self) -> u32 {
        self.index
    }

    /// Identity hash: distinct for every live object
    #[inline]
    pub fn identity_hash(self) -> u64 {
        u64::from(self.index) | (u64::from(self.generation) << 32)
    }
}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

/// Object payload
pub enum Body {
    /// Immutable string
    Str(SharkString),
    /// Growable array
    Array(Array),
    /// Plain table, or a field-table instance when its class has fields
    Table(Table),
    /// Function or method
    Function(Function),
    /// Class
    Class(Class),
    /// Module
    Module(Module),
    /// Host object
    Native(Box<dyn NativeObject>),
}

impl Body {
    /// Push every counted child reference into `out`
    fn release_children(self, out: &mut Vec<ObjRef>) {
        let mut push = |v: Value| {
            if let Value::Object(r) = v {
                out.push(r);
            }
        };
        match self {
            Body::Str(_) => {}
            Body::Array(mut array) => array.take_values().into_iter().for_each(push),
            Body::Table(mut table) => {
                for (k, v) in table.take_entries() {
                    push(k);
                    push(v);
                }
            }
            Body::Function(function) => {
                function.supermethod.map(Value::Object).into_iter().for_each(push);
            }
            Body::Class(class) => {
                class.parent.map(Value::Object).into_iter().for_each(&mut push);
                push(Value::Object(class.methods));
            }
            Body::Module(module) => {
                module.constants.iter().copied().for_each(&mut push);
                push(Value::Object(module.names));
            }
            Body::Native(mut native) => {
                native.take_values().into_iter().for_each(push);
                // Dropping the box runs the host destructor
            }
        }
    }
}

struct Entry {
    class: ObjRef,
    refs: u32,
    pinned: bool,
    body: Body,
}

struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

/// The built-in classes
#[derive(Debug, Clone, Copy)]
pub struct Builtins {
    /// `class`, the class of every class
    pub class: ObjRef,
    /// `object`, the root class
    pub object: ObjRef,
    /// `str`
    pub string: ObjRef,
    /// `array`
    pub array: ObjRef,
    /// `table`
    pub table: ObjRef,
    /// `function`
    pub function: ObjRef,
    /// `module`
    pub module: ObjRef,
}

const BUILTIN_NAMES: [&str; 7] = ["class", "object", "str", "array", "table", "function", "module"];
const OBJECT_SLOT: u32 = 1;
const TABLE_SLOT: u32 = 4;

/// Slot heap owning every object of one VM
pub struct Heap {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    builtins: Builtins,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    /// Heap holding only the built-in classes
    pub fn new() -> Self {
        let count = BUILTIN_NAMES.len() as u32;
        let builtin = |i: u32| ObjRef::new(i, 0);
        let mut slots = Vec::with_capacity(64);

        for (i, name) in BUILTIN_NAMES.iter().enumerate() {
            let i = i as u32;
            let kind = if i == OBJECT_SLOT {
                ClassKind::Fields
            } else {
                ClassKind::Builtin
            };
            slots.push(Slot {
                generation: 0,
                entry: Some(Entry {
                    class: builtin(0),
                    refs: 1,
                    pinned: true,
                    body: Body::Class(Class {
                        name: (*name).to_string(),
                        parent: (i != OBJECT_SLOT).then(|| builtin(OBJECT_SLOT)),
                        kind,
                        methods: builtin(count + i),
                    }),
                }),
            });
        }
        for _ in 0..count {
            slots.push(Slot {
                generation: 0,
                entry: Some(Entry {
                    class: builtin(TABLE_SLOT),
                    refs: 1,
                    pinned: true,
                    body: Body::Table(Table::new()),
                }),
            });
        }

        Self {
            live: slots.len(),
            slots,
            free: Vec::new(),
            builtins: Builtins {
                class: builtin(0),
                object: builtin(OBJECT_SLOT),
                string: builtin(2),
                array: builtin(3),
                table: builtin(TABLE_SLOT),
                function: builtin(5),
                module: builtin(6),
            },
        }
    }

    /// The built-in classes
    #[inline]
    pub fn builtins(&self) -> &Builtins {
        &self.builtins
    }

    // ==================== Allocation and counting ====================

    /// Allocate an object of `class` with one reference owned by the caller
    pub fn alloc(&mut self, class: ObjRef, body: Body) -> ObjRef {
        self.retain(class);
        let entry = Entry {
            class,
            refs: 1,
            pinned: false,
            body,
        };
        self.live += 1;
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.entry = Some(entry);
                ObjRef::new(index, slot.generation)
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                ObjRef::new(index, 0)
            }
        }
    }

    /// Allocate a string
    pub fn alloc_string(&mut self, string: SharkString) -> ObjRef {
        self.alloc(self.builtins.string, Body::Str(string))
    }

    /// Allocate an array
    pub fn alloc_array(&mut self, array: Array) -> ObjRef {
        self.alloc(self.builtins.array, Body::Array(array))
    }

    /// Allocate a plain table
    pub fn alloc_table(&mut self) -> ObjRef {
        self.alloc(self.builtins.table, Body::Table(Table::new()))
    }

    /// Allocate a function
    pub fn alloc_function(&mut self, function: Function) -> ObjRef {
        if let Some(sup) = function.supermethod {
            self.retain(sup);
        }
        self.alloc(self.builtins.function, Body::Function(function))
    }

    /// Add a reference to the object behind `value`, if any
    #[inline]
    pub fn inc_ref(&mut self, value: Value) {
        if let Value::Object(r) = value {
            self.retain(r);
        }
    }

    /// Drop a reference to the object behind `value`, if any
    #[inline]
    pub fn dec_ref(&mut self, value: Value) {
        if let Value::Object(r) = value {
            self.release(r);
        }
    }

    /// Add a reference to an object
    pub fn retain(&mut self, r: ObjRef) {
        match self.entry_mut(r) {
            Some(entry) => entry.refs += 1,
            None => tracing::warn!(object = ?r, "retain of a dead object"),
        }
    }

    /// Drop a reference to an object, freeing it (and, transitively, its
    /// children) when the count reaches zero
    pub fn release(&mut self, r: ObjRef) {
        let mut pending = vec![r];
        while let Some(r) = pending.pop() {
            let Some(entry) = self.entry_mut(r) else {
                tracing::warn!(object = ?r, "release of a dead object");
                continue;
            };
            entry.refs = entry.refs.saturating_sub(1);
            if entry.refs > 0 || entry.pinned {
                continue;
            }
            let slot = &mut self.slots[r.index as usize];
            let Some(entry) = slot.entry.take() else {
                continue;
            };
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(r.index);
            self.live -= 1;
            pending.push(entry.class);
            entry.body.release_children(&mut pending);
        }
    }

    /// Current reference count (0 once freed)
    pub fn ref_count(&self, r: ObjRef) -> u32 {
        self.entry(r).map_or(0, |entry| entry.refs)
    }

    /// Is the handle still valid
    #[inline]
    pub fn is_live(&self, r: ObjRef) -> bool {
        self.entry(r).is_some()
    }

    /// Number of live objects, built-ins included
    #[inline]
    pub fn live_objects(&self) -> usize {
        self.live
    }

    fn entry(&self, r: ObjRef) -> Option<&Entry> {
        let slot = self.slots.get(r.index as usize)?;
        if slot.generation != r.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    fn entry_mut(&mut self, r: ObjRef) -> Option<&mut Entry> {
        let slot = self.slots.get_mut(r.index as usize)?;
        if slot.generation != r.generation {
            return None;
        }
        slot.entry.as_mut()
    }

    // ==================== Typed access ====================

    /// Class of an object
    #[inline]
    pub fn class_of(&self, r: ObjRef) -> Option<ObjRef> {
        self.entry(r).map(|entry| entry.class)
    }

    /// Change the class of an object, moving the class reference
    pub fn set_class(&mut self, r: ObjRef, class: ObjRef) {
        let Some(entry) = self.entry_mut(r) else {
            return;
        };
        let old = std::mem::replace(&mut entry.class, class);
        self.retain(class);
        self.release(old);
    }

    /// Payload of an object
    #[inline]
    pub fn body(&self, r: ObjRef) -> Option<&Body> {
        self.entry(r).map(|entry| &entry.body)
    }

    /// Mutable payload of an object
    #[inline]
    pub fn body_mut(&mut self, r: ObjRef) -> Option<&mut Body> {
        self.entry_mut(r).map(|entry| &mut entry.body)
    }

    /// String payload
    pub fn string(&self, r: ObjRef) -> Option<&SharkString> {
        match self.body(r)? {
            Body::Str(s) => Some(s),
            _ => None,
        }
    }

    /// String payload of a value
    pub fn value_string(&self, v: Value) -> Option<&SharkString> {
        self.string(v.as_object()?)
    }

    /// Array payload
    pub fn array(&self, r: ObjRef) -> Option<&Array> {
        match self.body(r)? {
            Body::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Mutable array payload
    pub fn array_mut(&mut self, r: ObjRef) -> Option<&mut Array> {
        match self.body_mut(r)? {
            Body::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Table payload (plain table or field-table instance)
    pub fn table(&self, r: ObjRef) -> Option<&Table> {
        match self.body(r)? {
            Body::Table(t) => Some(t),
            _ => None,
        }
    }

    /// Function payload
    pub fn function(&self, r: ObjRef) -> Option<&Function> {
        match self.body(r)? {
            Body::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Mutable function payload
    pub fn function_mut(&mut self, r: ObjRef) -> Option<&mut Function> {
        match self.body_mut(r)? {
            Body::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Class payload
    pub fn class(&self, r: ObjRef) -> Option<&Class> {
        match self.body(r)? {
            Body::Class(c) => Some(c),
            _ => None,
        }
    }

    /// Module payload
    pub fn module(&self, r: ObjRef) -> Option<&Module> {
        match self.body(r)? {
            Body::Module(m) => Some(m),
            _ => None,
        }
    }

    /// Host object payload, downcast to `T`
    pub fn native<T: NativeObject>(&self, r: ObjRef) -> Option<&T> {
        match self.body(r)? {
            Body::Native(n) => n.as_any().downcast_ref(),
            _ => None,
        }
    }

    /// Mutable host object payload, downcast to `T`
    pub fn native_mut<T: NativeObject>(&mut self, r: ObjRef) -> Option<&mut T> {
        match self.body_mut(r)? {
            Body::Native(n) => n.as_any_mut().downcast_mut(),
            _ => None,
        }
    }

    /// Is this a table of class `table`
    pub fn is_plain_table(&self, r: ObjRef) -> bool {
        self.table(r).is_some() && self.class_of(r) == Some(self.builtins.table)
    }

    /// Is this an instance of a field-table class
    pub fn is_instance(&self, r: ObjRef) -> bool {
        self.table(r).is_some()
            && self
                .class_of(r)
                .and_then(|c| self.class(c))
                .is_some_and(Class::has_fields)
    }

    /// Name of the class of a value, for messages
    pub fn type_name(&self, v: Value) -> String {
        match v {
            Value::Object(r) => self
                .class_of(r)
                .and_then(|c| self.class(c))
                .map_or_else(|| "<dead object>".to_string(), |c| c.name.clone()),
            other => other.kind_name().to_string(),
        }
    }

    /// Walk the class chain of `r` looking for `class`
    pub fn instance_of(&self, r: ObjRef, class: ObjRef) -> bool {
        let mut current = self.class_of(r);
        while let Some(c) = current {
            if c == class {
                return true;
            }
            current = self.class(c).and_then(|c| c.parent);
        }
        false
    }

    // ==================== Equality and hashing ====================

    /// Hash of a value: scalars by value, strings by content, other objects
    /// by identity
    pub fn hash_value(&self, v: Value) -> u64 {
        match v {
            Value::Null => 1,
            Value::Bool(b) => {
                if b {
                    2
                } else {
                    1
                }
            }
            Value::Number(n) => n as i64 as u64,
            Value::Char(c) => u64::from(c),
            Value::Object(r) => match self.string(r) {
                Some(s) => s.hash(),
                None => r.identity_hash(),
            },
        }
    }

    /// Value equality: same kind and payload, strings by content
    pub fn values_equal(&self, a: Value, b: Value) -> bool {
        match (a, b) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Number(x), Value::Number(y)) => x == y,
            (Value::Char(x), Value::Char(y)) => x == y,
            (Value::Object(x), Value::Object(y)) => {
                if x == y {
                    return true;
                }
                match (self.string(x), self.string(y)) {
                    (Some(s), Some(t)) => s.hash() == t.hash() && s.as_bytes() == t.as_bytes(),
                    _ => false,
                }
            }
            _ => false,
        }
    }

    fn str_key_matches(&self, key: Value, bytes: &[u8]) -> bool {
        self.value_string(key).is_some_and(|s| s.as_bytes() == bytes)
    }

    // ==================== Table operations ====================

    /// Value under `key`, borrowed (not counted for the caller)
    pub fn table_get(&self, t: ObjRef, key: Value) -> Option<Value> {
        let hash = self.hash_value(key);
        self.table(t)?.get(hash, |k| self.values_equal(k, key))
    }

    /// Value under a string key given as text
    pub fn table_get_str(&self, t: ObjRef, key: &str) -> Option<Value> {
        let bytes = key.as_bytes();
        self.table(t)?
            .get(hash_bytes(bytes), |k| self.str_key_matches(k, bytes))
    }

    /// Is `key` present
    pub fn table_contains(&self, t: ObjRef, key: Value) -> bool {
        self.table_get(t, key).is_some()
    }

    /// Number of entries, if `t` is a table
    pub fn table_len(&self, t: ObjRef) -> Option<usize> {
        self.table(t).map(Table::len)
    }

    /// Store `value` under `key`; both gain a reference and the replaced
    /// pair loses one. Returns false if `t` is not a table.
    pub fn table_set(&mut self, t: ObjRef, key: Value, value: Value) -> bool {
        let Some(mut table) = self.take_table(t) else {
            return false;
        };
        let hash = self.hash_value(key);
        let replaced = table.insert(hash, key, value, |k| self.values_equal(k, key));
        self.put_table(t, table);
        self.inc_ref(key);
        self.inc_ref(value);
        if let Some((old_key, old_value)) = replaced {
            self.dec_ref(old_key);
            self.dec_ref(old_value);
        }
        true
    }

    /// Store under a string key given as text
    pub fn table_set_str(&mut self, t: ObjRef, key: &str, value: Value) -> bool {
        let key = self.alloc_string(SharkString::from(key));
        let stored = self.table_set(t, Value::Object(key), value);
        self.release(key);
        stored
    }

    /// Remove `key`, returning its value with the table's reference
    /// transferred to the caller
    pub fn table_pop(&mut self, t: ObjRef, key: Value) -> Option<Value> {
        let mut table = self.take_table(t)?;
        let hash = self.hash_value(key);
        let removed = table.remove(hash, |k| self.values_equal(k, key));
        self.put_table(t, table);
        let (old_key, old_value) = removed?;
        self.dec_ref(old_key);
        Some(old_value)
    }

    /// Remove `key`, releasing the stored pair
    pub fn table_delete(&mut self, t: ObjRef, key: Value) -> bool {
        match self.table_pop(t, key) {
            Some(value) => {
                self.dec_ref(value);
                true
            }
            None => false,
        }
    }

    /// Snapshot of a table's entries (borrowed values)
    pub fn table_entries(&self, t: ObjRef) -> Vec<(Value, Value)> {
        self.table(t).map(|t| t.iter().collect()).unwrap_or_default()
    }

    /// New plain table holding the same entries
    pub fn copy_table(&mut self, t: ObjRef) -> ObjRef {
        let copy = self.table(t).cloned().unwrap_or_default();
        for (k, v) in copy.iter() {
            self.inc_ref(k);
            self.inc_ref(v);
        }
        self.alloc(self.builtins.table, Body::Table(copy))
    }

    fn take_table(&mut self, t: ObjRef) -> Option<Table> {
        match self.body_mut(t)? {
            Body::Table(table) => Some(std::mem::replace(table, Table::detached())),
            _ => None,
        }
    }

    fn put_table(&mut self, t: ObjRef, table: Table) {
        if let Some(Body::Table(slot)) = self.body_mut(t) {
            *slot = table;
        }
    }

    // ==================== Array operations ====================

    /// Append a value; it gains a reference. Returns false if `r` is not an
    /// array.
    pub fn array_push(&mut self, r: ObjRef, value: Value) -> bool {
        let Some(array) = self.array_mut(r) else {
            return false;
        };
        array.push(value);
        self.inc_ref(value);
        true
    }

    /// Remove the last element, transferring the array's reference to the
    /// caller
    pub fn array_pop(&mut self, r: ObjRef) -> Option<Value> {
        self.array_mut(r)?.pop()
    }

    /// Element at `index`, borrowed
    pub fn array_get(&self, r: ObjRef, index: usize) -> Option<Value> {
        self.array(r)?.get(index)
    }

    /// Replace the element at `index`; the new value gains a reference and
    /// the old one loses one
    pub fn array_set(&mut self, r: ObjRef, index: usize, value: Value) -> bool {
        let Some(old) = self.array_mut(r).and_then(|a| a.set(index, value)) else {
            return false;
        };
        self.inc_ref(value);
        self.dec_ref(old);
        true
    }

    /// Number of elements, if `r` is an array
    pub fn array_len(&self, r: ObjRef) -> Option<usize> {
        self.array(r).map(Array::len)
    }
}
