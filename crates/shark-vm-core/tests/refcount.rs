//! Reference counting: objects die with their last reference, exactly once

use std::any::Any;
use std::cell::Cell;
use std::rc::Rc;

use proptest::prelude::*;
use shark_vm_core::{Array, Heap, NativeObject, ObjRef, SharkString, Value, Vm, VmConfig};

#[derive(Debug, Clone)]
enum Op {
    NewString(String),
    NewArray(Vec<usize>),
    NewTable(Vec<(usize, usize)>),
    Retain(usize),
    Release(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        "[a-z]{0,6}".prop_map(Op::NewString),
        prop::collection::vec(any::<usize>(), 0..4).prop_map(Op::NewArray),
        prop::collection::vec((any::<usize>(), any::<usize>()), 0..3).prop_map(Op::NewTable),
        any::<usize>().prop_map(Op::Retain),
        any::<usize>().prop_map(Op::Release),
    ]
}

/// Handles the test owns, with how many references it holds on each
struct Roots(Vec<(ObjRef, u32)>);

impl Roots {
    fn pick(&self, i: usize) -> Option<ObjRef> {
        let held: Vec<_> = self.0.iter().filter(|(_, n)| *n > 0).collect();
        (!held.is_empty()).then(|| held[i % held.len()].0)
    }

    fn slot(&mut self, r: ObjRef) -> &mut u32 {
        self.0
            .iter_mut()
            .find(|(x, _)| *x == r)
            .map(|(_, n)| n)
            .unwrap()
    }
}

fn apply(heap: &mut Heap, roots: &mut Roots, op: &Op) {
    match op {
        Op::NewString(s) => {
            let r = heap.alloc_string(SharkString::from(s.as_str()));
            roots.0.push((r, 1));
        }
        Op::NewArray(picks) => {
            let items: Vec<Value> = picks
                .iter()
                .filter_map(|&i| roots.pick(i))
                .map(Value::Object)
                .collect();
            for &item in &items {
                heap.inc_ref(item);
            }
            let r = heap.alloc_array(Array::from_values(items));
            roots.0.push((r, 1));
        }
        Op::NewTable(pairs) => {
            let t = heap.alloc_table();
            for &(k, v) in pairs {
                if let (Some(k), Some(v)) = (roots.pick(k), roots.pick(v)) {
                    heap.table_set(t, Value::Object(k), Value::Object(v));
                }
            }
            roots.0.push((t, 1));
        }
        Op::Retain(i) => {
            if let Some(r) = roots.pick(*i) {
                heap.retain(r);
                *roots.slot(r) += 1;
            }
        }
        Op::Release(i) => {
            if let Some(r) = roots.pick(*i) {
                heap.release(r);
                *roots.slot(r) -= 1;
            }
        }
    }
}

proptest! {
    #[test]
    fn test_held_objects_stay_live_and_all_die_at_the_end(ops in prop::collection::vec(op(), 1..40)) {
        let mut heap = Heap::new();
        let baseline = heap.live_objects();
        let mut roots = Roots(Vec::new());

        for op in &ops {
            apply(&mut heap, &mut roots, op);
            for &(r, held) in &roots.0 {
                if held > 0 {
                    prop_assert!(heap.is_live(r));
                }
            }
        }

        for &(r, held) in &roots.0 {
            for _ in 0..held {
                heap.release(r);
            }
        }
        prop_assert_eq!(heap.live_objects(), baseline);
    }
}

struct Tracked {
    drops: Rc<Cell<u32>>,
    payload: Value,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

impl NativeObject for Tracked {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn take_values(&mut self) -> Vec<Value> {
        vec![std::mem::take(&mut self.payload)]
    }
}

#[test]
fn test_host_object_dropped_once() {
    let drops = Rc::new(Cell::new(0));
    let mut vm = Vm::new(VmConfig::default());
    let module = vm.register_native_module("host");
    let counter = Rc::clone(&drops);
    let class = vm
        .register_native_class(module, "Tracked", move || {
            Box::new(Tracked {
                drops: Rc::clone(&counter),
                payload: Value::Null,
            })
        })
        .unwrap();

    let instance = vm.instantiate(class).unwrap();
    let payload = vm.new_string("payload");
    vm.heap_mut().native_mut::<Tracked>(instance).unwrap().payload = payload;

    // Shared by an array and the test
    let holder = vm.new_array(&[Value::Object(instance)]);
    vm.release(holder);
    assert_eq!(drops.get(), 0);
    assert!(vm.heap().is_live(instance));

    vm.heap_mut().release(instance);
    assert_eq!(drops.get(), 1);
    assert!(!vm.heap().is_live(instance));
    assert!(!vm.heap().is_live(payload.as_object().unwrap()));

    // A stale handle is inert
    vm.heap_mut().release(instance);
    assert_eq!(drops.get(), 1);
}

#[test]
fn test_deep_nesting_releases_without_recursion() {
    let mut heap = Heap::new();
    let baseline = heap.live_objects();
    let mut inner = heap.alloc_string(SharkString::from("leaf"));
    for _ in 0..100_000 {
        inner = heap.alloc_array(Array::from_values(vec![Value::Object(inner)]));
    }
    heap.release(inner);
    assert_eq!(heap.live_objects(), baseline);
}

#[test]
fn test_freed_slot_gets_new_generation() {
    let mut heap = Heap::new();
    let first = heap.alloc_string(SharkString::from("a"));
    heap.release(first);
    let second = heap.alloc_string(SharkString::from("b"));
    assert_eq!(first.index(), second.index());
    assert_ne!(first, second);
    assert!(!heap.is_live(first));
    assert_eq!(heap.string(second).unwrap().as_bytes(), b"b");
}

#[test]
fn test_cycles_leak() {
    let mut heap = Heap::new();
    let baseline = heap.live_objects();
    let a = heap.alloc_array(Array::new());
    let b = heap.alloc_array(Array::new());
    heap.array_push(a, Value::Object(b));
    heap.array_push(b, Value::Object(a));
    heap.release(a);
    heap.release(b);
    assert_eq!(heap.live_objects(), baseline + 2);
}
