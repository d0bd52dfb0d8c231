//! Native bridge
//!
//! Hosts supply functions, methods and classes that bytecode calls like any
//! other. A native function receives the VM and an [`Args`] window into the
//! operand stack; it returns one owned value. The interpreter releases the
//! arguments afterwards.
//!
//! Archives declare the signature of a host function as a placeholder whose
//! body is a single `NotImplemented` instruction; [`Vm::bind_native`]
//! replaces that body before any code calls it.

use std::any::Any;
use std::rc::Rc;

use shark_vm_bytecode::Opcode;

use crate::class::{Class, ClassKind, NativeFactory};
use crate::error::VmResult;
use crate::function::{Function, FunctionBody, NativeFn};
use crate::heap::{Body, ObjRef};
use crate::value::Value;
use crate::vm::{ErrorCell, Vm};

/// Arguments of a native call: a window into the operand stack.
///
/// For methods, index 0 is the receiver.
#[derive(Debug, Clone, Copy)]
pub struct Args {
    base: usize,
    len: usize,
}

impl Args {
    pub(crate) fn new(base: usize, len: usize) -> Self {
        Self { base, len }
    }

    /// Number of arguments
    #[inline]
    pub fn len(self) -> usize {
        self.len
    }

    /// No arguments
    #[inline]
    pub fn is_empty(self) -> bool {
        self.len == 0
    }

    /// Argument at `index` (null when out of range). The value is borrowed
    /// from the stack.
    pub fn get(self, vm: &Vm, index: usize) -> Value {
        if index >= self.len {
            return Value::Null;
        }
        vm.stack_value(self.base + index)
    }

    /// All arguments, borrowed
    pub fn values(self, vm: &Vm) -> Vec<Value> {
        (0..self.len).map(|i| self.get(vm, i)).collect()
    }

    fn expect<T>(
        self,
        vm: &Vm,
        index: usize,
        at: &str,
        type_name: &str,
        extract: impl FnOnce(&Vm, Value) -> Option<T>,
    ) -> VmResult<T> {
        extract(vm, self.get(vm, index))
            .ok_or_else(|| vm.fatal(format!("type error ({type_name} expected) at {at}.")))
    }

    /// Integer argument
    pub fn int(self, vm: &Vm, index: usize, at: &str) -> VmResult<i64> {
        self.expect(vm, index, at, "int", |_, v| v.as_int())
    }

    /// Numeric argument
    pub fn number(self, vm: &Vm, index: usize, at: &str) -> VmResult<f64> {
        self.expect(vm, index, at, "number", |_, v| v.as_number())
    }

    /// String argument, copied out
    pub fn string(self, vm: &Vm, index: usize, at: &str) -> VmResult<String> {
        self.expect(vm, index, at, "str", |vm, v| {
            vm.heap().value_string(v).map(|s| s.to_string_lossy())
        })
    }

    /// String object argument
    pub fn string_object(self, vm: &Vm, index: usize, at: &str) -> VmResult<ObjRef> {
        self.expect(vm, index, at, "str", |vm, v| {
            v.as_object().filter(|&r| vm.heap().string(r).is_some())
        })
    }

    /// Array argument
    pub fn array(self, vm: &Vm, index: usize, at: &str) -> VmResult<ObjRef> {
        self.expect(vm, index, at, "array", |vm, v| {
            v.as_object().filter(|&r| vm.heap().array(r).is_some())
        })
    }

    /// Function argument
    pub fn function(self, vm: &Vm, index: usize, at: &str) -> VmResult<ObjRef> {
        self.expect(vm, index, at, "function", |vm, v| {
            v.as_object().filter(|&r| vm.heap().function(r).is_some())
        })
    }

    /// Host object argument of type `T`
    pub fn native<T: NativeObject>(self, vm: &Vm, index: usize, at: &str) -> VmResult<ObjRef> {
        self.expect(vm, index, at, std::any::type_name::<T>(), |vm, v| {
            v.as_object().filter(|&r| vm.heap().native::<T>(r).is_some())
        })
    }
}

/// Instance state of a host class.
///
/// Each host class provides one implementation; the VM reaches the concrete
/// type through downcasting. Values the object stores must be handed back
/// from [`NativeObject::take_values`] so the heap can release them.
pub trait NativeObject: Any {
    /// Upcast for downcasting to the concrete type
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for downcasting to the concrete type
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Move out every counted value the object holds
    fn take_values(&mut self) -> Vec<Value> {
        Vec::new()
    }
}

impl Vm {
    /// Create (or return) a module whose names are filled by the host
    pub fn register_native_module(&mut self, name: &str) -> ObjRef {
        if let Some(&module) = self.modules.get(name) {
            return module;
        }
        let module = self.alloc_module(name, Vec::new(), Rc::from(Vec::new()), Rc::from(Vec::new()));
        self.heap.retain(module);
        self.modules.insert(name.to_string(), module);
        self.imported.insert(name.to_string(), module);
        tracing::debug!(module = name, "native module registered");
        module
    }

    /// Bind a host function to `name` in `module`.
    ///
    /// An existing function keeps its identity and gets the native body;
    /// otherwise a new function is defined. Returns the function.
    pub fn bind_native<F>(&mut self, module: ObjRef, name: &str, arity: u16, f: F) -> VmResult<ObjRef>
    where
        F: Fn(&mut Vm, Args) -> VmResult<Value> + 'static,
    {
        let native: NativeFn = Rc::new(f);
        let names = self
            .heap
            .module(module)
            .map(|m| m.names)
            .ok_or_else(|| self.fatal("can't bind a native function into a non-module object."))?;

        let existing = self
            .heap
            .table_get_str(names, name)
            .and_then(Value::as_object)
            .filter(|&r| self.heap.function(r).is_some());
        if let Some(function) = existing {
            self.rebind(function, name, arity, native);
            return Ok(function);
        }
        if self.heap.table_get_str(names, name).is_some() {
            tracing::warn!(name, "native binding shadows a non-function value");
        }

        let function = self.heap.alloc_function(Function {
            name: name.to_string(),
            arity,
            module,
            class: None,
            supermethod: None,
            body: FunctionBody::Native(native),
        });
        self.heap.table_set_str(names, name, Value::Object(function));
        self.heap.release(function);
        tracing::debug!(name, arity, "native function bound");
        Ok(function)
    }

    /// Bind a host method to `name` in `class`'s method table.
    ///
    /// An inherited method of the same name becomes the supermethod.
    pub fn bind_native_method<F>(&mut self, class: ObjRef, name: &str, arity: u16, f: F) -> VmResult<ObjRef>
    where
        F: Fn(&mut Vm, Args) -> VmResult<Value> + 'static,
    {
        let native: NativeFn = Rc::new(f);
        let methods = self
            .heap
            .class(class)
            .map(|c| c.methods)
            .ok_or_else(|| self.fatal("can't bind a native method into a non-class object."))?;

        let existing = self
            .heap
            .table_get_str(methods, name)
            .and_then(Value::as_object)
            .filter(|&r| self.heap.function(r).is_some());
        if let Some(function) = existing
            && self.heap.function(function).and_then(|f| f.class) == Some(class)
        {
            self.rebind(function, name, arity, native);
            return Ok(function);
        }

        let function = self.heap.alloc_function(Function {
            name: name.to_string(),
            arity,
            module: self.builtin_module,
            class: Some(class),
            supermethod: existing,
            body: FunctionBody::Native(native),
        });
        self.heap.table_set_str(methods, name, Value::Object(function));
        self.heap.release(function);
        tracing::debug!(name, arity, "native method bound");
        Ok(function)
    }

    /// Define a host class named `name` in `module`. Its instances are
    /// built by `factory` when bytecode runs `new`.
    pub fn register_native_class<F>(&mut self, module: ObjRef, name: &str, factory: F) -> VmResult<ObjRef>
    where
        F: Fn() -> Box<dyn NativeObject> + 'static,
    {
        let factory: NativeFactory = Rc::new(factory);
        let names = self
            .heap
            .module(module)
            .map(|m| m.names)
            .ok_or_else(|| self.fatal("can't register a native class into a non-module object."))?;

        let object = self.heap.builtins().object;
        let methods = self.heap.alloc_table();
        self.heap.retain(object);
        let class = self.heap.alloc(
            self.heap.builtins().class,
            Body::Class(Class {
                name: name.to_string(),
                parent: Some(object),
                kind: ClassKind::Native(factory),
                methods,
            }),
        );
        self.heap.table_set_str(names, name, Value::Object(class));
        self.heap.release(class);
        tracing::debug!(class = name, "native class registered");
        Ok(class)
    }

    fn rebind(&mut self, function: ObjRef, name: &str, arity: u16, native: NativeFn) {
        let placeholder = self.is_placeholder(function);
        let Some(f) = self.heap.function_mut(function) else {
            return;
        };
        if !placeholder {
            tracing::warn!(name, "native binding replaces an implemented function");
        }
        if f.arity != arity {
            tracing::warn!(name, declared = f.arity, bound = arity, "native binding changes arity");
            f.arity = arity;
        }
        f.body = FunctionBody::Native(native);
        tracing::debug!(name, arity, "native function bound");
    }

    /// Is `function` a bytecode body consisting of `NotImplemented`
    fn is_placeholder(&self, function: ObjRef) -> bool {
        let Some(f) = self.heap.function(function) else {
            return false;
        };
        let FunctionBody::Bytecode { entry } = f.body else {
            return false;
        };
        self.heap
            .module(f.module)
            .and_then(|m| m.code.get(entry).copied())
            == Some(Opcode::NotImplemented.to_byte())
    }

    /// Call `function` with a protecting error cell installed.
    ///
    /// Returns `Ok(Err(message))` when the call raised an error through
    /// [`Vm::raise`], with the message owned by the caller. Fatal errors are
    /// not captured.
    pub fn protected_call(&mut self, function: ObjRef, args: &[Value]) -> VmResult<Result<Value, Value>> {
        let previous = std::mem::replace(&mut self.error, ErrorCell::protecting());
        let result = self.call_function(function, args);
        let cell = std::mem::replace(&mut self.error, previous);
        match (result, cell.message) {
            (Ok(value), None) => Ok(Ok(value)),
            (Ok(value), Some(message)) => {
                self.heap.dec_ref(value);
                tracing::debug!("protected call captured an error");
                Ok(Err(message))
            }
            (Err(err), message) => {
                if let Some(message) = message {
                    self.heap.dec_ref(message);
                }
                Err(err)
            }
        }
    }
}
