//! The virtual machine
//!
//! A [`Vm`] owns the heap, the shared operand stack, the module registries
//! and the error cell. Everything runs synchronously on the calling thread.

use std::path::PathBuf;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use shark_vm_bytecode::Import;

use crate::array::Array;
use crate::config::VmConfig;
use crate::error::{VmError, VmResult};
use crate::frame::{CallInfo, Frame};
use crate::function::FunctionBody;
use crate::heap::{Body, Heap, ObjRef};
use crate::module::Module;
use crate::native::Args;
use crate::string::SharkString;
use crate::table::Table;
use crate::class::ClassKind;
use crate::value::Value;

/// Remaining native stack below which a call grows the stack
const STACK_RED_ZONE: usize = 128 * 1024;
/// Size of each new stack segment
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

/// Where a raised error goes
#[derive(Debug, Default)]
pub(crate) struct ErrorCell {
    /// Inside a protected call
    pub protect: bool,
    /// Captured message (counted)
    pub message: Option<Value>,
}

impl ErrorCell {
    pub fn protecting() -> Self {
        Self {
            protect: true,
            message: None,
        }
    }
}

/// A Shark virtual machine
pub struct Vm {
    pub(crate) heap: Heap,
    pub(crate) stack: Vec<Value>,
    pub(crate) frames: Vec<CallInfo>,
    pub(crate) config: VmConfig,
    /// Archive name -> main module name
    pub(crate) archives: FxHashMap<String, String>,
    /// Every loaded module (counted)
    pub(crate) modules: FxHashMap<String, ObjRef>,
    /// Modules whose top-level code has run or is running (counted)
    pub(crate) imported: FxHashMap<String, ObjRef>,
    pub(crate) error: ErrorCell,
    /// Owner of host methods bound to classes
    pub(crate) builtin_module: ObjRef,
    status: i64,
}

impl Vm {
    /// Create a VM
    pub fn new(config: VmConfig) -> Self {
        let mut heap = Heap::new();
        let names = heap.alloc_table();
        let builtin_module = heap.alloc(
            heap.builtins().module,
            Body::Module(Module {
                name: "builtin".to_string(),
                imports: Vec::new(),
                names,
                constants: Rc::from(Vec::new()),
                code: Rc::from(Vec::new()),
            }),
        );
        Self {
            heap,
            stack: Vec::with_capacity(config.initial_stack_capacity),
            frames: Vec::new(),
            config,
            archives: FxHashMap::default(),
            modules: FxHashMap::default(),
            imported: FxHashMap::default(),
            error: ErrorCell::default(),
            builtin_module,
            status: 0,
        }
    }

    /// The object heap
    #[inline]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// The object heap, mutably
    #[inline]
    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// Configuration in effect
    #[inline]
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Append a directory to the archive search path
    pub fn add_import_path(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        tracing::debug!(path = %path.display(), "import path added");
        self.config.import_paths.push(path);
    }

    /// Error status side channel, set by protected calls
    #[inline]
    pub fn status(&self) -> i64 {
        self.status
    }

    /// Set the error status
    #[inline]
    pub fn set_status(&mut self, status: i64) {
        self.status = status;
    }

    // ==================== Operand stack ====================

    /// Current stack height
    #[inline]
    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    pub(crate) fn stack_value(&self, index: usize) -> Value {
        self.stack.get(index).copied().unwrap_or_default()
    }

    /// Push a borrowed value, adding a reference
    #[inline]
    pub(crate) fn push(&mut self, value: Value) {
        self.heap.inc_ref(value);
        self.stack.push(value);
    }

    /// Push a value whose reference the stack takes over
    #[inline]
    pub(crate) fn push_owned(&mut self, value: Value) {
        self.stack.push(value);
    }

    /// Pop, handing the stack's reference to the caller
    #[inline]
    pub(crate) fn pop(&mut self) -> Value {
        self.stack.pop().unwrap_or_default()
    }

    /// Pop and release
    #[inline]
    pub(crate) fn drop_top(&mut self) {
        let value = self.pop();
        self.heap.dec_ref(value);
    }

    /// Value `depth` slots below the top, borrowed
    #[inline]
    pub(crate) fn peek(&self, depth: usize) -> Value {
        self.stack
            .len()
            .checked_sub(depth + 1)
            .map_or(Value::Null, |i| self.stack[i])
    }

    /// Pop and release down to `height`
    pub(crate) fn pop_to(&mut self, height: usize) {
        while self.stack.len() > height {
            self.drop_top();
        }
    }

    // ==================== Errors ====================

    /// Active calls, innermost first, formatted for a stack trace
    pub fn stack_trace(&self) -> Vec<String> {
        self.frames
            .iter()
            .rev()
            .map(|call| {
                let module = self
                    .heap
                    .module(call.module)
                    .map_or("?", |m| m.name.as_str());
                let Some(function) = call.function.and_then(|f| self.heap.function(f)) else {
                    return format!("module {module}");
                };
                match function.class.and_then(|c| self.heap.class(c)) {
                    Some(class) => format!(
                        "module {module} class {} function {}",
                        class.name, function.name
                    ),
                    None => format!("module {module} function {}", function.name),
                }
            })
            .collect()
    }

    /// Fatal error with the current stack trace
    pub fn fatal(&self, message: impl Into<String>) -> VmError {
        let message = message.into();
        tracing::debug!(%message, "fatal error");
        VmError::fatal(message, self.stack_trace())
    }

    /// Raise a language-level error.
    ///
    /// Inside a protected call the message is stored in the error cell and
    /// null is returned; the interpreter then unwinds to the protecting
    /// call. Outside one the raise is fatal.
    pub fn raise(&mut self, message: Value) -> VmResult<Value> {
        if !self.error.protect {
            return Err(self.fatal(self.display(message)));
        }
        self.heap.inc_ref(message);
        if let Some(old) = self.error.message.replace(message) {
            self.heap.dec_ref(old);
        }
        Ok(Value::Null)
    }

    /// Is a raised error waiting to unwind
    #[inline]
    pub fn error_pending(&self) -> bool {
        self.error.message.is_some()
    }

    // ==================== Objects ====================

    /// New string (owned by the caller)
    pub fn new_string(&mut self, text: &str) -> Value {
        Value::Object(self.heap.alloc_string(SharkString::from(text)))
    }

    /// New array holding `items`, each gaining a reference (owned by the
    /// caller)
    pub fn new_array(&mut self, items: &[Value]) -> Value {
        for &item in items {
            self.heap.inc_ref(item);
        }
        Value::Object(self.heap.alloc_array(Array::from_values(items.to_vec())))
    }

    /// Add a reference
    #[inline]
    pub fn retain(&mut self, value: Value) {
        self.heap.inc_ref(value);
    }

    /// Drop a reference
    #[inline]
    pub fn release(&mut self, value: Value) {
        self.heap.dec_ref(value);
    }

    /// Allocate an instance of `class` without running `init` (owned by the
    /// caller)
    pub fn instantiate(&mut self, class: ObjRef) -> VmResult<ObjRef> {
        let builtins = *self.heap.builtins();
        let kind = self
            .heap
            .class(class)
            .map(|c| c.kind.clone())
            .ok_or_else(|| self.fatal("invalid operand for new operator (expected a class)."))?;
        let object = match kind {
            ClassKind::Fields => self.heap.alloc(class, Body::Table(Table::new())),
            ClassKind::Native(factory) => self.heap.alloc(class, Body::Native(factory())),
            ClassKind::Builtin if class == builtins.array => self.heap.alloc_array(Array::new()),
            ClassKind::Builtin if class == builtins.table => self.heap.alloc_table(),
            ClassKind::Builtin if class == builtins.string => {
                self.heap.alloc_string(SharkString::new(Vec::new()))
            }
            ClassKind::Builtin => {
                return Err(self.fatal("can't create instance of this class (no constructor defined)."));
            }
        };
        Ok(object)
    }

    pub(crate) fn alloc_module(
        &mut self,
        name: &str,
        imports: Vec<Import>,
        constants: Rc<[Value]>,
        code: Rc<[u8]>,
    ) -> ObjRef {
        let names = self.heap.alloc_table();
        self.heap.alloc(
            self.heap.builtins().module,
            Body::Module(Module {
                name: name.to_string(),
                imports,
                names,
                constants,
                code,
            }),
        )
    }

    /// Loaded module by name
    pub fn module(&self, name: &str) -> Option<ObjRef> {
        self.modules.get(name).copied()
    }

    /// Value bound to `name` in a module's name table, borrowed
    pub fn global(&self, module: ObjRef, name: &str) -> Option<Value> {
        let names = self.heap.module(module)?.names;
        self.heap.table_get_str(names, name)
    }

    /// Human-readable rendering of a value
    pub fn display(&self, value: Value) -> String {
        match value {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => match value.as_int() {
                Some(i) => i.to_string(),
                None => n.to_string(),
            },
            Value::Char(c) => char::from(c).to_string(),
            Value::Object(r) => match self.heap.string(r) {
                Some(s) => s.to_string_lossy(),
                None => format!("<{}>", self.heap.type_name(value)),
            },
        }
    }

    // ==================== Calls ====================

    /// Call a function whose arguments (and receiver, for methods) are the
    /// top `argc + self_offset` stack values. The arguments are consumed;
    /// the result is owned by the caller.
    pub(crate) fn invoke(&mut self, function: ObjRef, argc: usize, self_offset: usize) -> VmResult<Value> {
        let Some(f) = self.heap.function(function) else {
            return Err(self.fatal("can't call a non-function value."));
        };
        if usize::from(f.arity) != argc {
            return Err(self.fatal("arity mismatch in function call."));
        }
        if self.frames.len() >= self.config.max_call_depth {
            return Err(self.fatal("stack overflow"));
        }
        let module = f.module;
        let body = f.body.clone();
        let Some(base) = self.stack.len().checked_sub(argc + self_offset) else {
            return Err(self.fatal("not enough values on the stack for call."));
        };
        tracing::trace!(function = %f.name, argc, "call");

        self.heap.retain(function);
        self.frames.push(CallInfo {
            module,
            function: Some(function),
        });
        // Each script call nests a few native frames; grow the thread stack
        // so any depth under the configured limit fits
        let result = stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || match body {
            FunctionBody::Bytecode { entry } => match self.function_frame(module, function, entry, base) {
                Ok(frame) => self.run(frame),
                Err(err) => Err(err),
            },
            FunctionBody::Native(native) => native(self, Args::new(base, argc + self_offset)),
        });
        self.pop_to(base);
        self.frames.pop();
        self.heap.release(function);
        result
    }

    fn function_frame(&self, module: ObjRef, function: ObjRef, entry: usize, base: usize) -> VmResult<Frame> {
        let Some(m) = self.heap.module(module) else {
            return Err(self.fatal("function's module is gone."));
        };
        Ok(Frame::new(
            module,
            Some(function),
            m.names,
            Rc::clone(&m.code),
            Rc::clone(&m.constants),
            entry,
            base,
        ))
    }

    /// Run `f` and, if it fails, drop whatever it left on the stack and
    /// call chain
    fn guarded<T>(&mut self, f: impl FnOnce(&mut Self) -> VmResult<T>) -> VmResult<T> {
        let height = self.stack.len();
        let depth = self.frames.len();
        let result = f(self);
        if result.is_err() {
            self.pop_to(height);
            self.frames.truncate(depth);
        }
        result
    }

    /// Call a function from the host. For methods, `args[0]` is the
    /// receiver. The result is owned by the caller.
    pub fn call_function(&mut self, function: ObjRef, args: &[Value]) -> VmResult<Value> {
        let self_offset = match self.heap.function(function) {
            Some(f) if f.is_method() => 1,
            Some(_) => 0,
            None => return Err(self.fatal("can't call a non-function value.")),
        };
        let Some(argc) = args.len().checked_sub(self_offset) else {
            return Err(self.fatal("arity mismatch in function call."));
        };
        self.guarded(|vm| {
            for &arg in args {
                vm.push(arg);
            }
            vm.invoke(function, argc, self_offset)
        })
    }

    // ==================== Modules ====================

    /// Import a loaded module, running its top-level code the first time
    pub fn import_module(&mut self, name: &str) -> VmResult<ObjRef> {
        if let Some(&module) = self.imported.get(name) {
            return Ok(module);
        }
        let Some(&module) = self.modules.get(name) else {
            return Err(VmError::MissingModule(name.to_string()));
        };
        tracing::debug!(module = name, "importing module");
        self.heap.retain(module);
        self.imported.insert(name.to_string(), module);
        self.exec_module(module)?;
        Ok(module)
    }

    /// Resolve a module's imports, then run its top-level code
    pub fn exec_module(&mut self, module: ObjRef) -> VmResult<()> {
        let Some(m) = self.heap.module(module) else {
            return Err(self.fatal("can't execute a non-module object."));
        };
        let imports = m.imports.clone();
        let names = m.names;
        let code = Rc::clone(&m.code);
        let constants = Rc::clone(&m.constants);

        for import in &imports {
            let imported = self.import_module(&import.path)?;
            self.bind_import(names, imported, import);
        }

        let previous = std::mem::take(&mut self.error);
        let result = self.guarded(|vm| {
            if vm.frames.len() >= vm.config.max_call_depth {
                return Err(vm.fatal("stack overflow"));
            }
            vm.frames.push(CallInfo {
                module,
                function: None,
            });
            let base = vm.stack.len();
            let frame = Frame::new(module, None, names, code, constants, 0, base);
            let result = vm.run(frame);
            vm.frames.pop();
            result
        });
        let cell = std::mem::replace(&mut self.error, previous);
        if let Some(message) = cell.message {
            self.heap.dec_ref(message);
        }
        let value = result?;
        self.heap.dec_ref(value);
        Ok(())
    }

    fn bind_import(&mut self, names: ObjRef, imported: ObjRef, import: &Import) {
        let Some(imported_names) = self.heap.module(imported).map(|m| m.names) else {
            return;
        };
        match &import.mode {
            shark_vm_bytecode::ImportMode::Alias(alias) => {
                self.heap.table_set_str(names, alias, Value::Object(imported));
            }
            shark_vm_bytecode::ImportMode::Symbols(symbols) => {
                for symbol in symbols {
                    let value = self
                        .heap
                        .table_get_str(imported_names, symbol)
                        .unwrap_or_default();
                    self.heap.table_set_str(names, symbol, value);
                }
            }
        }
    }

    /// Run the module's `main(args)` if it defines one. Returns null when it
    /// does not; otherwise `main`'s result, owned by the caller.
    pub fn exec_main(&mut self, module: ObjRef, args: &[String]) -> VmResult<Value> {
        let Some(main) = self.global(module, "main") else {
            return Ok(Value::Null);
        };
        if main.is_null() {
            return Ok(Value::Null);
        }
        let Some(function) = main.as_object().filter(|&r| self.heap.function(r).is_some()) else {
            return Err(self.fatal("expected symbol main to be a function."));
        };
        if self.heap.function(function).map(|f| f.arity) != Some(1) {
            return Err(self.fatal("expected main function to take exactly one argument."));
        }

        let items: Vec<Value> = args.iter().map(|a| self.new_string(a)).collect();
        let array = Value::Object(self.heap.alloc_array(Array::from_values(items)));
        let result = self.call_unprotected(function, &[array]);
        self.heap.dec_ref(array);
        result
    }

    /// Call the function bound to `name` in `module` with a fresh,
    /// unprotected error cell. The result is owned by the caller.
    pub fn call_entry(&mut self, module: ObjRef, name: &str, args: &[Value]) -> VmResult<Value> {
        let Some(function) = self
            .global(module, name)
            .and_then(Value::as_object)
            .filter(|&r| self.heap.function(r).is_some())
        else {
            return Err(self.fatal(format!("expected symbol {name} to be a function.")));
        };
        self.call_unprotected(function, args)
    }

    fn call_unprotected(&mut self, function: ObjRef, args: &[Value]) -> VmResult<Value> {
        let previous = std::mem::take(&mut self.error);
        let result = self.call_function(function, args);
        let cell = std::mem::replace(&mut self.error, previous);
        if let Some(message) = cell.message {
            self.heap.dec_ref(message);
        }
        result
    }
}
