//! Built-in native modules
//!
//! `bind_error_module` provides the language's exception facility:
//!
//! | name | arity | behavior |
//! |---|---|---|
//! | `error(msg)` | 1 | raise `msg`; fatal outside `pcall` |
//! | `pcall(f, args)` | 2 | call `f(args...)`, returning a raised message instead of failing |
//! | `get_err()` | 0 | status code |
//! | `has_err()` | 0 | status code is non-zero |
//! | `set_err(code)` | 1 | set the status code |
//! | `clear_err()` | 0 | reset the status code to 0 |

use crate::error::VmResult;
use crate::heap::ObjRef;
use crate::native::Args;
use crate::value::Value;
use crate::vm::Vm;

/// Module name compiled programs import the error natives from
pub const ERROR_MODULE: &str = "system.error";

/// Bind the error natives into `module_name`, creating a native module if
/// no loaded archive provides one. Returns the module.
///
/// A module loaded from an archive is imported first, so its placeholder
/// functions exist and get the native bodies.
pub fn bind_error_module(vm: &mut Vm, module_name: &str) -> VmResult<ObjRef> {
    let module = match vm.module(module_name) {
        Some(_) => vm.import_module(module_name)?,
        None => vm.register_native_module(module_name),
    };
    vm.bind_native(module, "error", 1, error)?;
    vm.bind_native(module, "pcall", 2, pcall)?;
    vm.bind_native(module, "get_err", 0, |vm, _| Ok(Value::int(vm.status())))?;
    vm.bind_native(module, "has_err", 0, |vm, _| Ok(Value::Bool(vm.status() != 0)))?;
    vm.bind_native(module, "set_err", 1, |vm, args| {
        let code = args.int(vm, 0, "argument 1 of 'set_err'")?;
        vm.set_status(code);
        Ok(Value::Null)
    })?;
    vm.bind_native(module, "clear_err", 0, |vm, _| {
        vm.set_status(0);
        Ok(Value::Null)
    })?;
    tracing::debug!(module = module_name, "error natives bound");
    Ok(module)
}

fn error(vm: &mut Vm, args: Args) -> VmResult<Value> {
    let message = args.string_object(vm, 0, "argument 1 of 'error'")?;
    vm.raise(Value::Object(message))
}

fn pcall(vm: &mut Vm, args: Args) -> VmResult<Value> {
    let function = args.function(vm, 0, "argument 1 of 'pcall'")?;
    let array = args.array(vm, 1, "argument 2 of 'pcall'")?;
    let items = vm
        .heap()
        .array(array)
        .map(|a| a.as_slice().to_vec())
        .unwrap_or_default();
    let arity = vm.heap().function(function).map_or(0, |f| usize::from(f.arity));
    if items.len() != arity {
        return Err(vm.fatal("arity mismatch in function call."));
    }
    match vm.protected_call(function, &items)? {
        Ok(value) => Ok(value),
        Err(message) => {
            vm.set_status(1);
            Ok(message)
        }
    }
}
