//! Raising errors and catching them with `pcall`

mod common;

use common::{program, text};
use shark_vm_bytecode::{Assembler, Import, Instruction};
use shark_vm_core::natives::{ERROR_MODULE, bind_error_module};
use shark_vm_core::{ObjRef, Value, Vm, VmConfig, VmError};

/// Module `main` importing the error natives, with
/// `fails() { error("boom"); return "after"; }` and `ok(x) { return x + 1; }`
fn error_program(body: impl FnOnce(&mut Assembler)) -> Assembler {
    program(
        |a| {
            a.import(Import::symbols(
                ERROR_MODULE,
                ["error", "pcall", "get_err", "clear_err"],
            ));
            a.begin_function("fails", 0);
            a.load_global("error")
                .string("boom")
                .emit(Instruction::FunctionCall { argc: 1 })
                .emit(Instruction::Drop)
                .string("after")
                .emit(Instruction::Return);
            a.end_function().unwrap();
            a.begin_function("ok", 1);
            a.load(0).int(1).emit(Instruction::Add).emit(Instruction::Return);
            a.end_function().unwrap();
        },
        body,
    )
}

/// `pcall(name, [args...])`
fn pcall(a: &mut Assembler, name: &str, args: &[i32]) {
    a.load_global("pcall").load_global(name);
    a.emit(Instruction::ArrayNew);
    for &n in args {
        a.int(n).emit(Instruction::ArrayNewAppend);
    }
    a.emit(Instruction::ArrayClose);
    a.emit(Instruction::FunctionCall { argc: 2 });
}

fn setup(asm: Assembler) -> (Vm, ObjRef) {
    let mut vm = Vm::new(VmConfig::default());
    bind_error_module(&mut vm, ERROR_MODULE).unwrap();
    let main = common::load(&mut vm, vec![asm.finish().unwrap()]);
    vm.exec_module(main).unwrap();
    (vm, main)
}

#[test]
fn test_pcall_captures_raised_message() {
    let (mut vm, main) = setup(error_program(|a| pcall(a, "fails", &[])));
    let result = vm.exec_main(main, &[]).unwrap();
    assert_eq!(text(&vm, result), "boom");
    assert_eq!(vm.status(), 1);
    assert_eq!(vm.stack_len(), 0);
}

#[test]
fn test_pcall_passes_results_through() {
    let (mut vm, main) = setup(error_program(|a| pcall(a, "ok", &[41])));
    let result = vm.exec_main(main, &[]).unwrap();
    assert_eq!(result, Value::int(42));
    assert_eq!(vm.status(), 0);
}

#[test]
fn test_pcall_checks_arity() {
    let (mut vm, main) = setup(error_program(|a| pcall(a, "ok", &[1, 2])));
    let err = vm.exec_main(main, &[]).unwrap_err();
    assert_eq!(err.to_string(), "arity mismatch in function call.");
}

#[test]
fn test_status_after_clear() {
    // pcall(fails, []); clear_err(); return get_err()
    let (mut vm, main) = setup(error_program(|a| {
        pcall(a, "fails", &[]);
        a.emit(Instruction::Drop);
        a.load_global("clear_err")
            .emit(Instruction::FunctionCall { argc: 0 })
            .emit(Instruction::Drop);
        a.load_global("get_err").emit(Instruction::FunctionCall { argc: 0 });
    }));
    assert_eq!(vm.exec_main(main, &[]).unwrap(), Value::int(0));
}

#[test]
fn test_unprotected_raise_is_fatal() {
    let (mut vm, main) = setup(error_program(|a| {
        a.load_global("fails").emit(Instruction::FunctionCall { argc: 0 });
    }));
    let err = vm.exec_main(main, &[]).unwrap_err();
    let VmError::Fatal(fatal) = &err else {
        panic!("expected a fatal error, got {err:?}");
    };
    assert_eq!(fatal.message, "boom");
    assert_eq!(
        fatal.trace,
        [
            "module system.error function error",
            "module main function fails",
            "module main function main",
        ]
    );
    assert!(err.report().starts_with("boom\ncall stack trace (most recent call first):"));
    assert_eq!(vm.stack_len(), 0);
}

#[test]
fn test_error_needs_string() {
    let (mut vm, main) = setup(error_program(|a| {
        a.load_global("error").int(5).emit(Instruction::FunctionCall { argc: 1 });
    }));
    let err = vm.exec_main(main, &[]).unwrap_err();
    assert_eq!(
        err.to_string(),
        "type error (str expected) at argument 1 of 'error'."
    );
}

#[test]
fn test_nested_pcall_restores_outer_cell() {
    // outer() { pcall(fails, []); error("outer"); }  main: pcall(outer, [])
    let asm = program(
        |a| {
            a.import(Import::symbols(ERROR_MODULE, ["error", "pcall"]));
            a.begin_function("fails", 0);
            a.load_global("error")
                .string("inner")
                .emit(Instruction::FunctionCall { argc: 1 })
                .emit(Instruction::Return);
            a.end_function().unwrap();
            a.begin_function("outer", 0);
            pcall(a, "fails", &[]);
            a.emit(Instruction::Drop);
            a.load_global("error")
                .string("outer")
                .emit(Instruction::FunctionCall { argc: 1 })
                .emit(Instruction::Return);
            a.end_function().unwrap();
        },
        |a| pcall(a, "outer", &[]),
    );
    let (mut vm, main) = setup(asm);
    let result = vm.exec_main(main, &[]).unwrap();
    assert_eq!(text(&vm, result), "outer");
}

#[test]
fn test_repeated_captures_do_not_leak() {
    let (mut vm, main) = setup(error_program(|a| {
        pcall(a, "fails", &[]);
        a.emit(Instruction::Drop).emit(Instruction::Null);
    }));
    vm.exec_main(main, &[]).unwrap();
    let live = vm.heap().live_objects();
    for _ in 0..10 {
        assert_eq!(vm.exec_main(main, &[]).unwrap(), Value::Null);
    }
    assert_eq!(vm.heap().live_objects(), live);
}

#[test]
fn test_host_protected_call() {
    let (mut vm, main) = setup(error_program(|a| {
        a.emit(Instruction::Null);
    }));
    let fails = vm.global(main, "fails").and_then(Value::as_object).unwrap();
    let message = vm.protected_call(fails, &[]).unwrap().unwrap_err();
    assert_eq!(text(&vm, message), "boom");
    vm.release(message);

    let ok = vm.global(main, "ok").and_then(Value::as_object).unwrap();
    let value = vm.protected_call(ok, &[Value::int(1)]).unwrap().unwrap();
    assert_eq!(value, Value::int(2));
}

/// `system.error` as compiled into an archive: placeholder natives plus a
/// plain global
fn error_placeholders() -> Assembler {
    let mut asm = Assembler::new(ERROR_MODULE);
    for (name, arity) in [("error", 1), ("pcall", 2), ("get_err", 0), ("clear_err", 0)] {
        asm.begin_function(name, arity);
        asm.emit(Instruction::NotImplemented);
        asm.end_function().unwrap();
    }
    asm.int(3).define("version");
    asm.emit(Instruction::End);
    asm
}

#[test]
fn test_binding_replaces_archive_placeholders() {
    let main = error_program(|a| pcall(a, "fails", &[]));
    let mut vm = Vm::new(VmConfig::default());
    let main = common::load(
        &mut vm,
        vec![main.finish().unwrap(), error_placeholders().finish().unwrap()],
    );

    let module = bind_error_module(&mut vm, ERROR_MODULE).unwrap();
    assert_eq!(vm.module(ERROR_MODULE), Some(module));
    assert_eq!(vm.global(module, "version"), Some(Value::int(3)));
    let error = vm.global(module, "error");

    vm.exec_module(main).unwrap();
    assert_eq!(vm.global(module, "error"), error);
    let result = vm.exec_main(main, &[]).unwrap();
    assert_eq!(text(&vm, result), "boom");
    assert_eq!(vm.status(), 1);
}
