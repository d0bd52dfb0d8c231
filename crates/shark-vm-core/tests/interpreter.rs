//! Interpreter behavior through assembled programs

mod common;

use common::{program, run, run_in, text};
use shark_vm_bytecode::{ArithOp, Assembler, Constant, Instruction, LocalIndex, Opcode};
use shark_vm_core::config::DEFAULT_MAX_CALL_DEPTH;
use shark_vm_core::{Value, Vm, VmConfig, VmError};

fn main_only(body: impl FnOnce(&mut Assembler)) -> Assembler {
    program(|_| {}, body)
}

fn fatal_message(result: Result<Value, VmError>) -> String {
    match result {
        Err(VmError::Fatal(fatal)) => fatal.message,
        other => panic!("expected a fatal error, got {other:?}"),
    }
}

#[test]
fn test_function_call_and_globals() {
    // def add(a, b) { return a + b; }  counter = 40;  main: add(counter, 2)
    let asm = program(
        |a| {
            a.begin_function("add", 2);
            a.load(0).load(1).emit(Instruction::Add).emit(Instruction::Return);
            a.end_function().unwrap();
            a.int(40).define("counter");
        },
        |a| {
            a.load_global("add")
                .load_global("counter")
                .int(2)
                .emit(Instruction::FunctionCall { argc: 2 });
        },
    );
    let (vm, result) = run(asm);
    assert_eq!(result.unwrap(), Value::int(42));
    assert_eq!(vm.stack_len(), 0);
}

#[test]
fn test_arity_mismatch_is_fatal() {
    let asm = program(
        |a| {
            a.begin_function("one", 1);
            a.load(0).emit(Instruction::Return);
            a.end_function().unwrap();
        },
        |a| {
            a.load_global("one").emit(Instruction::FunctionCall { argc: 0 });
        },
    );
    let (vm, result) = run(asm);
    assert_eq!(fatal_message(result), "arity mismatch in function call.");
    assert_eq!(vm.stack_len(), 0);
}

#[test]
fn test_calling_a_non_function_is_fatal() {
    let asm = main_only(|a| {
        a.int(1).emit(Instruction::FunctionCall { argc: 0 });
    });
    let (_, result) = run(asm);
    assert_eq!(fatal_message(result), "can't call a non-function value.");
}

#[test]
fn test_unbounded_recursion_overflows() {
    let asm = program(
        |a| {
            a.begin_function("spin", 0);
            a.load_global("spin")
                .emit(Instruction::FunctionCall { argc: 0 })
                .emit(Instruction::Return);
            a.end_function().unwrap();
        },
        |a| {
            a.load_global("spin").emit(Instruction::FunctionCall { argc: 0 });
        },
    );
    let mut vm = Vm::new(VmConfig::default().with_max_call_depth(64));
    let result = run_in(&mut vm, vec![asm.finish().unwrap()]);
    let err = result.unwrap_err();
    assert_eq!(err.to_string(), "stack overflow");
    assert_eq!(err.as_fatal().unwrap().trace.len(), 64);
    assert_eq!(vm.stack_len(), 0);
}

/// `down(n) { if (n > 0) return down(n - 1); return n; }`  main: down(start)
fn countdown(start: i32) -> Assembler {
    program(
        |a| {
            a.begin_function("down", 1);
            let bottom = a.label();
            a.load(0).emit(Instruction::Zero).emit(Instruction::Gt);
            a.jump(Opcode::If, bottom);
            a.load_global("down")
                .load(0)
                .int(1)
                .emit(Instruction::Sub)
                .emit(Instruction::FunctionCall { argc: 1 })
                .emit(Instruction::Return);
            a.place(bottom);
            a.load(0).emit(Instruction::Return);
            a.end_function().unwrap();
        },
        |a| {
            a.load_global("down")
                .int(start)
                .emit(Instruction::FunctionCall { argc: 1 });
        },
    )
}

#[test]
fn test_recursion_up_to_default_limit() {
    let limit = DEFAULT_MAX_CALL_DEPTH as i32;
    // main plus down(limit - 2) .. down(0) is one frame short of the limit
    let (vm, result) = run(countdown(limit - 2));
    assert_eq!(result.unwrap(), Value::int(0));
    assert_eq!(vm.stack_len(), 0);

    let (vm, result) = run(countdown(limit));
    let err = result.unwrap_err();
    assert_eq!(err.to_string(), "stack overflow");
    assert_eq!(err.as_fatal().unwrap().trace.len(), DEFAULT_MAX_CALL_DEPTH);
    assert_eq!(vm.stack_len(), 0);
}

#[test]
fn test_array_indexing() {
    // a = [10, 20, 30]; a[1] = 5; a[2] += 1; return a[1] + a[2]
    let asm = main_only(|a| {
        a.emit(Instruction::ArrayNew);
        for n in [10, 20, 30] {
            a.int(n).emit(Instruction::ArrayNewAppend);
        }
        a.emit(Instruction::ArrayClose);
        a.load(1).int(1).int(5).emit(Instruction::SetIndex);
        a.load(1)
            .int(2)
            .int(1)
            .emit(Instruction::SetIndexAu { op: ArithOp::Add });
        a.load(1).int(1).emit(Instruction::GetIndex);
        a.load(1).int(2).emit(Instruction::GetIndex);
        a.emit(Instruction::Add);
    });
    let (_, result) = run(asm);
    assert_eq!(result.unwrap(), Value::int(36));
}

#[test]
fn test_array_index_errors() {
    let out_of_range = main_only(|a| {
        a.emit(Instruction::ArrayNew).emit(Instruction::ArrayClose);
        a.int(0).emit(Instruction::GetIndex);
    });
    assert_eq!(fatal_message(run(out_of_range).1), "array index out of range.");

    let not_int = main_only(|a| {
        a.emit(Instruction::ArrayNew).emit(Instruction::ArrayClose);
        a.float(0.5).emit(Instruction::GetIndex);
    });
    assert_eq!(
        fatal_message(run(not_int).1),
        "expected an integer as array index."
    );

    let scalar = main_only(|a| {
        a.int(3).int(0).emit(Instruction::GetIndex);
    });
    assert_eq!(fatal_message(run(scalar).1), "unsupported operand for indexing.");
}

#[test]
fn test_table_membership_and_size() {
    // t = {"a": 1}; t["b"] = 2; return [("a" in t), ("c" not in t), sizeof t, t["missing"]]
    let asm = main_only(|a| {
        a.emit(Instruction::TableNew);
        a.string("a").int(1).emit(Instruction::TableNewInsert);
        a.emit(Instruction::TableClose);
        a.load(1).string("b").int(2).emit(Instruction::SetIndex);
        a.emit(Instruction::ArrayNew);
        a.string("a").load(1).emit(Instruction::In).emit(Instruction::ArrayNewAppend);
        a.string("c").load(1).emit(Instruction::NotIn).emit(Instruction::ArrayNewAppend);
        a.load(1).emit(Instruction::Sizeof).emit(Instruction::ArrayNewAppend);
        a.load(1)
            .string("missing")
            .emit(Instruction::GetIndex)
            .emit(Instruction::ArrayNewAppend);
        a.emit(Instruction::ArrayClose);
    });
    let (vm, result) = run(asm);
    let array = result.unwrap().as_object().unwrap();
    assert_eq!(
        vm.heap().array(array).unwrap().as_slice(),
        &[Value::Bool(true), Value::Bool(true), Value::int(2), Value::Null]
    );
}

#[test]
fn test_membership_needs_table() {
    let asm = main_only(|a| {
        a.int(1).int(2).emit(Instruction::In);
    });
    assert_eq!(
        fatal_message(run(asm).1),
        "can't test membership in a non-table value."
    );
}

#[test]
fn test_sizeof_string() {
    let asm = main_only(|a| {
        a.string("shark").emit(Instruction::Sizeof);
    });
    assert_eq!(run(asm).1.unwrap(), Value::int(5));

    let asm = main_only(|a| {
        a.int(5).emit(Instruction::Sizeof);
    });
    assert_eq!(
        fatal_message(run(asm).1),
        "can't get the sizeof of a scalar type."
    );
}

#[test]
fn test_insert_and_append() {
    // a = [1, 3]; insert(a, 1, 2); append(a, 4); return a
    let asm = main_only(|a| {
        a.emit(Instruction::ArrayNew);
        a.int(1).emit(Instruction::ArrayNewAppend);
        a.int(3).emit(Instruction::ArrayNewAppend);
        a.emit(Instruction::ArrayClose);
        a.load(1).int(1).int(2).emit(Instruction::Insert);
        a.load(1).int(4).emit(Instruction::Append);
        a.load(1);
    });
    let (vm, result) = run(asm);
    let array = result.unwrap().as_object().unwrap();
    assert_eq!(
        vm.heap().array(array).unwrap().as_slice(),
        &[1, 2, 3, 4].map(Value::int)
    );

    let asm = main_only(|a| {
        a.emit(Instruction::ArrayNew).emit(Instruction::ArrayClose);
        a.int(2).int(0).emit(Instruction::Insert);
    });
    assert_eq!(fatal_message(run(asm).1), "insert index out of range.");
}

#[test]
fn test_store_releases_overwritten_value() {
    // local = []; local = 0; return null
    let mut vm = Vm::new(VmConfig::default());
    let asm = main_only(|a| {
        a.emit(Instruction::ArrayNew).emit(Instruction::ArrayClose);
        a.emit(Instruction::Zero).store(1);
        a.emit(Instruction::Null);
    });
    let main = common::load(&mut vm, vec![asm.finish().unwrap()]);
    vm.exec_module(main).unwrap();
    let before = vm.heap().live_objects();
    vm.exec_main(main, &[]).unwrap();
    // The literal array and the args array are both gone
    assert_eq!(vm.heap().live_objects(), before);
}

#[test]
fn test_compound_static_assignment() {
    // counter = 4; main: self_module.counter *= 10; return self_module.counter
    let mut vm = Vm::new(VmConfig::default());
    let asm = program(
        |a| {
            a.int(4).define("counter");
        },
        |a| {
            let counter = a.symbol("counter");
            a.load_global("self_module")
                .int(10)
                .emit(Instruction::SetStaticAu {
                    op: ArithOp::Mul,
                    name: counter,
                });
            a.load_global("self_module").get_static("counter");
        },
    );
    let main = common::load(&mut vm, vec![asm.finish().unwrap()]);
    let names = vm.heap().module(main).unwrap().names;
    vm.heap_mut()
        .table_set_str(names, "self_module", Value::Object(main));
    vm.exec_module(main).unwrap();
    let result = vm.exec_main(main, &[]).unwrap();
    assert_eq!(result, Value::int(40));
}

#[test]
fn test_compound_field_assignment() {
    // obj = new P(); obj.n = 5; obj.n -= 2; return obj.n
    let asm = program(
        |a| {
            a.emit(Instruction::Null).enter_class("P");
            a.begin_function("init", 0);
            a.emit(Instruction::SelfRef).int(5).set_field("n");
            a.emit(Instruction::Null).emit(Instruction::Return);
            a.end_function().unwrap();
            a.emit(Instruction::ExitClass);
        },
        |a| {
            let n = a.symbol("n");
            a.load_global("P").emit(Instruction::New { argc: 0 });
            a.load(1).int(2).emit(Instruction::SetFieldAu {
                op: ArithOp::Sub,
                name: n,
            });
            a.load(1).get_field("n");
        },
    );
    let (_, result) = run(asm);
    assert_eq!(result.unwrap(), Value::int(3));
}

#[test]
fn test_field_access_needs_instance() {
    let asm = main_only(|a| {
        a.emit(Instruction::TableNew).emit(Instruction::TableClose);
        a.get_field("x");
    });
    assert_eq!(fatal_message(run(asm).1), "can't get field of a non-object.");
}

#[test]
fn test_and_short_circuit() {
    // false and 1 -> false ; true and 7 -> 7
    for (first, expected) in [(false, Value::Bool(false)), (true, Value::int(7))] {
        let asm = main_only(|a| {
            let done = a.label();
            a.emit(if first { Instruction::True } else { Instruction::False });
            a.jump(Opcode::And, done);
            a.int(7);
            a.place(done);
        });
        assert_eq!(run(asm).1.unwrap(), expected);
    }
}

#[test]
fn test_comparisons_need_numbers() {
    let asm = main_only(|a| {
        a.string("a").int(1).emit(Instruction::Lt);
    });
    assert_eq!(
        fatal_message(run(asm).1),
        "unsupported operand types for < operator."
    );

    let asm = main_only(|a| {
        a.int(2).int(3).emit(Instruction::Le);
    });
    assert_eq!(run(asm).1.unwrap(), Value::Bool(true));
}

#[test]
fn test_equality_across_kinds() {
    // ["ab" == "ab", 1 == '1', null != false]
    let asm = main_only(|a| {
        a.emit(Instruction::ArrayNew);
        a.string("ab").string("ab").emit(Instruction::Eq).emit(Instruction::ArrayNewAppend);
        let one = a.constant(Constant::Char(b'1'));
        a.int(1).emit(Instruction::Const { index: one });
        a.emit(Instruction::Eq).emit(Instruction::ArrayNewAppend);
        a.emit(Instruction::Null).emit(Instruction::False);
        a.emit(Instruction::Ne).emit(Instruction::ArrayNewAppend);
        a.emit(Instruction::ArrayClose);
    });
    let (vm, result) = run(asm);
    let array = result.unwrap().as_object().unwrap();
    assert_eq!(
        vm.heap().array(array).unwrap().as_slice(),
        &[Value::Bool(true), Value::Bool(false), Value::Bool(true)]
    );
}

#[test]
fn test_exit_drops_block_locals() {
    let asm = main_only(|a| {
        a.int(1).int(2).int(3);
        a.emit(Instruction::Exit { count: 2 });
        a.emit(Instruction::Swap).emit(Instruction::Drop);
    });
    // Stack after Exit: [args, 1]; Swap -> [1, args]; Drop -> [1]
    assert_eq!(run(asm).1.unwrap(), Value::int(1));
}

#[test]
fn test_inc_needs_number() {
    let asm = main_only(|a| {
        a.emit(Instruction::Null);
        a.emit(Instruction::Inc { slot: LocalIndex(1) });
    });
    assert_eq!(
        fatal_message(run(asm).1),
        "can't increment a non numeric value."
    );
}

#[test]
fn test_not_implemented_placeholder() {
    let asm = program(
        |a| {
            a.begin_function("host_fn", 0);
            a.emit(Instruction::NotImplemented);
            a.end_function().unwrap();
        },
        |a| {
            a.load_global("host_fn").emit(Instruction::FunctionCall { argc: 0 });
        },
    );
    let (_, result) = run(asm);
    assert_eq!(fatal_message(result), "function is not implemented.");
}

#[test]
fn test_bound_placeholder_runs_native() {
    let asm = program(
        |a| {
            a.begin_function("host_fn", 1);
            a.emit(Instruction::NotImplemented);
            a.end_function().unwrap();
        },
        |a| {
            a.load_global("host_fn")
                .string("shark")
                .emit(Instruction::FunctionCall { argc: 1 });
        },
    );
    let mut vm = Vm::new(VmConfig::default());
    let main = common::load(&mut vm, vec![asm.finish().unwrap()]);
    vm.exec_module(main).unwrap();
    let placeholder = vm.global(main, "host_fn").unwrap();
    let bound = vm
        .bind_native(main, "host_fn", 1, |vm, args| {
            let s = args.string(vm, 0, "argument 1 of 'host_fn'")?;
            Ok(vm.new_string(&s.to_uppercase()))
        })
        .unwrap();
    assert_eq!(placeholder, Value::Object(bound));
    let result = vm.exec_main(main, &[]).unwrap();
    assert_eq!(text(&vm, result), "SHARK");
}

#[test]
fn test_main_receives_arguments() {
    // return args[1]
    let asm = main_only(|a| {
        a.load(0).int(1).emit(Instruction::GetIndex);
    });
    let mut vm = Vm::new(VmConfig::default());
    let main = common::load(&mut vm, vec![asm.finish().unwrap()]);
    vm.exec_module(main).unwrap();
    let result = vm
        .exec_main(main, &["game".to_string(), "--fast".to_string()])
        .unwrap();
    assert_eq!(text(&vm, result), "--fast");
}

#[test]
fn test_main_must_take_one_argument() {
    let mut asm = Assembler::new("main");
    asm.begin_function("main", 0);
    asm.emit(Instruction::Null).emit(Instruction::Return);
    asm.end_function().unwrap();
    asm.emit(Instruction::End);
    let mut vm = Vm::new(VmConfig::default());
    let main = common::load(&mut vm, vec![asm.finish().unwrap()]);
    vm.exec_module(main).unwrap();
    assert_eq!(
        fatal_message(vm.exec_main(main, &[])),
        "expected main function to take exactly one argument."
    );
}

#[test]
fn test_module_without_main() {
    let mut asm = Assembler::new("main");
    asm.emit(Instruction::End);
    let mut vm = Vm::new(VmConfig::default());
    let main = common::load(&mut vm, vec![asm.finish().unwrap()]);
    vm.exec_module(main).unwrap();
    assert_eq!(vm.exec_main(main, &[]).unwrap(), Value::Null);
}

#[test]
fn test_call_entry_runs_named_function() {
    let asm = program(
        |a| {
            a.begin_function("update", 1);
            a.load(0).int(1).emit(Instruction::Add).emit(Instruction::Return);
            a.end_function().unwrap();
        },
        |a| {
            a.emit(Instruction::Null);
        },
    );
    let mut vm = Vm::new(VmConfig::default());
    let main = common::load(&mut vm, vec![asm.finish().unwrap()]);
    vm.exec_module(main).unwrap();
    let mut value = Value::int(0);
    for _ in 0..3 {
        value = vm.call_entry(main, "update", &[value]).unwrap();
    }
    assert_eq!(value, Value::int(3));
    assert!(vm.call_entry(main, "render", &[]).is_err());
}
