//! Interpreter throughput benchmarks
//!
//! Each program is assembled and loaded once; the measured part is one call
//! of its `main`.

use criterion::{Criterion, criterion_group, criterion_main};
use shark_vm_bytecode::{ArchiveImage, Assembler, Instruction, LocalIndex, Opcode};
use shark_vm_core::{ObjRef, Vm, VmConfig};
use std::hint::black_box;

const ITERATIONS: i32 = 10_000;

/// Load `asm` as module `main` and run its top-level code
fn load(asm: Assembler) -> (Vm, ObjRef) {
    let image = ArchiveImage::new("main").with_module(asm.finish().unwrap());
    let mut vm = Vm::new(VmConfig::default());
    let main = vm
        .load_archive_bytes("main", &image.to_bytes().unwrap())
        .unwrap();
    vm.exec_module(main).unwrap();
    (vm, main)
}

/// `main(args) { i = 0; <setup>; while i < N { <body>; i += 1 } return <result> }`
fn counted_loop(
    top: impl FnOnce(&mut Assembler),
    setup: impl FnOnce(&mut Assembler),
    body: impl FnOnce(&mut Assembler),
) -> Assembler {
    let mut asm = Assembler::new("main");
    top(&mut asm);
    asm.begin_function("main", 1);
    asm.emit(Instruction::Zero);
    setup(&mut asm);
    let head = asm.label();
    let exit = asm.label();
    asm.place(head);
    asm.load(1).int(ITERATIONS).emit(Instruction::Lt);
    asm.jump(Opcode::If, exit);
    body(&mut asm);
    asm.emit(Instruction::Inc { slot: LocalIndex(1) });
    asm.jump(Opcode::Loop, head);
    asm.place(exit);
    asm.load(2).emit(Instruction::Return);
    asm.end_function().unwrap();
    asm.emit(Instruction::End);
    asm
}

fn bench_number_loop(c: &mut Criterion) {
    // sum = sum + i * 2
    let asm = counted_loop(
        |_| {},
        |a| {
            a.emit(Instruction::Zero);
        },
        |a| {
            a.load(2).load(1).int(2).emit(Instruction::Mul).emit(Instruction::Add);
            a.store(2);
        },
    );
    let (mut vm, main) = load(asm);
    c.bench_function("number_loop_10k", |b| {
        b.iter(|| {
            let result = vm.exec_main(main, &[]).unwrap();
            black_box(result);
        })
    });
}

fn bench_function_calls(c: &mut Criterion) {
    // sum = add(sum, 1)
    let asm = counted_loop(
        |a| {
            a.begin_function("add", 2);
            a.load(0).load(1).emit(Instruction::Add).emit(Instruction::Return);
            a.end_function().unwrap();
        },
        |a| {
            a.emit(Instruction::Zero);
        },
        |a| {
            a.load_global("add")
                .load(2)
                .int(1)
                .emit(Instruction::FunctionCall { argc: 2 });
            a.store(2);
        },
    );
    let (mut vm, main) = load(asm);
    c.bench_function("function_calls_10k", |b| {
        b.iter(|| {
            let result = vm.exec_main(main, &[]).unwrap();
            black_box(result);
        })
    });
}

fn bench_table_writes(c: &mut Criterion) {
    // t = {}; t[i] = i
    let asm = counted_loop(
        |_| {},
        |a| {
            a.emit(Instruction::TableNew).emit(Instruction::TableClose);
        },
        |a| {
            a.load(2).load(1).load(1).emit(Instruction::SetIndex);
        },
    );
    let (mut vm, main) = load(asm);
    c.bench_function("table_writes_10k", |b| {
        b.iter(|| {
            let result = vm.exec_main(main, &[]).unwrap();
            vm.release(black_box(result));
        })
    });
}

criterion_group!(
    benches,
    bench_number_loop,
    bench_function_calls,
    bench_table_writes
);
criterion_main!(benches);
