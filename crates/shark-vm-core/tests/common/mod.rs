//! Helpers shared by the integration tests

#![allow(dead_code)]

use shark_vm_bytecode::{ArchiveImage, Assembler, ModuleImage};
use shark_vm_core::{ObjRef, Value, Vm, VmConfig, VmResult};

/// Archive bytes whose main module is the first of `modules`
pub fn archive(modules: Vec<ModuleImage>) -> Vec<u8> {
    let main = modules.first().map(|m| m.name.clone()).unwrap_or_default();
    let mut image = ArchiveImage::new(main);
    for module in modules {
        image = image.with_module(module);
    }
    image.to_bytes().unwrap()
}

/// Load modules into `vm` as one archive and return the main module
pub fn load(vm: &mut Vm, modules: Vec<ModuleImage>) -> ObjRef {
    let name = modules.first().map(|m| m.name.clone()).unwrap_or_default();
    vm.load_archive_bytes(&name, &archive(modules)).unwrap()
}

/// Load, run the top-level code, then call `main([])`
pub fn run_in(vm: &mut Vm, modules: Vec<ModuleImage>) -> VmResult<Value> {
    let main = load(vm, modules);
    vm.exec_module(main)?;
    vm.exec_main(main, &[])
}

/// Run a single module in a fresh VM
pub fn run(asm: Assembler) -> (Vm, VmResult<Value>) {
    let mut vm = Vm::new(VmConfig::default());
    let result = run_in(&mut vm, vec![asm.finish().unwrap()]);
    (vm, result)
}

/// Module `main` whose `main(args)` body is produced by `body` and whose
/// top-level code is produced by `top` (emitted before `main`)
pub fn program(top: impl FnOnce(&mut Assembler), body: impl FnOnce(&mut Assembler)) -> Assembler {
    let mut asm = Assembler::new("main");
    top(&mut asm);
    asm.begin_function("main", 1);
    body(&mut asm);
    asm.emit(shark_vm_bytecode::Instruction::Return);
    asm.end_function().unwrap();
    asm.emit(shark_vm_bytecode::Instruction::End);
    asm
}

/// Display a value as text
pub fn text(vm: &Vm, value: Value) -> String {
    vm.display(value)
}
