//! Bytecode interpreter
//!
//! Executes one body (a module's top-level code or a function) against the
//! shared operand stack. Calls recurse into [`Vm::invoke`]; a body returns
//! once it reaches `Return` or `End`, or unwinds early when a call leaves a
//! raised error in the error cell.

use shark_vm_bytecode::{ArithOp, BytecodeError, ConstantIndex, Instruction, JumpOffset};

use crate::class::{Class, ClassKind};
use crate::error::VmResult;
use crate::frame::{Builder, Frame};
use crate::function::{Function, FunctionBody};
use crate::heap::{Body, ObjRef};
use crate::value::Value;
use crate::vm::Vm;

/// What the dispatch loop does after an instruction
enum Flow {
    Continue,
    /// Leave the body with this (owned) value
    Return(Value),
    /// A callee raised an error; leave the body with null
    Unwind,
}

impl Vm {
    /// Execute `frame` until it returns. The result is owned by the caller
    /// and the stack is back at `frame.base`.
    pub(crate) fn run(&mut self, mut frame: Frame) -> VmResult<Value> {
        tracing::trace!(pc = frame.pc, base = frame.base, "frame enter");
        let result = self.run_loop(&mut frame);
        self.release_frame_state(&mut frame);
        match result {
            Ok(Flow::Return(value)) => {
                self.pop_to(frame.base);
                Ok(value)
            }
            Ok(Flow::Unwind) => {
                tracing::trace!("frame unwound by raised error");
                self.pop_to(frame.base);
                Ok(Value::Null)
            }
            Ok(Flow::Continue) => Ok(Value::Null),
            Err(err) => Err(err),
        }
    }

    fn run_loop(&mut self, frame: &mut Frame) -> VmResult<Flow> {
        loop {
            let (instruction, next) = match Instruction::decode(&frame.code, frame.pc) {
                Ok(decoded) => decoded,
                Err(BytecodeError::InvalidOpcode(byte)) => {
                    return Err(self.fatal(format!("unsupported operation: {byte}")));
                }
                Err(_) => return Err(self.fatal("truncated instruction in bytecode.")),
            };
            frame.pc = next;
            match self.execute_instruction(instruction, frame)? {
                Flow::Continue => {}
                flow => return Ok(flow),
            }
        }
    }

    fn release_frame_state(&mut self, frame: &mut Frame) {
        for builder in frame.builders.drain(..).rev() {
            self.heap.release(builder.object());
        }
        if let Some((class, _)) = frame.class.take() {
            self.heap.release(class);
        }
    }

    /// Execute a single instruction
    fn execute_instruction(&mut self, instruction: Instruction, frame: &mut Frame) -> VmResult<Flow> {
        match instruction {
            // ==================== Literals ====================
            Instruction::End => return Ok(Flow::Return(Value::Null)),
            Instruction::Null => self.push_owned(Value::Null),
            Instruction::True => self.push_owned(Value::Bool(true)),
            Instruction::False => self.push_owned(Value::Bool(false)),
            Instruction::Zero => self.push_owned(Value::int(0)),
            Instruction::Const { index } => {
                let value = self.constant(frame, index)?;
                self.push(value);
            }

            // ==================== Locals and globals ====================
            Instruction::LoadGlobal { name } => {
                let key = self.constant(frame, name)?;
                let value = self.heap.table_get(frame.globals, key).unwrap_or_default();
                self.push(value);
            }
            Instruction::Define { name } | Instruction::StoreGlobal { name } => {
                let key = self.constant(frame, name)?;
                self.heap.table_set(frame.globals, key, self.peek(0));
                self.drop_top();
            }
            Instruction::DefineField { name } => {
                self.constant(frame, name)?;
            }
            Instruction::Load { slot } => {
                let index = self.local_index(frame, slot.index())?;
                self.push(self.stack[index]);
            }
            Instruction::Store { slot } => {
                let index = self.local_index(frame, slot.index())?;
                let value = self.pop();
                if index >= self.stack.len() {
                    self.heap.dec_ref(value);
                    return Err(self.fatal("local slot out of range."));
                }
                let old = std::mem::replace(&mut self.stack[index], value);
                self.heap.dec_ref(old);
            }
            Instruction::Inc { slot } => {
                let index = self.local_index(frame, slot.index())?;
                let Some(n) = self.stack[index].as_number() else {
                    return Err(self.fatal("can't increment a non numeric value."));
                };
                self.stack[index] = Value::number(n + 1.0);
            }
            Instruction::SelfRef => {
                let value = self.stack_value(frame.base);
                self.push(value);
            }

            // ==================== Stack shuffling ====================
            Instruction::Exit { count } => {
                for _ in 0..count {
                    self.drop_top();
                }
            }
            Instruction::Dup => self.push(self.peek(0)),
            Instruction::Drop => self.drop_top(),
            Instruction::Swap => {
                let len = self.stack.len();
                if len < 2 {
                    return Err(self.fatal("not enough values on the stack for swap."));
                }
                self.stack.swap(len - 1, len - 2);
            }

            // ==================== Operators ====================
            Instruction::Add => self.binary_arith(ArithOp::Add)?,
            Instruction::Sub => self.binary_arith(ArithOp::Sub)?,
            Instruction::Mul => self.binary_arith(ArithOp::Mul)?,
            Instruction::Div => self.binary_arith(ArithOp::Div)?,
            Instruction::Mod => self.binary_arith(ArithOp::Mod)?,
            Instruction::Lt => self.compare("<", |x, y| x < y)?,
            Instruction::Le => self.compare("<=", |x, y| x <= y)?,
            Instruction::Gt => self.compare(">", |x, y| x > y)?,
            Instruction::Ge => self.compare(">=", |x, y| x >= y)?,
            Instruction::Eq | Instruction::Ne => {
                let equal = self.heap.values_equal(self.peek(1), self.peek(0));
                self.drop_top();
                self.drop_top();
                self.push_owned(Value::Bool(equal == matches!(instruction, Instruction::Eq)));
            }
            Instruction::In | Instruction::NotIn => {
                let table = self.peek(0);
                let Some(t) = table.as_object().filter(|&t| self.heap.is_plain_table(t)) else {
                    return Err(self.fatal("can't test membership in a non-table value."));
                };
                let found = self.heap.table_contains(t, self.peek(1));
                self.drop_top();
                self.drop_top();
                self.push_owned(Value::Bool(found == matches!(instruction, Instruction::In)));
            }
            Instruction::Neg => {
                let Some(n) = self.peek(0).as_number() else {
                    return Err(self.fatal("unsupported operand for - unary op."));
                };
                self.stack.pop();
                self.push_owned(Value::number(-n));
            }
            Instruction::Not => {
                let Some(b) = self.peek(0).as_bool() else {
                    return Err(self.fatal("expected a bool value in 'not' negation."));
                };
                self.stack.pop();
                self.push_owned(Value::Bool(!b));
            }

            // ==================== Control flow ====================
            Instruction::If { offset } => {
                let condition = self.pop();
                match condition.as_bool() {
                    Some(true) => {}
                    Some(false) => frame.pc = self.jump_forward(frame, offset)?,
                    None => {
                        self.heap.dec_ref(condition);
                        return Err(self.fatal("expected a bool value in if condition."));
                    }
                }
            }
            Instruction::Jump { offset } => frame.pc = self.jump_forward(frame, offset)?,
            Instruction::Loop { offset } => {
                let Some(target) = (frame.pc - 2).checked_sub(usize::from(offset.offset())) else {
                    return Err(self.fatal("jump target out of range."));
                };
                frame.pc = target;
            }
            Instruction::Or { offset } => {
                if self.peek(0).is_falsy() {
                    self.drop_top();
                } else {
                    frame.pc = self.jump_forward(frame, offset)?;
                }
            }
            Instruction::And { offset } => {
                if self.peek(0).is_falsy() {
                    frame.pc = self.jump_forward(frame, offset)?;
                } else {
                    self.drop_top();
                }
            }
            Instruction::Return => return Ok(Flow::Return(self.pop())),

            // ==================== Definitions ====================
            Instruction::EnterClass { name } => self.enter_class(frame, name)?,
            Instruction::ExitClass => {
                let Some((class, key)) = frame.class.take() else {
                    return Err(self.fatal("no class definition to close."));
                };
                self.heap.table_set(frame.globals, key, Value::Object(class));
                self.heap.release(class);
            }
            Instruction::Function { arity, name, body_len } => {
                self.define_function(frame, arity, name, body_len)?;
            }
            Instruction::NotImplemented => {
                return Err(self.fatal("function is not implemented."));
            }

            // ==================== Calls ====================
            Instruction::FunctionCall { argc } => {
                let argc = usize::from(argc);
                let Some(callee) = self
                    .peek(argc)
                    .as_object()
                    .filter(|&f| self.heap.function(f).is_some())
                else {
                    return Err(self.fatal("can't call a non-function value."));
                };
                let result = self.invoke(callee, argc, 0)?;
                self.drop_top();
                return Ok(self.finish_call(result));
            }
            Instruction::MethodCall { argc, name } => {
                let argc = usize::from(argc);
                let key = self.constant(frame, name)?;
                let Some(receiver) = self.peek(argc).as_object() else {
                    return Err(self.fatal("invalid method call receiver. (expected an object)"));
                };
                let Some(callee) = self.find_method(receiver, key) else {
                    return Err(self.fatal("object has no method with that name."));
                };
                let result = self.invoke(callee, argc, 1)?;
                return Ok(self.finish_call(result));
            }
            Instruction::SuperCall { argc } => {
                let Some(current) = frame.function else {
                    return Err(self.fatal("super call outside of a method."));
                };
                let Some(callee) = self.heap.function(current).and_then(|f| f.supermethod) else {
                    return Err(self.fatal("method has no supermethod."));
                };
                let result = self.invoke(callee, usize::from(argc), 1)?;
                return Ok(self.finish_call(result));
            }
            Instruction::New { argc } => {
                let argc = usize::from(argc);
                let Some(class) = self
                    .peek(argc)
                    .as_object()
                    .filter(|&c| self.heap.class(c).is_some())
                else {
                    return Err(self.fatal("invalid operand for new operator (expected a class)."));
                };
                let object = self.instantiate(class)?;
                let slot = self.stack.len() - argc - 1;
                let class_value = std::mem::replace(&mut self.stack[slot], Value::Object(object));
                let Some(init) = self.find_method_str(object, "init") else {
                    self.heap.dec_ref(class_value);
                    return Err(self.fatal("can't create instance of this class (no constructor defined)."));
                };
                self.heap.retain(object);
                let result = self.invoke(init, argc, 1);
                self.heap.dec_ref(class_value);
                let result = match result {
                    Ok(result) => result,
                    Err(err) => {
                        self.heap.release(object);
                        return Err(err);
                    }
                };
                self.heap.dec_ref(result);
                if self.error_pending() {
                    self.heap.release(object);
                    return Ok(Flow::Unwind);
                }
                self.push_owned(Value::Object(object));
            }

            // ==================== Object queries ====================
            Instruction::Instanceof => {
                let Some(class) = self
                    .peek(0)
                    .as_object()
                    .filter(|&c| self.heap.class(c).is_some())
                else {
                    return Err(self.fatal(
                        "invalid type operand in instanceof operator (expected a class).",
                    ));
                };
                let result = match self.peek(1) {
                    Value::Null => false,
                    Value::Object(r) => self.heap.instance_of(r, class),
                    _ => {
                        return Err(self.fatal(
                            "invalid value operand in instanceof operator (expected an object).",
                        ));
                    }
                };
                self.drop_top();
                self.drop_top();
                self.push_owned(Value::Bool(result));
            }
            Instruction::Sizeof => {
                let size = self.size_of(self.peek(0))?;
                self.replace_top(Value::int(size as i64));
            }

            // ==================== Fields, statics and indexing ====================
            Instruction::GetField { name } | Instruction::GetFieldTop { name } => {
                let key = self.constant(frame, name)?;
                let object = self.expect_instance(self.peek(0), "can't get field of a non-object.")?;
                let value = self.heap.table_get(object, key).unwrap_or_default();
                self.take_or_keep_top(value, matches!(instruction, Instruction::GetFieldTop { .. }));
            }
            Instruction::SetField { name } => {
                let key = self.constant(frame, name)?;
                let object = self.expect_instance(self.peek(1), "can't set field of non object.")?;
                self.heap.table_set(object, key, self.peek(0));
                self.drop_top();
                self.drop_top();
            }
            Instruction::GetStatic { name } | Instruction::GetStaticTop { name } => {
                let key = self.constant(frame, name)?;
                let names =
                    self.expect_module(self.peek(0), "can't get static field of a non-module object.")?;
                let value = self.heap.table_get(names, key).unwrap_or_default();
                self.take_or_keep_top(value, matches!(instruction, Instruction::GetStaticTop { .. }));
            }
            Instruction::SetStatic { name } => {
                let key = self.constant(frame, name)?;
                let names =
                    self.expect_module(self.peek(1), "can't set static field of non-module object.")?;
                self.heap.table_set(names, key, self.peek(0));
                self.drop_top();
                self.drop_top();
            }
            Instruction::GetIndex | Instruction::GetIndexTop => {
                let value = self.index_get(self.peek(1), self.peek(0))?;
                if matches!(instruction, Instruction::GetIndexTop) {
                    self.push(value);
                } else {
                    self.heap.inc_ref(value);
                    self.drop_top();
                    self.drop_top();
                    self.push_owned(value);
                }
            }
            Instruction::SetIndex => {
                let (target, index, value) = (self.peek(2), self.peek(1), self.peek(0));
                self.index_set(target, index, value)?;
                for _ in 0..3 {
                    self.drop_top();
                }
            }
            Instruction::GetSlice | Instruction::SetSlice => {
                return Err(self.fatal(format!(
                    "unsupported operation: {}",
                    instruction.opcode().to_byte()
                )));
            }

            // ==================== Compound assignment ====================
            Instruction::SetIndexAu { op } => {
                let (target, index, operand) = (self.peek(2), self.peek(1), self.peek(0));
                let current = self.index_get(target, index)?;
                let result = self.arith(op, current, operand)?;
                self.index_set(target, index, result)?;
                self.heap.dec_ref(result);
                for _ in 0..3 {
                    self.drop_top();
                }
            }
            Instruction::SetFieldAu { op, name } => {
                let key = self.constant(frame, name)?;
                let object = self.expect_instance(self.peek(1), "can't set field of non object.")?;
                self.update_entry(object, key, op)?;
            }
            Instruction::SetStaticAu { op, name } => {
                let key = self.constant(frame, name)?;
                let names =
                    self.expect_module(self.peek(1), "can't set static field of non-module object.")?;
                self.update_entry(names, key, op)?;
            }

            // ==================== Containers ====================
            Instruction::Insert => {
                let (target, index, value) = (self.peek(2), self.peek(1), self.peek(0));
                let Some(array) = target.as_object().filter(|&a| self.heap.array(a).is_some()) else {
                    return Err(self.fatal("invalid insert target (expected an array)."));
                };
                let Some(index) = index.as_int() else {
                    return Err(self.fatal("invalid array index (expected an integer)."));
                };
                let inserted = usize::try_from(index)
                    .ok()
                    .and_then(|i| self.heap.array_mut(array).map(|a| a.insert(i, value)))
                    .unwrap_or(false);
                if !inserted {
                    return Err(self.fatal("insert index out of range."));
                }
                self.heap.inc_ref(value);
                for _ in 0..3 {
                    self.drop_top();
                }
            }
            Instruction::Append => {
                let Some(array) = self.peek(1).as_object().filter(|&a| self.heap.array(a).is_some())
                else {
                    return Err(self.fatal("invalid append target (expected an array)."));
                };
                self.heap.array_push(array, self.peek(0));
                self.drop_top();
                self.drop_top();
            }

            // ==================== Literal aggregates ====================
            Instruction::ArrayNew => {
                let array = self.heap.alloc_array(crate::array::Array::new());
                frame.builders.push(Builder::Array(array));
            }
            Instruction::TableNew => {
                let table = self.heap.alloc_table();
                frame.builders.push(Builder::Table(table));
            }
            Instruction::ArrayNewAppend => {
                let Some(&Builder::Array(array)) = frame.builders.last() else {
                    return Err(self.fatal("no array literal under construction."));
                };
                self.heap.array_push(array, self.peek(0));
                self.drop_top();
            }
            Instruction::TableNewInsert => {
                let Some(&Builder::Table(table)) = frame.builders.last() else {
                    return Err(self.fatal("no table literal under construction."));
                };
                self.heap.table_set(table, self.peek(1), self.peek(0));
                self.drop_top();
                self.drop_top();
            }
            Instruction::ArrayClose => match frame.builders.pop() {
                Some(Builder::Array(array)) => self.push_owned(Value::Object(array)),
                other => {
                    frame.builders.extend(other);
                    return Err(self.fatal("no array literal under construction."));
                }
            },
            Instruction::TableClose => match frame.builders.pop() {
                Some(Builder::Table(table)) => self.push_owned(Value::Object(table)),
                other => {
                    frame.builders.extend(other);
                    return Err(self.fatal("no table literal under construction."));
                }
            },
        }
        Ok(Flow::Continue)
    }

    // ==================== Helpers ====================

    fn constant(&self, frame: &Frame, index: ConstantIndex) -> VmResult<Value> {
        frame
            .constants
            .get(index.index() as usize)
            .copied()
            .ok_or_else(|| self.fatal("constant index out of range."))
    }

    fn local_index(&self, frame: &Frame, slot: u16) -> VmResult<usize> {
        let index = frame.base + usize::from(slot);
        if index < self.stack.len() {
            Ok(index)
        } else {
            Err(self.fatal("local slot out of range."))
        }
    }

    /// Target of a forward jump whose 2-byte operand ended at `frame.pc`
    fn jump_forward(&self, frame: &Frame, offset: JumpOffset) -> VmResult<usize> {
        let target = frame.pc - 2 + usize::from(offset.offset());
        if target <= frame.code.len() {
            Ok(target)
        } else {
            Err(self.fatal("jump target out of range."))
        }
    }

    /// Replace the top of the stack with `value` (borrowed)
    fn replace_top(&mut self, value: Value) {
        self.heap.inc_ref(value);
        self.drop_top();
        self.push_owned(value);
    }

    fn take_or_keep_top(&mut self, value: Value, keep: bool) {
        if keep {
            self.push(value);
        } else {
            self.replace_top(value);
        }
    }

    /// Push a call's result, or unwind if it raised
    fn finish_call(&mut self, result: Value) -> Flow {
        self.push_owned(result);
        if self.error_pending() {
            Flow::Unwind
        } else {
            Flow::Continue
        }
    }

    fn expect_instance(&self, value: Value, message: &str) -> VmResult<ObjRef> {
        value
            .as_object()
            .filter(|&r| self.heap.is_instance(r))
            .ok_or_else(|| self.fatal(message))
    }

    /// Name table of a module value
    fn expect_module(&self, value: Value, message: &str) -> VmResult<ObjRef> {
        value
            .as_object()
            .and_then(|r| self.heap.module(r))
            .map(|m| m.names)
            .ok_or_else(|| self.fatal(message))
    }

    fn find_method(&self, receiver: ObjRef, key: Value) -> Option<ObjRef> {
        let class = self.heap.class_of(receiver)?;
        let methods = self.heap.class(class)?.methods;
        self.heap
            .table_get(methods, key)?
            .as_object()
            .filter(|&f| self.heap.function(f).is_some())
    }

    fn find_method_str(&self, receiver: ObjRef, name: &str) -> Option<ObjRef> {
        let class = self.heap.class_of(receiver)?;
        let methods = self.heap.class(class)?.methods;
        self.heap
            .table_get_str(methods, name)?
            .as_object()
            .filter(|&f| self.heap.function(f).is_some())
    }

    fn binary_arith(&mut self, op: ArithOp) -> VmResult<()> {
        let result = self.arith(op, self.peek(1), self.peek(0))?;
        self.drop_top();
        self.drop_top();
        self.push_owned(result);
        Ok(())
    }

    /// Apply an arithmetic operator; the result is owned by the caller
    fn arith(&mut self, op: ArithOp, x: Value, y: Value) -> VmResult<Value> {
        if op == ArithOp::Mod {
            let (Some(a), Some(b)) = (x.as_int(), y.as_int()) else {
                return Err(self.fatal(
                    "unsupported operand types for % operator. (expected two integers)",
                ));
            };
            if b == 0 {
                return Err(self.fatal("integer modulo by zero."));
            }
            return Ok(Value::int(a.wrapping_rem(b)));
        }
        if let (Some(a), Some(b)) = (x.as_number(), y.as_number()) {
            return Ok(Value::number(match op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
                ArithOp::Mul => a * b,
                _ => a / b,
            }));
        }
        if op == ArithOp::Add
            && let (Some(a), Some(b)) = (self.heap.value_string(x), self.heap.value_string(y))
        {
            let joined = a.concat(b);
            return Ok(Value::Object(self.heap.alloc_string(joined)));
        }
        let symbol = match op {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            _ => "/",
        };
        Err(self.fatal(format!("unsupported operand types for {symbol} operator.")))
    }

    fn compare(&mut self, symbol: &str, cmp: impl Fn(f64, f64) -> bool) -> VmResult<()> {
        let (Some(x), Some(y)) = (self.peek(1).as_number(), self.peek(0).as_number()) else {
            return Err(self.fatal(format!("unsupported operand types for {symbol} operator.")));
        };
        self.stack.pop();
        self.stack.pop();
        self.push_owned(Value::Bool(cmp(x, y)));
        Ok(())
    }

    fn size_of(&self, value: Value) -> VmResult<usize> {
        let Some(r) = value.as_object() else {
            return Err(self.fatal("can't get the sizeof of a scalar type."));
        };
        if let Some(array) = self.heap.array(r) {
            return Ok(array.len());
        }
        if let Some(string) = self.heap.string(r) {
            return Ok(string.len());
        }
        if self.heap.is_plain_table(r) {
            return Ok(self.heap.table_len(r).unwrap_or(0));
        }
        Err(self.fatal("invalid operand type for sizeof operator."))
    }

    /// Checked array position
    fn array_slot(&self, array: ObjRef, index: Value) -> VmResult<usize> {
        let Some(i) = index.as_int() else {
            return Err(self.fatal("expected an integer as array index."));
        };
        let len = self.heap.array_len(array).unwrap_or(0);
        match usize::try_from(i) {
            Ok(i) if i < len => Ok(i),
            _ => Err(self.fatal("array index out of range.")),
        }
    }

    /// `source[index]`, borrowed
    fn index_get(&self, source: Value, index: Value) -> VmResult<Value> {
        let Some(r) = source.as_object() else {
            return Err(self.fatal("unsupported operand for indexing."));
        };
        if self.heap.array(r).is_some() {
            let i = self.array_slot(r, index)?;
            return Ok(self.heap.array_get(r, i).unwrap_or_default());
        }
        if self.heap.is_plain_table(r) {
            return Ok(self.heap.table_get(r, index).unwrap_or_default());
        }
        Err(self.fatal("unsupported operand for indexing (expected array or table)."))
    }

    /// `target[index] = value` (value borrowed)
    fn index_set(&mut self, target: Value, index: Value, value: Value) -> VmResult<()> {
        let Some(r) = target.as_object() else {
            return Err(self.fatal("invalid target for index assignment (expected table or array)."));
        };
        if self.heap.is_plain_table(r) {
            self.heap.table_set(r, index, value);
            return Ok(());
        }
        if self.heap.array(r).is_some() {
            let i = self.array_slot(r, index)?;
            self.heap.array_set(r, i, value);
            return Ok(());
        }
        Err(self.fatal("unsupported target for index assignment (expected array or table)."))
    }

    /// `table[key] op= top`, consuming the operand and the target
    fn update_entry(&mut self, table: ObjRef, key: Value, op: ArithOp) -> VmResult<()> {
        let current = self.heap.table_get(table, key).unwrap_or_default();
        let result = self.arith(op, current, self.peek(0))?;
        self.heap.table_set(table, key, result);
        self.heap.dec_ref(result);
        self.drop_top();
        self.drop_top();
        Ok(())
    }

    fn enter_class(&mut self, frame: &mut Frame, name: ConstantIndex) -> VmResult<()> {
        let key = self.constant(frame, name)?;
        let parent = match self.peek(0) {
            Value::Null => None,
            Value::Object(r) => match self.heap.class(r) {
                Some(class) if class.has_fields() => Some((r, class.methods)),
                Some(_) => return Err(self.fatal("can't extend a native class.")),
                None => return Err(self.fatal("can't inherit from non-class object.")),
            },
            _ => return Err(self.fatal("can't inherit from non-class object.")),
        };
        let class_name = self.display(key);

        let (parent, methods) = match parent {
            Some((parent, methods)) => (parent, self.heap.copy_table(methods)),
            None => (self.heap.builtins().object, self.heap.alloc_table()),
        };
        self.heap.retain(parent);
        let class = self.heap.alloc(
            self.heap.builtins().class,
            Body::Class(Class {
                name: class_name.clone(),
                parent: Some(parent),
                kind: ClassKind::Fields,
                methods,
            }),
        );
        self.drop_top();
        if let Some((old, _)) = frame.class.replace((class, key)) {
            self.heap.release(old);
        }
        tracing::debug!(class = %class_name, "class created");
        Ok(())
    }

    fn define_function(
        &mut self,
        frame: &mut Frame,
        arity: u16,
        name: ConstantIndex,
        body_len: u32,
    ) -> VmResult<()> {
        let key = self.constant(frame, name)?;
        let entry = frame.pc;
        let end = entry + body_len as usize;
        if end > frame.code.len() {
            return Err(self.fatal("function body runs past the end of the code."));
        }
        let class = frame.class.map(|(class, _)| class);
        let (table, supermethod) = match class {
            Some(class) => {
                let methods = self.heap.class(class).map(|c| c.methods);
                let Some(methods) = methods else {
                    return Err(self.fatal("class being defined is gone."));
                };
                let sup = self
                    .heap
                    .table_get(methods, key)
                    .and_then(Value::as_object)
                    .filter(|&f| self.heap.function(f).is_some());
                (methods, sup)
            }
            None => match self.heap.module(frame.module) {
                Some(module) => (module.names, None),
                None => return Err(self.fatal("module being executed is gone.")),
            },
        };

        let function = self.heap.alloc_function(Function {
            name: self.display(key),
            arity,
            module: frame.module,
            class,
            supermethod,
            body: FunctionBody::Bytecode { entry },
        });
        self.heap.table_set(table, key, Value::Object(function));
        self.heap.release(function);
        frame.pc = end;
        Ok(())
    }
}
