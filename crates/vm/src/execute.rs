//! Dispatch loop and opcode handlers for the Tarn VM.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::Ordering;

use tracing::{debug, trace};

use tarn_common::{BinOp, Cell, CompiledFunction, Iter, Opcode, RuntimeError, Value};

use crate::error::VmError;
use crate::machine::{Frame, MAX_FRAMES, STACK_SIZE, VM};

impl<'a> VM<'a> {
    /// Drive the program to completion.
    ///
    /// Rewinds the operand stack, frames, instruction pointer, and
    /// allocation counter first, so `run` may be called repeatedly on the
    /// same machine. Returns normally when the program suspends, returns
    /// from its main frame, or is aborted; on failure the error carries one
    /// resolved source position per active frame, innermost first.
    pub fn run(&mut self) -> Result<(), VmError> {
        self.sp = 0;
        self.frames.truncate(1);
        self.frames[0].ip = -1;
        self.cur_insts = self.bytecode.main_function.instructions.clone();
        self.ip = -1;
        self.allocs = self.max_allocs.wrapping_add(1);

        debug!(
            constants = self.bytecode.constants.len(),
            max_allocs = self.max_allocs,
            "executing bytecode"
        );
        let result = self.run_loop();
        self.aborting.store(0, Ordering::Relaxed);

        match result {
            Ok(()) => {
                debug!("execution finished");
                Ok(())
            }
            Err(kind) => {
                let mut positions = Vec::with_capacity(self.frames.len());
                positions.push(
                    self.bytecode
                        .file_set
                        .position(self.cur_frame().function.source_pos(self.ip - 1)),
                );
                for frame in self.frames.iter().rev().skip(1) {
                    positions.push(
                        self.bytecode
                            .file_set
                            .position(frame.function.source_pos(frame.ip - 1)),
                    );
                }
                debug!(error = %kind, "execution failed");
                Err(VmError {
                    kind,
                    trace: positions,
                })
            }
        }
    }

    fn run_loop(&mut self) -> Result<(), RuntimeError> {
        while self.aborting.load(Ordering::Relaxed) == 0 {
            self.ip += 1;
            let at = self.ip as usize;
            if at >= self.cur_insts.len() {
                return Err(RuntimeError::UnexpectedEndOfInstructions);
            }
            let op = Opcode::try_from(self.cur_insts[at])?;
            if at + op.operand_bytes() >= self.cur_insts.len() && op.operand_bytes() > 0 {
                return Err(RuntimeError::UnexpectedEndOfInstructions);
            }

            match op {
                Opcode::Constant => {
                    let index = self.read_u16();
                    let value = self
                        .bytecode
                        .constants
                        .get(index)
                        .cloned()
                        .ok_or(RuntimeError::InvalidConstantIndex { index })?;
                    self.push(value);
                }
                Opcode::Null => self.push(Value::Undefined),
                Opcode::True => self.push(Value::Bool(true)),
                Opcode::False => self.push(Value::Bool(false)),
                Opcode::Pop => self.sp -= 1,

                Opcode::BinaryOp => {
                    let tag = self.read_u8() as u8;
                    let op = BinOp::from_u8(tag).ok_or(RuntimeError::UnknownOpcode(tag))?;
                    let right = self.stack[self.sp - 1].clone();
                    let left = self.stack[self.sp - 2].clone();
                    self.sp -= 2;
                    let result = left.binary_op(op, &right)?;
                    self.charge_alloc()?;
                    self.push(result);
                }
                Opcode::Equal => {
                    let right = self.stack[self.sp - 1].clone();
                    let left = self.stack[self.sp - 2].clone();
                    self.sp -= 2;
                    self.push(Value::Bool(left.equals(&right)));
                }
                Opcode::NotEqual => {
                    let right = self.stack[self.sp - 1].clone();
                    let left = self.stack[self.sp - 2].clone();
                    self.sp -= 2;
                    self.push(Value::Bool(!left.equals(&right)));
                }
                Opcode::LogicalNot => {
                    let falsy = self.stack[self.sp - 1].is_falsy();
                    self.sp -= 1;
                    self.push(Value::Bool(falsy));
                }
                Opcode::Complement => {
                    let operand = self.stack[self.sp - 1].clone();
                    self.sp -= 1;
                    match operand {
                        Value::Int(x) => {
                            self.charge_alloc()?;
                            self.push(Value::Int(!x));
                        }
                        other => {
                            return Err(RuntimeError::InvalidUnaryOperator {
                                op: "^",
                                operand: other.type_name(),
                            })
                        }
                    }
                }
                Opcode::Negate => {
                    let operand = self.stack[self.sp - 1].clone();
                    self.sp -= 1;
                    match operand {
                        Value::Int(x) => {
                            self.charge_alloc()?;
                            self.push(Value::Int(x.wrapping_neg()));
                        }
                        Value::Float(x) => {
                            self.charge_alloc()?;
                            self.push(Value::Float(-x));
                        }
                        other => {
                            return Err(RuntimeError::InvalidUnaryOperator {
                                op: "-",
                                operand: other.type_name(),
                            })
                        }
                    }
                }

                Opcode::JumpFalsy => {
                    let target = self.read_u16();
                    self.sp -= 1;
                    if self.stack[self.sp].is_falsy() {
                        self.ip = target as isize - 1;
                    }
                }
                Opcode::AndJump => {
                    let target = self.read_u16();
                    if self.stack[self.sp - 1].is_falsy() {
                        self.ip = target as isize - 1;
                    } else {
                        self.sp -= 1;
                    }
                }
                Opcode::OrJump => {
                    let target = self.read_u16();
                    if self.stack[self.sp - 1].is_falsy() {
                        self.sp -= 1;
                    } else {
                        self.ip = target as isize - 1;
                    }
                }
                Opcode::Jump => {
                    let target = self.read_u16();
                    self.ip = target as isize - 1;
                }

                Opcode::SetGlobal => {
                    let index = self.read_u16();
                    self.sp -= 1;
                    self.globals[index] = self.stack[self.sp].clone();
                }
                Opcode::GetGlobal => {
                    let index = self.read_u16();
                    let value = self.globals[index].clone();
                    self.push(value);
                }
                Opcode::SetSelGlobal => {
                    let index = self.read_u16();
                    let num_selectors = self.read_u8();
                    let (value, selectors) = self.pop_selectors(num_selectors);
                    let dst = self.globals[index].clone();
                    index_assign(&dst, &value, &selectors)?;
                }

                Opcode::Array => {
                    let len = self.read_u16();
                    let elements = self.stack[self.sp - len..self.sp].to_vec();
                    self.sp -= len;
                    self.charge_alloc()?;
                    self.push(Value::array(elements));
                }
                Opcode::Map => {
                    let len = self.read_u16();
                    let mut entries = HashMap::with_capacity(len / 2);
                    let mut slot = self.sp - len;
                    while slot < self.sp {
                        let key = match &self.stack[slot] {
                            Value::String(key) => key.to_string(),
                            other => {
                                return Err(RuntimeError::InvalidIndexType {
                                    type_name: other.type_name(),
                                })
                            }
                        };
                        entries.insert(key, self.stack[slot + 1].clone());
                        slot += 2;
                    }
                    self.sp -= len;
                    self.charge_alloc()?;
                    self.push(Value::map(entries));
                }
                Opcode::Error => {
                    let payload = self.stack[self.sp - 1].clone();
                    self.charge_alloc()?;
                    self.stack[self.sp - 1] = Value::error(payload);
                }
                Opcode::Immutable => match self.stack[self.sp - 1].clone() {
                    Value::Array(items) => {
                        self.charge_alloc()?;
                        self.stack[self.sp - 1] = Value::ImmutableArray(items);
                    }
                    Value::Map(entries) => {
                        self.charge_alloc()?;
                        self.stack[self.sp - 1] = Value::ImmutableMap(entries);
                    }
                    _ => {}
                },

                Opcode::Index => {
                    let index = self.stack[self.sp - 1].clone();
                    let left = self.stack[self.sp - 2].clone();
                    self.sp -= 2;
                    let value = left.index_get(&index)?;
                    self.push(value);
                }
                Opcode::SliceIndex => self.exec_slice_index()?,

                Opcode::Call => self.exec_call()?,
                Opcode::Return => {
                    let has_value = self.read_u8() == 1;
                    let ret = if has_value {
                        self.stack[self.sp - 1].clone()
                    } else {
                        Value::Undefined
                    };
                    match self.frames.pop() {
                        Some(finished) if self.frames.is_empty() => {
                            // The main frame returned: the program is done
                            // and `ret` is its result.
                            self.frames.push(finished);
                            self.stack[0] = ret;
                            self.sp = 1;
                            return Ok(());
                        }
                        Some(finished) => {
                            let caller = &self.frames[self.frames.len() - 1];
                            self.cur_insts = caller.function.instructions.clone();
                            self.ip = caller.ip;
                            // Drops the callee's locals; the slot below the
                            // base pointer held the callee itself and now
                            // receives the return value.
                            self.sp = finished.base_pointer;
                            self.stack[self.sp - 1] = ret;
                            trace!("frame popped");
                        }
                        None => return Err(RuntimeError::UnexpectedEndOfInstructions),
                    }
                }

                Opcode::DefineLocal => {
                    let index = self.read_u8();
                    let slot = self.cur_frame().base_pointer + index;
                    self.sp -= 1;
                    self.stack[slot] = self.stack[self.sp].clone();
                }
                Opcode::SetLocal => {
                    let index = self.read_u8();
                    let slot = self.cur_frame().base_pointer + index;
                    self.sp -= 1;
                    let value = self.stack[self.sp].clone();
                    match &self.stack[slot] {
                        // The cell stays in the slot; only its pointee
                        // changes, so captures observe the write.
                        Value::Cell(cell) => *cell.borrow_mut() = value,
                        _ => self.stack[slot] = value,
                    }
                }
                Opcode::GetLocal => {
                    let index = self.read_u8();
                    let slot = self.cur_frame().base_pointer + index;
                    let value = match &self.stack[slot] {
                        Value::Cell(cell) => cell.borrow().clone(),
                        other => other.clone(),
                    };
                    self.push(value);
                }
                Opcode::SetSelLocal => {
                    let index = self.read_u8();
                    let num_selectors = self.read_u8();
                    let slot = self.cur_frame().base_pointer + index;
                    let (value, selectors) = self.pop_selectors(num_selectors);
                    let dst = match self.stack[slot].clone() {
                        Value::Cell(cell) => cell.borrow().clone(),
                        other => other,
                    };
                    index_assign(&dst, &value, &selectors)?;
                }

                Opcode::GetBuiltin => {
                    let index = self.read_u8();
                    let table = self.builtins;
                    let builtin = table
                        .get(index)
                        .ok_or(RuntimeError::UnknownBuiltin { index })?;
                    self.push(Value::Builtin(builtin));
                }

                Opcode::Closure => self.exec_closure()?,
                Opcode::GetFreePtr => {
                    let index = self.read_u8();
                    let cell = self.cur_frame().function.free[index].clone();
                    self.push(Value::Cell(cell));
                }
                Opcode::GetFree => {
                    let index = self.read_u8();
                    let value = self.cur_frame().function.free[index].borrow().clone();
                    self.push(value);
                }
                Opcode::SetFree => {
                    let index = self.read_u8();
                    self.sp -= 1;
                    let value = self.stack[self.sp].clone();
                    *self.cur_frame().function.free[index].borrow_mut() = value;
                }
                Opcode::SetSelFree => {
                    let index = self.read_u8();
                    let num_selectors = self.read_u8();
                    let (value, selectors) = self.pop_selectors(num_selectors);
                    let dst = self.cur_frame().function.free[index].borrow().clone();
                    index_assign(&dst, &value, &selectors)?;
                }
                Opcode::GetLocalPtr => {
                    let index = self.read_u8();
                    let slot = self.cur_frame().base_pointer + index;
                    let cell = match self.stack[slot].clone() {
                        Value::Cell(cell) => cell,
                        other => {
                            let cell: Cell = Rc::new(RefCell::new(other));
                            self.stack[slot] = Value::Cell(cell.clone());
                            cell
                        }
                    };
                    self.push(Value::Cell(cell));
                }

                Opcode::IteratorInit => {
                    let dst = self.stack[self.sp - 1].clone();
                    self.sp -= 1;
                    let iter = dst.iterate().ok_or(RuntimeError::NotIterable {
                        type_name: dst.type_name(),
                    })?;
                    self.charge_alloc()?;
                    self.push(Value::Iterator(Rc::new(RefCell::new(iter))));
                }
                Opcode::IteratorNext => {
                    let iterator = self.take_iterator()?;
                    let has_more = iterator.borrow_mut().next();
                    self.push(Value::Bool(has_more));
                }
                Opcode::IteratorKey => {
                    let iterator = self.take_iterator()?;
                    let key = iterator.borrow().key();
                    self.push(key);
                }
                Opcode::IteratorValue => {
                    let iterator = self.take_iterator()?;
                    let value = iterator.borrow().value();
                    self.push(value);
                }

                Opcode::Suspend => return Ok(()),
            }
        }
        trace!("abort observed, exiting");
        Ok(())
    }

    /// Pop the iterator operand consumed by the iterator opcodes.
    fn take_iterator(&mut self) -> Result<Rc<RefCell<Iter>>, RuntimeError> {
        let top = self.stack[self.sp - 1].clone();
        self.sp -= 1;
        match top {
            Value::Iterator(iterator) => Ok(iterator),
            other => Err(RuntimeError::NotIterable {
                type_name: other.type_name(),
            }),
        }
    }

    /// Pop `num` selectors plus the assigned value beneath them.
    fn pop_selectors(&mut self, num: usize) -> (Value, Vec<Value>) {
        let selectors = self.stack[self.sp - num..self.sp].to_vec();
        let value = self.stack[self.sp - num - 1].clone();
        self.sp -= num + 1;
        (value, selectors)
    }

    fn exec_call(&mut self) -> Result<(), RuntimeError> {
        let mut num_args = self.cur_insts[(self.ip + 1) as usize] as usize;
        let spread = self.cur_insts[(self.ip + 2) as usize];
        self.ip += 2;

        let callee = self.stack[self.sp - 1 - num_args].clone();
        if !callee.can_call() {
            return Err(RuntimeError::NotCallable {
                type_name: callee.type_name(),
            });
        }

        if spread == 1 {
            self.sp -= 1;
            let last = self.stack[self.sp].clone();
            let items = match &last {
                Value::Array(items) | Value::ImmutableArray(items) => items.borrow().clone(),
                other => {
                    return Err(RuntimeError::InvalidArgumentType {
                        name: "last",
                        expected: "array",
                        found: other.type_name(),
                    })
                }
            };
            for item in &items {
                self.push(item.clone());
            }
            num_args = num_args + items.len() - 1;
        }

        match callee {
            Value::Function(callee_fn) => {
                if callee_fn.var_args {
                    // Gather surplus arguments into an array at the last
                    // parameter slot. Too few arguments fall through to the
                    // arity check below.
                    let real_args = callee_fn.num_parameters - 1;
                    if num_args >= real_args {
                        let var_args = num_args - real_args;
                        num_args = real_args + 1;
                        let sp_start = self.sp - var_args;
                        let gathered = self.stack[sp_start..self.sp].to_vec();
                        self.stack[sp_start] = Value::array(gathered);
                        self.sp = sp_start + 1;
                    }
                }
                if num_args != callee_fn.num_parameters {
                    let want = if callee_fn.var_args {
                        callee_fn.num_parameters - 1
                    } else {
                        callee_fn.num_parameters
                    };
                    return Err(RuntimeError::WrongNumArguments {
                        want,
                        got: num_args,
                    });
                }

                // Self-tail-call elision: when a function calls itself and
                // the next instruction returns (optionally through one
                // pop), reuse the current frame instead of pushing a new
                // one.
                if Rc::ptr_eq(&callee_fn, &self.cur_frame().function) {
                    let next_op = self.cur_insts.get((self.ip + 1) as usize).copied();
                    let after_next = self.cur_insts.get((self.ip + 2) as usize).copied();
                    let in_tail_position = next_op == Some(Opcode::Return as u8)
                        || (next_op == Some(Opcode::Pop as u8)
                            && after_next == Some(Opcode::Return as u8));
                    if in_tail_position {
                        let base_pointer = self.cur_frame().base_pointer;
                        for p in 0..num_args {
                            self.stack[base_pointer + p] =
                                self.stack[self.sp - num_args + p].clone();
                        }
                        self.sp -= num_args + 1;
                        self.ip = -1;
                        trace!("self tail call elided");
                        return Ok(());
                    }
                }

                if self.frames.len() >= MAX_FRAMES {
                    return Err(RuntimeError::StackOverflow);
                }
                let base_pointer = self.sp - num_args;
                if base_pointer + callee_fn.num_locals > STACK_SIZE {
                    return Err(RuntimeError::StackOverflow);
                }
                let depth = self.frames.len();
                self.frames[depth - 1].ip = self.ip;
                self.cur_insts = callee_fn.instructions.clone();
                self.ip = -1;
                self.sp = base_pointer + callee_fn.num_locals;
                trace!(
                    params = callee_fn.num_parameters,
                    locals = callee_fn.num_locals,
                    "frame pushed"
                );
                self.frames.push(Frame {
                    function: callee_fn,
                    ip: -1,
                    base_pointer,
                });
            }
            Value::Builtin(builtin) => {
                let args = self.stack[self.sp - num_args..self.sp].to_vec();
                let result = (builtin.func)(&args);
                self.sp -= num_args + 1;
                let ret = result?;
                self.charge_alloc()?;
                self.push(ret);
            }
            other => {
                return Err(RuntimeError::NotCallable {
                    type_name: other.type_name(),
                })
            }
        }
        Ok(())
    }

    fn exec_closure(&mut self) -> Result<(), RuntimeError> {
        let index = self.read_u16();
        let num_free = self.read_u8();
        let constant = self
            .bytecode
            .constants
            .get(index)
            .cloned()
            .ok_or(RuntimeError::InvalidConstantIndex { index })?;
        let function = match constant {
            Value::Function(function) => function,
            other => {
                return Err(RuntimeError::NotAFunction {
                    type_name: other.type_name(),
                })
            }
        };

        let mut free = Vec::with_capacity(num_free);
        for i in 0..num_free {
            match self.stack[self.sp - num_free + i].clone() {
                Value::Cell(cell) => free.push(cell),
                other => free.push(Rc::new(RefCell::new(other))),
            }
        }
        self.sp -= num_free;

        let closure = CompiledFunction {
            instructions: function.instructions.clone(),
            num_locals: function.num_locals,
            num_parameters: function.num_parameters,
            var_args: function.var_args,
            source_map: function.source_map.clone(),
            free,
        };
        self.charge_alloc()?;
        self.push(Value::Function(Rc::new(closure)));
        Ok(())
    }

    fn exec_slice_index(&mut self) -> Result<(), RuntimeError> {
        let high = self.stack[self.sp - 1].clone();
        let low = self.stack[self.sp - 2].clone();
        let left = self.stack[self.sp - 3].clone();
        self.sp -= 3;

        let value = match &left {
            Value::Array(items) | Value::ImmutableArray(items) => {
                let items = items.borrow();
                let (lo, hi) = slice_bounds(&low, &high, items.len())?;
                // Slicing a frozen array yields a mutable array.
                Value::array(items[lo..hi].to_vec())
            }
            Value::String(s) => {
                let (lo, hi) = slice_bounds(&low, &high, s.len())?;
                // Byte slicing; a cut through a multi-byte character is
                // repaired with replacement characters.
                Value::string(String::from_utf8_lossy(&s.as_bytes()[lo..hi]).into_owned())
            }
            Value::Bytes(data) => {
                let data = data.borrow();
                let (lo, hi) = slice_bounds(&low, &high, data.len())?;
                Value::bytes(data[lo..hi].to_vec())
            }
            other => {
                return Err(RuntimeError::NotIndexable {
                    type_name: other.type_name(),
                })
            }
        };
        self.charge_alloc()?;
        self.push(value);
        Ok(())
    }
}

/// Resolve slice endpoints: undefined endpoints default to the full range,
/// `low > high` is rejected before clamping, then both are clamped to
/// `[0, len]`.
fn slice_bounds(low: &Value, high: &Value, len: usize) -> Result<(usize, usize), RuntimeError> {
    let len = len as i64;
    let low_idx = match low {
        Value::Undefined => 0,
        Value::Int(n) => *n,
        other => {
            return Err(RuntimeError::InvalidSliceIndexType {
                type_name: other.type_name(),
            })
        }
    };
    let high_idx = match high {
        Value::Undefined => len,
        Value::Int(n) => *n,
        other => {
            return Err(RuntimeError::InvalidSliceIndexType {
                type_name: other.type_name(),
            })
        }
    };
    if low_idx > high_idx {
        return Err(RuntimeError::InvalidSliceRange {
            low: low_idx,
            high: high_idx,
        });
    }
    Ok((low_idx.clamp(0, len) as usize, high_idx.clamp(0, len) as usize))
}

/// Indexed assignment through a selector chain: fetch through all but the
/// innermost selector, then assign at the innermost.
fn index_assign(dst: &Value, src: &Value, selectors: &[Value]) -> Result<(), RuntimeError> {
    let mut dst = dst.clone();
    for selector in selectors.iter().skip(1).rev() {
        dst = dst.index_get(selector)?;
    }
    dst.index_set(&selectors[0], src.clone())
}
