//! Tarn virtual machine — executes compiled bytecode.
//!
//! The VM is a stack-based machine with:
//! - A fixed-capacity operand stack and call-frame stack
//! - Closure capture through shared mutable cells
//! - A per-run allocation budget charged on every value-creating opcode
//! - A cooperative abort flag checked once per instruction
//!
//! # Usage
//!
//! ```
//! use tarn_common::{make_instruction, BinOp, Bytecode, CompiledFunction, Opcode, Value};
//! use tarn_vm::VM;
//!
//! let mut main_fn = Vec::new();
//! main_fn.extend(make_instruction(Opcode::Constant, &[0]));
//! main_fn.extend(make_instruction(Opcode::Constant, &[1]));
//! main_fn.extend(make_instruction(Opcode::BinaryOp, &[BinOp::Add as usize]));
//! main_fn.extend(make_instruction(Opcode::Return, &[1]));
//!
//! let bytecode = Bytecode::new(
//!     vec![Value::Int(2), Value::Int(3)],
//!     CompiledFunction::new(main_fn, 0, 0, false),
//! );
//! let mut vm = VM::new(&bytecode, None, -1);
//! vm.run().unwrap();
//! assert_eq!(vm.stack_top(), Some(&Value::Int(5)));
//! ```

pub mod builtins;
pub mod error;
pub mod execute;
pub mod machine;

pub use error::VmError;
pub use machine::{AbortHandle, GLOBALS_SIZE, MAX_FRAMES, STACK_SIZE, VM};

pub use tarn_common::RuntimeError;
