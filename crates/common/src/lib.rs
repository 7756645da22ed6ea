//! Tarn common types: the shared data model of the Tarn bytecode VM.
//!
//! This crate provides everything the compiler and the VM agree on:
//!
//! - [`Opcode`] — the instruction set, operand widths, and encoding
//! - [`BinOp`] — operator tokens carried by the `BinaryOp` opcode
//! - [`Value`] — the runtime value model with its per-variant operations
//! - [`Iter`] — the iterator protocol over sequences and maps
//! - [`CompiledFunction`] / [`Bytecode`] — the compiled program container
//! - [`SourceFileSet`] — source-position resolution for stack traces
//! - [`RuntimeError`] — the runtime error taxonomy
//!
//! # Dependencies
//!
//! This crate uses `thiserror` (compile-time proc-macro, zero runtime cost)
//! and has no other dependencies.

pub mod binop;
pub mod bytecode;
pub mod error;
pub mod iterator;
pub mod opcode;
pub mod source;
pub mod value;

// Re-export commonly used types at the crate root.
pub use binop::BinOp;
pub use bytecode::{Bytecode, CompiledFunction};
pub use error::RuntimeError;
pub use iterator::Iter;
pub use opcode::{make_instruction, Opcode};
pub use source::{FilePos, Pos, SourceFile, SourceFileSet, NO_POS};
pub use value::{BuiltinFn, BuiltinFunction, Cell, Value};
