//! Runtime errors for the Tarn VM.
//!
//! Every failure an executing program can produce is a variant here, so the
//! dispatch loop, the value operations, and native callables all speak the
//! same error language. Source positions are attached later, when the VM
//! assembles the stack trace.

use thiserror::Error;

/// Errors that occur during program execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// Binary operator applied to an unsupported operand combination.
    #[error("invalid operation: {lhs} {op} {rhs}")]
    InvalidOperator {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },

    /// Unary operator applied to an unsupported operand.
    #[error("invalid operation: {op}{operand}")]
    InvalidUnaryOperator {
        op: &'static str,
        operand: &'static str,
    },

    /// A callable received an argument of the wrong type.
    #[error("invalid type for argument '{name}': expected {expected}, found {found}")]
    InvalidArgumentType {
        name: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    /// Call arity mismatch. For variadic callees `want` is the minimum
    /// number of arguments.
    #[error("wrong number of arguments: want={want}, got={got}")]
    WrongNumArguments { want: usize, got: usize },

    /// Index read on a value that does not support indexing.
    #[error("not indexable: {type_name}")]
    NotIndexable { type_name: &'static str },

    /// Index write on a value that does not support index assignment.
    #[error("not index-assignable: {type_name}")]
    NotIndexAssignable { type_name: &'static str },

    /// Index of a type the container cannot be indexed by.
    #[error("invalid index type: {type_name}")]
    InvalidIndexType { type_name: &'static str },

    /// Assigned value of a type the container cannot hold.
    #[error("invalid index value type: {type_name}")]
    InvalidIndexValueType { type_name: &'static str },

    /// Sequence index outside `[0, len)`. Negative indices are not wrapped.
    #[error("index {index} out of bounds (length {len})")]
    IndexOutOfBounds { index: i64, len: usize },

    /// Slice endpoint that is neither undefined nor an integer.
    #[error("invalid slice index type: {type_name}")]
    InvalidSliceIndexType { type_name: &'static str },

    /// Slice with `low > high`, before clamping.
    #[error("invalid slice range: {low} > {high}")]
    InvalidSliceRange { low: i64, high: i64 },

    /// Call on a value that is not callable.
    #[error("not callable: {type_name}")]
    NotCallable { type_name: &'static str },

    /// Iteration over a value that is not iterable.
    #[error("not iterable: {type_name}")]
    NotIterable { type_name: &'static str },

    /// Closure instantiation over a constant that is not a function.
    #[error("not a function: {type_name}")]
    NotAFunction { type_name: &'static str },

    /// Call-frame capacity exhausted.
    #[error("stack overflow")]
    StackOverflow,

    /// The per-run allocation budget was exhausted.
    #[error("object allocation limit exceeded")]
    ObjectAllocLimit,

    /// Opcode byte (or operator tag) outside the instruction set.
    #[error("unknown opcode: {0:#04x}")]
    UnknownOpcode(u8),

    /// Integer division or remainder by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// Constant-pool index outside the pool.
    #[error("invalid constant index: {index}")]
    InvalidConstantIndex { index: usize },

    /// Builtin-table index outside the table.
    #[error("unknown builtin: {index}")]
    UnknownBuiltin { index: usize },

    /// The instruction stream ended mid-instruction.
    #[error("unexpected end of instructions")]
    UnexpectedEndOfInstructions,
}
