//! VM state management: operand stack, call frames, globals, and limits.

use std::rc::Rc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use tarn_common::{BuiltinFunction, Bytecode, CompiledFunction, RuntimeError, Value};

/// Operand stack capacity, in value slots.
pub const STACK_SIZE: usize = 2048;

/// Maximum number of simultaneously active call frames.
pub const MAX_FRAMES: usize = 1024;

/// Size of the globals array when the host does not supply one.
pub const GLOBALS_SIZE: usize = 1024;

/// Execution record for one in-progress function call.
#[derive(Debug)]
pub(crate) struct Frame {
    /// The function executing in this frame.
    pub(crate) function: Rc<CompiledFunction>,
    /// Byte offset of the last instruction byte consumed. Stale for the
    /// innermost frame while the loop runs; synchronized on every call.
    pub(crate) ip: isize,
    /// Stack index where this frame's local 0 lives.
    pub(crate) base_pointer: usize,
}

/// Thread-safe handle for stopping a running VM.
///
/// Obtained from [`VM::abort_handle`] before handing the machine to its
/// execution thread. The dispatch loop polls the flag once per instruction
/// and exits cleanly, without an error, when it is set.
#[derive(Debug, Clone)]
pub struct AbortHandle(Arc<AtomicI64>);

impl AbortHandle {
    /// Request that the current `run` exit at the next instruction boundary.
    pub fn abort(&self) {
        self.0.store(1, Ordering::Relaxed);
    }
}

/// The Tarn virtual machine.
///
/// Owns the operand stack, frame stack, and globals; borrows the compiled
/// program. One instance executes on one thread at a time; the only
/// cross-thread interaction is the abort flag.
pub struct VM<'a> {
    pub(crate) bytecode: &'a Bytecode,
    pub(crate) stack: Vec<Value>,
    /// Index of the next free stack slot. Values at or above are garbage.
    pub(crate) sp: usize,
    pub(crate) globals: Vec<Value>,
    /// Active frames, innermost last. Frame 0 runs the main function.
    pub(crate) frames: Vec<Frame>,
    /// Instructions of the innermost frame, cached for dispatch.
    pub(crate) cur_insts: Rc<[u8]>,
    /// Byte offset of the last instruction byte consumed; -1 before the
    /// first fetch.
    pub(crate) ip: isize,
    pub(crate) aborting: Arc<AtomicI64>,
    pub(crate) max_allocs: i64,
    /// Remaining allocation budget plus one; a post-decrement value of
    /// zero signals exhaustion.
    pub(crate) allocs: i64,
    pub(crate) builtins: &'static [BuiltinFunction],
}

impl<'a> VM<'a> {
    /// Create a VM for the given program.
    ///
    /// `globals` lets the host pre-seed bindings; pass `None` for a fresh
    /// array of [`GLOBALS_SIZE`] undefined slots. A negative `max_allocs`
    /// leaves the allocation budget unbounded.
    pub fn new(bytecode: &'a Bytecode, globals: Option<Vec<Value>>, max_allocs: i64) -> Self {
        let globals = globals.unwrap_or_else(|| vec![Value::Undefined; GLOBALS_SIZE]);
        let mut frames = Vec::with_capacity(MAX_FRAMES);
        frames.push(Frame {
            function: bytecode.main_function.clone(),
            ip: -1,
            base_pointer: 0,
        });
        Self {
            bytecode,
            stack: vec![Value::Undefined; STACK_SIZE],
            sp: 0,
            globals,
            frames,
            cur_insts: bytecode.main_function.instructions.clone(),
            ip: -1,
            aborting: Arc::new(AtomicI64::new(0)),
            max_allocs,
            allocs: 0,
            builtins: crate::builtins::BUILTINS,
        }
    }

    /// Replace the default builtin table.
    pub fn with_builtins(mut self, builtins: &'static [BuiltinFunction]) -> Self {
        self.builtins = builtins;
        self
    }

    /// Handle for aborting this machine from another thread.
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle(self.aborting.clone())
    }

    /// True when no values remain on the operand stack.
    pub fn is_stack_empty(&self) -> bool {
        self.sp == 0
    }

    /// The value on top of the operand stack, if any. After a run that
    /// ended with a main-frame return, this is the program result.
    pub fn stack_top(&self) -> Option<&Value> {
        if self.sp == 0 {
            None
        } else {
            Some(&self.stack[self.sp - 1])
        }
    }

    /// The globals array, as left by the last run.
    pub fn globals(&self) -> &[Value] {
        &self.globals
    }

    pub(crate) fn cur_frame(&self) -> &Frame {
        &self.frames[self.frames.len() - 1]
    }

    /// Push a value. Per-push overflow is not checked; the compiler bounds
    /// stack use and frame installation re-checks capacity.
    pub(crate) fn push(&mut self, value: Value) {
        debug_assert!(self.sp < STACK_SIZE, "operand stack overflow");
        self.stack[self.sp] = value;
        self.sp += 1;
    }

    /// Read a u8 immediate, advancing `ip` onto it.
    pub(crate) fn read_u8(&mut self) -> usize {
        self.ip += 1;
        self.cur_insts[self.ip as usize] as usize
    }

    /// Read a big-endian u16 immediate, advancing `ip` to its last byte.
    pub(crate) fn read_u16(&mut self) -> usize {
        self.ip += 2;
        let at = self.ip as usize;
        (self.cur_insts[at - 1] as usize) << 8 | self.cur_insts[at] as usize
    }

    /// Charge one allocation against the budget.
    pub(crate) fn charge_alloc(&mut self) -> Result<(), RuntimeError> {
        self.allocs -= 1;
        if self.allocs == 0 {
            return Err(RuntimeError::ObjectAllocLimit);
        }
        Ok(())
    }
}
