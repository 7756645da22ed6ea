//! Compiled program representation consumed by the VM.
//!
//! The compiler produces a [`Bytecode`]: a constant pool, a main function,
//! and the file set its source positions resolve through. The VM treats all
//! of it as read-only data.

use std::collections::HashMap;
use std::rc::Rc;

use crate::source::{Pos, SourceFileSet, NO_POS};
use crate::value::{Cell, Value};

/// A compiled function: flat instruction bytes plus the frame layout the
/// call protocol needs.
///
/// Closures share `instructions` and `source_map` with the constant they
/// were instantiated from; only `free` differs per instance.
#[derive(Debug, Clone)]
pub struct CompiledFunction {
    /// Flat instruction byte stream.
    pub instructions: Rc<[u8]>,
    /// Total local slots, parameters included.
    pub num_locals: usize,
    /// Declared parameter count. For variadic functions the last parameter
    /// receives the gathered surplus arguments as an array.
    pub num_parameters: usize,
    /// Whether surplus arguments are gathered into the last parameter.
    pub var_args: bool,
    /// Instruction offset to source position, sparse.
    pub source_map: Rc<HashMap<usize, Pos>>,
    /// Captured upvalue cells. Empty for non-closures.
    pub free: Vec<Cell>,
}

impl CompiledFunction {
    /// Create a function with no source map and no captures.
    pub fn new(
        instructions: Vec<u8>,
        num_locals: usize,
        num_parameters: usize,
        var_args: bool,
    ) -> Self {
        Self {
            instructions: Rc::from(instructions),
            num_locals,
            num_parameters,
            var_args,
            source_map: Rc::new(HashMap::new()),
            free: Vec::new(),
        }
    }

    /// Attach a source map.
    pub fn with_source_map(mut self, source_map: HashMap<usize, Pos>) -> Self {
        self.source_map = Rc::new(source_map);
        self
    }

    /// Source position of the instruction at `ip`, scanning backwards to
    /// the nearest mapped offset. Negative or unmapped offsets resolve to
    /// [`NO_POS`].
    pub fn source_pos(&self, ip: isize) -> Pos {
        let mut ip = ip;
        while ip >= 0 {
            if let Some(&pos) = self.source_map.get(&(ip as usize)) {
                return pos;
            }
            ip -= 1;
        }
        NO_POS
    }
}

/// A compiled program, ready to execute.
#[derive(Debug, Clone)]
pub struct Bytecode {
    /// Constant pool. Indexed by 16-bit immediates, so at most 65,536
    /// entries are addressable.
    pub constants: Vec<Value>,
    /// Entry point. Takes no parameters and is not variadic.
    pub main_function: Rc<CompiledFunction>,
    /// Source files referenced by the functions' source maps.
    pub file_set: SourceFileSet,
}

impl Bytecode {
    pub fn new(constants: Vec<Value>, main_function: CompiledFunction) -> Self {
        Self {
            constants,
            main_function: Rc::new(main_function),
            file_set: SourceFileSet::new(),
        }
    }

    /// Attach the file set the source maps refer to.
    pub fn with_file_set(mut self, file_set: SourceFileSet) -> Self {
        self.file_set = file_set;
        self
    }
}
