//! Source-position service for runtime stack traces.
//!
//! The compiler registers each source file with a base offset and a line
//! table; compiled functions carry sparse maps from instruction offsets to
//! positions in that space. At error time the VM resolves positions to
//! human-readable `file:line:column` strings through this module.

use std::fmt;

/// A source position: an offset into the file set's combined address space.
pub type Pos = usize;

/// The invalid position. Resolves to an unknown [`FilePos`].
pub const NO_POS: Pos = 0;

/// A registered source file.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// File name as shown in traces.
    pub name: String,
    /// Position of the file's first byte in the combined address space.
    pub base: Pos,
    /// File size in bytes.
    pub size: usize,
    /// Byte offsets of line starts. Always begins with 0.
    lines: Vec<usize>,
}

impl SourceFile {
    /// Record a line starting at `offset`. Offsets must be added in
    /// increasing order.
    pub fn add_line(&mut self, offset: usize) {
        self.lines.push(offset);
    }

    fn position(&self, pos: Pos) -> FilePos {
        let offset = pos - self.base;
        let line = self.lines.partition_point(|&start| start <= offset);
        FilePos {
            name: self.name.clone(),
            line,
            column: offset - self.lines[line - 1] + 1,
        }
    }
}

/// The set of source files a compiled program was built from.
#[derive(Debug, Clone)]
pub struct SourceFileSet {
    base: Pos,
    files: Vec<SourceFile>,
}

impl SourceFileSet {
    pub fn new() -> Self {
        // Base 1 keeps position 0 free as NO_POS.
        Self {
            base: 1,
            files: Vec::new(),
        }
    }

    /// Register a file of `size` bytes and return its index.
    pub fn add_file(&mut self, name: &str, size: usize) -> usize {
        let file = SourceFile {
            name: name.to_string(),
            base: self.base,
            size,
            lines: vec![0],
        };
        self.base += size + 1;
        self.files.push(file);
        self.files.len() - 1
    }

    /// Mutable access to a registered file, for building its line table.
    pub fn file_mut(&mut self, index: usize) -> Option<&mut SourceFile> {
        self.files.get_mut(index)
    }

    /// Resolve a position to a file, line, and column. Unknown positions
    /// resolve to an invalid [`FilePos`] that displays as `-`.
    pub fn position(&self, pos: Pos) -> FilePos {
        if pos != NO_POS {
            for file in &self.files {
                if pos >= file.base && pos <= file.base + file.size {
                    return file.position(pos);
                }
            }
        }
        FilePos::unknown()
    }
}

impl Default for SourceFileSet {
    fn default() -> Self {
        Self::new()
    }
}

/// A resolved source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePos {
    pub name: String,
    /// 1-based line; 0 marks an unknown position.
    pub line: usize,
    /// 1-based column.
    pub column: usize,
}

impl FilePos {
    pub fn unknown() -> Self {
        Self {
            name: String::new(),
            line: 0,
            column: 0,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.line > 0
    }
}

impl fmt::Display for FilePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() {
            return f.write_str("-");
        }
        if self.name.is_empty() {
            write!(f, "{}:{}", self.line, self.column)
        } else {
            write!(f, "{}:{}:{}", self.name, self.line, self.column)
        }
    }
}
