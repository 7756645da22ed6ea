//! Traced runtime errors produced by [`VM::run`](crate::VM::run).

use tarn_common::{FilePos, RuntimeError};
use thiserror::Error;

/// A runtime failure annotated with the source position of every frame
/// that was active when execution stopped, innermost first.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("runtime error: {kind}{}", render_trace(.trace))]
pub struct VmError {
    /// The underlying failure.
    pub kind: RuntimeError,
    /// One resolved position per active frame, innermost first.
    pub trace: Vec<FilePos>,
}

fn render_trace(trace: &[FilePos]) -> String {
    let mut out = String::new();
    for pos in trace {
        out.push_str("\n\tat ");
        out.push_str(&pos.to_string());
    }
    out
}
