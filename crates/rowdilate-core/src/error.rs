//! Error taxonomy for a dilation run.
//!
//! Every variant is fatal: a run never retries and never cleans up a
//! partially written destination.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Direction of a failed row transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOp {
    Read,
    Write,
}

impl fmt::Display for RowOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowOp::Read => f.write_str("read"),
            RowOp::Write => f.write_str("write"),
        }
    }
}

#[derive(Error, Debug)]
pub enum DilateError {
    #[error("cannot open source raster {}: {reason}", .path.display())]
    Open { path: PathBuf, reason: String },

    #[error("cannot create destination raster {}: {reason}", .path.display())]
    Create { path: PathBuf, reason: String },

    #[error("row {row} {op} failed: {reason}")]
    Io { op: RowOp, row: usize, reason: String },

    #[error("invalid grid dimensions: {rows}x{cols} (need at least 2 rows and 1 column)")]
    InvalidDimensions { rows: usize, cols: usize },

    #[error("row {row} has {actual} cells, expected {expected}")]
    RowLength { row: usize, expected: usize, actual: usize },

    #[error("unsupported raster layout: {0}")]
    Unsupported(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl DilateError {
    pub(crate) fn read(row: usize, reason: impl fmt::Display) -> Self {
        DilateError::Io { op: RowOp::Read, row, reason: reason.to_string() }
    }

    pub(crate) fn write(row: usize, reason: impl fmt::Display) -> Self {
        DilateError::Io { op: RowOp::Write, row, reason: reason.to_string() }
    }
}

pub type Result<T> = std::result::Result<T, DilateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_names_row_and_direction() {
        let err = DilateError::read(17, "short strip");
        assert_eq!(err.to_string(), "row 17 read failed: short strip");
        let err = DilateError::write(3, "disk full");
        assert_eq!(err.to_string(), "row 3 write failed: disk full");
    }

    #[test]
    fn open_error_shows_path() {
        let err = DilateError::Open { path: PathBuf::from("missing.tif"), reason: "not found".into() };
        assert!(err.to_string().contains("missing.tif"));
    }
}
