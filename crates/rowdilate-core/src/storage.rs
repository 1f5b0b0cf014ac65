//! Row-level raster storage interface.
//!
//! The filter only ever talks to storage through these two traits, one row
//! at a time, in increasing row order.

use crate::error::Result;
use crate::grid::GridMeta;

/// A readable grid: dimensions, georeferencing and row reads.
pub trait RowSource {
    fn meta(&self) -> &GridMeta;

    /// Fill `buf` (exactly `meta().cols` long) with source row `row`.
    fn read_row(&mut self, row: usize, buf: &mut [f64]) -> Result<()>;
}

/// A writable grid accepting whole rows.
pub trait RowSink {
    fn write_row(&mut self, row: usize, buf: &[f64]) -> Result<()>;
}

impl<S: RowSource + ?Sized> RowSource for &mut S {
    fn meta(&self) -> &GridMeta {
        (**self).meta()
    }

    fn read_row(&mut self, row: usize, buf: &mut [f64]) -> Result<()> {
        (**self).read_row(row, buf)
    }
}

impl<W: RowSink + ?Sized> RowSink for &mut W {
    fn write_row(&mut self, row: usize, buf: &[f64]) -> Result<()> {
        (**self).write_row(row, buf)
    }
}
