//! Row-streaming 3×3 dilation.
//!
//! Produces the same output as a full in-memory nodata-aware max filter
//! while holding only the three-row [`RowWindow`] and one output row.
//!
//! Output policy:
//! - first and last rows are entirely nodata;
//! - first and last columns are entirely nodata (never computed);
//! - an interior cell whose source centre is nodata stays nodata;
//! - every other cell is the maximum of its 3×3 source neighbourhood.
//!
//! Rows are committed to the sink strictly in order, one per source row
//! advanced, so a sink may append without seeking.

use log::{debug, trace};
use serde::Serialize;

use crate::config::resolve_nodata;
use crate::error::{DilateError, Result};
use crate::grid::{GridMeta, MemoryRaster};
use crate::kernel::{window_max, KERNEL_RADIUS, KERNEL_SIZE};
use crate::storage::{RowSink, RowSource};
use crate::window::RowWindow;

/// Exact nodata test. A NaN nodata value matches NaN cells.
#[inline]
pub fn is_nodata(value: f64, nodata: f64) -> bool {
    value == nodata || (nodata.is_nan() && value.is_nan())
}

/// Counters from one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DilationStats {
    pub rows_written: usize,
    /// Interior cells assigned a neighbourhood maximum.
    pub dilated_cells: usize,
    /// Interior cells forced to nodata because their centre was nodata.
    pub masked_cells: usize,
}

/// The streaming filter: window buffers, output buffer and nodata marker.
///
/// All buffers are allocated in [`StreamingDilation::new`] and never resized.
#[derive(Debug)]
pub struct StreamingDilation {
    rows: usize,
    cols: usize,
    nodata: f64,
    window: RowWindow,
    out: Vec<f64>,
}

impl StreamingDilation {
    pub fn new(rows: usize, cols: usize, nodata: f64) -> Result<Self> {
        if rows < KERNEL_SIZE - 1 || cols < 1 {
            return Err(DilateError::InvalidDimensions { rows, cols });
        }
        Ok(Self {
            rows,
            cols,
            nodata,
            window: RowWindow::new(cols),
            out: vec![nodata; cols],
        })
    }

    /// Filter sized for the grid described by `meta`.
    pub fn for_grid(meta: &GridMeta, nodata: f64) -> Result<Self> {
        Self::new(meta.rows, meta.cols, nodata)
    }

    /// Run one forward pass from `source` into `sink`.
    ///
    /// Any source or sink error aborts the pass immediately; rows already
    /// committed stay committed.
    pub fn run<S, W>(&mut self, source: &mut S, sink: &mut W) -> Result<DilationStats>
    where
        S: RowSource + ?Sized,
        W: RowSink + ?Sized,
    {
        let meta = source.meta();
        if meta.rows != self.rows || meta.cols != self.cols {
            return Err(DilateError::InvalidDimensions { rows: meta.rows, cols: meta.cols });
        }
        debug!(
            "streaming dilation over {} x {} cells, nodata = {}",
            self.rows, self.cols, self.nodata
        );

        let mut stats = DilationStats::default();

        source.read_row(0, self.window.top_mut())?;
        source.read_row(1, self.window.middle_mut())?;

        self.out.fill(self.nodata);
        self.commit(sink, 0, &mut stats)?;

        for r in KERNEL_SIZE - 1..self.rows {
            source.read_row(r, self.window.bottom_mut())?;

            self.out.fill(self.nodata);
            dilate_row(self.window.rows(), &mut self.out, self.nodata, &mut stats);

            self.commit(sink, r - 1, &mut stats)?;
            self.window.rotate();
        }

        self.out.fill(self.nodata);
        self.commit(sink, self.rows - 1, &mut stats)?;

        Ok(stats)
    }

    fn commit<W: RowSink + ?Sized>(
        &self,
        sink: &mut W,
        row: usize,
        stats: &mut DilationStats,
    ) -> Result<()> {
        sink.write_row(row, &self.out)?;
        stats.rows_written += 1;
        trace!("committed row {row}");
        Ok(())
    }
}

/// Reduce one window into `out`. Edge columns keep their base fill.
fn dilate_row(window: [&[f64]; KERNEL_SIZE], out: &mut [f64], nodata: f64, stats: &mut DilationStats) {
    let middle = window[KERNEL_RADIUS];
    let end = out.len().saturating_sub(KERNEL_RADIUS);
    for c in KERNEL_RADIUS..end {
        out[c] = window_max(window, c);
        if is_nodata(middle[c], nodata) {
            out[c] = nodata;
            stats.masked_cells += 1;
        } else {
            stats.dilated_cells += 1;
        }
    }
}

/// Stream `source` into `sink` using an explicit nodata marker.
pub fn dilate<S, W>(source: &mut S, sink: &mut W, nodata: f64) -> Result<DilationStats>
where
    S: RowSource + ?Sized,
    W: RowSink + ?Sized,
{
    let mut filter = StreamingDilation::for_grid(source.meta(), nodata)?;
    filter.run(source, sink)
}

/// Dilate an in-memory raster, substituting `default_nodata` when the raster
/// declares none. The result declares the nodata value actually used.
pub fn dilate_in_memory(raster: &MemoryRaster, default_nodata: f64) -> Result<(MemoryRaster, DilationStats)> {
    let nodata = resolve_nodata(raster.meta.nodata, default_nodata);
    let mut meta = raster.meta.clone();
    meta.nodata = Some(nodata.value);

    let mut out = MemoryRaster::blank(meta);
    let stats = dilate(&mut raster.reader(), &mut out, nodata.value)?;
    Ok((out, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Brute-force whole-grid dilation used as the oracle.
    fn reference(grid: &Grid, nodata: f64) -> Grid {
        let mut out = Grid::filled(grid.rows, grid.cols, nodata);
        for r in 1..grid.rows - 1 {
            for c in 1..grid.cols.saturating_sub(1) {
                if is_nodata(grid.get(r, c), nodata) {
                    continue;
                }
                let mut m = f64::NEG_INFINITY;
                for nr in r - 1..=r + 1 {
                    for nc in c - 1..=c + 1 {
                        m = m.max(grid.get(nr, nc));
                    }
                }
                out.set(r, c, m);
            }
        }
        out
    }

    fn run(grid: Grid, nodata: f64) -> (Grid, DilationStats) {
        let raster = MemoryRaster::new(grid, Some(nodata));
        let (out, stats) = dilate_in_memory(&raster, 0.0).unwrap();
        (out.grid, stats)
    }

    #[test]
    fn single_peak_spreads_to_neighbours() {
        let mut grid = Grid::filled(5, 5, 1.0);
        grid.set(2, 2, 5.0);
        let (out, stats) = run(grid, -1.0);

        for c in 0..5 {
            assert_eq!(out.get(0, c), -1.0);
            assert_eq!(out.get(4, c), -1.0);
        }
        for r in 0..5 {
            assert_eq!(out.get(r, 0), -1.0);
            assert_eq!(out.get(r, 4), -1.0);
        }
        for r in 1..=3 {
            for c in 1..=3 {
                assert_eq!(out.get(r, c), 5.0, "cell ({r}, {c})");
            }
        }
        assert_eq!(stats, DilationStats { rows_written: 5, dilated_cells: 9, masked_cells: 0 });
    }

    #[test]
    fn peak_does_not_reach_beyond_one_cell() {
        let mut grid = Grid::filled(7, 7, 1.0);
        grid.set(2, 2, 5.0);
        let (out, _) = run(grid, -1.0);
        assert_eq!(out.get(3, 3), 5.0);
        assert_eq!(out.get(4, 4), 1.0);
        assert_eq!(out.get(2, 4), 1.0);
        assert_eq!(out.get(5, 2), 1.0);
    }

    #[test]
    fn three_by_three_with_nodata_centre_is_all_nodata() {
        let mut grid = Grid::filled(3, 3, 8.0);
        grid.set(1, 1, -9999.0);
        let (out, stats) = run(grid, -9999.0);
        assert!(out.data.iter().all(|&v| v == -9999.0));
        assert_eq!(stats.masked_cells, 1);
        assert_eq!(stats.dilated_cells, 0);
    }

    #[test]
    fn nodata_centre_wins_over_larger_neighbours() {
        let mut grid = Grid::filled(5, 5, 100.0);
        grid.set(2, 2, 0.0);
        let (out, _) = run(grid, 0.0);
        assert_eq!(out.get(2, 2), 0.0);
        assert_eq!(out.get(2, 1), 100.0);
    }

    #[test]
    fn constant_grid_is_unchanged_inside_borders() {
        let (out, _) = run(Grid::filled(6, 9, 3.25), -1.0);
        for r in 0..6 {
            for c in 0..9 {
                let edge = r == 0 || r == 5 || c == 0 || c == 8;
                let expected = if edge { -1.0 } else { 3.25 };
                assert_eq!(out.get(r, c), expected, "cell ({r}, {c})");
            }
        }
    }

    #[test]
    fn two_rows_are_both_border() {
        let (out, stats) = run(Grid::filled(2, 4, 7.0), -1.0);
        assert!(out.data.iter().all(|&v| v == -1.0));
        assert_eq!(stats.rows_written, 2);
        assert_eq!(stats.dilated_cells, 0);
    }

    #[test]
    fn narrow_grids_have_no_computed_columns() {
        for cols in 1..=2 {
            let (out, stats) = run(Grid::filled(5, cols, 7.0), -1.0);
            assert!(out.data.iter().all(|&v| v == -1.0));
            assert_eq!(stats.rows_written, 5);
        }
    }

    #[test]
    fn rejects_single_row() {
        let err = StreamingDilation::new(1, 10, 0.0).unwrap_err();
        assert!(matches!(err, DilateError::InvalidDimensions { rows: 1, cols: 10 }));
        assert!(StreamingDilation::new(10, 0, 0.0).is_err());
    }

    #[test]
    fn rejects_source_of_other_shape() {
        let raster = MemoryRaster::new(Grid::filled(4, 4, 1.0), None);
        let mut sink = MemoryRaster::blank(raster.meta.clone());
        let mut filter = StreamingDilation::new(5, 4, 0.0).unwrap();
        assert!(filter.run(&mut raster.reader(), &mut sink).is_err());
    }

    #[test]
    fn missing_nodata_uses_default() {
        let mut grid = Grid::filled(4, 4, 2.0);
        grid.set(1, 1, 0.0);
        let raster = MemoryRaster::new(grid, None);
        let (out, stats) = dilate_in_memory(&raster, 0.0).unwrap();
        assert_eq!(out.meta.nodata, Some(0.0));
        assert_eq!(out.grid.get(1, 1), 0.0);
        assert_eq!(out.grid.get(1, 2), 2.0);
        assert_eq!(stats.masked_cells, 1);
    }

    #[test]
    fn nan_nodata_masks_nan_cells() {
        let mut grid = Grid::filled(4, 4, 2.0);
        grid.set(2, 1, f64::NAN);
        let (out, _) = run(grid, f64::NAN);
        assert!(out.get(2, 1).is_nan());
        assert!(out.get(0, 0).is_nan());
        assert_eq!(out.get(1, 1), 2.0);
    }

    #[test]
    fn nan_nodata_neighbour_is_skipped_wherever_it_sits() {
        for r in 0..3 {
            for c in 0..3 {
                if (r, c) == (1, 1) {
                    continue;
                }
                let mut grid = Grid::filled(4, 4, 2.0);
                grid.set(r, c, f64::NAN);
                let (out, stats) = run(grid, f64::NAN);
                assert_eq!(out.get(1, 1), 2.0, "NaN at ({r}, {c})");
                assert_eq!(stats.masked_cells, usize::from(r >= 1 && c >= 1), "NaN at ({r}, {c})");
            }
        }
    }

    #[test]
    fn matches_reference_on_random_grids() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..40 {
            let rows = rng.gen_range(2..24);
            let cols = rng.gen_range(1..24);
            let nodata = -9999.0;
            let data = (0..rows * cols)
                .map(|_| if rng.gen_bool(0.15) { nodata } else { rng.gen_range(-50.0..50.0) })
                .collect();
            let grid = Grid::from_vec(data, rows, cols).unwrap();
            let expected = reference(&grid, nodata);
            let (out, _) = run(grid, nodata);
            assert_eq!(out, expected, "{rows} x {cols}");
        }
    }

    #[test]
    fn output_never_below_source_inside() {
        let mut rng = StdRng::seed_from_u64(11);
        let data = (0..30 * 17).map(|_| rng.gen_range(0.0..10.0)).collect();
        let grid = Grid::from_vec(data, 30, 17).unwrap();
        let (out, _) = run(grid.clone(), -1.0);
        for r in 1..29 {
            for c in 1..16 {
                assert!(out.get(r, c) >= grid.get(r, c));
            }
        }
    }

    /// Computes cells on demand; never materialises the grid.
    struct ProceduralSource {
        meta: GridMeta,
        reads: usize,
    }

    fn procedural(r: usize, c: usize) -> f64 {
        if (r * 31 + c * 7) % 23 == 0 {
            -1.0
        } else {
            ((r * 7 + c * 13) % 11) as f64
        }
    }

    impl RowSource for ProceduralSource {
        fn meta(&self) -> &GridMeta {
            &self.meta
        }

        fn read_row(&mut self, row: usize, buf: &mut [f64]) -> Result<()> {
            assert_eq!(row, self.reads, "rows must be read in order");
            self.reads += 1;
            for (c, v) in buf.iter_mut().enumerate() {
                *v = procedural(row, c);
            }
            Ok(())
        }
    }

    /// Checks each committed row against the closed-form expectation.
    struct CheckingSink {
        rows: usize,
        next: usize,
    }

    impl RowSink for CheckingSink {
        fn write_row(&mut self, row: usize, buf: &[f64]) -> Result<()> {
            assert_eq!(row, self.next, "rows must be written in order");
            self.next += 1;
            let cols = buf.len();
            for (c, &v) in buf.iter().enumerate() {
                let border = row == 0 || row == self.rows - 1 || c == 0 || c == cols - 1;
                let expected = if border || procedural(row, c) == -1.0 {
                    -1.0
                } else {
                    let mut m = f64::NEG_INFINITY;
                    for nr in row - 1..=row + 1 {
                        for nc in c - 1..=c + 1 {
                            m = m.max(procedural(nr, nc));
                        }
                    }
                    m
                };
                assert_eq!(v, expected, "cell ({row}, {c})");
            }
            Ok(())
        }
    }

    #[test]
    fn streams_far_more_rows_than_buffers() {
        let rows = 100_000;
        let mut source = ProceduralSource { meta: GridMeta::new(rows, 6), reads: 0 };
        let mut sink = CheckingSink { rows, next: 0 };
        let stats = dilate(&mut source, &mut sink, -1.0).unwrap();
        assert_eq!(source.reads, rows);
        assert_eq!(sink.next, rows);
        assert_eq!(stats.rows_written, rows);
        assert_eq!(stats.dilated_cells + stats.masked_cells, (rows - 2) * 4);
    }

    struct FailingSink {
        fail_at: usize,
    }

    impl RowSink for FailingSink {
        fn write_row(&mut self, row: usize, _buf: &[f64]) -> Result<()> {
            if row == self.fail_at {
                return Err(DilateError::write(row, "disk full"));
            }
            Ok(())
        }
    }

    #[test]
    fn sink_failure_aborts_pass() {
        let mut source = ProceduralSource { meta: GridMeta::new(50, 5), reads: 0 };
        let err = dilate(&mut source, &mut FailingSink { fail_at: 10 }, -1.0).unwrap_err();
        assert!(matches!(err, DilateError::Io { row: 10, .. }));
        // row 10 is committed after source row 11 is loaded
        assert_eq!(source.reads, 12);
    }
}
