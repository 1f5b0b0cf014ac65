//! Run orchestrator: open → create → filter → close.

use std::path::PathBuf;
use std::time::Instant;

use log::{info, warn};
use serde::Serialize;

use crate::config::{resolve_nodata, DilateConfig};
use crate::error::Result;
use crate::filter::StreamingDilation;
use crate::geotiff::{GeoTiffDestination, GeoTiffSource};
use crate::storage::RowSource;

/// What one run did; written as the optional JSON report.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub input: PathBuf,
    pub output: PathBuf,
    pub rows: usize,
    pub cols: usize,
    pub nodata: f64,
    /// False when `nodata` is the configured default.
    pub nodata_declared: bool,
    pub dilated_cells: usize,
    pub masked_cells: usize,
    pub elapsed_ms: u64,
}

/// Dilate `config.input_path` into `config.output_path`.
///
/// The destination copies the source's dimensions, transform and spatial
/// reference, and declares the nodata value used for masking. On error the
/// destination is left as far as it got.
pub fn run(config: &DilateConfig) -> Result<RunSummary> {
    config.validate()?;
    let t0 = Instant::now();

    let mut source = GeoTiffSource::open(&config.input_path)?;
    let meta = source.meta().clone();
    info!(
        "input {}: {} x {} cells",
        config.input_path.display(),
        meta.cols,
        meta.rows
    );

    let nodata = resolve_nodata(meta.nodata, config.default_nodata);
    if !nodata.declared {
        warn!(
            "{} declares no nodata value; masking cells equal to {}",
            config.input_path.display(),
            nodata.value
        );
    }

    let mut filter = StreamingDilation::for_grid(&meta, nodata.value)?;

    let dest_meta = meta.clone().with_nodata(nodata.value);
    let dest = GeoTiffDestination::create(&config.output_path, &dest_meta)?;
    let stats = dest.write_image(|sink| filter.run(&mut source, sink))?;

    let summary = RunSummary {
        input: config.input_path.clone(),
        output: config.output_path.clone(),
        rows: meta.rows,
        cols: meta.cols,
        nodata: nodata.value,
        nodata_declared: nodata.declared,
        dilated_cells: stats.dilated_cells,
        masked_cells: stats.masked_cells,
        elapsed_ms: t0.elapsed().as_millis() as u64,
    };
    info!(
        "wrote {}: {} cells dilated, {} masked in {} ms",
        config.output_path.display(),
        summary.dilated_cells,
        summary.masked_cells,
        summary.elapsed_ms
    );
    Ok(summary)
}
