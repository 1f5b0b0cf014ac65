//! Row-streaming 3×3 nodata-aware dilation for rasters larger than memory.

pub mod config;
pub mod error;
pub mod filter;
pub mod geotiff;
pub mod grid;
pub mod kernel;
pub mod pipeline;
pub mod storage;
pub mod window;

pub use config::{resolve_nodata, DilateConfig, ResolvedNodata};
pub use error::{DilateError, Result};
pub use filter::{dilate, dilate_in_memory, is_nodata, DilationStats, StreamingDilation};
pub use geotiff::{GeoTiffDestination, GeoTiffSource};
pub use grid::{GeoTransform, Grid, GridMeta, MemoryRaster, SpatialRef};
pub use pipeline::{run, RunSummary};
pub use storage::{RowSink, RowSource};
