//! Run configuration and nodata resolution.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DilateError, Result};

pub const DEFAULT_INPUT: &str = "input.tif";
pub const DEFAULT_OUTPUT: &str = "output.tif";

/// Nodata marker assumed when a source declares none.
pub const DEFAULT_NODATA: f64 = 0.0;

/// Paths and policy for one dilation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DilateConfig {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Used as the nodata marker when the source declares none. Cells equal
    /// to it are masked, so legitimate data with this value is lost.
    pub default_nodata: f64,
}

impl Default for DilateConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from(DEFAULT_INPUT),
            output_path: PathBuf::from(DEFAULT_OUTPUT),
            default_nodata: DEFAULT_NODATA,
        }
    }
}

impl DilateConfig {
    /// Load from a JSON file; absent keys take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| DilateError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| DilateError::Config(e.to_string()))
    }

    /// Source and destination must differ: the destination is created
    /// before the source has been fully read.
    pub fn validate(&self) -> Result<()> {
        if self.input_path == self.output_path {
            return Err(DilateError::Config(format!(
                "input and output are the same file: {}",
                self.input_path.display()
            )));
        }
        Ok(())
    }
}

/// The nodata marker a run actually uses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResolvedNodata {
    pub value: f64,
    /// False when `value` came from the configured default.
    pub declared: bool,
}

pub fn resolve_nodata(declared: Option<f64>, default: f64) -> ResolvedNodata {
    match declared {
        Some(value) => ResolvedNodata { value, declared: true },
        None => ResolvedNodata { value: default, declared: false },
    }
}
