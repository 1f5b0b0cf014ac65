//! Streaming 3×3 dilation of a single-band GeoTIFF.
//!
//! Reads the input one row at a time, writes a Float64 GeoTIFF with the same
//! size, transform and spatial reference, and optionally a JSON run report.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use rowdilate_core::{DilateConfig, RunSummary};

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "rowdilate", about = "Nodata-aware 3x3 max filter over rasters larger than memory")]
struct Args {
    /// JSON config file ({"input_path", "output_path", "default_nodata"})
    #[arg(long)]
    config: Option<PathBuf>,

    /// Input GeoTIFF (overrides config; default input.tif)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output GeoTIFF (overrides config; default output.tif)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Nodata marker used when the input declares none (default 0)
    #[arg(long, allow_negative_numbers = true)]
    default_nodata: Option<f64>,

    /// Write a JSON run report to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

/// Config file first, then command-line overrides.
fn resolve_config(args: &Args) -> Result<DilateConfig> {
    let mut cfg = match &args.config {
        Some(path) => DilateConfig::from_json_file(path)
            .with_context(|| format!("Cannot load config {}", path.display()))?,
        None => DilateConfig::default(),
    };
    if let Some(input) = &args.input {
        cfg.input_path = input.clone();
    }
    if let Some(output) = &args.output {
        cfg.output_path = output.clone();
    }
    if let Some(nodata) = args.default_nodata {
        cfg.default_nodata = nodata;
    }
    Ok(cfg)
}

fn write_report(path: &Path, summary: &RunSummary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)?;
    fs::write(path, json).with_context(|| format!("Write failed: {}", path.display()))
}

// ── Main ──────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = resolve_config(&args)?;
    log::debug!("resolved config: {cfg:?}");

    let summary = rowdilate_core::run(&cfg).with_context(|| {
        format!(
            "Dilation of {} into {} failed",
            cfg.input_path.display(),
            cfg.output_path.display()
        )
    })?;

    if let Some(report) = &args.report {
        write_report(report, &summary)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_flags() {
        let args = Args::parse_from(["rowdilate"]);
        let cfg = resolve_config(&args).unwrap();
        assert_eq!(cfg, DilateConfig::default());
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        fs::write(&path, r#"{"input_path": "a.tif", "output_path": "b.tif", "default_nodata": 5}"#).unwrap();

        let args = Args::parse_from([
            "rowdilate",
            "--config",
            path.to_str().unwrap(),
            "-o",
            "c.tif",
            "--default-nodata",
            "-9999",
        ]);
        let cfg = resolve_config(&args).unwrap();
        assert_eq!(cfg.input_path, PathBuf::from("a.tif"));
        assert_eq!(cfg.output_path, PathBuf::from("c.tif"));
        assert_eq!(cfg.default_nodata, -9999.0);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let args = Args::parse_from(["rowdilate", "--config", "/nonexistent/cfg.json"]);
        assert!(resolve_config(&args).is_err());
    }
}
