//! GeoTIFF row storage built on the `tiff` crate.
//!
//! The reader decodes one strip at a time and keeps only the current strip,
//! so a source never has to fit in memory. The writer emits BigTIFF (64-bit
//! offsets, so Float64 output may exceed 4 GiB) with one row per strip and
//! therefore only accepts rows in increasing order.
//!
//! Georeferencing tags handled:
//! - 33550 ModelPixelScale + 33922 ModelTiepoint (north-up transforms)
//! - 34264 ModelTransformation (rotated transforms)
//! - 34735/34736/34737 GeoKey directory and parameters (copied verbatim)
//! - 42113 GDAL_NODATA (ASCII)

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};

use log::debug;
use tiff::decoder::{ChunkType, Decoder, DecodingResult};
use tiff::encoder::colortype::Gray64Float;
use tiff::encoder::{DirectoryEncoder, ImageEncoder, TiffEncoder, TiffKindBig};
use tiff::tags::Tag;
use tiff::ColorType;

use crate::error::{DilateError, Result};
use crate::grid::{GeoTransform, GridMeta, SpatialRef};
use crate::storage::{RowSink, RowSource};

const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
const TAG_MODEL_TIEPOINT: u16 = 33922;
const TAG_MODEL_TRANSFORMATION: u16 = 34264;
const TAG_GEO_KEY_DIRECTORY: u16 = 34735;
const TAG_GEO_DOUBLE_PARAMS: u16 = 34736;
const TAG_GEO_ASCII_PARAMS: u16 = 34737;
const TAG_GDAL_NODATA: u16 = 42113;

// ── Reading ─────────────────────────────────────────────────────────────────

/// A single-band, strip-organised GeoTIFF opened for row reads.
pub struct GeoTiffSource {
    decoder: Decoder<BufReader<File>>,
    meta: GridMeta,
    rows_per_strip: usize,
    /// Index and samples of the most recently decoded strip.
    strip: Option<(usize, Vec<f64>)>,
}

impl GeoTiffSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let open_err = |reason: String| DilateError::Open { path: path.clone(), reason };

        let file = File::open(&path).map_err(|e| open_err(e.to_string()))?;
        let mut decoder = Decoder::new(BufReader::new(file))
            .map_err(|e| open_err(format!("not a valid TIFF: {e}")))?;

        let (width, height) = decoder
            .dimensions()
            .map_err(|e| open_err(format!("cannot read dimensions: {e}")))?;
        match decoder.colortype() {
            Ok(ColorType::Gray(_)) => {}
            Ok(other) => {
                return Err(DilateError::Unsupported(format!(
                    "{}: expected a single band, found {other:?}",
                    path.display()
                )))
            }
            Err(e) => return Err(open_err(format!("cannot read colour type: {e}"))),
        }
        if !matches!(decoder.get_chunk_type(), ChunkType::Strip) {
            return Err(DilateError::Unsupported(format!(
                "{}: tiled layout, expected strips",
                path.display()
            )));
        }
        let (_, strip_rows) = decoder.chunk_dimensions();

        let meta = GridMeta {
            rows: height as usize,
            cols: width as usize,
            transform: read_transform(&mut decoder),
            spatial_ref: read_spatial_ref(&mut decoder),
            nodata: read_nodata(&mut decoder),
        };
        debug!(
            "opened {}: {} x {} cells, {} rows per strip, nodata {:?}, transform {:?}",
            path.display(),
            meta.cols,
            meta.rows,
            strip_rows,
            meta.nodata,
            meta.transform.map(|t| t.to_gdal()),
        );

        Ok(Self {
            decoder,
            meta,
            rows_per_strip: (strip_rows as usize).max(1),
            strip: None,
        })
    }

    fn load_strip(&mut self, index: usize, row: usize) -> Result<&[f64]> {
        let cached = matches!(self.strip, Some((i, _)) if i == index);
        if !cached {
            let chunk = self
                .decoder
                .read_chunk(index as u32)
                .map_err(|e| DilateError::read(row, format!("strip {index}: {e}")))?;
            let samples = samples_to_f64(chunk).map_err(|e| DilateError::read(row, e))?;
            let (w, h) = self.decoder.chunk_data_dimensions(index as u32);
            if samples.len() < w as usize * h as usize {
                return Err(DilateError::read(
                    row,
                    format!("strip {index} holds {} samples, expected {}", samples.len(), w * h),
                ));
            }
            self.strip = Some((index, samples));
        }
        match &self.strip {
            Some((_, samples)) => Ok(samples.as_slice()),
            None => Err(DilateError::read(row, "strip cache empty")),
        }
    }
}

impl RowSource for GeoTiffSource {
    fn meta(&self) -> &GridMeta {
        &self.meta
    }

    fn read_row(&mut self, row: usize, buf: &mut [f64]) -> Result<()> {
        let (rows, cols) = (self.meta.rows, self.meta.cols);
        if row >= rows {
            return Err(DilateError::read(row, format!("raster has {rows} rows")));
        }
        if buf.len() != cols {
            return Err(DilateError::RowLength { row, expected: cols, actual: buf.len() });
        }
        let index = row / self.rows_per_strip;
        let offset = (row % self.rows_per_strip) * cols;
        let samples = self.load_strip(index, row)?;
        let Some(src) = samples.get(offset..offset + cols) else {
            return Err(DilateError::read(row, format!("strip {index} is short")));
        };
        buf.copy_from_slice(src);
        Ok(())
    }
}

fn samples_to_f64(result: DecodingResult) -> std::result::Result<Vec<f64>, String> {
    let out = match result {
        DecodingResult::F64(buf) => buf,
        DecodingResult::F32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I32(buf) => buf.into_iter().map(f64::from).collect(),
        _ => return Err("unsupported sample format".to_string()),
    };
    Ok(out)
}

fn read_transform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    if let Ok(m) = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(TAG_MODEL_TRANSFORMATION)) {
        if m.len() >= 8 {
            return Some(GeoTransform::from_gdal([m[3], m[0], m[1], m[7], m[4], m[5]]));
        }
    }

    let scale = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(TAG_MODEL_PIXEL_SCALE)).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(TAG_MODEL_TIEPOINT)).ok()?;
    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }
    // tiepoint: [I, J, K, X, Y, Z]; raster (I, J) maps to model (X, Y)
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

fn read_spatial_ref<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<SpatialRef> {
    let geo_keys = decoder.get_tag_u16_vec(Tag::from_u16_exhaustive(TAG_GEO_KEY_DIRECTORY)).ok()?;
    let geo_doubles = decoder
        .get_tag_f64_vec(Tag::from_u16_exhaustive(TAG_GEO_DOUBLE_PARAMS))
        .unwrap_or_default();
    let geo_ascii = decoder
        .get_tag_ascii_string(Tag::from_u16_exhaustive(TAG_GEO_ASCII_PARAMS))
        .ok();
    Some(SpatialRef { geo_keys, geo_doubles, geo_ascii })
}

fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    let text = decoder.get_tag_ascii_string(Tag::from_u16_exhaustive(TAG_GDAL_NODATA)).ok()?;
    parse_nodata(&text)
}

fn parse_nodata(text: &str) -> Option<f64> {
    text.trim_matches(|c: char| c == '\0' || c.is_whitespace()).parse().ok()
}

// ── Writing ─────────────────────────────────────────────────────────────────

/// A newly created GeoTIFF file, not yet holding an image.
pub struct GeoTiffDestination {
    path: PathBuf,
    meta: GridMeta,
    file: BufWriter<File>,
}

impl GeoTiffDestination {
    /// Create (or truncate) `path` for a raster shaped like `meta`.
    ///
    /// The destination copies `meta`'s transform and spatial reference and
    /// declares `meta.nodata` when set.
    pub fn create(path: impl AsRef<Path>, meta: &GridMeta) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let create_err = |reason: String| DilateError::Create { path: path.clone(), reason };

        if meta.rows == 0 || meta.cols == 0 {
            return Err(create_err(format!("empty raster {} x {}", meta.rows, meta.cols)));
        }
        if u32::try_from(meta.rows).is_err() || u32::try_from(meta.cols).is_err() {
            return Err(create_err(format!("raster {} x {} exceeds TIFF limits", meta.rows, meta.cols)));
        }

        let file = File::create(&path).map_err(|e| create_err(e.to_string()))?;
        Ok(Self { path, meta: meta.clone(), file: BufWriter::new(file) })
    }

    /// Write the image: tags first, then every row through `fill`.
    ///
    /// `fill` must write all rows, in order. The image directory is
    /// finalised and the file flushed before this returns; a short image or
    /// a failed flush is an `Io` error.
    pub fn write_image<T, F>(mut self, fill: F) -> Result<T>
    where
        F: FnOnce(&mut dyn RowSink) -> Result<T>,
    {
        let path = self.path.clone();
        let create_err = |reason: String| DilateError::Create { path: path.clone(), reason };
        let (rows, cols) = (self.meta.rows, self.meta.cols);

        let out = {
            let mut encoder = TiffEncoder::new_big(&mut self.file).map_err(|e| create_err(e.to_string()))?;
            let mut image = encoder
                .new_image::<Gray64Float>(cols as u32, rows as u32)
                .map_err(|e| create_err(e.to_string()))?;
            image.rows_per_strip(1).map_err(|e| create_err(e.to_string()))?;
            write_meta_tags(image.encoder(), &self.meta).map_err(|e| create_err(e.to_string()))?;

            let mut writer = GeoTiffRowWriter { image, rows, cols, next_row: 0 };
            let sink: &mut dyn RowSink = &mut writer;
            let out = fill(sink)?;
            writer.close()?;
            out
        };
        self.file.flush().map_err(|e| DilateError::write(rows - 1, e))?;
        debug!("wrote {} x {} BigTIFF {}", cols, rows, self.path.display());
        Ok(out)
    }
}

/// Appends rows to an open GeoTIFF image.
struct GeoTiffRowWriter<'a, W: 'a + Write + Seek> {
    image: ImageEncoder<'a, W, Gray64Float, TiffKindBig>,
    rows: usize,
    cols: usize,
    next_row: usize,
}

impl<'a, W: 'a + Write + Seek> GeoTiffRowWriter<'a, W> {
    /// Finalise the image directory. Fails if rows are missing.
    fn close(self) -> Result<()> {
        if self.next_row != self.rows {
            return Err(DilateError::write(
                self.next_row,
                format!("closed after {} of {} rows", self.next_row, self.rows),
            ));
        }
        let last = self.rows - 1;
        self.image.finish().map_err(|e| DilateError::write(last, e))
    }
}

impl<'a, W: 'a + Write + Seek> RowSink for GeoTiffRowWriter<'a, W> {
    fn write_row(&mut self, row: usize, buf: &[f64]) -> Result<()> {
        if row != self.next_row {
            return Err(DilateError::write(
                row,
                format!("rows must be written in order, expected row {}", self.next_row),
            ));
        }
        if buf.len() != self.cols {
            return Err(DilateError::RowLength { row, expected: self.cols, actual: buf.len() });
        }
        self.image.write_strip(buf).map_err(|e| DilateError::write(row, e))?;
        self.next_row += 1;
        Ok(())
    }
}

fn write_meta_tags<W: Write + Seek>(
    dir: &mut DirectoryEncoder<'_, W, TiffKindBig>,
    meta: &GridMeta,
) -> tiff::TiffResult<()> {
    if let Some(gt) = meta.transform {
        if gt.is_north_up() {
            let scale = [gt.pixel_width, -gt.pixel_height, 0.0];
            let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
            dir.write_tag(Tag::from_u16_exhaustive(TAG_MODEL_PIXEL_SCALE), &scale[..])?;
            dir.write_tag(Tag::from_u16_exhaustive(TAG_MODEL_TIEPOINT), &tiepoint[..])?;
        } else {
            let m = model_transformation(&gt);
            dir.write_tag(Tag::from_u16_exhaustive(TAG_MODEL_TRANSFORMATION), &m[..])?;
        }
    }

    if let Some(srs) = meta.spatial_ref.as_ref().filter(|s| !s.is_empty()) {
        dir.write_tag(Tag::from_u16_exhaustive(TAG_GEO_KEY_DIRECTORY), &srs.geo_keys[..])?;
        if !srs.geo_doubles.is_empty() {
            dir.write_tag(Tag::from_u16_exhaustive(TAG_GEO_DOUBLE_PARAMS), &srs.geo_doubles[..])?;
        }
        if let Some(ascii) = &srs.geo_ascii {
            dir.write_tag(Tag::from_u16_exhaustive(TAG_GEO_ASCII_PARAMS), ascii.as_str())?;
        }
    }

    if let Some(nodata) = meta.nodata {
        dir.write_tag(Tag::from_u16_exhaustive(TAG_GDAL_NODATA), nodata.to_string().as_str())?;
    }
    Ok(())
}

/// 4×4 row-major model transformation matrix for a GDAL transform.
fn model_transformation(gt: &GeoTransform) -> [f64; 16] {
    [
        gt.pixel_width, gt.row_rotation, 0.0, gt.origin_x,
        gt.col_rotation, gt.pixel_height, 0.0, gt.origin_y,
        0.0, 0.0, 0.0, 0.0,
        0.0, 0.0, 0.0, 1.0,
    ]
}
