use serde::{Deserialize, Serialize};

use crate::error::{DilateError, Result};
use crate::storage::{RowSink, RowSource};

/// Affine georeferencing in GDAL coefficient order.
///
/// ```text
/// x = origin_x + col * pixel_width + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub pixel_width: f64,
    pub row_rotation: f64,
    pub origin_y: f64,
    pub col_rotation: f64,
    /// Usually negative for north-up rasters.
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform with no rotation terms.
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            pixel_width,
            row_rotation: 0.0,
            origin_y,
            col_rotation: 0.0,
            pixel_height,
        }
    }

    pub fn from_gdal(c: [f64; 6]) -> Self {
        Self {
            origin_x: c[0],
            pixel_width: c[1],
            row_rotation: c[2],
            origin_y: c[3],
            col_rotation: c[4],
            pixel_height: c[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            self.row_rotation,
            self.origin_y,
            self.col_rotation,
            self.pixel_height,
        ]
    }

    pub fn is_north_up(&self) -> bool {
        self.row_rotation == 0.0 && self.col_rotation == 0.0
    }
}

/// Spatial reference carried opaquely from source to destination.
///
/// Holds the raw GeoTIFF key directory and its parameter tags; nothing here
/// is interpreted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpatialRef {
    pub geo_keys: Vec<u16>,
    pub geo_doubles: Vec<f64>,
    pub geo_ascii: Option<String>,
}

impl SpatialRef {
    pub fn is_empty(&self) -> bool {
        self.geo_keys.is_empty()
    }
}

/// Dimensions and metadata of a grid, as reported when a source is opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridMeta {
    pub rows: usize,
    pub cols: usize,
    pub transform: Option<GeoTransform>,
    pub spatial_ref: Option<SpatialRef>,
    /// `None` when the source declares no nodata value.
    pub nodata: Option<f64>,
}

impl GridMeta {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols, transform: None, spatial_ref: None, nodata: None }
    }

    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.nodata = Some(nodata);
        self
    }

    pub fn with_transform(mut self, transform: GeoTransform) -> Self {
        self.transform = Some(transform);
        self
    }
}

/// A 2D grid of `f64` cells, row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub data: Vec<f64>,
    pub rows: usize,
    pub cols: usize,
}

impl Grid {
    /// Create a grid filled with the given value.
    pub fn filled(rows: usize, cols: usize, fill: f64) -> Self {
        Self { data: vec![fill; rows * cols], rows, cols }
    }

    pub fn from_vec(data: Vec<f64>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(DilateError::InvalidDimensions { rows, cols });
        }
        Ok(Self { data, rows, cols })
    }

    /// Build from nested rows; every row must have the same length.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (r, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(DilateError::RowLength { row: r, expected: cols, actual: row.len() });
            }
            data.extend_from_slice(row);
        }
        Ok(Self { data, rows: rows.len(), cols })
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: f64) {
        self.data[row * self.cols + col] = val;
    }

    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [f64] {
        &mut self.data[row * self.cols..(row + 1) * self.cols]
    }
}

/// A grid plus its metadata, usable as both a row source and a row sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRaster {
    pub meta: GridMeta,
    pub grid: Grid,
}

impl MemoryRaster {
    pub fn new(grid: Grid, nodata: Option<f64>) -> Self {
        let mut meta = GridMeta::new(grid.rows, grid.cols);
        meta.nodata = nodata;
        Self { meta, grid }
    }

    /// Empty destination shaped like `meta`; cells start as NaN.
    pub fn blank(meta: GridMeta) -> Self {
        let grid = Grid::filled(meta.rows, meta.cols, f64::NAN);
        Self { meta, grid }
    }

    /// Borrowing row reader over this raster.
    pub fn reader(&self) -> GridReader<'_> {
        GridReader { raster: self }
    }
}

pub struct GridReader<'a> {
    raster: &'a MemoryRaster,
}

impl RowSource for GridReader<'_> {
    fn meta(&self) -> &GridMeta {
        &self.raster.meta
    }

    fn read_row(&mut self, row: usize, buf: &mut [f64]) -> Result<()> {
        let grid = &self.raster.grid;
        if row >= grid.rows {
            return Err(DilateError::read(row, format!("grid has {} rows", grid.rows)));
        }
        if buf.len() != grid.cols {
            return Err(DilateError::RowLength { row, expected: grid.cols, actual: buf.len() });
        }
        buf.copy_from_slice(grid.row(row));
        Ok(())
    }
}

impl RowSource for MemoryRaster {
    fn meta(&self) -> &GridMeta {
        &self.meta
    }

    fn read_row(&mut self, row: usize, buf: &mut [f64]) -> Result<()> {
        self.reader().read_row(row, buf)
    }
}

impl RowSink for MemoryRaster {
    fn write_row(&mut self, row: usize, buf: &[f64]) -> Result<()> {
        if row >= self.grid.rows {
            return Err(DilateError::write(row, format!("grid has {} rows", self.grid.rows)));
        }
        if buf.len() != self.grid.cols {
            return Err(DilateError::RowLength { row, expected: self.grid.cols, actual: buf.len() });
        }
        self.grid.row_mut(row).copy_from_slice(buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_set_are_row_major() {
        let mut g = Grid::filled(3, 4, 0.0);
        g.set(1, 2, 5.0);
        assert_eq!(g.data[6], 5.0);
        assert_eq!(g.get(1, 2), 5.0);
        assert_eq!(g.row(1), &[0.0, 0.0, 5.0, 0.0]);
    }

    #[test]
    fn from_vec_rejects_wrong_length() {
        assert!(Grid::from_vec(vec![0.0; 5], 2, 3).is_err());
        assert!(Grid::from_vec(vec![0.0; 6], 2, 3).is_ok());
    }

    #[test]
    fn from_rows_rejects_ragged_input() {
        let err = Grid::from_rows(&[vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert!(matches!(err, DilateError::RowLength { row: 1, expected: 2, actual: 1 }));
    }

    #[test]
    fn gdal_coefficients_round_trip() {
        let c = [440720.0, 60.0, 0.5, 3751320.0, -0.25, -60.0];
        let gt = GeoTransform::from_gdal(c);
        assert_eq!(gt.to_gdal(), c);
        assert!(!gt.is_north_up());
        assert!(GeoTransform::new(0.0, 10.0, 1.0, -1.0).is_north_up());
    }

    #[test]
    fn memory_raster_rows_out_of_range() {
        let mut raster = MemoryRaster::new(Grid::filled(2, 3, 1.0), None);
        let mut buf = vec![0.0; 3];
        assert!(raster.read_row(2, &mut buf).is_err());
        assert!(raster.write_row(5, &buf).is_err());
        assert!(raster.write_row(0, &[1.0]).is_err());
    }

    #[test]
    fn memory_raster_write_then_read() {
        let mut raster = MemoryRaster::blank(GridMeta::new(2, 3));
        raster.write_row(1, &[4.0, 5.0, 6.0]).unwrap();
        let mut buf = vec![0.0; 3];
        raster.read_row(1, &mut buf).unwrap();
        assert_eq!(buf, vec![4.0, 5.0, 6.0]);
        assert!(raster.grid.get(0, 0).is_nan());
    }

    #[test]
    fn meta_serialises_to_json() {
        let meta = GridMeta::new(4, 5).with_nodata(-9999.0);
        let json = serde_json::to_string(&meta).unwrap();
        let back: GridMeta = serde_json::from_str(&json).unwrap();
        assert_eq!(back, meta);
    }
}
