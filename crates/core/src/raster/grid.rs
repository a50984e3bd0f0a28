//! Main Raster type

use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Georef};
use ndarray::{Array2, ArrayView2};

/// A georeferenced 2D grid of `f64` samples.
///
/// Missing samples are stored as `NaN`. The nodata sentinel of the file the
/// raster came from is remembered in `nodata` but never appears in `data`
/// once the raster has been read through [`crate::RasterStore`].
///
/// # Example
///
/// ```ignore
/// use habistat_core::Raster;
///
/// let mut raster = Raster::new(100, 100);
/// raster.set(10, 20, 0.42)?;
/// let value = raster.get(10, 20)?;
/// ```
#[derive(Debug, Clone)]
pub struct Raster {
    /// Raster data stored in row-major order (row, col)
    data: Array2<f64>,
    /// Transform and coordinate-system keys
    georef: Georef,
    /// No-data sentinel of the originating file
    nodata: Option<f64>,
    /// Samples were decoded from 32-bit floats
    single_precision: bool,
}

impl Raster {
    /// Create a new raster filled with zeros
    pub fn new(rows: usize, cols: usize) -> Self {
        Self::from_array(Array2::zeros((rows, cols)))
    }

    /// Create a new raster filled with a specific value
    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self::from_array(Array2::from_elem((rows, cols), value))
    }

    /// Create a raster from row-major data
    pub fn from_vec(data: Vec<f64>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }

        let array = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;

        Ok(Self::from_array(array))
    }

    /// Create a raster from an ndarray
    pub fn from_array(data: Array2<f64>) -> Self {
        Self {
            data,
            georef: Georef::default(),
            nodata: None,
            single_precision: false,
        }
    }

    // Dimensions

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Total number of cells
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the raster is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    // Data access

    /// Get value at (row, col)
    pub fn get(&self, row: usize, col: usize) -> Result<f64> {
        self.data
            .get((row, col))
            .copied()
            .ok_or(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            })
    }

    /// Set value at (row, col)
    pub fn set(&mut self, row: usize, col: usize, value: f64) -> Result<()> {
        let (rows, cols) = self.shape();
        match self.data.get_mut((row, col)) {
            Some(cell) => {
                *cell = value;
                Ok(())
            }
            None => Err(Error::IndexOutOfBounds { row, col, rows, cols }),
        }
    }

    /// Get a view of the underlying data
    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    /// Get a reference to the underlying array
    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    // Metadata

    pub fn georef(&self) -> &Georef {
        &self.georef
    }

    pub fn set_georef(&mut self, georef: Georef) {
        self.georef = georef;
    }

    /// Get the geotransform
    pub fn transform(&self) -> &GeoTransform {
        &self.georef.transform
    }

    /// Set the geotransform
    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.georef.transform = transform;
    }

    /// Get the no-data sentinel of the originating file
    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    /// Set the no-data sentinel
    pub fn set_nodata(&mut self, nodata: Option<f64>) {
        self.nodata = nodata;
    }

    /// Whether the samples were stored as 32-bit floats
    pub fn is_single_precision(&self) -> bool {
        self.single_precision
    }

    pub fn set_single_precision(&mut self, single: bool) {
        self.single_precision = single;
    }

    /// Geographic bounds (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.georef.transform.bounds(self.cols(), self.rows())
    }

    /// Replace every sample equal to `sentinel` with `NaN`.
    ///
    /// Single-precision rasters compare in `f32`, so a sentinel such as
    /// `-9999.9` matches the rounded value actually stored in the file.
    /// Returns the number of replaced cells.
    pub fn mask_sentinel(&mut self, sentinel: f64) -> usize {
        if sentinel.is_nan() {
            return 0;
        }
        let single = self.single_precision;
        let mut masked = 0;
        self.data.mapv_inplace(|v| {
            let hit = if single {
                v as f32 == sentinel as f32
            } else {
                v == sentinel
            };
            if hit {
                masked += 1;
                f64::NAN
            } else {
                v
            }
        });
        masked
    }

    // Statistics

    /// Min, max, mean and count of valid (non-NaN) cells
    pub fn statistics(&self) -> RasterStatistics {
        let mut stats = RasterStatistics {
            min: None,
            max: None,
            mean: None,
            valid_count: 0,
            nodata_count: 0,
        };
        let mut sum = 0.0;

        for &value in self.data.iter() {
            if value.is_nan() {
                stats.nodata_count += 1;
                continue;
            }
            stats.min = Some(stats.min.map_or(value, |m: f64| m.min(value)));
            stats.max = Some(stats.max.map_or(value, |m: f64| m.max(value)));
            sum += value;
            stats.valid_count += 1;
        }

        if stats.valid_count > 0 {
            stats.mean = Some(sum / stats.valid_count as f64);
        }
        stats
    }
}

/// Basic statistics for a raster
#[derive(Debug, Clone, PartialEq)]
pub struct RasterStatistics {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub valid_count: usize,
    pub nodata_count: usize,
}
