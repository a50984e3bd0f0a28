//! Raster store: masked reads and atomic, precision-aware writes

use super::geotiff::{self, EncodeOptions, SamplePrecision};
use crate::error::{Error, Result};
use crate::raster::{Georef, Raster};
use ndarray::Array2;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Estimated output size above which a BigTIFF container is written
pub const DEFAULT_BIGTIFF_THRESHOLD: u64 = 3 * 1024 * 1024 * 1024;

/// Suffix of scratch files written before the atomic rename
pub const PARTIAL_SUFFIX: &str = "partial";

/// Options for [`RasterStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    pub bigtiff_threshold_bytes: u64,
    pub compress: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            bigtiff_threshold_bytes: DEFAULT_BIGTIFF_THRESHOLD,
            compress: true,
        }
    }
}

/// What a successful write committed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteReport {
    pub precision: SamplePrecision,
    pub bigtiff: bool,
    pub estimated_bytes: u64,
}

/// Reads base rasters and persists derived artefacts.
#[derive(Debug, Clone, Default)]
pub struct RasterStore {
    options: StoreOptions,
}

impl RasterStore {
    pub fn new(options: StoreOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Read a raster, replacing samples equal to its nodata sentinel with `NaN`.
    pub fn read<P: AsRef<Path>>(&self, path: P) -> Result<Raster> {
        let path = path.as_ref();
        let mut raster = geotiff::read_geotiff(path)?;
        if let Some(nodata) = raster.nodata() {
            let masked = raster.mask_sentinel(nodata);
            debug!(path = %path.display(), nodata, masked, "masked nodata samples");
        }
        Ok(raster)
    }

    /// Read only the header and return (rows, cols)
    pub fn dimensions<P: AsRef<Path>>(&self, path: P) -> Result<(usize, usize)> {
        geotiff::read_geotiff_dimensions(path)
    }

    /// Write `data` as a single-band float raster with `georef`.
    ///
    /// Samples are stored as `f32` only if every finite value lies in
    /// [-1, 1]; otherwise `f64`. A BigTIFF container is used when the
    /// estimated payload exceeds the configured threshold.
    ///
    /// The file is encoded to `<path>.partial` and renamed into place once
    /// complete, so `path` either does not exist or holds a whole raster.
    /// Parent directories are created as needed. On failure the scratch file
    /// is left behind and named in [`Error::Storage`].
    pub fn write<P: AsRef<Path>>(&self, path: P, georef: &Georef, data: Array2<f64>) -> Result<WriteReport> {
        let path = path.as_ref();
        let (rows, cols) = data.dim();
        if rows == 0 || cols == 0 {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }

        let precision = select_precision(&data);
        let estimated_bytes = rows as u64 * cols as u64 * precision.bytes_per_sample();
        let bigtiff = estimated_bytes > self.options.bigtiff_threshold_bytes;
        let options = EncodeOptions {
            precision,
            bigtiff,
            compress: self.options.compress,
        };

        let mut raster = Raster::from_array(data);
        raster.set_georef(georef.clone());

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let temp_path = partial_path(path);
        let storage_err = |source: Error| Error::Storage {
            path: path.to_path_buf(),
            temp_path: temp_path.clone(),
            source: Box::new(source),
        };

        geotiff::write_geotiff(&raster, &temp_path, options).map_err(storage_err)?;
        fs::rename(&temp_path, path).map_err(|e| storage_err(Error::Io(e)))?;

        debug!(
            path = %path.display(),
            ?precision,
            bigtiff,
            estimated_bytes,
            "raster written"
        );
        Ok(WriteReport {
            precision,
            bigtiff,
            estimated_bytes,
        })
    }
}

/// `f32` when every finite value lies in the normalized-index domain [-1, 1]
pub fn select_precision(data: &Array2<f64>) -> SamplePrecision {
    let fits = data
        .iter()
        .filter(|v| v.is_finite())
        .all(|v| (-1.0..=1.0).contains(v));
    if fits {
        SamplePrecision::F32
    } else {
        SamplePrecision::F64
    }
}

/// Scratch path for an in-progress write: `<file name>.partial` next to `path`
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{GeoKeys, GeoTransform};
    use tempfile::TempDir;

    fn georef() -> Georef {
        Georef::new(GeoTransform::new(13.0, 52.8, 0.0001, -0.0001)).with_geokeys(GeoKeys {
            directory: vec![1, 1, 0, 2, 1024, 0, 1, 2, 2048, 0, 1, 4326],
            double_params: Some(vec![298.257223563, 6378137.0]),
            ascii_params: Some("WGS 84|".into()),
        })
    }

    fn ndvi_like(rows: usize, cols: usize) -> Array2<f64> {
        Array2::from_shape_fn((rows, cols), |(r, c)| ((r * cols + c) as f64 / (rows * cols) as f64) * 2.0 - 1.0)
    }

    #[test]
    fn test_precision_selection() {
        assert_eq!(select_precision(&ndvi_like(8, 8)), SamplePrecision::F32);

        let mut with_nan = ndvi_like(8, 8);
        with_nan[(0, 0)] = f64::NAN;
        assert_eq!(select_precision(&with_nan), SamplePrecision::F32);

        let mut wide = ndvi_like(8, 8);
        wide[(3, 3)] = 1.5;
        assert_eq!(select_precision(&wide), SamplePrecision::F64);
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/data/NDVI_STD_2022_06.tif")),
            PathBuf::from("/data/NDVI_STD_2022_06.tif.partial")
        );
    }

    #[test]
    fn test_roundtrip_within_precision() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/out/NDVI_STD_2022_06.tif");
        let store = RasterStore::default();

        let mut data = ndvi_like(32, 48);
        data[(5, 7)] = f64::NAN;
        let report = store.write(&path, &georef(), data.clone()).unwrap();
        assert_eq!(report.precision, SamplePrecision::F32);
        assert!(!report.bigtiff);
        assert!(!partial_path(&path).exists());

        let loaded = store.read(&path).unwrap();
        assert_eq!(loaded.georef(), &georef());
        assert!(loaded.get(5, 7).unwrap().is_nan());
        for ((r, c), &v) in data.indexed_iter() {
            if v.is_nan() {
                continue;
            }
            let got = loaded.get(r, c).unwrap();
            assert!((got - v).abs() <= f32::EPSILON as f64, "({r},{c}): {got} vs {v}");
        }
    }

    #[test]
    fn test_wide_values_roundtrip_exactly() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("NDVI_GEARY_2022_06.tif");
        let store = RasterStore::default();
        let data = Array2::from_shape_fn((10, 10), |(r, c)| (r as f64 - 4.5) * 3.3 + c as f64 / 7.0);

        assert_eq!(store.write(&path, &georef(), data.clone()).unwrap().precision, SamplePrecision::F64);
        assert_eq!(store.read(&path).unwrap().data(), &data);
    }

    #[test]
    fn test_large_file_flag_from_threshold() {
        let dir = TempDir::new().unwrap();
        let store = RasterStore::new(StoreOptions {
            bigtiff_threshold_bytes: 100,
            compress: true,
        });
        let report = store.write(dir.path().join("big.tif"), &georef(), ndvi_like(16, 16)).unwrap();
        assert!(report.bigtiff);
        assert_eq!(report.estimated_bytes, 16 * 16 * 4);
        assert_eq!(store.dimensions(dir.path().join("big.tif")).unwrap(), (16, 16));
    }

    #[test]
    fn test_read_masks_source_sentinel() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("NDVI_BerlinBB_2022_06.tif");
        let mut raster = Raster::filled(4, 4, 0.25);
        raster.set(1, 1, -9999.0).unwrap();
        raster.set_nodata(Some(-9999.0));
        // emulate an externally produced file carrying a numeric sentinel
        let mut buf = Vec::new();
        geotiff::encode_geotiff(&raster, std::io::Cursor::new(&mut buf), EncodeOptions::default()).unwrap();
        std::fs::write(&path, buf).unwrap();

        let loaded = RasterStore::default().read(&path).unwrap();
        assert_eq!(loaded.nodata(), Some(-9999.0));
        assert!(loaded.get(1, 1).unwrap().is_nan());
        assert_eq!(loaded.get(0, 0).unwrap(), 0.25);
    }

    #[test]
    fn test_read_masks_inexact_f32_sentinel() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("NDWI_BerlinBB_2022_06.tif");
        let mut raster = Raster::filled(4, 4, 0.25);
        raster.set(2, 3, -9999.9).unwrap();
        raster.set_nodata(Some(-9999.9));
        let mut buf = Vec::new();
        let options = EncodeOptions {
            precision: SamplePrecision::F32,
            ..Default::default()
        };
        geotiff::encode_geotiff(&raster, std::io::Cursor::new(&mut buf), options).unwrap();
        std::fs::write(&path, buf).unwrap();

        let loaded = RasterStore::default().read(&path).unwrap();
        assert!(loaded.is_single_precision());
        assert_eq!(loaded.nodata(), Some(-9999.9));
        assert!(loaded.get(2, 3).unwrap().is_nan());
        assert_eq!(loaded.statistics().valid_count, 15);
    }

    #[test]
    fn test_failed_rename_keeps_partial() {
        let dir = TempDir::new().unwrap();
        // a directory occupying the destination makes the rename fail
        let path = dir.path().join("NDVI_MORAN_2022_06.tif");
        std::fs::create_dir_all(path.join("occupied")).unwrap();

        let err = RasterStore::default()
            .write(&path, &georef(), ndvi_like(4, 4))
            .unwrap_err();
        match err {
            Error::Storage { temp_path, .. } => assert!(temp_path.exists()),
            other => panic!("expected storage error, got {other}"),
        }
    }
}
