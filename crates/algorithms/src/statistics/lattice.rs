//! Coarse lattice for local autocorrelation
//!
//! Autocorrelation runs on a strided subsample of the full raster (every
//! `factor`-th row and column, starting at 0). Missing lattice cells are
//! filled, statistics are computed on the lattice and the result is expanded
//! back by block replication, cropped to the original shape.

use super::autocorrelation::{local_morans_i, GearySource, LocalGeary};
use super::weights::{Contiguity, NeighborWeights};
use habistat_core::{Error, Result};
use ndarray::{s, Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How missing lattice cells are filled before autocorrelation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingFill {
    /// Replace with 0
    #[default]
    Zero,
    /// Replace with the mean of the valid lattice cells
    Mean,
}

fn validate_factor(factor: usize) -> Result<()> {
    if factor == 0 {
        return Err(Error::InvalidParameter {
            name: "downsample",
            value: factor.to_string(),
            reason: "must be >= 1".into(),
        });
    }
    Ok(())
}

/// Every `factor`-th row and column, starting at index 0.
///
/// The result has `ceil(rows / factor) x ceil(cols / factor)` cells.
pub fn downsample(array: ArrayView2<'_, f64>, factor: usize) -> Result<Array2<f64>> {
    validate_factor(factor)?;
    let step = factor as isize;
    Ok(array.slice(s![..;step, ..;step]).to_owned())
}

/// Replace `NaN` cells according to `fill`.
///
/// Fails when the lattice holds no valid cell at all.
pub fn fill_missing(mut array: Array2<f64>, fill: MissingFill) -> Result<Array2<f64>> {
    let (sum, valid) = array
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));

    if valid == 0 {
        return Err(Error::Algorithm("lattice has no valid cells".into()));
    }

    let value = match fill {
        MissingFill::Zero => 0.0,
        MissingFill::Mean => sum / valid as f64,
    };
    array.mapv_inplace(|v| if v.is_nan() { value } else { v });
    Ok(array)
}

/// Block-replicate every cell `factor x factor` times, cropped to `shape`.
pub fn upsample(array: ArrayView2<'_, f64>, factor: usize, shape: (usize, usize)) -> Result<Array2<f64>> {
    validate_factor(factor)?;
    let (rows, cols) = shape;
    let (lr, lc) = array.dim();
    if lr * factor < rows || lc * factor < cols {
        return Err(Error::SizeMismatch {
            er: rows,
            ec: cols,
            ar: lr * factor,
            ac: lc * factor,
        });
    }
    Ok(Array2::from_shape_fn(shape, |(r, c)| array[(r / factor, c / factor)]))
}

/// A filled coarse lattice with its neighbor weights, ready for local
/// Moran and Geary.
#[derive(Debug, Clone)]
pub struct AutocorrelationLattice {
    values: Vec<f64>,
    lattice_shape: (usize, usize),
    weights: NeighborWeights,
    factor: usize,
    target_shape: (usize, usize),
}

impl AutocorrelationLattice {
    /// Subsample `array` by `factor`, fill missing cells and build
    /// row-standardized contiguity weights.
    pub fn prepare(
        array: ArrayView2<'_, f64>,
        factor: usize,
        contiguity: Contiguity,
        fill: MissingFill,
    ) -> Result<Self> {
        let target_shape = array.dim();
        let coarse = fill_missing(downsample(array, factor)?, fill)?;
        let lattice_shape = coarse.dim();
        let weights = NeighborWeights::lattice(lattice_shape.0, lattice_shape.1, contiguity)?;

        debug!(
            rows = lattice_shape.0,
            cols = lattice_shape.1,
            factor,
            ?contiguity,
            ?fill,
            "prepared autocorrelation lattice"
        );

        Ok(Self {
            values: coarse.into_iter().collect(),
            lattice_shape,
            weights,
            factor,
            target_shape,
        })
    }

    pub fn lattice_shape(&self) -> (usize, usize) {
        self.lattice_shape
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn weights(&self) -> &NeighborWeights {
        &self.weights
    }

    fn expand(&self, lattice: Vec<f64>) -> Result<Array2<f64>> {
        let coarse = Array2::from_shape_vec(self.lattice_shape, lattice).map_err(|e| Error::Other(e.to_string()))?;
        upsample(coarse.view(), self.factor, self.target_shape)
    }

    /// Local Moran's I expanded to the full raster shape
    pub fn moran(&self) -> Result<Array2<f64>> {
        self.expand(local_morans_i(&self.values, &self.weights)?)
    }

    /// Local Geary's C expanded to the full raster shape
    pub fn geary(&self, geary: &LocalGeary) -> Result<(Array2<f64>, GearySource)> {
        let (c, source) = geary.compute(&self.values, &self.weights)?;
        Ok((self.expand(c)?, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_downsample_shape_and_origin() {
        let a = Array2::from_shape_fn((12, 7), |(r, c)| (r * 100 + c) as f64);
        let d = downsample(a.view(), 5).unwrap();
        assert_eq!(d.dim(), (3, 2));
        assert_eq!(d[(0, 0)], 0.0);
        assert_eq!(d[(1, 1)], 505.0);
        assert_eq!(d[(2, 1)], 1005.0);
    }

    #[test]
    fn test_factor_zero_rejected() {
        let a = Array2::<f64>::zeros((4, 4));
        assert!(downsample(a.view(), 0).is_err());
        assert!(upsample(a.view(), 0, (4, 4)).is_err());
    }

    #[test]
    fn test_fill_zero_and_mean() {
        let a = array![[1.0, f64::NAN], [3.0, 2.0]];
        assert_eq!(fill_missing(a.clone(), MissingFill::Zero).unwrap(), array![[1.0, 0.0], [3.0, 2.0]]);
        assert_eq!(fill_missing(a, MissingFill::Mean).unwrap(), array![[1.0, 2.0], [3.0, 2.0]]);
    }

    #[test]
    fn test_fill_all_missing_is_error() {
        let a = Array2::from_elem((3, 3), f64::NAN);
        assert!(fill_missing(a, MissingFill::Zero).is_err());
    }

    #[test]
    fn test_upsample_replicates_and_crops() {
        let coarse = array![[1.0, 2.0], [3.0, 4.0]];
        let up = upsample(coarse.view(), 3, (5, 4)).unwrap();
        assert_eq!(up.dim(), (5, 4));
        assert_eq!(up[(0, 0)], 1.0);
        assert_eq!(up[(2, 2)], 1.0);
        assert_eq!(up[(2, 3)], 2.0);
        assert_eq!(up[(4, 0)], 3.0);
        assert_eq!(up[(4, 3)], 4.0);
    }

    #[test]
    fn test_upsample_too_small_is_error() {
        let coarse = array![[1.0]];
        assert!(upsample(coarse.view(), 2, (3, 1)).is_err());
    }

    #[test]
    fn test_prepare_outputs_full_shape() {
        // 23x17 with a vertical edge and a hole
        let mut a = Array2::from_shape_fn((23, 17), |(_, c)| if c < 8 { -0.2 } else { 0.6 });
        a[(5, 5)] = f64::NAN;
        let lattice = AutocorrelationLattice::prepare(a.view(), 5, Contiguity::Rook, MissingFill::Mean).unwrap();
        assert_eq!(lattice.lattice_shape(), (5, 4));
        assert!(lattice.values().iter().all(|v| v.is_finite()));

        let moran = lattice.moran().unwrap();
        assert_eq!(moran.dim(), (23, 17));
        assert!(moran.iter().all(|v| v.is_finite()));

        let (geary, _) = lattice.geary(&LocalGeary::manual()).unwrap();
        assert_eq!(geary.dim(), (23, 17));
        // block replication: the first 5x5 block shares a value
        assert_eq!(geary[(0, 0)], geary[(4, 4)]);
    }

    #[test]
    fn test_constant_raster_yields_zero() {
        let a = Array2::from_elem((20, 20), 0.4);
        let lattice = AutocorrelationLattice::prepare(a.view(), 5, Contiguity::Queen, MissingFill::Zero).unwrap();
        assert!(lattice.moran().unwrap().iter().all(|&v| v == 0.0));
        let (c, _) = lattice.geary(&LocalGeary::default()).unwrap();
        assert!(c.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_prepare_all_missing_is_error() {
        let a = Array2::from_elem((10, 10), f64::NAN);
        assert!(AutocorrelationLattice::prepare(a.view(), 5, Contiguity::Rook, MissingFill::Zero).is_err());
    }
}
