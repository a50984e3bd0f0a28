//! Local (moving window) standard deviation
//!
//! Computes the population standard deviation of the valid (non-NaN) cells
//! inside a square window centered on each cell. Windows are truncated at
//! the array border, never wrapped or padded. A window with no valid cells
//! yields `NaN`.
//!
//! Two interchangeable kernels:
//! - [`StdKernel::Generic`]: a general windowed filter that gathers the valid
//!   cells of each window and reduces them with an arbitrary function
//! - [`StdKernel::Dense`]: a two-pass accumulate kernel, rows spread over the
//!   rayon pool when the `parallel` feature is on

use crate::maybe_rayon::*;
use habistat_core::{Error, Result};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// Implementation tier for [`local_std`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StdKernel {
    /// Row-parallel dense kernel
    Dense,
    /// Windowed filter with a generic reducer
    Generic,
}

impl StdKernel {
    /// Pick the dense kernel when there is more than one worker thread to
    /// spread it over, otherwise the generic filter.
    pub fn detect() -> Self {
        if available_threads() > 1 {
            StdKernel::Dense
        } else {
            StdKernel::Generic
        }
    }
}

fn validate_window(window_size: usize) -> Result<usize> {
    if window_size == 0 || window_size % 2 == 0 {
        return Err(Error::InvalidParameter {
            name: "window_size",
            value: window_size.to_string(),
            reason: "must be an odd number >= 1".into(),
        });
    }
    Ok(window_size / 2)
}

/// Truncated window bounds `[lo, hi)` around `center` along an axis of length `len`
#[inline]
fn window_bounds(center: usize, radius: usize, len: usize) -> (usize, usize) {
    (center.saturating_sub(radius), (center + radius + 1).min(len))
}

/// Local standard deviation with the given kernel tier
pub fn local_std(array: ArrayView2<'_, f64>, window_size: usize, kernel: StdKernel) -> Result<Array2<f64>> {
    match kernel {
        StdKernel::Dense => local_std_dense(array, window_size),
        StdKernel::Generic => local_std_generic(array, window_size),
    }
}

/// Local standard deviation through [`generic_filter`]
pub fn local_std_generic(array: ArrayView2<'_, f64>, window_size: usize) -> Result<Array2<f64>> {
    generic_filter(array, window_size, nan_std)
}

/// Apply `reduce` to the valid cells of every truncated square window.
///
/// `reduce` is only called with a non-empty slice; cells whose window holds
/// no valid values are `NaN` in the output.
pub fn generic_filter<F>(array: ArrayView2<'_, f64>, window_size: usize, reduce: F) -> Result<Array2<f64>>
where
    F: Fn(&[f64]) -> f64,
{
    let radius = validate_window(window_size)?;
    let (rows, cols) = array.dim();
    let mut output = Array2::from_elem((rows, cols), f64::NAN);
    let mut values: Vec<f64> = Vec::with_capacity(window_size * window_size);

    for ((row, col), out) in output.indexed_iter_mut() {
        let (r0, r1) = window_bounds(row, radius, rows);
        let (c0, c1) = window_bounds(col, radius, cols);

        values.clear();
        for r in r0..r1 {
            for c in c0..c1 {
                let v = array[(r, c)];
                if !v.is_nan() {
                    values.push(v);
                }
            }
        }

        if !values.is_empty() {
            *out = reduce(&values);
        }
    }

    Ok(output)
}

/// Local standard deviation, dense two-pass kernel.
///
/// Each output row is computed independently, so rows are distributed over
/// the thread pool without synchronization.
pub fn local_std_dense(array: ArrayView2<'_, f64>, window_size: usize) -> Result<Array2<f64>> {
    let radius = validate_window(window_size)?;
    let (rows, cols) = array.dim();

    let output_data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            let (r0, r1) = window_bounds(row, radius, rows);

            for (col, out) in row_data.iter_mut().enumerate() {
                let (c0, c1) = window_bounds(col, radius, cols);

                let mut sum = 0.0;
                let mut count = 0usize;
                for r in r0..r1 {
                    for c in c0..c1 {
                        let v = array[(r, c)];
                        if !v.is_nan() {
                            sum += v;
                            count += 1;
                        }
                    }
                }
                if count == 0 {
                    continue;
                }
                let mean = sum / count as f64;

                let mut var = 0.0;
                for r in r0..r1 {
                    for c in c0..c1 {
                        let v = array[(r, c)];
                        if !v.is_nan() {
                            let d = v - mean;
                            var += d * d;
                        }
                    }
                }
                *out = (var / count as f64).sqrt();
            }

            row_data
        })
        .collect();

    Array2::from_shape_vec((rows, cols), output_data).map_err(|e| Error::Other(e.to_string()))
}

/// Population standard deviation of a non-empty slice
pub fn nan_std(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    var.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn gradient(rows: usize, cols: usize) -> Array2<f64> {
        Array2::from_shape_fn((rows, cols), |(r, c)| (r * cols + c) as f64)
    }

    /// Deterministic pseudo-random NDVI-like field with scattered gaps
    fn patchy(rows: usize, cols: usize) -> Array2<f64> {
        Array2::from_shape_fn((rows, cols), |(r, c)| {
            let h = (r * 7919 + c * 104_729) % 1009;
            if h % 13 == 0 {
                f64::NAN
            } else {
                (h as f64 / 1009.0) * 2.0 - 1.0
            }
        })
    }

    #[test]
    fn test_uniform_is_zero_everywhere() {
        let a = Array2::from_elem((100, 100), 1.0);
        for kernel in [StdKernel::Dense, StdKernel::Generic] {
            let out = local_std(a.view(), 11, kernel).unwrap();
            assert_eq!(out.dim(), (100, 100));
            assert!(out.iter().all(|&v| v == 0.0), "{kernel:?}");
        }
    }

    #[test]
    fn test_interior_value() {
        // 3x3 window around (5,5) of a 10x10 gradient: rows 4..=6, cols 4..=6
        let out = local_std_dense(gradient(10, 10).view(), 3).unwrap();
        let expected = nan_std(&[44.0, 45.0, 46.0, 54.0, 55.0, 56.0, 64.0, 65.0, 66.0]);
        assert_abs_diff_eq!(out[(5, 5)], expected, epsilon = 1e-12);
    }

    #[test]
    fn test_corner_uses_truncated_window() {
        let out = local_std_generic(gradient(10, 10).view(), 3).unwrap();
        let expected = nan_std(&[0.0, 1.0, 10.0, 11.0]);
        assert_abs_diff_eq!(out[(0, 0)], expected, epsilon = 1e-12);
    }

    #[test]
    fn test_missing_values_do_not_bias() {
        let mut a = Array2::from_elem((5, 5), 2.0);
        a[(2, 2)] = f64::NAN;
        a[(1, 1)] = f64::NAN;
        for kernel in [StdKernel::Dense, StdKernel::Generic] {
            let out = local_std(a.view(), 3, kernel).unwrap();
            // a NaN treated as zero would produce a non-zero deviation here
            assert_eq!(out[(2, 2)], 0.0, "{kernel:?}");
            assert_eq!(out[(1, 2)], 0.0, "{kernel:?}");
        }
    }

    #[test]
    fn test_all_missing_window_is_nan() {
        let mut a = Array2::from_elem((7, 7), 0.3);
        for r in 0..3 {
            for c in 0..3 {
                a[(r, c)] = f64::NAN;
            }
        }
        for kernel in [StdKernel::Dense, StdKernel::Generic] {
            let out = local_std(a.view(), 3, kernel).unwrap();
            assert!(out[(0, 0)].is_nan(), "{kernel:?}");
            assert!(out[(1, 1)].is_nan(), "{kernel:?}");
            assert!(!out[(2, 2)].is_nan(), "{kernel:?}");
        }
    }

    #[test]
    fn test_tiers_agree() {
        let a = patchy(37, 53);
        for window in [1, 3, 5, 11] {
            let dense = local_std_dense(a.view(), window).unwrap();
            let generic = local_std_generic(a.view(), window).unwrap();
            for (d, g) in dense.iter().zip(generic.iter()) {
                if g.is_nan() {
                    assert!(d.is_nan());
                } else {
                    assert_abs_diff_eq!(*d, *g, epsilon = 1e-9);
                }
            }
        }
    }

    #[test]
    fn test_window_one_is_zero_or_nan() {
        let a = patchy(8, 8);
        let out = local_std_dense(a.view(), 1).unwrap();
        for (v, src) in out.iter().zip(a.iter()) {
            assert_eq!(v.is_nan(), src.is_nan());
            if !v.is_nan() {
                assert_eq!(*v, 0.0);
            }
        }
    }

    #[test]
    fn test_even_or_zero_window_rejected() {
        let a = gradient(4, 4);
        assert!(local_std_dense(a.view(), 0).is_err());
        assert!(local_std_generic(a.view(), 4).is_err());
    }

    #[test]
    fn test_generic_filter_custom_reducer() {
        let a = gradient(5, 5);
        let max = generic_filter(a.view(), 3, |v| v.iter().cloned().fold(f64::NEG_INFINITY, f64::max)).unwrap();
        assert_eq!(max[(0, 0)], 6.0);
        assert_eq!(max[(4, 4)], 24.0);
    }
}
