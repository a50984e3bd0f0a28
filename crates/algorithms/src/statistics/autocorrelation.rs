//! Local spatial autocorrelation over a neighbor-weighted lattice
//!
//! - **Local Moran's I**: `I_i = z_i / m2 * sum_j w_ij z_j`, with
//!   `z = y - mean(y)` and `m2 = sum(z^2) / n`
//! - **Local Geary's C**: resolved through tiers. A [`GearyBackend`] declares
//!   which result fields it fills; [`LocalGeary`] picks the first candidate
//!   field the backend provides once, at construction, and falls through to
//!   the closed-form estimator whenever the backend fails or hands back
//!   something unusable.
//!
//! The tiers do not share a scale. The closed-form estimator is
//! `C_i = (N - 1) / (2W) * sum_j w_ij (y_i - y_j)^2 / var(y)`, while the
//! built-in [`LatticeGeary`] reports `localG = sum_j w_ij (z_i - z_j)^2`
//! without the `(N - 1) / (2W)` factor. With row-standardized weights
//! (`W = N`) a `localG` value is about twice the closed-form one, so compare
//! artefacts only when [`GearySource`] matches.
//!
//! Inputs must be finite: missing lattice cells are filled before they get
//! here (see [`super::lattice`]).

use super::weights::NeighborWeights;
use habistat_core::{Error, Result};
use tracing::{debug, warn};

fn check_inputs(values: &[f64], weights: &NeighborWeights) -> Result<()> {
    if values.len() != weights.len() {
        return Err(Error::Algorithm(format!(
            "{} values for a weight structure over {} cells",
            values.len(),
            weights.len()
        )));
    }
    if values.is_empty() {
        return Err(Error::Algorithm("empty lattice".into()));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(Error::Algorithm("non-finite value in autocorrelation input".into()));
    }
    Ok(())
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance
fn variance(values: &[f64]) -> f64 {
    let m = mean(values);
    values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64
}

/// Local Moran's I for every lattice cell.
///
/// A constant lattice has no deviation to correlate and yields 0 everywhere.
pub fn local_morans_i(values: &[f64], weights: &NeighborWeights) -> Result<Vec<f64>> {
    check_inputs(values, weights)?;
    weights.validate()?;

    let m = mean(values);
    let z: Vec<f64> = values.iter().map(|v| v - m).collect();
    let m2 = z.iter().map(|d| d * d).sum::<f64>() / z.len() as f64;

    if m2 <= f64::EPSILON {
        return Ok(vec![0.0; z.len()]);
    }

    Ok((0..z.len()).map(|i| z[i] / m2 * weights.lag(i, &z)).collect())
}

/// Closed-form local Geary's C:
/// `C_i = (N - 1) / (2W) * sum_j w_ij (y_i - y_j)^2 / Var(y)`
///
/// `W` is the total weight and `Var` the population variance. A constant
/// lattice yields 0 everywhere.
pub fn manual_local_geary(values: &[f64], weights: &NeighborWeights) -> Result<Vec<f64>> {
    check_inputs(values, weights)?;
    weights.validate()?;

    let n = values.len() as f64;
    let total_weight = weights.total_weight();
    let var = variance(values);

    if var <= f64::EPSILON || total_weight <= 0.0 {
        return Ok(vec![0.0; values.len()]);
    }

    let scale = (n - 1.0) / (2.0 * total_weight) / var;
    Ok((0..values.len())
        .map(|i| {
            let yi = values[i];
            let dissimilarity: f64 = weights
                .neighbors(i)
                .map(|(j, w)| w * (yi - values[j]) * (yi - values[j]))
                .sum();
            scale * dissimilarity
        })
        .collect())
}

/// Result fields a Geary backend can expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GearyField {
    /// Per-cell statistic under the name `Cs`
    Cs,
    /// Per-cell statistic under the name `localG`
    LocalG,
}

impl GearyField {
    /// Candidate fields, in order of preference
    pub const CANDIDATES: [GearyField; 2] = [GearyField::Cs, GearyField::LocalG];

    pub fn as_str(self) -> &'static str {
        match self {
            GearyField::Cs => "Cs",
            GearyField::LocalG => "localG",
        }
    }
}

/// Fields filled by one backend run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GearyOutput {
    pub cs: Option<Vec<f64>>,
    pub local_g: Option<Vec<f64>>,
}

impl GearyOutput {
    pub fn field(&self, field: GearyField) -> Option<&[f64]> {
        match field {
            GearyField::Cs => self.cs.as_deref(),
            GearyField::LocalG => self.local_g.as_deref(),
        }
    }
}

/// A library-grade local Geary implementation.
pub trait GearyBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Fields this backend fills in [`GearyOutput`]
    fn provides(&self) -> &[GearyField];

    fn compute(&self, values: &[f64], weights: &NeighborWeights) -> Result<GearyOutput>;
}

/// Built-in backend: `G_i = sum_j w_ij (z_i - z_j)^2` over standardized values,
/// reported as `localG`. Unscaled, so roughly `2N / (N - 1)` times the
/// closed-form estimate.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatticeGeary;

impl GearyBackend for LatticeGeary {
    fn name(&self) -> &str {
        "lattice"
    }

    fn provides(&self) -> &[GearyField] {
        &[GearyField::LocalG]
    }

    fn compute(&self, values: &[f64], weights: &NeighborWeights) -> Result<GearyOutput> {
        check_inputs(values, weights)?;
        weights.validate()?;

        let m = mean(values);
        let sd = variance(values).sqrt();
        let local_g = if sd <= f64::EPSILON {
            vec![0.0; values.len()]
        } else {
            let z: Vec<f64> = values.iter().map(|v| (v - m) / sd).collect();
            (0..z.len())
                .map(|i| {
                    weights
                        .neighbors(i)
                        .map(|(j, w)| w * (z[i] - z[j]) * (z[i] - z[j]))
                        .sum()
                })
                .collect()
        };

        Ok(GearyOutput {
            cs: None,
            local_g: Some(local_g),
        })
    }
}

/// Which tier a [`LocalGeary`] will try first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GearyTier {
    /// Read `field` from the backend's output
    Backend(GearyField),
    /// Closed-form estimator only
    Manual,
}

/// Where a computed Geary array came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GearySource {
    Backend(GearyField),
    Manual,
}

/// Tiered local Geary's C.
pub struct LocalGeary {
    backend: Option<Box<dyn GearyBackend>>,
    tier: GearyTier,
}

impl std::fmt::Debug for LocalGeary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalGeary")
            .field("backend", &self.backend.as_ref().map(|b| b.name().to_string()))
            .field("tier", &self.tier)
            .finish()
    }
}

impl Default for LocalGeary {
    fn default() -> Self {
        Self::with_backend(Box::new(LatticeGeary))
    }
}

impl LocalGeary {
    /// Resolve the tier for `backend` once: the first candidate field it provides
    pub fn with_backend(backend: Box<dyn GearyBackend>) -> Self {
        let tier = GearyField::CANDIDATES
            .into_iter()
            .find(|field| backend.provides().contains(field))
            .map_or(GearyTier::Manual, GearyTier::Backend);
        debug!(backend = backend.name(), ?tier, "resolved local Geary tier");
        Self {
            backend: Some(backend),
            tier,
        }
    }

    /// Closed-form estimator only
    pub fn manual() -> Self {
        Self {
            backend: None,
            tier: GearyTier::Manual,
        }
    }

    pub fn tier(&self) -> GearyTier {
        self.tier
    }

    /// Compute local Geary's C, falling back to the closed-form estimator
    /// when the backend errors or its output lacks a usable field.
    pub fn compute(&self, values: &[f64], weights: &NeighborWeights) -> Result<(Vec<f64>, GearySource)> {
        if let (GearyTier::Backend(field), Some(backend)) = (self.tier, &self.backend) {
            match backend.compute(values, weights) {
                Ok(output) => match output.field(field) {
                    Some(c) if c.len() == values.len() && c.iter().all(|v| v.is_finite()) => {
                        return Ok((c.to_vec(), GearySource::Backend(field)));
                    }
                    Some(_) => warn!(
                        backend = backend.name(),
                        field = field.as_str(),
                        "backend result has wrong length or non-finite values; using closed form"
                    ),
                    None => warn!(
                        backend = backend.name(),
                        field = field.as_str(),
                        "backend did not fill its declared field; using closed form"
                    ),
                },
                Err(e) => warn!(
                    backend = backend.name(),
                    error = %e,
                    "backend failed; using closed form"
                ),
            }
        }

        manual_local_geary(values, weights).map(|c| (c, GearySource::Manual))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::weights::Contiguity;
    use approx::assert_abs_diff_eq;

    fn split_lattice() -> (Vec<f64>, NeighborWeights) {
        // 6x6, left half 0, right half 1
        let values: Vec<f64> = (0..36).map(|i| if i % 6 < 3 { 0.0 } else { 1.0 }).collect();
        let w = NeighborWeights::lattice(6, 6, Contiguity::Rook).unwrap();
        (values, w)
    }

    fn checkerboard() -> (Vec<f64>, NeighborWeights) {
        let values: Vec<f64> = (0..36).map(|i| ((i / 6 + i % 6) % 2) as f64).collect();
        let w = NeighborWeights::lattice(6, 6, Contiguity::Rook).unwrap();
        (values, w)
    }

    struct Failing;
    impl GearyBackend for Failing {
        fn name(&self) -> &str {
            "failing"
        }
        fn provides(&self) -> &[GearyField] {
            &[GearyField::Cs]
        }
        fn compute(&self, _: &[f64], _: &NeighborWeights) -> Result<GearyOutput> {
            Err(Error::Algorithm("boom".into()))
        }
    }

    /// Declares `Cs` but fills nothing, like a renamed attribute
    struct Renamed;
    impl GearyBackend for Renamed {
        fn name(&self) -> &str {
            "renamed"
        }
        fn provides(&self) -> &[GearyField] {
            &[GearyField::Cs]
        }
        fn compute(&self, _: &[f64], _: &NeighborWeights) -> Result<GearyOutput> {
            Ok(GearyOutput::default())
        }
    }

    /// Exposes no known field at all
    struct Opaque;
    impl GearyBackend for Opaque {
        fn name(&self) -> &str {
            "opaque"
        }
        fn provides(&self) -> &[GearyField] {
            &[]
        }
        fn compute(&self, _: &[f64], _: &NeighborWeights) -> Result<GearyOutput> {
            panic!("never called when no field is provided");
        }
    }

    struct Primary;
    impl GearyBackend for Primary {
        fn name(&self) -> &str {
            "primary"
        }
        fn provides(&self) -> &[GearyField] {
            &[GearyField::LocalG, GearyField::Cs]
        }
        fn compute(&self, values: &[f64], _: &NeighborWeights) -> Result<GearyOutput> {
            Ok(GearyOutput {
                cs: Some(vec![7.0; values.len()]),
                local_g: Some(vec![9.0; values.len()]),
            })
        }
    }

    #[test]
    fn test_moran_positive_for_clusters() {
        let (values, w) = split_lattice();
        let i = local_morans_i(&values, &w).unwrap();
        assert_eq!(i.len(), 36);
        // interior of each half is surrounded by like values
        assert!(i[7] > 0.0);
        assert!(i[10] > 0.0);
    }

    #[test]
    fn test_moran_negative_for_checkerboard() {
        let (values, w) = checkerboard();
        let i = local_morans_i(&values, &w).unwrap();
        assert!(i.iter().all(|&v| v < 0.0));
    }

    #[test]
    fn test_moran_constant_is_zero() {
        let w = NeighborWeights::lattice(4, 4, Contiguity::Queen).unwrap();
        let i = local_morans_i(&[0.5; 16], &w).unwrap();
        assert!(i.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_moran_rejects_nan_and_length_mismatch() {
        let w = NeighborWeights::lattice(2, 2, Contiguity::Rook).unwrap();
        assert!(local_morans_i(&[0.0, f64::NAN, 1.0, 2.0], &w).is_err());
        assert!(local_morans_i(&[0.0, 1.0], &w).is_err());
    }

    #[test]
    fn test_manual_geary_known_value() {
        // 1x3 line [0, 1, 2], rook: w01 = 1, w10 = w12 = 0.5, w21 = 1
        let w = NeighborWeights::lattice(1, 3, Contiguity::Rook).unwrap();
        let c = manual_local_geary(&[0.0, 1.0, 2.0], &w).unwrap();
        // N = 3, W = 3, Var = 2/3 -> scale = 2 / 6 / (2/3) = 0.5
        assert_abs_diff_eq!(c[0], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(c[1], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(c[2], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_manual_geary_dissimilar_is_larger() {
        let (split, w) = split_lattice();
        let (checker, _) = checkerboard();
        let smooth = manual_local_geary(&split, &w).unwrap();
        let rough = manual_local_geary(&checker, &w).unwrap();
        assert!(rough[14] > smooth[14]);
        assert_eq!(smooth[7], 0.0);
    }

    #[test]
    fn test_lattice_tier_is_unscaled_manual() {
        let (values, w) = split_lattice();
        let n = values.len() as f64;
        let manual = manual_local_geary(&values, &w).unwrap();
        let (local_g, _) = LocalGeary::default().compute(&values, &w).unwrap();
        // row-standardized: W = N, so localG = 2N / (N - 1) * C
        for (g, c) in local_g.iter().zip(&manual) {
            assert_abs_diff_eq!(*g, c * 2.0 * n / (n - 1.0), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_default_resolves_to_alternate_field() {
        let geary = LocalGeary::default();
        assert_eq!(geary.tier(), GearyTier::Backend(GearyField::LocalG));
        let (values, w) = checkerboard();
        let (c, source) = geary.compute(&values, &w).unwrap();
        assert_eq!(source, GearySource::Backend(GearyField::LocalG));
        assert_eq!(c.len(), values.len());
    }

    #[test]
    fn test_primary_field_preferred() {
        let geary = LocalGeary::with_backend(Box::new(Primary));
        assert_eq!(geary.tier(), GearyTier::Backend(GearyField::Cs));
        let (values, w) = checkerboard();
        let (c, _) = geary.compute(&values, &w).unwrap();
        assert!(c.iter().all(|&v| v == 7.0));
    }

    #[test]
    fn test_failing_backend_falls_back() {
        let (values, w) = checkerboard();
        let (c, source) = LocalGeary::with_backend(Box::new(Failing)).compute(&values, &w).unwrap();
        assert_eq!(source, GearySource::Manual);
        assert_eq!(c, manual_local_geary(&values, &w).unwrap());
    }

    #[test]
    fn test_missing_field_falls_back() {
        let (values, w) = split_lattice();
        let (c, source) = LocalGeary::with_backend(Box::new(Renamed)).compute(&values, &w).unwrap();
        assert_eq!(source, GearySource::Manual);
        assert_eq!(c.len(), values.len());
    }

    #[test]
    fn test_no_known_field_resolves_to_manual() {
        let geary = LocalGeary::with_backend(Box::new(Opaque));
        assert_eq!(geary.tier(), GearyTier::Manual);
        let (values, w) = split_lattice();
        let (c, source) = geary.compute(&values, &w).unwrap();
        assert_eq!(source, GearySource::Manual);
        assert_eq!(c.len(), 36);
    }

    #[test]
    fn test_all_tiers_failing_is_error() {
        let w = NeighborWeights::lattice(2, 2, Contiguity::Rook).unwrap();
        let geary = LocalGeary::with_backend(Box::new(Failing));
        assert!(geary.compute(&[1.0, 2.0, 3.0], &w).is_err());
    }
}
