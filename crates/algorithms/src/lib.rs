//! # Habistat Algorithms
//!
//! Local statistic kernels used to derive spatial-structure artefacts.
//!
//! - **statistics::focal**: local standard deviation over a square window
//! - **statistics::weights**: row-standardized lattice contiguity weights
//! - **statistics::autocorrelation**: local Moran's I and tiered local Geary's C
//! - **statistics::lattice**: downsampled lattices for autocorrelation

mod maybe_rayon;
pub mod statistics;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::statistics::{
        local_std, local_morans_i, AutocorrelationLattice, Contiguity, GearyField, LocalGeary,
        MissingFill, NeighborWeights, StdKernel,
    };
    pub use habistat_core::prelude::*;
}
