//! Local statistics for raster data
//!
//! - **focal**: local standard deviation over a moving square window
//! - **weights**: lattice neighbor weights (rook / queen contiguity)
//! - **autocorrelation**: local Moran's I, local Geary's C
//! - **lattice**: downsample / fill / upsample around the autocorrelation kernels

pub mod autocorrelation;
pub mod focal;
pub mod lattice;
pub mod weights;

pub use autocorrelation::{
    local_morans_i, manual_local_geary, GearyBackend, GearyField, GearyOutput, GearySource,
    GearyTier, LatticeGeary, LocalGeary,
};
pub use focal::{generic_filter, local_std, local_std_dense, local_std_generic, StdKernel};
pub use lattice::{downsample, fill_missing, upsample, AutocorrelationLattice, MissingFill};
pub use weights::{Contiguity, NeighborWeights};
