//! # Habistat Tiling
//!
//! Bounded-memory evaluation of neighborhood kernels.
//!
//! A large array is cut into square tiles; each tile is widened by a halo
//! of `radius` cells wherever it has a neighbor, the kernel runs on the
//! padded view and only the tile's own extent is copied into the output.
//! The stitched result equals the untiled computation.

pub mod tiled;

pub use tiled::{compute_tiled, compute_tiled_with_progress, Tile, TileGrid};
