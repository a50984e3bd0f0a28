//! Tiled processing for large rasters

use habistat_core::{Error, Result};
use ndarray::{s, Array2, ArrayView2};
use std::ops::Range;
use tracing::debug;

/// Tiles between two progress log lines
const PROGRESS_LOG_EVERY: usize = 16;

/// A tile of the output grid and the padded window it is computed from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    /// Row offset of the tile in the source array
    pub row_offset: usize,
    /// Column offset of the tile in the source array
    pub col_offset: usize,
    /// Rows owned by this tile
    pub rows: usize,
    /// Columns owned by this tile
    pub cols: usize,
    /// Rows of halo above the tile (0 on the top border)
    pub halo_top: usize,
    /// Columns of halo left of the tile (0 on the left border)
    pub halo_left: usize,
    /// Rows of halo below the tile (0 on the bottom border)
    pub halo_bottom: usize,
    /// Columns of halo right of the tile (0 on the right border)
    pub halo_right: usize,
}

impl Tile {
    /// Source rows covered by the padded window
    pub fn padded_rows(&self) -> Range<usize> {
        self.row_offset - self.halo_top..self.row_offset + self.rows + self.halo_bottom
    }

    /// Source columns covered by the padded window
    pub fn padded_cols(&self) -> Range<usize> {
        self.col_offset - self.halo_left..self.col_offset + self.cols + self.halo_right
    }

    /// Shape of the padded window
    pub fn padded_shape(&self) -> (usize, usize) {
        (
            self.rows + self.halo_top + self.halo_bottom,
            self.cols + self.halo_left + self.halo_right,
        )
    }

    /// The tile's own extent, in padded-window coordinates
    pub fn interior(&self) -> (Range<usize>, Range<usize>) {
        (
            self.halo_top..self.halo_top + self.rows,
            self.halo_left..self.halo_left + self.cols,
        )
    }
}

/// Row-major partition of a `rows x cols` array into tiles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    total_rows: usize,
    total_cols: usize,
    tile_size: usize,
    radius: usize,
}

impl TileGrid {
    pub fn new(total_rows: usize, total_cols: usize, tile_size: usize, radius: usize) -> Result<Self> {
        if tile_size == 0 {
            return Err(Error::InvalidParameter {
                name: "tile_size",
                value: tile_size.to_string(),
                reason: "must be > 0".into(),
            });
        }
        Ok(Self {
            total_rows,
            total_cols,
            tile_size,
            radius,
        })
    }

    /// Tiles along (rows, cols)
    pub fn dims(&self) -> (usize, usize) {
        (
            self.total_rows.div_ceil(self.tile_size),
            self.total_cols.div_ceil(self.tile_size),
        )
    }

    /// Total number of tiles
    pub fn len(&self) -> usize {
        let (tr, tc) = self.dims();
        tr * tc
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tile at grid position (`tile_row`, `tile_col`)
    pub fn tile(&self, tile_row: usize, tile_col: usize) -> Tile {
        let row_offset = tile_row * self.tile_size;
        let col_offset = tile_col * self.tile_size;
        let rows = self.tile_size.min(self.total_rows - row_offset);
        let cols = self.tile_size.min(self.total_cols - col_offset);

        Tile {
            row_offset,
            col_offset,
            rows,
            cols,
            halo_top: self.radius.min(row_offset),
            halo_left: self.radius.min(col_offset),
            halo_bottom: self.radius.min(self.total_rows - row_offset - rows),
            halo_right: self.radius.min(self.total_cols - col_offset - cols),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Tile> + '_ {
        let (tr, tc) = self.dims();
        (0..tr).flat_map(move |r| (0..tc).map(move |c| self.tile(r, c)))
    }
}

/// Evaluate `kernel` tile by tile and stitch the interiors together.
///
/// `kernel` receives each padded window and must return an array of the
/// same shape. `radius` must be at least the kernel's neighborhood radius
/// for the result to equal an untiled evaluation.
pub fn compute_tiled<F>(array: ArrayView2<'_, f64>, tile_size: usize, radius: usize, kernel: F) -> Result<Array2<f64>>
where
    F: FnMut(ArrayView2<'_, f64>) -> Result<Array2<f64>>,
{
    compute_tiled_with_progress(array, tile_size, radius, kernel, |_, _| {})
}

/// [`compute_tiled`] with `on_tile(done, total)` called after every tile
pub fn compute_tiled_with_progress<F, P>(
    array: ArrayView2<'_, f64>,
    tile_size: usize,
    radius: usize,
    mut kernel: F,
    mut on_tile: P,
) -> Result<Array2<f64>>
where
    F: FnMut(ArrayView2<'_, f64>) -> Result<Array2<f64>>,
    P: FnMut(usize, usize),
{
    let (rows, cols) = array.dim();
    let grid = TileGrid::new(rows, cols, tile_size, radius)?;
    let total = grid.len();
    let mut output = Array2::from_elem((rows, cols), f64::NAN);

    debug!(rows, cols, tile_size, radius, tiles = total, "tiled computation started");

    for (done, tile) in grid.iter().enumerate() {
        let padded = array.slice(s![tile.padded_rows(), tile.padded_cols()]);
        let result = kernel(padded)?;

        let (er, ec) = tile.padded_shape();
        if result.dim() != (er, ec) {
            let (ar, ac) = result.dim();
            return Err(Error::SizeMismatch { er, ec, ar, ac });
        }

        let (ir, ic) = tile.interior();
        output
            .slice_mut(s![
                tile.row_offset..tile.row_offset + tile.rows,
                tile.col_offset..tile.col_offset + tile.cols
            ])
            .assign(&result.slice(s![ir, ic]));

        let done = done + 1;
        on_tile(done, total);
        if done % PROGRESS_LOG_EVERY == 0 || done == total {
            debug!(
                done,
                total,
                pct = format_args!("{:.1}", done as f64 * 100.0 / total as f64),
                "tile done"
            );
        }
    }

    Ok(output)
}
