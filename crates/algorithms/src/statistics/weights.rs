//! Row-standardized contiguity weights over a regular lattice
//!
//! Cells are numbered row-major (`i = row * cols + col`). Every cell's
//! weights sum to 1; a cell without neighbors (only possible on a 1x1
//! lattice) is an island with an empty row.

use habistat_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Which lattice cells count as neighbors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Contiguity {
    /// Shared edge: 4 neighbors
    #[default]
    Rook,
    /// Shared edge or corner: 8 neighbors
    Queen,
}

impl Contiguity {
    fn offsets(self) -> &'static [(isize, isize)] {
        match self {
            Contiguity::Rook => &[(-1, 0), (0, -1), (0, 1), (1, 0)],
            Contiguity::Queen => &[
                (-1, -1), (-1, 0), (-1, 1),
                (0, -1), (0, 1),
                (1, -1), (1, 0), (1, 1),
            ],
        }
    }
}

/// Sparse neighbor weights in compressed-row form.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborWeights {
    n: usize,
    /// `row_ptr[i]..row_ptr[i + 1]` indexes the neighbors of cell `i`
    row_ptr: Vec<usize>,
    neighbors: Vec<usize>,
    weights: Vec<f64>,
}

impl NeighborWeights {
    /// Row-standardized contiguity weights for a `rows x cols` lattice
    pub fn lattice(rows: usize, cols: usize, contiguity: Contiguity) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }

        let n = rows * cols;
        let offsets = contiguity.offsets();
        let mut row_ptr = Vec::with_capacity(n + 1);
        let mut neighbors = Vec::with_capacity(n * offsets.len());
        let mut weights = Vec::with_capacity(n * offsets.len());
        row_ptr.push(0);

        for row in 0..rows {
            for col in 0..cols {
                let start = neighbors.len();
                for &(dr, dc) in offsets {
                    let nr = row as isize + dr;
                    let nc = col as isize + dc;
                    if nr >= 0 && nc >= 0 && (nr as usize) < rows && (nc as usize) < cols {
                        neighbors.push(nr as usize * cols + nc as usize);
                    }
                }
                let k = neighbors.len() - start;
                if k > 0 {
                    let w = 1.0 / k as f64;
                    weights.extend(std::iter::repeat_n(w, k));
                }
                row_ptr.push(neighbors.len());
            }
        }

        Ok(Self {
            n,
            row_ptr,
            neighbors,
            weights,
        })
    }

    /// Build from raw compressed-row parts, validating the structure
    pub fn from_parts(row_ptr: Vec<usize>, neighbors: Vec<usize>, weights: Vec<f64>) -> Result<Self> {
        let n = row_ptr.len().saturating_sub(1);
        let w = Self {
            n,
            row_ptr,
            neighbors,
            weights,
        };
        w.validate()?;
        Ok(w)
    }

    /// Check that the structure is well formed and row-standardized.
    pub fn validate(&self) -> Result<()> {
        let malformed = |reason: String| Error::Algorithm(format!("malformed neighbor weights: {reason}"));

        if self.row_ptr.len() != self.n + 1 || self.row_ptr.first() != Some(&0) {
            return Err(malformed("row pointer length".into()));
        }
        if self.neighbors.len() != self.weights.len()
            || self.row_ptr.last() != Some(&self.neighbors.len())
        {
            return Err(malformed("neighbor and weight arrays disagree".into()));
        }
        for i in 0..self.n {
            let (start, end) = (self.row_ptr[i], self.row_ptr[i + 1]);
            if start > end {
                return Err(malformed(format!("row {i} has negative extent")));
            }
            if self.neighbors[start..end].iter().any(|&j| j >= self.n || j == i) {
                return Err(malformed(format!("row {i} references an invalid neighbor")));
            }
            if start < end {
                let sum: f64 = self.weights[start..end].iter().sum();
                if (sum - 1.0).abs() > 1e-9 {
                    return Err(malformed(format!("row {i} sums to {sum}")));
                }
            }
        }
        Ok(())
    }

    /// Number of cells
    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// (neighbor index, weight) pairs of cell `i`
    pub fn neighbors(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let (start, end) = (self.row_ptr[i], self.row_ptr[i + 1]);
        self.neighbors[start..end]
            .iter()
            .copied()
            .zip(self.weights[start..end].iter().copied())
    }

    /// Sum of all weights (S0); equals the number of non-island cells
    pub fn total_weight(&self) -> f64 {
        self.weights.iter().sum()
    }

    /// Weighted sum of `values` over the neighbors of cell `i` (spatial lag)
    pub fn lag(&self, i: usize, values: &[f64]) -> f64 {
        self.neighbors(i).map(|(j, w)| w * values[j]).sum()
    }
}
