//! Affine geotransformation for rasters

use serde::{Deserialize, Serialize};

/// Affine transformation coefficients for georeferencing rasters.
///
/// Converts between pixel coordinates (col, row) and geographic coordinates (x, y):
/// ```text
/// x = origin_x + col * pixel_width + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
///
/// For north-up images, `row_rotation` and `col_rotation` are 0 and
/// `pixel_height` is negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X coordinate of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner
    pub origin_y: f64,
    /// Pixel width (cell size in X direction)
    pub pixel_width: f64,
    /// Pixel height (cell size in Y direction, usually negative)
    pub pixel_height: f64,
    /// Rotation term applied per row to X
    pub row_rotation: f64,
    /// Rotation term applied per column to Y
    pub col_rotation: f64,
}

impl GeoTransform {
    /// Create a new GeoTransform with no rotation (north-up image)
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
            row_rotation: 0.0,
            col_rotation: 0.0,
        }
    }

    /// Build from GeoTIFF ModelPixelScale (33550) and ModelTiepoint (33922) values.
    ///
    /// Returns `None` if either tag is too short.
    pub fn from_scale_tiepoint(scale: &[f64], tiepoint: &[f64]) -> Option<Self> {
        if scale.len() < 2 || tiepoint.len() < 6 {
            return None;
        }
        // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
        let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
        let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
        Some(Self::new(origin_x, origin_y, scale[0], -scale[1]))
    }

    /// Build from a GeoTIFF ModelTransformation (34264) row-major 4x4 matrix
    pub fn from_model_transformation(m: &[f64]) -> Option<Self> {
        if m.len() < 16 {
            return None;
        }
        Some(Self {
            origin_x: m[3],
            origin_y: m[7],
            pixel_width: m[0],
            pixel_height: m[5],
            row_rotation: m[1],
            col_rotation: m[4],
        })
    }

    /// ModelPixelScale values for a north-up transform
    pub fn to_scale(&self) -> [f64; 3] {
        [self.pixel_width, self.pixel_height.abs(), 0.0]
    }

    /// ModelTiepoint values anchoring pixel (0, 0) at the origin
    pub fn to_tiepoint(&self) -> [f64; 6] {
        [0.0, 0.0, 0.0, self.origin_x, self.origin_y, 0.0]
    }

    /// ModelTransformation matrix, used when the transform is rotated
    pub fn to_model_transformation(&self) -> [f64; 16] {
        [
            self.pixel_width, self.row_rotation, 0.0, self.origin_x,
            self.col_rotation, self.pixel_height, 0.0, self.origin_y,
            0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ]
    }

    /// Geographic position of a pixel-grid corner at fractional (col, row)
    fn corner_to_geo(&self, col: f64, row: f64) -> (f64, f64) {
        let x = self.origin_x + col * self.pixel_width + row * self.row_rotation;
        let y = self.origin_y + col * self.col_rotation + row * self.pixel_height;
        (x, y)
    }

    /// Check if this is a north-up image (no rotation)
    pub fn is_north_up(&self) -> bool {
        self.row_rotation.abs() < 1e-10
            && self.col_rotation.abs() < 1e-10
            && self.pixel_height < 0.0
    }

    /// Bounding box (min_x, min_y, max_x, max_y) for a raster of given dimensions
    pub fn bounds(&self, width: usize, height: usize) -> (f64, f64, f64, f64) {
        let (w, h) = (width as f64, height as f64);
        let corners = [
            self.corner_to_geo(0.0, 0.0),
            self.corner_to_geo(w, 0.0),
            self.corner_to_geo(0.0, h),
            self.corner_to_geo(w, h),
        ];

        corners.iter().fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(min_x, min_y, max_x, max_y), &(x, y)| {
                (min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y))
            },
        )
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}
