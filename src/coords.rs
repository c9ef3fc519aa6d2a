//! Mapping from normalized estimator space into output space.

use crate::frame::Resolution;
use crate::hand::Point;

/// Translates normalized `[0, 1]²` landmark coordinates into output-space pixels.
///
/// The estimator's horizontal axis is flipped relative to the output space, so the default
/// (non-mirrored) mapping reverses `x`. In mirror mode the presented image is already flipped,
/// which cancels out: `x` maps straight through.
///
/// Coordinates are not clamped. Estimators occasionally report landmarks slightly outside
/// `[0, 1]`; those map to positions outside the output rectangle and are passed on as-is.
#[derive(Debug, Clone, Copy)]
pub struct CoordinateMapper {
    output: Resolution,
    mirror: bool,
}

impl CoordinateMapper {
    pub fn new(output: Resolution, mirror: bool) -> Self {
        Self { output, mirror }
    }

    /// Maps a normalized landmark position to output-space pixels.
    pub fn map(&self, normalized: Point) -> Point {
        let [nx, ny] = normalized;
        let x = if self.mirror { nx } else { 1.0 - nx };
        [
            x * self.output.width() as f32,
            ny * self.output.height() as f32,
        ]
    }
}
