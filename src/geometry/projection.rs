//! Local equirectangular projection for metric buffering.
//!
//! Claim corridors have a fixed width in meters, but claims and holdings are
//! stored in degrees. Buffering projects the trace into a small planar frame
//! anchored at the trace's first fix, works in meters there, and unprojects
//! the corridor back to degrees. Over the few kilometers a run covers the
//! distortion is negligible.

use geo::Coord;

/// Meters per degree of latitude (mean earth radius * pi / 180).
const METERS_PER_DEGREE: f64 = 111_319.49;

/// Planar meter frame anchored at a reference coordinate.
#[derive(Debug, Clone, Copy)]
pub struct LocalProjection {
    origin: Coord<f64>,
    lng_scale: f64,
}

impl LocalProjection {
    /// Anchor a projection at the given geometry-space coordinate.
    pub fn new(origin: Coord<f64>) -> Self {
        // Clamp so a pole-adjacent origin cannot collapse the x axis.
        let lng_scale = origin.y.to_radians().cos().max(1e-6);
        Self { origin, lng_scale }
    }

    /// Degrees (lng, lat) to local meters.
    pub fn project(&self, coord: Coord<f64>) -> Coord<f64> {
        Coord {
            x: (coord.x - self.origin.x) * METERS_PER_DEGREE * self.lng_scale,
            y: (coord.y - self.origin.y) * METERS_PER_DEGREE,
        }
    }

    /// Local meters back to degrees (lng, lat).
    pub fn unproject(&self, coord: Coord<f64>) -> Coord<f64> {
        Coord {
            x: coord.x / (METERS_PER_DEGREE * self.lng_scale) + self.origin.x,
            y: coord.y / METERS_PER_DEGREE + self.origin.y,
        }
    }
}
