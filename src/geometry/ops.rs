//! Guarded boolean operations over holdings.
//!
//! A degenerate pairing must never abort a whole route's processing: every
//! operation here validates its inputs and returns `None` for an unusable
//! pairing. Callers log the skip and continue with the remaining rivals.
//! An *empty* result is not a failure — for `difference` it means the
//! holding was fully consumed.

use geo::{BooleanOps, ChamberlainDuquetteArea, CoordsIter, MultiPolygon};

/// Geodesic area of a holding in square meters.
///
/// Holdings are (lng, lat) degree rings, so planar area would be meaningless;
/// this uses the Chamberlain–Duquette spherical algorithm.
pub fn area_m2(holding: &MultiPolygon<f64>) -> f64 {
    holding.chamberlain_duquette_unsigned_area()
}

/// Intersection of two holdings, or `None` when either side is unusable.
pub fn intersection(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> Option<MultiPolygon<f64>> {
    if !usable(a) || !usable(b) {
        return None;
    }
    Some(a.intersection(b))
}

/// Union of two holdings, or `None` when either side is unusable.
pub fn union(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> Option<MultiPolygon<f64>> {
    if !usable(a) || !usable(b) {
        return None;
    }
    Some(a.union(b))
}

/// What remains of `a` after subtracting `b`, or `None` when either side is
/// unusable. An empty result means `a` was fully consumed.
pub fn difference(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> Option<MultiPolygon<f64>> {
    if !usable(a) || !usable(b) {
        return None;
    }
    Some(a.difference(b))
}

fn usable(holding: &MultiPolygon<f64>) -> bool {
    !holding.0.is_empty()
        && holding
            .coords_iter()
            .all(|c| c.x.is_finite() && c.y.is_finite())
}
