//! Geometry support for the conquest engine.
//!
//! Owns the coordinate-order seam between route storage (lat, lng) and
//! polygon geometry (lng, lat), the local metric projection used for claim
//! buffering, and guarded boolean operations over holdings.

pub mod convert;
pub mod ops;
pub mod projection;

pub use convert::{
    holding_from_geojson, holding_to_geojson, trace_from_json, trace_to_json, LatLng,
};
pub use ops::{area_m2, difference, intersection, union};
pub use projection::LocalProjection;

use thiserror::Error;

/// Errors from geometry encoding and decoding.
///
/// Boolean-op failures are deliberately not errors: degenerate pairings are
/// skipped by the caller, never propagated (see `ops`).
#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("Failed to encode geometry: {0}")]
    Encode(String),

    #[error("Failed to decode geometry: {0}")]
    Decode(String),

    #[error("Unsupported geometry type: {0}")]
    Unsupported(String),
}
