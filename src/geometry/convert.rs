//! Coordinate-order conversion between storage and geometry space.
//!
//! Routes are stored the way trackers report fixes: latitude first. Polygon
//! geometry — claims, holdings, the GeoJSON territory column — uses
//! (longitude, latitude) ring order. The transposition happens in this module
//! and nowhere else; every other module works with `LatLng` or geo types and
//! never reorders a pair itself.

use geo::{Coord, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};

use super::GeometryError;

/// A GPS fix in storage order: latitude first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Convert to geometry space, where x is longitude and y is latitude.
    pub fn to_coord(self) -> Coord<f64> {
        Coord {
            x: self.lng,
            y: self.lat,
        }
    }

    /// Convert back from geometry space.
    pub fn from_coord(coord: Coord<f64>) -> Self {
        Self {
            lat: coord.y,
            lng: coord.x,
        }
    }

    pub fn is_finite(self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

/// Encode a trace as the route coordinate column: a JSON array of
/// `[lat, lng]` pairs.
pub fn trace_to_json(points: &[LatLng]) -> Result<String, GeometryError> {
    let pairs: Vec<[f64; 2]> = points.iter().map(|p| [p.lat, p.lng]).collect();
    serde_json::to_string(&pairs).map_err(|e| GeometryError::Encode(e.to_string()))
}

/// Decode the route coordinate column.
pub fn trace_from_json(json: &str) -> Result<Vec<LatLng>, GeometryError> {
    let pairs: Vec<[f64; 2]> =
        serde_json::from_str(json).map_err(|e| GeometryError::Decode(e.to_string()))?;
    Ok(pairs.iter().map(|p| LatLng::new(p[0], p[1])).collect())
}

/// Encode a holding as the territory geometry column: a GeoJSON MultiPolygon
/// with (lng, lat) rings.
pub fn holding_to_geojson(holding: &MultiPolygon<f64>) -> Result<String, GeometryError> {
    let geometry = geojson::Geometry::new(geojson::Value::from(holding));
    serde_json::to_string(&geometry).map_err(|e| GeometryError::Encode(e.to_string()))
}

/// Decode the territory geometry column. Accepts both Polygon and
/// MultiPolygon geometries; single polygons are promoted so callers only
/// ever see one shape of holding.
pub fn holding_from_geojson(json: &str) -> Result<MultiPolygon<f64>, GeometryError> {
    let geometry: geojson::Geometry =
        serde_json::from_str(json).map_err(|e| GeometryError::Decode(e.to_string()))?;
    let geometry: geo::Geometry<f64> = geo::Geometry::try_from(geometry.value)
        .map_err(|e| GeometryError::Decode(e.to_string()))?;

    match geometry {
        geo::Geometry::Polygon(polygon) => Ok(MultiPolygon::new(vec![polygon])),
        geo::Geometry::MultiPolygon(multi) => Ok(multi),
        other => Err(GeometryError::Unsupported(format!("{other:?}"))),
    }
}

/// Promote a single polygon to the holding representation.
pub fn polygon_to_holding(polygon: Polygon<f64>) -> MultiPolygon<f64> {
    MultiPolygon::new(vec![polygon])
}
