//! Claim corridor construction.
//!
//! A simplified trace becomes a fixed-width buffered band: one circle per
//! fix plus one rectangle per segment, unioned in a local meter frame and
//! unprojected back to degrees. The radius is a system constant, not a user
//! setting.

use geo::{BooleanOps, Coord, LineString, MapCoords, MultiPolygon, Polygon};

use crate::geometry::{ops, LatLng, LocalProjection};
use crate::territory::types::Claim;

/// Corridor half-width in meters.
pub const CLAIM_RADIUS_M: f64 = 50.0;

/// Vertex count used to approximate the circular caps.
const ARC_SEGMENTS: usize = 24;

/// Build the claim corridor for a simplified trace.
///
/// Fewer than 3 usable fixes produce no claim — the route is stored with
/// zero territory effect, which is normal rather than an error.
pub fn build_claim(points: &[LatLng]) -> Option<Claim> {
    let coords: Vec<Coord<f64>> = points
        .iter()
        .filter(|p| p.is_finite())
        .map(|p| p.to_coord())
        .collect();

    if coords.len() < 3 {
        return None;
    }

    let projection = LocalProjection::new(coords[0]);
    let local: Vec<Coord<f64>> = coords.iter().map(|&c| projection.project(c)).collect();

    let mut pieces: Vec<Polygon<f64>> = Vec::with_capacity(local.len() * 2);
    for &center in &local {
        pieces.push(circle(center, CLAIM_RADIUS_M));
    }
    for pair in local.windows(2) {
        if let Some(band) = segment_band(pair[0], pair[1], CLAIM_RADIUS_M) {
            pieces.push(band);
        }
    }

    let mut corridor = MultiPolygon::new(vec![pieces[0].clone()]);
    for piece in pieces.iter().skip(1) {
        corridor = corridor.union(&MultiPolygon::new(vec![piece.clone()]));
    }

    let corridor = corridor.map_coords(|c| projection.unproject(c));
    let area_m2 = ops::area_m2(&corridor);
    if !area_m2.is_finite() || area_m2 <= 0.0 {
        tracing::warn!(area_m2, "claim corridor degenerated, dropping claim");
        return None;
    }

    Some(Claim {
        geometry: corridor,
        area_m2,
    })
}

fn circle(center: Coord<f64>, radius: f64) -> Polygon<f64> {
    let mut ring: Vec<Coord<f64>> = (0..ARC_SEGMENTS)
        .map(|i| {
            let angle = (i as f64) * std::f64::consts::TAU / (ARC_SEGMENTS as f64);
            Coord {
                x: center.x + radius * angle.cos(),
                y: center.y + radius * angle.sin(),
            }
        })
        .collect();
    ring.push(ring[0]);
    Polygon::new(LineString::from(ring), vec![])
}

/// Rectangle covering one segment at full corridor width. Zero-length
/// segments (duplicate fixes) contribute nothing; their circles already
/// cover the spot.
fn segment_band(a: Coord<f64>, b: Coord<f64>, radius: f64) -> Option<Polygon<f64>> {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let length = (dx * dx + dy * dy).sqrt();
    if length < 1e-6 {
        return None;
    }

    let nx = -dy / length * radius;
    let ny = dx / length * radius;
    let ring = vec![
        Coord {
            x: a.x + nx,
            y: a.y + ny,
        },
        Coord {
            x: b.x + nx,
            y: b.y + ny,
        },
        Coord {
            x: b.x - nx,
            y: b.y - ny,
        },
        Coord {
            x: a.x - nx,
            y: a.y - ny,
        },
        Coord {
            x: a.x + nx,
            y: a.y + ny,
        },
    ];
    Some(Polygon::new(LineString::from(ring), vec![]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fewer_than_three_points_is_no_claim() {
        assert!(build_claim(&[]).is_none());
        assert!(build_claim(&[LatLng::new(40.0, -3.0)]).is_none());
        assert!(build_claim(&[LatLng::new(40.0, -3.0), LatLng::new(40.001, -3.0)]).is_none());
    }

    #[test]
    fn straight_run_yields_expected_corridor_area() {
        // ~1 km due north at latitude 40.
        let trace = vec![
            LatLng::new(40.0, -3.0),
            LatLng::new(40.0045, -3.0),
            LatLng::new(40.009, -3.0),
        ];
        let claim = build_claim(&trace).expect("claim");

        let run_length = 0.009 * 111_319.49;
        let expected = run_length * 2.0 * CLAIM_RADIUS_M
            + std::f64::consts::PI * CLAIM_RADIUS_M * CLAIM_RADIUS_M;
        let error = (claim.area_m2 - expected).abs() / expected;
        assert!(
            error < 0.05,
            "area {} vs expected {expected}",
            claim.area_m2
        );
    }

    #[test]
    fn stationary_trace_yields_a_disc() {
        let fix = LatLng::new(40.0, -3.0);
        let claim = build_claim(&[fix, fix, fix]).expect("claim");
        let expected = std::f64::consts::PI * CLAIM_RADIUS_M * CLAIM_RADIUS_M;
        let error = (claim.area_m2 - expected).abs() / expected;
        assert!(error < 0.05, "area {}", claim.area_m2);
    }

    #[test]
    fn corridor_stays_near_the_trace() {
        let trace = vec![
            LatLng::new(40.0, -3.0),
            LatLng::new(40.005, -3.001),
            LatLng::new(40.01, -3.0),
        ];
        let claim = build_claim(&trace).expect("claim");
        for polygon in &claim.geometry {
            for coord in polygon.exterior().coords() {
                assert!(coord.y > 39.99 && coord.y < 40.02);
                assert!(coord.x > -3.01 && coord.x < -2.99);
            }
        }
    }

    #[test]
    fn non_finite_fixes_are_dropped() {
        let trace = vec![
            LatLng::new(40.0, -3.0),
            LatLng::new(f64::NAN, -3.0),
            LatLng::new(40.001, -3.0),
        ];
        // Two usable fixes remain: below the claim threshold.
        assert!(build_claim(&trace).is_none());
    }
}
