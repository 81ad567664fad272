//! Trace down-sampling before claim building.
//!
//! Boolean polygon operations scale with vertex count, and an unbounded GPS
//! trace can blow the invocation time budget. Traces are capped by uniform
//! stride sampling; the first and last fix always survive so the corridor
//! still starts and ends where the run did.

use crate::geometry::LatLng;

/// Vertex cap applied to every trace before buffering.
pub const MAX_TRACE_POINTS: usize = 150;

/// Down-sample a trace to at most `max_points` fixes.
///
/// Infallible: short traces come back unchanged, and the endpoints are always
/// retained.
pub fn simplify(points: &[LatLng], max_points: usize) -> Vec<LatLng> {
    let max_points = max_points.max(2);
    if points.len() <= max_points {
        return points.to_vec();
    }

    // Ceil division so the stride always lands within the cap.
    let stride = (points.len() - 1).div_ceil(max_points - 1);
    let mut sampled: Vec<LatLng> = points.iter().step_by(stride).copied().collect();

    if (points.len() - 1) % stride != 0 {
        // Last fix fell between strides; append it explicitly.
        if let Some(last) = points.last() {
            sampled.push(*last);
        }
    }

    sampled
}
