//! Stealing logic: resolving a claim against rival holdings.
//!
//! The resolver is pure — it reports what happened to each rival and leaves
//! persistence to the caller, so the incremental pipeline and the
//! chronological replay share one implementation.

use std::collections::BTreeMap;

use chrono::Duration;
use geo::MultiPolygon;
use uuid::Uuid;

use crate::geometry::ops;
use crate::territory::claim::build_claim;
use crate::territory::simplify::simplify;
use crate::territory::types::{Claim, Route};

/// Maximum start-time gap for two routes to count as the same joint run.
pub const RAN_TOGETHER_MAX_GAP_MINUTES: i64 = 15;

/// Minimum overlap ratio (intersection over the smaller claim) for the same.
pub const RAN_TOGETHER_MIN_OVERLAP_RATIO: f64 = 0.90;

/// The ran-together double gate. Both conditions are required — two people
/// covering the same park hours apart, or running side-by-side on different
/// routes, must still conquer each other.
pub fn is_ran_together(start_gap: Duration, overlap_ratio: f64) -> bool {
    start_gap.abs() <= Duration::minutes(RAN_TOGETHER_MAX_GAP_MINUTES)
        && overlap_ratio >= RAN_TOGETHER_MIN_OVERLAP_RATIO
}

/// Intersection area divided by the smaller of the two claim areas.
/// `None` when the pairing is degenerate; the caller treats that as
/// "cannot verify", which never exempts.
pub fn overlap_ratio(a: &Claim, b: &Claim) -> Option<f64> {
    let intersection = ops::intersection(&a.geometry, &b.geometry)?;
    let smaller = a.area_m2.min(b.area_m2);
    if smaller <= 0.0 {
        return None;
    }
    Some(ops::area_m2(&intersection) / smaller)
}

/// A rival's current holding entering resolution.
#[derive(Debug, Clone)]
pub struct RivalHolding {
    pub owner_id: Uuid,
    pub geometry: MultiPolygon<f64>,
}

/// What resolution decided for one rival.
#[derive(Debug, Clone)]
pub enum RivalFate {
    /// Part of the holding survives.
    Reduced {
        remainder: MultiPolygon<f64>,
        area_m2: f64,
    },
    /// The claim covered the entire holding; the territory row goes away.
    Consumed,
}

/// One rival's loss from a single route.
#[derive(Debug, Clone)]
pub struct RivalOutcome {
    pub owner_id: Uuid,
    pub stolen_m2: f64,
    pub fate: RivalFate,
}

/// Resolves a claim against the holdings of friend-group rivals.
pub struct OverlapResolver<'a> {
    max_trace_points: usize,
    /// Every rival's routes, for the ran-together check. During replay this
    /// is the full sibling set, not just routes merged so far.
    routes_by_rival: &'a BTreeMap<Uuid, Vec<Route>>,
}

impl<'a> OverlapResolver<'a> {
    pub fn new(max_trace_points: usize, routes_by_rival: &'a BTreeMap<Uuid, Vec<Route>>) -> Self {
        Self {
            max_trace_points,
            routes_by_rival,
        }
    }

    /// Resolve one claim against every rival holding. A degenerate geometry
    /// pairing is logged and skipped; it never aborts the remaining rivals.
    pub fn resolve(
        &self,
        route: &Route,
        claim: &Claim,
        rivals: &[RivalHolding],
    ) -> Vec<RivalOutcome> {
        let mut outcomes = Vec::new();

        for rival in rivals {
            if rival.owner_id == route.owner_id {
                continue;
            }

            if self.is_exempt(route, claim, rival.owner_id) {
                tracing::info!(
                    route_id = %route.id,
                    rival = %rival.owner_id,
                    "ran-together exemption, conquest suppressed"
                );
                continue;
            }

            let Some(intersection) = ops::intersection(&claim.geometry, &rival.geometry) else {
                tracing::warn!(
                    route_id = %route.id,
                    rival = %rival.owner_id,
                    "unusable geometry pairing, skipping rival"
                );
                continue;
            };
            let stolen_m2 = ops::area_m2(&intersection);
            if stolen_m2 <= 0.0 {
                continue;
            }

            let Some(remainder) = ops::difference(&rival.geometry, &claim.geometry) else {
                tracing::warn!(
                    route_id = %route.id,
                    rival = %rival.owner_id,
                    "difference failed, skipping rival"
                );
                continue;
            };

            let fate = if remainder.0.is_empty() {
                RivalFate::Consumed
            } else {
                let area_m2 = ops::area_m2(&remainder);
                RivalFate::Reduced {
                    remainder,
                    area_m2,
                }
            };

            outcomes.push(RivalOutcome {
                owner_id: rival.owner_id,
                stolen_m2,
                fate,
            });
        }

        outcomes
    }

    /// Whether conquest against this rival is suppressed: either route of the
    /// pair carries an explicit ran-together annotation, or some sibling
    /// route of the rival passes the time-and-overlap double gate.
    fn is_exempt(&self, route: &Route, claim: &Claim, rival_id: Uuid) -> bool {
        if route.ran_together_with.contains(&rival_id) {
            return true;
        }

        let Some(siblings) = self.routes_by_rival.get(&rival_id) else {
            return false;
        };

        for sibling in siblings {
            if sibling.ran_together_with.contains(&route.owner_id) {
                return true;
            }

            let gap = route.started_at - sibling.started_at;
            if gap.abs() > Duration::minutes(RAN_TOGETHER_MAX_GAP_MINUTES) {
                // Cheap gate first; skip the geometry work.
                continue;
            }

            let simplified = simplify(&sibling.coordinates, self.max_trace_points);
            let Some(sibling_claim) = build_claim(&simplified) else {
                continue;
            };
            let Some(ratio) = overlap_ratio(claim, &sibling_claim) else {
                tracing::warn!(
                    route_id = %route.id,
                    sibling = %sibling.id,
                    "overlap ratio unavailable, not exempting"
                );
                continue;
            };

            if is_ran_together(gap, ratio) {
                return true;
            }
        }

        false
    }
}
