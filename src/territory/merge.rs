//! Merging a claim into the owner's unified holding.
//!
//! Pure geometry: the caller persists the result as the owner's single
//! territory row. Union is associative and commutative, so the order in
//! which a user's own routes merge never changes the final shape.

use geo::MultiPolygon;

use crate::geometry::ops;
use crate::territory::types::Claim;

/// Result of folding one claim into a holding.
#[derive(Debug, Clone)]
pub struct MergeResult {
    /// The owner's new unified holding.
    pub geometry: MultiPolygon<f64>,
    pub total_area_m2: f64,
    /// Genuinely new ground: claim area net of self-overlap. Zero when the
    /// runner retraced only known ground.
    pub new_area_m2: f64,
    /// How much of the claim fell on the owner's existing holding.
    pub existing_area_m2: f64,
}

/// Union a claim with the owner's current holding, if any.
///
/// A degenerate self-overlap or union pairing is logged and treated as a
/// no-op for that piece; the merge itself always produces a holding.
pub fn merge(claim: &Claim, own_holding: Option<&MultiPolygon<f64>>) -> MergeResult {
    let existing_area_m2 = match own_holding {
        Some(holding) => match ops::intersection(&claim.geometry, holding) {
            Some(overlap) => ops::area_m2(&overlap),
            None => {
                tracing::warn!("self-overlap computation failed, assuming none");
                0.0
            }
        },
        None => 0.0,
    };

    let geometry = match own_holding {
        Some(holding) => match ops::union(&claim.geometry, holding) {
            Some(unioned) => unioned,
            None => {
                tracing::warn!("union with own holding failed, keeping claim only");
                claim.geometry.clone()
            }
        },
        None => claim.geometry.clone(),
    };

    let total_area_m2 = ops::area_m2(&geometry);
    let new_area_m2 = (claim.area_m2 - existing_area_m2).max(0.0);

    MergeResult {
        geometry,
        total_area_m2,
        new_area_m2,
        existing_area_m2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, Polygon};

    fn square(min_lng: f64, min_lat: f64, size_deg: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![Polygon::new(
            LineString::from(vec![
                (min_lng, min_lat),
                (min_lng + size_deg, min_lat),
                (min_lng + size_deg, min_lat + size_deg),
                (min_lng, min_lat + size_deg),
                (min_lng, min_lat),
            ]),
            vec![],
        )])
    }

    fn claim_of(geometry: MultiPolygon<f64>) -> Claim {
        let area_m2 = ops::area_m2(&geometry);
        Claim { geometry, area_m2 }
    }

    #[test]
    fn first_claim_becomes_the_holding() {
        let claim = claim_of(square(-3.0, 40.0, 0.01));
        let result = merge(&claim, None);
        assert_eq!(result.existing_area_m2, 0.0);
        assert!((result.total_area_m2 - claim.area_m2).abs() < 1.0);
        assert!((result.new_area_m2 - claim.area_m2).abs() < 1.0);
    }

    #[test]
    fn merging_a_claim_with_itself_is_idempotent() {
        let claim = claim_of(square(-3.0, 40.0, 0.01));
        let first = merge(&claim, None);
        let second = merge(&claim, Some(&first.geometry));

        let error = (second.total_area_m2 - first.total_area_m2).abs() / first.total_area_m2;
        assert!(error < 1e-6, "total changed on re-merge: {error}");
    }

    #[test]
    fn fully_retraced_ground_reports_no_new_area() {
        let holding = square(-3.02, 39.98, 0.05);
        let claim = claim_of(square(-3.0, 40.0, 0.01));
        let result = merge(&claim, Some(&holding));

        assert!(result.new_area_m2 < claim.area_m2 * 1e-6);
        let holding_area = ops::area_m2(&holding);
        let error = (result.total_area_m2 - holding_area).abs() / holding_area;
        assert!(error < 1e-6, "total area should be unchanged");
    }

    #[test]
    fn disjoint_claim_adds_its_full_area() {
        let holding = square(-3.0, 40.0, 0.01);
        let claim = claim_of(square(-2.9, 40.1, 0.01));
        let result = merge(&claim, Some(&holding));

        assert_eq!(result.existing_area_m2, 0.0);
        let expected = ops::area_m2(&holding) + claim.area_m2;
        let error = (result.total_area_m2 - expected).abs() / expected;
        assert!(error < 1e-6);
        assert!((result.new_area_m2 - claim.area_m2).abs() < 1.0);
    }

    #[test]
    fn partial_overlap_splits_new_and_existing() {
        let holding = square(-3.0, 40.0, 0.01);
        // Shifted east by half a square: half old ground, half new.
        let claim = claim_of(square(-2.995, 40.0, 0.01));
        let result = merge(&claim, Some(&holding));

        let half = claim.area_m2 / 2.0;
        assert!((result.existing_area_m2 - half).abs() / half < 0.01);
        assert!((result.new_area_m2 - half).abs() / half < 0.01);
    }

    #[test]
    fn merge_order_of_own_claims_does_not_matter() {
        let a = claim_of(square(-3.0, 40.0, 0.01));
        let b = claim_of(square(-2.995, 40.005, 0.01));

        let ab = merge(&b, Some(&merge(&a, None).geometry));
        let ba = merge(&a, Some(&merge(&b, None).geometry));

        let error = (ab.total_area_m2 - ba.total_area_m2).abs() / ab.total_area_m2;
        assert!(error < 1e-9);
    }
}
