//! Deterministic friend-group replay.
//!
//! Rebuilds a group's territories, totals, and conquest ledger from its
//! routes in completion order, inside one transaction. Replaying the same
//! routes always yields the same map regardless of original arrival order,
//! because the ordering key (completed_at, started_at, id) is total and the
//! per-route resolution is pure.
//!
//! No notifications go out during a replay: the rows it writes restate
//! history rather than report new events.

use std::collections::BTreeMap;

use geo::MultiPolygon;
use rusqlite::Connection;
use uuid::Uuid;

use crate::geometry::ops;
use crate::social::FriendGraph;
use crate::storage::database::DatabaseError;
use crate::storage::route_store::RouteStore;
use crate::storage::territory_store::TerritoryStore;
use crate::storage::user_store::UserStore;
use crate::territory::claim::build_claim;
use crate::territory::engine::{EngineConfig, EngineError, InvocationBudget};
use crate::territory::ledger::ConquestLedger;
use crate::territory::merge;
use crate::territory::overlap::{OverlapResolver, RivalFate, RivalHolding};
use crate::territory::simplify::simplify;
use crate::territory::types::{Conquest, Route};

/// Per-route numbers accumulated during a replay, so a caller that triggered
/// the replay on behalf of one route can still report that route's outcome.
#[derive(Debug, Default)]
pub struct ReplaySummary {
    pub new_area_by_route: BTreeMap<Uuid, f64>,
    pub conquests_by_route: BTreeMap<Uuid, Vec<Conquest>>,
}

/// Replays one friend group from scratch.
pub struct ChronologicalReprocessor<'a> {
    conn: &'a Connection,
    config: &'a EngineConfig,
}

impl<'a> ChronologicalReprocessor<'a> {
    pub fn new(conn: &'a Connection, config: &'a EngineConfig) -> Self {
        Self { conn, config }
    }

    /// Rebuild the friend group containing `user_id`.
    ///
    /// All-or-nothing: any error, including an exhausted invocation budget,
    /// rolls the transaction back and leaves the previous map untouched.
    pub fn run(&self, user_id: Uuid) -> Result<ReplaySummary, EngineError> {
        let budget = InvocationBudget::new(self.config.invocation_budget);

        let group = FriendGraph::new(self.conn).friend_group(user_id)?;
        let routes = RouteStore::new(self.conn).routes_for_users(&group)?;

        // Full sibling sets up front: the ran-together check must see every
        // rival route, not just the ones already replayed.
        let mut routes_by_user: BTreeMap<Uuid, Vec<Route>> = BTreeMap::new();
        for route in &routes {
            routes_by_user
                .entry(route.owner_id)
                .or_default()
                .push(route.clone());
        }

        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

        let territory_store = TerritoryStore::new(self.conn);
        let ledger = ConquestLedger::new(self.conn);
        let users = UserStore::new(self.conn);

        territory_store.delete_for_owners(&group)?;
        ledger.clear_for_users(&group)?;

        let resolver = OverlapResolver::new(self.config.max_trace_points, &routes_by_user);
        let mut holdings: BTreeMap<Uuid, MultiPolygon<f64>> = BTreeMap::new();
        let mut summary = ReplaySummary::default();

        for route in &routes {
            if budget.exhausted() {
                tracing::warn!(
                    user_id = %user_id,
                    routes = routes.len(),
                    "replay budget exhausted, rolling back"
                );
                return Err(EngineError::BudgetExhausted);
            }

            let simplified = simplify(&route.coordinates, self.config.max_trace_points);
            let Some(claim) = build_claim(&simplified) else {
                continue;
            };

            let rivals: Vec<RivalHolding> = holdings
                .iter()
                .filter(|(owner, _)| **owner != route.owner_id)
                .map(|(owner, geometry)| RivalHolding {
                    owner_id: *owner,
                    geometry: geometry.clone(),
                })
                .collect();

            let mut conquests = Vec::new();
            for resolution in resolver.resolve(route, &claim, &rivals) {
                match resolution.fate {
                    RivalFate::Reduced { remainder, .. } => {
                        holdings.insert(resolution.owner_id, remainder);
                    }
                    RivalFate::Consumed => {
                        holdings.remove(&resolution.owner_id);
                    }
                }
                // Stamped with the route's completion time, not now(), so
                // repeated replays write identical rows.
                ledger.record(
                    route.owner_id,
                    resolution.owner_id,
                    resolution.stolen_m2,
                    Some(route.id),
                    route.completed_at,
                )?;
                conquests.push(Conquest {
                    defender_id: resolution.owner_id,
                    area_m2: resolution.stolen_m2,
                });
            }
            if !conquests.is_empty() {
                summary.conquests_by_route.insert(route.id, conquests);
            }

            let merged = merge::merge(&claim, holdings.get(&route.owner_id));
            summary.new_area_by_route.insert(route.id, merged.new_area_m2);
            holdings.insert(route.owner_id, merged.geometry);
        }

        // Rebuilt holdings span many routes, so provenance is detached.
        for member in &group {
            match holdings.get(member) {
                Some(geometry) if !geometry.0.is_empty() => {
                    let area_m2 = ops::area_m2(geometry);
                    territory_store.replace_for_owner(*member, None, geometry, area_m2)?;
                    users.update_total_area(*member, area_m2)?;
                }
                _ => {
                    users.update_total_area(*member, 0.0)?;
                }
            }
        }

        tx.commit()
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

        tracing::info!(
            user_id = %user_id,
            members = group.len(),
            routes = routes.len(),
            "friend group replayed"
        );
        Ok(summary)
    }
}
