//! The conquest engine: the one entry point that mutates the territory map.
//!
//! Every mutation funnels through here so the map invariants hold: each user
//! owns at most one unified territory, stolen area equals lost area, and any
//! change that invalidates already-processed history (late route, deletion,
//! annotation, friendship change) triggers a chronological replay of the
//! whole friend group.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::geometry::GeometryError;
use crate::notify::Notifier;
use crate::social::FriendGraph;
use crate::storage::database::{Database, DatabaseError};
use crate::storage::import_store::ImportStore;
use crate::storage::route_store::RouteStore;
use crate::storage::territory_store::TerritoryStore;
use crate::storage::user_store::UserStore;
use crate::territory::claim::build_claim;
use crate::territory::ledger::ConquestLedger;
use crate::territory::merge;
use crate::territory::overlap::{OverlapResolver, RivalFate, RivalHolding};
use crate::territory::reprocess::{ChronologicalReprocessor, ReplaySummary};
use crate::territory::simplify::{simplify, MAX_TRACE_POINTS};
use crate::territory::types::{Conquest, ConquestMetric, ConquestOutcome, NewRoute, Route};

/// Errors from engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    #[error("Route not found: {0}")]
    RouteNotFound(Uuid),

    #[error("Import rejected: {0}")]
    InvalidImport(String),

    /// A friend-group replay ran past its time budget. The transaction rolled
    /// back; the map is exactly as it was before the attempt.
    #[error("Invocation budget exhausted, replay rolled back")]
    BudgetExhausted,
}

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Cap on simplified trace length before buffering.
    pub max_trace_points: usize,
    /// Wall-clock limit for a single engine invocation; replays that run
    /// past it are rolled back whole.
    pub invocation_budget: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_trace_points: MAX_TRACE_POINTS,
            invocation_budget: Duration::from_secs(25),
        }
    }
}

/// Wall-clock deadline for one engine invocation.
pub struct InvocationBudget {
    deadline: Instant,
}

impl InvocationBudget {
    pub fn new(limit: Duration) -> Self {
        Self {
            deadline: Instant::now() + limit,
        }
    }

    pub fn exhausted(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// Orchestrates route submission, conquest resolution, and replays.
pub struct ConquestEngine {
    pub(crate) db: Arc<Database>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) config: EngineConfig,
}

impl ConquestEngine {
    pub fn new(db: Arc<Database>, notifier: Arc<dyn Notifier>) -> Self {
        Self::with_config(db, notifier, EngineConfig::default())
    }

    pub fn with_config(db: Arc<Database>, notifier: Arc<dyn Notifier>, config: EngineConfig) -> Self {
        Self {
            db,
            notifier,
            config,
        }
    }

    /// Store a finished route and apply its territory effects.
    ///
    /// When the friend group already holds routes completed after this one,
    /// incremental processing would depend on arrival order, so the whole
    /// group is replayed chronologically instead.
    pub fn submit_route(&self, new_route: NewRoute) -> Result<ConquestOutcome, EngineError> {
        let route = new_route.into_route();
        RouteStore::new(self.db.connection()).insert_route(&route)?;

        if self.arrived_out_of_order(&route)? {
            tracing::info!(
                route_id = %route.id,
                owner = %route.owner_id,
                "route arrived out of order, replaying friend group"
            );
            let summary = self.reprocess_friend_group(route.owner_id)?;
            return self.outcome_after_replay(&route, &summary);
        }

        self.process_route(&route)
    }

    /// Remove a route and rebuild the friend group's map without it.
    pub fn delete_route(&self, route_id: Uuid) -> Result<(), EngineError> {
        let conn = self.db.connection();
        let store = RouteStore::new(conn);
        let route = store
            .get_route(route_id)?
            .ok_or(EngineError::RouteNotFound(route_id))?;

        // Both referencing tables must be detached before the row can go.
        TerritoryStore::new(conn).clear_route_provenance(route_id)?;
        ImportStore::new(conn).clear_route_provenance(route_id)?;
        store.delete_route(route_id)?;
        tracing::info!(route_id = %route_id, owner = %route.owner_id, "route deleted");

        self.reprocess_friend_group(route.owner_id)?;
        Ok(())
    }

    /// Rename a route. Names carry no territory meaning, so no replay.
    pub fn rename_route(&self, route_id: Uuid, name: &str) -> Result<(), EngineError> {
        let store = RouteStore::new(self.db.connection());
        store
            .get_route(route_id)?
            .ok_or(EngineError::RouteNotFound(route_id))?;
        store.rename_route(route_id, name)?;
        Ok(())
    }

    /// Replace a route's explicit ran-together annotation and replay, since
    /// past conquests involving the named users may now be suppressed.
    pub fn annotate_ran_together(
        &self,
        route_id: Uuid,
        user_ids: &[Uuid],
    ) -> Result<(), EngineError> {
        let store = RouteStore::new(self.db.connection());
        let route = store
            .get_route(route_id)?
            .ok_or(EngineError::RouteNotFound(route_id))?;
        store.set_ran_together(route_id, user_ids)?;

        self.reprocess_friend_group(route.owner_id)?;
        Ok(())
    }

    /// Make two users mutual friends and replay the now-joined group, so
    /// their past routes conquer each other as if they had always been rivals.
    pub fn add_friendship(&self, a: Uuid, b: Uuid) -> Result<(), EngineError> {
        UserStore::new(self.db.connection()).add_friendship(a, b)?;
        // One replay covers both: b is in a's group now.
        self.reprocess_friend_group(a)?;
        Ok(())
    }

    /// Break a friendship and replay. If the group split in two, each half
    /// gets its own replay.
    pub fn remove_friendship(&self, a: Uuid, b: Uuid) -> Result<(), EngineError> {
        let conn = self.db.connection();
        UserStore::new(conn).remove_friendship(a, b)?;

        let group_a = FriendGraph::new(conn).friend_group(a)?;
        self.reprocess_friend_group(a)?;
        if !group_a.contains(&b) {
            self.reprocess_friend_group(b)?;
        }
        Ok(())
    }

    /// Rebuild a friend group's territories, totals, and ledger from its
    /// routes in chronological order.
    pub fn reprocess_friend_group(&self, user_id: Uuid) -> Result<ReplaySummary, EngineError> {
        ChronologicalReprocessor::new(self.db.connection(), &self.config).run(user_id)
    }

    /// Conquest history for a user, newest first.
    pub fn metrics_for_user(&self, user_id: Uuid) -> Result<Vec<ConquestMetric>, EngineError> {
        Ok(ConquestLedger::new(self.db.connection()).metrics_for_user(user_id)?)
    }

    /// Lifetime area taken from rivals.
    pub fn total_stolen_by(&self, user_id: Uuid) -> Result<f64, EngineError> {
        Ok(ConquestLedger::new(self.db.connection()).total_stolen_by(user_id)?)
    }

    /// Lifetime area lost to rivals.
    pub fn total_lost_by(&self, user_id: Uuid) -> Result<f64, EngineError> {
        Ok(ConquestLedger::new(self.db.connection()).total_lost_by(user_id)?)
    }

    /// Incremental pipeline for a route that is the newest in its group:
    /// simplify, buffer, steal from rivals, merge into the owner's holding.
    fn process_route(&self, route: &Route) -> Result<ConquestOutcome, EngineError> {
        let conn = self.db.connection();

        let simplified = simplify(&route.coordinates, self.config.max_trace_points);
        let Some(claim) = build_claim(&simplified) else {
            tracing::info!(route_id = %route.id, "trace too short for a claim");
            return Ok(ConquestOutcome::no_claim(route.id));
        };

        // One transaction per route: a failure partway through rival writes
        // must not leave a holding reduced without its ledger row.
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

        let group = FriendGraph::new(conn).friend_group(route.owner_id)?;
        let group_set: BTreeSet<Uuid> = group.iter().copied().collect();

        let territory_store = TerritoryStore::new(conn);
        let mut territory_ids: BTreeMap<Uuid, Uuid> = BTreeMap::new();
        let rivals: Vec<RivalHolding> = territory_store
            .get_all()?
            .into_iter()
            .filter(|t| t.owner_id != route.owner_id && group_set.contains(&t.owner_id))
            .map(|t| {
                territory_ids.insert(t.owner_id, t.id);
                RivalHolding {
                    owner_id: t.owner_id,
                    geometry: t.geometry,
                }
            })
            .collect();

        let rival_ids: Vec<Uuid> = group
            .iter()
            .copied()
            .filter(|id| *id != route.owner_id)
            .collect();
        let mut routes_by_rival: BTreeMap<Uuid, Vec<Route>> = BTreeMap::new();
        for rival_route in RouteStore::new(conn).routes_for_users(&rival_ids)? {
            routes_by_rival
                .entry(rival_route.owner_id)
                .or_default()
                .push(rival_route);
        }

        let resolver = OverlapResolver::new(self.config.max_trace_points, &routes_by_rival);
        let resolutions = resolver.resolve(route, &claim, &rivals);

        let users = UserStore::new(conn);
        let ledger = ConquestLedger::new(conn);
        let mut victims = Vec::new();
        let mut area_stolen_m2 = 0.0;

        for resolution in resolutions {
            let Some(&territory_id) = territory_ids.get(&resolution.owner_id) else {
                continue;
            };
            match &resolution.fate {
                RivalFate::Reduced { remainder, area_m2 } => {
                    territory_store.update_geometry(territory_id, remainder, *area_m2)?;
                    users.update_total_area(resolution.owner_id, *area_m2)?;
                }
                RivalFate::Consumed => {
                    territory_store.delete(territory_id)?;
                    users.update_total_area(resolution.owner_id, 0.0)?;
                }
            }
            ledger.record(
                route.owner_id,
                resolution.owner_id,
                resolution.stolen_m2,
                Some(route.id),
                Utc::now(),
            )?;
            victims.push(Conquest {
                defender_id: resolution.owner_id,
                area_m2: resolution.stolen_m2,
            });
            area_stolen_m2 += resolution.stolen_m2;
        }

        let own = territory_store.get_by_owner(route.owner_id)?;
        let merged = merge::merge(&claim, own.as_ref().map(|t| &t.geometry));
        let territory_id = territory_store.replace_for_owner(
            route.owner_id,
            Some(route.id),
            &merged.geometry,
            merged.total_area_m2,
        )?;
        users.update_total_area(route.owner_id, merged.total_area_m2)?;

        tx.commit()
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

        // Only committed conquests notify; a rolled-back route sends nothing.
        for victim in &victims {
            self.notifier
                .territory_lost(victim.defender_id, route.owner_id, victim.area_m2);
        }

        tracing::info!(
            route_id = %route.id,
            owner = %route.owner_id,
            total_area_m2 = merged.total_area_m2,
            new_area_m2 = merged.new_area_m2,
            area_stolen_m2,
            victims = victims.len(),
            "route processed"
        );

        Ok(ConquestOutcome {
            route_id: route.id,
            territory_id: Some(territory_id),
            total_area_m2: merged.total_area_m2,
            new_area_m2: merged.new_area_m2,
            area_stolen_m2,
            victims,
            reprocessed: false,
        })
    }

    /// Whether the friend group already holds a route completed after this
    /// one. Coarse by design: a replay is a superset of incremental
    /// processing, so a false positive only costs time.
    fn arrived_out_of_order(&self, route: &Route) -> Result<bool, EngineError> {
        let conn = self.db.connection();
        let group = FriendGraph::new(conn).friend_group(route.owner_id)?;
        let routes = RouteStore::new(conn).routes_for_users(&group)?;
        Ok(routes
            .iter()
            .any(|r| r.id != route.id && r.completed_at > route.completed_at))
    }

    /// Build the submitted route's outcome from replay bookkeeping plus the
    /// owner's final territory row.
    fn outcome_after_replay(
        &self,
        route: &Route,
        summary: &ReplaySummary,
    ) -> Result<ConquestOutcome, EngineError> {
        let territory = TerritoryStore::new(self.db.connection()).get_by_owner(route.owner_id)?;
        let victims = summary
            .conquests_by_route
            .get(&route.id)
            .cloned()
            .unwrap_or_default();
        let area_stolen_m2 = victims.iter().map(|c| c.area_m2).sum();

        Ok(ConquestOutcome {
            route_id: route.id,
            territory_id: territory.as_ref().map(|t| t.id),
            total_area_m2: territory.map(|t| t.area_m2).unwrap_or(0.0),
            new_area_m2: summary
                .new_area_by_route
                .get(&route.id)
                .copied()
                .unwrap_or(0.0),
            area_stolen_m2,
            victims,
            reprocessed: true,
        })
    }
}
