//! Core types for the territory conquest engine.

use chrono::{DateTime, Utc};
use geo::MultiPolygon;
use uuid::Uuid;

use crate::geometry::LatLng;

/// A completed GPS-tracked run.
///
/// Immutable once created except for rename and the ran-together annotation.
/// Deleting a route triggers a chronological reprocess of the owner's friend
/// group so the land it claimed is released.
#[derive(Debug, Clone)]
pub struct Route {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    /// Ordered trace in storage order (lat, lng). Any length is valid; only
    /// traces with at least 3 points produce territory effects.
    pub coordinates: Vec<LatLng>,
    pub distance_m: f64,
    pub duration_s: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Users this run was explicitly shared with; conquest between the two
    /// is suppressed without the geometric ran-together test.
    pub ran_together_with: Vec<Uuid>,
}

/// Input for route creation; the engine assigns the id.
#[derive(Debug, Clone)]
pub struct NewRoute {
    pub owner_id: Uuid,
    pub name: String,
    pub coordinates: Vec<LatLng>,
    pub distance_m: f64,
    pub duration_s: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl NewRoute {
    pub fn into_route(self) -> Route {
        Route {
            id: Uuid::new_v4(),
            owner_id: self.owner_id,
            name: self.name,
            coordinates: self.coordinates,
            distance_m: self.distance_m,
            duration_s: self.duration_s,
            started_at: self.started_at,
            completed_at: self.completed_at,
            ran_together_with: Vec::new(),
        }
    }
}

/// A user's single unified holding.
///
/// At most one row exists per user; every merge or reprocess replaces it
/// wholesale. `route_id` records provenance and is cleared when that route
/// is deleted or a reprocess detaches the holding from any single route.
#[derive(Debug, Clone)]
pub struct Territory {
    pub id: Uuid,
    pub owner_id: Uuid,
    /// Holding geometry in (lng, lat) degree rings.
    pub geometry: MultiPolygon<f64>,
    pub area_m2: f64,
    pub route_id: Option<Uuid>,
    pub conquered_at: DateTime<Utc>,
}

/// One append-only conquest ledger row.
#[derive(Debug, Clone)]
pub struct ConquestMetric {
    pub id: Uuid,
    pub attacker_id: Uuid,
    pub defender_id: Uuid,
    pub area_m2: f64,
    pub route_id: Option<Uuid>,
    pub recorded_at: DateTime<Utc>,
}

/// The buffered corridor produced from one route's simplified trace.
/// Ephemeral; never persisted standalone.
#[derive(Debug, Clone)]
pub struct Claim {
    /// Corridor geometry in (lng, lat) degree rings.
    pub geometry: MultiPolygon<f64>,
    pub area_m2: f64,
}

/// Per-defender breakdown of a single route's conquests.
#[derive(Debug, Clone, PartialEq)]
pub struct Conquest {
    pub defender_id: Uuid,
    pub area_m2: f64,
}

/// What a processed route did to the map.
#[derive(Debug, Clone)]
pub struct ConquestOutcome {
    pub route_id: Uuid,
    /// The owner's territory after the merge; `None` when the route produced
    /// no claim (fewer than 3 usable points).
    pub territory_id: Option<Uuid>,
    pub total_area_m2: f64,
    /// Genuinely new ground: claim area net of overlap with the owner's own
    /// prior holding. This is the number shown to the user.
    pub new_area_m2: f64,
    pub area_stolen_m2: f64,
    pub victims: Vec<Conquest>,
    /// True when completion-time ordering forced a full friend-group replay
    /// instead of incremental processing.
    pub reprocessed: bool,
}

impl ConquestOutcome {
    /// Outcome for a route that produced no territory effect.
    pub fn no_claim(route_id: Uuid) -> Self {
        Self {
            route_id,
            territory_id: None,
            total_area_m2: 0.0,
            new_area_m2: 0.0,
            area_stolen_m2: 0.0,
            victims: Vec::new(),
            reprocessed: false,
        }
    }
}

/// Where an imported activity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivitySource {
    Strava,
    Polar,
}

impl ActivitySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivitySource::Strava => "strava",
            ActivitySource::Polar => "polar",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "strava" => Some(ActivitySource::Strava),
            "polar" => Some(ActivitySource::Polar),
            _ => None,
        }
    }
}

/// Processing state of a queued import.
///
/// Replaces a boolean `processed` flag so "succeeded", "had no GPS" and
/// "failed unexpectedly" stay distinguishable for audit and retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStatus {
    Pending,
    Succeeded,
    SkippedNoGps,
    Failed,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Pending => "pending",
            ImportStatus::Succeeded => "succeeded",
            ImportStatus::SkippedNoGps => "skipped_no_gps",
            ImportStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ImportStatus::Pending),
            "succeeded" => Some(ImportStatus::Succeeded),
            "skipped_no_gps" => Some(ImportStatus::SkippedNoGps),
            "failed" => Some(ImportStatus::Failed),
            _ => None,
        }
    }

    /// Whether the queue is done with this record.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ImportStatus::Pending)
    }
}

/// A third-party activity waiting in the import queue.
#[derive(Debug, Clone)]
pub struct ImportedActivity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub source: ActivitySource,
    pub external_id: String,
    pub name: String,
    /// Google encoded polyline (precision 5) of the activity's track.
    pub summary_polyline: String,
    pub distance_m: f64,
    pub duration_s: i64,
    /// Missing or unparseable upstream timestamps arrive as `None`; such a
    /// record is marked processed-without-territory rather than retried.
    pub started_at: Option<DateTime<Utc>>,
    pub status: ImportStatus,
    pub processed_at: Option<DateTime<Utc>>,
    pub route_id: Option<Uuid>,
}

/// Input for enqueueing an imported activity.
#[derive(Debug, Clone)]
pub struct NewImportedActivity {
    pub user_id: Uuid,
    pub source: ActivitySource,
    pub external_id: String,
    pub name: String,
    pub summary_polyline: String,
    pub distance_m: f64,
    pub duration_s: i64,
    pub started_at: Option<DateTime<Utc>>,
}

/// Result of one import-queue invocation (at most one activity).
#[derive(Debug, Clone)]
pub struct ImportReport {
    pub processed: Option<ProcessedImport>,
    /// Queue depth left behind; the caller re-invokes until this is zero.
    pub remaining: u64,
}

/// The activity handled by this invocation.
#[derive(Debug, Clone)]
pub struct ProcessedImport {
    pub activity_id: Uuid,
    pub status: ImportStatus,
    pub route_id: Option<Uuid>,
}

/// A map participant with their cached holdings total.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub total_area_m2: f64,
}
