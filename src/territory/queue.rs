//! Third-party activity import queue.
//!
//! Webhook-delivered activities land in a durable queue and are drained one
//! per invocation; the caller re-invokes while `remaining` is non-zero, so a
//! large backfill never blows a single invocation's budget.
//!
//! Processing is fail-open: whatever happens to an activity, it is marked
//! terminal before the invocation returns. A poison activity costs its own
//! import, never the queue.

use chrono::Duration as ChronoDuration;
use uuid::Uuid;

use crate::geometry::{GeometryError, LatLng};
use crate::storage::import_store::ImportStore;
use crate::territory::engine::{ConquestEngine, EngineError};
use crate::territory::types::{
    ImportReport, ImportStatus, ImportedActivity, NewImportedActivity, NewRoute, ProcessedImport,
};

/// What handling one activity produced.
enum ImportDisposition {
    Route(Uuid),
    NoUsableTrace,
}

impl ConquestEngine {
    /// Queue an imported activity. Duplicate (source, external id) pairs are
    /// absorbed, so webhook retries are safe.
    pub fn enqueue_import(&self, activity: &NewImportedActivity) -> Result<Uuid, EngineError> {
        Ok(ImportStore::new(self.db.connection()).enqueue(activity)?)
    }

    /// Drain one pending activity from the import queue.
    ///
    /// The activity always reaches a terminal status: `Succeeded` with the
    /// created route, `SkippedNoGps` when the track is too thin to claim
    /// ground, or `Failed` on any processing error.
    pub fn process_next_import(&self) -> Result<ImportReport, EngineError> {
        let store = ImportStore::new(self.db.connection());

        let Some(activity) = store.next_pending()? else {
            return Ok(ImportReport {
                processed: None,
                remaining: 0,
            });
        };

        let (status, route_id) = match self.import_activity(&activity) {
            Ok(ImportDisposition::Route(route_id)) => (ImportStatus::Succeeded, Some(route_id)),
            Ok(ImportDisposition::NoUsableTrace) => {
                tracing::info!(
                    activity_id = %activity.id,
                    source = activity.source.as_str(),
                    "no usable track, skipping"
                );
                (ImportStatus::SkippedNoGps, None)
            }
            Err(error) => {
                tracing::error!(
                    activity_id = %activity.id,
                    source = activity.source.as_str(),
                    %error,
                    "import failed, marking done"
                );
                (ImportStatus::Failed, None)
            }
        };

        store.mark(activity.id, status, route_id)?;
        let remaining = store.count_pending()?;

        tracing::info!(
            activity_id = %activity.id,
            status = status.as_str(),
            remaining,
            "import processed"
        );

        Ok(ImportReport {
            processed: Some(ProcessedImport {
                activity_id: activity.id,
                status,
                route_id,
            }),
            remaining,
        })
    }

    /// Put a terminal activity back in the queue, for operator-driven retry
    /// after a fixed bug or upstream hiccup.
    pub fn requeue_import(&self, activity_id: Uuid) -> Result<(), EngineError> {
        Ok(ImportStore::new(self.db.connection()).requeue(activity_id)?)
    }

    fn import_activity(
        &self,
        activity: &ImportedActivity,
    ) -> Result<ImportDisposition, EngineError> {
        let Some(started_at) = activity.started_at else {
            return Err(EngineError::InvalidImport(
                "missing start timestamp".to_string(),
            ));
        };

        let line = polyline::decode_polyline(&activity.summary_polyline, 5)
            .map_err(|e| GeometryError::Decode(e.to_string()))?;
        let coordinates: Vec<LatLng> = line
            .coords()
            .map(|c| LatLng::from_coord(*c))
            .filter(|p| p.is_finite())
            .collect();
        if coordinates.len() < 3 {
            return Ok(ImportDisposition::NoUsableTrace);
        }

        let outcome = self.submit_route(NewRoute {
            owner_id: activity.user_id,
            name: activity.name.clone(),
            coordinates,
            distance_m: activity.distance_m,
            duration_s: activity.duration_s,
            started_at,
            completed_at: started_at + ChronoDuration::seconds(activity.duration_s),
        })?;

        Ok(ImportDisposition::Route(outcome.route_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use geo::Coord;

    use crate::notify::RecordingNotifier;
    use crate::storage::database::Database;
    use crate::storage::territory_store::TerritoryStore;
    use crate::storage::user_store::UserStore;
    use crate::territory::types::ActivitySource;

    fn engine() -> ConquestEngine {
        let db = Arc::new(Database::open_in_memory().unwrap());
        ConquestEngine::new(db, Arc::new(RecordingNotifier::default()))
    }

    fn user(engine: &ConquestEngine, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        UserStore::new(engine.db.connection())
            .upsert_user(id, name)
            .unwrap();
        id
    }

    fn north_polyline() -> String {
        let coords = [
            Coord { x: -3.0, y: 40.0 },
            Coord { x: -3.0, y: 40.0045 },
            Coord { x: -3.0, y: 40.009 },
        ];
        polyline::encode_coordinates(coords, 5).unwrap()
    }

    fn activity(owner: Uuid, external_id: &str, summary_polyline: String) -> NewImportedActivity {
        NewImportedActivity {
            user_id: owner,
            source: ActivitySource::Strava,
            external_id: external_id.to_string(),
            name: "morning run".to_string(),
            summary_polyline,
            distance_m: 1000.0,
            duration_s: 300,
            started_at: Some(Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()),
        }
    }

    #[test]
    fn empty_queue_reports_nothing_to_do() {
        let engine = engine();
        let report = engine.process_next_import().unwrap();
        assert!(report.processed.is_none());
        assert_eq!(report.remaining, 0);
    }

    #[test]
    fn import_creates_a_route_and_territory() {
        let engine = engine();
        let alice = user(&engine, "alice");
        engine
            .enqueue_import(&activity(alice, "ext-1", north_polyline()))
            .unwrap();

        let report = engine.process_next_import().unwrap();
        let processed = report.processed.unwrap();
        assert_eq!(processed.status, ImportStatus::Succeeded);
        assert!(processed.route_id.is_some());
        assert_eq!(report.remaining, 0);

        let territory = TerritoryStore::new(engine.db.connection())
            .get_by_owner(alice)
            .unwrap();
        assert!(territory.is_some());
    }

    #[test]
    fn deleting_an_imported_route_detaches_the_activity() {
        let engine = engine();
        let alice = user(&engine, "alice");
        engine
            .enqueue_import(&activity(alice, "ext-1", north_polyline()))
            .unwrap();
        let processed = engine.process_next_import().unwrap().processed.unwrap();
        let route_id = processed.route_id.unwrap();

        engine.delete_route(route_id).unwrap();

        // The import record keeps its terminal status but no longer points
        // at the deleted route.
        let imported = ImportStore::new(engine.db.connection())
            .get(processed.activity_id)
            .unwrap()
            .unwrap();
        assert_eq!(imported.status, ImportStatus::Succeeded);
        assert!(imported.route_id.is_none());
    }

    #[test]
    fn one_activity_per_invocation() {
        let engine = engine();
        let alice = user(&engine, "alice");
        engine
            .enqueue_import(&activity(alice, "ext-1", north_polyline()))
            .unwrap();
        engine
            .enqueue_import(&activity(alice, "ext-2", north_polyline()))
            .unwrap();

        let first = engine.process_next_import().unwrap();
        assert_eq!(first.remaining, 1);
        let second = engine.process_next_import().unwrap();
        assert_eq!(second.remaining, 0);
        assert_ne!(
            first.processed.unwrap().activity_id,
            second.processed.unwrap().activity_id
        );
    }

    #[test]
    fn thin_track_is_skipped_not_retried() {
        let engine = engine();
        let alice = user(&engine, "alice");
        engine
            .enqueue_import(&activity(alice, "ext-1", String::new()))
            .unwrap();

        let report = engine.process_next_import().unwrap();
        assert_eq!(report.processed.unwrap().status, ImportStatus::SkippedNoGps);
        assert_eq!(report.remaining, 0);

        // Terminal: a second invocation finds nothing.
        assert!(engine.process_next_import().unwrap().processed.is_none());
    }

    #[test]
    fn missing_start_time_fails_open() {
        let engine = engine();
        let alice = user(&engine, "alice");
        let mut bad = activity(alice, "ext-1", north_polyline());
        bad.started_at = None;
        engine.enqueue_import(&bad).unwrap();

        let report = engine.process_next_import().unwrap();
        assert_eq!(report.processed.unwrap().status, ImportStatus::Failed);
        assert_eq!(report.remaining, 0);
        assert!(engine.process_next_import().unwrap().processed.is_none());
    }

    #[test]
    fn duplicate_webhook_delivery_is_absorbed() {
        let engine = engine();
        let alice = user(&engine, "alice");
        let first = engine
            .enqueue_import(&activity(alice, "ext-1", north_polyline()))
            .unwrap();
        let second = engine
            .enqueue_import(&activity(alice, "ext-1", north_polyline()))
            .unwrap();
        assert_eq!(first, second);

        engine.process_next_import().unwrap();
        assert!(engine.process_next_import().unwrap().processed.is_none());
    }

    #[test]
    fn requeue_puts_a_failed_activity_back() {
        let engine = engine();
        let alice = user(&engine, "alice");
        let mut bad = activity(alice, "ext-1", north_polyline());
        bad.started_at = None;
        let id = engine.enqueue_import(&bad).unwrap();

        let report = engine.process_next_import().unwrap();
        assert_eq!(report.processed.unwrap().status, ImportStatus::Failed);

        engine.requeue_import(id).unwrap();
        let report = engine.process_next_import().unwrap();
        assert_eq!(report.processed.unwrap().activity_id, id);
    }
}
