//! Import queue persistence for third-party activities.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::storage::database::DatabaseError;
use crate::territory::types::{
    ActivitySource, ImportStatus, ImportedActivity, NewImportedActivity,
};

/// Store for the queued-activity import pipeline.
pub struct ImportStore<'a> {
    conn: &'a Connection,
}

impl<'a> ImportStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Enqueue an activity. Re-enqueueing the same (source, external id) is
    /// ignored so webhook retries cannot duplicate work.
    pub fn enqueue(&self, activity: &NewImportedActivity) -> Result<Uuid, DatabaseError> {
        let id = Uuid::new_v4();
        let changed = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO imported_activities
                     (id, user_id, source, external_id, name, summary_polyline,
                      distance_m, duration_s, started_at, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'pending')",
                params![
                    id.to_string(),
                    activity.user_id.to_string(),
                    activity.source.as_str(),
                    activity.external_id,
                    activity.name,
                    activity.summary_polyline,
                    activity.distance_m,
                    activity.duration_s,
                    activity.started_at.map(|t| t.to_rfc3339()),
                ],
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        if changed == 0 {
            // Webhook retry: hand back the id of the row already queued.
            let existing: String = self
                .conn
                .query_row(
                    "SELECT id FROM imported_activities WHERE source = ?1 AND external_id = ?2",
                    params![activity.source.as_str(), activity.external_id],
                    |row| row.get(0),
                )
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
            return Uuid::parse_str(&existing)
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()));
        }
        Ok(id)
    }

    /// Oldest pending activity, if any. Records without a start timestamp
    /// sort last so well-formed history is imported first.
    pub fn next_pending(&self) -> Result<Option<ImportedActivity>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, user_id, source, external_id, name, summary_polyline,
                        distance_m, duration_s, started_at, status, processed_at, route_id
                 FROM imported_activities
                 WHERE status = 'pending'
                 ORDER BY started_at IS NULL, started_at ASC, id ASC
                 LIMIT 1",
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        stmt.query_row([], Self::row_to_activity)
            .optional()
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?
            .transpose()
    }

    pub fn count_pending(&self) -> Result<u64, DatabaseError> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM imported_activities WHERE status = 'pending'",
                [],
                |row| row.get(0),
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        Ok(count as u64)
    }

    /// Record a terminal status. Processing always lands here, even on
    /// failure — the fail-open, mark-done policy keeps one bad record from
    /// blocking the queue.
    pub fn mark(
        &self,
        activity_id: Uuid,
        status: ImportStatus,
        route_id: Option<Uuid>,
    ) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "UPDATE imported_activities
                 SET status = ?2, processed_at = ?3, route_id = ?4
                 WHERE id = ?1",
                params![
                    activity_id.to_string(),
                    status.as_str(),
                    Utc::now().to_rfc3339(),
                    route_id.map(|id| id.to_string()),
                ],
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        Ok(())
    }

    /// Operator reset: put a terminal record back in the queue when a retry
    /// is actually wanted.
    pub fn requeue(&self, activity_id: Uuid) -> Result<(), DatabaseError> {
        let changed = self
            .conn
            .execute(
                "UPDATE imported_activities
                 SET status = 'pending', processed_at = NULL, route_id = NULL
                 WHERE id = ?1",
                params![activity_id.to_string()],
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        if changed == 0 {
            return Err(DatabaseError::NotFound(format!(
                "imported activity {activity_id}"
            )));
        }
        Ok(())
    }

    /// Detach provenance from a deleted route; the import keeps its
    /// terminal status.
    pub fn clear_route_provenance(&self, route_id: Uuid) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "UPDATE imported_activities SET route_id = NULL WHERE route_id = ?1",
                params![route_id.to_string()],
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        Ok(())
    }

    pub fn get(&self, activity_id: Uuid) -> Result<Option<ImportedActivity>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, user_id, source, external_id, name, summary_polyline,
                        distance_m, duration_s, started_at, status, processed_at, route_id
                 FROM imported_activities WHERE id = ?1",
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        stmt.query_row(params![activity_id.to_string()], Self::row_to_activity)
            .optional()
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?
            .transpose()
    }

    fn row_to_activity(
        row: &rusqlite::Row<'_>,
    ) -> Result<Result<ImportedActivity, DatabaseError>, rusqlite::Error> {
        let id_str: String = row.get(0)?;
        let user_str: String = row.get(1)?;
        let source_str: String = row.get(2)?;
        let external_id: String = row.get(3)?;
        let name: String = row.get(4)?;
        let summary_polyline: String = row.get(5)?;
        let distance_m: f64 = row.get(6)?;
        let duration_s: i64 = row.get(7)?;
        let started_str: Option<String> = row.get(8)?;
        let status_str: String = row.get(9)?;
        let processed_str: Option<String> = row.get(10)?;
        let route_str: Option<String> = row.get(11)?;

        Ok(Self::build_activity(
            id_str,
            user_str,
            source_str,
            external_id,
            name,
            summary_polyline,
            distance_m,
            duration_s,
            started_str,
            status_str,
            processed_str,
            route_str,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn build_activity(
        id_str: String,
        user_str: String,
        source_str: String,
        external_id: String,
        name: String,
        summary_polyline: String,
        distance_m: f64,
        duration_s: i64,
        started_str: Option<String>,
        status_str: String,
        processed_str: Option<String>,
        route_str: Option<String>,
    ) -> Result<ImportedActivity, DatabaseError> {
        let parse_time = |s: &str| {
            DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))
        };

        Ok(ImportedActivity {
            id: Uuid::parse_str(&id_str).map_err(|e| DatabaseError::QueryFailed(e.to_string()))?,
            user_id: Uuid::parse_str(&user_str)
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?,
            source: ActivitySource::from_str(&source_str).ok_or_else(|| {
                DatabaseError::SerializationError(format!("unknown source {source_str}"))
            })?,
            external_id,
            name,
            summary_polyline,
            distance_m,
            duration_s,
            started_at: started_str.as_deref().map(parse_time).transpose()?,
            status: ImportStatus::from_str(&status_str).ok_or_else(|| {
                DatabaseError::SerializationError(format!("unknown status {status_str}"))
            })?,
            processed_at: processed_str.as_deref().map(parse_time).transpose()?,
            route_id: route_str
                .map(|s| {
                    Uuid::parse_str(&s).map_err(|e| DatabaseError::QueryFailed(e.to_string()))
                })
                .transpose()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::Database;
    use crate::storage::user_store::UserStore;

    fn new_activity(user: Uuid, external_id: &str, minute: Option<u32>) -> NewImportedActivity {
        use chrono::TimeZone;
        NewImportedActivity {
            user_id: user,
            source: ActivitySource::Strava,
            external_id: external_id.to_string(),
            name: "imported run".to_string(),
            summary_polyline: "_p~iF~ps|U_ulLnnqC".to_string(),
            distance_m: 5000.0,
            duration_s: 1500,
            started_at: minute
                .map(|m| Utc.with_ymd_and_hms(2025, 5, 1, 7, m, 0).unwrap()),
        }
    }

    #[test]
    fn enqueue_and_drain_oldest_first() {
        let db = Database::open_in_memory().unwrap();
        let user = Uuid::new_v4();
        UserStore::new(db.connection()).upsert_user(user, "ana").unwrap();
        let store = ImportStore::new(db.connection());

        store.enqueue(&new_activity(user, "a2", Some(30))).unwrap();
        store.enqueue(&new_activity(user, "a1", Some(5))).unwrap();
        assert_eq!(store.count_pending().unwrap(), 2);

        let next = store.next_pending().unwrap().unwrap();
        assert_eq!(next.external_id, "a1");
    }

    #[test]
    fn duplicate_external_id_is_ignored() {
        let db = Database::open_in_memory().unwrap();
        let user = Uuid::new_v4();
        UserStore::new(db.connection()).upsert_user(user, "ana").unwrap();
        let store = ImportStore::new(db.connection());

        store.enqueue(&new_activity(user, "same", Some(5))).unwrap();
        store.enqueue(&new_activity(user, "same", Some(5))).unwrap();
        assert_eq!(store.count_pending().unwrap(), 1);
    }

    #[test]
    fn mark_and_requeue_cycle() {
        let db = Database::open_in_memory().unwrap();
        let user = Uuid::new_v4();
        UserStore::new(db.connection()).upsert_user(user, "ana").unwrap();
        let store = ImportStore::new(db.connection());

        let id = store.enqueue(&new_activity(user, "a1", Some(5))).unwrap();
        store.mark(id, ImportStatus::Failed, None).unwrap();
        assert_eq!(store.count_pending().unwrap(), 0);
        let failed = store.get(id).unwrap().unwrap();
        assert_eq!(failed.status, ImportStatus::Failed);
        assert!(failed.processed_at.is_some());

        store.requeue(id).unwrap();
        assert_eq!(store.count_pending().unwrap(), 1);
        let pending = store.get(id).unwrap().unwrap();
        assert_eq!(pending.status, ImportStatus::Pending);
        assert!(pending.processed_at.is_none());
    }

    #[test]
    fn requeue_of_unknown_id_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let store = ImportStore::new(db.connection());
        assert!(matches!(
            store.requeue(Uuid::new_v4()),
            Err(DatabaseError::NotFound(_))
        ));
    }

    #[test]
    fn missing_start_time_sorts_last() {
        let db = Database::open_in_memory().unwrap();
        let user = Uuid::new_v4();
        UserStore::new(db.connection()).upsert_user(user, "ana").unwrap();
        let store = ImportStore::new(db.connection());

        store.enqueue(&new_activity(user, "broken", None)).unwrap();
        store.enqueue(&new_activity(user, "ok", Some(5))).unwrap();

        let next = store.next_pending().unwrap().unwrap();
        assert_eq!(next.external_id, "ok");
    }
}
