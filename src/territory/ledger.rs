//! Append-only conquest ledger.
//!
//! Rows are only ever inserted, or bulk-cleared for a friend group when a
//! chronological reprocess rebuilds history. Nothing updates a row in place;
//! aggregate stats are computed from the raw rows.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::storage::database::DatabaseError;
use crate::territory::types::ConquestMetric;

/// Store for conquest metrics.
pub struct ConquestLedger<'a> {
    conn: &'a Connection,
}

impl<'a> ConquestLedger<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Append one conquest row.
    pub fn record(
        &self,
        attacker_id: Uuid,
        defender_id: Uuid,
        area_m2: f64,
        route_id: Option<Uuid>,
        recorded_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "INSERT INTO conquest_metrics (id, attacker_id, defender_id, area_m2,
                                               route_id, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    Uuid::new_v4().to_string(),
                    attacker_id.to_string(),
                    defender_id.to_string(),
                    area_m2,
                    route_id.map(|id| id.to_string()),
                    recorded_at.to_rfc3339(),
                ],
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        Ok(())
    }

    /// Bulk-clear every row involving the given users. Only a friend-group
    /// reprocess may call this.
    pub fn clear_for_users(&self, user_ids: &[Uuid]) -> Result<(), DatabaseError> {
        for user_id in user_ids {
            self.conn
                .execute(
                    "DELETE FROM conquest_metrics WHERE attacker_id = ?1 OR defender_id = ?1",
                    params![user_id.to_string()],
                )
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        }
        Ok(())
    }

    /// Total area a user has taken from rivals.
    pub fn total_stolen_by(&self, user_id: Uuid) -> Result<f64, DatabaseError> {
        self.sum_where("attacker_id", user_id)
    }

    /// Total area a user has lost to rivals.
    pub fn total_lost_by(&self, user_id: Uuid) -> Result<f64, DatabaseError> {
        self.sum_where("defender_id", user_id)
    }

    /// Every row where the user attacked or defended, newest first.
    pub fn metrics_for_user(&self, user_id: Uuid) -> Result<Vec<ConquestMetric>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, attacker_id, defender_id, area_m2, route_id, recorded_at
                 FROM conquest_metrics
                 WHERE attacker_id = ?1 OR defender_id = ?1
                 ORDER BY recorded_at DESC, id DESC",
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let mut rows = stmt
            .query(params![user_id.to_string()])
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let mut metrics = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?
        {
            metrics.push(Self::row_to_metric(row)?);
        }
        Ok(metrics)
    }

    fn sum_where(&self, column: &str, user_id: Uuid) -> Result<f64, DatabaseError> {
        // Column name is one of two literals above, never user input.
        let sql =
            format!("SELECT COALESCE(SUM(area_m2), 0) FROM conquest_metrics WHERE {column} = ?1");
        self.conn
            .query_row(&sql, params![user_id.to_string()], |row| row.get(0))
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))
    }

    fn row_to_metric(row: &rusqlite::Row<'_>) -> Result<ConquestMetric, DatabaseError> {
        let id_str: String = row
            .get(0)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        let attacker_str: String = row
            .get(1)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        let defender_str: String = row
            .get(2)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        let route_str: Option<String> = row
            .get(4)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        let recorded_str: String = row
            .get(5)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        Ok(ConquestMetric {
            id: Uuid::parse_str(&id_str).map_err(|e| DatabaseError::QueryFailed(e.to_string()))?,
            attacker_id: Uuid::parse_str(&attacker_str)
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?,
            defender_id: Uuid::parse_str(&defender_str)
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?,
            area_m2: row
                .get(3)
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?,
            route_id: route_str
                .map(|s| {
                    Uuid::parse_str(&s).map_err(|e| DatabaseError::QueryFailed(e.to_string()))
                })
                .transpose()?,
            recorded_at: DateTime::parse_from_rfc3339(&recorded_str)
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?
                .with_timezone(&Utc),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::Database;
    use crate::storage::user_store::UserStore;

    #[test]
    fn record_and_aggregate() {
        let db = Database::open_in_memory().unwrap();
        let users = UserStore::new(db.connection());
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        users.upsert_user(a, "a").unwrap();
        users.upsert_user(b, "b").unwrap();

        let ledger = ConquestLedger::new(db.connection());
        ledger.record(a, b, 100.0, None, Utc::now()).unwrap();
        ledger.record(a, b, 50.0, None, Utc::now()).unwrap();
        ledger.record(b, a, 10.0, None, Utc::now()).unwrap();

        assert!((ledger.total_stolen_by(a).unwrap() - 150.0).abs() < 1e-9);
        assert!((ledger.total_lost_by(a).unwrap() - 10.0).abs() < 1e-9);
        assert!((ledger.total_lost_by(b).unwrap() - 150.0).abs() < 1e-9);
        assert_eq!(ledger.metrics_for_user(a).unwrap().len(), 3);
    }

    #[test]
    fn clear_only_touches_the_group() {
        let db = Database::open_in_memory().unwrap();
        let users = UserStore::new(db.connection());
        let (a, b, outsider) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        for (id, name) in [(a, "a"), (b, "b"), (outsider, "x")] {
            users.upsert_user(id, name).unwrap();
        }

        let ledger = ConquestLedger::new(db.connection());
        ledger.record(a, b, 100.0, None, Utc::now()).unwrap();
        ledger
            .record(outsider, outsider, 5.0, None, Utc::now())
            .unwrap();

        ledger.clear_for_users(&[a, b]).unwrap();
        assert_eq!(ledger.total_stolen_by(a).unwrap(), 0.0);
        assert!((ledger.total_stolen_by(outsider).unwrap() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn empty_ledger_sums_to_zero() {
        let db = Database::open_in_memory().unwrap();
        let ledger = ConquestLedger::new(db.connection());
        assert_eq!(ledger.total_stolen_by(Uuid::new_v4()).unwrap(), 0.0);
    }
}
