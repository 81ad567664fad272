//! Route persistence.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::geometry::{trace_from_json, trace_to_json};
use crate::storage::database::DatabaseError;
use crate::territory::types::Route;

/// Store for completed routes.
pub struct RouteStore<'a> {
    conn: &'a Connection,
}

impl<'a> RouteStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn insert_route(&self, route: &Route) -> Result<(), DatabaseError> {
        let coordinates_json = trace_to_json(&route.coordinates)
            .map_err(|e| DatabaseError::SerializationError(e.to_string()))?;
        let ran_together_json = serde_json::to_string(
            &route
                .ran_together_with
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<String>>(),
        )
        .map_err(|e| DatabaseError::SerializationError(e.to_string()))?;

        self.conn
            .execute(
                "INSERT INTO routes (id, owner_id, name, coordinates_json, distance_m,
                                     duration_s, started_at, completed_at, ran_together_json,
                                     created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    route.id.to_string(),
                    route.owner_id.to_string(),
                    route.name,
                    coordinates_json,
                    route.distance_m,
                    route.duration_s,
                    route.started_at.to_rfc3339(),
                    route.completed_at.to_rfc3339(),
                    ran_together_json,
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        Ok(())
    }

    pub fn get_route(&self, route_id: Uuid) -> Result<Option<Route>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, owner_id, name, coordinates_json, distance_m, duration_s,
                        started_at, completed_at, ran_together_json
                 FROM routes WHERE id = ?1",
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let mut rows = stmt
            .query(params![route_id.to_string()])
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        if let Some(row) = rows
            .next()
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?
        {
            Ok(Some(Self::row_to_route(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn delete_route(&self, route_id: Uuid) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "DELETE FROM routes WHERE id = ?1",
                params![route_id.to_string()],
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        Ok(())
    }

    pub fn rename_route(&self, route_id: Uuid, name: &str) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "UPDATE routes SET name = ?2 WHERE id = ?1",
                params![route_id.to_string(), name],
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        Ok(())
    }

    /// Replace the ran-together annotation.
    pub fn set_ran_together(
        &self,
        route_id: Uuid,
        user_ids: &[Uuid],
    ) -> Result<(), DatabaseError> {
        let json = serde_json::to_string(
            &user_ids.iter().map(|id| id.to_string()).collect::<Vec<String>>(),
        )
        .map_err(|e| DatabaseError::SerializationError(e.to_string()))?;

        self.conn
            .execute(
                "UPDATE routes SET ran_together_json = ?2 WHERE id = ?1",
                params![route_id.to_string(), json],
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        Ok(())
    }

    /// Routes for a single user, oldest completed first.
    pub fn routes_for_user(&self, user_id: Uuid) -> Result<Vec<Route>, DatabaseError> {
        self.routes_for_users(&[user_id])
    }

    /// Routes for a set of users, oldest completed first. Ties are broken by
    /// start time and then id so a replay is fully deterministic.
    pub fn routes_for_users(&self, user_ids: &[Uuid]) -> Result<Vec<Route>, DatabaseError> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = (1..=user_ids.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<String>>()
            .join(", ");
        let sql = format!(
            "SELECT id, owner_id, name, coordinates_json, distance_m, duration_s,
                    started_at, completed_at, ran_together_json
             FROM routes WHERE owner_id IN ({placeholders})
             ORDER BY completed_at ASC, started_at ASC, id ASC"
        );

        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let id_strings: Vec<String> = user_ids.iter().map(|id| id.to_string()).collect();
        let mut rows = stmt
            .query(rusqlite::params_from_iter(id_strings.iter()))
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let mut routes = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?
        {
            routes.push(Self::row_to_route(row)?);
        }
        Ok(routes)
    }

    fn row_to_route(row: &rusqlite::Row<'_>) -> Result<Route, DatabaseError> {
        let id_str: String = row
            .get(0)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        let owner_str: String = row
            .get(1)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        let coordinates_json: String = row
            .get(3)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        let started_str: String = row
            .get(6)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        let completed_str: String = row
            .get(7)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        let ran_together_json: String = row
            .get(8)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let ran_together: Vec<String> = serde_json::from_str(&ran_together_json)
            .map_err(|e| DatabaseError::SerializationError(e.to_string()))?;

        Ok(Route {
            id: Uuid::parse_str(&id_str).map_err(|e| DatabaseError::QueryFailed(e.to_string()))?,
            owner_id: Uuid::parse_str(&owner_str)
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?,
            name: row
                .get(2)
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?,
            coordinates: trace_from_json(&coordinates_json)
                .map_err(|e| DatabaseError::SerializationError(e.to_string()))?,
            distance_m: row
                .get(4)
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?,
            duration_s: row
                .get(5)
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?,
            started_at: DateTime::parse_from_rfc3339(&started_str)
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?
                .with_timezone(&Utc),
            completed_at: DateTime::parse_from_rfc3339(&completed_str)
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?
                .with_timezone(&Utc),
            ran_together_with: ran_together
                .iter()
                .map(|s| {
                    Uuid::parse_str(s).map_err(|e| DatabaseError::QueryFailed(e.to_string()))
                })
                .collect::<Result<Vec<Uuid>, DatabaseError>>()?,
        })
    }
}
