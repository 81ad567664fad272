//! Territory persistence.
//!
//! One unified holding per user, enforced by a `UNIQUE(owner_id)` constraint
//! and a single-statement upsert — never a separate delete followed by an
//! insert, which would leave a window with no row.

use chrono::{DateTime, Utc};
use geo::MultiPolygon;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::geometry::{holding_from_geojson, holding_to_geojson};
use crate::storage::database::DatabaseError;
use crate::territory::types::Territory;

/// Store for per-user unified holdings.
pub struct TerritoryStore<'a> {
    conn: &'a Connection,
}

impl<'a> TerritoryStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Replace or create the owner's single territory row atomically.
    /// Returns the row id (stable across updates of an existing row).
    pub fn replace_for_owner(
        &self,
        owner_id: Uuid,
        route_id: Option<Uuid>,
        geometry: &MultiPolygon<f64>,
        area_m2: f64,
    ) -> Result<Uuid, DatabaseError> {
        let geometry_json = holding_to_geojson(geometry)
            .map_err(|e| DatabaseError::SerializationError(e.to_string()))?;
        let new_id = Uuid::new_v4();

        self.conn
            .execute(
                "INSERT INTO territories (id, owner_id, geometry_json, area_m2, route_id,
                                          conquered_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(owner_id) DO UPDATE SET
                     geometry_json = excluded.geometry_json,
                     area_m2 = excluded.area_m2,
                     route_id = excluded.route_id,
                     conquered_at = excluded.conquered_at",
                params![
                    new_id.to_string(),
                    owner_id.to_string(),
                    geometry_json,
                    area_m2,
                    route_id.map(|id| id.to_string()),
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let id_str: String = self
            .conn
            .query_row(
                "SELECT id FROM territories WHERE owner_id = ?1",
                params![owner_id.to_string()],
                |row| row.get(0),
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        Uuid::parse_str(&id_str).map_err(|e| DatabaseError::QueryFailed(e.to_string()))
    }

    /// Overwrite an existing row's geometry and area (a partial steal).
    pub fn update_geometry(
        &self,
        territory_id: Uuid,
        geometry: &MultiPolygon<f64>,
        area_m2: f64,
    ) -> Result<(), DatabaseError> {
        let geometry_json = holding_to_geojson(geometry)
            .map_err(|e| DatabaseError::SerializationError(e.to_string()))?;
        self.conn
            .execute(
                "UPDATE territories SET geometry_json = ?2, area_m2 = ?3 WHERE id = ?1",
                params![territory_id.to_string(), geometry_json, area_m2],
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        Ok(())
    }

    /// Delete a fully consumed territory.
    pub fn delete(&self, territory_id: Uuid) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "DELETE FROM territories WHERE id = ?1",
                params![territory_id.to_string()],
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        Ok(())
    }

    /// Delete every holding owned by the given users (reprocess reset).
    pub fn delete_for_owners(&self, owner_ids: &[Uuid]) -> Result<(), DatabaseError> {
        for owner_id in owner_ids {
            self.conn
                .execute(
                    "DELETE FROM territories WHERE owner_id = ?1",
                    params![owner_id.to_string()],
                )
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        }
        Ok(())
    }

    pub fn get_by_owner(&self, owner_id: Uuid) -> Result<Option<Territory>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, owner_id, geometry_json, area_m2, route_id, conquered_at
                 FROM territories WHERE owner_id = ?1",
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        stmt.query_row(params![owner_id.to_string()], Self::row_to_territory)
            .optional()
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?
            .transpose()
    }

    /// Every holding on the map.
    pub fn get_all(&self) -> Result<Vec<Territory>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, owner_id, geometry_json, area_m2, route_id, conquered_at
                 FROM territories ORDER BY owner_id",
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map([], Self::row_to_territory)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?
            .collect::<Result<Vec<Result<Territory, DatabaseError>>, _>>()
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        rows.into_iter().collect()
    }

    /// Detach provenance from a deleted route.
    pub fn clear_route_provenance(&self, route_id: Uuid) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "UPDATE territories SET route_id = NULL WHERE route_id = ?1",
                params![route_id.to_string()],
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        Ok(())
    }

    fn row_to_territory(
        row: &rusqlite::Row<'_>,
    ) -> Result<Result<Territory, DatabaseError>, rusqlite::Error> {
        let id_str: String = row.get(0)?;
        let owner_str: String = row.get(1)?;
        let geometry_json: String = row.get(2)?;
        let area_m2: f64 = row.get(3)?;
        let route_str: Option<String> = row.get(4)?;
        let conquered_str: String = row.get(5)?;

        Ok(Self::build_territory(
            id_str,
            owner_str,
            geometry_json,
            area_m2,
            route_str,
            conquered_str,
        ))
    }

    fn build_territory(
        id_str: String,
        owner_str: String,
        geometry_json: String,
        area_m2: f64,
        route_str: Option<String>,
        conquered_str: String,
    ) -> Result<Territory, DatabaseError> {
        Ok(Territory {
            id: Uuid::parse_str(&id_str).map_err(|e| DatabaseError::QueryFailed(e.to_string()))?,
            owner_id: Uuid::parse_str(&owner_str)
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?,
            geometry: holding_from_geojson(&geometry_json)
                .map_err(|e| DatabaseError::SerializationError(e.to_string()))?,
            area_m2,
            route_id: route_str
                .map(|s| {
                    Uuid::parse_str(&s).map_err(|e| DatabaseError::QueryFailed(e.to_string()))
                })
                .transpose()?,
            conquered_at: DateTime::parse_from_rfc3339(&conquered_str)
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?
                .with_timezone(&Utc),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, Polygon};

    use crate::geometry::LatLng;
    use crate::storage::database::Database;
    use crate::storage::route_store::RouteStore;
    use crate::storage::user_store::UserStore;
    use crate::territory::types::Route;

    fn square() -> MultiPolygon<f64> {
        MultiPolygon::new(vec![Polygon::new(
            LineString::from(vec![
                (-3.0, 40.0),
                (-2.99, 40.0),
                (-2.99, 40.01),
                (-3.0, 40.01),
                (-3.0, 40.0),
            ]),
            vec![],
        )])
    }

    #[test]
    fn replace_creates_then_updates_single_row() {
        let db = Database::open_in_memory().unwrap();
        let owner = Uuid::new_v4();
        UserStore::new(db.connection()).upsert_user(owner, "ana").unwrap();
        let store = TerritoryStore::new(db.connection());

        let first_id = store
            .replace_for_owner(owner, None, &square(), 1000.0)
            .unwrap();
        let second_id = store
            .replace_for_owner(owner, None, &square(), 2000.0)
            .unwrap();

        // The upsert keeps the original row id.
        assert_eq!(first_id, second_id);
        let all = store.get_all().unwrap();
        assert_eq!(all.len(), 1);
        assert!((all[0].area_m2 - 2000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn geometry_round_trips_through_geojson_column() {
        let db = Database::open_in_memory().unwrap();
        let owner = Uuid::new_v4();
        UserStore::new(db.connection()).upsert_user(owner, "ana").unwrap();
        let store = TerritoryStore::new(db.connection());

        store
            .replace_for_owner(owner, None, &square(), 1000.0)
            .unwrap();
        let loaded = store.get_by_owner(owner).unwrap().unwrap();
        assert_eq!(loaded.geometry, square());
    }

    #[test]
    fn delete_for_owners_resets_the_group() {
        let db = Database::open_in_memory().unwrap();
        let users = UserStore::new(db.connection());
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        users.upsert_user(a, "a").unwrap();
        users.upsert_user(b, "b").unwrap();
        let store = TerritoryStore::new(db.connection());

        store.replace_for_owner(a, None, &square(), 1.0).unwrap();
        store.replace_for_owner(b, None, &square(), 2.0).unwrap();
        store.delete_for_owners(&[a, b]).unwrap();
        assert!(store.get_all().unwrap().is_empty());
    }

    #[test]
    fn provenance_clears_when_route_is_deleted() {
        let db = Database::open_in_memory().unwrap();
        let owner = Uuid::new_v4();
        UserStore::new(db.connection()).upsert_user(owner, "ana").unwrap();
        let store = TerritoryStore::new(db.connection());

        let route = Route {
            id: Uuid::new_v4(),
            owner_id: owner,
            name: "run".to_string(),
            coordinates: vec![
                LatLng::new(40.0, -3.0),
                LatLng::new(40.005, -3.0),
                LatLng::new(40.01, -3.0),
            ],
            distance_m: 1100.0,
            duration_s: 420,
            started_at: Utc::now(),
            completed_at: Utc::now(),
            ran_together_with: Vec::new(),
        };
        RouteStore::new(db.connection()).insert_route(&route).unwrap();

        store
            .replace_for_owner(owner, Some(route.id), &square(), 1.0)
            .unwrap();
        store.clear_route_provenance(route.id).unwrap();

        let loaded = store.get_by_owner(owner).unwrap().unwrap();
        assert!(loaded.route_id.is_none());
    }
}
