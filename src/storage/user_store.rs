//! User and friendship persistence.

use chrono::Utc;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::storage::database::DatabaseError;
use crate::territory::types::User;

/// Store for users and the mutual-friendship graph.
pub struct UserStore<'a> {
    conn: &'a Connection,
}

impl<'a> UserStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert a user, or update the name if the id already exists.
    pub fn upsert_user(&self, id: Uuid, name: &str) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "INSERT INTO users (id, name, total_area_m2, created_at)
                 VALUES (?1, ?2, 0, ?3)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name",
                params![id.to_string(), name, Utc::now().to_rfc3339()],
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        Ok(())
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<User>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, total_area_m2 FROM users WHERE id = ?1")
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let mut rows = stmt
            .query(params![id.to_string()])
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        if let Some(row) = rows
            .next()
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?
        {
            let id_str: String = row
                .get(0)
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
            Ok(Some(User {
                id: Uuid::parse_str(&id_str)
                    .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?,
                name: row
                    .get(1)
                    .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?,
                total_area_m2: row
                    .get(2)
                    .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?,
            }))
        } else {
            Ok(None)
        }
    }

    /// Update the cached holdings total shown on leaderboards.
    pub fn update_total_area(&self, user_id: Uuid, total_area_m2: f64) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "UPDATE users SET total_area_m2 = ?2 WHERE id = ?1",
                params![user_id.to_string(), total_area_m2],
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        Ok(())
    }

    /// Record a mutual friendship: one row per direction.
    pub fn add_friendship(&self, a: Uuid, b: Uuid) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        for (from, to) in [(a, b), (b, a)] {
            self.conn
                .execute(
                    "INSERT OR IGNORE INTO friendships (user_id, friend_id, created_at)
                     VALUES (?1, ?2, ?3)",
                    params![from.to_string(), to.to_string(), now],
                )
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        }
        Ok(())
    }

    /// Remove a mutual friendship in both directions.
    pub fn remove_friendship(&self, a: Uuid, b: Uuid) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "DELETE FROM friendships
                 WHERE (user_id = ?1 AND friend_id = ?2) OR (user_id = ?2 AND friend_id = ?1)",
                params![a.to_string(), b.to_string()],
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        Ok(())
    }

    /// Direct friends of a user.
    pub fn friend_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare("SELECT friend_id FROM friendships WHERE user_id = ?1 ORDER BY friend_id")
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let ids = stmt
            .query_map(params![user_id.to_string()], |row| {
                row.get::<_, String>(0)
            })
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?
            .collect::<Result<Vec<String>, _>>()
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        ids.iter()
            .map(|s| Uuid::parse_str(s).map_err(|e| DatabaseError::QueryFailed(e.to_string())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::Database;

    #[test]
    fn upsert_user_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let store = UserStore::new(db.connection());
        let id = Uuid::new_v4();

        store.upsert_user(id, "ana").unwrap();
        store.upsert_user(id, "ana maria").unwrap();

        let user = store.get_user(id).unwrap().unwrap();
        assert_eq!(user.name, "ana maria");
        assert_eq!(user.total_area_m2, 0.0);
    }

    #[test]
    fn friendship_is_mutual_and_removable() {
        let db = Database::open_in_memory().unwrap();
        let store = UserStore::new(db.connection());
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        store.upsert_user(a, "a").unwrap();
        store.upsert_user(b, "b").unwrap();

        store.add_friendship(a, b).unwrap();
        assert_eq!(store.friend_ids(a).unwrap(), vec![b]);
        assert_eq!(store.friend_ids(b).unwrap(), vec![a]);

        // Re-adding is a no-op
        store.add_friendship(b, a).unwrap();
        assert_eq!(store.friend_ids(a).unwrap().len(), 1);

        store.remove_friendship(a, b).unwrap();
        assert!(store.friend_ids(a).unwrap().is_empty());
        assert!(store.friend_ids(b).unwrap().is_empty());
    }

    #[test]
    fn total_area_updates() {
        let db = Database::open_in_memory().unwrap();
        let store = UserStore::new(db.connection());
        let id = Uuid::new_v4();
        store.upsert_user(id, "ana").unwrap();

        store.update_total_area(id, 1234.5).unwrap();
        let user = store.get_user(id).unwrap().unwrap();
        assert!((user.total_area_m2 - 1234.5).abs() < f64::EPSILON);
    }
}
