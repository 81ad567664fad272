//! Friend-group scoping for conquest.
//!
//! Who can conquer whom is a pure function of the live friendship graph,
//! recomputed on every call. Nothing here is cached: a broken or new
//! friendship is reflected by the very next conquest or reprocess without
//! any invalidation logic.

use std::collections::BTreeSet;

use rusqlite::Connection;
use uuid::Uuid;

use crate::storage::database::DatabaseError;
use crate::storage::user_store::UserStore;

/// View over the mutual-friendship graph.
pub struct FriendGraph<'a> {
    conn: &'a Connection,
}

impl<'a> FriendGraph<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Direct friends of a user.
    pub fn friend_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>, DatabaseError> {
        UserStore::new(self.conn).friend_ids(user_id)
    }

    /// The transitive friend group reachable from a user, including the user
    /// themselves. Sorted, so callers iterate members deterministically.
    pub fn friend_group(&self, user_id: Uuid) -> Result<Vec<Uuid>, DatabaseError> {
        let store = UserStore::new(self.conn);
        let mut seen: BTreeSet<Uuid> = BTreeSet::new();
        let mut frontier = vec![user_id];
        seen.insert(user_id);

        while let Some(current) = frontier.pop() {
            for friend in store.friend_ids(current)? {
                if seen.insert(friend) {
                    frontier.push(friend);
                }
            }
        }

        Ok(seen.into_iter().collect())
    }
}
