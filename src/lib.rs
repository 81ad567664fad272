//! RunClaim - GPS Territory Conquest Engine
//!
//! Turns finished GPS-tracked runs into territory on a shared map: each route
//! claims a buffered corridor, overlapping ground is stolen zero-sum from
//! friend-group rivals, and every user holds a single unified territory.
//! History-invalidating changes replay the whole friend group in
//! chronological order, so the map never depends on arrival order.

pub mod geometry;
pub mod notify;
pub mod social;
pub mod storage;
pub mod territory;

// Re-export commonly used types
pub use notify::{LogNotifier, Notifier};
pub use social::FriendGraph;
pub use storage::Database;
pub use territory::{ConquestEngine, ConquestOutcome, EngineConfig, EngineError, NewRoute};
