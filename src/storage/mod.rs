//! Storage module for database and per-concern stores.

pub mod database;
pub mod import_store;
pub mod route_store;
pub mod schema;
pub mod territory_store;
pub mod user_store;

pub use database::{Database, DatabaseError};
pub use import_store::ImportStore;
pub use route_store::RouteStore;
pub use territory_store::TerritoryStore;
pub use user_store::UserStore;
