//! Database schema definitions for the conquest engine.

/// SQL schema for creating all database tables.
pub const SCHEMA: &str = r#"
-- Users table
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    total_area_m2 REAL NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

-- Mutual friendships, stored as one row per direction
CREATE TABLE IF NOT EXISTS friendships (
    user_id TEXT NOT NULL REFERENCES users(id),
    friend_id TEXT NOT NULL REFERENCES users(id),
    created_at TEXT NOT NULL,
    PRIMARY KEY (user_id, friend_id)
);

CREATE INDEX IF NOT EXISTS idx_friendships_user_id ON friendships(user_id);

-- Routes table; coordinates are a JSON array of [lat, lng] pairs
CREATE TABLE IF NOT EXISTS routes (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL REFERENCES users(id),
    name TEXT NOT NULL,
    coordinates_json TEXT NOT NULL,
    distance_m REAL NOT NULL,
    duration_s INTEGER NOT NULL,
    started_at TEXT NOT NULL,
    completed_at TEXT NOT NULL,
    ran_together_json TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_routes_owner_id ON routes(owner_id);
CREATE INDEX IF NOT EXISTS idx_routes_completed_at ON routes(completed_at);

-- Territories: at most one unified holding per user, GeoJSON geometry
CREATE TABLE IF NOT EXISTS territories (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL UNIQUE REFERENCES users(id),
    geometry_json TEXT NOT NULL,
    area_m2 REAL NOT NULL,
    route_id TEXT REFERENCES routes(id),
    conquered_at TEXT NOT NULL
);

-- Append-only conquest ledger
CREATE TABLE IF NOT EXISTS conquest_metrics (
    id TEXT PRIMARY KEY,
    attacker_id TEXT NOT NULL REFERENCES users(id),
    defender_id TEXT NOT NULL REFERENCES users(id),
    area_m2 REAL NOT NULL,
    route_id TEXT,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_metrics_attacker_id ON conquest_metrics(attacker_id);
CREATE INDEX IF NOT EXISTS idx_metrics_defender_id ON conquest_metrics(defender_id);

-- Import queue for third-party activities
CREATE TABLE IF NOT EXISTS imported_activities (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id),
    source TEXT NOT NULL,
    external_id TEXT NOT NULL,
    name TEXT NOT NULL,
    summary_polyline TEXT NOT NULL,
    distance_m REAL NOT NULL,
    duration_s INTEGER NOT NULL,
    started_at TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    processed_at TEXT,
    route_id TEXT REFERENCES routes(id),
    UNIQUE(source, external_id)
);

CREATE INDEX IF NOT EXISTS idx_imports_status ON imported_activities(status);
"#;

/// SQL for the schema version tracking table.
pub const SCHEMA_VERSION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);
"#;

/// Current schema version.
pub const CURRENT_VERSION: i32 = 1;
