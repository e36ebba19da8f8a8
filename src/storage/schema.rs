//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Star-Ripple database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per repository, keyed by the GitHub database id
CREATE TABLE IF NOT EXISTS repositories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    external_id INTEGER NOT NULL UNIQUE CHECK (external_id > 0),
    name TEXT NOT NULL CHECK (name <> ''),
    owner TEXT NOT NULL CHECK (owner <> ''),
    stars INTEGER NOT NULL CHECK (stars >= 0),
    forks INTEGER,
    open_issues INTEGER,
    observed_at TEXT NOT NULL,
    first_seen_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_repositories_owner_name ON repositories(owner, name);
CREATE INDEX IF NOT EXISTS idx_repositories_stars ON repositories(stars DESC);

-- Crawl progress; inactive rows are kept as history
CREATE TABLE IF NOT EXISTS checkpoints (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filter TEXT NOT NULL,
    cursor TEXT,
    processed_count INTEGER NOT NULL DEFAULT 0 CHECK (processed_count >= 0),
    quota_remaining INTEGER,
    quota_reset_at TEXT,
    active INTEGER NOT NULL DEFAULT 1,
    started_at TEXT NOT NULL,
    last_update TEXT NOT NULL
);

-- At most one active checkpoint
CREATE UNIQUE INDEX IF NOT EXISTS idx_checkpoints_single_active
    ON checkpoints(active) WHERE active = 1;
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
