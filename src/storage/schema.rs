//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Clawdgle database.
//! The frontier, seen set, politeness records, stats and heartbeat live here,
//! as does the document table used by the SQLite search index.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Pending crawl tasks, popped in insertion order
CREATE TABLE IF NOT EXISTS frontier (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    payload TEXT NOT NULL,
    enqueued_at INTEGER NOT NULL
);

-- URLs that have won the dedup gate
CREATE TABLE IF NOT EXISTS seen (
    url TEXT PRIMARY KEY,
    seen_at INTEGER NOT NULL
);

-- Last fetch time per origin, in unix milliseconds
CREATE TABLE IF NOT EXISTS host_politeness (
    host TEXT PRIMARY KEY,
    last_fetch_ms INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS crawl_stats (
    name TEXT PRIMARY KEY,
    value INTEGER NOT NULL DEFAULT 0
);

-- Single-row liveness record
CREATE TABLE IF NOT EXISTS heartbeat (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    ts INTEGER NOT NULL,
    expires_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS collections (
    name TEXT PRIMARY KEY,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL REFERENCES collections(name),
    id TEXT NOT NULL,
    url TEXT NOT NULL,
    title TEXT,
    content TEXT,
    storage_key TEXT NOT NULL,
    fetched_at INTEGER NOT NULL,
    PRIMARY KEY (collection, id)
);

CREATE INDEX IF NOT EXISTS idx_documents_url ON documents(collection, url);
CREATE INDEX IF NOT EXISTS idx_documents_fetched_at ON documents(collection, fetched_at);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
