//! Database Migrations
//!
//! Schema migration definitions for the storage layer.

use rusqlite::Connection;

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "Initial schema: items, artifacts, links, vectors, feedback",
    up: MIGRATION_V1_UP,
}];

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// V1: Initial schema
const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS artifacts (
    workspace_id TEXT NOT NULL,
    id TEXT NOT NULL,
    thread_id TEXT NOT NULL,
    content_type TEXT NOT NULL,
    body TEXT NOT NULL,
    content_hash INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (workspace_id, id)
);

CREATE INDEX IF NOT EXISTS idx_artifacts_dedup
    ON artifacts(workspace_id, thread_id, content_type, content_hash);

CREATE TABLE IF NOT EXISTS items (
    workspace_id TEXT NOT NULL,
    id TEXT NOT NULL,
    thread_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    subtype TEXT NOT NULL,
    summary TEXT NOT NULL,
    body TEXT NOT NULL,
    salience REAL NOT NULL DEFAULT 0.5,
    usage_count INTEGER NOT NULL DEFAULT 0,
    last_accessed_at TEXT NOT NULL,
    created_at TEXT NOT NULL,
    retired_at TEXT,
    state TEXT NOT NULL DEFAULT 'active',
    payload_json TEXT,
    source_artifact_id TEXT NOT NULL,
    source_span_start INTEGER NOT NULL DEFAULT 0,
    source_span_end INTEGER NOT NULL DEFAULT 0,
    content_hash INTEGER NOT NULL,
    embedding_model_id TEXT,
    PRIMARY KEY (workspace_id, id)
);

CREATE INDEX IF NOT EXISTS idx_items_thread ON items(workspace_id, thread_id, created_at);
CREATE INDEX IF NOT EXISTS idx_items_hash ON items(workspace_id, content_hash);
CREATE INDEX IF NOT EXISTS idx_items_state ON items(workspace_id, state);

CREATE TABLE IF NOT EXISTS links (
    workspace_id TEXT NOT NULL,
    from_id TEXT NOT NULL,
    to_id TEXT NOT NULL,
    type TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (workspace_id, from_id, to_id, type)
);

CREATE INDEX IF NOT EXISTS idx_links_from ON links(workspace_id, from_id, type);
CREATE INDEX IF NOT EXISTS idx_links_to ON links(workspace_id, to_id, type);

CREATE TABLE IF NOT EXISTS vectors (
    workspace_id TEXT NOT NULL,
    item_id TEXT NOT NULL,
    model_id TEXT NOT NULL,
    vector BLOB NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (workspace_id, item_id, model_id)
);

CREATE TABLE IF NOT EXISTS feedback (
    workspace_id TEXT NOT NULL,
    item_id TEXT NOT NULL,
    signal TEXT NOT NULL,
    magnitude REAL NOT NULL,
    at TEXT NOT NULL,
    actor TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_feedback_item ON feedback(workspace_id, item_id);

CREATE TABLE IF NOT EXISTS threads (
    workspace_id TEXT NOT NULL,
    thread_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    last_ingest_at TEXT NOT NULL,
    PRIMARY KEY (workspace_id, thread_id)
);

CREATE TABLE IF NOT EXISTS id_sequences (
    workspace_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    next_seq INTEGER NOT NULL DEFAULT 1,
    PRIMARY KEY (workspace_id, kind)
);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);
"#;

/// Apply all pending migrations to the connection
pub fn apply_migrations(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version <= current {
            continue;
        }
        tracing::info!(
            version = migration.version,
            description = migration.description,
            "applying migration"
        );
        conn.execute_batch(migration.up)?;
        conn.execute(
            "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![migration.version, chrono::Utc::now().to_rfc3339()],
        )?;
    }

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
