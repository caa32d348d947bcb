//! SQLite Storage Implementation
//!
//! Durable store for items, artifacts, links, vectors, threads, and the
//! feedback journal. Uses separate reader/writer connections behind mutexes
//! so the store is `Send + Sync` and can be shared as `Arc<MemoryStore>`.
//! Every predicate includes `workspace_id`; references into another
//! workspace behave as if the row did not exist.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::memory::{
    content_hash, Artifact, ContentType, FeedbackRecord, FeedbackSignal, ItemKind, ItemMutation,
    ItemState, ItemSubtype, Link, LinkType, MemoryItem, MemoryStats, SourceSpan,
};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Storage error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// Item or artifact not found in the workspace
    #[error("not found: {0}")]
    NotFound(String),
    /// Link invariant violation
    #[error("conflict between {from_id} and {to_id}: {reason}")]
    Conflict {
        from_id: String,
        to_id: String,
        reason: String,
    },
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Row failed to decode
    #[error("corrupt row: {0}")]
    Corrupt(String),
    /// Connection mutex poisoned by a panicking writer
    #[error("{0}")]
    Lock(&'static str),
}

/// Storage result type
pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for crate::error::MemoryError {
    fn from(err: StoreError) -> Self {
        use crate::error::MemoryError;
        match err {
            StoreError::NotFound(what) => MemoryError::NotFound(what),
            StoreError::Conflict {
                from_id,
                to_id,
                reason,
            } => MemoryError::Conflict {
                from_id,
                to_id,
                reason,
            },
            StoreError::Database(e)
                if matches!(
                    e.sqlite_error_code(),
                    Some(rusqlite::ErrorCode::DatabaseBusy)
                        | Some(rusqlite::ErrorCode::DatabaseLocked)
                ) =>
            {
                MemoryError::TransientDependency(format!("storage busy: {e}"))
            }
            other => MemoryError::internal(other.to_string()),
        }
    }
}

// ============================================================================
// INPUT / OUTPUT RECORDS
// ============================================================================

/// Draft of a new item; the store mints its identifier
#[derive(Debug, Clone)]
pub struct NewItem {
    pub workspace_id: String,
    pub thread_id: String,
    pub subtype: ItemSubtype,
    pub summary: String,
    pub body: String,
    pub salience: f64,
    pub payload: Option<serde_json::Value>,
    pub source_artifact_id: String,
    pub source_span: SourceSpan,
    pub content_hash: u64,
}

/// One persisted vector plus the item metadata the index filters on
#[derive(Debug, Clone)]
pub struct VectorRow {
    pub workspace_id: String,
    pub item_id: String,
    pub model_id: String,
    pub vector: Vec<f32>,
    pub thread_id: String,
    pub kind: ItemKind,
    pub subtype: ItemSubtype,
    pub retired: bool,
}

/// Encode a vector as little-endian f32 bytes
pub fn vector_to_bytes(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Decode a little-endian f32 byte blob
pub fn vector_from_bytes(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

// ============================================================================
// ROW DECODING
// ============================================================================

const ITEM_COLUMNS: &str = "workspace_id, id, thread_id, kind, subtype, summary, body, \
     salience, usage_count, last_accessed_at, created_at, retired_at, state, payload_json, \
     source_artifact_id, source_span_start, source_span_end, content_hash, embedding_model_id";

fn conversion_err(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        message.into(),
    )
}

fn parse_ts(s: &str, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, format!("bad timestamp {s:?}: {e}")))
}

fn item_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryItem> {
    let kind_raw: String = row.get(3)?;
    let subtype_raw: String = row.get(4)?;
    let state_raw: String = row.get(12)?;
    let last_accessed_raw: String = row.get(9)?;
    let created_raw: String = row.get(10)?;
    let retired_raw: Option<String> = row.get(11)?;
    let payload_raw: Option<String> = row.get(13)?;
    let hash_raw: i64 = row.get(17)?;

    Ok(MemoryItem {
        workspace_id: row.get(0)?,
        id: row.get(1)?,
        thread_id: row.get(2)?,
        kind: ItemKind::parse_name(&kind_raw)
            .ok_or_else(|| conversion_err(3, format!("unknown kind {kind_raw:?}")))?,
        subtype: ItemSubtype::parse_name(&subtype_raw)
            .ok_or_else(|| conversion_err(4, format!("unknown subtype {subtype_raw:?}")))?,
        summary: row.get(5)?,
        body: row.get(6)?,
        salience: row.get(7)?,
        usage_count: row.get(8)?,
        last_accessed_at: parse_ts(&last_accessed_raw, 9)?,
        created_at: parse_ts(&created_raw, 10)?,
        retired_at: retired_raw.as_deref().map(|s| parse_ts(s, 11)).transpose()?,
        state: ItemState::parse_name(&state_raw)
            .ok_or_else(|| conversion_err(12, format!("unknown state {state_raw:?}")))?,
        payload: payload_raw
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| conversion_err(13, format!("bad payload json: {e}")))?,
        source_artifact_id: row.get(14)?,
        source_span: SourceSpan::new(
            row.get::<_, i64>(15)? as usize,
            row.get::<_, i64>(16)? as usize,
        ),
        content_hash: hash_raw as u64,
        embedding_model_id: row.get(18)?,
    })
}

fn artifact_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Artifact> {
    let content_type_raw: String = row.get(3)?;
    let created_raw: String = row.get(6)?;
    let hash_raw: i64 = row.get(5)?;
    Ok(Artifact {
        workspace_id: row.get(0)?,
        id: row.get(1)?,
        thread_id: row.get(2)?,
        content_type: ContentType::parse_name(&content_type_raw)
            .ok_or_else(|| conversion_err(3, format!("unknown content type {content_type_raw:?}")))?,
        body: row.get(4)?,
        content_hash: hash_raw as u64,
        created_at: parse_ts(&created_raw, 6)?,
    })
}

// ============================================================================
// MEMORY STORE
// ============================================================================

/// SQLite-backed memory store
pub struct MemoryStore {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl MemoryStore {
    /// Apply PRAGMAs to a connection
    fn configure_connection(conn: &Connection) -> StoreResult<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Open (creating if needed) the store at `path`
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let writer = Connection::open(path)?;
        Self::configure_connection(&writer)?;
        super::migrations::apply_migrations(&writer)?;

        let reader = Connection::open(path)?;
        Self::configure_connection(&reader)?;

        Ok(Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
        })
    }

    fn writer(&self) -> StoreResult<std::sync::MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| StoreError::Lock("writer lock poisoned"))
    }

    fn reader(&self) -> StoreResult<std::sync::MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| StoreError::Lock("reader lock poisoned"))
    }

    // ========================================================================
    // ID MINTING
    // ========================================================================

    fn mint(conn: &Connection, workspace: &str, kind_key: &str, prefix: char) -> StoreResult<String> {
        let seq: i64 = conn.query_row(
            "INSERT INTO id_sequences (workspace_id, kind, next_seq) VALUES (?1, ?2, 2)
             ON CONFLICT(workspace_id, kind) DO UPDATE SET next_seq = next_seq + 1
             RETURNING next_seq - 1",
            params![workspace, kind_key],
            |row| row.get(0),
        )?;
        Ok(format!("{prefix}{seq}"))
    }

    /// Mint the next item identifier for `(workspace, kind)`
    pub fn mint_id(&self, workspace: &str, kind: ItemKind) -> StoreResult<String> {
        Self::mint(&*self.writer()?, workspace, kind.as_str(), kind.id_prefix())

    }

    // ========================================================================
    // ARTIFACTS
    // ========================================================================

    /// Create an artifact, deduplicating identical material per
    /// `(workspace, thread, content_type)`. Returns the artifact and whether
    /// a new row was created.
    pub fn create_artifact(
        &self,
        workspace: &str,
        thread: &str,
        content_type: ContentType,
        body: &str,
    ) -> StoreResult<(Artifact, bool)> {
        let hash = content_hash(body) as i64;
        let writer = self.writer()?;

        let existing = writer
            .query_row(
                "SELECT workspace_id, id, thread_id, content_type, body, content_hash, created_at
                 FROM artifacts
                 WHERE workspace_id = ?1 AND thread_id = ?2 AND content_type = ?3
                   AND content_hash = ?4 AND body = ?5",
                params![workspace, thread, content_type.as_str(), hash, body],
                artifact_from_row,
            )
            .optional()?;
        if let Some(artifact) = existing {
            return Ok((artifact, false));
        }

        let id = Self::mint(&writer, workspace, "artifact", 'A')?;
        let now = Utc::now();
        writer.execute(
            "INSERT INTO artifacts (workspace_id, id, thread_id, content_type, body, content_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                workspace,
                id,
                thread,
                content_type.as_str(),
                body,
                hash,
                now.to_rfc3339()
            ],
        )?;

        writer.execute(
            "INSERT INTO threads (workspace_id, thread_id, created_at, last_ingest_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(workspace_id, thread_id) DO UPDATE SET last_ingest_at = ?3",
            params![workspace, thread, now.to_rfc3339()],
        )?;

        Ok((
            Artifact {
                id,
                workspace_id: workspace.to_string(),
                thread_id: thread.to_string(),
                content_type,
                body: body.to_string(),
                content_hash: hash as u64,
                created_at: now,
            },
            true,
        ))
    }

    /// Fetch an artifact by id
    pub fn get_artifact(&self, workspace: &str, id: &str) -> StoreResult<Option<Artifact>> {
        let reader = self.reader()?;
        let artifact = reader
            .query_row(
                "SELECT workspace_id, id, thread_id, content_type, body, content_hash, created_at
                 FROM artifacts WHERE workspace_id = ?1 AND id = ?2",
                params![workspace, id],
                artifact_from_row,
            )
            .optional()?;
        Ok(artifact)
    }

    // ========================================================================
    // ITEMS
    // ========================================================================

    /// Persist a new item, minting its identifier
    pub fn create_item(&self, draft: NewItem) -> StoreResult<MemoryItem> {
        let kind = draft.subtype.kind();
        let now = Utc::now();
        let writer = self.writer()?;
        let id = Self::mint(&writer, &draft.workspace_id, kind.as_str(), kind.id_prefix())?;

        let payload_json = draft
            .payload
            .as_ref()
            .map(|p| serde_json::to_string(p))
            .transpose()
            .map_err(|e| StoreError::Corrupt(format!("unserializable payload: {e}")))?;

        writer.execute(
            "INSERT INTO items (
                workspace_id, id, thread_id, kind, subtype, summary, body,
                salience, usage_count, last_accessed_at, created_at, retired_at, state,
                payload_json, source_artifact_id, source_span_start, source_span_end,
                content_hash, embedding_model_id
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9, ?9, NULL, 'active', ?10, ?11, ?12, ?13, ?14, NULL)",
            params![
                draft.workspace_id,
                id,
                draft.thread_id,
                kind.as_str(),
                draft.subtype.as_str(),
                draft.summary,
                draft.body,
                draft.salience.clamp(0.0, 1.0),
                now.to_rfc3339(),
                payload_json,
                draft.source_artifact_id,
                draft.source_span.start as i64,
                draft.source_span.end as i64,
                draft.content_hash as i64,
            ],
        )?;

        Ok(MemoryItem {
            id,
            workspace_id: draft.workspace_id,
            thread_id: draft.thread_id,
            kind,
            subtype: draft.subtype,
            summary: draft.summary,
            body: draft.body,
            salience: draft.salience.clamp(0.0, 1.0),
            // Creation counts as the first use
            usage_count: 1,
            created_at: now,
            last_accessed_at: now,
            retired_at: None,
            state: ItemState::Active,
            payload: draft.payload,
            source_artifact_id: draft.source_artifact_id,
            source_span: draft.source_span,
            content_hash: draft.content_hash,
            embedding_model_id: None,
        })
    }

    /// Fetch a single item
    pub fn get_item(&self, workspace: &str, id: &str) -> StoreResult<Option<MemoryItem>> {
        let reader = self.reader()?;
        let item = reader
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM items WHERE workspace_id = ?1 AND id = ?2"),
                params![workspace, id],
                item_from_row,
            )
            .optional()?;
        Ok(item)
    }

    /// Fetch several items; missing ids are omitted
    pub fn get_items(&self, workspace: &str, ids: &[String]) -> StoreResult<Vec<MemoryItem>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE workspace_id = ?1 AND id = ?2"
        ))?;
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(item) = stmt
                .query_row(params![workspace, id], item_from_row)
                .optional()?
            {
                items.push(item);
            }
        }
        Ok(items)
    }

    /// Find a non-retired item by content hash
    pub fn find_by_hash(&self, workspace: &str, hash: u64) -> StoreResult<Option<MemoryItem>> {
        let reader = self.reader()?;
        let item = reader
            .query_row(
                &format!(
                    "SELECT {ITEM_COLUMNS} FROM items
                     WHERE workspace_id = ?1 AND content_hash = ?2 AND state != 'retired'
                     ORDER BY created_at ASC LIMIT 1"
                ),
                params![workspace, hash as i64],
                item_from_row,
            )
            .optional()?;
        Ok(item)
    }

    /// Apply a typed mutation atomically; returns the updated record
    pub fn update_item(
        &self,
        workspace: &str,
        id: &str,
        mutation: &ItemMutation,
    ) -> StoreResult<MemoryItem> {
        let updated = {
            let writer = self.writer()?;
            let mut item = writer
                .query_row(
                    &format!("SELECT {ITEM_COLUMNS} FROM items WHERE workspace_id = ?1 AND id = ?2"),
                    params![workspace, id],
                    item_from_row,
                )
                .optional()?
                .ok_or_else(|| StoreError::NotFound(format!("item {id}")))?;

            if let Some(summary) = &mutation.summary {
                item.summary = summary.clone();
            }
            if let Some(body) = &mutation.body {
                item.body = body.clone();
            }
            if mutation.summary.is_some() || mutation.body.is_some() {
                item.content_hash = crate::memory::item_content_hash(&item.summary, &item.body);
            }
            if mutation.body.is_some() {
                // Body changed: the stored vector no longer describes the item
                item.embedding_model_id = None;
            }
            if let Some(delta) = mutation.salience_delta {
                item.salience = (item.salience + delta).clamp(0.0, 1.0);
            }
            if mutation.usage_increment != 0 {
                item.usage_count = (item.usage_count + mutation.usage_increment).max(0);
            }
            if let Some(payload) = &mutation.payload {
                item.payload = Some(payload.clone());
            }
            if mutation.touch_accessed {
                item.last_accessed_at = Utc::now();
            }
            if mutation.retired == Some(true) && item.state != ItemState::Retired {
                item.state = ItemState::Retired;
                item.retired_at = Some(Utc::now());
            }

            let payload_json = item
                .payload
                .as_ref()
                .map(|p| serde_json::to_string(p))
                .transpose()
                .map_err(|e| StoreError::Corrupt(format!("unserializable payload: {e}")))?;

            writer.execute(
                "UPDATE items SET summary = ?3, body = ?4, salience = ?5, usage_count = ?6,
                    last_accessed_at = ?7, retired_at = ?8, state = ?9, payload_json = ?10,
                    content_hash = ?11, embedding_model_id = ?12
                 WHERE workspace_id = ?1 AND id = ?2",
                params![
                    workspace,
                    id,
                    item.summary,
                    item.body,
                    item.salience,
                    item.usage_count,
                    item.last_accessed_at.to_rfc3339(),
                    item.retired_at.map(|t| t.to_rfc3339()),
                    item.state.as_str(),
                    payload_json,
                    item.content_hash as i64,
                    item.embedding_model_id,
                ],
            )?;
            item
        };

        // Supersession goes through link validation (cycle check, one-superseder)
        if let Some(target) = &mutation.supersedes {
            self.add_link(workspace, id, target, LinkType::Supersedes)?;
        }

        Ok(updated)
    }

    // ========================================================================
    // LINKS
    // ========================================================================

    /// Add a typed link, enforcing the graph invariants
    ///
    /// - `duplicate_of` chains are resolved to the canonical target on write
    /// - `supersedes` rejects cycles and second superseders
    pub fn add_link(
        &self,
        workspace: &str,
        from_id: &str,
        to_id: &str,
        link_type: LinkType,
    ) -> StoreResult<Link> {
        if from_id == to_id {
            return Err(StoreError::Conflict {
                from_id: from_id.to_string(),
                to_id: to_id.to_string(),
                reason: format!("{link_type} link to self"),
            });
        }

        let writer = self.writer()?;

        for id in [from_id, to_id] {
            let exists: bool = writer.query_row(
                "SELECT EXISTS(SELECT 1 FROM items WHERE workspace_id = ?1 AND id = ?2)",
                params![workspace, id],
                |row| row.get(0),
            )?;
            if !exists {
                return Err(StoreError::NotFound(format!("item {id}")));
            }
        }

        let mut resolved_to = to_id.to_string();
        match link_type {
            LinkType::DuplicateOf => {
                // Point at the canonical end of any existing chain
                if let Some(canonical) = Self::link_target(&writer, workspace, &resolved_to, LinkType::DuplicateOf)? {
                    resolved_to = canonical;
                }
                if resolved_to == from_id {
                    return Err(StoreError::Conflict {
                        from_id: from_id.to_string(),
                        to_id: to_id.to_string(),
                        reason: "duplicate_of resolves to self".to_string(),
                    });
                }
                // Items that pointed at `from` follow it to the canonical item
                writer.execute(
                    "UPDATE OR REPLACE links SET to_id = ?3
                     WHERE workspace_id = ?1 AND to_id = ?2 AND type = 'duplicate_of'",
                    params![workspace, from_id, resolved_to],
                )?;
            }
            LinkType::Supersedes => {
                let existing: Option<String> = writer
                    .query_row(
                        "SELECT from_id FROM links
                         WHERE workspace_id = ?1 AND to_id = ?2 AND type = 'supersedes'",
                        params![workspace, to_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                if let Some(superseder) = existing {
                    if superseder != from_id {
                        return Err(StoreError::Conflict {
                            from_id: from_id.to_string(),
                            to_id: to_id.to_string(),
                            reason: format!("already superseded by {superseder}"),
                        });
                    }
                }
                // Each item has at most one superseder, so the ancestry of
                // `from` is a chain; if `to` sits in it, the new edge would
                // close a cycle
                let mut cursor = Some(from_id.to_string());
                while let Some(current) = cursor {
                    let next = Self::superseder_of(&writer, workspace, &current)?;
                    if next.as_deref() == Some(to_id) {
                        return Err(StoreError::Conflict {
                            from_id: from_id.to_string(),
                            to_id: to_id.to_string(),
                            reason: "supersedes cycle".to_string(),
                        });
                    }
                    cursor = next;
                }
            }
            LinkType::RefersTo | LinkType::CausedBy => {}
        }

        let now = Utc::now();
        writer.execute(
            "INSERT OR IGNORE INTO links (workspace_id, from_id, to_id, type, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                workspace,
                from_id,
                resolved_to,
                link_type.as_str(),
                now.to_rfc3339()
            ],
        )?;

        if link_type == LinkType::Supersedes {
            writer.execute(
                "UPDATE items SET state = 'superseded'
                 WHERE workspace_id = ?1 AND id = ?2 AND state = 'active'",
                params![workspace, resolved_to],
            )?;
        }

        Ok(Link {
            from_id: from_id.to_string(),
            to_id: resolved_to,
            link_type,
            created_at: now,
        })
    }

    fn link_target(
        conn: &Connection,
        workspace: &str,
        from_id: &str,
        link_type: LinkType,
    ) -> StoreResult<Option<String>> {
        let target = conn
            .query_row(
                "SELECT to_id FROM links
                 WHERE workspace_id = ?1 AND from_id = ?2 AND type = ?3 LIMIT 1",
                params![workspace, from_id, link_type.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(target)
    }

    /// Who supersedes `id`, if anyone (follows the incoming edge)
    fn superseder_of(conn: &Connection, workspace: &str, id: &str) -> StoreResult<Option<String>> {
        let superseder = conn
            .query_row(
                "SELECT from_id FROM links
                 WHERE workspace_id = ?1 AND to_id = ?2 AND type = 'supersedes' LIMIT 1",
                params![workspace, id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(superseder)
    }

    /// Outgoing links of an item
    pub fn links_from(
        &self,
        workspace: &str,
        id: &str,
        link_type: Option<LinkType>,
    ) -> StoreResult<Vec<Link>> {
        self.query_links(workspace, id, "from_id", link_type)
    }

    /// Incoming links of an item
    pub fn links_to(
        &self,
        workspace: &str,
        id: &str,
        link_type: Option<LinkType>,
    ) -> StoreResult<Vec<Link>> {
        self.query_links(workspace, id, "to_id", link_type)
    }

    fn query_links(
        &self,
        workspace: &str,
        id: &str,
        column: &str,
        link_type: Option<LinkType>,
    ) -> StoreResult<Vec<Link>> {
        let reader = self.reader()?;
        let sql = match link_type {
            Some(_) => format!(
                "SELECT from_id, to_id, type, created_at FROM links
                 WHERE workspace_id = ?1 AND {column} = ?2 AND type = ?3
                 ORDER BY created_at ASC, rowid ASC"
            ),
            None => format!(
                "SELECT from_id, to_id, type, created_at FROM links
                 WHERE workspace_id = ?1 AND {column} = ?2
                 ORDER BY created_at ASC, rowid ASC"
            ),
        };
        let mut stmt = reader.prepare(&sql)?;

        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<Link> {
            let type_raw: String = row.get(2)?;
            let created_raw: String = row.get(3)?;
            Ok(Link {
                from_id: row.get(0)?,
                to_id: row.get(1)?,
                link_type: LinkType::parse_name(&type_raw)
                    .ok_or_else(|| conversion_err(2, format!("unknown link type {type_raw:?}")))?,
                created_at: parse_ts(&created_raw, 3)?,
            })
        };

        let rows = match link_type {
            Some(lt) => stmt
                .query_map(params![workspace, id, lt.as_str()], map_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
            None => stmt
                .query_map(params![workspace, id], map_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
        };
        Ok(rows)
    }

    // ========================================================================
    // CANDIDATE LISTING (ranker fallback)
    // ========================================================================

    /// Recent items in reverse chronological order
    pub fn list_candidates(
        &self,
        workspace: &str,
        thread: Option<&str>,
        include_retired: bool,
        limit: usize,
    ) -> StoreResult<Vec<MemoryItem>> {
        let reader = self.reader()?;
        let mut sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE workspace_id = ?1");
        if thread.is_some() {
            sql.push_str(" AND thread_id = ?2");
        }
        if !include_retired {
            sql.push_str(" AND state != 'retired'");
        }
        sql.push_str(" ORDER BY created_at DESC, rowid DESC LIMIT ");
        sql.push_str(&limit.to_string());

        let mut stmt = reader.prepare(&sql)?;
        let items = match thread {
            Some(t) => stmt
                .query_map(params![workspace, t], item_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
            None => stmt
                .query_map(params![workspace], item_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
        };
        Ok(items)
    }

    /// Items with no vector for the active model: embedding still pending,
    /// or stamped by a model that is no longer active
    pub fn pending_embedding_items(
        &self,
        workspace: &str,
        active_model: &str,
        limit: usize,
    ) -> StoreResult<Vec<MemoryItem>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM items
             WHERE workspace_id = ?1
               AND (embedding_model_id IS NULL OR embedding_model_id != ?2)
               AND state != 'retired'
             ORDER BY created_at ASC, rowid ASC LIMIT {limit}"
        ))?;
        let items = stmt
            .query_map(params![workspace, active_model], item_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    // ========================================================================
    // VECTORS
    // ========================================================================

    /// Persist a vector and stamp the item with the producing model
    pub fn upsert_vector(
        &self,
        workspace: &str,
        item_id: &str,
        model_id: &str,
        vector: &[f32],
    ) -> StoreResult<()> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO vectors (workspace_id, item_id, model_id, vector, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(workspace_id, item_id, model_id) DO UPDATE
                SET vector = excluded.vector, created_at = excluded.created_at",
            params![
                workspace,
                item_id,
                model_id,
                vector_to_bytes(vector),
                Utc::now().to_rfc3339()
            ],
        )?;
        let changed = writer.execute(
            "UPDATE items SET embedding_model_id = ?3 WHERE workspace_id = ?1 AND id = ?2",
            params![workspace, item_id, model_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("item {item_id}")));
        }
        Ok(())
    }

    /// All persisted vectors joined with the item metadata the index needs
    pub fn load_vectors(&self) -> StoreResult<Vec<VectorRow>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT v.workspace_id, v.item_id, v.model_id, v.vector,
                    i.thread_id, i.kind, i.subtype, i.state
             FROM vectors v
             JOIN items i ON i.workspace_id = v.workspace_id AND i.id = v.item_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let blob: Vec<u8> = row.get(3)?;
                let kind_raw: String = row.get(5)?;
                let subtype_raw: String = row.get(6)?;
                let state_raw: String = row.get(7)?;
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    blob,
                    row.get::<_, String>(4)?,
                    kind_raw,
                    subtype_raw,
                    state_raw,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut out = Vec::with_capacity(rows.len());
        for (workspace_id, item_id, model_id, blob, thread_id, kind_raw, subtype_raw, state_raw) in
            rows
        {
            let Some(vector) = vector_from_bytes(&blob) else {
                tracing::warn!(item_id, "skipping vector with malformed blob");
                continue;
            };
            let (Some(kind), Some(subtype), Some(state)) = (
                ItemKind::parse_name(&kind_raw),
                ItemSubtype::parse_name(&subtype_raw),
                ItemState::parse_name(&state_raw),
            ) else {
                tracing::warn!(item_id, "skipping vector with undecodable item metadata");
                continue;
            };
            out.push(VectorRow {
                workspace_id,
                item_id,
                model_id,
                vector,
                thread_id,
                kind,
                subtype,
                retired: state == ItemState::Retired,
            });
        }
        Ok(out)
    }

    // ========================================================================
    // FEEDBACK
    // ========================================================================

    /// Append to the feedback journal
    pub fn append_feedback(&self, workspace: &str, record: &FeedbackRecord) -> StoreResult<()> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO feedback (workspace_id, item_id, signal, magnitude, at, actor)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                workspace,
                record.item_id,
                record.signal.as_str(),
                record.magnitude,
                record.at.to_rfc3339(),
                record.actor
            ],
        )?;
        Ok(())
    }

    /// Journal entries for an item, oldest first
    pub fn feedback_for(
        &self,
        workspace: &str,
        item_id: &str,
    ) -> StoreResult<Vec<FeedbackRecord>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT item_id, signal, magnitude, at, actor FROM feedback
             WHERE workspace_id = ?1 AND item_id = ?2 ORDER BY at ASC, rowid ASC",
        )?;
        let records = stmt
            .query_map(params![workspace, item_id], |row| {
                let signal_raw: String = row.get(1)?;
                let at_raw: String = row.get(3)?;
                Ok(FeedbackRecord {
                    item_id: row.get(0)?,
                    signal: FeedbackSignal::parse_name(&signal_raw).ok_or_else(|| {
                        conversion_err(1, format!("unknown signal {signal_raw:?}"))
                    })?,
                    magnitude: row.get(2)?,
                    at: parse_ts(&at_raw, 3)?,
                    actor: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    // ========================================================================
    // STATISTICS
    // ========================================================================

    /// Aggregate counts for a workspace
    pub fn stats(&self, workspace: &str) -> StoreResult<MemoryStats> {
        let reader = self.reader()?;

        let count = |sql: &str| -> StoreResult<i64> {
            Ok(reader.query_row(sql, params![workspace], |row| row.get(0))?)
        };

        let (oldest, newest): (Option<String>, Option<String>) = reader.query_row(
            "SELECT MIN(created_at), MAX(created_at) FROM items WHERE workspace_id = ?1",
            params![workspace],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(MemoryStats {
            total_items: count("SELECT COUNT(*) FROM items WHERE workspace_id = ?1")?,
            semantic_items: count(
                "SELECT COUNT(*) FROM items WHERE workspace_id = ?1 AND kind = 'semantic'",
            )?,
            episodic_items: count(
                "SELECT COUNT(*) FROM items WHERE workspace_id = ?1 AND kind = 'episodic'",
            )?,
            active_items: count(
                "SELECT COUNT(*) FROM items WHERE workspace_id = ?1 AND state = 'active'",
            )?,
            superseded_items: count(
                "SELECT COUNT(*) FROM items WHERE workspace_id = ?1 AND state = 'superseded'",
            )?,
            retired_items: count(
                "SELECT COUNT(*) FROM items WHERE workspace_id = ?1 AND state = 'retired'",
            )?,
            total_artifacts: count("SELECT COUNT(*) FROM artifacts WHERE workspace_id = ?1")?,
            items_with_embeddings: count(
                "SELECT COUNT(*) FROM items WHERE workspace_id = ?1 AND embedding_model_id IS NOT NULL",
            )?,
            embeddings_pending: count(
                "SELECT COUNT(*) FROM items
                 WHERE workspace_id = ?1 AND embedding_model_id IS NULL AND state != 'retired'",
            )?,
            feedback_records: count("SELECT COUNT(*) FROM feedback WHERE workspace_id = ?1")?,
            oldest_item: oldest.as_deref().and_then(|s| {
                DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc))
            }),
            newest_item: newest.as_deref().and_then(|s| {
                DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc))
            }),
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
