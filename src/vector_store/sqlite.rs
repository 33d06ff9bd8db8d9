//! SQLite-based vector store implementation.
//!
//! Uses SQLite for persistence with cosine similarity computed in Rust. Every
//! query is a full scan, which is fine for a catalog of a few thousand segments.

use super::{
    check_binding, check_dimensions, rank, IndexEntry, IndexedModel, IndexedSource, QueryFilter,
    SearchHit, VectorStore,
};
use crate::chunking::{Segment, SegmentKind, SegmentMetadata};
use crate::error::{BusbotError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};
use uuid::Uuid;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS entries (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        source_id TEXT NOT NULL,
        kind TEXT NOT NULL,
        position INTEGER NOT NULL,
        content TEXT NOT NULL,
        overlap INTEGER NOT NULL,
        provider TEXT,
        metadata TEXT NOT NULL,
        embedding BLOB NOT NULL,
        indexed_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_entries_source_id ON entries(source_id);
    CREATE INDEX IF NOT EXISTS idx_entries_provider ON entries(provider);

    CREATE TABLE IF NOT EXISTS index_meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
"#;

const SELECT_ENTRY: &str = r#"
    SELECT seq, id, source_id, kind, position, content, overlap, metadata, embedding, indexed_at
    FROM entries
"#;

const UPSERT_ENTRY: &str = r#"
    INSERT INTO entries
    (id, source_id, kind, position, content, overlap, provider, metadata, embedding, indexed_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
    ON CONFLICT(id) DO UPDATE SET
        source_id = excluded.source_id,
        kind = excluded.kind,
        position = excluded.position,
        content = excluded.content,
        overlap = excluded.overlap,
        provider = excluded.provider,
        metadata = excluded.metadata,
        embedding = excluded.embedding,
        indexed_at = excluded.indexed_at
"#;

const META_MODEL: &str = "embedding_model";
const META_DIMENSIONS: &str = "embedding_dimensions";

/// SQLite-based vector store.
pub struct SqliteVectorStore {
    conn: Mutex<Connection>,
}

impl SqliteVectorStore {
    /// Open (or create) a SQLite vector store at `path`.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Opened SQLite vector store at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite vector store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| BusbotError::VectorStore(format!("Failed to acquire lock: {}", e)))
    }

    /// Serialize embedding to bytes.
    fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Deserialize embedding from bytes.
    fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| {
                let arr: [u8; 4] = chunk.try_into().unwrap_or_default();
                f32::from_le_bytes(arr)
            })
            .collect()
    }

    fn read_model(conn: &Connection) -> Result<Option<IndexedModel>> {
        let get = |key: &str| -> Result<Option<String>> {
            Ok(conn
                .query_row(
                    "SELECT value FROM index_meta WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?)
        };

        match (get(META_MODEL)?, get(META_DIMENSIONS)?) {
            (Some(model_id), Some(dims)) => {
                let dimensions = dims.parse().map_err(|_| {
                    BusbotError::VectorStore(format!("Corrupt embedding dimensions in index: {}", dims))
                })?;
                Ok(Some(IndexedModel {
                    model_id,
                    dimensions,
                }))
            }
            _ => Ok(None),
        }
    }

    fn write_entry(conn: &Connection, entry: &IndexEntry) -> Result<()> {
        let segment = &entry.segment;
        let metadata = serde_json::to_string(&segment.metadata)?;

        conn.execute(
            UPSERT_ENTRY,
            params![
                entry.id.to_string(),
                segment.source_id,
                segment.kind.as_str(),
                segment.position,
                segment.text,
                segment.overlap as i64,
                segment.metadata.provider,
                metadata,
                Self::embedding_to_bytes(&entry.embedding),
                entry.indexed_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Decode a row selected with [`SELECT_ENTRY`] into its sequence number and entry.
    fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<(u64, IndexEntry)> {
        fn conversion<E>(index: usize, err: E) -> rusqlite::Error
        where
            E: std::error::Error + Send + Sync + 'static,
        {
            rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err))
        }

        let seq: i64 = row.get(0)?;
        let id_str: String = row.get(1)?;
        let kind_str: String = row.get(3)?;
        let overlap: i64 = row.get(6)?;
        let metadata_json: String = row.get(7)?;
        let embedding_bytes: Vec<u8> = row.get(8)?;
        let indexed_at_str: String = row.get(9)?;

        let id = Uuid::parse_str(&id_str).map_err(|e| conversion(1, e))?;
        let kind: SegmentKind = kind_str.parse().map_err(|e: String| {
            conversion(3, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        let metadata: SegmentMetadata =
            serde_json::from_str(&metadata_json).map_err(|e| conversion(7, e))?;
        let indexed_at = DateTime::parse_from_rfc3339(&indexed_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion(9, e))?;

        Ok((
            seq as u64,
            IndexEntry {
                id,
                segment: Segment {
                    source_id: row.get(2)?,
                    kind,
                    position: row.get(4)?,
                    text: row.get(5)?,
                    overlap: overlap as usize,
                    metadata,
                },
                embedding: Self::bytes_to_embedding(&embedding_bytes),
                indexed_at,
            },
        ))
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    #[instrument(skip(self))]
    async fn bind_model(&self, model_id: &str, dimensions: usize) -> Result<()> {
        let conn = self.lock()?;
        let existing = Self::read_model(&conn)?;

        if check_binding(existing.as_ref(), model_id, dimensions)? {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT OR REPLACE INTO index_meta (key, value) VALUES (?1, ?2)",
                params![META_MODEL, model_id],
            )?;
            tx.execute(
                "INSERT OR REPLACE INTO index_meta (key, value) VALUES (?1, ?2)",
                params![META_DIMENSIONS, dimensions.to_string()],
            )?;
            tx.commit()?;
            info!("Bound index to embedding model {}", model_id);
        }

        Ok(())
    }

    async fn indexed_model(&self) -> Result<Option<IndexedModel>> {
        let conn = self.lock()?;
        Self::read_model(&conn)
    }

    #[instrument(skip(self, entry), fields(key = %entry.segment.key()))]
    async fn upsert(&self, entry: &IndexEntry) -> Result<()> {
        let conn = self.lock()?;
        check_dimensions(Self::read_model(&conn)?.as_ref(), entry)?;
        Self::write_entry(&conn, entry)?;
        debug!("Upserted entry {}", entry.id);
        Ok(())
    }

    #[instrument(skip(self, entries), fields(count = entries.len()))]
    async fn upsert_batch(&self, entries: &[IndexEntry]) -> Result<usize> {
        let conn = self.lock()?;
        let model = Self::read_model(&conn)?;

        let tx = conn.unchecked_transaction()?;
        for entry in entries {
            check_dimensions(model.as_ref(), entry)?;
            Self::write_entry(&tx, entry)?;
        }
        tx.commit()?;

        debug!("Batch upserted {} entries", entries.len());
        Ok(entries.len())
    }

    #[instrument(skip(self, embedding, filter))]
    async fn query(&self, embedding: &[f32], k: usize, filter: &QueryFilter) -> Result<Vec<SearchHit>> {
        let conn = self.lock()?;

        let candidates: Vec<(u64, IndexEntry)> = match &filter.provider {
            Some(provider) => {
                let mut stmt = conn.prepare(&format!("{} WHERE provider = ?1", SELECT_ENTRY))?;
                let rows = stmt.query_map(params![provider], Self::row_to_entry)?;
                rows.collect::<rusqlite::Result<_>>()?
            }
            None => {
                let mut stmt = conn.prepare(SELECT_ENTRY)?;
                let rows = stmt.query_map([], Self::row_to_entry)?;
                rows.collect::<rusqlite::Result<_>>()?
            }
        };

        let hits = rank(candidates, embedding, k, filter);
        debug!("Found {} matching entries", hits.len());
        Ok(hits)
    }

    #[instrument(skip(self))]
    async fn delete_by_source(&self, source_id: &str) -> Result<usize> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM entries WHERE source_id = ?1", params![source_id])?;
        debug!("Deleted {} entries for source {}", deleted, source_id);
        Ok(deleted)
    }

    #[instrument(skip(self))]
    async fn truncate_source(&self, source_id: &str, len: u32) -> Result<usize> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM entries WHERE source_id = ?1 AND position >= ?2",
            params![source_id, len],
        )?;
        if deleted > 0 {
            debug!("Removed {} stale entries of source {}", deleted, source_id);
        }
        Ok(deleted)
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<usize> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        let deleted = tx.execute("DELETE FROM entries", [])?;
        tx.execute("DELETE FROM index_meta", [])?;
        tx.commit()?;
        info!("Cleared {} entries from the index", deleted);
        Ok(deleted)
    }

    async fn list_sources(&self) -> Result<Vec<IndexedSource>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT source_id, COUNT(*) AS segment_count, MAX(indexed_at) AS indexed_at
            FROM entries
            GROUP BY source_id
            ORDER BY source_id
            "#,
        )?;

        let sources = stmt.query_map([], |row| {
            let indexed_at_str: String = row.get(2)?;
            Ok(IndexedSource {
                source_id: row.get(0)?,
                segment_count: row.get(1)?,
                indexed_at: DateTime::parse_from_rfc3339(&indexed_at_str)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
            })
        })?;

        Ok(sources.collect::<rusqlite::Result<_>>()?)
    }

    async fn get_by_source(&self, source_id: &str) -> Result<Vec<IndexEntry>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare(&format!("{} WHERE source_id = ?1 ORDER BY position", SELECT_ENTRY))?;
        let rows = stmt.query_map(params![source_id], Self::row_to_entry)?;

        let entries = rows
            .map(|r| r.map(|(_, entry)| entry))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    async fn provider_names(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT provider FROM entries WHERE provider IS NOT NULL ORDER BY provider",
        )?;
        let names = stmt.query_map([], |row| row.get(0))?;
        Ok(names.collect::<rusqlite::Result<_>>()?)
    }

    async fn entry_count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    async fn close(&self) -> Result<()> {
        let conn = self.lock()?;
        // Folds the WAL back into the main database file.
        conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        info!("Flushed vector store");
        Ok(())
    }
}
