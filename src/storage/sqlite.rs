//! SQLite storage backend for the vector index

use super::traits::{IndexStore, OpenStore, StorageError, StorageResult};
use crate::artifact::Metadata;
use crate::index::vector::{decode_f32_blob, encode_f32_blob};
use crate::index::IndexEntry;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

const DIMENSIONS_KEY: &str = "dimensions";
const MODEL_ID_KEY: &str = "model_id";

/// SQLite-backed index store
///
/// One table of entries keyed by identifier, plus a small key/value table
/// recording the vector width and the embedding model. Thread-safe via internal mutex on the
/// connection. Every write is a single atomic statement.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS entries (
                id TEXT PRIMARY KEY,
                seq INTEGER NOT NULL,
                content_hash TEXT,
                dimensions INTEGER NOT NULL,
                vector BLOB NOT NULL,
                metadata_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_entries_seq ON entries(seq);

            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn meta(&self, key: &str) -> StorageResult<Option<String>> {
        let value = self
            .conn()
            .query_row(
                "SELECT value FROM index_meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_meta(&self, key: &str, value: &str) -> StorageResult<()> {
        self.conn().execute(
            r#"
            INSERT INTO index_meta (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
            params![key, value],
        )?;
        Ok(())
    }

    /// Number of stored entries.
    pub fn entry_count(&self) -> StorageResult<usize> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl IndexStore for SqliteStore {
    fn dimensions(&self) -> StorageResult<Option<usize>> {
        self.meta(DIMENSIONS_KEY)?
            .map(|v| {
                v.parse::<usize>().map_err(|_| StorageError::InvalidValue {
                    key: DIMENSIONS_KEY.to_string(),
                    value: v.clone(),
                })
            })
            .transpose()
    }

    fn set_dimensions(&self, dimensions: usize) -> StorageResult<()> {
        self.set_meta(DIMENSIONS_KEY, &dimensions.to_string())
    }

    fn model_id(&self) -> StorageResult<Option<String>> {
        self.meta(MODEL_ID_KEY)
    }

    fn set_model_id(&self, model_id: &str) -> StorageResult<()> {
        self.set_meta(MODEL_ID_KEY, model_id)
    }

    fn save_entry(&self, entry: &IndexEntry) -> StorageResult<()> {
        let metadata_json = serde_json::to_string(&entry.metadata)?;
        let blob = encode_f32_blob(&entry.vector);
        let now = chrono::Utc::now().to_rfc3339();

        self.conn().execute(
            r#"
            INSERT INTO entries (id, seq, content_hash, dimensions, vector, metadata_json, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                content_hash = excluded.content_hash,
                dimensions = excluded.dimensions,
                vector = excluded.vector,
                metadata_json = excluded.metadata_json,
                updated_at = excluded.updated_at
            "#,
            params![
                entry.id,
                entry.seq as i64,
                entry.content_hash,
                entry.vector.len() as i64,
                blob,
                metadata_json,
                now,
            ],
        )?;
        Ok(())
    }

    fn delete_entry(&self, id: &str) -> StorageResult<bool> {
        let deleted = self
            .conn()
            .execute("DELETE FROM entries WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    fn load_entries(&self) -> StorageResult<Vec<IndexEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, seq, content_hash, dimensions, vector, metadata_json
            FROM entries
            ORDER BY seq ASC
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, Vec<u8>>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, seq, content_hash, dimensions, blob, metadata_json) = row?;
            let vector = decode_f32_blob(&blob).ok_or_else(|| StorageError::CorruptVector {
                id: id.clone(),
                reason: format!("{} bytes is not a whole number of f32s", blob.len()),
            })?;
            if vector.len() as i64 != dimensions {
                return Err(StorageError::CorruptVector {
                    id,
                    reason: format!(
                        "recorded {} dimensions, blob holds {}",
                        dimensions,
                        vector.len()
                    ),
                });
            }
            let metadata: Metadata = serde_json::from_str(&metadata_json)?;
            entries.push(IndexEntry {
                id,
                vector,
                metadata,
                content_hash,
                seq: seq as u64,
            });
        }
        Ok(entries)
    }
}
