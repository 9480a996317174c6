#![forbid(unsafe_code)]

use crate::domain::SessionId;
use crate::error::Error;
use crate::persistence::{CHUNK_SCHEMA_VERSION, StreamChunk};
use async_trait::async_trait;
use humansize::{DECIMAL, format_size};
use parking_lot::Mutex;
use sqlx::Row;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// Durable, append-only storage for stream chunks.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Persist a chunk. Writing a sequence that already exists is a no-op.
    async fn write(&self, session: SessionId, chunk: &StreamChunk) -> Result<(), Error>;
    async fn read(&self, session: SessionId, sequence: u32) -> Result<Option<StreamChunk>, Error>;
    /// Stored sequence numbers in ascending order.
    async fn sequences(&self, session: SessionId) -> Result<Vec<u32>, Error>;
    /// Remove every chunk of a session, returning how many were removed.
    async fn delete_session(&self, session: SessionId) -> Result<u64, Error>;
}

/// Keeps encoded chunks in memory. Chunks do not survive the process.
#[derive(Debug, Default)]
pub struct MemoryChunkStore {
    chunks: Mutex<BTreeMap<(SessionId, u32), Vec<u8>>>,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.chunks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.lock().is_empty()
    }

    /// Overwrite the stored bytes of a chunk. Only useful to simulate damage.
    pub fn corrupt(&self, session: SessionId, sequence: u32, bytes: Vec<u8>) {
        self.chunks.lock().insert((session, sequence), bytes);
    }

    pub fn remove(&self, session: SessionId, sequence: u32) -> bool {
        self.chunks.lock().remove(&(session, sequence)).is_some()
    }
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn write(&self, session: SessionId, chunk: &StreamChunk) -> Result<(), Error> {
        let bytes = chunk.encode()?;
        self.chunks
            .lock()
            .entry((session, chunk.sequence))
            .or_insert(bytes);
        Ok(())
    }

    async fn read(&self, session: SessionId, sequence: u32) -> Result<Option<StreamChunk>, Error> {
        let bytes = self.chunks.lock().get(&(session, sequence)).cloned();
        bytes
            .map(|bytes| StreamChunk::decode(sequence, &bytes))
            .transpose()
    }

    async fn sequences(&self, session: SessionId) -> Result<Vec<u32>, Error> {
        Ok(self
            .chunks
            .lock()
            .keys()
            .filter(|(id, _)| *id == session)
            .map(|(_, sequence)| *sequence)
            .collect())
    }

    async fn delete_session(&self, session: SessionId) -> Result<u64, Error> {
        let mut chunks = self.chunks.lock();
        let before = chunks.len();
        chunks.retain(|(id, _), _| *id != session);
        Ok((before - chunks.len()) as u64)
    }
}

#[derive(Debug, Clone)]
pub struct SqliteChunkStore {
    path: PathBuf,
    pool: SqlitePool,
}

impl SqliteChunkStore {
    /// Open (or create) a chunk database at `path`.
    pub async fn new(path: PathBuf) -> Result<Self, Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(sqlx::Error::from)?;

        Ok(Self { path, pool })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ChunkStore for SqliteChunkStore {
    async fn write(&self, session: SessionId, chunk: &StreamChunk) -> Result<(), Error> {
        let payload = chunk.encode()?;
        let written_at = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default();
        let size = payload.len();

        sqlx::query(
            "INSERT INTO stream_chunks \
             (session_id, sequence, metric, sample_count, schema_version, payload, written_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (session_id, sequence) DO NOTHING",
        )
        .bind(session.to_string())
        .bind(chunk.sequence as i64)
        .bind(chunk.metric.as_str())
        .bind(chunk.samples.len() as i64)
        .bind(CHUNK_SCHEMA_VERSION as i64)
        .bind(payload)
        .bind(written_at)
        .execute(&self.pool)
        .await?;

        debug!(
            path = %self.path.display(),
            %session,
            sequence = chunk.sequence,
            size = %format_size(size, DECIMAL),
            "chunk persisted"
        );
        Ok(())
    }

    async fn read(&self, session: SessionId, sequence: u32) -> Result<Option<StreamChunk>, Error> {
        let row = sqlx::query(
            "SELECT schema_version, payload FROM stream_chunks \
             WHERE session_id = ? AND sequence = ?",
        )
        .bind(session.to_string())
        .bind(sequence as i64)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let schema_version: i64 = row.try_get("schema_version")?;
        if schema_version != CHUNK_SCHEMA_VERSION as i64 {
            return Err(Error::CorruptChunk {
                sequence,
                reason: format!("unsupported schema version {schema_version}"),
            });
        }
        let payload: Vec<u8> = row.try_get("payload")?;
        StreamChunk::decode(sequence, &payload).map(Some)
    }

    async fn sequences(&self, session: SessionId) -> Result<Vec<u32>, Error> {
        let rows = sqlx::query(
            "SELECT sequence FROM stream_chunks WHERE session_id = ? ORDER BY sequence",
        )
        .bind(session.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut sequences = Vec::with_capacity(rows.len());
        for row in rows {
            let sequence: i64 = row.try_get("sequence")?;
            sequences.push(sequence as u32);
        }
        Ok(sequences)
    }

    async fn delete_session(&self, session: SessionId) -> Result<u64, Error> {
        let result = sqlx::query("DELETE FROM stream_chunks WHERE session_id = ?")
            .bind(session.to_string())
            .execute(&self.pool)
            .await?;
        debug!(path = %self.path.display(), %session, removed = result.rows_affected(), "session chunks deleted");
        Ok(result.rows_affected())
    }
}
