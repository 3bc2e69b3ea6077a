//! The [`InteractionStore`] trait and its two backends.

use crate::{create_pool, run_migrations, DbPool};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use switchyard_types::{Call, Direction, InteractionRecord, Turn, TurnErrorKind};

/// Rows retained by the in-memory backend before the oldest are dropped.
const MAX_MEMORY_ROWS: usize = 10_000;

/// Errors surfaced by storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database pool: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("database: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    PoolInit(#[from] crate::pool::PoolError),
    #[error(transparent)]
    Migration(#[from] crate::migrations::MigrationError),
    #[error("storage task aborted: {0}")]
    TaskAborted(String),
    #[error("unknown storage backend '{0}'")]
    UnknownBackend(String),
}

/// The `[storage]` section of the gateway configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// `sqlite` or `memory`.
    #[serde(default = "default_backend")]
    pub backend: String,
    /// SQLite database path; ignored by the memory backend.
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

fn default_backend() -> String {
    "sqlite".to_string()
}

fn default_path() -> String {
    "switchyard.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

/// Builds the configured storage backend, running migrations for SQLite.
pub fn build_store(config: &StorageConfig) -> Result<Arc<dyn InteractionStore>, StoreError> {
    match config.backend.as_str() {
        "sqlite" => {
            let pool = create_pool(config)?;
            {
                let conn = pool.get()?;
                let applied = run_migrations(&conn)?;
                tracing::info!(applied, path = %config.path, "storage migrations complete");
            }
            Ok(Arc::new(SqliteStore::new(pool)))
        }
        "memory" => Ok(Arc::new(MemoryStore::new())),
        other => Err(StoreError::UnknownBackend(other.to_string())),
    }
}

/// Persistence contract for turns and call state.
///
/// Backends are swappable behind this trait; callers never see which one is
/// configured.
#[async_trait]
pub trait InteractionStore: Send + Sync {
    /// Persists one terminal turn; returns the row id.
    async fn record_turn(&self, turn: &Turn) -> Result<i64, StoreError>;

    /// Persists current call state, upserting on the vendor call id.
    async fn record_call(&self, call: &Call) -> Result<(), StoreError>;

    /// The most recent interactions, newest first.
    async fn recent(&self, limit: u32) -> Result<Vec<InteractionRecord>, StoreError>;

    /// Interactions belonging to one call or session, newest first.
    async fn for_owner(&self, owner_id: &str, limit: u32)
        -> Result<Vec<InteractionRecord>, StoreError>;
}

fn turn_to_record(turn: &Turn, id: i64) -> InteractionRecord {
    InteractionRecord {
        id,
        owner_id: turn.owner.id(),
        direction: Direction::Inbound,
        input: turn.input.summary().to_string(),
        output: turn.output.clone(),
        intent: turn.intent.clone(),
        confidence: turn.confidence,
        latency_ms: turn.latency_ms as i64,
        error: turn.error.map(|k| TurnErrorKind::label(k).to_string()),
        created_at: turn.created_at.to_rfc3339(),
    }
}

// ---------------------------------------------------------------------------
// SQLite backend
// ---------------------------------------------------------------------------

/// Durable backend over the pooled SQLite database.
///
/// rusqlite calls block, so every operation hops to the blocking pool.
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<InteractionRecord> {
    let direction: String = row.get(2)?;
    Ok(InteractionRecord {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        direction: Direction::parse(&direction).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(2, "direction".to_string(), rusqlite::types::Type::Text)
        })?,
        input: row.get(3)?,
        output: row.get(4)?,
        intent: row.get(5)?,
        confidence: row.get(6)?,
        latency_ms: row.get(7)?,
        error: row.get(8)?,
        created_at: row.get(9)?,
    })
}

const SELECT_COLUMNS: &str =
    "id, owner_id, direction, input, output, intent, confidence, latency_ms, error, created_at";

#[async_trait]
impl InteractionStore for SqliteStore {
    async fn record_turn(&self, turn: &Turn) -> Result<i64, StoreError> {
        let pool = self.pool.clone();
        let record = turn_to_record(turn, 0);
        tokio::task::spawn_blocking(move || -> Result<i64, StoreError> {
            let conn = pool.get()?;
            conn.execute(
                "INSERT INTO interactions
                     (owner_id, direction, input, output, intent, confidence, latency_ms, error, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    record.owner_id,
                    record.direction.label(),
                    record.input,
                    record.output,
                    record.intent,
                    record.confidence,
                    record.latency_ms,
                    record.error,
                    record.created_at,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(|e| StoreError::TaskAborted(e.to_string()))?
    }

    async fn record_call(&self, call: &Call) -> Result<(), StoreError> {
        let pool = self.pool.clone();
        let call = call.clone();
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let conn = pool.get()?;
            conn.execute(
                "INSERT INTO calls
                     (correlation_id, vendor, vendor_call_id, from_endpoint, to_endpoint,
                      status, direction, recording_url, transcript_url, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(vendor_call_id) DO UPDATE SET
                     status = excluded.status,
                     from_endpoint = COALESCE(calls.from_endpoint, excluded.from_endpoint),
                     to_endpoint = COALESCE(calls.to_endpoint, excluded.to_endpoint),
                     recording_url = COALESCE(excluded.recording_url, calls.recording_url),
                     transcript_url = COALESCE(excluded.transcript_url, calls.transcript_url),
                     updated_at = excluded.updated_at",
                rusqlite::params![
                    call.correlation_id.to_string(),
                    call.vendor,
                    call.vendor_call_id,
                    call.from,
                    call.to,
                    call.status.label(),
                    call.direction.label(),
                    call.recording_url,
                    call.transcript_url,
                    call.created_at.to_rfc3339(),
                    call.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::TaskAborted(e.to_string()))?
    }

    async fn recent(&self, limit: u32) -> Result<Vec<InteractionRecord>, StoreError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<InteractionRecord>, StoreError> {
            let conn = pool.get()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM interactions ORDER BY id DESC LIMIT ?1"
            ))?;
            let rows = stmt
                .query_map([limit], row_to_record)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
        .map_err(|e| StoreError::TaskAborted(e.to_string()))?
    }

    async fn for_owner(
        &self,
        owner_id: &str,
        limit: u32,
    ) -> Result<Vec<InteractionRecord>, StoreError> {
        let pool = self.pool.clone();
        let owner_id = owner_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<Vec<InteractionRecord>, StoreError> {
            let conn = pool.get()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM interactions WHERE owner_id = ?1
                 ORDER BY id DESC LIMIT ?2"
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![owner_id, limit], row_to_record)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
        .map_err(|e| StoreError::TaskAborted(e.to_string()))?
    }
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryInner {
    next_id: i64,
    rows: VecDeque<InteractionRecord>,
    calls: HashMap<String, Call>,
}

/// Volatile backend for tests and ephemeral deployments.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl InteractionStore for MemoryStore {
    async fn record_turn(&self, turn: &Turn) -> Result<i64, StoreError> {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.rows.push_back(turn_to_record(turn, id));
        if inner.rows.len() > MAX_MEMORY_ROWS {
            inner.rows.pop_front();
        }
        Ok(id)
    }

    async fn record_call(&self, call: &Call) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.calls.insert(call.vendor_call_id.clone(), call.clone());
        Ok(())
    }

    async fn recent(&self, limit: u32) -> Result<Vec<InteractionRecord>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .rows
            .iter()
            .rev()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn for_owner(
        &self,
        owner_id: &str,
        limit: u32,
    ) -> Result<Vec<InteractionRecord>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .rows
            .iter()
            .rev()
            .filter(|r| r.owner_id == owner_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_types::{CallEvent, CallStatus, TurnInput, TurnOwner};
    use uuid::Uuid;

    fn turn(owner: TurnOwner, text: &str) -> Turn {
        Turn {
            correlation_id: Uuid::new_v4(),
            owner,
            input: TurnInput::Text(text.to_string()),
            output: Some(format!("echo: {text}")),
            intent: Some("echo".to_string()),
            confidence: Some(0.9),
            media_url: None,
            latency_ms: 42,
            error: None,
            created_at: switchyard_types::now(),
        }
    }

    fn call(vendor_call_id: &str, status: CallStatus) -> Call {
        Call::from_event(&CallEvent {
            vendor: "twilio".to_string(),
            vendor_call_id: vendor_call_id.to_string(),
            status,
            from: Some("+15550001".to_string()),
            to: Some("+15550002".to_string()),
            direction: Direction::Inbound,
            recording_url: None,
        })
    }

    fn sqlite_store(dir: &tempfile::TempDir) -> SqliteStore {
        let config = StorageConfig {
            backend: "sqlite".to_string(),
            path: dir.path().join("test.db").to_string_lossy().to_string(),
            ..StorageConfig::default()
        };
        let store = build_store(&config).expect("store builds");
        // Re-open on the same file to exercise persistence through the pool.
        drop(store);
        let pool = create_pool(&config).expect("pool");
        SqliteStore::new(pool)
    }

    #[tokio::test]
    async fn sqlite_round_trips_turns() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = sqlite_store(&dir);

        let session = TurnOwner::Session(Uuid::new_v4());
        let other = TurnOwner::Session(Uuid::new_v4());
        store.record_turn(&turn(session, "first")).await.expect("insert");
        store.record_turn(&turn(other, "second")).await.expect("insert");
        store.record_turn(&turn(session, "third")).await.expect("insert");

        let recent = store.recent(10).await.expect("query");
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].input, "third");

        let mine = store.for_owner(&session.id(), 10).await.expect("query");
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].input, "third");
        assert_eq!(mine[1].input, "first");
        assert_eq!(mine[0].output.as_deref(), Some("echo: third"));
    }

    #[tokio::test]
    async fn sqlite_records_error_turns() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = sqlite_store(&dir);

        let owner = TurnOwner::Call(Uuid::new_v4());
        let mut failed = turn(owner, "unanswered");
        failed.output = None;
        failed.error = Some(switchyard_types::TurnErrorKind::Timeout);
        store.record_turn(&failed).await.expect("insert");

        let rows = store.for_owner(&owner.id(), 10).await.expect("query");
        assert_eq!(rows.len(), 1);
        assert!(rows[0].output.is_none());
        assert_eq!(rows[0].error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn sqlite_upserts_call_by_vendor_id() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = sqlite_store(&dir);

        store
            .record_call(&call("CA1", CallStatus::Initiated))
            .await
            .expect("insert");
        store
            .record_call(&call("CA1", CallStatus::Completed))
            .await
            .expect("upsert");

        let pool = store.pool.clone();
        let (count, status): (i64, String) = tokio::task::spawn_blocking(move || {
            let conn = pool.get().expect("conn");
            conn.query_row(
                "SELECT COUNT(*), MAX(status) FROM calls WHERE vendor_call_id = 'CA1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .expect("query")
        })
        .await
        .expect("join");
        assert_eq!(count, 1);
        assert_eq!(status, "completed");
    }

    #[tokio::test]
    async fn memory_store_caps_and_filters() {
        let store = MemoryStore::new();
        let owner = TurnOwner::Session(Uuid::new_v4());
        for i in 0..5 {
            store
                .record_turn(&turn(owner, &format!("msg {i}")))
                .await
                .expect("insert");
        }

        let recent = store.recent(3).await.expect("query");
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].input, "msg 4");

        let mine = store.for_owner(&owner.id(), 100).await.expect("query");
        assert_eq!(mine.len(), 5);
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let result = build_store(&StorageConfig {
            backend: "postgres".to_string(),
            ..StorageConfig::default()
        });
        match result {
            Err(StoreError::UnknownBackend(b)) => assert_eq!(b, "postgres"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("unknown backend should be rejected"),
        }
    }
}
