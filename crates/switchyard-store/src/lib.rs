//! Persistence for the Switchyard gateway.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization,
//! embedded SQL migrations, and the [`InteractionStore`] trait with two
//! backends: durable SQLite and an in-memory store for tests and ephemeral
//! deployments.
//!
//! Recording is best-effort by contract: the [`Recorder`] wrapper logs and
//! swallows storage failures so the conversation path never blocks on the
//! database, while a rolling [`FailureWindow`] surfaces persistent storage
//! trouble to the health layer.

mod failure;
mod migrations;
mod pool;
mod recorder;
mod store;

pub use failure::FailureWindow;
pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, PoolError};
pub use recorder::Recorder;
pub use store::{build_store, InteractionStore, MemoryStore, SqliteStore, StorageConfig, StoreError};
