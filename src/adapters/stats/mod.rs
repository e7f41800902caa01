use crate::config::{StatConfig, StatEngine};
use crate::domain::Platform;
use crate::error::StorageError;
use async_trait::async_trait;
use std::sync::Arc;

pub mod memory;
pub mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

/// Named `i64` counters of push outcomes, shared by every dispatch worker.
///
/// Implementations provide their own atomicity: callers increment
/// concurrently without any external locking.
#[async_trait]
pub trait CounterStore: Send + Sync + std::fmt::Debug {
    /// Prepares the backend. Called once at process start.
    async fn init(&self) -> Result<(), StorageError>;

    async fn add_total(&self, delta: i64) -> Result<(), StorageError>;

    async fn add_success(&self, platform: Platform, delta: i64) -> Result<(), StorageError>;

    async fn add_error(&self, platform: Platform, delta: i64) -> Result<(), StorageError>;

    async fn total_count(&self) -> Result<i64, StorageError>;

    async fn success_count(&self, platform: Platform) -> Result<i64, StorageError>;

    async fn error_count(&self, platform: Platform) -> Result<i64, StorageError>;

    /// Zeroes every counter.
    async fn reset(&self) -> Result<(), StorageError>;
}

/// Builds and initializes the configured counter backend.
///
/// # Errors
/// Returns `StorageError` if the backend cannot be initialized.
pub async fn open(config: &StatConfig) -> Result<Arc<dyn CounterStore>, StorageError> {
    tracing::info!(engine = ?config.engine, "Initializing counter storage");

    let store: Arc<dyn CounterStore> = match config.engine {
        StatEngine::Memory => Arc::new(MemoryStore::new()),
        StatEngine::Redis => Arc::new(RedisStore::new(config)),
    };

    if let Err(e) = store.init().await {
        tracing::error!(error = %e, "Counter storage failed to initialize");
        return Err(e);
    }

    Ok(store)
}
