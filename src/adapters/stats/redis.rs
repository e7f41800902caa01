use crate::adapters::stats::CounterStore;
use crate::config::StatConfig;
use crate::domain::Platform;
use crate::error::StorageError;
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tokio::sync::OnceCell;

/// Counters persisted in Redis; `INCRBY` keeps concurrent increments atomic.
#[derive(Debug)]
pub struct RedisStore {
    url: String,
    prefix: String,
    retry_strategy: ExponentialBuilder,
    connection: OnceCell<ConnectionManager>,
}

#[derive(Debug, Clone, Copy)]
enum Counter {
    Success,
    Error,
}

impl RedisStore {
    #[must_use]
    pub fn new(config: &StatConfig) -> Self {
        let retry_strategy = ExponentialBuilder::default()
            .with_min_delay(Duration::from_secs(config.min_backoff_secs))
            .with_max_delay(Duration::from_secs(config.max_backoff_secs))
            .with_max_times(config.max_connect_attempts);

        Self {
            url: config.redis_url.clone(),
            prefix: config.key_prefix.clone(),
            retry_strategy,
            connection: OnceCell::new(),
        }
    }

    fn total_key(&self) -> String {
        format!("{}-total-count", self.prefix)
    }

    fn platform_key(&self, platform: Platform, counter: Counter) -> String {
        let suffix = match counter {
            Counter::Success => "success",
            Counter::Error => "error",
        };
        format!("{}-{platform}-{suffix}-count", self.prefix)
    }

    fn all_keys(&self) -> Vec<String> {
        let mut keys = vec![self.total_key()];
        for platform in Platform::ALL {
            keys.push(self.platform_key(platform, Counter::Success));
            keys.push(self.platform_key(platform, Counter::Error));
        }
        keys
    }

    fn connection(&self) -> Result<ConnectionManager, StorageError> {
        self.connection.get().cloned().ok_or(StorageError::NotInitialized)
    }

    async fn incr(&self, key: String, delta: i64) -> Result<(), StorageError> {
        let mut conn = self.connection()?;
        let _: i64 = conn.incr(key, delta).await?;
        Ok(())
    }

    async fn read(&self, key: String) -> Result<i64, StorageError> {
        let mut conn = self.connection()?;
        let value: Option<i64> = conn.get(key).await?;
        Ok(value.unwrap_or_default())
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn init(&self) -> Result<(), StorageError> {
        let url = self.url.clone();
        let connection = self
            .connection
            .get_or_try_init(|| async {
                (|| async {
                    let client = redis::Client::open(url.as_str())?;
                    client.get_connection_manager().await
                })
                .retry(&self.retry_strategy)
                .when(|e| {
                    tracing::warn!(error = %e, "Failed to connect to counter storage, retrying...");
                    true
                })
                .notify(|e, duration| {
                    tracing::debug!("Counter storage connection retry in {:?} due to error: {:?}", duration, e);
                })
                .await
            })
            .await?;

        let mut conn = connection.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        tracing::info!("Connected to Redis counter storage");
        Ok(())
    }

    async fn add_total(&self, delta: i64) -> Result<(), StorageError> {
        self.incr(self.total_key(), delta).await
    }

    async fn add_success(&self, platform: Platform, delta: i64) -> Result<(), StorageError> {
        self.incr(self.platform_key(platform, Counter::Success), delta).await
    }

    async fn add_error(&self, platform: Platform, delta: i64) -> Result<(), StorageError> {
        self.incr(self.platform_key(platform, Counter::Error), delta).await
    }

    async fn total_count(&self) -> Result<i64, StorageError> {
        self.read(self.total_key()).await
    }

    async fn success_count(&self, platform: Platform) -> Result<i64, StorageError> {
        self.read(self.platform_key(platform, Counter::Success)).await
    }

    async fn error_count(&self, platform: Platform) -> Result<i64, StorageError> {
        self.read(self.platform_key(platform, Counter::Error)).await
    }

    async fn reset(&self) -> Result<(), StorageError> {
        let mut conn = self.connection()?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        for key in self.all_keys() {
            pipe.set(key, 0).ignore();
        }
        pipe.query_async::<()>(&mut conn).await?;
        Ok(())
    }
}
