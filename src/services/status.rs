use crate::adapters::stats::CounterStore;
use crate::domain::Platform;
use crate::error::StorageError;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlatformStatus {
    pub push_success: i64,
    pub push_error: i64,
}

/// Point-in-time snapshot of the push counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppStatus {
    pub version: String,
    pub total_count: i64,
    pub ios: PlatformStatus,
    pub android: PlatformStatus,
    pub huawei: PlatformStatus,
}

impl AppStatus {
    /// Reads every counter from the store.
    ///
    /// # Errors
    /// Returns `StorageError` if any counter cannot be read.
    pub async fn collect(store: &dyn CounterStore) -> Result<Self, StorageError> {
        let platform = |platform: Platform| async move {
            Ok::<_, StorageError>(PlatformStatus {
                push_success: store.success_count(platform).await?,
                push_error: store.error_count(platform).await?,
            })
        };

        Ok(Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            total_count: store.total_count().await?,
            ios: platform(Platform::Ios).await?,
            android: platform(Platform::Android).await?,
            huawei: platform(Platform::Huawei).await?,
        })
    }
}
