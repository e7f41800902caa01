use crate::adapters::stats::CounterStore;
use crate::domain::Platform;
use crate::error::StorageError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, Ordering};

#[derive(Debug, Default)]
struct PlatformCounters {
    success: AtomicI64,
    error: AtomicI64,
}

/// Process-lifetime counters held in atomics.
#[derive(Debug, Default)]
pub struct MemoryStore {
    total: AtomicI64,
    ios: PlatformCounters,
    android: PlatformCounters,
    huawei: PlatformCounters,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    const fn counters(&self, platform: Platform) -> &PlatformCounters {
        match platform {
            Platform::Ios => &self.ios,
            Platform::Android => &self.android,
            Platform::Huawei => &self.huawei,
        }
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn init(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn add_total(&self, delta: i64) -> Result<(), StorageError> {
        self.total.fetch_add(delta, Ordering::Relaxed);
        Ok(())
    }

    async fn add_success(&self, platform: Platform, delta: i64) -> Result<(), StorageError> {
        self.counters(platform).success.fetch_add(delta, Ordering::Relaxed);
        Ok(())
    }

    async fn add_error(&self, platform: Platform, delta: i64) -> Result<(), StorageError> {
        self.counters(platform).error.fetch_add(delta, Ordering::Relaxed);
        Ok(())
    }

    async fn total_count(&self) -> Result<i64, StorageError> {
        Ok(self.total.load(Ordering::Relaxed))
    }

    async fn success_count(&self, platform: Platform) -> Result<i64, StorageError> {
        Ok(self.counters(platform).success.load(Ordering::Relaxed))
    }

    async fn error_count(&self, platform: Platform) -> Result<i64, StorageError> {
        Ok(self.counters(platform).error.load(Ordering::Relaxed))
    }

    async fn reset(&self) -> Result<(), StorageError> {
        self.total.store(0, Ordering::Relaxed);
        for platform in Platform::ALL {
            let counters = self.counters(platform);
            counters.success.store(0, Ordering::Relaxed);
            counters.error.store(0, Ordering::Relaxed);
        }
        Ok(())
    }
}
