use std::sync::Arc;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Fixed-capacity pool of slots bounding in-flight provider calls.
///
/// Clones share the same pool. A slot is returned when its [`LimiterSlot`] is
/// dropped, so every exit path of a worker releases it.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

#[derive(Debug)]
pub struct LimiterSlot {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyLimiter {
    /// A capacity of zero would block every worker forever, so it is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { semaphore: Arc::new(Semaphore::new(capacity)), capacity }
    }

    /// Waits until a slot is free.
    ///
    /// # Errors
    /// Returns `AcquireError` if the pool has been closed.
    pub async fn acquire(&self) -> Result<LimiterSlot, AcquireError> {
        let permit = Arc::clone(&self.semaphore).acquire_owned().await?;
        Ok(LimiterSlot { _permit: permit })
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_slots_are_bounded_and_released_on_drop() {
        let limiter = ConcurrencyLimiter::new(2);
        let first = limiter.acquire().await.expect("slot");
        let _second = limiter.acquire().await.expect("slot");
        assert_eq!(limiter.available(), 0);

        let blocked = tokio::time::timeout(Duration::from_millis(50), limiter.acquire()).await;
        assert!(blocked.is_err(), "third acquire should wait for a free slot");

        drop(first);
        assert_eq!(limiter.available(), 1);
        assert!(limiter.acquire().await.is_ok());
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        assert_eq!(ConcurrencyLimiter::new(0).capacity(), 1);
    }

    #[tokio::test]
    async fn test_clones_share_capacity() {
        let limiter = ConcurrencyLimiter::new(1);
        let clone = limiter.clone();
        let _slot = clone.acquire().await.expect("slot");
        assert_eq!(limiter.available(), 0);
    }
}
