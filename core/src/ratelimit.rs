//! Rate limiter seam.
//!
//! The limiting algorithm lives outside this crate. The core only resolves a
//! bucket key, asks the factory for the matching limiter and holds a permit
//! for the duration of the network round-trip.

use std::sync::Arc;

use async_trait::async_trait;

use crate::endpoint::BucketKey;

/// One rate-limit counter.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Wait until a request may be issued.
    async fn acquire(&self);

    /// Give back what `acquire` took. Called exactly once per `acquire`.
    fn release(&self);
}

/// Hands out the limiter for a bucket.
///
/// Implementations should return the same limiter for equal keys; the client
/// calls this on every dispatched request.
pub trait RateLimiterFactory: Send + Sync {
    fn limiter(&self, bucket: BucketKey) -> Arc<dyn RateLimiter>;
}

/// Limiter that never waits.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRateLimiter;

#[async_trait]
impl RateLimiter for NoopRateLimiter {
    async fn acquire(&self) {}

    fn release(&self) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRateLimiterFactory;

impl RateLimiterFactory for NoopRateLimiterFactory {
    fn limiter(&self, _bucket: BucketKey) -> Arc<dyn RateLimiter> {
        Arc::new(NoopRateLimiter)
    }
}

/// Releases its limiter when dropped, including when the owning future is
/// cancelled mid-request.
pub(crate) struct Permit {
    limiter: Arc<dyn RateLimiter>,
}

impl Permit {
    pub(crate) async fn acquire(factory: &dyn RateLimiterFactory, bucket: BucketKey) -> Self {
        let limiter = factory.limiter(bucket);
        limiter.acquire().await;
        Permit { limiter }
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.limiter.release();
    }
}
