use crate::config::RetryPolicyConfig;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

/// Global timeout used when nothing more specific is configured.
pub const DEFAULT_GLOBAL_TIMEOUT: Duration = Duration::from_secs(60);

/// Retry parameters; applied by the request loop, never by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    pub retry_on: bool,
    pub retry_timeout: Duration,
    pub num_retries: u32,
}

impl From<&RetryPolicyConfig> for RetryPolicy {
    fn from(config: &RetryPolicyConfig) -> Self {
        Self {
            retry_on: config.retry_on,
            retry_timeout: Duration::from_millis(config.retry_timeout_ms),
            num_retries: config.num_retries,
        }
    }
}

/// Policy attached to a route.
///
/// Routes created by `RouteTable::add_router` and the dynamic route share
/// the first route's policy through the same `Arc`, so `update` is seen by
/// every route holding it.
#[derive(Debug, Default)]
pub struct RoutePolicy {
    retry: RwLock<RetryPolicy>,
}

impl RoutePolicy {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            retry: RwLock::new(retry),
        }
    }

    pub fn shared(retry: RetryPolicy) -> Arc<Self> {
        Arc::new(Self::new(retry))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        *self.retry.read()
    }

    pub fn retry_on(&self) -> bool {
        self.retry.read().retry_on
    }

    pub fn try_timeout(&self) -> Duration {
        self.retry.read().retry_timeout
    }

    pub fn num_retries(&self) -> u32 {
        self.retry.read().num_retries
    }

    pub fn update(&self, retry: RetryPolicy) {
        *self.retry.write() = retry;
    }
}
