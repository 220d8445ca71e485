use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A bounded, shared concurrency budget.
///
/// `can_create`/`increase`/`decrease` mirror the cluster manager's contract.
/// `try_increase` folds the check and the increment into one step; the
/// default implementation is only as strong as the two calls it makes, so
/// implementations backed by atomics should override it.
pub trait Resource: Send + Sync + fmt::Debug {
    fn can_create(&self) -> bool;
    fn increase(&self);
    fn decrease(&self);
    fn max(&self) -> u64;
    fn count(&self) -> u64;

    fn try_increase(&self) -> bool {
        if self.can_create() {
            self.increase();
            true
        } else {
            false
        }
    }
}

/// Atomic counter with a fixed ceiling.
#[derive(Debug)]
pub struct ResourceLimit {
    max: u64,
    current: AtomicU64,
}

impl ResourceLimit {
    pub fn new(max: u64) -> Self {
        Self {
            max,
            current: AtomicU64::new(0),
        }
    }
}

impl Resource for ResourceLimit {
    fn can_create(&self) -> bool {
        self.current.load(Ordering::Acquire) < self.max
    }

    fn increase(&self) {
        self.current.fetch_add(1, Ordering::AcqRel);
    }

    fn decrease(&self) {
        // Saturate at zero so a stray release cannot wrap the budget.
        let _ = self
            .current
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| v.checked_sub(1));
    }

    fn max(&self) -> u64 {
        self.max
    }

    fn count(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }

    fn try_increase(&self) -> bool {
        let mut prev = self.current.load(Ordering::Acquire);
        loop {
            if prev >= self.max {
                return false;
            }
            match self.current.compare_exchange_weak(
                prev,
                prev + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => prev = actual,
            }
        }
    }
}

/// Per-cluster admission budgets.
#[derive(Debug, Clone)]
pub struct ResourceManager {
    requests: Arc<dyn Resource>,
}

impl ResourceManager {
    pub fn new(max_requests: u64) -> Self {
        Self {
            requests: Arc::new(ResourceLimit::new(max_requests)),
        }
    }

    /// Build a manager around a caller-supplied request budget.
    pub fn with_requests(requests: Arc<dyn Resource>) -> Self {
        Self { requests }
    }

    /// Budget for concurrently in-flight requests.
    pub fn requests(&self) -> &dyn Resource {
        self.requests.as_ref()
    }
}
