use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::CoreResult;

/// Single-flight guard for the expiry sweep.
#[async_trait]
pub trait SweepLease: Send + Sync {
    /// `Ok(false)` when another sweep currently holds the lease.
    async fn try_acquire(&self) -> CoreResult<bool>;

    async fn release(&self) -> CoreResult<()>;
}

/// In-process lease; enough when a single instance runs the sweep.
#[derive(Debug, Default)]
pub struct LocalSweepLease {
    held: AtomicBool,
}

impl LocalSweepLease {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SweepLease for LocalSweepLease {
    async fn try_acquire(&self) -> CoreResult<bool> {
        Ok(self
            .held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok())
    }

    async fn release(&self) -> CoreResult<()> {
        self.held.store(false, Ordering::Release);
        Ok(())
    }
}
