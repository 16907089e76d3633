//! RAII guard representing exclusive access to the coordinator.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::sync::OwnedMutexGuard;

use crate::dpa::{DpaMessage, DpaTransactionRecord};

use super::engine_impl::DpaEngineImpl;
use super::traits::EngineError;

/// Held for the duration of a multi-transaction sequence (e.g. a whole
/// IQMESH service run) that must not be interleaved with any other
/// caller's traffic. Dropping the lease releases exclusivity and lets the
/// next queued `acquire_exclusive` caller, or any ordinary `execute`
/// caller, proceed.
pub struct ExclusiveLease {
    engine: Arc<DpaEngineImpl>,
    _guard: OwnedMutexGuard<()>,
}

impl ExclusiveLease {
    pub(super) fn new(engine: Arc<DpaEngineImpl>, guard: OwnedMutexGuard<()>) -> Self {
        engine.lease_active.store(true, Ordering::SeqCst);
        engine.channel.set_exclusive(true);
        Self { engine, _guard: guard }
    }

    /// Runs one transaction using the engine's default timeout. Unlike
    /// [`crate::engine::DpaEngine::execute`], this never fails with
    /// `ExclusiveAccessBusy` since the caller already holds the lease.
    pub async fn execute(&self, request: DpaMessage) -> Result<DpaTransactionRecord, EngineError> {
        self.engine.execute_as_lease_holder(request, None).await
    }

    /// Runs one transaction with an explicit timeout in milliseconds.
    pub async fn execute_with_timeout(
        &self,
        request: DpaMessage,
        timeout_ms: u32,
    ) -> Result<DpaTransactionRecord, EngineError> {
        self.engine
            .execute_as_lease_holder(request, Some(timeout_ms))
            .await
    }
}

impl Drop for ExclusiveLease {
    fn drop(&mut self) {
        self.engine.lease_active.store(false, Ordering::SeqCst);
        self.engine.channel.set_exclusive(false);
    }
}
