//! The `DpaEngine` contract and its error type.

use async_trait::async_trait;
use thiserror::Error;

use crate::dpa::{DpaMessage, DpaTransactionRecord};

use super::domain_types::{CoordinatorParameters, RfMode, TimingParams};
use super::lease::ExclusiveLease;

/// Errors an engine implementation can report.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A non-lease caller attempted a transaction while a lease is held.
    #[error("exclusive access is held by another caller")]
    ExclusiveAccessBusy,

    /// No response arrived before the transaction's timeout elapsed.
    #[error("transaction timed out")]
    Timeout,

    /// The underlying channel failed.
    #[error("channel error: {0}")]
    Channel(#[from] crate::channel::ChannelError),

    /// The coordinator responded with a non-OK DPA error code.
    #[error("DPA error {code}: {message}")]
    Dpa {
        /// The DPA error code reported by the coordinator.
        code: i32,
        /// Human-readable description.
        message: String,
    },

    /// The engine has not completed its startup sequence yet.
    #[error("engine is not ready: startup has not completed")]
    NotReady,
}

/// Single point of access to the attached coordinator. Every transaction
/// is strictly request/response (plus an optional confirmation), and at
/// most one is ever in flight on the wire at a time.
#[async_trait]
pub trait DpaEngine: Send + Sync {
    /// Runs one transaction with the engine's default timeout, derived
    /// from the current [`TimingParams`].
    async fn execute(&self, request: DpaMessage) -> Result<DpaTransactionRecord, EngineError>;

    /// Runs one transaction with an explicit timeout in milliseconds.
    async fn execute_with_timeout(
        &self,
        request: DpaMessage,
        timeout_ms: u32,
    ) -> Result<DpaTransactionRecord, EngineError>;

    /// Acquires exclusive access: while the returned lease is alive, every
    /// `execute` call from a caller other than the lease holder fails
    /// immediately with [`EngineError::ExclusiveAccessBusy`]. Suspends
    /// until any prior lease is released.
    ///
    /// Takes `self` by `Arc` because the returned lease must be able to
    /// outlive any particular borrow of the engine.
    async fn acquire_exclusive(self: std::sync::Arc<Self>) -> ExclusiveLease;

    /// Runs one transaction, retrying up to `retries` additional times (each
    /// preceded by a 250 ms backoff) on transport or DPA-side failure.
    /// Returns the final attempt's record, success or failure.
    async fn execute_with_retry(
        &self,
        request: DpaMessage,
        retries: u8,
        timeout_ms: Option<u32>,
    ) -> Result<DpaTransactionRecord, EngineError>;

    /// Registers a handler invoked for every inbound frame that is not
    /// claimed as a transaction's confirmation/response (i.e. unsolicited
    /// asynchronous messages such as reset notifications or FRC reports).
    fn register_async_handler(&self, id: &str, handler: super::engine_impl::AsyncHandler);

    /// Removes a previously registered asynchronous handler.
    fn unregister_async_handler(&self, id: &str);

    /// Registers a handler invoked for *every* inbound frame, whether it is
    /// claimed as a transaction's confirmation/response or an unsolicited
    /// async message. Diagnostic-only; the dispatch decision is unaffected
    /// by what these handlers do.
    fn register_any_handler(&self, id: &str, handler: super::engine_impl::AsyncHandler);

    /// Removes a previously registered any-frame handler.
    fn unregister_any_handler(&self, id: &str);

    /// The cached coordinator identity, if the startup sequence has
    /// completed at least once.
    fn coordinator_parameters(&self) -> CoordinatorParameters;

    /// Updates the timing parameters used to derive the default timeout.
    fn set_timing_params(&self, params: TimingParams);

    /// Updates the RF mode advertised to callers (informational only; the
    /// engine does not itself switch radio modes, a service does via a
    /// dedicated transaction).
    fn set_rf_mode(&self, mode: RfMode);

    /// The current RF mode.
    fn rf_mode(&self) -> RfMode;

    /// Sets the FRC (fast response command) response time advertised to
    /// callers; informational only, mirrored from the last value a service
    /// pushed to the coordinator via a dedicated transaction.
    fn set_frc_response_time(&self, value: u8);

    /// The current FRC response time.
    fn frc_response_time(&self) -> u8;

    /// Number of callers currently suspended waiting on
    /// [`DpaEngine::acquire_exclusive`].
    fn queue_len(&self) -> usize;
}
