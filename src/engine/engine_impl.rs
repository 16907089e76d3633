//! Default [`DpaEngine`] implementation: one transaction on the wire at a
//! time, an exclusive-lease gate for multi-transaction sequences, and the
//! startup sequence that discovers [`CoordinatorParameters`] once at
//! launch and again after every observed coordinator reset.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, trace, warn};

use crate::channel::DpaCoordinatorChannel;
use crate::dpa::{DpaMessage, DpaTransactionRecord, TransactionOutcome};

use super::domain_types::{CoordinatorParameters, RfMode, TimingParams};
use super::lease::ExclusiveLease;
use super::traits::{DpaEngine, EngineError};
use super::transaction::PendingTransaction;

/// Handler for unsolicited inbound frames (anything not claimed as the
/// current transaction's confirmation or response).
pub type AsyncHandler = Arc<dyn Fn(&DpaMessage) + Send + Sync>;

/// Byte offset within an inbound coordinator reset notification's pdata
/// where the two-byte DPA version word lives. Purely an internal framing
/// convention of this engine, not a wire-protocol fact.
const RESET_DPA_VERSION_OFFSET: usize = 0;

/// How long `start()` waits for a spontaneous reset notification before
/// falling back to sending an explicit reset request.
const DEFAULT_RESET_WAIT: Duration = Duration::from_millis(1000);

fn is_reset_notification(frame: &DpaMessage) -> bool {
    frame.nadr() == Some(0) && frame.pnum() == Some(0x00) && frame.pcmd() == Some(0x00)
}

/// Backoff between attempts of [`DpaEngine::execute_with_retry`].
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

pub struct DpaEngineImpl {
    pub(super) channel: Arc<dyn DpaCoordinatorChannel>,
    channel_lock: AsyncMutex<()>,
    lease_mutex: Arc<AsyncMutex<()>>,
    pub(super) lease_active: AtomicBool,
    lease_waiters: std::sync::atomic::AtomicUsize,
    pending: Mutex<Option<PendingTransaction>>,
    async_handlers: DashMap<String, AsyncHandler>,
    any_handlers: DashMap<String, AsyncHandler>,
    coordinator_params: RwLock<CoordinatorParameters>,
    timing_params: RwLock<TimingParams>,
    rf_mode: RwLock<RfMode>,
    frc_response_time: std::sync::atomic::AtomicU8,
    ready: AtomicBool,
}

impl DpaEngineImpl {
    /// Builds an engine over `channel`. Call [`DpaEngineImpl::start`]
    /// before routing service traffic through it.
    pub fn new(channel: Arc<dyn DpaCoordinatorChannel>) -> Arc<Self> {
        let engine = Arc::new(Self {
            channel,
            channel_lock: AsyncMutex::new(()),
            lease_mutex: Arc::new(AsyncMutex::new(())),
            lease_active: AtomicBool::new(false),
            lease_waiters: std::sync::atomic::AtomicUsize::new(0),
            pending: Mutex::new(None),
            async_handlers: DashMap::new(),
            any_handlers: DashMap::new(),
            coordinator_params: RwLock::new(CoordinatorParameters::default()),
            timing_params: RwLock::new(TimingParams::default()),
            rf_mode: RwLock::new(RfMode::Std),
            frc_response_time: std::sync::atomic::AtomicU8::new(0),
            ready: AtomicBool::new(false),
        });
        engine.install_receive_handler();
        engine
    }

    fn install_receive_handler(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.channel.register_receive(Arc::new(move |frame: DpaMessage| {
            let Some(engine) = weak.upgrade() else { return };
            engine.on_frame(frame);
        }));
    }

    fn on_frame(&self, frame: DpaMessage) {
        for handler in &self.any_handlers {
            handler.value()(&frame);
        }

        let mut pending = self.pending.lock().expect("pending mutex poisoned");
        if let Some(txn) = pending.as_mut() {
            if is_response_frame(&frame) {
                trace!("routing inbound frame as response");
                txn.deliver_response(frame);
                return;
            }
            if is_confirmation_frame(&frame) {
                trace!("routing inbound frame as confirmation");
                txn.deliver_confirmation(frame);
                return;
            }
        }
        drop(pending);

        if is_reset_notification(&frame) {
            debug!("observed coordinator reset notification");
            self.coordinator_params.write().expect("params lock poisoned").dpa_version =
                frame.pdata().get(RESET_DPA_VERSION_OFFSET..RESET_DPA_VERSION_OFFSET + 2).map(|b| (b[0], b[1]));
        }

        for handler in &self.async_handlers {
            handler.value()(&frame);
        }
    }

    /// Runs the startup sequence: waits for a spontaneous reset
    /// notification, falls back to requesting one explicitly, then fills
    /// in the remaining coordinator parameters via an exclusive OS read.
    pub async fn start(self: &Arc<Self>) -> Result<(), EngineError> {
        let observed = tokio::time::timeout(DEFAULT_RESET_WAIT, self.await_reset_notification()).await;
        if observed.is_err() {
            warn!("no spontaneous reset notification observed, requesting one explicitly");
            let reset_request = DpaMessage::new(vec![0x00, 0x00, 0x00, 0x00, 0xFF, 0xFF]);
            // nadr=0 (coordinator), pnum=0x00 (coordinator peripheral), pcmd=0x00 (reset)
            let record = self.execute_internal(reset_request, None).await?;
            if let TransactionOutcome::Ok(ref response) = record.outcome {
                self.coordinator_params.write().expect("params lock poisoned").dpa_version =
                    response.pdata().first().copied().zip(response.pdata().get(1).copied());
            }
        }

        let lease = self.clone().acquire_exclusive().await;
        let os_read_request = DpaMessage::new(vec![0x00, 0x00, 0x02, 0x00, 0xFF, 0xFF]);
        if let Ok(record) = lease.execute(os_read_request).await {
            if let TransactionOutcome::Ok(response) = record.outcome {
                self.fill_from_os_read(&response);
            }
        }
        drop(lease);

        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn fill_from_os_read(&self, response: &DpaMessage) {
        let data = response.pdata();
        let mut params = self.coordinator_params.write().expect("params lock poisoned");
        if data.len() >= 8 {
            params.mid = Some([data[0], data[1], data[2], data[3]]);
            params.os_version = Some(data[4]);
            params.mcu_type = Some((data[5], data[6]));
            params.os_build = data.get(7..9).map(|b| u16::from_le_bytes([b[0], b[1]]));
        }
    }

    async fn await_reset_notification(&self) {
        loop {
            if self.coordinator_params.read().expect("params lock poisoned").dpa_version.is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn execute_internal(
        &self,
        request: DpaMessage,
        timeout_ms: Option<u32>,
    ) -> Result<DpaTransactionRecord, EngineError> {
        let _channel_guard = self.channel_lock.lock().await;

        let timeout_ms = timeout_ms.unwrap_or_else(|| {
            self.timing_params.read().expect("timing lock poisoned").default_timeout_ms()
        });

        let (txn, mut confirmation_rx, mut response_rx) = PendingTransaction::new();
        *self.pending.lock().expect("pending mutex poisoned") = Some(txn);

        let request_ts = chrono::Utc::now();
        if let Err(err) = self.channel.send(request.clone()).await {
            *self.pending.lock().expect("pending mutex poisoned") = None;
            return Err(EngineError::Channel(err));
        }

        // Confirmation and response are awaited concurrently: an
        // address-0 (coordinator) request never gets a confirmation
        // frame, and waiting on it sequentially would block the whole
        // timeout before even looking at the response, which may already
        // have arrived.
        let mut confirmation = None;
        let mut confirmation_ts = None;
        let mut confirmation_settled = false;
        let wait_for_response = async {
            loop {
                tokio::select! {
                    biased;
                    response = &mut response_rx => return response,
                    result = &mut confirmation_rx, if !confirmation_settled => {
                        confirmation_settled = true;
                        if let Ok(frame) = result {
                            confirmation = Some(frame);
                            confirmation_ts = Some(chrono::Utc::now());
                        }
                    }
                }
            }
        };
        let response = tokio::time::timeout(Duration::from_millis(timeout_ms.into()), wait_for_response).await;
        *self.pending.lock().expect("pending mutex poisoned") = None;

        let record = match response {
            Ok(Ok(frame)) => DpaTransactionRecord {
                request,
                request_ts,
                confirmation,
                confirmation_ts,
                response: Some(frame.clone()),
                response_ts: Some(chrono::Utc::now()),
                outcome: TransactionOutcome::Ok(frame),
            },
            _ => DpaTransactionRecord {
                request,
                request_ts,
                confirmation,
                confirmation_ts,
                response: None,
                response_ts: None,
                outcome: TransactionOutcome::Timeout,
            },
        };

        if !record.is_ok() {
            return Err(EngineError::Timeout);
        }
        Ok(record)
    }

    pub(super) async fn execute_as_lease_holder(
        &self,
        request: DpaMessage,
        timeout_ms: Option<u32>,
    ) -> Result<DpaTransactionRecord, EngineError> {
        self.execute_internal(request, timeout_ms).await
    }
}

fn is_response_frame(frame: &DpaMessage) -> bool {
    frame.pcmd().is_some_and(|pcmd| pcmd & 0x80 != 0)
}

fn is_confirmation_frame(frame: &DpaMessage) -> bool {
    frame.pdata().len() <= 2 && frame.pcmd().is_some_and(|pcmd| pcmd & 0x80 == 0)
}

#[async_trait]
impl DpaEngine for DpaEngineImpl {
    async fn execute(&self, request: DpaMessage) -> Result<DpaTransactionRecord, EngineError> {
        if !self.ready.load(Ordering::SeqCst) {
            return Err(EngineError::NotReady);
        }
        if self.lease_active.load(Ordering::SeqCst) {
            return Err(EngineError::ExclusiveAccessBusy);
        }
        self.execute_internal(request, None).await
    }

    async fn execute_with_timeout(
        &self,
        request: DpaMessage,
        timeout_ms: u32,
    ) -> Result<DpaTransactionRecord, EngineError> {
        if !self.ready.load(Ordering::SeqCst) {
            return Err(EngineError::NotReady);
        }
        if self.lease_active.load(Ordering::SeqCst) {
            return Err(EngineError::ExclusiveAccessBusy);
        }
        self.execute_internal(request, Some(timeout_ms)).await
    }

    async fn execute_with_retry(
        &self,
        request: DpaMessage,
        retries: u8,
        timeout_ms: Option<u32>,
    ) -> Result<DpaTransactionRecord, EngineError> {
        if !self.ready.load(Ordering::SeqCst) {
            return Err(EngineError::NotReady);
        }
        if self.lease_active.load(Ordering::SeqCst) {
            return Err(EngineError::ExclusiveAccessBusy);
        }

        let mut attempt = 0u8;
        loop {
            match self.execute_internal(request.clone(), timeout_ms).await {
                Ok(record) => return Ok(record),
                Err(err) if attempt < retries => {
                    warn!(%err, attempt, "DPA transaction failed, retrying after backoff");
                    attempt += 1;
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn acquire_exclusive(self: Arc<Self>) -> ExclusiveLease {
        self.lease_waiters.fetch_add(1, Ordering::SeqCst);
        let guard = self.lease_mutex.clone().lock_owned().await;
        self.lease_waiters.fetch_sub(1, Ordering::SeqCst);
        ExclusiveLease::new(self.clone(), guard)
    }

    fn register_async_handler(&self, id: &str, handler: AsyncHandler) {
        self.async_handlers.insert(id.to_string(), handler);
    }

    fn unregister_async_handler(&self, id: &str) {
        self.async_handlers.remove(id);
    }

    fn register_any_handler(&self, id: &str, handler: AsyncHandler) {
        self.any_handlers.insert(id.to_string(), handler);
    }

    fn unregister_any_handler(&self, id: &str) {
        self.any_handlers.remove(id);
    }

    fn coordinator_parameters(&self) -> CoordinatorParameters {
        self.coordinator_params.read().expect("params lock poisoned").clone()
    }

    fn set_timing_params(&self, params: TimingParams) {
        *self.timing_params.write().expect("timing lock poisoned") = params;
    }

    fn set_rf_mode(&self, mode: RfMode) {
        *self.rf_mode.write().expect("rf mode lock poisoned") = mode;
    }

    fn rf_mode(&self) -> RfMode {
        *self.rf_mode.read().expect("rf mode lock poisoned")
    }

    fn set_frc_response_time(&self, value: u8) {
        self.frc_response_time.store(value, Ordering::SeqCst);
    }

    fn frc_response_time(&self) -> u8 {
        self.frc_response_time.load(Ordering::SeqCst)
    }

    fn queue_len(&self) -> usize {
        self.lease_waiters.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::LoopbackChannel;

    fn test_engine() -> (Arc<DpaEngineImpl>, Arc<LoopbackChannel>) {
        let channel = Arc::new(LoopbackChannel::new());
        let engine = DpaEngineImpl::new(channel.clone());
        (engine, channel)
    }

    #[tokio::test]
    async fn execute_before_ready_fails() {
        let (engine, _channel) = test_engine();
        let err = DpaEngine::execute(engine.as_ref(), DpaMessage::new(vec![0, 0, 0, 0, 0]))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotReady));
    }

    #[tokio::test]
    async fn execute_times_out_without_response() {
        let (engine, _channel) = test_engine();
        engine.ready.store(true, Ordering::SeqCst);
        let err = engine
            .execute_with_timeout(DpaMessage::new(vec![0, 0, 0, 0, 0]), 20)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Timeout));
    }

    #[tokio::test]
    async fn execute_completes_when_response_injected() {
        let (engine, channel) = test_engine();
        engine.ready.store(true, Ordering::SeqCst);
        let engine_clone = engine.clone();
        let handle = tokio::spawn(async move {
            engine_clone
                .execute_with_timeout(DpaMessage::new(vec![0x01, 0x00, 0x05, 0x00, 0xFF, 0xFF]), 500)
                .await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        channel.inject(DpaMessage::new(vec![0x01, 0x00, 0x05, 0x80, 0xFF, 0xFF]));
        let record = handle.await.unwrap().unwrap();
        assert!(record.is_ok());
    }

    #[tokio::test]
    async fn response_without_confirmation_completes_well_before_the_timeout() {
        let (engine, channel) = test_engine();
        engine.ready.store(true, Ordering::SeqCst);
        let engine_clone = engine.clone();
        let handle = tokio::spawn(async move {
            engine_clone
                .execute_with_timeout(DpaMessage::new(vec![0x00, 0x00, 0x02, 0x00, 0xFF, 0xFF]), 1000)
                .await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        let started = std::time::Instant::now();
        channel.inject(DpaMessage::new(vec![0x00, 0x00, 0x02, 0x80, 0xFF, 0xFF]));
        let record = handle.await.unwrap().unwrap();
        assert!(record.is_ok());
        assert!(record.confirmation.is_none());
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn exclusive_lease_blocks_ordinary_execute() {
        let (engine, _channel) = test_engine();
        engine.ready.store(true, Ordering::SeqCst);
        let lease = engine.clone().acquire_exclusive().await;
        let err = DpaEngine::execute(engine.as_ref(), DpaMessage::new(vec![0, 0, 0, 0, 0]))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ExclusiveAccessBusy));
        drop(lease);
        assert!(!engine.lease_active.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn execute_with_retry_succeeds_after_injected_response() {
        let (engine, channel) = test_engine();
        engine.ready.store(true, Ordering::SeqCst);
        let engine_clone = engine.clone();
        let handle = tokio::spawn(async move {
            DpaEngine::execute_with_retry(
                engine_clone.as_ref(),
                DpaMessage::new(vec![0x01, 0x00, 0x05, 0x00, 0xFF, 0xFF]),
                2,
                Some(200),
            )
            .await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        channel.inject(DpaMessage::new(vec![0x01, 0x00, 0x05, 0x80, 0xFF, 0xFF]));
        let record = handle.await.unwrap().unwrap();
        assert!(record.is_ok());
    }

    #[tokio::test]
    async fn execute_with_retry_gives_up_after_exhausting_retries() {
        let (engine, _channel) = test_engine();
        engine.ready.store(true, Ordering::SeqCst);
        let err = DpaEngine::execute_with_retry(engine.as_ref(), DpaMessage::new(vec![0, 0, 0, 0, 0]), 1, Some(10))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Timeout));
    }

    #[test]
    fn any_handler_observes_frames_not_matched_to_a_pending_transaction() {
        let (engine, channel) = test_engine();
        let seen = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let seen_clone = seen.clone();
        engine.register_any_handler("diag", Arc::new(move |_frame| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        }));
        channel.inject(DpaMessage::new(vec![0x00, 0x00, 0x00, 0x00, 0xFF, 0xFF]));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        engine.unregister_any_handler("diag");
        channel.inject(DpaMessage::new(vec![0x00, 0x00, 0x00, 0x00, 0xFF, 0xFF]));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn frc_response_time_round_trips() {
        let (engine, _channel) = test_engine();
        assert_eq!(engine.frc_response_time(), 0);
        engine.set_frc_response_time(40);
        assert_eq!(engine.frc_response_time(), 40);
    }

    #[tokio::test]
    async fn queue_len_reflects_waiters_blocked_on_acquire_exclusive() {
        let (engine, _channel) = test_engine();
        assert_eq!(engine.queue_len(), 0);
        let lease = engine.clone().acquire_exclusive().await;
        assert_eq!(engine.queue_len(), 0);

        let engine_clone = engine.clone();
        let waiter = tokio::spawn(async move {
            let _second_lease = engine_clone.acquire_exclusive().await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(engine.queue_len(), 1);

        drop(lease);
        waiter.await.unwrap();
        assert_eq!(engine.queue_len(), 0);
    }
}
