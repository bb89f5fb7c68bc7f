//! Payment verification poller
//!
//! Spawned verification loops ask the backend whether a fee payment reached a
//! final, matching state on the ledger. A loop settles exactly once: verified,
//! or failed with a reason (rejected, attempts exhausted, wall-clock timeout).
//! Failure means "unconfirmed", never "reverted"; callers must not treat it
//! as proof the payment did not happen.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use ltk_common::util::unix_time;
use ltk_common::{
    AccountRef, Amount, PaymentVerdict, TransactionRef, VerificationFailure, VerificationStatus,
};

use crate::connector::BackendConnector;

const EVENT_CHANNEL_SIZE: usize = 64;

/// Polling configuration for payment verification.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Delay between consecutive verification requests
    pub poll_interval: Duration,
    /// Maximum number of verification requests per loop
    pub max_attempts: u32,
    /// Wall-clock bound on the whole loop
    pub overall_timeout: Duration,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_attempts: 12,
            overall_timeout: Duration::from_secs(60),
        }
    }
}

/// Payment to verify.
#[derive(Debug, Clone)]
pub struct VerificationRequest {
    /// Ledger transaction to confirm
    pub transaction_ref: TransactionRef,
    /// Expected payer account
    pub account: AccountRef,
    /// Expected amount in tinybar
    pub expected_amount: Amount,
}

/// Observable state of one verification loop.
#[derive(Debug, Clone)]
pub struct VerificationTask {
    /// Transaction being verified
    pub transaction_ref: TransactionRef,
    /// Expected payer account
    pub account: AccountRef,
    /// Expected amount in tinybar
    pub expected_amount: Amount,
    /// Current status
    pub status: VerificationStatus,
    /// Verification requests sent so far
    pub attempts: u32,
    /// Most recent transport error or failure reason, if any
    pub last_error: Option<String>,
    /// Unix timestamp the payment was confirmed at
    pub verified_at: Option<u64>,
}

/// Terminal outcome event broadcast when a verification loop settles.
#[derive(Debug, Clone)]
pub enum VerificationEvent {
    /// The payment was confirmed final and matching
    Verified {
        /// Transaction that was verified
        transaction_ref: TransactionRef,
        /// Unix timestamp of confirmation
        verified_at: u64,
    },
    /// The loop settled without confirmation
    Failed {
        /// Transaction that could not be confirmed
        transaction_ref: TransactionRef,
        /// Why the loop settled
        reason: VerificationFailure,
    },
}

impl VerificationEvent {
    /// Transaction the event refers to.
    pub fn transaction_ref(&self) -> &TransactionRef {
        match self {
            Self::Verified {
                transaction_ref, ..
            } => transaction_ref,
            Self::Failed {
                transaction_ref, ..
            } => transaction_ref,
        }
    }
}

#[derive(Debug)]
struct ActiveVerification {
    cancel: CancellationToken,
    record: Arc<Mutex<VerificationTask>>,
}

/// Poller confirming fee payments against the backend.
///
/// Cloneable; all clones share the same set of active loops and the same
/// event stream.
#[derive(Debug, Clone)]
pub struct PaymentVerifier {
    connector: Arc<dyn BackendConnector>,
    config: VerifierConfig,
    active: Arc<Mutex<HashMap<TransactionRef, ActiveVerification>>>,
    events: broadcast::Sender<VerificationEvent>,
}

impl PaymentVerifier {
    /// New poller over the given connector.
    pub fn new(connector: Arc<dyn BackendConnector>, config: VerifierConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            connector,
            config,
            active: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }

    /// Subscribe to terminal verification events.
    ///
    /// Subscribe before calling [`start_verification`](Self::start_verification)
    /// to be sure not to miss the settle event.
    pub fn subscribe(&self) -> broadcast::Receiver<VerificationEvent> {
        self.events.subscribe()
    }

    /// Spawn a verification loop for `request`.
    ///
    /// Starting a second loop for the same transaction cancels the first and
    /// begins a fresh one with a reset attempt counter.
    #[instrument(skip_all, fields(transaction = %request.transaction_ref))]
    pub fn start_verification(&self, request: VerificationRequest) {
        let record = Arc::new(Mutex::new(VerificationTask {
            transaction_ref: request.transaction_ref.clone(),
            account: request.account.clone(),
            expected_amount: request.expected_amount,
            status: VerificationStatus::Verifying,
            attempts: 0,
            last_error: None,
            verified_at: None,
        }));
        let cancel = CancellationToken::new();

        {
            let mut active = self.active.lock();
            if let Some(previous) = active.remove(&request.transaction_ref) {
                tracing::debug!(
                    "Replacing verification loop for {}",
                    request.transaction_ref
                );
                previous.cancel.cancel();
            }
            active.insert(
                request.transaction_ref.clone(),
                ActiveVerification {
                    cancel: cancel.clone(),
                    record: record.clone(),
                },
            );
        }

        let verifier = self.clone();
        tokio::spawn(async move { verifier.run_loop(request, record, cancel).await });
    }

    /// Cancel the verification loop for `transaction_ref`, if one is active.
    ///
    /// Returns whether a loop was cancelled. No terminal event is emitted for
    /// a cancelled loop.
    pub fn stop_verification(&self, transaction_ref: &TransactionRef) -> bool {
        match self.active.lock().remove(transaction_ref) {
            Some(active) => {
                active.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Snapshot of the active verification task for `transaction_ref`.
    ///
    /// Settled and cancelled loops are removed; this returns `None` for them.
    pub fn status(&self, transaction_ref: &TransactionRef) -> Option<VerificationTask> {
        self.active
            .lock()
            .get(transaction_ref)
            .map(|active| active.record.lock().clone())
    }

    async fn run_loop(
        self,
        request: VerificationRequest,
        record: Arc<Mutex<VerificationTask>>,
        cancel: CancellationToken,
    ) {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => None,
            polled = tokio::time::timeout(self.config.overall_timeout, self.poll(&request, &record)) => {
                Some(polled.unwrap_or(Err(VerificationFailure::TimedOut)))
            }
        };

        // Remove our own entry; a replacement loop owns a different record.
        {
            let mut active = self.active.lock();
            if let Some(existing) = active.get(&request.transaction_ref) {
                if Arc::ptr_eq(&existing.record, &record) {
                    active.remove(&request.transaction_ref);
                }
            }
        }

        match outcome {
            None => {
                tracing::debug!("Verification of {} cancelled", request.transaction_ref);
            }
            Some(Ok(verified_at)) => {
                {
                    let mut task = record.lock();
                    task.status = VerificationStatus::Verified;
                    task.verified_at = Some(verified_at);
                }
                tracing::info!("Payment {} verified", request.transaction_ref);
                let _ = self.events.send(VerificationEvent::Verified {
                    transaction_ref: request.transaction_ref,
                    verified_at,
                });
            }
            Some(Err(reason)) => {
                {
                    let mut task = record.lock();
                    task.status = VerificationStatus::Failed;
                    task.last_error = Some(reason.to_string());
                }
                tracing::warn!(
                    "Payment {} unconfirmed: {}",
                    request.transaction_ref,
                    reason
                );
                let _ = self.events.send(VerificationEvent::Failed {
                    transaction_ref: request.transaction_ref,
                    reason,
                });
            }
        }
    }

    /// Poll the backend until a definitive verdict or attempts run out.
    ///
    /// Transport errors count as an attempt and are treated like a pending
    /// verdict: the ledger may still finalize the transaction.
    async fn poll(
        &self,
        request: &VerificationRequest,
        record: &Arc<Mutex<VerificationTask>>,
    ) -> Result<u64, VerificationFailure> {
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            {
                let mut task = record.lock();
                task.attempts = attempt;
                task.status = VerificationStatus::Verifying;
            }

            match self
                .connector
                .verify_payment(
                    &request.transaction_ref,
                    &request.account,
                    request.expected_amount,
                )
                .await
            {
                Ok(PaymentVerdict::Confirmed) => return Ok(unix_time()),
                Ok(PaymentVerdict::Failed { reason }) => {
                    return Err(VerificationFailure::Rejected { reason });
                }
                Ok(PaymentVerdict::Pending) => {
                    record.lock().status = VerificationStatus::Pending;
                }
                Err(err) => {
                    tracing::debug!(
                        "Verification attempt {} for {} errored: {}",
                        attempt,
                        request.transaction_ref,
                        err
                    );
                    let mut task = record.lock();
                    task.status = VerificationStatus::Pending;
                    task.last_error = Some(err.to_string());
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.config.poll_interval).await;
            }
        }

        Err(VerificationFailure::ExhaustedAttempts)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use ltk_common::Error;
    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;
    use crate::test_utils::FakeBackend;

    fn request() -> VerificationRequest {
        VerificationRequest {
            transaction_ref: TransactionRef::new("0.0.1234@1700000000.000000001"),
            account: AccountRef::new("0.0.1234"),
            expected_amount: Amount::new(500_000_000),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_verified_after_pending_polls() {
        let backend = Arc::new(FakeBackend::default());
        {
            let mut script = backend.verify_results.lock();
            script.push_back(Ok(PaymentVerdict::Pending));
            script.push_back(Ok(PaymentVerdict::Pending));
            script.push_back(Ok(PaymentVerdict::Pending));
            script.push_back(Ok(PaymentVerdict::Confirmed));
        }
        let verifier = PaymentVerifier::new(backend.clone(), VerifierConfig::default());
        let mut events = verifier.subscribe();

        verifier.start_verification(request());

        match events.recv().await.unwrap() {
            VerificationEvent::Verified {
                transaction_ref, ..
            } => assert_eq!(transaction_ref, request().transaction_ref),
            other => panic!("expected verified, got {other:?}"),
        }
        assert_eq!(backend.verify_calls.load(Ordering::SeqCst), 4);
        // Settled exactly once, and the task record is gone
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
        assert!(verifier.status(&request().transaction_ref).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_verdict_settles_immediately() {
        let backend = Arc::new(FakeBackend::default());
        backend.verify_results.lock().push_back(Ok(PaymentVerdict::Failed {
            reason: "payer mismatch".to_string(),
        }));
        let verifier = PaymentVerifier::new(backend.clone(), VerifierConfig::default());
        let mut events = verifier.subscribe();

        verifier.start_verification(request());

        match events.recv().await.unwrap() {
            VerificationEvent::Failed { reason, .. } => {
                assert!(matches!(reason, VerificationFailure::Rejected { reason } if reason == "payer mismatch"));
            }
            other => panic!("expected failed, got {other:?}"),
        }
        assert_eq!(backend.verify_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_attempts_then_fresh_restart() {
        // Scripted queue left empty: every poll returns pending
        let backend = Arc::new(FakeBackend::default());
        let verifier = PaymentVerifier::new(backend.clone(), VerifierConfig::default());
        let mut events = verifier.subscribe();

        verifier.start_verification(request());
        match events.recv().await.unwrap() {
            VerificationEvent::Failed { reason, .. } => {
                assert!(matches!(reason, VerificationFailure::ExhaustedAttempts));
            }
            other => panic!("expected failed, got {other:?}"),
        }
        assert_eq!(backend.verify_calls.load(Ordering::SeqCst), 12);

        // A restart begins a fresh loop with a reset attempt counter
        backend
            .verify_results
            .lock()
            .push_back(Ok(PaymentVerdict::Confirmed));
        verifier.start_verification(request());
        assert!(matches!(
            events.recv().await.unwrap(),
            VerificationEvent::Verified { .. }
        ));
        assert_eq!(backend.verify_calls.load(Ordering::SeqCst), 13);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_errors_count_as_pending() {
        let backend = Arc::new(FakeBackend::default());
        {
            let mut script = backend.verify_results.lock();
            script.push_back(Err(Error::Timeout));
            script.push_back(Err(Error::BackendUnreachable("conn refused".to_string())));
            script.push_back(Ok(PaymentVerdict::Confirmed));
        }
        let verifier = PaymentVerifier::new(backend.clone(), VerifierConfig::default());
        let mut events = verifier.subscribe();

        verifier.start_verification(request());

        assert!(matches!(
            events.recv().await.unwrap(),
            VerificationEvent::Verified { .. }
        ));
        assert_eq!(backend.verify_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_without_event() {
        let backend = Arc::new(FakeBackend::default());
        let verifier = PaymentVerifier::new(backend.clone(), VerifierConfig::default());
        let mut events = verifier.subscribe();

        verifier.start_verification(request());
        tokio::time::sleep(Duration::from_secs(7)).await;

        assert!(verifier.stop_verification(&request().transaction_ref));
        assert!(!verifier.stop_verification(&request().transaction_ref));

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
        assert!(verifier.status(&request().transaction_ref).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wall_clock_timeout() {
        let backend = Arc::new(FakeBackend::default());
        let config = VerifierConfig {
            poll_interval: Duration::from_secs(5),
            max_attempts: 100,
            overall_timeout: Duration::from_secs(12),
        };
        let verifier = PaymentVerifier::new(backend.clone(), config);
        let mut events = verifier.subscribe();

        verifier.start_verification(request());

        match events.recv().await.unwrap() {
            VerificationEvent::Failed { reason, .. } => {
                assert!(matches!(reason, VerificationFailure::TimedOut));
            }
            other => panic!("expected failed, got {other:?}"),
        }
        // Polls at t=0s, 5s and 10s before the 12s bound elapses
        assert_eq!(backend.verify_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_running_loop() {
        let backend = Arc::new(FakeBackend::default());
        let verifier = PaymentVerifier::new(backend.clone(), VerifierConfig::default());
        let mut events = verifier.subscribe();

        verifier.start_verification(request());
        // Let the first loop poll once and park in its interval sleep
        tokio::time::sleep(Duration::from_secs(1)).await;

        backend
            .verify_results
            .lock()
            .push_back(Ok(PaymentVerdict::Confirmed));
        verifier.start_verification(request());

        assert!(matches!(
            events.recv().await.unwrap(),
            VerificationEvent::Verified { .. }
        ));
        // The replaced loop was cancelled and never settles
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }
}
