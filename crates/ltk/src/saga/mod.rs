//! Tokenization saga
//!
//! [`Tokenizer`] is the top-level handle of the orchestrator. One
//! [`tokenize`](Tokenizer::tokenize) call drives the multi-step workflow that
//! turns a parcel draft into a minted token: wallet connection, fee payment,
//! parcel registration, document upload and mint, with payment verification
//! running concurrently from the moment the payment is submitted.
//!
//! Progress is reported on a typed, ordered event stream rather than through
//! callbacks; consumers read [`SagaEvent`]s off the returned
//! [`TokenizationRun`] and join it for the composite outcome.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::instrument;
use uuid::Uuid;

use ltk_common::{
    AccountRef, Amount, Balance, DocumentUpload, Error, FeeQuote, Parcel, ParcelDraft, ParcelId,
    StepUpdate, TokenizationOutcome, TransactionRef,
};

use crate::cache::{CacheConfig, ResponseCache};
use crate::connector::BackendConnector;
use crate::dedup::OperationRegistry;
use crate::retry::{Operation, RetryExecutor, RetryPolicy};
use crate::session::WalletSessionManager;
use crate::signer::WalletSigner;
use crate::verify::{PaymentVerifier, VerificationRequest, VerifierConfig};

mod state;

use state::Saga;

/// Cache key prefix shared by all parcel read operations. Parcel writes
/// invalidate every entry under it.
pub const PARCEL_CACHE_PREFIX: &str = "parcels";

/// Cache key of the fee quote read.
pub const FEE_QUOTE_CACHE_KEY: &str = "payment-exchange-rate";

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct TokenizerConfig {
    /// Treasury account receiving tokenization fees
    pub treasury: AccountRef,
    /// Retry policy for idempotent reads
    pub read_policy: RetryPolicy,
    /// Retry policy for writes
    pub write_policy: RetryPolicy,
    /// Payment verification polling
    pub verifier: VerifierConfig,
    /// Read-response cache
    pub cache: CacheConfig,
}

impl TokenizerConfig {
    /// Configuration with defaults for everything but the treasury account.
    pub fn new(treasury: AccountRef) -> Self {
        Self {
            treasury,
            read_policy: RetryPolicy::default(),
            write_policy: RetryPolicy::default(),
            verifier: VerifierConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

/// Input of one tokenization run.
#[derive(Debug, Clone)]
pub struct TokenizationRequest {
    /// Parcel to register and mint
    pub draft: ParcelDraft,
    /// Supporting documents to upload (best effort)
    pub documents: Vec<DocumentUpload>,
    /// Caller-supplied identifier deduplicating the whole run. Generated
    /// when absent; supply one to make concurrent resubmission of the same
    /// logical request fail fast instead of paying and registering twice.
    pub operation_id: Option<String>,
}

/// Event emitted on the stream of one tokenization run.
#[derive(Debug, Clone)]
pub enum SagaEvent {
    /// A step changed status, in strict declared step order
    Step(StepUpdate),
    /// The payment verifier settled; unordered relative to the steps
    /// following payment submission
    Verification(crate::verify::VerificationEvent),
}

/// Handle on one in-flight tokenization run.
#[derive(Debug)]
pub struct TokenizationRun {
    /// Ordered progress event stream
    pub events: mpsc::UnboundedReceiver<SagaEvent>,
    handle: JoinHandle<Result<TokenizationOutcome, Error>>,
}

impl TokenizationRun {
    /// Next progress event, or `None` once the run and its verification
    /// forwarding have finished.
    pub async fn next_event(&mut self) -> Option<SagaEvent> {
        self.events.recv().await
    }

    /// Wait for the run to finish and return its composite outcome.
    ///
    /// Drops the event stream; drain [`next_event`](Self::next_event) first
    /// if the events matter.
    pub async fn join(self) -> Result<TokenizationOutcome, Error> {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(err) => Err(Error::Custom(format!("tokenization task failed: {err}"))),
        }
    }
}

/// Sender half of the saga event stream.
#[derive(Debug, Clone)]
pub(crate) struct Progress {
    sender: mpsc::UnboundedSender<SagaEvent>,
}

impl Progress {
    /// Emit a step update. Consumers that dropped the receiver are ignored.
    pub(crate) fn step(&self, update: StepUpdate) {
        tracing::debug!("Step {} -> {:?}", update.step, update.status);
        let _ = self.sender.send(SagaEvent::Step(update));
    }
}

/// Top-level orchestrator handle.
///
/// Cheap to clone; all clones share the session, cache, dedup registry and
/// verifier.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    pub(crate) connector: Arc<dyn BackendConnector>,
    pub(crate) session: WalletSessionManager,
    pub(crate) executor: RetryExecutor,
    pub(crate) cache: Arc<ResponseCache>,
    pub(crate) verifier: PaymentVerifier,
    pub(crate) config: Arc<TokenizerConfig>,
}

impl Tokenizer {
    /// New orchestrator over the given backend connector and wallet signer.
    ///
    /// Spawns the signer event watcher; call within a tokio runtime.
    pub fn new(
        connector: Arc<dyn BackendConnector>,
        signer: Arc<dyn WalletSigner>,
        config: TokenizerConfig,
    ) -> Self {
        let registry = Arc::new(OperationRegistry::new());
        let cache = Arc::new(ResponseCache::new(config.cache.clone()));
        let executor = RetryExecutor::new(registry, cache.clone());
        let session = WalletSessionManager::new(signer, connector.clone(), executor.clone());
        let verifier = PaymentVerifier::new(connector.clone(), config.verifier.clone());

        Self {
            connector,
            session,
            executor,
            cache,
            verifier,
            config: Arc::new(config),
        }
    }

    /// The wallet session manager.
    pub fn session(&self) -> &WalletSessionManager {
        &self.session
    }

    /// The payment verification poller.
    pub fn verifier(&self) -> &PaymentVerifier {
        &self.verifier
    }

    /// Start one tokenization run.
    ///
    /// The run executes on a spawned task; the returned handle carries the
    /// ordered progress event stream and resolves to the composite outcome.
    /// `verified` in the outcome is always `false` at return time: payment
    /// confirmation arrives out of band as a [`SagaEvent::Verification`].
    pub fn tokenize(&self, request: TokenizationRequest) -> TokenizationRun {
        let (sender, events) = mpsc::unbounded_channel();
        let tokenizer = self.clone();
        let handle = tokio::spawn(async move {
            let progress = Progress { sender };
            tokenizer.run(request, &progress).await
        });
        TokenizationRun { events, handle }
    }

    #[instrument(skip_all)]
    async fn run(
        &self,
        request: TokenizationRequest,
        progress: &Progress,
    ) -> Result<TokenizationOutcome, Error> {
        let operation_id = request
            .operation_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        // The run key is held until the run settles, so a duplicate request
        // is rejected before it can reach the irreversible payment step.
        let run_key = format!("tokenize-{operation_id}");
        let _run_guard = self
            .executor
            .registry()
            .try_acquire(&run_key)
            .ok_or(Error::DuplicateOperation(run_key))?;
        tracing::info!("Starting tokenization run {}", operation_id);

        let saga = Saga::start(self, progress, operation_id);
        let saga = saga.ensure_wallet().await?;
        let saga = saga.submit_payment().await?;
        let saga = saga.register_parcel(&request.draft).await?;
        let saga = saga.upload_documents(request.documents).await?;
        let outcome = saga.mint().await?;

        self.cache.invalidate_prefix(PARCEL_CACHE_PREFIX);
        tracing::info!(
            "Parcel {} tokenized as {} serial {}",
            outcome.parcel.id,
            outcome.mint.token_id,
            outcome.mint.serial
        );
        Ok(outcome)
    }

    /// Start the payment verifier for a just-submitted fee payment and
    /// forward its settle event into the saga event stream.
    fn start_payment_verification(
        &self,
        payment_ref: TransactionRef,
        account: AccountRef,
        expected_amount: Amount,
        progress: &Progress,
    ) {
        // Subscribe before starting so the settle event cannot be missed
        let mut events = self.verifier.subscribe();
        self.verifier.start_verification(VerificationRequest {
            transaction_ref: payment_ref.clone(),
            account,
            expected_amount,
        });

        let sender = progress.sender.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) if event.transaction_ref() == &payment_ref => {
                        let _ = sender.send(SagaEvent::Verification(event));
                        break;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Verification event stream lagged by {}", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    /// All listed parcels, served from the cache when fresh.
    pub async fn list_parcels(&self) -> Result<Vec<Parcel>, Error> {
        self.executor
            .execute_read(
                Operation::read("parcels-list"),
                &self.config.read_policy,
                || {
                    let connector = self.connector.clone();
                    async move { connector.get_parcels().await }
                },
            )
            .await
    }

    /// Parcels owned by the connected account.
    pub async fn my_parcels(&self) -> Result<Vec<Parcel>, Error> {
        let account = self.session.account().await.ok_or(Error::NotConnected)?;
        self.executor
            .execute_read(
                Operation::read(format!("parcels-my-{account}")),
                &self.config.read_policy,
                || {
                    let connector = self.connector.clone();
                    let account = account.clone();
                    async move { connector.get_my_parcels(&account).await }
                },
            )
            .await
    }

    /// One parcel by id.
    pub async fn parcel(&self, id: &ParcelId) -> Result<Parcel, Error> {
        self.executor
            .execute_read(
                Operation::read(format!("parcels-{id}")),
                &self.config.read_policy,
                || {
                    let connector = self.connector.clone();
                    let id = id.clone();
                    async move { connector.get_parcel(&id).await }
                },
            )
            .await
    }

    /// Remove a parcel from listing and invalidate cached parcel reads.
    pub async fn delist_parcel(&self, id: &ParcelId) -> Result<Parcel, Error> {
        let envelope = self
            .executor
            .execute(
                Some(Operation::write(format!("delist-parcel-{id}"))),
                &self.config.write_policy,
                || {
                    let connector = self.connector.clone();
                    let id = id.clone();
                    async move { connector.delist_parcel(&id).await }
                },
            )
            .await?;
        self.cache.invalidate_prefix(PARCEL_CACHE_PREFIX);
        Ok(envelope.data)
    }

    /// Current fee quote, served from the cache when fresh.
    pub async fn fee_quote(&self) -> Result<FeeQuote, Error> {
        self.executor
            .execute_read(
                Operation::read(FEE_QUOTE_CACHE_KEY),
                &self.config.read_policy,
                || {
                    let connector = self.connector.clone();
                    async move { connector.get_exchange_rate().await }
                },
            )
            .await
    }

    /// Fresh ledger balance of the connected account; never cached.
    pub async fn balance(&self) -> Result<Balance, Error> {
        let account = self.session.account().await.ok_or(Error::NotConnected)?;
        self.executor
            .execute(None, &self.config.read_policy, || {
                let connector = self.connector.clone();
                let account = account.clone();
                async move { connector.check_balance(&account).await }
            })
            .await
    }
}
