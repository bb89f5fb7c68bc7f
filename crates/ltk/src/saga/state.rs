//! Typestate transitions of one tokenization run
//!
//! Each state owns exactly the data proven to exist by the steps already
//! completed, so a later step cannot run without the artifacts of the earlier
//! ones. Steps execute strictly in declared order; the payment verifier runs
//! concurrently from the moment the fee payment is submitted.

use ltk_common::{
    AccountRef, DocumentUpload, Error, FeeTransaction, Parcel, ParcelDraft, ParcelRegistration,
    StepId, StepUpdate, TokenizationOutcome, TransactionRef, UploadOutcome,
};

use crate::retry::Operation;
use crate::saga::{Progress, Tokenizer, FEE_QUOTE_CACHE_KEY, PARCEL_CACHE_PREFIX};

/// Saga with no completed steps.
pub(super) struct Initial {
    pub(super) operation_id: String,
}

/// Wallet session connected and backend-synced.
pub(super) struct WalletReady {
    operation_id: String,
    account: AccountRef,
}

/// Fee payment signed and submitted; money has left the user's control.
///
/// From here on every failure is wrapped in [`Error::PartialFailure`]
/// carrying the payment reference for manual reconciliation.
pub(super) struct PaymentSubmitted {
    operation_id: String,
    account: AccountRef,
    payment_ref: TransactionRef,
}

/// Parcel record registered with the backend.
pub(super) struct Registered {
    payment_ref: TransactionRef,
    parcel: Parcel,
}

/// Supporting documents attempted (best effort).
pub(super) struct DocumentsUploaded {
    payment_ref: TransactionRef,
    parcel: Parcel,
    uploads: Vec<UploadOutcome>,
}

pub(super) struct Saga<'a, S> {
    tokenizer: &'a Tokenizer,
    progress: &'a Progress,
    state: S,
}

impl<S> Saga<'_, S> {
    /// Emit the error update for `step` and hand the error back to the
    /// caller.
    fn fail(&self, step: StepId, err: Error) -> Error {
        tracing::warn!("Tokenization step {} failed: {}", step, err);
        self.progress.step(StepUpdate::error(step, err.to_string()));
        err
    }
}

impl<'a> Saga<'a, Initial> {
    pub(super) fn start(
        tokenizer: &'a Tokenizer,
        progress: &'a Progress,
        operation_id: String,
    ) -> Self {
        Self {
            tokenizer,
            progress,
            state: Initial { operation_id },
        }
    }

    /// Step 1: ensure the wallet session is connected.
    ///
    /// Failure aborts the run before any side effect.
    pub(super) async fn ensure_wallet(self) -> Result<Saga<'a, WalletReady>, Error> {
        let step = StepId::WalletConnection;
        self.progress.step(StepUpdate::processing(step));

        let session = match self.tokenizer.session.ensure_connected().await {
            Ok(session) => session,
            Err(err) => return Err(self.fail(step, err)),
        };
        let Some(account) = session.account else {
            return Err(self.fail(step, Error::NotConnected));
        };

        self.progress.step(StepUpdate::completed(
            step,
            Some(format!("connected as {account}")),
        ));
        Ok(Saga {
            tokenizer: self.tokenizer,
            progress: self.progress,
            state: WalletReady {
                operation_id: self.state.operation_id,
                account,
            },
        })
    }
}

impl<'a> Saga<'a, WalletReady> {
    /// Step 2: quote the fee, check the balance, sign and submit the fee
    /// payment.
    ///
    /// Completion means *submitted*, not confirmed: the payment verifier is
    /// started here and settles out of band on the saga event stream.
    pub(super) async fn submit_payment(self) -> Result<Saga<'a, PaymentSubmitted>, Error> {
        let step = StepId::PaymentProcessing;
        self.progress.step(StepUpdate::processing(step));
        let tokenizer = self.tokenizer;

        let quote = match tokenizer
            .executor
            .execute_read(
                Operation::read(FEE_QUOTE_CACHE_KEY),
                &tokenizer.config.read_policy,
                || {
                    let connector = tokenizer.connector.clone();
                    async move { connector.get_exchange_rate().await }
                },
            )
            .await
        {
            Ok(quote) => quote,
            Err(err) => return Err(self.fail(step, err)),
        };

        // Balance is read fresh on every run, never from the cache
        let balance = match tokenizer
            .executor
            .execute(None, &tokenizer.config.read_policy, || {
                let connector = tokenizer.connector.clone();
                let account = self.state.account.clone();
                async move { connector.check_balance(&account).await }
            })
            .await
        {
            Ok(balance) => balance,
            Err(err) => return Err(self.fail(step, err)),
        };

        let remaining = match balance.amount.checked_sub(quote.fee) {
            Ok(remaining) => remaining,
            Err(_) => {
                return Err(self.fail(
                    step,
                    Error::InsufficientFunds {
                        required: quote.fee,
                        available: balance.amount,
                    },
                ));
            }
        };
        tracing::debug!(
            "Balance {} covers fee {}, {} tinybar left",
            balance.amount,
            quote.fee,
            remaining
        );

        let transaction = FeeTransaction {
            to: tokenizer.config.treasury.clone(),
            amount: quote.fee,
            memo: Some(format!("ltk tokenization {}", self.state.operation_id)),
        };
        let payment_ref = match tokenizer.session.execute(&transaction).await {
            Ok(payment_ref) => payment_ref,
            Err(err) => return Err(self.fail(step, err)),
        };
        tracing::info!("Fee payment submitted as {}", payment_ref);

        tokenizer.start_payment_verification(
            payment_ref.clone(),
            self.state.account.clone(),
            quote.fee,
            self.progress,
        );

        self.progress.step(StepUpdate::completed(
            step,
            Some(format!(
                "fee {} submitted as {}",
                quote.fee, payment_ref
            )),
        ));
        Ok(Saga {
            tokenizer: self.tokenizer,
            progress: self.progress,
            state: PaymentSubmitted {
                operation_id: self.state.operation_id,
                account: self.state.account,
                payment_ref,
            },
        })
    }
}

impl<'a> Saga<'a, PaymentSubmitted> {
    /// Step 3: register the parcel record, linked to the fee payment.
    ///
    /// Failure here is critical (money moved, no parcel): it surfaces as
    /// [`Error::PartialFailure`] and is never silently retried as a fresh
    /// operation.
    pub(super) async fn register_parcel(
        self,
        draft: &ParcelDraft,
    ) -> Result<Saga<'a, Registered>, Error> {
        let step = StepId::ParcelCreation;
        self.progress.step(StepUpdate::processing(step));

        let registration = ParcelRegistration {
            draft: draft.clone(),
            owner: self.state.account.clone(),
            payment_ref: self.state.payment_ref.clone(),
        };
        let key = format!("create-parcel-{}", self.state.operation_id);

        let result = self
            .tokenizer
            .executor
            .execute(
                Some(Operation::write(key)),
                &self.tokenizer.config.write_policy,
                || {
                    let connector = self.tokenizer.connector.clone();
                    let registration = registration.clone();
                    async move { connector.post_parcel(registration).await }
                },
            )
            .await;

        match result {
            Ok(envelope) => {
                self.tokenizer.cache.invalidate_prefix(PARCEL_CACHE_PREFIX);
                self.progress.step(StepUpdate::completed(
                    step,
                    Some(format!("parcel {} registered", envelope.data.id)),
                ));
                Ok(Saga {
                    tokenizer: self.tokenizer,
                    progress: self.progress,
                    state: Registered {
                        payment_ref: self.state.payment_ref,
                        parcel: envelope.data,
                    },
                })
            }
            Err(err) => {
                let err = Error::PartialFailure {
                    step,
                    payment_ref: self.state.payment_ref.clone(),
                    source: Box::new(err),
                };
                Err(self.fail(step, err))
            }
        }
    }
}

impl<'a> Saga<'a, Registered> {
    /// Step 4: upload supporting documents, best effort.
    ///
    /// Individual failures are recorded per file and never abort the run;
    /// the step completes with the failure count in its detail.
    pub(super) async fn upload_documents(
        self,
        documents: Vec<DocumentUpload>,
    ) -> Result<Saga<'a, DocumentsUploaded>, Error> {
        let step = StepId::DocumentUpload;
        self.progress.step(StepUpdate::processing(step));

        let mut uploads = Vec::with_capacity(documents.len());
        for document in documents {
            let file_name = document.file_name.clone();
            let result = self
                .tokenizer
                .executor
                .execute(None, &self.tokenizer.config.write_policy, || {
                    let connector = self.tokenizer.connector.clone();
                    let parcel_id = self.state.parcel.id.clone();
                    let document = document.clone();
                    async move { connector.post_parcel_document(&parcel_id, document).await }
                })
                .await;

            match result {
                Ok(envelope) => uploads.push(UploadOutcome {
                    file_name,
                    receipt: Some(envelope.data),
                    error: None,
                }),
                Err(err) => {
                    tracing::warn!(
                        "Document `{}` for parcel {} not uploaded: {}",
                        file_name,
                        self.state.parcel.id,
                        err
                    );
                    uploads.push(UploadOutcome {
                        file_name,
                        receipt: None,
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        let failed = uploads.iter().filter(|upload| !upload.succeeded()).count();
        let detail = if failed == 0 {
            format!("uploaded {} documents", uploads.len())
        } else {
            format!(
                "uploaded {} of {} documents, {} failed",
                uploads.len() - failed,
                uploads.len(),
                failed
            )
        };
        self.progress.step(StepUpdate::completed(step, Some(detail)));

        Ok(Saga {
            tokenizer: self.tokenizer,
            progress: self.progress,
            state: DocumentsUploaded {
                payment_ref: self.state.payment_ref,
                parcel: self.state.parcel,
                uploads,
            },
        })
    }
}

impl Saga<'_, DocumentsUploaded> {
    /// Step 5: mint the parcel token.
    ///
    /// Failure surfaces as [`Error::PartialFailure`]: the payment and the
    /// parcel record both exist, only the token is missing.
    pub(super) async fn mint(self) -> Result<TokenizationOutcome, Error> {
        let step = StepId::NftMinting;
        self.progress.step(StepUpdate::processing(step));

        let key = format!("mint-parcel-{}", self.state.parcel.id);
        let result = self
            .tokenizer
            .executor
            .execute(
                Some(Operation::write(key)),
                &self.tokenizer.config.write_policy,
                || {
                    let connector = self.tokenizer.connector.clone();
                    let parcel_id = self.state.parcel.id.clone();
                    async move { connector.post_mint(&parcel_id).await }
                },
            )
            .await;

        match result {
            Ok(envelope) => {
                self.progress.step(StepUpdate::completed(
                    step,
                    Some(format!(
                        "token {} serial {} minted",
                        envelope.data.token_id, envelope.data.serial
                    )),
                ));
                Ok(TokenizationOutcome {
                    parcel: self.state.parcel,
                    payment_ref: self.state.payment_ref,
                    uploads: self.state.uploads,
                    mint: envelope.data,
                    verified: false,
                })
            }
            Err(err) => {
                tracing::error!(
                    "Mint of parcel {} failed after payment {}: {}",
                    self.state.parcel.id,
                    self.state.payment_ref,
                    err
                );
                let err = Error::PartialFailure {
                    step,
                    payment_ref: self.state.payment_ref.clone(),
                    source: Box::new(err),
                };
                Err(self.fail(step, err))
            }
        }
    }
}
