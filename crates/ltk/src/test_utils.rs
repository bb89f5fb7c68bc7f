//! Test doubles shared across the crate's unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use ltk_common::util::unix_time;
use ltk_common::{
    AccountRef, Amount, Balance, DocumentReceipt, DocumentUpload, Error, FeeQuote, LedgerNetwork,
    MintReceipt, Parcel, ParcelId, ParcelRegistration, ParcelStatus, PaymentVerdict,
    TransactionRef, WriteEnvelope,
};

use crate::connector::BackendConnector;
use crate::signer::{SignerEvent, SignerHandle, SignerSession, WalletSigner};

pub const TEST_ACCOUNT: &str = "0.0.1234";
pub const TEST_PAYMENT_REF: &str = "0.0.1234@1700000000.000000001";

/// Scripted signing capability handed out by [`FakeSigner`].
#[derive(Debug)]
pub struct FakeHandle {
    executed: Arc<AtomicU32>,
    execute_results: Arc<Mutex<VecDeque<Result<TransactionRef, Error>>>>,
    stall: Arc<AtomicBool>,
}

#[async_trait]
impl SignerHandle for FakeHandle {
    async fn sign(&mut self, _payload: &[u8]) -> Result<Vec<u8>, Error> {
        if self.stall.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(vec![0xAB; 64])
    }

    async fn execute(&mut self, _transaction: &ltk_common::FeeTransaction) -> Result<TransactionRef, Error> {
        if self.stall.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.executed.fetch_add(1, Ordering::SeqCst);
        match self.execute_results.lock().pop_front() {
            Some(result) => result,
            None => Ok(TransactionRef::new(TEST_PAYMENT_REF)),
        }
    }
}

/// Scriptable in-memory signer.
///
/// Unscripted calls succeed with canned values; push onto the result queues
/// to inject failures.
#[derive(Debug)]
pub struct FakeSigner {
    pub available: bool,
    pub account: AccountRef,
    pub network: LedgerNetwork,
    /// Taken (once) on the next connect attempt
    pub connect_error: Mutex<Option<Error>>,
    pub connects: AtomicU32,
    pub disconnects: AtomicU32,
    /// Transactions executed across all handed-out handles
    pub executed: Arc<AtomicU32>,
    pub execute_results: Arc<Mutex<VecDeque<Result<TransactionRef, Error>>>>,
    /// When set, handed-out handles never resolve sign/execute, emulating a
    /// user who never answers the approval prompt
    pub stall_requests: Arc<AtomicBool>,
    pub events: broadcast::Sender<SignerEvent>,
}

impl Default for FakeSigner {
    fn default() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            available: true,
            account: AccountRef::new(TEST_ACCOUNT),
            network: LedgerNetwork::Testnet,
            connect_error: Mutex::new(None),
            connects: AtomicU32::new(0),
            disconnects: AtomicU32::new(0),
            executed: Arc::new(AtomicU32::new(0)),
            execute_results: Arc::new(Mutex::new(VecDeque::new())),
            stall_requests: Arc::new(AtomicBool::new(false)),
            events,
        }
    }
}

impl FakeSigner {
    /// Push a connection-lifecycle event to all subscribers.
    pub fn emit(&self, event: SignerEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl WalletSigner for FakeSigner {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn connect(&self) -> Result<SignerSession, Error> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.connect_error.lock().take() {
            return Err(err);
        }
        Ok(SignerSession {
            account: self.account.clone(),
            network: self.network,
            handle: Box::new(FakeHandle {
                executed: self.executed.clone(),
                execute_results: self.execute_results.clone(),
                stall: self.stall_requests.clone(),
            }),
        })
    }

    async fn disconnect(&self) -> Result<(), Error> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SignerEvent> {
        self.events.subscribe()
    }
}

/// Scriptable in-memory backend.
///
/// Every endpoint counts its calls. Unscripted calls succeed with synthesized
/// records; push onto the per-endpoint result queues to inject failures or
/// specific responses.
#[derive(Debug)]
pub struct FakeBackend {
    pub fee: Mutex<Amount>,
    pub balance: Mutex<Amount>,
    /// Parcels served by the list/get endpoints
    pub parcels: Mutex<Vec<Parcel>>,

    pub link_results: Mutex<VecDeque<Result<(), Error>>>,
    pub parcel_results: Mutex<VecDeque<Result<WriteEnvelope<Parcel>, Error>>>,
    pub document_results: Mutex<VecDeque<Result<WriteEnvelope<DocumentReceipt>, Error>>>,
    pub mint_results: Mutex<VecDeque<Result<WriteEnvelope<MintReceipt>, Error>>>,
    pub verify_results: Mutex<VecDeque<Result<PaymentVerdict, Error>>>,

    pub link_calls: AtomicU32,
    pub list_calls: AtomicU32,
    pub rate_calls: AtomicU32,
    pub balance_calls: AtomicU32,
    pub parcel_calls: AtomicU32,
    pub document_calls: AtomicU32,
    pub mint_calls: AtomicU32,
    pub verify_calls: AtomicU32,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self {
            fee: Mutex::new(Amount::new(500_000_000)),
            balance: Mutex::new(Amount::new(10_000_000_000)),
            parcels: Mutex::new(Vec::new()),
            link_results: Mutex::new(VecDeque::new()),
            parcel_results: Mutex::new(VecDeque::new()),
            document_results: Mutex::new(VecDeque::new()),
            mint_results: Mutex::new(VecDeque::new()),
            verify_results: Mutex::new(VecDeque::new()),
            link_calls: AtomicU32::new(0),
            list_calls: AtomicU32::new(0),
            rate_calls: AtomicU32::new(0),
            balance_calls: AtomicU32::new(0),
            parcel_calls: AtomicU32::new(0),
            document_calls: AtomicU32::new(0),
            mint_calls: AtomicU32::new(0),
            verify_calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl BackendConnector for FakeBackend {
    async fn get_parcels(&self) -> Result<Vec<Parcel>, Error> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.parcels.lock().clone())
    }

    async fn get_my_parcels(&self, account: &AccountRef) -> Result<Vec<Parcel>, Error> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .parcels
            .lock()
            .iter()
            .filter(|parcel| &parcel.owner == account)
            .cloned()
            .collect())
    }

    async fn get_parcel(&self, id: &ParcelId) -> Result<Parcel, Error> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.parcels
            .lock()
            .iter()
            .find(|parcel| &parcel.id == id)
            .cloned()
            .ok_or_else(|| Error::Http {
                status: 404,
                message: format!("no parcel {id}"),
            })
    }

    async fn post_parcel(
        &self,
        registration: ParcelRegistration,
    ) -> Result<WriteEnvelope<Parcel>, Error> {
        let call = self.parcel_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(scripted) = self.parcel_results.lock().pop_front() {
            return scripted;
        }
        let parcel = Parcel {
            id: ParcelId::new(format!("parcel-{}", call + 1)),
            owner: registration.owner,
            title: registration.draft.title,
            location: registration.draft.location,
            area_sqm: registration.draft.area_sqm,
            status: ParcelStatus::Registered,
            payment_ref: Some(registration.payment_ref),
            token_id: None,
        };
        self.parcels.lock().push(parcel.clone());
        let resource_id = parcel.id.to_string();
        Ok(WriteEnvelope::new(parcel, resource_id))
    }

    async fn post_parcel_document(
        &self,
        _id: &ParcelId,
        document: DocumentUpload,
    ) -> Result<WriteEnvelope<DocumentReceipt>, Error> {
        let call = self.document_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(scripted) = self.document_results.lock().pop_front() {
            return scripted;
        }
        let receipt = DocumentReceipt {
            document_id: format!("doc-{}", call + 1),
            file_name: document.file_name,
        };
        let resource_id = receipt.document_id.clone();
        Ok(WriteEnvelope::new(receipt, resource_id))
    }

    async fn post_mint(&self, id: &ParcelId) -> Result<WriteEnvelope<MintReceipt>, Error> {
        let call = self.mint_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(scripted) = self.mint_results.lock().pop_front() {
            return scripted;
        }
        {
            let mut parcels = self.parcels.lock();
            if let Some(parcel) = parcels.iter_mut().find(|parcel| &parcel.id == id) {
                parcel.status = ParcelStatus::Minted;
                parcel.token_id = Some("0.0.5005".to_string());
            }
        }
        let receipt = MintReceipt {
            token_id: "0.0.5005".to_string(),
            serial: u64::from(call + 1),
            transaction_ref: TransactionRef::new("0.0.98@1700000001.000000001"),
        };
        Ok(WriteEnvelope::new(receipt, id.to_string()))
    }

    async fn delist_parcel(&self, id: &ParcelId) -> Result<WriteEnvelope<Parcel>, Error> {
        let mut parcels = self.parcels.lock();
        let parcel = parcels
            .iter_mut()
            .find(|parcel| &parcel.id == id)
            .ok_or_else(|| Error::Http {
                status: 404,
                message: format!("no parcel {id}"),
            })?;
        parcel.status = ParcelStatus::Delisted;
        Ok(WriteEnvelope::new(parcel.clone(), id.to_string()))
    }

    async fn get_exchange_rate(&self) -> Result<FeeQuote, Error> {
        self.rate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(FeeQuote {
            fee: *self.fee.lock(),
            rate_usd_cents: 6,
            quoted_at: unix_time(),
        })
    }

    async fn check_balance(&self, account: &AccountRef) -> Result<Balance, Error> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Balance {
            account: account.clone(),
            amount: *self.balance.lock(),
        })
    }

    async fn verify_payment(
        &self,
        _transaction_ref: &TransactionRef,
        _account: &AccountRef,
        _expected_amount: Amount,
    ) -> Result<PaymentVerdict, Error> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        match self.verify_results.lock().pop_front() {
            Some(scripted) => scripted,
            None => Ok(PaymentVerdict::Pending),
        }
    }

    async fn link_wallet(&self, _account: &AccountRef) -> Result<(), Error> {
        self.link_calls.fetch_add(1, Ordering::SeqCst);
        match self.link_results.lock().pop_front() {
            Some(scripted) => scripted,
            None => Ok(()),
        }
    }
}
