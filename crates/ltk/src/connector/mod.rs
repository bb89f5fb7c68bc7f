//! Backend connector
//!
//! Interface between the orchestrator and the registry backend. Typically an
//! [`HttpBackendClient`]; tests substitute their own implementation.

use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use ltk_common::{
    AccountRef, Amount, Balance, DocumentReceipt, DocumentUpload, Error, FeeQuote, MintReceipt,
    Parcel, ParcelId, ParcelRegistration, PaymentVerdict, TransactionRef, WriteEnvelope,
};

pub mod http_client;

pub use http_client::HttpBackendClient;

/// Interface connecting the orchestrator to the registry backend.
///
/// Write endpoints return a [`WriteEnvelope`] whose resource identifier the
/// orchestrator uses to decide cache invalidation scope.
#[async_trait]
pub trait BackendConnector: Debug + Send + Sync {
    /// List all listed parcels
    async fn get_parcels(&self) -> Result<Vec<Parcel>, Error>;
    /// List parcels owned by `account`
    async fn get_my_parcels(&self, account: &AccountRef) -> Result<Vec<Parcel>, Error>;
    /// Fetch one parcel by id
    async fn get_parcel(&self, id: &ParcelId) -> Result<Parcel, Error>;
    /// Register a new parcel record
    async fn post_parcel(
        &self,
        registration: ParcelRegistration,
    ) -> Result<WriteEnvelope<Parcel>, Error>;
    /// Upload one supporting document for a parcel (multipart)
    async fn post_parcel_document(
        &self,
        id: &ParcelId,
        document: DocumentUpload,
    ) -> Result<WriteEnvelope<DocumentReceipt>, Error>;
    /// Mint the token for a registered parcel
    async fn post_mint(&self, id: &ParcelId) -> Result<WriteEnvelope<MintReceipt>, Error>;
    /// Remove a parcel from listing
    async fn delist_parcel(&self, id: &ParcelId) -> Result<WriteEnvelope<Parcel>, Error>;
    /// Current tokenization fee quote
    async fn get_exchange_rate(&self) -> Result<FeeQuote, Error>;
    /// Ledger balance of `account` as seen by the backend
    async fn check_balance(&self, account: &AccountRef) -> Result<Balance, Error>;
    /// Ask the backend whether a payment transaction is final and matches
    /// the expected payer and amount
    async fn verify_payment(
        &self,
        transaction_ref: &TransactionRef,
        account: &AccountRef,
        expected_amount: Amount,
    ) -> Result<PaymentVerdict, Error>;
    /// Durably associate `account` with the current user
    async fn link_wallet(&self, account: &AccountRef) -> Result<(), Error>;
}

/// Machine-readable error code returned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    /// Fee payment does not cover the tokenization fee
    InsufficientFunds,
    /// Account is already linked to another user
    AccountAlreadyLinked,
    /// User explicitly rejected the request
    UserRejected,
    /// Too many requests
    RateLimited,
    /// Anything the client has no specific handling for
    #[serde(other)]
    Unknown,
}

/// Normalized error body returned by backend endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable code
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
}

impl ErrorResponse {
    /// Map the backend error body onto the closed error taxonomy.
    pub fn into_error(self, status: u16) -> Error {
        match self.code {
            ErrorCode::InsufficientFunds => Error::InsufficientFunds {
                required: Amount::ZERO,
                available: Amount::ZERO,
            },
            ErrorCode::AccountAlreadyLinked => Error::BackendConflict,
            ErrorCode::UserRejected => Error::UserCancelled,
            ErrorCode::RateLimited => Error::RateLimited,
            ErrorCode::Unknown => Error::Http {
                status,
                message: self.message,
            },
        }
    }
}
