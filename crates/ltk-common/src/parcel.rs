//! Parcel and document data model

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::wallet::{AccountRef, TransactionRef};

/// Backend-assigned parcel identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParcelId(String);

impl ParcelId {
    /// New parcel id
    pub fn new<S>(id: S) -> Self
    where
        S: Into<String>,
    {
        Self(id.into())
    }

    /// Parcel id as str
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParcelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a parcel record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParcelStatus {
    /// Registered with the backend, token not yet minted
    Registered,
    /// Listed for sale
    Listed,
    /// Removed from listing
    Delisted,
    /// Token minted on the ledger
    Minted,
}

/// Caller-supplied description of the parcel to tokenize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParcelDraft {
    /// Short title of the parcel
    pub title: String,
    /// Free-form location description
    pub location: String,
    /// Surface area in square meters
    pub area_sqm: u64,
    /// Optional longer description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Registration request sent to the backend, linking the parcel to the fee
/// payment for audit purposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParcelRegistration {
    /// Parcel description
    #[serde(flatten)]
    pub draft: ParcelDraft,
    /// Account that paid the tokenization fee
    pub owner: AccountRef,
    /// Ledger reference of the fee payment
    pub payment_ref: TransactionRef,
}

/// Parcel record as persisted by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parcel {
    /// Backend-assigned identifier
    pub id: ParcelId,
    /// Owning ledger account
    pub owner: AccountRef,
    /// Short title of the parcel
    pub title: String,
    /// Free-form location description
    pub location: String,
    /// Surface area in square meters
    pub area_sqm: u64,
    /// Lifecycle status
    pub status: ParcelStatus,
    /// Ledger reference of the fee payment, for audit linkage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_ref: Option<TransactionRef>,
    /// Minted token id, once minted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
}

/// One supporting document to upload for a parcel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentUpload {
    /// File name as shown to support staff
    pub file_name: String,
    /// MIME content type
    pub content_type: String,
    /// Raw file bytes
    pub bytes: Vec<u8>,
}

/// Backend receipt for one accepted document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentReceipt {
    /// Backend-assigned document identifier
    pub document_id: String,
    /// File name the receipt refers to
    pub file_name: String,
}

/// Per-file upload result. Upload is best effort: individual failures are
/// recorded here and do not abort the saga.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadOutcome {
    /// File name of the attempted upload
    pub file_name: String,
    /// Receipt when the upload succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<DocumentReceipt>,
    /// Error message when the upload failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadOutcome {
    /// Whether the upload succeeded.
    pub fn succeeded(&self) -> bool {
        self.receipt.is_some()
    }
}

/// Receipt of a successful token mint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintReceipt {
    /// Ledger token identifier
    pub token_id: String,
    /// Serial number of the minted token
    pub serial: u64,
    /// Ledger transaction that performed the mint
    pub transaction_ref: TransactionRef,
}
