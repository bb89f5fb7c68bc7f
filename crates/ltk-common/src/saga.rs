//! Tokenization saga step model

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::parcel::{MintReceipt, Parcel, UploadOutcome};
use crate::wallet::TransactionRef;

/// Named stage of the tokenization workflow, in strict declared order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepId {
    /// Ensure the wallet session is connected
    WalletConnection,
    /// Fee quote, balance check, fee payment submission
    PaymentProcessing,
    /// Register the parcel record with the backend
    ParcelCreation,
    /// Upload supporting documents (best effort)
    DocumentUpload,
    /// Mint the non-fungible token for the parcel
    NftMinting,
}

impl StepId {
    /// All steps in declared execution order.
    pub const ORDERED: [StepId; 5] = [
        StepId::WalletConnection,
        StepId::PaymentProcessing,
        StepId::ParcelCreation,
        StepId::DocumentUpload,
        StepId::NftMinting,
    ];
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WalletConnection => write!(f, "wallet-connection"),
            Self::PaymentProcessing => write!(f, "payment-processing"),
            Self::ParcelCreation => write!(f, "parcel-creation"),
            Self::DocumentUpload => write!(f, "document-upload"),
            Self::NftMinting => write!(f, "nft-minting"),
        }
    }
}

/// Status of one saga step. A step never regresses to an earlier status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Not yet started
    Pending,
    /// Currently executing
    Processing,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Error,
}

/// Progress report for a single step, emitted on the saga event stream in
/// strict step order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepUpdate {
    /// Step the update refers to
    pub step: StepId,
    /// New status
    pub status: StepStatus,
    /// Human readable progress detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Error message when `status` is [`StepStatus::Error`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepUpdate {
    /// Update marking a step as processing.
    pub fn processing(step: StepId) -> Self {
        Self {
            step,
            status: StepStatus::Processing,
            detail: None,
            error: None,
        }
    }

    /// Update marking a step as completed, with optional detail.
    pub fn completed(step: StepId, detail: Option<String>) -> Self {
        Self {
            step,
            status: StepStatus::Completed,
            detail,
            error: None,
        }
    }

    /// Update marking a step as failed.
    pub fn error(step: StepId, message: String) -> Self {
        Self {
            step,
            status: StepStatus::Error,
            detail: None,
            error: Some(message),
        }
    }
}

/// Composite result of a fully successful tokenization run.
///
/// `verified` is always `false` at return time; payment confirmation arrives
/// out of band on the saga event stream once the verification poller settles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenizationOutcome {
    /// The registered parcel record
    pub parcel: Parcel,
    /// Ledger reference of the fee payment
    pub payment_ref: TransactionRef,
    /// Per-document upload results
    pub uploads: Vec<UploadOutcome>,
    /// Mint receipt for the parcel token
    pub mint: MintReceipt,
    /// Whether the fee payment has been confirmed by the ledger
    pub verified: bool,
}
