//! Shared types and functions for the Land Tokenization Kit.
//!
//! This crate is the base foundation for everything that interacts with the
//! LTK orchestrator and its internal crates. It holds the data model (amounts,
//! account and transaction references, parcels, payments, saga steps) and the
//! closed error taxonomy shared across the workspace.

pub mod amount;
pub mod backend_url;
pub mod envelope;
pub mod error;
pub mod parcel;
pub mod payment;
pub mod saga;
pub mod util;
pub mod wallet;

pub use amount::Amount;
pub use backend_url::BackendUrl;
pub use envelope::WriteEnvelope;
pub use error::Error;
pub use parcel::{
    DocumentReceipt, DocumentUpload, MintReceipt, Parcel, ParcelDraft, ParcelId,
    ParcelRegistration, ParcelStatus, UploadOutcome,
};
pub use payment::{
    Balance, FeeQuote, FeeTransaction, PaymentVerdict, VerificationFailure, VerificationStatus,
};
pub use saga::{StepId, StepStatus, StepUpdate, TokenizationOutcome};
pub use wallet::{AccountRef, LedgerNetwork, TransactionRef, WalletSession};

/// Helper macro to fail early with the given error if a condition does not
/// hold.
#[macro_export]
macro_rules! ensure_ltk {
    ($cond:expr, $err:expr) => {
        if !($cond) {
            return Err($err);
        }
    };
}
