//! Payment and verification data model

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::wallet::AccountRef;

/// Fee quote for one tokenization, derived from the backend's exchange rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeQuote {
    /// Fee amount in tinybar
    pub fee: Amount,
    /// USD cents per whole currency unit at quote time
    pub rate_usd_cents: u64,
    /// Unix timestamp the quote was produced at
    pub quoted_at: u64,
}

/// Account balance as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Account the balance belongs to
    pub account: AccountRef,
    /// Balance in tinybar
    pub amount: Amount,
}

/// Fee payment transaction handed to the signer for signing and execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeTransaction {
    /// Platform treasury account receiving the fee
    pub to: AccountRef,
    /// Fee amount in tinybar
    pub amount: Amount,
    /// Memo recorded on the ledger transaction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

/// Backend verdict on one payment verification request.
///
/// A request timeout at the transport layer is treated as [`Pending`], never
/// as failed: the ledger may still finalize the transaction.
///
/// [`Pending`]: PaymentVerdict::Pending
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum PaymentVerdict {
    /// The transaction reached a final, successful state
    Confirmed,
    /// The transaction has not yet reached a final state
    Pending,
    /// The ledger reports the transaction as failed
    Failed {
        /// Reason reported by the backend
        reason: String,
    },
}

/// Status of one asynchronous payment verification task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    /// A verification request is currently in flight
    Verifying,
    /// Waiting for the next poll interval
    Pending,
    /// The payment was confirmed final and matching
    Verified,
    /// The poller settled without confirmation; payment is unconfirmed,
    /// not known to be reverted
    Failed,
}

/// Terminal, non-fatal reason a verification loop settled without
/// confirmation. The payment must be treated as "unconfirmed", not
/// "reverted".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerificationFailure {
    /// All polling attempts were consumed without a definitive answer
    ExhaustedAttempts,
    /// The wall-clock bound elapsed before a definitive answer
    TimedOut,
    /// The backend reported the transaction as failed
    Rejected {
        /// Reason reported by the backend
        reason: String,
    },
}

impl fmt::Display for VerificationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExhaustedAttempts => write!(f, "exhausted attempts"),
            Self::TimedOut => write!(f, "timed out"),
            Self::Rejected { reason } => write!(f, "rejected: {reason}"),
        }
    }
}
