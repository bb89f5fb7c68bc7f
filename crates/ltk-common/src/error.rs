//! Error taxonomy
//!
//! A closed set of tagged variants shared by the whole workspace. Collaborator
//! failures (backend, signer, ledger) are mapped onto these variants at the
//! boundary so the orchestrator never matches on error message substrings.

use thiserror::Error;

use crate::amount::Amount;
use crate::saga::StepId;
use crate::wallet::TransactionRef;

/// LTK Error
#[derive(Debug, Error)]
pub enum Error {
    /// The signer or backend reported an explicit user rejection
    #[error("Request cancelled by user")]
    UserCancelled,
    /// No external signer is installed or reachable
    #[error("Wallet signer unavailable")]
    SignerUnavailable,
    /// The backend could not be reached at the transport level
    #[error("Backend unreachable: {0}")]
    BackendUnreachable(String),
    /// The account is already linked to another user
    #[error("Account already linked to another user")]
    BackendConflict,
    /// Signer pairing failed for a reason other than user rejection
    #[error("Wallet connection failed: {0}")]
    ConnectionFailed(String),
    /// Sign/execute requested while the wallet session is not connected
    #[error("Wallet session not connected")]
    NotConnected,
    /// Balance does not cover the tokenization fee
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        /// Fee amount required
        required: Amount,
        /// Balance available
        available: Amount,
    },
    /// The remote rate limited the request; retryable
    #[error("Rate limited by remote")]
    RateLimited,
    /// The request timed out; retryable
    #[error("Request timed out")]
    Timeout,
    /// An operation with the same key is already in flight
    #[error("Operation `{0}` already in flight")]
    DuplicateOperation(String),
    /// All retry attempts were consumed
    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Number of attempts made
        attempts: u32,
        /// Last underlying error
        last: Box<Error>,
    },
    /// A step failed after the fee payment was already submitted.
    ///
    /// Money left the user's control; the payment reference is carried for
    /// manual reconciliation and must never be retried as a fresh payment.
    #[error("Step {step} failed after payment {payment_ref} was submitted: {source}")]
    PartialFailure {
        /// Step that failed
        step: StepId,
        /// Reference of the already-submitted fee payment
        payment_ref: TransactionRef,
        /// Underlying failure
        source: Box<Error>,
    },
    /// Amount arithmetic overflowed
    #[error("Amount overflow")]
    AmountOverflow,
    /// Unclassified HTTP error from the backend
    #[error("HTTP error {status}: {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body or transport message
        message: String,
    },
    /// Serde Error
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    /// Url Error
    #[error(transparent)]
    Url(#[from] crate::backend_url::Error),
    /// Custom Error
    #[error("`{0}`")]
    Custom(String),
}

impl Error {
    /// Whether retrying the same request may succeed.
    ///
    /// Only rate limiting and request timeouts qualify; everything else
    /// aborts immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Timeout)
    }

    /// Whether this error represents a critical partial-failure state
    /// requiring manual reconciliation.
    pub fn is_partial_failure(&self) -> bool {
        matches!(self, Self::PartialFailure { .. })
    }
}
