//! Land Tokenization Kit
//!
//! Orchestrates the conversion of a land parcel into a ledger token: wallet
//! session management against an external signer, fee payment with concurrent
//! verification, parcel registration, document upload and token mint, driven
//! as a strictly ordered saga with a typed progress event stream.
//!
//! Cross-cutting reliability lives in [`retry`] (bounded retries with
//! exponential backoff and jitter), [`dedup`] (key-based exclusion of
//! concurrent duplicate operations) and [`cache`] (TTL-bound memoization of
//! idempotent reads).

pub mod cache;
pub mod connector;
pub mod dedup;
pub mod retry;
pub mod saga;
pub mod session;
pub mod signer;
#[cfg(test)]
pub mod test_utils;
pub mod verify;

pub use cache::{CacheConfig, ResponseCache};
pub use connector::{BackendConnector, HttpBackendClient};
pub use dedup::{OperationGuard, OperationRegistry};
pub use ltk_common::{self as common, Amount, BackendUrl, Error};
pub use retry::{Operation, OperationKind, RetryExecutor, RetryPolicy};
pub use saga::{
    SagaEvent, TokenizationRequest, TokenizationRun, Tokenizer, TokenizerConfig,
};
pub use session::WalletSessionManager;
pub use signer::{SignerEvent, SignerHandle, SignerSession, WalletSigner};
pub use verify::{
    PaymentVerifier, VerificationEvent, VerificationRequest, VerificationTask, VerifierConfig,
};
