//! External wallet signer interface
//!
//! The signer holds the user's private keys and approves, signs and submits
//! transactions out of band. Pairing and signing may suspend indefinitely
//! while the user decides; no timeout is enforced at this layer.

use std::fmt::Debug;

use async_trait::async_trait;
use tokio::sync::broadcast;

use ltk_common::{AccountRef, Error, FeeTransaction, LedgerNetwork, TransactionRef};

/// Connection-lifecycle event pushed by the external signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignerEvent {
    /// The signer ended the session out of band
    SessionEnded,
    /// The user switched to a different account in the signer
    AccountsChanged {
        /// Newly active account
        account: AccountRef,
    },
}

/// Capability to sign and submit transactions for one paired account.
///
/// Exclusively owned by the wallet session; never cloned. Dropping the handle
/// releases the capability locally without ending the signer-side session.
#[async_trait]
pub trait SignerHandle: Debug + Send {
    /// Sign an arbitrary payload
    async fn sign(&mut self, payload: &[u8]) -> Result<Vec<u8>, Error>;
    /// Sign and submit a fee payment transaction, returning the ledger
    /// transaction reference
    async fn execute(&mut self, transaction: &FeeTransaction) -> Result<TransactionRef, Error>;
}

/// Result of a successful signer pairing.
#[derive(Debug)]
pub struct SignerSession {
    /// Account the user approved
    pub account: AccountRef,
    /// Network the session is bound to
    pub network: LedgerNetwork,
    /// Exclusively-owned signing capability
    pub handle: Box<dyn SignerHandle>,
}

/// Interface to the external wallet signer.
#[async_trait]
pub trait WalletSigner: Debug + Send + Sync {
    /// Whether a signer is installed/reachable at all
    fn is_available(&self) -> bool;
    /// Open a pairing flow. May suspend indefinitely awaiting out-of-band
    /// user approval.
    async fn connect(&self) -> Result<SignerSession, Error>;
    /// End the signer-side session. Safe to call when already disconnected.
    async fn disconnect(&self) -> Result<(), Error>;
    /// Subscribe to connection-lifecycle events.
    fn subscribe(&self) -> broadcast::Receiver<SignerEvent>;
}
