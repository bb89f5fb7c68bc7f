//! Wallet and ledger identifiers

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Ledger account reference (e.g. `0.0.1234`).
///
/// Treated as opaque by the orchestrator; the ledger is the authority on its
/// structure.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountRef(String);

impl AccountRef {
    /// New account reference
    pub fn new<S>(account: S) -> Self
    where
        S: Into<String>,
    {
        Self(account.into())
    }

    /// Account reference as str
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AccountRef {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

/// Ledger transaction reference (e.g. `0.0.123@456.0`).
///
/// Returned by the signer on transaction submission and used as the key for
/// payment verification and audit linkage. Opaque to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionRef(String);

impl TransactionRef {
    /// New transaction reference
    pub fn new<S>(transaction: S) -> Self
    where
        S: Into<String>,
    {
        Self(transaction.into())
    }

    /// Transaction reference as str
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ledger network the signer session is bound to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerNetwork {
    /// Public mainnet
    Mainnet,
    /// Public testnet
    #[default]
    Testnet,
}

impl fmt::Display for LedgerNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mainnet => write!(f, "mainnet"),
            Self::Testnet => write!(f, "testnet"),
        }
    }
}

/// Snapshot of the wallet session state.
///
/// `is_connected` is only true when the external signer reports an active
/// session *and* the backend has durably associated the account with the
/// current user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalletSession {
    /// Whether a signer is installed/reachable at all
    pub is_available: bool,
    /// A pairing or backend sync is in progress
    pub is_connecting: bool,
    /// Signer and backend both agree the session is live
    pub is_connected: bool,
    /// Connected account, if any
    pub account: Option<AccountRef>,
    /// Network of the connected session, if any
    pub network: Option<LedgerNetwork>,
}
