//! Wallet session manager
//!
//! Bridges the external signer's connection lifecycle with backend
//! persistence of the account-to-user association. A session is only reported
//! connected when both sides agree; if the backend rejects the association
//! the signer side is torn down before the error is surfaced.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;
use tracing::instrument;

use ltk_common::{
    ensure_ltk, AccountRef, Error, FeeTransaction, LedgerNetwork, TransactionRef, WalletSession,
};

use crate::connector::BackendConnector;
use crate::retry::{Operation, RetryExecutor, RetryPolicy};
use crate::signer::{SignerHandle, WalletSigner};

/// Session state machine.
///
/// `Disconnected -> Connecting -> PendingBackendSync -> Connected`, back to
/// `Disconnected` on any failure at any stage.
#[derive(Debug)]
enum SessionState {
    Disconnected,
    Connecting,
    PendingBackendSync,
    Connected {
        account: AccountRef,
        network: LedgerNetwork,
    },
}

#[derive(Debug)]
struct SessionInner {
    state: SessionState,
    handle: Option<Box<dyn SignerHandle>>,
}

/// Manager for the connection to the external signer.
///
/// Cloneable; all clones share the same session.
#[derive(Debug, Clone)]
pub struct WalletSessionManager {
    signer: Arc<dyn WalletSigner>,
    connector: Arc<dyn BackendConnector>,
    executor: RetryExecutor,
    link_policy: RetryPolicy,
    inner: Arc<Mutex<SessionInner>>,
}

impl WalletSessionManager {
    /// New session manager. Spawns a background task that reacts to signer
    /// lifecycle events (`session-ended`, `accounts-changed`) by forcing a
    /// disconnect; call within a tokio runtime.
    pub fn new(
        signer: Arc<dyn WalletSigner>,
        connector: Arc<dyn BackendConnector>,
        executor: RetryExecutor,
    ) -> Self {
        let manager = Self {
            signer,
            connector,
            executor,
            link_policy: RetryPolicy::default(),
            inner: Arc::new(Mutex::new(SessionInner {
                state: SessionState::Disconnected,
                handle: None,
            })),
        };

        manager.spawn_event_watcher();
        manager
    }

    fn spawn_event_watcher(&self) {
        let mut events = self.signer.subscribe();
        let watcher = self.clone();

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        tracing::info!("Signer event {:?}, forcing disconnect", event);
                        if let Err(err) = watcher.disconnect().await {
                            tracing::warn!("Forced disconnect failed: {}", err);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Signer event stream lagged by {}", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    /// Snapshot of the current session state.
    pub async fn session(&self) -> WalletSession {
        let inner = self.inner.lock().await;
        let mut session = WalletSession {
            is_available: self.signer.is_available(),
            ..WalletSession::default()
        };
        match &inner.state {
            SessionState::Disconnected => {}
            SessionState::Connecting | SessionState::PendingBackendSync => {
                session.is_connecting = true;
            }
            SessionState::Connected { account, network } => {
                session.is_connected = true;
                session.account = Some(account.clone());
                session.network = Some(*network);
            }
        }
        session
    }

    /// Connected account, if any.
    pub async fn account(&self) -> Option<AccountRef> {
        match &self.inner.lock().await.state {
            SessionState::Connected { account, .. } => Some(account.clone()),
            _ => None,
        }
    }

    /// Open a pairing flow with the external signer and persist the
    /// account association with the backend.
    ///
    /// May suspend indefinitely while the user approves the pairing. Never
    /// reports connected unless both the signer and the backend agree: if
    /// the backend rejects the association (e.g. the account is already
    /// linked elsewhere), the signer session is disconnected before the
    /// error is surfaced.
    #[instrument(skip_all)]
    pub async fn connect(&self) -> Result<WalletSession, Error> {
        ensure_ltk!(self.signer.is_available(), Error::SignerUnavailable);

        {
            let mut inner = self.inner.lock().await;
            match inner.state {
                SessionState::Connected { .. } => return Ok(self.snapshot_of(&inner)),
                SessionState::Connecting | SessionState::PendingBackendSync => {
                    return Err(Error::DuplicateOperation("wallet-connect".to_string()));
                }
                SessionState::Disconnected => {
                    inner.state = SessionState::Connecting;
                }
            }
        }

        let signer_session = match self.signer.connect().await {
            Ok(session) => session,
            Err(err) => {
                tracing::warn!("Signer pairing failed: {}", err);
                self.reset_disconnected().await;
                return Err(err);
            }
        };

        {
            let mut inner = self.inner.lock().await;
            inner.state = SessionState::PendingBackendSync;
        }

        let account = signer_session.account.clone();
        let connector = self.connector.clone();
        let link_result = self
            .executor
            .execute(
                Some(Operation::write(format!("link-wallet-{account}"))),
                &self.link_policy,
                || {
                    let connector = connector.clone();
                    let account = account.clone();
                    async move { connector.link_wallet(&account).await }
                },
            )
            .await;

        if let Err(err) = link_result {
            tracing::warn!(
                "Backend rejected wallet association for {}: {}. Disconnecting signer",
                account,
                err
            );
            if let Err(disconnect_err) = self.signer.disconnect().await {
                tracing::warn!("Signer disconnect after failed sync: {}", disconnect_err);
            }
            self.reset_disconnected().await;
            return Err(err);
        }

        let mut inner = self.inner.lock().await;
        inner.handle = Some(signer_session.handle);
        inner.state = SessionState::Connected {
            account,
            network: signer_session.network,
        };
        tracing::info!("Wallet session connected");
        Ok(self.snapshot_of(&inner))
    }

    /// Connect unless already connected.
    pub async fn ensure_connected(&self) -> Result<WalletSession, Error> {
        let current = self.session().await;
        if current.is_connected {
            return Ok(current);
        }
        self.connect().await
    }

    /// Tear down both the signer session and local state.
    ///
    /// Idempotent; safe to call when already disconnected.
    #[instrument(skip_all)]
    pub async fn disconnect(&self) -> Result<(), Error> {
        {
            let mut inner = self.inner.lock().await;
            inner.handle = None;
            inner.state = SessionState::Disconnected;
        }
        if let Err(err) = self.signer.disconnect().await {
            tracing::debug!("Signer disconnect: {}", err);
        }
        Ok(())
    }

    /// Sign an arbitrary payload with the connected account.
    ///
    /// The session lock is not held while the signer awaits out-of-band user
    /// approval, so snapshots and forced disconnects stay responsive during
    /// signing. A second request while one is pending fails fast with
    /// [`Error::DuplicateOperation`].
    pub async fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, Error> {
        let mut handle = self.take_handle().await?;
        let result = handle.sign(payload).await;
        self.restore_handle(handle).await;
        result
    }

    /// Sign and submit a fee payment transaction with the connected account.
    ///
    /// Same locking contract as [`sign`](Self::sign): the signer is awaited
    /// outside the session lock.
    pub async fn execute(&self, transaction: &FeeTransaction) -> Result<TransactionRef, Error> {
        let mut handle = self.take_handle().await?;
        let result = handle.execute(transaction).await;
        self.restore_handle(handle).await;
        result
    }

    /// Take the exclusively-owned signing capability out of the session so
    /// the signer can be awaited without holding the session lock.
    async fn take_handle(&self) -> Result<Box<dyn SignerHandle>, Error> {
        let mut inner = self.inner.lock().await;
        match &inner.state {
            SessionState::Connected { .. } => inner
                .handle
                .take()
                .ok_or_else(|| Error::DuplicateOperation("signer-request".to_string())),
            _ => Err(Error::NotConnected),
        }
    }

    /// Put the signing capability back, unless a disconnect raced the
    /// request; in that case the handle is dropped, which releases the
    /// capability locally without ending the signer-side session.
    async fn restore_handle(&self, handle: Box<dyn SignerHandle>) {
        let mut inner = self.inner.lock().await;
        if matches!(inner.state, SessionState::Connected { .. }) {
            inner.handle = Some(handle);
        }
    }

    async fn reset_disconnected(&self) {
        let mut inner = self.inner.lock().await;
        inner.handle = None;
        inner.state = SessionState::Disconnected;
    }

    fn snapshot_of(&self, inner: &SessionInner) -> WalletSession {
        let mut session = WalletSession {
            is_available: self.signer.is_available(),
            ..WalletSession::default()
        };
        match &inner.state {
            SessionState::Disconnected => {}
            SessionState::Connecting | SessionState::PendingBackendSync => {
                session.is_connecting = true;
            }
            SessionState::Connected { account, network } => {
                session.is_connected = true;
                session.account = Some(account.clone());
                session.network = Some(*network);
            }
        }
        session
    }
}
