//! Delegated signer / wallet adapter
//!
//! Session state machine over the remote signing backend:
//!
//! ```text
//! NotDetected | Installed  (probed once at construction)
//! Disconnected -> Connecting -> Connected -> Disconnected
//! ```
//!
//! Every signing request goes through the [`ApprovalGate`] before anything
//! reaches the backend. State transitions are published on a broadcast
//! channel; failures are published as an `Error` event before they are
//! returned to the caller.

mod errors;
mod events;
mod host;

pub use errors::WalletError;
pub use events::{ConnectionState, ReadyState, WalletEvent};
pub use host::{EnvHost, HostEnvironment, StaticHost};

use crate::approval::{ApprovalGate, ApprovalPayload, ApprovalTicket, SimulationPreview};
use crate::backend::SigningBackend;
use crate::broadcast::Broadcaster;
use crate::cache::PersistentCache;
use crate::metrics::metrics;
use crate::observability::CorrelationId;
use crate::simulator::{BalanceDiffSimulator, SimulationError};
use parking_lot::Mutex;
use solana_sdk::{pubkey::Pubkey, signature::Signature, transaction::VersionedTransaction};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use zeroize::Zeroizing;

const EVENT_CAPACITY: usize = 64;
const REMEMBERED_ACCOUNT_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Default)]
struct SessionState {
    public_key: Option<Pubkey>,
    connecting: bool,
}

pub struct InAppWallet {
    backend: Arc<dyn SigningBackend>,
    gate: Arc<ApprovalGate>,
    broadcaster: Arc<Broadcaster>,
    cache: Arc<PersistentCache>,
    simulator: Option<Arc<BalanceDiffSimulator>>,
    app_name: String,
    ready_state: ReadyState,
    token: Option<Zeroizing<String>>,
    session: Mutex<SessionState>,
    events: broadcast::Sender<WalletEvent>,
}

impl InAppWallet {
    pub fn new(
        host: &dyn HostEnvironment,
        backend: Arc<dyn SigningBackend>,
        gate: Arc<ApprovalGate>,
        broadcaster: Arc<Broadcaster>,
        cache: Arc<PersistentCache>,
        app_name: impl Into<String>,
    ) -> Self {
        let token = host.launch_token();
        let ready_state = if token.is_some() {
            ReadyState::Installed
        } else {
            ReadyState::NotDetected
        };
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        debug!(?ready_state, "Host environment probed");

        Self {
            backend,
            gate,
            broadcaster,
            cache,
            simulator: None,
            app_name: app_name.into(),
            ready_state,
            token,
            session: Mutex::new(SessionState::default()),
            events,
        }
    }

    /// Attach a simulator so approval requests carry a balance-diff preview
    pub fn with_simulator(mut self, simulator: Arc<BalanceDiffSimulator>) -> Self {
        self.simulator = Some(simulator);
        self
    }

    pub fn ready_state(&self) -> ReadyState {
        self.ready_state
    }

    pub fn state(&self) -> ConnectionState {
        let session = self.session.lock();
        match (session.public_key, session.connecting) {
            (Some(key), _) => ConnectionState::Connected(key),
            (None, true) => ConnectionState::Connecting,
            (None, false) => ConnectionState::Disconnected,
        }
    }

    pub fn public_key(&self) -> Option<Pubkey> {
        self.session.lock().public_key
    }

    pub fn is_connected(&self) -> bool {
        self.public_key().is_some()
    }

    pub fn gate(&self) -> &Arc<ApprovalGate> {
        &self.gate
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: WalletEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn fail<T>(&self, err: WalletError) -> Result<T, WalletError> {
        self.report(&err);
        Err(err)
    }

    /// Log a failure and publish it as an `Error` event
    pub(crate) fn report(&self, err: &WalletError) {
        if err.is_user_rejection() {
            info!("User rejected the request");
        } else {
            warn!(error = %err, category = err.category(), "Wallet operation failed");
        }
        self.emit(WalletEvent::Error(err.clone()));
    }

    fn account_cache_key(&self) -> String {
        format!("{}/wallet", self.app_name)
    }

    /// The account remembered from the last successful connect, if still fresh
    pub fn remembered_account(&self) -> Option<Pubkey> {
        let stored: String = self.cache.fetch(&self.account_cache_key())?;
        Pubkey::from_str(&stored).ok()
    }

    /// Connect only when the host is present
    pub async fn auto_connect(&self) -> Result<(), WalletError> {
        if self.ready_state != ReadyState::Installed {
            debug!("Skipping auto-connect: host not detected");
            return Ok(());
        }
        self.connect().await
    }

    /// Resolve the user's account and open a session.
    ///
    /// A no-op while connected or while another connect is in flight.
    #[instrument(skip_all)]
    pub async fn connect(&self) -> Result<(), WalletError> {
        {
            let mut session = self.session.lock();
            if session.public_key.is_some() || session.connecting {
                return Ok(());
            }
            if self.ready_state != ReadyState::Installed {
                drop(session);
                return self.fail(WalletError::NotReady);
            }
            session.connecting = true;
        }
        let _connecting = scopeguard::guard((), |_| self.session.lock().connecting = false);

        let public_key = match self.resolve_public_key().await {
            Ok(key) => key,
            Err(e) => return self.fail(e),
        };

        self.session.lock().public_key = Some(public_key);
        self.cache.put(
            &self.account_cache_key(),
            &public_key.to_string(),
            REMEMBERED_ACCOUNT_TTL,
        );
        info!(%public_key, "Wallet connected");
        self.emit(WalletEvent::Connect(public_key));
        Ok(())
    }

    async fn resolve_public_key(&self) -> Result<Pubkey, WalletError> {
        let token = self.token.as_ref().ok_or(WalletError::NotReady)?;

        let existing = self
            .backend
            .get_public_key(token)
            .await
            .map_err(|e| WalletError::Connection(e.to_string()))?;
        if let Some(key) = existing {
            return Ok(key);
        }

        debug!("No key on record, provisioning one");
        self.backend
            .create_public_key(token)
            .await
            .map_err(|e| WalletError::Connection(e.to_string()))?
            .ok_or(WalletError::Account)
    }

    /// Tear down the session. Always emits `Disconnect`.
    #[instrument(skip_all)]
    pub async fn disconnect(&self) {
        let previous = self.session.lock().public_key.take();
        self.cache.clear(Some(&self.account_cache_key()));

        if let (Some(_), Some(token)) = (previous, self.token.as_ref()) {
            if let Err(e) = self.backend.disconnect(token).await {
                let err = WalletError::Disconnection(e.to_string());
                warn!(error = %err, "Remote disconnect failed");
                self.emit(WalletEvent::Error(err));
            }
        }

        if previous.is_some() {
            info!("Wallet disconnected");
        }
        self.emit(WalletEvent::Disconnect);
    }

    /// The backend switched the user's account.
    ///
    /// Only switches an open session; otherwise, and for a repeat of the
    /// current key, returns `false` and emits nothing.
    pub fn account_changed(&self, public_key: Pubkey) -> bool {
        {
            let mut session = self.session.lock();
            match session.public_key {
                None => {
                    debug!(%public_key, "Ignoring account change without a session");
                    return false;
                }
                Some(current) if current == public_key => return false,
                Some(_) => {}
            }
            if session.connecting {
                return false;
            }
            session.public_key = Some(public_key);
        }
        self.cache.put(
            &self.account_cache_key(),
            &public_key.to_string(),
            REMEMBERED_ACCOUNT_TTL,
        );
        info!(%public_key, "Account changed");
        self.emit(WalletEvent::Connect(public_key));
        true
    }

    /// The backend ended the session on its side
    pub fn handle_remote_disconnect(&self) {
        if self.session.lock().public_key.take().is_none() {
            return;
        }
        self.cache.clear(Some(&self.account_cache_key()));
        warn!("Session ended by remote");
        self.emit(WalletEvent::Error(WalletError::Disconnected));
        self.emit(WalletEvent::Disconnect);
    }

    fn session(&self) -> Result<(Pubkey, &str), WalletError> {
        let public_key = self.public_key().ok_or(WalletError::NotConnected)?;
        let token = self.token.as_ref().ok_or(WalletError::NotConnected)?;
        Ok((public_key, token.as_str()))
    }

    async fn preview(&self, txs: &[VersionedTransaction], requester: &Pubkey) -> SimulationPreview {
        let Some(simulator) = &self.simulator else {
            return SimulationPreview::Unavailable;
        };

        let mut changes = Vec::new();
        for tx in txs {
            match simulator.simulate_for(tx, requester).await {
                Ok(found) => changes.extend(found),
                Err(SimulationError::Rejected { err, .. }) => return SimulationPreview::Failed(err),
                Err(e) => {
                    debug!(error = %e, "Preview unavailable");
                    return SimulationPreview::Unavailable;
                }
            }
        }
        SimulationPreview::Changes(changes)
    }

    /// Ask the user, then report rejection through the ticket
    async fn approve(
        &self,
        payload: ApprovalPayload,
        preview: SimulationPreview,
    ) -> Result<ApprovalTicket, WalletError> {
        let correlation_id = CorrelationId::new();
        let (decision, ticket) = self.gate.request(payload, preview, correlation_id).await?;
        if !decision.is_approved() {
            ticket.fail(WalletError::UserRejected.to_string());
            return Err(WalletError::UserRejected);
        }
        Ok(ticket)
    }

    pub async fn sign_transaction(
        &self,
        tx: VersionedTransaction,
    ) -> Result<VersionedTransaction, WalletError> {
        let mut signed = self.sign_all_transactions(vec![tx]).await?;
        match signed.pop() {
            Some(tx) => Ok(tx),
            None => self.fail(WalletError::SignTransaction(
                "backend returned no transaction".to_string(),
            )),
        }
    }

    /// Sign a batch after a single approval.
    ///
    /// The backend must return every transaction with its message unchanged.
    #[instrument(skip_all, fields(count = txs.len()))]
    pub async fn sign_all_transactions(
        &self,
        txs: Vec<VersionedTransaction>,
    ) -> Result<Vec<VersionedTransaction>, WalletError> {
        match self.sign_transactions_inner(txs).await {
            Ok(signed) => Ok(signed),
            Err(e) => self.fail(e),
        }
    }

    async fn sign_transactions_inner(
        &self,
        txs: Vec<VersionedTransaction>,
    ) -> Result<Vec<VersionedTransaction>, WalletError> {
        let (public_key, token) = self.session()?;
        metrics().sign_requests.inc();

        let preview = self.preview(&txs, &public_key).await;
        let ticket = self
            .approve(ApprovalPayload::Transactions(txs.clone()), preview)
            .await?;

        let signed = self
            .backend
            .sign_transactions(token, &txs)
            .await
            .map_err(|e| WalletError::SignTransaction(e.to_string()))
            .and_then(|signed| ensure_unchanged(&txs, signed));

        match signed {
            Ok(signed) => {
                ticket.complete();
                Ok(signed)
            }
            Err(e) => {
                metrics().remote_sign_failures.inc();
                ticket.fail(e.to_string());
                Err(e)
            }
        }
    }

    /// Sign raw bytes; the returned signature is checked against the
    /// connected key
    #[instrument(skip_all, fields(len = message.len()))]
    pub async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, WalletError> {
        match self.sign_message_inner(message).await {
            Ok(signature) => Ok(signature),
            Err(e) => self.fail(e),
        }
    }

    async fn sign_message_inner(&self, message: &[u8]) -> Result<Vec<u8>, WalletError> {
        let (public_key, token) = self.session()?;
        metrics().sign_requests.inc();

        let ticket = self
            .approve(
                ApprovalPayload::Message(message.to_vec()),
                SimulationPreview::Unavailable,
            )
            .await?;

        let signed = self
            .backend
            .sign_message(token, message)
            .await
            .map_err(|e| WalletError::SignMessage(e.to_string()))
            .and_then(|bytes| {
                let valid = Signature::try_from(bytes.as_slice())
                    .map(|sig| sig.verify(public_key.as_ref(), message))
                    .unwrap_or(false);
                if valid {
                    Ok(bytes)
                } else {
                    Err(WalletError::SignMessage(
                        "signature does not verify against the connected key".to_string(),
                    ))
                }
            });

        match signed {
            Ok(bytes) => {
                ticket.complete();
                Ok(bytes)
            }
            Err(e) => {
                metrics().remote_sign_failures.inc();
                ticket.fail(e.to_string());
                Err(e)
            }
        }
    }

    /// Sign, then broadcast and wait for confirmation
    pub async fn sign_and_send_transaction(
        &self,
        tx: VersionedTransaction,
        cancel: Option<&CancellationToken>,
    ) -> Result<Signature, WalletError> {
        let signed = self.sign_transaction(tx).await?;
        match self.broadcaster.send_and_confirm(&signed, cancel).await {
            Ok(signature) => Ok(signature),
            Err(e) => self.fail(e.into()),
        }
    }
}

fn ensure_unchanged(
    requested: &[VersionedTransaction],
    signed: Vec<VersionedTransaction>,
) -> Result<Vec<VersionedTransaction>, WalletError> {
    if signed.len() != requested.len() {
        return Err(WalletError::SignTransaction(format!(
            "asked to sign {} transactions, got {}",
            requested.len(),
            signed.len()
        )));
    }
    if let Some(index) = requested
        .iter()
        .zip(&signed)
        .position(|(before, after)| before.message != after.message)
    {
        return Err(WalletError::SignTransaction(format!(
            "backend altered the message of transaction {}",
            index
        )));
    }
    Ok(signed)
}
