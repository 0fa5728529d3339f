//! Realtime client
//!
//! `RealtimeClient` is the explicitly constructed context that owns one
//! logical realtime connection for an application session: the current
//! status, the auth token, the live outbound queue, the reconnect attempt
//! counter and the router holding every subscription.
//!
//! Lifecycle:
//! - `connect` spawns a supervisor task that opens the socket, runs the
//!   session and, when the session ends or the handshake fails, sleeps for
//!   the backoff delay and tries again. It never gives up on its own.
//! - `disconnect` is the only way to stop it. It bumps the connection
//!   generation so a superseded supervisor notices and exits, then either
//!   closes the live session (dropping the outbound queue makes the session
//!   send a close frame) or aborts the task mid-backoff. A session that is
//!   still closing is awaited by the next supervisor before it opens a new
//!   socket, so at most one socket is open at a time.
//! - Subscriptions live in the router, not in the session, so they survive
//!   any number of reconnects.
//!
//! The supervisor holds a clone of the shared state; call `disconnect`
//! before dropping the last client handle.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tungstenite::protocol::Message as WsMessage;
use url::Url;

use crate::config::ConnectionSettings;
use crate::router::{Router, Subscription};
use crate::transport::message::{Envelope, TypedEnvelope};
use crate::transport::status::{ConnectionStatus, StatusListeners};
use crate::transport::websocket::{self, SessionEnd};
use crate::transport::Backoff;
use crate::utils::Result;

#[derive(Default)]
struct ConnectionState {
    status: ConnectionStatus,
    auth_token: Option<String>,
    outbound: Option<mpsc::UnboundedSender<WsMessage>>,
    reconnect_attempts: u32,
    /// Bumped by every `connect`/`disconnect`; a supervisor only touches
    /// state while its own generation is current.
    generation: u64,
    /// Bumped on every status change; orders status notifications.
    status_seq: u64,
    task: Option<JoinHandle<()>>,
    /// A session told to close by `disconnect` that may still be running.
    closing: Option<JoinHandle<()>>,
}

impl ConnectionState {
    /// Sets the status and returns the change's sequence number, or `None`
    /// if the status was already `status`.
    fn set_status(&mut self, status: ConnectionStatus) -> Option<u64> {
        if self.status == status {
            return None;
        }
        self.status = status;
        self.status_seq += 1;
        Some(self.status_seq)
    }
}

struct Inner {
    base_url: Url,
    token_param: String,
    backoff: Backoff,
    router: Router,
    listeners: StatusListeners,
    state: Mutex<ConnectionState>,
}

#[derive(Clone)]
pub struct RealtimeClient {
    inner: Arc<Inner>,
}

impl RealtimeClient {
    pub fn new(settings: &ConnectionSettings) -> Result<Self> {
        let base_url = Url::parse(&settings.url)?;
        Ok(Self {
            inner: Arc::new(Inner {
                base_url,
                token_param: settings.token_param.clone(),
                backoff: Backoff::from(settings),
                router: Router::new(),
                listeners: StatusListeners::default(),
                state: Mutex::new(ConnectionState::default()),
            }),
        })
    }

    /// Stores the credential used by the next (re)connect. An open session
    /// keeps the token it was opened with.
    pub fn set_auth_token(&self, token: Option<String>) {
        self.inner.lock().auth_token = token;
    }

    pub fn auth_token(&self) -> Option<String> {
        self.inner.lock().auth_token.clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.lock().status
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.lock().reconnect_attempts
    }

    pub fn router(&self) -> &Router {
        &self.inner.router
    }

    /// Opens the connection. No-op while `Connected` or `Connecting`; while
    /// `Reconnecting` the pending backoff is skipped and a new attempt starts
    /// immediately. Must be called from within a Tokio runtime.
    pub fn connect(&self) {
        let Ok(runtime) = Handle::try_current() else {
            error!("connect called outside a Tokio runtime");
            return;
        };

        let (generation, seq, closing) = {
            let mut state = self.inner.lock();
            if matches!(
                state.status,
                ConnectionStatus::Connected | ConnectionStatus::Connecting
            ) {
                debug!(status = %state.status, "connect ignored");
                return;
            }
            if let Some(task) = state.task.take() {
                task.abort();
            }
            state.outbound = None;
            state.generation += 1;
            let seq = state.set_status(ConnectionStatus::Connecting);
            (state.generation, seq, state.closing.take())
        };

        info!(url = %self.inner.base_url, "connecting");
        self.inner.notify(seq, ConnectionStatus::Connecting);

        let task = runtime.spawn(supervise(self.inner.clone(), generation, closing));
        let mut state = self.inner.lock();
        if state.generation == generation {
            state.task = Some(task);
        } else {
            task.abort();
        }
    }

    /// Stops the connection and any pending reconnect. Subscriptions are kept.
    pub fn disconnect(&self) {
        let (stale, seq) = {
            let mut state = self.inner.lock();
            state.generation += 1;
            state.reconnect_attempts = 0;
            let stale = match (state.task.take(), state.outbound.take()) {
                // the session closes the socket once its queue is gone
                (Some(session), Some(outbound)) => {
                    drop(outbound);
                    state.closing = Some(session);
                    None
                }
                (task, _) => task,
            };
            (stale, state.set_status(ConnectionStatus::Disconnected))
        };

        if let Some(task) = stale {
            task.abort();
        }

        if seq.is_some() {
            info!("disconnected");
            self.inner.notify(seq, ConnectionStatus::Disconnected);
        }
    }

    /// Wraps `payload` in an envelope for `topic` and queues it on the live
    /// session. Returns `false` when not connected or the payload does not
    /// serialize; nothing is buffered for later.
    pub fn send<P: Serialize>(&self, topic: &str, payload: P) -> bool {
        let payload = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(e) => {
                warn!(topic, "cannot serialize payload: {e}");
                return false;
            }
        };
        let text = match Envelope::new(topic, payload).encode() {
            Ok(text) => text,
            Err(e) => {
                warn!(topic, "cannot encode envelope: {e}");
                return false;
            }
        };

        let state = self.inner.lock();
        match (&state.outbound, state.status) {
            (Some(outbound), ConnectionStatus::Connected) => {
                outbound.send(WsMessage::text(text)).is_ok()
            }
            (_, status) => {
                debug!(topic, %status, "send while not connected");
                false
            }
        }
    }

    /// Registers a callback for every status transition.
    pub fn on_status_change<F>(&self, listener: F) -> Subscription
    where
        F: Fn(ConnectionStatus) + Send + Sync + 'static,
    {
        self.inner.listeners.add(listener)
    }

    pub fn subscribe<F>(&self, topic: &str, handler: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.inner.router.subscribe(topic, handler)
    }

    pub fn subscribe_typed<T, F>(&self, topic: &str, handler: F) -> Subscription
    where
        T: DeserializeOwned + 'static,
        F: Fn(TypedEnvelope<T>) + Send + Sync + 'static,
    {
        self.inner.router.subscribe_typed(topic, handler)
    }

    pub fn subscribe_all<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.inner.router.subscribe_all(handler)
    }
}

impl fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("RealtimeClient")
            .field("url", &self.inner.base_url.as_str())
            .field("status", &state.status)
            .field("reconnect_attempts", &state.reconnect_attempts)
            .finish()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, ConnectionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn notify(&self, seq: Option<u64>, status: ConnectionStatus) {
        if let Some(seq) = seq {
            self.listeners.notify(seq, status);
        }
    }

    fn endpoint(&self) -> Url {
        let state = self.lock();
        websocket::endpoint(&self.base_url, &self.token_param, state.auth_token.as_deref())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }

    fn mark_connected(&self, generation: u64, outbound: mpsc::UnboundedSender<WsMessage>) -> bool {
        let seq = {
            let mut state = self.lock();
            if state.generation != generation {
                return false;
            }
            state.outbound = Some(outbound);
            state.reconnect_attempts = 0;
            state.set_status(ConnectionStatus::Connected)
        };
        info!(url = %self.base_url, "connected");
        self.notify(seq, ConnectionStatus::Connected);
        true
    }

    /// Records a failed attempt and returns the attempt number and delay
    /// before the next one, or `None` if this supervisor was superseded.
    fn schedule_retry(&self, generation: u64) -> Option<(u32, Duration)> {
        let (attempt, delay, seq) = {
            let mut state = self.lock();
            if state.generation != generation {
                return None;
            }
            let delay = self.backoff.delay(state.reconnect_attempts);
            state.reconnect_attempts = state.reconnect_attempts.saturating_add(1);
            state.outbound = None;
            let seq = state.set_status(ConnectionStatus::Reconnecting);
            (state.reconnect_attempts, delay, seq)
        };
        self.notify(seq, ConnectionStatus::Reconnecting);
        Some((attempt, delay))
    }

    fn begin_attempt(&self, generation: u64) -> bool {
        let seq = {
            let mut state = self.lock();
            if state.generation != generation {
                return false;
            }
            state.set_status(ConnectionStatus::Connecting)
        };
        self.notify(seq, ConnectionStatus::Connecting);
        true
    }
}

/// Upper bound on waiting for a previous session to finish closing.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

async fn supervise(inner: Arc<Inner>, generation: u64, closing: Option<JoinHandle<()>>) {
    if let Some(mut previous) = closing {
        if tokio::time::timeout(CLOSE_GRACE, &mut previous).await.is_err() {
            warn!("previous session did not close in time");
            previous.abort();
        }
    }

    loop {
        let url = inner.endpoint();
        match websocket::open(&url).await {
            Ok(stream) => {
                let (tx, rx) = mpsc::unbounded_channel::<WsMessage>();
                if !inner.mark_connected(generation, tx) {
                    return;
                }
                let end = websocket::run_session(stream, rx, &inner.router).await;
                if !inner.is_current(generation) {
                    debug!(?end, "session ended after disconnect");
                    return;
                }
                match end {
                    SessionEnd::Failed(e) => warn!("realtime session failed: {e}"),
                    other => warn!(end = ?other, "realtime session ended"),
                }
            }
            Err(e) => warn!("connect attempt failed: {e}"),
        }

        let Some((attempt, delay)) = inner.schedule_retry(generation) else {
            return;
        };
        info!(attempt, delay_ms = delay.as_millis() as u64, "reconnecting");
        tokio::time::sleep(delay).await;

        if !inner.begin_attempt(generation) {
            return;
        }
    }
}
