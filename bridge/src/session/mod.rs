//! Connection lifecycle of the router session.
//!
//! [`SessionManager`] owns the connection id and the generation counter. Each
//! connect starts a new generation with its own cancellation token and spawns one
//! session task that connects, runs the bulk sync and then the event listener.
//! Every failure of that task ends in [`SessionManager::disconnect`] with
//! reconnect; the delayed reconnect is the only retry in the system.

mod listener;
mod sync;

use alloc::sync::Arc;
use core::time::Duration;

use parking_lot::Mutex;
use thiserror::Error as ThisError;
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
    time::sleep,
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument as _, debug, info, info_span, warn};

use kumo_common::{ConfigEvent, ParamId};

use crate::{
    config::KumoConfig,
    device::{DeviceClient, DeviceError},
    events::{BridgeEvent, ConnectionStatus, Feedback, NameKind},
    mirror::{Generation, RouterSnapshot, Selection, StateMirror},
};

/// Why a session task ended.
#[derive(Debug, ThisError)]
pub enum SessionError {
    #[error("Session was replaced or disconnected")]
    Stale,
    #[error("Failed to connect to the router")]
    Connect(#[source] DeviceError),
    #[error("Failed to fetch {param}")]
    Fetch {
        param: ParamId,
        #[source]
        source: DeviceError,
    },
    #[error("Event stream failed")]
    Listen(#[source] DeviceError),
    #[error("Router sent an unusable event {0:?}")]
    MalformedEvent(ConfigEvent),
}

/// Mutable session bookkeeping, guarded by one lock.
struct Session {
    connection_id: Option<String>,
    generation: Generation,
    /// Cancelled whenever no session of `generation` is active.
    token: CancellationToken,
    reconnect_timer: Option<JoinHandle<()>>,
    torn_down: bool,
}

impl Session {
    fn idle() -> Self {
        let token = CancellationToken::new();
        token.cancel();
        Self {
            connection_id: None,
            generation: 0,
            token,
            reconnect_timer: None,
            torn_down: false,
        }
    }

    fn abort_reconnect(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
    }
}

struct Shared {
    http: reqwest::Client,
    config: watch::Sender<Arc<KumoConfig>>,
    status: watch::Sender<ConnectionStatus>,
    mirror: StateMirror,
    session: Mutex<Session>,
}

/// State a running session hands to the synchronizer and the listener.
pub(crate) struct SessionContext {
    pub device: DeviceClient,
    pub config: Arc<KumoConfig>,
    pub mirror: StateMirror,
    pub generation: Generation,
    pub token: CancellationToken,
    pub connection_id: String,
    shared: Arc<Shared>,
}

impl SessionContext {
    /// Whether this context still describes the live session.
    pub(crate) fn is_current(&self) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        let session = self.shared.session.lock();
        session.generation == self.generation
            && session.connection_id.as_deref() == Some(self.connection_id.as_str())
    }
}

/// Handle to the router session. Cheap to clone; all clones share one session.
#[derive(Clone)]
pub struct SessionManager {
    shared: Arc<Shared>,
}

impl SessionManager {
    /// Create an idle manager. Call [`Self::connect`] to start.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: KumoConfig) -> Result<Self, DeviceError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(DeviceError::Client)?;
        Ok(Self {
            shared: Arc::new(Shared {
                http,
                config: watch::Sender::new(Arc::new(config)),
                status: watch::Sender::new(ConnectionStatus::Disconnected),
                mirror: StateMirror::new(),
                session: Mutex::new(Session::idle()),
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> Arc<KumoConfig> {
        self.shared.config.borrow().clone()
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        *self.shared.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    #[must_use]
    pub fn generation(&self) -> Generation {
        self.shared.session.lock().generation
    }

    #[must_use]
    pub fn connection_id(&self) -> Option<String> {
        self.shared.session.lock().connection_id.clone()
    }

    #[must_use]
    pub fn mirror(&self) -> &StateMirror {
        &self.shared.mirror
    }

    /// Subscribe to route, name, variable, feedback and status notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.shared.mirror.subscribe()
    }

    #[must_use]
    pub fn route(&self, destination: u32) -> Option<u32> {
        self.shared.mirror.borrow().route(destination)
    }

    #[must_use]
    pub fn name(&self, kind: NameKind, index: u32) -> Vec<String> {
        self.shared.mirror.borrow().name(kind, index)
    }

    #[must_use]
    pub fn salvo_name(&self, index: u32) -> Option<String> {
        self.shared.mirror.borrow().salvo_name(index).map(str::to_owned)
    }

    #[must_use]
    pub fn selection(&self) -> Selection {
        self.shared.mirror.borrow().selection()
    }

    #[must_use]
    pub fn variable(&self, name: &str) -> Option<String> {
        self.shared.mirror.borrow().variable(name).map(str::to_owned)
    }

    #[must_use]
    pub fn evaluate(&self, feedback: Feedback) -> bool {
        self.shared.mirror.borrow().evaluate(feedback)
    }

    #[must_use]
    pub fn snapshot(&self) -> RouterSnapshot {
        self.shared.mirror.snapshot()
    }

    /// Device client for the configured address.
    pub(crate) fn device(&self) -> Result<DeviceClient, DeviceError> {
        DeviceClient::new(self.shared.http.clone(), &self.config().device.ip)
    }

    fn set_status(&self, status: ConnectionStatus) {
        let changed = self.shared.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
        if changed {
            debug!(%status, "Status changed");
            self.shared
                .mirror
                .publish(BridgeEvent::StatusChanged(status));
        }
    }

    /// Start a new session with the current configuration.
    ///
    /// Resets the mirror, advances the generation and spawns the session task.
    /// Must be called from within a tokio runtime.
    pub fn connect(&self) {
        let config = self.config();
        if config.device.ip.trim().is_empty() {
            warn!("No router address configured, staying disconnected");
            self.disconnect(false);
            return;
        }
        let device = match self.device() {
            Ok(device) => device,
            Err(e) => {
                warn!(?e, "Cannot connect to router");
                self.set_status(ConnectionStatus::ConnectionFailure);
                return;
            }
        };

        let (generation, token) = {
            let mut session = self.shared.session.lock();
            if session.torn_down {
                debug!("Ignoring connect after teardown");
                return;
            }
            session.abort_reconnect();
            session.token.cancel();
            session.connection_id = None;
            session.generation += 1;
            session.token = CancellationToken::new();
            self.shared.mirror.begin_generation(session.generation);
            self.set_status(ConnectionStatus::Connecting);
            (session.generation, session.token.clone())
        };

        info!(generation, ip = %config.device.ip, "Connecting to router");
        let manager = self.clone();
        tokio::spawn(
            async move {
                manager.run_session(device, config, generation, token).await;
            }
            .instrument(info_span!("kumo.session", generation)),
        );
    }

    /// End the current session, optionally scheduling a reconnect.
    ///
    /// Invalidates all in-flight work of the current generation. Calling it while
    /// already disconnected only re-asserts the status and replaces the timer.
    pub fn disconnect(&self, reconnect: bool) {
        let mut session = self.shared.session.lock();
        self.disconnect_locked(&mut session, reconnect, ConnectionStatus::Disconnected);
    }

    /// Shared body of [`Self::disconnect`]; `status` is what the user sees until the next attempt.
    fn disconnect_locked(&self, session: &mut Session, reconnect: bool, status: ConnectionStatus) {
        session.abort_reconnect();
        if !session.token.is_cancelled() {
            session.token.cancel();
            session.connection_id = None;
            session.generation += 1;
            self.shared.mirror.invalidate(session.generation);
            info!("Disconnected from router");
        }
        self.set_status(status);

        if reconnect && !session.torn_down {
            let delay = self.config().timing.reconnect_delay();
            let manager = self.clone();
            session.reconnect_timer = Some(tokio::spawn(
                async move {
                    sleep(delay).await;
                    manager.connect();
                }
                .in_current_span(),
            ));
            info!(?delay, "Reconnect scheduled");
        }
    }

    /// Apply a new configuration, reconnecting only when the router identity changed.
    pub fn config_updated(&self, config: KumoConfig) {
        let reconnect = self.config().requires_reconnect(&config);
        self.shared.config.send_replace(Arc::new(config));
        if reconnect {
            info!("Router connection settings changed, reconnecting");
            self.disconnect(false);
            self.connect();
        } else {
            info!("Config updated, keeping the current session");
        }
    }

    /// Disconnect for good. Later calls to [`Self::connect`] are ignored.
    pub fn teardown(&self) {
        let mut session = self.shared.session.lock();
        session.torn_down = true;
        self.disconnect_locked(&mut session, false, ConnectionStatus::Disconnected);
        info!("Session manager torn down");
    }

    /// Wait until the bulk sync finished and the listener runs.
    pub async fn wait_until_ready(&self, timeout: Duration) -> bool {
        let mut status = self.watch_status();
        matches!(
            tokio::time::timeout(
                timeout,
                status.wait_for(|&s| s == ConnectionStatus::Ready)
            )
            .await,
            Ok(Ok(_))
        )
    }

    async fn run_session(
        self,
        device: DeviceClient,
        config: Arc<KumoConfig>,
        generation: Generation,
        token: CancellationToken,
    ) {
        match self.drive_session(device, config, generation, &token).await {
            Ok(()) | Err(SessionError::Stale) => debug!("Session ended"),
            Err(e) => {
                warn!(?e, "Router session failed");
                self.fail_session(generation);
            }
        }
    }

    async fn drive_session(
        &self,
        device: DeviceClient,
        config: Arc<KumoConfig>,
        generation: Generation,
        token: &CancellationToken,
    ) -> Result<(), SessionError> {
        let connection_id = tokio::select! {
            () = token.cancelled() => return Err(SessionError::Stale),
            res = device.connect(config.timing.connect_timeout()) => {
                res.map_err(SessionError::Connect)?
            }
        };

        {
            let mut session = self.shared.session.lock();
            if session.generation != generation || token.is_cancelled() {
                return Err(SessionError::Stale);
            }
            session.connection_id = Some(connection_id.clone());
            self.set_status(ConnectionStatus::Loading);
        }
        info!(%connection_id, "Connected to router");

        let ctx = SessionContext {
            device,
            config,
            mirror: self.shared.mirror.clone(),
            generation,
            token: token.clone(),
            connection_id,
            shared: Arc::clone(&self.shared),
        };

        sync::synchronize(&ctx).await?;
        {
            let _session = self.shared.session.lock();
            if token.is_cancelled() {
                return Err(SessionError::Stale);
            }
            self.set_status(ConnectionStatus::Ready);
        }
        info!("Router state synchronized, listening for changes");

        listener::listen(&ctx).await
    }

    /// Tear down a failed session and schedule a reconnect, unless a newer
    /// session already replaced it.
    fn fail_session(&self, generation: Generation) {
        let mut session = self.shared.session.lock();
        if session.generation != generation || session.token.is_cancelled() {
            debug!("Failure of a replaced session, ignoring");
            return;
        }
        self.disconnect_locked(&mut session, true, ConnectionStatus::ConnectionFailure);
    }
}
