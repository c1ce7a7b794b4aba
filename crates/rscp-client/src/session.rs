// ============================================
// File: crates/rscp-client/src/session.rs
// ============================================
//! # Session
//!
//! ## Creation Reason
//! Public entry point of the engine: one authenticated, encrypted
//! connection to one device, shared by any number of caller tasks.
//!
//! ## Main Functionality
//! - `Session::connect`: Transport from config, handshake, tasks
//! - `Session::connect_with`: Same over a caller-supplied transport
//! - `Session::exchange` / `Session::request`: Synchronous tag round trips
//! - `Session::disconnect` / `Session::reconnect`: Lifecycle
//!
//! ## Task Layout
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Session                             │
//! │                                                              │
//! │  exchange() ──┐                                              │
//! │  exchange() ──┼──► mpsc<Command> ──► Dispatcher task ──► Transport
//! │               │        ▲              (owns channel)         │
//! │  KeepAlive ───┘        │                                     │
//! │   task ── Probe ───────┘                                     │
//! │                                                              │
//! │  CancellationToken ─┬─► Dispatcher                           │
//! │                     └─► KeepAlive (child token)              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Every (re)connect starts a fresh `SecureChannel`: the IV chain
//!   cannot be resumed
//! - Once faulted, every call fails with `ConnectionLost` until
//!   `reconnect` (or `reconnect_with`) succeeds
//! - Dropping the session cancels its tasks without waiting for them;
//!   call `disconnect` to join them
//!
//! ## Last Modified
//! v0.1.0 - Initial session implementation

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use rscp_common::{CommonError, Secret};
use rscp_core::crypto::RscpKey;
use rscp_core::protocol::{tags, TagCodec, TagValue, TagVocabulary};
use rscp_core::SecureChannel;
use rscp_transport::{LocalTransport, RelayedTransport, Transport};

use crate::config::{ClientConfig, TransportKind};
use crate::dispatcher::{Command, Dispatcher};
use crate::error::{ClientError, Result};
use crate::handshake;
use crate::keepalive::{self, KeepaliveOptions};
use crate::state::{self, SessionState, SessionStatus};

/// Time allowed for each task to finish after cancellation.
const TASK_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================
// SessionOptions
// ============================================

/// Parameters of a session, independent of the transport.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Device user name.
    pub username: String,
    /// Device password.
    pub password: Secret,
    /// Encryption passphrase.
    pub rscp_key: Secret,
    /// Tag table shared with the codec.
    pub vocabulary: Arc<TagVocabulary>,
    /// Reject values whose wire type differs from the table.
    pub strict_types: bool,
    /// Deadline for keep-alive probes; also the default for callers.
    pub request_timeout: Duration,
    /// Deadline for the authentication reply.
    pub auth_timeout: Duration,
    /// Request timeouts in a row that fault the connection.
    pub max_consecutive_timeouts: u32,
    /// Calls that may wait for the dispatcher.
    pub queue_depth: usize,
    /// Largest frame accepted from the device.
    pub max_frame_size: usize,
    /// Idle probe; `None` disables it.
    pub keepalive: Option<KeepaliveOptions>,
}

impl SessionOptions {
    /// Options with default timing, the built-in vocabulary and a 30 s
    /// keep-alive.
    pub fn new(
        username: impl Into<String>,
        password: impl Into<Secret>,
        rscp_key: impl Into<Secret>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            rscp_key: rscp_key.into(),
            vocabulary: TagVocabulary::shared_builtin(),
            strict_types: false,
            request_timeout: Duration::from_secs(10),
            auth_timeout: Duration::from_secs(5),
            max_consecutive_timeouts: 3,
            queue_depth: 32,
            max_frame_size: 32 * 1024,
            keepalive: Some(KeepaliveOptions {
                idle_window: Duration::from_secs(30),
                probe_tag: tags::INFO_REQ_UTC_TIME,
            }),
        }
    }

    /// Derives options from a validated configuration.
    ///
    /// # Errors
    /// `Core(UnknownTagName)` if the probe tag is not in the vocabulary,
    /// `ConfigInvalid` if it names a response tag.
    pub fn from_config(config: &ClientConfig, vocabulary: Arc<TagVocabulary>) -> Result<Self> {
        let keepalive = if config.keepalive.enabled {
            let probe_tag = vocabulary.resolve(&config.keepalive.probe_tag)?;
            if probe_tag.is_response() {
                return Err(ClientError::config_invalid(
                    "keepalive.probe_tag",
                    "must name a request tag",
                ));
            }
            Some(KeepaliveOptions {
                idle_window: Duration::from_secs(config.keepalive.idle_window_secs),
                probe_tag,
            })
        } else {
            None
        };

        Ok(Self {
            username: config.credentials.username.clone(),
            password: config.credentials.password.clone(),
            rscp_key: config.credentials.rscp_key.clone(),
            vocabulary,
            strict_types: config.vocabulary.strict,
            request_timeout: Duration::from_millis(config.session.request_timeout_ms),
            auth_timeout: Duration::from_millis(config.session.auth_timeout_ms),
            max_consecutive_timeouts: config.session.max_consecutive_timeouts,
            queue_depth: config.session.queue_depth,
            max_frame_size: config.session.max_frame_size,
            keepalive,
        })
    }

    /// Replaces the keep-alive settings.
    #[must_use]
    pub fn with_keepalive(mut self, keepalive: Option<KeepaliveOptions>) -> Self {
        self.keepalive = keepalive;
        self
    }

    /// Replaces the request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

// ============================================
// Link
// ============================================

/// Tasks and queue of one live connection.
#[derive(Debug)]
struct Link {
    commands: mpsc::Sender<Command>,
    cancel: CancellationToken,
    dispatcher: JoinHandle<()>,
    keepalive: Option<JoinHandle<()>>,
}

impl Link {
    /// Cancels both tasks and waits for them, keep-alive first.
    async fn shutdown(self) {
        self.cancel.cancel();
        drop(self.commands);

        let mut tasks = Vec::with_capacity(2);
        if let Some(keepalive) = self.keepalive {
            tasks.push(("keepalive", keepalive));
        }
        tasks.push(("dispatcher", self.dispatcher));

        for (name, task) in tasks {
            match tokio::time::timeout(TASK_JOIN_TIMEOUT, task).await {
                Ok(Ok(())) => debug!("Task '{}' completed", name),
                Ok(Err(e)) => warn!("Task '{}' panicked: {}", name, e),
                Err(_) => warn!("Task '{}' shutdown timeout", name),
            }
        }
    }
}

// ============================================
// Session
// ============================================

/// An authenticated connection to one device.
///
/// # Example
/// ```ignore
/// use std::time::Duration;
/// use rscp_client::{ClientConfig, Session};
/// use rscp_core::protocol::{tags, TagValue};
///
/// let config = ClientConfig::load("/etc/rscp/client.toml").await?;
/// let session = Session::connect(&config).await?;
///
/// let pv = session
///     .request(TagValue::request(tags::EMS_REQ_POWER_PV), Duration::from_secs(5))
///     .await?;
/// println!("PV power: {:?} W", pv.as_i64());
///
/// session.disconnect().await;
/// ```
pub struct Session {
    options: SessionOptions,
    /// Present when the session can open its own transport
    config: Option<ClientConfig>,
    status: Arc<SessionStatus>,
    link: RwLock<Option<Link>>,
    /// Serializes disconnect and reconnect
    lifecycle: Mutex<()>,
}

impl Session {
    fn new(options: SessionOptions, config: Option<ClientConfig>) -> Self {
        Self {
            options,
            config,
            status: Arc::new(SessionStatus::new()),
            link: RwLock::new(None),
            lifecycle: Mutex::new(()),
        }
    }

    /// Opens the configured transport and authenticates.
    ///
    /// # Errors
    /// - `ConfigInvalid` / `ConfigLoad`: Bad configuration or vocabulary
    /// - `Transport`: Connect failed or timed out
    /// - `AuthenticationFailed`: Device rejected the login
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let vocabulary = config.load_vocabulary().await?;
        let options = SessionOptions::from_config(config, vocabulary)?;

        let session = Self::new(options, Some(config.clone()));
        let transport = open_transport(config).await?;
        session.establish(transport).await?;
        Ok(session)
    }

    /// Authenticates over an already connected transport.
    ///
    /// # Errors
    /// - `Core(InvalidKey)`: RSCP key longer than 32 bytes
    /// - `AuthenticationFailed`: Device rejected the login or stayed silent
    pub async fn connect_with<T>(transport: T, options: SessionOptions) -> Result<Self>
    where
        T: Transport + 'static,
    {
        let session = Self::new(options, None);
        session.establish(Box::new(transport)).await?;
        Ok(session)
    }

    /// Handshake on a fresh channel, then hands the transport to the
    /// dispatcher.
    async fn establish(&self, mut transport: Box<dyn Transport>) -> Result<()> {
        self.status.set(SessionState::Connected);
        info!(transport = transport.kind(), "Connected to device");

        let key = RscpKey::from_passphrase(self.options.rscp_key.expose());
        let key = match key {
            Ok(key) => key,
            Err(e) => {
                self.status.fault(&e.to_string());
                let _ = transport.close().await;
                return Err(e.into());
            }
        };
        let tags = TagCodec::new(Arc::clone(&self.options.vocabulary)).strict(self.options.strict_types);
        let mut channel =
            SecureChannel::new(&key, tags).with_max_frame_size(self.options.max_frame_size);

        self.status.set(SessionState::Authenticating);
        let auth = handshake::authenticate(
            &mut *transport,
            &mut channel,
            &self.options.username,
            &self.options.password,
            self.options.auth_timeout,
        )
        .await;
        if let Err(e) = auth {
            self.status.fault(&e.to_string());
            if let Err(close) = transport.close().await {
                debug!(error = %close, "Transport close failed");
            }
            return Err(e);
        }

        self.status.set(SessionState::Authenticated);
        self.status.touch(state::now());

        let cancel = CancellationToken::new();
        let (commands, queue) = mpsc::channel(self.options.queue_depth);
        let dispatcher = Dispatcher::new(
            transport,
            channel,
            queue,
            Arc::clone(&self.status),
            cancel.clone(),
            self.options.max_consecutive_timeouts,
        );
        let dispatcher = tokio::spawn(dispatcher.run());

        let keepalive = self.options.keepalive.map(|options| {
            tokio::spawn(keepalive::run(
                commands.clone(),
                Arc::clone(&self.status),
                options,
                self.options.request_timeout,
                cancel.child_token(),
            ))
        });

        *self.link.write() = Some(Link {
            commands,
            cancel,
            dispatcher,
            keepalive,
        });
        Ok(())
    }

    // ========================================
    // Exchanges
    // ========================================

    /// Sends `values` in one frame and returns the values of the frame
    /// that answers them.
    ///
    /// Calls are served one at a time in submission order; `timeout`
    /// runs from the moment the request is written.
    ///
    /// # Errors
    /// - `RequestTimeout`: No answer in time
    /// - `AccessDenied`: The device refused the requested tag
    /// - `ConnectionLost`: The session is faulted or disconnected
    pub async fn exchange(&self, values: Vec<TagValue>, timeout: Duration) -> Result<Vec<TagValue>> {
        if values.is_empty() {
            return Err(CommonError::invalid_input("values", "at least one value required").into());
        }

        let commands = {
            let link = self.link.read();
            match (self.status.state(), link.as_ref()) {
                (SessionState::Authenticated, Some(link)) => link.commands.clone(),
                _ => return Err(self.lost()),
            }
        };

        // a foreground call resets the keep-alive window
        self.status.touch(state::now());

        let (reply, response) = oneshot::channel();
        commands
            .send(Command::Exchange {
                values,
                timeout,
                reply,
            })
            .await
            .map_err(|_| self.lost())?;
        response.await.map_err(|_| self.lost())?
    }

    /// Sends one value and returns its response value.
    ///
    /// # Errors
    /// As [`Session::exchange`].
    pub async fn request(&self, value: TagValue, timeout: Duration) -> Result<TagValue> {
        let expected = value.tag.response();
        self.exchange(vec![value], timeout)
            .await?
            .into_iter()
            .find(|v| v.tag == expected)
            .ok_or_else(|| CommonError::internal("matched reply lacks the response tag").into())
    }

    // ========================================
    // Lifecycle
    // ========================================

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.status.state()
    }

    /// Default request deadline from the options.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.options.request_timeout
    }

    /// Returns `true` while the keep-alive task is alive.
    #[must_use]
    pub fn is_keepalive_running(&self) -> bool {
        self.link
            .read()
            .as_ref()
            .and_then(|link| link.keepalive.as_ref())
            .is_some_and(|task| !task.is_finished())
    }

    /// Stops both tasks, closes the transport and fails queued calls with
    /// `ConnectionLost`. Safe to call in any state.
    pub async fn disconnect(&self) {
        let _guard = self.lifecycle.lock().await;
        self.teardown().await;
    }

    async fn teardown(&self) {
        let link = self.link.write().take();
        self.status.set(SessionState::Disconnected);
        if let Some(link) = link {
            link.shutdown().await;
            info!("Session disconnected");
        }
    }

    /// Disconnects, opens a new transport from the configuration and
    /// authenticates again with a fresh cipher state.
    ///
    /// # Errors
    /// `InvalidState` for sessions built with `connect_with`; otherwise
    /// as [`Session::connect`].
    pub async fn reconnect(&self) -> Result<()> {
        let Some(config) = &self.config else {
            return Err(ClientError::invalid_state(
                self.state(),
                "no configuration to open a transport; use reconnect_with",
            ));
        };

        let _guard = self.lifecycle.lock().await;
        self.teardown().await;
        info!("Reconnecting");
        let transport = open_transport(config).await?;
        self.establish(transport).await
    }

    /// Disconnects and authenticates again over `transport`.
    ///
    /// # Errors
    /// As [`Session::connect_with`].
    pub async fn reconnect_with<T>(&self, transport: T) -> Result<()>
    where
        T: Transport + 'static,
    {
        let _guard = self.lifecycle.lock().await;
        self.teardown().await;
        info!("Reconnecting");
        self.establish(Box::new(transport)).await
    }

    fn lost(&self) -> ClientError {
        ClientError::connection_lost(self.status.unavailable_reason())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(link) = self.link.get_mut().as_ref() {
            link.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .field("user", &self.options.username)
            .field("keepalive", &self.options.keepalive)
            .finish_non_exhaustive()
    }
}

/// Opens the transport named by the configuration.
async fn open_transport(config: &ClientConfig) -> Result<Box<dyn Transport>> {
    match config.transport.kind {
        TransportKind::Local => {
            let transport = LocalTransport::connect(
                &config.transport.host,
                config.transport.port,
                config.transport.connect_timeout(),
            )
            .await?;
            Ok(Box::new(transport))
        }
        TransportKind::Relayed => {
            let transport =
                RelayedTransport::connect(config.portal_login()?, config.relay_options()).await?;
            Ok(Box::new(transport))
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use rscp_core::protocol::TagPayload;
    use rscp_transport::MockTransport;

    fn options() -> SessionOptions {
        SessionOptions::new("user", "pw", "rscp-key").with_keepalive(None)
    }

    fn device_channel() -> SecureChannel {
        SecureChannel::new(&RscpKey::from_passphrase("rscp-key").unwrap(), TagCodec::builtin())
    }

    #[test]
    fn test_options_from_config() {
        let config = ClientConfig::from_str(
            r#"
            [transport]
            host = "10.0.0.5"

            [credentials]
            username = "user"
            password = "pw"
            rscp_key = "rscp-key"

            [keepalive]
            idle_window_secs = 45
            probe_tag = "INFO_REQ_TIME"
            "#,
        )
        .unwrap();

        let options = SessionOptions::from_config(&config, TagVocabulary::shared_builtin()).unwrap();
        assert_eq!(
            options.keepalive,
            Some(KeepaliveOptions {
                idle_window: Duration::from_secs(45),
                probe_tag: tags::INFO_REQ_TIME,
            })
        );
        assert_eq!(options.request_timeout, Duration::from_secs(10));

        let mut bad = config;
        bad.keepalive.probe_tag = "INFO_TIME".to_string();
        assert!(SessionOptions::from_config(&bad, TagVocabulary::shared_builtin()).is_err());

        bad.keepalive.probe_tag = "NO_SUCH_TAG".to_string();
        assert!(SessionOptions::from_config(&bad, TagVocabulary::shared_builtin()).is_err());
    }

    #[tokio::test]
    async fn test_oversized_key_rejected_before_sending() {
        let (transport, peer) = MockTransport::pair();
        let options = SessionOptions::new("user", "pw", "k".repeat(33)).with_keepalive(None);

        let err = Session::connect_with(transport, options).await.unwrap_err();
        assert!(matches!(err, ClientError::Core(_)));
        assert!(peer.written().is_empty());
        assert!(peer.is_closed());
    }

    #[tokio::test]
    async fn test_disconnected_session_refuses_calls() {
        let (transport, peer) = MockTransport::pair();
        let device = tokio::spawn(async move {
            let mut device = device_channel();
            let _ = device.open(&peer.recv().await.unwrap()).unwrap();
            peer.inject(
                device
                    .seal(&[TagValue::new(tags::RSCP_AUTHENTICATION, TagPayload::UChar8(10))])
                    .unwrap(),
            );
            peer
        });

        let session = Session::connect_with(transport, options()).await.unwrap();
        let peer = device.await.unwrap();
        assert_eq!(session.state(), SessionState::Authenticated);

        session.disconnect().await;
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(peer.is_closed());

        let err = session
            .request(TagValue::request(tags::EMS_REQ_POWER_PV), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::ConnectionLost { ref reason } if reason == "session disconnected"));

        assert!(matches!(
            session.reconnect().await,
            Err(ClientError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_exchange_rejected() {
        let (transport, peer) = MockTransport::pair();
        let device = tokio::spawn(async move {
            let mut device = device_channel();
            let _ = device.open(&peer.recv().await.unwrap()).unwrap();
            peer.inject(
                device
                    .seal(&[TagValue::new(tags::RSCP_AUTHENTICATION, TagPayload::UChar8(10))])
                    .unwrap(),
            );
        });

        let session = Session::connect_with(transport, options()).await.unwrap();
        device.await.unwrap();
        assert!(matches!(
            session.exchange(Vec::new(), Duration::from_secs(1)).await,
            Err(ClientError::Common(_))
        ));
        session.disconnect().await;
    }
}
