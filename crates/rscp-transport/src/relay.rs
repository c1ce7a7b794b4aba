// ============================================
// File: crates/rscp-transport/src/relay.rs
// ============================================
//! # Portal-Relayed Transport
//!
//! ## Creation Reason
//! Devices outside the local network are reached through the vendor
//! portal, which tunnels RSCP bytes over a websocket. Before any device
//! traffic flows, the portal registers a control connection, interviews
//! the client with INFO questions and hands out a virtual connection.
//!
//! ## Registration Flow
//! ```text
//!  client                                   portal
//!    │ ──────────── websocket connect ────────► │
//!    │ ◄──── SERVER_REGISTER_CONNECTION (ctrl) ─ │
//!    │ ─── SERVER_CONNECTION_REGISTERED ──────► │
//!    │ ◄──── SERVER_REQ_RSCP_CMD [INFO_REQ_*] ── │   answered automatically
//!    │ ──── SERVER_REQ_RSCP_CMD [INFO_*] ─────► │
//!    │ ◄──── SERVER_REQ_RSCP_CMD [INFO_SERIAL] ─ │
//!    │ ─ SERVER_REQ_NEW_VIRTUAL_CONNECTION ───► │   PortalLogin
//!    │ ◄──── SERVER_REGISTER_CONNECTION (virt) ─ │
//!    │ ─── SERVER_CONNECTION_REGISTERED ──────► │
//!    │ ◄════ SERVER_REQ_RSCP_CMD (virt) ══════► │   device bytes
//! ```
//!
//! ## Main Functionality
//! - `PortalLogin`: Credentials for the virtual connection request
//! - `RelayOptions`: URL, connect timeout, reported time zone
//! - `RelayedTransport`: `Transport` over the websocket tunnel
//!
//! ## ⚠️ Important Note for Next Developer
//! - Outer frames are plaintext RSCP frames; the device bytes inside the
//!   envelope are exactly what `LocalTransport` would carry
//! - The password is a digest computed by the portal login collaborator;
//!   this module never sees the clear-text portal password
//! - Replies queued by `receive` survive cancellation and are flushed by
//!   the next `send`/`receive`
//!
//! ## Last Modified
//! v0.1.0 - Initial relay implementation

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use rscp_common::{RscpTimestamp, Secret, TagId};
use rscp_core::protocol::{tags, Frame, FrameCodec, TagCodec, TagPayload, TagValue};

use crate::envelope::{Envelope, Registration};
use crate::error::{Result, TransportError};
use crate::traits::Transport;

// ============================================
// Constants
// ============================================

/// Default portal relay endpoint.
pub const DEFAULT_RELAY_URL: &str = "wss://s10.e3dc.com/ws/";

/// Default bound for websocket connect plus registration.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection type requested for the virtual connection.
const VIRTUAL_CONNECTION_TYPE: i32 = 4;

/// Hash code the portal expects in the virtual connection request.
const VIRTUAL_CONNECTION_HASH: i32 = 1_234_567_890;

/// Address reported for every network INFO question.
const UNSPECIFIED_ADDRESS: &str = "0.0.0.0";

// ============================================
// PortalLogin
// ============================================

/// Credentials for the virtual connection to one device.
#[derive(Debug, Clone)]
pub struct PortalLogin {
    /// Portal user name.
    pub user: String,
    /// Password digest as expected by the portal.
    pub password_digest: Secret,
    /// Device identifier (serial number with prefix).
    pub identifier: String,
}

impl PortalLogin {
    /// Builds the `SERVER_REQ_NEW_VIRTUAL_CONNECTION` request.
    #[must_use]
    pub fn to_value(&self) -> TagValue {
        TagValue::container(
            tags::SERVER_REQ_NEW_VIRTUAL_CONNECTION,
            vec![
                TagValue::string(tags::SERVER_USER, self.user.as_str()),
                TagValue::string(tags::SERVER_PASSWD, self.password_digest.expose()),
                TagValue::string(tags::SERVER_IDENTIFIER, self.identifier.as_str()),
                TagValue::new(tags::SERVER_TYPE, TagPayload::Int32(VIRTUAL_CONNECTION_TYPE)),
                TagValue::new(tags::SERVER_HASH_CODE, TagPayload::Int32(VIRTUAL_CONNECTION_HASH)),
            ],
        )
    }
}

// ============================================
// RelayOptions
// ============================================

/// Relay connection options.
#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// Websocket URL of the portal relay.
    pub url: String,
    /// Bound for websocket connect plus registration.
    pub connect_timeout: Duration,
    /// Time zone reported to the portal (`GMT+1`, ...).
    pub time_zone: String,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            url: DEFAULT_RELAY_URL.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            time_zone: "GMT+0".to_string(),
        }
    }
}

// ============================================
// RelayProtocol (no I/O)
// ============================================

/// What handling one portal message produced.
#[derive(Debug, PartialEq)]
enum RelayEvent {
    /// Outer frame to send back to the portal.
    Reply(Vec<u8>),
    /// Device bytes from the virtual connection.
    Data(Vec<u8>),
    /// The portal dropped our connection.
    Unregistered,
}

/// Portal-side conversation state.
#[derive(Debug)]
struct RelayProtocol {
    codec: FrameCodec,
    login: PortalLogin,
    time_zone: String,
    control: Option<Registration>,
    device: Option<Registration>,
    login_sent: bool,
    buffer: Vec<u8>,
}

impl RelayProtocol {
    fn new(login: PortalLogin, time_zone: String) -> Self {
        Self {
            codec: FrameCodec::new(TagCodec::builtin()),
            login,
            time_zone,
            control: None,
            device: None,
            login_sent: false,
            buffer: Vec::new(),
        }
    }

    fn is_open(&self) -> bool {
        self.device.is_some()
    }

    /// Wraps device bytes for the virtual connection.
    fn wrap_outbound(&self, data: &[u8]) -> Result<Vec<u8>> {
        let device = self
            .device
            .ok_or_else(|| TransportError::relay("virtual connection not established"))?;
        let envelope = Envelope::new(device, data.to_vec()).to_value()?;
        Ok(self.codec.wrap(&[envelope])?)
    }

    /// Handles one websocket message worth of outer frame bytes.
    fn handle(&mut self, bytes: &[u8]) -> Result<Vec<RelayEvent>> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some((frame, consumed)) = self.codec.parse(&self.buffer)? {
            self.buffer.drain(..consumed);
            for value in &frame.values {
                self.handle_value(value, &mut events)?;
            }
        }
        Ok(events)
    }

    fn handle_value(&mut self, value: &TagValue, events: &mut Vec<RelayEvent>) -> Result<()> {
        match value.tag {
            tags::SERVER_REQ_PING => {
                trace!("Answering portal ping");
                events.push(RelayEvent::Reply(
                    self.codec.wrap(&[TagValue::request(tags::SERVER_PING)])?,
                ));
            }
            tags::SERVER_REGISTER_CONNECTION => {
                let registration = Registration::from_value(value)?;
                if self.control.is_none() {
                    info!(
                        connection = %registration.connection,
                        auth_level = %registration.auth_level,
                        "Portal registered control connection"
                    );
                    self.control = Some(registration);
                } else {
                    info!(
                        connection = %registration.connection,
                        auth_level = %registration.auth_level,
                        "Portal registered virtual connection"
                    );
                    self.device = Some(registration);
                }
                events.push(RelayEvent::Reply(
                    self.codec.wrap(&[registration.acknowledgement()])?,
                ));
            }
            tags::SERVER_UNREGISTER_CONNECTION => {
                warn!("Portal unregistered the connection");
                events.push(RelayEvent::Unregistered);
            }
            tags::SERVER_REQ_RSCP_CMD => {
                let envelope = Envelope::from_value(value)?;
                match (self.device, self.control) {
                    (Some(device), _) if device.connection == envelope.connection => {
                        trace!(bytes = envelope.data.len(), "Device bytes from relay");
                        events.push(RelayEvent::Data(envelope.data));
                    }
                    (_, Some(control)) if control.connection == envelope.connection => {
                        self.answer_portal(control, &envelope.data, events)?;
                    }
                    _ => {
                        return Err(TransportError::relay(format!(
                            "envelope for unknown connection {}",
                            envelope.connection
                        )));
                    }
                }
            }
            other => debug!(tag = %other, "Ignoring portal message"),
        }
        Ok(())
    }

    /// Answers the INFO interview on the control connection.
    fn answer_portal(
        &mut self,
        control: Registration,
        inner: &[u8],
        events: &mut Vec<RelayEvent>,
    ) -> Result<()> {
        let mut answers = Vec::new();
        for value in decode_inner(&self.codec, inner)? {
            if value.tag == tags::INFO_SERIAL_NUMBER {
                if !self.login_sent {
                    info!(
                        serial = value.as_str().unwrap_or_default(),
                        "Requesting virtual connection"
                    );
                    self.login_sent = true;
                    events.push(RelayEvent::Reply(self.codec.wrap(&[self.login.to_value()])?));
                }
            } else if let Some(answer) = self.answer_info(control, value.tag) {
                answers.push(answer);
            } else {
                debug!(tag = %value.tag, "Unanswered portal question");
            }
        }

        if !answers.is_empty() {
            let inner = self.codec.wrap(&answers)?;
            let envelope = Envelope::new(control, inner).to_value()?;
            events.push(RelayEvent::Reply(self.codec.wrap(&[envelope])?));
        }
        Ok(())
    }

    fn answer_info(&self, control: Registration, question: TagId) -> Option<TagValue> {
        let answer = match question {
            tags::INFO_REQ_IP_ADDRESS => TagValue::string(tags::INFO_IP_ADDRESS, UNSPECIFIED_ADDRESS),
            tags::INFO_REQ_SUBNET_MASK => TagValue::string(tags::INFO_SUBNET_MASK, UNSPECIFIED_ADDRESS),
            tags::INFO_REQ_GATEWAY => TagValue::string(tags::INFO_GATEWAY, UNSPECIFIED_ADDRESS),
            tags::INFO_REQ_DNS => TagValue::string(tags::INFO_DNS, UNSPECIFIED_ADDRESS),
            tags::INFO_REQ_DHCP_STATUS => {
                TagValue::new(tags::INFO_DHCP_STATUS, TagPayload::Bool(false))
            }
            tags::INFO_REQ_TIME => {
                TagValue::new(tags::INFO_TIME, TagPayload::Timestamp(RscpTimestamp::now()))
            }
            tags::INFO_REQ_UTC_TIME => {
                TagValue::new(tags::INFO_UTC_TIME, TagPayload::Timestamp(RscpTimestamp::now()))
            }
            tags::INFO_REQ_TIME_ZONE => TagValue::string(tags::INFO_TIME_ZONE, self.time_zone.as_str()),
            tags::INFO_REQ_A35_SERIAL_NUMBER => {
                TagValue::string(tags::INFO_A35_SERIAL_NUMBER, "123456")
            }
            tags::INFO_REQ_INFO => TagValue::container(
                tags::INFO_INFO,
                vec![
                    TagValue::string(
                        tags::INFO_SERIAL_NUMBER,
                        format!("WEB_{:016x}", control.connection.0),
                    ),
                    TagValue::string(tags::INFO_PRODUCTION_DATE, "570412800000"),
                    TagValue::string(tags::INFO_MAC_ADDRESS, "00:00:00:00:00:00"),
                ],
            ),
            _ => return None,
        };
        Some(answer)
    }
}

/// Decodes the plaintext frames inside a control envelope.
fn decode_inner(codec: &FrameCodec, mut inner: &[u8]) -> Result<Vec<TagValue>> {
    let mut values = Vec::new();
    while !inner.is_empty() {
        let (Frame { values: mut found, .. }, consumed) = codec
            .parse(inner)?
            .ok_or_else(|| TransportError::relay("truncated frame inside envelope"))?;
        values.append(&mut found);
        inner = &inner[consumed..];
    }
    Ok(values)
}

// ============================================
// RelayedTransport
// ============================================

/// `Transport` tunnelled through the vendor portal.
///
/// # Example
/// ```ignore
/// use rscp_transport::relay::{PortalLogin, RelayOptions, RelayedTransport};
///
/// let login = PortalLogin {
///     user: "user@example.com".into(),
///     password_digest: "5f4dcc3b5aa765d61d8327deb882cf99".into(),
///     identifier: "S10-123456789".into(),
/// };
/// let transport = RelayedTransport::connect(login, RelayOptions::default()).await?;
/// ```
pub struct RelayedTransport<S = MaybeTlsStream<TcpStream>> {
    ws: WebSocketStream<S>,
    protocol: RelayProtocol,
    inbox: VecDeque<Vec<u8>>,
    outbox: VecDeque<Vec<u8>>,
    active: bool,
}

impl RelayedTransport<MaybeTlsStream<TcpStream>> {
    /// Opens the websocket and completes portal registration within
    /// `options.connect_timeout`.
    ///
    /// # Errors
    /// - `ConnectTimeout`: Websocket or registration too slow
    /// - `ConnectFailed`: Websocket handshake failed
    /// - `TransportClosed`/`Relay`: Portal refused or misbehaved
    pub async fn connect(login: PortalLogin, options: RelayOptions) -> Result<Self> {
        let target = options.url.clone();
        let timeout = options.connect_timeout;
        info!("Connecting to portal relay at {}", target);

        tokio::time::timeout(timeout, async {
            let (ws, _response) = connect_async(options.url.as_str()).await.map_err(|e| {
                TransportError::ConnectFailed {
                    target: target.clone(),
                    reason: e.to_string(),
                }
            })?;
            Self::establish(ws, login, &options).await
        })
        .await
        .map_err(|_| TransportError::ConnectTimeout {
            target: target.clone(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        })?
    }
}

impl<S> RelayedTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Runs portal registration on an open websocket.
    ///
    /// # Errors
    /// `TransportClosed` if the portal hangs up or unregisters, `Relay` on
    /// protocol violations.
    pub async fn establish(
        ws: WebSocketStream<S>,
        login: PortalLogin,
        options: &RelayOptions,
    ) -> Result<Self> {
        let mut transport = Self {
            ws,
            protocol: RelayProtocol::new(login, options.time_zone.clone()),
            inbox: VecDeque::new(),
            outbox: VecDeque::new(),
            active: true,
        };
        while !transport.protocol.is_open() {
            transport.pump().await?;
        }
        info!("Portal relay established");
        Ok(transport)
    }

    /// Reads one portal message, handles it and flushes replies.
    async fn pump(&mut self) -> Result<()> {
        self.flush().await?;
        let bytes = self.next_binary().await?;
        for event in self.protocol.handle(&bytes)? {
            match event {
                RelayEvent::Reply(frame) => self.outbox.push_back(frame),
                RelayEvent::Data(data) => self.inbox.push_back(data),
                RelayEvent::Unregistered => {
                    self.active = false;
                    return Err(TransportError::closed("portal unregistered the connection"));
                }
            }
        }
        self.flush().await
    }

    /// Hands every queued frame to the sink exactly once, then flushes.
    async fn flush(&mut self) -> Result<()> {
        if self.outbox.is_empty() {
            return Ok(());
        }
        while let Some(frame) = self.outbox.pop_front() {
            self.ws
                .feed(Message::Binary(frame))
                .await
                .map_err(|e| TransportError::websocket("writing to relay", e))?;
        }
        SinkExt::flush(&mut self.ws)
            .await
            .map_err(|e| TransportError::websocket("flushing relay", e))
    }

    async fn next_binary(&mut self) -> Result<Vec<u8>> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Binary(bytes))) if !bytes.is_empty() => return Ok(bytes),
                Some(Ok(Message::Close(_))) | None => {
                    self.active = false;
                    return Err(TransportError::closed("portal closed the websocket"));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    let err = TransportError::websocket("reading from relay", e);
                    if err.is_closed() {
                        self.active = false;
                    }
                    return Err(err);
                }
            }
        }
    }
}

#[async_trait]
impl<S> Transport for RelayedTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        if !self.active {
            return Err(TransportError::closed("relay closed"));
        }
        let frame = self.protocol.wrap_outbound(bytes)?;
        trace!(inner = bytes.len(), outer = frame.len(), "Sending through relay");
        self.outbox.push_back(frame);
        self.flush().await
    }

    async fn receive(&mut self) -> Result<Vec<u8>> {
        loop {
            if let Some(data) = self.inbox.pop_front() {
                return Ok(data);
            }
            if !self.active {
                return Err(TransportError::closed("relay closed"));
            }
            self.pump().await?;
        }
    }

    async fn close(&mut self) -> Result<()> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        debug!("Closing portal relay");
        match self.ws.close(None).await {
            Ok(()) => Ok(()),
            Err(e) => match TransportError::websocket("closing relay", e) {
                TransportError::TransportClosed { .. } => Ok(()),
                other => Err(other),
            },
        }
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn kind(&self) -> &'static str {
        "relayed"
    }
}

impl<S> std::fmt::Debug for RelayedTransport<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayedTransport")
            .field("control", &self.protocol.control)
            .field("device", &self.protocol.device)
            .field("active", &self.active)
            .field("inbox", &self.inbox.len())
            .finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================
