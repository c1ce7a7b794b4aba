// ============================================
// File: crates/rscp-client/tests/common/mod.rs
// ============================================
//! Simulated E3/DC device shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use rscp_common::{RscpTimestamp, TagId};
use rscp_core::crypto::{CipherRing, RscpKey, BLOCK_SIZE};
use rscp_core::protocol::frame::FRAME_HEADER_SIZE;
use rscp_core::protocol::{
    tags, Frame, FrameCodec, FrameDecoder, TagCodec, TagPayload, TagValue,
};
use rscp_client::{Session, SessionOptions};
use rscp_transport::{MockPeer, MockTransport};

pub const USER: &str = "installer";
pub const PASSWORD: &str = "portal-password";
pub const RSCP_KEY: &str = "rscp-passphrase";

pub const PV_WATTS: i32 = 4200;
pub const BATTERY_WATTS: i32 = -1500;

pub fn options() -> SessionOptions {
    SessionOptions::new(USER, PASSWORD, RSCP_KEY)
}

/// Device-side codec and cipher state for one connection.
pub struct Device {
    codec: FrameCodec,
    decoder: FrameDecoder,
    ring: CipherRing,
    frames: VecDeque<Frame>,
}

impl Device {
    pub fn new(passphrase: &str) -> Self {
        let codec = FrameCodec::new(TagCodec::builtin()).with_alignment(BLOCK_SIZE);
        let decoder = codec.decoder();
        let key = RscpKey::from_passphrase(passphrase).unwrap();
        Self {
            codec,
            decoder,
            ring: CipherRing::new(&key),
            frames: VecDeque::new(),
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        let plain = self.ring.decrypt(bytes);
        let frames = self.decoder.push(&plain).unwrap();
        self.frames.extend(frames);
    }

    pub fn next_frame(&mut self) -> Option<Frame> {
        self.frames.pop_front()
    }

    pub fn seal(&mut self, values: &[TagValue]) -> Vec<u8> {
        let plain = self.codec.wrap(values).unwrap();
        self.ring.encrypt(&plain)
    }

    /// Seals a frame whose CRC trailer does not match its contents.
    pub fn seal_with_bad_trailer(&mut self, values: &[TagValue]) -> Vec<u8> {
        let mut plain = self.codec.wrap(values).unwrap();
        let data_len = usize::from(u16::from_le_bytes([plain[16], plain[17]]));
        plain[FRAME_HEADER_SIZE + data_len] ^= 0xFF;
        self.ring.encrypt(&plain)
    }
}

/// Canned answers of the simulated device.
pub fn answer(request: &[TagValue]) -> Vec<TagValue> {
    request
        .iter()
        .map(|value| match value.tag {
            tags::RSCP_REQ_AUTHENTICATION => {
                TagValue::new(tags::RSCP_AUTHENTICATION, TagPayload::UChar8(10))
            }
            tags::EMS_REQ_POWER_PV => {
                TagValue::new(tags::EMS_POWER_PV, TagPayload::Int32(PV_WATTS))
            }
            tags::EMS_REQ_POWER_BAT => {
                TagValue::new(tags::EMS_POWER_BAT, TagPayload::Int32(BATTERY_WATTS))
            }
            tags::INFO_REQ_UTC_TIME => TagValue::new(
                tags::INFO_UTC_TIME,
                TagPayload::Timestamp(RscpTimestamp::now()),
            ),
            // unknown tag
            other => TagValue::new(other.response(), TagPayload::Error(7)),
        })
        .collect()
}

/// A device speaking to the session through a `MockTransport`.
pub struct MockDevice {
    pub peer: MockPeer,
    pub device: Device,
}

impl MockDevice {
    pub fn new(peer: MockPeer, passphrase: &str) -> Self {
        Self {
            peer,
            device: Device::new(passphrase),
        }
    }

    /// Next request frame, or `None` once the session hung up.
    pub async fn next_request(&mut self) -> Option<Vec<TagValue>> {
        loop {
            if let Some(frame) = self.device.next_frame() {
                return Some(frame.values);
            }
            let chunk = self.peer.recv().await?;
            self.device.feed(&chunk);
        }
    }

    pub fn reply(&mut self, values: &[TagValue]) {
        let wire = self.device.seal(values);
        self.peer.inject(wire);
    }

    /// Answers the login request with the given level.
    pub async fn accept_login(&mut self, level: u8) {
        let request = self.next_request().await.unwrap();
        assert_eq!(request[0].tag, tags::RSCP_REQ_AUTHENTICATION);
        self.reply(&[TagValue::new(
            tags::RSCP_AUTHENTICATION,
            TagPayload::UChar8(level),
        )]);
    }

    /// Answers every request until the session hangs up, logging when each
    /// request tag was seen.
    pub async fn serve(mut self, seen: mpsc::UnboundedSender<(TagId, Instant)>) {
        while let Some(request) = self.next_request().await {
            for value in &request {
                let _ = seen.send((value.tag, Instant::now()));
            }
            let reply = answer(&request);
            self.reply(&reply);
        }
    }
}

/// Authenticated session over a mock transport.
pub async fn connect(options: SessionOptions) -> (Session, MockDevice) {
    let (transport, peer) = MockTransport::pair();
    let mut device = MockDevice::new(peer, RSCP_KEY);
    let (session, ()) = tokio::join!(
        Session::connect_with(transport, options),
        device.accept_login(10)
    );
    (session.unwrap(), device)
}

pub const CALL_TIMEOUT: Duration = Duration::from_secs(5);
