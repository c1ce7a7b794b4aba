// ============================================
// File: crates/rscp-client/src/handshake.rs
// ============================================
//! # Authentication Handshake
//!
//! ## Creation Reason
//! The device accepts nothing but an authentication request until the
//! user is logged in, so the session runs this exchange on the fresh
//! channel before the dispatcher takes over the transport.
//!
//! ## Handshake Flow
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      authenticate()                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  1. Seal RSCP_REQ_AUTHENTICATION { USER, PASSWORD }          │
//! │     (initial IV, key from the RSCP passphrase)               │
//! │     │                                                        │
//! │     ▼                                                        │
//! │  2. Read frames until RSCP_AUTHENTICATION arrives            │
//! │     │                                                        │
//! │     ▼                                                        │
//! │  3. Error value or level 0 → AuthenticationFailed            │
//! │     level > 0             → AuthLevel                        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Error Handling
//! - No reply within the auth timeout: `AuthenticationFailed`
//! - Wrong RSCP key: the device's reply does not decrypt, so the failure
//!   surfaces as `CryptoDesync` (or the device hangs up)
//!
//! ## ⚠️ Important Note for Next Developer
//! - Frames that are not the auth reply are dropped here; the device
//!   does not push data before login
//!
//! ## Last Modified
//! v0.1.0 - Initial handshake

use std::time::Duration;

use tracing::{debug, info, warn};

use rscp_common::{AuthLevel, Secret};
use rscp_core::protocol::{tags, TagValue};
use rscp_core::SecureChannel;
use rscp_transport::Transport;

use crate::error::{ClientError, Result};

/// Builds the authentication request.
#[must_use]
pub fn authentication_request(username: &str, password: &Secret) -> TagValue {
    TagValue::container(
        tags::RSCP_REQ_AUTHENTICATION,
        vec![
            TagValue::string(tags::RSCP_AUTHENTICATION_USER, username),
            TagValue::string(tags::RSCP_AUTHENTICATION_PASSWORD, password.expose()),
        ],
    )
}

/// Interprets an `RSCP_AUTHENTICATION` reply.
///
/// # Errors
/// `AuthenticationFailed` for an error value, a missing level or level 0.
pub fn evaluate_reply(reply: &TagValue) -> Result<AuthLevel> {
    if let Some(code) = reply.error_code() {
        return Err(ClientError::authentication_failed(format!(
            "device answered with error {code:?}"
        )));
    }

    let level = reply
        .as_i64()
        .and_then(|v| u8::try_from(v).ok())
        .map(AuthLevel)
        .ok_or_else(|| ClientError::authentication_failed("reply carries no auth level"))?;

    if !level.is_authenticated() {
        return Err(ClientError::authentication_failed("device granted no access"));
    }
    Ok(level)
}

/// Logs in on a fresh channel.
///
/// # Errors
/// - `AuthenticationFailed`: Rejected, or no reply within `timeout`
/// - `Transport` / `Core`: The connection failed underneath
pub async fn authenticate<T>(
    transport: &mut T,
    channel: &mut SecureChannel,
    username: &str,
    password: &Secret,
    timeout: Duration,
) -> Result<AuthLevel>
where
    T: Transport + ?Sized,
{
    debug!(user = %username, "Sending authentication request");

    let request = channel.seal(&[authentication_request(username, password)])?;
    transport.send(&request).await?;

    let reply = tokio::time::timeout(timeout, read_reply(transport, channel))
        .await
        .map_err(|_| {
            ClientError::authentication_failed(format!(
                "no reply within {}ms",
                timeout.as_millis()
            ))
        })??;

    match evaluate_reply(&reply) {
        Ok(level) => {
            info!(user = %username, level = %level, "Authenticated");
            Ok(level)
        }
        Err(e) => {
            warn!(user = %username, error = %e, "Authentication rejected");
            Err(e)
        }
    }
}

async fn read_reply<T>(transport: &mut T, channel: &mut SecureChannel) -> Result<TagValue>
where
    T: Transport + ?Sized,
{
    loop {
        let bytes = transport.receive().await?;
        for frame in channel.open(&bytes)? {
            if let Some(reply) = frame
                .values
                .into_iter()
                .find(|v| v.tag == tags::RSCP_AUTHENTICATION)
            {
                return Ok(reply);
            }
            debug!("Dropping frame received before authentication");
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use rscp_core::crypto::RscpKey;
    use rscp_core::protocol::{TagCodec, TagPayload};
    use rscp_transport::MockTransport;

    fn channel() -> SecureChannel {
        SecureChannel::new(&RscpKey::from_passphrase("rscp-key").unwrap(), TagCodec::builtin())
    }

    #[test]
    fn test_request_layout() {
        let request = authentication_request("user", &Secret::new("pw"));
        assert_eq!(request.tag, tags::RSCP_REQ_AUTHENTICATION);
        assert_eq!(
            request.find(tags::RSCP_AUTHENTICATION_USER).and_then(TagValue::as_str),
            Some("user")
        );
        assert_eq!(
            request.find(tags::RSCP_AUTHENTICATION_PASSWORD).and_then(TagValue::as_str),
            Some("pw")
        );
    }

    #[test]
    fn test_evaluate_reply() {
        let granted = TagValue::new(tags::RSCP_AUTHENTICATION, TagPayload::UChar8(10));
        assert_eq!(evaluate_reply(&granted).unwrap(), AuthLevel(10));

        let zero = TagValue::new(tags::RSCP_AUTHENTICATION, TagPayload::UChar8(0));
        assert!(matches!(
            evaluate_reply(&zero),
            Err(ClientError::AuthenticationFailed { .. })
        ));

        let error = TagValue::new(tags::RSCP_AUTHENTICATION, TagPayload::Error(2));
        let err = evaluate_reply(&error).unwrap_err();
        assert!(err.to_string().contains("AccessDenied"));
    }

    #[tokio::test]
    async fn test_authenticate_against_device() {
        let (mut transport, peer) = MockTransport::pair();
        let mut client = channel();

        let device = tokio::spawn(async move {
            let mut device = channel();
            let request = peer.recv().await.unwrap();
            let frames = device.open(&request).unwrap();
            assert_eq!(frames[0].values[0].tag, tags::RSCP_REQ_AUTHENTICATION);

            let reply = device
                .seal(&[TagValue::new(tags::RSCP_AUTHENTICATION, TagPayload::UChar8(10))])
                .unwrap();
            peer.inject(reply);
        });

        let level = authenticate(
            &mut transport,
            &mut client,
            "user",
            &Secret::new("pw"),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(level, AuthLevel(10));
        device.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_device_times_out() {
        let (mut transport, _peer) = MockTransport::pair();
        let mut client = channel();

        let err = authenticate(
            &mut transport,
            &mut client,
            "user",
            &Secret::new("pw"),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ClientError::AuthenticationFailed { .. }));
        assert!(err.to_string().contains("5000ms"));
    }
}
