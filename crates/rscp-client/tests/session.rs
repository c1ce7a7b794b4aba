// ============================================
// File: crates/rscp-client/tests/session.rs
// ============================================
//! Session behaviour against a simulated device on a mock transport.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use rscp_client::{ClientError, KeepaliveOptions, Session, SessionState};
use rscp_core::protocol::{tags, TagPayload, TagValue, TypeTag};
use rscp_core::CoreError;
use rscp_transport::MockTransport;

use common::{connect, options, MockDevice, BATTERY_WATTS, CALL_TIMEOUT, PV_WATTS, RSCP_KEY};

#[tokio::test]
async fn test_authenticate_request_disconnect() {
    let (session, mut device) = connect(options()).await;
    assert_eq!(session.state(), SessionState::Authenticated);
    assert!(session.is_keepalive_running());

    let (reply, ()) = tokio::join!(
        session.request(TagValue::request(tags::EMS_REQ_POWER_PV), CALL_TIMEOUT),
        async {
            let request = device.next_request().await.unwrap();
            assert_eq!(request.len(), 1);
            assert_eq!(request[0].tag, tags::EMS_REQ_POWER_PV);
            device.reply(&[TagValue::new(
                tags::EMS_POWER_PV,
                TagPayload::Int32(PV_WATTS),
            )]);
        }
    );

    let reply = reply.unwrap();
    assert_eq!(reply.tag, tags::EMS_POWER_PV);
    assert_eq!(reply.type_tag(), TypeTag::Int32);
    assert_eq!(reply.as_i64(), Some(i64::from(PV_WATTS)));

    session.disconnect().await;
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(!session.is_keepalive_running());
    assert!(device.peer.is_closed());
}

#[tokio::test]
async fn test_corrupted_trailer_faults_pending_call() {
    let (session, mut device) = connect(options().with_keepalive(None)).await;

    let (result, ()) = tokio::join!(
        session.request(TagValue::request(tags::EMS_REQ_POWER_PV), CALL_TIMEOUT),
        async {
            device.next_request().await.unwrap();
            let wire = device.device.seal_with_bad_trailer(&[TagValue::new(
                tags::EMS_POWER_PV,
                TagPayload::Int32(PV_WATTS),
            )]);
            device.peer.inject(wire);
        }
    );

    let err = result.unwrap_err();
    assert!(matches!(err, ClientError::ConnectionLost { .. }), "{err}");
    assert_eq!(session.state(), SessionState::Faulted);

    let again = session
        .request(TagValue::request(tags::EMS_REQ_POWER_BAT), CALL_TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(again, ClientError::ConnectionLost { .. }));
    assert_eq!(again.to_string(), err.to_string());
}

#[tokio::test]
async fn test_concurrent_calls_are_serialized() {
    let (session, mut device) = connect(options().with_keepalive(None)).await;

    let calls = async {
        tokio::join!(
            session.request(TagValue::request(tags::EMS_REQ_POWER_PV), CALL_TIMEOUT),
            session.request(TagValue::request(tags::EMS_REQ_POWER_BAT), CALL_TIMEOUT),
        )
    };
    let device_side = async {
        let first = device.next_request().await.unwrap();

        // second call stays queued while the first is outstanding
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(device.peer.written().len(), 2);

        device.reply(&common::answer(&first));
        let second = device.next_request().await.unwrap();
        device.reply(&common::answer(&second));
        (first, second)
    };

    let ((pv, battery), (first, second)) = tokio::join!(calls, device_side);

    assert_eq!(first.len(), 1);
    assert_eq!(first[0].tag, tags::EMS_REQ_POWER_PV);
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].tag, tags::EMS_REQ_POWER_BAT);
    assert_eq!(pv.unwrap().as_i64(), Some(i64::from(PV_WATTS)));
    assert_eq!(battery.unwrap().as_i64(), Some(i64::from(BATTERY_WATTS)));
    // auth request plus one chunk per call
    assert_eq!(device.peer.written().len(), 3);
}

#[tokio::test]
async fn test_multi_value_exchange_returns_every_reply() {
    let (session, device) = connect(options().with_keepalive(None)).await;
    let (seen, _log) = mpsc::unbounded_channel();
    let served = tokio::spawn(device.serve(seen));

    let replies = session
        .exchange(
            vec![
                TagValue::request(tags::EMS_REQ_POWER_PV),
                TagValue::request(tags::EMS_REQ_POWER_BAT),
            ],
            CALL_TIMEOUT,
        )
        .await
        .unwrap();

    let tags_seen: Vec<_> = replies.iter().map(|v| v.tag).collect();
    assert_eq!(tags_seen, vec![tags::EMS_POWER_PV, tags::EMS_POWER_BAT]);

    session.disconnect().await;
    served.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_idle_session_probes_once_per_window() {
    let (session, device) = connect(options()).await;
    let (seen, mut log) = mpsc::unbounded_channel();
    let start = tokio::time::Instant::now();
    let served = tokio::spawn(device.serve(seen));

    tokio::time::sleep(Duration::from_secs(95)).await;

    let mut probes = Vec::new();
    while let Ok((tag, at)) = log.try_recv() {
        probes.push((tag, at - start));
    }
    assert_eq!(
        probes,
        vec![
            (tags::INFO_REQ_UTC_TIME, Duration::from_secs(30)),
            (tags::INFO_REQ_UTC_TIME, Duration::from_secs(60)),
            (tags::INFO_REQ_UTC_TIME, Duration::from_secs(90)),
        ]
    );
    assert_eq!(session.state(), SessionState::Authenticated);

    session.disconnect().await;
    served.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_foreground_call_postpones_probe() {
    let (session, device) = connect(options()).await;
    let (seen, mut log) = mpsc::unbounded_channel();
    let start = tokio::time::Instant::now();
    let served = tokio::spawn(device.serve(seen));

    tokio::time::sleep(Duration::from_secs(20)).await;
    session
        .request(TagValue::request(tags::EMS_REQ_POWER_PV), CALL_TIMEOUT)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(29)).await;
    let (tag, at) = log.try_recv().unwrap();
    assert_eq!((tag, at - start), (tags::EMS_REQ_POWER_PV, Duration::from_secs(20)));
    assert!(log.try_recv().is_err());

    tokio::time::sleep(Duration::from_secs(2)).await;
    let (tag, at) = log.try_recv().unwrap();
    assert_eq!((tag, at - start), (tags::INFO_REQ_UTC_TIME, Duration::from_secs(50)));

    session.disconnect().await;
    served.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_custom_probe_tag_and_window() {
    let keepalive = KeepaliveOptions {
        idle_window: Duration::from_secs(10),
        probe_tag: tags::EMS_REQ_POWER_BAT,
    };
    let (session, device) = connect(options().with_keepalive(Some(keepalive))).await;
    let (seen, mut log) = mpsc::unbounded_channel();
    let served = tokio::spawn(device.serve(seen));

    tokio::time::sleep(Duration::from_secs(25)).await;
    let probes: Vec<_> = std::iter::from_fn(|| log.try_recv().ok()).collect();
    assert_eq!(probes.len(), 2);
    assert!(probes.iter().all(|(tag, _)| *tag == tags::EMS_REQ_POWER_BAT));

    session.disconnect().await;
    served.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_repeated_timeouts_fault_session() {
    // the device reads but never answers
    let (session, _device) = connect(options().with_keepalive(None)).await;

    for _ in 0..3 {
        let err = session
            .request(
                TagValue::request(tags::EMS_REQ_POWER_PV),
                Duration::from_secs(1),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::RequestTimeout { timeout_ms: 1000 }), "{err}");
    }
    assert_eq!(session.state(), SessionState::Faulted);

    let err = session
        .request(TagValue::request(tags::EMS_REQ_POWER_PV), CALL_TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::ConnectionLost { .. }));
    assert!(err.to_string().contains("3 request timeouts in a row"), "{err}");
}

#[tokio::test]
async fn test_disconnect_fails_outstanding_call() {
    let (session, mut device) = connect(options().with_keepalive(None)).await;
    let session = Arc::new(session);

    let pending = tokio::spawn({
        let session = Arc::clone(&session);
        async move {
            session
                .request(
                    TagValue::request(tags::EMS_REQ_POWER_PV),
                    Duration::from_secs(30),
                )
                .await
        }
    });

    device.next_request().await.unwrap();
    session.disconnect().await;

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, ClientError::ConnectionLost { .. }), "{err}");
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_device_hangup_faults_session() {
    let (session, mut device) = connect(options().with_keepalive(None)).await;

    let (result, ()) = tokio::join!(
        session.request(TagValue::request(tags::EMS_REQ_POWER_PV), CALL_TIMEOUT),
        async {
            device.next_request().await.unwrap();
            device.peer.close();
        }
    );

    assert!(matches!(result, Err(ClientError::ConnectionLost { .. })));
    assert_eq!(session.state(), SessionState::Faulted);
}

#[tokio::test]
async fn test_access_denied_surfaces_as_error() {
    let (session, mut device) = connect(options().with_keepalive(None)).await;

    let (result, ()) = tokio::join!(
        session.request(TagValue::request(tags::EMS_REQ_POWER_PV), CALL_TIMEOUT),
        async {
            device.next_request().await.unwrap();
            device.reply(&[TagValue::new(tags::EMS_POWER_PV, TagPayload::Error(2))]);
        }
    );

    assert!(matches!(
        result,
        Err(ClientError::AccessDenied { tag }) if tag == tags::EMS_POWER_PV
    ));
    // the connection itself is fine
    assert_eq!(session.state(), SessionState::Authenticated);
}

#[tokio::test]
async fn test_rejected_login_closes_transport() {
    let (transport, peer) = MockTransport::pair();
    let mut device = MockDevice::new(peer, RSCP_KEY);

    let (result, ()) = tokio::join!(
        Session::connect_with(transport, options()),
        device.accept_login(0)
    );

    let err = result.unwrap_err();
    assert!(matches!(err, ClientError::AuthenticationFailed { .. }), "{err}");
    assert!(device.peer.is_closed());
}

#[tokio::test]
async fn test_wrong_key_is_crypto_desync() {
    let (transport, peer) = MockTransport::pair();
    let mut device = MockDevice::new(peer, "some-other-passphrase");

    // the device cannot read the request; it answers blindly
    device.reply(&[TagValue::new(
        tags::RSCP_AUTHENTICATION,
        TagPayload::UChar8(10),
    )]);
    let err = Session::connect_with(transport, options()).await.unwrap_err();

    assert!(
        matches!(err, ClientError::Core(CoreError::CryptoDesync { .. })),
        "{err}"
    );
    assert!(device.peer.is_closed());
}

#[tokio::test]
async fn test_reconnect_with_fresh_transport() {
    let (session, device) = connect(options().with_keepalive(None)).await;
    device.peer.close();

    let err = session
        .request(TagValue::request(tags::EMS_REQ_POWER_PV), CALL_TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::ConnectionLost { .. }));
    assert_eq!(session.state(), SessionState::Faulted);

    let (transport, peer) = MockTransport::pair();
    let mut device = MockDevice::new(peer, RSCP_KEY);
    let (result, ()) = tokio::join!(session.reconnect_with(transport), device.accept_login(10));
    result.unwrap();
    assert_eq!(session.state(), SessionState::Authenticated);

    let (seen, _log) = mpsc::unbounded_channel();
    let served = tokio::spawn(device.serve(seen));
    let reply = session
        .request(TagValue::request(tags::EMS_REQ_POWER_BAT), CALL_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(reply.as_i64(), Some(i64::from(BATTERY_WATTS)));

    session.disconnect().await;
    served.await.unwrap();
}
