//! Stream Client Integration Tests
//!
//! Drives a stream client against the in-memory transport: subscription
//! replay, reconnection budget, cancellation and frame handling. Timers
//! run on a paused clock so retry delays elapse instantly.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_test::assert_ok;

use price_stream_client::{
    CloseReason, ConnectOutcome, ConnectionState, InboundMessage, MemoryConnector, MemoryServer,
    OutboundFrame, ReconnectConfig, RetryPhase, StreamClient, StreamClientConfig, StreamError,
    StreamEvent,
};

const ENDPOINT: &str = "ws://feed.test/ws/prices";

struct Harness {
    client: StreamClient,
    connector: MemoryConnector,
    server: MemoryServer,
    events: mpsc::Receiver<StreamEvent>,
}

fn setup(config: StreamClientConfig) -> Harness {
    setup_with_buffer(config, 64)
}

fn setup_with_buffer(config: StreamClientConfig, buffer: usize) -> Harness {
    let (connector, server) = MemoryConnector::pair();
    let (events_tx, events) = mpsc::channel(buffer);
    let client = StreamClient::spawn(config, Arc::new(connector.clone()), events_tx);

    Harness {
        client,
        connector,
        server,
        events,
    }
}

async fn next_event(events: &mut mpsc::Receiver<StreamEvent>) -> StreamEvent {
    timeout(Duration::from_secs(60), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

fn symbols(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

fn open_failed(message: &str) -> [StreamEvent; 2] {
    let text = format!("connection failed: {message}");
    [
        StreamEvent::Error(StreamError::OpenFailed(text.clone())),
        StreamEvent::Closed {
            reason: CloseReason::OpenFailed(text),
        },
    ]
}

fn price_update_json(symbol: &str, price: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "price_update",
        "data": { symbol: price },
        "timestamp": "2024-01-15T14:30:00Z",
    })
}

// =============================================================================
// Subscription replay
// =============================================================================

#[tokio::test(start_paused = true)]
async fn subscribe_while_disconnected_sends_one_frame_on_connect() {
    let mut h = setup(StreamClientConfig::new(ENDPOINT));

    assert_ok!(h.client.subscribe(["AAPL"]));
    assert_ok!(h.client.connect());

    assert_eq!(next_event(&mut h.events).await, StreamEvent::Opened);

    let mut peer = h.server.accept().await.unwrap();
    assert_eq!(
        peer.recv_frame().await.unwrap(),
        OutboundFrame::subscribe(symbols(&["AAPL"]))
    );
    assert!(peer.try_recv().is_none());
    assert_eq!(h.connector.endpoints(), vec![ENDPOINT]);
}

#[tokio::test(start_paused = true)]
async fn empty_registry_sends_nothing_on_connect() {
    let mut h = setup(StreamClientConfig::new(ENDPOINT));

    h.client.connect().unwrap();
    assert_eq!(next_event(&mut h.events).await, StreamEvent::Opened);

    let mut peer = h.server.accept().await.unwrap();
    assert!(peer.try_recv().is_none());
    assert!(h.client.status().is_connected());
}

#[tokio::test(start_paused = true)]
async fn subscribe_while_connected_sends_incremental_frame() {
    let mut h = setup(StreamClientConfig::new(ENDPOINT));

    h.client.subscribe(["AAPL"]).unwrap();
    h.client.connect().unwrap();
    assert_eq!(next_event(&mut h.events).await, StreamEvent::Opened);
    let mut peer = h.server.accept().await.unwrap();
    let _replay = peer.recv_frame().await.unwrap();

    h.client.subscribe(["MSFT", "MSFT", "TSLA"]).unwrap();
    assert_eq!(
        peer.recv_frame().await.unwrap(),
        OutboundFrame::subscribe(symbols(&["MSFT", "TSLA"]))
    );

    h.client.unsubscribe(["AAPL"]).unwrap();
    assert_eq!(
        peer.recv_frame().await.unwrap(),
        OutboundFrame::unsubscribe(symbols(&["AAPL"]))
    );

    assert_eq!(
        h.client.subscriptions().await.unwrap(),
        symbols(&["MSFT", "TSLA"])
    );
}

#[tokio::test(start_paused = true)]
async fn empty_subscribe_sends_no_frame() {
    let mut h = setup(StreamClientConfig::new(ENDPOINT));

    h.client.connect().unwrap();
    assert_eq!(next_event(&mut h.events).await, StreamEvent::Opened);
    let mut peer = h.server.accept().await.unwrap();

    h.client.subscribe(Vec::<String>::new()).unwrap();
    h.client.unsubscribe(Vec::<String>::new()).unwrap();
    let _ = h.client.subscriptions().await.unwrap();

    assert!(peer.try_recv().is_none());
}

#[tokio::test(start_paused = true)]
async fn changes_while_disconnected_are_replayed_after_reconnect() {
    let mut h = setup(StreamClientConfig::new(ENDPOINT));

    h.client.subscribe(["AAPL"]).unwrap();
    h.client.connect().unwrap();
    assert_eq!(next_event(&mut h.events).await, StreamEvent::Opened);
    let mut first = h.server.accept().await.unwrap();
    let _replay = first.recv_frame().await.unwrap();

    first.close();
    assert_eq!(
        next_event(&mut h.events).await,
        StreamEvent::Closed {
            reason: CloseReason::ServerClosed
        }
    );
    assert_eq!(
        next_event(&mut h.events).await,
        StreamEvent::Reconnecting {
            attempt: 1,
            delay: Duration::from_millis(3000)
        }
    );

    h.client.subscribe(["GOOGL", "MSFT"]).unwrap();
    h.client.unsubscribe(["MSFT"]).unwrap();

    assert_eq!(next_event(&mut h.events).await, StreamEvent::Opened);
    let mut second = h.server.accept().await.unwrap();
    assert_eq!(
        second.recv_frame().await.unwrap(),
        OutboundFrame::subscribe(symbols(&["AAPL", "GOOGL"]))
    );
    assert!(second.try_recv().is_none());

    // Nothing was written to the dead connection.
    assert!(first.recv().await.is_none());
    assert_eq!(h.connector.attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn unsubscribe_while_disconnected_only_updates_registry() {
    let h = setup(StreamClientConfig::new(ENDPOINT));

    h.client.subscribe(["TSLA", "AAPL", "MSFT"]).unwrap();
    h.client.unsubscribe(["MSFT", "NFLX"]).unwrap();

    assert_eq!(
        h.client.subscriptions().await.unwrap(),
        symbols(&["AAPL", "TSLA"])
    );
    assert_eq!(h.connector.attempts(), 0);
}

// =============================================================================
// Reconnection
// =============================================================================

#[tokio::test(start_paused = true)]
async fn gives_up_after_max_attempts() {
    let mut h = setup(
        StreamClientConfig::new(ENDPOINT)
            .with_reconnect_attempts(2)
            .with_reconnect_interval(Duration::ZERO),
    );
    h.connector
        .set_fallback(ConnectOutcome::Refuse("down".to_string()));

    h.client.connect().unwrap();

    let mut expected = Vec::new();
    for attempt in 1..=2 {
        expected.extend(open_failed("down"));
        expected.push(StreamEvent::Reconnecting {
            attempt,
            delay: Duration::ZERO,
        });
    }
    expected.extend(open_failed("down"));
    expected.push(StreamEvent::Error(StreamError::RetryBudgetExhausted {
        attempts: 2,
    }));

    for want in expected {
        assert_eq!(next_event(&mut h.events).await, want);
    }

    let status = h.client.status();
    assert_eq!(status.state, ConnectionState::Disconnected);
    assert_eq!(status.retry, RetryPhase::Exhausted);
    assert!(status.is_terminal());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.connector.attempts(), 3);
    assert!(h.events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn zero_attempts_never_retries() {
    let mut h = setup(StreamClientConfig::new(ENDPOINT).with_reconnect_attempts(0));
    h.connector
        .set_fallback(ConnectOutcome::Refuse("down".to_string()));

    h.client.connect().unwrap();

    for want in open_failed("down") {
        assert_eq!(next_event(&mut h.events).await, want);
    }
    assert_eq!(
        next_event(&mut h.events).await,
        StreamEvent::Error(StreamError::RetryBudgetExhausted { attempts: 0 })
    );
    assert_eq!(h.connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn nan_jitter_still_schedules_retries() {
    let mut h = setup(StreamClientConfig::new(ENDPOINT).with_reconnect(ReconnectConfig {
        jitter_factor: f64::NAN,
        ..ReconnectConfig::fixed(1, Duration::from_millis(100))
    }));
    h.connector
        .set_fallback(ConnectOutcome::Refuse("down".to_string()));

    h.client.connect().unwrap();

    for want in open_failed("down") {
        assert_eq!(next_event(&mut h.events).await, want);
    }
    assert_eq!(
        next_event(&mut h.events).await,
        StreamEvent::Reconnecting {
            attempt: 1,
            delay: Duration::from_millis(100),
        }
    );
    for want in open_failed("down") {
        assert_eq!(next_event(&mut h.events).await, want);
    }
    assert_eq!(
        next_event(&mut h.events).await,
        StreamEvent::Error(StreamError::RetryBudgetExhausted { attempts: 1 })
    );

    assert_eq!(h.connector.attempts(), 2);
    assert!(h.client.status().is_terminal());
    assert_ok!(h.client.connect());
}

#[tokio::test(start_paused = true)]
async fn attempt_count_resets_after_successful_connect() {
    let mut h = setup(
        StreamClientConfig::new(ENDPOINT)
            .with_reconnect_attempts(2)
            .with_reconnect_interval(Duration::from_millis(10)),
    );
    h.connector.script([
        ConnectOutcome::Accept,
        ConnectOutcome::Refuse("blip".to_string()),
        ConnectOutcome::Accept,
    ]);

    h.client.connect().unwrap();
    assert_eq!(next_event(&mut h.events).await, StreamEvent::Opened);
    h.server.accept().await.unwrap().close();

    assert!(matches!(
        next_event(&mut h.events).await,
        StreamEvent::Closed {
            reason: CloseReason::ServerClosed
        }
    ));
    assert!(matches!(
        next_event(&mut h.events).await,
        StreamEvent::Reconnecting { attempt: 1, .. }
    ));
    for want in open_failed("blip") {
        assert_eq!(next_event(&mut h.events).await, want);
    }
    assert!(matches!(
        next_event(&mut h.events).await,
        StreamEvent::Reconnecting { attempt: 2, .. }
    ));

    assert_eq!(next_event(&mut h.events).await, StreamEvent::Opened);
    assert_eq!(h.client.status().reconnect_attempt, 0);

    h.server.accept().await.unwrap().close();
    assert!(matches!(
        next_event(&mut h.events).await,
        StreamEvent::Closed { .. }
    ));
    assert!(matches!(
        next_event(&mut h.events).await,
        StreamEvent::Reconnecting { attempt: 1, .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn explicit_connect_after_give_up_restores_budget() {
    let mut h = setup(
        StreamClientConfig::new(ENDPOINT)
            .with_reconnect_attempts(1)
            .with_reconnect_interval(Duration::ZERO),
    );
    h.connector
        .set_fallback(ConnectOutcome::Refuse("down".to_string()));

    h.client.connect().unwrap();
    loop {
        if let StreamEvent::Error(StreamError::RetryBudgetExhausted { attempts }) =
            next_event(&mut h.events).await
        {
            assert_eq!(attempts, 1);
            break;
        }
    }
    assert_eq!(h.connector.attempts(), 2);

    h.connector.set_fallback(ConnectOutcome::Accept);
    h.client.connect().unwrap();

    assert_eq!(next_event(&mut h.events).await, StreamEvent::Opened);
    let status = h.client.status();
    assert!(status.is_connected());
    assert_eq!(status.reconnect_attempt, 0);
    assert_eq!(status.retry, RetryPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn stalled_handshake_times_out() {
    let mut h = setup(
        StreamClientConfig::new(ENDPOINT)
            .with_reconnect_attempts(0)
            .with_connect_timeout(Duration::from_secs(1)),
    );
    h.connector.script([ConnectOutcome::Stall]);

    h.client.connect().unwrap();

    assert_eq!(
        next_event(&mut h.events).await,
        StreamEvent::Error(StreamError::OpenFailed(
            "connection timed out after 1s".to_string()
        ))
    );
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_pending_retry() {
    let mut h = setup(StreamClientConfig::new(ENDPOINT));

    h.client.connect().unwrap();
    assert_eq!(next_event(&mut h.events).await, StreamEvent::Opened);
    h.server.accept().await.unwrap().close();

    assert!(matches!(
        next_event(&mut h.events).await,
        StreamEvent::Closed { .. }
    ));
    assert!(matches!(
        next_event(&mut h.events).await,
        StreamEvent::Reconnecting { attempt: 1, .. }
    ));
    assert!(!h.client.status().is_terminal());

    h.client.disconnect().unwrap();
    assert_eq!(
        next_event(&mut h.events).await,
        StreamEvent::Closed {
            reason: CloseReason::ClientRequested
        }
    );

    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(h.connector.attempts(), 1);
    assert!(h.events.try_recv().is_err());
    let status = h.client.status();
    assert_eq!(status.state, ConnectionState::Disconnected);
    assert_eq!(status.retry, RetryPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn disconnect_during_handshake_abandons_attempt() {
    let mut h = setup(StreamClientConfig::new(ENDPOINT));
    h.connector.script([ConnectOutcome::Stall]);

    h.client.connect().unwrap();
    let mut status = h.client.status_receiver();
    status
        .wait_for(|s| s.state == ConnectionState::Connecting)
        .await
        .unwrap();

    h.client.disconnect().unwrap();
    assert_eq!(
        next_event(&mut h.events).await,
        StreamEvent::Closed {
            reason: CloseReason::ClientRequested
        }
    );

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.connector.attempts(), 1);
    assert!(h.events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn disconnect_when_idle_emits_nothing() {
    let mut h = setup(StreamClientConfig::new(ENDPOINT));

    h.client.disconnect().unwrap();
    let _ = h.client.subscriptions().await.unwrap();

    assert!(h.events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn disconnect_keeps_subscriptions() {
    let mut h = setup(StreamClientConfig::new(ENDPOINT));

    h.client.subscribe(["AAPL"]).unwrap();
    h.client.connect().unwrap();
    assert_eq!(next_event(&mut h.events).await, StreamEvent::Opened);

    h.client.disconnect().unwrap();
    assert!(matches!(
        next_event(&mut h.events).await,
        StreamEvent::Closed { .. }
    ));
    assert_eq!(h.client.subscriptions().await.unwrap(), symbols(&["AAPL"]));

    h.client.connect().unwrap();
    assert_eq!(next_event(&mut h.events).await, StreamEvent::Opened);
    let _first = h.server.accept().await.unwrap();
    let mut second = h.server.accept().await.unwrap();
    assert_eq!(
        second.recv_frame().await.unwrap(),
        OutboundFrame::subscribe(symbols(&["AAPL"]))
    );
}

#[tokio::test(start_paused = true)]
async fn connect_is_idempotent() {
    let mut h = setup(StreamClientConfig::new(ENDPOINT));

    h.client.connect().unwrap();
    h.client.connect().unwrap();
    assert_eq!(next_event(&mut h.events).await, StreamEvent::Opened);
    h.client.connect().unwrap();

    let _ = h.client.subscriptions().await.unwrap();
    assert_eq!(h.connector.attempts(), 1);
    assert!(h.events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn shutdown_closes_connection() {
    let mut h = setup(StreamClientConfig::new(ENDPOINT));

    h.client.connect().unwrap();
    assert_eq!(next_event(&mut h.events).await, StreamEvent::Opened);
    let mut peer = h.server.accept().await.unwrap();

    h.client.shutdown().await;

    assert!(peer.recv().await.is_none());
    assert_eq!(
        h.events.recv().await,
        Some(StreamEvent::Closed {
            reason: CloseReason::ClientRequested
        })
    );
    assert_eq!(h.events.recv().await, None);
}

// =============================================================================
// Frames
// =============================================================================

#[tokio::test(start_paused = true)]
async fn send_while_disconnected_reports_error() {
    let mut h = setup(StreamClientConfig::new(ENDPOINT));

    h.client
        .send(&serde_json::json!({"type": "ping"}))
        .unwrap();

    assert_eq!(
        next_event(&mut h.events).await,
        StreamEvent::Error(StreamError::SendWhileDisconnected)
    );
    assert_eq!(h.connector.attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn send_while_connected_writes_raw_frame() {
    let mut h = setup(StreamClientConfig::new(ENDPOINT));

    h.client.connect().unwrap();
    assert_eq!(next_event(&mut h.events).await, StreamEvent::Opened);
    let mut peer = h.server.accept().await.unwrap();

    h.client
        .send(&serde_json::json!({"type": "ping"}))
        .unwrap();

    assert_eq!(peer.recv().await.unwrap(), r#"{"type":"ping"}"#);
}

#[tokio::test(start_paused = true)]
async fn malformed_frames_are_skipped() {
    let mut h = setup(StreamClientConfig::new(ENDPOINT));

    h.client.connect().unwrap();
    assert_eq!(next_event(&mut h.events).await, StreamEvent::Opened);
    let peer = h.server.accept().await.unwrap();

    assert!(peer.send_text("garbage"));
    assert!(peer.send_text(r#"{"type":"mystery","data":{}}"#));
    assert!(peer.send_text(r#"{"data":{"AAPL":1}}"#));
    assert!(peer.send_text(r#"{"type":"price_update","data":{"AAPL":"abc"}}"#));
    assert!(peer.send_json(&price_update_json("AAPL", "175.23")));

    match next_event(&mut h.events).await {
        StreamEvent::Message(InboundMessage::PriceUpdate { prices, timestamp }) => {
            assert_eq!(prices["AAPL"], Decimal::new(17523, 2));
            assert!(timestamp.is_some());
        }
        other => panic!("expected price update, got {other:?}"),
    }

    let status = h.client.status();
    assert!(status.is_connected());
    assert_eq!(status.reconnect_attempt, 0);
}

#[tokio::test(start_paused = true)]
async fn acknowledgements_are_delivered() {
    let mut h = setup(StreamClientConfig::new(ENDPOINT));

    h.client.subscribe(["AAPL"]).unwrap();
    h.client.connect().unwrap();
    assert_eq!(next_event(&mut h.events).await, StreamEvent::Opened);
    let mut peer = h.server.accept().await.unwrap();
    let frame = peer.recv_frame().await.unwrap();

    assert!(peer.send_json(&serde_json::json!({
        "type": "subscription_confirmed",
        "symbols": frame.symbols,
    })));

    assert_eq!(
        next_event(&mut h.events).await,
        StreamEvent::Message(InboundMessage::SubscriptionAck {
            symbols: symbols(&["AAPL"])
        })
    );
}

#[tokio::test(start_paused = true)]
async fn updates_are_delivered_in_order_under_back_pressure() {
    let mut h = setup_with_buffer(StreamClientConfig::new(ENDPOINT), 4);

    h.client.connect().unwrap();
    assert_eq!(next_event(&mut h.events).await, StreamEvent::Opened);
    let peer = h.server.accept().await.unwrap();

    for i in 0..100 {
        assert!(peer.send_json(&price_update_json("AAPL", &i.to_string())));
    }

    for i in 0..100_i64 {
        let want = StreamEvent::Message(InboundMessage::PriceUpdate {
            prices: BTreeMap::from([("AAPL".to_string(), Decimal::from(i))]),
            timestamp: Some("2024-01-15T14:30:00Z".parse().unwrap()),
        });
        assert_eq!(next_event(&mut h.events).await, want);
    }
}
