//! End-to-end WebSocket delivery: bus event to bridge to hub to socket.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use clubpulse_api::hub::bridge;
use clubpulse_core::channels::{facility_topic, EVENT_SLOT_RELEASED};
use clubpulse_core::clock::SystemClock;
use clubpulse_core::roles::ROLE_MEMBER;
use clubpulse_core::slot::SlotRange;
use clubpulse_core::types::DbId;
use clubpulse_events::{BusEvent, EventPublisher};
use common::{build_test_app, TestApp, OTHER_TENANT, TENANT};
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn serve(app: &TestApp) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app.router.clone();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("ws://{addr}/api/v1/ws")
}

fn start_bridge(app: &TestApp) {
    tokio::spawn(bridge::run(
        app.kv.clone(),
        app.state.hub.clone(),
        Arc::new(SystemClock),
        app.shutdown.child_token(),
    ));
}

async fn wait_for_topics(app: &TestApp, expected: usize) {
    for _ in 0..200 {
        let stats = app.state.hub.stats().await.unwrap();
        if stats.topics >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("hub never registered {expected} topic(s)");
}

/// Publish a throwaway event for another tenant until the bridge is
/// listening, so the real event is not lost to a late subscription.
async fn wait_for_bridge(publisher: &EventPublisher) {
    let warmup = slot_event(OTHER_TENANT, DbId::now_v7());
    for _ in 0..200 {
        if publisher.publish(&warmup).await.unwrap_or(0) > 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("bridge never subscribed");
}

fn slot_event(tenant: &str, facility_id: DbId) -> BusEvent {
    let start = Utc.with_ymd_and_hms(2030, 3, 2, 9, 0, 0).unwrap();
    let range = SlotRange::new(start, start + chrono::Duration::hours(1)).unwrap();
    BusEvent::new(EVENT_SLOT_RELEASED, tenant, facility_id, range, Utc::now())
}

async fn next_frame(socket: &mut Socket) -> serde_json::Value {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn subscriber_receives_facility_events() {
    let app = build_test_app();
    let url = serve(&app).await;
    start_bridge(&app);
    let publisher = EventPublisher::new(app.kv.clone());
    wait_for_bridge(&publisher).await;

    let user = app.store.add_user(TENANT, "alice@club.test");
    let token = app.token(user.id, ROLE_MEMBER);
    let (mut socket, _) = connect_async(format!("{url}?token={token}")).await.unwrap();

    let facility_id = DbId::now_v7();
    let subscribe = serde_json::json!({
        "action": "subscribe",
        "targets": [facility_topic(facility_id)],
    });
    socket
        .send(Message::Text(subscribe.to_string()))
        .await
        .unwrap();
    wait_for_topics(&app, 1).await;

    publisher
        .publish(&slot_event(TENANT, facility_id))
        .await
        .unwrap();

    let frame = next_frame(&mut socket).await;
    assert_eq!(frame["type"], EVENT_SLOT_RELEASED);
    assert_eq!(frame["payload"]["facility_id"], facility_id.to_string());
    assert_eq!(frame["payload"]["tenant_id"], TENANT);
}

#[tokio::test]
async fn events_of_another_tenant_are_not_delivered() {
    let app = build_test_app();
    let url = serve(&app).await;
    start_bridge(&app);
    let publisher = EventPublisher::new(app.kv.clone());
    wait_for_bridge(&publisher).await;

    let user = app.store.add_user(TENANT, "alice@club.test");
    let token = app.token(user.id, ROLE_MEMBER);
    let (mut socket, _) = connect_async(format!("{url}?token={token}")).await.unwrap();

    let facility_id = DbId::now_v7();
    let subscribe = serde_json::json!({
        "action": "subscribe",
        "targets": [facility_topic(facility_id)],
    });
    socket
        .send(Message::Text(subscribe.to_string()))
        .await
        .unwrap();
    wait_for_topics(&app, 1).await;

    publisher
        .publish(&slot_event(OTHER_TENANT, facility_id))
        .await
        .unwrap();
    publisher
        .publish(&slot_event(TENANT, facility_id).with_message("marker"))
        .await
        .unwrap();

    // Delivery order follows publish order, so the first frame seen must be
    // the marker from this tenant.
    let frame = next_frame(&mut socket).await;
    assert_eq!(frame["payload"]["tenant_id"], TENANT);
    assert_eq!(frame["payload"]["message"], "marker");
}

#[tokio::test]
async fn one_subscribe_frame_can_name_several_facilities() {
    let app = build_test_app();
    let url = serve(&app).await;
    start_bridge(&app);
    let publisher = EventPublisher::new(app.kv.clone());
    wait_for_bridge(&publisher).await;

    let user = app.store.add_user(TENANT, "alice@club.test");
    let token = app.token(user.id, ROLE_MEMBER);
    let (mut socket, _) = connect_async(format!("{url}?token={token}")).await.unwrap();

    let courts = [DbId::now_v7(), DbId::now_v7()];
    let subscribe = serde_json::json!({
        "action": "subscribe",
        "targets": courts.iter().map(|id| facility_topic(*id)).collect::<Vec<_>>(),
    });
    socket
        .send(Message::Text(subscribe.to_string()))
        .await
        .unwrap();
    wait_for_topics(&app, 2).await;

    for court in courts {
        publisher.publish(&slot_event(TENANT, court)).await.unwrap();
        let frame = next_frame(&mut socket).await;
        assert_eq!(frame["payload"]["facility_id"], court.to_string());
    }
}

#[tokio::test]
async fn upgrade_without_a_valid_token_is_rejected() {
    let app = build_test_app();
    let url = serve(&app).await;

    let err = connect_async(format!("{url}?token=garbage")).await;
    assert!(err.is_err());

    let err = connect_async(url).await;
    assert!(err.is_err());
}
