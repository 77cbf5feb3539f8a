//! HTTP tests for device access decisions.

mod common;

use axum::http::StatusCode;
use clubpulse_core::membership::MembershipStatus;
use clubpulse_core::roles::{ROLE_ADMIN, ROLE_DEVICE, ROLE_MEMBER};
use clubpulse_core::types::DbId;
use common::{body_json, build_test_app, TENANT};
use serde_json::json;

#[tokio::test]
async fn active_member_is_granted() {
    let app = build_test_app();
    let user = app.store.add_user(TENANT, "alice@club.test");
    app.store
        .add_membership(TENANT, user.id, MembershipStatus::Active, 0);
    let device = app.token(DbId::now_v7(), ROLE_DEVICE);

    let response = app
        .post(
            "/api/v1/access/decide",
            &device,
            json!({ "user_id": user.id, "direction": "in" }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["decision"], "granted");
}

#[tokio::test]
async fn denial_is_403_with_the_recorded_decision() {
    let app = build_test_app();
    let user = app.store.add_user(TENANT, "alice@club.test");
    app.store
        .add_membership(TENANT, user.id, MembershipStatus::Active, 2_500);
    let device = app.token(DbId::now_v7(), ROLE_DEVICE);

    let response = app
        .post(
            "/api/v1/access/decide",
            &device,
            json!({ "user_id": user.id, "direction": "in" }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let json = body_json(response).await;
    assert_eq!(json["data"]["decision"], "denied");
    assert_eq!(app.store.access_logs().len(), 1);
}

#[tokio::test]
async fn replayed_event_id_returns_the_first_decision() {
    let app = build_test_app();
    let user = app.store.add_user(TENANT, "alice@club.test");
    app.store
        .add_membership(TENANT, user.id, MembershipStatus::Active, 0);
    let device = app.token(DbId::now_v7(), ROLE_DEVICE);
    let body = json!({ "user_id": user.id, "direction": "in", "event_id": "gate-1:0001" });

    let first = body_json(app.post("/api/v1/access/decide", &device, body.clone()).await).await;
    let second = body_json(app.post("/api/v1/access/decide", &device, body).await).await;

    assert_eq!(first["data"]["id"], second["data"]["id"]);
    assert_eq!(app.store.access_logs().len(), 1);
}

#[tokio::test]
async fn members_cannot_call_the_device_endpoint() {
    let app = build_test_app();
    let user = app.store.add_user(TENANT, "alice@club.test");
    let token = app.token(user.id, ROLE_MEMBER);

    let response = app
        .post("/api/v1/access/decide", &token, json!({ "user_id": user.id }))
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["code"], "FORBIDDEN");
    assert!(app.store.access_logs().is_empty());
}

#[tokio::test]
async fn admin_lists_recent_logs_for_a_user() {
    let app = build_test_app();
    let alice = app.store.add_user(TENANT, "alice@club.test");
    let bob = app.store.add_user(TENANT, "bob@club.test");
    let device = app.token(DbId::now_v7(), ROLE_DEVICE);
    for user in [alice.id, bob.id, alice.id] {
        app.post("/api/v1/access/decide", &device, json!({ "user_id": user }))
            .await;
    }

    let admin = app.token(DbId::now_v7(), ROLE_ADMIN);
    let response = app
        .get(&format!("/api/v1/access/logs?user_id={}", alice.id), &admin)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let logs = body_json(response).await["data"].as_array().unwrap().len();
    assert_eq!(logs, 2);

    let member = app.token(alice.id, ROLE_MEMBER);
    let response = app.get("/api/v1/access/logs", &member).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
