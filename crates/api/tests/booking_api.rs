//! HTTP tests for the checkout flow: slot locks, then bookings.

mod common;

use axum::http::{Method, StatusCode};
use clubpulse_core::roles::{ROLE_ADMIN, ROLE_MEMBER};
use clubpulse_core::types::DbId;
use common::{body_json, build_test_app, TestApp, OTHER_TENANT, TENANT};
use serde_json::json;

const START: &str = "2030-03-02T09:00:00Z";
const END: &str = "2030-03-02T10:00:00Z";

struct Member {
    id: DbId,
    token: String,
}

fn member(app: &TestApp, email: &str) -> Member {
    let user = app.store.add_user(TENANT, email);
    Member {
        id: user.id,
        token: app.token(user.id, ROLE_MEMBER),
    }
}

async fn acquire(app: &TestApp, token: &str, facility_id: DbId) -> serde_json::Value {
    let response = app
        .post(
            "/api/v1/locks",
            token,
            json!({ "facility_id": facility_id, "start": START, "end": END }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["data"].clone()
}

// ---------------------------------------------------------------------------
// Locks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_holder_gets_already_locked() {
    let app = build_test_app();
    let facility = app.store.add_facility(TENANT, "Court 1");
    let alice = member(&app, "alice@club.test");
    let bob = member(&app, "bob@club.test");

    let lock = acquire(&app, &alice.token, facility.id).await;
    assert_eq!(lock["user_id"], alice.id.to_string());

    let response = app
        .post(
            "/api/v1/locks",
            &bob.token,
            json!({ "facility_id": facility.id, "start": START, "end": END }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "ALREADY_LOCKED");
}

#[tokio::test]
async fn lock_on_unknown_facility_is_404() {
    let app = build_test_app();
    let alice = member(&app, "alice@club.test");

    let response = app
        .post(
            "/api/v1/locks",
            &alice.token,
            json!({ "facility_id": DbId::now_v7(), "start": START, "end": END }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn inverted_range_is_a_bad_range_conflict() {
    let app = build_test_app();
    let facility = app.store.add_facility(TENANT, "Court 1");
    let alice = member(&app, "alice@club.test");

    let response = app
        .post(
            "/api/v1/locks",
            &alice.token,
            json!({ "facility_id": facility.id, "start": END, "end": START }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["reason"], "bad-range");
}

#[tokio::test]
async fn only_the_owner_can_see_extend_and_release_a_lock() {
    let app = build_test_app();
    let facility = app.store.add_facility(TENANT, "Court 1");
    let alice = member(&app, "alice@club.test");
    let bob = member(&app, "bob@club.test");
    let lock = acquire(&app, &alice.token, facility.id).await;
    let uri = format!("/api/v1/locks/{}", lock["lock_id"].as_str().unwrap());

    let response = app.get(&uri, &bob.token).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "NOT_OWNER");

    let response = app.post(&format!("{uri}/extend"), &alice.token, json!({})).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await["data"]["expires_at"].is_string());

    let response = app.request(Method::DELETE, &uri, Some(&alice.token), None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.get(&uri, &alice.token).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.post(&format!("{uri}/extend"), &alice.token, json!({})).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "LOCK_EXPIRED");
}

#[tokio::test]
async fn lock_of_another_tenant_reads_as_not_found() {
    let app = build_test_app();
    let facility = app.store.add_facility(TENANT, "Court 1");
    let alice = member(&app, "alice@club.test");
    let lock = acquire(&app, &alice.token, facility.id).await;

    let outsider = app.token_for(OTHER_TENANT, alice.id, ROLE_ADMIN);
    let uri = format!("/api/v1/locks/{}", lock["lock_id"].as_str().unwrap());
    let response = app.get(&uri, &outsider).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Bookings
// ---------------------------------------------------------------------------

#[tokio::test]
async fn commit_get_cancel_round_trip() {
    let app = build_test_app();
    let facility = app.store.add_facility(TENANT, "Court 1");
    let alice = member(&app, "alice@club.test");
    let lock = acquire(&app, &alice.token, facility.id).await;

    let response = app
        .post(
            "/api/v1/bookings",
            &alice.token,
            json!({
                "lock_id": lock["lock_id"],
                "facility_id": facility.id,
                "start": START,
                "end": END,
                "notes": "doubles",
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let booking = body_json(response).await["data"].clone();
    assert_eq!(booking["owner_id"], alice.id.to_string());
    assert_eq!(booking["status"], "pending");
    let id = booking["id"].as_str().unwrap().to_string();

    // The lock is released by the commit.
    let response = app
        .get(
            &format!("/api/v1/locks/{}", lock["lock_id"].as_str().unwrap()),
            &alice.token,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.get(&format!("/api/v1/bookings/{id}"), &alice.token).await;
    assert_eq!(response.status(), StatusCode::OK);

    let listed = body_json(
        app.get(
            &format!(
                "/api/v1/facilities/{}/bookings?from=2030-03-02T00:00:00Z&to=2030-03-03T00:00:00Z",
                facility.id
            ),
            &alice.token,
        )
        .await,
    )
    .await;
    assert_eq!(listed["data"].as_array().unwrap().len(), 1);

    let cancel_uri = format!("/api/v1/bookings/{id}/cancel");
    for _ in 0..2 {
        let response = app.post(&cancel_uri, &alice.token, json!({})).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["data"]["status"], "cancelled");
    }
}

#[tokio::test]
async fn overlapping_commit_is_an_overlap_conflict() {
    let app = build_test_app();
    let facility = app.store.add_facility(TENANT, "Court 1");
    let alice = member(&app, "alice@club.test");
    let bob = member(&app, "bob@club.test");

    let first = acquire(&app, &alice.token, facility.id).await;
    let response = app
        .post(
            "/api/v1/bookings",
            &alice.token,
            json!({ "lock_id": first["lock_id"], "facility_id": facility.id, "start": START, "end": END }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    // The slot lock is free again, but the booking still holds the range.
    let second = acquire(&app, &bob.token, facility.id).await;
    let response = app
        .post(
            "/api/v1/bookings",
            &bob.token,
            json!({ "lock_id": second["lock_id"], "facility_id": facility.id, "start": START, "end": END }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["reason"], "overlap");
}

#[tokio::test]
async fn other_members_cannot_see_or_cancel_a_booking() {
    let app = build_test_app();
    let facility = app.store.add_facility(TENANT, "Court 1");
    let alice = member(&app, "alice@club.test");
    let bob = member(&app, "bob@club.test");
    let lock = acquire(&app, &alice.token, facility.id).await;
    let booking = body_json(
        app.post(
            "/api/v1/bookings",
            &alice.token,
            json!({ "lock_id": lock["lock_id"], "facility_id": facility.id, "start": START, "end": END }),
        )
        .await,
    )
    .await["data"]
        .clone();
    let id = booking["id"].as_str().unwrap();

    let response = app.get(&format!("/api/v1/bookings/{id}"), &bob.token).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .post(&format!("/api/v1/bookings/{id}/cancel"), &bob.token, json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let admin = app.token(DbId::now_v7(), ROLE_ADMIN);
    let response = app
        .post(&format!("/api/v1/bookings/{id}/cancel"), &admin, json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn booking_on_behalf_of_another_member_requires_admin() {
    let app = build_test_app();
    let facility = app.store.add_facility(TENANT, "Court 1");
    let alice = member(&app, "alice@club.test");
    let bob = member(&app, "bob@club.test");
    let lock = acquire(&app, &alice.token, facility.id).await;

    let response = app
        .post(
            "/api/v1/bookings",
            &alice.token,
            json!({
                "lock_id": lock["lock_id"],
                "facility_id": facility.id,
                "owner_id": bob.id,
                "start": START,
                "end": END,
            }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
