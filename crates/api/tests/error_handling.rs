//! Tests for `AppError` → HTTP response mapping.
//!
//! These tests call `IntoResponse` directly on `AppError` values; no server
//! is involved.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use clubpulse_api::error::AppError;
use clubpulse_core::error::CoreError;
use clubpulse_engine::{ConflictReason, EngineError};
use http_body_util::BodyExt;

/// Helper: convert an `AppError` into its status code and parsed JSON body.
async fn error_to_response(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

// ---------------------------------------------------------------------------
// Core errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn not_found_error_returns_404() {
    let err = AppError::Core(CoreError::NotFound {
        entity: "Facility",
        id: "42".into(),
    });

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["error"], "Facility with id 42 not found");
}

#[tokio::test]
async fn unauthorized_error_returns_401() {
    let err = AppError::Core(CoreError::Unauthorized("Missing Authorization header".into()));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn bad_request_error_returns_400() {
    let err = AppError::BadRequest("invalid field value".into());

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");
    assert_eq!(json["error"], "invalid field value");
}

#[tokio::test]
async fn internal_error_hides_details() {
    let err = AppError::InternalError("connection string leaked".into());

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INTERNAL_ERROR");
    assert_eq!(json["error"], "An internal error occurred");
}

// ---------------------------------------------------------------------------
// Engine outcomes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn booking_conflict_carries_reason() {
    for (reason, expected) in [
        (ConflictReason::Overlap, "overlap"),
        (ConflictReason::BadRange, "bad-range"),
        (ConflictReason::Maintenance, "maintenance"),
    ] {
        let (status, json) = error_to_response(EngineError::Conflict(reason).into()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["code"], "CONFLICT");
        assert_eq!(json["reason"], expected);
    }
}

#[tokio::test]
async fn maintenance_busy_is_a_maintenance_conflict() {
    let (status, json) = error_to_response(EngineError::MaintenanceBusy.into()).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["reason"], "maintenance");
}

#[tokio::test]
async fn lock_outcomes_have_distinct_codes() {
    for (err, code) in [
        (EngineError::AlreadyLocked, "ALREADY_LOCKED"),
        (EngineError::NotOwner, "NOT_OWNER"),
        (EngineError::LockExpired, "LOCK_EXPIRED"),
        (EngineError::InvalidLock, "INVALID_LOCK"),
    ] {
        let (status, json) = error_to_response(err.into()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["code"], code);
        assert!(json.get("reason").is_none());
    }
}

#[tokio::test]
async fn unavailable_dependency_returns_503_without_details() {
    let err = EngineError::Unavailable("redis://10.0.0.5 refused".into());

    let (status, json) = error_to_response(err.into()).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["code"], "UNAVAILABLE");
    assert_eq!(json["error"], "Service temporarily unavailable");
}

#[tokio::test]
async fn engine_validation_and_forbidden_map_to_400_and_403() {
    let (status, json) =
        error_to_response(EngineError::Validation("capacity must be at least 1".into()).into())
            .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");

    let (status, json) =
        error_to_response(EngineError::Forbidden("not yours".into()).into()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["code"], "FORBIDDEN");
}

#[tokio::test]
async fn row_not_found_maps_to_404() {
    let (status, json) = error_to_response(AppError::Database(sqlx::Error::RowNotFound)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
}
