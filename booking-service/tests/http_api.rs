mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use booking_service::api::{create_router, AppState};
use booking_service::{MemorySeatStore, WriteStep};
use common::*;
use serde_json::{json, Value};
use tower::Service;

/// Router over a memory store seeded with one upcoming schedule.
async fn create_test_app(max_capacity: i32) -> (Router, AppState<MemorySeatStore>, i32) {
    let (store, schedule) = seeded_store(max_capacity).await;
    let state = AppState::new(store);
    (create_router(state.clone()), state, schedule.id)
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn response_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let (mut app, _, _) = create_test_app(1).await;

    let response = app
        .call(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_book_returns_created_booking() {
    // Arrange
    let (mut app, _, schedule_id) = create_test_app(2).await;

    // Act
    let response = app
        .call(json_request(
            Method::POST,
            "/bookings",
            json!({"schedule_id": schedule_id, "user_id": 12}),
        ))
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response.into_body()).await;
    assert_eq!(body["schedule_id"], schedule_id);
    assert_eq!(body["user_id"], 12);
    assert_eq!(body["booking_status"], "confirmed");
    assert!(body["booked_at"].is_string());
}

#[tokio::test]
async fn test_full_and_duplicate_are_bad_requests() {
    let (mut app, _, schedule_id) = create_test_app(1).await;
    let book = |user_id: i32| {
        json_request(
            Method::POST,
            "/bookings",
            json!({"schedule_id": schedule_id, "user_id": user_id}),
        )
    };

    let response = app.call(book(1)).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app.call(book(2)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response.into_body()).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Class is full");

    let response = app.call(book(1)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_book_unknown_schedule_is_not_found() {
    let (mut app, _, _) = create_test_app(1).await;

    let response = app
        .call(json_request(
            Method::POST,
            "/bookings",
            json!({"schedule_id": 999, "user_id": 1}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = response_json(response.into_body()).await;
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_non_positive_ids_are_rejected() {
    let (mut app, _, schedule_id) = create_test_app(1).await;

    let response = app
        .call(json_request(
            Method::POST,
            "/bookings",
            json!({"schedule_id": schedule_id, "user_id": 0}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response.into_body()).await;
    assert_eq!(body["message"], "user_id must be a positive integer");
}

#[tokio::test]
async fn test_cancel_then_cancel_again() {
    let (mut app, state, schedule_id) = create_test_app(3).await;
    let booking = state.ledger.book(schedule_id, 4).await.unwrap();
    let uri = format!("/bookings/{}", booking.id);

    let response = app
        .call(json_request(Method::DELETE, &uri, json!({"user_id": 4})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response.into_body()).await;
    assert_eq!(body["booking_status"], "cancelled");
    assert!(body["cancelled_at"].is_string());

    let response = app
        .call(json_request(Method::DELETE, &uri, json!({"user_id": 4})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_store_failure_is_internal_error() {
    let (mut app, state, schedule_id) = create_test_app(3).await;
    state.ledger.store().fail_next(WriteStep::BookingInsert).await;

    let response = app
        .call(json_request(
            Method::POST,
            "/bookings",
            json!({"schedule_id": schedule_id, "user_id": 1}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = response_json(response.into_body()).await;
    assert_eq!(body["message"], "Internal server error");
}

#[tokio::test]
async fn test_availability_and_audit() {
    let (mut app, state, schedule_id) = create_test_app(3).await;
    state.ledger.book(schedule_id, 1).await.unwrap();

    let response = app
        .call(
            Request::builder()
                .uri(format!("/schedules/{}/availability", schedule_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response.into_body()).await;
    assert_eq!(body["current_capacity"], 1);
    assert_eq!(body["max_capacity"], 3);
    assert_eq!(body["available_seats"], 2);
    assert_eq!(body["status"], "scheduled");

    let response = app
        .call(
            Request::builder()
                .uri(format!("/schedules/{}/audit", schedule_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response.into_body()).await;
    assert_eq!(body["consistent"], true);
    assert_eq!(body["confirmed_bookings"], 1);

    let response = app
        .call(
            Request::builder()
                .uri("/schedules/77/availability")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let (mut app, state, schedule_id) = create_test_app(2).await;

    let response = app
        .call(
            Request::builder()
                .method(Method::POST)
                .uri("/bookings")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"schedule_id":"x"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response.into_body()).await;
    assert_eq!(body["success"], false);
    assert!(body["message"].is_string());
    assert!(state.ledger.store().bookings_for(schedule_id).await.is_empty());
}

#[tokio::test]
async fn test_non_numeric_path_id_is_bad_request() {
    let (mut app, _, _) = create_test_app(1).await;

    let response = app
        .call(json_request(Method::DELETE, "/bookings/abc", json!({"user_id": 1})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response.into_body()).await;
    assert_eq!(body["success"], false);

    let response = app
        .call(
            Request::builder()
                .uri("/schedules/abc/availability")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response.into_body()).await;
    assert_eq!(body["success"], false);
}
