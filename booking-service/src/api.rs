use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use shared::*;

use crate::error::{validate_id, ApiError};
use crate::ledger::BookingLedger;
use crate::store::SeatStore;

pub struct AppState<S> {
    pub ledger: Arc<BookingLedger<S>>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
        }
    }
}

impl<S: SeatStore> AppState<S> {
    pub fn new(store: S) -> Self {
        Self {
            ledger: Arc::new(BookingLedger::new(store)),
        }
    }
}

pub fn create_router<S: SeatStore>(state: AppState<S>) -> Router {
    Router::new()
        .route("/bookings", post(book_class::<S>))
        .route("/bookings/:booking_id", delete(cancel_booking::<S>))
        .route("/schedules/:schedule_id/availability", get(schedule_availability::<S>))
        .route("/schedules/:schedule_id/audit", get(schedule_audit::<S>))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

pub async fn book_class<S: SeatStore>(
    State(state): State<AppState<S>>,
    payload: Result<Json<BookClassRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Booking>), ApiError> {
    let Json(request) = payload?;
    let schedule_id = validate_id("schedule_id", request.schedule_id)?;
    let user_id = validate_id("user_id", request.user_id)?;

    let booking = state.ledger.book(schedule_id, user_id).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

pub async fn cancel_booking<S: SeatStore>(
    State(state): State<AppState<S>>,
    path: Result<Path<i32>, PathRejection>,
    payload: Result<Json<CancelBookingRequest>, JsonRejection>,
) -> Result<Json<Booking>, ApiError> {
    let Path(booking_id) = path?;
    let Json(request) = payload?;
    let booking_id = validate_id("booking_id", booking_id)?;
    let user_id = validate_id("user_id", request.user_id)?;

    let booking = state.ledger.cancel(booking_id, user_id).await?;
    Ok(Json(booking))
}

pub async fn schedule_availability<S: SeatStore>(
    State(state): State<AppState<S>>,
    path: Result<Path<i32>, PathRejection>,
) -> Result<Json<Availability>, ApiError> {
    let Path(schedule_id) = path?;
    let schedule_id = validate_id("schedule_id", schedule_id)?;
    Ok(Json(state.ledger.availability(schedule_id).await?))
}

pub async fn schedule_audit<S: SeatStore>(
    State(state): State<AppState<S>>,
    path: Result<Path<i32>, PathRejection>,
) -> Result<Json<CapacityAudit>, ApiError> {
    let Path(schedule_id) = path?;
    let schedule_id = validate_id("schedule_id", schedule_id)?;
    Ok(Json(state.ledger.audit(schedule_id).await?))
}

pub async fn health_check() -> &'static str {
    "OK"
}
