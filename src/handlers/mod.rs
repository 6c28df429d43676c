pub mod auth;
pub mod bookings;
pub mod events;
pub mod fields;
pub mod health;

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use chrono::NaiveDate;

use crate::errors::AppError;
use crate::models::Actor;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/auth/logout", post(auth::logout))
        .route("/fields", get(fields::list_fields).post(fields::create_field))
        .route("/fields/:field_id", get(fields::get_field))
        .route("/fields/:field_id/status", put(fields::update_field_status))
        .route(
            "/fields/:field_id/available-slots/:date",
            get(fields::available_slots),
        )
        .route(
            "/bookings",
            get(bookings::list_bookings).post(bookings::create_booking),
        )
        .route("/bookings/available-shifts", get(bookings::available_shifts))
        .route("/bookings/my", get(bookings::my_bookings))
        .route("/bookings/events", get(events::events_stream))
        .route("/bookings/:id", get(bookings::get_booking))
        .route("/bookings/:id/cancel", put(bookings::cancel_booking))
        .route("/bookings/:id/confirm", put(bookings::confirm_booking))
        .route("/bookings/:id/reject", put(bookings::reject_booking))
        .route("/bookings/:id/complete", put(bookings::complete_booking))
        .route("/bookings/:id/no-show", put(bookings::mark_no_show))
        .with_state(state)
}

pub(crate) fn parse_date(s: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| AppError::Validation(format!("invalid date: {s}, expected YYYY-MM-DD")))
}

pub(crate) fn require_admin(actor: &Actor) -> Result<(), AppError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden("admin access required".to_string()))
    }
}
