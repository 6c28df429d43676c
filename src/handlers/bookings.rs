use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use super::{parse_date, require_admin};
use crate::db::queries::{self, BookingFilter};
use crate::errors::AppError;
use crate::models::{Actor, Booking, BookingStatus, Shift, ShiftSlot, TimeRange};
use crate::response::ApiResponse;
use crate::services::guard::{self, BookingRequest, RequestedSlot};
use crate::services::notify;
use crate::services::slots;
use crate::services::transitions::{self, BookingAction};
use crate::state::AppState;

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 500;

// POST /bookings
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingBody {
    pub field_id: String,
    pub date: String,
    pub shift: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub team_name: Option<String>,
    pub opponent_team: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
}

fn requested_slot(body: &CreateBookingBody) -> Result<RequestedSlot, AppError> {
    match (&body.shift, &body.start_time, &body.end_time) {
        (Some(name), None, None) => Shift::parse(name)
            .map(RequestedSlot::Shift)
            .ok_or_else(|| AppError::Validation(format!("unknown shift: {name}"))),
        (None, Some(start), Some(end)) => TimeRange::parse(start, end)
            .map(RequestedSlot::Range)
            .map_err(|e| AppError::Validation(e.to_string())),
        _ => Err(AppError::Validation(
            "provide either a shift or both startTime and endTime".to_string(),
        )),
    }
}

pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    body: Result<Json<CreateBookingBody>, JsonRejection>,
) -> Result<ApiResponse<Booking>, AppError> {
    let Json(body) = body.map_err(|e| AppError::Validation(e.body_text()))?;

    if body.field_id.trim().is_empty() {
        return Err(AppError::Validation("fieldId is required".to_string()));
    }
    let date = parse_date(&body.date)?;
    let slot = requested_slot(&body)?;

    let request = BookingRequest {
        field_id: body.field_id,
        user_id: actor.user_id.clone(),
        date,
        slot,
        team_name: body.team_name,
        opponent_team: body.opponent_team,
        phone: body.phone,
        notes: body.notes,
    };

    let (booking, event) = {
        let mut db = state.conn()?;
        let booking = guard::create_booking(
            &mut db,
            request,
            &state.config.booking_policy(),
            Utc::now().naive_utc(),
        )?;
        // The booking is committed; losing its audit row must not undo it.
        let event = match queries::insert_booking_event(&db, &booking, None) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::warn!(error = %e, booking_id = %booking.id, "failed to record booking event");
                None
            }
        };
        (booking, event)
    };

    if let Some(event) = event {
        notify::dispatch(&state, event);
    }

    Ok(ApiResponse::created("booking created", booking))
}

// GET /bookings/available-shifts?fieldId&date
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftsQuery {
    pub field_id: Option<String>,
    pub date: Option<String>,
}

pub async fn available_shifts(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ShiftsQuery>, QueryRejection>,
) -> Result<ApiResponse<Vec<ShiftSlot>>, AppError> {
    let Query(query) = query.map_err(|e| AppError::Validation(e.body_text()))?;
    let (Some(field_id), Some(date)) = (query.field_id, query.date) else {
        return Err(AppError::Validation("fieldId and date are required".to_string()));
    };
    let date = parse_date(&date)?;

    let shifts = {
        let db = state.conn()?;
        slots::available_shifts(&db, &field_id, &date)?
    };
    let data = shifts.into_iter().map(Shift::slot).collect();
    Ok(ApiResponse::ok("available shifts retrieved", data))
}

// GET /bookings/my
pub async fn my_bookings(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<ApiResponse<Vec<Booking>>, AppError> {
    let bookings = {
        let db = state.conn()?;
        queries::get_bookings_for_user(&db, &actor.user_id)?
    };
    Ok(ApiResponse::ok("bookings retrieved", bookings))
}

// GET /bookings
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingsQuery {
    pub status: Option<String>,
    pub date: Option<String>,
    pub field_id: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    query: Result<Query<BookingsQuery>, QueryRejection>,
) -> Result<ApiResponse<Vec<Booking>>, AppError> {
    require_admin(&actor)?;
    let Query(query) = query.map_err(|e| AppError::Validation(e.body_text()))?;

    let status = query
        .status
        .as_deref()
        .map(|s| {
            BookingStatus::parse(s)
                .ok_or_else(|| AppError::Validation(format!("unknown booking status: {s}")))
        })
        .transpose()?;
    let date = query.date.as_deref().map(parse_date).transpose()?;

    let filter = BookingFilter {
        status,
        field_id: query.field_id,
        date,
        limit: query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT),
    };

    let bookings = {
        let db = state.conn()?;
        queries::list_bookings(&db, &filter)?
    };
    Ok(ApiResponse::ok("bookings retrieved", bookings))
}

// GET /bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<String>,
) -> Result<ApiResponse<Booking>, AppError> {
    let booking = {
        let db = state.conn()?;
        queries::get_booking_by_id(&db, &id)?
    };
    let booking = booking.ok_or_else(|| AppError::NotFound("booking".to_string()))?;

    if !actor.is_admin() && !actor.owns(&booking) {
        return Err(AppError::Forbidden("not allowed to view this booking".to_string()));
    }
    Ok(ApiResponse::ok("booking retrieved", booking))
}

// PUT /bookings/:id/{cancel,confirm,reject,complete,no-show}
#[derive(Deserialize, Default)]
pub struct TransitionBody {
    pub reason: Option<String>,
}

async fn run_transition(
    state: Arc<AppState>,
    actor: Actor,
    id: String,
    action: BookingAction,
    body: Option<Json<TransitionBody>>,
) -> Result<ApiResponse<Booking>, AppError> {
    let reason = body.and_then(|Json(b)| b.reason);

    let (booking, event) = {
        let mut db = state.conn()?;
        transitions::apply_transition(&mut db, &actor, &id, action, reason.as_deref())?
    };
    notify::dispatch(&state, event);

    Ok(ApiResponse::ok(format!("booking {}", booking.status), booking))
}

pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<String>,
    body: Option<Json<TransitionBody>>,
) -> Result<ApiResponse<Booking>, AppError> {
    run_transition(state, actor, id, BookingAction::Cancel, body).await
}

pub async fn confirm_booking(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<String>,
    body: Option<Json<TransitionBody>>,
) -> Result<ApiResponse<Booking>, AppError> {
    run_transition(state, actor, id, BookingAction::Confirm, body).await
}

pub async fn reject_booking(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<String>,
    body: Option<Json<TransitionBody>>,
) -> Result<ApiResponse<Booking>, AppError> {
    run_transition(state, actor, id, BookingAction::Reject, body).await
}

pub async fn complete_booking(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<String>,
    body: Option<Json<TransitionBody>>,
) -> Result<ApiResponse<Booking>, AppError> {
    run_transition(state, actor, id, BookingAction::Complete, body).await
}

pub async fn mark_no_show(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<String>,
    body: Option<Json<TransitionBody>>,
) -> Result<ApiResponse<Booking>, AppError> {
    run_transition(state, actor, id, BookingAction::NoShow, body).await
}
