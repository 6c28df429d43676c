use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use rusqlite::{Connection, TransactionBehavior};
use uuid::Uuid;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, BookingStatus, Field, PaymentStatus, Shift, TimeOfDay, TimeRange};

pub const SLOT_TAKEN: &str = "slot already booked";

#[derive(Debug, Clone)]
pub struct BookingPolicy {
    /// 0 means no look-ahead limit.
    pub max_advance_days: i64,
    /// From this time on the field is billed at `price_with_lights`.
    pub lights_on: TimeOfDay,
}

#[derive(Debug, Clone, Copy)]
pub enum RequestedSlot {
    Shift(Shift),
    Range(TimeRange),
}

impl RequestedSlot {
    pub fn range(&self) -> TimeRange {
        match self {
            RequestedSlot::Shift(shift) => shift.range(),
            RequestedSlot::Range(range) => *range,
        }
    }

    fn shift_name(&self) -> Option<String> {
        match self {
            RequestedSlot::Shift(shift) => Some(shift.name()),
            RequestedSlot::Range(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub field_id: String,
    pub user_id: String,
    pub date: NaiveDate,
    pub slot: RequestedSlot,
    pub team_name: Option<String>,
    pub opponent_team: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
}

/// Hourly rate before `lights_on`, lit rate after, prorated per minute.
pub fn compute_price(field: &Field, range: &TimeRange, lights_on: TimeOfDay) -> i64 {
    let split = lights_on.clamp(range.start, range.end);
    let day_minutes = (split.minutes() - range.start.minutes()) as i64;
    let lit_minutes = (range.end.minutes() - split.minutes()) as i64;
    (day_minutes * field.price + lit_minutes * field.price_with_lights) / 60
}

fn check_policy(
    field: &Field,
    date: NaiveDate,
    range: &TimeRange,
    policy: &BookingPolicy,
    now: NaiveDateTime,
) -> Result<(), AppError> {
    if !field.is_bookable() {
        return Err(AppError::Validation(format!(
            "field is not available for booking ({})",
            field.status.as_str()
        )));
    }

    let within_hours = field
        .operating_hours()
        .map(|hours| hours.contains(range))
        .unwrap_or(false);
    if !within_hours {
        return Err(AppError::Validation(format!(
            "requested time {range} is outside operating hours {}-{}",
            field.open_time, field.close_time
        )));
    }

    let today = now.date();
    let minutes_now = (now.hour() * 60 + now.minute()) as u16;
    if date < today || (date == today && range.start.minutes() < minutes_now) {
        return Err(AppError::Validation("cannot book past dates".to_string()));
    }

    if policy.max_advance_days > 0 && date > today + Duration::days(policy.max_advance_days) {
        return Err(AppError::Validation(format!(
            "cannot book more than {} days in advance",
            policy.max_advance_days
        )));
    }

    Ok(())
}

/// Admits a booking or explains why not. The overlap check and the insert share one
/// `BEGIN IMMEDIATE` transaction, so concurrent requests for the same field are serialized
/// by SQLite's write lock; the partial unique index backs this up for identical starts.
pub fn create_booking(
    conn: &mut Connection,
    request: BookingRequest,
    policy: &BookingPolicy,
    now: NaiveDateTime,
) -> Result<Booking, AppError> {
    let range = request.slot.range();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let field = queries::get_field(&tx, &request.field_id)?
        .ok_or_else(|| AppError::NotFound("field".to_string()))?;

    check_policy(&field, request.date, &range, policy, now)?;

    let existing = queries::get_live_bookings(&tx, &field.id, &request.date)?;
    if let Some(clash) = existing.iter().find(|b| b.range().overlaps(&range)) {
        tracing::info!(
            field_id = %field.id,
            date = %request.date,
            requested = %range,
            existing = %clash.id,
            "booking rejected: overlap"
        );
        return Err(AppError::Conflict(SLOT_TAKEN.to_string()));
    }

    let booking = Booking {
        id: Uuid::new_v4().to_string(),
        field_id: field.id.clone(),
        user_id: request.user_id,
        date: request.date,
        start_time: range.start,
        end_time: range.end,
        shift: request.slot.shift_name(),
        team_name: request.team_name,
        opponent_team: request.opponent_team,
        phone: request.phone,
        notes: request.notes,
        total_price: compute_price(&field, &range, policy.lights_on),
        status: BookingStatus::Pending,
        payment_status: PaymentStatus::Unpaid,
        status_reason: None,
        created_at: now,
        updated_at: now,
    };

    if let Err(e) = queries::create_booking(&tx, &booking) {
        if queries::is_constraint_violation(&e) {
            return Err(AppError::Conflict(SLOT_TAKEN.to_string()));
        }
        return Err(e.into());
    }
    tx.commit()?;

    tracing::info!(
        booking_id = %booking.id,
        field_id = %booking.field_id,
        user_id = %booking.user_id,
        date = %booking.date,
        range = %range,
        "booking created"
    );
    Ok(booking)
}
