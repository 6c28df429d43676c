use chrono::NaiveDate;
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Field, Shift, TimeOfDay, TimeRange};

pub const MIN_SLOT_MINUTES: u16 = 15;
pub const MAX_SLOT_MINUTES: u16 = 240;

/// Steps through `hours` in `duration`-minute candidates and keeps the ones no booking touches.
/// A trailing partial candidate that would run past closing is dropped.
pub fn compute_slots(hours: TimeRange, duration: u16, booked: &[TimeRange]) -> Vec<TimeRange> {
    if duration == 0 {
        return vec![];
    }

    let close = hours.end.minutes();
    let mut slots = vec![];
    let mut start = hours.start.minutes();

    while let Some(end) = start.checked_add(duration).filter(|end| *end <= close) {
        let candidate = TimeRange {
            start: TimeOfDay::saturating(start),
            end: TimeOfDay::saturating(end),
        };
        if !booked.iter().any(|b| candidate.overlaps(b)) {
            slots.push(candidate);
        }
        start = end;
    }

    slots
}

/// Shifts that sit inside the operating hours and are not touched by any live booking.
pub fn free_shifts(hours: TimeRange, booked: &[TimeRange]) -> Vec<Shift> {
    Shift::all()
        .filter(|shift| {
            let range = shift.range();
            hours.contains(&range) && !booked.iter().any(|b| range.overlaps(b))
        })
        .collect()
}

pub fn validate_slot_duration(duration: u16) -> Result<(), AppError> {
    if !(MIN_SLOT_MINUTES..=MAX_SLOT_MINUTES).contains(&duration) || duration % MIN_SLOT_MINUTES != 0 {
        return Err(AppError::Validation(format!(
            "slot duration must be a multiple of {MIN_SLOT_MINUTES} between {MIN_SLOT_MINUTES} and {MAX_SLOT_MINUTES} minutes"
        )));
    }
    Ok(())
}

fn load_day(
    conn: &Connection,
    field_id: &str,
    date: &NaiveDate,
) -> Result<(Field, Vec<TimeRange>), AppError> {
    let field = queries::get_field(conn, field_id)?
        .ok_or_else(|| AppError::NotFound("field".to_string()))?;
    let booked = queries::get_live_bookings(conn, field_id, date)?
        .iter()
        .map(|b| b.range())
        .collect();
    Ok((field, booked))
}

/// Point-in-time snapshot; a client must still expect a conflict when it submits.
pub fn available_slots(
    conn: &Connection,
    field_id: &str,
    date: &NaiveDate,
    duration: u16,
) -> Result<Vec<TimeRange>, AppError> {
    validate_slot_duration(duration)?;
    let (field, booked) = load_day(conn, field_id, date)?;

    if !field.is_bookable() {
        return Ok(vec![]);
    }
    let Some(hours) = field.operating_hours() else {
        tracing::warn!(field_id, "field has inverted operating hours");
        return Ok(vec![]);
    };
    Ok(compute_slots(hours, duration, &booked))
}

pub fn available_shifts(
    conn: &Connection,
    field_id: &str,
    date: &NaiveDate,
) -> Result<Vec<Shift>, AppError> {
    let (field, booked) = load_day(conn, field_id, date)?;

    if !field.is_bookable() {
        return Ok(vec![]);
    }
    let Some(hours) = field.operating_hours() else {
        tracing::warn!(field_id, "field has inverted operating hours");
        return Ok(vec![]);
    };
    Ok(free_shifts(hours, &booked))
}
