use rusqlite::{Connection, TransactionBehavior};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Actor, Booking, BookingEvent, BookingStatus, PaymentStatus};

pub const MIN_REASON_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingAction {
    Confirm,
    Reject,
    Cancel,
    Complete,
    NoShow,
}

impl BookingAction {
    pub fn target(self) -> BookingStatus {
        match self {
            BookingAction::Confirm => BookingStatus::Confirmed,
            BookingAction::Reject => BookingStatus::Rejected,
            BookingAction::Cancel => BookingStatus::Cancelled,
            BookingAction::Complete => BookingStatus::Completed,
            BookingAction::NoShow => BookingStatus::NoShow,
        }
    }

    pub fn verb(self) -> &'static str {
        match self {
            BookingAction::Confirm => "confirm",
            BookingAction::Reject => "reject",
            BookingAction::Cancel => "cancel",
            BookingAction::Complete => "complete",
            BookingAction::NoShow => "mark as no-show",
        }
    }

    fn requires_reason(self) -> bool {
        matches!(self, BookingAction::Reject | BookingAction::Cancel)
    }

    fn allowed_from(self) -> &'static [BookingStatus] {
        match self {
            BookingAction::Confirm | BookingAction::Reject => &[BookingStatus::Pending],
            BookingAction::Cancel => &[BookingStatus::Pending, BookingStatus::Confirmed],
            BookingAction::Complete | BookingAction::NoShow => &[BookingStatus::Confirmed],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(String),
}

/// Who may move a booking where. Admins may do everything; an owner may only cancel,
/// and only while the booking is still pending.
pub fn can_transition(actor: &Actor, booking: &Booking, action: BookingAction) -> Decision {
    if actor.is_admin() {
        return Decision::Allow;
    }
    if !actor.owns(booking) {
        return Decision::Deny("not allowed to modify this booking".to_string());
    }
    match action {
        BookingAction::Cancel if booking.status == BookingStatus::Confirmed => {
            Decision::Deny("a confirmed booking can only be cancelled by an admin".to_string())
        }
        BookingAction::Cancel => Decision::Allow,
        other => Decision::Deny(format!("only an admin can {} a booking", other.verb())),
    }
}

/// Whether the state machine has an edge from `from` for `action`, independent of who asks.
pub fn check_transition(from: BookingStatus, action: BookingAction) -> Result<(), AppError> {
    if action.allowed_from().contains(&from) {
        return Ok(());
    }
    if from == action.target() {
        return Err(AppError::Conflict(format!("booking already {from}")));
    }
    Err(AppError::Conflict(format!(
        "cannot {} a booking that is {from}",
        action.verb()
    )))
}

fn check_reason(action: BookingAction, reason: Option<&str>) -> Result<Option<String>, AppError> {
    let reason = reason.map(str::trim).filter(|r| !r.is_empty());
    if action.requires_reason() {
        match reason {
            Some(r) if r.chars().count() >= MIN_REASON_LEN => {}
            _ => {
                return Err(AppError::Validation(format!(
                    "a reason of at least {MIN_REASON_LEN} characters is required to {} a booking",
                    action.verb()
                )))
            }
        }
    }
    Ok(reason.map(str::to_string))
}

/// Applies `action` to the booking as `actor`: authorization, state edge, reason, then a
/// compare-and-set write plus an event row in one transaction.
pub fn apply_transition(
    conn: &mut Connection,
    actor: &Actor,
    booking_id: &str,
    action: BookingAction,
    reason: Option<&str>,
) -> Result<(Booking, BookingEvent), AppError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let booking = queries::get_booking_by_id(&tx, booking_id)?
        .ok_or_else(|| AppError::NotFound("booking".to_string()))?;

    if let Decision::Deny(why) = can_transition(actor, &booking, action) {
        return Err(AppError::Forbidden(why));
    }
    check_transition(booking.status, action)?;
    let reason = check_reason(action, reason)?;

    let target = action.target();
    let payment_status = match (booking.payment_status, target) {
        (PaymentStatus::Paid, BookingStatus::Cancelled | BookingStatus::Rejected) => PaymentStatus::Refunded,
        (current, _) => current,
    };

    let applied = queries::update_booking_status(
        &tx,
        &booking.id,
        booking.status,
        target,
        reason.as_deref(),
        payment_status,
    )?;
    if !applied {
        return Err(AppError::Conflict("booking was modified concurrently".to_string()));
    }

    let updated = queries::get_booking_by_id(&tx, &booking.id)?
        .ok_or_else(|| AppError::NotFound("booking".to_string()))?;
    let event = queries::insert_booking_event(&tx, &updated, reason.as_deref())?;
    tx.commit()?;

    tracing::info!(
        booking_id = %updated.id,
        user_id = %actor.user_id,
        from = %booking.status,
        to = %updated.status,
        "booking status changed"
    );
    Ok((updated, event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{Field, FieldStatus, Role, TimeOfDay, TimeRange};
    use chrono::{NaiveDate, Utc};

    fn admin() -> Actor {
        Actor {
            user_id: "admin-1".to_string(),
            role: Role::Admin,
            device_id: None,
        }
    }

    fn user(id: &str) -> Actor {
        Actor {
            user_id: id.to_string(),
            role: Role::User,
            device_id: Some("phone".to_string()),
        }
    }

    fn setup(status: BookingStatus, payment: PaymentStatus) -> Connection {
        let conn = db::init_db(":memory:").unwrap();
        let now = Utc::now().naive_utc();
        queries::insert_field(
            &conn,
            &Field {
                id: "f-1".to_string(),
                name: "Pitch A".to_string(),
                description: None,
                grass_type: "artificial".to_string(),
                price: 300,
                price_with_lights: 420,
                open_time: TimeOfDay::parse("06:00").unwrap(),
                close_time: TimeOfDay::parse("22:00").unwrap(),
                status: FieldStatus::Available,
                capacity: 14,
                created_at: now,
                updated_at: now,
            },
        )
        .unwrap();
        let range = TimeRange::parse("10:00", "12:00").unwrap();
        queries::create_booking(
            &conn,
            &Booking {
                id: "b-1".to_string(),
                field_id: "f-1".to_string(),
                user_id: "owner".to_string(),
                date: NaiveDate::from_ymd_opt(2030, 6, 1).unwrap(),
                start_time: range.start,
                end_time: range.end,
                shift: Some("SHIFT_3".to_string()),
                team_name: None,
                opponent_team: None,
                phone: None,
                notes: None,
                total_price: 600,
                status,
                payment_status: payment,
                status_reason: None,
                created_at: now,
                updated_at: now,
            },
        )
        .unwrap();
        conn
    }

    fn status_of(conn: &Connection) -> BookingStatus {
        queries::get_booking_by_id(conn, "b-1").unwrap().unwrap().status
    }

    #[test]
    fn test_admin_confirms_pending() {
        let mut conn = setup(BookingStatus::Pending, PaymentStatus::Unpaid);
        let (booking, event) =
            apply_transition(&mut conn, &admin(), "b-1", BookingAction::Confirm, None).unwrap();
        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert_eq!(event.status, BookingStatus::Confirmed);
        assert_eq!(event.user_id, "owner");

        let err = apply_transition(&mut conn, &admin(), "b-1", BookingAction::Confirm, None).unwrap_err();
        assert!(matches!(err, AppError::Conflict(ref m) if m == "booking already confirmed"));
    }

    #[test]
    fn test_owner_cannot_confirm() {
        let mut conn = setup(BookingStatus::Pending, PaymentStatus::Unpaid);
        let err =
            apply_transition(&mut conn, &user("owner"), "b-1", BookingAction::Confirm, None).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert_eq!(status_of(&conn), BookingStatus::Pending);
    }

    #[test]
    fn test_reject_twice_is_conflict() {
        let mut conn = setup(BookingStatus::Rejected, PaymentStatus::Unpaid);
        let err = apply_transition(
            &mut conn,
            &admin(),
            "b-1",
            BookingAction::Reject,
            Some("pitch closed for repairs"),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Conflict(ref m) if m == "booking already rejected"));
    }

    #[test]
    fn test_reject_needs_reason() {
        let mut conn = setup(BookingStatus::Pending, PaymentStatus::Unpaid);
        let err =
            apply_transition(&mut conn, &admin(), "b-1", BookingAction::Reject, Some("  no  ")).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(status_of(&conn), BookingStatus::Pending);

        let (booking, _) = apply_transition(
            &mut conn,
            &admin(),
            "b-1",
            BookingAction::Reject,
            Some("pitch closed for repairs"),
        )
        .unwrap();
        assert_eq!(booking.status_reason.as_deref(), Some("pitch closed for repairs"));
    }

    #[test]
    fn test_owner_cancels_pending_once() {
        let mut conn = setup(BookingStatus::Pending, PaymentStatus::Unpaid);
        let (booking, _) = apply_transition(
            &mut conn,
            &user("owner"),
            "b-1",
            BookingAction::Cancel,
            Some("schedule conflict"),
        )
        .unwrap();
        assert_eq!(booking.status, BookingStatus::Cancelled);

        let err = apply_transition(
            &mut conn,
            &user("owner"),
            "b-1",
            BookingAction::Cancel,
            Some("schedule conflict"),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Conflict(ref m) if m == "booking already cancelled"));
    }

    #[test]
    fn test_stranger_cannot_cancel() {
        let mut conn = setup(BookingStatus::Pending, PaymentStatus::Unpaid);
        let err = apply_transition(
            &mut conn,
            &user("someone-else"),
            "b-1",
            BookingAction::Cancel,
            Some("schedule conflict"),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn test_confirmed_cancel_is_admin_only() {
        let mut conn = setup(BookingStatus::Confirmed, PaymentStatus::Paid);
        let err = apply_transition(
            &mut conn,
            &user("owner"),
            "b-1",
            BookingAction::Cancel,
            Some("schedule conflict"),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let (booking, _) = apply_transition(
            &mut conn,
            &admin(),
            "b-1",
            BookingAction::Cancel,
            Some("storm warning for the evening"),
        )
        .unwrap();
        assert_eq!(booking.status, BookingStatus::Cancelled);
        assert_eq!(booking.payment_status, PaymentStatus::Refunded);
    }

    #[test]
    fn test_complete_and_no_show_need_confirmed() {
        let mut conn = setup(BookingStatus::Pending, PaymentStatus::Unpaid);
        let err = apply_transition(&mut conn, &admin(), "b-1", BookingAction::Complete, None).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        apply_transition(&mut conn, &admin(), "b-1", BookingAction::Confirm, None).unwrap();
        let (booking, _) =
            apply_transition(&mut conn, &admin(), "b-1", BookingAction::NoShow, None).unwrap();
        assert_eq!(booking.status, BookingStatus::NoShow);

        let err = apply_transition(&mut conn, &admin(), "b-1", BookingAction::Complete, None).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn test_missing_booking_is_not_found() {
        let mut conn = setup(BookingStatus::Pending, PaymentStatus::Unpaid);
        let err = apply_transition(&mut conn, &admin(), "nope", BookingAction::Confirm, None).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn test_transition_table() {
        use BookingAction as A;
        use BookingStatus as S;

        assert!(check_transition(S::Pending, A::Confirm).is_ok());
        assert!(check_transition(S::Pending, A::Reject).is_ok());
        assert!(check_transition(S::Pending, A::Cancel).is_ok());
        assert!(check_transition(S::Confirmed, A::Cancel).is_ok());
        assert!(check_transition(S::Confirmed, A::Complete).is_ok());
        assert!(check_transition(S::Confirmed, A::NoShow).is_ok());
        assert!(check_transition(S::Confirmed, A::Reject).is_err());

        for terminal in [S::Cancelled, S::Rejected, S::Completed, S::NoShow] {
            for action in [A::Confirm, A::Reject, A::Cancel, A::Complete, A::NoShow] {
                assert!(check_transition(terminal, action).is_err());
            }
        }
    }
}
