use chrono::{NaiveDate, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{
    Booking, BookingEvent, BookingStatus, Field, FieldStatus, PaymentStatus, Role, TimeOfDay,
};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

const BOOKING_COLUMNS: &str = "id, field_id, user_id, date, start_time, end_time, shift, team_name, opponent_team, \
     phone, notes, total_price, status, payment_status, status_reason, created_at, updated_at";

const FIELD_COLUMNS: &str = "id, name, description, grass_type, price, price_with_lights, open_time, close_time, \
     status, capacity, created_at, updated_at";

fn now_ts() -> String {
    Utc::now().naive_utc().format(TS_FORMAT).to_string()
}

fn parse_ts(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, TS_FORMAT).unwrap_or_else(|_| Utc::now().naive_utc())
}

/// True when the error is SQLite refusing a write because of a UNIQUE/CHECK/FK constraint.
pub fn is_constraint_violation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<rusqlite::Error>(),
        Some(rusqlite::Error::SqliteFailure(e, _)) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

// ── Fields ──

pub fn insert_field(conn: &Connection, field: &Field) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO fields (id, name, description, grass_type, price, price_with_lights, open_time, close_time, status, capacity, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            field.id,
            field.name,
            field.description,
            field.grass_type,
            field.price,
            field.price_with_lights,
            field.open_time.to_string(),
            field.close_time.to_string(),
            field.status.as_str(),
            field.capacity,
            field.created_at.format(TS_FORMAT).to_string(),
            field.updated_at.format(TS_FORMAT).to_string(),
        ],
    )?;
    Ok(())
}

pub fn get_field(conn: &Connection, id: &str) -> anyhow::Result<Option<Field>> {
    let sql = format!("SELECT {FIELD_COLUMNS} FROM fields WHERE id = ?1");
    let result = conn
        .query_row(&sql, params![id], |row| Ok(parse_field_row(row)))
        .optional()?;

    match result {
        Some(field) => Ok(Some(field?)),
        None => Ok(None),
    }
}

pub fn list_fields(conn: &Connection) -> anyhow::Result<Vec<Field>> {
    let sql = format!("SELECT {FIELD_COLUMNS} FROM fields ORDER BY name ASC");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| Ok(parse_field_row(row)))?;

    let mut fields = vec![];
    for row in rows {
        fields.push(row??);
    }
    Ok(fields)
}

pub fn update_field_status(conn: &Connection, id: &str, status: FieldStatus) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE fields SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), now_ts(), id],
    )?;
    Ok(count > 0)
}

fn parse_field_row(row: &rusqlite::Row) -> anyhow::Result<Field> {
    let open_time: String = row.get(6)?;
    let close_time: String = row.get(7)?;
    let status: String = row.get(8)?;
    let created_at: String = row.get(10)?;
    let updated_at: String = row.get(11)?;

    Ok(Field {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        grass_type: row.get(3)?,
        price: row.get(4)?,
        price_with_lights: row.get(5)?,
        open_time: TimeOfDay::parse(&open_time)?,
        close_time: TimeOfDay::parse(&close_time)?,
        status: FieldStatus::parse(&status).unwrap_or(FieldStatus::Unavailable),
        capacity: row.get(9)?,
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    })
}

// ── Bookings ──

pub fn create_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO bookings (id, field_id, user_id, date, start_time, end_time, shift, team_name, opponent_team, phone, notes, total_price, status, payment_status, status_reason, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        params![
            booking.id,
            booking.field_id,
            booking.user_id,
            booking.date.format(DATE_FORMAT).to_string(),
            booking.start_time.to_string(),
            booking.end_time.to_string(),
            booking.shift,
            booking.team_name,
            booking.opponent_team,
            booking.phone,
            booking.notes,
            booking.total_price,
            booking.status.as_str(),
            booking.payment_status.as_str(),
            booking.status_reason,
            booking.created_at.format(TS_FORMAT).to_string(),
            booking.updated_at.format(TS_FORMAT).to_string(),
        ],
    )?;
    Ok(())
}

pub fn get_booking_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1");
    let result = conn
        .query_row(&sql, params![id], |row| Ok(parse_booking_row(row)))
        .optional()?;

    match result {
        Some(booking) => Ok(Some(booking?)),
        None => Ok(None),
    }
}

/// Bookings that still hold their slot (not cancelled or rejected) on one field and day.
pub fn get_live_bookings(
    conn: &Connection,
    field_id: &str,
    date: &NaiveDate,
) -> anyhow::Result<Vec<Booking>> {
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE field_id = ?1 AND date = ?2 AND status NOT IN ('cancelled', 'rejected')
         ORDER BY start_time ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![field_id, date.format(DATE_FORMAT).to_string()],
        |row| Ok(parse_booking_row(row)),
    )?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn get_bookings_for_user(conn: &Connection, user_id: &str) -> anyhow::Result<Vec<Booking>> {
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings WHERE user_id = ?1 ORDER BY date DESC, start_time ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![user_id], |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

#[derive(Debug, Default)]
pub struct BookingFilter {
    pub status: Option<BookingStatus>,
    pub field_id: Option<String>,
    pub date: Option<NaiveDate>,
    pub limit: i64,
}

pub fn list_bookings(conn: &Connection, filter: &BookingFilter) -> anyhow::Result<Vec<Booking>> {
    let mut clauses: Vec<String> = vec![];
    let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> = vec![];

    if let Some(status) = filter.status {
        params_vec.push(Box::new(status.as_str()));
        clauses.push(format!("status = ?{}", params_vec.len()));
    }
    if let Some(field_id) = &filter.field_id {
        params_vec.push(Box::new(field_id.clone()));
        clauses.push(format!("field_id = ?{}", params_vec.len()));
    }
    if let Some(date) = filter.date {
        params_vec.push(Box::new(date.format(DATE_FORMAT).to_string()));
        clauses.push(format!("date = ?{}", params_vec.len()));
    }

    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    params_vec.push(Box::new(filter.limit));
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings {where_clause} ORDER BY date DESC, start_time ASC LIMIT ?{}",
        params_vec.len()
    );

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

/// Compare-and-set on the current status. Returns false when the row is gone or has moved on.
pub fn update_booking_status(
    conn: &Connection,
    id: &str,
    from: BookingStatus,
    to: BookingStatus,
    reason: Option<&str>,
    payment_status: PaymentStatus,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET status = ?1, status_reason = ?2, payment_status = ?3, updated_at = ?4
         WHERE id = ?5 AND status = ?6",
        params![
            to.as_str(),
            reason,
            payment_status.as_str(),
            now_ts(),
            id,
            from.as_str()
        ],
    )?;
    Ok(count > 0)
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let date: String = row.get(3)?;
    let start_time: String = row.get(4)?;
    let end_time: String = row.get(5)?;
    let status: String = row.get(12)?;
    let payment_status: String = row.get(13)?;
    let created_at: String = row.get(15)?;
    let updated_at: String = row.get(16)?;

    let status = BookingStatus::parse(&status)
        .ok_or_else(|| anyhow::anyhow!("unknown booking status in database: {status}"))?;

    Ok(Booking {
        id: row.get(0)?,
        field_id: row.get(1)?,
        user_id: row.get(2)?,
        date: NaiveDate::parse_from_str(&date, DATE_FORMAT)?,
        start_time: TimeOfDay::parse(&start_time)?,
        end_time: TimeOfDay::parse(&end_time)?,
        shift: row.get(6)?,
        team_name: row.get(7)?,
        opponent_team: row.get(8)?,
        phone: row.get(9)?,
        notes: row.get(10)?,
        total_price: row.get(11)?,
        status,
        payment_status: PaymentStatus::parse(&payment_status),
        status_reason: row.get(14)?,
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    })
}

// ── Booking Events ──

pub fn insert_booking_event(
    conn: &Connection,
    booking: &Booking,
    reason: Option<&str>,
) -> anyhow::Result<BookingEvent> {
    let created_at = now_ts();
    conn.execute(
        "INSERT INTO booking_events (booking_id, user_id, field_id, status, reason, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            booking.id,
            booking.user_id,
            booking.field_id,
            booking.status.as_str(),
            reason,
            created_at
        ],
    )?;

    Ok(BookingEvent {
        id: conn.last_insert_rowid(),
        booking_id: booking.id.clone(),
        user_id: booking.user_id.clone(),
        field_id: booking.field_id.clone(),
        status: booking.status,
        reason: reason.map(str::to_string),
        created_at,
    })
}

pub fn get_booking_events_since(conn: &Connection, since_id: i64) -> anyhow::Result<Vec<BookingEvent>> {
    let mut stmt = conn.prepare(
        "SELECT id, booking_id, user_id, field_id, status, reason, created_at
         FROM booking_events WHERE id > ?1
         ORDER BY id ASC",
    )?;

    let rows = stmt.query_map(params![since_id], |row| {
        let status: String = row.get(4)?;
        Ok((
            BookingEvent {
                id: row.get(0)?,
                booking_id: row.get(1)?,
                user_id: row.get(2)?,
                field_id: row.get(3)?,
                status: BookingStatus::Pending,
                reason: row.get(5)?,
                created_at: row.get(6)?,
            },
            status,
        ))
    })?;

    let mut events = vec![];
    for row in rows {
        let (mut event, status) = row?;
        event.status = BookingStatus::parse(&status)
            .ok_or_else(|| anyhow::anyhow!("unknown booking status in database: {status}"))?;
        events.push(event);
    }
    Ok(events)
}

// ── Sessions ──

pub struct SessionRecord {
    pub user_id: String,
    pub device_id: String,
    pub role: Role,
}

/// Replaces the session for this (user, device) pair only; other devices stay signed in.
pub fn upsert_session(
    conn: &Connection,
    user_id: &str,
    device_id: &str,
    role: Role,
    token_hash: &str,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO sessions (user_id, device_id, role, token_hash, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(user_id, device_id) DO UPDATE SET
           role = excluded.role,
           token_hash = excluded.token_hash,
           created_at = excluded.created_at,
           last_seen_at = NULL",
        params![user_id, device_id, role.as_str(), token_hash, now_ts()],
    )?;
    Ok(())
}

pub fn find_session(conn: &Connection, token_hash: &str) -> anyhow::Result<Option<SessionRecord>> {
    let record = conn
        .query_row(
            "SELECT user_id, device_id, role FROM sessions WHERE token_hash = ?1",
            params![token_hash],
            |row| {
                let role: String = row.get(2)?;
                Ok(SessionRecord {
                    user_id: row.get(0)?,
                    device_id: row.get(1)?,
                    role: Role::parse(&role),
                })
            },
        )
        .optional()?;
    Ok(record)
}

pub fn touch_session(conn: &Connection, token_hash: &str) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE sessions SET last_seen_at = ?1 WHERE token_hash = ?2",
        params![now_ts(), token_hash],
    )?;
    Ok(())
}

pub fn delete_session(conn: &Connection, user_id: &str, device_id: &str) -> anyhow::Result<bool> {
    let count = conn.execute(
        "DELETE FROM sessions WHERE user_id = ?1 AND device_id = ?2",
        params![user_id, device_id],
    )?;
    Ok(count > 0)
}

pub fn delete_user_sessions(conn: &Connection, user_id: &str) -> anyhow::Result<usize> {
    let count = conn.execute("DELETE FROM sessions WHERE user_id = ?1", params![user_id])?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::TimeRange;

    fn setup_db() -> Connection {
        db::init_db(":memory:").unwrap()
    }

    fn field(id: &str) -> Field {
        let now = Utc::now().naive_utc();
        Field {
            id: id.to_string(),
            name: "Pitch A".to_string(),
            description: None,
            grass_type: "artificial".to_string(),
            price: 300,
            price_with_lights: 450,
            open_time: TimeOfDay::parse("08:00").unwrap(),
            close_time: TimeOfDay::parse("22:00").unwrap(),
            status: FieldStatus::Available,
            capacity: 14,
            created_at: now,
            updated_at: now,
        }
    }

    fn booking(id: &str, start: &str, end: &str, status: BookingStatus) -> Booking {
        let now = Utc::now().naive_utc();
        let range = TimeRange::parse(start, end).unwrap();
        Booking {
            id: id.to_string(),
            field_id: "f-1".to_string(),
            user_id: "u-1".to_string(),
            date: NaiveDate::from_ymd_opt(2030, 5, 4).unwrap(),
            start_time: range.start,
            end_time: range.end,
            shift: None,
            team_name: Some("Red Lions".to_string()),
            opponent_team: None,
            phone: None,
            notes: None,
            total_price: 600,
            status,
            payment_status: PaymentStatus::Unpaid,
            status_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_field_roundtrip() {
        let conn = setup_db();
        insert_field(&conn, &field("f-1")).unwrap();

        let loaded = get_field(&conn, "f-1").unwrap().unwrap();
        assert_eq!(loaded.open_time.to_string(), "08:00");
        assert_eq!(loaded.status, FieldStatus::Available);
        assert!(get_field(&conn, "missing").unwrap().is_none());

        assert!(update_field_status(&conn, "f-1", FieldStatus::Maintenance).unwrap());
        let loaded = get_field(&conn, "f-1").unwrap().unwrap();
        assert_eq!(loaded.status, FieldStatus::Maintenance);
    }

    #[test]
    fn test_live_bookings_skip_cancelled_and_rejected() {
        let conn = setup_db();
        insert_field(&conn, &field("f-1")).unwrap();
        create_booking(&conn, &booking("b-1", "08:00", "10:00", BookingStatus::Pending)).unwrap();
        create_booking(&conn, &booking("b-2", "10:00", "12:00", BookingStatus::Cancelled)).unwrap();
        create_booking(&conn, &booking("b-3", "12:00", "14:00", BookingStatus::Rejected)).unwrap();
        create_booking(&conn, &booking("b-4", "14:00", "16:00", BookingStatus::Confirmed)).unwrap();

        let date = NaiveDate::from_ymd_opt(2030, 5, 4).unwrap();
        let live = get_live_bookings(&conn, "f-1", &date).unwrap();
        let ids: Vec<&str> = live.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["b-1", "b-4"]);
    }

    #[test]
    fn test_unique_index_blocks_second_live_booking_at_same_start() {
        let conn = setup_db();
        insert_field(&conn, &field("f-1")).unwrap();
        create_booking(&conn, &booking("b-1", "10:00", "12:00", BookingStatus::Pending)).unwrap();

        let err = create_booking(&conn, &booking("b-2", "10:00", "11:00", BookingStatus::Pending))
            .unwrap_err();
        assert!(is_constraint_violation(&err));

        // A cancelled booking no longer holds the start time.
        create_booking(&conn, &booking("b-3", "16:00", "18:00", BookingStatus::Cancelled)).unwrap();
        create_booking(&conn, &booking("b-4", "16:00", "18:00", BookingStatus::Pending)).unwrap();
    }

    #[test]
    fn test_status_update_is_compare_and_set() {
        let conn = setup_db();
        insert_field(&conn, &field("f-1")).unwrap();
        create_booking(&conn, &booking("b-1", "10:00", "12:00", BookingStatus::Pending)).unwrap();

        let applied = update_booking_status(
            &conn,
            "b-1",
            BookingStatus::Pending,
            BookingStatus::Confirmed,
            None,
            PaymentStatus::Unpaid,
        )
        .unwrap();
        assert!(applied);

        let stale = update_booking_status(
            &conn,
            "b-1",
            BookingStatus::Pending,
            BookingStatus::Rejected,
            Some("field flooded overnight"),
            PaymentStatus::Unpaid,
        )
        .unwrap();
        assert!(!stale);

        let loaded = get_booking_by_id(&conn, "b-1").unwrap().unwrap();
        assert_eq!(loaded.status, BookingStatus::Confirmed);
    }

    #[test]
    fn test_list_bookings_filters() {
        let conn = setup_db();
        insert_field(&conn, &field("f-1")).unwrap();
        create_booking(&conn, &booking("b-1", "08:00", "10:00", BookingStatus::Pending)).unwrap();
        create_booking(&conn, &booking("b-2", "10:00", "12:00", BookingStatus::Confirmed)).unwrap();

        let all = list_bookings(&conn, &BookingFilter { limit: 50, ..Default::default() }).unwrap();
        assert_eq!(all.len(), 2);

        let confirmed = list_bookings(
            &conn,
            &BookingFilter {
                status: Some(BookingStatus::Confirmed),
                field_id: Some("f-1".to_string()),
                limit: 50,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(confirmed.len(), 1);
        assert_eq!(confirmed[0].id, "b-2");
    }

    #[test]
    fn test_sessions_are_per_device() {
        let conn = setup_db();
        upsert_session(&conn, "u-1", "phone", Role::User, "hash-a").unwrap();
        upsert_session(&conn, "u-1", "laptop", Role::User, "hash-b").unwrap();

        // Re-login on the phone replaces only the phone session.
        upsert_session(&conn, "u-1", "phone", Role::User, "hash-c").unwrap();
        assert!(find_session(&conn, "hash-a").unwrap().is_none());
        assert!(find_session(&conn, "hash-b").unwrap().is_some());
        assert_eq!(find_session(&conn, "hash-c").unwrap().unwrap().device_id, "phone");

        assert!(delete_session(&conn, "u-1", "laptop").unwrap());
        assert!(find_session(&conn, "hash-b").unwrap().is_none());
        assert_eq!(delete_user_sessions(&conn, "u-1").unwrap(), 1);
    }
}
