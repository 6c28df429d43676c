use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::response::sse::{Event, Sse};
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::BookingEvent;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SseQuery {
    pub token: Option<String>,
    pub last_id: Option<i64>,
}

fn to_sse(event: &BookingEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_default();
    Event::default()
        .id(event.id.to_string())
        .event("booking_event")
        .data(data)
}

// GET /bookings/events (SSE, admin only)
pub async fn events_stream(
    State(state): State<Arc<AppState>>,
    query: Result<Query<SseQuery>, QueryRejection>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>, AppError> {
    let Query(query) = query.map_err(|e| AppError::Validation(e.body_text()))?;
    // EventSource cannot set headers, so the token travels in the query string.
    let token = query.token.as_deref().unwrap_or("");
    let actor = state.auth.authenticate(token)?.ok_or(AppError::Unauthorized)?;
    if !actor.is_admin() {
        return Err(AppError::Forbidden("admin access required".to_string()));
    }

    // Subscribe before the catch-up read so nothing committed in between is lost.
    let rx = state.events_tx.subscribe();
    let last_id = query.last_id.unwrap_or(0);
    let catchup_events = {
        let db = state.conn()?;
        queries::get_booking_events_since(&db, last_id)?
    };
    let high_water = catchup_events.last().map(|e| e.id).unwrap_or(last_id);

    let catchup_stream =
        tokio_stream::iter(catchup_events.into_iter().map(|event| Ok::<_, Infallible>(to_sse(&event))));

    let live_stream = BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(event) if event.id > high_water => Some(Ok(to_sse(&event))),
        Ok(_) => None,
        Err(tokio_stream::wrappers::errors::BroadcastStreamRecvError::Lagged(n)) => {
            tracing::warn!(skipped = n, "booking event subscriber lagged");
            None
        }
    });

    let keepalive_stream = tokio_stream::wrappers::IntervalStream::new(tokio::time::interval(
        Duration::from_secs(30),
    ))
    .map(|_| Ok(Event::default().comment("keepalive")));

    let merged = catchup_stream.chain(live_stream).merge(keepalive_stream);

    Ok(Sse::new(merged))
}
