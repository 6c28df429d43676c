pub mod webhook;

use std::sync::Arc;

use async_trait::async_trait;

use crate::models::BookingEvent;
use crate::state::AppState;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &BookingEvent) -> anyhow::Result<()>;
}

/// Used when no webhook is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &BookingEvent) -> anyhow::Result<()> {
        tracing::info!(
            booking_id = %event.booking_id,
            user_id = %event.user_id,
            status = %event.status,
            "booking notification"
        );
        Ok(())
    }
}

/// Fans a committed status change out to live subscribers and the notifier.
/// Never blocks the caller and never fails it: delivery errors are only logged.
pub fn dispatch(state: &Arc<AppState>, event: BookingEvent) {
    // No subscribers is not an error.
    let _ = state.events_tx.send(event.clone());

    let notifier = Arc::clone(&state.notifier);
    tokio::spawn(async move {
        if let Err(e) = notifier.notify(&event).await {
            tracing::warn!(
                error = %e,
                booking_id = %event.booking_id,
                "booking notification failed"
            );
        }
    });
}
