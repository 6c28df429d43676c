use serde::{Deserialize, Serialize};

use super::booking::BookingStatus;

/// A committed booking status change, fanned out to notifiers and live subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingEvent {
    pub id: i64,
    pub booking_id: String,
    pub user_id: String,
    pub field_id: String,
    pub status: BookingStatus,
    pub reason: Option<String>,
    pub created_at: String,
}
