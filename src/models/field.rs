use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::time::{TimeOfDay, TimeRange};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub grass_type: String,
    /// Hourly rate before the lights come on.
    pub price: i64,
    pub price_with_lights: i64,
    pub open_time: TimeOfDay,
    pub close_time: TimeOfDay,
    pub status: FieldStatus,
    pub capacity: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Field {
    /// `None` when the stored hours are inverted; such a field has no bookable time.
    pub fn operating_hours(&self) -> Option<TimeRange> {
        TimeRange::new(self.open_time, self.close_time)
    }

    pub fn is_bookable(&self) -> bool {
        self.status == FieldStatus::Available
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldStatus {
    Available,
    Maintenance,
    Unavailable,
}

impl FieldStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldStatus::Available => "available",
            FieldStatus::Maintenance => "maintenance",
            FieldStatus::Unavailable => "unavailable",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "available" => Some(FieldStatus::Available),
            "maintenance" => Some(FieldStatus::Maintenance),
            "unavailable" => Some(FieldStatus::Unavailable),
            _ => None,
        }
    }
}
