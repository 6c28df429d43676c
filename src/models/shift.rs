use serde::Serialize;

use super::time::{TimeOfDay, TimeRange};

pub const SHIFT_COUNT: u8 = 8;
const FIRST_SHIFT_START_MINUTES: u16 = 6 * 60;
const SHIFT_LENGTH_MINUTES: u16 = 120;

/// One of the fixed two-hour blocks `SHIFT_1` (06:00-08:00) through `SHIFT_8` (20:00-22:00).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shift(u8);

impl Shift {
    pub fn all() -> impl Iterator<Item = Shift> {
        (1..=SHIFT_COUNT).map(Shift)
    }

    pub fn number(self) -> u8 {
        self.0
    }

    pub fn name(self) -> String {
        format!("SHIFT_{}", self.0)
    }

    pub fn parse(s: &str) -> Option<Self> {
        let upper = s.trim().to_ascii_uppercase();
        let n: u8 = upper.strip_prefix("SHIFT_")?.parse().ok()?;
        (1..=SHIFT_COUNT).contains(&n).then_some(Shift(n))
    }

    pub fn range(self) -> TimeRange {
        let start = FIRST_SHIFT_START_MINUTES + (self.0 as u16 - 1) * SHIFT_LENGTH_MINUTES;
        TimeRange {
            start: TimeOfDay::saturating(start),
            end: TimeOfDay::saturating(start + SHIFT_LENGTH_MINUTES),
        }
    }

    pub fn slot(self) -> ShiftSlot {
        let range = self.range();
        ShiftSlot {
            shift: self.name(),
            start_time: range.start,
            end_time: range.end,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftSlot {
    pub shift: String,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
}
