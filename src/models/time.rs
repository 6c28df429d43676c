use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// Minute offset from midnight. `24:00` is representable so a field can close at midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub fn from_minutes(minutes: u16) -> Option<Self> {
        (minutes <= MINUTES_PER_DAY).then_some(Self(minutes))
    }

    pub(crate) fn saturating(minutes: u16) -> Self {
        Self(minutes.min(MINUTES_PER_DAY))
    }

    pub fn minutes(self) -> u16 {
        self.0
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        let (h, m) = s
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("invalid time format: {s}, expected HH:MM"))?;
        let two_digits = |part: &str| part.len() == 2 && part.bytes().all(|b| b.is_ascii_digit());
        if !two_digits(h) || !two_digits(m) {
            return Err(anyhow::anyhow!("invalid time format: {s}, expected HH:MM"));
        }
        let hour: u16 = h
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid hour in: {s}"))?;
        let minute: u16 = m
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid minute in: {s}"))?;
        if hour > 24 || minute > 59 || (hour == 24 && minute != 0) {
            return Err(anyhow::anyhow!("time out of range: {s}"));
        }
        Ok(Self(hour * 60 + minute))
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        TimeOfDay::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Half-open interval `[start, end)` within a single day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(rename = "startTime")]
    pub start: TimeOfDay,
    #[serde(rename = "endTime")]
    pub end: TimeOfDay,
}

impl TimeRange {
    pub fn new(start: TimeOfDay, end: TimeOfDay) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn parse(start: &str, end: &str) -> anyhow::Result<Self> {
        let start_t = TimeOfDay::parse(start)?;
        let end_t = TimeOfDay::parse(end)?;
        Self::new(start_t, end_t)
            .ok_or_else(|| anyhow::anyhow!("start time {start} must be before end time {end}"))
    }

    pub fn duration_minutes(&self) -> u16 {
        self.end.minutes() - self.start.minutes()
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && self.end > other.start
    }

    pub fn contains(&self, other: &TimeRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}
