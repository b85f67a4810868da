use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// First bookable hour of the day.
pub const OPENING_HOUR: u32 = 9;
/// Hour at which the last slot has already ended.
pub const CLOSING_HOUR: u32 = 18;
pub const SLOT_MINUTES: u32 = 30;

/// A time of day on the booking grid, rendered as `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotTime {
    hour: u32,
    minute: u32,
}

impl SlotTime {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        if hour > 23 || minute > 59 {
            return None;
        }
        Some(Self { hour, minute })
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    /// The time as an `HHMM` integer, e.g. `09:30` -> `930`.
    pub fn as_hhmm(&self) -> u32 {
        self.hour * 100 + self.minute
    }

    pub fn is_on_grid(&self) -> bool {
        (OPENING_HOUR..CLOSING_HOUR).contains(&self.hour) && self.minute % SLOT_MINUTES == 0
    }

    /// Every slot from opening up to (excluding) closing, ascending.
    pub fn daily_grid() -> Vec<SlotTime> {
        (OPENING_HOUR..CLOSING_HOUR)
            .flat_map(|hour| {
                (0..60)
                    .step_by(SLOT_MINUTES as usize)
                    .map(move |minute| SlotTime { hour, minute })
            })
            .collect()
    }

    pub fn to_naive_time(&self) -> chrono::NaiveTime {
        chrono::NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or_default()
    }
}

impl fmt::Display for SlotTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for SlotTime {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (h, m) = s
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("invalid time format: {s}"))?;
        let two_digits = |part: &str| part.len() == 2 && part.bytes().all(|b| b.is_ascii_digit());
        if !two_digits(h) || !two_digits(m) {
            anyhow::bail!("invalid time format: {s}");
        }
        let hour: u32 = h
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid hour in: {s}"))?;
        let minute: u32 = m
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid minute in: {s}"))?;
        SlotTime::new(hour, minute).ok_or_else(|| anyhow::anyhow!("time out of range: {s}"))
    }
}

impl Serialize for SlotTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SlotTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
