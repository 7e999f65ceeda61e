//! Daily slot schedule.
//! A slot is identified by its start time ("HH:MM") and lasts one hour.

use chrono::{Duration, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const SLOT_MINUTES: i64 = 60;

/// First and last slot start hours of the default daily schedule.
const DEFAULT_FIRST_HOUR: u32 = 6;
const DEFAULT_LAST_HOUR: u32 = 22;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Slot(NaiveTime);

impl Slot {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Slot)
    }

    pub fn start(&self) -> NaiveTime {
        self.0
    }

    pub fn end(&self) -> NaiveTime {
        self.0 + Duration::minutes(SLOT_MINUTES)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0.hour(), self.0.minute())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid slot '{0}', expected HH:MM")]
pub struct SlotParseError(pub String);

impl FromStr for Slot {
    type Err = SlotParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveTime::parse_from_str(s.trim(), "%H:%M")
            .map(Slot)
            .map_err(|_| SlotParseError(s.to_string()))
    }
}

impl TryFrom<String> for Slot {
    type Error = SlotParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Slot> for String {
    fn from(slot: Slot) -> Self {
        slot.to_string()
    }
}

/// The hourly schedule used when a venue does not configure its own.
pub fn default_schedule() -> Vec<Slot> {
    (DEFAULT_FIRST_HOUR..=DEFAULT_LAST_HOUR)
        .filter_map(|hour| Slot::new(hour, 0))
        .collect()
}

pub fn format_slots(slots: &[Slot]) -> String {
    slots
        .iter()
        .map(Slot::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_formats() {
        let slot: Slot = "09:00".parse().unwrap();
        assert_eq!(slot.to_string(), "09:00");
        assert_eq!(slot.end(), NaiveTime::from_hms_opt(10, 0, 0).unwrap());
    }

    #[test]
    fn rejects_garbage() {
        assert!("9am".parse::<Slot>().is_err());
        assert!("25:00".parse::<Slot>().is_err());
    }

    #[test]
    fn serializes_as_string() {
        let slot = Slot::new(18, 30).unwrap();
        assert_eq!(serde_json::to_string(&slot).unwrap(), "\"18:30\"");
        let back: Slot = serde_json::from_str("\"18:30\"").unwrap();
        assert_eq!(back, slot);
    }

    #[test]
    fn default_schedule_is_hourly() {
        let schedule = default_schedule();
        assert_eq!(schedule.first().unwrap().to_string(), "06:00");
        assert_eq!(schedule.last().unwrap().to_string(), "22:00");
        assert_eq!(schedule.len(), 17);
    }
}
