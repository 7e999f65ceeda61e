//! Venues, courts and slot pricing.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::slot::{default_schedule, Slot};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Venue {
    pub id: Uuid,
    pub name: String,
    pub active: bool,
    /// Offset of the venue's local clock from UTC.
    pub utc_offset_minutes: i32,
    /// Empty means the default hourly schedule.
    pub slot_schedule: Vec<Slot>,
}

impl Venue {
    pub fn schedule(&self) -> Vec<Slot> {
        if self.slot_schedule.is_empty() {
            default_schedule()
        } else {
            self.slot_schedule.clone()
        }
    }

    pub fn local_now(&self, now: DateTime<Utc>) -> NaiveDateTime {
        match FixedOffset::east_opt(self.utc_offset_minutes * 60) {
            Some(offset) => now.with_timezone(&offset).naive_local(),
            None => now.naive_utc(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Court {
    pub id: Uuid,
    pub venue_id: Uuid,
    pub name: String,
    pub active: bool,
    /// Price of one slot when no slot list or override applies, in minor units.
    pub base_hourly_rate: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayType {
    Weekday,
    Weekend,
}

impl DayType {
    pub fn of(date: NaiveDate) -> Self {
        match date.weekday() {
            Weekday::Sat | Weekday::Sun => DayType::Weekend,
            _ => DayType::Weekday,
        }
    }
}

/// Slot prices for one court, in minor units.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PricingRules {
    pub weekday: HashMap<Slot, i64>,
    pub weekend: HashMap<Slot, i64>,
    pub date_overrides: HashMap<NaiveDate, HashMap<Slot, i64>>,
}

impl PricingRules {
    /// Dynamic date override, then the day-type slot list, then the court's base rate.
    pub fn price(&self, court: &Court, date: NaiveDate, slot: Slot) -> i64 {
        if let Some(price) = self
            .date_overrides
            .get(&date)
            .and_then(|prices| prices.get(&slot))
        {
            return *price;
        }

        let by_day = match DayType::of(date) {
            DayType::Weekday => &self.weekday,
            DayType::Weekend => &self.weekend,
        };

        by_day.get(&slot).copied().unwrap_or(court.base_hourly_rate)
    }

    pub fn total(&self, court: &Court, date: NaiveDate, slots: &[Slot]) -> i64 {
        slots.iter().map(|slot| self.price(court, date, *slot)).sum()
    }
}
