//! Bookable dates and time slots.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::config::WizardConfig;
use crate::error::ValidationError;

/// Wire format of `scheduled_date`.
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// Wire format of `scheduled_time`.
pub const TIME_FORMAT: &str = "%H:%M";

/// Hourly slot grid with a same-day lead time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotPolicy {
    /// First slot of the day (hour).
    pub first_hour: u32,
    /// Last slot of the day (hour, inclusive).
    pub last_hour: u32,
    /// Minimum lead time for same-day slots, in hours.
    pub lead_hours: u32,
    /// How many days ahead (including today) can be booked.
    pub window_days: u32,
}

impl Default for SlotPolicy {
    fn default() -> Self {
        Self {
            first_hour: 10,
            last_hour: 20,
            lead_hours: 2,
            window_days: 14,
        }
    }
}

impl From<&WizardConfig> for SlotPolicy {
    fn from(config: &WizardConfig) -> Self {
        Self {
            first_hour: config.first_slot_hour,
            last_hour: config.last_slot_hour,
            lead_hours: config.same_day_lead_hours,
            window_days: config.booking_window_days,
        }
    }
}

impl SlotPolicy {
    /// Every slot of a day, in order.
    pub fn all_slots(&self) -> Vec<NaiveTime> {
        (self.first_hour..=self.last_hour.min(23))
            .filter_map(|h| NaiveTime::from_hms_opt(h, 0, 0))
            .collect()
    }

    /// Slots offered on `date` as seen at `now`.
    ///
    /// Future dates offer everything. Today offers slots from `now.hour + lead`
    /// onward; when `now` sits exactly on the hour, the slot at exactly `lead`
    /// hours ahead is excluded too. Past dates offer nothing.
    pub fn offered_slots(&self, date: NaiveDate, now: NaiveDateTime) -> Vec<NaiveTime> {
        let today = now.date();
        if date < today {
            return Vec::new();
        }
        if date > today {
            return self.all_slots();
        }

        let mut min_hour = now.hour() + self.lead_hours;
        if now.minute() == 0 && now.second() == 0 && now.nanosecond() == 0 {
            min_hour += 1;
        }
        // Past midnight the grid has nothing left for today.
        self.all_slots()
            .into_iter()
            .filter(|slot| slot.hour() >= min_hour)
            .collect()
    }

    /// Whether `time` is offered on `date` at `now`.
    pub fn is_offered(&self, date: NaiveDate, time: NaiveTime, now: NaiveDateTime) -> bool {
        self.offered_slots(date, now).contains(&time)
    }

    /// Dates that can be picked, starting today.
    pub fn selectable_dates(&self, today: NaiveDate) -> Vec<NaiveDate> {
        (0..self.window_days as i64)
            .map(|offset| today + Duration::days(offset))
            .collect()
    }

    /// Whether `date` lies inside the booking window.
    pub fn in_window(&self, date: NaiveDate, today: NaiveDate) -> bool {
        date >= today && date < today + Duration::days(self.window_days as i64)
    }
}

/// Combine date and time into the canonical `scheduled_at` timestamp.
pub fn scheduled_at(date: NaiveDate, time: NaiveTime) -> String {
    format!("{}T{}:00", date.format(DATE_FORMAT), time.format(TIME_FORMAT))
}

/// Parse a `YYYY-MM-DD` date string.
pub fn parse_date(raw: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).map_err(|_| ValidationError::DateUnavailable {
        date: raw.to_string(),
    })
}

/// Parse an `HH:MM` time string.
pub fn parse_time(raw: &str, date: NaiveDate) -> Result<NaiveTime, ValidationError> {
    NaiveTime::parse_from_str(raw.trim(), TIME_FORMAT).map_err(|_| ValidationError::SlotUnavailable {
        date: date.format(DATE_FORMAT).to_string(),
        time: raw.to_string(),
    })
}
