//! Date and time slot selection.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tracing::debug;

use crate::booking::model::{BookingData, BookingPatch};
use crate::booking::schedule::{
    DATE_FORMAT, SlotPolicy, TIME_FORMAT, parse_date, parse_time, scheduled_at,
};
use crate::booking::state::StepKind;
use crate::error::ValidationError;
use crate::navigation::Clock;

use super::StepView;

pub struct DateTimeStep {
    policy: SlotPolicy,
    clock: Arc<dyn Clock>,
    today: NaiveDate,
    date: Option<NaiveDate>,
    /// "Now" as seen when the date was picked. Slots are not re-filtered
    /// later, so a slot can go stale while the user lingers.
    seen_at: Option<NaiveDateTime>,
    slots: Vec<NaiveTime>,
    time: Option<NaiveTime>,
}

impl DateTimeStep {
    pub fn new(policy: SlotPolicy, clock: Arc<dyn Clock>) -> Self {
        let today = clock.now().date();
        Self {
            policy,
            clock,
            today,
            date: None,
            seen_at: None,
            slots: Vec::new(),
            time: None,
        }
    }

    /// Restore an earlier pick from the accumulator, re-checking it against now.
    pub fn for_data(data: &BookingData, policy: SlotPolicy, clock: Arc<dyn Clock>) -> Self {
        let mut step = Self::new(policy, clock);
        if let Some(date) = data.scheduled_date.as_deref() {
            if step.select_date(date).is_ok() {
                if let Some(time) = data.scheduled_time.as_deref() {
                    if let Err(e) = step.select_time(time) {
                        debug!(date, time, error = %e, "Dropped restored time slot");
                    }
                }
            }
        }
        step
    }

    pub fn selectable_dates(&self) -> Vec<NaiveDate> {
        self.policy.selectable_dates(self.today)
    }

    /// Pick a date and compute its slots as of now.
    pub fn select_date(&mut self, raw: &str) -> Result<&[NaiveTime], ValidationError> {
        let date = parse_date(raw)?;
        if !self.policy.in_window(date, self.today) {
            return Err(ValidationError::DateUnavailable {
                date: raw.trim().to_string(),
            });
        }
        let now = self.clock.now();
        self.slots = self.policy.offered_slots(date, now);
        self.date = Some(date);
        self.seen_at = Some(now);
        if self.time.is_some_and(|t| !self.slots.contains(&t)) {
            self.time = None;
        }
        debug!(date = %date, slots = self.slots.len(), "Date selected");
        Ok(&self.slots)
    }

    pub fn offered_slots(&self) -> &[NaiveTime] {
        &self.slots
    }

    pub fn select_time(&mut self, raw: &str) -> Result<(), ValidationError> {
        let date = self.date.ok_or(ValidationError::NoDateSelected)?;
        let time = parse_time(raw, date)?;
        if !self.slots.contains(&time) {
            return Err(ValidationError::SlotUnavailable {
                date: date.format(DATE_FORMAT).to_string(),
                time: raw.trim().to_string(),
            });
        }
        self.time = Some(time);
        Ok(())
    }

    /// When the current slot list was computed.
    pub fn seen_at(&self) -> Option<NaiveDateTime> {
        self.seen_at
    }
}

impl StepView for DateTimeStep {
    fn kind(&self) -> StepKind {
        StepKind::DateTime
    }

    fn confirm(&self, _data: &BookingData) -> Result<BookingPatch, ValidationError> {
        let date = self.date.ok_or(ValidationError::NoDateSelected)?;
        let time = self.time.ok_or(ValidationError::NoTimeSelected)?;
        Ok(BookingPatch {
            scheduled_date: Some(date.format(DATE_FORMAT).to_string()),
            scheduled_time: Some(time.format(TIME_FORMAT).to_string()),
            scheduled_at: Some(scheduled_at(date, time)),
            ..Default::default()
        })
    }
}
