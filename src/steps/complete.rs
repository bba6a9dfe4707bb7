//! Completion screen.

use crate::booking::model::{BookingData, BookingPatch};
use crate::booking::state::StepKind;
use crate::error::ValidationError;

use super::{BookingSummary, StepView};

#[derive(Debug, Clone)]
pub struct CompleteStep {
    booking_id: String,
    summary: BookingSummary,
}

impl CompleteStep {
    pub fn new(booking_id: impl Into<String>, data: &BookingData) -> Self {
        Self {
            booking_id: booking_id.into(),
            summary: BookingSummary::from_data(data),
        }
    }

    pub fn booking_id(&self) -> &str {
        &self.booking_id
    }

    pub fn summary(&self) -> &BookingSummary {
        &self.summary
    }

    pub fn headline(&self) -> String {
        match (&self.summary.date, &self.summary.time) {
            (Some(date), Some(time)) => {
                format!("Booked for {date} {time} ({})", self.summary.total)
            }
            _ => format!("Booking confirmed ({})", self.summary.total),
        }
    }
}

impl StepView for CompleteStep {
    fn kind(&self) -> StepKind {
        StepKind::Complete
    }

    fn confirm(&self, _data: &BookingData) -> Result<BookingPatch, ValidationError> {
        Ok(BookingPatch::default())
    }
}
