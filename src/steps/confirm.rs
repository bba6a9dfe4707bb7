//! Confirmation: summary, notes, and cancellation-policy agreement.

use serde::Serialize;

use crate::booking::model::{
    BookingData, BookingPatch, BookingType, CreateBookingRequest, format_yen,
};
use crate::booking::state::StepKind;
use crate::error::ValidationError;

use super::StepView;

/// Human-readable summary of a booking, shared by confirm and complete.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookingSummary {
    pub therapist: Option<String>,
    /// Site name, or the dispatch address.
    pub place: Option<String>,
    pub booking_type: Option<BookingType>,
    pub course: Option<String>,
    pub options: Vec<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    /// Minutes.
    pub duration: u32,
    /// Formatted, e.g. `¥3,000`.
    pub total: String,
}

impl BookingSummary {
    pub fn from_data(data: &BookingData) -> Self {
        let (menu_duration, menu_price) = data.menu_totals().unwrap_or_default();
        let place = match data.booking_type {
            Some(BookingType::Dispatch) => data.dispatch_address.clone(),
            _ => data.site.as_ref().map(|s| s.name.clone()),
        };
        Self {
            therapist: data.therapist.as_ref().map(|t| t.name.clone()),
            place,
            booking_type: data.booking_type,
            course: data.courses.first().map(|c| c.name.clone()),
            options: data.options.iter().map(|o| o.name.clone()).collect(),
            date: data.scheduled_date.clone(),
            time: data.scheduled_time.clone(),
            duration: data.total_duration.unwrap_or(menu_duration),
            total: format_yen(data.total_price.unwrap_or(menu_price)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfirmStep {
    notes: String,
    policy_accepted: bool,
}

impl ConfirmStep {
    pub fn for_data(data: &BookingData) -> Self {
        Self {
            notes: data.notes.clone().unwrap_or_default(),
            policy_accepted: false,
        }
    }

    pub fn summary(&self, data: &BookingData) -> BookingSummary {
        BookingSummary::from_data(data)
    }

    pub fn set_notes(&mut self, notes: &str) {
        self.notes = notes.to_string();
    }

    pub fn accept_policy(&mut self, accepted: bool) {
        self.policy_accepted = accepted;
    }
}

impl StepView for ConfirmStep {
    fn kind(&self) -> StepKind {
        StepKind::ConfirmPay
    }

    /// Emits only the notes. The booking itself must already be complete.
    fn confirm(&self, data: &BookingData) -> Result<BookingPatch, ValidationError> {
        CreateBookingRequest::from_data(data)?;
        if !self.policy_accepted {
            return Err(ValidationError::PolicyNotAccepted);
        }
        let notes = self.notes.trim();
        Ok(BookingPatch {
            notes: (!notes.is_empty()).then(|| notes.to_string()),
            ..Default::default()
        })
    }
}
