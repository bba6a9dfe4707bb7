//! Step views. Each holds its own transient selection and, on confirm,
//! emits exactly the accumulator fields its step owns.

pub mod ai_suggestion;
pub mod chat;
pub mod complete;
pub mod confirm;
pub mod datetime;
pub mod kyc;
pub mod menu;
pub mod menu_site;
pub mod site;
pub mod therapist;

pub use ai_suggestion::AiSuggestionStep;
pub use chat::ChatStep;
pub use complete::CompleteStep;
pub use confirm::{BookingSummary, ConfirmStep};
pub use datetime::DateTimeStep;
pub use kyc::KycStep;
pub use menu::MenuStep;
pub use menu_site::MenuSiteStep;
pub use site::SiteStep;
pub use therapist::TherapistStep;

use serde::Serialize;
use tracing::warn;

use crate::booking::model::{BookingData, BookingPatch, BookingType, SiteRef};
use crate::booking::state::StepKind;
use crate::error::{ApiError, ValidationError};

/// Contract shared by all step views.
pub trait StepView {
    fn kind(&self) -> StepKind;

    /// Validate the local selection and turn it into a patch.
    fn confirm(&self, data: &BookingData) -> Result<BookingPatch, ValidationError>;
}

/// Load state of a remote resource shown by a step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum FetchState<T> {
    Idle,
    Loading,
    Ready(T),
    /// Loaded, but nothing to choose from.
    Empty,
    Failed(String),
}

impl<T> Default for FetchState<T> {
    fn default() -> Self {
        Self::Idle
    }
}

impl<T> FetchState<T> {
    /// Settle a finished fetch. `is_empty` decides between Ready and Empty.
    pub fn settle(
        result: Result<T, ApiError>,
        what: &str,
        is_empty: impl FnOnce(&T) -> bool,
    ) -> Self {
        match result {
            Ok(value) if is_empty(&value) => Self::Empty,
            Ok(value) => Self::Ready(value),
            Err(e) => {
                warn!(what, error = %e, "Fetch failed");
                Self::Failed(e.to_string())
            }
        }
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Where the session happens.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Placement {
    Onsite(SiteRef),
    Dispatch {
        address: String,
        lat: Option<f64>,
        lng: Option<f64>,
    },
}

impl Placement {
    /// Recover a placement already recorded in the accumulator.
    pub fn from_data(data: &BookingData) -> Option<Self> {
        match data.booking_type {
            Some(BookingType::Dispatch) => {
                data.dispatch_address.clone().map(|address| Self::Dispatch {
                    address,
                    lat: data.dispatch_lat,
                    lng: data.dispatch_lng,
                })
            }
            // A site picked on the map implies an onsite booking.
            Some(BookingType::Onsite) | None => data.site.clone().map(Self::Onsite),
        }
    }

    pub fn patch(&self) -> Result<BookingPatch, ValidationError> {
        match self {
            Self::Onsite(site) => Ok(BookingPatch::default()
                .with_site(site.clone())
                .with_type(BookingType::Onsite)),
            Self::Dispatch { address, lat, lng } => {
                let address = address.trim();
                if address.is_empty() {
                    return Err(ValidationError::DispatchAddressRequired);
                }
                Ok(BookingPatch {
                    booking_type: Some(BookingType::Dispatch),
                    dispatch_address: Some(address.to_string()),
                    dispatch_lat: *lat,
                    dispatch_lng: *lng,
                    ..Default::default()
                })
            }
        }
    }
}
