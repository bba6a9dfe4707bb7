//! Marketplace REST backend: the contract the wizard relies on.

#[cfg(test)]
pub(crate) mod fake;
pub mod http;

pub use http::HttpBookingApi;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::booking::model::{CreateBookingRequest, MenuCatalog, SiteRef, TherapistRef};
use crate::error::ApiError;

/// Filters for `GET /api/sites`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SiteQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// Filters for `GET /api/therapists`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TherapistQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl TherapistQuery {
    pub fn at_site(site_id: impl Into<String>) -> Self {
        Self {
            site_id: Some(site_id.into()),
            ..Default::default()
        }
    }
}

/// A created booking. Only the id is relied upon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedBooking {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// List endpoints return either a bare array or a page envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ListResponse<T> {
    Page {
        items: Vec<T>,
        #[allow(dead_code)]
        #[serde(default)]
        total: Option<u64>,
    },
    Bare(Vec<T>),
}

impl<T> ListResponse<T> {
    pub(crate) fn into_items(self) -> Vec<T> {
        match self {
            Self::Page { items, .. } => items,
            Self::Bare(items) => items,
        }
    }
}

/// Backend operations used by the wizard and its steps.
#[async_trait]
pub trait BookingApi: Send + Sync {
    async fn list_sites(&self, query: &SiteQuery) -> Result<Vec<SiteRef>, ApiError>;

    async fn get_site(&self, id: &str) -> Result<SiteRef, ApiError>;

    async fn list_therapists(&self, query: &TherapistQuery) -> Result<Vec<TherapistRef>, ApiError>;

    async fn get_therapist(&self, id: &str) -> Result<TherapistRef, ApiError>;

    /// `GET /api/therapists/{id}/menu`.
    async fn get_menu(&self, therapist_id: &str) -> Result<MenuCatalog, ApiError>;

    /// `POST /api/bookings`.
    async fn create_booking(
        &self,
        token: &SecretString,
        request: &CreateBookingRequest,
    ) -> Result<CreatedBooking, ApiError>;

    /// Ask the backend to send the booking confirmation notice.
    async fn notify_booking_confirmed(
        &self,
        token: &SecretString,
        booking_id: &str,
    ) -> Result<(), ApiError>;
}
