//! reqwest implementation of [`BookingApi`].

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::{BookingApi, CreatedBooking, ListResponse, SiteQuery, TherapistQuery};
use crate::booking::model::{CreateBookingRequest, MenuCatalog, SiteRef, TherapistRef};
use crate::error::ApiError;

/// Client for the marketplace REST backend.
///
/// No client-side timeout is set; failures surface only as errors.
pub struct HttpBookingApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBookingApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn read_json<T: DeserializeOwned>(
        endpoint: &str,
        resp: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        resp.json::<T>().await.map_err(|e| ApiError::InvalidResponse {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        req: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        let resp = req.send().await.map_err(|e| ApiError::RequestFailed {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        Self::read_json(endpoint, resp).await
    }

    /// Detail reads map 404 to `NotFound` so steps can show an empty state.
    async fn get_entity<T: DeserializeOwned>(
        &self,
        path: &str,
        entity: &str,
        id: &str,
    ) -> Result<T, ApiError> {
        match self.fetch(path, self.client.get(self.url(path))).await {
            Err(ApiError::Status { status: 404, .. }) => Err(ApiError::NotFound {
                entity: entity.to_string(),
                id: id.to_string(),
            }),
            other => other,
        }
    }
}

#[async_trait]
impl BookingApi for HttpBookingApi {
    async fn list_sites(&self, query: &SiteQuery) -> Result<Vec<SiteRef>, ApiError> {
        let endpoint = "/api/sites";
        let list: ListResponse<SiteRef> = self
            .fetch(endpoint, self.client.get(self.url(endpoint)).query(query))
            .await?;
        let sites = list.into_items();
        debug!(count = sites.len(), "Fetched sites");
        Ok(sites)
    }

    async fn get_site(&self, id: &str) -> Result<SiteRef, ApiError> {
        self.get_entity(&format!("/api/sites/{id}"), "Site", id).await
    }

    async fn list_therapists(&self, query: &TherapistQuery) -> Result<Vec<TherapistRef>, ApiError> {
        let endpoint = "/api/therapists";
        let list: ListResponse<TherapistRef> = self
            .fetch(endpoint, self.client.get(self.url(endpoint)).query(query))
            .await?;
        let therapists = list.into_items();
        debug!(count = therapists.len(), site_id = ?query.site_id, "Fetched therapists");
        Ok(therapists)
    }

    async fn get_therapist(&self, id: &str) -> Result<TherapistRef, ApiError> {
        self.get_entity(&format!("/api/therapists/{id}"), "Therapist", id)
            .await
    }

    async fn get_menu(&self, therapist_id: &str) -> Result<MenuCatalog, ApiError> {
        self.get_entity(
            &format!("/api/therapists/{therapist_id}/menu"),
            "Menu",
            therapist_id,
        )
        .await
    }

    async fn create_booking(
        &self,
        token: &SecretString,
        request: &CreateBookingRequest,
    ) -> Result<CreatedBooking, ApiError> {
        let endpoint = "/api/bookings";
        let resp = self
            .client
            .post(self.url(endpoint))
            .bearer_auth(token.expose_secret())
            .json(request)
            .send()
            .await
            .map_err(|e| ApiError::RequestFailed {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;
        let created: CreatedBooking = Self::read_json(endpoint, resp).await?;
        info!(booking_id = %created.id, "Booking created");
        Ok(created)
    }

    async fn notify_booking_confirmed(
        &self,
        token: &SecretString,
        booking_id: &str,
    ) -> Result<(), ApiError> {
        let endpoint = format!("/api/bookings/{booking_id}/notify");
        let resp = self
            .client
            .post(self.url(&endpoint))
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|e| ApiError::RequestFailed {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                endpoint,
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
