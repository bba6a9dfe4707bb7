//! Site selection: a listed site, or a dispatch address.

use crate::api::{BookingApi, SiteQuery};
use crate::booking::model::{BookingData, BookingPatch, SiteRef};
use crate::booking::state::StepKind;
use crate::error::ValidationError;

use super::{FetchState, Placement, StepView};

#[derive(Debug, Clone, Default)]
pub struct SiteStep {
    query: SiteQuery,
    /// When non-empty, only these site ids are offered.
    only: Vec<String>,
    sites: FetchState<Vec<SiteRef>>,
    placement: Option<Placement>,
}

impl SiteStep {
    pub fn new(query: SiteQuery) -> Self {
        Self {
            query,
            ..Default::default()
        }
    }

    /// Pick up a placement seeded or chosen earlier.
    pub fn for_data(data: &BookingData) -> Self {
        Self {
            placement: Placement::from_data(data),
            ..Default::default()
        }
    }

    /// Offer only the given sites (e.g. where one therapist works).
    pub fn restricted_to(mut self, site_ids: &[String]) -> Self {
        self.only = site_ids.to_vec();
        self
    }

    pub async fn load(&mut self, api: &dyn BookingApi) {
        self.sites = FetchState::Loading;
        let only = &self.only;
        let result = api.list_sites(&self.query).await.map(|sites| {
            sites
                .into_iter()
                .filter(|s| only.is_empty() || only.contains(&s.id))
                .collect::<Vec<_>>()
        });
        self.sites = FetchState::settle(result, "sites", |s| s.is_empty());
    }

    /// Re-issue the same fetch.
    pub async fn retry(&mut self, api: &dyn BookingApi) {
        self.load(api).await;
    }

    pub fn sites(&self) -> &FetchState<Vec<SiteRef>> {
        &self.sites
    }

    pub fn placement(&self) -> Option<&Placement> {
        self.placement.as_ref()
    }

    pub fn select_site(&mut self, site_id: &str) -> Result<(), ValidationError> {
        let site = self
            .sites
            .ready()
            .and_then(|sites| sites.iter().find(|s| s.id == site_id))
            .cloned()
            .ok_or_else(|| ValidationError::UnknownSite(site_id.to_string()))?;
        self.placement = Some(Placement::Onsite(site));
        Ok(())
    }

    /// Have the therapist come to `address` instead.
    pub fn choose_dispatch(&mut self, address: &str, lat: Option<f64>, lng: Option<f64>) {
        self.placement = Some(Placement::Dispatch {
            address: address.to_string(),
            lat,
            lng,
        });
    }
}

impl StepView for SiteStep {
    fn kind(&self) -> StepKind {
        StepKind::Site
    }

    fn confirm(&self, _data: &BookingData) -> Result<BookingPatch, ValidationError> {
        self.placement
            .as_ref()
            .ok_or(ValidationError::NoPlacement)?
            .patch()
    }
}
