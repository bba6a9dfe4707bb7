//! Instant booking: menu and placement on one screen.

use crate::api::BookingApi;
use crate::booking::model::{BookingData, BookingPatch};
use crate::booking::state::StepKind;
use crate::error::ValidationError;

use super::{MenuStep, SiteStep, StepView};

#[derive(Debug, Clone)]
pub struct MenuSiteStep {
    pub menu: MenuStep,
    pub site: SiteStep,
}

impl MenuSiteStep {
    pub fn for_data(data: &BookingData) -> Result<Self, ValidationError> {
        let menu = MenuStep::for_data(data)?;
        let site_ids = data
            .therapist
            .as_ref()
            .map(|t| t.site_ids.clone())
            .unwrap_or_default();
        Ok(Self {
            menu,
            site: SiteStep::for_data(data).restricted_to(&site_ids),
        })
    }

    pub async fn load(&mut self, api: &dyn BookingApi) {
        self.menu.load(api).await;
        self.site.load(api).await;
    }
}

impl StepView for MenuSiteStep {
    fn kind(&self) -> StepKind {
        StepKind::MenuSite
    }

    fn confirm(&self, data: &BookingData) -> Result<BookingPatch, ValidationError> {
        let menu = self.menu.confirm(data)?;
        let placement = self.site.confirm(data)?;
        Ok(menu.merged(placement))
    }
}
