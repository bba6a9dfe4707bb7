//! Recommended therapists, then menu and placement for the one chosen.

use futures::future::join_all;
use serde::Serialize;
use tracing::warn;

use crate::api::BookingApi;
use crate::booking::model::{BookingData, BookingPatch, Recommendation, TherapistRef};
use crate::booking::state::StepKind;
use crate::error::ValidationError;

use super::{FetchState, MenuStep, SiteStep, StepView};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub therapist: TherapistRef,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct AiSuggestionStep {
    recommendations: Vec<Recommendation>,
    suggestions: FetchState<Vec<Suggestion>>,
    chosen: Option<TherapistRef>,
    pub menu: Option<MenuStep>,
    pub site: Option<SiteStep>,
}

impl AiSuggestionStep {
    pub fn for_data(data: &BookingData) -> Self {
        Self {
            recommendations: data.recommendations.clone(),
            ..Default::default()
        }
    }

    /// Look up every recommended therapist. Ones that cannot be fetched are
    /// left out rather than failing the whole list.
    pub async fn resolve(&mut self, api: &dyn BookingApi) {
        self.suggestions = FetchState::Loading;
        let lookups = self
            .recommendations
            .iter()
            .map(|rec| api.get_therapist(&rec.therapist_id));
        let results = join_all(lookups).await;

        let mut found = Vec::with_capacity(results.len());
        for (rec, result) in self.recommendations.iter().zip(results) {
            match result {
                Ok(therapist) => found.push(Suggestion {
                    therapist,
                    reason: rec.reason.clone(),
                }),
                Err(e) => {
                    warn!(therapist_id = %rec.therapist_id, error = %e, "Dropping recommendation");
                }
            }
        }
        self.suggestions = FetchState::settle(Ok(found), "suggestions", |s| s.is_empty());
    }

    pub fn suggestions(&self) -> &FetchState<Vec<Suggestion>> {
        &self.suggestions
    }

    pub fn chosen(&self) -> Option<&TherapistRef> {
        self.chosen.as_ref()
    }

    /// Pick one of the resolved suggestions. Resets menu and placement.
    pub fn choose_therapist(&mut self, therapist_id: &str) -> Result<(), ValidationError> {
        let therapist = self
            .suggestions
            .ready()
            .and_then(|s| s.iter().find(|s| s.therapist.id == therapist_id))
            .map(|s| s.therapist.clone())
            .ok_or_else(|| ValidationError::UnknownTherapist(therapist_id.to_string()))?;
        self.menu = Some(MenuStep::for_therapist(&therapist.id));
        self.site = Some(SiteStep::default().restricted_to(&therapist.site_ids));
        self.chosen = Some(therapist);
        Ok(())
    }

    /// Load menu and sites for the chosen therapist.
    pub async fn load(&mut self, api: &dyn BookingApi) {
        if let Some(menu) = self.menu.as_mut() {
            menu.load(api).await;
        }
        if let Some(site) = self.site.as_mut() {
            site.load(api).await;
        }
    }
}

impl StepView for AiSuggestionStep {
    fn kind(&self) -> StepKind {
        StepKind::AiSuggestion
    }

    fn confirm(&self, data: &BookingData) -> Result<BookingPatch, ValidationError> {
        let (Some(therapist), Some(menu), Some(site)) = (&self.chosen, &self.menu, &self.site)
        else {
            return Err(ValidationError::NoTherapistSelected);
        };
        let patch = BookingPatch::default()
            .with_therapist(therapist.clone())
            .merged(menu.confirm(data)?)
            .merged(site.confirm(data)?);
        Ok(patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeBookingApi;
    use crate::booking::model::{BookingPattern, BookingType};

    fn data() -> BookingData {
        let mut data = BookingData::new(BookingPattern::AiRecommend);
        data.recommendations = vec![
            Recommendation {
                therapist_id: "t1".into(),
                reason: "deep tissue".into(),
            },
            Recommendation {
                therapist_id: "t9".into(),
                reason: "retired".into(),
            },
        ];
        data
    }

    #[tokio::test]
    async fn unknown_recommendations_are_dropped() {
        let api = FakeBookingApi::with_catalog();
        let mut step = AiSuggestionStep::for_data(&data());
        step.resolve(&api).await;

        let suggestions = step.suggestions().ready().unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].therapist.name, "Aoi");
        assert_eq!(suggestions[0].reason, "deep tissue");
    }

    #[tokio::test]
    async fn nothing_resolvable_is_empty() {
        let api = FakeBookingApi::default();
        let mut step = AiSuggestionStep::for_data(&data());
        step.resolve(&api).await;
        assert_eq!(*step.suggestions(), FetchState::Empty);
        assert!(step.choose_therapist("t1").is_err());
    }

    #[tokio::test]
    async fn confirm_emits_therapist_menu_and_site() {
        let api = FakeBookingApi::with_catalog();
        let data = data();
        let mut step = AiSuggestionStep::for_data(&data);
        assert_eq!(step.confirm(&data), Err(ValidationError::NoTherapistSelected));

        step.resolve(&api).await;
        step.choose_therapist("t1").unwrap();
        step.load(&api).await;

        let sites = step.site.as_ref().unwrap().sites().ready().unwrap();
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].id, "s1");

        step.menu.as_mut().unwrap().select_course("mc_1").unwrap();
        assert_eq!(step.confirm(&data), Err(ValidationError::NoPlacement));

        step.site.as_mut().unwrap().select_site("s1").unwrap();
        let patch = step.confirm(&data).unwrap();
        assert_eq!(patch.therapist.unwrap().id, "t1");
        assert_eq!(patch.total_price, Some(3000));
        assert_eq!(patch.booking_type, Some(BookingType::Onsite));
        assert_eq!(patch.site.unwrap().id, "s1");
    }
}
