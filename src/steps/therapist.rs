//! Therapist selection, scoped to the chosen site when there is one.

use crate::api::{BookingApi, TherapistQuery};
use crate::booking::model::{BookingData, BookingPatch, BookingType, TherapistRef};
use crate::booking::state::StepKind;
use crate::error::ValidationError;

use super::{FetchState, StepView};

#[derive(Debug, Clone, Default)]
pub struct TherapistStep {
    query: TherapistQuery,
    therapists: FetchState<Vec<TherapistRef>>,
    selected: Option<TherapistRef>,
}

impl TherapistStep {
    pub fn for_data(data: &BookingData) -> Self {
        let query = match (&data.site, data.booking_type) {
            (Some(site), Some(BookingType::Onsite) | None) => TherapistQuery::at_site(&site.id),
            _ => TherapistQuery::default(),
        };
        Self {
            query,
            therapists: FetchState::Idle,
            selected: data.therapist.clone(),
        }
    }

    pub fn query(&self) -> &TherapistQuery {
        &self.query
    }

    pub async fn load(&mut self, api: &dyn BookingApi) {
        self.therapists = FetchState::Loading;
        let result = api.list_therapists(&self.query).await;
        self.therapists = FetchState::settle(result, "therapists", |t| t.is_empty());
    }

    pub async fn retry(&mut self, api: &dyn BookingApi) {
        self.load(api).await;
    }

    pub fn therapists(&self) -> &FetchState<Vec<TherapistRef>> {
        &self.therapists
    }

    pub fn selected(&self) -> Option<&TherapistRef> {
        self.selected.as_ref()
    }

    pub fn select(&mut self, therapist_id: &str) -> Result<(), ValidationError> {
        let therapist = self
            .therapists
            .ready()
            .and_then(|list| list.iter().find(|t| t.id == therapist_id))
            .cloned()
            .ok_or_else(|| ValidationError::UnknownTherapist(therapist_id.to_string()))?;
        self.selected = Some(therapist);
        Ok(())
    }
}

impl StepView for TherapistStep {
    fn kind(&self) -> StepKind {
        StepKind::Therapist
    }

    fn confirm(&self, _data: &BookingData) -> Result<BookingPatch, ValidationError> {
        let therapist = self
            .selected
            .clone()
            .ok_or(ValidationError::NoTherapistSelected)?;
        Ok(BookingPatch::default().with_therapist(therapist))
    }
}
