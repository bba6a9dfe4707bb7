//! Menu selection: one course (radio) plus any options (toggle).

use crate::api::BookingApi;
use crate::booking::model::{
    BookingData, BookingOption, BookingPatch, Course, MenuCatalog, menu_totals,
};
use crate::booking::state::StepKind;
use crate::error::ValidationError;

use super::{FetchState, StepView};

#[derive(Debug, Clone)]
pub struct MenuStep {
    therapist_id: String,
    catalog: FetchState<MenuCatalog>,
    course: Option<Course>,
    options: Vec<BookingOption>,
}

impl MenuStep {
    /// Menu of the therapist in `data`, with any earlier selection restored.
    pub fn for_data(data: &BookingData) -> Result<Self, ValidationError> {
        let therapist = data
            .therapist
            .as_ref()
            .ok_or(ValidationError::NoTherapistSelected)?;
        Ok(Self {
            therapist_id: therapist.id.clone(),
            catalog: FetchState::Idle,
            course: data.courses.first().cloned(),
            options: data.options.clone(),
        })
    }

    pub fn for_therapist(therapist_id: impl Into<String>) -> Self {
        Self {
            therapist_id: therapist_id.into(),
            catalog: FetchState::Idle,
            course: None,
            options: Vec::new(),
        }
    }

    pub fn therapist_id(&self) -> &str {
        &self.therapist_id
    }

    pub async fn load(&mut self, api: &dyn BookingApi) {
        self.catalog = FetchState::Loading;
        let result = api.get_menu(&self.therapist_id).await;
        self.catalog = FetchState::settle(result, "menu", |m| m.courses.is_empty());
    }

    pub async fn retry(&mut self, api: &dyn BookingApi) {
        self.load(api).await;
    }

    pub fn catalog(&self) -> &FetchState<MenuCatalog> {
        &self.catalog
    }

    pub fn course(&self) -> Option<&Course> {
        self.course.as_ref()
    }

    pub fn options(&self) -> &[BookingOption] {
        &self.options
    }

    /// Choose the course, replacing any earlier one.
    pub fn select_course(&mut self, course_id: &str) -> Result<(), ValidationError> {
        let course = self
            .catalog
            .ready()
            .and_then(|m| m.courses.iter().find(|c| c.id == course_id))
            .cloned()
            .ok_or_else(|| ValidationError::UnknownCourse(course_id.to_string()))?;
        self.course = Some(course);
        Ok(())
    }

    /// Add the option if absent, remove it if present. Returns whether it is
    /// now selected.
    pub fn toggle_option(&mut self, option_id: &str) -> Result<bool, ValidationError> {
        if let Some(pos) = self.options.iter().position(|o| o.id == option_id) {
            self.options.remove(pos);
            return Ok(false);
        }
        let option = self
            .catalog
            .ready()
            .and_then(|m| m.options.iter().find(|o| o.id == option_id))
            .cloned()
            .ok_or_else(|| ValidationError::UnknownOption(option_id.to_string()))?;
        self.options.push(option);
        Ok(true)
    }

    /// `(duration, price)` of the current selection.
    pub fn totals(&self) -> Result<(u32, u32), ValidationError> {
        menu_totals(self.course.as_slice(), &self.options)
    }
}

impl StepView for MenuStep {
    fn kind(&self) -> StepKind {
        StepKind::Menu
    }

    fn confirm(&self, _data: &BookingData) -> Result<BookingPatch, ValidationError> {
        let course = self.course.clone().ok_or(ValidationError::NoCourseSelected)?;
        let (duration, price) = self.totals()?;
        Ok(BookingPatch {
            courses: Some(vec![course]),
            options: Some(self.options.clone()),
            total_duration: Some(duration),
            total_price: Some(price),
            ..Default::default()
        })
    }
}
