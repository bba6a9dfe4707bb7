//! BookingWizard: owns the accumulator and drives step progression,
//! the KYC gate, resumption after sign-in, and submission.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ai::IdVerification;
use crate::api::BookingApi;
use crate::error::{ValidationError, WizardError};
use crate::navigation::{Clock, Navigator, SystemClock};
use crate::session::{AuthContext, SessionStore, keys};

use super::model::{BookingData, BookingPatch, BookingPattern, BookingType, CreateBookingRequest};
use super::schedule::{self, DATE_FORMAT, SlotPolicy, TIME_FORMAT};
use super::state::{Field, StepKind, StepSpec, WizardGate};

/// Collaborators a wizard talks to.
#[derive(Clone)]
pub struct WizardContext {
    pub api: Arc<dyn BookingApi>,
    /// Session-scoped storage (snapshot and return URL).
    pub session: Arc<dyn SessionStore>,
    pub auth: AuthContext,
    pub navigator: Arc<dyn Navigator>,
    pub clock: Arc<dyn Clock>,
    pub slots: SlotPolicy,
}

impl WizardContext {
    pub fn new(
        api: Arc<dyn BookingApi>,
        session: Arc<dyn SessionStore>,
        auth: AuthContext,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            api,
            session,
            auth,
            navigator,
            clock: Arc::new(SystemClock),
            slots: SlotPolicy::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_slot_policy(mut self, slots: SlotPolicy) -> Self {
        self.slots = slots;
        self
    }
}

/// What `submit` did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// The backend accepted the booking; the wizard is at Complete.
    Created { booking_id: String },
    /// Not signed in. The wizard state was stashed and the user sent to log in.
    Deferred { login_url: String },
}

/// Serializable snapshot of a wizard for front ends.
#[derive(Debug, Clone, Serialize)]
pub struct WizardStatus {
    pub wizard_id: Uuid,
    pub pattern: BookingPattern,
    /// 1-based.
    pub step: usize,
    pub step_count: usize,
    pub view: StepKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate: Option<WizardGate>,
    pub data: BookingData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<String>,
    pub resumed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_url: Option<String>,
}

/// One run of the booking wizard.
pub struct BookingWizard {
    id: Uuid,
    data: BookingData,
    step: usize,
    gate: Option<WizardGate>,
    kyc_cleared: bool,
    error: Option<String>,
    booking_id: Option<String>,
    resumed: bool,
    return_url: Option<String>,
    ctx: WizardContext,
}

impl BookingWizard {
    /// Start a wizard for `pattern`, seeded from a deep link.
    ///
    /// A snapshot left in session storage by a deferred submission is
    /// consumed and merged over the seed.
    pub async fn mount(
        pattern: BookingPattern,
        seed: BookingPatch,
        ctx: WizardContext,
    ) -> Result<Self, WizardError> {
        let id = Uuid::new_v4();
        let mut data = BookingData::new(pattern);
        data.apply(seed);

        let snapshot = ctx.session.take(keys::BOOKING_IN_PROGRESS).await?;
        let return_url = ctx.session.take(keys::BOOKING_RETURN_URL).await?;

        let mut resumed = false;
        if let Some(raw) = snapshot {
            match serde_json::from_str::<BookingData>(&raw) {
                Ok(stored) => {
                    if stored.pattern != pattern {
                        warn!(
                            wizard_id = %id,
                            requested = %pattern,
                            stored = %stored.pattern,
                            "Resumed booking uses its stored pattern"
                        );
                        data.pattern = stored.pattern;
                    }
                    data.apply(stored.into_patch());
                    resumed = true;
                }
                Err(e) => {
                    warn!(wizard_id = %id, error = %e, "Discarding unreadable booking snapshot");
                }
            }
        }

        for field in data.pattern.seed_requirements() {
            if !data.has(*field) {
                return Err(WizardError::MissingSeed {
                    pattern: data.pattern.to_string(),
                    field: *field,
                });
            }
        }

        let step = if resumed { resume_index(&data) } else { 0 };
        let wizard = Self {
            id,
            data,
            step,
            gate: None,
            kyc_cleared: false,
            error: None,
            booking_id: None,
            resumed,
            return_url,
            ctx,
        };
        info!(
            wizard_id = %wizard.id,
            pattern = %wizard.data.pattern,
            step = %wizard.current_view(),
            resumed,
            "Booking wizard mounted"
        );
        Ok(wizard)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn pattern(&self) -> BookingPattern {
        self.data.pattern
    }

    pub fn data(&self) -> &BookingData {
        &self.data
    }

    /// 1-based step number shown in the progress bar.
    pub fn step_number(&self) -> usize {
        self.step + 1
    }

    pub fn step_count(&self) -> usize {
        self.data.pattern.step_count()
    }

    pub fn gate(&self) -> Option<WizardGate> {
        self.gate
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn booking_id(&self) -> Option<&str> {
        self.booking_id.as_deref()
    }

    /// Route stored before the sign-in redirect, if this wizard resumed one.
    pub fn return_url(&self) -> Option<&str> {
        self.return_url.as_deref()
    }

    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    pub fn context(&self) -> &WizardContext {
        &self.ctx
    }

    fn current_spec(&self) -> &'static StepSpec {
        &self.data.pattern.steps()[self.step]
    }

    /// The view to render: the gate's when one is pending, else the step's.
    pub fn current_view(&self) -> StepKind {
        match self.gate {
            Some(gate) => gate.view(),
            None => self.current_spec().kind,
        }
    }

    pub fn status(&self) -> WizardStatus {
        WizardStatus {
            wizard_id: self.id,
            pattern: self.data.pattern,
            step: self.step_number(),
            step_count: self.step_count(),
            view: self.current_view(),
            gate: self.gate,
            data: self.data.clone(),
            error: self.error.clone(),
            booking_id: self.booking_id.clone(),
            resumed: self.resumed,
            return_url: self.return_url.clone(),
        }
    }

    /// Commit the current step's output and move forward.
    pub async fn advance(&mut self, patch: BookingPatch) -> Result<StepKind, WizardError> {
        if let Some(gate) = self.gate {
            return Err(WizardError::GatePending(gate));
        }
        let spec = self.current_spec();
        if matches!(spec.kind, StepKind::ConfirmPay | StepKind::Complete) {
            return Err(WizardError::WrongStep {
                action: "advance",
                step: spec.kind,
            });
        }

        let next = self.merged_for(spec, patch)?;
        for field in spec.mandatory {
            if !next.has(*field) {
                return Err(ValidationError::MissingField(*field).into());
            }
        }

        self.data = next;
        self.step += 1;
        self.error = None;

        if self.data.booking_type == Some(BookingType::Dispatch)
            && !self.kyc_cleared
            && !self.ctx.auth.is_authenticated().await
        {
            self.gate = Some(WizardGate::Kyc);
            info!(wizard_id = %self.id, "Dispatch booking needs identity verification");
        }

        info!(
            wizard_id = %self.id,
            from = %spec.kind,
            to = %self.current_view(),
            step = self.step_number(),
            "Wizard advanced"
        );
        Ok(self.current_view())
    }

    /// Merge fields owned by the current step without moving.
    pub fn amend(&mut self, patch: BookingPatch) -> Result<(), WizardError> {
        if let Some(gate) = self.gate {
            return Err(WizardError::GatePending(gate));
        }
        let spec = self.current_spec();
        self.data = self.merged_for(spec, patch)?;
        debug!(wizard_id = %self.id, step = %spec.kind, "Wizard data amended");
        Ok(())
    }

    fn merged_for(&self, spec: &StepSpec, patch: BookingPatch) -> Result<BookingData, WizardError> {
        if let Some(field) = patch.touched_fields().into_iter().find(|f| !spec.owns(*f)) {
            return Err(WizardError::FieldNotOwned {
                step: spec.kind,
                field,
            });
        }
        let claimed_totals = (patch.total_duration, patch.total_price);
        let claimed_at = patch.scheduled_at.clone();

        let mut next = self.data.clone();
        next.apply(patch);
        check_selection(&next)?;
        if spec.owns(Field::Totals) {
            derive_totals(&mut next, claimed_totals)?;
        }
        if spec.owns(Field::Schedule) {
            self.derive_schedule(&mut next, claimed_at)?;
        }
        Ok(next)
    }

    /// Check the picked date and slot against the booking window and the
    /// clock, then fill in `scheduled_at`.
    fn derive_schedule(
        &self,
        data: &mut BookingData,
        claimed_at: Option<String>,
    ) -> Result<(), ValidationError> {
        let Some(raw_date) = data.scheduled_date.clone() else {
            if data.scheduled_time.is_some() || data.scheduled_at.is_some() {
                return Err(ValidationError::NoDateSelected);
            }
            return Ok(());
        };
        let now = self.ctx.clock.now();
        let date = schedule::parse_date(&raw_date)?;
        if !self.ctx.slots.in_window(date, now.date()) {
            return Err(ValidationError::DateUnavailable {
                date: raw_date.trim().to_string(),
            });
        }
        data.scheduled_date = Some(date.format(DATE_FORMAT).to_string());

        let Some(raw_time) = data.scheduled_time.clone() else {
            if claimed_at.is_some() {
                return Err(ValidationError::NoTimeSelected);
            }
            data.scheduled_at = None;
            return Ok(());
        };
        let time = schedule::parse_time(&raw_time, date)?;
        if !self.ctx.slots.is_offered(date, time, now) {
            return Err(ValidationError::SlotUnavailable {
                date: date.format(DATE_FORMAT).to_string(),
                time: time.format(TIME_FORMAT).to_string(),
            });
        }

        let expected = schedule::scheduled_at(date, time);
        if claimed_at.is_some_and(|at| at != expected) {
            return Err(ValidationError::ScheduleMismatch { expected });
        }
        data.scheduled_time = Some(time.format(TIME_FORMAT).to_string());
        data.scheduled_at = Some(expected);
        Ok(())
    }

    /// Step back. Dismisses a pending gate first; past the first step it
    /// hands off to the navigator. The accumulator is left untouched.
    pub fn retreat(&mut self) -> StepKind {
        if self.booking_id.is_some() {
            debug!(wizard_id = %self.id, "Retreat ignored after booking was created");
            return self.current_view();
        }

        if let Some(gate) = self.gate.take() {
            self.step = self.step.saturating_sub(1);
            info!(wizard_id = %self.id, gate = %gate, "Gate dismissed");
        } else if self.step > 0 {
            self.step -= 1;
        } else {
            self.ctx.navigator.back();
            return self.current_view();
        }

        self.error = None;
        debug!(wizard_id = %self.id, step = %self.current_view(), "Wizard retreated");
        self.current_view()
    }

    /// Resolve the KYC gate with a verification result.
    pub fn complete_kyc(&mut self, verification: &IdVerification) -> Result<StepKind, WizardError> {
        if self.gate != Some(WizardGate::Kyc) {
            return Err(WizardError::NoGatePending(WizardGate::Kyc));
        }
        if !verification.is_valid {
            warn!(wizard_id = %self.id, reason = %verification.reason, "ID verification rejected");
            return Err(ValidationError::KycRejected(verification.reason.clone()).into());
        }
        self.gate = None;
        self.kyc_cleared = true;
        info!(wizard_id = %self.id, "Identity verified");
        Ok(self.current_view())
    }

    /// Book it. Only valid at Confirm+Pay.
    ///
    /// `current_route` is where the user should land after signing in.
    pub async fn submit(&mut self, current_route: &str) -> Result<SubmitOutcome, WizardError> {
        if let Some(gate) = self.gate {
            return Err(WizardError::GatePending(gate));
        }
        let spec = self.current_spec();
        if spec.kind != StepKind::ConfirmPay {
            return Err(WizardError::WrongStep {
                action: "submit",
                step: spec.kind,
            });
        }

        let request = CreateBookingRequest::from_data(&self.data)?;

        let Some(token) = self.ctx.auth.token().await else {
            let snapshot = serde_json::to_string(&self.data)?;
            self.ctx
                .session
                .set(keys::BOOKING_IN_PROGRESS, &snapshot)
                .await?;
            self.ctx
                .session
                .set(keys::BOOKING_RETURN_URL, current_route)
                .await?;
            let login_url = self.ctx.navigator.redirect_to_login(current_route);
            info!(wizard_id = %self.id, "Booking deferred until sign-in");
            return Ok(SubmitOutcome::Deferred { login_url });
        };

        let created = match self.ctx.api.create_booking(&token, &request).await {
            Ok(created) => created,
            Err(e) => {
                warn!(wizard_id = %self.id, error = %e, "Booking submission failed");
                self.error = Some(e.to_string());
                return Err(WizardError::Submission(e));
            }
        };

        self.booking_id = Some(created.id.clone());
        self.step += 1;
        self.error = None;
        self.clear_snapshot().await;

        let api = Arc::clone(&self.ctx.api);
        let wizard_id = self.id;
        let booking_id = created.id.clone();
        tokio::spawn(async move {
            if let Err(e) = api.notify_booking_confirmed(&token, &booking_id).await {
                warn!(
                    wizard_id = %wizard_id,
                    booking_id = %booking_id,
                    error = %e,
                    "Booking confirmation notice failed"
                );
            }
        });

        info!(
            wizard_id = %self.id,
            booking_id = %created.id,
            price = request.price,
            "Booking completed"
        );
        Ok(SubmitOutcome::Created {
            booking_id: created.id,
        })
    }

    /// Abandon the wizard, dropping any stashed snapshot.
    pub async fn cancel(&mut self) {
        self.clear_snapshot().await;
        info!(wizard_id = %self.id, "Booking wizard cancelled");
    }

    async fn clear_snapshot(&self) {
        for key in [keys::BOOKING_IN_PROGRESS, keys::BOOKING_RETURN_URL] {
            if let Err(e) = self.ctx.session.remove(key).await {
                warn!(wizard_id = %self.id, key, error = %e, "Failed to clear session key");
            }
        }
    }
}

/// Course radio and option toggle invariants.
fn check_selection(data: &BookingData) -> Result<(), ValidationError> {
    if data.courses.len() > 1 {
        return Err(ValidationError::SingleCourseOnly);
    }
    for (i, option) in data.options.iter().enumerate() {
        if data.options[..i].iter().any(|o| o.id == option.id) {
            return Err(ValidationError::DuplicateOption(option.id.clone()));
        }
    }
    Ok(())
}

/// Fill in the totals from the menu. Totals sent along with the menu must
/// agree with it.
fn derive_totals(
    data: &mut BookingData,
    (claimed_duration, claimed_price): (Option<u32>, Option<u32>),
) -> Result<(), ValidationError> {
    if data.courses.is_empty() {
        data.total_duration = None;
        data.total_price = None;
        return Ok(());
    }
    let (duration, price) = data.menu_totals()?;
    if claimed_duration.is_some_and(|d| d != duration) || claimed_price.is_some_and(|p| p != price)
    {
        return Err(ValidationError::TotalsMismatch { duration, price });
    }
    data.total_duration = Some(duration);
    data.total_price = Some(price);
    Ok(())
}

/// Where a resumed wizard opens: the first step still missing a mandatory
/// field, else Confirm+Pay.
fn resume_index(data: &BookingData) -> usize {
    let steps = data.pattern.steps();
    let confirm = steps
        .iter()
        .position(|s| s.kind == StepKind::ConfirmPay)
        .unwrap_or(0);
    steps[..confirm]
        .iter()
        .position(|spec| spec.mandatory.iter().any(|f| !data.has(*f)))
        .unwrap_or(confirm)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::NaiveDateTime;
    use proptest::prelude::*;

    use super::*;
    use crate::api::fake::FakeBookingApi;
    use crate::booking::model::{Course, SiteRef, TherapistRef};
    use crate::navigation::{FixedClock, HistoryNavigator};
    use crate::session::MemorySessionStore;

    struct Harness {
        api: Arc<FakeBookingApi>,
        session: Arc<MemorySessionStore>,
        auth: AuthContext,
        nav: Arc<HistoryNavigator>,
        ctx: WizardContext,
    }

    fn harness_with(api: FakeBookingApi) -> Harness {
        let api = Arc::new(api);
        let session = Arc::new(MemorySessionStore::new());
        let auth = AuthContext::new(Arc::new(MemorySessionStore::new()));
        let nav = Arc::new(HistoryNavigator::new("/login"));
        let now = NaiveDateTime::parse_from_str("2025-05-24 09:00:00", "%Y-%m-%d %H:%M:%S")
            .unwrap();
        let ctx = WizardContext::new(api.clone(), session.clone(), auth.clone(), nav.clone())
            .with_clock(Arc::new(FixedClock(now)));
        Harness {
            api,
            session,
            auth,
            nav,
            ctx,
        }
    }

    fn harness() -> Harness {
        harness_with(FakeBookingApi::with_catalog())
    }

    fn course() -> Course {
        Course {
            id: "mc_1".into(),
            name: "深層筋ボディケア".into(),
            duration: 30,
            base_price: 3000,
            description: None,
        }
    }

    fn direct_seed() -> BookingPatch {
        BookingPatch::default().with_therapist(TherapistRef::new("t1", "Aoi"))
    }

    fn menu_site_patch() -> BookingPatch {
        BookingPatch {
            courses: Some(vec![course()]),
            total_duration: Some(30),
            total_price: Some(3000),
            site: Some(SiteRef::new("s1", "Shibuya Studio", "1-1 Shibuya")),
            booking_type: Some(BookingType::Onsite),
            ..Default::default()
        }
    }

    fn schedule_patch() -> BookingPatch {
        BookingPatch {
            scheduled_date: Some("2025-05-25".into()),
            scheduled_time: Some("14:00".into()),
            scheduled_at: Some("2025-05-25T14:00:00".into()),
            ..Default::default()
        }
    }

    /// Notices go out on a spawned task; give it a moment to land.
    async fn notified(api: &FakeBookingApi) -> Vec<String> {
        for _ in 0..50 {
            let seen = api.notified.lock().unwrap().clone();
            if !seen.is_empty() {
                return seen;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        api.notified.lock().unwrap().clone()
    }

    async fn at_confirm(h: &Harness) -> BookingWizard {
        let mut wizard = BookingWizard::mount(BookingPattern::Direct, direct_seed(), h.ctx.clone())
            .await
            .unwrap();
        wizard.advance(menu_site_patch()).await.unwrap();
        wizard.advance(schedule_patch()).await.unwrap();
        assert_eq!(wizard.current_view(), StepKind::ConfirmPay);
        wizard
    }

    #[tokio::test]
    async fn direct_requires_seeded_therapist() {
        let h = harness();
        let err = BookingWizard::mount(BookingPattern::Direct, BookingPatch::default(), h.ctx)
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            WizardError::MissingSeed {
                field: Field::Therapist,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn advance_rejects_foreign_fields() {
        let h = harness();
        let mut wizard =
            BookingWizard::mount(BookingPattern::FromMap, BookingPatch::default(), h.ctx)
                .await
                .unwrap();
        let err = wizard
            .advance(BookingPatch::default().with_therapist(TherapistRef::new("t1", "Aoi")))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WizardError::FieldNotOwned {
                step: StepKind::Site,
                field: Field::Therapist
            }
        ));
        assert_eq!(wizard.step_number(), 1);
    }

    #[tokio::test]
    async fn advance_checks_mandatory_fields() {
        let h = harness();
        let mut wizard =
            BookingWizard::mount(BookingPattern::FromMap, BookingPatch::default(), h.ctx)
                .await
                .unwrap();
        let err = wizard.advance(BookingPatch::default()).await.unwrap_err();
        assert!(matches!(
            err,
            WizardError::Validation(ValidationError::MissingField(Field::BookingType))
        ));
        assert_eq!(wizard.current_view(), StepKind::Site);
    }

    #[tokio::test]
    async fn menu_rejects_two_courses_and_duplicate_options() {
        let h = harness();
        let mut wizard = BookingWizard::mount(BookingPattern::Direct, direct_seed(), h.ctx)
            .await
            .unwrap();

        let mut patch = menu_site_patch();
        patch.courses = Some(vec![course(), course()]);
        assert!(matches!(
            wizard.advance(patch).await.unwrap_err(),
            WizardError::Validation(ValidationError::SingleCourseOnly)
        ));

        let option = h.api.menu.options[0].clone();
        let mut patch = menu_site_patch();
        patch.options = Some(vec![option.clone(), option]);
        assert!(matches!(
            wizard.advance(patch).await.unwrap_err(),
            WizardError::Validation(ValidationError::DuplicateOption(id)) if id == "op_1"
        ));
        assert!(wizard.data().courses.is_empty());
    }

    #[tokio::test]
    async fn retreat_keeps_data_and_leaves_from_first_step() {
        let h = harness();
        let mut wizard = BookingWizard::mount(BookingPattern::Direct, direct_seed(), h.ctx.clone())
            .await
            .unwrap();
        wizard.advance(menu_site_patch()).await.unwrap();
        assert_eq!(wizard.retreat(), StepKind::MenuSite);
        assert_eq!(wizard.data().courses[0].id, "mc_1");
        assert_eq!(h.nav.back_count(), 0);

        wizard.retreat();
        assert_eq!(h.nav.back_count(), 1);
        assert_eq!(wizard.step_number(), 1);
    }

    #[tokio::test]
    async fn dispatch_raises_kyc_gate_for_guests() {
        let h = harness();
        let mut wizard = BookingWizard::mount(BookingPattern::Direct, direct_seed(), h.ctx)
            .await
            .unwrap();
        let mut patch = menu_site_patch();
        patch.site = None;
        patch.booking_type = Some(BookingType::Dispatch);
        patch.dispatch_address = Some("2-2 Ebisu".into());

        assert_eq!(wizard.advance(patch).await.unwrap(), StepKind::Kyc);
        assert_eq!(wizard.gate(), Some(WizardGate::Kyc));
        assert!(matches!(
            wizard.advance(schedule_patch()).await.unwrap_err(),
            WizardError::GatePending(WizardGate::Kyc)
        ));

        let rejected = IdVerification {
            name: None,
            birthdate: None,
            is_valid: false,
            reason: "blurry".into(),
        };
        assert!(wizard.complete_kyc(&rejected).is_err());
        assert_eq!(wizard.gate(), Some(WizardGate::Kyc));

        let ok = IdVerification {
            is_valid: true,
            reason: "ok".into(),
            ..rejected
        };
        assert_eq!(wizard.complete_kyc(&ok).unwrap(), StepKind::DateTime);
        assert!(wizard.gate().is_none());

        // Cleared once per wizard.
        wizard.advance(schedule_patch()).await.unwrap();
        assert_eq!(wizard.current_view(), StepKind::ConfirmPay);
    }

    #[tokio::test]
    async fn retreat_dismisses_gate_and_steps_back() {
        let h = harness();
        let mut wizard =
            BookingWizard::mount(BookingPattern::FromTherapist, BookingPatch::default(), h.ctx)
                .await
                .unwrap();
        wizard
            .advance(BookingPatch::default().with_therapist(TherapistRef::new("t2", "Ren")))
            .await
            .unwrap();
        wizard
            .advance(BookingPatch {
                booking_type: Some(BookingType::Dispatch),
                dispatch_address: Some("3-3 Meguro".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(wizard.current_view(), StepKind::Kyc);

        assert_eq!(wizard.retreat(), StepKind::Site);
        assert!(wizard.gate().is_none());
        assert_eq!(wizard.data().booking_type, Some(BookingType::Dispatch));
    }

    #[tokio::test]
    async fn signed_in_dispatch_skips_kyc() {
        let h = harness();
        h.auth.sign_in("tok").await.unwrap();
        let mut wizard = BookingWizard::mount(BookingPattern::Direct, direct_seed(), h.ctx)
            .await
            .unwrap();
        let mut patch = menu_site_patch();
        patch.site = None;
        patch.booking_type = Some(BookingType::Dispatch);
        patch.dispatch_address = Some("2-2 Ebisu".into());
        assert_eq!(wizard.advance(patch).await.unwrap(), StepKind::DateTime);
    }

    #[tokio::test]
    async fn deferred_submit_stashes_and_redirects() {
        let h = harness();
        let mut wizard = at_confirm(&h).await;

        let outcome = wizard.submit("/booking/new?pattern=DIRECT").await.unwrap();
        assert_eq!(
            outcome,
            SubmitOutcome::Deferred {
                login_url: "/login?returnUrl=%2Fbooking%2Fnew%3Fpattern%3DDIRECT".into()
            }
        );
        assert!(h.api.created().is_empty());
        assert_eq!(
            h.session.get(keys::BOOKING_RETURN_URL).await.unwrap().as_deref(),
            Some("/booking/new?pattern=DIRECT")
        );
        let raw = h.session.get(keys::BOOKING_IN_PROGRESS).await.unwrap().unwrap();
        let stored: BookingData = serde_json::from_str(&raw).unwrap();
        assert_eq!(&stored, wizard.data());
        assert_eq!(wizard.current_view(), StepKind::ConfirmPay);
    }

    #[tokio::test]
    async fn resume_merges_snapshot_and_consumes_keys() {
        let h = harness();
        let mut first = at_confirm(&h).await;
        first
            .amend(BookingPatch {
                notes: Some("quiet room please".into()),
                ..Default::default()
            })
            .unwrap();
        first.submit("/booking/new").await.unwrap();

        let resumed = BookingWizard::mount(BookingPattern::Direct, direct_seed(), h.ctx.clone())
            .await
            .unwrap();
        assert!(resumed.is_resumed());
        assert_eq!(resumed.current_view(), StepKind::ConfirmPay);
        assert_eq!(resumed.data().notes.as_deref(), Some("quiet room please"));
        assert_eq!(resumed.return_url(), Some("/booking/new"));
        assert!(h.session.get(keys::BOOKING_IN_PROGRESS).await.unwrap().is_none());
        assert!(h.session.get(keys::BOOKING_RETURN_URL).await.unwrap().is_none());

        let fresh = BookingWizard::mount(BookingPattern::Direct, direct_seed(), h.ctx)
            .await
            .unwrap();
        assert!(!fresh.is_resumed());
        assert_eq!(fresh.step_number(), 1);
    }

    #[tokio::test]
    async fn resume_opens_at_first_incomplete_step() {
        let h = harness();
        let mut partial = BookingData::new(BookingPattern::FromMap);
        partial.site = Some(SiteRef::new("s1", "Shibuya Studio", "1-1 Shibuya"));
        partial.booking_type = Some(BookingType::Onsite);
        h.session
            .set(keys::BOOKING_IN_PROGRESS, &serde_json::to_string(&partial).unwrap())
            .await
            .unwrap();

        let wizard = BookingWizard::mount(BookingPattern::FromMap, BookingPatch::default(), h.ctx)
            .await
            .unwrap();
        assert_eq!(wizard.current_view(), StepKind::Therapist);
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_ignored() {
        let h = harness();
        h.session
            .set(keys::BOOKING_IN_PROGRESS, "{not json")
            .await
            .unwrap();
        let wizard = BookingWizard::mount(BookingPattern::Direct, direct_seed(), h.ctx)
            .await
            .unwrap();
        assert!(!wizard.is_resumed());
        assert!(h.session.get(keys::BOOKING_IN_PROGRESS).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stored_pattern_wins_on_resume() {
        let h = harness();
        let mut stored = BookingData::new(BookingPattern::Direct);
        stored.therapist = Some(TherapistRef::new("t1", "Aoi"));
        h.session
            .set(keys::BOOKING_IN_PROGRESS, &serde_json::to_string(&stored).unwrap())
            .await
            .unwrap();
        let wizard =
            BookingWizard::mount(BookingPattern::FromMap, BookingPatch::default(), h.ctx)
                .await
                .unwrap();
        assert_eq!(wizard.pattern(), BookingPattern::Direct);
        assert_eq!(wizard.current_view(), StepKind::MenuSite);
    }

    #[tokio::test]
    async fn authenticated_submit_completes() {
        let h = harness();
        h.auth.sign_in("tok-1").await.unwrap();
        let mut wizard = at_confirm(&h).await;

        let outcome = wizard.submit("/booking/new").await.unwrap();
        assert_eq!(
            outcome,
            SubmitOutcome::Created {
                booking_id: "bk_1".into()
            }
        );
        assert_eq!(wizard.current_view(), StepKind::Complete);
        assert_eq!(wizard.step_number(), 4);

        let created = h.api.created();
        assert_eq!(created[0].0, "tok-1");
        assert_eq!(created[0].1.scheduled_at, "2025-05-25T14:00:00");
        assert_eq!(created[0].1.items[0].item_id, "mc_1");
        assert_eq!(notified(&h.api).await, vec!["bk_1".to_string()]);

        // Completed wizards stay put.
        assert_eq!(wizard.retreat(), StepKind::Complete);
        assert!(wizard.advance(BookingPatch::default()).await.is_err());
    }

    #[tokio::test]
    async fn failed_submission_stays_with_error() {
        let h = harness_with(FakeBookingApi {
            fail_create: true,
            ..FakeBookingApi::with_catalog()
        });
        h.auth.sign_in("tok").await.unwrap();
        let mut wizard = at_confirm(&h).await;

        assert!(matches!(
            wizard.submit("/booking/new").await.unwrap_err(),
            WizardError::Submission(_)
        ));
        assert_eq!(wizard.current_view(), StepKind::ConfirmPay);
        assert!(wizard.error().is_some());
        assert!(wizard.booking_id().is_none());
    }

    #[tokio::test]
    async fn notice_failure_does_not_block_completion() {
        let h = harness_with(FakeBookingApi {
            fail_notify: true,
            ..FakeBookingApi::with_catalog()
        });
        h.auth.sign_in("tok").await.unwrap();
        let mut wizard = at_confirm(&h).await;
        wizard.submit("/booking/new").await.unwrap();
        assert_eq!(wizard.current_view(), StepKind::Complete);
        assert!(wizard.error().is_none());
    }

    #[tokio::test]
    async fn hanging_notice_does_not_hold_up_submit() {
        let h = harness_with(FakeBookingApi {
            stall_notify: true,
            ..FakeBookingApi::with_catalog()
        });
        h.auth.sign_in("tok").await.unwrap();
        let mut wizard = at_confirm(&h).await;

        let outcome = tokio::time::timeout(Duration::from_secs(2), wizard.submit("/booking/new"))
            .await
            .expect("submit waited on the confirmation notice")
            .unwrap();
        assert_eq!(
            outcome,
            SubmitOutcome::Created {
                booking_id: "bk_1".into()
            }
        );
        assert_eq!(wizard.current_view(), StepKind::Complete);
        assert_eq!(wizard.booking_id(), Some("bk_1"));
        assert!(h.session.get(keys::BOOKING_IN_PROGRESS).await.unwrap().is_none());
        assert_eq!(notified(&h.api).await, vec!["bk_1".to_string()]);
    }

    #[tokio::test]
    async fn totals_come_from_the_menu() {
        let h = harness();
        let mut wizard = BookingWizard::mount(BookingPattern::Direct, direct_seed(), h.ctx)
            .await
            .unwrap();

        let mut patch = menu_site_patch();
        patch.total_duration = Some(1);
        patch.total_price = Some(1);
        assert!(matches!(
            wizard.advance(patch).await.unwrap_err(),
            WizardError::Validation(ValidationError::TotalsMismatch {
                duration: 30,
                price: 3000
            })
        ));
        assert_eq!(wizard.step_number(), 1);
        assert!(wizard.data().total_price.is_none());

        let option = h.api.menu.options[0].clone();
        let mut patch = menu_site_patch();
        patch.options = Some(vec![option]);
        patch.total_duration = None;
        patch.total_price = None;
        wizard.advance(patch).await.unwrap();
        assert_eq!(wizard.data().total_duration, Some(45));
        assert_eq!(wizard.data().total_price, Some(4500));
    }

    #[tokio::test]
    async fn schedule_must_be_an_offered_slot() {
        let h = harness();
        let mut wizard = BookingWizard::mount(BookingPattern::Direct, direct_seed(), h.ctx)
            .await
            .unwrap();
        wizard.advance(menu_site_patch()).await.unwrap();

        let pick = |date: &str, time: &str| BookingPatch {
            scheduled_date: Some(date.into()),
            scheduled_time: Some(time.into()),
            ..Default::default()
        };

        // Past, and past the end of the window.
        for date in ["2020-01-01", "2025-06-30"] {
            assert!(matches!(
                wizard.advance(pick(date, "14:00")).await.unwrap_err(),
                WizardError::Validation(ValidationError::DateUnavailable { .. })
            ));
        }
        // Off the hourly grid, and too soon on the same day (clock is 09:00).
        for (date, time) in [("2025-05-25", "03:00"), ("2025-05-25", "14:30"), ("2025-05-24", "11:00")] {
            assert!(matches!(
                wizard.advance(pick(date, time)).await.unwrap_err(),
                WizardError::Validation(ValidationError::SlotUnavailable { .. })
            ));
        }
        assert_eq!(wizard.current_view(), StepKind::DateTime);
        assert!(wizard.data().scheduled_at.is_none());

        wizard.advance(pick("2025-05-24", "12:00")).await.unwrap();
        assert_eq!(wizard.data().scheduled_at.as_deref(), Some("2025-05-24T12:00:00"));
    }

    #[tokio::test]
    async fn scheduled_at_is_derived_from_date_and_time() {
        let h = harness();
        let mut wizard = BookingWizard::mount(BookingPattern::Direct, direct_seed(), h.ctx)
            .await
            .unwrap();
        wizard.advance(menu_site_patch()).await.unwrap();

        let mut patch = schedule_patch();
        patch.scheduled_at = Some("garbage".into());
        assert!(matches!(
            wizard.advance(patch).await.unwrap_err(),
            WizardError::Validation(ValidationError::ScheduleMismatch { expected })
                if expected == "2025-05-25T14:00:00"
        ));

        let mut patch = schedule_patch();
        patch.scheduled_date = Some(" 2025-05-25 ".into());
        patch.scheduled_at = None;
        wizard.advance(patch).await.unwrap();
        assert_eq!(wizard.data().scheduled_date.as_deref(), Some("2025-05-25"));
        assert_eq!(wizard.data().scheduled_at.as_deref(), Some("2025-05-25T14:00:00"));
    }

    #[tokio::test]
    async fn submit_only_at_confirm() {
        let h = harness();
        let mut wizard = BookingWizard::mount(BookingPattern::Direct, direct_seed(), h.ctx)
            .await
            .unwrap();
        assert!(matches!(
            wizard.submit("/x").await.unwrap_err(),
            WizardError::WrongStep {
                action: "submit",
                step: StepKind::MenuSite
            }
        ));
    }

    #[tokio::test]
    async fn amend_is_limited_to_owned_fields() {
        let h = harness();
        let mut wizard = at_confirm(&h).await;
        assert!(matches!(
            wizard
                .amend(BookingPatch {
                    total_price: Some(1),
                    ..Default::default()
                })
                .unwrap_err(),
            WizardError::FieldNotOwned {
                field: Field::Totals,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn cancel_drops_snapshot() {
        let h = harness();
        let mut wizard = at_confirm(&h).await;
        wizard.submit("/booking/new").await.unwrap();
        wizard.cancel().await;
        assert!(h.session.get(keys::BOOKING_IN_PROGRESS).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn status_serializes_one_based_step() {
        let h = harness();
        let wizard =
            BookingWizard::mount(BookingPattern::AiRecommend, BookingPatch::default(), h.ctx)
                .await
                .unwrap();
        let json = serde_json::to_value(wizard.status()).unwrap();
        assert_eq!(json["step"], 1);
        assert_eq!(json["step_count"], 5);
        assert_eq!(json["view"], "chat");
        assert_eq!(json["pattern"], "AI_RECOMMEND");
        assert!(json.get("gate").is_none());
    }

    fn arb_patch() -> impl Strategy<Value = BookingPatch> {
        (
            proptest::option::of("[a-c]"),
            proptest::option::of("[x-z]"),
            proptest::option::of(1u32..10_000),
            proptest::option::of("[a-z ]{0,12}"),
        )
            .prop_map(|(therapist, site, price, notes)| BookingPatch {
                therapist: therapist.map(|id| TherapistRef::new(id.clone(), id)),
                site: site.map(|id| SiteRef::new(id.clone(), id, "addr")),
                total_price: price,
                notes,
                ..Default::default()
            })
    }

    proptest! {
        #[test]
        fn merge_is_a_left_fold_that_never_unsets(patches in proptest::collection::vec(arb_patch(), 0..8)) {
            let mut data = BookingData::new(BookingPattern::FromMap);
            for patch in &patches {
                let before = data.clone();
                data.apply(patch.clone());
                for field in [Field::Therapist, Field::Site, Field::Totals, Field::Notes] {
                    if before.has(field) {
                        prop_assert!(data.has(field));
                    }
                }
            }

            let last_therapist = patches.iter().rev().find_map(|p| p.therapist.clone());
            prop_assert_eq!(data.therapist, last_therapist);
            let last_notes = patches.iter().rev().find_map(|p| p.notes.clone());
            prop_assert_eq!(data.notes, last_notes);
            prop_assert_eq!(data.pattern, BookingPattern::FromMap);
        }
    }
}
