//! REST endpoints driving one booking wizard per client session.
//!
//! A client picks its own session id and mounts a wizard with
//! `POST /api/wizards/{session_id}`. Mounting again after signing in resumes
//! a deferred booking. Every request may carry `Authorization: Bearer ...`;
//! the header is the session's sign-in state.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use super::model::{BookingPatch, BookingPattern, BookingType};
use super::schedule::TIME_FORMAT;
use super::state::WizardGate;
use super::wizard::{BookingWizard, WizardContext};
use crate::ai::{Concierge, IdVerifier};
use crate::error::{ApiError, WizardError};
use crate::session::AuthContext;
use crate::steps::kyc::KycError;
use crate::steps::{ChatStep, DateTimeStep, FetchState, KycStep};

/// Builds the collaborators for a session seen for the first time.
pub type ContextFactory = Arc<dyn Fn(&str) -> WizardContext + Send + Sync>;

/// Deep-link parameters of a mount. Missing ones fall back to the
/// server's defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MountRequest {
    #[serde(default)]
    pub pattern: Option<BookingPattern>,
    #[serde(default)]
    pub therapist_id: Option<String>,
    #[serde(default)]
    pub site_id: Option<String>,
}

impl MountRequest {
    fn or(self, defaults: &MountRequest) -> MountRequest {
        MountRequest {
            pattern: self.pattern.or(defaults.pattern),
            therapist_id: self.therapist_id.or_else(|| defaults.therapist_id.clone()),
            site_id: self.site_id.or_else(|| defaults.site_id.clone()),
        }
    }
}

/// One client's wizard and chat transcript.
struct ClientSession {
    ctx: WizardContext,
    wizard: Mutex<BookingWizard>,
    chat: Mutex<ChatStep>,
}

/// Shared state for wizard routes.
#[derive(Clone)]
pub struct WizardRouteState {
    contexts: ContextFactory,
    sessions: Arc<Mutex<HashMap<String, Arc<ClientSession>>>>,
    defaults: MountRequest,
    /// None when no LLM is configured.
    pub concierge: Option<Arc<Concierge>>,
    pub verifier: Option<Arc<IdVerifier>>,
}

impl WizardRouteState {
    pub fn new(contexts: ContextFactory) -> Self {
        Self {
            contexts,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            defaults: MountRequest::default(),
            concierge: None,
            verifier: None,
        }
    }

    pub fn with_defaults(mut self, defaults: MountRequest) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_ai(mut self, concierge: Arc<Concierge>, verifier: Arc<IdVerifier>) -> Self {
        self.concierge = Some(concierge);
        self.verifier = Some(verifier);
        self
    }

    /// Number of sessions with a mounted wizard.
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    async fn context_for(&self, session_id: &str) -> WizardContext {
        match self.sessions.lock().await.get(session_id) {
            Some(client) => client.ctx.clone(),
            None => (self.contexts)(session_id),
        }
    }

    async fn client(
        &self,
        session_id: &str,
        headers: &HeaderMap,
    ) -> Result<Arc<ClientSession>, Response> {
        let client = self
            .sessions
            .lock()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| {
                error_body(
                    StatusCode::NOT_FOUND,
                    format!("No wizard mounted for session {session_id}"),
                )
            })?;
        sync_auth(&client.ctx.auth, headers).await?;
        Ok(client)
    }
}

fn error_body(status: StatusCode, message: impl ToString) -> Response {
    (
        status,
        Json(serde_json::json!({"error": message.to_string()})),
    )
        .into_response()
}

fn wizard_error(e: WizardError) -> Response {
    let status = match &e {
        WizardError::Validation(_) | WizardError::FieldNotOwned { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        WizardError::GatePending(_)
        | WizardError::NoGatePending(_)
        | WizardError::WrongStep { .. }
        | WizardError::MissingSeed { .. } => StatusCode::CONFLICT,
        WizardError::Submission(_) => StatusCode::BAD_GATEWAY,
        WizardError::Storage(_) | WizardError::Serialization(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_body(status, e)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Mirror the request's bearer token into the session's auth storage.
async fn sync_auth(auth: &AuthContext, headers: &HeaderMap) -> Result<(), Response> {
    let result = match bearer_token(headers) {
        Some(token) => auth.sign_in(token).await,
        None => auth.sign_out().await,
    };
    result.map_err(|e| wizard_error(e.into()))
}

/// Fetch the deep-link seed entities.
async fn resolve_seed(
    ctx: &WizardContext,
    request: &MountRequest,
) -> Result<BookingPatch, Response> {
    let lookup_error = |e: ApiError| match e {
        ApiError::NotFound { .. } => error_body(StatusCode::NOT_FOUND, e),
        e => {
            warn!(error = %e, "Seed lookup failed");
            error_body(StatusCode::BAD_GATEWAY, e)
        }
    };

    let mut seed = BookingPatch::default();
    if let Some(id) = request.therapist_id.as_deref() {
        let therapist = ctx.api.get_therapist(id).await.map_err(lookup_error)?;
        seed = seed.with_therapist(therapist);
    }
    if let Some(id) = request.site_id.as_deref() {
        let site = ctx.api.get_site(id).await.map_err(lookup_error)?;
        seed = seed.with_site(site).with_type(BookingType::Onsite);
    }
    Ok(seed)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// POST /api/wizards/{session_id}
///
/// Mounts a fresh wizard, or resumes the booking this session deferred
/// for sign-in. Replaces any wizard the session already had.
async fn mount(
    State(state): State<WizardRouteState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<MountRequest>,
) -> Response {
    let request = request.or(&state.defaults);
    let Some(pattern) = request.pattern else {
        return error_body(StatusCode::UNPROCESSABLE_ENTITY, "A booking pattern is required");
    };

    let ctx = state.context_for(&session_id).await;
    if let Err(resp) = sync_auth(&ctx.auth, &headers).await {
        return resp;
    }
    let seed = match resolve_seed(&ctx, &request).await {
        Ok(seed) => seed,
        Err(resp) => return resp,
    };
    let wizard = match BookingWizard::mount(pattern, seed, ctx.clone()).await {
        Ok(wizard) => wizard,
        Err(e) => return wizard_error(e),
    };

    let status = wizard.status();
    let client = ClientSession {
        chat: Mutex::new(ChatStep::for_data(wizard.data())),
        wizard: Mutex::new(wizard),
        ctx,
    };
    state
        .sessions
        .lock()
        .await
        .insert(session_id.clone(), Arc::new(client));
    info!(
        session_id = %session_id,
        pattern = %pattern,
        resumed = status.resumed,
        "Session wizard mounted"
    );
    (StatusCode::CREATED, Json(status)).into_response()
}

/// GET /api/wizards/{session_id}/status
async fn get_status(
    State(state): State<WizardRouteState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    match state.client(&session_id, &headers).await {
        Ok(client) => Json(client.wizard.lock().await.status()).into_response(),
        Err(resp) => resp,
    }
}

/// POST /api/wizards/{session_id}/advance
///
/// Body is the patch the current step confirmed.
async fn advance(
    State(state): State<WizardRouteState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    Json(patch): Json<BookingPatch>,
) -> Response {
    let client = match state.client(&session_id, &headers).await {
        Ok(client) => client,
        Err(resp) => return resp,
    };
    let mut wizard = client.wizard.lock().await;
    match wizard.advance(patch).await {
        Ok(_) => Json(wizard.status()).into_response(),
        Err(e) => wizard_error(e),
    }
}

/// POST /api/wizards/{session_id}/retreat
async fn retreat(
    State(state): State<WizardRouteState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let client = match state.client(&session_id, &headers).await {
        Ok(client) => client,
        Err(resp) => return resp,
    };
    let mut wizard = client.wizard.lock().await;
    wizard.retreat();
    Json(wizard.status()).into_response()
}

#[derive(Debug, Deserialize)]
struct SubmitBody {
    route: String,
}

/// POST /api/wizards/{session_id}/submit
///
/// Either books it or, for a signed-out user, returns the login URL.
async fn submit(
    State(state): State<WizardRouteState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<SubmitBody>,
) -> Response {
    let client = match state.client(&session_id, &headers).await {
        Ok(client) => client,
        Err(resp) => return resp,
    };
    let mut wizard = client.wizard.lock().await;
    match wizard.submit(&body.route).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => wizard_error(e),
    }
}

/// POST /api/wizards/{session_id}/cancel
///
/// Drops the stashed snapshot and forgets the session's wizard.
async fn cancel(
    State(state): State<WizardRouteState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let client = match state.client(&session_id, &headers).await {
        Ok(client) => client,
        Err(resp) => return resp,
    };
    client.wizard.lock().await.cancel().await;
    state.sessions.lock().await.remove(&session_id);
    StatusCode::NO_CONTENT.into_response()
}

#[derive(Debug, Deserialize)]
struct SlotsQuery {
    date: String,
}

/// GET /api/wizards/{session_id}/slots?date=YYYY-MM-DD
async fn slots(
    State(state): State<WizardRouteState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    Query(q): Query<SlotsQuery>,
) -> Response {
    let client = match state.client(&session_id, &headers).await {
        Ok(client) => client,
        Err(resp) => return resp,
    };
    let mut step = DateTimeStep::new(client.ctx.slots, client.ctx.clock.clone());
    match step.select_date(&q.date) {
        Ok(slots) => {
            let slots: Vec<String> = slots
                .iter()
                .map(|t| t.format(TIME_FORMAT).to_string())
                .collect();
            Json(serde_json::json!({"date": q.date.trim(), "slots": slots})).into_response()
        }
        Err(e) => error_body(StatusCode::UNPROCESSABLE_ENTITY, e),
    }
}

#[derive(Debug, Deserialize)]
struct ChatBody {
    message: String,
    #[serde(default)]
    when: Option<String>,
}

/// POST /api/wizards/{session_id}/chat
async fn chat(
    State(state): State<WizardRouteState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<ChatBody>,
) -> Response {
    let Some(concierge) = state.concierge.as_deref() else {
        return error_body(StatusCode::SERVICE_UNAVAILABLE, "AI concierge is not configured");
    };
    let client = match state.client(&session_id, &headers).await {
        Ok(client) => client,
        Err(resp) => return resp,
    };
    let mut chat = client.chat.lock().await;
    if matches!(chat.candidates(), FetchState::Idle | FetchState::Failed(_)) {
        chat.load(client.ctx.api.as_ref()).await;
    }
    chat.set_when(body.when);
    let reply = match chat.send(concierge, &body.message).await {
        Ok(turn) => turn.text.clone(),
        Err(e) => return error_body(StatusCode::UNPROCESSABLE_ENTITY, e),
    };
    Json(serde_json::json!({
        "reply": reply,
        "recommendations": chat.recommendations(),
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
struct KycBody {
    /// `data:image/...;base64,...`
    image: String,
}

/// POST /api/wizards/{session_id}/kyc
///
/// Verifies the uploaded ID and, if it passes, lifts the pending gate.
async fn kyc(
    State(state): State<WizardRouteState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<KycBody>,
) -> Response {
    let Some(verifier) = state.verifier.as_deref() else {
        return error_body(StatusCode::SERVICE_UNAVAILABLE, "ID verification is not configured");
    };
    let client = match state.client(&session_id, &headers).await {
        Ok(client) => client,
        Err(resp) => return resp,
    };
    let mut step = KycStep::new();
    if let Err(e) = step.attach_data_url(&body.image) {
        return error_body(StatusCode::UNPROCESSABLE_ENTITY, e);
    }
    if client.wizard.lock().await.gate() != Some(WizardGate::Kyc) {
        return wizard_error(WizardError::NoGatePending(WizardGate::Kyc));
    }

    let verification = match step.verify(verifier).await {
        Ok(v) => v.clone(),
        Err(KycError::Validation(e)) => return error_body(StatusCode::UNPROCESSABLE_ENTITY, e),
        Err(KycError::Llm(e)) => {
            warn!(session_id = %session_id, error = %e, "ID verification call failed");
            return error_body(StatusCode::BAD_GATEWAY, e);
        }
    };

    let mut wizard = client.wizard.lock().await;
    match wizard.complete_kyc(&verification) {
        Ok(_) => Json(wizard.status()).into_response(),
        Err(e) => wizard_error(e),
    }
}

/// Build the wizard REST routes.
pub fn wizard_routes(state: WizardRouteState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/wizards/{session_id}", post(mount))
        .route("/api/wizards/{session_id}/status", get(get_status))
        .route("/api/wizards/{session_id}/advance", post(advance))
        .route("/api/wizards/{session_id}/retreat", post(retreat))
        .route("/api/wizards/{session_id}/submit", post(submit))
        .route("/api/wizards/{session_id}/cancel", post(cancel))
        .route("/api/wizards/{session_id}/slots", get(slots))
        .route("/api/wizards/{session_id}/chat", post(chat))
        .route("/api/wizards/{session_id}/kyc", post(kyc))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
