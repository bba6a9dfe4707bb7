use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use wellness_booking::ai::{Concierge, IdVerifier};
use wellness_booking::api::{BookingApi, HttpBookingApi};
use wellness_booking::booking::{
    ContextFactory, MountRequest, SlotPolicy, WizardContext, WizardRouteState, wizard_routes,
};
use wellness_booking::config::AppConfig;
use wellness_booking::llm::create_provider;
use wellness_booking::navigation::HistoryNavigator;
use wellness_booking::session::libsql_store::{LOCAL_SCOPE, SESSION_SCOPE};
use wellness_booking::session::{AuthContext, LibSqlSessionStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().context("Invalid configuration")?;

    eprintln!("Wellness booking v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Default pattern: {}", config.pattern);
    eprintln!("   Backend: {}", config.api_base_url);
    eprintln!("   Wizard API: http://0.0.0.0:{}/api/wizards/{{session_id}}\n", config.port);

    let store = LibSqlSessionStore::new_local(Path::new(&config.session_db_path))
        .await
        .context("Failed to open session storage")?;
    let api: Arc<dyn BookingApi> = Arc::new(HttpBookingApi::new(&config.api_base_url));
    let slots = SlotPolicy::from(&config.wizard);
    let login_path = config.wizard.login_path.clone();

    // Each client session gets its own storage scopes and history.
    let contexts: ContextFactory = Arc::new(move |session_id: &str| {
        let session = store.with_scope(&format!("{SESSION_SCOPE}:{session_id}"));
        let local = store.with_scope(&format!("{LOCAL_SCOPE}:{session_id}"));
        WizardContext::new(
            api.clone(),
            Arc::new(session),
            AuthContext::new(Arc::new(local)),
            Arc::new(HistoryNavigator::new(login_path.clone())),
        )
        .with_slot_policy(slots)
    });

    let mut state = WizardRouteState::new(contexts).with_defaults(MountRequest {
        pattern: Some(config.pattern),
        therapist_id: config.seed_therapist_id.clone(),
        site_id: config.seed_site_id.clone(),
    });
    if let Some(llm) = create_provider(config.llm.as_ref()) {
        state = state.with_ai(
            Arc::new(Concierge::new(llm.clone())),
            Arc::new(IdVerifier::new(llm)),
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "Booking wizard server started");
    axum::serve(listener, wizard_routes(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    Ok(())
}
