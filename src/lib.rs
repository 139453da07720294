pub mod auth;
pub mod client;
pub mod error;
pub mod guard;
pub mod handlers;
pub mod ical;
pub mod models;
pub mod navigation;
pub mod openapi;
pub mod session;
pub mod settings;
pub mod sources;
pub mod store;
pub mod validation;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    routing::{get, post},
};
use handlers::{
    cancel_fetch, fetch_schedules, get_ical, get_schedules, healthz_live, healthz_ready, home,
    login, login_page, logout,
};
use reqwest::cookie::Jar;
use tokio::sync::watch;
use tower_http::LatencyUnit;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{Level, info};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::client::ApiClient;
use crate::guard::{AuthGate, Identity, gate_for};
use crate::ical::ItineraryExporter;
use crate::navigation::HistoryNavigator;
use crate::openapi::ApiDoc;
use crate::session::Session;
use crate::settings::Settings;
use crate::store::ScheduleStore;

#[derive(Clone)]
pub struct AppState {
    pub(crate) settings: Settings,
    pub(crate) session: Arc<Session>,
    pub(crate) identity: Arc<watch::Sender<Option<Identity>>>,
    pub(crate) gate: Arc<dyn AuthGate>,
    pub(crate) store: Arc<ScheduleStore>,
    pub(crate) exporter: Arc<ItineraryExporter>,
    pub(crate) navigator: Arc<HistoryNavigator>,
}

impl AppState {
    pub fn from_settings(settings: Settings) -> Result<Self, Box<dyn std::error::Error>> {
        Self::with_cookie_jar(settings, Arc::new(Jar::default()))
    }

    /// Like [`AppState::from_settings`], with a jar that may already hold the
    /// refresh cookie.
    pub fn with_cookie_jar(
        settings: Settings,
        jar: Arc<Jar>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let session = Arc::new(Session::new());
        let navigator = Arc::new(HistoryNavigator::new());
        let (identity, identity_rx) = watch::channel(None);
        let gate = gate_for(settings.auth_gate, session.clone(), identity_rx);

        let api = ApiClient::with_cookie_jar(
            (&settings).into(),
            session.clone(),
            navigator.clone(),
            jar,
        )?;
        let source = sources::from_settings(&settings, api)?;
        let store = ScheduleStore::new(
            source,
            Duration::from_secs(settings.fetch_deadline_secs),
            settings.error_message.clone(),
        );
        let exporter = ItineraryExporter::new(settings.timezone()?);

        Ok(Self {
            settings,
            session,
            identity: Arc::new(identity),
            gate,
            store: Arc::new(store),
            exporter: Arc::new(exporter),
            navigator,
        })
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn navigator(&self) -> &Arc<HistoryNavigator> {
        &self.navigator
    }

    pub fn store(&self) -> &Arc<ScheduleStore> {
        &self.store
    }
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_env()?;

    let env_filter = if settings.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .without_time()
        .init();

    let state = AppState::from_settings(settings)?;
    info!(
        source = ?state.settings.source,
        gate = ?state.settings.auth_gate,
        api = %state.settings.api_base_url,
        "itinerary sources configured"
    );

    let app = build_router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], state.settings.port));
    info!("Starting itinerary map service on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(
            DefaultOnResponse::new()
                .level(Level::INFO)
                .latency_unit(LatencyUnit::Millis),
        );

    let mut router = Router::new()
        .route("/", get(home))
        .route("/login", get(login_page).post(login))
        .route("/logout", post(logout))
        .route("/schedules", get(get_schedules))
        .route("/schedules/fetch", post(fetch_schedules))
        .route("/schedules/cancel", post(cancel_fetch))
        .route("/schedules.ical", get(get_ical))
        .route("/healthz/live", get(healthz_live))
        .route("/healthz/ready", get(healthz_ready))
        .with_state(state.clone());

    if state.settings.enable_swagger {
        let openapi = ApiDoc::openapi();
        let swagger = SwaggerUi::new("/docs").url("/openapi.json", openapi);
        router = router.merge(swagger);
    }

    router.layer(trace_layer)
}
