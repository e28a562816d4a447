use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::admin::AdminPanel;
use crate::app::{DashboardApp, EnrichError, SettingName};
use crate::chat::{ChatError, ChatReply};
use crate::dashboard::DashboardState;
use crate::enrich::{Enrichment, EntityKey, StartError, TaskKind, TaskSlot};
use crate::metrics::Metrics;
use crate::polling::PollState;
use crate::settings::{ModelOption, SettingState};

/// Local JSON surface over a running [`DashboardApp`]. `/metrics` is mounted when a
/// recorder handle is given.
pub fn router(app: DashboardApp, metrics: Option<&Metrics>) -> Router {
    let api = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/dashboard", get(dashboard))
        .route("/dashboard/refresh", post(refresh))
        .route("/enrich/{kind}", post(start_enrichment).get(enrichment_slot))
        .route("/settings/{name}", get(setting).post(set_setting))
        .route("/admin", get(admin))
        .route("/admin/open", post(admin_open))
        .route("/admin/close", post(admin_close))
        .route("/chat", post(chat))
        .layer(CorsLayer::very_permissive())
        .with_state(app);

    match metrics {
        Some(m) => api.merge(m.router()),
        None => api,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Enrich(#[from] EnrichError),
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error("setting '{0}' is not initialized")]
    SettingUnavailable(SettingName),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Enrich(EnrichError::UnknownEntity(_)) => StatusCode::NOT_FOUND,
            ApiError::Enrich(EnrichError::Rejected(StartError::AlreadyRunning { .. })) => {
                StatusCode::CONFLICT
            }
            ApiError::Enrich(EnrichError::Rejected(StartError::TextTooShort { .. })) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::Chat(ChatError::EmptyQuestion) => StatusCode::BAD_REQUEST,
            ApiError::Chat(ChatError::AlreadyRunning) => StatusCode::CONFLICT,
            ApiError::Chat(ChatError::Remote(_)) => StatusCode::BAD_GATEWAY,
            ApiError::SettingUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "not_found",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Enrich(EnrichError::UnknownEntity(_)) => "unknown_entity",
            ApiError::Enrich(EnrichError::Rejected(e)) => e.kind().as_str(),
            ApiError::Chat(ChatError::EmptyQuestion) => "empty_question",
            ApiError::Chat(ChatError::AlreadyRunning) => "already_running",
            ApiError::Chat(ChatError::Remote(e)) => e.kind.as_str(),
            ApiError::SettingUnavailable(_) => "not_initialized",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.to_string(), "kind": self.kind() }));
        (self.status(), body).into_response()
    }
}

fn parse_kind(raw: &str) -> Result<TaskKind, ApiError> {
    raw.parse().map_err(ApiError::BadRequest)
}

fn parse_key(raw: &str) -> Result<EntityKey, ApiError> {
    EntityKey::new(raw).ok_or_else(|| ApiError::BadRequest("key must not be blank".into()))
}

fn parse_setting(raw: &str) -> Result<SettingName, ApiError> {
    raw.parse().map_err(ApiError::NotFound)
}

async fn dashboard(State(app): State<DashboardApp>) -> Json<DashboardState> {
    Json(app.dashboard.state())
}

async fn refresh(State(app): State<DashboardApp>) -> Json<DashboardState> {
    Json(app.refresh().await)
}

#[derive(Deserialize)]
struct KeyBody {
    key: String,
}

async fn start_enrichment(
    State(app): State<DashboardApp>,
    Path(kind): Path<String>,
    Json(body): Json<KeyBody>,
) -> Result<(StatusCode, Json<TaskSlot<Enrichment>>), ApiError> {
    let kind = parse_kind(&kind)?;
    let key = parse_key(&body.key)?;
    let slot = app.enrich(&key, kind)?;
    Ok((StatusCode::ACCEPTED, Json(slot)))
}

async fn enrichment_slot(
    State(app): State<DashboardApp>,
    Path(kind): Path<String>,
    Query(q): Query<KeyBody>,
) -> Result<Json<TaskSlot<Enrichment>>, ApiError> {
    let kind = parse_kind(&kind)?;
    let key = parse_key(&q.key)?;
    Ok(Json(app.enricher.state_of(&key, kind)))
}

#[derive(Serialize)]
struct SettingOut {
    state: SettingState<String>,
    options: Vec<ModelOption>,
}

async fn setting(
    State(app): State<DashboardApp>,
    Path(name): Path<String>,
) -> Result<Json<SettingOut>, ApiError> {
    let name = parse_setting(&name)?;
    let state = app
        .setting(name)
        .state()
        .ok_or(ApiError::SettingUnavailable(name))?;
    Ok(Json(SettingOut {
        state,
        options: app.setting_options(name),
    }))
}

#[derive(Deserialize)]
struct SetBody {
    value: String,
}

async fn set_setting(
    State(app): State<DashboardApp>,
    Path(name): Path<String>,
    Json(body): Json<SetBody>,
) -> Result<(StatusCode, Json<SettingState<String>>), ApiError> {
    let name = parse_setting(&name)?;
    let value = body.value.trim();
    if value.is_empty() {
        return Err(ApiError::BadRequest("value must not be blank".into()));
    }
    let setting = app.setting(name);
    setting
        .set(value.to_string())
        .map_err(|_| ApiError::SettingUnavailable(name))?;
    let state = setting.state().ok_or(ApiError::SettingUnavailable(name))?;
    Ok((StatusCode::ACCEPTED, Json(state)))
}

#[derive(Serialize)]
struct AdminOut {
    poll: PollState,
    panel: AdminPanel,
}

async fn admin(State(app): State<DashboardApp>) -> Json<AdminOut> {
    Json(AdminOut {
        poll: app.admin.poll_state(),
        panel: app.admin.panel(),
    })
}

async fn admin_open(State(app): State<DashboardApp>) -> Json<PollState> {
    app.admin.open();
    Json(app.admin.poll_state())
}

async fn admin_close(State(app): State<DashboardApp>) -> Json<PollState> {
    app.admin.close();
    Json(app.admin.poll_state())
}

#[derive(Deserialize)]
struct ChatBody {
    question: String,
}

async fn chat(
    State(app): State<DashboardApp>,
    Json(body): Json<ChatBody>,
) -> Result<Json<ChatReply>, ApiError> {
    Ok(Json(app.ask(&body.question).await?))
}
