//! Admin settings API and hook intake over HTTP.
//!
//! Two surfaces share one router: `/admin/settings` reads and updates the
//! flush settings, and `/hooks/{event}` receives content-change
//! notifications from the host and dispatches them on the hook bus.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router, extract::Path, extract::State};
use serde::Serialize;
use tracing::warn;

use crate::catalog::ActionEntry;
use crate::flush::{Flusher, RequestContext};
use crate::hooks::{HookBus, rebind_watched_events};
use crate::settings::{FlushSettings, SettingsService, StoreError, UpdateSettingsCommand};

#[derive(Clone)]
pub struct HttpState {
    pub settings: Arc<SettingsService>,
    pub bus: Arc<HookBus>,
    pub flusher: Arc<Flusher>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/admin/settings",
            get(get_settings).patch(patch_settings),
        )
        .route("/hooks/{event}", post(receive_hook))
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    pub interval_minutes: u32,
    pub watched_events: Vec<String>,
    pub available_actions: Vec<ActionEntry>,
}

impl SettingsResponse {
    fn new(settings: FlushSettings, available_actions: Vec<ActionEntry>) -> Self {
        Self {
            interval_minutes: settings.interval_minutes,
            watched_events: settings.watched_events,
            available_actions,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HookAccepted {
    pub hook: String,
    pub listeners: usize,
    pub flushed: bool,
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn get_settings(State(state): State<HttpState>) -> Result<Json<SettingsResponse>, ApiError> {
    let settings = state.settings.load().await?;
    let available_actions = state.settings.catalog().entries().to_vec();
    Ok(Json(SettingsResponse::new(settings, available_actions)))
}

async fn patch_settings(
    State(state): State<HttpState>,
    Json(command): Json<UpdateSettingsCommand>,
) -> Result<Json<SettingsResponse>, ApiError> {
    let settings = state.settings.update(command).await?;
    let catalog = state.settings.catalog();

    // The bus must track the persisted set while the process runs, or the
    // update would only take effect after a restart.
    rebind_watched_events(
        &state.bus,
        &settings.watched_events,
        &catalog,
        state.flusher.clone(),
    );

    let available_actions = catalog.entries().to_vec();
    Ok(Json(SettingsResponse::new(settings, available_actions)))
}

/// Accept a host notification for `event` and dispatch it on the bus.
///
/// Unknown or unwatched events still answer 202: the host fires hooks
/// regardless of what this service is currently bound to, and rejecting
/// them would only make the host retry.
async fn receive_hook(
    State(state): State<HttpState>,
    Path(event): Path<String>,
) -> (StatusCode, Json<HookAccepted>) {
    let mut ctx = RequestContext::new();
    let listeners = state.bus.emit(&event, &mut ctx).await;

    (
        StatusCode::ACCEPTED,
        Json(HookAccepted {
            hook: event,
            listeners,
            flushed: ctx.has_flushed(),
        }),
    )
}

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    error: ApiErrorMessage,
}

#[derive(Debug, Serialize)]
struct ApiErrorMessage {
    code: String,
    message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        warn!(error = %err, "Settings store operation failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "settings_error",
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}
