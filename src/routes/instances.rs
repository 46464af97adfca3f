use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use greenworks_api::{Credentials, MowerCommand};

use crate::config::Secret;
use crate::entity::EntityState;
use crate::instance::InstanceStatus;
use crate::routes::RouteResult;
use crate::server::appstate::AppState;

#[derive(Debug, Deserialize)]
pub struct ReauthRequest {
    pub email: String,
    pub password: Secret,
    pub timezone: Option<String>,
}

async fn get_instances(State(state): State<AppState>) -> Json<Vec<InstanceStatus>> {
    Json(state.statuses().await)
}

async fn get_devices(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> RouteResult<Json<Vec<String>>> {
    Ok(Json(state.instance(&name)?.device_names().await?))
}

async fn get_entities(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> RouteResult<Json<Vec<EntityState>>> {
    Ok(Json(state.instance(&name)?.entities().await?))
}

async fn command(state: &AppState, name: &str, cmd: MowerCommand) -> RouteResult<StatusCode> {
    log::info!("[{name}] Requested {} command", cmd.operation());
    state.instance(name)?.command(cmd).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn post_start(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> RouteResult<StatusCode> {
    command(&state, &name, MowerCommand::Start).await
}

async fn post_pause(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> RouteResult<StatusCode> {
    command(&state, &name, MowerCommand::Pause).await
}

async fn post_dock(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> RouteResult<StatusCode> {
    command(&state, &name, MowerCommand::Dock).await
}

#[axum::debug_handler]
async fn post_reauth(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<ReauthRequest>,
) -> RouteResult<Json<InstanceStatus>> {
    log::info!("[{name}] Reauthenticating as {}", req.email);

    let inst = state.instance(&name)?;
    let timezone = match req.timezone {
        Some(tz) => tz,
        None => match state.config().greenworks.get(&name) {
            Some(conf) => conf.timezone(),
            None => "UTC".to_string(),
        },
    };

    inst.reauth(Credentials {
        email: req.email,
        password: req.password.expose().to_string(),
        timezone,
    })
    .await?;

    Ok(Json(inst.status().await))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_instances))
        .route("/{name}/devices", get(get_devices))
        .route("/{name}/entities", get(get_entities))
        .route("/{name}/start", post(post_start))
        .route("/{name}/pause", post(post_pause))
        .route("/{name}/dock", post(post_dock))
        .route("/{name}/reauth", post(post_reauth))
}
