use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use clap::Parser;
use command_channel::SharedChannel;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use server_api::{
    create_program, delete_program,
    dispatch::{self, LoadProgramRequest},
    get_program, list_programs, update_program, ApiContext,
};
use shared::{
    domain::{Program, ProgramId},
    error::{ApiError, ErrorCode},
    protocol::{ConfigUpdate, MaintenanceSettings, OverrideFlags},
};
use storage::Storage;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, prepare_database_url};

#[derive(Debug, Parser)]
#[command(name = "aegir-server", about = "HTTP front end for the brewd controller")]
struct Args {
    /// Settings file; defaults to ./aegir.toml when present.
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(short, long)]
    debug: bool,
}

#[derive(Clone)]
struct AppState {
    api: ApiContext,
}

type HttpResult = Result<Json<Success>, (StatusCode, Json<ApiError>)>;

#[derive(Debug, Serialize, Deserialize)]
struct Success {
    status: String,
    data: Value,
}

#[derive(Debug, Deserialize)]
struct StateParams {
    history: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TempHistoryParams {
    from: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct StateCommandRequest {
    command: String,
}

#[derive(Debug, Deserialize)]
struct MaintenanceModeRequest {
    mode: String,
}

#[derive(Debug, Deserialize)]
struct VolumeRequest {
    volume: i64,
}

#[derive(Debug, Deserialize)]
struct CoolTempRequest {
    cooltemp: f64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let default_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let settings = load_settings(args.config.as_deref())?;
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let channel = settings.channel_config();
    info!(addr = %channel.addr, timeout = ?channel.timeout, "brewd channel configured");
    let api = ApiContext {
        storage,
        brewd: SharedChannel::tcp(&channel),
    };
    let app = build_router(Arc::new(AppState { api }));

    let addr: SocketAddr = settings.bind_addr.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/programs", get(http_list_programs).post(http_create_program))
        .route(
            "/api/programs/:id",
            get(http_get_program)
                .post(http_update_program)
                .delete(http_delete_program),
        )
        .route(
            "/api/brewd/program",
            get(http_loaded_program).post(http_load_program),
        )
        .route(
            "/api/brewd/state",
            get(http_get_state).post(http_state_command),
        )
        .route(
            "/api/brewd/state/volume",
            get(http_get_volume).post(http_set_volume),
        )
        .route("/api/brewd/state/temphistory", get(http_temp_history))
        .route("/api/brewd/state/cooltemp", post(http_set_cool_temp))
        .route(
            "/api/brewd/maintenance",
            post(http_set_maintenance).put(http_maintenance_mode),
        )
        .route("/api/brewd/override", post(http_override))
        .route(
            "/api/brewd/config",
            get(http_get_config).post(http_set_config),
        )
        .with_state(state)
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

fn respond(result: Result<Value, ApiError>) -> HttpResult {
    match result {
        Ok(data) => Ok(Json(Success {
            status: "success".into(),
            data,
        })),
        Err(err) => Err((status_for(err.code), Json(err))),
    }
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, StatusCode> {
    state.api.storage.health_check().await.map_err(|error| {
        error!(%error, "storage health check failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok("ok")
}

async fn http_list_programs(State(state): State<Arc<AppState>>) -> HttpResult {
    respond(list_programs(&state.api).await.and_then(to_data))
}

async fn http_create_program(
    State(state): State<Arc<AppState>>,
    Json(program): Json<Program>,
) -> HttpResult {
    let created = create_program(&state.api, program).await;
    respond(created.map(|id| serde_json::json!({ "id": id })))
}

async fn http_get_program(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> HttpResult {
    respond(get_program(&state.api, ProgramId(id)).await.and_then(to_data))
}

async fn http_update_program(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(program): Json<Program>,
) -> HttpResult {
    let updated = update_program(&state.api, ProgramId(id), program).await;
    respond(updated.map(|()| serde_json::json!({ "id": id })))
}

async fn http_delete_program(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> HttpResult {
    respond(
        delete_program(&state.api, ProgramId(id))
            .await
            .map(|()| Value::Null),
    )
}

async fn http_loaded_program(State(state): State<Arc<AppState>>) -> HttpResult {
    respond(dispatch::loaded_program(&state.api).await)
}

async fn http_load_program(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoadProgramRequest>,
) -> HttpResult {
    respond(dispatch::load_program(&state.api, &request, Utc::now()).await)
}

async fn http_get_state(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StateParams>,
) -> HttpResult {
    let history = matches!(params.history.as_deref(), Some("yes" | "true" | "1"));
    respond(dispatch::get_state(&state.api, history).await)
}

async fn http_state_command(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StateCommandRequest>,
) -> HttpResult {
    respond(dispatch::send_state_command(&state.api, &request.command).await)
}

async fn http_get_volume(State(state): State<Arc<AppState>>) -> HttpResult {
    respond(dispatch::get_volume(&state.api).await)
}

async fn http_set_volume(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VolumeRequest>,
) -> HttpResult {
    respond(dispatch::set_volume(&state.api, request.volume).await)
}

async fn http_temp_history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TempHistoryParams>,
) -> HttpResult {
    respond(dispatch::get_temp_history(&state.api, params.from).await)
}

async fn http_set_cool_temp(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CoolTempRequest>,
) -> HttpResult {
    respond(dispatch::set_cool_temp(&state.api, request.cooltemp).await)
}

async fn http_maintenance_mode(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MaintenanceModeRequest>,
) -> HttpResult {
    respond(dispatch::set_maintenance_mode(&state.api, &request.mode).await)
}

async fn http_set_maintenance(
    State(state): State<Arc<AppState>>,
    Json(settings): Json<MaintenanceSettings>,
) -> HttpResult {
    respond(dispatch::set_maintenance(&state.api, &settings).await)
}

async fn http_override(
    State(state): State<Arc<AppState>>,
    Json(flags): Json<OverrideFlags>,
) -> HttpResult {
    respond(dispatch::set_override(&state.api, &flags).await)
}

async fn http_get_config(State(state): State<Arc<AppState>>) -> HttpResult {
    respond(dispatch::get_config(&state.api).await)
}

async fn http_set_config(
    State(state): State<Arc<AppState>>,
    Json(update): Json<ConfigUpdate>,
) -> HttpResult {
    respond(dispatch::set_config(&state.api, &update).await)
}

fn to_data<T: Serialize>(value: T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|e| ApiError::new(ErrorCode::Internal, e.to_string()))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
