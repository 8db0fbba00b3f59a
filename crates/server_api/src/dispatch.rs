//! One function per brewd operation. Each performs exactly one channel
//! exchange and interprets the reply the same way.

use chrono::{DateTime, Utc};
use command_channel::ChannelError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::{
    domain::{ProgramId, VOLUME_MAX_LITERS, VOLUME_MIN_LITERS},
    error::{ApiError, ErrorCode},
    protocol::{
        Command, CommandEnvelope, ConfigUpdate, CoolTempPayload, LoadProgramPayload,
        MaintenanceSettings, OverrideFlags, ResponseEnvelope, StateQuery, TempHistoryQuery,
        VolumePayload, WireProgram,
    },
};
use tracing::{info, warn};

use crate::{
    gateway::{MaintenanceMode, StateCommand},
    internal, program_not_found,
    schedule::resolve_schedule,
    validation::check_program,
    ApiContext,
};

const TRANSPORT_MESSAGE: &str = "brewd is not reachable";
const MALFORMED_MESSAGE: &str = "Malformed response from brewd";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadProgramRequest {
    pub id: ProgramId,
    pub startmode: String,
    #[serde(default)]
    pub startat: Option<String>,
    pub volume: i64,
}

/// Sends one envelope and interprets the reply.
pub async fn dispatch(ctx: &ApiContext, envelope: CommandEnvelope) -> Result<Value, ApiError> {
    let command = envelope.command;
    let reply = ctx
        .brewd
        .exchange(&envelope)
        .await
        .map_err(|err| channel_failure(command, err))?;
    interpret_reply(command, reply)
}

pub fn interpret_reply(command: Command, reply: ResponseEnvelope) -> Result<Value, ApiError> {
    match reply.status.as_deref() {
        Some(ResponseEnvelope::SUCCESS) => Ok(reply.data.unwrap_or(Value::Null)),
        Some(ResponseEnvelope::ERROR) => {
            let message = reply
                .message
                .unwrap_or_else(|| format!("Unknown {command} error"));
            info!(%command, %message, "brewd refused command");
            Err(ApiError::new(ErrorCode::OperationFailed, message))
        }
        Some(other) => {
            warn!(%command, status = other, "brewd reply carries an unknown status");
            Err(ApiError::new(ErrorCode::MalformedResponse, MALFORMED_MESSAGE))
        }
        None => {
            warn!(%command, "brewd reply has no status");
            Err(ApiError::new(ErrorCode::MalformedResponse, MALFORMED_MESSAGE))
        }
    }
}

fn channel_failure(command: Command, err: ChannelError) -> ApiError {
    warn!(%command, error = %err, "brewd exchange failed");
    if err.is_malformed_reply() {
        ApiError::new(ErrorCode::MalformedResponse, MALFORMED_MESSAGE)
    } else {
        ApiError::new(ErrorCode::Transport, TRANSPORT_MESSAGE)
    }
}

fn envelope<T: Serialize>(command: Command, payload: &T) -> Result<CommandEnvelope, ApiError> {
    CommandEnvelope::with_payload(command, payload)
        .map_err(|e| ApiError::new(ErrorCode::Internal, format!("cannot encode {command}: {e}")))
}

pub fn check_volume(volume: i64) -> Result<u32, ApiError> {
    if !(VOLUME_MIN_LITERS..=VOLUME_MAX_LITERS).contains(&volume) {
        return Err(ApiError::new(ErrorCode::InvalidInput, "Volume is out of bounds"));
    }
    u32::try_from(volume)
        .map_err(|_| ApiError::new(ErrorCode::InvalidInput, "Volume is out of bounds"))
}

/// Loads a stored program into brewd, scheduled per the request.
pub async fn load_program(
    ctx: &ApiContext,
    request: &LoadProgramRequest,
    now: DateTime<Utc>,
) -> Result<Value, ApiError> {
    let program = ctx
        .storage
        .get_program(request.id)
        .await
        .map_err(internal)?
        .ok_or_else(|| program_not_found(request.id))?;

    // Rows may have been written by something other than this service.
    let errors = check_program(&program);
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let volume = check_volume(request.volume)?;
    let start = resolve_schedule(&request.startmode, request.startat.as_deref(), now)?;

    let payload = LoadProgramPayload {
        program: WireProgram::from_program(request.id.0, &program),
        startat: start.epoch_seconds(),
        volume,
    };
    info!(
        program_id = request.id.0,
        startat = payload.startat,
        volume,
        "loading program into brewd"
    );
    dispatch(ctx, envelope(Command::LoadProgram, &payload)?).await
}

pub async fn loaded_program(ctx: &ApiContext) -> Result<Value, ApiError> {
    dispatch(ctx, CommandEnvelope::bare(Command::GetProgram)).await
}

pub async fn get_state(ctx: &ApiContext, history: bool) -> Result<Value, ApiError> {
    dispatch(ctx, envelope(Command::GetState, &StateQuery { history })?).await
}

/// Unknown tokens are refused before the channel is touched.
pub async fn send_state_command(ctx: &ApiContext, token: &str) -> Result<Value, ApiError> {
    let command: StateCommand = token.parse()?;
    dispatch(ctx, CommandEnvelope::bare(command.wire())).await
}

pub async fn set_maintenance_mode(ctx: &ApiContext, mode: &str) -> Result<Value, ApiError> {
    let mode: MaintenanceMode = mode.parse()?;
    dispatch(ctx, CommandEnvelope::bare(mode.wire())).await
}

pub async fn set_maintenance(
    ctx: &ApiContext,
    settings: &MaintenanceSettings,
) -> Result<Value, ApiError> {
    if settings.is_empty() {
        return Err(ApiError::new(ErrorCode::Validation, "No fields set"));
    }
    dispatch(ctx, envelope(Command::SetMaintenance, settings)?).await
}

pub async fn set_override(ctx: &ApiContext, flags: &OverrideFlags) -> Result<Value, ApiError> {
    if flags.is_empty() {
        return Err(ApiError::new(ErrorCode::Validation, "No fields set"));
    }
    dispatch(ctx, envelope(Command::Override, flags)?).await
}

pub async fn get_volume(ctx: &ApiContext) -> Result<Value, ApiError> {
    dispatch(ctx, CommandEnvelope::bare(Command::GetVolume)).await
}

pub async fn set_volume(ctx: &ApiContext, volume: i64) -> Result<Value, ApiError> {
    let volume = check_volume(volume)?;
    dispatch(ctx, envelope(Command::SetVolume, &VolumePayload { volume })?).await
}

pub async fn get_temp_history(ctx: &ApiContext, from: Option<i64>) -> Result<Value, ApiError> {
    dispatch(ctx, envelope(Command::GetTempHistory, &TempHistoryQuery { from })?).await
}

pub async fn set_cool_temp(ctx: &ApiContext, cooltemp: f64) -> Result<Value, ApiError> {
    if !cooltemp.is_finite() {
        return Err(ApiError::new(ErrorCode::InvalidInput, "cooltemp must be a number"));
    }
    dispatch(ctx, envelope(Command::SetCoolTemp, &CoolTempPayload { cooltemp })?).await
}

pub async fn get_config(ctx: &ApiContext) -> Result<Value, ApiError> {
    dispatch(ctx, CommandEnvelope::bare(Command::GetConfig)).await
}

pub async fn set_config(ctx: &ApiContext, update: &ConfigUpdate) -> Result<Value, ApiError> {
    if update.is_empty() {
        return Err(ApiError::new(ErrorCode::Validation, "No fields set"));
    }
    dispatch(ctx, envelope(Command::SetConfig, update)?).await
}

#[cfg(test)]
#[path = "tests/dispatch_tests.rs"]
mod tests;
