//! Caller-facing tokens for brewd's state-advancing commands.
//!
//! Which transitions are legal from which process state is decided by brewd
//! alone; this module only maps tokens and refuses ones it does not know.

use std::str::FromStr;

use shared::{
    error::{ApiError, ErrorCode},
    protocol::Command,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateCommand {
    HasMalt,
    SpargeDone,
    StartBoil,
    CoolingDone,
    TransferDone,
    Reset,
}

impl StateCommand {
    pub const ALL: [StateCommand; 6] = [
        StateCommand::HasMalt,
        StateCommand::SpargeDone,
        StateCommand::StartBoil,
        StateCommand::CoolingDone,
        StateCommand::TransferDone,
        StateCommand::Reset,
    ];

    pub fn token(self) -> &'static str {
        match self {
            StateCommand::HasMalt => "hasMalt",
            StateCommand::SpargeDone => "spargeDone",
            StateCommand::StartBoil => "startBoil",
            StateCommand::CoolingDone => "coolingDone",
            StateCommand::TransferDone => "transferDone",
            StateCommand::Reset => "reset",
        }
    }

    pub fn wire(self) -> Command {
        match self {
            StateCommand::HasMalt => Command::HasMalt,
            StateCommand::SpargeDone => Command::SpargeDone,
            StateCommand::StartBoil => Command::StartHopping,
            StateCommand::CoolingDone => Command::CoolingDone,
            StateCommand::TransferDone => Command::TransferDone,
            StateCommand::Reset => Command::ResetProcess,
        }
    }
}

impl FromStr for StateCommand {
    type Err = ApiError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|command| command.token() == token)
            .ok_or_else(|| ApiError::new(ErrorCode::Validation, format!("Unknown command: {token}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceMode {
    Start,
    Stop,
}

impl MaintenanceMode {
    pub fn wire(self) -> Command {
        match self {
            MaintenanceMode::Start => Command::StartMaintenance,
            MaintenanceMode::Stop => Command::StopMaintenance,
        }
    }
}

impl FromStr for MaintenanceMode {
    type Err = ApiError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token {
            "start" => Ok(MaintenanceMode::Start),
            "stop" => Ok(MaintenanceMode::Stop),
            other => Err(ApiError::new(
                ErrorCode::Validation,
                format!("Invalid maintmode: {other}"),
            )),
        }
    }
}
