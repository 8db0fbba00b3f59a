//! Wire vocabulary exchanged with brewd over the command channel.
//!
//! Field names follow what brewd parses, so they are kept lowercase and
//! unabbreviated exactly as they appear on the wire.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{HopAddition, MashStep, Program};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Command {
    LoadProgram,
    GetProgram,
    GetState,
    HasMalt,
    SpargeDone,
    StartHopping,
    CoolingDone,
    TransferDone,
    ResetProcess,
    StartMaintenance,
    StopMaintenance,
    SetMaintenance,
    Override,
    GetVolume,
    SetVolume,
    GetTempHistory,
    SetCoolTemp,
    GetConfig,
    SetConfig,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::LoadProgram => "loadProgram",
            Command::GetProgram => "getProgram",
            Command::GetState => "getState",
            Command::HasMalt => "hasMalt",
            Command::SpargeDone => "spargeDone",
            Command::StartHopping => "startHopping",
            Command::CoolingDone => "coolingDone",
            Command::TransferDone => "transferDone",
            Command::ResetProcess => "resetProcess",
            Command::StartMaintenance => "startMaintenance",
            Command::StopMaintenance => "stopMaintenance",
            Command::SetMaintenance => "setMaintenance",
            Command::Override => "override",
            Command::GetVolume => "getVolume",
            Command::SetVolume => "setVolume",
            Command::GetTempHistory => "getTempHistory",
            Command::SetCoolTemp => "setCoolTemp",
            Command::GetConfig => "getConfig",
            Command::SetConfig => "setConfig",
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request on the channel. `data` is always serialized, as `null` for
/// commands without a payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub command: Command,
    #[serde(default)]
    pub data: Value,
}

impl CommandEnvelope {
    pub fn bare(command: Command) -> Self {
        Self {
            command,
            data: Value::Null,
        }
    }

    pub fn with_payload<T: Serialize>(command: Command, payload: &T) -> serde_json::Result<Self> {
        Ok(Self {
            command,
            data: serde_json::to_value(payload)?,
        })
    }
}

/// One reply on the channel. Every field is optional on the wire; shape
/// checks belong to whoever interprets the reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ResponseEnvelope {
    pub const SUCCESS: &'static str = "success";
    pub const ERROR: &'static str = "error";

    pub fn success(data: Value) -> Self {
        Self {
            status: Some(Self::SUCCESS.to_string()),
            data: Some(data),
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Some(Self::ERROR.to_string()),
            data: None,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadProgramPayload {
    pub program: WireProgram,
    /// Absolute epoch seconds, or `0` for an immediate start.
    pub startat: i64,
    pub volume: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireProgram {
    pub id: i64,
    pub name: String,
    pub starttemp: f64,
    pub endtemp: f64,
    pub boiltime: i64,
    pub nomash: bool,
    pub noboil: bool,
    pub mashsteps: Vec<WireMashStep>,
    pub hops: Vec<WireHop>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMashStep {
    pub orderno: i64,
    pub temperature: f64,
    pub holdtime: i64,
}

/// `attime` is in seconds before the end of the boil.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireHop {
    pub id: i64,
    pub attime: i64,
    pub quantity: f64,
    pub name: String,
}

impl WireProgram {
    /// Converts a stored program to brewd's shape. Hop times go from minutes
    /// to seconds and each hop is identified by its position.
    pub fn from_program(id: i64, program: &Program) -> Self {
        Self {
            id,
            name: program.name.clone(),
            starttemp: program.starttemp,
            endtemp: program.endtemp,
            boiltime: program.boiltime,
            nomash: program.nomash,
            noboil: program.noboil,
            mashsteps: program.mashsteps.iter().map(WireMashStep::from).collect(),
            hops: program
                .hops
                .iter()
                .enumerate()
                .map(|(position, hop)| WireHop::from_hop(position as i64, hop))
                .collect(),
        }
    }
}

impl From<&MashStep> for WireMashStep {
    fn from(step: &MashStep) -> Self {
        Self {
            orderno: step.order,
            temperature: step.temp,
            holdtime: step.holdtime,
        }
    }
}

impl WireHop {
    fn from_hop(id: i64, hop: &HopAddition) -> Self {
        Self {
            id,
            attime: hop.attime.saturating_mul(60),
            quantity: hop.quantity,
            name: hop.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateQuery {
    pub history: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempHistoryQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumePayload {
    pub volume: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoolTempPayload {
    pub cooltemp: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtpump: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bkpump: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heat: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp: Option<f64>,
}

impl MaintenanceSettings {
    pub fn is_empty(&self) -> bool {
        self.mtpump.is_none() && self.bkpump.is_none() && self.heat.is_none() && self.temp.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideFlags {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blockheat: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forcemtpump: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bkpump: Option<bool>,
}

impl OverrideFlags {
    pub fn is_empty(&self) -> bool {
        self.blockheat.is_none() && self.forcemtpump.is_none() && self.bkpump.is_none()
    }
}

/// Subset of brewd's tunables; absent fields are left untouched by brewd.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hepower: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tempaccuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heatoverhead: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooltemp: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hedelay: Option<u32>,
}

impl ConfigUpdate {
    pub fn is_empty(&self) -> bool {
        self.hepower.is_none()
            && self.tempaccuracy.is_none()
            && self.heatoverhead.is_none()
            && self.cooltemp.is_none()
            && self.hedelay.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_program() -> Program {
        Program {
            id: None,
            name: "Pale Ale".into(),
            starttemp: 40.0,
            endtemp: 78.0,
            boiltime: 60,
            nomash: false,
            noboil: false,
            mashsteps: vec![MashStep {
                order: 0,
                temp: 66.0,
                holdtime: 60,
            }],
            hops: vec![
                HopAddition {
                    attime: 60,
                    quantity: 20.0,
                    name: "Magnum".into(),
                },
                HopAddition {
                    attime: 45,
                    quantity: 15.0,
                    name: "Cascade".into(),
                },
            ],
        }
    }

    #[test]
    fn bare_envelope_serializes_null_data() {
        let envelope = CommandEnvelope::bare(Command::StartHopping);
        let wire = serde_json::to_value(&envelope).expect("json");
        assert_eq!(wire, json!({ "command": "startHopping", "data": null }));
    }

    #[test]
    fn command_names_match_serde_names() {
        for command in [
            Command::LoadProgram,
            Command::GetTempHistory,
            Command::Override,
            Command::SetCoolTemp,
            Command::ResetProcess,
        ] {
            let wire = serde_json::to_value(command).expect("json");
            assert_eq!(wire, json!(command.as_str()));
        }
    }

    #[test]
    fn wire_program_converts_hop_minutes_to_seconds() {
        let wire = WireProgram::from_program(7, &sample_program());
        assert_eq!(wire.id, 7);
        assert_eq!(wire.hops[0].attime, 3600);
        assert_eq!(wire.hops[1].attime, 2700);
        assert_eq!(wire.hops[1].id, 1);
        assert_eq!(wire.mashsteps[0].orderno, 0);
        assert_eq!(wire.mashsteps[0].temperature, 66.0);
    }

    #[test]
    fn oversized_hop_time_saturates() {
        let mut program = sample_program();
        program.hops[0].attime = i64::MAX / 2;
        let wire = WireProgram::from_program(1, &program);
        assert_eq!(wire.hops[0].attime, i64::MAX);
    }

    #[test]
    fn response_without_status_still_decodes() {
        let reply: ResponseEnvelope =
            serde_json::from_value(json!({ "data": { "volume": 20 } })).expect("json");
        assert!(reply.status.is_none());
        assert_eq!(reply.data, Some(json!({ "volume": 20 })));
    }

    #[test]
    fn optional_payload_fields_are_omitted() {
        let settings = MaintenanceSettings {
            heat: Some(true),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(settings).expect("json"),
            json!({ "heat": true })
        );
        assert!(!settings.is_empty());
        assert!(OverrideFlags::default().is_empty());
        assert!(ConfigUpdate::default().is_empty());
    }

    #[test]
    fn normalize_drops_skipped_phases() {
        let mut program = sample_program();
        program.nomash = true;
        program.noboil = true;
        program.normalize();
        assert!(program.mashsteps.is_empty());
        assert!(program.hops.is_empty());
    }
}
