use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(ProgramId);

pub const NAME_MIN_CHARS: usize = 3;
pub const NAME_MAX_CHARS: usize = 32;
pub const BOILTIME_MAX_MINUTES: i64 = 300;
pub const VOLUME_MIN_LITERS: i64 = 5;
pub const VOLUME_MAX_LITERS: i64 = 80;

/// A brew recipe as submitted by clients and kept by the store.
///
/// Numeric fields are signed so that out-of-range input reaches the validator
/// instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ProgramId>,
    pub name: String,
    pub starttemp: f64,
    pub endtemp: f64,
    pub boiltime: i64,
    #[serde(default)]
    pub nomash: bool,
    #[serde(default)]
    pub noboil: bool,
    #[serde(default)]
    pub mashsteps: Vec<MashStep>,
    #[serde(default)]
    pub hops: Vec<HopAddition>,
}

impl Program {
    /// Drops the children of skipped phases, so `mashsteps` is empty iff
    /// `nomash` holds and likewise for `hops`/`noboil`.
    pub fn normalize(&mut self) {
        if self.nomash {
            self.mashsteps.clear();
        }
        if self.noboil {
            self.hops.clear();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MashStep {
    pub order: i64,
    pub temp: f64,
    pub holdtime: i64,
}

/// `attime` counts minutes before the end of the boil.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HopAddition {
    pub attime: i64,
    pub quantity: f64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramSummary {
    pub id: ProgramId,
    pub name: String,
}
