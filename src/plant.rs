//! Power plant identifiers and per-plant metadata.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Inverter id the dataset uses for the aggregate of a whole plant.
pub const WHOLE_PLANT_INV_ID: i64 = -1;

/// Identifies a power plant (`inv_id == -1`) or one of its inverters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlantId {
    pub pp_id: i64,
    pub inv_id: i64,
}

impl PlantId {
    pub fn whole(pp_id: i64) -> Self {
        Self {
            pp_id,
            inv_id: WHOLE_PLANT_INV_ID,
        }
    }

    pub fn inverter(pp_id: i64, inv_id: i64) -> Self {
        Self { pp_id, inv_id }
    }

    pub fn is_whole_plant(&self) -> bool {
        self.inv_id == WHOLE_PLANT_INV_ID
    }
}

impl From<i64> for PlantId {
    fn from(pp_id: i64) -> Self {
        Self::whole(pp_id)
    }
}

impl fmt::Display for PlantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_whole_plant() {
            write!(f, "{}", self.pp_id)
        } else {
            write!(f, "{}:{}", self.pp_id, self.inv_id)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsePlantIdError(pub String);

impl fmt::Display for ParsePlantIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid power plant id '{}'", self.0)
    }
}

impl std::error::Error for ParsePlantIdError {}

impl FromStr for PlantId {
    type Err = ParsePlantIdError;

    /// Accepts `"8"` for a whole plant and `"8:2"` for an inverter.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let err = || ParsePlantIdError(raw.to_string());
        match trimmed.split_once(':') {
            Some((pp, inv)) => Ok(Self::inverter(
                pp.trim().parse().map_err(|_| err())?,
                inv.trim().parse().map_err(|_| err())?,
            )),
            None => Ok(Self::whole(trimmed.parse().map_err(|_| err())?)),
        }
    }
}

/// One row of the `meta` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantInfo {
    pub id: PlantId,
    /// Raw reporting frequency in minutes, before interpolation.
    pub freq_min: Option<i64>,
    pub capacity_kwp: Option<f64>,
    pub inverters: Option<f64>,
    pub interval_start: Option<NaiveDateTime>,
    pub location: Option<String>,
    /// Latitude and longitude are anonymized and only approximate.
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl PlantInfo {
    pub fn capacity_w(&self) -> Option<f64> {
        self.capacity_kwp.map(|kwp| kwp * 1_000.0)
    }
}
