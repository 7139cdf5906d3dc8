//! Dataset configuration with environment overrides.

use std::env;
use std::path::PathBuf;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SolarDbError};

/// Which recorded power column serves as ground truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerColumn {
    Ac,
    Dc,
}

impl PowerColumn {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ac => "power_ac",
            Self::Dc => "power_dc",
        }
    }
}

/// Reference scale for the normalized `error` statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorNormalization {
    /// `1 - predicted energy / true energy` over the joined interval.
    EnergyIntegral,
    /// Mean absolute error divided by the mean true value.
    MeanTruth,
    /// Mean absolute error divided by the installed capacity in watts.
    Capacity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolarDbConfig {
    pub db_path: PathBuf,
    pub power_column: PowerColumn,
    pub power_cadence: Duration,
    pub weather_cadence: Duration,
    pub error_normalization: ErrorNormalization,
}

impl Default for SolarDbConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/solardb.db"),
            power_column: PowerColumn::Ac,
            power_cadence: Duration::minutes(5),
            weather_cadence: Duration::hours(1),
            error_normalization: ErrorNormalization::EnergyIntegral,
        }
    }
}

impl SolarDbConfig {
    pub fn with_db_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: path.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.power_cadence <= Duration::zero() || self.weather_cadence <= Duration::zero() {
            return Err(SolarDbError::InvalidConfig(
                "cadences must be positive".to_string(),
            ));
        }
        if self.power_cadence.num_seconds() % 60 != 0 {
            return Err(SolarDbError::InvalidConfig(
                "power cadence must be a whole number of minutes".to_string(),
            ));
        }
        if self.weather_cadence.num_seconds() % self.power_cadence.num_seconds() != 0 {
            return Err(SolarDbError::InvalidConfig(format!(
                "weather cadence ({} min) must be a multiple of the power cadence ({} min)",
                self.weather_cadence.num_minutes(),
                self.power_cadence.num_minutes()
            )));
        }
        Ok(())
    }
}

pub fn solardb_config_from_env() -> SolarDbConfig {
    let mut config = SolarDbConfig::default();

    if let Ok(path) = env::var("SOLARDB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            config.db_path = PathBuf::from(trimmed);
        }
    }

    if let Ok(column) = env::var("SOLARDB_POWER_COLUMN") {
        if let Some(parsed) = parse_power_column(&column) {
            config.power_column = parsed;
        }
    }

    if let Ok(minutes) = env::var("SOLARDB_POWER_CADENCE_MIN") {
        if let Some(parsed) = parse_minutes(&minutes) {
            config.power_cadence = parsed;
        }
    }

    if let Ok(minutes) = env::var("SOLARDB_WEATHER_CADENCE_MIN") {
        if let Some(parsed) = parse_minutes(&minutes) {
            config.weather_cadence = parsed;
        }
    }

    if let Ok(norm) = env::var("SOLARDB_ERROR_NORMALIZATION") {
        if let Some(parsed) = parse_error_normalization(&norm) {
            config.error_normalization = parsed;
        }
    }

    config
}

fn parse_power_column(raw: &str) -> Option<PowerColumn> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "ac" | "power_ac" => Some(PowerColumn::Ac),
        "dc" | "power_dc" => Some(PowerColumn::Dc),
        _ => None,
    }
}

fn parse_minutes(raw: &str) -> Option<Duration> {
    match raw.trim().parse::<i64>() {
        Ok(minutes) if minutes > 0 => Some(Duration::minutes(minutes)),
        _ => None,
    }
}

fn parse_error_normalization(raw: &str) -> Option<ErrorNormalization> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "energy" | "energy_integral" => Some(ErrorNormalization::EnergyIntegral),
        "mean" | "mean_truth" => Some(ErrorNormalization::MeanTruth),
        "capacity" => Some(ErrorNormalization::Capacity),
        _ => None,
    }
}
