//! Error taxonomy shared by the accessor, assembler and evaluator.

use std::path::PathBuf;

use chrono::NaiveDateTime;
use serde::Serialize;
use thiserror::Error;

use crate::plant::PlantId;

pub type Result<T> = std::result::Result<T, SolarDbError>;

/// Coarse classification of [`SolarDbError`] so callers can tell a bad
/// request apart from a dataset that simply lacks data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    Storage,
    NotFound,
    InvalidScheme,
    Range,
    InsufficientData,
    InvalidInput,
}

#[derive(Debug, Error)]
pub enum SolarDbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("database file {path} does not exist")]
    MissingDatabase { path: PathBuf },
    #[error("unexpected schema in table {table}: {detail}")]
    Schema { table: &'static str, detail: String },
    #[error("failed to parse {table}.{column} value '{value}'")]
    ParseField {
        table: &'static str,
        column: &'static str,
        value: String,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown power plant {0}")]
    PlantNotFound(PlantId),

    #[error("invalid weather scheme: {0}")]
    InvalidScheme(String),

    #[error("invalid time range: start {start} must precede end {end}")]
    InvalidRange {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
    #[error("timestamp {dt} is not aligned to the {cadence_min} minute cadence")]
    MisalignedTimestamp { dt: NaiveDateTime, cadence_min: i64 },
    #[error("power plant {0} has no power records")]
    NoPowerData(PlantId),
    #[error(
        "insufficient history for power plant {pp_id}: window requires data from {required_start}, earliest record is {earliest}"
    )]
    InsufficientHistory {
        pp_id: PlantId,
        required_start: NaiveDateTime,
        earliest: NaiveDateTime,
    },

    #[error("no overlapping ground truth for {metric} of power plant {pp_id} in <{start}, {end})")]
    InsufficientData {
        metric: String,
        pp_id: PlantId,
        start: NaiveDateTime,
        end: NaiveDateTime,
    },

    #[error("table mismatch: {0}")]
    TableMismatch(String),
    #[error("power plant {0} has no installed capacity for capacity-normalized error")]
    MissingCapacity(PlantId),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SolarDbError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Sqlite(_)
            | Self::MissingDatabase { .. }
            | Self::Schema { .. }
            | Self::ParseField { .. }
            | Self::Io(_)
            | Self::Csv(_)
            | Self::Json(_) => ErrorKind::Storage,
            Self::PlantNotFound(_) => ErrorKind::NotFound,
            Self::InvalidScheme(_) => ErrorKind::InvalidScheme,
            Self::InvalidRange { .. }
            | Self::MisalignedTimestamp { .. }
            | Self::NoPowerData(_)
            | Self::InsufficientHistory { .. } => ErrorKind::Range,
            Self::InsufficientData { .. } => ErrorKind::InsufficientData,
            Self::TableMismatch(_) | Self::MissingCapacity(_) | Self::InvalidConfig(_) => {
                ErrorKind::InvalidInput
            }
        }
    }
}
