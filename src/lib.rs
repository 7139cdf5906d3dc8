//! SolarDB dataset access and forecast evaluation.
//!
//! - `SolarDb`: read-only accessor over the SQLite dataset
//! - `Assembler`: aligned history / weather / prediction tables for a window
//! - `Evaluator`: scores a filled prediction against ground truth

mod assemble;
mod config;
mod error;
mod evaluate;
mod observability;
mod plant;
mod storage;
mod table;
#[cfg(test)]
mod test_env;
mod weather;

pub use assemble::{AssembledWindow, Assembler, PREDICTION_COLUMN};
pub use config::{solardb_config_from_env, ErrorNormalization, PowerColumn, SolarDbConfig};
pub use error::{ErrorKind, Result, SolarDbError};
pub use evaluate::{
    pearson, r2_score, spearman, EvaluationReport, Evaluator, HISTORY_METRIC, POWER_METRIC,
    WEATHER_METRIC_PREFIX,
};
pub use observability::{
    init_logging, log_app_start, log_dataset_opened, log_export_written, logging_config_from_env,
    LogFormat, LoggingConfig, LoggingInitError,
};
pub use plant::{ParsePlantIdError, PlantId, PlantInfo, WHOLE_PLANT_INV_ID};
pub use storage::{SolarDb, POWER_FEATURES};
pub use table::{
    cadence_steps, parse_timestamp, Column, RecordSet, ReindexStats, TimeSeriesRecord, TimeTable,
    TIMESTAMP_FORMAT,
};
pub use weather::{
    ceil_to_cadence, floor_to_cadence, interpolate_onto_grid, WeatherScheme, EXOGENOUS_FEATURES,
    WEATHER_FEATURES,
};
