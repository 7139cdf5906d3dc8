//! Logging setup and the structured events the crate emits.
//!
//! Library code never calls `tracing` macros directly; every event goes
//! through a helper here so field names stay consistent across components.

use std::env;
use std::path::Path;

use chrono::NaiveDateTime;
use thiserror::Error;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::assemble::AssembledWindow;
use crate::config::{ErrorNormalization, SolarDbConfig};
use crate::plant::PlantId;
use crate::table::ReindexStats;
use crate::weather::WeatherScheme;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            include_target: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// `SOLARDB_LOG_LEVEL` takes any `EnvFilter` directive, e.g.
/// `solardb=debug,info`.
pub fn logging_config_from_env() -> LoggingConfig {
    let mut config = LoggingConfig::default();

    if let Some(level) = env::var("SOLARDB_LOG_LEVEL")
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
    {
        config.level = level;
    }
    if let Some(format) = env::var("SOLARDB_LOG_FORMAT")
        .ok()
        .and_then(|raw| parse_log_format(&raw))
    {
        config.format = format;
    }
    if let Some(include_target) = env::var("SOLARDB_LOG_TARGET")
        .ok()
        .and_then(|raw| parse_bool(&raw))
    {
        config.include_target = include_target;
    }

    config
}

/// Installs the global subscriber. Logs go to stderr so stdout stays free
/// for the report.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let env_filter =
        EnvFilter::try_new(config.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(config.include_target)
        .with_ansi(matches!(config.format, LogFormat::Pretty));

    match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
    }

    Ok(())
}

pub fn log_app_start(config: &LoggingConfig) {
    info!(
        component = "solardb_eval",
        event = "app.start",
        log_level = %config.level,
        log_format = ?config.format,
        include_target = config.include_target
    );
}

pub fn log_dataset_opened(path: &Path, plants: usize) {
    info!(
        component = "solardb_eval",
        event = "dataset.opened",
        path = %path.display(),
        plants
    );
}

pub fn log_export_written(dir: &Path, pp_id: PlantId, tables: usize) {
    info!(
        component = "solardb_eval",
        event = "export.written",
        dir = %dir.display(),
        pp_id = %pp_id,
        tables
    );
}

pub(crate) fn log_storage_opened(config: &SolarDbConfig) {
    info!(
        component = "storage",
        event = "storage.open",
        path = %config.db_path.display(),
        power_column = config.power_column.as_str(),
        power_cadence_min = config.power_cadence.num_minutes(),
        weather_cadence_min = config.weather_cadence.num_minutes()
    );
}

pub(crate) fn log_meta_loaded(plants: usize) {
    info!(component = "storage", event = "storage.meta.loaded", plants);
}

/// One range query against `table`; the scheme is present for weather only.
pub(crate) fn log_range_query(
    table: &'static str,
    pp_id: PlantId,
    dt_start: NaiveDateTime,
    dt_end: NaiveDateTime,
    scheme: Option<WeatherScheme>,
    rows: usize,
) {
    match scheme {
        Some(scheme) => debug!(
            component = "storage",
            event = "storage.query",
            table,
            pp_id = %pp_id,
            scheme = %scheme,
            dt_start = %dt_start,
            dt_end = %dt_end,
            rows
        ),
        None => debug!(
            component = "storage",
            event = "storage.query",
            table,
            pp_id = %pp_id,
            dt_start = %dt_start,
            dt_end = %dt_end,
            rows
        ),
    }
}

pub(crate) fn log_reindex_dropped(table: &'static str, pp_id: PlantId, stats: ReindexStats) {
    if stats.off_grid == 0 && stats.duplicates == 0 {
        return;
    }
    debug!(
        component = "assemble",
        event = "assemble.reindex.dropped",
        table,
        pp_id = %pp_id,
        placed = stats.placed,
        off_grid = stats.off_grid,
        duplicates = stats.duplicates
    );
}

pub(crate) fn log_window_prepared(
    window: &AssembledWindow,
    scheme: WeatherScheme,
    weather_samples: usize,
) {
    let prediction = &window.prediction;
    info!(
        component = "assemble",
        event = "assemble.prepare.finish",
        pp_id = %prediction.pp_id(),
        dt_start = %prediction.start(),
        dt_end = %prediction.end(),
        scheme = %scheme,
        history_rows = window.history.len(),
        history_missing_rows = window.history.missing_rows(),
        weather_rows = window.weather.len(),
        weather_samples,
        prediction_rows = prediction.len()
    );
}

pub(crate) fn log_power_joined(
    pp_id: PlantId,
    rows: usize,
    joined: usize,
    missing_prediction: usize,
    missing_truth: usize,
) {
    info!(
        component = "evaluate",
        event = "evaluate.power.joined",
        pp_id = %pp_id,
        rows,
        joined,
        missing_prediction,
        missing_truth
    );
    if missing_prediction > 0 {
        warn!(
            component = "evaluate",
            event = "evaluate.prediction.incomplete",
            pp_id = %pp_id,
            missing = missing_prediction,
            "prediction has missing or non-finite values; those rows are not scored"
        );
    }
}

pub(crate) fn log_evaluation_finished(
    pp_id: PlantId,
    dt_start: NaiveDateTime,
    dt_end: NaiveDateTime,
    normalization: ErrorNormalization,
    error: Option<f64>,
    metrics: usize,
) {
    match error {
        Some(error) => info!(
            component = "evaluate",
            event = "evaluate.finish",
            pp_id = %pp_id,
            dt_start = %dt_start,
            dt_end = %dt_end,
            normalization = ?normalization,
            error,
            metrics
        ),
        None => info!(
            component = "evaluate",
            event = "evaluate.finish",
            pp_id = %pp_id,
            dt_start = %dt_start,
            dt_end = %dt_end,
            normalization = ?normalization,
            metrics
        ),
    }
}

fn parse_log_format(raw: &str) -> Option<LogFormat> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "json" => Some(LogFormat::Json),
        "pretty" => Some(LogFormat::Pretty),
        _ => None,
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
