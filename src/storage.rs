//! Read-only access to the SolarDB SQLite file.
//!
//! Queries issued:
//! - `meta`: full scan, cached after the first read
//! - `power`: `pp_id = ? AND inv_id = ?` over a day bracket
//! - `weather`: `pp_id = ?` over a day bracket plus `age = ?` or
//!   `datetime(src_dt) <= datetime(?)`, depending on the scheme
//! - `exogenous`: `pp_id = ?` over a day bracket
//!
//! Timestamps are stored as text, with a space or a `T` between date and
//! time and optional fractional seconds. Those forms do not order the same
//! way as strings, so SQL only narrows to whole days
//! (`dt >= 'YYYY-MM-DD' AND dt < 'YYYY-MM-DD~'`) and the exact range is
//! applied to the parsed timestamps. `MIN(dt)`/`MAX(dt)` in
//! [`SolarDb::data_interval`] assume one format per file.

use std::cell::OnceCell;
use std::path::Path;

use chrono::NaiveDateTime;
use rusqlite::types::Value;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};

use crate::config::SolarDbConfig;
use crate::error::{Result, SolarDbError};
use crate::observability::{log_meta_loaded, log_range_query, log_storage_opened};
use crate::plant::{PlantId, PlantInfo};
use crate::table::{parse_timestamp, RecordSet, TimeSeriesRecord, TIMESTAMP_FORMAT};
use crate::weather::{
    ceil_to_cadence, floor_to_cadence, WeatherScheme, EXOGENOUS_FEATURES, WEATHER_FEATURES,
};

/// Power columns returned by [`SolarDb::get_history`].
pub const POWER_FEATURES: [&str; 6] = [
    "power_ac",
    "power_dc",
    "energy_hour",
    "energy_day",
    "energy_week",
    "energy_month",
];

const META_COLUMNS: [&str; 9] = [
    "pp_id",
    "inv_id",
    "freq",
    "capacity",
    "inverters",
    "interval",
    "location",
    "pos_lat",
    "pos_long",
];

/// Handle to one SolarDB file.
///
/// Owns a single read-only connection. The type is `Send` but not `Sync`:
/// share it between threads only behind the caller's own synchronization.
pub struct SolarDb {
    conn: Connection,
    config: SolarDbConfig,
    plants: OnceCell<Vec<PlantInfo>>,
}

impl SolarDb {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(&SolarDbConfig::with_db_path(path.as_ref()))
    }

    pub fn open_with_config(config: &SolarDbConfig) -> Result<Self> {
        config.validate()?;

        let path = &config.db_path;
        if !path.is_file() {
            return Err(SolarDbError::MissingDatabase { path: path.clone() });
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        ensure_expected_schema(&conn)?;

        log_storage_opened(config);

        Ok(Self {
            conn,
            config: config.clone(),
            plants: OnceCell::new(),
        })
    }

    pub fn config(&self) -> &SolarDbConfig {
        &self.config
    }

    /// All plants and inverters from the `meta` table, sorted by id.
    pub fn get_plant_info(&self) -> Result<Vec<PlantInfo>> {
        Ok(self.cached_plants()?.to_vec())
    }

    pub fn list_plants(&self) -> Result<Vec<PlantId>> {
        Ok(self.cached_plants()?.iter().map(|info| info.id).collect())
    }

    pub fn plant_info(&self, pp_id: PlantId) -> Result<PlantInfo> {
        self.cached_plants()?
            .iter()
            .find(|info| info.id == pp_id)
            .cloned()
            .ok_or(SolarDbError::PlantNotFound(pp_id))
    }

    /// Inclusive range of power timestamps, or `None` without power data.
    pub fn data_interval(&self, pp_id: PlantId) -> Result<Option<(NaiveDateTime, NaiveDateTime)>> {
        self.plant_info(pp_id)?;

        let bounds: (Option<String>, Option<String>) = self.conn.query_row(
            "SELECT MIN(dt), MAX(dt) FROM power WHERE pp_id = ?1 AND inv_id = ?2",
            params![pp_id.pp_id, pp_id.inv_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        match bounds {
            (Some(first), Some(last)) => Ok(Some((
                parse_dt_field("power", "dt", &first)?,
                parse_dt_field("power", "dt", &last)?,
            ))),
            _ => Ok(None),
        }
    }

    /// Power records of `pp_id` in `[dt_start, dt_end)` at native cadence.
    pub fn get_history(
        &self,
        pp_id: PlantId,
        dt_start: NaiveDateTime,
        dt_end: NaiveDateTime,
    ) -> Result<RecordSet> {
        validate_range(dt_start, dt_end)?;
        self.plant_info(pp_id)?;

        let sql = format!(
            "SELECT dt, {} FROM power
             WHERE pp_id = ?1 AND inv_id = ?2 AND dt >= ?3 AND dt < ?4",
            POWER_FEATURES.join(", ")
        );
        let records = self.query_records(
            "power",
            &sql,
            params![
                pp_id.pp_id,
                pp_id.inv_id,
                day_floor(dt_start),
                day_ceil(dt_end)
            ],
            POWER_FEATURES.len(),
            |dt| dt_start <= dt && dt < dt_end,
        )?;

        log_range_query("power", pp_id, dt_start, dt_end, None, records.len());

        Ok(RecordSet {
            pp_id,
            columns: owned_columns(&POWER_FEATURES),
            records,
        })
    }

    /// Raw weather rows needed to cover `[dt_start, dt_end)` under `scheme`.
    ///
    /// The range is widened to whole weather-cadence steps on both ends, the
    /// upper one inclusive, so every primary timestamp inside the window has
    /// bracketing samples. Under [`WeatherScheme::Realistic`] each column
    /// takes the freshest non-null value per timestamp.
    pub fn get_weather(
        &self,
        pp_id: PlantId,
        dt_start: NaiveDateTime,
        dt_end: NaiveDateTime,
        scheme: WeatherScheme,
    ) -> Result<RecordSet> {
        validate_range(dt_start, dt_end)?;
        self.plant_info(pp_id)?;

        let hour_start = floor_to_cadence(dt_start, self.config.weather_cadence);
        let hour_end = ceil_to_cadence(dt_end, self.config.weather_cadence);
        let columns = WEATHER_FEATURES.join(", ");

        let records = match scheme {
            WeatherScheme::Measured => {
                self.query_weather_by_age(pp_id, hour_start, hour_end, 0, &columns)?
            }
            WeatherScheme::Forecast { age_hours } => {
                self.query_weather_by_age(pp_id, hour_start, hour_end, age_hours, &columns)?
            }
            WeatherScheme::Realistic => {
                // Rows come back by age; the stable sort on `dt` keeps the
                // youngest forecast first within each timestamp.
                let sql = format!(
                    "SELECT dt, {columns} FROM weather
                     WHERE pp_id = ?1 AND dt >= ?2 AND dt < ?3
                       AND datetime(src_dt) <= datetime(?4)
                     ORDER BY age ASC"
                );
                let rows = self.query_records(
                    "weather",
                    &sql,
                    params![
                        pp_id.pp_id,
                        day_floor(hour_start),
                        day_ceil(hour_end),
                        format_dt(dt_start)
                    ],
                    WEATHER_FEATURES.len(),
                    |dt| hour_start <= dt && dt <= hour_end,
                )?;
                freshest_per_timestamp(rows)
            }
        };

        log_range_query(
            "weather",
            pp_id,
            hour_start,
            hour_end,
            Some(scheme),
            records.len(),
        );

        Ok(RecordSet {
            pp_id,
            columns: owned_columns(&WEATHER_FEATURES),
            records,
        })
    }

    /// Exogenous rows (sun position, status codes) in `[dt_start, dt_end)`.
    pub fn get_exogenous(
        &self,
        pp_id: PlantId,
        dt_start: NaiveDateTime,
        dt_end: NaiveDateTime,
    ) -> Result<RecordSet> {
        validate_range(dt_start, dt_end)?;
        self.plant_info(pp_id)?;

        let sql = format!(
            "SELECT dt, {} FROM exogenous
             WHERE pp_id = ?1 AND dt >= ?2 AND dt < ?3",
            EXOGENOUS_FEATURES.join(", ")
        );
        let records = self.query_records(
            "exogenous",
            &sql,
            params![pp_id.pp_id, day_floor(dt_start), day_ceil(dt_end)],
            EXOGENOUS_FEATURES.len(),
            |dt| dt_start <= dt && dt < dt_end,
        )?;

        log_range_query("exogenous", pp_id, dt_start, dt_end, None, records.len());

        Ok(RecordSet {
            pp_id,
            columns: owned_columns(&EXOGENOUS_FEATURES),
            records,
        })
    }

    fn query_weather_by_age(
        &self,
        pp_id: PlantId,
        hour_start: NaiveDateTime,
        hour_end: NaiveDateTime,
        age: u32,
        columns: &str,
    ) -> Result<Vec<TimeSeriesRecord>> {
        let sql = format!(
            "SELECT dt, {columns} FROM weather
             WHERE pp_id = ?1 AND dt >= ?2 AND dt < ?3 AND age = ?4"
        );
        self.query_records(
            "weather",
            &sql,
            params![
                pp_id.pp_id,
                day_floor(hour_start),
                day_ceil(hour_end),
                age
            ],
            WEATHER_FEATURES.len(),
            |dt| hour_start <= dt && dt <= hour_end,
        )
    }

    /// Runs a day-bracket query and returns the rows whose parsed `dt`
    /// passes `keep`, ordered by `dt` (stable with respect to SQL order).
    fn query_records(
        &self,
        table: &'static str,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
        value_columns: usize,
        keep: impl Fn(NaiveDateTime) -> bool,
    ) -> Result<Vec<TimeSeriesRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;

        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let raw_dt: String = row.get(0)?;
            let dt = parse_dt_field(table, "dt", &raw_dt)?;
            if !keep(dt) {
                continue;
            }
            let mut values = Vec::with_capacity(value_columns);
            for idx in 1..=value_columns {
                values.push(value_as_f64(table, row, idx)?);
            }
            records.push(TimeSeriesRecord { dt, values });
        }

        records.sort_by_key(|record| record.dt);
        Ok(records)
    }

    fn cached_plants(&self) -> Result<&[PlantInfo]> {
        if let Some(plants) = self.plants.get() {
            return Ok(plants.as_slice());
        }
        let loaded = self.load_plants()?;
        log_meta_loaded(loaded.len());
        Ok(self.plants.get_or_init(|| loaded).as_slice())
    }

    fn load_plants(&self) -> Result<Vec<PlantInfo>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM meta ORDER BY pp_id ASC, inv_id ASC",
            META_COLUMNS.join(", ")
        ))?;
        let mut rows = stmt.query([])?;

        let mut plants = Vec::new();
        while let Some(row) = rows.next()? {
            let interval: Option<String> = row.get(5)?;
            plants.push(PlantInfo {
                id: PlantId::inverter(row.get(0)?, row.get(1)?),
                freq_min: row.get(2)?,
                capacity_kwp: value_as_f64("meta", row, 3)?,
                inverters: value_as_f64("meta", row, 4)?,
                interval_start: interval
                    .as_deref()
                    .map(|raw| parse_dt_field("meta", "interval", raw))
                    .transpose()?,
                location: row.get(6)?,
                latitude: value_as_f64("meta", row, 7)?,
                longitude: value_as_f64("meta", row, 8)?,
            });
        }

        plants.sort_by_key(|info| info.id);
        Ok(plants)
    }
}

fn validate_range(dt_start: NaiveDateTime, dt_end: NaiveDateTime) -> Result<()> {
    if dt_start >= dt_end {
        return Err(SolarDbError::InvalidRange {
            start: dt_start,
            end: dt_end,
        });
    }
    Ok(())
}

/// Collapses rows ordered by `(dt, age)` to one row per timestamp. Each
/// column takes the first non-null value, i.e. the youngest forecast that
/// has it.
fn freshest_per_timestamp(rows: Vec<TimeSeriesRecord>) -> Vec<TimeSeriesRecord> {
    let mut out: Vec<TimeSeriesRecord> = Vec::with_capacity(rows.len());
    for row in rows {
        match out.last_mut() {
            Some(last) if last.dt == row.dt => {
                for (slot, value) in last.values.iter_mut().zip(row.values) {
                    if slot.is_none() {
                        *slot = value;
                    }
                }
            }
            _ => out.push(row),
        }
    }
    out
}

/// Bound for `datetime()` comparisons, which normalize both sides.
fn format_dt(dt: NaiveDateTime) -> String {
    dt.format(TIMESTAMP_FORMAT).to_string()
}

/// Lower text bound of the day holding `dt`.
fn day_floor(dt: NaiveDateTime) -> String {
    dt.format("%Y-%m-%d").to_string()
}

/// Upper text bound of the day holding `dt`: `~` sorts after every
/// character a timestamp of that day continues with.
fn day_ceil(dt: NaiveDateTime) -> String {
    dt.format("%Y-%m-%d~").to_string()
}

fn owned_columns(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| (*name).to_string()).collect()
}

fn parse_dt_field(table: &'static str, column: &'static str, raw: &str) -> Result<NaiveDateTime> {
    parse_timestamp(raw).ok_or_else(|| SolarDbError::ParseField {
        table,
        column,
        value: raw.to_string(),
    })
}

/// Numeric cells may be stored as INTEGER, REAL or NULL; booleans and codes
/// come back as integers.
fn value_as_f64(table: &'static str, row: &Row<'_>, idx: usize) -> Result<Option<f64>> {
    match row.get::<_, Value>(idx)? {
        Value::Null => Ok(None),
        Value::Integer(v) => Ok(Some(v as f64)),
        Value::Real(v) => Ok(Some(v)),
        Value::Text(text) => text
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| SolarDbError::ParseField {
                table,
                column: column_name(table, idx),
                value: text,
            }),
        Value::Blob(_) => Err(SolarDbError::ParseField {
            table,
            column: column_name(table, idx),
            value: "<blob>".to_string(),
        }),
    }
}

fn column_name(table: &'static str, idx: usize) -> &'static str {
    let names: &[&'static str] = match table {
        "power" => &POWER_FEATURES,
        "weather" => &WEATHER_FEATURES,
        "exogenous" => &EXOGENOUS_FEATURES,
        "meta" => return META_COLUMNS.get(idx).copied().unwrap_or("?"),
        _ => return "?",
    };
    idx.checked_sub(1)
        .and_then(|i| names.get(i))
        .copied()
        .unwrap_or("?")
}

fn ensure_expected_schema(conn: &Connection) -> Result<()> {
    let power_columns: Vec<&'static str> = ["pp_id", "inv_id", "dt"]
        .into_iter()
        .chain(POWER_FEATURES)
        .collect();
    let weather_columns: Vec<&'static str> = ["pp_id", "dt", "age", "src_dt"]
        .into_iter()
        .chain(WEATHER_FEATURES)
        .collect();
    let exogenous_columns: Vec<&'static str> = ["pp_id", "dt"]
        .into_iter()
        .chain(EXOGENOUS_FEATURES)
        .collect();

    let expected: [(&'static str, &[&'static str]); 4] = [
        ("meta", &META_COLUMNS[..]),
        ("power", power_columns.as_slice()),
        ("weather", weather_columns.as_slice()),
        ("exogenous", exogenous_columns.as_slice()),
    ];

    for (table, columns) in expected {
        if !table_exists(conn, table)? {
            return Err(SolarDbError::Schema {
                table,
                detail: "table is missing".to_string(),
            });
        }
        let present = table_columns(conn, table)?;
        let missing: Vec<&str> = columns
            .iter()
            .copied()
            .filter(|column| !present.iter().any(|name| name == column))
            .collect();
        if !missing.is_empty() {
            return Err(SolarDbError::Schema {
                table,
                detail: format!("missing columns {missing:?}"),
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1 LIMIT 1",
            params![table],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
        .is_some();
    Ok(exists)
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let pragma = format!("PRAGMA table_info({table})");
    let mut stmt = conn.prepare(&pragma)?;
    let mut rows = stmt.query([])?;
    let mut names = Vec::new();
    while let Some(row) = rows.next()? {
        names.push(row.get(1)?);
    }
    Ok(names)
}
