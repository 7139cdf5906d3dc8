//! Weather sampling schemes and hourly-to-primary cadence interpolation.

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::SolarDbError;
use crate::plant::PlantId;
use crate::table::{offset_by_steps, RecordSet, TimeTable};

/// Weather feature columns, in table order.
pub const WEATHER_FEATURES: [&str; 11] = [
    "precip_int",
    "precip_prob",
    "temp",
    "apparent_temp",
    "dew_point",
    "humidity",
    "pressure",
    "wind_speed",
    "wind_bearing",
    "cloud_cover",
    "visibility",
];

/// Exogenous columns, stored at the primary cadence.
pub const EXOGENOUS_FEATURES: [&str; 6] = [
    "sun_altitude",
    "sun_azimuth",
    "sun_irradiance",
    "status",
    "error",
    "clear",
];

/// Which weather rows stand in for the prediction window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum WeatherScheme {
    /// Observed weather (`age = 0`); an oracle no real forecaster has.
    Measured,
    /// Forecasts issued exactly `age_hours` before each timestamp.
    Forecast { age_hours: u32 },
    /// Per timestamp, the freshest forecast issued no later than the
    /// window start.
    #[default]
    Realistic,
}

impl fmt::Display for WeatherScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Measured => f.write_str("measured"),
            Self::Forecast { age_hours } => write!(f, "forecast:{age_hours}"),
            Self::Realistic => f.write_str("realistic"),
        }
    }
}

impl FromStr for WeatherScheme {
    type Err = SolarDbError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "measured" => Ok(Self::Measured),
            "realistic" => Ok(Self::Realistic),
            "forecast" => Err(SolarDbError::InvalidScheme(
                "\"forecast\" requires an age in hours, e.g. \"forecast:6\"".to_string(),
            )),
            other => match other.strip_prefix("forecast:") {
                Some(hours) => hours
                    .trim()
                    .parse::<u32>()
                    .map(|age_hours| Self::Forecast { age_hours })
                    .map_err(|_| {
                        SolarDbError::InvalidScheme(format!(
                            "invalid forecast age in \"{raw}\""
                        ))
                    }),
                None => Err(SolarDbError::InvalidScheme(format!(
                    "unknown weather scheme \"{raw}\", expected measured, realistic or forecast:<hours>"
                ))),
            },
        }
    }
}

/// Linearly interpolates sparse hourly `records` onto the grid
/// `start + i * cadence`, `i in 0..len`.
///
/// A grid point takes the exact sample if one exists, otherwise the
/// time-weighted blend of the nearest earlier and later samples that have a
/// value for that column. Points with no sample on one side stay missing.
pub fn interpolate_onto_grid(
    source: &RecordSet,
    pp_id: PlantId,
    start: NaiveDateTime,
    cadence: Duration,
    len: usize,
) -> TimeTable {
    let names: Vec<&str> = source.columns.iter().map(String::as_str).collect();
    let mut table = TimeTable::new(pp_id, start, cadence, len, &names);

    for (col_idx, name) in names.iter().enumerate() {
        let samples: Vec<(NaiveDateTime, f64)> = source
            .records
            .iter()
            .filter_map(|record| record.values[col_idx].map(|value| (record.dt, value)))
            .collect();
        if samples.is_empty() {
            continue;
        }

        let Some(values) = table.column_mut(name) else {
            continue;
        };

        let mut upper = 0usize;
        for (row, slot) in values.iter_mut().enumerate() {
            let Some(dt) = offset_by_steps(start, cadence, row) else {
                break;
            };
            while upper < samples.len() && samples[upper].0 < dt {
                upper += 1;
            }
            *slot = match samples.get(upper) {
                Some((sample_dt, value)) if *sample_dt == dt => Some(*value),
                Some((next_dt, next_value)) if upper > 0 => {
                    let (prev_dt, prev_value) = samples[upper - 1];
                    let span = (*next_dt - prev_dt).num_seconds() as f64;
                    let offset = (dt - prev_dt).num_seconds() as f64;
                    Some(prev_value + (next_value - prev_value) * offset / span)
                }
                _ => None,
            };
        }
    }

    table
}

/// `dt` rounded down to a multiple of `cadence` since midnight.
pub fn floor_to_cadence(dt: NaiveDateTime, cadence: Duration) -> NaiveDateTime {
    let step = cadence.num_seconds();
    if step <= 0 {
        return dt;
    }
    let secs = dt.and_utc().timestamp();
    dt - Duration::seconds(secs.rem_euclid(step))
}

/// `dt` rounded up to a multiple of `cadence` since midnight.
pub fn ceil_to_cadence(dt: NaiveDateTime, cadence: Duration) -> NaiveDateTime {
    let floored = floor_to_cadence(dt, cadence);
    if floored == dt {
        dt
    } else {
        floored + cadence
    }
}
