//! Builds the aligned history / weather / prediction tables for one
//! forecasting window.

use chrono::{Duration, NaiveDateTime, Timelike};

use crate::error::{Result, SolarDbError};
use crate::observability::{log_reindex_dropped, log_window_prepared};
use crate::plant::PlantId;
use crate::storage::SolarDb;
use crate::table::{cadence_steps, TimeTable};
use crate::weather::{interpolate_onto_grid, WeatherScheme};

/// Column of the prediction skeleton the caller fills in.
pub const PREDICTION_COLUMN: &str = "power";

/// Tables handed to a forecaster.
///
/// `weather` and `prediction` cover `[dt_start, dt_end)`; `history` covers the
/// `history_cnt` steps right before `dt_start`. All three share the cadence.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledWindow {
    pub history: TimeTable,
    pub weather: TimeTable,
    pub prediction: TimeTable,
}

impl AssembledWindow {
    pub fn into_parts(self) -> (TimeTable, TimeTable, TimeTable) {
        (self.history, self.weather, self.prediction)
    }
}

pub struct Assembler<'a> {
    db: &'a SolarDb,
}

impl<'a> Assembler<'a> {
    pub fn new(db: &'a SolarDb) -> Self {
        Self { db }
    }

    pub fn prepare_prediction(
        &self,
        pp_id: PlantId,
        dt_start: NaiveDateTime,
        dt_end: NaiveDateTime,
        weather_scheme: WeatherScheme,
        history_cnt: usize,
    ) -> Result<AssembledWindow> {
        if dt_start >= dt_end {
            return Err(SolarDbError::InvalidRange {
                start: dt_start,
                end: dt_end,
            });
        }
        self.db.plant_info(pp_id)?;

        let cadence = self.db.config().power_cadence;
        ensure_on_grid(dt_start, cadence)?;
        ensure_on_grid(dt_end, cadence)?;

        let (earliest, _) = self
            .db
            .data_interval(pp_id)?
            .ok_or(SolarDbError::NoPowerData(pp_id))?;
        // A span that does not fit the calendar reaches past any data.
        let history_start = i32::try_from(history_cnt)
            .ok()
            .and_then(|steps| cadence.checked_mul(steps))
            .and_then(|span| dt_start.checked_sub_signed(span));
        let history_start = match history_start {
            Some(start) if history_cnt == 0 || start >= earliest => start,
            required => {
                return Err(SolarDbError::InsufficientHistory {
                    pp_id,
                    required_start: required.unwrap_or(NaiveDateTime::MIN),
                    earliest,
                })
            }
        };

        let history = self.build_history(pp_id, history_start, dt_start, cadence, history_cnt)?;

        let len = cadence_steps(dt_start, dt_end, cadence);
        if i32::try_from(len).is_err() {
            return Err(SolarDbError::InvalidRange {
                start: dt_start,
                end: dt_end,
            });
        }
        let raw_weather = self
            .db
            .get_weather(pp_id, dt_start, dt_end, weather_scheme)?;
        let mut weather = interpolate_onto_grid(&raw_weather, pp_id, dt_start, cadence, len);

        let exogenous = self.db.get_exogenous(pp_id, dt_start, dt_end)?;
        let (exogenous, exo_stats) = TimeTable::from_records(
            pp_id,
            dt_start,
            cadence,
            len,
            &exogenous.columns,
            &exogenous.records,
        );
        log_reindex_dropped("exogenous", pp_id, exo_stats);
        weather.merge_columns(exogenous)?;

        let prediction = TimeTable::new(pp_id, dt_start, cadence, len, &[PREDICTION_COLUMN]);

        let window = AssembledWindow {
            history,
            weather,
            prediction,
        };
        log_window_prepared(&window, weather_scheme, raw_weather.len());
        Ok(window)
    }

    fn build_history(
        &self,
        pp_id: PlantId,
        history_start: NaiveDateTime,
        dt_start: NaiveDateTime,
        cadence: Duration,
        history_cnt: usize,
    ) -> Result<TimeTable> {
        if history_cnt == 0 {
            return Ok(TimeTable::empty(pp_id, dt_start, cadence));
        }

        let raw = self.db.get_history(pp_id, history_start, dt_start)?;
        let (history, stats) = TimeTable::from_records(
            pp_id,
            history_start,
            cadence,
            history_cnt,
            &raw.columns,
            &raw.records,
        );
        log_reindex_dropped("power", pp_id, stats);
        Ok(history)
    }
}

fn ensure_on_grid(dt: NaiveDateTime, cadence: Duration) -> Result<()> {
    let cadence_min = cadence.num_minutes();
    let minute_of_day = i64::from(dt.hour()) * 60 + i64::from(dt.minute());
    let aligned = dt.second() == 0
        && dt.nanosecond() == 0
        && cadence_min > 0
        && minute_of_day % cadence_min == 0;
    if aligned {
        Ok(())
    } else {
        Err(SolarDbError::MisalignedTimestamp { dt, cadence_min })
    }
}
