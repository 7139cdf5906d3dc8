//! Regular, time-indexed tables with explicit missing values.

use std::collections::HashMap;
use std::io::Write;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, SolarDbError};
use crate::plant::PlantId;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One raw row returned by the accessor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesRecord {
    pub dt: NaiveDateTime,
    pub values: Vec<Option<f64>>,
}

/// Raw rows of one plant, ordered by timestamp, at whatever cadence the
/// underlying table stores them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSet {
    pub pp_id: PlantId,
    pub columns: Vec<String>,
    pub records: Vec<TimeSeriesRecord>,
}

impl RecordSet {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Values of one column keyed by timestamp, skipping missing entries.
    pub fn column_by_dt(&self, name: &str) -> HashMap<NaiveDateTime, f64> {
        let Some(idx) = self.column_index(name) else {
            return HashMap::new();
        };
        self.records
            .iter()
            .filter_map(|record| record.values[idx].map(|value| (record.dt, value)))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

/// Outcome of placing raw records onto a regular grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReindexStats {
    pub placed: usize,
    pub off_grid: usize,
    pub duplicates: usize,
}

/// A table indexed by `start + i * cadence` for `i in 0..len`.
///
/// Every column has exactly `len` entries; a gap in the source data is a
/// `None`, never a missing row. The plant id travels with the table so the
/// evaluator can recover which ground truth to fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTimeTable")]
pub struct TimeTable {
    pp_id: PlantId,
    start: NaiveDateTime,
    #[serde(with = "cadence_seconds")]
    cadence: Duration,
    len: usize,
    columns: Vec<Column>,
}

/// Wire form of [`TimeTable`], checked before it becomes one.
#[derive(Deserialize)]
struct RawTimeTable {
    pp_id: PlantId,
    start: NaiveDateTime,
    #[serde(with = "cadence_seconds")]
    cadence: Duration,
    len: usize,
    columns: Vec<Column>,
}

impl TryFrom<RawTimeTable> for TimeTable {
    type Error = SolarDbError;

    fn try_from(raw: RawTimeTable) -> Result<Self> {
        if raw.cadence <= Duration::zero() {
            return Err(SolarDbError::TableMismatch(format!(
                "table cadence must be positive, got {} s",
                raw.cadence.num_seconds()
            )));
        }
        if offset_by_steps(raw.start, raw.cadence, raw.len).is_none() {
            return Err(SolarDbError::TableMismatch(format!(
                "table of {} rows does not fit the calendar",
                raw.len
            )));
        }
        if let Some(column) = raw.columns.iter().find(|c| c.values.len() != raw.len) {
            return Err(SolarDbError::TableMismatch(format!(
                "column '{}' has {} values, table has {} rows",
                column.name,
                column.values.len(),
                raw.len
            )));
        }
        Ok(Self {
            pp_id: raw.pp_id,
            start: raw.start,
            cadence: raw.cadence,
            len: raw.len,
            columns: raw.columns,
        })
    }
}

impl TimeTable {
    /// Table with the given index and all values missing.
    pub fn new(
        pp_id: PlantId,
        start: NaiveDateTime,
        cadence: Duration,
        len: usize,
        column_names: &[&str],
    ) -> Self {
        Self {
            pp_id,
            start,
            cadence,
            len,
            columns: column_names
                .iter()
                .map(|name| Column {
                    name: (*name).to_string(),
                    values: vec![None; len],
                })
                .collect(),
        }
    }

    /// Zero-length table; used where a history or weather table is absent.
    pub fn empty(pp_id: PlantId, start: NaiveDateTime, cadence: Duration) -> Self {
        Self::new(pp_id, start, cadence, 0, &[])
    }

    /// Places `records` onto the grid; records between grid points are
    /// counted as off-grid and dropped, later duplicates lose to the first.
    pub fn from_records(
        pp_id: PlantId,
        start: NaiveDateTime,
        cadence: Duration,
        len: usize,
        columns: &[String],
        records: &[TimeSeriesRecord],
    ) -> (Self, ReindexStats) {
        let names: Vec<&str> = columns.iter().map(String::as_str).collect();
        let mut table = Self::new(pp_id, start, cadence, len, &names);
        let mut filled = vec![false; len];
        let mut stats = ReindexStats::default();

        for record in records {
            let Some(row) = table.position(record.dt) else {
                stats.off_grid += 1;
                continue;
            };
            if filled[row] {
                stats.duplicates += 1;
                continue;
            }
            filled[row] = true;
            stats.placed += 1;
            for (column, value) in table.columns.iter_mut().zip(&record.values) {
                column.values[row] = *value;
            }
        }

        (table, stats)
    }

    pub fn pp_id(&self) -> PlantId {
        self.pp_id
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    /// Exclusive end of the covered interval, saturating at the calendar's
    /// upper bound.
    pub fn end(&self) -> NaiveDateTime {
        offset_by_steps(self.start, self.cadence, self.len).unwrap_or(NaiveDateTime::MAX)
    }

    pub fn cadence(&self) -> Duration {
        self.cadence
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn timestamp(&self, row: usize) -> Option<NaiveDateTime> {
        if row >= self.len {
            return None;
        }
        offset_by_steps(self.start, self.cadence, row)
    }

    pub fn index(&self) -> impl Iterator<Item = NaiveDateTime> + '_ {
        (0..self.len).map_while(move |row| offset_by_steps(self.start, self.cadence, row))
    }

    /// Row of `dt` if it lies exactly on the grid.
    pub fn position(&self, dt: NaiveDateTime) -> Option<usize> {
        let step = self.cadence.num_seconds();
        if step <= 0 {
            return None;
        }
        let offset = (dt - self.start).num_seconds();
        if offset < 0 || offset % step != 0 {
            return None;
        }
        let row = (offset / step) as usize;
        (row < self.len).then_some(row)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns
            .iter()
            .find(|column| column.name == name)
            .map(|column| column.values.as_slice())
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut [Option<f64>]> {
        self.columns
            .iter_mut()
            .find(|column| column.name == name)
            .map(|column| column.values.as_mut_slice())
    }

    pub fn set(&mut self, name: &str, row: usize, value: Option<f64>) -> Result<()> {
        let len = self.len;
        let values = self.column_mut(name).ok_or_else(|| {
            SolarDbError::TableMismatch(format!("table has no column '{name}'"))
        })?;
        let slot = values.get_mut(row).ok_or_else(|| {
            SolarDbError::TableMismatch(format!("row {row} out of range for {len} rows"))
        })?;
        *slot = value;
        Ok(())
    }

    /// Sets every value of `name` to `value`.
    pub fn fill_column(&mut self, name: &str, value: f64) -> Result<()> {
        let values = self.column_mut(name).ok_or_else(|| {
            SolarDbError::TableMismatch(format!("table has no column '{name}'"))
        })?;
        values.iter_mut().for_each(|slot| *slot = Some(value));
        Ok(())
    }

    /// Appends the columns of `other`, which must share this table's index.
    pub fn merge_columns(&mut self, other: TimeTable) -> Result<()> {
        if !self.same_index(&other) {
            return Err(SolarDbError::TableMismatch(format!(
                "cannot merge tables with different indices: <{}, {}) vs <{}, {})",
                self.start,
                self.end(),
                other.start,
                other.end()
            )));
        }
        self.columns.extend(other.columns);
        Ok(())
    }

    pub fn same_index(&self, other: &TimeTable) -> bool {
        self.start == other.start && self.cadence == other.cadence && self.len == other.len
    }

    pub fn missing_count(&self, name: &str) -> Option<usize> {
        self.column(name)
            .map(|values| values.iter().filter(|value| value.is_none()).count())
    }

    /// Rows in which every column is missing.
    pub fn missing_rows(&self) -> usize {
        (0..self.len)
            .filter(|row| self.columns.iter().all(|column| column.values[*row].is_none()))
            .count()
    }

    /// Copy of this table placed onto the grid `start + i * cadence`,
    /// `i in 0..len`, with the same cadence. Rows outside the old index
    /// become missing; rows outside the new index are dropped.
    pub fn reindex(&self, start: NaiveDateTime, len: usize) -> Self {
        let names: Vec<&str> = self.column_names().collect();
        let mut out = Self::new(self.pp_id, start, self.cadence, len, &names);
        for (row, dt) in self.index().enumerate() {
            let Some(target) = out.position(dt) else {
                continue;
            };
            for (dst, src) in out.columns.iter_mut().zip(&self.columns) {
                dst.values[target] = src.values[row];
            }
        }
        out
    }

    /// Writes the table as CSV with a leading `dt` column; missing values
    /// become empty fields.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut out = csv::Writer::from_writer(writer);

        let mut header = vec!["dt".to_string()];
        header.extend(self.column_names().map(str::to_string));
        out.write_record(&header)?;

        for (row, dt) in self.index().enumerate() {
            let mut record = Vec::with_capacity(self.columns.len() + 1);
            record.push(dt.format(TIMESTAMP_FORMAT).to_string());
            for column in &self.columns {
                record.push(
                    column.values[row]
                        .map(|value| value.to_string())
                        .unwrap_or_default(),
                );
            }
            out.write_record(&record)?;
        }

        out.flush()?;
        Ok(())
    }

    /// SHA-256 over plant, index, column names and value bit patterns.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("pp:{};", self.pp_id));
        hasher.update(format!(
            "index:{},{},{};",
            self.start.format(TIMESTAMP_FORMAT),
            self.cadence.num_seconds(),
            self.len
        ));
        for column in &self.columns {
            hasher.update(column.name.as_bytes());
            hasher.update(":");
            for value in &column.values {
                match value {
                    Some(v) => hasher.update(v.to_bits().to_le_bytes()),
                    None => hasher.update(b"-"),
                }
            }
            hasher.update(";");
        }
        hex::encode(hasher.finalize())
    }
}

mod cadence_seconds {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(cadence: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(cadence.num_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        i64::deserialize(deserializer).map(Duration::seconds)
    }
}

/// `start + steps * cadence`, or `None` when the step count does not fit an
/// `i32` or the result leaves the calendar.
pub fn offset_by_steps(
    start: NaiveDateTime,
    cadence: Duration,
    steps: usize,
) -> Option<NaiveDateTime> {
    let steps = i32::try_from(steps).ok()?;
    start.checked_add_signed(cadence.checked_mul(steps)?)
}

/// Number of whole `cadence` steps in `[start, end)`.
pub fn cadence_steps(start: NaiveDateTime, end: NaiveDateTime, cadence: Duration) -> usize {
    let step = cadence.num_seconds();
    let span = (end - start).num_seconds();
    if step <= 0 || span <= 0 {
        0
    } else {
        (span / step) as usize
    }
}

pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    for format in [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt);
        }
    }
    chrono::NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}
