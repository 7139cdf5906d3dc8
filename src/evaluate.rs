//! Scores filled-in prediction tables against the dataset's ground truth.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::assemble::PREDICTION_COLUMN;
use crate::config::ErrorNormalization;
use crate::error::{Result, SolarDbError};
use crate::observability::{log_evaluation_finished, log_power_joined};
use crate::plant::PlantId;
use crate::storage::SolarDb;
use crate::table::TimeTable;
use crate::weather::{interpolate_onto_grid, WeatherScheme, WEATHER_FEATURES};

/// Metric name of the prediction's power score.
pub const POWER_METRIC: &str = "power";
pub const HISTORY_METRIC: &str = "history";
pub const WEATHER_METRIC_PREFIX: &str = "weather.";

/// Per-metric statistics, e.g. `report.get("power", "error")`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvaluationReport {
    metrics: BTreeMap<String, BTreeMap<String, f64>>,
}

impl EvaluationReport {
    pub fn get(&self, metric: &str, statistic: &str) -> Option<f64> {
        self.metrics
            .get(metric)
            .and_then(|stats| stats.get(statistic))
            .copied()
    }

    pub fn metric(&self, metric: &str) -> Option<&BTreeMap<String, f64>> {
        self.metrics.get(metric)
    }

    pub fn metrics(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, f64>)> {
        self.metrics
            .iter()
            .map(|(name, stats)| (name.as_str(), stats))
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// SHA-256 over metric names, statistic names and value bit patterns.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for (metric, stats) in &self.metrics {
            hasher.update(metric.as_bytes());
            hasher.update("{");
            for (name, value) in stats {
                hasher.update(name.as_bytes());
                hasher.update("=");
                hasher.update(value.to_bits().to_le_bytes());
                hasher.update(";");
            }
            hasher.update("}");
        }
        hex::encode(hasher.finalize())
    }

    fn insert(&mut self, metric: impl Into<String>, stats: BTreeMap<String, f64>) {
        self.metrics.insert(metric.into(), stats);
    }
}

pub struct Evaluator<'a> {
    db: &'a SolarDb,
    normalization: ErrorNormalization,
}

impl<'a> Evaluator<'a> {
    pub fn new(db: &'a SolarDb) -> Self {
        Self {
            db,
            normalization: db.config().error_normalization,
        }
    }

    pub fn with_normalization(mut self, normalization: ErrorNormalization) -> Self {
        self.normalization = normalization;
        self
    }

    /// Scores `prediction` and, when non-empty, `history` and `weather`.
    ///
    /// The plant and time range come from the prediction table itself.
    pub fn evaluate_prediction(
        &self,
        prediction: &TimeTable,
        history: &TimeTable,
        weather: &TimeTable,
    ) -> Result<EvaluationReport> {
        let pp_id = prediction.pp_id();
        let predicted = prediction.column(PREDICTION_COLUMN).ok_or_else(|| {
            SolarDbError::TableMismatch(format!(
                "prediction table has no '{PREDICTION_COLUMN}' column"
            ))
        })?;
        check_companions(prediction, history, weather)?;

        let info = self.db.plant_info(pp_id)?;
        let capacity_w = match self.normalization {
            ErrorNormalization::Capacity => Some(
                info.capacity_w()
                    .filter(|capacity| *capacity > 0.0)
                    .ok_or(SolarDbError::MissingCapacity(pp_id))?,
            ),
            _ => None,
        };

        let start = prediction.start();
        let end = prediction.end();
        let insufficient = || SolarDbError::InsufficientData {
            metric: POWER_METRIC.to_string(),
            pp_id,
            start,
            end,
        };
        if prediction.is_empty() {
            return Err(insufficient());
        }

        let mut report = EvaluationReport::default();
        let power_column = self.db.config().power_column.as_str();

        let truth = self
            .db
            .get_history(pp_id, start, end)?
            .column_by_dt(power_column);
        let joined = join_with_truth(prediction.index().zip(predicted.iter().copied()), &truth);

        log_power_joined(
            pp_id,
            prediction.len(),
            joined.pairs.len(),
            joined.missing_prediction,
            joined.missing_truth,
        );
        if joined.pairs.is_empty() {
            return Err(insufficient());
        }

        let cadence_h = prediction.cadence().num_seconds() as f64 / 3_600.0;
        let power_stats = score(&joined.pairs, cadence_h, self.normalization, capacity_w);
        let power_error = power_stats.get("error").copied();
        report.insert(POWER_METRIC, power_stats);

        if !history.is_empty() {
            self.score_history(&mut report, history, power_column, capacity_w)?;
        }
        if !weather.is_empty() {
            self.score_weather(&mut report, weather)?;
        }

        log_evaluation_finished(
            pp_id,
            start,
            end,
            self.normalization,
            power_error,
            report.len(),
        );

        Ok(report)
    }

    fn score_history(
        &self,
        report: &mut EvaluationReport,
        history: &TimeTable,
        power_column: &str,
        capacity_w: Option<f64>,
    ) -> Result<()> {
        let Some(values) = history
            .column(power_column)
            .or_else(|| history.column(PREDICTION_COLUMN))
        else {
            return Ok(());
        };

        let truth = self
            .db
            .get_history(history.pp_id(), history.start(), history.end())?
            .column_by_dt(power_column);
        let joined = join_with_truth(history.index().zip(values.iter().copied()), &truth);
        if joined.pairs.is_empty() {
            return Ok(());
        }

        let cadence_h = history.cadence().num_seconds() as f64 / 3_600.0;
        report.insert(
            HISTORY_METRIC,
            score(&joined.pairs, cadence_h, self.normalization, capacity_w),
        );
        Ok(())
    }

    fn score_weather(&self, report: &mut EvaluationReport, weather: &TimeTable) -> Result<()> {
        let measured = self.db.get_weather(
            weather.pp_id(),
            weather.start(),
            weather.end(),
            WeatherScheme::Measured,
        )?;
        let measured = interpolate_onto_grid(
            &measured,
            weather.pp_id(),
            weather.start(),
            weather.cadence(),
            weather.len(),
        );

        let cadence_h = weather.cadence().num_seconds() as f64 / 3_600.0;
        for feature in WEATHER_FEATURES {
            let (Some(predicted), Some(truth)) = (weather.column(feature), measured.column(feature))
            else {
                continue;
            };
            let pairs: Vec<(f64, f64)> = predicted
                .iter()
                .zip(truth)
                .filter_map(|pair| match pair {
                    (Some(p), Some(t)) if p.is_finite() && t.is_finite() => Some((*p, *t)),
                    _ => None,
                })
                .collect();
            if pairs.is_empty() {
                continue;
            }
            report.insert(
                format!("{WEATHER_METRIC_PREFIX}{feature}"),
                score(&pairs, cadence_h, ErrorNormalization::EnergyIntegral, None),
            );
        }
        Ok(())
    }
}

fn check_companions(prediction: &TimeTable, history: &TimeTable, weather: &TimeTable) -> Result<()> {
    let pp_id = prediction.pp_id();
    if !weather.is_empty() {
        if weather.pp_id() != pp_id {
            return Err(mismatch("weather", weather.pp_id(), pp_id));
        }
        if !weather.same_index(prediction) {
            return Err(SolarDbError::TableMismatch(format!(
                "weather index <{}, {}) x {} does not match prediction index <{}, {}) x {}",
                weather.start(),
                weather.end(),
                weather.len(),
                prediction.start(),
                prediction.end(),
                prediction.len()
            )));
        }
    }
    if !history.is_empty() && history.pp_id() != pp_id {
        return Err(mismatch("history", history.pp_id(), pp_id));
    }
    Ok(())
}

fn mismatch(table: &str, got: PlantId, expected: PlantId) -> SolarDbError {
    SolarDbError::TableMismatch(format!(
        "{table} table belongs to power plant {got}, prediction to {expected}"
    ))
}

struct Joined {
    /// `(predicted, truth)` in index order.
    pairs: Vec<(f64, f64)>,
    missing_prediction: usize,
    missing_truth: usize,
}

fn join_with_truth(
    rows: impl Iterator<Item = (NaiveDateTime, Option<f64>)>,
    truth: &HashMap<NaiveDateTime, f64>,
) -> Joined {
    let mut joined = Joined {
        pairs: Vec::new(),
        missing_prediction: 0,
        missing_truth: 0,
    };
    for (dt, predicted) in rows {
        let Some(t) = truth.get(&dt).copied().filter(|t| t.is_finite()) else {
            joined.missing_truth += 1;
            continue;
        };
        match predicted.filter(|p| p.is_finite()) {
            Some(p) => joined.pairs.push((p, t)),
            None => joined.missing_prediction += 1,
        }
    }
    joined
}

/// All statistics for non-empty `pairs`; non-finite results are left out.
fn score(
    pairs: &[(f64, f64)],
    cadence_h: f64,
    normalization: ErrorNormalization,
    capacity_w: Option<f64>,
) -> BTreeMap<String, f64> {
    let n = pairs.len() as f64;
    let sum_truth: f64 = pairs.iter().map(|(_, t)| t).sum();
    let sum_pred: f64 = pairs.iter().map(|(p, _)| p).sum();
    let sum_sq_truth: f64 = pairs.iter().map(|(_, t)| t * t).sum();

    let mae = pairs.iter().map(|(p, t)| (p - t).abs()).sum::<f64>() / n;
    let mse = pairs.iter().map(|(p, t)| (p - t) * (p - t)).sum::<f64>() / n;
    let rmse = mse.sqrt();
    let rrmse = (mse / (sum_sq_truth + f64::EPSILON)).sqrt();

    let error = match normalization {
        ErrorNormalization::EnergyIntegral => {
            1.0 - (sum_pred * cadence_h) / (sum_truth * cadence_h + f64::EPSILON)
        }
        ErrorNormalization::MeanTruth => mae / (sum_truth / n + f64::EPSILON),
        ErrorNormalization::Capacity => mae / (capacity_w.unwrap_or(0.0) + f64::EPSILON),
    };

    let predicted: Vec<f64> = pairs.iter().map(|(p, _)| *p).collect();
    let truth: Vec<f64> = pairs.iter().map(|(_, t)| *t).collect();

    let mut stats = BTreeMap::new();
    stats.insert("count".to_string(), n);
    stats.insert("error".to_string(), error);
    stats.insert("mae".to_string(), mae);
    stats.insert("mse".to_string(), mse);
    stats.insert("rmse".to_string(), rmse);
    stats.insert("rrmse".to_string(), rrmse);
    stats.insert("r2".to_string(), r2_score(&predicted, &truth));
    if let Some(pearson) = pearson(&predicted, &truth) {
        stats.insert("pearson".to_string(), pearson);
    }
    if let Some(spearman) = spearman(&predicted, &truth) {
        stats.insert("spearman".to_string(), spearman);
    }
    stats.retain(|_, value| value.is_finite());
    stats
}

/// Coefficient of determination of `predicted` against `truth`.
pub fn r2_score(predicted: &[f64], truth: &[f64]) -> f64 {
    let n = truth.len() as f64;
    if n == 0.0 {
        return 0.0;
    }
    let mean = truth.iter().sum::<f64>() / n;
    let ss_tot: f64 = truth.iter().map(|t| (t - mean) * (t - mean)).sum();
    let ss_res: f64 = predicted
        .iter()
        .zip(truth)
        .map(|(p, t)| (p - t) * (p - t))
        .sum();
    if ss_tot == 0.0 {
        if ss_res == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - ss_res / ss_tot
    }
}

/// Pearson correlation; `None` with fewer than two points or a constant side.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some((cov / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0))
}

/// Spearman rank correlation with tied values sharing their average rank.
pub fn spearman(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() {
        return None;
    }
    pearson(&average_ranks(xs), &average_ranks(ys))
}

fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|a, b| values[*a].total_cmp(&values[*b]));

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        // 1-based ranks i+1 ..= j+1 share their mean.
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for idx in &order[i..=j] {
            ranks[*idx] = rank;
        }
        i = j + 1;
    }
    ranks
}
