use std::env;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;

use chrono::NaiveDateTime;
use solardb::{
    init_logging, log_app_start, log_dataset_opened, log_export_written, logging_config_from_env,
    parse_timestamp, solardb_config_from_env, Assembler, Evaluator, PlantId, SolarDb, TimeTable,
    WeatherScheme, PREDICTION_COLUMN,
};

/// Fills the prediction with a constant and prints the evaluation as JSON.
///
/// The defaults reproduce the reference run on the published dataset:
/// plant 8, 2019-05-10, a day of history and a constant 42 W forecast.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;
    log_app_start(&logging_cfg);

    let db_cfg = solardb_config_from_env();
    let db = SolarDb::open_with_config(&db_cfg)?;
    log_dataset_opened(&db_cfg.db_path, db.list_plants()?.len());

    let pp_id: PlantId = env_or("SOLARDB_PLANT", "8").parse()?;
    let dt_start = env_timestamp("SOLARDB_START", "2019-05-10")?;
    let dt_end = env_timestamp("SOLARDB_END", "2019-05-11")?;
    let history_cnt: usize = env_or("SOLARDB_HISTORY_CNT", "288").parse()?;
    let scheme: WeatherScheme = env_or("SOLARDB_WEATHER_SCHEME", "realistic").parse()?;
    let fill_value: f64 = env_or("SOLARDB_FILL_VALUE", "42").parse()?;

    let window = Assembler::new(&db).prepare_prediction(
        pp_id,
        dt_start,
        dt_end,
        scheme,
        history_cnt,
    )?;
    let (history, weather, mut prediction) = window.into_parts();
    prediction.fill_column(PREDICTION_COLUMN, fill_value)?;

    if let Some(dir) = env::var_os("SOLARDB_EXPORT_DIR").map(PathBuf::from) {
        fs::create_dir_all(&dir)?;
        let tables: [(&str, &TimeTable); 3] = [
            ("history", &history),
            ("weather", &weather),
            ("prediction", &prediction),
        ];
        for (name, table) in tables {
            let file = File::create(dir.join(format!("{name}.csv")))?;
            table.write_csv(BufWriter::new(file))?;
        }
        log_export_written(&dir, pp_id, tables.len());
    }

    let report = Evaluator::new(&db).evaluate_prediction(&prediction, &history, &weather)?;
    let output = serde_json::json!({
        "pp_id": pp_id.to_string(),
        "dt_start": dt_start.to_string(),
        "dt_end": dt_end.to_string(),
        "scheme": scheme.to_string(),
        "rows": {
            "history": history.len(),
            "weather": weather.len(),
            "prediction": prediction.len(),
        },
        "fingerprint": report.fingerprint(),
        "report": report,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_timestamp(key: &str, default: &str) -> Result<NaiveDateTime, String> {
    let raw = env_or(key, default);
    parse_timestamp(&raw).ok_or_else(|| format!("{key}: invalid timestamp '{raw}'"))
}
