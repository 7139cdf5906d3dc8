mod fixture;

use chrono::Duration;
use fixture::{at, measured_temp, seed_solardb, PLANT, POWER_AC};
use solardb::{
    cadence_steps, Assembler, ErrorKind, PlantId, SolarDb, SolarDbError, WeatherScheme,
    EXOGENOUS_FEATURES, POWER_FEATURES, PREDICTION_COLUMN, WEATHER_FEATURES,
};

#[test]
fn one_day_window_yields_three_aligned_tables() {
    let tmp = seed_solardb();
    let db = SolarDb::open(tmp.path()).expect("fixture should open");

    let window = Assembler::new(&db)
        .prepare_prediction(
            PlantId::whole(PLANT),
            at(10, 0, 0),
            at(11, 0, 0),
            WeatherScheme::Realistic,
            288,
        )
        .expect("window should assemble");

    let five = Duration::minutes(5);
    assert_eq!(window.history.len(), 288);
    assert_eq!(window.weather.len(), 288);
    assert_eq!(window.prediction.len(), 288);
    assert_eq!(
        window.prediction.len(),
        cadence_steps(at(10, 0, 0), at(11, 0, 0), five)
    );

    assert_eq!(window.history.start(), at(9, 0, 0));
    assert_eq!(window.history.timestamp(287), Some(at(9, 23, 55)));
    assert_eq!(window.history.end(), at(10, 0, 0));
    assert!(window.weather.same_index(&window.prediction));
    assert_eq!(window.prediction.cadence(), five);

    for table in [&window.history, &window.weather, &window.prediction] {
        assert_eq!(table.pp_id(), PlantId::whole(PLANT));
    }

    let history_columns: Vec<&str> = window.history.column_names().collect();
    assert_eq!(history_columns, POWER_FEATURES);

    let weather_columns: Vec<&str> = window.weather.column_names().collect();
    let expected: Vec<&str> = WEATHER_FEATURES
        .iter()
        .chain(EXOGENOUS_FEATURES.iter())
        .copied()
        .collect();
    assert_eq!(weather_columns, expected);
}

#[test]
fn prediction_skeleton_is_entirely_missing() {
    let tmp = seed_solardb();
    let db = SolarDb::open(tmp.path()).expect("fixture should open");

    let window = Assembler::new(&db)
        .prepare_prediction(
            PlantId::whole(PLANT),
            at(10, 6, 0),
            at(10, 18, 0),
            WeatherScheme::Measured,
            12,
        )
        .expect("window should assemble");

    let names: Vec<&str> = window.prediction.column_names().collect();
    assert_eq!(names, vec![PREDICTION_COLUMN]);
    assert_eq!(window.prediction.len(), 144);
    assert_eq!(window.prediction.missing_count(PREDICTION_COLUMN), Some(144));
    assert_eq!(window.prediction.missing_rows(), 144);
}

#[test]
fn history_gaps_become_missing_rows() {
    let tmp = seed_solardb();
    let db = SolarDb::open(tmp.path()).expect("fixture should open");

    let (history, _, _) = Assembler::new(&db)
        .prepare_prediction(
            PlantId::whole(PLANT),
            at(10, 0, 0),
            at(11, 0, 0),
            WeatherScheme::Realistic,
            288,
        )
        .expect("window should assemble")
        .into_parts();

    let power = history.column("power_ac").expect("power_ac column");
    assert_eq!(power[0], Some(POWER_AC));
    // 2019-05-09 06:00 .. 06:55 is absent from the fixture.
    assert!(power[72..84].iter().all(Option::is_none));
    assert_eq!(power[84], Some(POWER_AC));
    assert_eq!(history.missing_rows(), 12);
}

#[test]
fn weather_schemes_pick_the_expected_source_rows() {
    let tmp = seed_solardb();
    let db = SolarDb::open(tmp.path()).expect("fixture should open");
    let assembler = Assembler::new(&db);
    let temp_at = |scheme: WeatherScheme, row: usize| {
        let window = assembler
            .prepare_prediction(PlantId::whole(PLANT), at(10, 0, 0), at(11, 0, 0), scheme, 0)
            .expect("window should assemble");
        window.weather.column("temp").expect("temp column")[row]
    };

    // rows: 0 = 00:00, 6 = 00:30, 12 = 01:00, 84 = 07:00, 144 = 12:00
    let measured_1h = measured_temp(at(10, 1, 0));
    assert_eq!(temp_at(WeatherScheme::Measured, 12), Some(measured_1h));
    assert_eq!(
        temp_at(WeatherScheme::Forecast { age_hours: 6 }, 144),
        Some(measured_temp(at(10, 12, 0)) + 1.0)
    );

    assert_eq!(temp_at(WeatherScheme::Realistic, 0), Some(10.0));
    assert_eq!(temp_at(WeatherScheme::Realistic, 6), Some(11.0));
    assert_eq!(temp_at(WeatherScheme::Realistic, 12), Some(measured_1h + 1.0));
}

#[test]
fn realistic_scheme_ignores_forecasts_issued_after_window_start() {
    let tmp = seed_solardb();
    let db = SolarDb::open(tmp.path()).expect("fixture should open");

    let window = Assembler::new(&db)
        .prepare_prediction(
            PlantId::whole(PLANT),
            at(10, 0, 0),
            at(11, 0, 0),
            WeatherScheme::Realistic,
            0,
        )
        .expect("window should assemble");
    let temp = window.weather.column("temp").expect("temp column");

    // From 07:00 on the 6 h forecast was issued after midnight, so only the
    // day-ahead forecast may be used.
    for (row, hour) in [(84, 7), (144, 12), (276, 23)] {
        assert_eq!(temp[row], Some(measured_temp(at(10, hour, 0)) + 2.0), "{hour}:00");
    }
}

#[test]
fn realistic_scheme_fills_a_missing_value_from_an_older_forecast() {
    let tmp = seed_solardb();
    let db = SolarDb::open(tmp.path()).expect("fixture should open");

    let window = Assembler::new(&db)
        .prepare_prediction(
            PlantId::whole(PLANT),
            at(10, 0, 0),
            at(11, 0, 0),
            WeatherScheme::Realistic,
            0,
        )
        .expect("window should assemble");

    // 03:00: the 6 h forecast lacks temp, so the day-ahead one supplies it
    // while the other columns stay with the 6 h forecast.
    let row = 36;
    assert_eq!(
        window.weather.column("temp").expect("temp column")[row],
        Some(measured_temp(at(10, 3, 0)) + 2.0)
    );
    assert_eq!(
        window.weather.column("apparent_temp").expect("apparent_temp column")[row],
        Some(measured_temp(at(10, 3, 0)))
    );
}

#[test]
fn exogenous_columns_follow_the_primary_grid() {
    let tmp = seed_solardb();
    let db = SolarDb::open(tmp.path()).expect("fixture should open");

    let window = Assembler::new(&db)
        .prepare_prediction(
            PlantId::whole(PLANT),
            at(10, 0, 0),
            at(11, 0, 0),
            WeatherScheme::Measured,
            0,
        )
        .expect("window should assemble");

    assert_eq!(window.weather.missing_count("sun_irradiance"), Some(0));
    assert_eq!(window.weather.column("clear").expect("clear")[100], Some(0.8));
    assert!(window.history.is_empty());
}

#[test]
fn rejects_invalid_requests_with_typed_errors() {
    let tmp = seed_solardb();
    let db = SolarDb::open(tmp.path()).expect("fixture should open");
    let assembler = Assembler::new(&db);
    let plant = PlantId::whole(PLANT);

    let unknown = assembler
        .prepare_prediction(
            PlantId::whole(99),
            at(10, 0, 0),
            at(11, 0, 0),
            WeatherScheme::Realistic,
            0,
        )
        .expect_err("unknown plant must fail");
    assert_eq!(unknown.kind(), ErrorKind::NotFound);

    let scheme = "oracle".parse::<WeatherScheme>().expect_err("unknown scheme");
    assert_eq!(scheme.kind(), ErrorKind::InvalidScheme);

    let empty = assembler
        .prepare_prediction(plant, at(10, 0, 0), at(10, 0, 0), WeatherScheme::Realistic, 0)
        .expect_err("empty range must fail");
    assert!(matches!(empty, SolarDbError::InvalidRange { .. }));
    assert_eq!(empty.kind(), ErrorKind::Range);

    let misaligned = assembler
        .prepare_prediction(plant, at(10, 0, 3), at(11, 0, 0), WeatherScheme::Realistic, 0)
        .expect_err("off-grid start must fail");
    assert!(matches!(misaligned, SolarDbError::MisalignedTimestamp { .. }));

    let no_power = assembler
        .prepare_prediction(
            PlantId::inverter(PLANT, 0),
            at(10, 0, 0),
            at(11, 0, 0),
            WeatherScheme::Realistic,
            0,
        )
        .expect_err("inverter without power must fail");
    assert!(matches!(no_power, SolarDbError::NoPowerData(_)));
}

#[test]
fn history_reaching_before_the_dataset_is_rejected() {
    let tmp = seed_solardb();
    let db = SolarDb::open(tmp.path()).expect("fixture should open");

    let err = Assembler::new(&db)
        .prepare_prediction(
            PlantId::whole(PLANT),
            at(10, 0, 0),
            at(11, 0, 0),
            WeatherScheme::Realistic,
            289,
        )
        .expect_err("289 steps reach before the first record");

    match err {
        SolarDbError::InsufficientHistory {
            required_start,
            earliest,
            ..
        } => {
            assert_eq!(required_start, at(8, 23, 55));
            assert_eq!(earliest, at(9, 0, 0));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn history_counts_beyond_the_calendar_are_insufficient_history() {
    let tmp = seed_solardb();
    let db = SolarDb::open(tmp.path()).expect("fixture should open");
    let assembler = Assembler::new(&db);

    for history_cnt in [i32::MAX as usize + 1, u32::MAX as usize, usize::MAX] {
        let err = assembler
            .prepare_prediction(
                PlantId::whole(PLANT),
                at(10, 0, 0),
                at(11, 0, 0),
                WeatherScheme::Realistic,
                history_cnt,
            )
            .expect_err("history cannot reach that far back");
        match err {
            SolarDbError::InsufficientHistory { earliest, .. } => {
                assert_eq!(earliest, at(9, 0, 0), "{history_cnt}");
            }
            other => panic!("{history_cnt}: unexpected error: {other}"),
        }
    }

    // Fits in i32 but still reaches past the calendar.
    let err = assembler
        .prepare_prediction(
            PlantId::whole(PLANT),
            at(10, 0, 0),
            at(11, 0, 0),
            WeatherScheme::Realistic,
            i32::MAX as usize,
        )
        .expect_err("history cannot reach that far back");
    assert!(matches!(err, SolarDbError::InsufficientHistory { .. }));
}

#[test]
fn assembling_twice_is_deterministic() {
    let tmp = seed_solardb();
    let db = SolarDb::open(tmp.path()).expect("fixture should open");
    let assembler = Assembler::new(&db);
    let run = || {
        assembler
            .prepare_prediction(
                PlantId::whole(PLANT),
                at(10, 0, 0),
                at(11, 0, 0),
                WeatherScheme::Realistic,
                288,
            )
            .expect("window should assemble")
    };

    let a = run();
    let b = run();
    assert_eq!(a, b);
    assert_eq!(a.history.fingerprint(), b.history.fingerprint());
    assert_eq!(a.weather.fingerprint(), b.weather.fingerprint());
}
