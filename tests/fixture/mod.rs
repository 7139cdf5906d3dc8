#![allow(dead_code)]

//! Synthetic SolarDB file for integration tests.
//!
//! Plant 8 (whole plant):
//! - power every 5 minutes over 2019-05-09 and 2019-05-10, `power_ac = 4200`,
//!   `power_dc = 4400`; 2019-05-09 06:00-06:55 and 2019-05-10 12:00-12:55
//!   are missing
//! - hourly weather from 2019-05-09 00:00 to 2019-05-11 01:00 at ages 0, 6
//!   and 24; measured `temp = 10 + hours since 2019-05-10 00:00`, forecasts of
//!   age 6 add 1.0 and of age 24 add 2.0; the age-6 forecast for
//!   2019-05-10 03:00 has no `temp`
//! - exogenous rows every 5 minutes on 2019-05-10
//!
//! Plant 8 inverter 0 is listed in `meta` but has no power and no capacity.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection};
use tempfile::NamedTempFile;

pub const PLANT: i64 = 8;
pub const POWER_AC: f64 = 4_200.0;
pub const POWER_DC: f64 = 4_400.0;
pub const CAPACITY_KWP: f64 = 9.5;

pub const SCHEMA: [(&str, &str); 4] = [
    (
        "meta",
        "CREATE TABLE meta (
            pp_id INTEGER NOT NULL,
            inv_id INTEGER NOT NULL,
            freq INTEGER,
            capacity REAL,
            inverters REAL,
            interval DATETIME,
            location VARCHAR(16),
            pos_lat REAL,
            pos_long REAL,
            PRIMARY KEY (pp_id, inv_id)
        )",
    ),
    (
        "power",
        "CREATE TABLE power (
            pp_id INTEGER NOT NULL,
            inv_id INTEGER NOT NULL,
            dt DATETIME NOT NULL,
            power_ac INTEGER,
            power_dc INTEGER,
            energy_hour INTEGER,
            energy_day INTEGER,
            energy_week INTEGER,
            energy_month INTEGER,
            ipolated BOOLEAN,
            epolated BOOLEAN,
            PRIMARY KEY (pp_id, inv_id, dt)
        )",
    ),
    (
        "weather",
        "CREATE TABLE weather (
            pp_id INTEGER NOT NULL,
            dt DATETIME NOT NULL,
            age INTEGER NOT NULL,
            src_dt DATETIME,
            summary VARCHAR(50),
            precip_int FLOAT,
            precip_prob FLOAT,
            temp FLOAT,
            apparent_temp FLOAT,
            dew_point FLOAT,
            humidity FLOAT,
            pressure FLOAT,
            wind_speed FLOAT,
            wind_bearing FLOAT,
            cloud_cover FLOAT,
            visibility FLOAT,
            ipolated BOOLEAN,
            epolated BOOLEAN,
            PRIMARY KEY (pp_id, dt, age)
        )",
    ),
    (
        "exogenous",
        "CREATE TABLE exogenous (
            pp_id INTEGER NOT NULL,
            dt DATETIME NOT NULL,
            sun_altitude FLOAT,
            sun_azimuth FLOAT,
            sun_irradiance FLOAT,
            status INTEGER,
            error INTEGER,
            clear FLOAT,
            PRIMARY KEY (pp_id, dt)
        )",
    ),
];

pub fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2019, 5, day)
        .expect("valid fixture date")
        .and_hms_opt(hour, minute, 0)
        .expect("valid fixture time")
}

/// Measured temperature of the fixture at a whole hour.
pub fn measured_temp(dt: NaiveDateTime) -> f64 {
    10.0 + (dt - at(10, 0, 0)).num_hours() as f64
}

fn stored(dt: NaiveDateTime) -> String {
    dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

fn in_gap(dt: NaiveDateTime) -> bool {
    (dt >= at(9, 6, 0) && dt < at(9, 7, 0)) || (dt >= at(10, 12, 0) && dt < at(10, 13, 0))
}

pub fn create_schema(conn: &Connection, skip_table: Option<&str>) {
    for (table, ddl) in SCHEMA {
        if Some(table) != skip_table {
            conn.execute_batch(ddl).expect("fixture table should be created");
        }
    }
}

pub fn seed_solardb() -> NamedTempFile {
    let tmp = NamedTempFile::new().expect("temp sqlite file should be created");
    let mut conn = Connection::open(tmp.path()).expect("fixture sqlite should open");
    create_schema(&conn, None);

    let tx = conn.transaction().expect("fixture transaction");
    tx.execute(
        "INSERT INTO meta VALUES (?1, -1, 15, ?2, 2, '2019-05-09 00:00:00.000000', 'CZ', 49.2, 16.6)",
        params![PLANT, CAPACITY_KWP],
    )
    .expect("insert meta");
    tx.execute(
        "INSERT INTO meta VALUES (?1, 0, 15, NULL, NULL, NULL, 'CZ', 49.2, 16.6)",
        params![PLANT],
    )
    .expect("insert inverter meta");

    let mut dt = at(9, 0, 0);
    let mut energy_day = 0_i64;
    while dt < at(11, 0, 0) {
        if dt == at(10, 0, 0) {
            energy_day = 0;
        }
        if !in_gap(dt) {
            energy_day += 350;
            tx.execute(
                "INSERT INTO power VALUES (?1, -1, ?2, ?3, ?4, 350, ?5, ?5, ?5, 0, 0)",
                params![PLANT, stored(dt), POWER_AC as i64, POWER_DC as i64, energy_day],
            )
            .expect("insert power");
        }
        dt += Duration::minutes(5);
    }

    let mut dt = at(9, 0, 0);
    while dt <= at(11, 1, 0) {
        let temp = measured_temp(dt);
        for (age, bias) in [(0_i64, 0.0), (6, 1.0), (24, 2.0)] {
            let forecast_temp = (age != 6 || dt != at(10, 3, 0)).then_some(temp + bias);
            tx.execute(
                "INSERT INTO weather VALUES (
                    ?1, ?2, ?3, ?4, 'Partly Cloudy',
                    0.0, 0.1, ?5, ?6, 5.0, 0.6, 1015.0, 3.0, 180.0, 0.5, 10.0,
                    0, 0
                )",
                params![
                    PLANT,
                    stored(dt),
                    age,
                    stored(dt - Duration::hours(age)),
                    forecast_temp,
                    temp + bias - 1.0
                ],
            )
            .expect("insert weather");
        }
        dt += Duration::hours(1);
    }

    let mut dt = at(10, 0, 0);
    while dt < at(11, 0, 0) {
        tx.execute(
            "INSERT INTO exogenous VALUES (?1, ?2, 30.0, 180.0, 650.0, 0, 0, 0.8)",
            params![PLANT, stored(dt)],
        )
        .expect("insert exogenous");
        dt += Duration::minutes(5);
    }

    tx.commit().expect("fixture commit");
    tmp
}
