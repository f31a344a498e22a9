use std::collections::BTreeSet;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

use airquality_pipeline::fetch::tag_reading;
use airquality_pipeline::models::RawReading;
use airquality_pipeline::pipeline::{dedup, hourly, recompute};

// 2025-03-26 18:45:00 UTC / 13:45 in Lima
const EPOCH_1345: i64 = 1743014700;
// 2025-03-26 18:50:00 UTC / 13:50 in Lima
const EPOCH_1350: i64 = 1743015000;
// 2025-03-26 19:05:00 UTC / 14:05 in Lima
const EPOCH_1405: i64 = 1743015900;

fn payload(name: &str, epoch: i64, lat: f64, lon: f64, pm2_5: Option<f64>) -> Value {
    // ---
    json!({
        "location": {
            "name": name,
            "region": "Lima",
            "country": "Peru",
            "lat": lat,
            "lon": lon,
            "tz_id": "America/Lima"
        },
        "current": {
            "last_updated_epoch": epoch,
            "temp_c": 20.0,
            "humidity": 70,
            "wind_dir": "S",
            "condition": {"text": "Overcast"},
            "air_quality": {
                "co": 300.0,
                "no2": 8.0,
                "o3": 40.0,
                "so2": 2.0,
                "pm2_5": pm2_5,
                "pm10": 25.0,
                "us-epa-index": 1,
                "gb-defra-index": 2
            }
        }
    })
}

fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 26, 19, minute, 0).unwrap()
}

fn reading(district: &str, epoch: i64, lat: f64, pm2_5: Option<f64>, ingested: u32) -> RawReading {
    // ---
    tag_reading(
        payload(district, epoch, lat, -77.0, pm2_5),
        "Peru",
        "Lima",
        district,
        at(ingested),
    )
}

fn fixture() -> Vec<RawReading> {
    // ---
    vec![
        reading("Ate", EPOCH_1345, -12.02, Some(10.0), 0),
        reading("Ate", EPOCH_1350, -12.02, Some(20.0), 1),
        // Re-ingested copy of the 13:50 measurement
        reading("Ate", EPOCH_1350, -12.02, Some(20.0), 2),
        reading("Ate", EPOCH_1405, -12.02, Some(30.0), 3),
        reading("San Isidro", EPOCH_1345, -12.09, Some(5.0), 0),
        // Unparseable payload
        tag_reading(json!({"error": "quota"}), "Peru", "Lima", "Rimac", at(0)),
    ]
}

#[test]
fn test_dedup_idempotent_and_unique() {
    // ---
    let raw = fixture();
    let first = dedup::deduplicate(&raw);
    let second = dedup::deduplicate(&raw);
    assert_eq!(first, second);

    let keys: BTreeSet<_> = first
        .iter()
        .map(|r| (r.measurement_timestamp, r.location))
        .collect();
    assert_eq!(keys.len(), first.len());
    assert_eq!(first.len(), 4);
}

#[test]
fn test_latest_ingestion_wins() {
    // ---
    let raw = vec![
        reading("Ate", EPOCH_1345, -12.02, Some(11.0), 0),
        reading("Ate", EPOCH_1345, -12.02, Some(99.0), 5),
    ];
    let out = dedup::deduplicate(&raw);

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].pollutants.pm2_5, Some(99.0));
    assert_eq!(out[0].ingested_at, at(5));
    assert_eq!(out[0].source_file_id, raw[1].source_file_id);
}

#[test]
fn test_hourly_average_ignores_null() {
    // ---
    let raw = vec![
        reading("Ate", EPOCH_1345, -12.02, Some(10.0), 0),
        reading("Ate", EPOCH_1345 + 60, -12.02, Some(20.0), 0),
        reading("Ate", EPOCH_1350, -12.02, None, 0),
    ];
    let aggregates = hourly::aggregate_hourly(&dedup::deduplicate(&raw));

    assert_eq!(aggregates.len(), 1);
    assert_eq!(aggregates[0].pollutants.pm2_5, Some(15.0));
    assert_eq!(aggregates[0].readings_in_hour, 3);
    assert_eq!(aggregates[0].hour_timestamp_local.to_string(), "2025-03-26 13:00:00");
}

#[test]
fn test_full_refresh() {
    // ---
    let out = recompute(&fixture());
    let summary = out.summary();

    assert_eq!(summary.raw_readings, 6);
    assert_eq!(summary.deduplicated, 4);
    assert_eq!(summary.hourly_records, 3);
    assert_eq!(summary.locations, 2);
    assert_eq!(summary.dates, 2);
    assert_eq!(summary.facts, 3);

    let ate_13 = out
        .hourly
        .iter()
        .find(|r| r.district == "Ate" && r.aggregate.readings_in_hour == 2)
        .unwrap();
    assert_eq!(ate_13.aggregate.pollutants.pm2_5, Some(15.0));
    assert_eq!(ate_13.criteria_pollutant_count, 3);
    assert_eq!(ate_13.custom_aqi, 300.0);
    assert_eq!(ate_13.prominent_pollutant, "CO");
    assert_eq!(ate_13.epa_category, "Good");
    assert!(ate_13.is_valid_measurement);
}

#[test]
fn test_recompute_is_byte_identical() {
    // ---
    let raw = fixture();
    let first = serde_json::to_vec(&recompute(&raw)).unwrap();
    let second = serde_json::to_vec(&recompute(&raw)).unwrap();
    assert_eq!(first, second);

    let mut reversed = raw.clone();
    reversed.reverse();
    let third = serde_json::to_vec(&recompute(&reversed)).unwrap();
    assert_eq!(first, third);
}
