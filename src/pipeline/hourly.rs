//! Hourly Aggregator: one record per (local calendar hour, location).
//!
//! The local hour is the measurement instant converted into the location's
//! own timezone and truncated to the hour. Continuous fields are averaged
//! over their non-null values only; categorical fields take the most frequent
//! value. Location attributes come from the latest reading in the group.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};

use crate::models::{DeduplicatedReading, GeoPoint, HourlyAggregate, Pollutants, Weather};

// ---

const POLLUTANT_DECIMALS: i32 = 2;
const INDEX_DECIMALS: i32 = 0;
const COARSE_DECIMALS: i32 = 1;
const FINE_DECIMALS: i32 = 2;

/// Truncate a wall-clock time to the start of its hour.
pub fn floor_to_hour(dt: NaiveDateTime) -> NaiveDateTime {
    // ---
    dt.date().and_hms_opt(dt.hour(), 0, 0).unwrap_or(dt)
}

/// The local calendar hour a reading falls in.
pub fn local_hour(reading: &DeduplicatedReading) -> NaiveDateTime {
    // ---
    floor_to_hour(
        reading
            .measurement_timestamp
            .with_timezone(&reading.timezone)
            .naive_local(),
    )
}

fn utc_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    floor_to_hour(ts.naive_utc()).and_utc()
}

/// Round half away from zero to a fixed number of decimals.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    // ---
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Mean of the present values, or `None` when every value is null.
pub fn mean_ignoring_nulls<I>(values: I, decimals: i32) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    // ---
    let (sum, count) = values
        .into_iter()
        .flatten()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));

    if count == 0 {
        None
    } else {
        Some(round_to(sum / count as f64, decimals))
    }
}

/// Most frequent present value; ties go to the value seen first.
pub fn mode<'a, I>(values: I) -> Option<String>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    // ---
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for value in values.into_iter().flatten() {
        match counts.iter_mut().find(|(seen, _)| *seen == value) {
            Some((_, count)) => *count += 1,
            None => counts.push((value, 1)),
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (value, count) in counts {
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value.to_string())
}

/// Group deduplicated readings by local hour and location and average them.
///
/// Output is ordered by local hour, then location. Groups whose pollutant
/// values are all null still produce a row.
pub fn aggregate_hourly(readings: &[DeduplicatedReading]) -> Vec<HourlyAggregate> {
    // ---
    let mut groups: BTreeMap<(NaiveDateTime, GeoPoint), Vec<&DeduplicatedReading>> =
        BTreeMap::new();

    for reading in readings {
        groups
            .entry((local_hour(reading), reading.location))
            .or_default()
            .push(reading);
    }

    let aggregates: Vec<HourlyAggregate> = groups
        .into_iter()
        .map(|((hour, location), mut members)| {
            members.sort_by_key(|r| r.measurement_timestamp);
            build_aggregate(hour, location, &members)
        })
        .collect();

    tracing::info!(
        "Aggregated {} readings into {} hourly records",
        readings.len(),
        aggregates.len()
    );

    aggregates
}

fn build_aggregate(
    hour: NaiveDateTime,
    location: GeoPoint,
    members: &[&DeduplicatedReading],
) -> HourlyAggregate {
    // ---
    // Members are non-empty and sorted by measurement time.
    let earliest = members[0];
    let latest = members[members.len() - 1];

    let avg = |field: fn(&DeduplicatedReading) -> Option<f64>, decimals: i32| {
        mean_ignoring_nulls(members.iter().map(|r| field(r)), decimals)
    };

    HourlyAggregate {
        hour_timestamp_local: hour,
        hour_timestamp_utc: utc_hour(earliest.measurement_timestamp),
        location,
        location_name: latest.location_name.clone(),
        region: latest.region.clone(),
        timezone_id: latest.timezone.name().to_string(),
        country: latest.country.clone(),
        city: latest.city.clone(),
        district: latest.district.clone(),
        pollutants: Pollutants {
            pm2_5: avg(|r| r.pollutants.pm2_5, POLLUTANT_DECIMALS),
            pm10: avg(|r| r.pollutants.pm10, POLLUTANT_DECIMALS),
            so2: avg(|r| r.pollutants.so2, POLLUTANT_DECIMALS),
            no2: avg(|r| r.pollutants.no2, POLLUTANT_DECIMALS),
            co: avg(|r| r.pollutants.co, POLLUTANT_DECIMALS),
            o3: avg(|r| r.pollutants.o3, POLLUTANT_DECIMALS),
        },
        us_epa_index: avg(|r| r.us_epa_index, INDEX_DECIMALS),
        gb_defra_index: avg(|r| r.gb_defra_index, INDEX_DECIMALS),
        weather: Weather {
            temperature_c: avg(|r| r.weather.temperature_c, COARSE_DECIMALS),
            feels_like_c: avg(|r| r.weather.feels_like_c, COARSE_DECIMALS),
            humidity: avg(|r| r.weather.humidity, FINE_DECIMALS),
            wind_kph: avg(|r| r.weather.wind_kph, COARSE_DECIMALS),
            wind_degree: avg(|r| r.weather.wind_degree, INDEX_DECIMALS),
            wind_direction: mode(members.iter().map(|r| r.weather.wind_direction.as_deref())),
            gust_kph: avg(|r| r.weather.gust_kph, COARSE_DECIMALS),
            pressure_mb: avg(|r| r.weather.pressure_mb, COARSE_DECIMALS),
            precipitation_mm: avg(|r| r.weather.precipitation_mm, FINE_DECIMALS),
            cloud_cover: avg(|r| r.weather.cloud_cover, FINE_DECIMALS),
            visibility_km: avg(|r| r.weather.visibility_km, COARSE_DECIMALS),
            uv_index: avg(|r| r.weather.uv_index, FINE_DECIMALS),
            weather_condition: mode(
                members
                    .iter()
                    .map(|r| r.weather.weather_condition.as_deref()),
            ),
        },
        readings_in_hour: members.len() as u32,
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn reading(ts: DateTime<Utc>, tz: chrono_tz::Tz, pm2_5: Option<f64>) -> DeduplicatedReading {
        // ---
        DeduplicatedReading {
            measurement_timestamp: ts,
            location: GeoPoint::new(-12.0, -77.0),
            location_name: "Ate".to_string(),
            region: Some("Lima".to_string()),
            timezone: tz,
            country: "peru".to_string(),
            city: "lima".to_string(),
            district: "ate".to_string(),
            pollutants: Pollutants {
                pm2_5,
                ..Default::default()
            },
            us_epa_index: Some(2.0),
            gb_defra_index: None,
            weather: Weather {
                temperature_c: Some(20.0),
                wind_direction: Some("S".to_string()),
                ..Default::default()
            },
            ingested_at: ts,
            source_file_id: "f".to_string(),
            content_fingerprint: "fp".to_string(),
        }
    }

    fn local(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_average_ignores_nulls() {
        // ---
        let lima = chrono_tz::America::Lima;
        let readings = vec![
            reading(Utc.with_ymd_and_hms(2025, 3, 26, 18, 0, 0).unwrap(), lima, Some(10.0)),
            reading(Utc.with_ymd_and_hms(2025, 3, 26, 18, 15, 0).unwrap(), lima, Some(20.0)),
            reading(Utc.with_ymd_and_hms(2025, 3, 26, 18, 45, 0).unwrap(), lima, None),
        ];

        let out = aggregate_hourly(&readings);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].pollutants.pm2_5, Some(15.0));
        assert_eq!(out[0].readings_in_hour, 3);
        assert_eq!(out[0].pollutants.so2, None);
    }

    #[test]
    fn test_dst_fall_back_merges_repeated_hour() {
        // ---
        // 01:30 EDT and 01:30 EST on 2025-11-02 share the wall-clock hour 01:00.
        let new_york = chrono_tz::America::New_York;
        let readings = vec![
            reading(Utc.with_ymd_and_hms(2025, 11, 2, 6, 30, 0).unwrap(), new_york, Some(8.0)),
            reading(Utc.with_ymd_and_hms(2025, 11, 2, 5, 30, 0).unwrap(), new_york, Some(4.0)),
        ];

        let out = aggregate_hourly(&readings);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].hour_timestamp_local, local(2025, 11, 2, 1));
        assert_eq!(out[0].readings_in_hour, 2);
        assert_eq!(
            out[0].hour_timestamp_utc,
            Utc.with_ymd_and_hms(2025, 11, 2, 5, 0, 0).unwrap()
        );
        assert_eq!(out[0].pollutants.pm2_5, Some(6.0));
        assert_eq!(out[0].timezone_id, "America/New_York");
    }

    #[test]
    fn test_local_hour_uses_location_timezone() {
        // ---
        // Lima is UTC-5: 18:45 UTC is 13:45 local.
        let r = reading(
            Utc.with_ymd_and_hms(2025, 3, 26, 18, 45, 0).unwrap(),
            chrono_tz::America::Lima,
            Some(1.0),
        );
        let out = aggregate_hourly(&[r]);

        assert_eq!(out[0].hour_timestamp_local, local(2025, 3, 26, 13));
        assert_eq!(
            out[0].hour_timestamp_utc,
            Utc.with_ymd_and_hms(2025, 3, 26, 18, 0, 0).unwrap()
        );
        assert_eq!(out[0].timezone_id, "America/Lima");
    }

    #[test]
    fn test_half_hour_offset_groups_by_local_hour() {
        // ---
        // Kolkata is UTC+5:30: 04:40 and 05:10 UTC are 10:10 and 10:40 local.
        let kolkata = chrono_tz::Asia::Kolkata;
        let readings = vec![
            reading(Utc.with_ymd_and_hms(2025, 3, 26, 4, 40, 0).unwrap(), kolkata, Some(4.0)),
            reading(Utc.with_ymd_and_hms(2025, 3, 26, 5, 10, 0).unwrap(), kolkata, Some(6.0)),
        ];

        let out = aggregate_hourly(&readings);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].hour_timestamp_local, local(2025, 3, 26, 10));
        assert_eq!(out[0].pollutants.pm2_5, Some(5.0));
        assert_eq!(
            out[0].hour_timestamp_utc,
            Utc.with_ymd_and_hms(2025, 3, 26, 4, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_separate_hours_and_locations() {
        // ---
        let lima = chrono_tz::America::Lima;
        let mut other = reading(Utc.with_ymd_and_hms(2025, 3, 26, 18, 5, 0).unwrap(), lima, Some(3.0));
        other.location = GeoPoint::new(-12.1, -77.0);

        let readings = vec![
            reading(Utc.with_ymd_and_hms(2025, 3, 26, 18, 5, 0).unwrap(), lima, Some(1.0)),
            reading(Utc.with_ymd_and_hms(2025, 3, 26, 19, 5, 0).unwrap(), lima, Some(2.0)),
            other,
        ];

        let out = aggregate_hourly(&readings);
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|a| a.readings_in_hour == 1));
        // Ordered by hour, then location.
        assert_eq!(out[0].location, GeoPoint::new(-12.1, -77.0));
        assert_eq!(out[2].hour_timestamp_local, local(2025, 3, 26, 14));
    }

    #[test]
    fn test_all_null_pollutants_still_produce_row() {
        // ---
        let r = reading(
            Utc.with_ymd_and_hms(2025, 3, 26, 18, 0, 0).unwrap(),
            chrono_tz::America::Lima,
            None,
        );
        let out = aggregate_hourly(&[r]);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].pollutants, Pollutants::default());
        assert_eq!(out[0].weather.temperature_c, Some(20.0));
    }

    #[test]
    fn test_categorical_mode_and_latest_attributes() {
        // ---
        let lima = chrono_tz::America::Lima;
        let mut a = reading(Utc.with_ymd_and_hms(2025, 3, 26, 18, 0, 0).unwrap(), lima, None);
        let mut b = reading(Utc.with_ymd_and_hms(2025, 3, 26, 18, 20, 0).unwrap(), lima, None);
        let mut c = reading(Utc.with_ymd_and_hms(2025, 3, 26, 18, 40, 0).unwrap(), lima, None);
        a.weather.wind_direction = Some("N".to_string());
        b.weather.wind_direction = Some("SW".to_string());
        c.weather.wind_direction = Some("SW".to_string());
        c.location_name = "ATE".to_string();

        let out = aggregate_hourly(&[c, a, b]);
        assert_eq!(out[0].weather.wind_direction.as_deref(), Some("SW"));
        assert_eq!(out[0].location_name, "ATE");
    }

    #[test]
    fn test_mode_ties_go_to_first_seen() {
        // ---
        assert_eq!(mode([Some("N"), Some("S"), None]), Some("N".to_string()));
        assert_eq!(mode([None, Some("S"), Some("N"), Some("N")]), Some("N".to_string()));
        assert_eq!(mode(Vec::<Option<&str>>::new()), None);
    }

    #[test]
    fn test_rounding() {
        // ---
        assert_eq!(round_to(15.456, 2), 15.46);
        assert_eq!(round_to(19.25, 1), 19.3);
        assert_eq!(round_to(2.5, 0), 3.0);
        assert_eq!(round_to(-2.5, 0), -3.0);
        assert_eq!(mean_ignoring_nulls([Some(1.0), Some(2.0)], 0), Some(2.0));
        assert_eq!(mean_ignoring_nulls([None, None], 2), None);
    }
}
