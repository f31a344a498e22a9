//! Data models for the air-quality pipeline.
//!
//! Each pipeline stage owns exactly one of these entities and produces it
//! from the complete output of the previous stage:
//! `RawReading` → `DeduplicatedReading` → `HourlyAggregate` →
//! `EnrichedHourlyRecord`.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

// ---

/// One ingested API response, tagged with its partition metadata.
///
/// Immutable once stored; the raw store is append-only and may hold several
/// raw readings describing the same real-world measurement.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RawReading {
    // ---
    pub raw_payload: serde_json::Value,
    pub country: String,
    pub city: String,
    pub district: String,
    pub year: i32,
    pub month: i32,
    pub day: i32,
    pub ingested_at: DateTime<Utc>,
    pub content_fingerprint: String,
    pub source_file_id: String,
}

/// A latitude/longitude pair used as the identity of a monitored location.
///
/// Ordered and compared with `f64::total_cmp`, so it can key ordered maps.
/// Negative zero is folded into positive zero on construction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeoPoint {
    // ---
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    // ---
    pub fn new(latitude: f64, longitude: f64) -> Self {
        // ---
        Self {
            latitude: latitude + 0.0,
            longitude: longitude + 0.0,
        }
    }
}

impl PartialEq for GeoPoint {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for GeoPoint {}

impl PartialOrd for GeoPoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GeoPoint {
    fn cmp(&self, other: &Self) -> Ordering {
        self.latitude
            .total_cmp(&other.latitude)
            .then_with(|| self.longitude.total_cmp(&other.longitude))
    }
}

/// Concentrations of the six tracked pollutant species.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pollutants {
    // ---
    pub pm2_5: Option<f64>,
    pub pm10: Option<f64>,
    pub so2: Option<f64>,
    pub no2: Option<f64>,
    pub co: Option<f64>,
    pub o3: Option<f64>,
}

/// Weather conditions reported alongside the air-quality block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Weather {
    // ---
    pub temperature_c: Option<f64>,
    pub feels_like_c: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_kph: Option<f64>,
    pub wind_degree: Option<f64>,
    pub wind_direction: Option<String>,
    pub gust_kph: Option<f64>,
    pub pressure_mb: Option<f64>,
    pub precipitation_mm: Option<f64>,
    pub cloud_cover: Option<f64>,
    pub visibility_km: Option<f64>,
    pub uv_index: Option<f64>,
    pub weather_condition: Option<String>,
}

/// The canonical reading for one (measurement timestamp, location) pair.
///
/// Carries the provenance of the raw reading it was selected from.
#[derive(Debug, Clone, PartialEq)]
pub struct DeduplicatedReading {
    // ---
    pub measurement_timestamp: DateTime<Utc>,
    pub location: GeoPoint,
    pub location_name: String,
    pub region: Option<String>,
    pub timezone: Tz,
    pub country: String,
    pub city: String,
    pub district: String,
    pub pollutants: Pollutants,
    pub us_epa_index: Option<f64>,
    pub gb_defra_index: Option<f64>,
    pub weather: Weather,
    pub ingested_at: DateTime<Utc>,
    pub source_file_id: String,
    pub content_fingerprint: String,
}

/// Averages over all deduplicated readings of one location within one local
/// calendar hour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyAggregate {
    // ---
    pub hour_timestamp_local: NaiveDateTime,
    pub hour_timestamp_utc: DateTime<Utc>,
    pub location: GeoPoint,
    pub location_name: String,
    pub region: Option<String>,
    pub timezone_id: String,
    pub country: String,
    pub city: String,
    pub district: String,
    pub pollutants: Pollutants,
    pub us_epa_index: Option<f64>,
    pub gb_defra_index: Option<f64>,
    pub weather: Weather,
    pub readings_in_hour: u32,
}

/// An hourly aggregate with its derived metrics and display names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedHourlyRecord {
    // ---
    pub aggregate: HourlyAggregate,
    pub country: String,
    pub city: String,
    pub district: String,
    pub prominent_pollutant: String,
    pub criteria_pollutant_count: u8,
    pub custom_aqi: f64,
    pub epa_category: String,
    pub defra_category: String,
    pub is_valid_measurement: bool,
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_geo_point_folds_negative_zero() {
        // ---
        assert_eq!(GeoPoint::new(-0.0, 10.0), GeoPoint::new(0.0, 10.0));
        assert!(GeoPoint::new(-0.0, 0.0).latitude.is_sign_positive());
    }

    #[test]
    fn test_geo_point_ordering() {
        // ---
        let lima = GeoPoint::new(-12.05, -77.05);
        let miraflores = GeoPoint::new(-12.12, -77.03);
        let same_lat = GeoPoint::new(-12.05, -77.00);

        assert!(miraflores < lima);
        assert!(lima < same_lat);

        let set: BTreeSet<GeoPoint> = [lima, miraflores, lima].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_raw_reading_deserializes() {
        // ---
        let raw: RawReading = serde_json::from_value(serde_json::json!({
            "raw_payload": {"current": {}},
            "country": "peru",
            "city": "lima",
            "district": "ate",
            "year": 2025,
            "month": 3,
            "day": 26,
            "ingested_at": "2025-03-26T18:45:00Z",
            "content_fingerprint": "abc",
            "source_file_id": "peru/lima/ate/2025/03/26/weather_api_measurement_20250326T184500Z.json"
        }))
        .unwrap();

        assert_eq!(raw.district, "ate");
        assert_eq!(raw.year, 2025);
        assert!(raw.raw_payload.get("current").is_some());
    }
}
