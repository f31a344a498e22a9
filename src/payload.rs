//! Extraction of typed reading fields from the opaque weather API payload.
//!
//! The payload is the JSON body returned by the `current.json` endpoint with
//! `aqi=yes`. Every field is optional at the serde level; only the identity
//! fields (`current.last_updated_epoch`, `location.lat`, `location.lon`) and
//! the timezone are required for a reading to enter the pipeline. Anything
//! else that fails to parse drops the record, it never fails a refresh.

use chrono::DateTime;
use chrono_tz::Tz;
use serde::Deserialize;

use crate::models::{DeduplicatedReading, GeoPoint, Pollutants, RawReading, Weather};

// ---

#[derive(Debug, Deserialize)]
struct WeatherApiPayload {
    location: Option<ApiLocation>,
    current: Option<ApiCurrent>,
}

#[derive(Debug, Deserialize)]
struct ApiLocation {
    name: Option<String>,
    region: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    tz_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiCurrent {
    last_updated_epoch: Option<i64>,
    temp_c: Option<f64>,
    feelslike_c: Option<f64>,
    humidity: Option<f64>,
    wind_kph: Option<f64>,
    wind_degree: Option<f64>,
    wind_dir: Option<String>,
    gust_kph: Option<f64>,
    pressure_mb: Option<f64>,
    precip_mm: Option<f64>,
    cloud: Option<f64>,
    vis_km: Option<f64>,
    uv: Option<f64>,
    condition: Option<ApiCondition>,
    air_quality: Option<ApiAirQuality>,
}

#[derive(Debug, Deserialize)]
struct ApiCondition {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiAirQuality {
    co: Option<f64>,
    no2: Option<f64>,
    o3: Option<f64>,
    so2: Option<f64>,
    pm2_5: Option<f64>,
    pm10: Option<f64>,
    #[serde(rename = "us-epa-index")]
    us_epa_index: Option<f64>,
    #[serde(rename = "gb-defra-index")]
    gb_defra_index: Option<f64>,
}

/// Parse a raw reading into a candidate for deduplication.
///
/// Returns `None` when the payload is not a weather API response or lacks the
/// measurement timestamp, coordinates, or a known IANA timezone.
pub fn parse_reading(raw: &RawReading) -> Option<DeduplicatedReading> {
    // ---
    let payload: WeatherApiPayload = match serde_json::from_value(raw.raw_payload.clone()) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::debug!("Unparseable payload in {}: {}", raw.source_file_id, e);
            return None;
        }
    };

    let location = payload.location?;
    let current = payload.current?;

    let measurement_timestamp = DateTime::from_timestamp(current.last_updated_epoch?, 0)?;
    let point = GeoPoint::new(location.lat?, location.lon?);
    let timezone = match location.tz_id.as_deref()?.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            tracing::debug!(
                "Unknown timezone {:?} in {}",
                location.tz_id,
                raw.source_file_id
            );
            return None;
        }
    };

    let air = current.air_quality.unwrap_or_default();

    Some(DeduplicatedReading {
        measurement_timestamp,
        location: point,
        location_name: location.name.unwrap_or_default(),
        region: location.region,
        timezone,
        country: raw.country.clone(),
        city: raw.city.clone(),
        district: raw.district.clone(),
        pollutants: Pollutants {
            pm2_5: air.pm2_5,
            pm10: air.pm10,
            so2: air.so2,
            no2: air.no2,
            co: air.co,
            o3: air.o3,
        },
        us_epa_index: air.us_epa_index,
        gb_defra_index: air.gb_defra_index,
        weather: Weather {
            temperature_c: current.temp_c,
            feels_like_c: current.feelslike_c,
            humidity: current.humidity,
            wind_kph: current.wind_kph,
            wind_degree: current.wind_degree,
            wind_direction: current.wind_dir,
            gust_kph: current.gust_kph,
            pressure_mb: current.pressure_mb,
            precipitation_mm: current.precip_mm,
            cloud_cover: current.cloud,
            visibility_km: current.vis_km,
            uv_index: current.uv,
            weather_condition: current.condition.and_then(|c| c.text),
        },
        ingested_at: raw.ingested_at,
        source_file_id: raw.source_file_id.clone(),
        content_fingerprint: raw.content_fingerprint.clone(),
    })
}
