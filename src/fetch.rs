//! Weather API ingestion adapter.
//!
//! Queries `current.json` once per monitored district and tags every
//! response with its partition metadata, a content fingerprint and a source
//! file id, producing [`RawReading`]s ready for the append-only store.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Datelike, Utc};
use reqwest::Client;
use serde_json::Value;

use crate::checksum::content_fingerprint;
use crate::models::RawReading;
use crate::Config;

// ---

/// Partition slug: lower-case with spaces replaced by `_`.
pub fn slug(name: &str) -> String {
    // ---
    name.trim().to_lowercase().replace(' ', "_")
}

/// Source file id of the form
/// `{country}/{city}/{district}/{yyyy}/{mm}/{dd}/weather_api_measurement_{yyyymmddTHHMMSSZ}.json`.
pub fn source_file_id(country: &str, city: &str, district: &str, at: DateTime<Utc>) -> String {
    // ---
    format!(
        "{}/{}/{}/{}/weather_api_measurement_{}.json",
        slug(country),
        slug(city),
        slug(district),
        at.format("%Y/%m/%d"),
        at.format("%Y%m%dT%H%M%SZ")
    )
}

/// Wrap a payload into a raw reading partitioned by the UTC ingestion date.
pub fn tag_reading(
    payload: Value,
    country: &str,
    city: &str,
    district: &str,
    ingested_at: DateTime<Utc>,
) -> RawReading {
    // ---
    RawReading {
        content_fingerprint: content_fingerprint(payload.to_string().as_bytes()),
        source_file_id: source_file_id(country, city, district, ingested_at),
        raw_payload: payload,
        country: slug(country),
        city: slug(city),
        district: slug(district),
        year: ingested_at.year(),
        month: ingested_at.month() as i32,
        day: ingested_at.day() as i32,
        ingested_at,
    }
}

/// Fetch the current reading for every configured district.
///
/// A district that fails is logged and skipped; the rest proceed. Fails only
/// when no API key is configured.
pub async fn fetch_all(client: &Client, config: &Config) -> Result<Vec<RawReading>> {
    // ---
    let api_key = config
        .weather_api_key
        .as_deref()
        .ok_or_else(|| anyhow!("WEATHER_API_KEY is not set; fetch is disabled"))?;

    let mut readings = Vec::with_capacity(config.districts.len());

    for district in &config.districts {
        match fetch_district(client, config, api_key, district).await {
            Ok(payload) => {
                readings.push(tag_reading(
                    payload,
                    &config.country,
                    &config.city,
                    district,
                    Utc::now(),
                ));
            }
            Err(e) => {
                tracing::warn!("Skipping district '{}': {:#}", district, e);
            }
        }
    }

    tracing::info!(
        "Fetched {} of {} districts",
        readings.len(),
        config.districts.len()
    );
    Ok(readings)
}

async fn fetch_district(
    client: &Client,
    config: &Config,
    api_key: &str,
    district: &str,
) -> Result<Value> {
    // ---
    let query = format!("{}, {}, {}", district, config.city, config.country);
    tracing::debug!("Fetching {} for '{}'", config.weather_api_url, query);

    let payload: Value = client
        .get(&config.weather_api_url)
        .query(&[("key", api_key), ("q", query.as_str()), ("aqi", "yes")])
        .send()
        .await
        .context("request failed")?
        .error_for_status()
        .context("weather API returned an error status")?
        .json()
        .await
        .context("response is not JSON")?;

    Ok(payload)
}
