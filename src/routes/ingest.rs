//! Raw store ingestion endpoints.
//!
//! - `POST /raw-readings` appends one caller-supplied reading.
//! - `POST /ingest/fetch` pulls the current reading for every configured
//!   district from the weather API and appends each one.

use axum::{
    extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::PgPool;
use tracing::{debug, info};

use super::error_response;
use crate::fetch::{fetch_all, tag_reading};
use crate::models::RawReading;
use crate::store::append_raw_reading;
use crate::Config;

// ---

pub fn router() -> Router<(PgPool, Config)> {
    // ---
    Router::new()
        .route("/raw-readings", post(append_handler))
        .route("/ingest/fetch", post(fetch_handler))
}

/// Request body for `POST /raw-readings`. Fields left out are assigned by
/// the server from the payload and the arrival time.
#[derive(Debug, Deserialize)]
pub struct NewRawReading {
    raw_payload: Value,
    country: String,
    city: String,
    district: String,
    year: Option<i32>,
    month: Option<i32>,
    day: Option<i32>,
    ingested_at: Option<DateTime<Utc>>,
    content_fingerprint: Option<String>,
    source_file_id: Option<String>,
}

impl NewRawReading {
    // ---
    fn into_raw_reading(self, now: DateTime<Utc>) -> RawReading {
        // ---
        let ingested_at = self.ingested_at.unwrap_or(now);
        let mut raw = tag_reading(
            self.raw_payload,
            &self.country,
            &self.city,
            &self.district,
            ingested_at,
        );

        if let Some(year) = self.year {
            raw.year = year;
        }
        if let Some(month) = self.month {
            raw.month = month;
        }
        if let Some(day) = self.day {
            raw.day = day;
        }
        if let Some(fingerprint) = self.content_fingerprint {
            raw.content_fingerprint = fingerprint;
        }
        if let Some(file_id) = self.source_file_id {
            raw.source_file_id = file_id;
        }
        raw
    }
}

#[derive(Debug, Serialize)]
struct Appended {
    id: i64,
    source_file_id: String,
    content_fingerprint: String,
}

async fn append_handler(
    State((pool, _config)): State<(PgPool, Config)>,
    Json(body): Json<NewRawReading>,
) -> impl IntoResponse {
    // ---
    let raw = body.into_raw_reading(Utc::now());
    debug!("POST /raw-readings - {}", raw.source_file_id);

    match append_raw_reading(&pool, &raw).await {
        Ok(id) => (
            StatusCode::CREATED,
            Json(Appended {
                id,
                source_file_id: raw.source_file_id,
                content_fingerprint: raw.content_fingerprint,
            }),
        )
            .into_response(),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to store raw reading",
            &e,
        ),
    }
}

async fn fetch_handler(State((pool, config)): State<(PgPool, Config)>) -> impl IntoResponse {
    // ---
    info!("POST /ingest/fetch - {} districts", config.districts.len());

    if config.weather_api_key.is_none() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "WEATHER_API_KEY is not configured" })),
        )
            .into_response();
    }

    let client = reqwest::Client::new();
    let readings = match fetch_all(&client, &config).await {
        Ok(readings) => readings,
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch readings",
                &e,
            )
        }
    };

    let mut stored = 0usize;
    for raw in &readings {
        if let Err(e) = append_raw_reading(&pool, raw).await {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to store fetched reading",
                &e,
            );
        }
        stored += 1;
    }

    info!("POST /ingest/fetch - stored {} readings", stored);
    (
        StatusCode::OK,
        Json(json!({
            "districts": config.districts.len(),
            "stored": stored,
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_new_raw_reading_defaults() {
        // ---
        let now = Utc.with_ymd_and_hms(2025, 3, 26, 18, 45, 0).unwrap();
        let body: NewRawReading = serde_json::from_value(json!({
            "raw_payload": {"current": {}},
            "country": "Peru",
            "city": "Lima",
            "district": "San Isidro"
        }))
        .unwrap();

        let raw = body.into_raw_reading(now);
        assert_eq!(raw.ingested_at, now);
        assert_eq!(raw.district, "san_isidro");
        assert_eq!((raw.year, raw.month, raw.day), (2025, 3, 26));
        assert_eq!(
            raw.source_file_id,
            "peru/lima/san_isidro/2025/03/26/weather_api_measurement_20250326T184500Z.json"
        );
    }

    #[test]
    fn test_new_raw_reading_keeps_supplied_fields() {
        // ---
        let now = Utc.with_ymd_and_hms(2025, 3, 26, 18, 45, 0).unwrap();
        let body: NewRawReading = serde_json::from_value(json!({
            "raw_payload": {"current": {}},
            "country": "peru",
            "city": "lima",
            "district": "ate",
            "day": 25,
            "ingested_at": "2025-03-25T10:00:00Z",
            "content_fingerprint": "abc",
            "source_file_id": "landing/file-1.json"
        }))
        .unwrap();

        let raw = body.into_raw_reading(now);
        assert_eq!(raw.day, 25);
        assert_eq!(raw.ingested_at, Utc.with_ymd_and_hms(2025, 3, 25, 10, 0, 0).unwrap());
        assert_eq!(raw.content_fingerprint, "abc");
        assert_eq!(raw.source_file_id, "landing/file-1.json");
    }
}
