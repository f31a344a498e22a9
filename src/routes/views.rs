//! Read-only dashboard views over the current hourly snapshot.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::debug;

use super::error_response;
use crate::models::EnrichedHourlyRecord;
use crate::pipeline::rollups::{self, ViewFilter};
use crate::store::load_hourly_records;
use crate::Config;

// ---

pub fn router() -> Router<(PgPool, Config)> {
    // ---
    Router::new()
        .route("/views/daily-city", get(daily_city))
        .route("/views/hourly-city", get(hourly_city))
        .route("/views/daily-district", get(daily_district))
        .route("/views/hourly-district", get(hourly_district))
        .route("/views/latest-district", get(latest_district))
        .route("/views/location-hierarchy", get(location_hierarchy))
        .route("/views/country-coverage", get(country_coverage))
        .route("/views/freshness", get(freshness))
}

/// Query parameters shared by the views.
#[derive(Debug, Default, Deserialize)]
pub struct ViewQuery {
    country: Option<String>,
    city: Option<String>,
    district: Option<String>,
    date: Option<NaiveDate>,
    limit: Option<usize>,
}

impl ViewQuery {
    // ---
    fn filter(&self) -> ViewFilter {
        ViewFilter {
            country: self.country.clone(),
            city: self.city.clone(),
            district: self.district.clone(),
            date: self.date,
        }
    }
}

/// Load the snapshot and render `view` over it, truncated to `limit`.
async fn render<T, F>(pool: &PgPool, limit: Option<usize>, view: F) -> Response
where
    T: Serialize,
    F: FnOnce(&[EnrichedHourlyRecord]) -> Vec<T>,
{
    // ---
    match load_hourly_records(pool).await {
        Ok(records) => {
            let mut rows = view(&records);
            if let Some(limit) = limit {
                rows.truncate(limit);
            }
            debug!("Rendering {} view rows", rows.len());
            (StatusCode::OK, Json(rows)).into_response()
        }
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to load hourly records",
            &e,
        ),
    }
}

async fn daily_city(
    Query(params): Query<ViewQuery>,
    State((pool, _config)): State<(PgPool, Config)>,
) -> Response {
    // ---
    let filter = params.filter();
    render(&pool, params.limit, |records| {
        rollups::daily_city(records, &filter)
    })
    .await
}

async fn hourly_city(
    Query(params): Query<ViewQuery>,
    State((pool, _config)): State<(PgPool, Config)>,
) -> Response {
    // ---
    let filter = params.filter();
    render(&pool, params.limit, |records| {
        rollups::hourly_city(records, &filter)
    })
    .await
}

async fn daily_district(
    Query(params): Query<ViewQuery>,
    State((pool, _config)): State<(PgPool, Config)>,
) -> Response {
    // ---
    let filter = params.filter();
    render(&pool, params.limit, |records| {
        rollups::daily_district(records, &filter)
    })
    .await
}

async fn hourly_district(
    Query(params): Query<ViewQuery>,
    State((pool, _config)): State<(PgPool, Config)>,
) -> Response {
    // ---
    let filter = params.filter();
    render(&pool, params.limit, |records| {
        rollups::hourly_district(records, &filter)
    })
    .await
}

async fn latest_district(
    Query(params): Query<ViewQuery>,
    State((pool, _config)): State<(PgPool, Config)>,
) -> Response {
    // ---
    let filter = params.filter();
    render(&pool, params.limit, |records| {
        rollups::latest_district(records, &filter)
    })
    .await
}

async fn location_hierarchy(
    Query(params): Query<ViewQuery>,
    State((pool, _config)): State<(PgPool, Config)>,
) -> Response {
    // ---
    let filter = params.filter();
    render(&pool, params.limit, |records| {
        rollups::location_hierarchy(records, &filter)
    })
    .await
}

async fn country_coverage(
    Query(params): Query<ViewQuery>,
    State((pool, _config)): State<(PgPool, Config)>,
) -> Response {
    // ---
    let filter = params.filter();
    render(&pool, params.limit, |records| {
        rollups::country_coverage(records, &filter)
    })
    .await
}

async fn freshness(State((pool, config)): State<(PgPool, Config)>) -> Response {
    // ---
    match load_hourly_records(&pool).await {
        Ok(records) => {
            let report =
                rollups::freshness(&records, Utc::now(), config.freshness_threshold_minutes);
            (StatusCode::OK, Json(report)).into_response()
        }
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to load hourly records",
            &e,
        ),
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_view_query_parses_date() {
        // ---
        let params: ViewQuery =
            serde_json::from_value(serde_json::json!({
                "city": "Lima",
                "district": "San Isidro",
                "date": "2025-03-26"
            }))
            .unwrap();
        let filter = params.filter();

        assert_eq!(filter.city.as_deref(), Some("Lima"));
        assert_eq!(filter.district.as_deref(), Some("San Isidro"));
        assert_eq!(filter.country, None);
        assert_eq!(filter.date, NaiveDate::from_ymd_opt(2025, 3, 26));
    }
}
