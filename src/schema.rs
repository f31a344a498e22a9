//! Database schema management for `airquality-pipeline`.
//!
//! Ensures the raw store and every output table exist before serving
//! requests. Applied once on startup from `main.rs`.

use anyhow::Result;
use sqlx::PgPool;

// ---

const STATEMENTS: &[&str] = &[
    // Append-only store of ingested API responses
    r#"
    CREATE TABLE IF NOT EXISTS raw_readings (
        id                  BIGSERIAL   PRIMARY KEY,
        raw_payload         JSONB       NOT NULL,
        country             TEXT        NOT NULL,
        city                TEXT        NOT NULL,
        district            TEXT        NOT NULL,
        year                INTEGER     NOT NULL,
        month               INTEGER     NOT NULL,
        day                 INTEGER     NOT NULL,
        ingested_at         TIMESTAMPTZ NOT NULL,
        content_fingerprint TEXT        NOT NULL,
        source_file_id      TEXT        NOT NULL
    );
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_raw_readings_partition
        ON raw_readings (country, city, district, year, month, day);
    "#,
    // Enriched hourly records, replaced wholesale on every refresh
    r#"
    CREATE TABLE IF NOT EXISTS hourly_air_quality (
        hour_timestamp_local     TIMESTAMP        NOT NULL,
        hour_timestamp_utc       TIMESTAMPTZ      NOT NULL,
        latitude                 DOUBLE PRECISION NOT NULL,
        longitude                DOUBLE PRECISION NOT NULL,
        location_name            TEXT             NOT NULL,
        region                   TEXT,
        timezone_id              TEXT             NOT NULL,
        partition_country        TEXT             NOT NULL,
        partition_city           TEXT             NOT NULL,
        partition_district       TEXT             NOT NULL,
        country                  TEXT             NOT NULL,
        city                     TEXT             NOT NULL,
        district                 TEXT             NOT NULL,
        pm2_5                    DOUBLE PRECISION,
        pm10                     DOUBLE PRECISION,
        so2                      DOUBLE PRECISION,
        no2                      DOUBLE PRECISION,
        co                       DOUBLE PRECISION,
        o3                       DOUBLE PRECISION,
        us_epa_index             DOUBLE PRECISION,
        gb_defra_index           DOUBLE PRECISION,
        temperature_c            DOUBLE PRECISION,
        feels_like_c             DOUBLE PRECISION,
        humidity                 DOUBLE PRECISION,
        wind_kph                 DOUBLE PRECISION,
        wind_degree              DOUBLE PRECISION,
        wind_direction           TEXT,
        gust_kph                 DOUBLE PRECISION,
        pressure_mb              DOUBLE PRECISION,
        precipitation_mm         DOUBLE PRECISION,
        cloud_cover              DOUBLE PRECISION,
        visibility_km            DOUBLE PRECISION,
        uv_index                 DOUBLE PRECISION,
        weather_condition        TEXT,
        readings_in_hour         INTEGER          NOT NULL,
        prominent_pollutant      TEXT             NOT NULL,
        criteria_pollutant_count SMALLINT         NOT NULL,
        custom_aqi               DOUBLE PRECISION NOT NULL,
        epa_category             TEXT             NOT NULL,
        defra_category           TEXT             NOT NULL,
        is_valid_measurement     BOOLEAN          NOT NULL,
        PRIMARY KEY (hour_timestamp_local, latitude, longitude)
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS dim_location (
        location_key  TEXT             PRIMARY KEY,
        latitude      DOUBLE PRECISION NOT NULL,
        longitude     DOUBLE PRECISION NOT NULL,
        country       TEXT             NOT NULL,
        city          TEXT             NOT NULL,
        district      TEXT             NOT NULL,
        location_name TEXT             NOT NULL,
        region        TEXT,
        timezone_id   TEXT             NOT NULL
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS dim_date (
        date_key         TEXT      PRIMARY KEY,
        measurement_time TIMESTAMP NOT NULL,
        measurement_date DATE      NOT NULL,
        year             INTEGER   NOT NULL,
        quarter          INTEGER   NOT NULL,
        month            INTEGER   NOT NULL,
        week_of_year     INTEGER   NOT NULL,
        day              INTEGER   NOT NULL,
        day_name         TEXT      NOT NULL,
        hour             INTEGER   NOT NULL
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS air_quality_fact (
        fact_key                 TEXT             PRIMARY KEY,
        date_key                 TEXT             NOT NULL REFERENCES dim_date (date_key),
        location_key             TEXT             NOT NULL REFERENCES dim_location (location_key),
        utc_timestamp            TIMESTAMPTZ      NOT NULL,
        pm2_5                    DOUBLE PRECISION,
        pm10                     DOUBLE PRECISION,
        so2                      DOUBLE PRECISION,
        no2                      DOUBLE PRECISION,
        co                       DOUBLE PRECISION,
        o3                       DOUBLE PRECISION,
        us_epa_index             DOUBLE PRECISION,
        gb_defra_index           DOUBLE PRECISION,
        prominent_pollutant      TEXT             NOT NULL,
        criteria_pollutant_count SMALLINT         NOT NULL,
        aqi                      DOUBLE PRECISION NOT NULL,
        epa_category             TEXT             NOT NULL,
        defra_category           TEXT             NOT NULL,
        is_valid_measurement     BOOLEAN          NOT NULL,
        temperature_c            DOUBLE PRECISION,
        humidity                 DOUBLE PRECISION,
        wind_kph                 DOUBLE PRECISION,
        pressure_mb              DOUBLE PRECISION,
        precipitation_mm         DOUBLE PRECISION,
        uv_index                 DOUBLE PRECISION,
        weather_condition        TEXT,
        readings_in_hour         INTEGER          NOT NULL
    );
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_air_quality_fact_location
        ON air_quality_fact (location_key);
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_air_quality_fact_date
        ON air_quality_fact (date_key);
    "#,
    // One row per completed refresh
    r#"
    CREATE TABLE IF NOT EXISTS refresh_runs (
        run_id         UUID        PRIMARY KEY,
        completed_at   TIMESTAMPTZ NOT NULL,
        raw_readings   INTEGER     NOT NULL,
        deduplicated   INTEGER     NOT NULL,
        hourly_records INTEGER     NOT NULL,
        facts          INTEGER     NOT NULL
    );
    "#,
];

/// Create the database schema (idempotent).
///
/// Safe to call on every startup; no-op if objects already exist.
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    for statement in STATEMENTS {
        sqlx::query(statement).execute(&mut *tx).await?;
    }

    tx.commit().await?;
    tracing::info!("Database schema ready ({} statements)", STATEMENTS.len());
    Ok(())
}
