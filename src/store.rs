//! PostgreSQL persistence for the raw store and the output snapshot.
//!
//! The raw store is append-only. Outputs are only ever written by
//! [`refresh_snapshot`], which reads the raw store and swaps every output
//! table inside a single transaction so readers see either the previous or
//! the new snapshot.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{PgExecutor, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::{
    EnrichedHourlyRecord, GeoPoint, HourlyAggregate, Pollutants, RawReading, Weather,
};
use crate::pipeline::dimensions::{DateDimension, FactRecord, LocationDimension};
use crate::pipeline::{recompute, PipelineOutput, RefreshSummary};

// ---

/// Advisory lock key held for the whole of a refresh.
const SNAPSHOT_LOCK_KEY: i64 = 0x0A1F_2025;

/// Append one raw reading. Returns the new row id.
pub async fn append_raw_reading(pool: &PgPool, raw: &RawReading) -> Result<i64> {
    // ---
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO raw_readings (
            raw_payload, country, city, district, year, month, day,
            ingested_at, content_fingerprint, source_file_id
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING id
        "#,
    )
    .bind(&raw.raw_payload)
    .bind(&raw.country)
    .bind(&raw.city)
    .bind(&raw.district)
    .bind(raw.year)
    .bind(raw.month)
    .bind(raw.day)
    .bind(raw.ingested_at)
    .bind(&raw.content_fingerprint)
    .bind(&raw.source_file_id)
    .fetch_one(pool)
    .await
    .context("Failed to append raw reading")?;

    tracing::debug!("Stored raw reading {} as id {}", raw.source_file_id, id);
    Ok(id)
}

/// Load the complete raw store, in insertion order.
pub async fn load_raw_readings<'e, E>(executor: E) -> Result<Vec<RawReading>>
where
    E: PgExecutor<'e>,
{
    // ---
    let rows = sqlx::query_as::<_, RawReading>(
        r#"
        SELECT raw_payload, country, city, district, year, month, day,
               ingested_at, content_fingerprint, source_file_id
        FROM raw_readings
        ORDER BY id
        "#,
    )
    .fetch_all(executor)
    .await
    .context("Failed to load raw readings")?;

    tracing::info!("Loaded {} raw readings", rows.len());
    Ok(rows)
}

/// Recompute every output from the raw store and swap it in, recording the
/// refresh under `run_id`.
///
/// The lock is taken before the raw store is read, so overlapping refreshes
/// run one after another and the last to commit has seen every raw reading
/// committed before it started.
pub async fn refresh_snapshot(pool: &PgPool, run_id: Uuid) -> Result<RefreshSummary> {
    // ---
    let mut tx = pool.begin().await?;

    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(SNAPSHOT_LOCK_KEY)
        .execute(&mut *tx)
        .await
        .context("Failed to acquire snapshot lock")?;

    let raw = load_raw_readings(&mut *tx).await?;
    let output = recompute(&raw);

    let summary = write_snapshot(&mut tx, run_id, &output).await?;

    tx.commit().await.context("Failed to commit snapshot")?;
    tracing::info!(
        "Snapshot {} committed: {} hourly records, {} facts",
        run_id,
        summary.hourly_records,
        summary.facts
    );
    Ok(summary)
}

async fn write_snapshot(
    tx: &mut Transaction<'_, Postgres>,
    run_id: Uuid,
    output: &PipelineOutput,
) -> Result<RefreshSummary> {
    // ---
    // Facts reference the dimensions, so they go first.
    for table in ["air_quality_fact", "dim_date", "dim_location", "hourly_air_quality"] {
        sqlx::query(&format!("DELETE FROM {table}"))
            .execute(&mut **tx)
            .await
            .with_context(|| format!("Failed to clear {table}"))?;
    }

    for record in &output.hourly {
        insert_hourly(tx, record).await?;
    }
    for location in &output.star.locations {
        insert_location(tx, location).await?;
    }
    for date in &output.star.dates {
        insert_date(tx, date).await?;
    }
    for fact in &output.star.facts {
        insert_fact(tx, fact).await?;
    }

    let summary = output.summary();
    sqlx::query(
        r#"
        INSERT INTO refresh_runs (
            run_id, completed_at, raw_readings, deduplicated, hourly_records, facts
        ) VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(run_id)
    .bind(Utc::now())
    .bind(i32::try_from(summary.raw_readings)?)
    .bind(i32::try_from(summary.deduplicated)?)
    .bind(i32::try_from(summary.hourly_records)?)
    .bind(i32::try_from(summary.facts)?)
    .execute(&mut **tx)
    .await?;

    Ok(summary)
}

async fn insert_hourly(tx: &mut Transaction<'_, Postgres>, r: &EnrichedHourlyRecord) -> Result<()> {
    // ---
    let a = &r.aggregate;
    let p = &a.pollutants;
    let w = &a.weather;

    sqlx::query(
        r#"
        INSERT INTO hourly_air_quality (
            hour_timestamp_local, hour_timestamp_utc, latitude, longitude,
            location_name, region, timezone_id,
            partition_country, partition_city, partition_district,
            country, city, district,
            pm2_5, pm10, so2, no2, co, o3, us_epa_index, gb_defra_index,
            temperature_c, feels_like_c, humidity, wind_kph, wind_degree, wind_direction,
            gust_kph, pressure_mb, precipitation_mm, cloud_cover, visibility_km, uv_index,
            weather_condition, readings_in_hour,
            prominent_pollutant, criteria_pollutant_count, custom_aqi,
            epa_category, defra_category, is_valid_measurement
        ) VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
            $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30, $31, $32,
            $33, $34, $35, $36, $37, $38, $39, $40, $41
        )
        "#,
    )
    .bind(a.hour_timestamp_local)
    .bind(a.hour_timestamp_utc)
    .bind(a.location.latitude)
    .bind(a.location.longitude)
    .bind(&a.location_name)
    .bind(&a.region)
    .bind(&a.timezone_id)
    .bind(&a.country)
    .bind(&a.city)
    .bind(&a.district)
    .bind(&r.country)
    .bind(&r.city)
    .bind(&r.district)
    .bind(p.pm2_5)
    .bind(p.pm10)
    .bind(p.so2)
    .bind(p.no2)
    .bind(p.co)
    .bind(p.o3)
    .bind(a.us_epa_index)
    .bind(a.gb_defra_index)
    .bind(w.temperature_c)
    .bind(w.feels_like_c)
    .bind(w.humidity)
    .bind(w.wind_kph)
    .bind(w.wind_degree)
    .bind(&w.wind_direction)
    .bind(w.gust_kph)
    .bind(w.pressure_mb)
    .bind(w.precipitation_mm)
    .bind(w.cloud_cover)
    .bind(w.visibility_km)
    .bind(w.uv_index)
    .bind(&w.weather_condition)
    .bind(i32::try_from(a.readings_in_hour)?)
    .bind(&r.prominent_pollutant)
    .bind(i16::from(r.criteria_pollutant_count))
    .bind(r.custom_aqi)
    .bind(&r.epa_category)
    .bind(&r.defra_category)
    .bind(r.is_valid_measurement)
    .execute(&mut **tx)
    .await
    .context("Failed to insert hourly record")?;

    Ok(())
}

async fn insert_location(
    tx: &mut Transaction<'_, Postgres>,
    location: &LocationDimension,
) -> Result<()> {
    // ---
    sqlx::query(
        r#"
        INSERT INTO dim_location (
            location_key, latitude, longitude, country, city, district,
            location_name, region, timezone_id
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(&location.location_key)
    .bind(location.latitude)
    .bind(location.longitude)
    .bind(&location.country)
    .bind(&location.city)
    .bind(&location.district)
    .bind(&location.location_name)
    .bind(&location.region)
    .bind(&location.timezone_id)
    .execute(&mut **tx)
    .await
    .context("Failed to insert location dimension")?;

    Ok(())
}

async fn insert_date(tx: &mut Transaction<'_, Postgres>, date: &DateDimension) -> Result<()> {
    // ---
    sqlx::query(
        r#"
        INSERT INTO dim_date (
            date_key, measurement_time, measurement_date, year, quarter, month,
            week_of_year, day, day_name, hour
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(&date.date_key)
    .bind(date.measurement_time)
    .bind(date.measurement_date)
    .bind(date.year)
    .bind(i32::try_from(date.quarter)?)
    .bind(i32::try_from(date.month)?)
    .bind(i32::try_from(date.week_of_year)?)
    .bind(i32::try_from(date.day)?)
    .bind(&date.day_name)
    .bind(i32::try_from(date.hour)?)
    .execute(&mut **tx)
    .await
    .context("Failed to insert date dimension")?;

    Ok(())
}

async fn insert_fact(tx: &mut Transaction<'_, Postgres>, fact: &FactRecord) -> Result<()> {
    // ---
    let p = &fact.pollutants;
    let w = &fact.weather;

    sqlx::query(
        r#"
        INSERT INTO air_quality_fact (
            fact_key, date_key, location_key, utc_timestamp,
            pm2_5, pm10, so2, no2, co, o3, us_epa_index, gb_defra_index,
            prominent_pollutant, criteria_pollutant_count, aqi,
            epa_category, defra_category, is_valid_measurement,
            temperature_c, humidity, wind_kph, pressure_mb, precipitation_mm, uv_index,
            weather_condition, readings_in_hour
        ) VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
            $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26
        )
        "#,
    )
    .bind(&fact.fact_key)
    .bind(&fact.date_key)
    .bind(&fact.location_key)
    .bind(fact.utc_timestamp)
    .bind(p.pm2_5)
    .bind(p.pm10)
    .bind(p.so2)
    .bind(p.no2)
    .bind(p.co)
    .bind(p.o3)
    .bind(fact.us_epa_index)
    .bind(fact.gb_defra_index)
    .bind(&fact.prominent_pollutant)
    .bind(i16::from(fact.criteria_pollutant_count))
    .bind(fact.aqi)
    .bind(&fact.epa_category)
    .bind(&fact.defra_category)
    .bind(fact.is_valid_measurement)
    .bind(w.temperature_c)
    .bind(w.humidity)
    .bind(w.wind_kph)
    .bind(w.pressure_mb)
    .bind(w.precipitation_mm)
    .bind(w.uv_index)
    .bind(&w.weather_condition)
    .bind(i32::try_from(fact.readings_in_hour)?)
    .execute(&mut **tx)
    .await
    .context("Failed to insert fact")?;

    Ok(())
}

/// Flat `hourly_air_quality` row as read back from the database.
#[derive(Debug, sqlx::FromRow)]
struct HourlyRow {
    hour_timestamp_local: NaiveDateTime,
    hour_timestamp_utc: DateTime<Utc>,
    latitude: f64,
    longitude: f64,
    location_name: String,
    region: Option<String>,
    timezone_id: String,
    partition_country: String,
    partition_city: String,
    partition_district: String,
    country: String,
    city: String,
    district: String,
    pm2_5: Option<f64>,
    pm10: Option<f64>,
    so2: Option<f64>,
    no2: Option<f64>,
    co: Option<f64>,
    o3: Option<f64>,
    us_epa_index: Option<f64>,
    gb_defra_index: Option<f64>,
    temperature_c: Option<f64>,
    feels_like_c: Option<f64>,
    humidity: Option<f64>,
    wind_kph: Option<f64>,
    wind_degree: Option<f64>,
    wind_direction: Option<String>,
    gust_kph: Option<f64>,
    pressure_mb: Option<f64>,
    precipitation_mm: Option<f64>,
    cloud_cover: Option<f64>,
    visibility_km: Option<f64>,
    uv_index: Option<f64>,
    weather_condition: Option<String>,
    readings_in_hour: i32,
    prominent_pollutant: String,
    criteria_pollutant_count: i16,
    custom_aqi: f64,
    epa_category: String,
    defra_category: String,
    is_valid_measurement: bool,
}

impl TryFrom<HourlyRow> for EnrichedHourlyRecord {
    type Error = anyhow::Error;

    fn try_from(row: HourlyRow) -> Result<Self> {
        // ---
        let readings_in_hour = u32::try_from(row.readings_in_hour)
            .with_context(|| format!("readings_in_hour out of range: {}", row.readings_in_hour))?;
        let criteria_pollutant_count = u8::try_from(row.criteria_pollutant_count).with_context(
            || format!("criteria_pollutant_count out of range: {}", row.criteria_pollutant_count),
        )?;

        Ok(EnrichedHourlyRecord {
            aggregate: HourlyAggregate {
                hour_timestamp_local: row.hour_timestamp_local,
                hour_timestamp_utc: row.hour_timestamp_utc,
                location: GeoPoint::new(row.latitude, row.longitude),
                location_name: row.location_name,
                region: row.region,
                timezone_id: row.timezone_id,
                country: row.partition_country,
                city: row.partition_city,
                district: row.partition_district,
                pollutants: Pollutants {
                    pm2_5: row.pm2_5,
                    pm10: row.pm10,
                    so2: row.so2,
                    no2: row.no2,
                    co: row.co,
                    o3: row.o3,
                },
                us_epa_index: row.us_epa_index,
                gb_defra_index: row.gb_defra_index,
                weather: Weather {
                    temperature_c: row.temperature_c,
                    feels_like_c: row.feels_like_c,
                    humidity: row.humidity,
                    wind_kph: row.wind_kph,
                    wind_degree: row.wind_degree,
                    wind_direction: row.wind_direction,
                    gust_kph: row.gust_kph,
                    pressure_mb: row.pressure_mb,
                    precipitation_mm: row.precipitation_mm,
                    cloud_cover: row.cloud_cover,
                    visibility_km: row.visibility_km,
                    uv_index: row.uv_index,
                    weather_condition: row.weather_condition,
                },
                readings_in_hour,
            },
            country: row.country,
            city: row.city,
            district: row.district,
            prominent_pollutant: row.prominent_pollutant,
            criteria_pollutant_count,
            custom_aqi: row.custom_aqi,
            epa_category: row.epa_category,
            defra_category: row.defra_category,
            is_valid_measurement: row.is_valid_measurement,
        })
    }
}

/// Load the current snapshot of enriched hourly records, by local hour then
/// location.
pub async fn load_hourly_records(pool: &PgPool) -> Result<Vec<EnrichedHourlyRecord>> {
    // ---
    let rows = sqlx::query_as::<_, HourlyRow>(
        r#"
        SELECT *
        FROM hourly_air_quality
        ORDER BY hour_timestamp_local, latitude, longitude
        "#,
    )
    .fetch_all(pool)
    .await
    .context("Failed to load hourly records")?;

    tracing::debug!("Loaded {} hourly records", rows.len());
    rows.into_iter().map(EnrichedHourlyRecord::try_from).collect()
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn row() -> HourlyRow {
        // ---
        HourlyRow {
            hour_timestamp_local: NaiveDate::from_ymd_opt(2025, 3, 26)
                .unwrap()
                .and_hms_opt(13, 0, 0)
                .unwrap(),
            hour_timestamp_utc: Utc.with_ymd_and_hms(2025, 3, 26, 18, 0, 0).unwrap(),
            latitude: -12.02,
            longitude: -77.0,
            location_name: "Ate".to_string(),
            region: Some("Lima".to_string()),
            timezone_id: "America/Lima".to_string(),
            partition_country: "peru".to_string(),
            partition_city: "lima".to_string(),
            partition_district: "ate".to_string(),
            country: "Peru".to_string(),
            city: "Lima".to_string(),
            district: "Ate".to_string(),
            pm2_5: Some(15.0),
            pm10: Some(25.0),
            so2: Some(2.0),
            no2: Some(8.0),
            co: None,
            o3: None,
            us_epa_index: Some(1.0),
            gb_defra_index: Some(2.0),
            temperature_c: Some(20.0),
            feels_like_c: None,
            humidity: Some(70.0),
            wind_kph: None,
            wind_degree: None,
            wind_direction: Some("S".to_string()),
            gust_kph: None,
            pressure_mb: None,
            precipitation_mm: None,
            cloud_cover: None,
            visibility_km: None,
            uv_index: None,
            weather_condition: Some("Overcast".to_string()),
            readings_in_hour: 2,
            prominent_pollutant: "PM10".to_string(),
            criteria_pollutant_count: 3,
            custom_aqi: 25.0,
            epa_category: "Good".to_string(),
            defra_category: "Low".to_string(),
            is_valid_measurement: true,
        }
    }

    #[test]
    fn test_hourly_row_converts() {
        // ---
        let record = EnrichedHourlyRecord::try_from(row()).unwrap();

        assert_eq!(record.aggregate.readings_in_hour, 2);
        assert_eq!(record.criteria_pollutant_count, 3);
        assert_eq!(record.aggregate.district, "ate");
        assert_eq!(record.district, "Ate");
        assert_eq!(record.aggregate.location, GeoPoint::new(-12.02, -77.0));
        assert_eq!(record.aggregate.weather.wind_direction.as_deref(), Some("S"));
    }

    #[test]
    fn test_hourly_row_rejects_out_of_range_counts() {
        // ---
        let negative_readings = HourlyRow {
            readings_in_hour: -1,
            ..row()
        };
        let err = EnrichedHourlyRecord::try_from(negative_readings).unwrap_err();
        assert!(err.to_string().contains("readings_in_hour"));

        let oversized_count = HourlyRow {
            criteria_pollutant_count: 300,
            ..row()
        };
        let err = EnrichedHourlyRecord::try_from(oversized_count).unwrap_err();
        assert!(err.to_string().contains("criteria_pollutant_count"));
    }
}
