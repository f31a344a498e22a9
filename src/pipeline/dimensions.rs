//! Dimensional Projector: reshape enriched hourly records into a location
//! dimension, a date/time dimension and a fact table.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};
use serde::Serialize;

use crate::checksum::surrogate_key;
use crate::models::{EnrichedHourlyRecord, GeoPoint, Pollutants, Weather};

// ---

/// One row per monitored location, keyed by its coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationDimension {
    pub location_key: String,
    pub latitude: f64,
    pub longitude: f64,
    pub country: String,
    pub city: String,
    pub district: String,
    pub location_name: String,
    pub region: Option<String>,
    pub timezone_id: String,
}

/// One row per local hour present in the facts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateDimension {
    pub date_key: String,
    pub measurement_time: NaiveDateTime,
    pub measurement_date: NaiveDate,
    pub year: i32,
    pub quarter: u32,
    pub month: u32,
    pub week_of_year: u32,
    pub day: u32,
    pub day_name: String,
    pub hour: u32,
}

/// An enriched hourly record referencing both dimensions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactRecord {
    pub fact_key: String,
    pub date_key: String,
    pub location_key: String,
    pub utc_timestamp: DateTime<Utc>,
    pub pollutants: Pollutants,
    pub us_epa_index: Option<f64>,
    pub gb_defra_index: Option<f64>,
    pub prominent_pollutant: String,
    pub criteria_pollutant_count: u8,
    pub aqi: f64,
    pub epa_category: String,
    pub defra_category: String,
    pub is_valid_measurement: bool,
    pub weather: Weather,
    pub readings_in_hour: u32,
}

/// The complete star schema produced by one refresh.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StarSchema {
    pub locations: Vec<LocationDimension>,
    pub dates: Vec<DateDimension>,
    pub facts: Vec<FactRecord>,
}

pub fn location_key(location: &GeoPoint) -> String {
    // ---
    let latitude = location.latitude.to_string();
    let longitude = location.longitude.to_string();
    surrogate_key(&[latitude.as_str(), longitude.as_str()])
}

pub fn date_key(hour: &NaiveDateTime) -> String {
    // ---
    let formatted = hour.format("%Y-%m-%d %H:%M:%S").to_string();
    surrogate_key(&[formatted.as_str()])
}

/// Project enriched records into dimensions and facts.
///
/// Location attributes are taken from the latest hour seen for each
/// location. All three outputs are ordered by their natural keys.
pub fn project(records: &[EnrichedHourlyRecord]) -> StarSchema {
    // ---
    let mut locations: BTreeMap<GeoPoint, (NaiveDateTime, LocationDimension)> = BTreeMap::new();
    let mut dates: BTreeMap<NaiveDateTime, DateDimension> = BTreeMap::new();
    let mut facts: BTreeMap<(NaiveDateTime, GeoPoint), FactRecord> = BTreeMap::new();

    for record in records {
        let agg = &record.aggregate;
        let hour = agg.hour_timestamp_local;
        let loc_key = location_key(&agg.location);
        let hour_key = date_key(&hour);

        let is_newer = locations
            .get(&agg.location)
            .map_or(true, |(seen, _)| hour >= *seen);
        if is_newer {
            locations.insert(
                agg.location,
                (
                    hour,
                    LocationDimension {
                        location_key: loc_key.clone(),
                        latitude: agg.location.latitude,
                        longitude: agg.location.longitude,
                        country: record.country.clone(),
                        city: record.city.clone(),
                        district: record.district.clone(),
                        location_name: agg.location_name.clone(),
                        region: agg.region.clone(),
                        timezone_id: agg.timezone_id.clone(),
                    },
                ),
            );
        }

        dates
            .entry(hour)
            .or_insert_with(|| date_dimension(hour, hour_key.clone()));

        facts.insert(
            (hour, agg.location),
            FactRecord {
                fact_key: surrogate_key(&[hour_key.as_str(), loc_key.as_str()]),
                date_key: hour_key,
                location_key: loc_key,
                utc_timestamp: agg.hour_timestamp_utc,
                pollutants: agg.pollutants,
                us_epa_index: agg.us_epa_index,
                gb_defra_index: agg.gb_defra_index,
                prominent_pollutant: record.prominent_pollutant.clone(),
                criteria_pollutant_count: record.criteria_pollutant_count,
                aqi: record.custom_aqi,
                epa_category: record.epa_category.clone(),
                defra_category: record.defra_category.clone(),
                is_valid_measurement: record.is_valid_measurement,
                weather: agg.weather.clone(),
                readings_in_hour: agg.readings_in_hour,
            },
        );
    }

    let schema = StarSchema {
        locations: locations.into_values().map(|(_, dim)| dim).collect(),
        dates: dates.into_values().collect(),
        facts: facts.into_values().collect(),
    };

    tracing::info!(
        "Projected {} locations, {} dates, {} facts",
        schema.locations.len(),
        schema.dates.len(),
        schema.facts.len()
    );

    schema
}

fn date_dimension(hour: NaiveDateTime, date_key: String) -> DateDimension {
    // ---
    let date = hour.date();
    DateDimension {
        date_key,
        measurement_time: hour,
        measurement_date: date,
        year: date.year(),
        quarter: (date.month() - 1) / 3 + 1,
        month: date.month(),
        week_of_year: date.iso_week().week(),
        day: date.day(),
        day_name: date.format("%A").to_string(),
        hour: hour.hour(),
    }
}
