//! Presentation roll-ups over enriched hourly records.
//!
//! These back the dashboard views: daily and hourly city averages, daily
//! per-district AQI, the hourly series of one district, the latest hour per
//! district, the location hierarchy, country coverage, and data freshness.
//! Derived columns are recomputed from the averaged pollutants with the same
//! functions the enricher uses.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike, Utc};
use serde::Serialize;

use crate::models::{EnrichedHourlyRecord, GeoPoint, Pollutants};
use crate::pipeline::hourly::mean_ignoring_nulls;

// ---

/// Daily average pollutant levels for one city.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CityDailySummary {
    pub country: String,
    pub city: String,
    pub measurement_date: NaiveDate,
    pub pollutants: Pollutants,
    pub prominent_pollutant: String,
    pub aqi: f64,
    pub hourly_records: usize,
}

/// Hourly average pollutant levels across all districts of one city.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CityHourlySummary {
    pub country: String,
    pub city: String,
    pub measurement_time: NaiveDateTime,
    pub pollutants: Pollutants,
    pub prominent_pollutant: String,
    pub aqi: f64,
}

/// Daily AQI for one monitored location.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistrictDailyAqi {
    pub country: String,
    pub city: String,
    pub district: String,
    pub location_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub measurement_date: NaiveDate,
    pub aqi: f64,
    pub pm2_5: Option<f64>,
    pub pm10: Option<f64>,
    pub prominent_pollutant: String,
    pub hourly_readings_in_day: usize,
}

/// One hour of one district, as plotted on the district map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistrictHourlyDetail {
    pub country: String,
    pub city: String,
    pub district: String,
    pub location_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub measurement_time: NaiveDateTime,
    pub hour: u32,
    pub pollutants: Pollutants,
    pub prominent_pollutant: String,
    pub aqi: f64,
}

/// A distinct country / city / district triple.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct LocationHierarchy {
    pub country: String,
    pub city: String,
    pub district: String,
}

/// Coverage and current air quality for one country.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryCoverage {
    pub country: String,
    pub cities: usize,
    pub districts: usize,
    pub avg_aqi: Option<f64>,
}

/// Age of the most recent hourly fact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Freshness {
    pub latest_reading: Option<DateTime<Utc>>,
    pub minutes_old: Option<i64>,
    pub fresh: bool,
}

/// Optional filters shared by the views. Names match the formatted
/// (display) country, city and district, ignoring ASCII case.
#[derive(Debug, Clone, Default)]
pub struct ViewFilter {
    pub country: Option<String>,
    pub city: Option<String>,
    pub district: Option<String>,
    pub date: Option<NaiveDate>,
}

impl ViewFilter {
    // ---
    fn matches(&self, record: &EnrichedHourlyRecord) -> bool {
        // ---
        let name_matches = |wanted: &Option<String>, actual: &str| {
            wanted
                .as_deref()
                .map_or(true, |w| w.eq_ignore_ascii_case(actual))
        };

        name_matches(&self.country, &record.country)
            && name_matches(&self.city, &record.city)
            && name_matches(&self.district, &record.district)
            && self
                .date
                .map_or(true, |d| record.aggregate.hour_timestamp_local.date() == d)
    }
}

fn average_pollutants(records: &[&EnrichedHourlyRecord]) -> Pollutants {
    // ---
    let avg = |field: fn(&Pollutants) -> Option<f64>| {
        mean_ignoring_nulls(records.iter().map(|r| field(&r.aggregate.pollutants)), 2)
    };

    Pollutants {
        pm2_5: avg(|p| p.pm2_5),
        pm10: avg(|p| p.pm10),
        so2: avg(|p| p.so2),
        no2: avg(|p| p.no2),
        co: avg(|p| p.co),
        o3: avg(|p| p.o3),
    }
}

/// Per (country, city) averages for one local date, highest AQI first.
///
/// Without a date filter the latest date present in the matching records is
/// used.
pub fn daily_city(records: &[EnrichedHourlyRecord], filter: &ViewFilter) -> Vec<CityDailySummary> {
    // ---
    let matching: Vec<&EnrichedHourlyRecord> =
        records.iter().filter(|r| filter.matches(r)).collect();
    let Some(latest) = matching
        .iter()
        .map(|r| r.aggregate.hour_timestamp_local.date())
        .max()
    else {
        return Vec::new();
    };
    let day = filter.date.unwrap_or(latest);

    let mut groups: BTreeMap<(NaiveDate, &str, &str), Vec<&EnrichedHourlyRecord>> =
        BTreeMap::new();
    for record in matching
        .into_iter()
        .filter(|r| r.aggregate.hour_timestamp_local.date() == day)
    {
        let date = record.aggregate.hour_timestamp_local.date();
        groups
            .entry((date, record.country.as_str(), record.city.as_str()))
            .or_default()
            .push(record);
    }

    let mut summaries: Vec<CityDailySummary> = groups
        .into_iter()
        .map(|((date, country, city), members)| {
            let pollutants = average_pollutants(&members);
            CityDailySummary {
                country: country.to_string(),
                city: city.to_string(),
                measurement_date: date,
                prominent_pollutant: pollutants.prominent().to_string(),
                aqi: pollutants.custom_aqi(),
                pollutants,
                hourly_records: members.len(),
            }
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.measurement_date
            .cmp(&a.measurement_date)
            .then_with(|| b.aqi.total_cmp(&a.aqi))
    });
    summaries
}

/// Per (country, city, local hour) averages across districts, by hour.
pub fn hourly_city(
    records: &[EnrichedHourlyRecord],
    filter: &ViewFilter,
) -> Vec<CityHourlySummary> {
    // ---
    let mut groups: BTreeMap<(NaiveDateTime, &str, &str), Vec<&EnrichedHourlyRecord>> =
        BTreeMap::new();
    for record in records.iter().filter(|r| filter.matches(r)) {
        groups
            .entry((
                record.aggregate.hour_timestamp_local,
                record.country.as_str(),
                record.city.as_str(),
            ))
            .or_default()
            .push(record);
    }

    groups
        .into_iter()
        .map(|((hour, country, city), members)| {
            let pollutants = average_pollutants(&members);
            CityHourlySummary {
                country: country.to_string(),
                city: city.to_string(),
                measurement_time: hour,
                prominent_pollutant: pollutants.prominent().to_string(),
                aqi: pollutants.custom_aqi(),
                pollutants,
            }
        })
        .collect()
}

/// Per location and local date AQI, highest AQI first.
pub fn daily_district(
    records: &[EnrichedHourlyRecord],
    filter: &ViewFilter,
) -> Vec<DistrictDailyAqi> {
    // ---
    let mut groups: BTreeMap<(NaiveDate, GeoPoint), Vec<&EnrichedHourlyRecord>> = BTreeMap::new();
    for record in records.iter().filter(|r| filter.matches(r)) {
        groups
            .entry((
                record.aggregate.hour_timestamp_local.date(),
                record.aggregate.location,
            ))
            .or_default()
            .push(record);
    }

    let mut rows: Vec<DistrictDailyAqi> = groups
        .into_iter()
        .map(|((date, location), members)| {
            let latest = members[members.len() - 1];
            let pollutants = average_pollutants(&members);
            DistrictDailyAqi {
                country: latest.country.clone(),
                city: latest.city.clone(),
                district: latest.district.clone(),
                location_name: latest.aggregate.location_name.clone(),
                latitude: location.latitude,
                longitude: location.longitude,
                measurement_date: date,
                aqi: mean_ignoring_nulls(members.iter().map(|r| Some(r.custom_aqi)), 0)
                    .unwrap_or(0.0),
                pm2_5: pollutants.pm2_5,
                pm10: pollutants.pm10,
                prominent_pollutant: pollutants.prominent().to_string(),
                hourly_readings_in_day: members.len(),
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.aqi
            .total_cmp(&a.aqi)
            .then_with(|| a.district.cmp(&b.district))
    });
    rows
}

/// Every hour of the matching districts, by hour then location.
pub fn hourly_district(
    records: &[EnrichedHourlyRecord],
    filter: &ViewFilter,
) -> Vec<DistrictHourlyDetail> {
    // ---
    let mut rows: Vec<DistrictHourlyDetail> = records
        .iter()
        .filter(|r| filter.matches(r))
        .map(|r| {
            let agg = &r.aggregate;
            DistrictHourlyDetail {
                country: r.country.clone(),
                city: r.city.clone(),
                district: r.district.clone(),
                location_name: agg.location_name.clone(),
                latitude: agg.location.latitude,
                longitude: agg.location.longitude,
                measurement_time: agg.hour_timestamp_local,
                hour: agg.hour_timestamp_local.hour(),
                pollutants: agg.pollutants,
                prominent_pollutant: r.prominent_pollutant.clone(),
                aqi: r.custom_aqi,
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        a.measurement_time
            .cmp(&b.measurement_time)
            .then_with(|| a.latitude.total_cmp(&b.latitude))
            .then_with(|| a.longitude.total_cmp(&b.longitude))
    });
    rows
}

/// Distinct (country, city, district) triples, sorted.
pub fn location_hierarchy(
    records: &[EnrichedHourlyRecord],
    filter: &ViewFilter,
) -> Vec<LocationHierarchy> {
    // ---
    let distinct: BTreeSet<LocationHierarchy> = records
        .iter()
        .filter(|r| filter.matches(r))
        .map(|r| LocationHierarchy {
            country: r.country.clone(),
            city: r.city.clone(),
            district: r.district.clone(),
        })
        .collect();
    distinct.into_iter().collect()
}

/// Per country: distinct cities and districts, and the mean AQI (0 decimals)
/// over the latest hour of each location.
pub fn country_coverage(
    records: &[EnrichedHourlyRecord],
    filter: &ViewFilter,
) -> Vec<CountryCoverage> {
    // ---
    let latest = latest_district(records, filter);

    let mut groups: BTreeMap<&str, Vec<&EnrichedHourlyRecord>> = BTreeMap::new();
    for record in &latest {
        groups.entry(record.country.as_str()).or_default().push(record);
    }

    groups
        .into_iter()
        .map(|(country, members)| {
            let cities: BTreeSet<&str> = members.iter().map(|r| r.city.as_str()).collect();
            let districts: BTreeSet<(&str, &str)> = members
                .iter()
                .map(|r| (r.city.as_str(), r.district.as_str()))
                .collect();
            CountryCoverage {
                country: country.to_string(),
                cities: cities.len(),
                districts: districts.len(),
                avg_aqi: mean_ignoring_nulls(members.iter().map(|r| Some(r.custom_aqi)), 0),
            }
        })
        .collect()
}

/// The record with the latest local hour for every matching location.
pub fn latest_district(
    records: &[EnrichedHourlyRecord],
    filter: &ViewFilter,
) -> Vec<EnrichedHourlyRecord> {
    // ---
    let mut latest: BTreeMap<GeoPoint, &EnrichedHourlyRecord> = BTreeMap::new();
    for record in records.iter().filter(|r| filter.matches(r)) {
        let location = record.aggregate.location;
        let replace = latest.get(&location).map_or(true, |seen| {
            record.aggregate.hour_timestamp_local >= seen.aggregate.hour_timestamp_local
        });
        if replace {
            latest.insert(location, record);
        }
    }
    latest.into_values().cloned().collect()
}

/// Report how old the newest hourly fact is relative to `now`.
pub fn freshness(
    records: &[EnrichedHourlyRecord],
    now: DateTime<Utc>,
    threshold_minutes: u32,
) -> Freshness {
    // ---
    let latest_reading = records
        .iter()
        .map(|r| r.aggregate.hour_timestamp_utc)
        .max();
    let minutes_old = latest_reading.map(|ts| (now - ts).num_minutes());

    Freshness {
        latest_reading,
        minutes_old,
        fresh: minutes_old.is_some_and(|m| m < i64::from(threshold_minutes)),
    }
}
