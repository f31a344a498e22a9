//! Metric Enricher: attach derived metrics and display names to each hourly
//! aggregate.

use crate::models::{EnrichedHourlyRecord, HourlyAggregate};
use crate::pipeline::metrics::{
    defra_category, epa_category, format_location_name, is_valid_measurement,
};

// ---

/// Enrich a single hourly aggregate. Pure and total.
pub fn enrich(aggregate: HourlyAggregate) -> EnrichedHourlyRecord {
    // ---
    let pollutants = aggregate.pollutants;

    EnrichedHourlyRecord {
        country: format_location_name(&aggregate.country),
        city: format_location_name(&aggregate.city),
        district: format_location_name(&aggregate.district),
        prominent_pollutant: pollutants.prominent().to_string(),
        criteria_pollutant_count: pollutants.criteria_count(),
        custom_aqi: pollutants.custom_aqi(),
        epa_category: epa_category(aggregate.us_epa_index).to_string(),
        defra_category: defra_category(aggregate.gb_defra_index).to_string(),
        is_valid_measurement: is_valid_measurement(&pollutants),
        aggregate,
    }
}

pub fn enrich_all(aggregates: Vec<HourlyAggregate>) -> Vec<EnrichedHourlyRecord> {
    aggregates.into_iter().map(enrich).collect()
}
