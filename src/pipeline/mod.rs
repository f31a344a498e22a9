//! The transformation pipeline: raw → deduplicated → hourly → enriched →
//! dimensional.
//!
//! Every stage is a pure function of the complete output of the stage before
//! it. [`recompute`] runs the whole chain over a snapshot of the raw store;
//! running it twice over the same snapshot yields identical output.

pub mod dedup;
pub mod dimensions;
pub mod enrich;
pub mod hourly;
pub mod metrics;
pub mod rollups;

use serde::Serialize;

use crate::models::{EnrichedHourlyRecord, RawReading};

pub use dimensions::StarSchema;

// ---

/// Everything one refresh produces.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineOutput {
    pub raw_readings: usize,
    pub deduplicated: usize,
    pub hourly: Vec<EnrichedHourlyRecord>,
    pub star: StarSchema,
}

/// Row counts reported back to whoever triggered a refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshSummary {
    pub raw_readings: usize,
    pub deduplicated: usize,
    pub hourly_records: usize,
    pub locations: usize,
    pub dates: usize,
    pub facts: usize,
}

impl PipelineOutput {
    // ---
    pub fn summary(&self) -> RefreshSummary {
        // ---
        RefreshSummary {
            raw_readings: self.raw_readings,
            deduplicated: self.deduplicated,
            hourly_records: self.hourly.len(),
            locations: self.star.locations.len(),
            dates: self.star.dates.len(),
            facts: self.star.facts.len(),
        }
    }
}

/// Recompute every derived dataset from a full raw snapshot.
#[tracing::instrument(skip_all, fields(raw = raw.len()))]
pub fn recompute(raw: &[RawReading]) -> PipelineOutput {
    // ---
    let deduplicated = dedup::deduplicate(raw);
    let hourly = enrich::enrich_all(hourly::aggregate_hourly(&deduplicated));
    let star = dimensions::project(&hourly);

    PipelineOutput {
        raw_readings: raw.len(),
        deduplicated: deduplicated.len(),
        hourly,
        star,
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::payload::fixtures::{payload, raw};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_recompute_empty_input() {
        // ---
        let out = recompute(&[]);
        assert_eq!(out, PipelineOutput::default());
    }

    #[test]
    fn test_recompute_summary() {
        // ---
        let ingested = Utc.with_ymd_and_hms(2025, 3, 26, 19, 0, 0).unwrap();
        let input = vec![
            raw(payload(1743014700, -12.0, -77.0, Some(10.0)), ingested, "a"),
            raw(payload(1743014700, -12.0, -77.0, Some(10.0)), ingested, "b"),
            raw(payload(1743015000, -12.0, -77.0, Some(20.0)), ingested, "c"),
        ];

        let summary = recompute(&input).summary();
        assert_eq!(
            summary,
            RefreshSummary {
                raw_readings: 3,
                deduplicated: 2,
                hourly_records: 1,
                locations: 1,
                dates: 1,
                facts: 1,
            }
        );
    }
}
