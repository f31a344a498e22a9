//! Deduplicator: one canonical reading per (measurement timestamp, location).
//!
//! The raw store can hold the same measurement several times (the fetcher
//! runs more often than the API refreshes its values, and files may be
//! re-uploaded). Within each identity key the most recently ingested reading
//! wins. Equal `ingested_at` values are broken by the greater
//! `source_file_id`, then the greater `content_fingerprint`, so the choice
//! never depends on input order.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::models::{DeduplicatedReading, GeoPoint, RawReading};
use crate::payload::parse_reading;

// ---

/// Identity of a real-world measurement. Location names are deliberately not
/// part of it, as their casing and spacing vary between responses.
pub type IdentityKey = (DateTime<Utc>, GeoPoint);

/// Select the latest-ingested reading for every identity key.
///
/// Unparseable records and records missing identity fields are dropped.
/// Output is ordered by measurement timestamp, then location.
pub fn deduplicate(raw: &[RawReading]) -> Vec<DeduplicatedReading> {
    // ---
    let mut latest: BTreeMap<IdentityKey, DeduplicatedReading> = BTreeMap::new();
    let mut dropped = 0usize;

    for record in raw {
        let Some(candidate) = parse_reading(record) else {
            dropped += 1;
            continue;
        };

        let key = (candidate.measurement_timestamp, candidate.location);
        match latest.get(&key) {
            Some(current) if ingestion_order(&candidate, current) != Ordering::Greater => {}
            _ => {
                latest.insert(key, candidate);
            }
        }
    }

    tracing::info!(
        "Deduplicated {} raw readings into {} ({} dropped as unparseable)",
        raw.len(),
        latest.len(),
        dropped
    );

    latest.into_values().collect()
}

/// Rank two readings of the same identity key; `Greater` is preferred.
fn ingestion_order(a: &DeduplicatedReading, b: &DeduplicatedReading) -> Ordering {
    // ---
    a.ingested_at
        .cmp(&b.ingested_at)
        .then_with(|| a.source_file_id.cmp(&b.source_file_id))
        .then_with(|| a.content_fingerprint.cmp(&b.content_fingerprint))
}
