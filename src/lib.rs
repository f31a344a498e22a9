//! `airquality-pipeline`: hourly air-quality pipeline over weather API
//! readings.
//!
//! The pure transformation stages live in [`pipeline`]; [`store`], [`fetch`]
//! and [`routes`] wrap them in a PostgreSQL-backed HTTP service.

pub mod checksum;
pub mod config;
pub mod fetch;
pub mod models;
pub mod payload;
pub mod pipeline;
pub mod routes;
pub mod schema;
pub mod store;

pub use config::Config;
pub use models::{DeduplicatedReading, EnrichedHourlyRecord, HourlyAggregate, RawReading};
