//! Derived-metric functions shared by the enricher and the presentation views.
//!
//! These are the stable, row-at-a-time functions that downstream consumers
//! call directly. All of them are total: null inputs count as zero (or as
//! absent for the coverage rule) and unknown index values map to `"Unknown"`.

use crate::models::Pollutants;

// ---

/// Words kept lower-case by [`format_location_name`] unless they lead the name.
pub const CONNECTOR_WORDS: [&str; 10] = ["de", "del", "la", "las", "el", "los", "y", "e", "a", "al"];

/// Label returned by the category lookups for out-of-range or missing indices.
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// The six tracked pollutant species, in tie-break priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pollutant {
    Pm25,
    Pm10,
    So2,
    No2,
    Co,
    O3,
}

impl Pollutant {
    // ---
    pub const ALL: [Pollutant; 6] = [
        Pollutant::Pm25,
        Pollutant::Pm10,
        Pollutant::So2,
        Pollutant::No2,
        Pollutant::Co,
        Pollutant::O3,
    ];

    pub fn label(self) -> &'static str {
        // ---
        match self {
            Pollutant::Pm25 => "PM2.5",
            Pollutant::Pm10 => "PM10",
            Pollutant::So2 => "SO2",
            Pollutant::No2 => "NO2",
            Pollutant::Co => "CO",
            Pollutant::O3 => "O3",
        }
    }
}

/// Turn a partition slug into a display name.
///
/// Underscores become spaces and each word is capitalised, except the
/// connector words in [`CONNECTOR_WORDS`] which stay lower-case when they are
/// not the first word. Runs of whitespace collapse to a single space.
///
/// ```
/// use airquality_pipeline::pipeline::metrics::format_location_name;
///
/// assert_eq!(format_location_name("san_juan_de_lurigancho"), "San Juan de Lurigancho");
/// assert_eq!(format_location_name("el_alto"), "El Alto");
/// ```
pub fn format_location_name(name: &str) -> String {
    // ---
    name.replace('_', " ")
        .split_whitespace()
        .enumerate()
        .map(|(position, word)| {
            let lower = word.to_lowercase();
            if position > 0 && CONNECTOR_WORDS.contains(&lower.as_str()) {
                lower
            } else {
                capitalize(&lower)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Name of the pollutant with the highest concentration.
///
/// Nulls count as zero; exact ties go to the earlier species in
/// [`Pollutant::ALL`] order, so an all-zero input yields `"PM2.5"`.
pub fn prominent_pollutant(
    pm25: Option<f64>,
    pm10: Option<f64>,
    so2: Option<f64>,
    no2: Option<f64>,
    co: Option<f64>,
    o3: Option<f64>,
) -> &'static str {
    // ---
    let values = [pm25, pm10, so2, no2, co, o3].map(|v| v.unwrap_or(0.0));

    let mut best = 0;
    for (index, value) in values.iter().enumerate().skip(1) {
        if *value > values[best] {
            best = index;
        }
    }

    Pollutant::ALL[best].label()
}

/// Coverage signal in `0..=3`.
///
/// One point when either particulate fraction is measured above zero, plus
/// one point per measured gaseous species above zero, capped at two.
pub fn aqi_criteria_met(
    pm25: Option<f64>,
    pm10: Option<f64>,
    so2: Option<f64>,
    no2: Option<f64>,
    co: Option<f64>,
    o3: Option<f64>,
) -> u8 {
    // ---
    let measured = |v: Option<f64>| v.is_some_and(|v| v > 0.0);

    let pm_count = u8::from(measured(pm25) || measured(pm10));
    let non_pm_count = [so2, no2, co, o3]
        .into_iter()
        .filter(|v| measured(*v))
        .count()
        .min(2) as u8;

    pm_count + non_pm_count
}

/// Greatest pollutant concentration, gated on full criteria coverage.
///
/// Returns the maximum of the six values (nulls as zero) when
/// [`aqi_criteria_met`] reaches 3, and `0.0` otherwise. This is a proxy index,
/// not the EPA breakpoint interpolation.
pub fn calculate_custom_aqi(
    pm25: Option<f64>,
    pm10: Option<f64>,
    so2: Option<f64>,
    no2: Option<f64>,
    co: Option<f64>,
    o3: Option<f64>,
) -> f64 {
    // ---
    if aqi_criteria_met(pm25, pm10, so2, no2, co, o3) < 3 {
        return 0.0;
    }

    [pm25, pm10, so2, no2, co, o3]
        .into_iter()
        .map(|v| v.unwrap_or(0.0))
        .fold(0.0, f64::max)
}

/// US EPA index (1-6) to its category label.
pub fn epa_category(index: Option<f64>) -> &'static str {
    // ---
    match whole_index(index) {
        Some(1) => "Good",
        Some(2) => "Moderate",
        Some(3) => "Unhealthy for Sensitive Groups",
        Some(4) => "Unhealthy",
        Some(5) => "Very Unhealthy",
        Some(6) => "Hazardous",
        _ => UNKNOWN_CATEGORY,
    }
}

/// UK DEFRA index (1-10) to its band label.
pub fn defra_category(index: Option<f64>) -> &'static str {
    // ---
    match whole_index(index) {
        Some(1..=3) => "Low",
        Some(4..=6) => "Moderate",
        Some(7..=9) => "High",
        Some(10) => "Very High",
        _ => UNKNOWN_CATEGORY,
    }
}

fn whole_index(index: Option<f64>) -> Option<i64> {
    index.filter(|v| v.fract() == 0.0).map(|v| v as i64)
}

/// A measurement is valid when it has a particulate reading and full
/// criteria coverage.
pub fn is_valid_measurement(pollutants: &Pollutants) -> bool {
    // ---
    if pollutants.pm2_5.is_none() && pollutants.pm10.is_none() {
        return false;
    }
    pollutants.criteria_count() >= 3
}

impl Pollutants {
    // ---
    pub fn prominent(&self) -> &'static str {
        prominent_pollutant(self.pm2_5, self.pm10, self.so2, self.no2, self.co, self.o3)
    }

    pub fn criteria_count(&self) -> u8 {
        aqi_criteria_met(self.pm2_5, self.pm10, self.so2, self.no2, self.co, self.o3)
    }

    pub fn custom_aqi(&self) -> f64 {
        calculate_custom_aqi(self.pm2_5, self.pm10, self.so2, self.no2, self.co, self.o3)
    }
}
