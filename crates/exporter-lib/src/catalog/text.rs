//! Numeric-with-unit extraction for free-text catalog attributes

use regex::Regex;
use std::sync::OnceLock;

/// Mbit/s assigned to the "Low" network performance tier
pub const NETWORK_LOW_MBPS: f64 = 50.0;

/// Mbit/s assigned to the "Moderate" network performance tier
pub const NETWORK_MODERATE_MBPS: f64 = 300.0;

/// Mbit/s assigned to the "High" network performance tier
pub const NETWORK_HIGH_MBPS: f64 = 1024.0;

fn number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b\d+(\.\d+)?\b").expect("valid number pattern"))
}

/// First decimal number in a free-text attribute ("3.75 GiB" -> 3.75)
pub fn leading_number(text: &str) -> Option<f64> {
    number_pattern()
        .find(text)
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

/// Available memory in GB from the catalog's memory attribute
pub fn parse_memory_gb(text: &str) -> Option<f64> {
    leading_number(text)
}

/// Network performance in Mbit/s
///
/// Named tiers map to fixed values; anything else is read as Gbit/s.
pub fn parse_network_mbps(text: &str) -> Option<f64> {
    if text.contains("Moderate") {
        Some(NETWORK_MODERATE_MBPS)
    } else if text.contains("High") {
        Some(NETWORK_HIGH_MBPS)
    } else if text.contains("Low") {
        Some(NETWORK_LOW_MBPS)
    } else {
        leading_number(text).map(|gbit| gbit * 1024.0)
    }
}
