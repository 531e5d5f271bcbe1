//! Billing-period arithmetic

use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone, Timelike};
use serde::{Deserialize, Serialize};

/// Hour counts of the billing month an evaluation falls in
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BillingPeriod {
    pub hours_in_month: f64,
    /// Whole hours since the start of the month; the running hour is not counted
    pub hours_elapsed: f64,
}

impl BillingPeriod {
    pub fn at<Tz: TimeZone>(now: &DateTime<Tz>) -> Self {
        let days = days_in_month(now.year(), now.month());
        Self {
            hours_in_month: f64::from(days * 24),
            hours_elapsed: f64::from((now.day() - 1) * 24 + now.hour()),
        }
    }

    pub fn now() -> Self {
        Self::at(&Local::now())
    }

    /// Period with a fixed month length, for evaluations outside wall-clock time
    pub fn with_hours(hours_in_month: f64, hours_elapsed: f64) -> Self {
        Self {
            hours_in_month,
            hours_elapsed,
        }
    }
}

/// Number of days in a calendar month
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };

    match (
        NaiveDate::from_ymd_opt(year, month, 1),
        NaiveDate::from_ymd_opt(next_year, next_month, 1),
    ) {
        (Some(first), Some(next)) => next.signed_duration_since(first).num_days() as u32,
        _ => 30,
    }
}
