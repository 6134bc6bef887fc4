use chrono::{Datelike, NaiveDate};

use crate::config::FuzzyDateTolerance;

/// Swap the month and day of a `NaiveDate`. Returns `None` if the swapped value is invalid.
pub fn swap_month_day(date: NaiveDate) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(date.year(), date.day(), date.month())
}

fn compact(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// True when the YYYYMMDD forms differ only by one swapped pair of neighbouring digits.
pub fn is_adjacent_transposition(a: NaiveDate, b: NaiveDate) -> bool {
    let (sa, sb) = (compact(a), compact(b));
    // Two differing positions fixed by a single transposition
    matches!(strsim::hamming(&sa, &sb), Ok(2)) && strsim::osa_distance(&sa, &sb) == 1
}

pub fn is_day_month_swap(a: NaiveDate, b: NaiveDate) -> bool {
    a != b && swap_month_day(a) == Some(b)
}

pub fn within_days(a: NaiveDate, b: NaiveDate, max_day_difference: u32) -> bool {
    max_day_difference > 0
        && a.year() == b.year()
        && a.month() == b.month()
        && a.day().abs_diff(b.day()) <= max_day_difference
}

/// Whether two distinct dates are close enough to be the same birth date entered with a typo.
/// Identical dates are not "close": they are handled by the exact strategies.
pub fn dates_close(a: NaiveDate, b: NaiveDate, tolerance: &FuzzyDateTolerance) -> bool {
    if a == b {
        return false;
    }
    (tolerance.adjacent_transposition && is_adjacent_transposition(a, b))
        || (tolerance.day_month_swap && is_day_month_swap(a, b))
        || within_days(a, b, tolerance.max_day_difference)
}
