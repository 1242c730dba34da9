//! Calendar arithmetic for pledge terms and interest periods
//!
//! Pledges are contracted in calendar months. Adding months clamps to the
//! last day of the target month (31 Jan + 1 month = 29 Feb in a leap year),
//! matching how due dates are printed on pledge tickets.

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

/// Rule for charging a partially elapsed month
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonthRounding {
    /// Any started month is charged in full (1 day into month 2 owes 2 months)
    Ceiling,
    /// Only completed months are charged
    #[default]
    Floor,
}

/// Add calendar months, clamping to month end
///
/// # Example
/// ```
/// use chrono::NaiveDate;
/// use pawnshop_core_rs::core::calendar::add_months;
///
/// let jan31 = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
/// assert_eq!(add_months(jan31, 1), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
/// ```
pub fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_add_months(Months::new(months))
        .unwrap_or(NaiveDate::MAX)
}

/// Add calendar days
pub fn add_days(date: NaiveDate, days: u32) -> NaiveDate {
    date.checked_add_days(Days::new(days as u64))
        .unwrap_or(NaiveDate::MAX)
}

/// Number of completed months between `start` and `end`
///
/// Returns 0 when `end <= start`.
///
/// # Example
/// ```
/// use chrono::NaiveDate;
/// use pawnshop_core_rs::core::calendar::whole_months_between;
///
/// let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
/// let end = NaiveDate::from_ymd_opt(2024, 8, 15).unwrap();
/// assert_eq!(whole_months_between(start, end), 7);
/// ```
pub fn whole_months_between(start: NaiveDate, end: NaiveDate) -> u32 {
    if end <= start {
        return 0;
    }

    let raw = (end.year() - start.year()) * 12 + end.month() as i32 - start.month() as i32;
    let mut months = raw.max(0) as u32;

    // Calendar difference overshoots when the end day-of-month is earlier
    while months > 0 && add_months(start, months) > end {
        months -= 1;
    }

    months
}

/// Elapsed months between `start` and `end` under a rounding rule
///
/// Returns 0 when `end <= start`.
///
/// # Example
/// ```
/// use chrono::NaiveDate;
/// use pawnshop_core_rs::core::calendar::{elapsed_months, MonthRounding};
///
/// let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
/// let one_day_into_month_two = NaiveDate::from_ymd_opt(2024, 2, 2).unwrap();
/// assert_eq!(elapsed_months(start, one_day_into_month_two, MonthRounding::Ceiling), 2);
/// assert_eq!(elapsed_months(start, one_day_into_month_two, MonthRounding::Floor), 1);
/// ```
pub fn elapsed_months(start: NaiveDate, end: NaiveDate, rounding: MonthRounding) -> u32 {
    let whole = whole_months_between(start, end);
    match rounding {
        MonthRounding::Floor => whole,
        MonthRounding::Ceiling => {
            if add_months(start, whole) < end {
                whole + 1
            } else {
                whole
            }
        }
    }
}

/// Chargeable months: elapsed months with a minimum of one
pub fn chargeable_months(start: NaiveDate, end: NaiveDate, rounding: MonthRounding) -> u32 {
    elapsed_months(start, end, rounding).max(1)
}

/// First day of the `n`-th month of a contract starting on `start` (1-indexed)
///
/// Month 1 starts on `start` itself.
pub fn month_start(start: NaiveDate, n: u32) -> NaiveDate {
    add_months(start, n.saturating_sub(1))
}
