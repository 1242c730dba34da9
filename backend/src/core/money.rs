//! Integer money, weight, and basis-point arithmetic
//!
//! CRITICAL: All money values are i64 minor units (cents), all weights are
//! i64 milligrams, and all percentages are i64 basis points (1% = 100 bps).
//!
//! Every scaled product is computed in i128 and divided once with half-up
//! rounding (half away from zero), so results are exact and reproducible
//! across platforms.

/// Basis points in 100%
pub const BPS_SCALE: i64 = 10_000;

/// Milligrams in one gram
pub const MG_PER_GRAM: i64 = 1_000;

/// Divide with half-up rounding (half away from zero)
///
/// A zero `denominator` is a caller bug: it trips a debug assertion and
/// yields 0 in release builds.
///
/// # Example
/// ```
/// use pawnshop_core_rs::core::money::div_round_half_up;
///
/// assert_eq!(div_round_half_up(5, 2), 3);   // 2.5 -> 3
/// assert_eq!(div_round_half_up(-5, 2), -3); // -2.5 -> -3
/// assert_eq!(div_round_half_up(7, 3), 2);   // 2.33 -> 2
/// ```
pub fn div_round_half_up(numerator: i128, denominator: i128) -> i64 {
    // Inputs are bounded by i64 domain values scaled by at most 10_000
    // and divided back down, so the quotient fits in i64.
    round_half_up_wide(numerator, denominator) as i64
}

fn round_half_up_wide(numerator: i128, denominator: i128) -> i128 {
    debug_assert!(denominator != 0, "denominator must be non-zero");
    if denominator == 0 {
        return 0;
    }

    let (num, den) = if denominator < 0 {
        (-numerator, -denominator)
    } else {
        (numerator, denominator)
    };

    let quotient = num / den;
    let remainder = num % den;

    if remainder.abs() * 2 >= den {
        quotient + num.signum()
    } else {
        quotient
    }
}

/// Apply a basis-point percentage to an amount, rounding half-up
///
/// # Example
/// ```
/// use pawnshop_core_rs::core::money::apply_bps;
///
/// // 75% of 1,234.57 = 925.9275 -> 925.93
/// assert_eq!(apply_bps(123_457, 7_500), 92_593);
/// // 2% monthly interest on 1,000.00
/// assert_eq!(apply_bps(100_000, 200), 2_000);
/// ```
pub fn apply_bps(amount: i64, bps: i64) -> i64 {
    div_round_half_up(amount as i128 * bps as i128, BPS_SCALE as i128)
}

/// Value of a weight at a per-gram price, rounding half-up to the minor unit
///
/// Returns `None` when the value does not fit in i64.
///
/// # Example
/// ```
/// use pawnshop_core_rs::core::money::value_of_weight;
///
/// // 12.345 g at 250.00/g = 3,086.25
/// assert_eq!(value_of_weight(12_345, 25_000), Some(308_625));
/// assert_eq!(value_of_weight(i64::MAX, i64::MAX), None);
/// ```
pub fn value_of_weight(weight_mg: i64, price_per_gram: i64) -> Option<i64> {
    let value = round_half_up_wide(
        weight_mg as i128 * price_per_gram as i128,
        MG_PER_GRAM as i128,
    );
    i64::try_from(value).ok()
}

/// Format minor units as a decimal string (for logs and audit payloads)
///
/// # Example
/// ```
/// use pawnshop_core_rs::core::money::format_minor_units;
///
/// assert_eq!(format_minor_units(14_500), "145.00");
/// assert_eq!(format_minor_units(-5), "-0.05");
/// ```
pub fn format_minor_units(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = (amount as i128).abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}
