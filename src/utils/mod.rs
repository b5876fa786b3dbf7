//! Utility functions for money rounding, date ranges, and formatting
//!
//! This module provides centralized helpers for consistent display and
//! deterministic rounding of currency values throughout the engine.

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};

/// Currency symbol options for formatting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrencySymbol {
    /// Include "$" prefix (US dollar)
    Usd,
    /// No currency symbol (for table cells, calculations display)
    None,
}

/// Round to cents using half-up (midpoint away from zero) rounding.
///
/// Applied at presentation boundaries only; internal arithmetic keeps full
/// Decimal precision so conservation checks stay exact.
///
/// # Examples
/// ```
/// use taxlot::utils::round_money;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(round_money(dec!(1.005)), dec!(1.01));
/// assert_eq!(round_money(dec!(-1.005)), dec!(-1.01));
/// assert_eq!(round_money(dec!(2.674999)), dec!(2.67));
/// ```
pub fn round_money(value: Decimal) -> Decimal {
    round_to(value, 2)
}

/// Half-up rounding to an arbitrary number of decimal places.
pub fn round_to(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

/// First and last calendar day of a tax year.
///
/// # Examples
/// ```
/// use taxlot::utils::year_bounds;
/// use chrono::NaiveDate;
///
/// let (start, end) = year_bounds(2024);
/// assert_eq!(start, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
/// assert_eq!(end, NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
/// ```
pub fn year_bounds(year: i32) -> (NaiveDate, NaiveDate) {
    (
        NaiveDate::from_ymd_opt(year, 1, 1).expect("valid year start"),
        NaiveDate::from_ymd_opt(year, 12, 31).expect("valid year end"),
    )
}

/// Core formatting function with full control over output.
///
/// Formats a Decimal value using US locale conventions:
/// - Thousands separator: `,` (comma)
/// - Decimal separator: `.` (period)
///
/// # Arguments
/// * `value` - The decimal value to format
/// * `width` - Minimum width for padding (0 for no padding, right-aligned)
/// * `symbol` - Whether to include currency symbol
///
/// # Examples
/// ```
/// use taxlot::utils::{format_currency_with_width, CurrencySymbol};
/// use rust_decimal_macros::dec;
///
/// assert_eq!(
///     format_currency_with_width(dec!(1234.56), 0, CurrencySymbol::Usd),
///     "$1,234.56"
/// );
///
/// assert_eq!(
///     format_currency_with_width(dec!(1234), 15, CurrencySymbol::None),
///     "       1,234.00"
/// );
/// ```
pub fn format_currency_with_width(value: Decimal, width: usize, symbol: CurrencySymbol) -> String {
    let rounded = round_money(value);
    let is_negative = rounded < Decimal::ZERO;
    let abs_value = rounded.abs();

    let formatted = format!("{:.2}", abs_value);
    let parts: Vec<&str> = formatted.split('.').collect();

    let integer_part = parts[0];
    let decimal_part = parts.get(1).unwrap_or(&"00");

    // Add thousands separators (,) to integer part
    let with_separators: String = integer_part
        .chars()
        .rev()
        .enumerate()
        .flat_map(|(i, c)| {
            if i > 0 && i % 3 == 0 {
                vec![',', c]
            } else {
                vec![c]
            }
        })
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    let sign = if is_negative { "-" } else { "" };
    let prefix = match symbol {
        CurrencySymbol::Usd => "$",
        CurrencySymbol::None => "",
    };

    let result = format!("{}{}{}.{}", sign, prefix, with_separators, decimal_part);

    if width > 0 && result.len() < width {
        format!("{:>width$}", result, width = width)
    } else {
        result
    }
}

// ============ Convenience functions ============

/// Format as US dollars with symbol: "$1,234.56"
///
/// # Examples
/// ```
/// use taxlot::utils::format_currency;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(format_currency(dec!(1234.56)), "$1,234.56");
/// assert_eq!(format_currency(dec!(-500)), "-$500.00");
/// ```
pub fn format_currency(value: Decimal) -> String {
    format_currency_with_width(value, 0, CurrencySymbol::Usd)
}

/// Format number only (no symbol): "1,234.56"
///
/// # Examples
/// ```
/// use taxlot::utils::format_decimal;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(format_decimal(dec!(1234.56)), "1,234.56");
/// ```
pub fn format_decimal(value: Decimal) -> String {
    format_currency_with_width(value, 0, CurrencySymbol::None)
}

/// Format a quantity without forcing cents: "100", "12.5"
pub fn format_quantity(value: Decimal) -> String {
    value.normalize().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_money_half_up() {
        assert_eq!(round_money(dec!(1.005)), dec!(1.01));
        assert_eq!(round_money(dec!(1.004)), dec!(1.00));
        assert_eq!(round_money(dec!(-1.005)), dec!(-1.01));
        assert_eq!(round_money(dec!(0)), dec!(0));
    }

    #[test]
    fn test_round_to_other_scales() {
        assert_eq!(round_to(dec!(1.23456), 4), dec!(1.2346));
        assert_eq!(round_to(dec!(1.23456), 0), dec!(1));
    }

    #[test]
    fn test_year_bounds() {
        use chrono::Datelike;
        let (start, end) = year_bounds(2024);
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
        // Leap years do not change the calendar bounds
        let (start, end) = year_bounds(2023);
        assert_eq!(start.year(), 2023);
        assert_eq!(end, NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
    }

    #[test]
    fn test_format_currency_basic() {
        assert_eq!(format_currency(dec!(1234.56)), "$1,234.56");
        assert_eq!(format_currency(dec!(0.99)), "$0.99");
        assert_eq!(format_currency(dec!(1000000)), "$1,000,000.00");
    }

    #[test]
    fn test_format_currency_small_values() {
        assert_eq!(format_currency(dec!(0)), "$0.00");
        assert_eq!(format_currency(dec!(0.01)), "$0.01");
        assert_eq!(format_currency(dec!(1)), "$1.00");
        assert_eq!(format_currency(dec!(999.99)), "$999.99");
    }

    #[test]
    fn test_format_currency_negative() {
        assert_eq!(format_currency(dec!(-1234.56)), "-$1,234.56");
        assert_eq!(format_currency(dec!(-0.01)), "-$0.01");
        assert_eq!(format_currency(dec!(-1000000)), "-$1,000,000.00");
    }

    #[test]
    fn test_format_decimal() {
        assert_eq!(format_decimal(dec!(1234.56)), "1,234.56");
        assert_eq!(format_decimal(dec!(0)), "0.00");
        assert_eq!(format_decimal(dec!(-500)), "-500.00");
    }

    #[test]
    fn test_format_with_width() {
        let result = format_currency_with_width(dec!(100), 15, CurrencySymbol::Usd);
        assert_eq!(result.len(), 15);
        assert_eq!(result, "        $100.00");

        let result2 = format_currency_with_width(dec!(1234.56), 12, CurrencySymbol::None);
        assert_eq!(result2.len(), 12);
        assert_eq!(result2, "    1,234.56");
    }

    #[test]
    fn test_format_rounds_rather_than_truncates() {
        assert_eq!(format_currency(dec!(1.999)), "$2.00");
        assert_eq!(format_currency(dec!(1.234)), "$1.23");
    }

    #[test]
    fn test_format_quantity_drops_trailing_zeros() {
        assert_eq!(format_quantity(dec!(100.00)), "100");
        assert_eq!(format_quantity(dec!(12.50)), "12.5");
    }
}
