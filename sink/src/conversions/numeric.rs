use std::str::FromStr;

use bigdecimal::num_bigint::BigInt;
use bigdecimal::num_traits::{ToPrimitive, Zero};
use bigdecimal::BigDecimal;
use config::shared::RoundingMode;

use crate::error::{ErrorKind, SinkResult};
use crate::types::{Cell, IntegerType};
use crate::{bail, sink_error};

/// Decimal and grouping separators of a locale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberLocale {
    pub decimal_separator: char,
    pub grouping_separator: char,
}

impl NumberLocale {
    pub const US: NumberLocale = NumberLocale::new('.', ',');

    pub const fn new(decimal_separator: char, grouping_separator: char) -> Self {
        Self {
            decimal_separator,
            grouping_separator,
        }
    }

    /// Resolves a locale tag such as `en_US`, `fr-FR` or `de`.
    pub fn parse(tag: &str) -> SinkResult<Self> {
        let normalized = tag.trim().replace('-', "_");
        let mut parts = normalized.split('_');
        let language = parts.next().unwrap_or_default().to_lowercase();
        let country = parts.next().unwrap_or_default().to_uppercase();

        let locale = match (language.as_str(), country.as_str()) {
            ("de", "CH") => NumberLocale::new('.', '\''),
            ("en" | "ja" | "zh" | "ko" | "th" | "he" | "root", _) => NumberLocale::US,
            ("fr" | "ru" | "pl" | "cs" | "sk" | "sv" | "fi" | "nb" | "no" | "uk", _) => {
                NumberLocale::new(',', '\u{a0}')
            }
            ("de" | "es" | "it" | "pt" | "nl" | "da" | "tr" | "id" | "el", _) => {
                NumberLocale::new(',', '.')
            }
            _ => bail!(
                ErrorKind::ConfigError,
                "Unsupported locale",
                format!("`{tag}` has no known number symbols")
            ),
        };

        Ok(locale)
    }

    fn is_grouping(&self, ch: char) -> bool {
        if self.grouping_separator.is_whitespace() {
            ch.is_whitespace() || ch == '\u{202f}'
        } else {
            ch == self.grouping_separator
        }
    }
}

/// Locale-aware number parsing and formatting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberFormat {
    pub locale: NumberLocale,
    pub grouping: bool,
    pub rounding_mode: RoundingMode,
    pub max_fraction_digits: u32,
    pub format_numbers: bool,
}

impl NumberFormat {
    /// Parses a decimal number, accepting grouping separators when grouping is enabled.
    ///
    /// Returns [`None`] when the text is not a number in this locale.
    pub fn parse(&self, text: &str) -> Option<BigDecimal> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }

        let mut normalized = String::with_capacity(trimmed.len());
        for ch in trimmed.chars() {
            if ch == self.locale.decimal_separator {
                normalized.push('.');
            } else if self.grouping && self.locale.is_grouping(ch) {
                continue;
            } else if ch.is_ascii_digit() || matches!(ch, '-' | '+' | 'e' | 'E') {
                normalized.push(ch);
            } else {
                return None;
            }
        }

        let normalized = normalized.strip_prefix('+').unwrap_or(&normalized);
        if !normalized.starts_with(|ch: char| ch.is_ascii_digit() || ch == '-' || ch == '.') {
            return None;
        }

        BigDecimal::from_str(normalized).ok()
    }

    /// Formats a number.
    ///
    /// Plain notation is used unless `format_numbers` is set, in which case the value is rounded
    /// to `max_fraction_digits` and rendered with the locale's separators.
    pub fn format(&self, value: &BigDecimal) -> SinkResult<String> {
        if !self.format_numbers {
            return Ok(value.to_plain_string());
        }

        let rounded = self.round(value)?;
        let plain = rounded.to_plain_string();
        let (negative, digits) = match plain.strip_prefix('-') {
            Some(digits) => (true, digits),
            None => (false, plain.as_str()),
        };
        let (integer, fraction) = digits.split_once('.').unwrap_or((digits, ""));
        let fraction = fraction.trim_end_matches('0');

        let mut formatted = String::with_capacity(plain.len() + integer.len() / 3);
        if negative && (integer.chars().any(|ch| ch != '0') || !fraction.is_empty()) {
            formatted.push('-');
        }
        for (index, ch) in integer.chars().enumerate() {
            let remaining = integer.len() - index;
            if self.grouping && index > 0 && remaining % 3 == 0 {
                formatted.push(self.locale.grouping_separator);
            }
            formatted.push(ch);
        }
        if !fraction.is_empty() {
            formatted.push(self.locale.decimal_separator);
            formatted.push_str(fraction);
        }

        Ok(formatted)
    }

    fn round(&self, value: &BigDecimal) -> SinkResult<BigDecimal> {
        let scale = self.max_fraction_digits as i64;
        let mode = match self.rounding_mode {
            RoundingMode::Up => bigdecimal::RoundingMode::Up,
            RoundingMode::Down => bigdecimal::RoundingMode::Down,
            RoundingMode::Ceiling => bigdecimal::RoundingMode::Ceiling,
            RoundingMode::Floor => bigdecimal::RoundingMode::Floor,
            RoundingMode::HalfUp => bigdecimal::RoundingMode::HalfUp,
            RoundingMode::HalfDown => bigdecimal::RoundingMode::HalfDown,
            RoundingMode::HalfEven | RoundingMode::Unnecessary => {
                bigdecimal::RoundingMode::HalfEven
            }
        };

        let rounded = value.with_scale_round(scale, mode);
        if self.rounding_mode == RoundingMode::Unnecessary && rounded != *value {
            bail!(
                ErrorKind::ConversionError,
                "Rounding necessary",
                format!("{value} has more than {scale} fraction digits")
            );
        }

        Ok(rounded)
    }
}

/// Largest number of decimal digits a number may span, counting the zeros implied by its
/// exponent.
pub const MAX_NUMBER_DIGITS: u64 = 4096;

/// Largest number of integer digits of any fixed-width integer type.
const MAX_FIXED_INTEGER_DIGITS: u64 = 20;

/// Rejects numbers whose exponent would expand them beyond [`MAX_NUMBER_DIGITS`].
///
/// Runs before anything rescales the number.
pub fn check_magnitude(value: &BigDecimal) -> SinkResult<()> {
    let (_, scale) = value.as_bigint_and_exponent();
    let span = value.digits().saturating_add(scale.unsigned_abs());
    if span > MAX_NUMBER_DIGITS {
        bail!(
            ErrorKind::ValueOutOfRange,
            "Value out of range",
            format!(
                "a number of {} digits with exponent {} spans more than {MAX_NUMBER_DIGITS} digits",
                value.digits(),
                -scale
            )
        );
    }

    Ok(())
}

/// Number of digits before the decimal point, zero for values below one.
fn integer_digits(value: &BigDecimal) -> u64 {
    let (_, scale) = value.as_bigint_and_exponent();
    let digits = i128::from(value.digits()) - i128::from(scale);
    u64::try_from(digits.max(0)).unwrap_or(u64::MAX)
}

/// Returns `true` when the number has no fractional part.
pub fn is_integral(value: &BigDecimal) -> bool {
    let (digits, scale) = value.as_bigint_and_exponent();
    if scale <= 0 || digits.is_zero() {
        return true;
    }

    let text = digits.to_str_radix(10);
    let trailing_zeros = text.bytes().rev().take_while(|digit| *digit == b'0').count();
    trailing_zeros as u64 >= scale.unsigned_abs()
}

/// Narrows a number into a fixed-width integer cell.
///
/// Fractional values and values outside the type's range are rejected, never rounded or
/// wrapped.
pub fn to_integer_cell(value: &BigDecimal, integer: IntegerType) -> SinkResult<Cell> {
    check_magnitude(value)?;
    if !is_integral(value) {
        bail!(
            ErrorKind::ConversionError,
            "Could not convert number to integer",
            format!("{value} has a fractional part and cannot be converted to {integer}")
        );
    }

    let narrowed = if integer_digits(value) <= MAX_FIXED_INTEGER_DIGITS {
        to_varint(value)?.to_i128()
    } else {
        None
    };
    let narrowed = narrowed
        .filter(|narrowed| integer.contains(*narrowed))
        .ok_or_else(|| {
            sink_error!(
                ErrorKind::ValueOutOfRange,
                "Value out of range",
                format!(
                    "{value} is outside [{}, {}] for {integer}",
                    integer.min(),
                    integer.max()
                )
            )
        })?;

    let cell = match (integer.signed, integer.bits) {
        (true, 8) => Cell::I8(narrowed as i8),
        (true, 16) => Cell::I16(narrowed as i16),
        (true, 32) => Cell::I32(narrowed as i32),
        (true, 64) => Cell::I64(narrowed as i64),
        (false, 8) => Cell::U8(narrowed as u8),
        (false, 16) => Cell::U16(narrowed as u16),
        (false, 32) => Cell::U32(narrowed as u32),
        (false, 64) => Cell::U64(narrowed as u64),
        _ => bail!(
            ErrorKind::UnsupportedConversion,
            "Unsupported integer width",
            format!("{integer} has no native representation")
        ),
    };

    Ok(cell)
}

pub fn to_varint(value: &BigDecimal) -> SinkResult<BigInt> {
    check_magnitude(value)?;
    if !is_integral(value) {
        bail!(
            ErrorKind::ConversionError,
            "Could not convert number to varint",
            format!("{value} has a fractional part")
        );
    }

    let (digits, scale) = value.with_scale(0).into_bigint_and_exponent();
    debug_assert_eq!(scale, 0);
    Ok(digits)
}

pub fn to_f64(value: &BigDecimal) -> SinkResult<f64> {
    check_magnitude(value)?;
    match value.to_f64().filter(|converted| converted.is_finite()) {
        Some(converted) => Ok(converted),
        None => bail!(
            ErrorKind::ValueOutOfRange,
            "Value out of range",
            format!("{value} does not fit in a double")
        ),
    }
}

pub fn to_f32(value: &BigDecimal) -> SinkResult<f32> {
    check_magnitude(value)?;
    match value.to_f32().filter(|converted| converted.is_finite()) {
        Some(converted) => Ok(converted),
        None => bail!(
            ErrorKind::ValueOutOfRange,
            "Value out of range",
            format!("{value} does not fit in a float")
        ),
    }
}

/// Narrows a double into a float.
///
/// Finite values beyond the float range are rejected. Infinities and NaN are kept.
pub fn narrow_f64(value: f64) -> SinkResult<f32> {
    if value.is_finite() && value.abs() > f32::MAX as f64 {
        bail!(
            ErrorKind::ValueOutOfRange,
            "Value out of range",
            format!("{value} does not fit in a float")
        );
    }

    Ok(value as f32)
}

/// Converts a float into a decimal using its shortest round-trip representation.
pub fn decimal_from_f64(value: f64) -> SinkResult<BigDecimal> {
    if !value.is_finite() {
        bail!(
            ErrorKind::ConversionError,
            "Could not convert float to decimal",
            format!("{value} is not a finite number")
        );
    }

    Ok(BigDecimal::from_str(&value.to_string())?)
}

/// Parses the special float literals `NaN`, `Infinity` and `-Infinity`.
pub fn parse_special_float(text: &str) -> Option<f64> {
    match text.trim() {
        "NaN" => Some(f64::NAN),
        "Infinity" | "+Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        _ => None,
    }
}

/// Returns the numeric value of a number cell.
pub fn cell_to_decimal(cell: &Cell) -> Option<BigDecimal> {
    match cell {
        Cell::I8(value) => Some(BigDecimal::from(*value)),
        Cell::I16(value) => Some(BigDecimal::from(*value)),
        Cell::I32(value) => Some(BigDecimal::from(*value)),
        Cell::I64(value) => Some(BigDecimal::from(*value)),
        Cell::U8(value) => Some(BigDecimal::from(*value)),
        Cell::U16(value) => Some(BigDecimal::from(*value)),
        Cell::U32(value) => Some(BigDecimal::from(*value)),
        Cell::U64(value) => Some(BigDecimal::from(*value)),
        Cell::VarInt(value) => Some(BigDecimal::from(value.clone())),
        Cell::F32(value) => decimal_from_f64(*value as f64).ok(),
        Cell::F64(value) => decimal_from_f64(*value).ok(),
        Cell::Decimal(value) => Some(value.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn us_format() -> NumberFormat {
        NumberFormat {
            locale: NumberLocale::US,
            grouping: true,
            rounding_mode: RoundingMode::HalfEven,
            max_fraction_digits: 2,
            format_numbers: false,
        }
    }

    fn decimal(text: &str) -> BigDecimal {
        BigDecimal::from_str(text).unwrap()
    }

    #[test]
    fn parses_grouped_numbers() {
        let format = us_format();

        assert_eq!(format.parse("1,234.56"), Some(decimal("1234.56")));
        assert_eq!(format.parse("-12"), Some(decimal("-12")));
        assert_eq!(format.parse("+7"), Some(decimal("7")));
        assert_eq!(format.parse("1E3"), Some(decimal("1000")));
        assert_eq!(format.parse(""), None);
        assert_eq!(format.parse("TRUE"), None);
        assert_eq!(format.parse("2000-01-01T00:00:00Z"), None);
    }

    #[test]
    fn parses_locale_separators() {
        let format = NumberFormat {
            locale: NumberLocale::parse("fr_FR").unwrap(),
            ..us_format()
        };

        assert_eq!(format.parse("1\u{a0}234,5"), Some(decimal("1234.5")));
        assert_eq!(format.parse("1 234,5"), Some(decimal("1234.5")));

        let german = NumberFormat {
            locale: NumberLocale::parse("de-DE").unwrap(),
            ..us_format()
        };
        assert_eq!(german.parse("1.234,5"), Some(decimal("1234.5")));
    }

    #[test]
    fn grouping_disabled_rejects_separators() {
        let format = NumberFormat {
            grouping: false,
            ..us_format()
        };

        assert_eq!(format.parse("1,234"), None);
    }

    #[test]
    fn formats_plain_and_grouped() {
        let plain = us_format();
        assert_eq!(plain.format(&decimal("1234567.891")).unwrap(), "1234567.891");

        let formatted = NumberFormat {
            format_numbers: true,
            ..us_format()
        };
        assert_eq!(formatted.format(&decimal("1234567.891")).unwrap(), "1,234,567.89");
        assert_eq!(formatted.format(&decimal("-0.125")).unwrap(), "-0.12");
        assert_eq!(formatted.format(&decimal("100")).unwrap(), "100");
    }

    #[test]
    fn unnecessary_rounding_fails_when_digits_are_lost() {
        let format = NumberFormat {
            format_numbers: true,
            rounding_mode: RoundingMode::Unnecessary,
            ..us_format()
        };

        assert_eq!(format.format(&decimal("1.5")).unwrap(), "1.5");
        assert_eq!(
            format.format(&decimal("1.555")).unwrap_err().kind(),
            ErrorKind::ConversionError
        );
    }

    #[test]
    fn integer_narrowing_checks_range() {
        assert_eq!(
            to_integer_cell(&decimal("127"), IntegerType::TINYINT).unwrap(),
            Cell::I8(127)
        );
        assert_eq!(
            to_integer_cell(&decimal("-128"), IntegerType::TINYINT).unwrap(),
            Cell::I8(-128)
        );
        assert_eq!(
            to_integer_cell(&decimal("128"), IntegerType::TINYINT)
                .unwrap_err()
                .kind(),
            ErrorKind::ValueOutOfRange
        );
        assert_eq!(
            to_integer_cell(&decimal("-129"), IntegerType::TINYINT)
                .unwrap_err()
                .kind(),
            ErrorKind::ValueOutOfRange
        );
        assert_eq!(
            to_integer_cell(&decimal("1.2"), IntegerType::INT)
                .unwrap_err()
                .kind(),
            ErrorKind::ConversionError
        );
        assert_eq!(
            to_integer_cell(&decimal("1.0"), IntegerType::INT).unwrap(),
            Cell::I32(1)
        );
    }

    #[test]
    fn float_narrowing_rejects_overflow() {
        assert_eq!(to_f32(&decimal("1.5")).unwrap(), 1.5);
        assert_eq!(
            to_f32(&decimal("1e40")).unwrap_err().kind(),
            ErrorKind::ValueOutOfRange
        );
        assert_eq!(to_f64(&decimal("1e40")).unwrap(), 1e40);

        assert_eq!(narrow_f64(0.5).unwrap(), 0.5);
        assert_eq!(narrow_f64(f32::MAX as f64).unwrap(), f32::MAX);
        assert_eq!(narrow_f64(f64::NEG_INFINITY).unwrap(), f32::NEG_INFINITY);
        assert!(narrow_f64(f64::NAN).unwrap().is_nan());
        for value in [1e40, -1e40, f64::MAX] {
            assert_eq!(narrow_f64(value).unwrap_err().kind(), ErrorKind::ValueOutOfRange);
        }
    }

    #[test]
    fn integrality_ignores_trailing_fraction_zeros() {
        assert!(is_integral(&decimal("12.000")));
        assert!(is_integral(&decimal("1.2e3")));
        assert!(is_integral(&decimal("0.0")));
        assert!(!is_integral(&decimal("12.010")));
        assert!(!is_integral(&decimal("1e-3")));
    }

    #[test]
    fn huge_exponents_are_rejected_before_rescaling() {
        let format = us_format();
        let huge = format.parse("1e20000000").unwrap();
        let tiny = format.parse("1e-20000000").unwrap();

        for value in [&huge, &tiny] {
            assert_eq!(check_magnitude(value).unwrap_err().kind(), ErrorKind::ValueOutOfRange);
            assert_eq!(
                to_integer_cell(value, IntegerType::TINYINT).unwrap_err().kind(),
                ErrorKind::ValueOutOfRange
            );
            assert_eq!(to_varint(value).unwrap_err().kind(), ErrorKind::ValueOutOfRange);
            assert_eq!(to_f64(value).unwrap_err().kind(), ErrorKind::ValueOutOfRange);
        }

        assert!(check_magnitude(&decimal("1e4000")).is_ok());
        assert_eq!(
            to_integer_cell(&decimal("1e4000"), IntegerType::BIGINT)
                .unwrap_err()
                .kind(),
            ErrorKind::ValueOutOfRange
        );
        assert_eq!(to_varint(&decimal("1e4000")).unwrap().to_string().len(), 4001);
    }

    #[test]
    fn varint_keeps_full_precision() {
        let value = decimal("123456789012345678901234567890");
        assert_eq!(
            to_varint(&value).unwrap().to_string(),
            "123456789012345678901234567890"
        );
    }
}
