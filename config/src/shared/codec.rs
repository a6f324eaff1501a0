use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Unit used for numeric temporal values, TTLs and write timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

/// Rounding applied when numbers are formatted with a maximum number of fraction digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundingMode {
    Up,
    Down,
    Ceiling,
    Floor,
    HalfUp,
    HalfDown,
    HalfEven,
    /// Formatting fails instead of rounding.
    Unnecessary,
}

/// How the time component and node bits of generated time-based UUIDs are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UuidStrategy {
    /// Smallest UUID for the millisecond of the source instant.
    Min,
    /// Largest UUID for the millisecond of the source instant.
    Max,
    /// Same UUID for the same instant on every call.
    Fixed,
    /// Random node bits on every call.
    Random,
}

/// Encoding used when geometries are formatted as text or bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GeometryFormat {
    /// Well-known text, e.g. `POINT (1 2)`.
    Wkt,
    /// GeoJSON geometry document.
    Json,
    /// Well-known binary, rendered through the configured [`BinaryFormat`] in text.
    Wkb,
}

/// Text encoding of binary values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BinaryFormat {
    Base64,
    /// `0x`-prefixed lower-case hex.
    Hex,
}

/// Conversion settings shared by all codecs created for one topic.
///
/// Temporal patterns accept the named constants `CQL_TIMESTAMP`, `ISO_LOCAL_DATE`,
/// `ISO_LOCAL_TIME`, `ISO_LOCAL_DATE_TIME`, `ISO_OFFSET_DATE_TIME` and `ISO_INSTANT`, or a
/// strftime pattern such as `%d/%m/%Y %H:%M`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct CodecConfig {
    /// Locale driving decimal and grouping separators, e.g. `en_US` or `fr_FR`.
    #[serde(default = "default_locale")]
    pub locale: String,
    /// Zone applied to zone-less temporal inputs: `UTC`, a fixed offset like `+01:00` or a region like `Europe/Paris`.
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
    #[serde(default = "default_timestamp")]
    pub timestamp: String,
    #[serde(default = "default_date")]
    pub date: String,
    #[serde(default = "default_time")]
    pub time: String,
    /// Pattern for timestamps without zone information.
    #[serde(default = "default_local_date_time")]
    pub local_date_time: String,
    /// Pattern used when timestamps are formatted back to text.
    #[serde(default = "default_output_timestamp")]
    pub output_timestamp: String,
    /// Unit of numeric temporal values.
    #[serde(default = "default_unit")]
    pub unit: TimeUnit,
    /// Reference instant of numeric temporal values, in RFC 3339 form.
    #[serde(default = "default_epoch")]
    pub epoch: String,
    /// Case-insensitive strings converted to null. The first one is used when formatting null.
    #[serde(default)]
    pub null_strings: Vec<String>,
    /// `true:false` word pairs accepted for booleans. The first pair is used when formatting.
    #[serde(default = "default_boolean_words")]
    pub boolean_words: Vec<String>,
    /// Numbers representing `true` and `false`, in that order.
    #[serde(default = "default_boolean_numbers")]
    pub boolean_numbers: Vec<i64>,
    /// Whether grouping separators are accepted when parsing and emitted when formatting.
    #[serde(default = "default_grouping")]
    pub grouping: bool,
    #[serde(default = "default_rounding_mode")]
    pub rounding_mode: RoundingMode,
    /// Fraction digits kept when `format_numbers` is enabled.
    #[serde(default = "default_max_fraction_digits")]
    pub max_fraction_digits: u32,
    /// Whether numbers are formatted with the locale's separators instead of plain notation.
    #[serde(default)]
    pub format_numbers: bool,
    #[serde(default = "default_uuid_strategy")]
    pub uuid_strategy: UuidStrategy,
    #[serde(default = "default_geometry_format")]
    pub geometry_format: GeometryFormat,
    #[serde(default = "default_binary_format")]
    pub binary_format: BinaryFormat,
}

impl CodecConfig {
    pub const DEFAULT_LOCALE: &'static str = "en_US";
    pub const DEFAULT_TIME_ZONE: &'static str = "UTC";
    pub const DEFAULT_TIMESTAMP: &'static str = "CQL_TIMESTAMP";
    pub const DEFAULT_DATE: &'static str = "ISO_LOCAL_DATE";
    pub const DEFAULT_TIME: &'static str = "ISO_LOCAL_TIME";
    pub const DEFAULT_LOCAL_DATE_TIME: &'static str = "ISO_LOCAL_DATE_TIME";
    pub const DEFAULT_OUTPUT_TIMESTAMP: &'static str = "ISO_OFFSET_DATE_TIME";
    pub const DEFAULT_UNIT: TimeUnit = TimeUnit::Milliseconds;
    pub const DEFAULT_EPOCH: &'static str = "1970-01-01T00:00:00Z";
    pub const DEFAULT_BOOLEAN_WORDS: &'static [&'static str] =
        &["1:0", "Y:N", "T:F", "YES:NO", "TRUE:FALSE"];
    pub const DEFAULT_BOOLEAN_NUMBERS: [i64; 2] = [1, 0];
    pub const DEFAULT_GROUPING: bool = true;
    pub const DEFAULT_ROUNDING_MODE: RoundingMode = RoundingMode::HalfEven;
    pub const DEFAULT_MAX_FRACTION_DIGITS: u32 = 2;
    pub const DEFAULT_UUID_STRATEGY: UuidStrategy = UuidStrategy::Random;
    pub const DEFAULT_GEOMETRY_FORMAT: GeometryFormat = GeometryFormat::Wkt;
    pub const DEFAULT_BINARY_FORMAT: BinaryFormat = BinaryFormat::Base64;

    /// Validates the structural constraints of the codec settings.
    ///
    /// Locale, zone, epoch and pattern values are checked when conversion contexts are built.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.boolean_words.is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "codec.boolean_words".to_string(),
                constraint: "must contain at least one `true:false` pair".to_string(),
            });
        }

        for pair in &self.boolean_words {
            let valid = match pair.split_once(':') {
                Some((yes, no)) => {
                    !yes.trim().is_empty()
                        && !no.trim().is_empty()
                        && !yes.trim().eq_ignore_ascii_case(no.trim())
                }
                None => false,
            };

            if !valid {
                return Err(ValidationError::InvalidFieldValue {
                    field: "codec.boolean_words".to_string(),
                    constraint: format!("`{pair}` is not a `true:false` pair of distinct words"),
                });
            }
        }

        if self.boolean_numbers.len() != 2 || self.boolean_numbers[0] == self.boolean_numbers[1] {
            return Err(ValidationError::InvalidFieldValue {
                field: "codec.boolean_numbers".to_string(),
                constraint: "must contain exactly two distinct numbers".to_string(),
            });
        }

        for (field, pattern) in [
            ("codec.timestamp", &self.timestamp),
            ("codec.date", &self.date),
            ("codec.time", &self.time),
            ("codec.local_date_time", &self.local_date_time),
            ("codec.output_timestamp", &self.output_timestamp),
        ] {
            if pattern.trim().is_empty() {
                return Err(ValidationError::InvalidFieldValue {
                    field: field.to_string(),
                    constraint: "must not be empty".to_string(),
                });
            }
        }

        Ok(())
    }
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            locale: default_locale(),
            time_zone: default_time_zone(),
            timestamp: default_timestamp(),
            date: default_date(),
            time: default_time(),
            local_date_time: default_local_date_time(),
            output_timestamp: default_output_timestamp(),
            unit: default_unit(),
            epoch: default_epoch(),
            null_strings: Vec::new(),
            boolean_words: default_boolean_words(),
            boolean_numbers: default_boolean_numbers(),
            grouping: default_grouping(),
            rounding_mode: default_rounding_mode(),
            max_fraction_digits: default_max_fraction_digits(),
            format_numbers: false,
            uuid_strategy: default_uuid_strategy(),
            geometry_format: default_geometry_format(),
            binary_format: default_binary_format(),
        }
    }
}

fn default_locale() -> String {
    CodecConfig::DEFAULT_LOCALE.to_string()
}

fn default_time_zone() -> String {
    CodecConfig::DEFAULT_TIME_ZONE.to_string()
}

fn default_timestamp() -> String {
    CodecConfig::DEFAULT_TIMESTAMP.to_string()
}

fn default_date() -> String {
    CodecConfig::DEFAULT_DATE.to_string()
}

fn default_time() -> String {
    CodecConfig::DEFAULT_TIME.to_string()
}

fn default_local_date_time() -> String {
    CodecConfig::DEFAULT_LOCAL_DATE_TIME.to_string()
}

fn default_output_timestamp() -> String {
    CodecConfig::DEFAULT_OUTPUT_TIMESTAMP.to_string()
}

fn default_unit() -> TimeUnit {
    CodecConfig::DEFAULT_UNIT
}

fn default_epoch() -> String {
    CodecConfig::DEFAULT_EPOCH.to_string()
}

fn default_boolean_words() -> Vec<String> {
    CodecConfig::DEFAULT_BOOLEAN_WORDS
        .iter()
        .map(|pair| pair.to_string())
        .collect()
}

fn default_boolean_numbers() -> Vec<i64> {
    CodecConfig::DEFAULT_BOOLEAN_NUMBERS.to_vec()
}

fn default_grouping() -> bool {
    CodecConfig::DEFAULT_GROUPING
}

fn default_rounding_mode() -> RoundingMode {
    CodecConfig::DEFAULT_ROUNDING_MODE
}

fn default_max_fraction_digits() -> u32 {
    CodecConfig::DEFAULT_MAX_FRACTION_DIGITS
}

fn default_uuid_strategy() -> UuidStrategy {
    CodecConfig::DEFAULT_UUID_STRATEGY
}

fn default_geometry_format() -> GeometryFormat {
    CodecConfig::DEFAULT_GEOMETRY_FORMAT
}

fn default_binary_format() -> BinaryFormat {
    CodecConfig::DEFAULT_BINARY_FORMAT
}
