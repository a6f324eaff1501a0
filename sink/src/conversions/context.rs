use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use config::shared::{BinaryFormat, CodecConfig, GeometryFormat, TimeUnit, UuidStrategy};

use crate::conversions::bool::BooleanFormat;
use crate::conversions::numeric::{NumberFormat, NumberLocale, check_magnitude, is_integral};
use crate::conversions::temporal::{
    TemporalFormat, Zone, instant_from_units, parse_time_zone, time_from_units, units_since_epoch,
};
use crate::error::{ErrorKind, SinkResult};
use crate::{bail, sink_error};

/// Immutable conversion settings of one topic.
///
/// Built once from a [`CodecConfig`] and shared by every codec created for the topic.
#[derive(Debug, Clone)]
pub struct ConversionContext {
    pub time_zone: Zone,
    pub timestamp_format: TemporalFormat,
    pub date_format: TemporalFormat,
    pub time_format: TemporalFormat,
    pub local_date_time_format: TemporalFormat,
    pub output_timestamp_format: TemporalFormat,
    pub time_unit: TimeUnit,
    pub epoch: DateTime<Utc>,
    pub null_strings: Vec<String>,
    pub boolean_format: BooleanFormat,
    pub number_format: NumberFormat,
    pub uuid_strategy: UuidStrategy,
    pub geometry_format: GeometryFormat,
    pub binary_format: BinaryFormat,
}

impl ConversionContext {
    /// Resolves every setting of the codec configuration.
    ///
    /// Unknown locales, zones, patterns and malformed epochs are configuration errors.
    pub fn from_config(config: &CodecConfig) -> SinkResult<Self> {
        let time_zone = parse_time_zone(&config.time_zone)?;
        let timestamp_format = TemporalFormat::parse(&config.timestamp)?;

        let epoch = DateTime::parse_from_rfc3339(config.epoch.trim())
            .map(|epoch| epoch.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                TemporalFormat::CqlTimestamp.parse_instant(
                    &config.epoch,
                    time_zone,
                    DateTime::UNIX_EPOCH.date_naive(),
                )
            })
            .ok_or_else(|| {
                sink_error!(
                    ErrorKind::ConfigError,
                    "Invalid epoch",
                    format!("`{}` is not a timestamp", config.epoch)
                )
            })?;

        Ok(Self {
            time_zone,
            timestamp_format,
            date_format: TemporalFormat::parse(&config.date)?,
            time_format: TemporalFormat::parse(&config.time)?,
            local_date_time_format: TemporalFormat::parse(&config.local_date_time)?,
            output_timestamp_format: TemporalFormat::parse(&config.output_timestamp)?,
            time_unit: config.unit,
            epoch,
            null_strings: config.null_strings.clone(),
            boolean_format: BooleanFormat::new(&config.boolean_words, &config.boolean_numbers)?,
            number_format: NumberFormat {
                locale: NumberLocale::parse(&config.locale)?,
                grouping: config.grouping,
                rounding_mode: config.rounding_mode,
                max_fraction_digits: config.max_fraction_digits,
                format_numbers: config.format_numbers,
            },
            uuid_strategy: config.uuid_strategy,
            geometry_format: config.geometry_format,
            binary_format: config.binary_format,
        })
    }

    /// Returns `true` when the text is empty or equals a null string, ignoring case.
    pub fn is_null_text(&self, text: &str) -> bool {
        text.is_empty()
            || self
                .null_strings
                .iter()
                .any(|null| null.eq_ignore_ascii_case(text))
    }

    /// Text produced for null values, if any null string is configured.
    pub fn null_output(&self) -> Option<&str> {
        self.null_strings.first().map(String::as_str)
    }

    fn epoch_date(&self) -> NaiveDate {
        self.time_zone.localize(&self.epoch).date_naive()
    }

    fn parse_integral_units(&self, text: &str) -> Option<i64> {
        let digits = text.trim();
        let unsigned = digits.strip_prefix('-').unwrap_or(digits);
        if unsigned.is_empty() || !unsigned.chars().all(|ch| ch.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    /// Matches text against the timestamp and local date-time patterns.
    fn match_instant(&self, text: &str) -> Option<DateTime<Utc>> {
        self.timestamp_format
            .parse_instant(text, self.time_zone, self.epoch_date())
            .or_else(|| {
                self.local_date_time_format
                    .parse_instant(text, self.time_zone, self.epoch_date())
            })
    }

    /// Parses a timestamp from its pattern form or from units since the epoch.
    pub fn parse_timestamp(&self, text: &str) -> SinkResult<DateTime<Utc>> {
        if let Some(instant) = self.match_instant(text) {
            return Ok(instant);
        }

        if let Some(units) = self.parse_integral_units(text) {
            return self.timestamp_from_units(units);
        }

        bail!(
            ErrorKind::ConversionError,
            "Could not parse timestamp",
            format!("`{text}` does not match {:?}", self.timestamp_format)
        );
    }

    pub fn timestamp_from_units(&self, units: i64) -> SinkResult<DateTime<Utc>> {
        match instant_from_units(units, self.time_unit, &self.epoch) {
            Some(instant) => Ok(instant),
            None => bail!(
                ErrorKind::ValueOutOfRange,
                "Value out of range",
                format!("{units} {:?} after the epoch is not a valid timestamp", self.time_unit)
            ),
        }
    }

    /// Converts an integral number of units since the epoch into a timestamp.
    pub fn timestamp_from_number(&self, number: &BigDecimal) -> SinkResult<DateTime<Utc>> {
        check_magnitude(number)?;
        let units = if is_integral(number) {
            bigdecimal::num_traits::ToPrimitive::to_i64(number)
        } else {
            None
        };

        match units {
            Some(units) => self.timestamp_from_units(units),
            None => bail!(
                ErrorKind::ConversionError,
                "Could not convert number to timestamp",
                format!("{number} is not a whole number of {:?}", self.time_unit)
            ),
        }
    }

    /// Returns the units since the epoch of a timestamp.
    pub fn timestamp_to_units(&self, instant: &DateTime<Utc>) -> SinkResult<i64> {
        match units_since_epoch(instant, self.time_unit, &self.epoch) {
            Some(units) => Ok(units),
            None => bail!(
                ErrorKind::ValueOutOfRange,
                "Value out of range",
                format!("{instant} is too far from the epoch in {:?}", self.time_unit)
            ),
        }
    }

    pub fn parse_date(&self, text: &str) -> SinkResult<NaiveDate> {
        if let Some(date) = self.date_format.parse_date(text, self.time_zone) {
            return Ok(date);
        }

        if let Some(units) = self.parse_integral_units(text) {
            let instant = self.timestamp_from_units(units)?;
            return Ok(self.time_zone.localize(&instant).date_naive());
        }

        bail!(
            ErrorKind::ConversionError,
            "Could not parse date",
            format!("`{text}` does not match {:?}", self.date_format)
        );
    }

    pub fn parse_time(&self, text: &str) -> SinkResult<NaiveTime> {
        if let Some(time) = self.time_format.parse_time(text, self.time_zone) {
            return Ok(time);
        }

        if let Some(units) = self.parse_integral_units(text) {
            return self.time_from_units(units);
        }

        bail!(
            ErrorKind::ConversionError,
            "Could not parse time",
            format!("`{text}` does not match {:?}", self.time_format)
        );
    }

    pub fn time_from_units(&self, units: i64) -> SinkResult<NaiveTime> {
        match time_from_units(units, self.time_unit) {
            Some(time) => Ok(time),
            None => bail!(
                ErrorKind::ValueOutOfRange,
                "Value out of range",
                format!("{units} {:?} is not within one day", self.time_unit)
            ),
        }
    }

    /// Parses a number from text.
    ///
    /// Alternatives are tried in order: a number in the configured locale, a boolean word
    /// mapped to its configured number, and a timestamp converted to units since the epoch.
    pub fn parse_number(&self, text: &str) -> SinkResult<BigDecimal> {
        if let Some(number) = self.number_format.parse(text) {
            check_magnitude(&number)?;
            return Ok(number);
        }

        if let Some(value) = self.boolean_format.lookup(text) {
            return Ok(self.boolean_format.to_number(value).clone());
        }

        if let Some(instant) = self.match_instant(text) {
            return Ok(BigDecimal::from(self.timestamp_to_units(&instant)?));
        }

        bail!(
            ErrorKind::ConversionError,
            "Could not parse number",
            format!("`{text}` is neither a number, a boolean word nor a timestamp")
        );
    }

    pub fn format_timestamp(&self, instant: &DateTime<Utc>) -> SinkResult<String> {
        self.output_timestamp_format
            .format_instant(instant, self.time_zone)
    }

    pub fn format_date(&self, date: &NaiveDate) -> SinkResult<String> {
        self.date_format.format_date(date)
    }

    pub fn format_time(&self, time: &NaiveTime) -> SinkResult<String> {
        self.time_format.format_time(time)
    }

    pub fn format_number(&self, number: &BigDecimal) -> SinkResult<String> {
        self.number_format.format(number)
    }
}
