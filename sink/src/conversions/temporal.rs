//! Temporal parsing and formatting.
//!
//! Text is first matched against the configured pattern. Inputs without zone information are
//! interpreted in the configured zone, and time-only inputs are anchored to the epoch date.

use std::fmt::{self, Write};

use chrono::format::{Item, StrftimeItems};
use chrono::{
    DateTime, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, Offset,
    SecondsFormat, TimeDelta, TimeZone, Utc,
};
use chrono_tz::Tz;
use config::shared::TimeUnit;

use crate::bail;
use crate::error::{ErrorKind, SinkResult};

const ISO_DATE: &str = "%Y-%m-%d";
const ISO_TIME: &[&str] = &["%H:%M:%S%.f", "%H:%M"];
const ISO_LOCAL_DATE_TIME: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];
const CQL_ZONED: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%z",
    "%Y-%m-%d %H:%M%z",
];
const CQL_LOCAL: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// A named ISO layout or a strftime pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemporalFormat {
    /// The lenient layouts accepted by CQL timestamp literals, with an optional zone.
    CqlTimestamp,
    IsoLocalDate,
    IsoLocalTime,
    IsoLocalDateTime,
    IsoOffsetDateTime,
    IsoInstant,
    Pattern(String),
}

impl TemporalFormat {
    /// Resolves a configured format name.
    ///
    /// Anything that is not a named layout must be a valid strftime pattern.
    pub fn parse(name: &str) -> SinkResult<Self> {
        let format = match name.trim() {
            "CQL_TIMESTAMP" => TemporalFormat::CqlTimestamp,
            "ISO_LOCAL_DATE" => TemporalFormat::IsoLocalDate,
            "ISO_LOCAL_TIME" => TemporalFormat::IsoLocalTime,
            "ISO_LOCAL_DATE_TIME" => TemporalFormat::IsoLocalDateTime,
            "ISO_OFFSET_DATE_TIME" | "ISO_ZONED_DATE_TIME" | "ISO_DATE_TIME" => {
                TemporalFormat::IsoOffsetDateTime
            }
            "ISO_INSTANT" => TemporalFormat::IsoInstant,
            pattern => {
                let invalid = StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error));
                if !pattern.contains('%') || invalid {
                    bail!(
                        ErrorKind::ConfigError,
                        "Invalid temporal format",
                        format!("`{pattern}` is neither a known format name nor a strftime pattern")
                    );
                }
                TemporalFormat::Pattern(pattern.to_string())
            }
        };

        Ok(format)
    }

    /// Parses an instant, returning [`None`] when the text does not match the format.
    pub fn parse_instant(
        &self,
        text: &str,
        zone: Zone,
        epoch_date: NaiveDate,
    ) -> Option<DateTime<Utc>> {
        let text = text.trim();
        match self {
            TemporalFormat::CqlTimestamp => {
                let zoned = normalize_zulu(text);
                CQL_ZONED
                    .iter()
                    .find_map(|pattern| DateTime::parse_from_str(&zoned, pattern).ok())
                    .map(|instant| instant.with_timezone(&Utc))
                    .or_else(|| {
                        CQL_LOCAL
                            .iter()
                            .find_map(|pattern| NaiveDateTime::parse_from_str(text, pattern).ok())
                            .and_then(|local| in_zone(local, zone))
                    })
                    .or_else(|| {
                        NaiveDate::parse_from_str(text, ISO_DATE)
                            .ok()
                            .and_then(|date| in_zone(date.and_time(NaiveTime::MIN), zone))
                    })
            }
            TemporalFormat::IsoOffsetDateTime | TemporalFormat::IsoInstant => {
                DateTime::parse_from_rfc3339(text)
                    .ok()
                    .or_else(|| DateTime::parse_from_str(&normalize_zulu(text), "%Y-%m-%dT%H:%M%z").ok())
                    .map(|instant| instant.with_timezone(&Utc))
            }
            TemporalFormat::IsoLocalDateTime => ISO_LOCAL_DATE_TIME
                .iter()
                .find_map(|pattern| NaiveDateTime::parse_from_str(text, pattern).ok())
                .and_then(|local| in_zone(local, zone)),
            TemporalFormat::IsoLocalDate => NaiveDate::parse_from_str(text, ISO_DATE)
                .ok()
                .and_then(|date| in_zone(date.and_time(NaiveTime::MIN), zone)),
            TemporalFormat::IsoLocalTime => ISO_TIME
                .iter()
                .find_map(|pattern| NaiveTime::parse_from_str(text, pattern).ok())
                .and_then(|time| in_zone(epoch_date.and_time(time), zone)),
            TemporalFormat::Pattern(pattern) => DateTime::parse_from_str(text, pattern)
                .map(|instant| instant.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDateTime::parse_from_str(text, pattern)
                        .ok()
                        .and_then(|local| in_zone(local, zone))
                })
                .or_else(|| {
                    NaiveDate::parse_from_str(text, pattern)
                        .ok()
                        .and_then(|date| in_zone(date.and_time(NaiveTime::MIN), zone))
                })
                .or_else(|| {
                    NaiveTime::parse_from_str(text, pattern)
                        .ok()
                        .and_then(|time| in_zone(epoch_date.and_time(time), zone))
                }),
        }
    }

    /// Parses a calendar date.
    pub fn parse_date(&self, text: &str, zone: Zone) -> Option<NaiveDate> {
        let text = text.trim();
        match self {
            TemporalFormat::IsoLocalDate => NaiveDate::parse_from_str(text, ISO_DATE).ok(),
            TemporalFormat::Pattern(pattern) => NaiveDate::parse_from_str(text, pattern)
                .ok()
                .or_else(|| self.local_instant(text, zone).map(|local| local.date())),
            _ => self.local_instant(text, zone).map(|local| local.date()),
        }
    }

    /// Parses a time of day.
    pub fn parse_time(&self, text: &str, zone: Zone) -> Option<NaiveTime> {
        let text = text.trim();
        match self {
            TemporalFormat::IsoLocalTime => ISO_TIME
                .iter()
                .find_map(|pattern| NaiveTime::parse_from_str(text, pattern).ok()),
            TemporalFormat::Pattern(pattern) => NaiveTime::parse_from_str(text, pattern)
                .ok()
                .or_else(|| self.local_instant(text, zone).map(|local| local.time())),
            _ => self.local_instant(text, zone).map(|local| local.time()),
        }
    }

    fn local_instant(&self, text: &str, zone: Zone) -> Option<NaiveDateTime> {
        self.parse_instant(text, zone, DateTime::UNIX_EPOCH.date_naive())
            .map(|instant| zone.localize(&instant).naive_local())
    }

    /// Formats an instant in the given zone.
    pub fn format_instant(&self, instant: &DateTime<Utc>, zone: Zone) -> SinkResult<String> {
        let local = zone.localize(instant);
        let formatted = match self {
            TemporalFormat::CqlTimestamp => {
                local.format("%Y-%m-%dT%H:%M:%S%.3f%:z").to_string()
            }
            TemporalFormat::IsoOffsetDateTime => local.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            TemporalFormat::IsoInstant => instant.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            TemporalFormat::IsoLocalDateTime => {
                local.naive_local().format("%Y-%m-%dT%H:%M:%S%.f").to_string()
            }
            TemporalFormat::IsoLocalDate => local.date_naive().format(ISO_DATE).to_string(),
            TemporalFormat::IsoLocalTime => local.time().format("%H:%M:%S%.f").to_string(),
            TemporalFormat::Pattern(pattern) => {
                let mut formatted = String::new();
                if write!(formatted, "{}", local.format(pattern)).is_err() {
                    bail!(
                        ErrorKind::ConversionError,
                        "Could not format timestamp",
                        format!("pattern `{pattern}` cannot format {instant}")
                    );
                }
                formatted
            }
        };

        Ok(formatted)
    }

    pub fn format_date(&self, date: &NaiveDate) -> SinkResult<String> {
        match self {
            TemporalFormat::Pattern(pattern) => format_naive(date.format(pattern), pattern),
            _ => Ok(date.format(ISO_DATE).to_string()),
        }
    }

    pub fn format_time(&self, time: &NaiveTime) -> SinkResult<String> {
        match self {
            TemporalFormat::Pattern(pattern) => format_naive(time.format(pattern), pattern),
            _ => Ok(time.format("%H:%M:%S%.f").to_string()),
        }
    }
}

fn format_naive(display: impl std::fmt::Display, pattern: &str) -> SinkResult<String> {
    let mut formatted = String::new();
    if write!(formatted, "{display}").is_err() {
        bail!(
            ErrorKind::ConversionError,
            "Could not format temporal value",
            format!("pattern `{pattern}` requires fields the value does not have")
        );
    }
    Ok(formatted)
}

fn normalize_zulu(text: &str) -> String {
    match text.strip_suffix(['Z', 'z']) {
        Some(prefix) => format!("{prefix}+00:00"),
        None => text.to_string(),
    }
}

fn in_zone(local: NaiveDateTime, zone: Zone) -> Option<DateTime<Utc>> {
    zone.resolve_local(&local)
}

/// Zone used for inputs without zone information and for local outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Fixed(FixedOffset),
    /// A tz database region, whose offset follows daylight saving time.
    Region(Tz),
}

impl Zone {
    pub fn utc() -> Self {
        Zone::Fixed(Utc.fix())
    }

    /// Returns the instant as a local date-time with the zone's offset at that instant.
    pub fn localize(&self, instant: &DateTime<Utc>) -> DateTime<FixedOffset> {
        match self {
            Zone::Fixed(offset) => instant.with_timezone(offset),
            Zone::Region(tz) => instant.with_timezone(tz).fixed_offset(),
        }
    }

    /// Resolves a local date-time to an instant.
    ///
    /// Local times repeated when clocks go back resolve to the earlier instant. Local times
    /// skipped when clocks go forward are shifted forward by the length of the gap.
    pub fn resolve_local(&self, local: &NaiveDateTime) -> Option<DateTime<Utc>> {
        match self {
            Zone::Fixed(offset) => offset
                .from_local_datetime(local)
                .single()
                .map(|instant| instant.with_timezone(&Utc)),
            Zone::Region(tz) => match tz.from_local_datetime(local) {
                LocalResult::Single(instant) | LocalResult::Ambiguous(instant, _) => {
                    Some(instant.with_timezone(&Utc))
                }
                LocalResult::None => {
                    let before = local.checked_sub_signed(TimeDelta::days(1))?;
                    let offset = tz.offset_from_utc_datetime(&before).fix();
                    offset
                        .from_local_datetime(local)
                        .single()
                        .map(|instant| instant.with_timezone(&Utc))
                }
            },
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Zone::Fixed(offset) => write!(f, "{offset}"),
            Zone::Region(tz) => write!(f, "{}", tz.name()),
        }
    }
}

/// Parses a zone identifier: `UTC`, `GMT`, `Z`, a fixed offset with an optional `UTC`/`GMT`
/// prefix such as `+01:00`, `-0530` or `UTC+2`, or a tz database region such as
/// `Europe/Paris`.
pub fn parse_time_zone(name: &str) -> SinkResult<Zone> {
    let trimmed = name.trim();
    let offset = match trimmed.to_uppercase().as_str() {
        "UTC" | "GMT" | "Z" | "UT" | "ETC/UTC" | "ETC/GMT" => Some(0),
        upper => {
            let offset = upper
                .strip_prefix("UTC")
                .or_else(|| upper.strip_prefix("GMT"))
                .unwrap_or(upper);
            parse_offset_seconds(offset)
        }
    };

    if let Some(zone) = offset.and_then(FixedOffset::east_opt) {
        return Ok(Zone::Fixed(zone));
    }

    match trimmed.parse::<Tz>() {
        Ok(tz) => Ok(Zone::Region(tz)),
        Err(_) => bail!(
            ErrorKind::ConfigError,
            "Unsupported time zone",
            format!(
                "`{trimmed}` is neither UTC, a fixed offset such as `+01:00` nor a region such as `Europe/Paris`"
            )
        ),
    }
}

fn parse_offset_seconds(offset: &str) -> Option<i32> {
    let (sign, rest) = match offset.chars().next()? {
        '+' => (1, &offset[1..]),
        '-' => (-1, &offset[1..]),
        _ => return None,
    };

    let (hours, minutes) = match rest.split_once(':') {
        Some((hours, minutes)) => (hours, minutes),
        None if rest.len() > 2 => rest.split_at(rest.len() - 2),
        None => (rest, "0"),
    };

    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 18 || minutes > 59 {
        return None;
    }

    Some(sign * (hours * 3600 + minutes * 60))
}

/// Returns the duration of `amount` units.
pub fn delta_from_units(amount: i64, unit: TimeUnit) -> Option<TimeDelta> {
    match unit {
        TimeUnit::Nanoseconds => Some(TimeDelta::nanoseconds(amount)),
        TimeUnit::Microseconds => Some(TimeDelta::microseconds(amount)),
        TimeUnit::Milliseconds => TimeDelta::try_milliseconds(amount),
        TimeUnit::Seconds => TimeDelta::try_seconds(amount),
        TimeUnit::Minutes => TimeDelta::try_minutes(amount),
        TimeUnit::Hours => TimeDelta::try_hours(amount),
        TimeUnit::Days => TimeDelta::try_days(amount),
    }
}

/// Returns the whole number of units in a duration, truncating toward zero.
pub fn units_from_delta(delta: TimeDelta, unit: TimeUnit) -> Option<i64> {
    match unit {
        TimeUnit::Nanoseconds => delta.num_nanoseconds(),
        TimeUnit::Microseconds => delta.num_microseconds(),
        TimeUnit::Milliseconds => Some(delta.num_milliseconds()),
        TimeUnit::Seconds => Some(delta.num_seconds()),
        TimeUnit::Minutes => Some(delta.num_minutes()),
        TimeUnit::Hours => Some(delta.num_hours()),
        TimeUnit::Days => Some(delta.num_days()),
    }
}

/// Converts an amount between units, truncating toward zero.
pub fn convert_units(amount: i64, from: TimeUnit, to: TimeUnit) -> Option<i64> {
    if from == to {
        return Some(amount);
    }
    delta_from_units(amount, from).and_then(|delta| units_from_delta(delta, to))
}

/// Returns the instant `amount` units after `epoch`.
pub fn instant_from_units(
    amount: i64,
    unit: TimeUnit,
    epoch: &DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    delta_from_units(amount, unit).and_then(|delta| epoch.checked_add_signed(delta))
}

/// Returns the number of units elapsed between `epoch` and `instant`.
pub fn units_since_epoch(instant: &DateTime<Utc>, unit: TimeUnit, epoch: &DateTime<Utc>) -> Option<i64> {
    units_from_delta(instant.signed_duration_since(*epoch), unit)
}

/// Returns the time of day `amount` units after midnight.
pub fn time_from_units(amount: i64, unit: TimeUnit) -> Option<NaiveTime> {
    let nanos = delta_from_units(amount, unit)?.num_nanoseconds()?;
    if !(0..86_400_000_000_000).contains(&nanos) {
        return None;
    }
    let seconds = (nanos / 1_000_000_000) as u32;
    let nanos = (nanos % 1_000_000_000) as u32;
    NaiveTime::from_num_seconds_from_midnight_opt(seconds, nanos)
}

/// Returns the number of units elapsed since midnight.
pub fn units_since_midnight(time: &NaiveTime, unit: TimeUnit) -> Option<i64> {
    units_from_delta(time.signed_duration_since(NaiveTime::MIN), unit)
}
