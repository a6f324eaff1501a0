//! Time-based UUID generation from instants.
//!
//! Version 1 UUIDs count 100ns ticks since the Gregorian calendar reform. The strategies only
//! differ in the sub-millisecond ticks and the clock sequence and node bits.

use chrono::{DateTime, Utc};
use config::shared::UuidStrategy;
use uuid::Uuid;

use crate::bail;
use crate::error::{ErrorKind, SinkResult};

/// Unix epoch expressed in milliseconds since 1582-10-15T00:00:00Z.
const GREGORIAN_OFFSET_MILLIS: i64 = -12_219_292_800_000;
const TICKS_PER_MILLI: i64 = 10_000;
/// Largest tick count the 60 time bits of a version 1 UUID can hold.
const MAX_TICKS: u64 = (1 << 60) - 1;

/// Smallest clock sequence and node bits when compared as signed bytes.
const MIN_CLOCK_SEQ_AND_NODE: u64 = 0x8080_8080_8080_8080;
/// Largest clock sequence and node bits when compared as signed bytes.
const MAX_CLOCK_SEQ_AND_NODE: u64 = 0x7f7f_7f7f_7f7f_7f7f;
/// IETF variant with a zero clock sequence and node.
const FIXED_CLOCK_SEQ_AND_NODE: u64 = 0x8000_0000_0000_0000;

/// Returns the first tick of a millisecond.
///
/// Fails unless every tick of the millisecond fits the time bits, so that all strategies stay
/// representable for the same instant.
fn ticks_from_unix_millis(millis: i64) -> SinkResult<u64> {
    let ticks = millis
        .checked_sub(GREGORIAN_OFFSET_MILLIS)
        .and_then(|since_reform| since_reform.checked_mul(TICKS_PER_MILLI))
        .and_then(|ticks| u64::try_from(ticks).ok())
        .filter(|ticks| ticks + (TICKS_PER_MILLI as u64 - 1) <= MAX_TICKS);

    match ticks {
        Some(ticks) => Ok(ticks),
        None => bail!(
            ErrorKind::ValueOutOfRange,
            "Instant out of time-based UUID range",
            format!(
                "{millis} ms since the Unix epoch is before 1582-10-15 or past the last representable instant"
            )
        ),
    }
}

/// Lays out a tick count as `time_low | time_mid | version 1 | time_high`.
fn most_significant_bits(ticks: u64) -> u64 {
    let mut msb = (ticks & 0xffff_ffff) << 32;
    msb |= (ticks & 0xffff_0000_0000) >> 16;
    msb |= (ticks & 0x0fff_0000_0000_0000) >> 48;
    msb | 0x1000
}

/// Smallest version 1 UUID for the given millisecond.
pub fn start_of(millis: i64) -> SinkResult<Uuid> {
    Ok(Uuid::from_u64_pair(
        most_significant_bits(ticks_from_unix_millis(millis)?),
        MIN_CLOCK_SEQ_AND_NODE,
    ))
}

/// Largest version 1 UUID for the given millisecond.
pub fn end_of(millis: i64) -> SinkResult<Uuid> {
    let ticks = ticks_from_unix_millis(millis)? + (TICKS_PER_MILLI as u64 - 1);
    Ok(Uuid::from_u64_pair(
        most_significant_bits(ticks),
        MAX_CLOCK_SEQ_AND_NODE,
    ))
}

/// Returns the tick count of a version 1 UUID.
pub fn ticks(uuid: &Uuid) -> u64 {
    let (msb, _) = uuid.as_u64_pair();
    ((msb & 0x0fff) << 48) | (((msb >> 16) & 0xffff) << 32) | (msb >> 32)
}

/// Returns the instant a version 1 UUID was generated for, truncated to the millisecond.
pub fn instant_of(uuid: &Uuid) -> Option<DateTime<Utc>> {
    if uuid.get_version_num() != 1 {
        return None;
    }
    let millis = (ticks(uuid) / TICKS_PER_MILLI as u64) as i64 + GREGORIAN_OFFSET_MILLIS;
    DateTime::from_timestamp_millis(millis)
}

/// Generates a version 1 UUID for an instant according to the strategy.
pub fn generate(strategy: UuidStrategy, instant: &DateTime<Utc>) -> SinkResult<Uuid> {
    let millis = instant.timestamp_millis();
    let uuid = match strategy {
        UuidStrategy::Min => start_of(millis)?,
        UuidStrategy::Max => end_of(millis)?,
        UuidStrategy::Fixed => Uuid::from_u64_pair(
            most_significant_bits(ticks_from_unix_millis(millis)?),
            FIXED_CLOCK_SEQ_AND_NODE,
        ),
        UuidStrategy::Random => {
            let random = rand::random::<u64>() & 0x3fff_ffff_ffff_ffff;
            Uuid::from_u64_pair(
                most_significant_bits(ticks_from_unix_millis(millis)?),
                random | FIXED_CLOCK_SEQ_AND_NODE,
            )
        }
    };

    Ok(uuid)
}
