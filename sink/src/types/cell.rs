use std::net::IpAddr;

use bigdecimal::BigDecimal;
use bigdecimal::num_bigint::BigInt;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use crate::types::{LineString, Point, Polygon};

/// A value in the native representation of a destination column.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    VarInt(BigInt),
    F32(f32),
    F64(f64),
    Decimal(BigDecimal),
    Text(String),
    Blob(Vec<u8>),
    Inet(IpAddr),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
    Point(Point),
    LineString(LineString),
    Polygon(Polygon),
    List(Vec<Cell>),
    Set(Vec<Cell>),
    Map(Vec<(Cell, Cell)>),
    Tuple(Vec<Cell>),
    Udt(Vec<(String, Cell)>),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Returns the value as an `i128` when it is an integer that fits.
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Cell::I8(value) => Some(*value as i128),
            Cell::I16(value) => Some(*value as i128),
            Cell::I32(value) => Some(*value as i128),
            Cell::I64(value) => Some(*value as i128),
            Cell::U8(value) => Some(*value as i128),
            Cell::U16(value) => Some(*value as i128),
            Cell::U32(value) => Some(*value as i128),
            Cell::U64(value) => Some(*value as i128),
            Cell::VarInt(value) => bigdecimal::num_traits::ToPrimitive::to_i128(value),
            _ => None,
        }
    }
}
