use std::net::IpAddr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::codec::ConvertingCodec;
use crate::conversions::binary::{format_binary, parse_binary};
use crate::conversions::geo::{Geometry, parse_geojson, parse_geometry, parse_wkb};
use crate::conversions::numeric::{
    decimal_from_f64, narrow_f64, parse_special_float, to_f32, to_f64, to_integer_cell, to_varint,
};
use crate::conversions::time_uuid;
use crate::error::{ErrorKind, SinkResult};
use crate::types::{Cell, ColumnType, ExternalValue, IntegerType};
use crate::{bail, sink_error};

impl ConvertingCodec {
    pub(super) fn parse_scalar(&self, value: &ExternalValue) -> SinkResult<Cell> {
        match value {
            ExternalValue::Null => Ok(Cell::Null),
            ExternalValue::Text(text) => self.parse_text(text),
            ExternalValue::Bool(value) => self.parse_bool(*value),
            ExternalValue::Int(value) => self.parse_number(&BigDecimal::from(*value)),
            ExternalValue::Float(value) => self.parse_float(*value),
            ExternalValue::Decimal(value) => self.parse_number(value),
            ExternalValue::Bytes(bytes) => self.parse_bytes(bytes),
            ExternalValue::Array(_) | ExternalValue::Object(_) => self.parse_tree(value),
        }
    }

    fn parse_text(&self, text: &str) -> SinkResult<Cell> {
        let context = &self.context;
        let cell = match &self.column_type {
            ColumnType::Boolean => Cell::Bool(context.boolean_format.parse(text)?),
            ColumnType::Integer(integer) => to_integer_cell(&context.parse_number(text)?, *integer)?,
            ColumnType::Counter => {
                to_integer_cell(&context.parse_number(text)?, IntegerType::BIGINT)?
            }
            ColumnType::VarInt => Cell::VarInt(to_varint(&context.parse_number(text)?)?),
            ColumnType::Float => match parse_special_float(text) {
                Some(special) => Cell::F32(special as f32),
                None => Cell::F32(to_f32(&context.parse_number(text)?)?),
            },
            ColumnType::Double => match parse_special_float(text) {
                Some(special) => Cell::F64(special),
                None => Cell::F64(to_f64(&context.parse_number(text)?)?),
            },
            ColumnType::Decimal => Cell::Decimal(context.parse_number(text)?),
            ColumnType::Text => Cell::Text(text.to_string()),
            ColumnType::Ascii => {
                if !text.is_ascii() {
                    bail!(
                        ErrorKind::ConversionError,
                        "Invalid ascii value",
                        format!("`{text}` contains non-ASCII characters")
                    );
                }
                Cell::Text(text.to_string())
            }
            ColumnType::Blob => Cell::Blob(parse_binary(text)?),
            ColumnType::Inet => Cell::Inet(text.trim().parse::<IpAddr>()?),
            ColumnType::Date => Cell::Date(context.parse_date(text)?),
            ColumnType::Time => Cell::Time(context.parse_time(text)?),
            ColumnType::Timestamp => Cell::Timestamp(context.parse_timestamp(text)?),
            ColumnType::Uuid | ColumnType::TimeUuid => {
                let uuid = match Uuid::parse_str(text.trim()) {
                    Ok(uuid) => uuid,
                    Err(_) => {
                        let instant = context.parse_timestamp(text).map_err(|_| {
                            sink_error!(
                                ErrorKind::ConversionError,
                                "Could not parse UUID",
                                format!("`{text}` is neither a UUID nor a timestamp")
                            )
                        })?;
                        time_uuid::generate(context.uuid_strategy, &instant)?
                    }
                };
                self.uuid_cell(uuid)?
            }
            ColumnType::Point | ColumnType::LineString | ColumnType::Polygon => {
                self.geometry_cell(parse_geometry(text)?)?
            }
            composite => bail!(
                ErrorKind::UnsupportedConversion,
                "Unsupported conversion",
                format!("no scalar conversion from text to {composite}")
            ),
        };

        Ok(cell)
    }

    fn parse_number(&self, number: &BigDecimal) -> SinkResult<Cell> {
        let context = &self.context;
        let cell = match &self.column_type {
            ColumnType::Boolean => Cell::Bool(context.boolean_format.from_number(number)?),
            ColumnType::Integer(integer) => to_integer_cell(number, *integer)?,
            ColumnType::Counter => to_integer_cell(number, IntegerType::BIGINT)?,
            ColumnType::VarInt => Cell::VarInt(to_varint(number)?),
            ColumnType::Float => Cell::F32(to_f32(number)?),
            ColumnType::Double => Cell::F64(to_f64(number)?),
            ColumnType::Decimal => Cell::Decimal(number.clone()),
            ColumnType::Text | ColumnType::Ascii => Cell::Text(context.format_number(number)?),
            ColumnType::Timestamp => Cell::Timestamp(context.timestamp_from_number(number)?),
            ColumnType::Date => {
                let instant = context.timestamp_from_number(number)?;
                Cell::Date(context.time_zone.localize(&instant).date_naive())
            }
            ColumnType::Time => {
                let units = self.whole_units(number)?;
                Cell::Time(context.time_from_units(units)?)
            }
            ColumnType::Uuid | ColumnType::TimeUuid => {
                let instant = context.timestamp_from_number(number)?;
                self.generated_uuid(&instant)?
            }
            other => bail!(
                ErrorKind::ConversionError,
                "Could not convert number",
                format!("{number} cannot be converted to {other}")
            ),
        };

        Ok(cell)
    }

    fn parse_float(&self, value: f64) -> SinkResult<Cell> {
        match self.column_type {
            ColumnType::Float => Ok(Cell::F32(narrow_f64(value)?)),
            ColumnType::Double => Ok(Cell::F64(value)),
            _ => self.parse_number(&decimal_from_f64(value)?),
        }
    }

    fn parse_bool(&self, value: bool) -> SinkResult<Cell> {
        let context = &self.context;
        match self.column_type {
            ColumnType::Boolean => Ok(Cell::Bool(value)),
            ColumnType::Text | ColumnType::Ascii => {
                Ok(Cell::Text(context.boolean_format.format(value).to_string()))
            }
            ref column_type if column_type.is_numeric() => {
                self.parse_number(context.boolean_format.to_number(value))
            }
            ref other => bail!(
                ErrorKind::ConversionError,
                "Could not convert boolean",
                format!("{value} cannot be converted to {other}")
            ),
        }
    }

    fn parse_bytes(&self, bytes: &[u8]) -> SinkResult<Cell> {
        match self.column_type {
            ColumnType::Blob => Ok(Cell::Blob(bytes.to_vec())),
            ColumnType::Text | ColumnType::Ascii => Ok(Cell::Text(format_binary(
                bytes,
                self.context.binary_format,
            ))),
            ColumnType::Point | ColumnType::LineString | ColumnType::Polygon => {
                self.geometry_cell(parse_wkb(bytes)?)
            }
            ref other => bail!(
                ErrorKind::ConversionError,
                "Could not convert bytes",
                format!("{} bytes cannot be converted to {other}", bytes.len())
            ),
        }
    }

    /// Converts a nested document node, which only geometry and text columns accept.
    fn parse_tree(&self, value: &ExternalValue) -> SinkResult<Cell> {
        match self.column_type {
            ColumnType::Point | ColumnType::LineString | ColumnType::Polygon => {
                self.geometry_cell(parse_geojson(&value.to_json())?)
            }
            ColumnType::Text => Ok(Cell::Text(value.to_json().to_string())),
            ref other => bail!(
                ErrorKind::ConversionError,
                "Could not convert document",
                format!("a {} node cannot be converted to {other}", value.type_name())
            ),
        }
    }

    fn whole_units(&self, number: &BigDecimal) -> SinkResult<i64> {
        match to_varint(number)
            .ok()
            .and_then(|units| bigdecimal::num_traits::ToPrimitive::to_i64(&units))
        {
            Some(units) => Ok(units),
            None => bail!(
                ErrorKind::ConversionError,
                "Could not convert number to time",
                format!("{number} is not a whole number of {:?}", self.context.time_unit)
            ),
        }
    }

    fn generated_uuid(&self, instant: &DateTime<Utc>) -> SinkResult<Cell> {
        self.uuid_cell(time_uuid::generate(self.context.uuid_strategy, instant)?)
    }

    fn uuid_cell(&self, uuid: Uuid) -> SinkResult<Cell> {
        if self.column_type == ColumnType::TimeUuid && uuid.get_version_num() != 1 {
            bail!(
                ErrorKind::ConversionError,
                "Invalid timeuuid",
                format!("{uuid} is a version {} UUID, expected version 1", uuid.get_version_num())
            );
        }
        Ok(Cell::Uuid(uuid))
    }

    fn geometry_cell(&self, geometry: Geometry) -> SinkResult<Cell> {
        match (&self.column_type, geometry) {
            (ColumnType::Point, Geometry::Point(point)) => Ok(Cell::Point(point)),
            (ColumnType::LineString, Geometry::LineString(line)) => Ok(Cell::LineString(line)),
            (ColumnType::Polygon, Geometry::Polygon(polygon)) => Ok(Cell::Polygon(polygon)),
            (column_type, geometry) => bail!(
                ErrorKind::ConversionError,
                "Geometry kind mismatch",
                format!("a {} cannot be stored in a {column_type} column", geometry.kind())
            ),
        }
    }
}
