use bigdecimal::BigDecimal;
use bigdecimal::num_traits::ToPrimitive;
use chrono::NaiveTime;
use config::shared::GeometryFormat;

use crate::codec::ConvertingCodec;
use crate::conversions::binary::format_binary;
use crate::conversions::geo::Geometry;
use crate::conversions::numeric::{cell_to_decimal, decimal_from_f64, is_integral};
use crate::conversions::temporal::units_since_midnight;
use crate::conversions::time_uuid;
use crate::error::{ErrorKind, SinkResult};
use crate::types::{Cell, ExternalShape, ExternalValue};
use crate::{bail, sink_error};

impl ConvertingCodec {
    pub(super) fn format_scalar(&self, cell: &Cell) -> SinkResult<ExternalValue> {
        match self.shape {
            ExternalShape::Text => Ok(ExternalValue::Text(self.format_text(cell)?)),
            ExternalShape::Document => self.format_document(cell),
            ExternalShape::Boolean => match cell {
                Cell::Bool(value) => Ok(ExternalValue::Bool(*value)),
                other => Ok(ExternalValue::Bool(
                    self.context.boolean_format.from_number(&self.cell_number(other)?)?,
                )),
            },
            ExternalShape::Integer => {
                let number = self.cell_number(cell)?;
                match number.to_i64() {
                    Some(value) if is_integral(&number) => Ok(ExternalValue::Int(value)),
                    _ => Ok(ExternalValue::Decimal(number)),
                }
            }
            ExternalShape::Float => match cell {
                Cell::F32(value) => Ok(ExternalValue::Float(*value as f64)),
                Cell::F64(value) => Ok(ExternalValue::Float(*value)),
                other => {
                    let number = self.cell_number(other)?;
                    match number.to_f64() {
                        Some(value) => Ok(ExternalValue::Float(value)),
                        None => bail!(
                            ErrorKind::ValueOutOfRange,
                            "Value out of range",
                            format!("{number} does not fit in a double")
                        ),
                    }
                }
            },
            ExternalShape::Decimal => Ok(ExternalValue::Decimal(self.cell_number(cell)?)),
            ExternalShape::Bytes => match cell {
                Cell::Blob(bytes) => Ok(ExternalValue::Bytes(bytes.clone())),
                other => match geometry_of(other) {
                    Some(geometry) => Ok(ExternalValue::Bytes(geometry.to_wkb())),
                    None => bail!(
                        ErrorKind::ConversionError,
                        "Could not format bytes",
                        format!("{} values have no binary form", self.column_type)
                    ),
                },
            },
            ExternalShape::List(_) | ExternalShape::Map(_) | ExternalShape::Struct(_) => bail!(
                ErrorKind::ConversionError,
                "Could not format scalar",
                format!("{} values cannot be formatted as {}", self.column_type, self.shape)
            ),
        }
    }

    /// Returns the number a cell stands for, including temporal cells as units since the epoch.
    fn cell_number(&self, cell: &Cell) -> SinkResult<BigDecimal> {
        let context = &self.context;
        if let Some(number) = cell_to_decimal(cell) {
            return Ok(number);
        }

        let units = match cell {
            Cell::Bool(value) => return Ok(context.boolean_format.to_number(*value).clone()),
            Cell::Timestamp(instant) => context.timestamp_to_units(instant)?,
            Cell::Date(date) => {
                let midnight = context
                    .time_zone
                    .resolve_local(&date.and_time(NaiveTime::MIN))
                    .ok_or_else(|| {
                        sink_error!(
                            ErrorKind::ValueOutOfRange,
                            "Value out of range",
                            format!("{date} has no midnight in {}", context.time_zone)
                        )
                    })?;
                context.timestamp_to_units(&midnight)?
            }
            Cell::Time(time) => match units_since_midnight(time, context.time_unit) {
                Some(units) => units,
                None => bail!(
                    ErrorKind::ValueOutOfRange,
                    "Value out of range",
                    format!("{time} overflows {:?}", context.time_unit)
                ),
            },
            Cell::Uuid(uuid) => match time_uuid::instant_of(uuid) {
                Some(instant) => context.timestamp_to_units(&instant)?,
                None => bail!(
                    ErrorKind::ConversionError,
                    "Could not convert UUID to number",
                    format!("{uuid} is not a time-based UUID")
                ),
            },
            other => bail!(
                ErrorKind::ConversionError,
                "Could not convert to number",
                format!("{other:?} has no numeric value")
            ),
        };

        Ok(BigDecimal::from(units))
    }

    fn format_text(&self, cell: &Cell) -> SinkResult<String> {
        let context = &self.context;
        let text = match cell {
            Cell::Null => context.null_output().unwrap_or_default().to_string(),
            Cell::Bool(value) => context.boolean_format.format(*value).to_string(),
            Cell::F32(value) if !value.is_finite() => format_special(*value as f64),
            Cell::F64(value) if !value.is_finite() => format_special(*value),
            Cell::F32(value) => context.format_number(&decimal_from_f64(*value as f64)?)?,
            Cell::F64(value) => context.format_number(&decimal_from_f64(*value)?)?,
            Cell::Text(text) => text.clone(),
            Cell::Blob(bytes) => format_binary(bytes, context.binary_format),
            Cell::Inet(address) => address.to_string(),
            Cell::Date(date) => context.format_date(date)?,
            Cell::Time(time) => context.format_time(time)?,
            Cell::Timestamp(instant) => context.format_timestamp(instant)?,
            Cell::Uuid(uuid) => uuid.to_string(),
            Cell::Point(_) | Cell::LineString(_) | Cell::Polygon(_) => match geometry_of(cell) {
                Some(geometry) => json_text(&self.format_geometry(&geometry)),
                None => String::new(),
            },
            Cell::List(_) | Cell::Set(_) | Cell::Map(_) | Cell::Tuple(_) | Cell::Udt(_) => {
                self.format_document(cell)?.to_json().to_string()
            }
            number => match cell_to_decimal(number) {
                Some(number) => context.format_number(&number)?,
                None => bail!(
                    ErrorKind::ConversionError,
                    "Could not format value",
                    format!("{number:?} has no text form")
                ),
            },
        };

        Ok(text)
    }

    /// Renders a cell as a document node, the representation of schemaless payload fields.
    fn format_document(&self, cell: &Cell) -> SinkResult<ExternalValue> {
        let value = match cell {
            Cell::Null => ExternalValue::Null,
            Cell::Bool(value) => ExternalValue::Bool(*value),
            Cell::I8(_)
            | Cell::I16(_)
            | Cell::I32(_)
            | Cell::I64(_)
            | Cell::U8(_)
            | Cell::U16(_)
            | Cell::U32(_)
            | Cell::U64(_)
            | Cell::VarInt(_) => match cell.as_i128().and_then(|value| i64::try_from(value).ok()) {
                Some(value) => ExternalValue::Int(value),
                None => ExternalValue::Decimal(self.cell_number(cell)?),
            },
            Cell::F32(value) => ExternalValue::Float(*value as f64),
            Cell::F64(value) => ExternalValue::Float(*value),
            Cell::Decimal(value) => ExternalValue::Decimal(value.clone()),
            Cell::Text(text) => ExternalValue::Text(text.clone()),
            Cell::Point(_) | Cell::LineString(_) | Cell::Polygon(_) => match geometry_of(cell) {
                Some(geometry) => self.format_geometry(&geometry),
                None => ExternalValue::Null,
            },
            Cell::List(cells) | Cell::Set(cells) | Cell::Tuple(cells) => ExternalValue::Array(
                cells
                    .iter()
                    .map(|cell| self.format_document(cell))
                    .collect::<SinkResult<Vec<_>>>()?,
            ),
            Cell::Map(entries) => {
                let mut fields = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    fields.push((self.format_text(key)?, self.format_document(value)?));
                }
                ExternalValue::Object(fields)
            }
            Cell::Udt(fields) => ExternalValue::Object(
                fields
                    .iter()
                    .map(|(name, cell)| Ok((name.clone(), self.format_document(cell)?)))
                    .collect::<SinkResult<Vec<_>>>()?,
            ),
            other => ExternalValue::Text(self.format_text(other)?),
        };

        Ok(value)
    }

    fn format_geometry(&self, geometry: &Geometry) -> ExternalValue {
        match self.context.geometry_format {
            GeometryFormat::Wkt => ExternalValue::Text(geometry.to_wkt()),
            GeometryFormat::Json => ExternalValue::from(geometry.to_geojson()),
            GeometryFormat::Wkb => {
                ExternalValue::Text(format_binary(&geometry.to_wkb(), self.context.binary_format))
            }
        }
    }
}

/// Returns the text of a text value, or the JSON rendering of anything else.
fn json_text(value: &ExternalValue) -> String {
    match value {
        ExternalValue::Text(text) => text.clone(),
        other => other.to_json().to_string(),
    }
}

fn format_special(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_sign_positive() {
        "Infinity".to_string()
    } else {
        "-Infinity".to_string()
    }
}

fn geometry_of(cell: &Cell) -> Option<Geometry> {
    match cell {
        Cell::Point(point) => Some(Geometry::Point(point.clone())),
        Cell::LineString(line) => Some(Geometry::LineString(line.clone())),
        Cell::Polygon(polygon) => Some(Geometry::Polygon(polygon.clone())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::sync::Arc;

    use chrono::DateTime;
    use config::shared::{BinaryFormat, CodecConfig};

    use crate::codec::CodecFactory;
    use crate::conversions::ConversionContext;
    use crate::types::{ColumnType, IntegerType, LineString, Point};

    use super::*;

    fn factory_with(config: CodecConfig) -> CodecFactory {
        CodecFactory::new(Arc::new(ConversionContext::from_config(&config).unwrap()))
    }

    fn round_trip(column_type: ColumnType, text: &str) -> ExternalValue {
        let codec = factory_with(CodecConfig::default())
            .codec_for(&ExternalShape::Text, &column_type)
            .unwrap();
        let cell = codec.external_to_internal(&ExternalValue::text(text)).unwrap();
        codec.internal_to_external(&cell).unwrap()
    }

    #[test]
    fn text_round_trips_are_value_equivalent() {
        assert_eq!(
            round_trip(ColumnType::Integer(IntegerType::INT), "1,234"),
            ExternalValue::text("1234")
        );
        assert_eq!(round_trip(ColumnType::Boolean, "yes"), ExternalValue::text("1"));
        assert_eq!(
            round_trip(ColumnType::Timestamp, "2017-12-05T12:44:36+01:00"),
            ExternalValue::text("2017-12-05T11:44:36Z")
        );
        assert_eq!(round_trip(ColumnType::Double, "NaN"), ExternalValue::text("NaN"));
        assert_eq!(
            round_trip(ColumnType::Blob, "0xcafe"),
            ExternalValue::text("yv4=")
        );
    }

    #[test]
    fn null_formats_as_first_null_string() {
        let factory = factory_with(CodecConfig {
            null_strings: vec!["NULL".to_string(), "N/A".to_string()],
            ..CodecConfig::default()
        });
        let text = factory
            .codec_for(&ExternalShape::Text, &ColumnType::Decimal)
            .unwrap();
        let document = factory
            .codec_for(&ExternalShape::Document, &ColumnType::Decimal)
            .unwrap();

        assert_eq!(
            text.internal_to_external(&Cell::Null).unwrap(),
            ExternalValue::text("NULL")
        );
        assert_eq!(document.internal_to_external(&Cell::Null).unwrap(), ExternalValue::Null);
        assert_eq!(
            text.external_to_internal(&ExternalValue::text("n/a")).unwrap(),
            Cell::Null
        );
    }

    #[test]
    fn geometry_follows_the_configured_format() {
        let line = Cell::LineString(LineString {
            points: vec![Point::new(30.0, 10.0), Point::new(10.0, 30.0), Point::new(40.0, 40.0)],
        });
        let factory = factory_with(CodecConfig {
            geometry_format: GeometryFormat::Wkb,
            binary_format: BinaryFormat::Hex,
            ..CodecConfig::default()
        });
        let codec = factory
            .codec_for(&ExternalShape::Text, &ColumnType::LineString)
            .unwrap();

        assert_eq!(
            codec.internal_to_external(&line).unwrap(),
            ExternalValue::text(
                "0x0102000000030000000000000000003e40000000000000244000000000000024400000000000003e4000000000000044400000000000004440"
            )
        );
    }

    #[test]
    fn numeric_shapes_receive_temporal_units() {
        let factory = factory_with(CodecConfig::default());
        let codec = factory
            .codec_for(&ExternalShape::Integer, &ColumnType::Timestamp)
            .unwrap();

        let instant = DateTime::from_timestamp_millis(1_512_474_276_000).unwrap();
        assert_eq!(
            codec.internal_to_external(&Cell::Timestamp(instant)).unwrap(),
            ExternalValue::Int(1_512_474_276_000)
        );
        assert_eq!(
            codec
                .external_to_internal(&ExternalValue::Int(1_512_474_276_000))
                .unwrap(),
            Cell::Timestamp(instant)
        );
    }

    #[test]
    fn decimal_shape_keeps_precision() {
        let factory = factory_with(CodecConfig::default());
        let codec = factory
            .codec_for(&ExternalShape::Decimal, &ColumnType::VarInt)
            .unwrap();
        let huge = BigDecimal::from_str("123456789012345678901234567890").unwrap();

        let cell = codec
            .external_to_internal(&ExternalValue::Decimal(huge.clone()))
            .unwrap();
        assert_eq!(codec.internal_to_external(&cell).unwrap(), ExternalValue::Decimal(huge));
    }
}
