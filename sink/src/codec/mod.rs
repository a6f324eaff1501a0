//! Bidirectional conversion between external values and column cells.
//!
//! A [`ConvertingCodec`] handles exactly one pair of [`ExternalShape`] and [`ColumnType`]. Codecs
//! for composite columns own one nested codec per element, key, value or field position. Codecs
//! are immutable once built and are shared across records through [`Arc`].

mod factory;
mod format;
mod parse;

use std::sync::Arc;

use serde_json::Value;

pub use factory::CodecFactory;

use crate::bail;
use crate::conversions::ConversionContext;
use crate::error::{ErrorKind, SinkResult};
use crate::types::{Cell, ColumnType, ExternalShape, ExternalValue};

/// Nested codecs of a composite codec.
#[derive(Debug)]
enum Elements {
    Scalar,
    /// Element codec of a list or set column.
    Sequence(Arc<ConvertingCodec>),
    Map {
        key: Arc<ConvertingCodec>,
        value: Arc<ConvertingCodec>,
    },
    Tuple(Vec<Arc<ConvertingCodec>>),
    Udt(Vec<(String, Arc<ConvertingCodec>)>),
}

/// Converts values of one external shape into cells of one column type, and back.
#[derive(Debug)]
pub struct ConvertingCodec {
    shape: ExternalShape,
    column_type: ColumnType,
    context: Arc<ConversionContext>,
    elements: Elements,
}

impl ConvertingCodec {
    fn scalar(
        shape: ExternalShape,
        column_type: ColumnType,
        context: Arc<ConversionContext>,
    ) -> Self {
        Self {
            shape,
            column_type,
            context,
            elements: Elements::Scalar,
        }
    }

    pub fn shape(&self) -> &ExternalShape {
        &self.shape
    }

    pub fn column_type(&self) -> &ColumnType {
        &self.column_type
    }

    pub fn context(&self) -> &ConversionContext {
        &self.context
    }

    /// Converts an external value into a cell of this codec's column type.
    ///
    /// Nulls, empty text and configured null strings yield [`Cell::Null`]. Values that cannot be
    /// represented by the column type fail with a conversion error.
    pub fn external_to_internal(&self, value: &ExternalValue) -> SinkResult<Cell> {
        match value {
            ExternalValue::Null => return Ok(Cell::Null),
            ExternalValue::Text(text) if self.context.is_null_text(text) => return Ok(Cell::Null),
            _ => {}
        }

        match self.elements {
            Elements::Scalar => self.parse_scalar(value),
            _ => match value {
                ExternalValue::Text(text) => {
                    let document: Value = serde_json::from_str(text)?;
                    self.parse_composite(&ExternalValue::from(document))
                }
                _ => self.parse_composite(value),
            },
        }
    }

    /// Converts a cell back into a value of this codec's external shape.
    ///
    /// Nulls become the first configured null string for text shapes and null otherwise.
    pub fn internal_to_external(&self, cell: &Cell) -> SinkResult<ExternalValue> {
        if cell.is_null() {
            return Ok(match (&self.shape, self.context.null_output()) {
                (ExternalShape::Text, Some(token)) => ExternalValue::text(token),
                _ => ExternalValue::Null,
            });
        }

        match self.elements {
            Elements::Scalar => self.format_scalar(cell),
            _ => {
                let composite = self.format_composite(cell)?;
                match self.shape {
                    ExternalShape::Text => Ok(ExternalValue::Text(composite.to_json().to_string())),
                    _ => Ok(composite),
                }
            }
        }
    }

    fn parse_composite(&self, value: &ExternalValue) -> SinkResult<Cell> {
        match (&self.elements, value) {
            (Elements::Sequence(element), ExternalValue::Array(items)) => {
                let mut cells = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    let cell = element
                        .external_to_internal(item)
                        .map_err(|err| err.with_context(format!("element {index}")))?;
                    if matches!(self.column_type, ColumnType::Set(_)) && cells.contains(&cell) {
                        continue;
                    }
                    cells.push(cell);
                }

                match self.column_type {
                    ColumnType::Set(_) => Ok(Cell::Set(cells)),
                    _ => Ok(Cell::List(cells)),
                }
            }
            (Elements::Map { key, value: codec }, ExternalValue::Object(entries)) => {
                let mut cells = Vec::with_capacity(entries.len());
                for (name, item) in entries {
                    let key_cell = key.external_to_internal(&ExternalValue::text(name.as_str()))?;
                    if key_cell.is_null() {
                        bail!(
                            ErrorKind::ConversionError,
                            "Invalid map key",
                            format!("key `{name}` converts to null")
                        );
                    }
                    let value_cell = codec
                        .external_to_internal(item)
                        .map_err(|err| err.with_context(format!("key `{name}`")))?;
                    cells.push((key_cell, value_cell));
                }
                Ok(Cell::Map(cells))
            }
            (Elements::Tuple(codecs), ExternalValue::Array(items)) => {
                if codecs.len() != items.len() {
                    bail!(
                        ErrorKind::ConversionError,
                        "Invalid tuple size",
                        format!(
                            "{} expects {} elements, got {}",
                            self.column_type,
                            codecs.len(),
                            items.len()
                        )
                    );
                }

                codecs
                    .iter()
                    .zip(items)
                    .enumerate()
                    .map(|(index, (codec, item))| {
                        codec
                            .external_to_internal(item)
                            .map_err(|err| err.with_context(format!("element {index}")))
                    })
                    .collect::<SinkResult<Vec<_>>>()
                    .map(Cell::Tuple)
            }
            (Elements::Udt(fields), ExternalValue::Object(entries)) => {
                if let Some((unknown, _)) = entries
                    .iter()
                    .find(|(name, _)| !fields.iter().any(|(field, _)| field == name))
                {
                    bail!(
                        ErrorKind::ConversionError,
                        "Unknown user type field",
                        format!("{} has no field `{unknown}`", self.column_type)
                    );
                }

                let mut cells = Vec::with_capacity(fields.len());
                for (name, codec) in fields {
                    let cell = match value.field(name) {
                        Some(item) => codec
                            .external_to_internal(item)
                            .map_err(|err| err.with_context(format!("field `{name}`")))?,
                        None => Cell::Null,
                    };
                    cells.push((name.clone(), cell));
                }
                Ok(Cell::Udt(cells))
            }
            (_, value) => bail!(
                ErrorKind::ConversionError,
                "Could not convert composite value",
                format!("a {} value cannot be converted to {}", value.type_name(), self.column_type)
            ),
        }
    }

    fn format_composite(&self, cell: &Cell) -> SinkResult<ExternalValue> {
        match (&self.elements, cell) {
            (Elements::Sequence(element), Cell::List(cells) | Cell::Set(cells)) => cells
                .iter()
                .map(|cell| element.internal_to_external(cell))
                .collect::<SinkResult<Vec<_>>>()
                .map(ExternalValue::Array),
            (Elements::Map { key, value }, Cell::Map(entries)) => {
                let mut fields = Vec::with_capacity(entries.len());
                for (key_cell, value_cell) in entries {
                    let name = match key.internal_to_external(key_cell)? {
                        ExternalValue::Text(name) => name,
                        other => other.to_json().to_string(),
                    };
                    fields.push((name, value.internal_to_external(value_cell)?));
                }
                Ok(ExternalValue::Object(fields))
            }
            (Elements::Tuple(codecs), Cell::Tuple(cells)) if codecs.len() == cells.len() => codecs
                .iter()
                .zip(cells)
                .map(|(codec, cell)| codec.internal_to_external(cell))
                .collect::<SinkResult<Vec<_>>>()
                .map(ExternalValue::Array),
            (Elements::Udt(fields), Cell::Udt(cells)) => {
                let mut values = Vec::with_capacity(fields.len());
                for (name, codec) in fields {
                    let cell = cells
                        .iter()
                        .find(|(field, _)| field == name)
                        .map(|(_, cell)| cell)
                        .unwrap_or(&Cell::Null);
                    values.push((name.clone(), codec.internal_to_external(cell)?));
                }
                Ok(ExternalValue::Object(values))
            }
            _ => bail!(
                ErrorKind::ConversionError,
                "Could not format composite value",
                format!("{cell:?} is not a {} value", self.column_type)
            ),
        }
    }
}
