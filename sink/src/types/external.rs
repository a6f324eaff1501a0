use std::fmt;

use bigdecimal::BigDecimal;
use bigdecimal::num_traits::ToPrimitive;
use serde_json::{Map, Number, Value};

/// A field value as carried by an inbound record.
#[derive(Debug, Clone, PartialEq)]
pub enum ExternalValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(BigDecimal),
    Text(String),
    Bytes(Vec<u8>),
    Array(Vec<ExternalValue>),
    /// Nested object or struct, fields in declaration order.
    Object(Vec<(String, ExternalValue)>),
}

/// Declared shape of an external value.
///
/// Codecs are selected from a shape and a [`crate::types::ColumnType`]. Fields of schemaless
/// payloads have the [`ExternalShape::Document`] shape, which admits any value tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExternalShape {
    Boolean,
    Integer,
    Float,
    Decimal,
    Text,
    Bytes,
    Document,
    List(Box<ExternalShape>),
    /// String-keyed map whose values all share one shape.
    Map(Box<ExternalShape>),
    Struct(Vec<(String, ExternalShape)>),
}

impl ExternalValue {
    pub fn text(value: impl Into<String>) -> Self {
        ExternalValue::Text(value.into())
    }

    pub fn object<K: Into<String>>(fields: impl IntoIterator<Item = (K, ExternalValue)>) -> Self {
        ExternalValue::Object(
            fields
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        )
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ExternalValue::Null)
    }

    /// Returns the named field of an object.
    pub fn field(&self, name: &str) -> Option<&ExternalValue> {
        match self {
            ExternalValue::Object(fields) => fields
                .iter()
                .find(|(field, _)| field == name)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    /// Short name of the variant, used in error details.
    pub fn type_name(&self) -> &'static str {
        match self {
            ExternalValue::Null => "null",
            ExternalValue::Bool(_) => "boolean",
            ExternalValue::Int(_) => "integer",
            ExternalValue::Float(_) => "float",
            ExternalValue::Decimal(_) => "decimal",
            ExternalValue::Text(_) => "text",
            ExternalValue::Bytes(_) => "bytes",
            ExternalValue::Array(_) => "array",
            ExternalValue::Object(_) => "object",
        }
    }

    /// Converts the value into a JSON tree.
    ///
    /// Bytes become base64 strings, and decimals become JSON numbers when they fit an `f64`.
    pub fn to_json(&self) -> Value {
        match self {
            ExternalValue::Null => Value::Null,
            ExternalValue::Bool(value) => Value::Bool(*value),
            ExternalValue::Int(value) => Value::Number((*value).into()),
            ExternalValue::Float(value) => Number::from_f64(*value)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(value.to_string())),
            ExternalValue::Decimal(value) => value
                .to_f64()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(value.to_string())),
            ExternalValue::Text(value) => Value::String(value.clone()),
            ExternalValue::Bytes(value) => {
                use base64::Engine;
                Value::String(base64::engine::general_purpose::STANDARD.encode(value))
            }
            ExternalValue::Array(values) => {
                Value::Array(values.iter().map(ExternalValue::to_json).collect())
            }
            ExternalValue::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect::<Map<_, _>>(),
            ),
        }
    }
}

impl From<Value> for ExternalValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => ExternalValue::Null,
            Value::Bool(value) => ExternalValue::Bool(value),
            Value::Number(number) => {
                if let Some(value) = number.as_i64() {
                    ExternalValue::Int(value)
                } else if let Some(value) = number.as_u64() {
                    ExternalValue::Decimal(BigDecimal::from(value))
                } else {
                    ExternalValue::Float(number.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(value) => ExternalValue::Text(value),
            Value::Array(values) => {
                ExternalValue::Array(values.into_iter().map(ExternalValue::from).collect())
            }
            Value::Object(fields) => ExternalValue::Object(
                fields
                    .into_iter()
                    .map(|(name, value)| (name, ExternalValue::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for ExternalValue {
    fn from(value: &str) -> Self {
        ExternalValue::Text(value.to_string())
    }
}

impl From<i64> for ExternalValue {
    fn from(value: i64) -> Self {
        ExternalValue::Int(value)
    }
}

impl From<bool> for ExternalValue {
    fn from(value: bool) -> Self {
        ExternalValue::Bool(value)
    }
}

impl ExternalShape {
    pub fn list(element: ExternalShape) -> Self {
        ExternalShape::List(Box::new(element))
    }

    pub fn map(value: ExternalShape) -> Self {
        ExternalShape::Map(Box::new(value))
    }

    pub fn structure(fields: Vec<(&str, ExternalShape)>) -> Self {
        ExternalShape::Struct(
            fields
                .into_iter()
                .map(|(name, shape)| (name.to_string(), shape))
                .collect(),
        )
    }

    /// Returns the declared shape of a struct field.
    pub fn field(&self, name: &str) -> Option<&ExternalShape> {
        match self {
            ExternalShape::Struct(fields) => fields
                .iter()
                .find(|(field, _)| field == name)
                .map(|(_, shape)| shape),
            _ => None,
        }
    }
}

impl fmt::Display for ExternalShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExternalShape::Boolean => f.write_str("boolean"),
            ExternalShape::Integer => f.write_str("integer"),
            ExternalShape::Float => f.write_str("float"),
            ExternalShape::Decimal => f.write_str("decimal"),
            ExternalShape::Text => f.write_str("text"),
            ExternalShape::Bytes => f.write_str("bytes"),
            ExternalShape::Document => f.write_str("document"),
            ExternalShape::List(element) => write!(f, "list<{element}>"),
            ExternalShape::Map(value) => write!(f, "map<text, {value}>"),
            ExternalShape::Struct(fields) => {
                f.write_str("struct<")?;
                for (index, (name, shape)) in fields.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: {shape}")?;
                }
                f.write_str(">")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn converts_from_json_tree() {
        let value = ExternalValue::from(json!({"id": 7, "tags": ["a"], "price": 1.5}));

        assert_eq!(value.field("id"), Some(&ExternalValue::Int(7)));
        assert_eq!(
            value.field("tags"),
            Some(&ExternalValue::Array(vec![ExternalValue::text("a")]))
        );
        assert_eq!(value.field("price"), Some(&ExternalValue::Float(1.5)));
        assert_eq!(value.field("missing"), None);
    }

    #[test]
    fn to_json_encodes_bytes_as_base64() {
        let value = ExternalValue::Bytes(vec![0xde, 0xad]);
        assert_eq!(value.to_json(), json!("3q0="));
    }

    #[test]
    fn shape_display_is_readable() {
        let shape = ExternalShape::structure(vec![
            ("id", ExternalShape::Integer),
            ("tags", ExternalShape::list(ExternalShape::Text)),
        ]);
        assert_eq!(shape.to_string(), "struct<id: integer, tags: list<text>>");
    }
}
