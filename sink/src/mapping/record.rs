use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::SinkError;
use crate::mapping::field::{FieldPath, FieldSource};
use crate::types::{ExternalShape, ExternalValue};

/// Acknowledgement channel of the transport that delivered a record.
///
/// Exactly one of [`DeliveryHandle::ack`] and [`DeliveryHandle::fail`] is called per record.
pub trait DeliveryHandle: Send + Sync + 'static {
    /// Marks the record as processed, including tolerated failures.
    fn ack(&self);

    /// Marks the record as failed so that the transport can redeliver or dead-letter it.
    fn fail(&self, error: &SinkError);
}

/// Declared shape of a key or value payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordSchema {
    shape: ExternalShape,
}

impl RecordSchema {
    pub fn new(shape: ExternalShape) -> Self {
        Self { shape }
    }

    pub fn shape(&self) -> &ExternalShape {
        &self.shape
    }

    /// Structural hash of the schema, equal for schemas declaring the same shapes.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.shape.hash(&mut hasher);
        hasher.finish()
    }

    /// Returns the declared shape at a path, or [`None`] when the schema lacks the field.
    pub fn shape_at(&self, segments: &[String]) -> Option<&ExternalShape> {
        segments
            .iter()
            .try_fold(&self.shape, |shape, segment| shape.field(segment))
    }
}

/// A key or value payload with its optional schema.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordData {
    pub value: ExternalValue,
    pub schema: Option<RecordSchema>,
}

impl RecordData {
    /// Payload without a schema, whose fields are all documents.
    pub fn schemaless(value: ExternalValue) -> Self {
        Self {
            value,
            schema: None,
        }
    }

    pub fn with_schema(value: ExternalValue, schema: RecordSchema) -> Self {
        Self {
            value,
            schema: Some(schema),
        }
    }

    pub fn null() -> Self {
        Self::schemaless(ExternalValue::Null)
    }

    pub fn fingerprint(&self) -> Option<u64> {
        self.schema.as_ref().map(RecordSchema::fingerprint)
    }

    /// Returns the value at a path.
    ///
    /// Traversing through a null parent yields null, while an absent field yields [`None`].
    pub fn value_at(&self, segments: &[String]) -> Option<&ExternalValue> {
        let mut current = &self.value;
        for segment in segments {
            match current {
                ExternalValue::Null => return Some(current),
                ExternalValue::Object(_) => current = current.field(segment)?,
                _ => return None,
            }
        }
        Some(current)
    }

    /// Returns the shape a codec must accept for the value at a path.
    ///
    /// Schemaless payloads are documents throughout. With a schema, [`None`] means the schema
    /// does not declare the field.
    pub fn shape_at(&self, segments: &[String]) -> Option<ExternalShape> {
        match &self.schema {
            Some(schema) => schema.shape_at(segments).cloned(),
            None => Some(ExternalShape::Document),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordHeader {
    pub name: String,
    pub value: ExternalValue,
}

/// A record delivered by the transport, bound for one or more tables.
pub struct SinkRecord<H> {
    pub topic: String,
    pub key: RecordData,
    pub value: RecordData,
    pub headers: Vec<RecordHeader>,
    /// Broker timestamp in milliseconds since the Unix epoch.
    pub timestamp: Option<i64>,
    pub handle: H,
}

impl<H> SinkRecord<H> {
    pub fn new(topic: impl Into<String>, key: RecordData, value: RecordData, handle: H) -> Self {
        Self {
            topic: topic.into(),
            key,
            value,
            headers: Vec::new(),
            timestamp: None,
            handle,
        }
    }

    pub fn with_headers(mut self, headers: Vec<RecordHeader>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// A record whose whole value payload is null, which deletes its row.
    pub fn is_tombstone(&self) -> bool {
        self.value.value.is_null()
    }

    pub fn header(&self, name: &str) -> Option<&RecordHeader> {
        self.headers.iter().find(|header| header.name == name)
    }

    /// Returns the value addressed by a field path, or [`None`] when the field is absent.
    pub fn field(&self, path: &FieldPath) -> Option<&ExternalValue> {
        match path.source {
            FieldSource::Key => self.key.value_at(&path.segments),
            FieldSource::Value => self.value.value_at(&path.segments),
            FieldSource::Header => path
                .segments
                .first()
                .and_then(|name| self.header(name))
                .map(|header| &header.value),
        }
    }

    /// Returns the shape of the field addressed by a path, or [`None`] when it is not declared.
    pub fn field_shape(&self, path: &FieldPath) -> Option<ExternalShape> {
        match path.source {
            FieldSource::Key => self.key.shape_at(&path.segments),
            FieldSource::Value => self.value.shape_at(&path.segments),
            // Header values are always converted from their document form.
            FieldSource::Header => Some(ExternalShape::Document),
        }
    }
}

impl<H> fmt::Debug for SinkRecord<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkRecord")
            .field("topic", &self.topic)
            .field("key", &self.key.value)
            .field("value", &self.value.value)
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

impl<H> fmt::Display for SinkRecord<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} key={} value={}",
            self.topic,
            self.key.value.to_json(),
            self.value.value.to_json()
        )
    }
}
