use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::bail;
use crate::codec::{ConvertingCodec, Elements};
use crate::conversions::ConversionContext;
use crate::error::{ErrorKind, SinkResult};
use crate::types::{ColumnType, ExternalShape};

type CodecKey = (ExternalShape, ColumnType);

/// Builds and caches codecs for one [`ConversionContext`].
///
/// Codecs are built lazily on first request and shared afterwards. Composite column types are
/// resolved recursively, so an unsupported element type fails the whole request.
#[derive(Debug)]
pub struct CodecFactory {
    context: Arc<ConversionContext>,
    codecs: Mutex<HashMap<CodecKey, Arc<ConvertingCodec>>>,
}

impl CodecFactory {
    pub fn new(context: Arc<ConversionContext>) -> Self {
        Self {
            context,
            codecs: Mutex::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &Arc<ConversionContext> {
        &self.context
    }

    /// Returns the codec converting values of `shape` into cells of `column_type`.
    ///
    /// Fails with [`ErrorKind::UnsupportedConversion`] when no such conversion exists.
    pub fn codec_for(
        &self,
        shape: &ExternalShape,
        column_type: &ColumnType,
    ) -> SinkResult<Arc<ConvertingCodec>> {
        let key = (shape.clone(), column_type.clone());
        if let Some(codec) = self.cached(&key) {
            return Ok(codec);
        }

        // The lock is not held while building since composite codecs recurse into the factory.
        let codec = Arc::new(self.build(shape, column_type)?);
        debug!(%shape, %column_type, "created codec");

        let mut codecs = self.codecs.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(codecs.entry(key).or_insert(codec).clone())
    }

    fn cached(&self, key: &CodecKey) -> Option<Arc<ConvertingCodec>> {
        self.codecs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn build(&self, shape: &ExternalShape, column_type: &ColumnType) -> SinkResult<ConvertingCodec> {
        if !column_type.is_composite() {
            if !supports_scalar(shape, column_type) {
                bail!(
                    ErrorKind::UnsupportedConversion,
                    "Unsupported conversion",
                    format!("no codec converts {shape} into {column_type}")
                );
            }

            if let ColumnType::Integer(integer) = column_type
                && !matches!(integer.bits, 8 | 16 | 32 | 64)
            {
                bail!(
                    ErrorKind::UnsupportedConversion,
                    "Unsupported integer width",
                    format!("{integer} has no native representation")
                );
            }

            return Ok(ConvertingCodec::scalar(
                shape.clone(),
                column_type.clone(),
                self.context.clone(),
            ));
        }

        let elements = self.build_elements(shape, column_type)?;
        Ok(ConvertingCodec {
            shape: shape.clone(),
            column_type: column_type.clone(),
            context: self.context.clone(),
            elements,
        })
    }

    fn build_elements(&self, shape: &ExternalShape, column_type: &ColumnType) -> SinkResult<Elements> {
        // Composite text is parsed as a JSON document before conversion.
        let element_shape = |shape: &ExternalShape| match shape {
            ExternalShape::Text | ExternalShape::Document => ExternalShape::Document,
            other => other.clone(),
        };

        let elements = match (shape, column_type) {
            (
                ExternalShape::Text | ExternalShape::Document,
                ColumnType::List(element) | ColumnType::Set(element),
            ) => Elements::Sequence(self.codec_for(&ExternalShape::Document, element)?),
            (ExternalShape::List(item), ColumnType::List(element) | ColumnType::Set(element)) => {
                Elements::Sequence(self.codec_for(item, element)?)
            }
            (ExternalShape::Text | ExternalShape::Document, ColumnType::Map(key, value)) => {
                Elements::Map {
                    key: self.codec_for(&ExternalShape::Text, key)?,
                    value: self.codec_for(&ExternalShape::Document, value)?,
                }
            }
            (ExternalShape::Map(item), ColumnType::Map(key, value)) => Elements::Map {
                key: self.codec_for(&ExternalShape::Text, key)?,
                value: self.codec_for(item, value)?,
            },
            (
                ExternalShape::Text | ExternalShape::Document | ExternalShape::List(_),
                ColumnType::Tuple(types),
            ) => {
                let item = match shape {
                    ExternalShape::List(item) => item.as_ref().clone(),
                    other => element_shape(other),
                };
                Elements::Tuple(
                    types
                        .iter()
                        .map(|element| self.codec_for(&item, element))
                        .collect::<SinkResult<Vec<_>>>()?,
                )
            }
            (
                ExternalShape::Text | ExternalShape::Document | ExternalShape::Map(_),
                ColumnType::Udt { fields, .. },
            ) => {
                let item = match shape {
                    ExternalShape::Map(item) => item.as_ref().clone(),
                    other => element_shape(other),
                };
                Elements::Udt(
                    fields
                        .iter()
                        .map(|(name, field)| Ok((name.clone(), self.codec_for(&item, field)?)))
                        .collect::<SinkResult<Vec<_>>>()?,
                )
            }
            (ExternalShape::Struct(declared), ColumnType::Udt { name, fields }) => {
                if let Some((unknown, _)) = declared
                    .iter()
                    .find(|(field, _)| !fields.iter().any(|(name, _)| name == field))
                {
                    bail!(
                        ErrorKind::UnsupportedConversion,
                        "Unsupported conversion",
                        format!("user type {name} has no field `{unknown}`")
                    );
                }

                let mut codecs = Vec::with_capacity(fields.len());
                for (field, field_type) in fields {
                    let field_shape = shape.field(field).unwrap_or(&ExternalShape::Document);
                    codecs.push((field.clone(), self.codec_for(field_shape, field_type)?));
                }
                Elements::Udt(codecs)
            }
            _ => bail!(
                ErrorKind::UnsupportedConversion,
                "Unsupported conversion",
                format!("no codec converts {shape} into {column_type}")
            ),
        };

        Ok(elements)
    }
}

/// Returns `true` when a scalar column type accepts values of the shape.
fn supports_scalar(shape: &ExternalShape, column_type: &ColumnType) -> bool {
    match shape {
        ExternalShape::Text | ExternalShape::Document => true,
        ExternalShape::Boolean => {
            matches!(column_type, ColumnType::Boolean)
                || column_type.is_numeric()
                || column_type.is_textual()
        }
        ExternalShape::Integer | ExternalShape::Float | ExternalShape::Decimal => {
            column_type.is_numeric()
                || column_type.is_temporal()
                || column_type.is_textual()
                || matches!(
                    column_type,
                    ColumnType::Boolean | ColumnType::Uuid | ColumnType::TimeUuid
                )
        }
        ExternalShape::Bytes => {
            matches!(column_type, ColumnType::Blob)
                || column_type.is_geometry()
                || column_type.is_textual()
        }
        ExternalShape::List(_) | ExternalShape::Map(_) | ExternalShape::Struct(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use config::shared::CodecConfig;

    use super::*;
    use crate::types::IntegerType;

    fn factory() -> CodecFactory {
        CodecFactory::new(Arc::new(
            ConversionContext::from_config(&CodecConfig::default()).unwrap(),
        ))
    }

    #[test]
    fn codecs_are_cached_per_pair() {
        let factory = factory();

        let first = factory
            .codec_for(&ExternalShape::Text, &ColumnType::Timestamp)
            .unwrap();
        let second = factory
            .codec_for(&ExternalShape::Text, &ColumnType::Timestamp)
            .unwrap();
        let other = factory
            .codec_for(&ExternalShape::Integer, &ColumnType::Timestamp)
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &other));
    }

    #[test]
    fn unsupported_pairs_fail_at_creation() {
        let factory = factory();

        for (shape, column_type) in [
            (ExternalShape::Bytes, ColumnType::Timestamp),
            (ExternalShape::Boolean, ColumnType::Uuid),
            (ExternalShape::Integer, ColumnType::Blob),
            (ExternalShape::list(ExternalShape::Text), ColumnType::Text),
            (ExternalShape::Integer, ColumnType::list(ColumnType::Text)),
            (
                ExternalShape::list(ExternalShape::Bytes),
                ColumnType::list(ColumnType::Date),
            ),
            (
                ExternalShape::Text,
                ColumnType::Integer(IntegerType::signed(24)),
            ),
        ] {
            let err = factory.codec_for(&shape, &column_type).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::UnsupportedConversion, "{shape} -> {column_type}");
        }
    }

    #[test]
    fn nested_composites_resolve_recursively() {
        let factory = factory();
        let column_type = ColumnType::map(
            ColumnType::Text,
            ColumnType::list(ColumnType::Tuple(vec![ColumnType::Integer(IntegerType::INT), ColumnType::Text])),
        );

        let codec = factory.codec_for(&ExternalShape::Document, &column_type).unwrap();
        assert_eq!(codec.column_type(), &column_type);
    }

    #[test]
    fn struct_fields_must_exist_in_the_user_type() {
        let factory = factory();
        let column_type = ColumnType::udt("point", vec![("x", ColumnType::Double)]);
        let shape = ExternalShape::structure(vec![
            ("x", ExternalShape::Float),
            ("z", ExternalShape::Float),
        ]);

        assert_eq!(
            factory.codec_for(&shape, &column_type).unwrap_err().kind(),
            ErrorKind::UnsupportedConversion
        );
    }
}
