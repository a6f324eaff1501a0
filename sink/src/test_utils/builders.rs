use std::collections::BTreeMap;

use config::shared::{CodecConfig, IgnoreErrorsPolicy, SinkConfig, TableConfig, TopicConfig};

use crate::mapping::{RecordData, SinkRecord};
use crate::statement::{ColumnKind, ColumnSchema, TableSchema};
use crate::types::{ColumnType, ExternalValue};

/// Builds a record whose key and value carry no schema.
pub fn schemaless_record<H>(
    topic: &str,
    key: serde_json::Value,
    value: serde_json::Value,
    handle: H,
) -> SinkRecord<H> {
    SinkRecord::new(
        topic,
        RecordData::schemaless(ExternalValue::from(key)),
        RecordData::schemaless(ExternalValue::from(value)),
        handle,
    )
}

/// Builds a table schema from `(name, type, kind)` triples.
pub fn table_schema(
    keyspace: &str,
    table: &str,
    columns: Vec<(&str, ColumnType, ColumnKind)>,
) -> TableSchema {
    TableSchema::new(
        keyspace,
        table,
        columns
            .into_iter()
            .map(|(name, column_type, kind)| ColumnSchema::new(name, column_type, kind))
            .collect(),
    )
}

/// Builds a sink configuration routing one topic to the given tables.
pub fn sink_config(
    topic: &str,
    tables: Vec<TableConfig>,
    ignore_errors: IgnoreErrorsPolicy,
    max_concurrent_requests: usize,
) -> SinkConfig {
    SinkConfig {
        name: "test-sink".to_string(),
        max_concurrent_requests,
        query_execution_timeout_ms: SinkConfig::DEFAULT_QUERY_EXECUTION_TIMEOUT_MS,
        ignore_errors,
        topics: BTreeMap::from([(
            topic.to_string(),
            TopicConfig {
                codec: CodecConfig::default(),
                tables,
            },
        )]),
    }
}
