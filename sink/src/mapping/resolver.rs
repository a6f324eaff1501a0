use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use config::shared::{ConsistencyLevel, TableConfig, TimeUnit};
use tracing::{debug, warn};

use crate::codec::{CodecFactory, ConvertingCodec};
use crate::conversions::temporal::convert_units;
use crate::error::{ErrorKind, SinkResult};
use crate::mapping::cache::{ResolvedCodecs, ShapeCache, ShapeKey};
use crate::mapping::field::{FieldMapping, FieldPath};
use crate::mapping::record::SinkRecord;
use crate::statement::{
    BoundStatement, BoundValue, StatementTemplate, TIMESTAMP_MARKER, TTL_MARKER, TableSchema,
    WriteOptions,
};
use crate::types::{Cell, ColumnType, ExternalShape, IntegerType};
use crate::{bail, sink_error};

/// A column bound to a record field.
#[derive(Debug, Clone)]
struct MappedColumn {
    name: String,
    path: FieldPath,
    column_type: ColumnType,
    primary_key: bool,
}

/// Turns records into statements for one destination table.
///
/// Everything derivable from the configuration and the table schema is resolved at
/// construction: column types, statement texts and the tombstone policy. Per record, only the
/// codecs of the record's schemas are looked up, through the shared [`ShapeCache`].
#[derive(Debug)]
pub struct TableMapper {
    name: String,
    schema: Arc<TableSchema>,
    factory: Arc<CodecFactory>,
    cache: Arc<ShapeCache>,
    columns: Vec<MappedColumn>,
    ttl_field: Option<FieldPath>,
    timestamp_field: Option<FieldPath>,
    write: StatementTemplate,
    delete: Option<StatementTemplate>,
    delete_on_all_null: bool,
    ttl_time_unit: TimeUnit,
    timestamp_time_unit: TimeUnit,
    null_to_unset: bool,
    consistency: ConsistencyLevel,
    timeout: Option<Duration>,
}

impl TableMapper {
    /// Validates the table mapping against the schema and prepares its statements.
    ///
    /// Every failure here is a configuration error: unknown columns, unmapped primary key
    /// columns, malformed mappings and column types no codec supports.
    pub fn new(
        config: &TableConfig,
        schema: Arc<TableSchema>,
        factory: Arc<CodecFactory>,
        cache: Arc<ShapeCache>,
        timeout: Option<Duration>,
    ) -> SinkResult<Self> {
        let name = config.qualified_name();
        let mapping = FieldMapping::parse(&config.mapping)
            .map_err(|err| err.with_context(format!("table {name}")))?;

        let mut columns = Vec::new();
        for (column, path) in mapping.field_entries() {
            let Some(column_schema) = schema.column(column) else {
                bail!(
                    ErrorKind::UnknownColumn,
                    "Unknown column",
                    format!("table {name} has no column `{column}` (mapped to `{path}`)")
                );
            };

            // Schemaless fields are documents, which every supported column type accepts.
            factory
                .codec_for(&ExternalShape::Document, &column_schema.column_type)
                .map_err(|err| err.with_context(format!("column `{column}` of {name}")))?;

            columns.push(MappedColumn {
                name: column.to_string(),
                path: path.clone(),
                column_type: column_schema.column_type.clone(),
                primary_key: column_schema.is_primary_key(),
            });
        }

        let functions = mapping.function_entries().collect::<Vec<_>>();
        for (column, function) in &functions {
            match schema.column(column) {
                Some(column_schema) if column_schema.is_primary_key() => bail!(
                    ErrorKind::InvalidMapping,
                    "Invalid mapping entry",
                    format!("primary key column `{column}` of {name} cannot be mapped to {function}")
                ),
                Some(_) => {}
                None => bail!(
                    ErrorKind::UnknownColumn,
                    "Unknown column",
                    format!("table {name} has no column `{column}` (mapped to {function})")
                ),
            }
        }

        if let Some(unmapped) = schema
            .primary_key()
            .find(|key| !columns.iter().any(|column| column.name == key.name))
        {
            bail!(
                ErrorKind::InvalidMapping,
                "Unmapped primary key column",
                format!("primary key column `{}` of {name} is not mapped", unmapped.name)
            );
        }

        let ttl_field = mapping.ttl_field().cloned();
        let timestamp_field = mapping.timestamp_field().cloned();
        if ttl_field.is_some() || timestamp_field.is_some() {
            factory.codec_for(&ExternalShape::Document, &ColumnType::Integer(IntegerType::BIGINT))?;
        }

        let fixed_ttl = match config.ttl {
            ttl if ttl < 0 => None,
            ttl => Some(convert_units(ttl, config.ttl_time_unit, TimeUnit::Seconds).ok_or_else(
                || {
                    sink_error!(
                        ErrorKind::ConfigError,
                        "Invalid ttl",
                        format!("ttl {ttl} of {name} overflows seconds")
                    )
                },
            )?),
        };

        let regular = columns
            .iter()
            .filter(|column| !column.primary_key)
            .map(|column| column.name.as_str())
            .collect::<Vec<_>>();

        let write = if schema.is_counter_table() {
            if !functions.is_empty() || ttl_field.is_some() || fixed_ttl.is_some() {
                bail!(
                    ErrorKind::InvalidMapping,
                    "Invalid counter table mapping",
                    format!("counter table {name} accepts neither functions nor a ttl")
                );
            }
            if let Some(column) = columns
                .iter()
                .find(|column| !column.primary_key && column.column_type != ColumnType::Counter)
            {
                bail!(
                    ErrorKind::InvalidMapping,
                    "Invalid counter table mapping",
                    format!("column `{}` of counter table {name} is not a counter", column.name)
                );
            }
            StatementTemplate::counter_update(&schema, &regular)
        } else {
            let bound = columns
                .iter()
                .map(|column| column.name.as_str())
                .collect::<Vec<_>>();
            StatementTemplate::insert(
                &schema,
                &bound,
                &functions,
                WriteOptions {
                    bind_ttl: ttl_field.is_some(),
                    fixed_ttl,
                    bind_timestamp: true,
                },
            )
        };

        let delete = config
            .deletes_enabled
            .then(|| StatementTemplate::delete(&schema, !schema.is_counter_table()));

        let delete_on_all_null = config.deletes_enabled && !regular.is_empty() && functions.is_empty();
        if config.deletes_enabled && !functions.is_empty() {
            warn!(
                table = %name,
                "mapping has function columns, rows with only null values are written instead of deleted"
            );
        }

        debug!(table = %name, statement = %write.text, "prepared table mapping");

        Ok(Self {
            name,
            schema,
            factory,
            cache,
            columns,
            ttl_field,
            timestamp_field,
            write,
            delete,
            delete_on_all_null,
            ttl_time_unit: config.ttl_time_unit,
            timestamp_time_unit: config.timestamp_time_unit,
            null_to_unset: config.null_to_unset,
            consistency: config.consistency_level,
            timeout,
        })
    }

    /// Returns `keyspace.table`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn write_template(&self) -> &StatementTemplate {
        &self.write
    }

    pub fn delete_template(&self) -> Option<&StatementTemplate> {
        self.delete.as_ref()
    }

    /// Whether rows whose regular columns are all null become deletes.
    pub fn deletes_on_all_null(&self) -> bool {
        self.delete_on_all_null
    }

    /// Converts a record into the statement writing it to this table.
    ///
    /// Tombstone records, and records whose mapped regular columns are all null, become deletes
    /// of the addressed row when deletes are enabled.
    pub fn map<H>(&self, record: &SinkRecord<H>) -> SinkResult<BoundStatement> {
        let codecs = self.codecs_for(record)?;
        let tombstone = record.is_tombstone() && self.delete.is_some();

        let mut cells = Vec::with_capacity(self.columns.len());
        for (column, codec) in self.columns.iter().zip(&codecs.columns) {
            if tombstone && !column.primary_key {
                cells.push(Cell::Null);
                continue;
            }

            let Some(value) = record.field(&column.path) else {
                bail!(
                    ErrorKind::MissingField,
                    "Missing record field",
                    format!(
                        "required field `{}` (mapped to column `{}`) is missing from the record",
                        column.path, column.name
                    )
                );
            };

            let cell = codec.external_to_internal(value).map_err(|err| {
                err.with_context(format!(
                    "column `{}` ({}) from field `{}`",
                    column.name, column.column_type, column.path
                ))
            })?;

            if column.primary_key && cell.is_null() {
                bail!(
                    ErrorKind::NullPrimaryKey,
                    "Null primary key",
                    format!(
                        "primary key column `{}` of {} is null (field `{}`)",
                        column.name, self.name, column.path
                    )
                );
            }
            cells.push(cell);
        }

        let all_null = self
            .columns
            .iter()
            .zip(&cells)
            .filter(|(column, _)| !column.primary_key)
            .all(|(_, cell)| cell.is_null());

        let timestamp = self.timestamp_value(record, &codecs)?;
        match &self.delete {
            Some(delete) if tombstone || (self.delete_on_all_null && all_null) => {
                Ok(self.bind(delete, &cells, None, timestamp))
            }
            _ => {
                let ttl = self.ttl_value(record, &codecs)?;
                Ok(self.bind(&self.write, &cells, ttl, timestamp))
            }
        }
    }

    fn bind(
        &self,
        template: &StatementTemplate,
        cells: &[Cell],
        ttl: Option<BoundValue>,
        timestamp: BoundValue,
    ) -> BoundStatement {
        let values = template
            .markers
            .iter()
            .map(|marker| {
                let value = match marker.as_str() {
                    TTL_MARKER => ttl.clone().unwrap_or(BoundValue::Unset),
                    TIMESTAMP_MARKER => timestamp.clone(),
                    column => self
                        .columns
                        .iter()
                        .position(|mapped| mapped.name == column)
                        .map(|index| self.bound_cell(&cells[index]))
                        .unwrap_or(BoundValue::Unset),
                };
                (marker.clone(), value)
            })
            .collect();

        BoundStatement {
            kind: template.kind,
            table: self.name.clone(),
            text: template.text.clone(),
            values,
            consistency: self.consistency,
            timeout: self.timeout,
        }
    }

    fn bound_cell(&self, cell: &Cell) -> BoundValue {
        if cell.is_null() && self.null_to_unset {
            BoundValue::Unset
        } else {
            BoundValue::Value(cell.clone())
        }
    }

    /// Time to live in seconds, from the `__ttl` field converted from the table's ttl unit.
    fn ttl_value<H>(
        &self,
        record: &SinkRecord<H>,
        codecs: &ResolvedCodecs,
    ) -> SinkResult<Option<BoundValue>> {
        let (Some(path), Some(codec)) = (&self.ttl_field, &codecs.ttl) else {
            return Ok(None);
        };

        let Some(amount) = self.integer_field(record, path, codec)? else {
            return Ok(Some(BoundValue::Unset));
        };

        let seconds = convert_units(amount, self.ttl_time_unit, TimeUnit::Seconds)
            .and_then(|seconds| i32::try_from(seconds).ok())
            .filter(|seconds| *seconds >= 0)
            .ok_or_else(|| {
                sink_error!(
                    ErrorKind::ValueOutOfRange,
                    "Value out of range",
                    format!("ttl {amount} {:?} from field `{path}` is not a valid ttl", self.ttl_time_unit)
                )
            })?;

        Ok(Some(BoundValue::Value(Cell::I32(seconds))))
    }

    /// Write timestamp in microseconds, from the `__timestamp` field or the record timestamp.
    fn timestamp_value<H>(
        &self,
        record: &SinkRecord<H>,
        codecs: &ResolvedCodecs,
    ) -> SinkResult<BoundValue> {
        let micros = match (&self.timestamp_field, &codecs.timestamp) {
            (Some(path), Some(codec)) => match self.integer_field(record, path, codec)? {
                Some(amount) => Some(
                    convert_units(amount, self.timestamp_time_unit, TimeUnit::Microseconds)
                        .ok_or_else(|| {
                            sink_error!(
                                ErrorKind::ValueOutOfRange,
                                "Value out of range",
                                format!("timestamp {amount} from field `{path}` overflows microseconds")
                            )
                        })?,
                ),
                None => None,
            },
            _ => record
                .timestamp
                .and_then(|millis| millis.checked_mul(1_000)),
        };

        Ok(micros.map_or(BoundValue::Unset, |micros| {
            BoundValue::Value(Cell::I64(micros))
        }))
    }

    fn integer_field<H>(
        &self,
        record: &SinkRecord<H>,
        path: &FieldPath,
        codec: &ConvertingCodec,
    ) -> SinkResult<Option<i64>> {
        let Some(value) = record.field(path) else {
            bail!(
                ErrorKind::MissingField,
                "Missing record field",
                format!("required field `{path}` is missing from the record")
            );
        };

        match codec
            .external_to_internal(value)
            .map_err(|err| err.with_context(format!("field `{path}`")))?
        {
            Cell::I64(amount) => Ok(Some(amount)),
            _ => Ok(None),
        }
    }

    /// Returns the codecs for the schemas of a record, resolving them on first use.
    fn codecs_for<H>(&self, record: &SinkRecord<H>) -> SinkResult<Arc<ResolvedCodecs>> {
        let key: ShapeKey = (
            self.name.clone(),
            record.key.fingerprint(),
            record.value.fingerprint(),
        );
        if let Some(codecs) = self.cache.get(&key) {
            return Ok(codecs);
        }

        let shape_of = |path: &FieldPath, column: &str| {
            record.field_shape(path).ok_or_else(|| {
                sink_error!(
                    ErrorKind::MissingField,
                    "Missing record field",
                    format!(
                        "field `{path}` (mapped to column `{column}`) is not declared by the record schema"
                    )
                )
            })
        };

        let mut columns = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            let shape = shape_of(&column.path, &column.name)?;
            columns.push(self.factory.codec_for(&shape, &column.column_type)?);
        }

        let bigint = ColumnType::Integer(IntegerType::BIGINT);
        let pseudo = |path: &Option<FieldPath>, column: &str| -> SinkResult<_> {
            match path {
                Some(path) => Ok(Some(self.factory.codec_for(&shape_of(path, column)?, &bigint)?)),
                None => Ok(None),
            }
        };
        let ttl = pseudo(&self.ttl_field, TTL_MARKER)?;
        let timestamp = pseudo(&self.timestamp_field, TIMESTAMP_MARKER)?;

        debug!(table = %self.name, "resolved codecs for new record schemas");
        Ok(self.cache.insert(
            key,
            ResolvedCodecs {
                columns,
                ttl,
                timestamp,
            },
        ))
    }
}

/// Routes records of each topic to the mappers of its tables.
#[derive(Debug, Default)]
pub struct MappingResolver {
    topics: HashMap<String, Vec<Arc<TableMapper>>>,
}

impl MappingResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, topic: impl Into<String>, mapper: TableMapper) {
        self.topics
            .entry(topic.into())
            .or_default()
            .push(Arc::new(mapper));
    }

    pub fn tables(&self, topic: &str) -> SinkResult<&[Arc<TableMapper>]> {
        match self.topics.get(topic) {
            Some(tables) => Ok(tables),
            None => bail!(
                ErrorKind::UnknownTopic,
                "Unknown topic",
                format!("no tables are configured for topic `{topic}`")
            ),
        }
    }

    /// Maps a record to one statement per table of its topic.
    ///
    /// Each table is mapped independently so that one failing table does not hide the
    /// statements of the others.
    pub fn resolve<H>(
        &self,
        record: &SinkRecord<H>,
    ) -> SinkResult<Vec<(Arc<TableMapper>, SinkResult<BoundStatement>)>> {
        let tables = self.tables(&record.topic)?;
        Ok(tables
            .iter()
            .map(|mapper| (mapper.clone(), mapper.map(record)))
            .collect())
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.topics.keys().map(String::as_str)
    }
}


#[cfg(test)]
mod tests {
    use config::shared::CodecConfig;
    use serde_json::json;

    use super::*;
    use crate::conversions::ConversionContext;
    use crate::mapping::record::{RecordData, RecordSchema};
    use crate::statement::{ColumnKind, ColumnSchema, StatementKind};
    use crate::types::ExternalValue;

    fn orders() -> Arc<TableSchema> {
        Arc::new(TableSchema::new(
            "shop",
            "orders",
            vec![
                ColumnSchema::new("id", ColumnType::Integer(IntegerType::INT), ColumnKind::PartitionKey),
                ColumnSchema::new("customer", ColumnType::Text, ColumnKind::Regular),
                ColumnSchema::new("total", ColumnType::Integer(IntegerType::BIGINT), ColumnKind::Regular),
                ColumnSchema::new("written", ColumnType::Timestamp, ColumnKind::Regular),
            ],
        ))
    }

    fn factory() -> Arc<CodecFactory> {
        let context = ConversionContext::from_config(&CodecConfig::default()).unwrap();
        Arc::new(CodecFactory::new(Arc::new(context)))
    }

    fn mapper(config: &TableConfig) -> SinkResult<TableMapper> {
        TableMapper::new(config, orders(), factory(), Arc::new(ShapeCache::new()), None)
    }

    fn record(value: serde_json::Value) -> SinkRecord<()> {
        SinkRecord::new(
            "orders",
            RecordData::schemaless(ExternalValue::Int(7)),
            RecordData::schemaless(ExternalValue::from(value)),
            (),
        )
    }

    #[test]
    fn insert_binds_fields_ttl_and_timestamp() {
        let mut config = TableConfig::new(
            "shop",
            "orders",
            "id=key, customer=value.name, total=value.total, __ttl=value.ttl",
        );
        config.ttl_time_unit = TimeUnit::Minutes;
        let mapper = mapper(&config).unwrap();

        let statement = mapper
            .map(&record(json!({"name": "Ada", "total": "1,250", "ttl": 2})).with_timestamp(1_500))
            .unwrap();

        assert_eq!(statement.kind, StatementKind::Insert);
        assert_eq!(
            &*statement.text,
            "INSERT INTO shop.orders (id, customer, total) VALUES (:id, :customer, :total) \
             USING TTL :__ttl AND TIMESTAMP :__timestamp"
        );
        assert_eq!(statement.value("id"), Some(&BoundValue::Value(Cell::I32(7))));
        assert_eq!(
            statement.value("customer"),
            Some(&BoundValue::Value(Cell::Text("Ada".to_string())))
        );
        assert_eq!(statement.value("total"), Some(&BoundValue::Value(Cell::I64(1250))));
        assert_eq!(statement.value("__ttl"), Some(&BoundValue::Value(Cell::I32(120))));
        assert_eq!(
            statement.value("__timestamp"),
            Some(&BoundValue::Value(Cell::I64(1_500_000)))
        );
    }

    #[test]
    fn fixed_ttl_and_functions_are_inlined() {
        let mut config = TableConfig::new("shop", "orders", "id=key, written=now()");
        config.ttl = 2;
        config.ttl_time_unit = TimeUnit::Hours;
        let mapper = mapper(&config).unwrap();

        assert_eq!(
            &*mapper.write_template().text,
            "INSERT INTO shop.orders (id, written) VALUES (:id, now()) \
             USING TTL 7200 AND TIMESTAMP :__timestamp"
        );
        assert!(!mapper.deletes_on_all_null());
    }

    #[test]
    fn nulls_are_unset_or_written() {
        let config = TableConfig::new("shop", "orders", "id=key, customer=value.name, total=value.total");
        let statement = mapper(&config)
            .unwrap()
            .map(&record(json!({"name": null, "total": 3})))
            .unwrap();
        assert_eq!(statement.value("customer"), Some(&BoundValue::Unset));
        assert_eq!(statement.value("__timestamp"), Some(&BoundValue::Unset));

        let mut config = config;
        config.null_to_unset = false;
        let statement = mapper(&config)
            .unwrap()
            .map(&record(json!({"name": null, "total": 3})))
            .unwrap();
        assert_eq!(statement.value("customer"), Some(&BoundValue::Value(Cell::Null)));
    }

    #[test]
    fn tombstones_and_all_null_rows_become_deletes() {
        let config = TableConfig::new("shop", "orders", "id=key, customer=value.name, total=value.total");
        let mapper = mapper(&config).unwrap();

        let tombstone = SinkRecord::new(
            "orders",
            RecordData::schemaless(ExternalValue::Int(7)),
            RecordData::null(),
            (),
        );
        let statement = mapper.map(&tombstone).unwrap();
        assert_eq!(statement.kind, StatementKind::Delete);
        assert_eq!(
            &*statement.text,
            "DELETE FROM shop.orders USING TIMESTAMP :__timestamp WHERE id = :id"
        );
        assert_eq!(statement.value("id"), Some(&BoundValue::Value(Cell::I32(7))));

        let statement = mapper
            .map(&record(json!({"name": null, "total": null})))
            .unwrap();
        assert_eq!(statement.kind, StatementKind::Delete);

        let mut config = config;
        config.deletes_enabled = false;
        let statement = mapper_of(&config).map(&record(json!({"name": null, "total": null}))).unwrap();
        assert_eq!(statement.kind, StatementKind::Insert);
    }

    fn mapper_of(config: &TableConfig) -> TableMapper {
        mapper(config).unwrap()
    }

    #[test]
    fn record_failures_are_classified() {
        let config = TableConfig::new("shop", "orders", "id=value.id, customer=value.name");
        let mapper = mapper_of(&config);

        let err = mapper.map(&record(json!({"id": 1}))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingField);

        let err = mapper.map(&record(json!({"id": null, "name": "Ada"}))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NullPrimaryKey);

        let err = mapper.map(&record(json!({"id": "one", "name": "Ada"}))).unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::Conversion);
        assert!(err.detail().unwrap().starts_with("column `id` (int)"), "{err}");
    }

    #[test]
    fn invalid_mappings_fail_at_setup() {
        let err = mapper(&TableConfig::new("shop", "orders", "id=key, nope=value.x")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownColumn);

        let err = mapper(&TableConfig::new("shop", "orders", "customer=value.name")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidMapping);

        let err = mapper(&TableConfig::new("shop", "orders", "id=now()")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidMapping);
    }

    #[test]
    fn counter_tables_use_increments() {
        let schema = Arc::new(TableSchema::new(
            "shop",
            "visits",
            vec![
                ColumnSchema::new("page", ColumnType::Text, ColumnKind::PartitionKey),
                ColumnSchema::new("hits", ColumnType::Counter, ColumnKind::Regular),
            ],
        ));
        let config = TableConfig::new("shop", "visits", "page=key, hits=value.hits");
        let mapper = TableMapper::new(
            &config,
            schema.clone(),
            factory(),
            Arc::new(ShapeCache::new()),
            None,
        )
        .unwrap();

        let statement = mapper
            .map(&SinkRecord::new(
                "visits",
                RecordData::schemaless(ExternalValue::text("/home")),
                RecordData::schemaless(ExternalValue::from(json!({"hits": 2}))),
                (),
            ))
            .unwrap();
        assert_eq!(statement.kind, StatementKind::Update);
        assert_eq!(statement.value("hits"), Some(&BoundValue::Value(Cell::I64(2))));

        let mut config = config;
        config.mapping = "page=key, hits=value.hits, __ttl=value.ttl".to_string();
        let err = TableMapper::new(&config, schema, factory(), Arc::new(ShapeCache::new()), None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidMapping);
    }

    #[test]
    fn codecs_are_resolved_once_per_schema() {
        let cache = Arc::new(ShapeCache::new());
        let config = TableConfig::new("shop", "orders", "id=key, customer=value.name");
        let mapper = TableMapper::new(&config, orders(), factory(), cache.clone(), None).unwrap();

        mapper.map(&record(json!({"name": "Ada"}))).unwrap();
        mapper.map(&record(json!({"name": "Grace"}))).unwrap();
        assert_eq!(cache.len(), 1);
    }

    fn customers() -> Arc<TableSchema> {
        Arc::new(TableSchema::new(
            "shop",
            "customers",
            vec![
                ColumnSchema::new("id", ColumnType::Integer(IntegerType::INT), ColumnKind::PartitionKey),
                ColumnSchema::new("name", ColumnType::Text, ColumnKind::Regular),
                ColumnSchema::new("total", ColumnType::Integer(IntegerType::BIGINT), ColumnKind::Regular),
                ColumnSchema::new(
                    "address",
                    ColumnType::udt(
                        "address",
                        vec![
                            ("street", ColumnType::Text),
                            ("zip", ColumnType::Integer(IntegerType::INT)),
                        ],
                    ),
                    ColumnKind::Regular,
                ),
            ],
        ))
    }

    fn customer_schema(total: ExternalShape) -> RecordSchema {
        RecordSchema::new(ExternalShape::Struct(vec![
            ("name".to_string(), ExternalShape::Text),
            ("total".to_string(), total),
            (
                "address".to_string(),
                ExternalShape::Struct(vec![
                    ("street".to_string(), ExternalShape::Text),
                    ("zip".to_string(), ExternalShape::Integer),
                ]),
            ),
        ]))
    }

    fn typed_record(value: serde_json::Value, schema: RecordSchema) -> SinkRecord<()> {
        SinkRecord::new(
            "customers",
            RecordData::with_schema(ExternalValue::Int(7), RecordSchema::new(ExternalShape::Integer)),
            RecordData::with_schema(ExternalValue::from(value), schema),
            (),
        )
    }

    fn customer_mapper(cache: Arc<ShapeCache>) -> TableMapper {
        let config = TableConfig::new(
            "shop",
            "customers",
            "id=key, name=value.name, total=value.total, address=value.address",
        );
        TableMapper::new(&config, customers(), factory(), cache, None).unwrap()
    }

    #[test]
    fn declared_schemas_select_codecs() {
        let cache = Arc::new(ShapeCache::new());
        let mapper = customer_mapper(cache.clone());
        let value = json!({
            "name": "Ada",
            "total": 1250,
            "address": {"street": "Main", "zip": 12345}
        });

        let statement = mapper
            .map(&typed_record(value.clone(), customer_schema(ExternalShape::Integer)))
            .unwrap();
        assert_eq!(statement.value("id"), Some(&BoundValue::Value(Cell::I32(7))));
        assert_eq!(statement.value("total"), Some(&BoundValue::Value(Cell::I64(1250))));
        assert_eq!(
            statement.value("address"),
            Some(&BoundValue::Value(Cell::Udt(vec![
                ("street".to_string(), Cell::Text("Main".to_string())),
                ("zip".to_string(), Cell::I32(12345)),
            ])))
        );

        mapper
            .map(&typed_record(value, customer_schema(ExternalShape::Integer)))
            .unwrap();
        assert_eq!(cache.len(), 1);

        let statement = mapper
            .map(&typed_record(
                json!({"name": "Ada", "total": "1,250", "address": null}),
                customer_schema(ExternalShape::Text),
            ))
            .unwrap();
        assert_eq!(statement.value("total"), Some(&BoundValue::Value(Cell::I64(1250))));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn fields_absent_from_the_schema_fail_the_record() {
        let mapper = customer_mapper(Arc::new(ShapeCache::new()));
        let schema = RecordSchema::new(ExternalShape::Struct(vec![(
            "name".to_string(),
            ExternalShape::Text,
        )]));

        let err = mapper
            .map(&typed_record(json!({"name": "Ada"}), schema))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingField);
        assert_eq!(err.category(), crate::error::ErrorCategory::Mapping);
        assert!(err.detail().unwrap().contains("value.total"), "{err}");
    }

    #[test]
    fn unsupported_declared_shapes_fail_only_their_record() {
        let cache = Arc::new(ShapeCache::new());
        let mapper = customer_mapper(cache.clone());

        let err = mapper
            .map(&typed_record(
                json!({"name": "Ada", "total": null, "address": null}),
                customer_schema(ExternalShape::Bytes),
            ))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedConversion);
        assert!(cache.is_empty());

        mapper
            .map(&typed_record(
                json!({"name": "Ada", "total": 3, "address": null}),
                customer_schema(ExternalShape::Integer),
            ))
            .unwrap();
    }

    #[test]
    fn unknown_topics_are_rejected() {
        let mut resolver = MappingResolver::new();
        resolver.add_table(
            "orders",
            mapper_of(&TableConfig::new("shop", "orders", "id=key")),
        );

        let resolved = resolver.resolve(&record(json!({}))).unwrap();
        assert_eq!(resolved.len(), 1);
        assert!(resolved[0].1.is_ok());

        let other = SinkRecord::new("payments", RecordData::null(), RecordData::null(), ());
        assert_eq!(
            resolver.resolve(&other).unwrap_err().kind(),
            ErrorKind::UnknownTopic
        );
    }
}
