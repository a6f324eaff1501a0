//! Destination table schemas and the statements written against them.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use config::shared::ConsistencyLevel;

use crate::mapping::SinkRecord;
use crate::types::{Cell, ColumnType};

/// Bind marker carrying the write timestamp in microseconds.
pub const TIMESTAMP_MARKER: &str = "__timestamp";
/// Bind marker carrying the time to live in seconds.
pub const TTL_MARKER: &str = "__ttl";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    PartitionKey,
    Clustering,
    Regular,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    pub column_type: ColumnType,
    pub kind: ColumnKind,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, column_type: ColumnType, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            column_type,
            kind,
        }
    }

    pub fn is_primary_key(&self) -> bool {
        matches!(self.kind, ColumnKind::PartitionKey | ColumnKind::Clustering)
    }
}

/// Schema of a destination table as reported by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub keyspace: String,
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn new(keyspace: impl Into<String>, name: impl Into<String>, columns: Vec<ColumnSchema>) -> Self {
        Self {
            keyspace: keyspace.into(),
            name: name.into(),
            columns,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|column| column.name == name)
    }

    /// Partition key columns followed by clustering columns, in declaration order.
    pub fn primary_key(&self) -> impl Iterator<Item = &ColumnSchema> {
        self.columns
            .iter()
            .filter(|column| column.kind == ColumnKind::PartitionKey)
            .chain(
                self.columns
                    .iter()
                    .filter(|column| column.kind == ColumnKind::Clustering),
            )
    }

    pub fn is_counter_table(&self) -> bool {
        self.columns
            .iter()
            .any(|column| column.column_type == ColumnType::Counter)
    }

    /// Returns `keyspace.table` with identifiers quoted where needed.
    pub fn qualified_name(&self) -> String {
        format!(
            "{}.{}",
            quote_identifier(&self.keyspace),
            quote_identifier(&self.name)
        )
    }
}

/// Quotes an identifier unless it is lower-case alphanumeric and starts with a letter.
pub fn quote_identifier(name: &str) -> Cow<'_, str> {
    let plain = name
        .chars()
        .next()
        .is_some_and(|first| first.is_ascii_lowercase())
        && name
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_');

    if plain {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("\"{}\"", name.replace('"', "\"\"")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Insert,
    /// Counter increment.
    Update,
    Delete,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatementKind::Insert => f.write_str("insert"),
            StatementKind::Update => f.write_str("update"),
            StatementKind::Delete => f.write_str("delete"),
        }
    }
}

/// Options appended to insert and delete statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteOptions {
    /// Binds the time to live from [`TTL_MARKER`].
    pub bind_ttl: bool,
    /// Fixed time to live in seconds, used when the ttl is not bound.
    pub fixed_ttl: Option<i64>,
    /// Binds the write timestamp from [`TIMESTAMP_MARKER`].
    pub bind_timestamp: bool,
}

/// Statement text generated once per table mapping, with its ordered bind markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementTemplate {
    pub kind: StatementKind,
    pub text: Arc<str>,
    pub markers: Vec<String>,
}

impl StatementTemplate {
    /// `INSERT INTO ks.tb (c1, c2, f) VALUES (:c1, :c2, now()) USING TTL :__ttl AND TIMESTAMP :__timestamp`.
    pub fn insert(
        schema: &TableSchema,
        columns: &[&str],
        functions: &[(&str, &str)],
        options: WriteOptions,
    ) -> Self {
        let mut names = Vec::with_capacity(columns.len() + functions.len());
        let mut values = Vec::with_capacity(columns.len() + functions.len());
        for column in columns {
            names.push(quote_identifier(column).into_owned());
            values.push(format!(":{}", quote_identifier(column)));
        }
        for (column, function) in functions {
            names.push(quote_identifier(column).into_owned());
            values.push(function.to_string());
        }

        let mut markers: Vec<String> = columns.iter().map(|column| column.to_string()).collect();
        let mut text = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            schema.qualified_name(),
            names.join(", "),
            values.join(", ")
        );
        text.push_str(&using_clause(options, &mut markers));

        Self {
            kind: StatementKind::Insert,
            text: text.into(),
            markers,
        }
    }

    /// `UPDATE ks.tb SET c = c + :c WHERE pk = :pk`.
    pub fn counter_update(schema: &TableSchema, counters: &[&str]) -> Self {
        let assignments = counters
            .iter()
            .map(|column| {
                let column = quote_identifier(column);
                format!("{column} = {column} + :{column}")
            })
            .collect::<Vec<_>>()
            .join(", ");
        let (restriction, key_markers) = key_restriction(schema);

        let mut markers: Vec<String> = counters.iter().map(|column| column.to_string()).collect();
        markers.extend(key_markers);

        Self {
            kind: StatementKind::Update,
            text: format!(
                "UPDATE {} SET {assignments} WHERE {restriction}",
                schema.qualified_name()
            )
            .into(),
            markers,
        }
    }

    /// `DELETE FROM ks.tb USING TIMESTAMP :__timestamp WHERE pk = :pk`.
    pub fn delete(schema: &TableSchema, bind_timestamp: bool) -> Self {
        let (restriction, key_markers) = key_restriction(schema);
        let mut markers = Vec::new();
        let mut text = format!("DELETE FROM {}", schema.qualified_name());
        if bind_timestamp {
            text.push_str(&format!(" USING TIMESTAMP :{TIMESTAMP_MARKER}"));
            markers.push(TIMESTAMP_MARKER.to_string());
        }
        text.push_str(&format!(" WHERE {restriction}"));
        markers.extend(key_markers);

        Self {
            kind: StatementKind::Delete,
            text: text.into(),
            markers,
        }
    }
}

fn using_clause(options: WriteOptions, markers: &mut Vec<String>) -> String {
    let mut parts = Vec::new();
    if options.bind_ttl {
        parts.push(format!("TTL :{TTL_MARKER}"));
        markers.push(TTL_MARKER.to_string());
    } else if let Some(ttl) = options.fixed_ttl {
        parts.push(format!("TTL {ttl}"));
    }
    if options.bind_timestamp {
        parts.push(format!("TIMESTAMP :{TIMESTAMP_MARKER}"));
        markers.push(TIMESTAMP_MARKER.to_string());
    }

    if parts.is_empty() {
        String::new()
    } else {
        format!(" USING {}", parts.join(" AND "))
    }
}

fn key_restriction(schema: &TableSchema) -> (String, Vec<String>) {
    let columns = schema.primary_key().collect::<Vec<_>>();
    let restriction = columns
        .iter()
        .map(|column| {
            let name = quote_identifier(&column.name);
            format!("{name} = :{name}")
        })
        .collect::<Vec<_>>()
        .join(" AND ");
    let markers = columns.iter().map(|column| column.name.clone()).collect();
    (restriction, markers)
}

/// A bound parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundValue {
    Value(Cell),
    /// Left unset so that the existing column value is not overwritten.
    Unset,
}

impl BoundValue {
    pub fn is_unset(&self) -> bool {
        matches!(self, BoundValue::Unset)
    }
}

/// A statement with all of its markers bound, ready for execution.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    pub kind: StatementKind,
    /// `keyspace.table` the statement writes to.
    pub table: String,
    pub text: Arc<str>,
    pub values: Vec<(String, BoundValue)>,
    pub consistency: ConsistencyLevel,
    pub timeout: Option<Duration>,
}

impl BoundStatement {
    pub fn value(&self, marker: &str) -> Option<&BoundValue> {
        self.values
            .iter()
            .find(|(name, _)| name == marker)
            .map(|(_, value)| value)
    }
}

/// Ties a record to one statement derived from it, for the duration of its execution.
pub struct RecordAndStatement<H> {
    pub record: Arc<SinkRecord<H>>,
    pub table: String,
    pub statement: BoundStatement,
}

impl<H> fmt::Debug for RecordAndStatement<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordAndStatement")
            .field("record", &self.record)
            .field("table", &self.table)
            .field("statement", &self.statement.text)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IntegerType;

    fn schema() -> TableSchema {
        TableSchema::new(
            "shop",
            "Orders",
            vec![
                ColumnSchema::new("id", ColumnType::Integer(IntegerType::INT), ColumnKind::PartitionKey),
                ColumnSchema::new("day", ColumnType::Date, ColumnKind::Clustering),
                ColumnSchema::new("Amount", ColumnType::Decimal, ColumnKind::Regular),
                ColumnSchema::new("note", ColumnType::Text, ColumnKind::Regular),
            ],
        )
    }

    #[test]
    fn identifiers_are_quoted_when_needed() {
        assert_eq!(quote_identifier("orders_2"), "orders_2");
        assert_eq!(quote_identifier("Orders"), "\"Orders\"");
        assert_eq!(quote_identifier("2fa"), "\"2fa\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn insert_binds_columns_then_options() {
        let template = StatementTemplate::insert(
            &schema(),
            &["id", "day", "Amount"],
            &[("note", "now()")],
            WriteOptions {
                bind_ttl: true,
                fixed_ttl: None,
                bind_timestamp: true,
            },
        );

        assert_eq!(
            &*template.text,
            "INSERT INTO shop.\"Orders\" (id, day, \"Amount\", note) VALUES (:id, :day, :\"Amount\", now()) \
             USING TTL :__ttl AND TIMESTAMP :__timestamp"
        );
        assert_eq!(template.markers, ["id", "day", "Amount", "__ttl", "__timestamp"]);
    }

    #[test]
    fn insert_with_fixed_ttl() {
        let template = StatementTemplate::insert(
            &schema(),
            &["id", "day"],
            &[],
            WriteOptions {
                fixed_ttl: Some(3600),
                ..WriteOptions::default()
            },
        );

        assert_eq!(
            &*template.text,
            "INSERT INTO shop.\"Orders\" (id, day) VALUES (:id, :day) USING TTL 3600"
        );
    }

    #[test]
    fn delete_is_scoped_to_the_primary_key() {
        let template = StatementTemplate::delete(&schema(), true);

        assert_eq!(
            &*template.text,
            "DELETE FROM shop.\"Orders\" USING TIMESTAMP :__timestamp WHERE id = :id AND day = :day"
        );
        assert_eq!(template.markers, ["__timestamp", "id", "day"]);
    }

    #[test]
    fn counter_update_increments() {
        let schema = TableSchema::new(
            "shop",
            "visits",
            vec![
                ColumnSchema::new("page", ColumnType::Text, ColumnKind::PartitionKey),
                ColumnSchema::new("hits", ColumnType::Counter, ColumnKind::Regular),
            ],
        );
        let template = StatementTemplate::counter_update(&schema, &["hits"]);

        assert!(schema.is_counter_table());
        assert_eq!(
            &*template.text,
            "UPDATE shop.visits SET hits = hits + :hits WHERE page = :page"
        );
        assert_eq!(template.markers, ["hits", "page"]);
    }
}
