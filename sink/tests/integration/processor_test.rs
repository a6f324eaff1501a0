use std::time::Duration;

use config::shared::{IgnoreErrorsPolicy, TableConfig};
use serde_json::json;
use sink::error::ErrorKind;
use sink::mapping::{RecordData, RecordSchema, SinkRecord};
use sink::processor::SinkProcessor;
use sink::session::memory::MemorySession;
use sink::statement::{BoundValue, ColumnKind, StatementKind, TableSchema};
use sink::test_utils::builders::{schemaless_record, sink_config, table_schema};
use sink::test_utils::delivery::{DeliveryLog, Outcome, TestDelivery};
use sink::test_utils::session::TestSession;
use sink::types::{Cell, ColumnType, ExternalShape, ExternalValue, IntegerType};
use telemetry::tracing::init_test_tracing;

fn orders_schema() -> TableSchema {
    table_schema(
        "shop",
        "orders",
        vec![
            ("id", ColumnType::Integer(IntegerType::INT), ColumnKind::PartitionKey),
            ("customer", ColumnType::Text, ColumnKind::Regular),
            ("amount", ColumnType::Decimal, ColumnKind::Regular),
        ],
    )
}

fn audit_schema() -> TableSchema {
    table_schema(
        "shop",
        "orders_audit",
        vec![
            ("id", ColumnType::Integer(IntegerType::INT), ColumnKind::PartitionKey),
            ("seen", ColumnType::Timestamp, ColumnKind::Regular),
        ],
    )
}

fn orders_table() -> TableConfig {
    TableConfig::new(
        "shop",
        "orders",
        "id=key, customer=value.customer, amount=value.amount",
    )
}

fn session() -> TestSession<MemorySession> {
    TestSession::wrap(
        MemorySession::new()
            .with_table(orders_schema())
            .with_table(audit_schema()),
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn records_are_written_and_acknowledged() {
    init_test_tracing();

    let session = session();
    let processor = SinkProcessor::start(
        sink_config("orders", vec![orders_table()], IgnoreErrorsPolicy::None, 8),
        session.clone(),
    )
    .await
    .unwrap();

    let log = DeliveryLog::new();
    let records = (0..5)
        .map(|id| {
            schemaless_record(
                "orders",
                json!(id),
                json!({"customer": format!("customer-{id}"), "amount": "12.50"}),
                log.handle(id),
            )
        })
        .collect();
    processor.put(records).await.unwrap();
    processor.flush().await.unwrap();

    assert_eq!(log.acked(), 5);
    let statements = session.wrapped().statements().await;
    assert_eq!(statements.len(), 5);
    assert!(statements.iter().all(|s| s.kind == StatementKind::Insert));

    let counters = processor.counters();
    assert_eq!(counters.records_received, 5);
    assert_eq!(counters.records_succeeded, 5);
    assert_eq!(counters.statements_submitted, 5);
    assert_eq!(counters.in_flight, 0);

    processor.shutdown_and_wait().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn in_flight_statements_never_exceed_the_budget() {
    init_test_tracing();

    let session = session();
    session.set_latency(Duration::from_millis(20));
    let processor = SinkProcessor::start(
        sink_config("orders", vec![orders_table()], IgnoreErrorsPolicy::None, 3),
        session.clone(),
    )
    .await
    .unwrap();

    let log = DeliveryLog::new();
    let records = (0..20)
        .map(|id| {
            schemaless_record(
                "orders",
                json!(id),
                json!({"customer": "Ada", "amount": 1}),
                log.handle(id),
            )
        })
        .collect();
    processor.put(records).await.unwrap();
    processor.flush().await.unwrap();

    assert_eq!(log.acked(), 20);
    assert!(session.peak() <= 3, "peak was {}", session.peak());
    assert!(processor.counters().in_flight_peak <= 3);
    assert_eq!(session.executed(), 20);
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_fields_follow_the_error_policy() {
    init_test_tracing();

    for (policy, expected) in [
        (IgnoreErrorsPolicy::All, Outcome::Acked),
        (IgnoreErrorsPolicy::Driver, Outcome::Failed(vec![ErrorKind::MissingField])),
        (IgnoreErrorsPolicy::None, Outcome::Failed(vec![ErrorKind::MissingField])),
    ] {
        let session = session();
        let processor = SinkProcessor::start(
            sink_config("orders", vec![orders_table()], policy, 4),
            session.clone(),
        )
        .await
        .unwrap();

        let log = DeliveryLog::new();
        processor
            .put(vec![schemaless_record(
                "orders",
                json!(1),
                json!({"customer": "Ada"}),
                log.handle(1),
            )])
            .await
            .unwrap();
        processor.flush().await.unwrap();

        assert_eq!(log.outcome(1), Some(expected), "{policy:?}");
        let counters = processor.counters();
        assert_eq!(counters.records_failed, 1);
        assert_eq!(
            counters.failures_ignored,
            u64::from(policy == IgnoreErrorsPolicy::All)
        );
        assert!(session.wrapped().statements().await.is_empty());
    }
}

fn typed_order(
    id: i64,
    value: serde_json::Value,
    fields: Vec<(&str, ExternalShape)>,
    handle: TestDelivery,
) -> SinkRecord<TestDelivery> {
    let schema = ExternalShape::Struct(
        fields
            .into_iter()
            .map(|(name, shape)| (name.to_string(), shape))
            .collect(),
    );
    SinkRecord::new(
        "orders",
        RecordData::with_schema(ExternalValue::Int(id), RecordSchema::new(ExternalShape::Integer)),
        RecordData::with_schema(ExternalValue::from(value), RecordSchema::new(schema)),
        handle,
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn records_with_schemas_fail_individually() {
    init_test_tracing();

    let undeclared = Outcome::Failed(vec![ErrorKind::MissingField]);
    let unsupported = Outcome::Failed(vec![ErrorKind::UnsupportedConversion]);
    for (policy, expected) in [
        (IgnoreErrorsPolicy::All, [Outcome::Acked, Outcome::Acked]),
        (IgnoreErrorsPolicy::Driver, [undeclared.clone(), unsupported.clone()]),
        (IgnoreErrorsPolicy::None, [undeclared.clone(), unsupported.clone()]),
    ] {
        let session = session();
        let processor = SinkProcessor::start(
            sink_config("orders", vec![orders_table()], policy, 4),
            session.clone(),
        )
        .await
        .unwrap();

        let log = DeliveryLog::new();
        processor
            .put(vec![
                typed_order(
                    1,
                    json!({"customer": "Ada", "amount": 3}),
                    vec![("customer", ExternalShape::Text), ("amount", ExternalShape::Integer)],
                    log.handle(1),
                ),
                typed_order(
                    2,
                    json!({"customer": "Grace", "amount": 4}),
                    vec![("customer", ExternalShape::Text)],
                    log.handle(2),
                ),
                typed_order(
                    3,
                    json!({"customer": "Hedy", "amount": null}),
                    vec![("customer", ExternalShape::Text), ("amount", ExternalShape::Bytes)],
                    log.handle(3),
                ),
                typed_order(
                    4,
                    json!({"customer": "Joan", "amount": 5}),
                    vec![("customer", ExternalShape::Text), ("amount", ExternalShape::Integer)],
                    log.handle(4),
                ),
            ])
            .await
            .unwrap();
        processor.flush().await.unwrap();

        let [second, third] = expected;
        assert_eq!(log.outcome(1), Some(Outcome::Acked), "{policy:?}");
        assert_eq!(log.outcome(2), Some(second), "{policy:?}");
        assert_eq!(log.outcome(3), Some(third), "{policy:?}");
        assert_eq!(log.outcome(4), Some(Outcome::Acked), "{policy:?}");

        let statements = session.wrapped().statements().await;
        assert_eq!(statements.len(), 2, "{policy:?}");
        assert!(statements.iter().any(|statement| {
            statement.value("amount") == Some(&BoundValue::Value(Cell::Decimal(3.into())))
        }));

        let counters = processor.counters();
        assert_eq!(counters.records_failed, 2);
        assert_eq!(
            counters.failures_ignored,
            if policy == IgnoreErrorsPolicy::All { 2 } else { 0 }
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn driver_policy_tolerates_execution_failures_only() {
    init_test_tracing();

    let session = session();
    session.fail_when(ErrorKind::DestinationQueryFailed, |_| true);
    let processor = SinkProcessor::start(
        sink_config("orders", vec![orders_table()], IgnoreErrorsPolicy::Driver, 4),
        session.clone(),
    )
    .await
    .unwrap();

    let log = DeliveryLog::new();
    processor
        .put(vec![
            schemaless_record(
                "orders",
                json!(1),
                json!({"customer": "Ada", "amount": 3}),
                log.handle(1),
            ),
            schemaless_record(
                "orders",
                json!(2),
                json!({"customer": "Grace", "amount": "three"}),
                log.handle(2),
            ),
        ])
        .await
        .unwrap();
    processor.flush().await.unwrap();

    assert_eq!(log.outcome(1), Some(Outcome::Acked));
    assert_eq!(
        log.outcome(2),
        Some(Outcome::Failed(vec![ErrorKind::ConversionError]))
    );
    assert_eq!(processor.counters().failures_ignored, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn one_failing_table_fails_the_whole_record() {
    init_test_tracing();

    let session = session();
    session.fail_when(ErrorKind::DestinationQueryFailed, |statement| {
        statement.table == "shop.orders_audit"
    });
    let processor = SinkProcessor::start(
        sink_config(
            "orders",
            vec![
                orders_table(),
                TableConfig::new("shop", "orders_audit", "id=key, seen=now()"),
            ],
            IgnoreErrorsPolicy::None,
            4,
        ),
        session.clone(),
    )
    .await
    .unwrap();

    let log = DeliveryLog::new();
    processor
        .put(vec![schemaless_record(
            "orders",
            json!(1),
            json!({"customer": "Ada", "amount": 3}),
            log.handle(1),
        )])
        .await
        .unwrap();
    processor.flush().await.unwrap();

    assert_eq!(session.executed(), 2);
    assert_eq!(
        log.outcome(1),
        Some(Outcome::Failed(vec![ErrorKind::DestinationQueryFailed]))
    );
    assert_eq!(session.wrapped().statements_for("shop.orders").await.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn all_null_rows_and_tombstones_become_deletes() {
    init_test_tracing();

    let session = session();
    let processor = SinkProcessor::start(
        sink_config("orders", vec![orders_table()], IgnoreErrorsPolicy::None, 4),
        session.clone(),
    )
    .await
    .unwrap();

    let log = DeliveryLog::new();
    processor
        .put(vec![
            schemaless_record(
                "orders",
                json!(1),
                json!({"customer": null, "amount": null}),
                log.handle(1),
            ),
            schemaless_record("orders", json!(2), json!(null), log.handle(2)),
        ])
        .await
        .unwrap();
    processor.flush().await.unwrap();

    assert_eq!(log.acked(), 2);
    let statements = session.wrapped().statements().await;
    assert_eq!(statements.len(), 2);
    for statement in &statements {
        assert_eq!(statement.kind, StatementKind::Delete);
        assert_eq!(
            &*statement.text,
            "DELETE FROM shop.orders USING TIMESTAMP :__timestamp WHERE id = :id"
        );
        assert!(statement.value("customer").is_none());
    }
    assert!(
        statements
            .iter()
            .any(|s| s.value("id") == Some(&BoundValue::Value(Cell::I32(2))))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_statements_time_out() {
    init_test_tracing();

    let session = session();
    session.set_latency(Duration::from_millis(500));
    let mut config = sink_config("orders", vec![orders_table()], IgnoreErrorsPolicy::None, 4);
    config.query_execution_timeout_ms = 20;
    let processor = SinkProcessor::start(config, session.clone()).await.unwrap();

    let log = DeliveryLog::new();
    processor
        .put(vec![schemaless_record(
            "orders",
            json!(1),
            json!({"customer": "Ada", "amount": 3}),
            log.handle(1),
        )])
        .await
        .unwrap();
    log.wait_for_outcomes(1).notified().await;

    assert_eq!(
        log.outcome(1),
        Some(Outcome::Failed(vec![ErrorKind::DestinationTimeout]))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn records_of_unknown_topics_fail() {
    init_test_tracing();

    let processor = SinkProcessor::start(
        sink_config("orders", vec![orders_table()], IgnoreErrorsPolicy::Driver, 4),
        session(),
    )
    .await
    .unwrap();

    let log = DeliveryLog::new();
    processor
        .put(vec![schemaless_record(
            "payments",
            json!(1),
            json!({}),
            log.handle(1),
        )])
        .await
        .unwrap();

    assert_eq!(
        log.outcome(1),
        Some(Outcome::Failed(vec![ErrorKind::UnknownTopic]))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn configuration_errors_fail_at_start() {
    init_test_tracing();

    let err = SinkProcessor::start(
        sink_config(
            "orders",
            vec![TableConfig::new("shop", "missing", "id=key")],
            IgnoreErrorsPolicy::All,
            4,
        ),
        session(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MissingTableSchema);

    let err = SinkProcessor::start(
        sink_config(
            "orders",
            vec![TableConfig::new("shop", "orders", "id=key, unknown=value.x")],
            IgnoreErrorsPolicy::All,
            4,
        ),
        session(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownColumn);

    let err = SinkProcessor::start(
        sink_config("orders", vec![], IgnoreErrorsPolicy::All, 4),
        session(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigError);
}

#[tokio::test(flavor = "multi_thread")]
async fn abort_abandons_in_flight_statements() {
    init_test_tracing();

    let session = session();
    session.set_latency(Duration::from_secs(5));
    let processor = SinkProcessor::start(
        sink_config("orders", vec![orders_table()], IgnoreErrorsPolicy::None, 4),
        session.clone(),
    )
    .await
    .unwrap();

    let log = DeliveryLog::new();
    processor
        .put(vec![schemaless_record(
            "orders",
            json!(1),
            json!({"customer": "Ada", "amount": 3}),
            log.handle(1),
        )])
        .await
        .unwrap();
    processor.abort();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(log.outcomes().is_empty());
    assert!(
        processor
            .put(vec![schemaless_record(
                "orders",
                json!(2),
                json!({"customer": "Ada", "amount": 3}),
                log.handle(2),
            )])
            .await
            .is_err()
    );
}
