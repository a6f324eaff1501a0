//! Execution pipeline.
//!
//! [`SinkProcessor`] maps every record to one statement per destination table, submits the
//! statements concurrently within the [`InFlightBudget`] and reports each record to its
//! delivery handle once all of its statements completed.
//!
//! Failures are classified per record. A record that could not be mapped is a mapping failure;
//! a record whose statements were all mapped but rejected by the database is an execution
//! failure. The configured [`IgnoreErrorsPolicy`] then decides whether the record is failed or
//! acknowledged anyway.

mod policy;
mod state;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use config::shared::{IgnoreErrorsPolicy, SinkConfig, TableConfig};
use futures::future::try_join_all;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::codec::CodecFactory;
use crate::concurrency::{BudgetPermit, InFlightBudget};
use crate::conversions::ConversionContext;
use crate::error::{ErrorKind, SinkError, SinkResult};
use crate::mapping::{DeliveryHandle, MappingResolver, ShapeCache, SinkRecord, TableMapper};
use crate::session::Session;
use crate::statement::{RecordAndStatement, TableSchema};
use crate::{bail, sink_error};

pub use policy::{Disposition, FailureKind, disposition};
pub use state::{CountersSnapshot, SinkCounters};
use state::RecordTracker;

/// State shared with the statement tasks.
#[derive(Debug)]
struct Shared {
    name: String,
    policy: IgnoreErrorsPolicy,
    counters: SinkCounters,
}

impl Shared {
    /// Reports a record whose statements all completed.
    fn resolve<H: DeliveryHandle>(&self, record: &SinkRecord<H>, errors: Vec<SinkError>) {
        if errors.is_empty() {
            debug!(sink = %self.name, topic = %record.topic, "record written");
            self.counters.record_succeeded();
            record.handle.ack();
            return;
        }

        let error = SinkError::from(errors);
        let kind = FailureKind::of(&error);
        match kind {
            FailureKind::Execution => warn!(
                sink = %self.name,
                topic = %record.topic,
                record = %record,
                error = %error,
                "error writing record"
            ),
            FailureKind::Mapping => warn!(
                sink = %self.name,
                topic = %record.topic,
                record = %record,
                error = %error,
                "error decoding or mapping record"
            ),
        }

        match disposition(self.policy, kind) {
            Disposition::Ignore => {
                self.counters.record_failed(true);
                record.handle.ack();
            }
            Disposition::Fail => {
                self.counters.record_failed(false);
                error!(
                    sink = %self.name,
                    topic = %record.topic,
                    policy = ?self.policy,
                    "record failed and is not tolerated by the error policy"
                );
                record.handle.fail(&error);
            }
        }
    }
}

/// Writes records to the database through a [`Session`].
#[derive(Debug)]
pub struct SinkProcessor<S> {
    shared: Arc<Shared>,
    resolver: Arc<MappingResolver>,
    session: S,
    budget: InFlightBudget,
    timeout: Duration,
    tasks: Mutex<JoinSet<()>>,
}

impl<S> SinkProcessor<S>
where
    S: Session + Clone,
{
    /// Validates the configuration and prepares the mapping of every configured table.
    ///
    /// Table schemas are fetched from the session. Any problem found here, such as a missing
    /// table, an unknown column or a column type no codec supports, is returned before a
    /// single record is accepted.
    pub async fn start(config: SinkConfig, session: S) -> SinkResult<Self> {
        info!(sink = %config.name, session = S::name(), "starting sink");

        if let Err(err) = config.validate() {
            bail!(
                ErrorKind::ConfigError,
                "Invalid sink configuration",
                err.to_string(),
                source: err
            );
        }

        let timeout = Duration::from_millis(config.query_execution_timeout_ms);
        let cache = Arc::new(ShapeCache::new());
        let mut resolver = MappingResolver::new();

        let schemas = try_join_all(config.topics.iter().flat_map(|(topic, topic_config)| {
            topic_config
                .tables
                .iter()
                .map(|table| fetch_schema(&session, topic, table))
        }))
        .await?;
        let mut schemas = schemas.into_iter();

        for (topic, topic_config) in &config.topics {
            let context = ConversionContext::from_config(&topic_config.codec)
                .map_err(|err| err.with_context(format!("topic `{topic}`")))?;
            let factory = Arc::new(CodecFactory::new(Arc::new(context)));

            for (table, schema) in topic_config.tables.iter().zip(schemas.by_ref()) {
                let mapper = TableMapper::new(
                    table,
                    Arc::new(schema),
                    factory.clone(),
                    cache.clone(),
                    Some(timeout),
                )
                .map_err(|err| err.with_context(format!("topic `{topic}`")))?;

                info!(
                    sink = %config.name,
                    topic = %topic,
                    table = %mapper.name(),
                    statement = %mapper.write_template().text,
                    "table mapping ready"
                );
                resolver.add_table(topic.clone(), mapper);
            }
        }

        Ok(Self {
            shared: Arc::new(Shared {
                name: config.name,
                policy: config.ignore_errors,
                counters: SinkCounters::default(),
            }),
            resolver: Arc::new(resolver),
            session,
            budget: InFlightBudget::new(config.max_concurrent_requests),
            timeout,
            tasks: Mutex::new(JoinSet::new()),
        })
    }

    /// Processes a batch of records.
    ///
    /// Returns once every statement of the batch has been submitted, waiting for budget units
    /// when the database falls behind. Outcomes are reported to the records' delivery handles as
    /// statements complete; use [`SinkProcessor::flush`] to wait for them.
    pub async fn put<H: DeliveryHandle>(&self, records: Vec<SinkRecord<H>>) -> SinkResult<()> {
        for record in records {
            self.submit(record).await?;
        }
        self.reap_finished();

        Ok(())
    }

    async fn submit<H: DeliveryHandle>(&self, record: SinkRecord<H>) -> SinkResult<()> {
        self.shared.counters.record_received();
        let record = Arc::new(record);

        let mapped = match self.resolver.resolve(&record) {
            Ok(mapped) => mapped,
            Err(err) => {
                self.shared.resolve(&record, vec![err]);
                return Ok(());
            }
        };

        let mut failures = Vec::new();
        let mut statements = Vec::with_capacity(mapped.len());
        for (mapper, result) in mapped {
            match result {
                Ok(statement) => statements.push(RecordAndStatement {
                    record: record.clone(),
                    table: mapper.name().to_string(),
                    statement,
                }),
                Err(err) => failures.push(err.with_context(format!("table {}", mapper.name()))),
            }
        }

        if statements.is_empty() {
            self.shared.resolve(&record, failures);
            return Ok(());
        }

        let tracker = Arc::new(RecordTracker::new(record, statements.len(), failures));
        for statement in statements {
            let permit = self.budget.acquire().await?;
            self.spawn(statement, tracker.clone(), permit);
        }

        Ok(())
    }

    fn spawn<H: DeliveryHandle>(
        &self,
        submission: RecordAndStatement<H>,
        tracker: Arc<RecordTracker<H>>,
        permit: BudgetPermit,
    ) {
        let shared = self.shared.clone();
        let session = self.session.clone();
        let limit = submission.statement.timeout.unwrap_or(self.timeout);
        self.shared.counters.statement_submitted();

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.spawn(async move {
            let RecordAndStatement {
                table, statement, ..
            } = submission;
            let text = statement.text.clone();

            let result = match tokio::time::timeout(limit, session.execute(statement)).await {
                Ok(result) => result,
                Err(_) => Err(sink_error!(
                    ErrorKind::DestinationTimeout,
                    "Statement timed out",
                    format!("no response within {limit:?}")
                )),
            };
            let result = result.map_err(|err| err.with_context(format!("{table}: {text}")));

            if let Some(errors) = tracker.complete(result) {
                shared.resolve(&tracker.record, errors);
            }

            // The unit is returned only after the record was reported.
            drop(permit);
        });
    }

    /// Collects the results of finished statement tasks.
    fn reap_finished(&self) -> Vec<SinkError> {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        let mut errors = Vec::new();
        while let Some(result) = tasks.try_join_next() {
            if let Err(err) = result
                && err.is_panic()
            {
                error!(sink = %self.shared.name, "statement task panicked");
                errors.push(sink_error!(
                    ErrorKind::SubmissionPanic,
                    "Statement task panicked",
                    err.to_string()
                ));
            }
        }
        errors
    }

    /// Waits until every submitted statement completed and its record was reported.
    pub async fn flush(&self) -> SinkResult<()> {
        self.budget.drained().await?;

        let errors = self.reap_finished();
        if !errors.is_empty() {
            return Err(errors.into());
        }

        Ok(())
    }

    /// Waits for in-flight statements, then releases the session.
    ///
    /// No record is accepted afterwards.
    pub async fn shutdown_and_wait(self) -> SinkResult<()> {
        info!(sink = %self.shared.name, "shutting down sink");

        let mut errors = Vec::new();
        if let Err(err) = self.flush().await {
            errors.push(err);
        }
        self.budget.close();

        if let Err(err) = self.session.shutdown().await {
            errors.push(err);
        }

        let counters = self.counters();
        info!(
            sink = %self.shared.name,
            received = counters.records_received,
            succeeded = counters.records_succeeded,
            failed = counters.records_failed,
            ignored = counters.failures_ignored,
            "sink stopped"
        );

        if !errors.is_empty() {
            return Err(errors.into());
        }

        Ok(())
    }

    /// Stops immediately, abandoning in-flight statements.
    ///
    /// Records whose statements were abandoned are neither acknowledged nor failed, so the
    /// transport redelivers them.
    pub fn abort(&self) {
        warn!(
            sink = %self.shared.name,
            in_flight = self.budget.in_flight(),
            "aborting sink"
        );

        self.budget.close();
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .abort_all();
    }

    pub fn counters(&self) -> CountersSnapshot {
        self.shared
            .counters
            .snapshot(self.budget.in_flight(), self.budget.peak())
    }

    pub fn resolver(&self) -> &MappingResolver {
        &self.resolver
    }

    pub fn session(&self) -> &S {
        &self.session
    }
}

async fn fetch_schema<S: Session>(
    session: &S,
    topic: &str,
    table: &TableConfig,
) -> SinkResult<TableSchema> {
    match session.table_schema(&table.keyspace, &table.table).await? {
        Some(schema) => Ok(schema),
        None => bail!(
            ErrorKind::MissingTableSchema,
            "Missing table",
            format!(
                "table {} of topic `{topic}` does not exist",
                table.qualified_name()
            )
        ),
    }
}
