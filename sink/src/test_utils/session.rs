use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;

use crate::error::{ErrorKind, SinkResult};
use crate::session::Session;
use crate::sink_error;
use crate::statement::{BoundStatement, TableSchema};
use crate::test_utils::notify::TimedNotify;

type StatementPredicate = Box<dyn Fn(&BoundStatement) -> bool + Send + Sync>;

struct Failure {
    predicate: StatementPredicate,
    kind: ErrorKind,
}

#[derive(Default)]
struct Faults {
    failures: Vec<Failure>,
    latency: Option<Duration>,
    executed_conditions: Vec<(usize, Arc<Notify>)>,
}

struct Inner<S> {
    wrapped: S,
    faults: Mutex<Faults>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    executed: AtomicUsize,
}

/// Test wrapper for [`Session`] implementations.
///
/// [`TestSession`] forwards to the wrapped session and adds what tests of the execution pipeline
/// need: injected failures for selected statements, an artificial execution latency, tracking of
/// the peak number of concurrent executions and notifications on the number of executed
/// statements.
#[derive(Clone)]
pub struct TestSession<S> {
    inner: Arc<Inner<S>>,
}

impl<S: fmt::Debug> fmt::Debug for TestSession<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestSession")
            .field("wrapped", &self.inner.wrapped)
            .field("peak", &self.peak())
            .field("executed", &self.executed())
            .finish()
    }
}

impl<S> TestSession<S> {
    pub fn wrap(session: S) -> Self {
        Self {
            inner: Arc::new(Inner {
                wrapped: session,
                faults: Mutex::new(Faults::default()),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                executed: AtomicUsize::new(0),
            }),
        }
    }

    pub fn wrapped(&self) -> &S {
        &self.inner.wrapped
    }

    /// Fails every statement matching the predicate with an error of the given kind.
    pub fn fail_when<F>(&self, kind: ErrorKind, predicate: F)
    where
        F: Fn(&BoundStatement) -> bool + Send + Sync + 'static,
    {
        self.faults().failures.push(Failure {
            predicate: Box::new(predicate),
            kind,
        });
    }

    /// Delays every execution by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.faults().latency = Some(latency);
    }

    /// Highest number of statements that were executing at once.
    pub fn peak(&self) -> usize {
        self.inner.peak.load(Ordering::Acquire)
    }

    /// Number of completed executions, failed ones included.
    pub fn executed(&self) -> usize {
        self.inner.executed.load(Ordering::Acquire)
    }

    /// Returns a notification fired once `count` executions completed.
    pub fn wait_for_executed(&self, count: usize) -> TimedNotify {
        let notify = Arc::new(Notify::new());
        let mut faults = self.faults();
        if self.executed() >= count {
            notify.notify_one();
        } else {
            faults.executed_conditions.push((count, notify.clone()));
        }
        drop(faults);

        TimedNotify::new(notify)
    }

    fn faults(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.inner
            .faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S> Session for TestSession<S>
where
    S: Session + Clone,
{
    fn name() -> &'static str {
        "test"
    }

    async fn table_schema(&self, keyspace: &str, table: &str) -> SinkResult<Option<TableSchema>> {
        self.inner.wrapped.table_schema(keyspace, table).await
    }

    async fn execute(&self, statement: BoundStatement) -> SinkResult<()> {
        let in_flight = self.inner.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.inner.peak.fetch_max(in_flight, Ordering::AcqRel);

        let (latency, failure) = {
            let faults = self.faults();
            let failure = faults
                .failures
                .iter()
                .find(|failure| (failure.predicate)(&statement))
                .map(|failure| failure.kind);
            (faults.latency, failure)
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let result = match failure {
            Some(kind) => Err(sink_error!(
                kind,
                "Injected failure",
                format!("statement on {} failed on purpose", statement.table)
            )),
            None => self.inner.wrapped.execute(statement).await,
        };

        self.inner.in_flight.fetch_sub(1, Ordering::AcqRel);
        {
            // Counted under the lock guarding the conditions.
            let mut faults = self.faults();
            let executed = self.inner.executed.fetch_add(1, Ordering::AcqRel) + 1;
            faults.executed_conditions.retain(|(count, notify)| {
                let reached = executed >= *count;
                if reached {
                    notify.notify_one();
                }
                !reached
            });
        }

        result
    }

    async fn shutdown(&self) -> SinkResult<()> {
        self.inner.wrapped.shutdown().await
    }
}
