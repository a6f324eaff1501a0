use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Notify;

use crate::error::{ErrorKind, SinkError};
use crate::mapping::DeliveryHandle;
use crate::test_utils::notify::TimedNotify;

/// Outcome reported for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Acked,
    /// Failed, with the kinds of the errors that failed the record.
    Failed(Vec<ErrorKind>),
}

type Condition = Box<dyn Fn(&[(u64, Outcome)]) -> bool + Send + Sync>;

#[derive(Default)]
struct Inner {
    outcomes: Vec<(u64, Outcome)>,
    conditions: Vec<(Condition, Arc<Notify>)>,
}

impl Inner {
    fn check_conditions(&mut self) {
        let outcomes = &self.outcomes;
        self.conditions.retain(|(condition, notify)| {
            let satisfied = condition(outcomes);
            if satisfied {
                notify.notify_one();
            }
            !satisfied
        });
    }
}

/// Collects the outcomes reported to [`TestDelivery`] handles.
#[derive(Clone, Default)]
pub struct DeliveryLog {
    inner: Arc<Mutex<Inner>>,
}

impl DeliveryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a handle reporting to this log under the given record id.
    pub fn handle(&self, id: u64) -> TestDelivery {
        TestDelivery {
            id,
            log: self.clone(),
        }
    }

    fn report(&self, id: u64, outcome: Outcome) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.outcomes.push((id, outcome));
        inner.check_conditions();
    }

    /// Returns every outcome reported so far, in reporting order.
    pub fn outcomes(&self) -> Vec<(u64, Outcome)> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .outcomes
            .clone()
    }

    /// Returns the outcome of one record, if it was reported.
    pub fn outcome(&self, id: u64) -> Option<Outcome> {
        self.outcomes()
            .into_iter()
            .find(|(reported, _)| *reported == id)
            .map(|(_, outcome)| outcome)
    }

    pub fn acked(&self) -> usize {
        self.outcomes()
            .iter()
            .filter(|(_, outcome)| *outcome == Outcome::Acked)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes()
            .iter()
            .filter(|(_, outcome)| matches!(outcome, Outcome::Failed(_)))
            .count()
    }

    /// Returns a notification fired once `count` outcomes were reported.
    pub fn wait_for_outcomes(&self, count: usize) -> TimedNotify {
        let notify = Arc::new(Notify::new());
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.conditions.push((
            Box::new(move |outcomes| outcomes.len() >= count),
            notify.clone(),
        ));
        // The condition may already hold.
        inner.check_conditions();

        TimedNotify::new(notify)
    }
}

/// Delivery handle recording its outcome in a [`DeliveryLog`].
#[derive(Clone)]
pub struct TestDelivery {
    id: u64,
    log: DeliveryLog,
}

impl TestDelivery {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl DeliveryHandle for TestDelivery {
    fn ack(&self) {
        self.log.report(self.id, Outcome::Acked);
    }

    fn fail(&self, error: &SinkError) {
        self.log.report(self.id, Outcome::Failed(error.kinds()));
    }
}
