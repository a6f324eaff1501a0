use std::mem;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use crate::error::{SinkError, SinkResult};
use crate::mapping::SinkRecord;

/// Record and statement counters of one sink instance.
#[derive(Debug, Default)]
pub struct SinkCounters {
    records_received: AtomicU64,
    records_succeeded: AtomicU64,
    records_failed: AtomicU64,
    failures_ignored: AtomicU64,
    statements_submitted: AtomicU64,
}

impl SinkCounters {
    pub fn record_received(&self) {
        self.records_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_succeeded(&self) {
        self.records_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a failed record, whether or not the failure is tolerated.
    pub fn record_failed(&self, ignored: bool) {
        self.records_failed.fetch_add(1, Ordering::Relaxed);
        if ignored {
            self.failures_ignored.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn statement_submitted(&self) {
        self.statements_submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the current counter values together with the budget usage.
    pub fn snapshot(&self, in_flight: usize, in_flight_peak: usize) -> CountersSnapshot {
        CountersSnapshot {
            records_received: self.records_received.load(Ordering::Relaxed),
            records_succeeded: self.records_succeeded.load(Ordering::Relaxed),
            records_failed: self.records_failed.load(Ordering::Relaxed),
            failures_ignored: self.failures_ignored.load(Ordering::Relaxed),
            statements_submitted: self.statements_submitted.load(Ordering::Relaxed),
            in_flight,
            in_flight_peak,
        }
    }
}

/// Point-in-time copy of [`SinkCounters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CountersSnapshot {
    pub records_received: u64,
    pub records_succeeded: u64,
    /// Failed records, including the ones whose failure was tolerated.
    pub records_failed: u64,
    pub failures_ignored: u64,
    pub statements_submitted: u64,
    pub in_flight: usize,
    pub in_flight_peak: usize,
}

/// Outstanding statements of one record.
///
/// The record resolves when its last statement completes. Errors of every statement, and of the
/// tables that could not be mapped, are collected so that one failure fails the whole record.
pub(crate) struct RecordTracker<H> {
    pub(crate) record: Arc<SinkRecord<H>>,
    remaining: AtomicUsize,
    errors: Mutex<Vec<SinkError>>,
}

impl<H> RecordTracker<H> {
    pub(crate) fn new(record: Arc<SinkRecord<H>>, statements: usize, errors: Vec<SinkError>) -> Self {
        Self {
            record,
            remaining: AtomicUsize::new(statements),
            errors: Mutex::new(errors),
        }
    }

    /// Records the outcome of one statement.
    ///
    /// Returns the collected errors once the last statement completed, and [`None`] before.
    pub(crate) fn complete(&self, result: SinkResult<()>) -> Option<Vec<SinkError>> {
        let mut errors = self.errors.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = result {
            errors.push(err);
        }

        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            Some(mem::take(&mut *errors))
        } else {
            None
        }
    }
}
