use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::bail;
use crate::error::{ErrorKind, SinkResult};

#[derive(Debug)]
struct Inner {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

/// Admission gate bounding the number of concurrently executing statements.
///
/// One budget is shared by every submission of a sink instance. [`InFlightBudget::acquire`] waits
/// while the ceiling is reached, which is how a slow database pushes back on the record flow.
/// The unit is returned when the [`BudgetPermit`] is dropped, which happens once the statement
/// completed, whatever its outcome.
#[derive(Debug, Clone)]
pub struct InFlightBudget {
    inner: Arc<Inner>,
}

impl InFlightBudget {
    /// Creates a budget of `capacity` concurrent statements, clamped to what a semaphore can hold.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            inner: Arc::new(Inner {
                semaphore: Arc::new(Semaphore::new(capacity)),
                capacity,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }),
        }
    }

    /// Waits for a free unit and returns the permit holding it.
    ///
    /// Fails only when the budget was closed by [`InFlightBudget::close`].
    pub async fn acquire(&self) -> SinkResult<BudgetPermit> {
        let Ok(permit) = self.inner.semaphore.clone().acquire_owned().await else {
            bail!(
                ErrorKind::InvalidState,
                "In-flight budget closed",
                "the sink is shutting down and accepts no more statements"
            );
        };

        Ok(self.track(permit))
    }

    /// Returns a permit if a unit is free right now.
    pub fn try_acquire(&self) -> Option<BudgetPermit> {
        let permit = self.inner.semaphore.clone().try_acquire_owned().ok()?;
        Some(self.track(permit))
    }

    fn track(&self, permit: OwnedSemaphorePermit) -> BudgetPermit {
        let in_flight = self.inner.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.inner.peak.fetch_max(in_flight, Ordering::AcqRel);

        BudgetPermit {
            inner: self.inner.clone(),
            _permit: permit,
        }
    }

    /// Waits until every acquired unit has been returned.
    pub async fn drained(&self) -> SinkResult<()> {
        let capacity = u32::try_from(self.inner.capacity).unwrap_or(u32::MAX);
        match self.inner.semaphore.acquire_many(capacity).await {
            // Dropping the permits right away gives the units back.
            Ok(_permits) => Ok(()),
            Err(_) => bail!(
                ErrorKind::InvalidState,
                "In-flight budget closed",
                "the budget was closed while waiting for statements to drain"
            ),
        }
    }

    /// Rejects every pending and future acquisition.
    pub fn close(&self) {
        self.inner.semaphore.close();
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Number of units currently held.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Highest number of units ever held at once.
    pub fn peak(&self) -> usize {
        self.inner.peak.load(Ordering::Acquire)
    }
}

/// RAII guard returning one unit of the [`InFlightBudget`] on drop.
#[derive(Debug)]
pub struct BudgetPermit {
    inner: Arc<Inner>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for BudgetPermit {
    fn drop(&mut self) {
        // Decrement before the semaphore unit is released, so that the count never exceeds
        // the capacity.
        self.inner.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn blocks_once_the_ceiling_is_reached() {
        let budget = InFlightBudget::new(2);
        let first = budget.acquire().await.unwrap();
        let _second = budget.acquire().await.unwrap();
        assert_eq!(budget.in_flight(), 2);
        assert!(budget.try_acquire().is_none());

        let waiting = tokio::spawn({
            let budget = budget.clone();
            async move { budget.acquire().await.map(|_| ()) }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        drop(first);
        waiting.await.unwrap().unwrap();
        assert_eq!(budget.peak(), 2);
    }

    #[tokio::test]
    async fn count_never_exceeds_capacity_under_load() {
        let budget = InFlightBudget::new(4);
        let violations = Arc::new(AtomicUsize::new(0));

        let tasks = (0..64)
            .map(|i| {
                let budget = budget.clone();
                let violations = violations.clone();
                tokio::spawn(async move {
                    let _permit = budget.acquire().await.unwrap();
                    if budget.in_flight() > budget.capacity() {
                        violations.fetch_add(1, Ordering::Relaxed);
                    }
                    tokio::time::sleep(Duration::from_millis(i % 3)).await;
                })
            })
            .collect::<Vec<_>>();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(violations.load(Ordering::Relaxed), 0);
        assert!(budget.peak() <= 4);
        assert_eq!(budget.in_flight(), 0);
    }

    #[tokio::test]
    async fn drained_waits_for_outstanding_permits() {
        let budget = InFlightBudget::new(3);
        let permit = budget.acquire().await.unwrap();

        let drained = tokio::spawn({
            let budget = budget.clone();
            async move { budget.drained().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!drained.is_finished());

        drop(permit);
        drained.await.unwrap().unwrap();
        assert!(budget.try_acquire().is_some());
    }

    #[tokio::test]
    async fn closed_budget_rejects_acquisitions() {
        let budget = InFlightBudget::new(1);
        budget.close();

        let err = budget.acquire().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn oversized_capacities_are_clamped() {
        let budget = InFlightBudget::new(usize::MAX);
        assert_eq!(budget.capacity(), Semaphore::MAX_PERMITS);
        let _permit = budget.acquire().await.unwrap();
        assert_eq!(budget.in_flight(), 1);

        assert_eq!(InFlightBudget::new(0).capacity(), 1);
    }
}
