//! Record of the local transactions a participant already ran.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use common::CorrelationId;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::order_fulfillment::HANDLED_RETENTION;

/// Direction of a participant's local transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Step {
    Forward,
    Compensate,
}

/// Correlation IDs for which a step already ran.
///
/// A redelivered copy of an older event can still look due from its status
/// vector alone; this record keeps the ledger mutation from running twice.
/// Entries are only forgotten once they are older than the retention, never
/// because other sagas came through in between.
#[derive(Debug)]
pub(crate) struct HandledSagas {
    inner: Mutex<Inner>,
    retention: Duration,
}

#[derive(Debug, Default)]
struct Inner {
    seen: HashMap<(CorrelationId, Step), Instant>,
    // Insertion order, so expired entries sit at the front.
    order: VecDeque<(Instant, (CorrelationId, Step))>,
}

impl Inner {
    fn prune(&mut self, now: Instant, retention: Duration) {
        while let Some(&(marked_at, key)) = self.order.front() {
            if now.duration_since(marked_at) < retention {
                break;
            }
            self.order.pop_front();
            self.seen.remove(&key);
        }
    }
}

impl Default for HandledSagas {
    fn default() -> Self {
        Self::with_retention(HANDLED_RETENTION)
    }
}

impl HandledSagas {
    pub(crate) fn with_retention(retention: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            retention,
        }
    }

    pub(crate) async fn contains(&self, correlation_id: CorrelationId, step: Step) -> bool {
        let mut inner = self.inner.lock().await;
        inner.prune(Instant::now(), self.retention);
        inner.seen.contains_key(&(correlation_id, step))
    }

    pub(crate) async fn mark(&self, correlation_id: CorrelationId, step: Step) {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        inner.prune(now, self.retention);
        if inner.seen.contains_key(&(correlation_id, step)) {
            return;
        }
        inner.seen.insert((correlation_id, step), now);
        inner.order.push_back((now, (correlation_id, step)));
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.inner.lock().await.seen.len()
    }
}
