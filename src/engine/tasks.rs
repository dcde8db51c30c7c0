//! Background work owned by a sync engine: the ordered writer, the poll
//! timer and the change-notification listener.
//!
//! Every task holds only a `Weak` reference to the engine, so dropping the
//! last engine handle ends them; `shutdown` aborts them outright.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use super::{Inner, Resource, WriteJob};

/// Coalescing change flag. Any number of `raise` calls between two
/// refreshes produce a single refresh.
#[derive(Default)]
pub(super) struct ChangeSignal {
    dirty: AtomicBool,
    notify: Notify,
}

impl ChangeSignal {
    pub fn raise(&self) {
        self.dirty.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    async fn wait(&self) {
        self.notify.notified().await;
    }

    fn take(&self) -> bool {
        self.dirty.swap(false, Ordering::SeqCst)
    }
}

/// Sends seeds and staged values to the store one at a time, in queue order.
pub(super) async fn run_writer<R: Resource>(
    engine: Weak<Inner<R>>,
    mut jobs: mpsc::UnboundedReceiver<WriteJob<R>>,
) {
    while let Some(job) = jobs.recv().await {
        let Some(inner) = engine.upgrade() else {
            break;
        };
        match job {
            WriteJob::Push {
                version,
                staged,
                mutation,
                reply,
            } => {
                let outcome = inner.push(version, &staged, &mutation).await;
                drop(inner);
                let _ = reply.send(outcome);
            }
            WriteJob::Seed { value, reply } => {
                let outcome = inner.seed(&value).await;
                drop(inner);
                let _ = reply.send(outcome);
            }
        }
    }
}

/// Fallback refresh for notifications the feed never delivered.
pub(super) async fn run_poller<R: Resource>(engine: Weak<Inner<R>>, period: Duration) {
    let mut ticks = time::interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticks.tick().await;
        let Some(inner) = engine.upgrade() else {
            break;
        };
        if inner.is_closed() {
            break;
        }
        if let Err(err) = inner.refresh().await {
            warn!(resource = inner.resource.name(), error = %err, "scheduled refresh failed");
        }
    }
}

/// Turns change notifications into refreshes, one at a time.
pub(super) async fn run_listener<R: Resource>(
    engine: Weak<Inner<R>>,
    signal: Arc<ChangeSignal>,
    debounce: Duration,
) {
    loop {
        signal.wait().await;
        if !debounce.is_zero() {
            time::sleep(debounce).await;
        }
        if !signal.take() {
            continue;
        }

        let Some(inner) = engine.upgrade() else {
            break;
        };
        if inner.is_closed() {
            break;
        }
        debug!(resource = inner.resource.name(), "remote change notification");
        if let Err(err) = inner.refresh().await {
            warn!(resource = inner.resource.name(), error = %err, "notified refresh failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raises_collapse_into_one_take() {
        let signal = ChangeSignal::default();
        signal.raise();
        signal.raise();
        signal.raise();
        assert!(signal.take());
        assert!(!signal.take());
    }
}
