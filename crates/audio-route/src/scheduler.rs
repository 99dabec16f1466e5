//! Delayed re-evaluation ticks
//!
//! The coordinator never sleeps. When the SCO state machine needs to poll
//! again it asks a [`Scheduler`] to post a [`TimerEvent`] back into the
//! coordinator's single-writer queue after a delay. Every event carries the
//! generation of the attempt that scheduled it; the state machine drops
//! events whose generation no longer matches, so a stale tick can never act
//! on a newer attempt.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::error::{RouteError, RouteResult};

/// Which SCO poll a tick belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Verification poll while activating
    ScoRetry,
    /// Poll while waiting for the link to drop
    ScoTeardown,
}

/// A delayed tick delivered back to the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerEvent {
    /// Poll kind
    pub kind: TimerKind,
    /// Generation of the attempt that scheduled the tick
    pub generation: u64,
}

impl TimerEvent {
    /// Create a tick
    pub fn new(kind: TimerKind, generation: u64) -> Self {
        Self { kind, generation }
    }
}

/// Posts delayed ticks into the coordinator's event queue
pub trait Scheduler: Send + Sync + std::fmt::Debug {
    /// Deliver `event` after `delay`
    fn schedule(&self, delay: Duration, event: TimerEvent);

    /// Drop every pending tick
    fn cancel_all(&self);
}

/// Scheduler backed by tokio timers
///
/// Each tick is a small task that sleeps and then forwards the event into an
/// unbounded channel drained by the route service loop.
#[derive(Debug)]
pub struct TokioScheduler {
    tx: mpsc::UnboundedSender<TimerEvent>,
    runtime: Handle,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl TokioScheduler {
    /// Create a scheduler spawning onto `runtime`
    pub fn new(tx: mpsc::UnboundedSender<TimerEvent>, runtime: Handle) -> Self {
        Self {
            tx,
            runtime,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Create a scheduler on the runtime of the calling context
    pub fn from_current(tx: mpsc::UnboundedSender<TimerEvent>) -> RouteResult<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| RouteError::config(format!("No tokio runtime available: {}", e)))?;
        Ok(Self::new(tx, runtime))
    }

    /// Number of ticks not yet delivered
    pub fn pending_count(&self) -> usize {
        let mut pending = self.pending.lock();
        pending.retain(|task| !task.is_finished());
        pending.len()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, event: TimerEvent) {
        let tx = self.tx.clone();
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            // Receiver gone means the service shut down
            let _ = tx.send(event);
        });

        let mut pending = self.pending.lock();
        pending.retain(|task| !task.is_finished());
        pending.push(task);
        trace!(?event, delay_ms = delay.as_millis() as u64, "Scheduled tick");
    }

    fn cancel_all(&self) {
        let mut pending = self.pending.lock();
        for task in pending.drain(..) {
            task.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_tick_delivered_after_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scheduler = TokioScheduler::from_current(tx).unwrap();
        let event = TimerEvent::new(TimerKind::ScoRetry, 3);

        scheduler.schedule(Duration::from_millis(200), event);
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(rx.recv().await, Some(event));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_drops_pending_ticks() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scheduler = TokioScheduler::from_current(tx).unwrap();
        scheduler.schedule(
            Duration::from_millis(200),
            TimerEvent::new(TimerKind::ScoRetry, 1),
        );
        scheduler.schedule(
            Duration::from_millis(400),
            TimerEvent::new(TimerKind::ScoTeardown, 1),
        );
        assert_eq!(scheduler.pending_count(), 2);

        scheduler.cancel_all();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn test_from_current_outside_runtime() {
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(TokioScheduler::from_current(tx).is_err());
    }
}
