//! SCO activation state machine
//!
//! Turns "route to Bluetooth" into a confirmed SCO link or a definitive
//! failure:
//!
//! ```text
//!            request()           start issued
//!   Idle ─────────────▶ Requested ───────────▶ Verifying ──link up──▶ Active
//!    ▲                      ▲                      │
//!    │                      └──── poll, retry ─────┤
//!    │                                             │ retries exhausted
//!    │        teardown() / reset()                 ▼
//!    └──────────────────────────────────────── Failed
//! ```
//!
//! Neither the start nor the stop command is trusted. Activation is
//! confirmed only when the platform reports the SCO path connected *and* a
//! headset device is attached; teardown is re-verified and the stop command
//! re-issued while the platform still reports the link up. Both loops have a
//! hard ceiling.
//!
//! Ticks are tagged with the attempt generation. Any transition that
//! invalidates in-flight polling bumps the generation, which turns every
//! outstanding tick into a no-op.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::config::ScoRetryConfig;
use crate::events::{EventEmitter, RouteEvent};
use crate::hardware::AudioPort;
use crate::scheduler::{Scheduler, TimerEvent, TimerKind};
use crate::types::{DeviceHandle, ScoState};

/// Snapshot of the current activation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoActivationAttempt {
    /// Attempt state
    pub state: ScoState,
    /// Start commands re-issued so far
    pub retry_count: u8,
    /// Retry ceiling
    pub max_retries: u8,
    /// Poll cadence in milliseconds
    pub retry_interval_ms: u64,
}

/// What a state machine step produced for the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoOutcome {
    /// Nothing the coordinator needs to act on
    Pending,
    /// Link verified; the route may be confirmed as Bluetooth
    Activated,
    /// Retry budget exhausted without confirmation
    Failed {
        /// Polls performed
        attempts: u8,
    },
    /// Platform stopped reporting the link after teardown
    TeardownComplete,
    /// Platform still reports the link after every stop retry
    TeardownTimedOut {
        /// Stop retries issued
        attempts: u8,
    },
}

/// Drives the platform into an active SCO link, with bounded retries
#[derive(Debug)]
pub struct ScoActivation {
    config: ScoRetryConfig,
    port: Arc<dyn AudioPort>,
    scheduler: Arc<dyn Scheduler>,
    events: EventEmitter,
    state: ScoState,
    retry_count: u8,
    generation: u64,
    /// SCO flag set and start issued since the last teardown
    link_requested: bool,
    /// Stop retries issued while waiting for the link to drop
    teardown_retries: Option<u8>,
}

impl ScoActivation {
    /// Create an idle state machine
    pub fn new(
        config: ScoRetryConfig,
        port: Arc<dyn AudioPort>,
        scheduler: Arc<dyn Scheduler>,
        events: EventEmitter,
    ) -> Self {
        Self {
            config,
            port,
            scheduler,
            events,
            state: ScoState::Idle,
            retry_count: 0,
            generation: 0,
            link_requested: false,
            teardown_retries: None,
        }
    }

    /// Current state
    pub fn state(&self) -> ScoState {
        self.state
    }

    /// Retries issued in the current attempt
    pub fn retry_count(&self) -> u8 {
        self.retry_count
    }

    /// Generation ticks must carry to be acted on
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether an activation is being requested or verified
    pub fn is_in_progress(&self) -> bool {
        matches!(self.state, ScoState::Requested | ScoState::Verifying)
    }

    /// Whether a teardown is still waiting for the link to drop
    pub fn is_tearing_down(&self) -> bool {
        self.teardown_retries.is_some()
    }

    /// Snapshot of the attempt
    pub fn attempt(&self) -> ScoActivationAttempt {
        ScoActivationAttempt {
            state: self.state,
            retry_count: self.retry_count,
            max_retries: self.config.max_retries,
            retry_interval_ms: self.config.retry_interval_ms,
        }
    }

    /// `Idle → Requested → Verifying`
    ///
    /// A no-op while an attempt is already requested, verifying or active.
    /// From `Failed` a fresh attempt starts with a zeroed retry count.
    pub fn request(&mut self) {
        if matches!(
            self.state,
            ScoState::Requested | ScoState::Verifying | ScoState::Active
        ) {
            trace!(state = ?self.state, "SCO request ignored; attempt already running");
            return;
        }

        self.generation += 1;
        self.retry_count = 0;
        self.teardown_retries = None;
        self.state = ScoState::Requested;
        debug!(generation = self.generation, "SCO activation requested");

        self.issue_start();
        self.state = ScoState::Verifying;
        self.schedule(TimerKind::ScoRetry);
    }

    /// Platform route-changed notification
    ///
    /// Only used for `Verifying → Active`; both a connected SCO path and an
    /// attached headset are required.
    pub fn on_link_report(&mut self, sco_connected: bool, device: Option<&DeviceHandle>) -> ScoOutcome {
        if self.state != ScoState::Verifying {
            return ScoOutcome::Pending;
        }
        match device {
            Some(device) if sco_connected => self.activate(device),
            _ => {
                trace!(sco_connected, has_device = device.is_some(), "SCO not yet verified");
                ScoOutcome::Pending
            }
        }
    }

    /// A scheduled poll fired
    pub fn on_timer(&mut self, event: TimerEvent, device: Option<&DeviceHandle>) -> ScoOutcome {
        if event.generation != self.generation {
            trace!(
                ?event,
                current = self.generation,
                "Dropping stale SCO tick"
            );
            return ScoOutcome::Pending;
        }

        match event.kind {
            TimerKind::ScoRetry => self.on_retry_tick(device),
            TimerKind::ScoTeardown => self.on_teardown_tick(),
        }
    }

    /// `* → Idle`: disable the flag and stop the link
    ///
    /// Idempotent: with nothing requested this issues no commands. If the
    /// platform still reports the link up, the stop is re-verified on the
    /// teardown cadence.
    pub fn teardown(&mut self) {
        if self.state == ScoState::Idle && !self.link_requested {
            return;
        }

        self.generation += 1;
        self.retry_count = 0;
        self.state = ScoState::Idle;
        self.teardown_retries = None;

        if self.link_requested {
            self.issue_stop();
            self.link_requested = false;
            if self.port.is_sco_connected() {
                debug!("SCO still reported connected; verifying teardown");
                self.teardown_retries = Some(0);
                self.schedule(TimerKind::ScoTeardown);
            }
        }
        debug!(generation = self.generation, "SCO torn down");
    }

    /// Cancel everything and return to `Idle` without waiting on the platform
    pub fn reset(&mut self) {
        self.generation += 1;
        if self.link_requested {
            self.issue_stop();
        }
        self.link_requested = false;
        self.state = ScoState::Idle;
        self.retry_count = 0;
        self.teardown_retries = None;
    }

    fn on_retry_tick(&mut self, device: Option<&DeviceHandle>) -> ScoOutcome {
        if self.state != ScoState::Verifying {
            return ScoOutcome::Pending;
        }

        if self.port.is_sco_connected() {
            if let Some(device) = device {
                return self.activate(device);
            }
        }

        self.retry_count = self.retry_count.saturating_add(1);
        if self.retry_count > self.config.max_retries {
            self.state = ScoState::Failed;
            self.generation += 1;
            warn!(
                attempts = self.retry_count,
                max_retries = self.config.max_retries,
                "SCO activation failed; retries exhausted"
            );
            return ScoOutcome::Failed {
                attempts: self.retry_count,
            };
        }

        debug!(
            attempt = self.retry_count,
            max_retries = self.config.max_retries,
            "SCO not confirmed; re-issuing start"
        );
        self.state = ScoState::Requested;
        self.issue_start();
        self.state = ScoState::Verifying;
        self.schedule(TimerKind::ScoRetry);
        ScoOutcome::Pending
    }

    fn on_teardown_tick(&mut self) -> ScoOutcome {
        let Some(retries) = self.teardown_retries else {
            return ScoOutcome::Pending;
        };

        if !self.port.is_sco_connected() {
            debug!(retries, "SCO teardown verified");
            self.teardown_retries = None;
            return ScoOutcome::TeardownComplete;
        }

        if retries >= self.config.teardown_max_retries {
            warn!(attempts = retries, "SCO teardown timed out; link still reported up");
            self.teardown_retries = None;
            self.events.emit(RouteEvent::teardown_timeout(retries));
            return ScoOutcome::TeardownTimedOut { attempts: retries };
        }

        self.teardown_retries = Some(retries + 1);
        debug!(attempt = retries + 1, "SCO still connected; re-issuing stop");
        self.issue_stop();
        self.schedule(TimerKind::ScoTeardown);
        ScoOutcome::Pending
    }

    fn activate(&mut self, device: &DeviceHandle) -> ScoOutcome {
        self.state = ScoState::Active;
        // Outstanding retry ticks are obsolete
        self.generation += 1;
        info!(%device, retries = self.retry_count, "SCO link active");
        ScoOutcome::Activated
    }

    fn issue_start(&mut self) {
        self.link_requested = true;
        self.events
            .report("set_sco_enabled", self.port.set_sco_enabled(true));
        self.events.report("start_sco", self.port.start_sco());
    }

    fn issue_stop(&self) {
        self.events
            .report("set_sco_enabled", self.port.set_sco_enabled(false));
        self.events.report("stop_sco", self.port.stop_sco());
    }

    fn schedule(&self, kind: TimerKind) {
        let delay = match kind {
            TimerKind::ScoRetry => self.config.retry_interval(),
            TimerKind::ScoTeardown => self.config.teardown_interval(),
        };
        self.scheduler
            .schedule(delay, TimerEvent::new(kind, self.generation));
    }
}

#[cfg(all(test, feature = "device-mock"))]
mod tests {
    use super::*;
    use crate::mock::{ManualScheduler, MockAudioPort, PortCommand};
    use std::time::Duration;

    struct Fixture {
        sco: ScoActivation,
        port: Arc<MockAudioPort>,
        scheduler: Arc<ManualScheduler>,
        device: DeviceHandle,
    }

    fn fixture() -> Fixture {
        let port = Arc::new(MockAudioPort::new());
        let scheduler = Arc::new(ManualScheduler::new());
        let sco = ScoActivation::new(
            ScoRetryConfig::default(),
            port.clone(),
            scheduler.clone(),
            EventEmitter::new(16),
        );
        Fixture {
            sco,
            port,
            scheduler,
            device: DeviceHandle::new("headset"),
        }
    }

    fn fire(f: &mut Fixture, by: Duration) -> Vec<ScoOutcome> {
        let device = f.device.clone();
        let mut outcomes = Vec::new();
        f.scheduler
            .run_for(by, |tick| outcomes.push(f.sco.on_timer(tick, Some(&device))));
        outcomes
    }

    #[test]
    fn test_request_issues_start_and_verifies() {
        let mut f = fixture();
        f.sco.request();
        assert_eq!(f.sco.state(), ScoState::Verifying);
        assert_eq!(
            f.port.commands(),
            vec![PortCommand::SetScoEnabled(true), PortCommand::StartSco]
        );
        assert_eq!(f.scheduler.pending_count(), 1);
    }

    #[test]
    fn test_request_is_idempotent_while_running() {
        let mut f = fixture();
        f.sco.request();
        f.sco.request();
        assert_eq!(f.port.command_count(), 2);
        assert_eq!(f.scheduler.pending_count(), 1);
    }

    #[test]
    fn test_flag_alone_is_not_activation() {
        let mut f = fixture();
        f.sco.request();
        assert_eq!(f.sco.on_link_report(true, None), ScoOutcome::Pending);
        assert_eq!(f.sco.state(), ScoState::Verifying);

        let device = f.device.clone();
        assert_eq!(
            f.sco.on_link_report(true, Some(&device)),
            ScoOutcome::Activated
        );
        assert_eq!(f.sco.state(), ScoState::Active);
    }

    #[test]
    fn test_poll_confirms_link() {
        let mut f = fixture();
        f.sco.request();
        f.port.set_sco_connected(true);
        let outcomes = fire(&mut f, Duration::from_millis(200));
        assert_eq!(outcomes, vec![ScoOutcome::Activated]);
        assert_eq!(f.sco.retry_count(), 0);
    }

    #[test]
    fn test_retries_then_fails() {
        let mut f = fixture();
        f.sco.request();

        for attempt in 1..=5u8 {
            let outcomes = fire(&mut f, Duration::from_millis(200));
            assert_eq!(outcomes, vec![ScoOutcome::Pending]);
            assert_eq!(f.sco.retry_count(), attempt);
            assert_eq!(f.sco.state(), ScoState::Verifying);
        }

        let outcomes = fire(&mut f, Duration::from_millis(200));
        assert_eq!(outcomes, vec![ScoOutcome::Failed { attempts: 6 }]);
        assert_eq!(f.sco.state(), ScoState::Failed);
        assert_eq!(f.scheduler.pending_count(), 0);
        // initial start plus five re-issues
        let starts = f
            .port
            .commands()
            .iter()
            .filter(|c| **c == PortCommand::StartSco)
            .count();
        assert_eq!(starts, 6);
    }

    #[test]
    fn test_stale_tick_is_ignored() {
        let mut f = fixture();
        f.sco.request();
        let stale = TimerEvent::new(TimerKind::ScoRetry, f.sco.generation());
        f.sco.teardown();
        let before = f.port.command_count();

        assert_eq!(f.sco.on_timer(stale, Some(&f.device.clone())), ScoOutcome::Pending);
        assert_eq!(f.port.command_count(), before);
        assert_eq!(f.sco.state(), ScoState::Idle);
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let mut f = fixture();
        f.sco.teardown();
        assert_eq!(f.port.command_count(), 0);

        f.sco.request();
        f.sco.teardown();
        let after_first = f.port.command_count();
        f.sco.teardown();
        assert_eq!(f.port.command_count(), after_first);
    }

    #[test]
    fn test_teardown_retries_while_link_reported() {
        let mut f = fixture();
        f.port.set_sticky_sco(true);
        f.sco.request();
        f.port.set_sco_connected(true);
        fire(&mut f, Duration::from_millis(200));
        assert_eq!(f.sco.state(), ScoState::Active);

        f.sco.teardown();
        assert!(f.sco.is_tearing_down());

        // two more polls still connected, then the link drops
        fire(&mut f, Duration::from_millis(200));
        fire(&mut f, Duration::from_millis(200));
        f.port.set_sco_connected(false);
        let outcomes = fire(&mut f, Duration::from_millis(200));
        assert_eq!(outcomes, vec![ScoOutcome::TeardownComplete]);
        assert!(!f.sco.is_tearing_down());
    }

    #[test]
    fn test_teardown_times_out() {
        let mut f = fixture();
        let mut events = f.sco.events.receiver();
        f.port.set_sticky_sco(true);
        f.sco.request();
        f.port.set_sco_connected(true);
        fire(&mut f, Duration::from_millis(200));
        f.sco.teardown();

        let mut last = Vec::new();
        for _ in 0..11 {
            last = fire(&mut f, Duration::from_millis(200));
        }
        assert_eq!(last, vec![ScoOutcome::TeardownTimedOut { attempts: 10 }]);
        assert_eq!(f.scheduler.pending_count(), 0);
        assert_eq!(f.sco.state(), ScoState::Idle);

        let timed_out = std::iter::from_fn(|| events.try_recv().ok())
            .any(|e| matches!(e, RouteEvent::ScoTeardownTimeout { attempts: 10, .. }));
        assert!(timed_out);
    }

    #[test]
    fn test_request_after_failure_starts_fresh() {
        let mut f = fixture();
        f.sco.request();
        fire(&mut f, Duration::from_millis(1200));
        assert_eq!(f.sco.state(), ScoState::Failed);

        f.sco.request();
        assert_eq!(f.sco.state(), ScoState::Verifying);
        assert_eq!(f.sco.retry_count(), 0);
    }

    #[test]
    fn test_reset_cancels_without_scheduling() {
        let mut f = fixture();
        f.sco.request();
        f.sco.reset();
        assert_eq!(f.sco.state(), ScoState::Idle);
        let before = f.port.command_count();
        assert_eq!(fire(&mut f, Duration::from_secs(5)), vec![ScoOutcome::Pending]);
        assert_eq!(f.port.command_count(), before);
        assert!(!f.port.sco_enabled());
    }
}
