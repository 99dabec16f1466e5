//! Proximity sensor guard
//!
//! Blanks the screen while an earpiece call is held to the ear. The guard
//! turns raw distance samples into near/far transitions and holds a screen
//! wake-lock while "near". Disabling always force-releases the lock.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::error::RouteResult;
use crate::events::EventEmitter;
use crate::hardware::{ProximitySensor, WakeLock};
use crate::types::{ProximityGuardState, ProximitySample};

/// Near/far classifier owning the sensor registration and the wake-lock
#[derive(Debug)]
pub struct ProximityGuard {
    sensor: Arc<dyn ProximitySensor>,
    wake_lock: Arc<dyn WakeLock>,
    events: EventEmitter,
    near_threshold_cm: f32,
    state: ProximityGuardState,
}

impl ProximityGuard {
    /// Create a disabled guard
    pub fn new(
        sensor: Arc<dyn ProximitySensor>,
        wake_lock: Arc<dyn WakeLock>,
        near_threshold_cm: f32,
        events: EventEmitter,
    ) -> Self {
        Self {
            sensor,
            wake_lock,
            events,
            near_threshold_cm,
            state: ProximityGuardState::default(),
        }
    }

    /// Current registration and wake-lock state
    pub fn state(&self) -> ProximityGuardState {
        self.state
    }

    /// Whether samples are being classified
    pub fn is_enabled(&self) -> bool {
        self.state.registered
    }

    /// Register with the sensor; idempotent
    pub fn enable(&mut self) -> RouteResult<()> {
        if self.state.registered {
            return Ok(());
        }
        match self.sensor.register() {
            Ok(()) => {
                debug!("Proximity guard enabled");
                self.state.registered = true;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Proximity sensor registration failed");
                Err(e)
            }
        }
    }

    /// Release the wake-lock and unregister; idempotent
    pub fn disable(&mut self) {
        if self.state.wake_lock_held {
            self.wake_lock.release();
            self.state.wake_lock_held = false;
        }
        if self.state.registered {
            self.sensor.unregister();
            self.state.registered = false;
            debug!("Proximity guard disabled");
        }
    }

    /// Classify a sample and move the wake-lock accordingly
    ///
    /// Samples arriving while disabled are ignored.
    pub fn on_sample(&mut self, sample: ProximitySample) {
        if !self.state.registered {
            trace!(?sample, "Proximity sample ignored; guard disabled");
            return;
        }

        let threshold = near_threshold(self.near_threshold_cm, sample.max_range_cm);
        let near = sample.distance_cm < threshold;

        if near && !self.state.wake_lock_held {
            if self.events.report("acquire_wake_lock", self.wake_lock.acquire()) {
                debug!(distance_cm = sample.distance_cm, threshold, "Proximity near; screen off");
                self.state.wake_lock_held = true;
            }
        } else if !near && self.state.wake_lock_held {
            debug!(distance_cm = sample.distance_cm, threshold, "Proximity far; screen on");
            self.wake_lock.release();
            self.state.wake_lock_held = false;
        }
    }
}

/// Distance below which a sample counts as near
///
/// Sensors whose max range is at or below the nominal threshold are
/// effectively binary; their max range becomes the threshold.
pub fn near_threshold(nominal_cm: f32, max_range_cm: f32) -> f32 {
    if max_range_cm <= nominal_cm {
        max_range_cm
    } else {
        nominal_cm
    }
}
