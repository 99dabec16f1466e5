//! Route coordinator builder
//!
//! Every collaborator is injected explicitly; nothing is looked up lazily or
//! shared through globals. Missing hardware is a configuration error at build
//! time, not a panic at the first call.
//!
//! # Examples
//!
//! Spawning the route service on the current runtime:
//!
//! ```rust
//! use rvoip_audio_route::mock::MockHardware;
//! use rvoip_audio_route::{AudioRoute, CallState, CallStateEvent};
//!
//! # tokio_test::block_on(async {
//! let hw = MockHardware::new();
//! let handle = hw
//!     .builder()
//!     .with_config(|c| c.with_tablet(true))
//!     .spawn()
//!     .expect("Failed to start audio route service");
//!
//! handle.call_state_changed(CallStateEvent::new(CallState::Active)).unwrap();
//! assert_eq!(handle.confirmed_route().await.unwrap(), AudioRoute::Speaker);
//!
//! handle.shutdown().await.unwrap();
//! # })
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::bluetooth::BluetoothHeadsetConnector;
use crate::config::RouteConfig;
use crate::coordinator::RouteCoordinator;
use crate::error::{RouteError, RouteResult};
use crate::events::EventEmitter;
use crate::hardware::{
    AudioPort, BluetoothProfileProvider, ProximitySensor, RingtonePlayer, Vibrator, WakeLock,
};
use crate::proximity::ProximityGuard;
use crate::ringing::RingingController;
use crate::scheduler::{Scheduler, TokioScheduler};
use crate::service::{AudioRouteHandle, AudioRouteService};

/// Fluent builder for [`RouteCoordinator`] and the route service
#[derive(Debug, Default)]
pub struct AudioRouteBuilder {
    config: RouteConfig,
    audio_port: Option<Arc<dyn AudioPort>>,
    bluetooth: Option<Arc<dyn BluetoothProfileProvider>>,
    sensor: Option<Arc<dyn ProximitySensor>>,
    wake_lock: Option<Arc<dyn WakeLock>>,
    ringtone: Option<Arc<dyn RingtonePlayer>>,
    vibrator: Option<Arc<dyn Vibrator>>,
}

impl AudioRouteBuilder {
    /// Create a builder with the default configuration and no hardware
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the configuration
    pub fn config(mut self, config: RouteConfig) -> Self {
        self.config = config;
        self
    }

    /// Adjust the configuration in place
    pub fn with_config<F>(mut self, f: F) -> Self
    where
        F: FnOnce(RouteConfig) -> RouteConfig,
    {
        self.config = f(self.config);
        self
    }

    pub fn audio_port(mut self, port: Arc<dyn AudioPort>) -> Self {
        self.audio_port = Some(port);
        self
    }

    pub fn bluetooth_provider(mut self, provider: Arc<dyn BluetoothProfileProvider>) -> Self {
        self.bluetooth = Some(provider);
        self
    }

    pub fn proximity_sensor(mut self, sensor: Arc<dyn ProximitySensor>) -> Self {
        self.sensor = Some(sensor);
        self
    }

    pub fn wake_lock(mut self, wake_lock: Arc<dyn WakeLock>) -> Self {
        self.wake_lock = Some(wake_lock);
        self
    }

    pub fn ringtone_player(mut self, player: Arc<dyn RingtonePlayer>) -> Self {
        self.ringtone = Some(player);
        self
    }

    pub fn vibrator(mut self, vibrator: Arc<dyn Vibrator>) -> Self {
        self.vibrator = Some(vibrator);
        self
    }

    /// Build a coordinator driven by `scheduler` and start the headset connector
    pub fn build_coordinator(self, scheduler: Arc<dyn Scheduler>) -> RouteResult<RouteCoordinator> {
        self.config.validate()?;

        let port = require(self.audio_port, "audio port")?;
        let bluetooth = require(self.bluetooth, "Bluetooth profile provider")?;
        let sensor = require(self.sensor, "proximity sensor")?;
        let wake_lock = require(self.wake_lock, "wake-lock")?;
        let ringtone = require(self.ringtone, "ringtone player")?;
        let vibrator = require(self.vibrator, "vibrator")?;

        let events = EventEmitter::new(self.config.event_channel_capacity);
        let connector = BluetoothHeadsetConnector::new(bluetooth);
        let proximity = ProximityGuard::new(
            sensor,
            wake_lock,
            self.config.proximity.near_threshold_cm,
            events.clone(),
        );
        let ringing = RingingController::new(
            port.clone(),
            ringtone,
            vibrator,
            self.config.ring.clone(),
            events.clone(),
        );

        debug!(config = ?self.config, "Building route coordinator");
        let mut coordinator = RouteCoordinator::new(
            self.config,
            port,
            connector,
            proximity,
            ringing,
            scheduler,
            events,
        );
        coordinator.start();
        Ok(coordinator)
    }

    /// Build the coordinator on tokio timers and spawn the route service
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self) -> RouteResult<AudioRouteHandle> {
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let scheduler = Arc::new(TokioScheduler::from_current(timer_tx)?);
        let coordinator = self.build_coordinator(scheduler)?;
        Ok(AudioRouteService::spawn(coordinator, timer_rx))
    }
}

fn require<T>(slot: Option<T>, name: &str) -> RouteResult<T> {
    slot.ok_or_else(|| RouteError::config(format!("No {} configured", name)))
}
