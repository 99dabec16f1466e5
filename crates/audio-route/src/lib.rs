//! # Audio Route - Call Audio Route Coordination
//!
//! Decides which physical path carries a voice call (handset earpiece,
//! loudspeaker or a Bluetooth hands-free headset over SCO) and drives flaky,
//! asynchronous platform audio APIs into that state with verified,
//! idempotent convergence.
//!
//! ## Quick Start
//!
//! ```rust
//! use rvoip_audio_route::mock::MockHardware;
//! use rvoip_audio_route::{AudioRoute, CallState, CallStateEvent, RouteConfig};
//!
//! let hw = MockHardware::new();
//! let mut coordinator = hw.coordinator(RouteConfig::default()).unwrap();
//!
//! // Audio-only call without a headset lands on the earpiece
//! coordinator.on_call_state_changed(CallStateEvent::new(CallState::Active));
//! assert_eq!(coordinator.current_confirmed_route(), AudioRoute::Earpiece);
//!
//! // The user taps "speaker"
//! coordinator.request_route(AudioRoute::Speaker).unwrap();
//! assert_eq!(coordinator.current_confirmed_route(), AudioRoute::Speaker);
//!
//! // Hang up: everything is released and the next call starts on the earpiece
//! coordinator.on_call_state_changed(CallStateEvent::new(CallState::Ended));
//! assert_eq!(coordinator.current_confirmed_route(), AudioRoute::Earpiece);
//! ```
//!
//! ## Architecture
//!
//! - [`coordinator`]: the decision engine; owns desired and confirmed route
//! - [`sco`]: SCO activation with bounded, generation-checked retries
//! - [`bluetooth`]: hands-free profile proxy and headset presence
//! - [`proximity`]: screen blanking while an earpiece call is at the ear
//! - [`ringing`]: ringtone, vibration and ringtone audio focus
//! - [`service`]: single-writer tokio task and its cloneable handle
//! - [`hardware`]: the platform traits every leaf talks through
//!
//! Platform implementations plug in through [`AudioRouteBuilder`]. The
//! `device-mock` feature (on by default) provides recording fakes and a
//! virtual-clock scheduler for tests.

pub mod bluetooth;
pub mod builder;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod hardware;
pub mod logging;
pub mod proximity;
pub mod ringing;
pub mod sco;
pub mod scheduler;
pub mod service;
pub mod types;

#[cfg(feature = "device-mock")]
pub mod mock;

// Re-export main types
pub use bluetooth::{BluetoothEvent, BluetoothHeadsetConnector, ConnectorState};
pub use builder::AudioRouteBuilder;
pub use config::{ProximityConfig, RingConfig, RouteConfig, ScoRetryConfig};
pub use coordinator::RouteCoordinator;
pub use error::{RouteError, RouteResult};
pub use events::{DenialReason, EventEmitter, EventStream, FallbackReason, RouteEvent};
pub use hardware::{
    AudioPort, BluetoothProfileProvider, FocusUsage, ProximitySensor, RingtonePlayer, Vibrator,
    WakeLock,
};
pub use logging::{setup_logging, LoggingConfig};
pub use scheduler::{Scheduler, TimerEvent, TimerKind, TokioScheduler};
pub use service::{AudioRouteHandle, AudioRouteService, RouteCommand};
pub use types::{
    AudioMode, AudioRoute, BluetoothHeadsetAvailability, CallState, CallStateEvent, DeviceHandle,
    ProximitySample, RingSession, RingerMode, RouteSnapshot, ScoState,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
