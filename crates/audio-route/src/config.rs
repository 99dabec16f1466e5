//! Route coordinator configuration
//!
//! All knobs that shape routing policy and hardware retry behaviour.
//! Defaults reproduce the reference behaviour: five SCO verification
//! retries at 200 ms, ten teardown retries at the same cadence.
//!
//! # Examples
//!
//! ```rust
//! use rvoip_audio_route::config::RouteConfig;
//! use std::time::Duration;
//!
//! let config = RouteConfig::new()
//!     .with_sco_max_retries(3)
//!     .with_device_ringtone(false)
//!     .with_tablet(true);
//!
//! assert_eq!(config.sco.max_retries, 3);
//! assert_eq!(config.sco.retry_interval(), Duration::from_millis(200));
//! assert!(config.validate().is_ok());
//! ```
//!
//! Loading from TOML:
//!
//! ```rust
//! use rvoip_audio_route::config::RouteConfig;
//!
//! let config = RouteConfig::from_toml_str(r#"
//!     is_tablet = true
//!
//!     [sco]
//!     max_retries = 8
//! "#).unwrap();
//!
//! assert!(config.is_tablet);
//! assert_eq!(config.sco.max_retries, 8);
//! assert_eq!(config.sco.teardown_max_retries, 10);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RouteError, RouteResult};

/// SCO activation and teardown retry parameters
///
/// Unlike `RetryConfig` style exponential backoff, SCO polling runs on a
/// fixed cadence with a hard ceiling so the state machine always terminates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoRetryConfig {
    /// Verification retries before giving up on the link
    pub max_retries: u8,
    /// Interval between verification polls, in milliseconds
    pub retry_interval_ms: u64,
    /// Stop retries issued while the platform still reports SCO connected
    pub teardown_max_retries: u8,
    /// Interval between teardown polls, in milliseconds
    pub teardown_interval_ms: u64,
}

impl Default for ScoRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_interval_ms: 200,
            teardown_max_retries: 10,
            teardown_interval_ms: 200,
        }
    }
}

impl ScoRetryConfig {
    /// Interval between verification polls
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    /// Interval between teardown polls
    pub fn teardown_interval(&self) -> Duration {
        Duration::from_millis(self.teardown_interval_ms)
    }

    /// Longest time an activation attempt may stay unconfirmed
    pub fn activation_budget(&self) -> Duration {
        self.retry_interval() * (u32::from(self.max_retries) + 1)
    }
}

/// Ringtone playback settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingConfig {
    /// Play the ringtone on the device; when false the media engine rings
    pub device_ringtone_enabled: bool,
    /// Vibration pattern as alternating off/on durations in milliseconds
    pub vibration_pattern_ms: Vec<u64>,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            device_ringtone_enabled: true,
            vibration_pattern_ms: vec![0, 1000, 1000],
        }
    }
}

/// Proximity guard settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProximityConfig {
    /// Nominal distance below which the sensor counts as "near"
    pub near_threshold_cm: f32,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            near_threshold_cm: 5.0,
        }
    }
}

/// Main configuration for the route coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    /// SCO retry behaviour
    pub sco: ScoRetryConfig,
    /// Ringing behaviour
    pub ring: RingConfig,
    /// Proximity behaviour
    pub proximity: ProximityConfig,
    /// Device has no earpiece; audio-only calls default to the loudspeaker
    pub is_tablet: bool,
    /// Capacity of the observability event channel
    pub event_channel_capacity: usize,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            sco: ScoRetryConfig::default(),
            ring: RingConfig::default(),
            proximity: ProximityConfig::default(),
            is_tablet: false,
            event_channel_capacity: 64,
        }
    }
}

impl RouteConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset for devices without an earpiece
    pub fn tablet() -> Self {
        Self::default().with_tablet(true)
    }

    /// Preset where the media engine plays the ringtone
    pub fn engine_ringtone() -> Self {
        Self::default().with_device_ringtone(false)
    }

    /// Parse a configuration from TOML; missing keys keep their defaults
    pub fn from_toml_str(input: &str) -> RouteResult<Self> {
        let config: RouteConfig = toml::from_str(input)
            .map_err(|e| RouteError::config(format!("Invalid route configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the SCO verification retry ceiling
    pub fn with_sco_max_retries(mut self, max_retries: u8) -> Self {
        self.sco.max_retries = max_retries;
        self
    }

    /// Set the SCO verification poll interval
    pub fn with_sco_retry_interval(mut self, interval: Duration) -> Self {
        self.sco.retry_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the SCO teardown retry ceiling
    pub fn with_sco_teardown_retries(mut self, max_retries: u8) -> Self {
        self.sco.teardown_max_retries = max_retries;
        self
    }

    /// Enable or disable device-side ringtone playback
    pub fn with_device_ringtone(mut self, enabled: bool) -> Self {
        self.ring.device_ringtone_enabled = enabled;
        self
    }

    /// Set the vibration pattern
    pub fn with_vibration_pattern(mut self, pattern_ms: Vec<u64>) -> Self {
        self.ring.vibration_pattern_ms = pattern_ms;
        self
    }

    /// Set the nominal proximity "near" threshold
    pub fn with_near_threshold_cm(mut self, threshold_cm: f32) -> Self {
        self.proximity.near_threshold_cm = threshold_cm;
        self
    }

    /// Mark the device as a tablet
    pub fn with_tablet(mut self, is_tablet: bool) -> Self {
        self.is_tablet = is_tablet;
        self
    }

    /// Set the event channel capacity
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    /// Reject configurations that would make the state machines misbehave
    pub fn validate(&self) -> RouteResult<()> {
        if self.sco.max_retries == 0 {
            return Err(RouteError::config("sco.max_retries must be at least 1"));
        }
        if self.sco.retry_interval_ms == 0 || self.sco.teardown_interval_ms == 0 {
            return Err(RouteError::config("SCO poll intervals must be non-zero"));
        }
        if !(self.proximity.near_threshold_cm > 0.0) {
            return Err(RouteError::config(
                "proximity.near_threshold_cm must be positive",
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(RouteError::config("event_channel_capacity must be non-zero"));
        }
        Ok(())
    }
}
