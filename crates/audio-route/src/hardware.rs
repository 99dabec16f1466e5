//! Platform hardware abstraction
//!
//! Thin, side-effecting interfaces over the platform primitives the router
//! drives. Every call is fire-and-forget: implementations must return
//! promptly and report platform refusals as [`RouteError`]s rather than
//! panicking. Confirmation of asynchronous effects (SCO link state, profile
//! proxy connection, sensor samples) flows back through the coordinator's
//! event entry points, never through these return values.
//!
//! [`RouteError`]: crate::error::RouteError

use crate::error::RouteResult;
use crate::types::{AudioMode, DeviceHandle, RingerMode};

/// What an audio focus request is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FocusUsage {
    /// Ringtone playback for an incoming call
    Ringtone,
    /// Voice communication for an established call
    VoiceCall,
}

/// Platform volume/routing primitives
pub trait AudioPort: Send + Sync + std::fmt::Debug {
    /// Turn the loudspeaker flag on or off
    fn set_speakerphone(&self, on: bool) -> RouteResult<()>;

    /// Set the Bluetooth SCO routing flag
    fn set_sco_enabled(&self, on: bool) -> RouteResult<()>;

    /// Ask the platform to bring up the SCO link
    fn start_sco(&self) -> RouteResult<()>;

    /// Ask the platform to tear down the SCO link
    fn stop_sco(&self) -> RouteResult<()>;

    /// Current platform report of the SCO audio path
    ///
    /// Platform bookkeeping may lag the physical link; this alone is never
    /// sufficient evidence of an active Bluetooth route.
    fn is_sco_connected(&self) -> bool;

    /// Claim exclusive audio focus
    fn request_audio_focus(&self, usage: FocusUsage) -> RouteResult<()>;

    /// Release a previously claimed audio focus
    fn abandon_audio_focus(&self, usage: FocusUsage) -> RouteResult<()>;

    /// Switch the audio manager output mode
    fn set_mode(&self, mode: AudioMode) -> RouteResult<()>;

    /// Ringer mode currently configured on the device
    fn ringer_mode(&self) -> RingerMode;
}

/// Platform Bluetooth hands-free profile access
pub trait BluetoothProfileProvider: Send + Sync + std::fmt::Debug {
    /// Whether the Bluetooth adapter is powered on
    fn adapter_enabled(&self) -> bool;

    /// Begin acquiring the hands-free profile proxy
    ///
    /// Completion is reported later through a profile-connected callback.
    fn request_profile_proxy(&self) -> RouteResult<()>;

    /// Release the profile proxy
    fn close_profile_proxy(&self);

    /// Paired hands-free devices currently in connected state
    fn connected_devices(&self) -> Vec<DeviceHandle>;
}

/// Proximity sensor registration
pub trait ProximitySensor: Send + Sync + std::fmt::Debug {
    /// Start delivering samples
    fn register(&self) -> RouteResult<()>;

    /// Stop delivering samples
    fn unregister(&self);
}

/// Screen-off wake-lock used while the phone is held to the ear
pub trait WakeLock: Send + Sync + std::fmt::Debug {
    /// Acquire the lock (screen may turn off)
    fn acquire(&self) -> RouteResult<()>;

    /// Release the lock
    fn release(&self);
}

/// Ringtone playback
pub trait RingtonePlayer: Send + Sync + std::fmt::Debug {
    /// Start looping the ringtone
    fn play_looping(&self) -> RouteResult<()>;

    /// Stop playback
    fn stop(&self);
}

/// Vibration motor
pub trait Vibrator: Send + Sync + std::fmt::Debug {
    /// Run a pattern of alternating off/on durations
    fn vibrate(&self, pattern_ms: &[u64], repeat: bool) -> RouteResult<()>;

    /// Cancel any running pattern
    fn cancel(&self);
}
