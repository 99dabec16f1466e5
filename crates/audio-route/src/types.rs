//! Core routing types
//!
//! Plain data shared by every component: call states as seen by the router,
//! the three physical routes, Bluetooth headset availability and the
//! read-only snapshot handed to UI layers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Call state as reduced for routing purposes
///
/// Owned by the external call engine. The coordinator only keeps the most
/// recent value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallState {
    /// No call in progress
    Idle,
    /// Incoming call is ringing
    Ringing,
    /// Outgoing call is being set up
    Dialing,
    /// Call is connected and carrying media
    Active,
    /// Call is on hold
    Paused,
    /// Call has ended
    Ended,
}

impl CallState {
    /// Whether a call exists in this state (ringing, dialing, active or held)
    pub fn is_in_call(&self) -> bool {
        matches!(
            self,
            CallState::Ringing | CallState::Dialing | CallState::Active | CallState::Paused
        )
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallState::Idle => "idle",
            CallState::Ringing => "ringing",
            CallState::Dialing => "dialing",
            CallState::Active => "active",
            CallState::Paused => "paused",
            CallState::Ended => "ended",
        };
        f.write_str(name)
    }
}

/// A call-state transition delivered by the call engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallStateEvent {
    /// New call state
    pub state: CallState,
    /// Whether the call currently has video enabled
    pub has_video: bool,
    /// For `Ended`: whether no other call remains in the session
    pub session_empty: bool,
}

impl CallStateEvent {
    /// Audio-only transition with an otherwise empty session
    pub fn new(state: CallState) -> Self {
        Self {
            state,
            has_video: false,
            session_empty: true,
        }
    }

    /// Mark the call as carrying video
    pub fn with_video(mut self, has_video: bool) -> Self {
        self.has_video = has_video;
        self
    }

    /// Mark whether other calls remain after this one ends
    pub fn with_session_empty(mut self, session_empty: bool) -> Self {
        self.session_empty = session_empty;
        self
    }
}

/// Physical audio path carrying the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioRoute {
    /// Handset earpiece
    Earpiece,
    /// Loudspeaker
    Speaker,
    /// Bluetooth hands-free headset over SCO
    Bluetooth,
}

impl Default for AudioRoute {
    fn default() -> Self {
        AudioRoute::Earpiece
    }
}

impl fmt::Display for AudioRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AudioRoute::Earpiece => "earpiece",
            AudioRoute::Speaker => "speaker",
            AudioRoute::Bluetooth => "bluetooth",
        };
        f.write_str(name)
    }
}

/// Opaque handle to a connected hands-free device
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceHandle(pub String);

impl DeviceHandle {
    /// Create a handle from a platform identifier (usually the device address)
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether a usable hands-free headset is connected right now
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BluetoothHeadsetAvailability {
    /// A profile proxy is held and at least one device reports connected
    pub present: bool,
    /// The device audio would be routed to
    pub device: Option<DeviceHandle>,
}

impl BluetoothHeadsetAvailability {
    /// No headset
    pub fn absent() -> Self {
        Self::default()
    }

    /// Headset connected as `device`
    pub fn connected(device: DeviceHandle) -> Self {
        Self {
            present: true,
            device: Some(device),
        }
    }
}

/// Output mode of the platform audio manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioMode {
    /// No call audio
    Normal,
    /// Ringtone playback
    Ringtone,
    /// Voice communication
    InCommunication,
}

/// Device ringer mode as configured by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RingerMode {
    /// Neither ring nor vibrate
    Silent,
    /// Vibrate only
    Vibrate,
    /// Ring, and vibrate if the pattern allows it
    Normal,
}

impl RingerMode {
    /// Whether this mode permits vibration
    pub fn allows_vibration(&self) -> bool {
        !matches!(self, RingerMode::Silent)
    }

    /// Whether this mode permits audible ringing
    pub fn allows_ringtone(&self) -> bool {
        matches!(self, RingerMode::Normal)
    }
}

/// Raw proximity sensor reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProximitySample {
    /// Measured distance in centimetres
    pub distance_cm: f32,
    /// Maximum range the sensor reports, in centimetres
    pub max_range_cm: f32,
}

impl ProximitySample {
    /// Create a sample
    pub fn new(distance_cm: f32, max_range_cm: f32) -> Self {
        Self {
            distance_cm,
            max_range_cm,
        }
    }
}

/// Lifecycle state of an SCO activation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoState {
    /// Nothing requested
    Idle,
    /// Start command issued
    Requested,
    /// Waiting for the platform to confirm the link
    Verifying,
    /// Link confirmed connected with a headset attached
    Active,
    /// Retries exhausted
    Failed,
}

/// Per-call ringing resources
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingSession {
    /// Ringtone is playing
    pub playing: bool,
    /// Vibration pattern is running
    pub vibrating: bool,
    /// Ringtone audio focus is held
    pub audio_focus_held: bool,
}

/// Proximity guard resources
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProximityGuardState {
    /// Sensor listener registered
    pub registered: bool,
    /// Screen wake-lock held
    pub wake_lock_held: bool,
}

/// Read-only view of the coordinator for UI reflection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSnapshot {
    /// Latest call state
    pub call_state: CallState,
    /// Whether the current call carries video
    pub has_video: bool,
    /// Route last requested by the user or by policy
    pub desired_route: AudioRoute,
    /// Route the hardware verifiably entered
    pub confirmed_route: AudioRoute,
    /// Whether the user picked the route since the last call-state change
    pub user_selected: bool,
    /// Cached headset availability
    pub bluetooth: BluetoothHeadsetAvailability,
    /// SCO activation state
    pub sco_state: ScoState,
    /// SCO retries issued so far in the current attempt
    pub sco_retry_count: u8,
    /// Ring session, if an incoming call is ringing
    pub ring_session: Option<RingSession>,
    /// Proximity guard state
    pub proximity: ProximityGuardState,
    /// Voice-call audio focus held
    pub call_audio_focus_held: bool,
}
