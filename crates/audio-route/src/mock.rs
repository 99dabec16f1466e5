//! Recording fakes for the hardware traits
//!
//! Every fake records what it was asked to do and exposes knobs to make the
//! platform misbehave (refuse focus, never confirm SCO, keep SCO up after a
//! stop). [`ManualScheduler`] replaces tokio timers with a virtual clock so
//! retry loops can be driven deterministically.
//!
//! ```rust
//! use rvoip_audio_route::mock::MockHardware;
//! use rvoip_audio_route::{AudioRoute, CallState, CallStateEvent, RouteConfig};
//!
//! let hw = MockHardware::new();
//! let mut coordinator = hw.coordinator(RouteConfig::default()).unwrap();
//!
//! coordinator.on_call_state_changed(CallStateEvent::new(CallState::Active).with_video(true));
//! assert_eq!(coordinator.current_confirmed_route(), AudioRoute::Speaker);
//! assert!(hw.port.speaker_on());
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::builder::AudioRouteBuilder;
use crate::config::RouteConfig;
use crate::coordinator::RouteCoordinator;
use crate::error::{RouteError, RouteResult};
use crate::hardware::{
    AudioPort, BluetoothProfileProvider, FocusUsage, ProximitySensor, RingtonePlayer, Vibrator,
    WakeLock,
};
use crate::scheduler::{Scheduler, TimerEvent};
use crate::types::{AudioMode, DeviceHandle, RingerMode};

/// A command the coordinator sent to the audio port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortCommand {
    SetSpeakerphone(bool),
    SetScoEnabled(bool),
    StartSco,
    StopSco,
    RequestFocus(FocusUsage),
    AbandonFocus(FocusUsage),
    SetMode(AudioMode),
}

#[derive(Debug)]
struct PortState {
    commands: Vec<PortCommand>,
    speaker_on: bool,
    sco_enabled: bool,
    sco_connected: bool,
    auto_connect: bool,
    sticky_sco: bool,
    focus: HashSet<FocusUsage>,
    deny_focus: bool,
    reject_speakerphone: Option<String>,
    ringer_mode: RingerMode,
    mode: AudioMode,
}

impl Default for PortState {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
            speaker_on: false,
            sco_enabled: false,
            sco_connected: false,
            auto_connect: false,
            sticky_sco: false,
            focus: HashSet::new(),
            deny_focus: false,
            reject_speakerphone: None,
            ringer_mode: RingerMode::Normal,
            mode: AudioMode::Normal,
        }
    }
}

/// Fake audio manager
///
/// SCO starts disconnected and `start_sco` does not connect it unless
/// [`set_auto_connect`](Self::set_auto_connect) is on.
#[derive(Debug, Default)]
pub struct MockAudioPort {
    state: Mutex<PortState>,
}

impl MockAudioPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every command received, in order
    pub fn commands(&self) -> Vec<PortCommand> {
        self.state.lock().commands.clone()
    }

    pub fn command_count(&self) -> usize {
        self.state.lock().commands.len()
    }

    pub fn clear_commands(&self) {
        self.state.lock().commands.clear();
    }

    /// Simulate the platform reporting the SCO path up or down
    pub fn set_sco_connected(&self, connected: bool) {
        self.state.lock().sco_connected = connected;
    }

    /// Make `start_sco` bring the link up immediately
    pub fn set_auto_connect(&self, auto_connect: bool) {
        self.state.lock().auto_connect = auto_connect;
    }

    /// Make `stop_sco` leave the link reported up
    pub fn set_sticky_sco(&self, sticky: bool) {
        self.state.lock().sticky_sco = sticky;
    }

    /// Refuse every audio focus request
    pub fn deny_focus(&self, deny: bool) {
        self.state.lock().deny_focus = deny;
    }

    /// Refuse speakerphone changes with `reason`
    pub fn reject_speakerphone(&self, reason: Option<&str>) {
        self.state.lock().reject_speakerphone = reason.map(str::to_string);
    }

    pub fn set_ringer_mode(&self, mode: RingerMode) {
        self.state.lock().ringer_mode = mode;
    }

    pub fn speaker_on(&self) -> bool {
        self.state.lock().speaker_on
    }

    pub fn sco_enabled(&self) -> bool {
        self.state.lock().sco_enabled
    }

    pub fn focus_held(&self, usage: FocusUsage) -> bool {
        self.state.lock().focus.contains(&usage)
    }

    pub fn any_focus_held(&self) -> bool {
        !self.state.lock().focus.is_empty()
    }

    pub fn mode(&self) -> AudioMode {
        self.state.lock().mode
    }
}

impl AudioPort for MockAudioPort {
    fn set_speakerphone(&self, on: bool) -> RouteResult<()> {
        let mut state = self.state.lock();
        state.commands.push(PortCommand::SetSpeakerphone(on));
        if let Some(reason) = &state.reject_speakerphone {
            return Err(RouteError::rejected("set_speakerphone", reason.clone()));
        }
        state.speaker_on = on;
        Ok(())
    }

    fn set_sco_enabled(&self, on: bool) -> RouteResult<()> {
        let mut state = self.state.lock();
        state.commands.push(PortCommand::SetScoEnabled(on));
        state.sco_enabled = on;
        Ok(())
    }

    fn start_sco(&self) -> RouteResult<()> {
        let mut state = self.state.lock();
        state.commands.push(PortCommand::StartSco);
        if state.auto_connect {
            state.sco_connected = true;
        }
        Ok(())
    }

    fn stop_sco(&self) -> RouteResult<()> {
        let mut state = self.state.lock();
        state.commands.push(PortCommand::StopSco);
        if !state.sticky_sco {
            state.sco_connected = false;
        }
        Ok(())
    }

    fn is_sco_connected(&self) -> bool {
        self.state.lock().sco_connected
    }

    fn request_audio_focus(&self, usage: FocusUsage) -> RouteResult<()> {
        let mut state = self.state.lock();
        state.commands.push(PortCommand::RequestFocus(usage));
        if state.deny_focus {
            return Err(RouteError::rejected("request_audio_focus", "focus denied"));
        }
        state.focus.insert(usage);
        Ok(())
    }

    fn abandon_audio_focus(&self, usage: FocusUsage) -> RouteResult<()> {
        let mut state = self.state.lock();
        state.commands.push(PortCommand::AbandonFocus(usage));
        state.focus.remove(&usage);
        Ok(())
    }

    fn set_mode(&self, mode: AudioMode) -> RouteResult<()> {
        let mut state = self.state.lock();
        state.commands.push(PortCommand::SetMode(mode));
        state.mode = mode;
        Ok(())
    }

    fn ringer_mode(&self) -> RingerMode {
        self.state.lock().ringer_mode
    }
}

#[derive(Debug)]
struct ProfileState {
    adapter_enabled: bool,
    reject: Option<String>,
    devices: Vec<DeviceHandle>,
    proxy_requests: usize,
    proxy_closes: usize,
}

/// Fake hands-free profile provider; adapter on, no devices
#[derive(Debug)]
pub struct MockBluetoothProfile {
    state: Mutex<ProfileState>,
}

impl Default for MockBluetoothProfile {
    fn default() -> Self {
        Self {
            state: Mutex::new(ProfileState {
                adapter_enabled: true,
                reject: None,
                devices: Vec::new(),
                proxy_requests: 0,
                proxy_closes: 0,
            }),
        }
    }
}

impl MockBluetoothProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect_device(&self, device: DeviceHandle) {
        let mut state = self.state.lock();
        if !state.devices.contains(&device) {
            state.devices.push(device);
        }
    }

    pub fn disconnect_device(&self, device: &DeviceHandle) {
        self.state.lock().devices.retain(|d| d != device);
    }

    pub fn set_adapter_enabled(&self, enabled: bool) {
        self.state.lock().adapter_enabled = enabled;
    }

    /// Reject proxy requests with `reason`, or accept them again with `None`
    pub fn reject_proxy(&self, reason: Option<&str>) {
        self.state.lock().reject = reason.map(str::to_string);
    }

    pub fn proxy_requests(&self) -> usize {
        self.state.lock().proxy_requests
    }

    pub fn proxy_closes(&self) -> usize {
        self.state.lock().proxy_closes
    }
}

impl BluetoothProfileProvider for MockBluetoothProfile {
    fn adapter_enabled(&self) -> bool {
        self.state.lock().adapter_enabled
    }

    fn request_profile_proxy(&self) -> RouteResult<()> {
        let mut state = self.state.lock();
        state.proxy_requests += 1;
        match &state.reject {
            Some(reason) => Err(RouteError::profile_proxy(reason.clone())),
            None => Ok(()),
        }
    }

    fn close_profile_proxy(&self) {
        self.state.lock().proxy_closes += 1;
    }

    fn connected_devices(&self) -> Vec<DeviceHandle> {
        self.state.lock().devices.clone()
    }
}

#[derive(Debug, Default)]
struct SensorState {
    registered: bool,
    fail: bool,
    register_count: usize,
    unregister_count: usize,
}

/// Fake proximity sensor
#[derive(Debug, Default)]
pub struct MockProximitySensor {
    state: Mutex<SensorState>,
}

impl MockProximitySensor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_registration(&self, fail: bool) {
        self.state.lock().fail = fail;
    }

    pub fn is_registered(&self) -> bool {
        self.state.lock().registered
    }

    pub fn register_count(&self) -> usize {
        self.state.lock().register_count
    }

    pub fn unregister_count(&self) -> usize {
        self.state.lock().unregister_count
    }
}

impl ProximitySensor for MockProximitySensor {
    fn register(&self) -> RouteResult<()> {
        let mut state = self.state.lock();
        if state.fail {
            return Err(RouteError::sensor("no proximity sensor"));
        }
        state.registered = true;
        state.register_count += 1;
        Ok(())
    }

    fn unregister(&self) {
        let mut state = self.state.lock();
        state.registered = false;
        state.unregister_count += 1;
    }
}

#[derive(Debug, Default)]
struct LockState {
    held: bool,
    fail: bool,
    acquire_count: usize,
    release_count: usize,
}

/// Fake screen-off wake-lock
#[derive(Debug, Default)]
pub struct MockWakeLock {
    state: Mutex<LockState>,
}

impl MockWakeLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_acquire(&self, fail: bool) {
        self.state.lock().fail = fail;
    }

    pub fn is_held(&self) -> bool {
        self.state.lock().held
    }

    pub fn acquire_count(&self) -> usize {
        self.state.lock().acquire_count
    }

    pub fn release_count(&self) -> usize {
        self.state.lock().release_count
    }
}

impl WakeLock for MockWakeLock {
    fn acquire(&self) -> RouteResult<()> {
        let mut state = self.state.lock();
        if state.fail {
            return Err(RouteError::rejected("acquire_wake_lock", "wake-lock denied"));
        }
        state.held = true;
        state.acquire_count += 1;
        Ok(())
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.held = false;
        state.release_count += 1;
    }
}

#[derive(Debug, Default)]
struct PlayerState {
    playing: bool,
    fail: bool,
    play_count: usize,
    stop_count: usize,
}

/// Fake ringtone player
#[derive(Debug, Default)]
pub struct MockRingtonePlayer {
    state: Mutex<PlayerState>,
}

impl MockRingtonePlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_playback(&self, fail: bool) {
        self.state.lock().fail = fail;
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    pub fn play_count(&self) -> usize {
        self.state.lock().play_count
    }

    pub fn stop_count(&self) -> usize {
        self.state.lock().stop_count
    }
}

impl RingtonePlayer for MockRingtonePlayer {
    fn play_looping(&self) -> RouteResult<()> {
        let mut state = self.state.lock();
        if state.fail {
            return Err(RouteError::rejected("play_ringtone", "no ringtone set"));
        }
        state.playing = true;
        state.play_count += 1;
        Ok(())
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        state.playing = false;
        state.stop_count += 1;
    }
}

#[derive(Debug, Default)]
struct VibratorState {
    vibrating: bool,
    last_pattern: Option<(Vec<u64>, bool)>,
    cancel_count: usize,
}

/// Fake vibration motor
#[derive(Debug, Default)]
pub struct MockVibrator {
    state: Mutex<VibratorState>,
}

impl MockVibrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_vibrating(&self) -> bool {
        self.state.lock().vibrating
    }

    /// Last pattern started and whether it repeats
    pub fn last_pattern(&self) -> Option<(Vec<u64>, bool)> {
        self.state.lock().last_pattern.clone()
    }

    pub fn cancel_count(&self) -> usize {
        self.state.lock().cancel_count
    }
}

impl Vibrator for MockVibrator {
    fn vibrate(&self, pattern_ms: &[u64], repeat: bool) -> RouteResult<()> {
        let mut state = self.state.lock();
        state.vibrating = true;
        state.last_pattern = Some((pattern_ms.to_vec(), repeat));
        Ok(())
    }

    fn cancel(&self) {
        let mut state = self.state.lock();
        state.vibrating = false;
        state.cancel_count += 1;
    }
}

#[derive(Debug, Default)]
struct ClockState {
    now: Duration,
    seq: u64,
    pending: Vec<(Duration, u64, TimerEvent)>,
    scheduled: usize,
}

/// Virtual-clock scheduler
///
/// Ticks only fire when the test moves the clock with
/// [`run_for`](Self::run_for) or [`advance`](Self::advance).
#[derive(Debug, Default)]
pub struct ManualScheduler {
    state: Mutex<ClockState>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed since creation
    pub fn now(&self) -> Duration {
        self.state.lock().now
    }

    /// Ticks waiting to fire
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Ticks ever scheduled
    pub fn scheduled_count(&self) -> usize {
        self.state.lock().scheduled
    }

    /// Move the clock forward by `by`, delivering due ticks in order
    ///
    /// Ticks scheduled by `deliver` are due relative to the tick that
    /// produced them and fire within the same call if they fall inside the
    /// window. Returns the number of ticks delivered.
    pub fn run_for(&self, by: Duration, mut deliver: impl FnMut(TimerEvent)) -> usize {
        let target = self.state.lock().now + by;
        let mut delivered = 0;
        // lock released before each delivery so `deliver` may schedule
        while let Some(event) = self.pop_due(target) {
            deliver(event);
            delivered += 1;
        }
        let mut state = self.state.lock();
        if state.now < target {
            state.now = target;
        }
        delivered
    }

    /// Move the clock forward and collect due ticks without delivering them
    pub fn advance(&self, by: Duration) -> Vec<TimerEvent> {
        let mut due = Vec::new();
        self.run_for(by, |event| due.push(event));
        due
    }

    fn pop_due(&self, target: Duration) -> Option<TimerEvent> {
        let mut state = self.state.lock();
        let index = state
            .pending
            .iter()
            .enumerate()
            .filter(|(_, (due, _, _))| *due <= target)
            .min_by_key(|(_, (due, seq, _))| (*due, *seq))
            .map(|(index, _)| index)?;
        let (due, _, event) = state.pending.remove(index);
        state.now = due;
        Some(event)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, event: TimerEvent) {
        let mut state = self.state.lock();
        let due = state.now + delay;
        let seq = state.seq;
        state.seq += 1;
        state.scheduled += 1;
        state.pending.push((due, seq, event));
    }

    fn cancel_all(&self) {
        self.state.lock().pending.clear();
    }
}

/// One of every fake, wired together
#[derive(Debug, Clone)]
pub struct MockHardware {
    pub port: Arc<MockAudioPort>,
    pub bluetooth: Arc<MockBluetoothProfile>,
    pub sensor: Arc<MockProximitySensor>,
    pub wake_lock: Arc<MockWakeLock>,
    pub ringtone: Arc<MockRingtonePlayer>,
    pub vibrator: Arc<MockVibrator>,
    pub scheduler: Arc<ManualScheduler>,
}

impl Default for MockHardware {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHardware {
    pub fn new() -> Self {
        Self {
            port: Arc::new(MockAudioPort::new()),
            bluetooth: Arc::new(MockBluetoothProfile::new()),
            sensor: Arc::new(MockProximitySensor::new()),
            wake_lock: Arc::new(MockWakeLock::new()),
            ringtone: Arc::new(MockRingtonePlayer::new()),
            vibrator: Arc::new(MockVibrator::new()),
            scheduler: Arc::new(ManualScheduler::new()),
        }
    }

    /// Builder with every hardware slot filled by these fakes
    pub fn builder(&self) -> AudioRouteBuilder {
        AudioRouteBuilder::new()
            .audio_port(self.port.clone())
            .bluetooth_provider(self.bluetooth.clone())
            .proximity_sensor(self.sensor.clone())
            .wake_lock(self.wake_lock.clone())
            .ringtone_player(self.ringtone.clone())
            .vibrator(self.vibrator.clone())
    }

    /// Coordinator driven by the virtual-clock scheduler
    pub fn coordinator(&self, config: RouteConfig) -> RouteResult<RouteCoordinator> {
        self.builder()
            .config(config)
            .build_coordinator(self.scheduler.clone())
    }

    /// Deliver every tick due within `by` to `coordinator`
    pub fn run_for(&self, coordinator: &mut RouteCoordinator, by: Duration) -> usize {
        self.scheduler
            .run_for(by, |tick| coordinator.on_timer(tick))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::TimerKind;

    #[test]
    fn test_run_for_delivers_rescheduled_ticks() {
        let scheduler = ManualScheduler::new();
        scheduler.schedule(Duration::from_millis(200), TimerEvent::new(TimerKind::ScoRetry, 1));

        let mut seen = Vec::new();
        let delivered = scheduler.run_for(Duration::from_millis(600), |tick| {
            seen.push(scheduler.now());
            if seen.len() < 5 {
                scheduler.schedule(Duration::from_millis(200), tick);
            }
        });

        assert_eq!(delivered, 3);
        assert_eq!(
            seen,
            vec![
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(600)
            ]
        );
        assert_eq!(scheduler.now(), Duration::from_millis(600));
        assert_eq!(scheduler.pending_count(), 1);
    }

    #[test]
    fn test_advance_orders_by_due_time() {
        let scheduler = ManualScheduler::new();
        scheduler.schedule(Duration::from_millis(300), TimerEvent::new(TimerKind::ScoTeardown, 2));
        scheduler.schedule(Duration::from_millis(100), TimerEvent::new(TimerKind::ScoRetry, 1));

        let due = scheduler.advance(Duration::from_millis(300));
        assert_eq!(
            due,
            vec![
                TimerEvent::new(TimerKind::ScoRetry, 1),
                TimerEvent::new(TimerKind::ScoTeardown, 2)
            ]
        );
    }

    #[test]
    fn test_cancel_all_clears_pending() {
        let scheduler = ManualScheduler::new();
        scheduler.schedule(Duration::from_millis(100), TimerEvent::new(TimerKind::ScoRetry, 1));
        scheduler.cancel_all();
        assert!(scheduler.advance(Duration::from_secs(1)).is_empty());
        assert_eq!(scheduler.scheduled_count(), 1);
    }

    #[test]
    fn test_sticky_sco_survives_stop() {
        let port = MockAudioPort::new();
        port.set_auto_connect(true);
        port.start_sco().unwrap();
        assert!(port.is_sco_connected());

        port.set_sticky_sco(true);
        port.stop_sco().unwrap();
        assert!(port.is_sco_connected());

        port.set_sticky_sco(false);
        port.stop_sco().unwrap();
        assert!(!port.is_sco_connected());
    }
}
