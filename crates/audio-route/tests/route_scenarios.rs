//! End-to-end routing scenarios
//!
//! Drives a coordinator wired to the recording fakes through realistic call
//! flows and checks both the route it settles on and the hardware it leaves
//! behind.

use std::time::Duration;

use rvoip_audio_route::mock::{MockHardware, PortCommand};
use rvoip_audio_route::{
    AudioMode, AudioRoute, BluetoothEvent, CallState, CallStateEvent, DenialReason, DeviceHandle,
    FallbackReason, FocusUsage, ProximitySample, RouteConfig, RouteCoordinator, RouteError,
    RouteEvent, ScoState,
};
use tokio::sync::broadcast;

const HEADSET: &str = "00:1B:66:AA:BB:CC";

fn setup(config: RouteConfig) -> (MockHardware, RouteCoordinator, broadcast::Receiver<RouteEvent>) {
    let hw = MockHardware::new();
    let coordinator = hw.coordinator(config).expect("coordinator");
    let events = coordinator.events().receiver();
    (hw, coordinator, events)
}

fn headset_connects(hw: &MockHardware, c: &mut RouteCoordinator) {
    hw.bluetooth.connect_device(DeviceHandle::new(HEADSET));
    c.on_bluetooth_event(BluetoothEvent::ProfileConnected);
}

fn drain(rx: &mut broadcast::Receiver<RouteEvent>) -> Vec<RouteEvent> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

fn fallbacks(events: &[RouteEvent]) -> Vec<(AudioRoute, AudioRoute, FallbackReason)> {
    events
        .iter()
        .filter_map(|e| match e {
            RouteEvent::RouteFallback {
                from, to, reason, ..
            } => Some((*from, *to, *reason)),
            _ => None,
        })
        .collect()
}

#[test]
fn test_incoming_video_call_without_headset() {
    let (hw, mut c, mut events) = setup(RouteConfig::engine_ringtone());

    c.on_call_state_changed(CallStateEvent::new(CallState::Ringing).with_video(true));
    assert_eq!(c.current_confirmed_route(), AudioRoute::Speaker, "ring is audible on speaker");
    assert!(hw.port.speaker_on());

    c.on_call_state_changed(CallStateEvent::new(CallState::Active).with_video(true));
    assert_eq!(c.current_confirmed_route(), AudioRoute::Speaker);
    assert!(hw.port.focus_held(FocusUsage::VoiceCall));
    assert!(!hw.sensor.is_registered(), "no proximity blanking on speaker");

    c.on_call_state_changed(CallStateEvent::new(CallState::Ended));
    assert_eq!(c.desired_route(), AudioRoute::Earpiece);
    assert_eq!(c.current_confirmed_route(), AudioRoute::Earpiece);
    assert!(!hw.port.speaker_on());

    let confirmed: Vec<_> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            RouteEvent::RouteConfirmed { route, .. } => Some(route),
            _ => None,
        })
        .collect();
    assert_eq!(confirmed, vec![AudioRoute::Speaker, AudioRoute::Earpiece]);
}

#[test]
fn test_headset_connecting_mid_call_does_not_switch() {
    let (hw, mut c, mut events) = setup(RouteConfig::default());
    c.on_bluetooth_event(BluetoothEvent::ProfileConnected);
    c.on_call_state_changed(CallStateEvent::new(CallState::Active));
    assert_eq!(c.current_confirmed_route(), AudioRoute::Earpiece);
    let before = hw.port.command_count();

    hw.bluetooth.connect_device(DeviceHandle::new(HEADSET));
    c.on_bluetooth_event(BluetoothEvent::DeviceConnectionChanged);

    assert!(c.snapshot().bluetooth.present);
    assert_eq!(c.desired_route(), AudioRoute::Earpiece);
    assert_eq!(c.current_confirmed_route(), AudioRoute::Earpiece);
    assert_eq!(c.snapshot().sco_state, ScoState::Idle);
    assert_eq!(hw.port.command_count(), before);
    assert!(drain(&mut events).is_empty());

    // the user has to ask for it
    c.request_route(AudioRoute::Bluetooth).unwrap();
    assert_eq!(c.snapshot().sco_state, ScoState::Verifying);
}

#[test]
fn test_requested_bluetooth_that_never_confirms_falls_back_once() {
    let (hw, mut c, mut events) = setup(RouteConfig::default());
    headset_connects(&hw, &mut c);
    c.on_call_state_changed(CallStateEvent::new(CallState::Active));
    c.request_route(AudioRoute::Earpiece).unwrap();
    c.request_route(AudioRoute::Bluetooth).unwrap();
    drain(&mut events);

    hw.run_for(&mut c, Duration::from_secs(10));

    assert_eq!(c.current_confirmed_route(), AudioRoute::Speaker);
    assert_eq!(c.snapshot().sco_state, ScoState::Idle);
    assert_eq!(
        fallbacks(&drain(&mut events)),
        vec![(
            AudioRoute::Bluetooth,
            AudioRoute::Speaker,
            FallbackReason::ScoTimeout
        )]
    );
    assert_eq!(hw.scheduler.pending_count(), 0);
}

#[test]
fn test_bluetooth_request_without_headset_is_denied() {
    let (hw, mut c, mut events) = setup(RouteConfig::default());
    c.on_call_state_changed(CallStateEvent::new(CallState::Active));
    c.request_route(AudioRoute::Speaker).unwrap();
    drain(&mut events);

    assert_eq!(
        c.request_route(AudioRoute::Bluetooth),
        Err(RouteError::BluetoothUnavailable)
    );
    assert_eq!(c.current_confirmed_route(), AudioRoute::Speaker);
    assert!(hw.port.speaker_on());

    let events = drain(&mut events);
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        RouteEvent::RouteRequestDenied {
            requested: AudioRoute::Bluetooth,
            reason: DenialReason::BluetoothUnavailable,
            ..
        }
    ));
    assert!(events[0].is_user_visible());
}

#[test]
fn test_bluetooth_confirmed_only_after_verification() {
    let (hw, mut c, mut events) = setup(RouteConfig::default());
    headset_connects(&hw, &mut c);
    c.on_call_state_changed(CallStateEvent::new(CallState::Active));

    // flag set but the platform has not reported the link
    assert!(hw.port.sco_enabled());
    c.on_audio_route_changed(false);
    assert_eq!(c.current_confirmed_route(), AudioRoute::Earpiece);

    hw.run_for(&mut c, Duration::from_millis(400));
    assert_eq!(c.snapshot().sco_retry_count, 2);

    hw.port.set_sco_connected(true);
    hw.run_for(&mut c, Duration::from_millis(200));
    assert_eq!(c.current_confirmed_route(), AudioRoute::Bluetooth);
    assert_eq!(c.snapshot().sco_state, ScoState::Active);
    assert!(drain(&mut events)
        .iter()
        .any(|e| matches!(e, RouteEvent::RouteConfirmed { route: AudioRoute::Bluetooth, .. })));
}

#[test]
fn test_switching_away_mid_activation_leaves_no_retries() {
    let (hw, mut c, _events) = setup(RouteConfig::default());
    headset_connects(&hw, &mut c);
    c.on_call_state_changed(CallStateEvent::new(CallState::Active));
    hw.run_for(&mut c, Duration::from_millis(300));

    c.request_route(AudioRoute::Speaker).unwrap();
    assert_eq!(c.current_confirmed_route(), AudioRoute::Speaker);
    let after_switch = hw.port.command_count();

    let fired = hw.run_for(&mut c, Duration::from_secs(5));
    assert!(fired <= 1, "only the stale retry tick may fire");
    assert_eq!(hw.port.command_count(), after_switch);
    assert!(!hw.port.sco_enabled());
}

#[test]
fn test_sticky_link_teardown_is_retried_then_abandoned() {
    let (hw, mut c, mut events) = setup(RouteConfig::default());
    headset_connects(&hw, &mut c);
    hw.port.set_sticky_sco(true);
    c.on_call_state_changed(CallStateEvent::new(CallState::Active));
    hw.port.set_sco_connected(true);
    c.on_audio_route_changed(true);
    assert_eq!(c.current_confirmed_route(), AudioRoute::Bluetooth);

    c.request_route(AudioRoute::Earpiece).unwrap();
    // route is forced regardless of the platform still reporting SCO
    assert_eq!(c.current_confirmed_route(), AudioRoute::Earpiece);

    hw.run_for(&mut c, Duration::from_secs(5));
    let stops = hw
        .port
        .commands()
        .iter()
        .filter(|cmd| **cmd == PortCommand::StopSco)
        .count();
    // initial stop plus ten retries
    assert_eq!(stops, 11);
    assert_eq!(hw.scheduler.pending_count(), 0);
    assert_eq!(c.current_confirmed_route(), AudioRoute::Earpiece);
    assert!(drain(&mut events)
        .iter()
        .any(|e| matches!(e, RouteEvent::ScoTeardownTimeout { attempts: 10, .. })));
}

#[test]
fn test_headset_lost_during_verification_on_video_call() {
    let (hw, mut c, mut events) = setup(RouteConfig::default());
    headset_connects(&hw, &mut c);
    c.on_call_state_changed(CallStateEvent::new(CallState::Active).with_video(true));
    assert_eq!(c.desired_route(), AudioRoute::Bluetooth);
    drain(&mut events);

    c.on_bluetooth_event(BluetoothEvent::AdapterStateChanged { enabled: false });

    assert_eq!(c.current_confirmed_route(), AudioRoute::Speaker);
    assert_eq!(c.snapshot().sco_state, ScoState::Idle);
    assert_eq!(
        fallbacks(&drain(&mut events)),
        vec![(
            AudioRoute::Bluetooth,
            AudioRoute::Speaker,
            FallbackReason::HeadsetDisconnected
        )]
    );
    assert_eq!(hw.bluetooth.proxy_closes(), 1);
}

#[test]
fn test_adapter_reenabled_restores_availability() {
    let (hw, mut c, _events) = setup(RouteConfig::default());
    hw.bluetooth.connect_device(DeviceHandle::new(HEADSET));
    c.on_bluetooth_event(BluetoothEvent::AdapterStateChanged { enabled: false });
    assert!(!c.snapshot().bluetooth.present);

    c.on_bluetooth_event(BluetoothEvent::AdapterStateChanged { enabled: true });
    assert_eq!(hw.bluetooth.proxy_requests(), 2);
    c.on_bluetooth_event(BluetoothEvent::ProfileConnected);
    assert!(c.snapshot().bluetooth.present);

    c.on_call_state_changed(CallStateEvent::new(CallState::Active));
    assert_eq!(c.desired_route(), AudioRoute::Bluetooth);
}

#[test]
fn test_tablet_rings_then_answers_on_speaker() {
    let (hw, mut c, _events) = setup(RouteConfig::tablet());
    c.on_call_state_changed(CallStateEvent::new(CallState::Ringing));
    assert!(hw.ringtone.is_playing());
    assert_eq!(hw.port.mode(), AudioMode::Ringtone);

    c.on_call_state_changed(CallStateEvent::new(CallState::Active));
    assert!(!hw.ringtone.is_playing());
    assert!(!hw.vibrator.is_vibrating());
    assert_eq!(c.current_confirmed_route(), AudioRoute::Speaker);
}

#[test]
fn test_proximity_follows_earpiece_route() {
    let (hw, mut c, _events) = setup(RouteConfig::default());
    c.on_call_state_changed(CallStateEvent::new(CallState::Active));
    c.on_proximity_sample(ProximitySample::new(0.0, 5.0));
    assert!(hw.wake_lock.is_held());

    c.request_route(AudioRoute::Speaker).unwrap();
    assert!(!hw.wake_lock.is_held());
    assert!(!hw.sensor.is_registered());

    // late sample after disable is ignored
    c.on_proximity_sample(ProximitySample::new(0.0, 5.0));
    assert!(!hw.wake_lock.is_held());

    c.request_route(AudioRoute::Earpiece).unwrap();
    assert!(hw.sensor.is_registered());
    assert!(!hw.wake_lock.is_held());
}

#[test]
fn test_call_waiting_ring_and_decline_keep_live_call() {
    let (hw, mut c, _events) = setup(RouteConfig::default());
    headset_connects(&hw, &mut c);
    c.on_call_state_changed(CallStateEvent::new(CallState::Active));
    hw.port.set_sco_connected(true);
    c.on_audio_route_changed(true);
    assert_eq!(c.current_confirmed_route(), AudioRoute::Bluetooth);
    hw.port.clear_commands();

    // second call rings while the first is live
    c.on_call_state_changed(CallStateEvent::new(CallState::Ringing));
    assert_eq!(c.call_state(), CallState::Active);
    assert_eq!(hw.port.mode(), AudioMode::InCommunication);
    assert!(!hw.ringtone.is_playing());
    assert!(!hw.port.focus_held(FocusUsage::Ringtone));
    assert_eq!(c.current_confirmed_route(), AudioRoute::Bluetooth);

    // caller declines the waiting call
    c.on_call_state_changed(CallStateEvent::new(CallState::Ended).with_session_empty(false));
    assert_eq!(c.call_state(), CallState::Active);
    assert_eq!(hw.port.mode(), AudioMode::InCommunication);
    assert!(hw.port.focus_held(FocusUsage::VoiceCall));
    assert!(!hw.port.focus_held(FocusUsage::Ringtone));
    assert_eq!(c.current_confirmed_route(), AudioRoute::Bluetooth);
    assert_eq!(c.snapshot().sco_state, ScoState::Active);
    assert!(hw.port.sco_enabled());
    assert!(!hw
        .port
        .commands()
        .iter()
        .any(|cmd| matches!(cmd, PortCommand::SetMode(_) | PortCommand::StopSco)));

    c.on_call_state_changed(CallStateEvent::new(CallState::Ended));
    assert_eq!(c.current_confirmed_route(), AudioRoute::Earpiece);
    assert_eq!(hw.port.mode(), AudioMode::Normal);
    assert!(!hw.port.sco_enabled());
}

#[test]
fn test_call_waiting_ring_on_earpiece_keeps_proximity() {
    let (hw, mut c, _events) = setup(RouteConfig::default());
    c.on_call_state_changed(CallStateEvent::new(CallState::Active));
    c.on_proximity_sample(ProximitySample::new(0.0, 5.0));
    assert!(hw.wake_lock.is_held());

    c.on_call_state_changed(CallStateEvent::new(CallState::Ringing));
    assert_eq!(c.desired_route(), AudioRoute::Earpiece);
    assert!(hw.sensor.is_registered());
    assert!(hw.wake_lock.is_held());
    assert_eq!(hw.ringtone.play_count(), 0);

    c.on_call_state_changed(CallStateEvent::new(CallState::Ended).with_session_empty(false));
    assert_eq!(c.call_state(), CallState::Active);
    assert!(hw.sensor.is_registered());
    assert_eq!(hw.port.mode(), AudioMode::InCommunication);
}
