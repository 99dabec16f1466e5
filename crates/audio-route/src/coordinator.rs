//! Call audio route coordinator
//!
//! The decision engine. It consumes call-state transitions, Bluetooth
//! availability changes, platform route reports, proximity samples, timer
//! ticks and user route requests, and drives the leaf components so that the
//! *confirmed* route converges on the *desired* one.
//!
//! # Routing policy
//!
//! The desired route is picked automatically only at call-state boundaries,
//! and only when the user has not chosen a route since the previous
//! transition:
//!
//! | Transition | Desired route |
//! |---|---|
//! | → Ringing | Speaker if no headset and the media engine rings, else unchanged |
//! | → Ringing (during a call) | unchanged; the live call keeps its audio |
//! | → Active (video) | Bluetooth if a headset is connected, else Speaker |
//! | → Active (audio) | Bluetooth if a headset is connected, else Earpiece (Speaker on tablets) |
//! | → Ended (last call) | Earpiece, with every per-call resource released |
//!
//! A headset that appears mid-call does not move the route; the user has to
//! ask for it.
//!
//! # Convergence
//!
//! Speaker and Earpiece are confirmed as soon as the flags are set. The
//! Bluetooth route is confirmed only once the SCO state machine verified the
//! link, and degrades to Speaker if it never does.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::bluetooth::{BluetoothEvent, BluetoothHeadsetConnector};
use crate::config::RouteConfig;
use crate::error::{RouteError, RouteResult};
use crate::events::{DenialReason, EventEmitter, EventStream, FallbackReason, RouteEvent};
use crate::hardware::{AudioPort, FocusUsage};
use crate::proximity::ProximityGuard;
use crate::ringing::{RingStart, RingingController};
use crate::scheduler::{Scheduler, TimerEvent};
use crate::sco::{ScoActivation, ScoActivationAttempt, ScoOutcome};
use crate::types::{
    AudioMode, AudioRoute, BluetoothHeadsetAvailability, CallState, CallStateEvent,
    ProximitySample, RouteSnapshot, ScoState,
};

/// Single-writer route state machine
///
/// Every method takes `&mut self`; callers serialise access, usually through
/// [`AudioRouteService`](crate::service::AudioRouteService). No method blocks
/// and none propagates hardware failures.
#[derive(Debug)]
pub struct RouteCoordinator {
    config: RouteConfig,
    port: Arc<dyn AudioPort>,
    connector: BluetoothHeadsetConnector,
    proximity: ProximityGuard,
    ringing: RingingController,
    sco: ScoActivation,
    scheduler: Arc<dyn Scheduler>,
    events: EventEmitter,

    call_state: CallState,
    has_video: bool,
    desired: AudioRoute,
    confirmed: AudioRoute,
    user_selected: bool,
    availability: BluetoothHeadsetAvailability,

    speaker_on: bool,
    call_focus_held: bool,
    in_communication: bool,
    /// Policy for Active already applied in this session
    entered_active: bool,
    shut_down: bool,
}

impl RouteCoordinator {
    /// Assemble a coordinator from already-constructed components
    ///
    /// The coordinator takes ownership of the connector, guard and ringing
    /// controller. The SCO state machine is built here from `port` and
    /// `scheduler` so that timer ticks and link reports share one owner.
    pub fn new(
        config: RouteConfig,
        port: Arc<dyn AudioPort>,
        connector: BluetoothHeadsetConnector,
        proximity: ProximityGuard,
        ringing: RingingController,
        scheduler: Arc<dyn Scheduler>,
        events: EventEmitter,
    ) -> Self {
        let sco = ScoActivation::new(
            config.sco.clone(),
            port.clone(),
            scheduler.clone(),
            events.clone(),
        );
        Self {
            config,
            port,
            connector,
            proximity,
            ringing,
            sco,
            scheduler,
            events,
            call_state: CallState::Idle,
            has_video: false,
            desired: AudioRoute::Earpiece,
            confirmed: AudioRoute::Earpiece,
            user_selected: false,
            availability: BluetoothHeadsetAvailability::absent(),
            speaker_on: false,
            call_focus_held: false,
            in_communication: false,
            entered_active: false,
            shut_down: false,
        }
    }

    /// Begin acquiring the hands-free profile proxy
    ///
    /// Failure leaves the headset unavailable until an adapter event.
    pub fn start(&mut self) {
        if let Err(e) = self.connector.start() {
            debug!(error = %e, "Bluetooth headset connector not started");
        }
        self.refresh_availability();
    }

    /// Apply a call-state transition from the call engine
    pub fn on_call_state_changed(&mut self, event: CallStateEvent) {
        if self.shut_down {
            debug!(?event, "Ignoring call state change after shutdown");
            return;
        }

        let previous = self.call_state;
        debug!(from = %previous, to = %event.state, has_video = event.has_video, "Call state changed");

        match event.state {
            CallState::Ringing if self.in_call() => {
                // Waiting call: the live call keeps its state, mode and focus
                debug!(current = %previous, "Incoming call while in call; ring left to the call engine");
            }
            CallState::Ringing => {
                self.call_state = CallState::Ringing;
                self.has_video = event.has_video;
                self.refresh_availability();

                let device_ringtone = self.config.ring.device_ringtone_enabled;
                if self.ringing.start(device_ringtone) == RingStart::Started {
                    self.in_communication = false;
                }
                if !self.user_selected
                    && !self.entered_active
                    && !device_ringtone
                    && !self.availability.present
                {
                    self.desired = AudioRoute::Speaker;
                }
            }
            CallState::Dialing => {
                self.call_state = CallState::Dialing;
                self.has_video = event.has_video;
                self.stop_ringing();
                self.acquire_call_focus();
            }
            CallState::Active => {
                self.call_state = CallState::Active;
                self.has_video = event.has_video;
                self.stop_ringing();
                self.acquire_call_focus();

                if !self.entered_active {
                    self.entered_active = true;
                    if !self.user_selected {
                        self.refresh_availability();
                        self.desired = self.active_policy_route();
                        debug!(route = %self.desired, "Policy picked route for active call");
                    }
                }
            }
            CallState::Paused => {
                self.call_state = CallState::Paused;
                self.has_video = event.has_video;
                self.stop_ringing();
            }
            CallState::Ended if !event.session_empty => {
                // Another call keeps the session alive; only its ring goes
                debug!("Call ended with other calls remaining");
                self.stop_ringing();
                if matches!(previous, CallState::Active | CallState::Paused) {
                    self.acquire_call_focus();
                }
            }
            CallState::Ended | CallState::Idle => {
                self.call_state = event.state;
                self.stop_ringing();
                self.end_session();
            }
        }

        self.user_selected = false;
        self.converge();
    }

    /// Feed a platform Bluetooth callback through the connector
    pub fn on_bluetooth_event(&mut self, event: BluetoothEvent) {
        if self.shut_down {
            debug!(?event, "Ignoring Bluetooth event after shutdown");
            return;
        }
        self.connector.handle_event(event);
        let availability = self.connector.availability();
        self.on_bluetooth_availability_changed(availability);
    }

    /// Apply a headset availability change
    pub fn on_bluetooth_availability_changed(&mut self, availability: BluetoothHeadsetAvailability) {
        if self.shut_down {
            return;
        }

        let was_present = self.availability.present;
        self.availability = availability;

        match (was_present, self.availability.present) {
            (false, true) => {
                info!(device = ?self.availability.device, "Bluetooth headset available");
                if self.desired == AudioRoute::Bluetooth
                    && matches!(self.sco.state(), ScoState::Idle | ScoState::Failed)
                {
                    self.converge();
                }
            }
            (true, false) => {
                info!("Bluetooth headset lost");
                if self.desired == AudioRoute::Bluetooth {
                    let to = self.fallback_route();
                    self.fall_back(to, FallbackReason::HeadsetDisconnected);
                }
            }
            _ => {}
        }
    }

    /// Explicit user route selection
    ///
    /// Bluetooth is refused with [`RouteError::BluetoothUnavailable`] (and a
    /// [`RouteEvent::RouteRequestDenied`]) when no headset is connected.
    pub fn request_route(&mut self, route: AudioRoute) -> RouteResult<()> {
        if self.shut_down {
            return Err(RouteError::ServiceStopped);
        }

        if route == AudioRoute::Bluetooth {
            self.refresh_availability();
            if !self.availability.present {
                warn!(route = %route, "Route request denied; no Bluetooth headset");
                self.events.emit(RouteEvent::denied(
                    route,
                    DenialReason::BluetoothUnavailable,
                ));
                return Err(RouteError::BluetoothUnavailable);
            }
        }

        info!(route = %route, previous = %self.desired, "User requested route");
        self.user_selected = true;
        self.desired = route;
        self.converge();
        Ok(())
    }

    /// Platform "route changed" report carrying the SCO-connected flag
    pub fn on_audio_route_changed(&mut self, sco_connected: bool) {
        if self.shut_down {
            return;
        }
        let device = self.connector.active_device();
        let outcome = self.sco.on_link_report(sco_connected, device.as_ref());
        self.apply_sco_outcome(outcome);
    }

    /// Raw proximity reading
    pub fn on_proximity_sample(&mut self, sample: ProximitySample) {
        if self.shut_down {
            return;
        }
        self.proximity.on_sample(sample);
    }

    /// A scheduled SCO poll fired
    pub fn on_timer(&mut self, event: TimerEvent) {
        if self.shut_down {
            debug!(?event, "Ignoring timer after shutdown");
            return;
        }
        let device = self.connector.active_device();
        let outcome = self.sco.on_timer(event, device.as_ref());
        self.apply_sco_outcome(outcome);
    }

    /// Drive the hardware towards the desired route
    ///
    /// Idempotent: with nothing changed, a second call issues no commands.
    pub fn converge(&mut self) {
        if self.shut_down {
            return;
        }

        match self.desired {
            AudioRoute::Bluetooth => {
                self.set_speaker(false);
                match self.sco.state() {
                    ScoState::Active => self.confirm(AudioRoute::Bluetooth),
                    ScoState::Requested | ScoState::Verifying => {}
                    ScoState::Idle | ScoState::Failed => {
                        self.refresh_availability();
                        if !self.availability.present {
                            let to = self.fallback_route();
                            // fall_back converges again on the new route
                            self.fall_back(to, FallbackReason::BluetoothUnavailable);
                            return;
                        }
                        debug!(device = ?self.availability.device, "Starting SCO activation");
                        self.sco.request();
                    }
                }
            }
            AudioRoute::Speaker => {
                self.sco.teardown();
                self.set_speaker(true);
                self.confirm(AudioRoute::Speaker);
            }
            AudioRoute::Earpiece => {
                self.sco.teardown();
                self.set_speaker(false);
                self.confirm(AudioRoute::Earpiece);
            }
        }

        self.update_proximity();
    }

    /// Route the hardware verifiably entered
    pub fn current_confirmed_route(&self) -> AudioRoute {
        self.confirmed
    }

    /// Route requested by the user or by policy
    pub fn desired_route(&self) -> AudioRoute {
        self.desired
    }

    /// Latest call state
    pub fn call_state(&self) -> CallState {
        self.call_state
    }

    /// Current SCO attempt
    pub fn sco_attempt(&self) -> ScoActivationAttempt {
        self.sco.attempt()
    }

    /// Whether [`shutdown`](Self::shutdown) has run
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Read-only view for UI reflection
    pub fn snapshot(&self) -> RouteSnapshot {
        RouteSnapshot {
            call_state: self.call_state,
            has_video: self.has_video,
            desired_route: self.desired,
            confirmed_route: self.confirmed,
            user_selected: self.user_selected,
            bluetooth: self.availability.clone(),
            sco_state: self.sco.state(),
            sco_retry_count: self.sco.retry_count(),
            ring_session: self.ringing.session(),
            proximity: self.proximity.state(),
            call_audio_focus_held: self.call_focus_held,
        }
    }

    /// Subscribe to route events
    pub fn subscribe(&self) -> EventStream {
        self.events.subscribe()
    }

    /// Event emitter shared with the leaf components
    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    /// Cancel every timer and release every hardware resource
    ///
    /// Release order is SCO, speaker, call audio focus, proximity wake-lock,
    /// ringtone. Idempotent; later events are ignored.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        info!(call_state = %self.call_state, route = %self.confirmed, "Shutting down route coordinator");

        self.scheduler.cancel_all();
        self.sco.reset();
        self.set_speaker(false);
        self.release_call_focus();
        self.proximity.disable();
        self.ringing.stop();
        self.connector.stop();

        self.call_state = CallState::Idle;
        self.has_video = false;
        self.desired = AudioRoute::Earpiece;
        self.confirmed = AudioRoute::Earpiece;
        self.user_selected = false;
        self.availability = BluetoothHeadsetAvailability::absent();
        self.entered_active = false;
        self.shut_down = true;
    }

    /// Route for Active when policy decides
    fn active_policy_route(&self) -> AudioRoute {
        if self.availability.present {
            AudioRoute::Bluetooth
        } else if self.has_video || self.config.is_tablet {
            AudioRoute::Speaker
        } else {
            AudioRoute::Earpiece
        }
    }

    /// Where audio goes when Bluetooth cannot be kept
    fn fallback_route(&self) -> AudioRoute {
        if self.has_video || self.config.is_tablet {
            AudioRoute::Speaker
        } else {
            AudioRoute::Earpiece
        }
    }

    fn fall_back(&mut self, to: AudioRoute, reason: FallbackReason) {
        let from = AudioRoute::Bluetooth;
        warn!(from = %from, to = %to, ?reason, "Route fallback");
        self.desired = to;
        self.events.emit(RouteEvent::fallback(from, to, reason));
        self.converge();
    }

    fn apply_sco_outcome(&mut self, outcome: ScoOutcome) {
        match outcome {
            ScoOutcome::Pending | ScoOutcome::TeardownComplete => {}
            ScoOutcome::Activated => {
                if self.desired == AudioRoute::Bluetooth {
                    self.confirm(AudioRoute::Bluetooth);
                    self.update_proximity();
                }
            }
            ScoOutcome::Failed { attempts } => {
                let error = RouteError::ScoActivationTimeout { attempts };
                warn!(error = %error, "Falling back to speaker");
                // Never stay on earpiece silently after a failed headset route
                self.fall_back(AudioRoute::Speaker, FallbackReason::ScoTimeout);
            }
            ScoOutcome::TeardownTimedOut { attempts } => {
                let error = RouteError::ScoTeardownTimeout { attempts };
                warn!(error = %error, route = %self.confirmed, "Keeping new route despite SCO teardown timeout");
            }
        }
    }

    fn confirm(&mut self, route: AudioRoute) {
        if self.confirmed == route {
            return;
        }
        info!(route = %route, previous = %self.confirmed, "Route confirmed");
        self.confirmed = route;
        self.events.emit(RouteEvent::confirmed(route));
    }

    fn set_speaker(&mut self, on: bool) {
        if self.speaker_on == on {
            return;
        }
        // Kept optimistically even if the platform refuses
        self.events
            .report("set_speakerphone", self.port.set_speakerphone(on));
        self.speaker_on = on;
    }

    fn update_proximity(&mut self) {
        let wanted = matches!(self.call_state, CallState::Active | CallState::Ringing)
            && self.desired == AudioRoute::Earpiece;
        if wanted {
            if let Err(e) = self.proximity.enable() {
                self.events.report("register_proximity_sensor", Err(e));
            }
        } else {
            self.proximity.disable();
        }
    }

    /// A call is connected or being placed
    fn in_call(&self) -> bool {
        matches!(
            self.call_state,
            CallState::Dialing | CallState::Active | CallState::Paused
        )
    }

    fn refresh_availability(&mut self) {
        self.availability = self.connector.availability();
    }

    fn stop_ringing(&mut self) {
        if self.ringing.stop() {
            self.in_communication = false;
        }
    }

    fn acquire_call_focus(&mut self) {
        if !self.call_focus_held {
            self.call_focus_held = self.events.report(
                "request_audio_focus",
                self.port.request_audio_focus(FocusUsage::VoiceCall),
            );
        }
        if !self.in_communication {
            self.events
                .report("set_mode", self.port.set_mode(AudioMode::InCommunication));
            self.in_communication = true;
        }
    }

    fn release_call_focus(&mut self) {
        if self.call_focus_held {
            self.events.report(
                "abandon_audio_focus",
                self.port.abandon_audio_focus(FocusUsage::VoiceCall),
            );
            self.call_focus_held = false;
        }
        if self.in_communication {
            self.events
                .report("set_mode", self.port.set_mode(AudioMode::Normal));
            self.in_communication = false;
        }
    }

    /// Tear down every per-call sub-state once the session is empty
    fn end_session(&mut self) {
        self.sco.teardown();
        self.proximity.disable();
        self.release_call_focus();
        self.has_video = false;
        self.entered_active = false;
        if self.desired != AudioRoute::Earpiece {
            debug!(previous = %self.desired, "Resetting route for next call");
        }
        self.desired = AudioRoute::Earpiece;
    }
}

impl Drop for RouteCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
