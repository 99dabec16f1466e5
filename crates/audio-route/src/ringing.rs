//! Ringing controller
//!
//! Owns ringtone playback, the vibration pattern and the ringtone audio
//! focus for an incoming call. When the device ringtone is disabled the
//! external media engine plays the ring, and the controller's only job is to
//! tell the coordinator to keep audio on the loudspeaker.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::RingConfig;
use crate::events::{EventEmitter, RouteEvent};
use crate::hardware::{AudioPort, FocusUsage, RingtonePlayer, Vibrator};
use crate::types::{AudioMode, RingSession};

/// Result of [`RingingController::start`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingStart {
    /// A ring session was created
    Started,
    /// Playback belongs to the media engine; route the ring to Speaker
    Delegated,
    /// A session was already running
    AlreadyRinging,
}

/// Incoming-call ring session owner
#[derive(Debug)]
pub struct RingingController {
    port: Arc<dyn AudioPort>,
    player: Arc<dyn RingtonePlayer>,
    vibrator: Arc<dyn Vibrator>,
    config: RingConfig,
    events: EventEmitter,
    session: Option<RingSession>,
}

impl RingingController {
    pub fn new(
        port: Arc<dyn AudioPort>,
        player: Arc<dyn RingtonePlayer>,
        vibrator: Arc<dyn Vibrator>,
        config: RingConfig,
        events: EventEmitter,
    ) -> Self {
        Self {
            port,
            player,
            vibrator,
            config,
            events,
            session: None,
        }
    }

    /// Active ring session, if any
    pub fn session(&self) -> Option<RingSession> {
        self.session
    }

    pub fn is_ringing(&self) -> bool {
        self.session.is_some()
    }

    /// `Idle → Ringing`
    ///
    /// Ringtone and vibration each honour the device ringer mode. Platform
    /// refusals are reported and leave the matching session flag unset.
    pub fn start(&mut self, device_ringtone_enabled: bool) -> RingStart {
        if self.session.is_some() {
            return RingStart::AlreadyRinging;
        }
        if !device_ringtone_enabled {
            debug!("Device ringtone disabled; ring delegated to media engine");
            return RingStart::Delegated;
        }

        let audio_focus_held = self.events.report(
            "request_audio_focus",
            self.port.request_audio_focus(FocusUsage::Ringtone),
        );
        self.events
            .report("set_mode", self.port.set_mode(AudioMode::Ringtone));

        let ringer = self.port.ringer_mode();
        let playing = ringer.allows_ringtone()
            && self.events.report("play_ringtone", self.player.play_looping());
        let vibrating = ringer.allows_vibration()
            && !self.config.vibration_pattern_ms.is_empty()
            && self.events.report(
                "vibrate",
                self.vibrator.vibrate(&self.config.vibration_pattern_ms, true),
            );

        let session = RingSession {
            playing,
            vibrating,
            audio_focus_held,
        };
        info!(?ringer, ?session, "Ring session started");
        self.session = Some(session);
        self.events.emit(RouteEvent::ring_session(true));
        RingStart::Started
    }

    /// `Ringing → Idle`, releasing everything the session holds
    ///
    /// Returns whether a session was actually stopped.
    pub fn stop(&mut self) -> bool {
        let Some(session) = self.session.take() else {
            return false;
        };

        if session.playing {
            self.player.stop();
        }
        if session.vibrating {
            self.vibrator.cancel();
        }
        if session.audio_focus_held {
            self.events.report(
                "abandon_audio_focus",
                self.port.abandon_audio_focus(FocusUsage::Ringtone),
            );
        }
        self.events
            .report("set_mode", self.port.set_mode(AudioMode::Normal));

        info!("Ring session stopped");
        self.events.emit(RouteEvent::ring_session(false));
        true
    }
}
