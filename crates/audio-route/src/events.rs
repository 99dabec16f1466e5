//! Observability events for UI and telemetry
//!
//! The coordinator never returns route failures through its event-handling
//! entry points. Instead it publishes [`RouteEvent`]s that UI layers turn into
//! toasts or state updates.
//!
//! ```rust
//! use rvoip_audio_route::events::{EventEmitter, RouteEvent};
//! use rvoip_audio_route::AudioRoute;
//!
//! # tokio_test::block_on(async {
//! let emitter = EventEmitter::new(8);
//! let mut events = emitter.subscribe_simple();
//!
//! emitter.emit(RouteEvent::confirmed(AudioRoute::Speaker));
//!
//! match events.next().await {
//!     Some(RouteEvent::RouteConfirmed { route, .. }) => assert_eq!(route, AudioRoute::Speaker),
//!     other => panic!("unexpected event: {:?}", other),
//! }
//! # })
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

use crate::error::{RouteError, RouteResult};
use crate::types::AudioRoute;

/// Why the coordinator moved away from the desired route on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FallbackReason {
    /// SCO link never confirmed within the retry budget
    ScoTimeout,
    /// Headset went away while routed (or routing) to it
    HeadsetDisconnected,
    /// Policy wanted Bluetooth but no headset was available
    BluetoothUnavailable,
}

/// Why an explicit user route request was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DenialReason {
    /// Bluetooth requested with no headset connected
    BluetoothUnavailable,
}

/// Events emitted by the route coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RouteEvent {
    /// Hardware verifiably entered a new route
    RouteConfirmed {
        /// The confirmed route
        route: AudioRoute,
        /// When it was confirmed
        timestamp: DateTime<Utc>,
    },

    /// Route degraded automatically
    RouteFallback {
        /// Route that could not be kept
        from: AudioRoute,
        /// Route used instead
        to: AudioRoute,
        /// Why
        reason: FallbackReason,
        /// When
        timestamp: DateTime<Utc>,
    },

    /// Explicit user request could not be honoured
    RouteRequestDenied {
        /// Requested route
        requested: AudioRoute,
        /// Why
        reason: DenialReason,
        /// When
        timestamp: DateTime<Utc>,
    },

    /// Incoming-call ring session started or stopped
    RingSessionChanged {
        /// Whether a ring session now exists
        ringing: bool,
        /// When
        timestamp: DateTime<Utc>,
    },

    /// Platform refused a hardware command; state was kept optimistically
    HardwareCommandRejected {
        /// Command name
        operation: String,
        /// Platform-provided reason
        reason: String,
        /// When
        timestamp: DateTime<Utc>,
    },

    /// SCO stayed connected after the teardown retry budget
    ScoTeardownTimeout {
        /// Stop commands issued
        attempts: u8,
        /// When
        timestamp: DateTime<Utc>,
    },
}

impl RouteEvent {
    /// Route confirmed now
    pub fn confirmed(route: AudioRoute) -> Self {
        RouteEvent::RouteConfirmed {
            route,
            timestamp: Utc::now(),
        }
    }

    /// Fallback happening now
    pub fn fallback(from: AudioRoute, to: AudioRoute, reason: FallbackReason) -> Self {
        RouteEvent::RouteFallback {
            from,
            to,
            reason,
            timestamp: Utc::now(),
        }
    }

    /// Request denied now
    pub fn denied(requested: AudioRoute, reason: DenialReason) -> Self {
        RouteEvent::RouteRequestDenied {
            requested,
            reason,
            timestamp: Utc::now(),
        }
    }

    /// Ring session change now
    pub fn ring_session(ringing: bool) -> Self {
        RouteEvent::RingSessionChanged {
            ringing,
            timestamp: Utc::now(),
        }
    }

    /// Hardware rejection now
    pub fn rejected(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        RouteEvent::HardwareCommandRejected {
            operation: operation.into(),
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    /// Teardown timeout now
    pub fn teardown_timeout(attempts: u8) -> Self {
        RouteEvent::ScoTeardownTimeout {
            attempts,
            timestamp: Utc::now(),
        }
    }

    /// When the event was produced
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            RouteEvent::RouteConfirmed { timestamp, .. }
            | RouteEvent::RouteFallback { timestamp, .. }
            | RouteEvent::RouteRequestDenied { timestamp, .. }
            | RouteEvent::RingSessionChanged { timestamp, .. }
            | RouteEvent::HardwareCommandRejected { timestamp, .. }
            | RouteEvent::ScoTeardownTimeout { timestamp, .. } => *timestamp,
        }
    }

    /// Whether the UI should surface this as a transient notification
    ///
    /// Policy-driven fallbacks for a missing headset stay silent; only
    /// explicit requests surface that as a denial.
    pub fn is_user_visible(&self) -> bool {
        match self {
            RouteEvent::RouteFallback { reason, .. } => {
                *reason != FallbackReason::BluetoothUnavailable
            }
            RouteEvent::RouteRequestDenied { .. } => true,
            _ => false,
        }
    }
}

/// Event stream type
pub type EventStream = BroadcastStream<RouteEvent>;

/// Simple event iterator that doesn't require StreamExt
pub struct EventIterator {
    stream: EventStream,
}

impl EventIterator {
    /// Create a new event iterator from a stream
    pub fn new(stream: EventStream) -> Self {
        Self { stream }
    }

    /// Get the next event, skipping over lag notifications
    pub async fn next(&mut self) -> Option<RouteEvent> {
        use tokio_stream::StreamExt;
        loop {
            match self.stream.next().await {
                Some(Ok(event)) => return Some(event),
                Some(Err(lagged)) => {
                    warn!(error = %lagged, "Route event subscriber lagged");
                }
                None => return None,
            }
        }
    }
}

/// Event emitter for route events
#[derive(Debug, Clone)]
pub struct EventEmitter {
    sender: broadcast::Sender<RouteEvent>,
}

impl EventEmitter {
    /// Create a new event emitter with the specified capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Emit an event
    pub fn emit(&self, event: RouteEvent) {
        // No receivers is fine
        let _ = self.sender.send(event);
    }

    /// Fold the result of a hardware command into the event stream
    ///
    /// Returns whether the command succeeded. Failures are soft: they are
    /// logged and published as [`RouteEvent::HardwareCommandRejected`].
    pub fn report(&self, operation: &str, result: RouteResult<()>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(operation, error = %e, category = e.category(), "Hardware command rejected");
                let reason = match e {
                    RouteError::HardwareCommandRejected { reason, .. } => reason,
                    other => other.to_string(),
                };
                self.emit(RouteEvent::rejected(operation, reason));
                false
            }
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> EventStream {
        BroadcastStream::new(self.sender.subscribe())
    }

    /// Subscribe to events with a simple iterator
    pub fn subscribe_simple(&self) -> EventIterator {
        EventIterator::new(self.subscribe())
    }

    /// Raw receiver, convenient for synchronous draining with `try_recv`
    pub fn receiver(&self) -> broadcast::Receiver<RouteEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active receivers
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_receivers_is_silent() {
        let emitter = EventEmitter::new(4);
        assert_eq!(emitter.receiver_count(), 0);
        emitter.emit(RouteEvent::confirmed(AudioRoute::Earpiece));
    }

    #[test]
    fn test_user_visible_events() {
        assert!(RouteEvent::fallback(
            AudioRoute::Bluetooth,
            AudioRoute::Speaker,
            FallbackReason::ScoTimeout
        )
        .is_user_visible());
        assert!(
            RouteEvent::denied(AudioRoute::Bluetooth, DenialReason::BluetoothUnavailable)
                .is_user_visible()
        );
        assert!(!RouteEvent::fallback(
            AudioRoute::Bluetooth,
            AudioRoute::Earpiece,
            FallbackReason::BluetoothUnavailable
        )
        .is_user_visible());
        assert!(!RouteEvent::confirmed(AudioRoute::Speaker).is_user_visible());
        assert!(!RouteEvent::teardown_timeout(10).is_user_visible());
    }

    #[test]
    fn test_report_publishes_rejection() {
        let emitter = EventEmitter::new(4);
        let mut rx = emitter.receiver();

        assert!(emitter.report("set_speakerphone", Ok(())));
        assert!(!emitter.report(
            "request_audio_focus",
            Err(RouteError::rejected("request_audio_focus", "focus denied"))
        ));

        match rx.try_recv() {
            Ok(RouteEvent::HardwareCommandRejected {
                operation, reason, ..
            }) => {
                assert_eq!(operation, "request_audio_focus");
                assert_eq!(reason, "focus denied");
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_iterator_skips_lag() {
        let emitter = EventEmitter::new(1);
        let mut events = emitter.subscribe_simple();
        emitter.emit(RouteEvent::ring_session(true));
        emitter.emit(RouteEvent::ring_session(false));

        match events.next().await {
            Some(RouteEvent::RingSessionChanged { ringing, .. }) => assert!(!ringing),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_event_serializes() {
        let event = RouteEvent::fallback(
            AudioRoute::Bluetooth,
            AudioRoute::Speaker,
            FallbackReason::ScoTimeout,
        );
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("RouteFallback"));
        assert!(json.contains("ScoTimeout"));
    }
}
