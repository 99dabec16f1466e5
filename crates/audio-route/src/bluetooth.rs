//! Bluetooth headset connector
//!
//! Owns the handshake for the hands-free profile proxy. Acquisition is
//! asynchronous: [`BluetoothHeadsetConnector::start`] only asks the platform
//! for the proxy, and the matching [`BluetoothEvent::ProfileConnected`]
//! completes it.
//!
//! A failed acquisition is never retried on a timer. The connector waits for
//! a fresh adapter state change instead, so a permanently absent adapter is
//! not busy-polled.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{RouteError, RouteResult};
use crate::hardware::BluetoothProfileProvider;
use crate::types::{BluetoothHeadsetAvailability, DeviceHandle};

/// Profile proxy connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectorState {
    /// No proxy held
    Disconnected,
    /// Proxy requested, waiting for the platform callback
    ProfileConnecting,
    /// Proxy held
    ProfileConnected,
}

/// Callbacks from the platform Bluetooth stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BluetoothEvent {
    /// Hands-free profile proxy became available
    ProfileConnected,
    /// Hands-free profile proxy was lost
    ProfileDisconnected,
    /// A paired headset connected or disconnected
    DeviceConnectionChanged,
    /// Adapter radio switched on or off
    AdapterStateChanged {
        /// New adapter power state
        enabled: bool,
    },
}

/// Manages the hands-free profile proxy and reports headset presence
#[derive(Debug)]
pub struct BluetoothHeadsetConnector {
    provider: Arc<dyn BluetoothProfileProvider>,
    state: ConnectorState,
}

impl BluetoothHeadsetConnector {
    /// Create a connector over a platform provider
    pub fn new(provider: Arc<dyn BluetoothProfileProvider>) -> Self {
        Self {
            provider,
            state: ConnectorState::Disconnected,
        }
    }

    /// Current proxy state
    pub fn state(&self) -> ConnectorState {
        self.state
    }

    /// Begin acquiring the profile proxy; a no-op once connecting or connected
    pub fn start(&mut self) -> RouteResult<()> {
        if self.state != ConnectorState::Disconnected {
            return Ok(());
        }

        if !self.provider.adapter_enabled() {
            debug!("Bluetooth adapter disabled; waiting for adapter state change");
            return Err(RouteError::profile_proxy("adapter disabled"));
        }

        match self.provider.request_profile_proxy() {
            Ok(()) => {
                debug!("Requested hands-free profile proxy");
                self.state = ConnectorState::ProfileConnecting;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Hands-free profile proxy request rejected");
                self.state = ConnectorState::Disconnected;
                Err(e)
            }
        }
    }

    /// Release the profile proxy
    pub fn stop(&mut self) {
        if self.state != ConnectorState::Disconnected {
            self.provider.close_profile_proxy();
            debug!("Released hands-free profile proxy");
        }
        self.state = ConnectorState::Disconnected;
    }

    /// Apply a platform callback
    pub fn handle_event(&mut self, event: BluetoothEvent) {
        match event {
            BluetoothEvent::ProfileConnected => match self.state {
                ConnectorState::ProfileConnecting | ConnectorState::ProfileConnected => {
                    info!("Hands-free profile proxy connected");
                    self.state = ConnectorState::ProfileConnected;
                }
                ConnectorState::Disconnected => {
                    // Arrived after stop(); hand it straight back
                    debug!("Late profile proxy after stop; closing");
                    self.provider.close_profile_proxy();
                }
            },
            BluetoothEvent::ProfileDisconnected => {
                if self.state != ConnectorState::Disconnected {
                    info!("Hands-free profile proxy disconnected");
                }
                self.state = ConnectorState::Disconnected;
            }
            BluetoothEvent::DeviceConnectionChanged => {
                // Presence is re-queried on demand
            }
            BluetoothEvent::AdapterStateChanged { enabled: true } => {
                if let Err(e) = self.start() {
                    debug!(error = %e, "Profile proxy not acquired after adapter enable");
                }
            }
            BluetoothEvent::AdapterStateChanged { enabled: false } => {
                self.stop();
            }
        }
    }

    /// True only with a proxy held and at least one connected device
    pub fn is_headset_present(&self) -> bool {
        self.active_device().is_some()
    }

    /// Device audio would be routed to
    pub fn active_device(&self) -> Option<DeviceHandle> {
        if self.state != ConnectorState::ProfileConnected {
            return None;
        }
        self.provider.connected_devices().into_iter().next()
    }

    /// Fresh availability, queried from the platform
    pub fn availability(&self) -> BluetoothHeadsetAvailability {
        match self.active_device() {
            Some(device) => BluetoothHeadsetAvailability::connected(device),
            None => BluetoothHeadsetAvailability::absent(),
        }
    }
}
