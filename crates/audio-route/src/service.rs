//! Single-writer route service
//!
//! Platform callbacks arrive on many threads: the call engine, the Bluetooth
//! stack, sensors and the UI. [`AudioRouteService`] owns the
//! [`RouteCoordinator`] inside one tokio task and applies everything in
//! arrival order. Callbacks post [`RouteCommand`]s through a cloneable
//! [`AudioRouteHandle`] and never block; SCO timer ticks from the
//! [`TokioScheduler`](crate::scheduler::TokioScheduler) are merged into the
//! same task.

use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::bluetooth::BluetoothEvent;
use crate::coordinator::RouteCoordinator;
use crate::error::{RouteError, RouteResult};
use crate::events::{EventEmitter, EventIterator, EventStream, RouteEvent};
use crate::scheduler::TimerEvent;
use crate::types::{
    AudioRoute, BluetoothHeadsetAvailability, CallStateEvent, ProximitySample, RouteSnapshot,
};

/// Work items for the service task
#[derive(Debug)]
pub enum RouteCommand {
    CallStateChanged(CallStateEvent),
    Bluetooth(BluetoothEvent),
    BluetoothAvailability(BluetoothHeadsetAvailability),
    AudioRouteChanged {
        sco_connected: bool,
    },
    ProximitySample(ProximitySample),
    RequestRoute {
        route: AudioRoute,
        reply: oneshot::Sender<RouteResult<()>>,
    },
    ConfirmedRoute {
        reply: oneshot::Sender<AudioRoute>,
    },
    Snapshot {
        reply: oneshot::Sender<RouteSnapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Owns the coordinator and drains commands and timer ticks
#[derive(Debug)]
pub struct AudioRouteService {
    coordinator: RouteCoordinator,
    commands: mpsc::UnboundedReceiver<RouteCommand>,
    timers: mpsc::UnboundedReceiver<TimerEvent>,
}

impl AudioRouteService {
    /// Wrap `coordinator`; `timers` must be the receiving end of its scheduler
    pub fn new(
        coordinator: RouteCoordinator,
        timers: mpsc::UnboundedReceiver<TimerEvent>,
    ) -> (Self, AudioRouteHandle) {
        let (tx, commands) = mpsc::unbounded_channel();
        let handle = AudioRouteHandle {
            tx,
            events: coordinator.events().clone(),
        };
        let service = Self {
            coordinator,
            commands,
            timers,
        };
        (service, handle)
    }

    /// Run the service on the current runtime
    pub fn spawn(
        coordinator: RouteCoordinator,
        timers: mpsc::UnboundedReceiver<TimerEvent>,
    ) -> AudioRouteHandle {
        let (service, handle) = Self::new(coordinator, timers);
        tokio::spawn(service.run());
        handle
    }

    /// Process commands until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        info!("Audio route service started");
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if !self.handle(command) {
                            break;
                        }
                    }
                    None => {
                        debug!("All route handles dropped");
                        break;
                    }
                },
                Some(tick) = self.timers.recv() => self.coordinator.on_timer(tick),
            }
        }
        self.coordinator.shutdown();
        info!("Audio route service stopped");
    }

    /// Apply one command; returns false once the service should stop
    fn handle(&mut self, command: RouteCommand) -> bool {
        match command {
            RouteCommand::CallStateChanged(event) => self.coordinator.on_call_state_changed(event),
            RouteCommand::Bluetooth(event) => self.coordinator.on_bluetooth_event(event),
            RouteCommand::BluetoothAvailability(availability) => self
                .coordinator
                .on_bluetooth_availability_changed(availability),
            RouteCommand::AudioRouteChanged { sco_connected } => {
                self.coordinator.on_audio_route_changed(sco_connected)
            }
            RouteCommand::ProximitySample(sample) => self.coordinator.on_proximity_sample(sample),
            RouteCommand::RequestRoute { route, reply } => {
                let _ = reply.send(self.coordinator.request_route(route));
            }
            RouteCommand::ConfirmedRoute { reply } => {
                let _ = reply.send(self.coordinator.current_confirmed_route());
            }
            RouteCommand::Snapshot { reply } => {
                let _ = reply.send(self.coordinator.snapshot());
            }
            RouteCommand::Shutdown { reply } => {
                self.coordinator.shutdown();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }
}

/// Cloneable, non-blocking entry point into the route service
#[derive(Debug, Clone)]
pub struct AudioRouteHandle {
    tx: mpsc::UnboundedSender<RouteCommand>,
    events: EventEmitter,
}

impl AudioRouteHandle {
    fn send(&self, command: RouteCommand) -> RouteResult<()> {
        self.tx
            .send(command)
            .map_err(|_| RouteError::ServiceStopped)
    }

    async fn ask<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> RouteCommand) -> RouteResult<T> {
        let (reply, rx) = oneshot::channel();
        self.send(make(reply))?;
        rx.await.map_err(|_| RouteError::ServiceStopped)
    }

    /// Whether the service task is still accepting commands
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    pub fn call_state_changed(&self, event: CallStateEvent) -> RouteResult<()> {
        self.send(RouteCommand::CallStateChanged(event))
    }

    pub fn bluetooth_event(&self, event: BluetoothEvent) -> RouteResult<()> {
        self.send(RouteCommand::Bluetooth(event))
    }

    pub fn bluetooth_availability_changed(
        &self,
        availability: BluetoothHeadsetAvailability,
    ) -> RouteResult<()> {
        self.send(RouteCommand::BluetoothAvailability(availability))
    }

    pub fn audio_route_changed(&self, sco_connected: bool) -> RouteResult<()> {
        self.send(RouteCommand::AudioRouteChanged { sco_connected })
    }

    pub fn proximity_sample(&self, sample: ProximitySample) -> RouteResult<()> {
        self.send(RouteCommand::ProximitySample(sample))
    }

    /// Explicit user route selection
    pub async fn request_route(&self, route: AudioRoute) -> RouteResult<()> {
        self.ask(|reply| RouteCommand::RequestRoute { route, reply })
            .await?
    }

    pub async fn confirmed_route(&self) -> RouteResult<AudioRoute> {
        self.ask(|reply| RouteCommand::ConfirmedRoute { reply }).await
    }

    pub async fn snapshot(&self) -> RouteResult<RouteSnapshot> {
        self.ask(|reply| RouteCommand::Snapshot { reply }).await
    }

    /// Release everything and stop the service; a no-op once stopped
    pub async fn shutdown(&self) -> RouteResult<()> {
        match self.ask(|reply| RouteCommand::Shutdown { reply }).await {
            Ok(()) | Err(RouteError::ServiceStopped) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Raw event stream, including lag notifications
    pub fn subscribe(&self) -> EventStream {
        self.events.subscribe()
    }

    /// Event iterator that skips lag notifications
    pub fn subscribe_simple(&self) -> EventIterator {
        self.events.subscribe_simple()
    }

    /// Events the UI should surface as transient notifications
    pub fn notifications(&self) -> impl Stream<Item = RouteEvent> {
        self.events.subscribe().filter_map(|event| async move {
            match event {
                Ok(event) if event.is_user_visible() => Some(event),
                _ => None,
            }
        })
    }
}
