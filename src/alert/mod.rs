// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Alert module - turns detector verdicts and connectivity into the
//! caregiver-visible system state

mod escalation;

pub use escalation::{Escalator, LogEscalator};

use std::sync::Arc;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::connectivity::ConnectionState;
use crate::core::EventBus;
use crate::detection::{FallSignal, Severity};

/// Externally visible state of the monitored person
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SystemState {
    Offline,
    Safe,
    Fall,
}

/// An unacknowledged fall
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: Uuid,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub location: Option<String>,
}

impl AlertEvent {
    fn from_signal(signal: FallSignal) -> Self {
        Self {
            id: Uuid::new_v4(),
            severity: signal.severity,
            timestamp: Utc::now(),
            location: signal.location,
        }
    }
}

/// Why the active alert changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertUpdate {
    Raised(AlertEvent),
    Acknowledged(AlertEvent),
    /// Dropped because connectivity was lost or the state was overridden
    Discarded(AlertEvent),
    Escalated(AlertEvent),
}

/// Offline / Safe / Fall state machine.
///
/// `Offline` whenever the device is not `Connected`, overriding detector
/// input. `Fall` only while an unacknowledged alert exists. Every input goes
/// through [`evaluate`](Self::evaluate), so a connectivity change and a fall
/// verdict landing together resolve deterministically.
pub struct AlertStateMachine {
    state: SystemState,
    connection: ConnectionState,
    active: Option<AlertEvent>,
    event_bus: Arc<EventBus>,
}

impl AlertStateMachine {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            state: SystemState::Offline,
            connection: ConnectionState::Checking,
            active: None,
            event_bus,
        }
    }

    pub fn state(&self) -> SystemState {
        self.state
    }

    pub fn active_alert(&self) -> Option<&AlertEvent> {
        self.active.as_ref()
    }

    /// Apply one evaluation cycle: the current connection state plus an
    /// optional detector verdict.
    ///
    /// Connectivity wins: without a connection the verdict is dropped and the
    /// machine goes `Offline`, discarding any alert. Entering `Connected`
    /// yields `Safe` unless a verdict arrives in the same cycle.
    pub fn evaluate(&mut self, connection: ConnectionState, signal: Option<FallSignal>) -> SystemState {
        let previous_connection = self.connection;
        self.connection = connection;

        if connection != ConnectionState::Connected {
            if let Some(signal) = signal {
                debug!("Dropping {:?} fall signal while {:?}", signal.severity, connection);
            }
            if let Some(event) = self.active.take() {
                info!("Discarding alert {} after connectivity loss", event.id);
                self.event_bus.publish_alert(AlertUpdate::Discarded(event));
            }
            self.set_state(SystemState::Offline);
            return self.state;
        }

        match signal {
            Some(signal) => {
                let event = AlertEvent::from_signal(signal);
                warn!(
                    "Fall detected ({:?}{})",
                    event.severity,
                    event.location.as_deref().map(|l| format!(" at {}", l)).unwrap_or_default()
                );
                if let Some(previous) = self.active.replace(event.clone()) {
                    debug!("Alert {} superseded", previous.id);
                }
                self.event_bus.publish_alert(AlertUpdate::Raised(event));
                self.set_state(SystemState::Fall);
            }
            None if previous_connection != ConnectionState::Connected => {
                self.set_state(SystemState::Safe);
            }
            None => {}
        }

        self.state
    }

    /// Connectivity changed, no detector input this cycle
    pub fn on_connection_state(&mut self, connection: ConnectionState) -> SystemState {
        self.evaluate(connection, None)
    }

    /// Detector reported a fall
    pub fn on_fall(&mut self, signal: FallSignal) -> SystemState {
        self.evaluate(self.connection, Some(signal))
    }

    /// Caregiver marks the alert as a false alarm. Only meaningful in `Fall`.
    pub fn acknowledge(&mut self) -> Option<AlertEvent> {
        if self.state != SystemState::Fall {
            return None;
        }

        let event = self.active.take()?;
        info!("Alert {} acknowledged", event.id);
        self.event_bus.publish_alert(AlertUpdate::Acknowledged(event.clone()));
        self.set_state(SystemState::Safe);
        Some(event)
    }

    /// Caregiver confirms the fall. Leaves the state alone; the returned
    /// alert is what the emergency call is about.
    pub fn escalate(&self) -> Option<AlertEvent> {
        let event = self.active.clone()?;
        info!("Alert {} escalated", event.id);
        self.event_bus.publish_alert(AlertUpdate::Escalated(event.clone()));
        Some(event)
    }

    /// Debug override. Never leaves `Offline` while disconnected.
    pub(crate) fn force_safe(&mut self) -> SystemState {
        if self.connection != ConnectionState::Connected {
            return self.state;
        }
        if let Some(event) = self.active.take() {
            self.event_bus.publish_alert(AlertUpdate::Discarded(event));
        }
        self.set_state(SystemState::Safe);
        self.state
    }

    /// Debug override, same path as a detector verdict.
    pub(crate) fn force_fall(&mut self, severity: Severity) -> SystemState {
        self.on_fall(FallSignal::new(severity))
    }

    fn set_state(&mut self, state: SystemState) {
        if self.state != state {
            info!("System state {:?} -> {:?}", self.state, state);
            self.state = state;
            self.event_bus.publish_system_state(state);
        }
    }
}
