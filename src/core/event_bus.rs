// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Event bus for core-to-dashboard communication

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

use crate::alert::{AlertUpdate, SystemState};
use crate::calibration::CalibrationRun;
use crate::connectivity::ConnectionState;
use crate::telemetry::Sample;

/// Event types in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Sample,
    SystemState,
    Alert,
    Connection,
    Transport,
    Calibration,
}

/// Generic event wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: u64,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Sample(Sample),
    SystemState(SystemState),
    Alert(AlertUpdate),
    Connection { state: ConnectionState, reason: Option<String> },
    TransportDegraded { reason: String },
    Calibration(CalibrationRun),
}

/// Central event bus for pub/sub communication.
///
/// Publishing never blocks and never fails; with no subscribers events are
/// simply dropped.
pub struct EventBus {
    system_state_tx: broadcast::Sender<SystemState>,
    alert_tx: broadcast::Sender<AlertUpdate>,
    event_tx: broadcast::Sender<Event>,
    event_counter: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (system_state_tx, _) = broadcast::channel(capacity);
        let (alert_tx, _) = broadcast::channel(capacity);
        let (event_tx, _) = broadcast::channel(capacity);

        Self {
            system_state_tx,
            alert_tx,
            event_tx,
            event_counter: AtomicU64::new(0),
        }
    }

    pub fn publish_sample(&self, sample: Sample) {
        self.publish_event(EventType::Sample, EventPayload::Sample(sample));
    }

    pub fn publish_system_state(&self, state: SystemState) {
        let _ = self.system_state_tx.send(state);
        self.publish_event(EventType::SystemState, EventPayload::SystemState(state));
    }

    pub fn publish_alert(&self, update: AlertUpdate) {
        let _ = self.alert_tx.send(update.clone());
        self.publish_event(EventType::Alert, EventPayload::Alert(update));
    }

    pub fn publish_connection(&self, state: ConnectionState, reason: Option<&str>) {
        self.publish_event(
            EventType::Connection,
            EventPayload::Connection {
                state,
                reason: reason.map(str::to_string),
            },
        );
    }

    pub fn publish_degraded(&self, reason: &str) {
        self.publish_event(
            EventType::Transport,
            EventPayload::TransportDegraded {
                reason: reason.to_string(),
            },
        );
    }

    pub fn publish_calibration(&self, run: CalibrationRun) {
        self.publish_event(EventType::Calibration, EventPayload::Calibration(run));
    }

    fn publish_event(&self, event_type: EventType, payload: EventPayload) {
        let id = self.event_counter.fetch_add(1, Ordering::Relaxed);
        let event = Event {
            id,
            event_type,
            timestamp: Utc::now(),
            payload,
        };
        let _ = self.event_tx.send(event);
    }

    pub fn subscribe_system_state(&self) -> broadcast::Receiver<SystemState> {
        self.system_state_tx.subscribe()
    }

    pub fn subscribe_alerts(&self) -> broadcast::Receiver<AlertUpdate> {
        self.alert_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
