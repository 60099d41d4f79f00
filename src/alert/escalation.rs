// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Emergency escalation hook

use tracing::warn;

use super::AlertEvent;

/// Places the emergency call for a confirmed fall
pub trait Escalator: Send + Sync {
    fn escalate(&self, event: &AlertEvent);
}

/// Records the escalation in the log; the host places the actual call
pub struct LogEscalator {
    emergency_number: String,
}

impl LogEscalator {
    pub fn new(emergency_number: impl Into<String>) -> Self {
        Self {
            emergency_number: emergency_number.into(),
        }
    }
}

impl Escalator for LogEscalator {
    fn escalate(&self, event: &AlertEvent) {
        warn!(
            "Escalating alert {} ({}) - call {}",
            event.id,
            event.severity.label(),
            self.emergency_number
        );
    }
}
