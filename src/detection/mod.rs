// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Detection module - the contract with the external fall detector
//!
//! Classification itself happens elsewhere; the core only sees the detector's
//! verdicts as [`FallSignal`]s.

use serde::{Deserialize, Serialize};

use crate::telemetry::Sample;

/// Fall severity graded by the detector.
///
/// Only affects presentation; every severity drives the same alert state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    /// Caregiver-facing headline
    pub fn label(&self) -> &'static str {
        match self {
            Severity::High => "Severe fall alert",
            Severity::Medium => "Fall alert",
            Severity::Low => "Minor fall alert",
        }
    }

    /// Whether the alert should be rendered with maximum urgency
    pub fn is_urgent(&self) -> bool {
        matches!(self, Severity::High)
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::High
    }
}

/// A detector verdict: a fall happened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallSignal {
    pub severity: Severity,
    pub location: Option<String>,
}

impl FallSignal {
    pub fn new(severity: Severity) -> Self {
        Self {
            severity,
            location: None,
        }
    }

    pub fn at(severity: Severity, location: impl Into<String>) -> Self {
        Self {
            severity,
            location: Some(location.into()),
        }
    }
}

/// Fall detector fed by the device link, one sample at a time
pub trait Detector: Send {
    fn observe(&mut self, sample: &Sample) -> Option<FallSignal>;
}

/// Detector that never fires; used when verdicts arrive out-of-band
#[derive(Debug, Default)]
pub struct NullDetector;

impl Detector for NullDetector {
    fn observe(&mut self, _sample: &Sample) -> Option<FallSignal> {
        None
    }
}

impl<F> Detector for F
where
    F: FnMut(&Sample) -> Option<FallSignal> + Send,
{
    fn observe(&mut self, sample: &Sample) -> Option<FallSignal> {
        self(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_presentation() {
        assert!(Severity::High.is_urgent());
        assert!(!Severity::Low.is_urgent());
        assert_eq!(Severity::Medium.label(), "Fall alert");
        assert_eq!(Severity::default(), Severity::High);
    }

    #[test]
    fn test_closure_detector() {
        let mut detector = |s: &Sample| (s.value > 100.0).then(|| FallSignal::new(Severity::Medium));
        assert!(detector.observe(&Sample::new(5.0)).is_none());
        assert_eq!(
            detector.observe(&Sample::new(120.0)),
            Some(FallSignal::new(Severity::Medium))
        );
        assert!(NullDetector.observe(&Sample::new(120.0)).is_none());
    }
}
