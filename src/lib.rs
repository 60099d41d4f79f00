// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! WiCare - WiFi CSI fall-detection monitoring core
//!
//! Everything behind the caregiver dashboard:
//! - Sliding window over the live CSI waveform
//! - Device health probing with streaming and polling transports
//! - Staged, cancellable sensor calibration
//! - Offline / Safe / Fall alert state with acknowledge and escalation
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                           Session                             │
//! ├───────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐   ┌──────────┐   ┌──────────┐   ┌─────────┐ │
//! │  │ Connectivity │ → │  Sample  │   │ Detector │ → │  Alert  │ │
//! │  │   Manager    │ → │  Buffer  │   │ (extern) │   │ Machine │ │
//! │  └──────────────┘   └──────────┘   └──────────┘   └─────────┘ │
//! │         ↓                                              ↓      │
//! │  ┌──────────────┐                                             │
//! │  │ Calibration  │                                             │
//! │  └──────────────┘                                             │
//! │         ↓                                              ↓      │
//! │  ┌─────────────────────────────────────────────────────────┐  │
//! │  │                       Event Bus                         │  │
//! │  └─────────────────────────────────────────────────────────┘  │
//! └───────────────────────────────────────────────────────────────┘
//! ```

pub mod core;
pub mod telemetry;
pub mod connectivity;
pub mod calibration;
pub mod alert;
pub mod detection;
pub mod config;
pub mod error;

// Re-exports for convenience
pub use config::{Config, SettingsStore};
pub use core::{EventBus, Session};
pub use telemetry::{Sample, SampleBuffer};
pub use connectivity::{ConnectionState, ConnectivityManager, DeviceConfig, TransportMode};
pub use calibration::{CalibrationController, CalibrationRun, CalibrationStatus};
pub use alert::{AlertEvent, AlertStateMachine, SystemState};
pub use detection::{Detector, FallSignal, Severity};
pub use error::{PreconditionError, ValidationError};

/// WiCare version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WiCare name
pub const NAME: &str = "WiCare";
