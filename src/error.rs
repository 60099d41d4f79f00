// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Errors returned synchronously to callers of the core
//!
//! Connectivity failures are deliberately absent here: they never cross into
//! the dashboard as errors, only as [`ConnectionState`](crate::connectivity::ConnectionState)
//! transitions.

use thiserror::Error;

/// Rejected device configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("host must not be empty")]
    EmptyHost,
    #[error("host {0:?} contains whitespace")]
    InvalidHost(String),
    #[error("port {0} is outside 1-65535")]
    PortOutOfRange(u32),
}

/// Operation requested in a state that does not allow it
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("device is not connected")]
    NotConnected,
    #[error("calibration already running")]
    AlreadyRunning,
}
