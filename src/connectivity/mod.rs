//! Connectivity module - device configuration, health probing and transports

mod http;
mod manager;
mod simulated;
mod transport;

pub use http::HttpTransport;
pub use manager::{ConnectivityManager, LinkKind, LinkObserver};
pub use simulated::SimulatedTransport;
pub use transport::{SampleSource, Transport, TransportError};

use std::fmt;
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Reachability of the device as decided by the health probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Checking,
    Connected,
    Disconnected,
}

/// Preferred way of receiving samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Persistent WebSocket channel, falling back to polling
    Streaming,
    /// Plain HTTP request per sample
    Polling,
}

/// Where the device lives and how to talk to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub host: String,
    pub port: u16,
    pub transport_mode: TransportMode,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: "172.20.10.9".to_string(),
            port: 8080,
            transport_mode: TransportMode::Polling,
        }
    }
}

impl DeviceConfig {
    /// Build a config from user input.
    ///
    /// `port` is taken wide so out-of-range input can be reported instead of
    /// silently truncated.
    pub fn validated(host: &str, port: u32, transport_mode: TransportMode) -> Result<Self, ValidationError> {
        let host = host.trim();
        if host.is_empty() {
            return Err(ValidationError::EmptyHost);
        }
        if host.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidHost(host.to_string()));
        }
        let port = match u16::try_from(port) {
            Ok(p) if p >= 1 => p,
            _ => return Err(ValidationError::PortOutOfRange(port)),
        };

        Ok(Self {
            host: host.to_string(),
            port,
            transport_mode,
        })
    }

    /// Re-check a config restored from storage
    pub fn validate(&self) -> Result<(), ValidationError> {
        Self::validated(&self.host, self.port as u32, self.transport_mode).map(|_| ())
    }
}

impl fmt::Display for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({:?})", self.host, self.port, self.transport_mode)
    }
}

/// Whether a polling fallback keeps trying to get the stream back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UpgradePolicy {
    /// Stay on polling once fallen back
    Never,
    /// Retry opening the stream every `interval_ms` while in streaming mode
    Periodic { interval_ms: u64 },
}

/// Connectivity timing and fault policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    /// Upper bound on a health probe
    pub probe_timeout_ms: u64,

    /// Upper bound on opening the streaming channel
    pub stream_open_timeout_ms: u64,

    /// Polling cadence when streaming is unavailable
    pub poll_interval_ms: u64,

    /// Consecutive polling failures treated as a transport fault
    pub poll_failure_threshold: u32,

    pub upgrade_policy: UpgradePolicy,

    /// Re-check cadence used by the runner while disconnected
    pub recheck_interval_secs: u64,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 4000,
            stream_open_timeout_ms: 4000,
            poll_interval_ms: 1000,
            poll_failure_threshold: 3,
            upgrade_policy: UpgradePolicy::Never,
            recheck_interval_secs: 10,
        }
    }
}

impl ConnectivityConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn stream_open_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_open_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_range() {
        assert_eq!(
            DeviceConfig::validated("192.168.1.50", 0, TransportMode::Polling),
            Err(ValidationError::PortOutOfRange(0))
        );
        assert_eq!(
            DeviceConfig::validated("192.168.1.50", 70000, TransportMode::Polling),
            Err(ValidationError::PortOutOfRange(70000))
        );
        assert!(DeviceConfig::validated("192.168.1.50", 1, TransportMode::Polling).is_ok());
        assert!(DeviceConfig::validated("192.168.1.50", 65535, TransportMode::Streaming).is_ok());
    }

    #[test]
    fn test_host_is_trimmed_and_checked() {
        let config = DeviceConfig::validated("  esp32.local ", 8080, TransportMode::Streaming).unwrap();
        assert_eq!(config.host, "esp32.local");
        assert_eq!(
            DeviceConfig::validated("   ", 8080, TransportMode::Polling),
            Err(ValidationError::EmptyHost)
        );
        assert!(matches!(
            DeviceConfig::validated("esp 32", 8080, TransportMode::Polling),
            Err(ValidationError::InvalidHost(_))
        ));
    }

    #[test]
    fn test_defaults() {
        let config = DeviceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.to_string(), "172.20.10.9:8080 (Polling)");
        assert_eq!(ConnectivityConfig::default().poll_failure_threshold, 3);
    }
}
