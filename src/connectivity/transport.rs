// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Transport contract shared by the real and simulated device links

use std::time::Duration;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::telemetry::Sample;

/// Transport failure. Never surfaced to the dashboard as an error; the
/// connectivity manager turns it into a state transition plus reason.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("channel closed")]
    Closed,
}

/// Push-based sample stream backed by a channel.
///
/// Dropping the source stops the task feeding it.
pub struct SampleSource {
    rx: mpsc::Receiver<Sample>,
    pump: Option<JoinHandle<()>>,
}

impl SampleSource {
    /// Source fed by a spawned pump task
    pub fn new(rx: mpsc::Receiver<Sample>, pump: JoinHandle<()>) -> Self {
        Self { rx, pump: Some(pump) }
    }

    /// Source fed directly through the returned sender
    pub fn channel(capacity: usize) -> (mpsc::Sender<Sample>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx, pump: None })
    }

    /// Next sample, or `None` once the channel is gone
    pub async fn next(&mut self) -> Option<Sample> {
        self.rx.recv().await
    }
}

impl Drop for SampleSource {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

/// Device transport.
///
/// Health probing is authoritative for reachability; streaming and polling
/// only carry samples.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Bounded reachability probe; `Ok` means healthy
    async fn health_check(&self, host: &str, port: u16, timeout: Duration) -> Result<(), TransportError>;

    /// Open a persistent channel delivering samples as they arrive
    async fn open_stream(&self, host: &str, port: u16) -> Result<SampleSource, TransportError>;

    /// Fetch a single sample
    async fn poll_once(&self, host: &str, port: u16) -> Result<Sample, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_source_ends_when_sender_dropped() {
        let (tx, mut source) = SampleSource::channel(4);
        tx.send(Sample::new(1.0)).await.unwrap();
        drop(tx);

        assert_eq!(source.next().await.map(|s| s.value), Some(1.0));
        assert!(source.next().await.is_none());
    }
}
