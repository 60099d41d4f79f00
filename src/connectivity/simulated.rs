// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Simulated sensor board for demo/testing

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::prelude::*;
use rand_distr::Uniform;
use tokio::sync::mpsc;
use tokio::time::{interval, Instant};

use super::transport::{SampleSource, Transport, TransportError};
use crate::telemetry::Sample;

/// Produces a CSI-like waveform: a slow sinusoid with uniform noise on top
struct WaveGenerator {
    started: Instant,
    rng: StdRng,
    noise: Uniform<f64>,
    amplitude: f64,
    period_ms: f64,
}

impl WaveGenerator {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            rng: StdRng::from_entropy(),
            noise: Uniform::new(-15.0, 15.0),
            amplitude: 50.0,
            period_ms: 200.0,
        }
    }

    fn next_sample(&mut self) -> Sample {
        let t = self.started.elapsed().as_millis() as f64;
        let value = (t / self.period_ms).sin() * self.amplitude + self.noise.sample(&mut self.rng);
        Sample::new(value)
    }
}

/// In-process stand-in for the board.
///
/// Reachability can be toggled at runtime, and the streaming endpoint can be
/// disabled to exercise the polling fallback.
pub struct SimulatedTransport {
    reachable: Arc<AtomicBool>,
    streaming_available: bool,
    sample_interval: Duration,
    generator: Mutex<WaveGenerator>,
}

impl SimulatedTransport {
    pub fn new(streaming_available: bool) -> Self {
        Self {
            reachable: Arc::new(AtomicBool::new(true)),
            streaming_available,
            sample_interval: Duration::from_millis(50),
            generator: Mutex::new(WaveGenerator::new()),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    fn ensure_reachable(&self, host: &str, port: u16) -> Result<(), TransportError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::Connection(format!("{}:{} unreachable", host, port)))
        }
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn health_check(&self, host: &str, port: u16, _timeout: Duration) -> Result<(), TransportError> {
        self.ensure_reachable(host, port)
    }

    async fn open_stream(&self, host: &str, port: u16) -> Result<SampleSource, TransportError> {
        self.ensure_reachable(host, port)?;
        if !self.streaming_available {
            return Err(TransportError::Connection("simulated board has no stream endpoint".to_string()));
        }

        let (tx, rx) = mpsc::channel(64);
        let reachable = self.reachable.clone();
        let period = self.sample_interval;
        let pump = tokio::spawn(async move {
            let mut generator = WaveGenerator::new();
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                if !reachable.load(Ordering::SeqCst) {
                    break;
                }
                if tx.send(generator.next_sample()).await.is_err() {
                    break;
                }
            }
        });

        Ok(SampleSource::new(rx, pump))
    }

    async fn poll_once(&self, host: &str, port: u16) -> Result<Sample, TransportError> {
        self.ensure_reachable(host, port)?;
        Ok(self.generator.lock().next_sample())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_waveform_is_bounded() {
        let mut generator = WaveGenerator::new();
        for _ in 0..500 {
            let value = generator.next_sample().value;
            assert!(value.abs() <= 65.0);
        }
    }

    #[tokio::test]
    async fn test_streaming_unavailable() {
        let transport = SimulatedTransport::new(false);
        assert!(transport.health_check("sim", 1, Duration::from_secs(1)).await.is_ok());
        assert!(transport.open_stream("sim", 1).await.is_err());
        assert!(transport.poll_once("sim", 1).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_delivers_and_stops_when_unreachable() {
        let transport = SimulatedTransport::new(true);
        let mut source = transport.open_stream("sim", 1).await.unwrap();
        assert!(source.next().await.is_some());

        transport.set_reachable(false);
        while source.next().await.is_some() {}
        assert!(transport.health_check("sim", 1, Duration::from_secs(1)).await.is_err());
    }
}
