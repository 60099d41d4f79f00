// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Connectivity manager - owns the device config, probes health and runs the
//! device link (streaming with polling fallback)

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::transport::{SampleSource, Transport, TransportError};
use super::{ConnectionState, ConnectivityConfig, DeviceConfig, TransportMode, UpgradePolicy};
use crate::error::ValidationError;
use crate::telemetry::Sample;

/// Receives everything the device link produces.
///
/// Called synchronously from the manager, in transition order, so the
/// receiver can apply connectivity and detector input atomically.
pub trait LinkObserver: Send + Sync {
    /// ConnectionState changed
    fn on_connection_state(&self, state: ConnectionState, reason: Option<&str>);

    /// A sample arrived on the active link
    fn on_sample(&self, sample: Sample);

    /// Streaming was unavailable or dropped and polling took over
    fn on_degraded(&self, _reason: &str) {}

    /// The link was torn down (config change or shutdown)
    fn on_link_closed(&self) {}
}

/// Which transport the active link is using
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkKind {
    Streaming,
    Polling,
}

enum LinkOutcome {
    Shutdown,
    Upgraded(SampleSource),
    Fault { reason: String, was_streaming: bool },
}

struct LinkHandle {
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl LinkHandle {
    fn is_live(&self) -> bool {
        !self.task.is_finished()
    }

    fn stop(self) {
        let _ = self.shutdown.send(());
        self.task.abort();
    }
}

/// State shared with the link task
struct Shared {
    settings: ConnectivityConfig,
    transport: Arc<dyn Transport>,
    observer: Arc<dyn LinkObserver>,
    config: RwLock<DeviceConfig>,
    status: watch::Sender<ConnectionState>,
    reason: RwLock<Option<String>>,
    /// Serializes transitions so the observer sees them in order
    transition_lock: Mutex<()>,
    /// Bumped on every config change and shutdown; stale work is ignored
    generation: AtomicU64,
    link_seq: AtomicU64,
    active_link: RwLock<Option<(u64, LinkKind)>>,
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Apply a transition unless the generation it was computed for is stale.
    fn transition(&self, generation: u64, state: ConnectionState, reason: Option<String>) -> bool {
        let _guard = self.transition_lock.lock();
        if !self.is_current(generation) {
            debug!("Ignoring stale transition to {:?}", state);
            return false;
        }

        *self.reason.write() = reason.clone();
        let changed = self.status.send_if_modified(|current| {
            if *current != state {
                *current = state;
                true
            } else {
                false
            }
        });

        if changed {
            match &reason {
                Some(r) => info!("Connection state -> {:?} ({})", state, r),
                None => info!("Connection state -> {:?}", state),
            }
            self.observer.on_connection_state(state, reason.as_deref());
        }
        true
    }

    async fn probe(&self) -> Result<(), TransportError> {
        let config = self.config.read().clone();
        let timeout = self.settings.probe_timeout();

        match tokio::time::timeout(timeout, self.transport.health_check(&config.host, config.port, timeout)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(timeout)),
        }
    }

    async fn open_stream(&self) -> Result<SampleSource, TransportError> {
        let config = self.config.read().clone();
        let timeout = self.settings.stream_open_timeout();

        match tokio::time::timeout(timeout, self.transport.open_stream(&config.host, config.port)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(timeout)),
        }
    }

    async fn poll(&self) -> Result<Sample, TransportError> {
        let config = self.config.read().clone();
        let timeout = self.settings.probe_timeout();

        match tokio::time::timeout(timeout, self.transport.poll_once(&config.host, config.port)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(timeout)),
        }
    }

    fn degraded(&self, generation: u64, reason: &str) {
        if self.is_current(generation) {
            warn!("Transport degraded, falling back to polling: {}", reason);
            self.observer.on_degraded(reason);
        }
    }

    fn deliver(&self, generation: u64, sample: Sample) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        self.observer.on_sample(sample);
        true
    }

    fn set_active(&self, link_id: u64, kind: LinkKind) {
        *self.active_link.write() = Some((link_id, kind));
    }

    fn clear_active(&self, link_id: u64) {
        let mut active = self.active_link.write();
        if matches!(*active, Some((id, _)) if id == link_id) {
            *active = None;
        }
    }
}

/// Owns the device configuration and the single device link.
///
/// The health probe alone decides reachability. The link task is the only
/// producer of samples; when streaming is unavailable it polls instead and the
/// connection stays `Connected`. Failed probes are never retried here; callers
/// schedule re-checks.
pub struct ConnectivityManager {
    shared: Arc<Shared>,
    link: Mutex<Option<LinkHandle>>,
}

impl ConnectivityManager {
    pub fn new(
        config: DeviceConfig,
        settings: ConnectivityConfig,
        transport: Arc<dyn Transport>,
        observer: Arc<dyn LinkObserver>,
    ) -> Self {
        let (status, _) = watch::channel(ConnectionState::Checking);

        Self {
            shared: Arc::new(Shared {
                settings,
                transport,
                observer,
                config: RwLock::new(config),
                status,
                reason: RwLock::new(None),
                transition_lock: Mutex::new(()),
                generation: AtomicU64::new(0),
                link_seq: AtomicU64::new(0),
                active_link: RwLock::new(None),
            }),
            link: Mutex::new(None),
        }
    }

    pub fn status(&self) -> ConnectionState {
        *self.shared.status.borrow()
    }

    /// Human-readable reason for the last transition, if any
    pub fn status_reason(&self) -> Option<String> {
        self.shared.reason.read().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionState> {
        self.shared.status.subscribe()
    }

    pub fn config(&self) -> DeviceConfig {
        self.shared.config.read().clone()
    }

    /// Transport the running link uses, `None` when no link is up
    pub fn active_link(&self) -> Option<LinkKind> {
        self.shared.active_link.read().map(|(_, kind)| kind)
    }

    /// Replace the device config and reconnect.
    ///
    /// Invalid input is rejected before anything changes. Otherwise the old
    /// link is torn down, the state goes through `Checking` and an immediate
    /// probe decides the outcome.
    pub async fn update_config(
        &self,
        host: &str,
        port: u32,
        mode: TransportMode,
    ) -> Result<ConnectionState, ValidationError> {
        let config = DeviceConfig::validated(host, port, mode)?;

        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        self.teardown_link();
        *self.shared.config.write() = config.clone();
        info!("Device config updated: {}", config);

        Ok(self.refresh().await)
    }

    /// Probe the device and apply the result.
    ///
    /// An already running link keeps its transport; an unhealthy result tears
    /// it down since the device is gone.
    pub async fn check_health(&self) -> bool {
        let generation = self.shared.generation.load(Ordering::SeqCst);
        self.shared.transition(generation, ConnectionState::Checking, None);

        match self.shared.probe().await {
            Ok(()) => {
                self.shared.transition(generation, ConnectionState::Connected, None);
                true
            }
            Err(e) => {
                warn!("Health probe failed: {}", e);
                if self.shared.is_current(generation) {
                    self.teardown_link();
                }
                self.shared
                    .transition(generation, ConnectionState::Disconnected, Some(e.to_string()));
                false
            }
        }
    }

    /// Probe, then bring the link up if none is running
    pub async fn refresh(&self) -> ConnectionState {
        if self.check_health().await {
            self.ensure_link().await;
        }
        self.status()
    }

    /// Best-effort upgrade to the streaming channel, whatever the configured
    /// mode. No-op when a stream is already open; failures are swallowed.
    pub async fn connect(&self) -> bool {
        if self.active_link() == Some(LinkKind::Streaming) {
            return true;
        }
        if self.status() != ConnectionState::Connected {
            debug!("Skipping stream upgrade while {:?}", self.status());
            return false;
        }

        let generation = self.shared.generation.load(Ordering::SeqCst);
        match self.shared.open_stream().await {
            Ok(source) => self.install_link(generation, Some(source), true),
            Err(e) => {
                debug!("Stream upgrade failed, keeping current link: {}", e);
                false
            }
        }
    }

    /// Stop the link and invalidate in-flight work
    pub fn shutdown(&self) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        self.teardown_link();
    }

    async fn ensure_link(&self) {
        if self.link.lock().as_ref().is_some_and(LinkHandle::is_live) {
            return;
        }

        let generation = self.shared.generation.load(Ordering::SeqCst);
        let config = self.config();
        let source = match config.transport_mode {
            TransportMode::Streaming => match self.shared.open_stream().await {
                Ok(source) => Some(source),
                Err(e) => {
                    self.shared
                        .degraded(generation, &format!("stream open failed: {}", e));
                    None
                }
            },
            TransportMode::Polling => None,
        };

        self.install_link(generation, source, false);
    }

    /// Spawn a link task. With `replace`, a live non-streaming link is
    /// swapped out; otherwise a live link wins and the new one is dropped.
    fn install_link(&self, generation: u64, source: Option<SampleSource>, replace: bool) -> bool {
        let mut link = self.link.lock();
        if !self.shared.is_current(generation) {
            return false;
        }

        if link.as_ref().is_some_and(LinkHandle::is_live) {
            if !replace || self.active_link() == Some(LinkKind::Streaming) {
                return true;
            }
            if let Some(old) = link.take() {
                old.stop();
            }
        }

        let link_id = self.shared.link_seq.fetch_add(1, Ordering::SeqCst);
        let initial = if source.is_some() { LinkKind::Streaming } else { LinkKind::Polling };
        self.shared.set_active(link_id, initial);

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(run_link(
            self.shared.clone(),
            generation,
            link_id,
            source,
            shutdown_rx,
        ));

        info!("Device link up ({:?})", initial);
        *link = Some(LinkHandle {
            shutdown: shutdown_tx,
            task,
        });
        true
    }

    fn teardown_link(&self) {
        let handle = self.link.lock().take();
        if let Some(handle) = handle {
            handle.stop();
            *self.shared.active_link.write() = None;
            self.shared.observer.on_link_closed();
            info!("Device link torn down");
        }
    }
}

impl Drop for ConnectivityManager {
    fn drop(&mut self) {
        if let Some(handle) = self.link.get_mut().take() {
            handle.stop();
        }
    }
}

async fn run_link(
    shared: Arc<Shared>,
    generation: u64,
    link_id: u64,
    mut source: Option<SampleSource>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        let outcome = match source.take() {
            Some(stream) => {
                shared.set_active(link_id, LinkKind::Streaming);
                stream_loop(&shared, generation, stream, &mut shutdown).await
            }
            None => {
                shared.set_active(link_id, LinkKind::Polling);
                poll_loop(&shared, generation, &mut shutdown).await
            }
        };

        match outcome {
            LinkOutcome::Shutdown => break,
            LinkOutcome::Upgraded(stream) => {
                info!("Streaming channel restored");
                source = Some(stream);
            }
            LinkOutcome::Fault { reason, was_streaming } => {
                warn!("Transport fault: {}", reason);
                if !shared.transition(generation, ConnectionState::Checking, Some(reason.clone())) {
                    break;
                }

                let probe = tokio::select! {
                    result = shared.probe() => result,
                    _ = shutdown.recv() => break,
                };

                match probe {
                    Ok(()) => {
                        shared.transition(generation, ConnectionState::Connected, None);
                        if was_streaming {
                            shared.degraded(generation, &reason);
                        }
                    }
                    Err(e) => {
                        shared.transition(generation, ConnectionState::Disconnected, Some(e.to_string()));
                        break;
                    }
                }
            }
        }
    }

    shared.clear_active(link_id);
    debug!("Link task {} finished", link_id);
}

async fn stream_loop(
    shared: &Shared,
    generation: u64,
    mut stream: SampleSource,
    shutdown: &mut broadcast::Receiver<()>,
) -> LinkOutcome {
    loop {
        tokio::select! {
            sample = stream.next() => match sample {
                Some(sample) => {
                    if !shared.deliver(generation, sample) {
                        return LinkOutcome::Shutdown;
                    }
                }
                None => {
                    return LinkOutcome::Fault {
                        reason: "streaming channel closed".to_string(),
                        was_streaming: true,
                    };
                }
            },
            _ = shutdown.recv() => return LinkOutcome::Shutdown,
        }
    }
}

async fn poll_loop(
    shared: &Shared,
    generation: u64,
    shutdown: &mut broadcast::Receiver<()>,
) -> LinkOutcome {
    let settings = &shared.settings;
    let mut ticker = interval(settings.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let streaming_mode = shared.config.read().transport_mode == TransportMode::Streaming;
    let mut upgrade = match settings.upgrade_policy {
        UpgradePolicy::Periodic { interval_ms } if streaming_mode => {
            let every = std::time::Duration::from_millis(interval_ms.max(1));
            Some(interval_at(Instant::now() + every, every))
        }
        _ => None,
    };

    let mut failures = 0u32;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match shared.poll().await {
                    Ok(sample) => {
                        failures = 0;
                        if !shared.deliver(generation, sample) {
                            return LinkOutcome::Shutdown;
                        }
                    }
                    Err(e) => {
                        failures += 1;
                        debug!("Poll failed ({}/{}): {}", failures, settings.poll_failure_threshold, e);
                        if failures >= settings.poll_failure_threshold.max(1) {
                            return LinkOutcome::Fault {
                                reason: format!("{} consecutive polling failures: {}", failures, e),
                                was_streaming: false,
                            };
                        }
                    }
                }
            }
            _ = next_tick(&mut upgrade) => {
                match shared.open_stream().await {
                    Ok(stream) => return LinkOutcome::Upgraded(stream),
                    Err(e) => debug!("Stream re-upgrade failed: {}", e),
                }
            }
            _ = shutdown.recv() => return LinkOutcome::Shutdown,
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct ScriptedTransport {
        unhealthy: AtomicBool,
        stream_available: AtomicBool,
        poll_broken: AtomicBool,
        polls: AtomicU64,
        stream_tx: Mutex<Option<mpsc::Sender<Sample>>>,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn health_check(&self, _host: &str, _port: u16, _timeout: Duration) -> Result<(), TransportError> {
            if self.unhealthy.load(Ordering::SeqCst) {
                Err(TransportError::Connection("refused".to_string()))
            } else {
                Ok(())
            }
        }

        async fn open_stream(&self, _host: &str, _port: u16) -> Result<SampleSource, TransportError> {
            if !self.stream_available.load(Ordering::SeqCst) {
                return Err(TransportError::Connection("no websocket".to_string()));
            }
            let (tx, source) = SampleSource::channel(16);
            *self.stream_tx.lock() = Some(tx);
            Ok(source)
        }

        async fn poll_once(&self, _host: &str, _port: u16) -> Result<Sample, TransportError> {
            if self.poll_broken.load(Ordering::SeqCst) {
                return Err(TransportError::Timeout(Duration::from_secs(1)));
            }
            let n = self.polls.fetch_add(1, Ordering::SeqCst);
            Ok(Sample::new(n as f64))
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        states: Mutex<Vec<ConnectionState>>,
        samples: Mutex<Vec<f64>>,
        degraded: AtomicU64,
        closed: AtomicU64,
    }

    impl LinkObserver for RecordingObserver {
        fn on_connection_state(&self, state: ConnectionState, _reason: Option<&str>) {
            self.states.lock().push(state);
        }

        fn on_sample(&self, sample: Sample) {
            self.samples.lock().push(sample.value);
        }

        fn on_degraded(&self, _reason: &str) {
            self.degraded.fetch_add(1, Ordering::SeqCst);
        }

        fn on_link_closed(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn manager_with(
        transport: Arc<ScriptedTransport>,
        observer: Arc<RecordingObserver>,
        settings: ConnectivityConfig,
    ) -> ConnectivityManager {
        ConnectivityManager::new(DeviceConfig::default(), settings, transport, observer)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_port_leaves_config_untouched() {
        let transport = Arc::new(ScriptedTransport::default());
        let observer = Arc::new(RecordingObserver::default());
        let manager = manager_with(transport, observer.clone(), ConnectivityConfig::default());

        for port in [0, 70000] {
            let result = manager.update_config("192.168.1.50", port, TransportMode::Streaming).await;
            assert_eq!(result, Err(ValidationError::PortOutOfRange(port)));
        }
        assert_eq!(manager.config(), DeviceConfig::default());
        assert_eq!(manager.status(), ConnectionState::Checking);
        assert!(observer.states.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_open_failure_falls_back_to_polling() {
        let transport = Arc::new(ScriptedTransport::default());
        let observer = Arc::new(RecordingObserver::default());
        let manager = manager_with(transport.clone(), observer.clone(), ConnectivityConfig::default());

        let state = manager
            .update_config("192.168.1.50", 8080, TransportMode::Streaming)
            .await
            .unwrap();

        assert_eq!(state, ConnectionState::Connected);
        assert_eq!(manager.active_link(), Some(LinkKind::Polling));
        assert_eq!(observer.degraded.load(Ordering::SeqCst), 1);
        assert_eq!(manager.config().host, "192.168.1.50");

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert!(observer.samples.lock().len() >= 3);
        assert_eq!(manager.status(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_drop_confirms_with_probe_then_polls() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.stream_available.store(true, Ordering::SeqCst);
        let observer = Arc::new(RecordingObserver::default());
        let manager = manager_with(transport.clone(), observer.clone(), ConnectivityConfig::default());

        manager.update_config("10.0.0.2", 81, TransportMode::Streaming).await.unwrap();
        assert_eq!(manager.active_link(), Some(LinkKind::Streaming));

        let tx = transport.stream_tx.lock().take().unwrap();
        tx.send(Sample::new(42.0)).await.unwrap();
        settle().await;
        assert_eq!(observer.samples.lock().first().copied(), Some(42.0));

        drop(tx);
        settle().await;

        assert_eq!(manager.status(), ConnectionState::Connected);
        assert_eq!(manager.active_link(), Some(LinkKind::Polling));
        assert_eq!(observer.degraded.load(Ordering::SeqCst), 1);
        assert_eq!(
            *observer.states.lock(),
            vec![ConnectionState::Connected, ConnectionState::Checking, ConnectionState::Connected]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_probe_disconnects_and_tears_down() {
        let transport = Arc::new(ScriptedTransport::default());
        let observer = Arc::new(RecordingObserver::default());
        let manager = manager_with(transport.clone(), observer.clone(), ConnectivityConfig::default());

        assert_eq!(manager.refresh().await, ConnectionState::Connected);
        assert_eq!(manager.active_link(), Some(LinkKind::Polling));

        transport.unhealthy.store(true, Ordering::SeqCst);
        assert!(!manager.check_health().await);
        assert_eq!(manager.status(), ConnectionState::Disconnected);
        assert!(manager.status_reason().is_some());
        assert_eq!(manager.active_link(), None);
        assert_eq!(observer.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_poll_failures_trigger_recheck() {
        let transport = Arc::new(ScriptedTransport::default());
        let observer = Arc::new(RecordingObserver::default());
        let manager = manager_with(transport.clone(), observer.clone(), ConnectivityConfig::default());

        manager.refresh().await;
        settle().await;
        assert_eq!(observer.samples.lock().len(), 1);
        transport.poll_broken.store(true, Ordering::SeqCst);
        transport.unhealthy.store(true, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(manager.status(), ConnectionState::Connected);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(manager.status(), ConnectionState::Disconnected);
        assert_eq!(manager.active_link(), None);
        assert_eq!(
            *observer.states.lock(),
            vec![ConnectionState::Connected, ConnectionState::Checking, ConnectionState::Disconnected]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_upgrades_polling_link_once() {
        let transport = Arc::new(ScriptedTransport::default());
        let observer = Arc::new(RecordingObserver::default());
        let manager = manager_with(transport.clone(), observer.clone(), ConnectivityConfig::default());

        assert!(!manager.connect().await);

        manager.refresh().await;
        assert_eq!(manager.active_link(), Some(LinkKind::Polling));
        assert!(!manager.connect().await);
        assert_eq!(manager.active_link(), Some(LinkKind::Polling));

        transport.stream_available.store(true, Ordering::SeqCst);
        assert!(manager.connect().await);
        assert_eq!(manager.active_link(), Some(LinkKind::Streaming));

        transport.stream_available.store(false, Ordering::SeqCst);
        assert!(manager.connect().await);
        assert_eq!(manager.active_link(), Some(LinkKind::Streaming));
        assert_eq!(manager.status(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_upgrade_policy_restores_stream() {
        let transport = Arc::new(ScriptedTransport::default());
        let observer = Arc::new(RecordingObserver::default());
        let settings = ConnectivityConfig {
            upgrade_policy: UpgradePolicy::Periodic { interval_ms: 5000 },
            ..ConnectivityConfig::default()
        };
        let manager = manager_with(transport.clone(), observer, settings);

        manager.update_config("192.168.1.50", 8080, TransportMode::Streaming).await.unwrap();
        assert_eq!(manager.active_link(), Some(LinkKind::Polling));

        transport.stream_available.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5500)).await;
        assert_eq!(manager.active_link(), Some(LinkKind::Streaming));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_link() {
        let transport = Arc::new(ScriptedTransport::default());
        let observer = Arc::new(RecordingObserver::default());
        let manager = manager_with(transport.clone(), observer.clone(), ConnectivityConfig::default());

        manager.refresh().await;
        manager.shutdown();
        let polled = transport.polls.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(transport.polls.load(Ordering::SeqCst), polled);
        assert_eq!(manager.active_link(), None);
    }
}
