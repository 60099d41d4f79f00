// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Monitoring session - wires connectivity, telemetry, calibration and
//! alerting for one device

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use anyhow::Result;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use crate::alert::{AlertEvent, AlertStateMachine, AlertUpdate, Escalator, LogEscalator, SystemState};
use crate::calibration::{CalibrationController, CalibrationRun};
use crate::config::{Config, MemorySettingsStore, SettingsStore};
use crate::connectivity::{
    ConnectionState, ConnectivityManager, DeviceConfig, HttpTransport, LinkKind, LinkObserver,
    Transport, TransportMode,
};
use crate::detection::{Detector, FallSignal, NullDetector, Severity};
use crate::error::{PreconditionError, ValidationError};
use crate::telemetry::{Sample, SampleBuffer, WaveformStats};
use super::{Event, EventBus};

/// Routes link output into the buffer, the detector, the alert machine and
/// calibration
struct SessionLink {
    buffer: Arc<SampleBuffer>,
    /// Cleared while the waveform is paused; the detector keeps running
    monitoring: AtomicBool,
    detector: Mutex<Box<dyn Detector>>,
    alerts: Arc<Mutex<AlertStateMachine>>,
    calibration: Arc<CalibrationController>,
    event_bus: Arc<EventBus>,
}

impl LinkObserver for SessionLink {
    fn on_connection_state(&self, state: ConnectionState, reason: Option<&str>) {
        if state == ConnectionState::Disconnected {
            self.buffer.clear();
        }
        self.alerts.lock().on_connection_state(state);
        self.calibration.on_connection_state(state);
        self.event_bus.publish_connection(state, reason);
    }

    fn on_sample(&self, sample: Sample) {
        if self.monitoring.load(Ordering::SeqCst) {
            self.buffer.push(sample);
            self.event_bus.publish_sample(sample);
        }

        let signal = self.detector.lock().observe(&sample);
        if let Some(signal) = signal {
            self.alerts.lock().on_fall(signal);
        }
    }

    fn on_degraded(&self, reason: &str) {
        self.event_bus.publish_degraded(reason);
    }

    fn on_link_closed(&self) {
        self.buffer.clear();
    }
}

/// Manual state overrides for bench testing.
///
/// Only handed out by sessions built with debug controls enabled.
#[derive(Clone)]
pub struct DebugControls {
    alerts: Arc<Mutex<AlertStateMachine>>,
}

impl DebugControls {
    pub fn force_safe(&self) -> SystemState {
        self.alerts.lock().force_safe()
    }

    pub fn force_fall(&self, severity: Severity) -> SystemState {
        self.alerts.lock().force_fall(severity)
    }
}

/// Assembles a [`Session`]; anything not supplied gets the production default
pub struct SessionBuilder {
    config: Config,
    transport: Option<Arc<dyn Transport>>,
    detector: Option<Box<dyn Detector>>,
    escalator: Option<Arc<dyn Escalator>>,
    store: Option<Arc<dyn SettingsStore>>,
}

impl SessionBuilder {
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn detector(mut self, detector: impl Detector + 'static) -> Self {
        self.detector = Some(Box::new(detector));
        self
    }

    pub fn escalator(mut self, escalator: Arc<dyn Escalator>) -> Self {
        self.escalator = Some(escalator);
        self
    }

    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<Session> {
        let config = self.config;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(
                config.connectivity.probe_timeout(),
                config.connectivity.stream_open_timeout(),
            )?),
        };
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemorySettingsStore::new(config.device.clone())));
        let escalator = self
            .escalator
            .unwrap_or_else(|| Arc::new(LogEscalator::new(config.alerts.emergency_number.clone())));
        let detector = self.detector.unwrap_or_else(|| Box::new(NullDetector));

        let event_bus = Arc::new(EventBus::default());
        let buffer = Arc::new(SampleBuffer::new(config.buffer.capacity));
        let alerts = Arc::new(Mutex::new(AlertStateMachine::new(event_bus.clone())));
        let calibration = Arc::new(CalibrationController::new(
            config.calibration.clone(),
            event_bus.clone(),
        ));

        let link = Arc::new(SessionLink {
            buffer: buffer.clone(),
            monitoring: AtomicBool::new(true),
            detector: Mutex::new(detector),
            alerts: alerts.clone(),
            calibration: calibration.clone(),
            event_bus: event_bus.clone(),
        });

        let device = store.load_device_config();
        info!("Session for {} over {} transport", device, transport.name());

        let connectivity =
            ConnectivityManager::new(device, config.connectivity.clone(), transport, link.clone());

        Ok(Session {
            debug_controls: config.alerts.debug_controls,
            config,
            event_bus,
            buffer,
            alerts,
            link,
            connectivity,
            calibration,
            escalator,
            store,
        })
    }
}

/// One monitored device and everything the dashboard reads from or asks of
/// it.
///
/// All state lives here rather than in globals, so several sessions can run
/// side by side.
pub struct Session {
    config: Config,
    event_bus: Arc<EventBus>,
    buffer: Arc<SampleBuffer>,
    alerts: Arc<Mutex<AlertStateMachine>>,
    link: Arc<SessionLink>,
    connectivity: ConnectivityManager,
    calibration: Arc<CalibrationController>,
    escalator: Arc<dyn Escalator>,
    store: Arc<dyn SettingsStore>,
    debug_controls: bool,
}

impl Session {
    pub fn builder(config: Config) -> SessionBuilder {
        SessionBuilder {
            config,
            transport: None,
            detector: None,
            escalator: None,
            store: None,
        }
    }

    /// Probe the device and bring the link up
    pub async fn start(&self) -> ConnectionState {
        info!("Starting {} session", self.config.app_name);
        self.connectivity.refresh().await
    }

    /// The dashboard's re-check action
    pub async fn recheck(&self) -> ConnectionState {
        self.connectivity.refresh().await
    }

    pub async fn check_health(&self) -> bool {
        self.connectivity.check_health().await
    }

    /// Best-effort switch to the streaming channel
    pub async fn connect(&self) -> bool {
        self.connectivity.connect().await
    }

    /// Apply new device settings.
    ///
    /// Rejected input changes nothing. Accepted input cancels calibration,
    /// reconnects and is persisted; a failed save is only logged.
    pub async fn update_config(
        &self,
        host: &str,
        port: u32,
        mode: TransportMode,
    ) -> Result<ConnectionState, ValidationError> {
        let device = DeviceConfig::validated(host, port, mode)?;

        self.calibration.cancel();
        let state = self.connectivity.update_config(&device.host, port, mode).await?;

        if let Err(e) = self.store.save_device_config(&device) {
            warn!("Could not persist device settings: {:#}", e);
        }
        Ok(state)
    }

    /// False alarm: clear the alert and go back to `Safe`
    pub fn acknowledge(&self) -> Option<AlertEvent> {
        self.alerts.lock().acknowledge()
    }

    /// Confirmed fall: hand the alert to the escalator
    pub fn escalate(&self) -> Option<AlertEvent> {
        let event = self.alerts.lock().escalate()?;
        self.escalator.escalate(&event);
        Some(event)
    }

    /// Verdict from a detector running outside the session
    pub fn report_fall(&self, signal: FallSignal) -> SystemState {
        self.alerts.lock().on_fall(signal)
    }

    pub fn start_calibration(&self) -> Result<(), PreconditionError> {
        self.calibration.start()
    }

    pub fn cancel_calibration(&self) {
        self.calibration.cancel();
    }

    pub fn calibration(&self) -> CalibrationRun {
        self.calibration.run()
    }

    /// Freeze the waveform. Samples still reach the detector.
    pub fn pause_monitoring(&self) {
        if self.link.monitoring.swap(false, Ordering::SeqCst) {
            info!("Waveform monitoring paused");
        }
    }

    pub fn resume_monitoring(&self) {
        if !self.link.monitoring.swap(true, Ordering::SeqCst) {
            info!("Waveform monitoring resumed");
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.link.monitoring.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> Vec<Sample> {
        self.buffer.snapshot()
    }

    pub fn stats(&self) -> WaveformStats {
        WaveformStats::from_samples(&self.buffer.snapshot())
    }

    pub fn system_state(&self) -> SystemState {
        self.alerts.lock().state()
    }

    pub fn active_alert(&self) -> Option<AlertEvent> {
        self.alerts.lock().active_alert().cloned()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connectivity.status()
    }

    pub fn connection_reason(&self) -> Option<String> {
        self.connectivity.status_reason()
    }

    pub fn active_link(&self) -> Option<LinkKind> {
        self.connectivity.active_link()
    }

    pub fn device_config(&self) -> DeviceConfig {
        self.connectivity.config()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn subscribe_system_state(&self) -> broadcast::Receiver<SystemState> {
        self.event_bus.subscribe_system_state()
    }

    pub fn subscribe_alerts(&self) -> broadcast::Receiver<AlertUpdate> {
        self.event_bus.subscribe_alerts()
    }

    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connectivity.subscribe_status()
    }

    pub fn subscribe_calibration(&self) -> watch::Receiver<CalibrationRun> {
        self.calibration.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.event_bus.subscribe_events()
    }

    /// Override handle, `None` unless debug controls were enabled
    pub fn debug(&self) -> Option<DebugControls> {
        self.debug_controls.then(|| DebugControls {
            alerts: self.alerts.clone(),
        })
    }

    /// Stop calibration and the device link
    pub fn shutdown(&self) {
        self.calibration.cancel();
        self.connectivity.shutdown();
        info!("{} session stopped", self.config.app_name);
    }
}
