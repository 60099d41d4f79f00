// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Calibration module - single-flight, cancellable sensor calibration

use std::sync::Arc;
use std::time::Duration;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::connectivity::ConnectionState;
use crate::core::EventBus;
use crate::error::PreconditionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CalibrationStatus {
    Idle,
    Running,
    Success,
    Failed,
}

/// Status and percentage of the current calibration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationRun {
    pub status: CalibrationStatus,
    pub progress: u8,
}

impl CalibrationRun {
    pub fn idle() -> Self {
        Self {
            status: CalibrationStatus::Idle,
            progress: 0,
        }
    }
}

/// Calibration schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Equal progress increments up to 100
    pub steps: u8,

    /// Delay before each increment
    pub step_interval_ms: u64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            steps: 10,
            step_interval_ms: 300,
        }
    }
}

struct Inner {
    /// Bumped on start, cancel and failure; a task only publishes for its own run
    generation: u64,
    task: Option<JoinHandle<()>>,
    connection: ConnectionState,
}

/// Runs at most one calibration per device.
///
/// A run needs a connected device to start and fails, keeping its last
/// progress, the moment the device is reported disconnected. Concurrent
/// starts are rejected rather than queued.
pub struct CalibrationController {
    settings: CalibrationConfig,
    run: Arc<watch::Sender<CalibrationRun>>,
    inner: Arc<Mutex<Inner>>,
    event_bus: Arc<EventBus>,
}

impl CalibrationController {
    pub fn new(settings: CalibrationConfig, event_bus: Arc<EventBus>) -> Self {
        let (run, _) = watch::channel(CalibrationRun::idle());

        Self {
            settings,
            run: Arc::new(run),
            inner: Arc::new(Mutex::new(Inner {
                generation: 0,
                task: None,
                connection: ConnectionState::Checking,
            })),
            event_bus,
        }
    }

    pub fn run(&self) -> CalibrationRun {
        *self.run.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<CalibrationRun> {
        self.run.subscribe()
    }

    /// Feed every connectivity transition, in order.
    ///
    /// `Disconnected` fails a running calibration immediately.
    pub fn on_connection_state(&self, state: ConnectionState) {
        let mut inner = self.inner.lock();
        inner.connection = state;

        if state != ConnectionState::Disconnected
            || self.run.borrow().status != CalibrationStatus::Running
        {
            return;
        }

        inner.generation += 1;
        if let Some(task) = inner.task.take() {
            task.abort();
        }
        self.run.send_modify(|run| run.status = CalibrationStatus::Failed);
        self.event_bus.publish_calibration(*self.run.borrow());
        warn!("Device disconnected during calibration");
    }

    /// Begin a run. Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<(), PreconditionError> {
        let mut inner = self.inner.lock();

        if self.run.borrow().status == CalibrationStatus::Running {
            return Err(PreconditionError::AlreadyRunning);
        }
        if inner.connection != ConnectionState::Connected {
            return Err(PreconditionError::NotConnected);
        }

        inner.generation += 1;
        if let Some(previous) = inner.task.take() {
            previous.abort();
        }

        let running = CalibrationRun {
            status: CalibrationStatus::Running,
            progress: 0,
        };
        self.run.send_modify(|run| *run = running);
        self.event_bus.publish_calibration(running);
        info!("Calibration started");

        let task = tokio::spawn(drive(
            self.settings.clone(),
            Progress {
                generation: inner.generation,
                run: self.run.clone(),
                inner: self.inner.clone(),
                event_bus: self.event_bus.clone(),
            },
        ));
        inner.task = Some(task);
        Ok(())
    }

    /// Stop any run and go back to `Idle`
    pub fn cancel(&self) {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        if let Some(task) = inner.task.take() {
            task.abort();
        }

        if self.run.borrow().status == CalibrationStatus::Running {
            info!("Calibration cancelled");
        }
        let idle = CalibrationRun::idle();
        self.run.send_modify(|run| *run = idle);
        self.event_bus.publish_calibration(idle);
    }
}

impl Drop for CalibrationController {
    fn drop(&mut self) {
        if let Some(task) = self.inner.lock().task.take() {
            task.abort();
        }
    }
}

/// Publishing side handed to the calibration task
struct Progress {
    generation: u64,
    run: Arc<watch::Sender<CalibrationRun>>,
    inner: Arc<Mutex<Inner>>,
    event_bus: Arc<EventBus>,
}

impl Progress {
    /// Returns false once the run has been superseded, cancelled or failed.
    fn publish(&self, update: impl FnOnce(&mut CalibrationRun)) -> bool {
        let inner = self.inner.lock();
        if inner.generation != self.generation {
            return false;
        }

        self.run.send_modify(update);
        self.event_bus.publish_calibration(*self.run.borrow());
        true
    }
}

async fn drive(settings: CalibrationConfig, progress: Progress) {
    let steps = settings.steps.max(1) as u32;
    let step_interval = Duration::from_millis(settings.step_interval_ms);

    for step in 1..=steps {
        tokio::time::sleep(step_interval).await;

        let percent = (step * 100 / steps) as u8;
        if !progress.publish(|run| run.progress = run.progress.max(percent)) {
            return;
        }
    }

    if progress.publish(|run| {
        run.status = CalibrationStatus::Success;
        run.progress = 100;
    }) {
        info!("Calibration complete");
    }
}
