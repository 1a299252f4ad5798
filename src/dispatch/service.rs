//! Start/stop control over dispatch runs.
//!
//! At most one run is active at a time. Starting resets the simulator and
//! hands the worker a fresh [`DispatchContext`]; stopping raises the stop flag
//! and waits for the worker to finish its current tick.

use crate::dispatch::{DispatchContext, DispatchSettings, spawn_dispatch_thread};
use crate::error::AppError;
use crate::policy::{PolicySettings, create_policy};
use crate::simulator::{Simulator, SimulatorFactory};
use crate::state::{AppState, RunOutcome};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlReply {
    pub success: bool,
    pub message: String,
    pub controller_running: bool,
}

/// What the HTTP layer needs from a dispatch service. Both calls may block
/// and belong on a blocking thread. Whether a run is active is read from the
/// published [`ControllerStatus`](crate::state::ControllerStatus).
pub trait ControlSurface: Send + Sync {
    fn start(&self) -> ControlReply;
    fn stop(&self) -> ControlReply;
}

struct Worker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<RunOutcome>,
}

pub struct DispatchService<F: SimulatorFactory> {
    factory: F,
    policy: PolicySettings,
    settings: DispatchSettings,
    state: Arc<RwLock<AppState>>,
    worker: Mutex<Option<Worker>>,
}

impl<F: SimulatorFactory> DispatchService<F> {
    pub fn new(
        factory: F,
        policy: PolicySettings,
        settings: DispatchSettings,
        state: Arc<RwLock<AppState>>,
    ) -> Self {
        Self {
            factory,
            policy,
            settings,
            state,
            worker: Mutex::new(None),
        }
    }

    pub fn start_run(&self) -> Result<(), AppError> {
        let mut worker = self.worker.lock().map_err(|_| AppError::StateLock)?;
        if let Some(active) = worker.as_ref()
            && !active.handle.is_finished()
        {
            return Err(AppError::AlreadyRunning);
        }
        if let Some(finished) = worker.take() {
            reap(finished)?;
        }

        let policy = create_policy(&self.policy)?;
        let mut simulator = self.factory.connect()?;
        if let Err(err) = simulator.reset() {
            warn!(error = %err, "Simulator reset failed, continuing with current state");
        }

        {
            let mut guard = self.state.write().map_err(|_| AppError::StateLock)?;
            guard.begin_run(policy.name());
        }

        info!(
            policy = policy.name(),
            tick_delay_ms = self.settings.tick_delay.as_millis(),
            "Starting dispatch run"
        );
        let stop = Arc::new(AtomicBool::new(false));
        let handle = spawn_dispatch_thread(
            simulator,
            DispatchContext::new(policy),
            self.settings.clone(),
            Arc::clone(&self.state),
            Arc::clone(&stop),
        );
        *worker = Some(Worker { stop, handle });
        Ok(())
    }

    /// Stop the active run and wait for it. `Ok(None)` when nothing was running.
    pub fn stop_run(&self) -> Result<Option<RunOutcome>, AppError> {
        let mut worker = self.worker.lock().map_err(|_| AppError::StateLock)?;
        let Some(active) = worker.take() else {
            return Ok(None);
        };
        if active.handle.is_finished() {
            reap(active)?;
            return Ok(None);
        }
        active.stop.store(true, Ordering::Relaxed);
        let outcome = reap(active)?;
        info!(outcome = ?outcome, "Dispatch run stopped");
        Ok(Some(outcome))
    }

    pub fn running(&self) -> bool {
        match self.worker.lock() {
            Ok(worker) => worker
                .as_ref()
                .is_some_and(|active| !active.handle.is_finished()),
            Err(_) => false,
        }
    }
}

fn reap(worker: Worker) -> Result<RunOutcome, AppError> {
    worker.handle.join().map_err(|_| AppError::WorkerPanicked)
}

impl<F: SimulatorFactory> ControlSurface for DispatchService<F> {
    fn start(&self) -> ControlReply {
        match self.start_run() {
            Ok(()) => ControlReply {
                success: true,
                message: "Controller started".to_string(),
                controller_running: true,
            },
            Err(err) => {
                warn!(error = %err, "Failed to start dispatch run");
                ControlReply {
                    success: false,
                    message: err.to_string(),
                    controller_running: self.running(),
                }
            }
        }
    }

    fn stop(&self) -> ControlReply {
        match self.stop_run() {
            Ok(Some(_)) => ControlReply {
                success: true,
                message: "Controller stopped".to_string(),
                controller_running: false,
            },
            Ok(None) => ControlReply {
                success: false,
                message: "Controller is not running".to_string(),
                controller_running: false,
            },
            Err(err) => {
                warn!(error = %err, "Failed to stop dispatch run");
                ControlReply {
                    success: false,
                    message: err.to_string(),
                    controller_running: self.running(),
                }
            }
        }
    }
}
