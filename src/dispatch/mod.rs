use crate::error::AppError;
use crate::simulator::Simulator;
use crate::state::{AppState, RunOutcome};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant, SystemTime};
use tracing::{error, info, trace, warn};

pub mod context;
pub mod service;

pub use context::{DispatchContext, TickReport};

pub const MAX_TICK_DELAY: Duration = Duration::from_secs(10);
const STOP_POLL_STEP: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSettings {
    pub tick_delay: Duration,
    pub max_tick_retries: u32,
    pub retry_backoff: Duration,
}

impl DispatchSettings {
    pub fn new(tick_delay: Duration, max_tick_retries: u32, retry_backoff: Duration) -> Self {
        Self {
            tick_delay: tick_delay.min(MAX_TICK_DELAY),
            max_tick_retries,
            retry_backoff: retry_backoff.min(MAX_TICK_DELAY),
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), 3, Duration::from_millis(200))
    }
}

/// Drive `simulator` tick by tick until stopped, the run completes, or a tick
/// keeps failing after every retry.
pub fn run_dispatch<S>(
    simulator: &mut S,
    context: &mut DispatchContext,
    settings: &DispatchSettings,
    state: &Arc<RwLock<AppState>>,
    stop: &AtomicBool,
) -> RunOutcome
where
    S: Simulator + ?Sized,
{
    info!(policy = context.policy_name(), "Dispatch loop started");
    let mut failed_attempts = 0u32;

    loop {
        if stop.load(Ordering::Relaxed) {
            info!(ticks = context.ticks_processed(), "Dispatch loop stopped");
            return RunOutcome::Stopped;
        }

        let tick_start = Instant::now();
        match context.run_tick(simulator) {
            Ok(report) => {
                failed_attempts = 0;
                if let Err(err) = publish_progress(state, context, &report) {
                    warn!(error = %err, "Failed to publish dispatch progress");
                }
                if report.complete {
                    info!(
                        tick = report.tick,
                        ticks = context.ticks_processed(),
                        "Simulation run complete"
                    );
                    return RunOutcome::Completed;
                }
                trace!(tick = report.tick, "Tick processed");
                sleep_with_stop(settings.tick_delay, stop, tick_start);
            }
            Err(err) if err.is_transient() && failed_attempts < settings.max_tick_retries => {
                failed_attempts += 1;
                warn!(
                    attempt = failed_attempts,
                    max_retries = settings.max_tick_retries,
                    error = %err,
                    "Tick failed, retrying"
                );
                sleep_with_stop(settings.retry_backoff, stop, Instant::now());
            }
            Err(err) => {
                error!(
                    attempts = failed_attempts + 1,
                    error = %err,
                    "Dispatch loop giving up"
                );
                return RunOutcome::Failed(err.to_string());
            }
        }
    }
}

pub fn publish_progress(
    state: &Arc<RwLock<AppState>>,
    context: &DispatchContext,
    report: &TickReport,
) -> Result<(), AppError> {
    let mut guard = state.write().map_err(|_| AppError::StateLock)?;
    let mut status = guard.status().clone();
    status.tick = report.tick;
    status.ticks_processed = context.ticks_processed();
    status.pending_calls = context.registry().len();
    status.claimed_calls = context.registry().claimed_len();
    if let Some(snapshot) = context.last_snapshot() {
        status.waiting_passengers = snapshot.waiting_count();
        status.delivered_passengers = snapshot.delivered_count();
    }
    if !report.directives.is_empty() {
        status.last_directives = report.directives.clone();
    }
    status.updated_at = SystemTime::now();
    guard.set_status(status);
    guard.set_metrics(context.metrics().summary());
    Ok(())
}

/// Spawn the worker thread for one run. The thread publishes the outcome
/// before it exits.
pub fn spawn_dispatch_thread<S>(
    mut simulator: S,
    mut context: DispatchContext,
    settings: DispatchSettings,
    state: Arc<RwLock<AppState>>,
    stop: Arc<AtomicBool>,
) -> std::thread::JoinHandle<RunOutcome>
where
    S: Simulator + Send + 'static,
{
    std::thread::spawn(move || {
        let outcome = run_dispatch(&mut simulator, &mut context, &settings, &state, &stop);
        match state.write() {
            Ok(mut guard) => guard.finish_run(outcome.clone()),
            Err(_) => warn!("State lock poisoned while recording run outcome"),
        }
        outcome
    })
}

fn sleep_with_stop(duration: Duration, stop: &AtomicBool, start: Instant) {
    let elapsed = start.elapsed();
    if elapsed >= duration {
        return;
    }
    let remaining = duration - elapsed;
    let mut slept = Duration::ZERO;

    while slept < remaining {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        let step = STOP_POLL_STEP.min(remaining - slept);
        std::thread::sleep(step);
        slept += step;
    }
}
