use crate::policy::PolicyError;
use crate::simulator::SimulatorError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("simulator error: {0}")]
    Simulator(#[from] SimulatorError),
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),
    #[error("controller is already running")]
    AlreadyRunning,
    #[error("dispatch worker panicked")]
    WorkerPanicked,
    #[error("state lock poisoned")]
    StateLock,
}
