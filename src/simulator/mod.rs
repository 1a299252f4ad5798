use crate::policy::model::Directive;
use crate::world::{ElevatorId, Tick, WorldSnapshot};
use thiserror::Error;

pub mod http;
pub mod mock;

#[derive(Debug, Error)]
pub enum SimulatorError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("dns error: {0}")]
    Dns(String),
    #[error("connect error: {0}")]
    Connect(#[source] std::io::Error),
    #[error("io error: {0}")]
    Io(#[source] std::io::Error),
    #[error("http status {0} ({1})")]
    Http(u16, String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("simulator rejected request: {0}")]
    Rejected(String),
}

impl SimulatorError {
    /// Failures worth retrying the tick for.
    pub fn is_transient(&self) -> bool {
        match self {
            SimulatorError::Dns(_) | SimulatorError::Connect(_) | SimulatorError::Io(_) => true,
            SimulatorError::Http(code, _) => *code >= 500 || *code == 0,
            SimulatorError::InvalidUrl(_)
            | SimulatorError::Json(_)
            | SimulatorError::Rejected(_) => false,
        }
    }
}

/// Boundary between the dispatch loop and the simulation it drives.
pub trait Simulator {
    /// Authoritative state for the current tick. Re-reading without stepping
    /// must return the same world.
    fn fetch_state(&mut self) -> Result<WorldSnapshot, SimulatorError>;

    /// Apply one directive. `NoChange` is a valid, explicit signal.
    fn submit_directive(
        &mut self,
        elevator_id: ElevatorId,
        directive: Directive,
    ) -> Result<(), SimulatorError>;

    /// Advance the simulation and return the new tick.
    fn step(&mut self, ticks: u32) -> Result<Tick, SimulatorError>;

    fn reset(&mut self) -> Result<(), SimulatorError>;

    /// Whether the run is over: no further calls will arrive and every
    /// passenger has been delivered.
    fn is_run_complete(&self, snapshot: &WorldSnapshot) -> bool;
}

/// Creates a simulator client for each dispatch run.
pub trait SimulatorFactory: Send + Sync {
    type Client: Simulator + Send + 'static;

    fn connect(&self) -> Result<Self::Client, SimulatorError>;
}
