use crate::dispatch::DispatchSettings;
use crate::policy::PolicySettings;
use crate::simulator::mock::MockScenario;
use crate::world::Floor;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_SIMULATOR_ENDPOINT: &str = "http://127.0.0.1:8000";
pub const DEFAULT_SIMULATOR_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_TICK_DELAY_MS: u64 = 100;
pub const DEFAULT_MAX_TICK_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 200;
pub const DEFAULT_MOCK_FLOORS: u32 = 10;
pub const DEFAULT_MOCK_ELEVATORS: u32 = 2;
pub const DEFAULT_MOCK_CAPACITY: u32 = 8;
pub const DEFAULT_MOCK_PASSENGERS: u32 = 40;
pub const DEFAULT_MOCK_ARRIVAL_SPACING: u64 = 3;
pub const TICK_DELAY_ENV: &str = "LIFT_DISPATCH_TICK_DELAY_MS";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: AppSection,
    pub logging: LoggingSection,
    #[serde(default)]
    pub server: Option<ServerSection>,
    #[serde(default)]
    pub simulator: Option<SimulatorSection>,
    #[serde(default)]
    pub dispatch: Option<DispatchSection>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSection {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSection {
    /// Port for the control API (default: 8080)
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SimulatorMode {
    #[default]
    Http,
    Mock,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SimulatorSection {
    pub mode: Option<SimulatorMode>,
    pub endpoint: Option<String>,
    pub timeout_ms: Option<u64>,
    /// Building and traffic for `mode = "mock"`.
    pub floors: Option<u32>,
    pub elevators: Option<u32>,
    pub capacity: Option<u32>,
    pub passengers: Option<u32>,
    pub arrival_spacing_ticks: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DispatchSection {
    /// Pause between ticks; overridden by `LIFT_DISPATCH_TICK_DELAY_MS`.
    pub tick_delay_ms: Option<u64>,
    pub max_tick_retries: Option<u32>,
    pub retry_backoff_ms: Option<u64>,
    pub idle_home_floor: Option<Floor>,
    pub policy: Option<String>,
    pub max_capacity: Option<u32>,
    /// Start a run as soon as the process is up.
    pub autostart: Option<bool>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid {name}: {value:?}")]
    InvalidEnv { name: &'static str, value: String },
}

pub fn load_default() -> Result<Config, ConfigError> {
    load_from_path(DEFAULT_CONFIG_PATH)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    Ok(config)
}

impl Config {
    pub fn log_level(&self) -> &str {
        self.logging.level.as_str()
    }

    /// Returns the server port (default: 8080)
    pub fn server_port(&self) -> u16 {
        self.server
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    pub fn simulator_mode(&self) -> SimulatorMode {
        self.simulator
            .as_ref()
            .and_then(|s| s.mode)
            .unwrap_or_default()
    }

    pub fn simulator_endpoint(&self) -> &str {
        self.simulator
            .as_ref()
            .and_then(|s| s.endpoint.as_deref())
            .filter(|endpoint| !endpoint.is_empty())
            .unwrap_or(DEFAULT_SIMULATOR_ENDPOINT)
    }

    pub fn simulator_timeout(&self) -> Duration {
        let millis = self
            .simulator
            .as_ref()
            .and_then(|s| s.timeout_ms)
            .unwrap_or(DEFAULT_SIMULATOR_TIMEOUT_MS);
        Duration::from_millis(millis)
    }

    pub fn mock_scenario(&self) -> MockScenario {
        let section = self.simulator.as_ref();
        MockScenario::generated(
            section.and_then(|s| s.floors).unwrap_or(DEFAULT_MOCK_FLOORS),
            section.and_then(|s| s.elevators).unwrap_or(DEFAULT_MOCK_ELEVATORS),
            section.and_then(|s| s.capacity).unwrap_or(DEFAULT_MOCK_CAPACITY),
            section.and_then(|s| s.passengers).unwrap_or(DEFAULT_MOCK_PASSENGERS),
            section
                .and_then(|s| s.arrival_spacing_ticks)
                .unwrap_or(DEFAULT_MOCK_ARRIVAL_SPACING),
        )
    }

    /// Tick delay from the environment if set, else from `[dispatch]`.
    pub fn tick_delay(&self) -> Result<Duration, ConfigError> {
        self.tick_delay_with_override(std::env::var(TICK_DELAY_ENV).ok().as_deref())
    }

    fn tick_delay_with_override(&self, env_value: Option<&str>) -> Result<Duration, ConfigError> {
        let millis = match env_value.map(str::trim).filter(|value| !value.is_empty()) {
            Some(value) => value.parse::<u64>().map_err(|_| ConfigError::InvalidEnv {
                name: TICK_DELAY_ENV,
                value: value.to_string(),
            })?,
            None => self
                .dispatch
                .as_ref()
                .and_then(|d| d.tick_delay_ms)
                .unwrap_or(DEFAULT_TICK_DELAY_MS),
        };
        Ok(Duration::from_millis(millis))
    }

    pub fn dispatch_settings(&self) -> Result<DispatchSettings, ConfigError> {
        let section = self.dispatch.as_ref();
        let retries = section
            .and_then(|d| d.max_tick_retries)
            .unwrap_or(DEFAULT_MAX_TICK_RETRIES);
        let backoff = section
            .and_then(|d| d.retry_backoff_ms)
            .unwrap_or(DEFAULT_RETRY_BACKOFF_MS);
        Ok(DispatchSettings::new(
            self.tick_delay()?,
            retries,
            Duration::from_millis(backoff),
        ))
    }

    pub fn policy_settings(&self) -> PolicySettings {
        match &self.dispatch {
            Some(section) => PolicySettings {
                name: section.policy.clone().filter(|name| !name.is_empty()),
                idle_home_floor: section.idle_home_floor,
                max_capacity: section.max_capacity,
            },
            None => PolicySettings::default(),
        }
    }

    pub fn autostart(&self) -> bool {
        self.dispatch
            .as_ref()
            .and_then(|d| d.autostart)
            .unwrap_or(false)
    }
}
