//! Client for the elevator simulation server's JSON API.

use crate::policy::model::Directive;
use crate::simulator::{Simulator, SimulatorError, SimulatorFactory};
use crate::world::{
    Direction, ElevatorId, ElevatorView, Floor, FloorView, MotionStatus, PassengerId,
    PassengerStatus, PassengerView, Tick, WorldSnapshot,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, trace, warn};

const DEFAULT_CAPACITY: u32 = 10;

#[derive(Debug, Clone)]
pub struct HttpSimulatorFactory {
    endpoint: String,
    timeout: Duration,
}

impl HttpSimulatorFactory {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout,
        }
    }
}

impl SimulatorFactory for HttpSimulatorFactory {
    type Client = HttpSimulator;

    /// Validates the endpoint only. Traffic info is loaded by `reset`, which
    /// every run start goes through.
    fn connect(&self) -> Result<HttpSimulator, SimulatorError> {
        parse_http_url(&self.endpoint)?;
        Ok(HttpSimulator {
            endpoint: self.endpoint.trim_end_matches('/').to_string(),
            timeout: self.timeout,
            max_tick: None,
        })
    }
}

#[derive(Debug)]
pub struct HttpSimulator {
    endpoint: String,
    timeout: Duration,
    max_tick: Option<Tick>,
}

impl HttpSimulator {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    fn get(&self, path: &str) -> Result<String, SimulatorError> {
        send_http("GET", &self.url(path), None, self.timeout)
    }

    fn post(&self, path: &str, body: &serde_json::Value) -> Result<String, SimulatorError> {
        let payload = serde_json::to_string(body)?;
        send_http("POST", &self.url(path), Some(&payload), self.timeout)
    }

    fn refresh_traffic_info(&mut self) {
        match self
            .get("/api/traffic/info")
            .and_then(|body| Ok(serde_json::from_str::<TrafficInfo>(&body)?))
        {
            Ok(info) => {
                debug!(max_tick = info.max_tick, "Traffic info loaded");
                self.max_tick = info.max_tick;
            }
            Err(err) => {
                warn!(error = %err, "Failed to load traffic info, run end will not be detected");
                self.max_tick = None;
            }
        }
    }
}

impl Simulator for HttpSimulator {
    fn fetch_state(&mut self) -> Result<WorldSnapshot, SimulatorError> {
        let body = self.get("/api/state")?;
        let state: StateResponse = serde_json::from_str(&body)?;
        Ok(state.into_snapshot())
    }

    fn submit_directive(
        &mut self,
        elevator_id: ElevatorId,
        directive: Directive,
    ) -> Result<(), SimulatorError> {
        match directive {
            Directive::GoTo(floor) => {
                let path = format!("/api/elevators/{elevator_id}/go_to_floor");
                self.post(&path, &serde_json::json!({ "floor": floor }))
                    .map_err(reject_client_errors)?;
                Ok(())
            }
            Directive::NoChange => {
                trace!(elevator_id, "No change for elevator");
                Ok(())
            }
        }
    }

    fn step(&mut self, ticks: u32) -> Result<Tick, SimulatorError> {
        let body = self.post("/api/step", &serde_json::json!({ "ticks": ticks }))?;
        let response: StepResponse = serde_json::from_str(&body)?;
        Ok(response.tick)
    }

    fn reset(&mut self) -> Result<(), SimulatorError> {
        let reset = self.post("/api/reset", &serde_json::json!({}));
        // Load traffic info even when the reset fails; the run continues.
        self.refresh_traffic_info();
        reset.map(|_| ())
    }

    fn is_run_complete(&self, snapshot: &WorldSnapshot) -> bool {
        match self.max_tick {
            Some(max_tick) => snapshot.tick >= max_tick && snapshot.all_delivered(),
            None => false,
        }
    }
}

fn reject_client_errors(err: SimulatorError) -> SimulatorError {
    match err {
        SimulatorError::Http(code, body) if (400..500).contains(&code) => {
            SimulatorError::Rejected(format!("http status {code} ({})", body.trim()))
        }
        other => other,
    }
}

#[derive(Debug, Deserialize)]
struct TrafficInfo {
    #[serde(default)]
    max_tick: Option<Tick>,
}

#[derive(Debug, Deserialize)]
struct StepResponse {
    tick: Tick,
}

#[derive(Debug, Deserialize)]
struct StateResponse {
    tick: Tick,
    elevators: Vec<WireElevator>,
    floors: Vec<WireFloor>,
    #[serde(default)]
    passengers: BTreeMap<PassengerId, WirePassenger>,
}

#[derive(Debug, Deserialize)]
struct WireElevator {
    id: ElevatorId,
    #[serde(alias = "current_floor")]
    current_floor_float: f64,
    #[serde(default)]
    target_floor: Option<Floor>,
    #[serde(default)]
    run_status: String,
    #[serde(default)]
    target_floor_direction: String,
    #[serde(default)]
    passengers: Vec<PassengerId>,
    #[serde(default)]
    pressed_floors: Vec<Floor>,
    #[serde(default)]
    max_capacity: Option<u32>,
    #[serde(default)]
    load_factor: f64,
}

#[derive(Debug, Deserialize)]
struct WireFloor {
    floor: Floor,
    #[serde(default)]
    up_queue: Vec<PassengerId>,
    #[serde(default)]
    down_queue: Vec<PassengerId>,
}

#[derive(Debug, Deserialize)]
struct WirePassenger {
    id: PassengerId,
    origin: Floor,
    destination: Floor,
    arrive_tick: Tick,
    // The server reports 0 for "not yet".
    #[serde(default)]
    pickup_tick: Tick,
    #[serde(default)]
    dropoff_tick: Tick,
    #[serde(default)]
    elevator_id: Option<ElevatorId>,
    #[serde(default)]
    status: String,
}

impl StateResponse {
    fn into_snapshot(self) -> WorldSnapshot {
        WorldSnapshot {
            tick: self.tick,
            elevators: self.elevators.into_iter().map(WireElevator::into_view).collect(),
            floors: self
                .floors
                .into_iter()
                .map(|floor| FloorView {
                    floor: floor.floor,
                    up_waiting: floor.up_queue,
                    down_waiting: floor.down_queue,
                })
                .collect(),
            passengers: self
                .passengers
                .into_values()
                .map(|passenger| (passenger.id, passenger.into_view()))
                .collect(),
        }
    }
}

impl WireElevator {
    fn into_view(self) -> ElevatorView {
        let max_capacity = self.max_capacity.unwrap_or(DEFAULT_CAPACITY);
        ElevatorView {
            id: self.id,
            position: self.current_floor_float,
            target_floor: self.target_floor,
            direction: map_direction(&self.target_floor_direction),
            status: map_motion_status(&self.run_status),
            pressed_floors: self.pressed_floors.into_iter().collect(),
            passenger_count: self.passengers.len() as u32,
            max_capacity,
            load_factor: self.load_factor,
        }
    }
}

impl WirePassenger {
    fn into_view(self) -> PassengerView {
        let pickup_tick = (self.pickup_tick > 0).then_some(self.pickup_tick);
        let dropoff_tick = (self.dropoff_tick > 0).then_some(self.dropoff_tick);
        PassengerView {
            id: self.id,
            origin: self.origin,
            destination: self.destination,
            arrive_tick: self.arrive_tick,
            status: map_passenger_status(&self.status, pickup_tick, dropoff_tick),
            pickup_tick,
            dropoff_tick,
            elevator_id: self.elevator_id,
        }
    }
}

fn map_direction(value: &str) -> Direction {
    match value.to_lowercase().as_str() {
        "up" => Direction::Up,
        "down" => Direction::Down,
        _ => Direction::Stopped,
    }
}

fn map_motion_status(value: &str) -> MotionStatus {
    let value = value.to_lowercase();
    if value.contains("up") || value.contains("accel") {
        MotionStatus::Accelerating
    } else if value.contains("down") || value.contains("decel") {
        MotionStatus::Decelerating
    } else if value.contains("constant") || value.contains("moving") {
        MotionStatus::ConstantSpeed
    } else {
        MotionStatus::Stopped
    }
}

fn map_passenger_status(
    value: &str,
    pickup_tick: Option<Tick>,
    dropoff_tick: Option<Tick>,
) -> PassengerStatus {
    let value = value.to_lowercase();
    if value.contains("complet") || value.contains("arrived") {
        PassengerStatus::Completed
    } else if value.contains("elevator") || value.contains("riding") {
        PassengerStatus::InElevator
    } else if value.contains("wait") {
        PassengerStatus::Waiting
    } else if dropoff_tick.is_some() {
        PassengerStatus::Completed
    } else if pickup_tick.is_some() {
        PassengerStatus::InElevator
    } else {
        PassengerStatus::Waiting
    }
}

struct ParsedUrl {
    host: String,
    port: u16,
    path: String,
}

fn parse_http_url(endpoint: &str) -> Result<ParsedUrl, SimulatorError> {
    let trimmed = endpoint
        .strip_prefix("http://")
        .ok_or_else(|| SimulatorError::InvalidUrl("only http:// supported".to_string()))?;

    let mut parts = trimmed.splitn(2, '/');
    let host_port = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SimulatorError::InvalidUrl("missing host".to_string()))?;
    let path = match parts.next() {
        Some(path) if !path.is_empty() => format!("/{path}"),
        _ => "/".to_string(),
    };

    let mut host_parts = host_port.splitn(2, ':');
    let host = host_parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SimulatorError::InvalidUrl("missing host".to_string()))?;
    let port = match host_parts.next() {
        Some(port_str) if !port_str.is_empty() => port_str
            .parse::<u16>()
            .map_err(|_| SimulatorError::InvalidUrl("invalid port".to_string()))?,
        _ => 80,
    };

    Ok(ParsedUrl {
        host: host.to_string(),
        port,
        path,
    })
}

fn send_http(
    method: &str,
    url: &str,
    body: Option<&str>,
    timeout: Duration,
) -> Result<String, SimulatorError> {
    let parsed = parse_http_url(url)?;
    let addr = (parsed.host.as_str(), parsed.port)
        .to_socket_addrs()
        .map_err(|err| SimulatorError::Dns(err.to_string()))?
        .next()
        .ok_or_else(|| SimulatorError::Dns("no addresses resolved".to_string()))?;

    let mut stream =
        TcpStream::connect_timeout(&addr, timeout).map_err(SimulatorError::Connect)?;
    stream
        .set_read_timeout(Some(timeout))
        .map_err(SimulatorError::Io)?;
    stream
        .set_write_timeout(Some(timeout))
        .map_err(SimulatorError::Io)?;

    let body = body.unwrap_or("");
    let request = format!(
        "{method} {} HTTP/1.1\r\nHost: {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        parsed.path,
        parsed.host,
        body.len(),
    );

    stream
        .write_all(request.as_bytes())
        .map_err(SimulatorError::Io)?;

    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .map_err(SimulatorError::Io)?;

    let (headers, body) = response
        .split_once("\r\n\r\n")
        .ok_or_else(|| SimulatorError::Http(0, "invalid http response".to_string()))?;

    let status_code = headers
        .lines()
        .next()
        .and_then(|status_line| status_line.split_whitespace().nth(1))
        .ok_or_else(|| SimulatorError::Http(0, "missing status code".to_string()))?
        .parse::<u16>()
        .map_err(|_| SimulatorError::Http(0, "invalid status code".to_string()))?;

    if status_code >= 400 {
        return Err(SimulatorError::Http(status_code, body.to_string()));
    }

    Ok(body.to_string())
}
