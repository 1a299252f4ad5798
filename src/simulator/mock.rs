//! In-memory simulator for tests and for running without a simulation server.
//!
//! Cars move one floor per tick toward their target and serve a floor only
//! while stopped there: riders for that floor leave first, then waiting
//! passengers board in arrival order until the car is full.

use crate::policy::model::Directive;
use crate::simulator::{Simulator, SimulatorError, SimulatorFactory};
use crate::world::{
    Direction, ElevatorId, ElevatorView, Floor, FloorView, MotionStatus, PassengerId,
    PassengerStatus, PassengerView, Tick, WorldSnapshot,
};
use std::collections::BTreeMap;
use std::io;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrafficEntry {
    pub passenger_id: PassengerId,
    pub tick: Tick,
    pub origin: Floor,
    pub destination: Floor,
}

#[derive(Debug, Clone)]
pub struct MockScenario {
    pub floor_count: u32,
    pub elevator_count: u32,
    pub capacity: u32,
    pub traffic: Vec<TrafficEntry>,
}

impl MockScenario {
    pub fn new(floor_count: u32, elevator_count: u32, capacity: u32) -> Self {
        Self {
            floor_count,
            elevator_count,
            capacity,
            traffic: Vec::new(),
        }
    }

    /// Add a passenger appearing at `tick`. Ids are assigned in insertion order.
    pub fn with_call(mut self, tick: Tick, origin: Floor, destination: Floor) -> Self {
        let passenger_id = self.traffic.len() as PassengerId + 1;
        self.traffic.push(TrafficEntry {
            passenger_id,
            tick,
            origin,
            destination,
        });
        self
    }

    /// Deterministic traffic: `passengers` trips, one every `spacing` ticks,
    /// spread over all floors.
    pub fn generated(
        floor_count: u32,
        elevator_count: u32,
        capacity: u32,
        passengers: u32,
        spacing: Tick,
    ) -> Self {
        let mut scenario = Self::new(floor_count, elevator_count, capacity);
        if floor_count < 2 {
            return scenario;
        }
        for i in 0..passengers {
            let origin = (i * 7 + 3) % floor_count;
            let offset = 1 + (i * 5) % (floor_count - 1);
            let destination = (origin + offset) % floor_count;
            scenario = scenario.with_call(Tick::from(i) * spacing, origin, destination);
        }
        scenario
    }
}

/// Injected transport failures, consumed one per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockFaults {
    pub failing_fetches: u32,
    pub failing_steps: u32,
}

impl MockFaults {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn fail_fetches(count: u32) -> Self {
        Self {
            failing_fetches: count,
            ..Self::default()
        }
    }

    pub fn fail_steps(count: u32) -> Self {
        Self {
            failing_steps: count,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmittedDirective {
    pub tick: Tick,
    pub elevator_id: ElevatorId,
    pub directive: Directive,
}

/// Directives received by every simulator a factory has handed out.
pub type DirectiveJournal = Arc<Mutex<Vec<SubmittedDirective>>>;

pub struct MockSimulatorFactory {
    scenario: MockScenario,
    faults: MockFaults,
    journal: DirectiveJournal,
}

impl MockSimulatorFactory {
    pub fn new(scenario: MockScenario) -> Self {
        Self {
            scenario,
            faults: MockFaults::none(),
            journal: DirectiveJournal::default(),
        }
    }

    pub fn with_faults(mut self, faults: MockFaults) -> Self {
        self.faults = faults;
        self
    }

    pub fn journal(&self) -> DirectiveJournal {
        Arc::clone(&self.journal)
    }
}

impl SimulatorFactory for MockSimulatorFactory {
    type Client = MockSimulator;

    fn connect(&self) -> Result<MockSimulator, SimulatorError> {
        let mut simulator = MockSimulator::new(self.scenario.clone());
        simulator.faults = self.faults;
        simulator.journal = Arc::clone(&self.journal);
        Ok(simulator)
    }
}

#[derive(Debug, Clone)]
struct MockCar {
    id: ElevatorId,
    floor: Floor,
    target: Option<Floor>,
    direction: Direction,
    riders: Vec<PassengerId>,
}

impl MockCar {
    fn parked(id: ElevatorId) -> Self {
        Self {
            id,
            floor: 0,
            target: None,
            direction: Direction::Stopped,
            riders: Vec::new(),
        }
    }

    fn advance(&mut self) {
        let Some(target) = self.target else {
            self.direction = Direction::Stopped;
            return;
        };
        if self.floor < target {
            self.floor += 1;
            self.direction = Direction::Up;
        } else if self.floor > target {
            self.floor -= 1;
            self.direction = Direction::Down;
        }
        if self.floor == target {
            self.target = None;
            self.direction = Direction::Stopped;
        }
    }
}

pub struct MockSimulator {
    scenario: MockScenario,
    faults: MockFaults,
    journal: DirectiveJournal,
    tick: Tick,
    cars: Vec<MockCar>,
    floors: Vec<FloorView>,
    passengers: BTreeMap<PassengerId, PassengerView>,
    next_arrival: usize,
}

impl MockSimulator {
    pub fn new(mut scenario: MockScenario) -> Self {
        let floor_count = scenario.floor_count;
        scenario.traffic.retain(|entry| {
            let valid = entry.origin != entry.destination
                && entry.origin < floor_count
                && entry.destination < floor_count;
            if !valid {
                warn!(
                    passenger_id = entry.passenger_id,
                    origin = entry.origin,
                    destination = entry.destination,
                    "Dropping invalid traffic entry"
                );
            }
            valid
        });
        scenario.traffic.sort_by_key(|entry| entry.tick);

        let mut simulator = Self {
            scenario,
            faults: MockFaults::none(),
            journal: DirectiveJournal::default(),
            tick: 0,
            cars: Vec::new(),
            floors: Vec::new(),
            passengers: BTreeMap::new(),
            next_arrival: 0,
        };
        simulator.restore();
        simulator
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn passenger(&self, passenger_id: PassengerId) -> Option<&PassengerView> {
        self.passengers.get(&passenger_id)
    }

    pub fn journal(&self) -> DirectiveJournal {
        Arc::clone(&self.journal)
    }

    fn restore(&mut self) {
        self.tick = 0;
        self.cars = (0..self.scenario.elevator_count)
            .map(MockCar::parked)
            .collect();
        self.floors = (0..self.scenario.floor_count)
            .map(|floor| FloorView {
                floor,
                ..FloorView::default()
            })
            .collect();
        self.passengers.clear();
        self.next_arrival = 0;
        self.admit_arrivals();
    }

    fn admit_arrivals(&mut self) {
        while let Some(entry) = self.scenario.traffic.get(self.next_arrival).copied() {
            if entry.tick > self.tick {
                break;
            }
            self.next_arrival += 1;
            let passenger = PassengerView {
                id: entry.passenger_id,
                origin: entry.origin,
                destination: entry.destination,
                arrive_tick: self.tick,
                pickup_tick: None,
                dropoff_tick: None,
                elevator_id: None,
                status: PassengerStatus::Waiting,
            };
            if let Some(floor) = self.floors.get_mut(entry.origin as usize) {
                match passenger.direction() {
                    Direction::Up => floor.up_waiting.push(passenger.id),
                    _ => floor.down_waiting.push(passenger.id),
                }
            }
            self.passengers.insert(passenger.id, passenger);
        }
    }

    fn serve_stopped_cars(&mut self) {
        let tick = self.tick;
        let capacity = self.scenario.capacity as usize;

        for car in self.cars.iter_mut().filter(|car| car.target.is_none()) {
            let passengers = &mut self.passengers;
            car.riders.retain(|id| {
                let Some(passenger) = passengers.get_mut(id) else {
                    return false;
                };
                if passenger.destination != car.floor {
                    return true;
                }
                passenger.status = PassengerStatus::Completed;
                passenger.dropoff_tick = Some(tick);
                false
            });

            let Some(floor) = self.floors.get_mut(car.floor as usize) else {
                continue;
            };
            for queue in [&mut floor.up_waiting, &mut floor.down_waiting] {
                while car.riders.len() < capacity && !queue.is_empty() {
                    let id = queue.remove(0);
                    if let Some(passenger) = passengers.get_mut(&id) {
                        passenger.status = PassengerStatus::InElevator;
                        passenger.pickup_tick = Some(tick);
                        passenger.elevator_id = Some(car.id);
                        car.riders.push(id);
                    }
                }
            }
        }
    }

    fn elevator_view(&self, car: &MockCar) -> ElevatorView {
        let capacity = self.scenario.capacity;
        ElevatorView {
            id: car.id,
            position: f64::from(car.floor),
            target_floor: car.target,
            direction: car.direction,
            status: if car.target.is_some() {
                MotionStatus::ConstantSpeed
            } else {
                MotionStatus::Stopped
            },
            pressed_floors: car
                .riders
                .iter()
                .filter_map(|id| self.passengers.get(id))
                .map(|passenger| passenger.destination)
                .collect(),
            passenger_count: car.riders.len() as u32,
            max_capacity: capacity,
            load_factor: if capacity == 0 {
                0.0
            } else {
                car.riders.len() as f64 / f64::from(capacity)
            },
        }
    }

    fn record(&self, elevator_id: ElevatorId, directive: Directive) {
        if let Ok(mut journal) = self.journal.lock() {
            journal.push(SubmittedDirective {
                tick: self.tick,
                elevator_id,
                directive,
            });
        }
    }
}

fn injected_failure(what: &str) -> SimulatorError {
    SimulatorError::Connect(io::Error::new(
        io::ErrorKind::ConnectionRefused,
        format!("mock {what} failure"),
    ))
}

impl Simulator for MockSimulator {
    fn fetch_state(&mut self) -> Result<WorldSnapshot, SimulatorError> {
        if self.faults.failing_fetches > 0 {
            self.faults.failing_fetches -= 1;
            return Err(injected_failure("fetch"));
        }
        Ok(WorldSnapshot {
            tick: self.tick,
            elevators: self.cars.iter().map(|car| self.elevator_view(car)).collect(),
            floors: self.floors.clone(),
            passengers: self.passengers.clone(),
        })
    }

    fn submit_directive(
        &mut self,
        elevator_id: ElevatorId,
        directive: Directive,
    ) -> Result<(), SimulatorError> {
        if let Directive::GoTo(floor) = directive
            && floor >= self.scenario.floor_count
        {
            return Err(SimulatorError::Rejected(format!(
                "floor {floor} out of range"
            )));
        }
        let Some(car) = self.cars.iter_mut().find(|car| car.id == elevator_id) else {
            return Err(SimulatorError::Rejected(format!(
                "unknown elevator {elevator_id}"
            )));
        };
        if let Directive::GoTo(floor) = directive {
            car.target = (car.floor != floor).then_some(floor);
        }
        self.record(elevator_id, directive);
        Ok(())
    }

    fn step(&mut self, ticks: u32) -> Result<Tick, SimulatorError> {
        if self.faults.failing_steps > 0 {
            self.faults.failing_steps -= 1;
            return Err(injected_failure("step"));
        }
        for _ in 0..ticks {
            self.tick += 1;
            for car in &mut self.cars {
                car.advance();
            }
            self.serve_stopped_cars();
            self.admit_arrivals();
        }
        Ok(self.tick)
    }

    fn reset(&mut self) -> Result<(), SimulatorError> {
        debug!("Mock simulator reset");
        self.restore();
        Ok(())
    }

    fn is_run_complete(&self, snapshot: &WorldSnapshot) -> bool {
        self.next_arrival >= self.scenario.traffic.len() && snapshot.all_delivered()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(simulator: &mut MockSimulator) -> WorldSnapshot {
        simulator.fetch_state().expect("fetch state")
    }

    #[test]
    fn car_travels_one_floor_per_tick_and_delivers() {
        let mut simulator = MockSimulator::new(MockScenario::new(6, 1, 4).with_call(0, 2, 4));

        simulator
            .submit_directive(0, Directive::GoTo(2))
            .expect("go to origin");
        simulator.step(2).expect("step");
        assert_eq!(simulator.passenger(1).and_then(|p| p.pickup_tick), Some(2));

        let world = snapshot(&mut simulator);
        assert_eq!(world.elevators[0].pressed_floors.iter().copied().collect::<Vec<_>>(), vec![4]);

        simulator
            .submit_directive(0, Directive::GoTo(4))
            .expect("go to destination");
        simulator.step(2).expect("step");

        let world = snapshot(&mut simulator);
        assert_eq!(world.passengers[&1].status, PassengerStatus::Completed);
        assert_eq!(world.passengers[&1].dropoff_tick, Some(4));
        assert!(simulator.is_run_complete(&world));
    }

    #[test]
    fn same_directive_twice_matches_once() {
        let scenario = MockScenario::new(8, 1, 4);
        let mut once = MockSimulator::new(scenario.clone());
        let mut twice = MockSimulator::new(scenario);

        once.submit_directive(0, Directive::GoTo(5)).expect("submit");
        twice.submit_directive(0, Directive::GoTo(5)).expect("submit");
        twice.submit_directive(0, Directive::GoTo(5)).expect("submit again");
        once.step(3).expect("step");
        twice.step(3).expect("step");

        assert_eq!(snapshot(&mut once), snapshot(&mut twice));
    }

    #[test]
    fn full_car_leaves_passengers_waiting() {
        let scenario = MockScenario::new(5, 1, 1)
            .with_call(0, 0, 3)
            .with_call(0, 0, 4);
        let mut simulator = MockSimulator::new(scenario);

        simulator.step(1).expect("step");

        let world = snapshot(&mut simulator);
        assert_eq!(world.elevators[0].passenger_count, 1);
        assert!(world.elevators[0].is_full());
        assert_eq!(world.floors[0].up_waiting, vec![2]);
    }

    #[test]
    fn generated_traffic_stays_in_the_building() {
        let scenario = MockScenario::generated(5, 2, 4, 30, 3);

        assert_eq!(scenario.traffic.len(), 30);
        assert!(scenario.traffic.iter().all(|entry| {
            entry.origin < 5 && entry.destination < 5 && entry.origin != entry.destination
        }));
        assert_eq!(scenario.traffic[10].tick, 30);
    }

    #[test]
    fn out_of_range_floor_is_rejected() {
        let mut simulator = MockSimulator::new(MockScenario::new(4, 1, 4));

        let err = simulator
            .submit_directive(0, Directive::GoTo(9))
            .unwrap_err();

        assert!(matches!(err, SimulatorError::Rejected(_)));
    }

    #[test]
    fn injected_fetch_failures_are_consumed() {
        let mut simulator = MockSimulator::new(MockScenario::new(4, 1, 4));
        simulator.faults = MockFaults::fail_fetches(1);

        assert!(simulator.fetch_state().is_err());
        assert!(simulator.fetch_state().is_ok());
    }

    #[test]
    fn reset_restores_the_initial_world() {
        let mut simulator = MockSimulator::new(MockScenario::new(6, 1, 4).with_call(2, 3, 1));
        let initial = snapshot(&mut simulator);
        simulator.submit_directive(0, Directive::GoTo(5)).expect("submit");
        simulator.step(4).expect("step");

        simulator.reset().expect("reset");

        assert_eq!(snapshot(&mut simulator), initial);
        assert_eq!(simulator.tick(), 0);
    }
}
