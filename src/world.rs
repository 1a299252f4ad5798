use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub type Tick = u64;
pub type Floor = u32;
pub type ElevatorId = u32;
pub type PassengerId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Stopped,
}

impl Direction {
    /// Travel direction for a trip from `origin` to `destination`.
    pub fn of_trip(origin: Floor, destination: Floor) -> Self {
        if destination > origin {
            Direction::Up
        } else {
            Direction::Down
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionStatus {
    Accelerating,
    Decelerating,
    ConstantSpeed,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassengerStatus {
    Waiting,
    InElevator,
    Completed,
}

/// Read-only projection of one car for a single tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ElevatorView {
    pub id: ElevatorId,
    /// Continuous position; integral values mean the car is level with a floor.
    pub position: f64,
    pub target_floor: Option<Floor>,
    pub direction: Direction,
    pub status: MotionStatus,
    pub pressed_floors: BTreeSet<Floor>,
    pub passenger_count: u32,
    pub max_capacity: u32,
    pub load_factor: f64,
}

impl ElevatorView {
    pub fn distance_to(&self, floor: Floor) -> f64 {
        (f64::from(floor) - self.position).abs()
    }

    pub fn is_stopped_at(&self, floor: Floor) -> bool {
        matches!(self.status, MotionStatus::Stopped) && self.distance_to(floor) < f64::EPSILON
    }

    pub fn is_full(&self) -> bool {
        self.max_capacity > 0 && self.passenger_count >= self.max_capacity
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FloorView {
    pub floor: Floor,
    pub up_waiting: Vec<PassengerId>,
    pub down_waiting: Vec<PassengerId>,
}

impl FloorView {
    pub fn total_waiting(&self) -> usize {
        self.up_waiting.len() + self.down_waiting.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassengerView {
    pub id: PassengerId,
    pub origin: Floor,
    pub destination: Floor,
    pub arrive_tick: Tick,
    pub pickup_tick: Option<Tick>,
    pub dropoff_tick: Option<Tick>,
    pub elevator_id: Option<ElevatorId>,
    pub status: PassengerStatus,
}

impl PassengerView {
    pub fn direction(&self) -> Direction {
        Direction::of_trip(self.origin, self.destination)
    }
}

/// Authoritative world state as reported by the simulator for one tick.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorldSnapshot {
    pub tick: Tick,
    pub elevators: Vec<ElevatorView>,
    pub floors: Vec<FloorView>,
    pub passengers: BTreeMap<PassengerId, PassengerView>,
}

impl WorldSnapshot {
    pub fn elevator(&self, id: ElevatorId) -> Option<&ElevatorView> {
        self.elevators.iter().find(|elevator| elevator.id == id)
    }

    pub fn lowest_floor(&self) -> Option<Floor> {
        self.floors.iter().map(|floor| floor.floor).min()
    }

    pub fn all_delivered(&self) -> bool {
        self.passengers
            .values()
            .all(|passenger| passenger.status == PassengerStatus::Completed)
    }

    /// Passengers queued at a floor, across both directions.
    pub fn waiting_count(&self) -> usize {
        self.floors.iter().map(FloorView::total_waiting).sum()
    }

    pub fn delivered_count(&self) -> usize {
        self.passengers
            .values()
            .filter(|passenger| passenger.status == PassengerStatus::Completed)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn car(position: f64, status: MotionStatus) -> ElevatorView {
        ElevatorView {
            id: 0,
            position,
            target_floor: None,
            direction: Direction::Stopped,
            status,
            pressed_floors: BTreeSet::new(),
            passenger_count: 0,
            max_capacity: 8,
            load_factor: 0.0,
        }
    }

    #[test]
    fn stopped_at_requires_level_and_stopped() {
        assert!(car(3.0, MotionStatus::Stopped).is_stopped_at(3));
        assert!(!car(3.0, MotionStatus::ConstantSpeed).is_stopped_at(3));
        assert!(!car(2.5, MotionStatus::Stopped).is_stopped_at(3));
    }

    #[test]
    fn counts_waiting_and_delivered_passengers() {
        let rider = |id, status| PassengerView {
            id,
            origin: 1,
            destination: 4,
            arrive_tick: 0,
            pickup_tick: None,
            dropoff_tick: None,
            elevator_id: None,
            status,
        };
        let snapshot = WorldSnapshot {
            floors: vec![
                FloorView {
                    floor: 0,
                    up_waiting: vec![3],
                    down_waiting: Vec::new(),
                },
                FloorView {
                    floor: 1,
                    up_waiting: vec![4],
                    down_waiting: vec![5],
                },
            ],
            passengers: BTreeMap::from([
                (1, rider(1, PassengerStatus::Completed)),
                (2, rider(2, PassengerStatus::InElevator)),
                (6, rider(6, PassengerStatus::Completed)),
            ]),
            ..WorldSnapshot::default()
        };

        assert_eq!(snapshot.waiting_count(), 3);
        assert_eq!(snapshot.delivered_count(), 2);
    }

    #[test]
    fn trip_direction_follows_destination() {
        assert_eq!(Direction::of_trip(2, 7), Direction::Up);
        assert_eq!(Direction::of_trip(7, 2), Direction::Down);
    }
}
