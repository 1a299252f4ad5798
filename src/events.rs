//! Per-tick event feed derived by diffing consecutive world snapshots.

use crate::world::{Direction, ElevatorId, Floor, PassengerId, PassengerStatus, Tick, WorldSnapshot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallCreated {
    pub passenger_id: PassengerId,
    pub origin: Floor,
    pub destination: Floor,
    pub direction: Direction,
    pub tick: Tick,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickedUp {
    pub passenger_id: PassengerId,
    /// `None` when the simulator did not say which car boarded the passenger.
    pub elevator_id: Option<ElevatorId>,
    pub tick: Tick,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    pub passenger_id: PassengerId,
    pub tick: Tick,
}

/// Events observed between two snapshots, in ingestion order: calls, then
/// pickups, then deliveries, each sorted by passenger id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickEvents {
    pub calls: Vec<CallCreated>,
    pub pickups: Vec<PickedUp>,
    pub deliveries: Vec<Delivered>,
}

impl TickEvents {
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty() && self.pickups.is_empty() && self.deliveries.is_empty()
    }
}

pub fn diff_snapshots(previous: Option<&WorldSnapshot>, current: &WorldSnapshot) -> TickEvents {
    let mut events = TickEvents::default();

    // BTreeMap iteration keeps every list sorted by passenger id.
    for (id, passenger) in &current.passengers {
        let before = previous.and_then(|snapshot| snapshot.passengers.get(id));

        if before.is_none() {
            events.calls.push(CallCreated {
                passenger_id: *id,
                origin: passenger.origin,
                destination: passenger.destination,
                direction: passenger.direction(),
                tick: passenger.arrive_tick,
            });
        }

        let was_waiting = before.is_none_or(|p| p.status == PassengerStatus::Waiting);
        if was_waiting && passenger.status != PassengerStatus::Waiting {
            events.pickups.push(PickedUp {
                passenger_id: *id,
                elevator_id: passenger.elevator_id,
                tick: passenger.pickup_tick.unwrap_or(current.tick),
            });
        }

        let was_completed = before.is_some_and(|p| p.status == PassengerStatus::Completed);
        if !was_completed && passenger.status == PassengerStatus::Completed {
            events.deliveries.push(Delivered {
                passenger_id: *id,
                tick: passenger.dropoff_tick.unwrap_or(current.tick),
            });
        }
    }

    events
}
