//! Greedy nearest-call policy.
//!
//! Loaded cars head for the nearest of their in-car floors and claimed
//! origins. Idle cars, taken in ascending id order, claim the nearest
//! unclaimed call; equal distances go to the oldest call. Cars with nothing
//! to do return to the idle-home floor.

use crate::policy::model::{AssignmentPolicy, Directive, DirectiveSet};
use crate::registry::{CallRegistry, RegistryError};
use crate::world::{Direction, ElevatorView, Floor, PassengerId, Tick, WorldSnapshot};
use std::cmp::Ordering;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone)]
pub struct GreedyNearest {
    /// Parking floor; `None` means the lowest floor in the snapshot.
    pub idle_home: Option<Floor>,
}

impl GreedyNearest {
    pub fn new(idle_home: Option<Floor>) -> Self {
        Self { idle_home }
    }
}

impl Default for GreedyNearest {
    fn default() -> Self {
        Self::new(None)
    }
}

impl AssignmentPolicy for GreedyNearest {
    fn name(&self) -> &'static str {
        "greedy_nearest"
    }

    fn assign(&self, world: &WorldSnapshot, registry: &mut CallRegistry) -> DirectiveSet {
        let home = self.idle_home.or_else(|| world.lowest_floor());
        let candidates = unclaimed_candidates(registry);
        let mut directives = DirectiveSet::new();

        for elevator in elevators_by_id(world) {
            let directive = match nearest_served_target(elevator, registry) {
                Some(target) => Directive::GoTo(target),
                None => match claim_nearest(elevator, &candidates, registry, world.tick) {
                    Some(origin) => Directive::GoTo(origin),
                    None => park(elevator, home),
                },
            };
            directives.insert(elevator.id, directive);
        }

        directives
    }
}

/// An unclaimed call as seen at the start of a policy pass.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Candidate {
    pub passenger_id: PassengerId,
    pub origin: Floor,
    pub direction: Direction,
    pub created_tick: Tick,
}

pub(crate) fn unclaimed_candidates(registry: &CallRegistry) -> Vec<Candidate> {
    registry
        .unclaimed()
        .map(|call| Candidate {
            passenger_id: call.passenger_id,
            origin: call.origin,
            direction: call.direction,
            created_tick: call.created_tick,
        })
        .collect()
}

pub(crate) fn elevators_by_id(world: &WorldSnapshot) -> Vec<&ElevatorView> {
    let mut elevators: Vec<&ElevatorView> = world.elevators.iter().collect();
    elevators.sort_by_key(|elevator| elevator.id);
    elevators
}

/// Nearest of the car's pressed floors and the origins of the calls it has
/// claimed but not yet picked up. `None` when the car has neither.
pub(crate) fn nearest_served_target(
    elevator: &ElevatorView,
    registry: &CallRegistry,
) -> Option<Floor> {
    let claimed = registry.pending_for(elevator.id);
    elevator
        .pressed_floors
        .iter()
        .copied()
        .chain(claimed.iter().map(|call| call.origin))
        .min_by(|a, b| by_distance(elevator, *a, *b).then(a.cmp(b)))
}

/// Orders candidates for `elevator`: distance first, then creation tick so the
/// oldest call wins, then passenger id.
pub(crate) fn rank_candidates(elevator: &ElevatorView, candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        by_distance(elevator, a.origin, b.origin)
            .then(a.created_tick.cmp(&b.created_tick))
            .then(a.passenger_id.cmp(&b.passenger_id))
    });
}

/// Try candidates nearest-first until one claim succeeds.
pub(crate) fn try_claim<'a>(
    elevator: &ElevatorView,
    ranked: impl IntoIterator<Item = &'a Candidate>,
    registry: &mut CallRegistry,
    tick: Tick,
) -> Option<Floor> {
    for candidate in ranked {
        match registry.claim(candidate.passenger_id, elevator.id, tick) {
            Ok(()) => {
                debug!(
                    elevator_id = elevator.id,
                    passenger_id = candidate.passenger_id,
                    origin = candidate.origin,
                    "Call claimed"
                );
                return Some(candidate.origin);
            }
            Err(RegistryError::AlreadyClaimed { holder, .. }) => {
                trace!(
                    elevator_id = elevator.id,
                    passenger_id = candidate.passenger_id,
                    holder,
                    "Candidate already claimed, trying next"
                );
            }
            Err(err) => {
                warn!(
                    elevator_id = elevator.id,
                    passenger_id = candidate.passenger_id,
                    error = %err,
                    "Skipping candidate that cannot be claimed"
                );
            }
        }
    }
    None
}

fn claim_nearest(
    elevator: &ElevatorView,
    candidates: &[Candidate],
    registry: &mut CallRegistry,
    tick: Tick,
) -> Option<Floor> {
    let mut ranked = candidates.to_vec();
    rank_candidates(elevator, &mut ranked);
    try_claim(elevator, &ranked, registry, tick)
}

pub(crate) fn park(elevator: &ElevatorView, home: Option<Floor>) -> Directive {
    match home {
        Some(home) if !elevator.is_stopped_at(home) => Directive::GoTo(home),
        _ => Directive::NoChange,
    }
}

fn by_distance(elevator: &ElevatorView, a: Floor, b: Floor) -> Ordering {
    elevator.distance_to(a).total_cmp(&elevator.distance_to(b))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::registry::Call;
    use crate::world::{ElevatorId, FloorView, MotionStatus};
    use std::collections::BTreeSet;

    pub(crate) fn idle_car(id: ElevatorId, floor: Floor) -> ElevatorView {
        ElevatorView {
            id,
            position: f64::from(floor),
            target_floor: None,
            direction: Direction::Stopped,
            status: MotionStatus::Stopped,
            pressed_floors: BTreeSet::new(),
            passenger_count: 0,
            max_capacity: 4,
            load_factor: 0.0,
        }
    }

    pub(crate) fn world(tick: Tick, elevators: Vec<ElevatorView>) -> WorldSnapshot {
        WorldSnapshot {
            tick,
            elevators,
            floors: (0..=12)
                .map(|floor| FloorView {
                    floor,
                    ..FloorView::default()
                })
                .collect(),
            ..WorldSnapshot::default()
        }
    }

    #[test]
    fn nearest_idle_elevator_wins_the_call() {
        let mut registry = CallRegistry::new();
        registry
            .register_call(Call::new(1, 4, Direction::Up, 0))
            .expect("register");
        let snapshot = world(1, vec![idle_car(0, 1), idle_car(1, 10)]);

        let directives = GreedyNearest::default().assign(&snapshot, &mut registry);

        assert_eq!(registry.claimant_of(1), Some(0));
        assert_eq!(directives[&0], Directive::GoTo(4));
        // Car 1 has nothing left to claim and heads home.
        assert_eq!(directives[&1], Directive::GoTo(0));
    }

    #[test]
    fn equidistant_calls_go_to_the_oldest_first() {
        let mut registry = CallRegistry::new();
        registry
            .register_call(Call::new(20, 5, Direction::Up, 12))
            .expect("register newer");
        registry
            .register_call(Call::new(30, 5, Direction::Up, 10))
            .expect("register older");
        let snapshot = world(13, vec![idle_car(0, 5)]);

        let directives = GreedyNearest::default().assign(&snapshot, &mut registry);

        assert_eq!(registry.claimant_of(30), Some(0));
        assert_eq!(registry.claimant_of(20), None);
        assert_eq!(directives[&0], Directive::GoTo(5));
    }

    #[test]
    fn second_car_skips_call_claimed_earlier_in_the_pass() {
        let mut registry = CallRegistry::new();
        registry
            .register_call(Call::new(1, 6, Direction::Down, 0))
            .expect("register near");
        registry
            .register_call(Call::new(2, 9, Direction::Down, 0))
            .expect("register far");
        let snapshot = world(1, vec![idle_car(0, 5), idle_car(1, 6)]);

        let directives = GreedyNearest::default().assign(&snapshot, &mut registry);

        assert_eq!(registry.claimant_of(1), Some(0));
        assert_eq!(registry.claimant_of(2), Some(1));
        assert_eq!(directives[&1], Directive::GoTo(9));
    }

    #[test]
    fn loaded_car_steers_to_nearest_pressed_floor_without_claiming() {
        let mut registry = CallRegistry::new();
        registry
            .register_call(Call::new(1, 3, Direction::Up, 0))
            .expect("register");
        let mut car = idle_car(0, 5);
        car.pressed_floors = BTreeSet::from([8, 7]);
        car.passenger_count = 2;
        let snapshot = world(1, vec![car]);

        let directives = GreedyNearest::default().assign(&snapshot, &mut registry);

        assert_eq!(directives[&0], Directive::GoTo(7));
        assert_eq!(registry.claimant_of(1), None);
    }

    #[test]
    fn claimed_origin_competes_with_pressed_floors() {
        let mut registry = CallRegistry::new();
        registry
            .register_call(Call::new(1, 4, Direction::Up, 0))
            .expect("register");
        registry.claim(1, 0, 0).expect("claim");
        let mut car = idle_car(0, 5);
        car.pressed_floors = BTreeSet::from([9]);
        let snapshot = world(1, vec![car]);

        let directives = GreedyNearest::default().assign(&snapshot, &mut registry);

        assert_eq!(directives[&0], Directive::GoTo(4));
    }

    #[test]
    fn parked_car_gets_explicit_no_change() {
        let mut registry = CallRegistry::new();
        let snapshot = world(1, vec![idle_car(0, 0), idle_car(1, 3)]);

        let directives = GreedyNearest::default().assign(&snapshot, &mut registry);

        assert_eq!(directives[&0], Directive::NoChange);
        assert_eq!(directives[&1], Directive::GoTo(0));
    }

    #[test]
    fn configured_home_overrides_lowest_floor() {
        let mut registry = CallRegistry::new();
        let snapshot = world(1, vec![idle_car(0, 0)]);

        let directives = GreedyNearest::new(Some(1)).assign(&snapshot, &mut registry);

        assert_eq!(directives[&0], Directive::GoTo(1));
    }
}
