//! Capacity-aware variant of the greedy nearest policy.
//!
//! Idle cars behave exactly as in [`GreedyNearest`](super::greedy_nearest::GreedyNearest).
//! In addition, a car that is already carrying passengers may claim
//! unclaimed calls that lie ahead of it, in its direction of travel and no
//! further than its farthest in-car floor, as long as its load plus its open
//! claims stays below capacity.

use crate::policy::greedy_nearest::{
    Candidate, elevators_by_id, nearest_served_target, park, rank_candidates, try_claim,
    unclaimed_candidates,
};
use crate::policy::model::{AssignmentPolicy, Directive, DirectiveSet};
use crate::registry::CallRegistry;
use crate::world::{Direction, ElevatorView, Floor, Tick, WorldSnapshot};

#[derive(Debug, Clone)]
pub struct CapacityAware {
    pub idle_home: Option<Floor>,
    /// Lowers the capacity reported by the simulator when set. It never
    /// raises it; a reported capacity of zero means unknown.
    pub max_capacity: Option<u32>,
}

impl CapacityAware {
    pub fn new(idle_home: Option<Floor>, max_capacity: Option<u32>) -> Self {
        Self {
            idle_home,
            max_capacity,
        }
    }

    fn capacity_of(&self, elevator: &ElevatorView) -> u32 {
        match (self.max_capacity, elevator.max_capacity) {
            (Some(limit), 0) => limit,
            (Some(limit), reported) => limit.min(reported),
            (None, 0) => u32::MAX,
            (None, reported) => reported,
        }
    }

    fn has_room(&self, elevator: &ElevatorView, registry: &CallRegistry) -> bool {
        let committed = elevator.passenger_count as usize + registry.pending_for(elevator.id).len();
        committed < self.capacity_of(elevator) as usize
    }

    fn claim_en_route(
        &self,
        elevator: &ElevatorView,
        candidates: &[Candidate],
        registry: &mut CallRegistry,
        tick: Tick,
    ) {
        let Some(heading) = heading(elevator) else {
            return;
        };
        let Some(limit) = farthest_pressed(elevator, heading) else {
            return;
        };

        let mut ahead: Vec<Candidate> = candidates
            .iter()
            .filter(|candidate| candidate.direction == heading)
            .filter(|candidate| lies_ahead(elevator, heading, candidate.origin, limit))
            .copied()
            .collect();
        rank_candidates(elevator, &mut ahead);

        for candidate in &ahead {
            if !self.has_room(elevator, registry) {
                break;
            }
            try_claim(elevator, std::iter::once(candidate), registry, tick);
        }
    }
}

impl AssignmentPolicy for CapacityAware {
    fn name(&self) -> &'static str {
        "capacity_aware"
    }

    fn assign(&self, world: &WorldSnapshot, registry: &mut CallRegistry) -> DirectiveSet {
        let home = self.idle_home.or_else(|| world.lowest_floor());
        let candidates = unclaimed_candidates(registry);
        let mut directives = DirectiveSet::new();

        for elevator in elevators_by_id(world) {
            if !elevator.pressed_floors.is_empty() {
                self.claim_en_route(elevator, &candidates, registry, world.tick);
            }

            let directive = match nearest_served_target(elevator, registry) {
                Some(target) => Directive::GoTo(target),
                None if self.has_room(elevator, registry) => {
                    let mut ranked = candidates.clone();
                    rank_candidates(elevator, &mut ranked);
                    match try_claim(elevator, &ranked, registry, world.tick) {
                        Some(origin) => Directive::GoTo(origin),
                        None => park(elevator, home),
                    }
                }
                None => park(elevator, home),
            };
            directives.insert(elevator.id, directive);
        }

        directives
    }
}

fn heading(elevator: &ElevatorView) -> Option<Direction> {
    match elevator.direction {
        Direction::Up | Direction::Down => Some(elevator.direction),
        Direction::Stopped => {
            let next = elevator.pressed_floors.iter().copied().min_by(|a, b| {
                elevator
                    .distance_to(*a)
                    .total_cmp(&elevator.distance_to(*b))
            })?;
            let next = f64::from(next);
            if next > elevator.position {
                Some(Direction::Up)
            } else if next < elevator.position {
                Some(Direction::Down)
            } else {
                None
            }
        }
    }
}

fn farthest_pressed(elevator: &ElevatorView, heading: Direction) -> Option<Floor> {
    match heading {
        Direction::Up => elevator.pressed_floors.last().copied(),
        Direction::Down => elevator.pressed_floors.first().copied(),
        Direction::Stopped => None,
    }
}

fn lies_ahead(elevator: &ElevatorView, heading: Direction, origin: Floor, limit: Floor) -> bool {
    let origin_f = f64::from(origin);
    match heading {
        Direction::Up => origin_f > elevator.position && origin <= limit,
        Direction::Down => origin_f < elevator.position && origin >= limit,
        Direction::Stopped => false,
    }
}
