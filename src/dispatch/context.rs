//! Per-run dispatch state and the work done for a single tick.

use crate::events::{TickEvents, diff_snapshots};
use crate::metrics::MetricsAggregator;
use crate::policy::model::{AssignmentPolicy, Directive, DirectiveSet};
use crate::registry::{Call, CallRegistry, RegistryError};
use crate::simulator::{Simulator, SimulatorError};
use crate::world::{ElevatorId, Floor, PassengerId, Tick, WorldSnapshot};
use std::collections::BTreeMap;
use tracing::{debug, trace, warn};

/// What one processed tick produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub tick: Tick,
    pub directives: DirectiveSet,
    pub complete: bool,
}

/// Everything a run accumulates. A new run starts from a new context.
#[derive(Debug)]
pub struct DispatchContext {
    policy: Box<dyn AssignmentPolicy>,
    registry: CallRegistry,
    metrics: MetricsAggregator,
    last_snapshot: Option<WorldSnapshot>,
    last_issued: BTreeMap<ElevatorId, Floor>,
    ticks_processed: u64,
}

impl DispatchContext {
    pub fn new(policy: Box<dyn AssignmentPolicy>) -> Self {
        Self {
            policy,
            registry: CallRegistry::new(),
            metrics: MetricsAggregator::new(),
            last_snapshot: None,
            last_issued: BTreeMap::new(),
            ticks_processed: 0,
        }
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    pub fn registry(&self) -> &CallRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> &MetricsAggregator {
        &self.metrics
    }

    pub fn last_snapshot(&self) -> Option<&WorldSnapshot> {
        self.last_snapshot.as_ref()
    }

    pub fn ticks_processed(&self) -> u64 {
        self.ticks_processed
    }

    /// Process one tick against `simulator`.
    ///
    /// The fetched snapshot is committed as soon as its events are ingested,
    /// so retrying after a failed submit or step does not ingest the same
    /// events twice.
    pub fn run_tick<S>(&mut self, simulator: &mut S) -> Result<TickReport, SimulatorError>
    where
        S: Simulator + ?Sized,
    {
        let snapshot = simulator.fetch_state()?;
        let events = diff_snapshots(self.last_snapshot.as_ref(), &snapshot);
        if !events.is_empty() {
            trace!(
                tick = snapshot.tick,
                calls = events.calls.len(),
                pickups = events.pickups.len(),
                deliveries = events.deliveries.len(),
                "Ingesting tick events"
            );
        }
        self.ingest(&events);
        self.last_snapshot = Some(snapshot.clone());

        if simulator.is_run_complete(&snapshot) {
            return Ok(TickReport {
                tick: snapshot.tick,
                directives: DirectiveSet::new(),
                complete: true,
            });
        }

        self.release_full_cars(&snapshot);
        let proposed = self.policy.assign(&snapshot, &mut self.registry);
        let directives = self.collapse_repeats(&snapshot, proposed);
        self.submit(simulator, &directives)?;

        simulator.step(1)?;
        self.ticks_processed += 1;

        Ok(TickReport {
            tick: snapshot.tick,
            directives,
            complete: false,
        })
    }

    fn ingest(&mut self, events: &TickEvents) {
        for event in &events.calls {
            let call = Call::new(event.passenger_id, event.origin, event.direction, event.tick)
                .with_destination(event.destination);
            match self.registry.register_call(call) {
                Ok(()) => {}
                Err(RegistryError::DuplicateCall(passenger_id)) => {
                    trace!(passenger_id, "Ignoring duplicate call");
                }
                Err(err) => self.drop_inconsistent(event.passenger_id, &err),
            }
        }

        for event in &events.pickups {
            match self
                .registry
                .mark_picked_up(event.passenger_id, event.elevator_id, event.tick)
            {
                Ok(call) => {
                    let wait = event.tick.saturating_sub(call.created_tick);
                    self.metrics.record_floor_wait(wait);
                }
                Err(err) => self.drop_inconsistent(event.passenger_id, &err),
            }
        }

        for event in &events.deliveries {
            match self.registry.mark_delivered(event.passenger_id, event.tick) {
                Ok(call) => {
                    let wait = event.tick.saturating_sub(call.created_tick);
                    self.metrics.record_arrival_wait(wait);
                }
                Err(err) => self.drop_inconsistent(event.passenger_id, &err),
            }
        }
    }

    fn drop_inconsistent(&mut self, passenger_id: PassengerId, err: &RegistryError) {
        warn!(passenger_id, error = %err, "Dropping call after inconsistent event");
        self.registry.drop_call(passenger_id);
    }

    fn release_full_cars(&mut self, snapshot: &WorldSnapshot) {
        for elevator in snapshot.elevators.iter().filter(|elevator| elevator.is_full()) {
            self.registry.release_unassigned(elevator.id);
        }
    }

    /// Re-issuing the target a car is already travelling to collapses to
    /// `NoChange`.
    fn collapse_repeats(&self, snapshot: &WorldSnapshot, proposed: DirectiveSet) -> DirectiveSet {
        proposed
            .into_iter()
            .map(|(elevator_id, directive)| {
                let Directive::GoTo(floor) = directive else {
                    return (elevator_id, directive);
                };
                let already_issued = self.last_issued.get(&elevator_id) == Some(&floor);
                let underway = snapshot
                    .elevator(elevator_id)
                    .is_some_and(|elevator| elevator.target_floor == Some(floor));
                if already_issued && underway {
                    (elevator_id, Directive::NoChange)
                } else {
                    (elevator_id, directive)
                }
            })
            .collect()
    }

    /// Submit every directive. A failure for one elevator does not stop the
    /// others; the first transient failure is returned after all were tried.
    fn submit<S>(&mut self, simulator: &mut S, directives: &DirectiveSet) -> Result<(), SimulatorError>
    where
        S: Simulator + ?Sized,
    {
        let mut transient = None;
        for (&elevator_id, &directive) in directives {
            match simulator.submit_directive(elevator_id, directive) {
                Ok(()) => {
                    if let Directive::GoTo(floor) = directive {
                        debug!(elevator_id, floor, "Directive issued");
                        self.last_issued.insert(elevator_id, floor);
                    }
                }
                Err(err) if err.is_transient() => {
                    warn!(elevator_id, error = %err, "Directive submission failed");
                    self.last_issued.remove(&elevator_id);
                    transient.get_or_insert(err);
                }
                Err(err) => {
                    warn!(elevator_id, directive = ?directive, error = %err, "Directive rejected");
                    self.last_issued.remove(&elevator_id);
                }
            }
        }
        match transient {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
