//! Bookkeeping of passenger calls and which car has claimed them.
//!
//! The registry is the single source of truth for "who serves whom": every
//! call lives in `calls`, and a call that is currently claimed also appears in
//! exactly one elevator's entry of the claim index.

use crate::world::{Direction, ElevatorId, Floor, PassengerId, Tick};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Unassigned,
    Assigned { elevator_id: ElevatorId, tick: Tick },
    PickedUp { elevator_id: Option<ElevatorId>, tick: Tick },
    Delivered { tick: Tick },
}

impl CallState {
    fn label(&self) -> &'static str {
        match self {
            CallState::Unassigned => "unassigned",
            CallState::Assigned { .. } => "assigned",
            CallState::PickedUp { .. } => "picked_up",
            CallState::Delivered { .. } => "delivered",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub passenger_id: PassengerId,
    pub origin: Floor,
    pub destination: Option<Floor>,
    pub direction: Direction,
    pub created_tick: Tick,
    pub state: CallState,
}

impl Call {
    pub fn new(
        passenger_id: PassengerId,
        origin: Floor,
        direction: Direction,
        created_tick: Tick,
    ) -> Self {
        Self {
            passenger_id,
            origin,
            destination: None,
            direction,
            created_tick,
            state: CallState::Unassigned,
        }
    }

    pub fn with_destination(mut self, destination: Floor) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn is_unassigned(&self) -> bool {
        matches!(self.state, CallState::Unassigned)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("call {0} is already registered")]
    DuplicateCall(PassengerId),
    #[error("call {call_id} is already claimed by elevator {holder}")]
    AlreadyClaimed {
        call_id: PassengerId,
        holder: ElevatorId,
    },
    #[error("call {0} is not registered")]
    UnknownCall(PassengerId),
    #[error("call {call_id} cannot move from {from} to {to}")]
    InvalidTransition {
        call_id: PassengerId,
        from: &'static str,
        to: &'static str,
    },
}

#[derive(Debug, Default)]
pub struct CallRegistry {
    calls: BTreeMap<PassengerId, Call>,
    // Insertion order doubles as assignment-tick order.
    claims: BTreeMap<ElevatorId, Vec<PassengerId>>,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn register_call(&mut self, call: Call) -> Result<(), RegistryError> {
        if let Some(existing) = self.calls.get(&call.passenger_id)
            && !matches!(existing.state, CallState::Delivered { .. })
        {
            return Err(RegistryError::DuplicateCall(call.passenger_id));
        }
        debug!(
            passenger_id = call.passenger_id,
            origin = call.origin,
            direction = ?call.direction,
            created_tick = call.created_tick,
            "Call registered"
        );
        self.calls.insert(call.passenger_id, call);
        Ok(())
    }

    pub fn claim(
        &mut self,
        call_id: PassengerId,
        elevator_id: ElevatorId,
        tick: Tick,
    ) -> Result<(), RegistryError> {
        let call = self
            .calls
            .get_mut(&call_id)
            .ok_or(RegistryError::UnknownCall(call_id))?;

        match call.state {
            CallState::Unassigned => {
                call.state = CallState::Assigned { elevator_id, tick };
                self.claims.entry(elevator_id).or_default().push(call_id);
                Ok(())
            }
            CallState::Assigned { elevator_id: holder, .. } if holder == elevator_id => Ok(()),
            CallState::Assigned { elevator_id: holder, .. } => {
                Err(RegistryError::AlreadyClaimed { call_id, holder })
            }
            other => Err(RegistryError::InvalidTransition {
                call_id,
                from: other.label(),
                to: "assigned",
            }),
        }
    }

    /// Records that `elevator_id` boarded the passenger. A car may board a
    /// passenger it never claimed; any claim held by another car is dropped.
    /// An unattributed pickup still completes the claim.
    pub fn mark_picked_up(
        &mut self,
        call_id: PassengerId,
        elevator_id: Option<ElevatorId>,
        tick: Tick,
    ) -> Result<&Call, RegistryError> {
        let previous = self
            .calls
            .get(&call_id)
            .ok_or(RegistryError::UnknownCall(call_id))?
            .state;

        match previous {
            CallState::Unassigned => {}
            CallState::Assigned { elevator_id: holder, .. } => {
                self.remove_claim(holder, call_id);
            }
            other => {
                return Err(RegistryError::InvalidTransition {
                    call_id,
                    from: other.label(),
                    to: "picked_up",
                });
            }
        }

        let call = self
            .calls
            .get_mut(&call_id)
            .ok_or(RegistryError::UnknownCall(call_id))?;
        call.state = CallState::PickedUp { elevator_id, tick };
        Ok(call)
    }

    /// Completes the call and removes it from the registry.
    pub fn mark_delivered(
        &mut self,
        call_id: PassengerId,
        tick: Tick,
    ) -> Result<Call, RegistryError> {
        let call = self
            .calls
            .get(&call_id)
            .ok_or(RegistryError::UnknownCall(call_id))?;
        if !matches!(call.state, CallState::PickedUp { .. }) {
            return Err(RegistryError::InvalidTransition {
                call_id,
                from: call.state.label(),
                to: "delivered",
            });
        }

        let mut call = self
            .calls
            .remove(&call_id)
            .ok_or(RegistryError::UnknownCall(call_id))?;
        call.state = CallState::Delivered { tick };
        Ok(call)
    }

    /// Returns every call still claimed (not yet boarded) by `elevator_id` to
    /// the unclaimed pool. Each call is released at most once.
    pub fn release_unassigned(&mut self, elevator_id: ElevatorId) -> Vec<PassengerId> {
        let released = self.claims.remove(&elevator_id).unwrap_or_default();
        for call_id in &released {
            if let Some(call) = self.calls.get_mut(call_id) {
                call.state = CallState::Unassigned;
            }
        }
        if !released.is_empty() {
            warn!(
                elevator_id,
                released = ?released,
                "Elevator released its claimed calls"
            );
        }
        released
    }

    pub fn pending_for(&self, elevator_id: ElevatorId) -> Vec<&Call> {
        self.claims
            .get(&elevator_id)
            .map(|ids| ids.iter().filter_map(|id| self.calls.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn unclaimed(&self) -> impl Iterator<Item = &Call> {
        self.calls.values().filter(|call| call.is_unassigned())
    }

    pub fn claimant_of(&self, call_id: PassengerId) -> Option<ElevatorId> {
        match self.calls.get(&call_id)?.state {
            CallState::Assigned { elevator_id, .. } => Some(elevator_id),
            _ => None,
        }
    }

    pub fn claimed_len(&self) -> usize {
        self.claims.values().map(Vec::len).sum()
    }

    /// Number of elevators whose claim index lists `call_id`.
    pub fn claim_holders(&self, call_id: PassengerId) -> usize {
        self.claims
            .values()
            .filter(|ids| ids.contains(&call_id))
            .count()
    }

    /// Removes a call after an inconsistency between the registry and the
    /// simulator was detected.
    pub fn drop_call(&mut self, call_id: PassengerId) -> Option<Call> {
        let call = self.calls.remove(&call_id)?;
        if let CallState::Assigned { elevator_id, .. } = call.state {
            self.remove_claim(elevator_id, call_id);
        }
        Some(call)
    }

    fn remove_claim(&mut self, elevator_id: ElevatorId, call_id: PassengerId) {
        if let Some(ids) = self.claims.get_mut(&elevator_id) {
            ids.retain(|id| *id != call_id);
            if ids.is_empty() {
                self.claims.remove(&elevator_id);
            }
        }
    }
}
