//! Assignment policy trait for pluggable dispatch strategies.
//!
//! A policy looks at one world snapshot, claims calls through the
//! [`CallRegistry`], and returns exactly one [`Directive`] per elevator.
//! Policies are selected by name from `[dispatch].policy` at startup.

use crate::registry::CallRegistry;
use crate::world::{ElevatorId, Floor, WorldSnapshot};
use serde::Serialize;
use std::collections::BTreeMap;

/// Controller-to-simulator instruction for one elevator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "floor", rename_all = "snake_case")]
pub enum Directive {
    GoTo(Floor),
    /// Explicit "keep doing what you are doing".
    NoChange,
}

impl Directive {
    pub fn target(self) -> Option<Floor> {
        match self {
            Directive::GoTo(floor) => Some(floor),
            Directive::NoChange => None,
        }
    }
}

pub type DirectiveSet = BTreeMap<ElevatorId, Directive>;

pub trait AssignmentPolicy: Send + Sync + std::fmt::Debug {
    /// Name used in configuration and logs.
    fn name(&self) -> &'static str;

    /// Compute this tick's directives. Every elevator in `world` must receive
    /// an entry, and claims must go through `registry` so that no call is
    /// held by two cars.
    fn assign(&self, world: &WorldSnapshot, registry: &mut CallRegistry) -> DirectiveSet;
}
