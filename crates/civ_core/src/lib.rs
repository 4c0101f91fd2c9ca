//! # Civ Core
//!
//! Authoritative gameplay core for a civilization RTS.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO
//! - No system randomness
//! - No floating-point math (uses fixed-point)
//!
//! This separation enables:
//! - A single authority per match with any number of observers
//! - Headless server builds
//! - Snapshot/restore of running matches
//! - Determinism testing
//!
//! ## Crate Structure
//!
//! - [`resources`] - Per-participant resource ledger
//! - [`modifiers`] - Effect-record modifier registry
//! - [`civilization`] - Civilization controller with [`abilities`], [`plans`] and [`technology`]
//! - [`unit`] - Unit entities and their state machine
//! - [`combat`] - Targeting and damage resolution
//! - [`simulation`] - The per-match context and tick loop
//! - [`replication`] - Authority/observer deltas and intents
//! - [`selection`] - Persisted pre-match selections
//! - [`config`] - Match tunables
//! - [`data`] - Civilization, unit, structure and technology tables
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod abilities;
pub mod civilization;
pub mod combat;
pub mod components;
pub mod config;
pub mod data;
pub mod error;
pub mod math;
pub mod modifiers;
pub mod pathfinding;
pub mod plans;
pub mod production;
pub mod replication;
pub mod resources;
pub mod selection;
pub mod simulation;
pub mod technology;
pub mod unit;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::abilities::{AbilityDescriptor, AbilityEffect, AbilityState};
    pub use crate::civilization::{CivilizationController, CivilizationType};
    pub use crate::combat::{calculate_damage, SpatialQuery};
    pub use crate::components::*;
    pub use crate::config::MatchConfig;
    pub use crate::error::{GameError, Result};
    pub use crate::math::{Fixed, Vec2Fixed};
    pub use crate::modifiers::{EffectId, ModifierKind, ModifierRegistry};
    pub use crate::pathfinding::{DirectPathfinder, Pathfinder};
    pub use crate::plans::{Plan, PlanType};
    pub use crate::replication::{Intent, ObserverMirror, Role, StateDelta};
    pub use crate::resources::{ResourceBundle, ResourceKind, ResourceLedger};
    pub use crate::selection::{MemorySelectionStore, SelectionStore};
    pub use crate::simulation::{Match, TickEvents};
    pub use crate::unit::{Unit, UnitOrder, UnitState};
}
