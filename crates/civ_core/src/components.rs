//! Shared identifiers and small value types.
//!
//! These are plain data with no behavior beyond simple invariants, shared by
//! the ledger, the civilization controller and unit entities.

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, Fixed};

/// Unique identifier for unit entities within a match.
pub type UnitId = u64;

/// Identifier of a participant (one connected player).
pub type ParticipantId = u64;

/// Team identifier. Units on the same team never target each other.
pub type TeamId = u8;

/// Simulation time in ticks since the match started.
pub type Tick = u64;

/// Unit archetype. Selects the base stat table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UnitType {
    /// Gathers resources and constructs buildings. Never auto-attacks.
    Worker,
    /// Close-range infantry.
    Melee,
    /// Long-range infantry.
    Ranged,
    /// Slow, hard-hitting artillery.
    Siege,
    /// Fast, lightly armed, wide sight.
    Scout,
    /// Civilization-specific hero unit.
    Special,
}

impl UnitType {
    /// All unit types in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Worker,
        Self::Melee,
        Self::Ranged,
        Self::Siege,
        Self::Scout,
        Self::Special,
    ];

    /// Whether idle units of this type search for enemies on their own.
    #[must_use]
    pub const fn auto_acquires_targets(self) -> bool {
        !matches!(self, Self::Worker)
    }

    /// Whether this type can take gather and build orders.
    #[must_use]
    pub const fn is_worker(self) -> bool {
        matches!(self, Self::Worker)
    }
}

/// Ownership assigned once by the authority at spawn.
///
/// Immutable after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ownership {
    owner: ParticipantId,
    team: TeamId,
}

impl Ownership {
    /// Bind a unit to its owner and team.
    #[must_use]
    pub const fn new(owner: ParticipantId, team: TeamId) -> Self {
        Self { owner, team }
    }

    /// Owning participant.
    #[must_use]
    pub const fn owner(&self) -> ParticipantId {
        self.owner
    }

    /// Owning team.
    #[must_use]
    pub const fn team(&self) -> TeamId {
        self.team
    }

    /// Whether two owners are on opposing teams.
    #[must_use]
    pub const fn is_enemy_of(&self, other: &Self) -> bool {
        self.team != other.team
    }
}

/// Health component for damageable units.
///
/// `current` always stays within `[0, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Health {
    /// Current health points.
    #[serde(with = "fixed_serde")]
    current: Fixed,
    /// Maximum health points.
    #[serde(with = "fixed_serde")]
    max: Fixed,
}

impl Health {
    /// Create new health at full.
    #[must_use]
    pub fn new(max: Fixed) -> Self {
        let max = max.max(Fixed::ZERO);
        Self { current: max, max }
    }

    /// Current health points.
    #[must_use]
    pub const fn current(&self) -> Fixed {
        self.current
    }

    /// Maximum health points.
    #[must_use]
    pub const fn max(&self) -> Fixed {
        self.max
    }

    /// Whether health has reached zero.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.current <= Fixed::ZERO
    }

    /// Apply damage, returning the amount actually removed.
    ///
    /// Negative amounts are ignored; health never drops below zero.
    pub fn apply_damage(&mut self, amount: Fixed) -> Fixed {
        let amount = amount.max(Fixed::ZERO);
        let actual = amount.min(self.current);
        self.current -= actual;
        actual
    }

    /// Heal, returning the amount actually restored. Never exceeds `max`.
    pub fn heal(&mut self, amount: Fixed) -> Fixed {
        let headroom = self.max - self.current;
        let actual = amount.max(Fixed::ZERO).min(headroom);
        self.current += actual;
        actual
    }
}
