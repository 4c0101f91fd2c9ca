//! Error types for the gameplay core.
//!
//! Every variant is a local, recoverable rejection. The caller receives the
//! error and the match keeps ticking.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::components::{ParticipantId, UnitId};
use crate::resources::ResourceKind;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// A single resource shortfall reported by a failed spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Deficit {
    /// The resource that was short.
    pub kind: ResourceKind,
    /// Amount the bundle asked for.
    pub required: u32,
    /// Amount the ledger held at the time of the call.
    pub available: u32,
}

impl std::fmt::Display for Deficit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?} (need {}, have {})",
            self.kind, self.required, self.available
        )
    }
}

fn list_deficits(deficient: &[Deficit]) -> String {
    deficient
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Top-level error type for all gameplay rejections.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    /// A spend could not be covered. Lists every deficient resource.
    #[error("Insufficient resources: {}", list_deficits(.deficient))]
    InsufficientResources {
        /// Every resource that was short at the instant of the call.
        deficient: Vec<Deficit>,
    },

    /// Target is missing, dead, or not a valid enemy.
    #[error("Invalid target: {0}")]
    InvalidTarget(UnitId),

    /// A mutating call was attempted by a non-authority role.
    #[error("Mutation rejected: this role is not the match authority")]
    NotAuthority,

    /// An ability or plan was requested before its timer allowed it.
    #[error("Cooldown active")]
    CooldownActive,

    /// A bounded collection is full.
    #[error("Capacity exceeded (limit {limit})")]
    CapacityExceeded {
        /// The configured limit.
        limit: usize,
    },

    /// Research was requested for a technology that is already complete.
    #[error("Technology already researched: {0}")]
    AlreadyResearched(String),

    /// Research was requested for a technology that is still running.
    #[error("Technology research already in progress: {0}")]
    ResearchInProgress(String),

    /// Tech tree requirement not met.
    #[error("Tech requirement not met: {0}")]
    TechRequirementNotMet(String),

    /// No technology with this name exists for the civilization.
    #[error("Unknown technology: {0}")]
    UnknownTechnology(String),

    /// No participant with this identifier has joined the match.
    #[error("Unknown participant: {0}")]
    UnknownParticipant(ParticipantId),

    /// No unit with this identifier exists.
    #[error("Unknown unit: {0}")]
    UnknownUnit(UnitId),

    /// The issuing participant does not own the unit.
    #[error("Participant {participant} does not own unit {unit}")]
    NotOwner {
        /// Participant that issued the order.
        participant: ParticipantId,
        /// Unit the order was addressed to.
        unit: UnitId,
    },

    /// The unit is dead and accepts no further orders.
    #[error("Unit {0} is dead")]
    UnitDead(UnitId),

    /// The order is not valid for this unit.
    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    /// Data file parsing error.
    #[error("Failed to parse data '{source_name}': {message}")]
    DataParseError {
        /// Name of the data source that failed to parse.
        source_name: String,
        /// Error message.
        message: String,
    },

    /// Invalid game state.
    #[error("Invalid game state: {0}")]
    InvalidState(String),
}

impl GameError {
    /// Short machine-friendly tag, used when reporting rejected intents.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::InsufficientResources { .. } => "insufficient_resources",
            Self::InvalidTarget(_) => "invalid_target",
            Self::NotAuthority => "not_authority",
            Self::CooldownActive => "cooldown_active",
            Self::CapacityExceeded { .. } => "capacity_exceeded",
            Self::AlreadyResearched(_) => "already_researched",
            Self::ResearchInProgress(_) => "research_in_progress",
            Self::TechRequirementNotMet(_) => "tech_requirement_not_met",
            Self::UnknownTechnology(_) => "unknown_technology",
            Self::UnknownParticipant(_) => "unknown_participant",
            Self::UnknownUnit(_) => "unknown_unit",
            Self::NotOwner { .. } => "not_owner",
            Self::UnitDead(_) => "unit_dead",
            Self::InvalidOrder(_) => "invalid_order",
            Self::DataParseError { .. } => "data_parse_error",
            Self::InvalidState(_) => "invalid_state",
        }
    }
}
