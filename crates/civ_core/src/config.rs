//! Match configuration.
//!
//! All durations are stored in wall-clock units (seconds, or milliseconds
//! for attack cooldowns) and converted to ticks with [`MatchConfig::ticks`]
//! or [`crate::math::millis_to_ticks`], so a RON file never depends on the
//! tick rate.

use serde::{Deserialize, Serialize};

use crate::components::Tick;
use crate::data::{StructureCatalog, UnitCatalog};
use crate::error::{GameError, Result};
use crate::math::{fixed_serde, tenths, Fixed};
use crate::plans::PlanLimits;
use crate::production::ProductionQueue;
use crate::resources::StartingResources;

/// Default simulation rate.
pub const DEFAULT_TICK_RATE: u32 = 20;

/// Strategic plan limits, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanConfig {
    /// Maximum concurrent plans.
    pub max_concurrent: usize,
    /// Shared cooldown; plans are spaced by `cooldown / max_concurrent`.
    pub cooldown_secs: u32,
    /// Lifetime of a plan.
    pub duration_secs: u32,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            cooldown_secs: 120,
            duration_secs: 60,
        }
    }
}

/// Tunables for one match.
///
/// # Example RON
///
/// ```ron
/// MatchConfig(
///     tick_rate: 20,
///     starting_resources: (gold: 1000, wood: 500, food: 500, stone: 200, population_cap: 200),
///     plans: (max_concurrent: 3, cooldown_secs: 120, duration_secs: 60),
///     death_removal_secs: 2,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Simulation ticks per second.
    pub tick_rate: u32,
    /// Ledger contents on join.
    pub starting_resources: StartingResources,
    /// Strategic plan limits.
    pub plans: PlanConfig,
    /// How long a dead unit lingers before removal.
    pub death_removal_secs: u32,
    /// Remaining distance under which a move order completes.
    #[serde(with = "fixed_serde")]
    pub arrival_threshold: Fixed,
    /// Maximum concurrent training orders per participant.
    pub max_training_orders: usize,
    /// Unit stat tables.
    pub units: UnitCatalog,
    /// Structures workers may build, by name.
    pub structures: StructureCatalog,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            tick_rate: DEFAULT_TICK_RATE,
            starting_resources: StartingResources::default(),
            plans: PlanConfig::default(),
            death_removal_secs: 2,
            arrival_threshold: tenths(1),
            max_training_orders: ProductionQueue::DEFAULT_MAX_LEN,
            units: UnitCatalog::default(),
            structures: StructureCatalog::default(),
        }
    }
}

impl MatchConfig {
    /// Parse a config from RON text. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::DataParseError`] on malformed input, or
    /// [`GameError::InvalidState`] for a zero tick rate.
    pub fn from_ron(source: &str) -> Result<Self> {
        let config: Self = ron::from_str(source).map_err(|e| GameError::DataParseError {
            source_name: "match config".to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the simulation cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidState`] describing the first problem.
    pub fn validate(&self) -> Result<()> {
        if self.tick_rate == 0 {
            return Err(GameError::InvalidState("tick_rate must be positive".to_string()));
        }
        if self.plans.max_concurrent == 0 {
            return Err(GameError::InvalidState(
                "plans.max_concurrent must be positive".to_string(),
            ));
        }
        if let Some(problem) = self.structures.validate().into_iter().next() {
            return Err(GameError::InvalidState(format!("structures: {problem}")));
        }
        Ok(())
    }

    /// Convert seconds to ticks at this config's rate.
    #[must_use]
    pub fn ticks(&self, secs: u32) -> Tick {
        Tick::from(secs) * Tick::from(self.tick_rate)
    }

    /// Plan limits in ticks.
    #[must_use]
    pub fn plan_limits(&self) -> PlanLimits {
        PlanLimits {
            max_concurrent: self.plans.max_concurrent,
            cooldown_ticks: self.ticks(self.plans.cooldown_secs),
            duration_ticks: self.ticks(self.plans.duration_secs),
        }
    }

    /// Death removal delay in ticks.
    #[must_use]
    pub fn death_removal_ticks(&self) -> Tick {
        self.ticks(self.death_removal_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MatchConfig::default();
        assert_eq!(config.tick_rate, 20);
        assert_eq!(config.starting_resources.gold, 1000);
        assert_eq!(config.plan_limits().min_interval(), 800);
        assert_eq!(config.plan_limits().duration_ticks, 1200);
        assert_eq!(config.death_removal_ticks(), 40);
    }

    #[test]
    fn test_partial_ron_uses_defaults() {
        let config = MatchConfig::from_ron("(tick_rate: 10, plans: (max_concurrent: 2))").unwrap();
        assert_eq!(config.tick_rate, 10);
        assert_eq!(config.plans.max_concurrent, 2);
        assert_eq!(config.plans.cooldown_secs, 120);
        assert_eq!(config.starting_resources.wood, 500);
    }

    #[test]
    fn test_zero_tick_rate_rejected() {
        assert!(matches!(
            MatchConfig::from_ron("(tick_rate: 0)"),
            Err(GameError::InvalidState(_))
        ));
        assert!(matches!(
            MatchConfig::from_ron("(tick_rate: "),
            Err(GameError::DataParseError { .. })
        ));
    }

    #[test]
    fn test_structure_table_override() {
        let config = MatchConfig::from_ron(
            r#"(structures: [(
                name: "House",
                cost: (amounts: (0, 300, 0, 0, 0, 0)),
                build_secs: 5,
                population_cap_bonus: 5,
            )])"#,
        )
        .unwrap();
        assert_eq!(config.structures.len(), 1);
        assert_eq!(config.structures.get("House").unwrap().population_cap_bonus, 5);
        assert!(config.structures.get("Barracks").is_none());

        let duplicated = MatchConfig::from_ron(
            r#"(structures: [
                (name: "Hut", cost: (amounts: (0, 1, 0, 0, 0, 0)), build_secs: 1),
                (name: "Hut", cost: (amounts: (0, 2, 0, 0, 0, 0)), build_secs: 1),
            ])"#,
        );
        assert!(matches!(duplicated, Err(GameError::InvalidState(msg)) if msg.contains("Hut")));
    }
}
