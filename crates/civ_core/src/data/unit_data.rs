//! Unit data structures for data-driven unit definitions.

use serde::{Deserialize, Serialize};

use crate::components::UnitType;
use crate::math::{fixed_serde, Fixed};
use crate::resources::{ResourceBundle, ResourceKind};

/// Immutable base statistics of a unit type.
///
/// Speeds and ranges are in world units; `speed` is per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitStats {
    /// Maximum health points.
    #[serde(with = "fixed_serde")]
    pub health: Fixed,
    /// Damage per attack.
    #[serde(with = "fixed_serde")]
    pub damage: Fixed,
    /// Flat damage reduction.
    #[serde(with = "fixed_serde")]
    pub armor: Fixed,
    /// Movement speed per second.
    #[serde(with = "fixed_serde")]
    pub speed: Fixed,
    /// Radius in which enemies are noticed.
    #[serde(with = "fixed_serde")]
    pub sight_range: Fixed,
    /// Radius in which the unit can strike.
    #[serde(with = "fixed_serde")]
    pub attack_range: Fixed,
    /// Milliseconds between attacks.
    pub attack_cooldown_ms: u32,
}

impl Default for UnitStats {
    fn default() -> Self {
        Self::from_ints(100, 10, 5, 5, 10, 5, 1000)
    }
}

impl UnitStats {
    /// Build stats from whole numbers.
    #[must_use]
    pub fn from_ints(
        health: i32,
        damage: i32,
        armor: i32,
        speed: i32,
        sight_range: i32,
        attack_range: i32,
        attack_cooldown_ms: u32,
    ) -> Self {
        Self {
            health: Fixed::from_num(health),
            damage: Fixed::from_num(damage),
            armor: Fixed::from_num(armor),
            speed: Fixed::from_num(speed),
            sight_range: Fixed::from_num(sight_range),
            attack_range: Fixed::from_num(attack_range),
            attack_cooldown_ms,
        }
    }
}

/// Data-driven unit definition.
///
/// # Example RON
///
/// ```ron
/// UnitData(
///     unit_type: Scout,
///     stats: UnitStats(
///         health: 300647710720,      // 70.0
///         damage: 25769803776,       // 6.0
///         armor: 8589934592,         // 2.0
///         speed: 38654705664,        // 9.0
///         sight_range: 77309411328,  // 18.0
///         attack_range: 8589934592,  // 2.0
///         attack_cooldown_ms: 1000,
///     ),
///     cost: (amounts: (10, 0, 50, 0, 0, 0)),
///     build_secs: 8,
///     population: 1,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitData {
    /// Archetype this entry describes.
    pub unit_type: UnitType,
    /// Base statistics.
    pub stats: UnitStats,
    /// Training cost.
    pub cost: ResourceBundle,
    /// Training time in seconds at production speed 1.0.
    pub build_secs: u32,
    /// Population slots occupied.
    #[serde(default = "default_population")]
    pub population: u32,
}

const fn default_population() -> u32 {
    1
}

impl UnitData {
    /// Built-in definition for `unit_type`.
    #[must_use]
    pub fn default_for(unit_type: UnitType) -> Self {
        use ResourceKind::{Food, Gold, Wood};

        let (stats, cost, build_secs) = match unit_type {
            UnitType::Worker => (
                UnitStats::from_ints(60, 4, 1, 5, 8, 1, 1000),
                ResourceBundle::from_pairs(&[(Food, 50)]),
                10,
            ),
            UnitType::Melee => (
                UnitStats::from_ints(100, 10, 5, 5, 10, 2, 1000),
                ResourceBundle::from_pairs(&[(Food, 60), (Gold, 20)]),
                10,
            ),
            UnitType::Ranged => (
                UnitStats::from_ints(80, 12, 2, 5, 12, 8, 1500),
                ResourceBundle::from_pairs(&[(Wood, 40), (Gold, 30)]),
                12,
            ),
            UnitType::Siege => (
                UnitStats::from_ints(150, 40, 8, 3, 10, 12, 4000),
                ResourceBundle::from_pairs(&[(Wood, 150), (Gold, 100)]),
                20,
            ),
            UnitType::Scout => (
                UnitStats::from_ints(70, 6, 2, 9, 18, 2, 1000),
                ResourceBundle::from_pairs(&[(Food, 50), (Gold, 10)]),
                8,
            ),
            UnitType::Special => (
                UnitStats::from_ints(300, 25, 10, 6, 14, 5, 1000),
                ResourceBundle::from_pairs(&[(Food, 100), (Gold, 300)]),
                30,
            ),
        };

        Self {
            unit_type,
            stats,
            cost,
            build_secs,
            population: default_population(),
        }
    }
}

/// Unit definitions for every archetype, indexed by [`UnitType`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitCatalog {
    units: Vec<UnitData>,
}

impl Default for UnitCatalog {
    fn default() -> Self {
        Self {
            units: UnitType::ALL.into_iter().map(UnitData::default_for).collect(),
        }
    }
}

impl UnitCatalog {
    /// Definition for `unit_type`, falling back to the built-in table.
    #[must_use]
    pub fn get(&self, unit_type: UnitType) -> UnitData {
        self.units
            .iter()
            .find(|u| u.unit_type == unit_type)
            .cloned()
            .unwrap_or_else(|| UnitData::default_for(unit_type))
    }

    /// Replace or insert a definition.
    pub fn insert(&mut self, data: UnitData) {
        self.units.retain(|u| u.unit_type != data.unit_type);
        self.units.push(data);
    }
}
