//! Targeting and damage resolution.
//!
//! Target search goes through the [`SpatialQuery`] trait so that hosts can
//! plug in a grid or tree. [`SpatialSnapshot`] is the built-in brute-force
//! implementation, rebuilt once per tick from the unit table.

use serde::{Deserialize, Serialize};

use crate::components::{TeamId, UnitId};
use crate::math::{Fixed, Vec2Fixed};

/// Damage dealt by one attack: `max(1, damage - armor)`.
///
/// A hit always removes at least one point, even when armor exceeds the
/// raw damage.
#[must_use]
pub fn calculate_damage(attack_damage: Fixed, armor: Fixed) -> Fixed {
    attack_damage.saturating_sub(armor).max(Fixed::ONE)
}

/// What targeting needs to know about a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetInfo {
    /// Unit identifier.
    pub id: UnitId,
    /// World position.
    pub position: Vec2Fixed,
    /// Owning team.
    pub team: TeamId,
    /// Whether the unit is alive.
    pub alive: bool,
}

impl TargetInfo {
    /// Whether this unit is a valid target for `team`.
    #[must_use]
    pub const fn is_enemy_of(&self, team: TeamId) -> bool {
        self.alive && self.team != team
    }
}

/// Spatial lookup consumed by unit state machines.
pub trait SpatialQuery {
    /// Nearest living unit not on `team` within `radius` of `position`.
    ///
    /// Ties are broken by first-found order.
    fn nearest_enemy_in_radius(
        &self,
        position: Vec2Fixed,
        radius: Fixed,
        team: TeamId,
    ) -> Option<UnitId>;

    /// Current targeting info for `id`, if the unit still exists.
    fn lookup(&self, id: UnitId) -> Option<TargetInfo>;
}

/// Linear-scan [`SpatialQuery`] over a sorted snapshot of units.
#[derive(Debug, Clone, Default)]
pub struct SpatialSnapshot {
    entries: Vec<TargetInfo>,
}

impl SpatialSnapshot {
    /// Build a snapshot. Entries are sorted by id for stable tie-breaking.
    #[must_use]
    pub fn new(mut entries: Vec<TargetInfo>) -> Self {
        entries.sort_by_key(|e| e.id);
        Self { entries }
    }

    /// Number of units in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the snapshot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record a death so later lookups this tick see it.
    pub fn mark_dead(&mut self, id: UnitId) {
        if let Ok(i) = self.entries.binary_search_by_key(&id, |e| e.id) {
            self.entries[i].alive = false;
        }
    }

    /// Record a move so later lookups this tick see it.
    pub fn update_position(&mut self, id: UnitId, position: Vec2Fixed) {
        if let Ok(i) = self.entries.binary_search_by_key(&id, |e| e.id) {
            self.entries[i].position = position;
        }
    }
}

impl SpatialQuery for SpatialSnapshot {
    fn nearest_enemy_in_radius(
        &self,
        position: Vec2Fixed,
        radius: Fixed,
        team: TeamId,
    ) -> Option<UnitId> {
        let radius_sq = radius.saturating_mul(radius);
        let mut best: Option<(Fixed, UnitId)> = None;

        for entry in self.entries.iter().filter(|e| e.is_enemy_of(team)) {
            let dist_sq = position.distance_squared(entry.position);
            if dist_sq > radius_sq {
                continue;
            }
            // Strict comparison keeps the first-found candidate on ties.
            if best.map_or(true, |(d, _)| dist_sq < d) {
                best = Some((dist_sq, entry.id));
            }
        }

        best.map(|(_, id)| id)
    }

    fn lookup(&self, id: UnitId) -> Option<TargetInfo> {
        self.entries
            .binary_search_by_key(&id, |e| e.id)
            .ok()
            .map(|i| self.entries[i])
    }
}

/// One resolved attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DamageEvent {
    /// Attacking unit.
    pub attacker: UnitId,
    /// Unit hit.
    pub target: UnitId,
    /// Health actually removed.
    #[serde(with = "crate::math::fixed_serde")]
    pub amount: Fixed,
    /// Whether the hit was lethal.
    pub killed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: UnitId, x: i32, y: i32, team: TeamId) -> TargetInfo {
        TargetInfo {
            id,
            position: Vec2Fixed::from_ints(x, y),
            team,
            alive: true,
        }
    }

    #[test]
    fn test_damage_floor() {
        let dmg = calculate_damage(Fixed::from_num(10), Fixed::from_num(15));
        assert_eq!(dmg, Fixed::ONE);
        let dmg = calculate_damage(Fixed::from_num(10), Fixed::from_num(10));
        assert_eq!(dmg, Fixed::ONE);
        let dmg = calculate_damage(Fixed::from_num(25), Fixed::from_num(5));
        assert_eq!(dmg, Fixed::from_num(20));
    }

    #[test]
    fn test_nearest_enemy_skips_allies_and_dead() {
        let mut snapshot = SpatialSnapshot::new(vec![
            info(1, 0, 0, 0),
            info(2, 1, 0, 0),
            info(3, 4, 0, 1),
            info(4, 2, 0, 1),
            info(5, 30, 0, 1),
        ]);
        let origin = Vec2Fixed::ZERO;
        let sight = Fixed::from_num(10);

        assert_eq!(snapshot.nearest_enemy_in_radius(origin, sight, 0), Some(4));
        snapshot.mark_dead(4);
        assert_eq!(snapshot.nearest_enemy_in_radius(origin, sight, 0), Some(3));
        snapshot.mark_dead(3);
        assert_eq!(snapshot.nearest_enemy_in_radius(origin, sight, 0), None);
    }

    #[test]
    fn test_ties_keep_first_found() {
        let snapshot = SpatialSnapshot::new(vec![info(9, 0, 3, 1), info(7, 3, 0, 1)]);
        let found = snapshot.nearest_enemy_in_radius(Vec2Fixed::ZERO, Fixed::from_num(5), 0);
        assert_eq!(found, Some(7));
    }

    #[test]
    fn test_lookup_and_move() {
        let mut snapshot = SpatialSnapshot::new(vec![info(2, 0, 0, 1)]);
        snapshot.update_position(2, Vec2Fixed::from_ints(6, 0));
        let found = snapshot.lookup(2).unwrap();
        assert_eq!(found.position, Vec2Fixed::from_ints(6, 0));
        assert!(snapshot.lookup(3).is_none());
    }
}
