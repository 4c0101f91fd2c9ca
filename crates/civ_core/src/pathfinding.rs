//! Navigation interface consumed by unit movement.
//!
//! The match never plans routes itself. It tells a [`Pathfinder`] where a
//! unit wants to go, asks how far is left, and asks for the next position
//! each tick. [`DirectPathfinder`] walks straight lines and is what the
//! core uses when the host supplies nothing better.

use std::collections::BTreeMap;

use crate::components::UnitId;
use crate::math::{Fixed, Vec2Fixed};

/// Per-unit navigation service.
pub trait Pathfinder: Send {
    /// Route `unit` from `from` toward `to`, replacing any previous route.
    fn set_destination(&mut self, unit: UnitId, from: Vec2Fixed, to: Vec2Fixed);

    /// Forget the route of `unit`.
    fn clear(&mut self, unit: UnitId);

    /// Distance left along the route, or `None` when no route is set.
    fn remaining_distance(&self, unit: UnitId, position: Vec2Fixed) -> Option<Fixed>;

    /// Position after moving at most `step` along the route.
    ///
    /// Returns `position` unchanged when no route is set.
    fn advance(&mut self, unit: UnitId, position: Vec2Fixed, step: Fixed) -> Vec2Fixed;
}

/// Straight-line navigation with optional waypoints.
#[derive(Debug, Clone, Default)]
pub struct DirectPathfinder {
    routes: BTreeMap<UnitId, Vec<Vec2Fixed>>,
}

impl DirectPathfinder {
    /// An empty pathfinder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `unit` through `waypoints` in order.
    pub fn set_route(&mut self, unit: UnitId, waypoints: Vec<Vec2Fixed>) {
        if waypoints.is_empty() {
            self.routes.remove(&unit);
        } else {
            self.routes.insert(unit, waypoints);
        }
    }

    /// Number of units with a route.
    #[must_use]
    pub fn active_routes(&self) -> usize {
        self.routes.len()
    }
}

impl Pathfinder for DirectPathfinder {
    fn set_destination(&mut self, unit: UnitId, _from: Vec2Fixed, to: Vec2Fixed) {
        self.routes.insert(unit, vec![to]);
    }

    fn clear(&mut self, unit: UnitId) {
        self.routes.remove(&unit);
    }

    fn remaining_distance(&self, unit: UnitId, position: Vec2Fixed) -> Option<Fixed> {
        let route = self.routes.get(&unit)?;
        let mut total = Fixed::ZERO;
        let mut from = position;
        for &waypoint in route {
            total = total.saturating_add(from.distance(waypoint));
            from = waypoint;
        }
        Some(total)
    }

    fn advance(&mut self, unit: UnitId, position: Vec2Fixed, step: Fixed) -> Vec2Fixed {
        let Some(route) = self.routes.get_mut(&unit) else {
            return position;
        };

        let mut current = position;
        let mut budget = step.max(Fixed::ZERO);
        while let Some(&next) = route.first() {
            let leg = current.distance(next);
            if leg > budget {
                return current.move_towards(next, budget);
            }
            budget -= leg;
            current = next;
            if route.len() == 1 {
                // Keep the final waypoint so remaining distance reads zero.
                break;
            }
            route.remove(0);
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_route() {
        let mut nav = DirectPathfinder::new();
        let start = Vec2Fixed::ZERO;
        let goal = Vec2Fixed::from_ints(10, 0);

        assert_eq!(nav.remaining_distance(1, start), None);
        assert_eq!(nav.advance(1, start, Fixed::ONE), start);

        nav.set_destination(1, start, goal);
        let pos = nav.advance(1, start, Fixed::from_num(4));
        assert_eq!(pos, Vec2Fixed::from_ints(4, 0));
        assert_eq!(nav.remaining_distance(1, pos), Some(Fixed::from_num(6)));

        let pos = nav.advance(1, pos, Fixed::from_num(100));
        assert_eq!(pos, goal);
        assert_eq!(nav.remaining_distance(1, pos), Some(Fixed::ZERO));

        nav.clear(1);
        assert_eq!(nav.active_routes(), 0);
    }

    #[test]
    fn test_waypoints_are_followed_in_order() {
        let mut nav = DirectPathfinder::new();
        nav.set_route(
            7,
            vec![Vec2Fixed::from_ints(3, 0), Vec2Fixed::from_ints(3, 4)],
        );
        let start = Vec2Fixed::ZERO;
        assert_eq!(nav.remaining_distance(7, start), Some(Fixed::from_num(7)));

        let pos = nav.advance(7, start, Fixed::from_num(5));
        assert_eq!(pos, Vec2Fixed::from_ints(3, 2));
        let pos = nav.advance(7, pos, Fixed::from_num(5));
        assert_eq!(pos, Vec2Fixed::from_ints(3, 4));
    }
}
