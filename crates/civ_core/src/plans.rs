//! Strategic plans.
//!
//! A plan is a time-bounded effect bundle. While live, each plan writes a
//! type-specific multiplier into a disjoint subset of modifier kinds under
//! [`EffectId::Plan`]. At most one plan of each type is live: a newer plan
//! of the same type replaces the older one.

use serde::{Deserialize, Serialize};

use crate::components::Tick;
use crate::error::{GameError, Result};
use crate::math::{fixed_serde, percent, Fixed};
use crate::modifiers::{EffectId, ModifierKind, ModifierRegistry, ModifierSet};

/// The four plan families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PlanType {
    /// Boosts gathering.
    Economic,
    /// Boosts damage and unit production.
    Military,
    /// Boosts research.
    Tech,
    /// Boosts armor and construction.
    Defensive,
}

impl PlanType {
    /// All plan types.
    pub const ALL: [Self; 4] = [Self::Economic, Self::Military, Self::Tech, Self::Defensive];

    /// Modifier kinds this plan writes, with their coefficient as a percentage.
    ///
    /// Every plan contributes a `1 + coefficient × effectiveness` factor on
    /// top of the kind's baseline. For [`PlanType::Tech`] this multiplies the
    /// civilization's research bonus instead of replacing it, so a 1.25
    /// baseline under a Tech plan at effectiveness 1.0 reads `1.25 × 1.3`.
    #[must_use]
    pub const fn coefficients(self) -> &'static [(ModifierKind, i32)] {
        match self {
            Self::Economic => &[(ModifierKind::ResourceGather, 20)],
            Self::Military => &[
                (ModifierKind::UnitDamage, 15),
                (ModifierKind::UnitProductionSpeed, 10),
            ],
            Self::Tech => &[(ModifierKind::ResearchSpeed, 30)],
            Self::Defensive => &[
                (ModifierKind::UnitDefense, 25),
                (ModifierKind::ConstructionSpeed, 15),
            ],
        }
    }
}

/// Plan effectiveness from the current strategic planning value.
///
/// `1 + 0.2 × planning`, scaled by 1.5 while the ability is active.
#[must_use]
pub fn effectiveness(planning: Fixed, ability_active: bool) -> Fixed {
    let base = Fixed::ONE.saturating_add(percent(20).saturating_mul(planning));
    if ability_active {
        base.saturating_mul(percent(150))
    } else {
        base
    }
}

/// A live plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Plan {
    /// Plan family.
    pub plan_type: PlanType,
    /// Tick the plan was created.
    pub started: Tick,
    /// Tick the plan expires.
    pub ends: Tick,
    /// Effectiveness fixed at creation.
    #[serde(with = "fixed_serde")]
    pub effectiveness: Fixed,
}

impl Plan {
    /// Multipliers this plan contributes, `1 + coefficient × effectiveness`.
    pub fn factors(&self) -> impl Iterator<Item = (ModifierKind, Fixed)> + '_ {
        self.plan_type.coefficients().iter().map(|&(kind, coef)| {
            let scaled = percent(coef).saturating_mul(self.effectiveness);
            (kind, Fixed::ONE.saturating_add(scaled))
        })
    }

    fn apply(&self, registry: &mut ModifierRegistry) {
        for (kind, factor) in self.factors() {
            registry.apply_effect(kind, factor, EffectId::Plan(self.plan_type));
        }
    }

    fn revert(&self, registry: &mut ModifierRegistry) -> ModifierSet {
        let mut touched = ModifierSet::EMPTY;
        for &(kind, _) in self.plan_type.coefficients() {
            if registry.revert_effect(kind, EffectId::Plan(self.plan_type)) {
                touched.insert(kind);
            }
        }
        touched
    }
}

/// Plan limits in ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlanLimits {
    /// Maximum concurrent plans.
    pub max_concurrent: usize,
    /// Cooldown budget shared across all plan slots.
    pub cooldown_ticks: Tick,
    /// Lifetime of each plan.
    pub duration_ticks: Tick,
}

impl PlanLimits {
    /// Minimum ticks between two plan creations.
    #[must_use]
    pub fn min_interval(&self) -> Tick {
        match self.max_concurrent {
            0 => self.cooldown_ticks,
            n => self.cooldown_ticks / n as Tick,
        }
    }
}

/// The ordered set of live plans for one civilization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlanBoard {
    limits: PlanLimits,
    plans: Vec<Plan>,
    last_created: Option<Tick>,
}

impl PlanBoard {
    /// An empty board.
    #[must_use]
    pub const fn new(limits: PlanLimits) -> Self {
        Self {
            limits,
            plans: Vec::new(),
            last_created: None,
        }
    }

    /// Live plans in creation order.
    #[must_use]
    pub fn plans(&self) -> &[Plan] {
        &self.plans
    }

    /// Configured limits.
    #[must_use]
    pub const fn limits(&self) -> PlanLimits {
        self.limits
    }

    /// Create a plan at `now`.
    ///
    /// # Errors
    ///
    /// [`GameError::CapacityExceeded`] when the board is full, then
    /// [`GameError::CooldownActive`] when the minimum interval since the
    /// previous creation has not elapsed.
    pub fn create(
        &mut self,
        plan_type: PlanType,
        now: Tick,
        effectiveness: Fixed,
        registry: &mut ModifierRegistry,
    ) -> Result<Plan> {
        self.purge(now, registry);

        if self.plans.len() >= self.limits.max_concurrent {
            return Err(GameError::CapacityExceeded {
                limit: self.limits.max_concurrent,
            });
        }
        if let Some(last) = self.last_created {
            if now < last.saturating_add(self.limits.min_interval()) {
                return Err(GameError::CooldownActive);
            }
        }

        self.plans.retain(|p| p.plan_type != plan_type);
        let plan = Plan {
            plan_type,
            started: now,
            ends: now.saturating_add(self.limits.duration_ticks),
            effectiveness,
        };
        plan.apply(registry);
        self.plans.push(plan);
        self.last_created = Some(now);

        tracing::info!(?plan_type, tick = now, ends = plan.ends, "Strategic plan created");
        Ok(plan)
    }

    /// Drop plans whose end tick has passed, reverting their effects.
    pub fn purge(&mut self, now: Tick, registry: &mut ModifierRegistry) -> Vec<PlanType> {
        let mut expired = Vec::new();
        self.plans.retain(|plan| {
            if now >= plan.ends {
                plan.revert(registry);
                expired.push(plan.plan_type);
                false
            } else {
                true
            }
        });
        expired
    }

    /// Re-write every live plan's factors into the registry.
    pub fn refresh(&self, registry: &mut ModifierRegistry) {
        for plan in &self.plans {
            plan.apply(registry);
        }
    }

    /// Revert every live plan and clear the board.
    pub fn clear(&mut self, registry: &mut ModifierRegistry) -> ModifierSet {
        let touched = self
            .plans
            .iter()
            .fold(ModifierSet::EMPTY, |acc, plan| acc.union(plan.revert(registry)));
        self.plans.clear();
        touched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> PlanLimits {
        PlanLimits {
            max_concurrent: 3,
            cooldown_ticks: 120,
            duration_ticks: 60,
        }
    }

    #[test]
    fn test_effectiveness() {
        assert_eq!(effectiveness(Fixed::ONE, false), percent(120));
        assert_eq!(
            effectiveness(Fixed::ONE, true),
            percent(120).saturating_mul(percent(150))
        );
    }

    #[test]
    fn test_plan_factors() {
        let mut registry = ModifierRegistry::new();
        let mut board = PlanBoard::new(limits());
        board
            .create(PlanType::Military, 0, Fixed::ONE, &mut registry)
            .unwrap();
        assert_eq!(registry.get(ModifierKind::UnitDamage), percent(115));
        assert_eq!(registry.get(ModifierKind::UnitProductionSpeed), percent(110));
        assert_eq!(registry.get(ModifierKind::ResearchSpeed), Fixed::ONE);
    }

    #[test]
    fn test_tech_plan_scales_research_baseline() {
        let mut registry = ModifierRegistry::new();
        registry.set_baseline(ModifierKind::ResearchSpeed, percent(125));
        let mut board = PlanBoard::new(limits());
        let plan = board
            .create(PlanType::Tech, 0, Fixed::ONE, &mut registry)
            .unwrap();

        let factors: Vec<_> = plan.factors().collect();
        assert_eq!(factors, vec![(ModifierKind::ResearchSpeed, percent(130))]);
        assert_eq!(
            registry.get(ModifierKind::ResearchSpeed),
            percent(125).saturating_mul(percent(130))
        );

        board.purge(60, &mut registry);
        assert_eq!(registry.get(ModifierKind::ResearchSpeed), percent(125));
    }

    #[test]
    fn test_interval_then_capacity() {
        let mut registry = ModifierRegistry::new();
        let mut board = PlanBoard::new(PlanLimits {
            duration_ticks: 1000,
            ..limits()
        });

        board.create(PlanType::Economic, 0, Fixed::ONE, &mut registry).unwrap();
        assert_eq!(
            board.create(PlanType::Tech, 39, Fixed::ONE, &mut registry),
            Err(GameError::CooldownActive)
        );
        board.create(PlanType::Tech, 40, Fixed::ONE, &mut registry).unwrap();
        board.create(PlanType::Defensive, 80, Fixed::ONE, &mut registry).unwrap();
        assert_eq!(
            board.create(PlanType::Military, 500, Fixed::ONE, &mut registry),
            Err(GameError::CapacityExceeded { limit: 3 })
        );
    }

    #[test]
    fn test_same_type_overwrites() {
        let mut registry = ModifierRegistry::new();
        let mut board = PlanBoard::new(PlanLimits {
            duration_ticks: 1000,
            ..limits()
        });
        board.create(PlanType::Economic, 0, Fixed::ONE, &mut registry).unwrap();
        board
            .create(PlanType::Economic, 40, Fixed::from_num(2), &mut registry)
            .unwrap();

        assert_eq!(board.plans().len(), 1);
        assert_eq!(registry.get(ModifierKind::ResourceGather), percent(140));
        assert_eq!(registry.effects(ModifierKind::ResourceGather).len(), 1);
    }

    #[test]
    fn test_purge_reverts() {
        let mut registry = ModifierRegistry::new();
        let mut board = PlanBoard::new(limits());
        board.create(PlanType::Defensive, 0, Fixed::ONE, &mut registry).unwrap();

        assert!(board.purge(59, &mut registry).is_empty());
        assert_eq!(board.purge(60, &mut registry), vec![PlanType::Defensive]);
        assert_eq!(registry.get(ModifierKind::UnitDefense), Fixed::ONE);
        assert_eq!(registry.get(ModifierKind::ConstructionSpeed), Fixed::ONE);
    }
}
