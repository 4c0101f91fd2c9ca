//! Civilization types and the per-participant civilization controller.
//!
//! The controller owns a participant's [`ModifierRegistry`] and drives the
//! ability, plan and research timers. It is advanced once per tick, before
//! any unit runs, so that units always read current modifier values.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::abilities::{Ability, AbilityState, AbilityTransition};
use crate::components::Tick;
use crate::data::CivilizationData;
use crate::error::{GameError, Result};
use crate::math::{percent, Fixed};
use crate::modifiers::{ModifierKind, ModifierRegistry, ModifierSet};
use crate::plans::{effectiveness, Plan, PlanBoard, PlanLimits, PlanType};
use crate::resources::{ResourceBundle, ResourceLedger};
use crate::technology::TechTree;

/// The sixteen playable civilizations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CivilizationType {
    /// The Architects.
    Intj,
    /// The Logicians.
    Intp,
    /// The Commanders.
    Entj,
    /// The Debaters.
    Entp,
    /// The Advocates.
    Infj,
    /// The Mediators.
    Infp,
    /// The Protagonists.
    Enfj,
    /// The Campaigners.
    Enfp,
    /// The Logisticians.
    Istj,
    /// The Defenders.
    Isfj,
    /// The Executives.
    Estj,
    /// The Consuls.
    Esfj,
    /// The Virtuosos.
    Istp,
    /// The Adventurers.
    Isfp,
    /// The Entrepreneurs.
    Estp,
    /// The Entertainers.
    Esfp,
}

impl CivilizationType {
    /// Every civilization.
    pub const ALL: [Self; 16] = [
        Self::Intj,
        Self::Intp,
        Self::Entj,
        Self::Entp,
        Self::Infj,
        Self::Infp,
        Self::Enfj,
        Self::Enfp,
        Self::Istj,
        Self::Isfj,
        Self::Estj,
        Self::Esfj,
        Self::Istp,
        Self::Isfp,
        Self::Estp,
        Self::Esfp,
    ];

    /// Four-letter code, e.g. `"INTJ"`.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Intj => "INTJ",
            Self::Intp => "INTP",
            Self::Entj => "ENTJ",
            Self::Entp => "ENTP",
            Self::Infj => "INFJ",
            Self::Infp => "INFP",
            Self::Enfj => "ENFJ",
            Self::Enfp => "ENFP",
            Self::Istj => "ISTJ",
            Self::Isfj => "ISFJ",
            Self::Estj => "ESTJ",
            Self::Esfj => "ESFJ",
            Self::Istp => "ISTP",
            Self::Isfp => "ISFP",
            Self::Estp => "ESTP",
            Self::Esfp => "ESFP",
        }
    }
}

impl fmt::Display for CivilizationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for CivilizationType {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|civ| civ.code().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| GameError::DataParseError {
                source_name: "civilization code".to_string(),
                message: format!("unknown civilization '{s}'"),
            })
    }
}

/// Timer transitions observed during one controller tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerEvents {
    /// Ability transitions, in order.
    pub ability: Vec<AbilityTransition>,
    /// Plans that expired.
    pub expired_plans: Vec<PlanType>,
    /// Technologies that completed.
    pub researched: Vec<String>,
}

impl ControllerEvents {
    /// Whether nothing happened.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ability.is_empty() && self.expired_plans.is_empty() && self.researched.is_empty()
    }
}

/// Per-participant civilization state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CivilizationController {
    civilization: CivilizationType,
    name: String,
    registry: ModifierRegistry,
    ability: Ability,
    plans: PlanBoard,
    techs: TechTree,
}

impl CivilizationController {
    /// Build a controller from a profile, writing every bonus as a baseline.
    #[must_use]
    pub fn new(data: &CivilizationData, plan_limits: PlanLimits, tick_rate: u32) -> Self {
        let mut registry = ModifierRegistry::new();
        for (kind, value) in data
            .bonuses
            .entries()
            .into_iter()
            .chain(data.extra_modifiers.iter().copied())
        {
            registry.set_baseline(kind, percent(value));
        }

        Self {
            civilization: data.civilization,
            name: data.name.clone(),
            registry,
            ability: Ability::new(data.ability.clone(), tick_rate),
            plans: PlanBoard::new(plan_limits),
            techs: TechTree::new(data.technologies.clone(), tick_rate),
        }
    }

    /// Civilization type.
    #[must_use]
    pub const fn civilization(&self) -> CivilizationType {
        self.civilization
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Modifier registry.
    #[must_use]
    pub const fn registry(&self) -> &ModifierRegistry {
        &self.registry
    }

    /// Mutable modifier registry, for effects installed from outside.
    pub fn registry_mut(&mut self) -> &mut ModifierRegistry {
        &mut self.registry
    }

    /// Current value of one modifier.
    #[must_use]
    pub fn modifier(&self, kind: ModifierKind) -> Fixed {
        self.registry.get(kind)
    }

    /// The special ability.
    #[must_use]
    pub const fn ability(&self) -> &Ability {
        &self.ability
    }

    /// Current ability state.
    #[must_use]
    pub const fn ability_state(&self) -> AbilityState {
        self.ability.state()
    }

    /// Live plans.
    #[must_use]
    pub fn plans(&self) -> &[Plan] {
        self.plans.plans()
    }

    /// Tech tree.
    #[must_use]
    pub const fn tech_tree(&self) -> &TechTree {
        &self.techs
    }

    /// Activate the ability at `now`, returning resources to credit.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::CooldownActive`] unless the ability is ready.
    pub fn activate_ability(&mut self, now: Tick) -> Result<ResourceBundle> {
        self.ability.activate(now, &mut self.registry)
    }

    /// End the ability early.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidState`] if the ability is not active.
    pub fn deactivate_ability(&mut self, now: Tick) -> Result<ModifierSet> {
        self.ability.deactivate(now, &mut self.registry)
    }

    /// Effectiveness a plan created now would get.
    #[must_use]
    pub fn plan_effectiveness(&self) -> Fixed {
        effectiveness(
            self.registry.get(ModifierKind::StrategicPlanning),
            self.ability.is_active(),
        )
    }

    /// Create a strategic plan at `now`.
    ///
    /// # Errors
    ///
    /// [`GameError::CapacityExceeded`] or [`GameError::CooldownActive`].
    pub fn create_plan(&mut self, plan_type: PlanType, now: Tick) -> Result<Plan> {
        let effectiveness = self.plan_effectiveness();
        self.plans
            .create(plan_type, now, effectiveness, &mut self.registry)
    }

    /// Start researching `name`, spending its cost from `ledger`.
    ///
    /// # Errors
    ///
    /// See [`TechTree::start`].
    pub fn start_research(
        &mut self,
        name: &str,
        now: Tick,
        ledger: &mut ResourceLedger,
    ) -> Result<Tick> {
        self.techs.start(name, now, &self.registry, ledger)
    }

    /// Advance every timer to `now`.
    ///
    /// Ability expiry runs first, then plan purge and refresh, then research.
    pub fn tick(&mut self, now: Tick) -> ControllerEvents {
        let ability = self.ability.update(now, &mut self.registry);
        let expired_plans = self.plans.purge(now, &mut self.registry);
        self.plans.refresh(&mut self.registry);
        let researched = self.techs.update(now, &mut self.registry);

        for plan_type in &expired_plans {
            tracing::info!(
                civ = %self.civilization,
                ?plan_type,
                tick = now,
                "Strategic plan expired"
            );
        }

        ControllerEvents {
            ability,
            expired_plans,
            researched,
        }
    }

    /// Modifier kinds changed since the last call.
    pub fn take_dirty_modifiers(&mut self) -> ModifierSet {
        self.registry.take_dirty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::ResourceKind;

    const RATE: u32 = 20;

    fn limits() -> PlanLimits {
        PlanLimits {
            max_concurrent: 3,
            cooldown_ticks: 120 * 20,
            duration_ticks: 60 * 20,
        }
    }

    fn intj() -> CivilizationController {
        CivilizationController::new(
            &CivilizationData::for_type(CivilizationType::Intj),
            limits(),
            RATE,
        )
    }

    #[test]
    fn test_codes_parse() {
        for civ in CivilizationType::ALL {
            assert_eq!(civ.code().parse::<CivilizationType>().unwrap(), civ);
        }
        assert_eq!("intj".parse::<CivilizationType>().unwrap(), CivilizationType::Intj);
        assert!("XXXX".parse::<CivilizationType>().is_err());
    }

    #[test]
    fn test_initialize_writes_baselines() {
        let civ = intj();
        assert_eq!(civ.modifier(ModifierKind::ResearchSpeed), percent(125));
        assert_eq!(civ.modifier(ModifierKind::UnitProductionSpeed), percent(90));
        assert_eq!(civ.modifier(ModifierKind::ResourceGather), Fixed::ONE);
        assert_eq!(civ.modifier(ModifierKind::TechCostReduction), percent(80));
        assert_eq!(civ.modifier(ModifierKind::InformationWarfare), percent(115));
    }

    #[test]
    fn test_master_plan_scales_and_reverts() {
        let mut civ = intj();
        let baseline = civ.registry().clone();

        civ.activate_ability(0).unwrap();
        assert_eq!(
            civ.modifier(ModifierKind::ResearchSpeed),
            percent(125).saturating_mul(percent(200))
        );
        assert_eq!(civ.activate_ability(1), Err(GameError::CooldownActive));

        civ.tick(30 * 20);
        for kind in ModifierKind::ALL {
            assert_eq!(civ.modifier(kind), baseline.get(kind), "{kind:?}");
        }
        assert!(matches!(civ.ability_state(), AbilityState::Cooldown { .. }));
        assert_eq!(civ.activate_ability(100 * 20), Err(GameError::CooldownActive));
        assert!(civ.activate_ability(300 * 20).is_ok());
    }

    #[test]
    fn test_plan_effectiveness_scales_with_ability() {
        let mut civ = intj();
        let calm = civ.plan_effectiveness();
        civ.activate_ability(0).unwrap();
        assert_eq!(civ.plan_effectiveness(), calm.saturating_mul(percent(150)));
    }

    #[test]
    fn test_plan_layers_under_ability() {
        let mut civ = intj();
        civ.create_plan(PlanType::Economic, 0).unwrap();
        civ.activate_ability(0).unwrap();

        let gather = civ.registry().effects(ModifierKind::ResourceGather);
        assert_eq!(gather.len(), 2);
        assert!(gather[0].id < gather[1].id);

        civ.tick(30 * 20);
        assert_eq!(civ.registry().effects(ModifierKind::ResourceGather).len(), 1);

        let events = civ.tick(60 * 20);
        assert_eq!(events.expired_plans, vec![PlanType::Economic]);
        assert_eq!(civ.modifier(ModifierKind::ResourceGather), Fixed::ONE);
    }

    #[test]
    fn test_research_discounted_and_completed() {
        let mut civ = intj();
        let mut ledger = ResourceLedger::new(ResourceBundle::from_pairs(&[
            (ResourceKind::Gold, 1000),
            (ResourceKind::Wood, 500),
        ]));

        let completes = civ.start_research("Scientific Method", 0, &mut ledger).unwrap();
        // 60 s at 1.25x research speed.
        assert_eq!(completes, 960);
        assert_eq!(ledger.get(ResourceKind::Gold), 920);
        assert_eq!(ledger.get(ResourceKind::Wood), 460);

        let events = civ.tick(960);
        assert_eq!(events.researched, vec!["Scientific Method".to_string()]);
        assert_eq!(
            civ.registry().baseline(ModifierKind::ResearchSpeed),
            percent(125).saturating_mul(percent(110))
        );
    }
}
