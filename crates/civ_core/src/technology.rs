//! Technology research.
//!
//! Research is a stored deadline. Starting research spends the (discounted)
//! cost and records when it completes; [`TechTree::update`] applies the
//! effects once the tick loop reaches that deadline.

use serde::{Deserialize, Serialize};

use crate::components::Tick;
use crate::data::TechnologyData;
use crate::error::{GameError, Result};
use crate::math::{scale_duration, secs_to_ticks};
use crate::modifiers::{ModifierKind, ModifierRegistry};
use crate::resources::{ResourceBundle, ResourceLedger};

/// Progress of a single technology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResearchStatus {
    /// Not started.
    Available,
    /// Research running.
    InProgress {
        /// Tick research began.
        started: Tick,
        /// Tick research completes.
        completes_at: Tick,
    },
    /// Effects applied.
    Researched,
}

/// A technology and its research status.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Technology {
    /// Static definition.
    pub data: TechnologyData,
    /// Current status.
    pub status: ResearchStatus,
}

/// All technologies of one civilization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TechTree {
    techs: Vec<Technology>,
    tick_rate: u32,
}

impl TechTree {
    /// Build a tree with nothing researched.
    #[must_use]
    pub fn new(definitions: Vec<TechnologyData>, tick_rate: u32) -> Self {
        Self {
            techs: definitions
                .into_iter()
                .map(|data| Technology {
                    data,
                    status: ResearchStatus::Available,
                })
                .collect(),
            tick_rate,
        }
    }

    /// All technologies in definition order.
    #[must_use]
    pub fn technologies(&self) -> &[Technology] {
        &self.techs
    }

    /// Look up a technology by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Technology> {
        self.techs.iter().find(|t| t.data.name == name)
    }

    /// Whether `name` has finished researching.
    #[must_use]
    pub fn is_researched(&self, name: &str) -> bool {
        self.get(name)
            .is_some_and(|t| t.status == ResearchStatus::Researched)
    }

    /// Cost of `name` after the tech cost modifier.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::UnknownTechnology`] if no such technology exists.
    pub fn cost_of(&self, name: &str, registry: &ModifierRegistry) -> Result<ResourceBundle> {
        let tech = self
            .get(name)
            .ok_or_else(|| GameError::UnknownTechnology(name.to_string()))?;
        Ok(tech
            .data
            .cost
            .scaled(registry.get(ModifierKind::TechCostReduction)))
    }

    /// Begin researching `name` at `now`, returning the completion tick.
    ///
    /// # Errors
    ///
    /// Fails without side effects if the technology is unknown, already
    /// researched, in progress, missing a prerequisite, or unaffordable.
    pub fn start(
        &mut self,
        name: &str,
        now: Tick,
        registry: &ModifierRegistry,
        ledger: &mut ResourceLedger,
    ) -> Result<Tick> {
        let cost = self.cost_of(name, registry)?;
        let index = self
            .techs
            .iter()
            .position(|t| t.data.name == name)
            .ok_or_else(|| GameError::UnknownTechnology(name.to_string()))?;

        match self.techs[index].status {
            ResearchStatus::Researched => {
                return Err(GameError::AlreadyResearched(name.to_string()));
            }
            ResearchStatus::InProgress { .. } => {
                return Err(GameError::ResearchInProgress(name.to_string()))
            }
            ResearchStatus::Available => {}
        }

        if let Some(missing) = self.techs[index]
            .data
            .prerequisites
            .iter()
            .find(|p| !self.is_researched(p))
        {
            return Err(GameError::TechRequirementNotMet(format!(
                "'{name}' requires '{missing}'"
            )));
        }

        ledger.spend(&cost)?;

        let base_ticks = secs_to_ticks(self.techs[index].data.research_secs, self.tick_rate);
        let speed = registry.get(ModifierKind::ResearchSpeed);
        let completes_at = now.saturating_add(scale_duration(base_ticks, speed));
        self.techs[index].status = ResearchStatus::InProgress {
            started: now,
            completes_at,
        };

        tracing::info!(tech = name, tick = now, completes_at, "Research started");
        Ok(completes_at)
    }

    /// Complete every research whose deadline has passed, applying effects.
    ///
    /// Returns the names completed this call, in definition order.
    pub fn update(&mut self, now: Tick, registry: &mut ModifierRegistry) -> Vec<String> {
        let mut completed = Vec::new();
        for tech in &mut self.techs {
            if let ResearchStatus::InProgress { completes_at, .. } = tech.status {
                if now >= completes_at {
                    for effect in &tech.data.effects {
                        effect.apply(registry);
                    }
                    tech.status = ResearchStatus::Researched;
                    tracing::info!(tech = %tech.data.name, tick = now, "Research completed");
                    completed.push(tech.data.name.clone());
                }
            }
        }
        completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TechEffect;
    use crate::math::percent;
    use crate::resources::ResourceKind;

    fn tree() -> TechTree {
        TechTree::new(
            vec![
                TechnologyData {
                    name: "Basics".to_string(),
                    cost: ResourceBundle::from_pairs(&[(ResourceKind::Gold, 100)]),
                    research_secs: 3,
                    prerequisites: vec![],
                    effects: vec![TechEffect::Scale {
                        kind: ModifierKind::UnitDamage,
                        percent: 110,
                    }],
                },
                TechnologyData {
                    name: "Advanced Basics".to_string(),
                    cost: ResourceBundle::from_pairs(&[(ResourceKind::Gold, 100)]),
                    research_secs: 3,
                    prerequisites: vec!["Basics".to_string()],
                    effects: vec![TechEffect::Add {
                        kind: ModifierKind::StrategicPlanning,
                        percent: 10,
                    }],
                },
            ],
            20,
        )
    }

    fn ledger() -> ResourceLedger {
        ResourceLedger::new(ResourceBundle::from_pairs(&[(ResourceKind::Gold, 1000)]))
    }

    #[test]
    fn test_research_lifecycle() {
        let mut tree = tree();
        let mut registry = ModifierRegistry::new();
        let mut ledger = ledger();

        let done = tree.start("Basics", 10, &registry, &mut ledger).unwrap();
        assert_eq!(done, 70);
        assert_eq!(ledger.get(ResourceKind::Gold), 900);
        assert_eq!(
            tree.start("Basics", 11, &registry, &mut ledger),
            Err(GameError::ResearchInProgress("Basics".to_string()))
        );

        assert!(tree.update(69, &mut registry).is_empty());
        assert_eq!(tree.update(70, &mut registry), vec!["Basics".to_string()]);
        assert_eq!(registry.get(ModifierKind::UnitDamage), percent(110));
        assert!(tree.is_researched("Basics"));

        assert_eq!(
            tree.start("Basics", 80, &registry, &mut ledger),
            Err(GameError::AlreadyResearched("Basics".to_string()))
        );
        assert_eq!(ledger.get(ResourceKind::Gold), 900);
    }

    #[test]
    fn test_prerequisites_and_unknown() {
        let mut tree = tree();
        let registry = ModifierRegistry::new();
        let mut ledger = ledger();

        assert!(matches!(
            tree.start("Advanced Basics", 0, &registry, &mut ledger),
            Err(GameError::TechRequirementNotMet(_))
        ));
        assert_eq!(
            tree.start("Alchemy", 0, &registry, &mut ledger),
            Err(GameError::UnknownTechnology("Alchemy".to_string()))
        );
        assert_eq!(ledger.get(ResourceKind::Gold), 1000);
    }

    #[test]
    fn test_speed_and_cost_modifiers() {
        let mut tree = tree();
        let mut registry = ModifierRegistry::new();
        registry.set_baseline(ModifierKind::ResearchSpeed, percent(200));
        registry.set_baseline(ModifierKind::TechCostReduction, percent(80));
        let mut ledger = ledger();

        let done = tree.start("Basics", 0, &registry, &mut ledger).unwrap();
        assert_eq!(done, 30);
        assert_eq!(ledger.get(ResourceKind::Gold), 920);
    }

    #[test]
    fn test_unaffordable_research_does_not_start() {
        let mut tree = tree();
        let registry = ModifierRegistry::new();
        let mut ledger = ResourceLedger::new(ResourceBundle::EMPTY);

        assert!(matches!(
            tree.start("Basics", 0, &registry, &mut ledger),
            Err(GameError::InsufficientResources { .. })
        ));
        assert_eq!(tree.get("Basics").map(|t| t.status), Some(ResearchStatus::Available));
    }
}
