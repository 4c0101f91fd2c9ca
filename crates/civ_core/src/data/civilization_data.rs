//! Civilization profiles: bonus tables, ability descriptors and tech trees.

use serde::{Deserialize, Serialize};

use super::tech_data::{TechEffect, TechnologyData};
use crate::abilities::{AbilityDescriptor, AbilityEffect};
use crate::civilization::CivilizationType;
use crate::error::{GameError, Result};
use crate::modifiers::ModifierKind;
use crate::resources::{ResourceBundle, ResourceKind};

/// The nine civilization bonus ratios, as whole percentages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct BonusTable {
    /// Worker gather rate.
    pub resource_gather: i32,
    /// Unit training speed.
    pub unit_production_speed: i32,
    /// Construction speed.
    pub construction_speed: i32,
    /// Research speed.
    pub research_speed: i32,
    /// Unit damage.
    pub unit_damage: i32,
    /// Unit armor.
    pub unit_defense: i32,
    /// Unit movement speed.
    pub unit_speed: i32,
    /// Economic yield.
    pub economic_efficiency: i32,
    /// Sight range.
    pub vision_range: i32,
}

impl Default for BonusTable {
    fn default() -> Self {
        Self::from_array([100; 9])
    }
}

impl BonusTable {
    /// Build a table from values in [`ModifierKind::BONUS_KINDS`] order.
    #[must_use]
    pub const fn from_array(values: [i32; 9]) -> Self {
        Self {
            resource_gather: values[0],
            unit_production_speed: values[1],
            construction_speed: values[2],
            research_speed: values[3],
            unit_damage: values[4],
            unit_defense: values[5],
            unit_speed: values[6],
            economic_efficiency: values[7],
            vision_range: values[8],
        }
    }

    /// Every ratio paired with the modifier it initializes.
    #[must_use]
    pub const fn entries(&self) -> [(ModifierKind, i32); 9] {
        [
            (ModifierKind::ResourceGather, self.resource_gather),
            (ModifierKind::UnitProductionSpeed, self.unit_production_speed),
            (ModifierKind::ConstructionSpeed, self.construction_speed),
            (ModifierKind::ResearchSpeed, self.research_speed),
            (ModifierKind::UnitDamage, self.unit_damage),
            (ModifierKind::UnitDefense, self.unit_defense),
            (ModifierKind::UnitSpeed, self.unit_speed),
            (ModifierKind::EconomicEfficiency, self.economic_efficiency),
            (ModifierKind::VisionRange, self.vision_range),
        ]
    }
}

/// Complete civilization definition.
///
/// # Example RON
///
/// ```ron
/// CivilizationData(
///     civilization: Intj,
///     name: "The Architects",
///     tagline: "Every move planned ten turns ahead.",
///     bonuses: (research_speed: 125, vision_range: 120),
///     extra_modifiers: [(TechCostReduction, 80)],
///     ability: (
///         name: "Master Plan",
///         duration_secs: 30,
///         cooldown_secs: 300,
///         effects: [Scale(kind: ResearchSpeed, percent: 200)],
///     ),
///     technologies: [],
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CivilizationData {
    /// Which civilization this profile describes.
    pub civilization: CivilizationType,
    /// Display name.
    pub name: String,
    /// One-line flavor text.
    #[serde(default)]
    pub tagline: String,
    /// Baseline ratios for the nine bonus kinds.
    #[serde(default)]
    pub bonuses: BonusTable,
    /// Baselines for kinds outside the bonus table, as percentages.
    #[serde(default)]
    pub extra_modifiers: Vec<(ModifierKind, i32)>,
    /// Special ability.
    pub ability: AbilityDescriptor,
    /// Researchable technologies.
    #[serde(default)]
    pub technologies: Vec<TechnologyData>,
}

fn scale(kind: ModifierKind, percent: i32) -> AbilityEffect {
    AbilityEffect::Scale { kind, percent }
}

fn ability(
    name: &str,
    duration_secs: u32,
    cooldown_secs: u32,
    effects: Vec<AbilityEffect>,
) -> AbilityDescriptor {
    AbilityDescriptor {
        name: name.to_string(),
        duration_secs,
        cooldown_secs,
        effects,
    }
}

fn tech(
    name: &str,
    cost: &[(ResourceKind, u32)],
    research_secs: u32,
    prerequisites: &[&str],
    effects: Vec<TechEffect>,
) -> TechnologyData {
    TechnologyData {
        name: name.to_string(),
        cost: ResourceBundle::from_pairs(cost),
        research_secs,
        prerequisites: prerequisites.iter().map(|p| (*p).to_string()).collect(),
        effects,
    }
}

/// Technologies shared by every built-in civilization.
#[must_use]
pub fn standard_technologies() -> Vec<TechnologyData> {
    use ModifierKind::{
        ConstructionSpeed, EconomicEfficiency, ResearchSpeed, ResourceGather, StrategicPlanning,
        UnitDamage, UnitDefense,
    };
    use ResourceKind::{Food, Gold, Stone, Wood};

    let boost = |kind, percent| TechEffect::Scale { kind, percent };
    let add = |kind, percent| TechEffect::Add { kind, percent };

    vec![
        tech(
            "Scientific Method",
            &[(Gold, 100), (Wood, 50)],
            60,
            &[],
            vec![boost(ResearchSpeed, 110)],
        ),
        tech(
            "Advanced Analytics",
            &[(Gold, 200), (Stone, 100)],
            90,
            &["Scientific Method"],
            vec![boost(ResearchSpeed, 110), boost(StrategicPlanning, 110)],
        ),
        tech(
            "Quantum Logistics",
            &[(Gold, 300), (Stone, 200)],
            120,
            &["Advanced Analytics"],
            vec![boost(EconomicEfficiency, 115), boost(StrategicPlanning, 110)],
        ),
        tech(
            "Forged Weapons",
            &[(Gold, 150), (Wood, 100)],
            60,
            &[],
            vec![boost(UnitDamage, 110)],
        ),
        tech(
            "Masonry",
            &[(Stone, 150)],
            45,
            &[],
            vec![add(UnitDefense, 10), boost(ConstructionSpeed, 115)],
        ),
        tech(
            "Crop Rotation",
            &[(Wood, 100), (Food, 50)],
            45,
            &[],
            vec![boost(ResourceGather, 110)],
        ),
    ]
}

impl CivilizationData {
    /// Built-in profile for `civilization`.
    #[must_use]
    pub fn for_type(civilization: CivilizationType) -> Self {
        use CivilizationType as C;
        use ModifierKind::{
            ConstructionSpeed, EconomicEfficiency, InformationWarfare, ResearchSpeed,
            ResourceGather, StrategicPlanning, TechCostReduction, UnitDamage, UnitDefense,
            UnitProductionSpeed, UnitSpeed, VisionRange,
        };

        let grant = |resource, amount| AbilityEffect::Grant { resource, amount };

        let (name, tagline, bonuses, extra, ability): (_, _, _, Vec<(ModifierKind, i32)>, _) =
            match civilization {
                C::Intj => (
                    "The Architects",
                    "Every move planned ten turns ahead.",
                    [100, 90, 110, 125, 105, 110, 95, 115, 120],
                    vec![
                        (TechCostReduction, 80),
                        (StrategicPlanning, 100),
                        (InformationWarfare, 115),
                    ],
                    ability(
                        "Master Plan",
                        30,
                        300,
                        vec![
                            scale(ResourceGather, 150),
                            scale(ResearchSpeed, 200),
                            scale(UnitProductionSpeed, 130),
                            scale(ConstructionSpeed, 140),
                            scale(VisionRange, 150),
                        ],
                    ),
                ),
                C::Intp => (
                    "The Logicians",
                    "A theory for everything.",
                    [95, 95, 100, 135, 100, 100, 100, 105, 110],
                    vec![(TechCostReduction, 85)],
                    ability("Eureka", 20, 240, vec![scale(ResearchSpeed, 300)]),
                ),
                C::Entj => (
                    "The Commanders",
                    "Victory through decisive leadership.",
                    [100, 115, 105, 105, 115, 105, 100, 110, 100],
                    vec![(StrategicPlanning, 110)],
                    ability(
                        "Decisive Campaign",
                        25,
                        240,
                        vec![scale(UnitDamage, 130), scale(UnitProductionSpeed, 150)],
                    ),
                ),
                C::Entp => (
                    "The Debaters",
                    "Rules are a starting point.",
                    [100, 105, 100, 115, 105, 95, 110, 105, 105],
                    vec![],
                    ability(
                        "Disruptive Innovation",
                        20,
                        200,
                        vec![scale(UnitSpeed, 140), scale(ResearchSpeed, 150)],
                    ),
                ),
                C::Infj => (
                    "The Advocates",
                    "They saw it coming.",
                    [100, 100, 105, 110, 95, 115, 100, 105, 130],
                    vec![(InformationWarfare, 125)],
                    ability(
                        "Foresight",
                        30,
                        300,
                        vec![scale(VisionRange, 200), scale(UnitDefense, 130)],
                    ),
                ),
                C::Infp => (
                    "The Mediators",
                    "Harmony is a harvest.",
                    [105, 100, 100, 110, 90, 110, 100, 110, 105],
                    vec![],
                    ability(
                        "Inspiration",
                        30,
                        240,
                        vec![
                            scale(ResourceGather, 140),
                            scale(EconomicEfficiency, 120),
                            grant(ResourceKind::Food, 200),
                        ],
                    ),
                ),
                C::Enfj => (
                    "The Protagonists",
                    "Stronger together.",
                    [100, 110, 100, 100, 105, 110, 105, 105, 100],
                    vec![],
                    ability(
                        "Rally",
                        20,
                        240,
                        vec![
                            scale(UnitDamage, 120),
                            scale(UnitDefense, 120),
                            scale(UnitSpeed, 120),
                        ],
                    ),
                ),
                C::Enfp => (
                    "The Campaigners",
                    "Momentum is everything.",
                    [110, 105, 100, 105, 100, 95, 115, 100, 105],
                    vec![],
                    ability(
                        "Boundless Enthusiasm",
                        25,
                        200,
                        vec![scale(ResourceGather, 130), scale(UnitSpeed, 130)],
                    ),
                ),
                C::Istj => (
                    "The Logisticians",
                    "Nothing wasted, nothing late.",
                    [110, 100, 115, 100, 100, 110, 95, 120, 100],
                    vec![],
                    ability(
                        "Meticulous Logistics",
                        40,
                        300,
                        vec![scale(ConstructionSpeed, 200), scale(EconomicEfficiency, 125)],
                    ),
                ),
                C::Isfj => (
                    "The Defenders",
                    "The walls always hold.",
                    [105, 100, 110, 100, 95, 125, 95, 110, 100],
                    vec![],
                    ability("Bulwark", 30, 240, vec![scale(UnitDefense, 160)]),
                ),
                C::Estj => (
                    "The Executives",
                    "Order builds empires.",
                    [105, 115, 110, 100, 105, 105, 100, 115, 95],
                    vec![],
                    ability(
                        "Chain of Command",
                        30,
                        300,
                        vec![scale(UnitProductionSpeed, 175), scale(ConstructionSpeed, 130)],
                    ),
                ),
                C::Esfj => (
                    "The Consuls",
                    "No one goes hungry.",
                    [115, 105, 105, 95, 95, 105, 100, 115, 100],
                    vec![],
                    ability(
                        "Community Harvest",
                        30,
                        240,
                        vec![scale(ResourceGather, 150), grant(ResourceKind::Food, 300)],
                    ),
                ),
                C::Istp => (
                    "The Virtuosos",
                    "Measure once, strike true.",
                    [100, 105, 115, 105, 110, 100, 105, 100, 105],
                    vec![],
                    ability("Precision Engineering", 20, 200, vec![scale(UnitDamage, 150)]),
                ),
                C::Isfp => (
                    "The Adventurers",
                    "Beauty in every beam.",
                    [105, 100, 105, 105, 100, 100, 110, 105, 110],
                    vec![],
                    ability(
                        "Creative Spark",
                        30,
                        240,
                        vec![scale(ConstructionSpeed, 150), grant(ResourceKind::Wood, 250)],
                    ),
                ),
                C::Estp => (
                    "The Entrepreneurs",
                    "Fortune favors the fast.",
                    [100, 110, 95, 95, 120, 90, 120, 100, 100],
                    vec![],
                    ability(
                        "Blitz",
                        15,
                        180,
                        vec![scale(UnitSpeed, 150), scale(UnitDamage, 125)],
                    ),
                ),
                C::Esfp => (
                    "The Entertainers",
                    "Give the crowd a show.",
                    [105, 105, 100, 100, 105, 100, 110, 115, 100],
                    vec![],
                    ability(
                        "Spectacle",
                        20,
                        180,
                        vec![scale(EconomicEfficiency, 140), grant(ResourceKind::Gold, 200)],
                    ),
                ),
            };

        Self {
            civilization,
            name: name.to_string(),
            tagline: tagline.to_string(),
            bonuses: BonusTable::from_array(bonuses),
            extra_modifiers: extra,
            ability,
            technologies: standard_technologies(),
        }
    }

    /// Parse a profile from RON text.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::DataParseError`] if the text is not a valid profile.
    pub fn from_ron(source: &str) -> Result<Self> {
        ron::from_str(source).map_err(|e| GameError::DataParseError {
            source_name: "civilization".to_string(),
            message: e.to_string(),
        })
    }

    /// Find a technology by name.
    #[must_use]
    pub fn technology(&self, name: &str) -> Option<&TechnologyData> {
        self.technologies.iter().find(|t| t.name == name)
    }

    /// Check internal consistency, returning every problem found.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for (kind, percent) in self
            .bonuses
            .entries()
            .into_iter()
            .chain(self.extra_modifiers.iter().copied())
        {
            if percent <= 0 {
                errors.push(format!("Modifier {kind:?} has non-positive ratio {percent}"));
            }
        }

        for effect in &self.ability.effects {
            if let AbilityEffect::Scale { kind, percent } = *effect {
                if percent <= 0 {
                    errors.push(format!(
                        "Ability '{}' scales {kind:?} by non-positive {percent}",
                        self.ability.name
                    ));
                }
            }
        }

        for (i, tech) in self.technologies.iter().enumerate() {
            if self.technologies[..i].iter().any(|t| t.name == tech.name) {
                errors.push(format!("Duplicate technology '{}'", tech.name));
            }
            for prereq in &tech.prerequisites {
                if self.technology(prereq).is_none() {
                    errors.push(format!(
                        "Tech '{}' has unknown prerequisite '{prereq}'",
                        tech.name
                    ));
                }
            }
        }

        errors
    }
}
