//! Structure data for worker build orders.

use serde::{Deserialize, Serialize};

use super::tech_data::TechEffect;
use crate::modifiers::ModifierKind;
use crate::resources::{ResourceBundle, ResourceKind};

/// Data-driven structure definition.
///
/// A worker given a build order spends `cost` up front and then works for
/// `build_secs` seconds, scaled by the owner's construction speed.
///
/// # Example RON
///
/// ```ron
/// StructureData(
///     name: "House",
///     cost: (amounts: (0, 100, 0, 0, 0, 0)),
///     build_secs: 15,
///     population_cap_bonus: 10,
///     completion_effects: [],
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructureData {
    /// Unique name.
    pub name: String,
    /// Construction cost.
    pub cost: ResourceBundle,
    /// Work in seconds at construction speed 1.0.
    pub build_secs: u32,
    /// Population cap added on completion.
    #[serde(default)]
    pub population_cap_bonus: u32,
    /// Baseline modifier effects applied to the owner on completion.
    #[serde(default)]
    pub completion_effects: Vec<TechEffect>,
}

impl StructureData {
    /// Built-in structures.
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        use ResourceKind::{Gold, Stone, Wood};

        let research_boost = vec![TechEffect::Scale {
            kind: ModifierKind::ResearchSpeed,
            percent: 105,
        }];

        vec![
            Self {
                name: "House".to_string(),
                cost: ResourceBundle::from_pairs(&[(Wood, 100)]),
                build_secs: 15,
                population_cap_bonus: 10,
                completion_effects: Vec::new(),
            },
            Self {
                name: "Barracks".to_string(),
                cost: ResourceBundle::from_pairs(&[(Wood, 200), (Stone, 50)]),
                build_secs: 30,
                population_cap_bonus: 0,
                completion_effects: Vec::new(),
            },
            Self {
                name: "Research Lab".to_string(),
                cost: ResourceBundle::from_pairs(&[(Wood, 150), (Gold, 100)]),
                build_secs: 30,
                population_cap_bonus: 0,
                completion_effects: research_boost.clone(),
            },
            Self {
                name: "Observatory".to_string(),
                cost: ResourceBundle::from_pairs(&[(Stone, 100), (Gold, 50)]),
                build_secs: 20,
                population_cap_bonus: 0,
                completion_effects: research_boost,
            },
        ]
    }

    /// Find a built-in structure by name.
    #[must_use]
    pub fn named(name: &str) -> Option<Self> {
        Self::defaults().into_iter().find(|s| s.name == name)
    }
}

/// The structures a match allows workers to build, looked up by name.
///
/// Build orders carry only a name. Cost, work and completion effects always
/// come from the match's own catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StructureCatalog {
    structures: Vec<StructureData>,
}

impl Default for StructureCatalog {
    fn default() -> Self {
        Self {
            structures: StructureData::defaults(),
        }
    }
}

impl StructureCatalog {
    /// Definition named `name`, if the match allows it.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&StructureData> {
        self.structures.iter().find(|s| s.name == name)
    }

    /// Replace or insert a definition.
    pub fn insert(&mut self, data: StructureData) {
        self.structures.retain(|s| s.name != data.name);
        self.structures.push(data);
    }

    /// Number of definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.structures.len()
    }

    /// Whether no structure can be built.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.structures.is_empty()
    }

    /// Problems with the table: blank or repeated names.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let mut seen = std::collections::BTreeSet::new();
        for structure in &self.structures {
            if structure.name.trim().is_empty() {
                problems.push("structure with empty name".to_string());
            } else if !seen.insert(structure.name.as_str()) {
                problems.push(format!("duplicate structure '{}'", structure.name));
            }
        }
        problems
    }
}
