//! Technology data structures for data-driven tech trees.

use serde::{Deserialize, Serialize};

use crate::math::percent;
use crate::modifiers::{ModifierKind, ModifierRegistry};
use crate::resources::ResourceBundle;

/// Permanent effect applied when research completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TechEffect {
    /// Multiply the baseline by `percent / 100`.
    Scale {
        /// Modifier to scale.
        kind: ModifierKind,
        /// Factor as a whole percentage.
        percent: i32,
    },
    /// Add `percent / 100` to the baseline.
    Add {
        /// Modifier to raise.
        kind: ModifierKind,
        /// Amount as a whole percentage (negative to lower).
        percent: i32,
    },
}

impl TechEffect {
    /// Write this effect into `registry`'s baseline.
    pub fn apply(self, registry: &mut ModifierRegistry) {
        match self {
            Self::Scale { kind, percent: p } => registry.scale_baseline(kind, percent(p)),
            Self::Add { kind, percent: p } => registry.add_baseline(kind, percent(p)),
        }
    }

    /// Modifier this effect writes.
    #[must_use]
    pub const fn kind(self) -> ModifierKind {
        match self {
            Self::Scale { kind, .. } | Self::Add { kind, .. } => kind,
        }
    }
}

/// Data-driven technology definition.
///
/// # Example RON
///
/// ```ron
/// TechnologyData(
///     name: "Advanced Analytics",
///     cost: (amounts: (200, 0, 0, 100, 0, 0)),
///     research_secs: 45,
///     prerequisites: ["Scientific Method"],
///     effects: [
///         Scale(kind: ResearchSpeed, percent: 110),
///         Scale(kind: StrategicPlanning, percent: 110),
///     ],
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TechnologyData {
    /// Unique name within a civilization.
    pub name: String,
    /// Base cost, before the tech cost modifier.
    pub cost: ResourceBundle,
    /// Base research time in seconds, before the research speed modifier.
    pub research_secs: u32,
    /// Technologies that must be researched first.
    #[serde(default)]
    pub prerequisites: Vec<String>,
    /// Effects applied on completion.
    #[serde(default)]
    pub effects: Vec<TechEffect>,
}
