//! Per-participant modifier registry.
//!
//! Each [`ModifierKind`] holds a permanent baseline plus a set of active,
//! timed effects. The current value is always recomputed as
//! `baseline × Π factors` from the recorded effects, never by dividing a
//! factor back out, so reverting an effect restores the exact bits the
//! value had before it was applied.
//!
//! Effects are multiplied in [`EffectId`] order. Plans form the lowest
//! layer and the civilization ability is applied on top of them.

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, Fixed};
use crate::plans::PlanType;

/// A named scaling factor read by units and the civilization controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModifierKind {
    /// Worker gather rate.
    ResourceGather,
    /// Unit training speed.
    UnitProductionSpeed,
    /// Building construction speed.
    ConstructionSpeed,
    /// Technology research speed.
    ResearchSpeed,
    /// Outgoing unit damage.
    UnitDamage,
    /// Unit armor.
    UnitDefense,
    /// Unit movement speed.
    UnitSpeed,
    /// Overall economic yield.
    EconomicEfficiency,
    /// Unit sight range.
    VisionRange,
    /// Multiplier on technology costs.
    TechCostReduction,
    /// Strength of strategic plans.
    StrategicPlanning,
    /// Intelligence gathering strength.
    InformationWarfare,
}

impl ModifierKind {
    /// Number of modifier kinds.
    pub const COUNT: usize = 12;

    /// All kinds in registry order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::ResourceGather,
        Self::UnitProductionSpeed,
        Self::ConstructionSpeed,
        Self::ResearchSpeed,
        Self::UnitDamage,
        Self::UnitDefense,
        Self::UnitSpeed,
        Self::EconomicEfficiency,
        Self::VisionRange,
        Self::TechCostReduction,
        Self::StrategicPlanning,
        Self::InformationWarfare,
    ];

    /// The kinds that make up a civilization's bonus table.
    pub const BONUS_KINDS: [Self; 9] = [
        Self::ResourceGather,
        Self::UnitProductionSpeed,
        Self::ConstructionSpeed,
        Self::ResearchSpeed,
        Self::UnitDamage,
        Self::UnitDefense,
        Self::UnitSpeed,
        Self::EconomicEfficiency,
        Self::VisionRange,
    ];

    /// Storage slot for this kind.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Whether a change to this kind alters a unit's derived stats.
    #[must_use]
    pub const fn affects_unit_stats(self) -> bool {
        matches!(
            self,
            Self::UnitDamage | Self::UnitDefense | Self::UnitSpeed | Self::VisionRange
        )
    }
}

/// Identifies the source of a timed effect.
///
/// The declaration order is the layering order used when recomputing a
/// value: plan effects first, external effects next, the ability last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EffectId {
    /// A strategic plan of the given type.
    Plan(PlanType),
    /// An effect installed by a caller outside the controller.
    External(u32),
    /// The civilization's special ability.
    Ability,
}

/// One recorded effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActiveEffect {
    /// Source of the effect.
    pub id: EffectId,
    /// Multiplier contributed by the effect.
    #[serde(with = "fixed_serde")]
    pub factor: Fixed,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
struct ModifierEntry {
    #[serde(with = "fixed_serde")]
    baseline: Fixed,
    #[serde(with = "fixed_serde")]
    value: Fixed,
    /// Sorted by id.
    effects: Vec<ActiveEffect>,
}

impl Default for ModifierEntry {
    fn default() -> Self {
        Self {
            baseline: Fixed::ONE,
            value: Fixed::ONE,
            effects: Vec::new(),
        }
    }
}

impl ModifierEntry {
    fn recompute(&mut self) {
        self.value = self
            .effects
            .iter()
            .fold(self.baseline, |acc, effect| acc.saturating_mul(effect.factor));
    }
}

/// A compact set of modifier kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ModifierSet(u16);

impl ModifierSet {
    /// The empty set.
    pub const EMPTY: Self = Self(0);

    /// Add a kind.
    pub fn insert(&mut self, kind: ModifierKind) {
        self.0 |= 1 << kind.index();
    }

    /// Whether the set holds `kind`.
    #[must_use]
    pub const fn contains(self, kind: ModifierKind) -> bool {
        self.0 & (1 << kind.index()) != 0
    }

    /// Whether the set is empty.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Union of two sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether any kind in the set alters unit stats.
    #[must_use]
    pub fn touches_unit_stats(self) -> bool {
        self.iter().any(ModifierKind::affects_unit_stats)
    }

    /// Kinds in the set, in registry order.
    pub fn iter(self) -> impl Iterator<Item = ModifierKind> {
        ModifierKind::ALL
            .into_iter()
            .filter(move |&kind| self.contains(kind))
    }
}

/// Per-participant table of modifier values.
///
/// One entry per [`ModifierKind`]; decoding rejects any other length.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModifierRegistry {
    entries: [ModifierEntry; ModifierKind::COUNT],
    #[serde(skip)]
    dirty: ModifierSet,
}

impl Default for ModifierRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModifierRegistry {
    /// A registry with every kind at `1.0` and no effects.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: std::array::from_fn(|_| ModifierEntry::default()),
            dirty: ModifierSet::EMPTY,
        }
    }

    fn entry(&self, kind: ModifierKind) -> &ModifierEntry {
        &self.entries[kind.index()]
    }

    fn entry_mut(&mut self, kind: ModifierKind) -> &mut ModifierEntry {
        self.dirty.insert(kind);
        &mut self.entries[kind.index()]
    }

    /// Current value of `kind`.
    #[must_use]
    pub fn get(&self, kind: ModifierKind) -> Fixed {
        self.entry(kind).value
    }

    /// Permanent baseline of `kind`, ignoring timed effects.
    #[must_use]
    pub fn baseline(&self, kind: ModifierKind) -> Fixed {
        self.entry(kind).baseline
    }

    /// Replace the permanent baseline of `kind`.
    pub fn set_baseline(&mut self, kind: ModifierKind, value: Fixed) {
        let entry = self.entry_mut(kind);
        entry.baseline = value;
        entry.recompute();
    }

    /// Multiply the permanent baseline of `kind` by `factor`.
    pub fn scale_baseline(&mut self, kind: ModifierKind, factor: Fixed) {
        let scaled = self.baseline(kind).saturating_mul(factor);
        self.set_baseline(kind, scaled);
    }

    /// Add `delta` to the permanent baseline of `kind`.
    pub fn add_baseline(&mut self, kind: ModifierKind, delta: Fixed) {
        let raised = self.baseline(kind).saturating_add(delta);
        self.set_baseline(kind, raised);
    }

    /// Compose `factor` into `kind` under `id`.
    ///
    /// Re-applying an id that is already active replaces its factor.
    pub fn apply_effect(&mut self, kind: ModifierKind, factor: Fixed, id: EffectId) {
        let entry = &self.entries[kind.index()];
        if let Ok(pos) = entry.effects.binary_search_by(|e| e.id.cmp(&id)) {
            if entry.effects[pos].factor == factor {
                return;
            }
        }

        let entry = self.entry_mut(kind);
        match entry.effects.binary_search_by(|e| e.id.cmp(&id)) {
            Ok(pos) => entry.effects[pos].factor = factor,
            Err(pos) => entry.effects.insert(pos, ActiveEffect { id, factor }),
        }
        entry.recompute();
    }

    /// Remove the effect `id` from `kind`. Returns whether it was present.
    pub fn revert_effect(&mut self, kind: ModifierKind, id: EffectId) -> bool {
        let Ok(pos) = self.entry(kind).effects.binary_search_by(|e| e.id.cmp(&id)) else {
            return false;
        };
        let entry = self.entry_mut(kind);
        entry.effects.remove(pos);
        entry.recompute();
        true
    }

    /// Remove `id` from every kind it touched, returning those kinds.
    pub fn revert_all(&mut self, id: EffectId) -> ModifierSet {
        let mut touched = ModifierSet::EMPTY;
        for kind in ModifierKind::ALL {
            if self.revert_effect(kind, id) {
                touched.insert(kind);
            }
        }
        touched
    }

    /// Whether `id` currently contributes to `kind`.
    #[must_use]
    pub fn has_effect(&self, kind: ModifierKind, id: EffectId) -> bool {
        self.entry(kind)
            .effects
            .binary_search_by(|e| e.id.cmp(&id))
            .is_ok()
    }

    /// Active effects on `kind` in layering order.
    #[must_use]
    pub fn effects(&self, kind: ModifierKind) -> &[ActiveEffect] {
        &self.entry(kind).effects
    }

    /// Kinds changed since the last call, clearing the set.
    pub fn take_dirty(&mut self) -> ModifierSet {
        std::mem::take(&mut self.dirty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::percent;

    #[test]
    fn test_default_is_one() {
        let registry = ModifierRegistry::new();
        for kind in ModifierKind::ALL {
            assert_eq!(registry.get(kind), Fixed::ONE);
        }
    }

    #[test]
    fn test_decoding_requires_every_kind() {
        let entry = "(baseline: 4294967296, value: 4294967296, effects: [])";
        let table = |n: usize| format!("(entries: ({}))", vec![entry; n].join(", "));

        let registry: ModifierRegistry = ron::from_str(&table(ModifierKind::COUNT)).unwrap();
        for kind in ModifierKind::ALL {
            assert_eq!(registry.get(kind), Fixed::ONE);
        }
        assert!(ron::from_str::<ModifierRegistry>(&table(3)).is_err());
        assert!(ron::from_str::<ModifierRegistry>(&table(ModifierKind::COUNT + 1)).is_err());
    }

    #[test]
    fn test_revert_restores_exact_value() {
        let mut registry = ModifierRegistry::new();
        registry.set_baseline(ModifierKind::ResearchSpeed, percent(125));
        let before = registry.get(ModifierKind::ResearchSpeed);

        let tech_plan = EffectId::Plan(PlanType::Tech);
        registry.apply_effect(ModifierKind::ResearchSpeed, percent(130), tech_plan);
        registry.apply_effect(ModifierKind::ResearchSpeed, percent(200), EffectId::Ability);
        assert!(registry.get(ModifierKind::ResearchSpeed) > before);

        registry.revert_effect(ModifierKind::ResearchSpeed, EffectId::Ability);
        registry.revert_effect(ModifierKind::ResearchSpeed, tech_plan);
        assert_eq!(registry.get(ModifierKind::ResearchSpeed), before);
    }

    #[test]
    fn test_revert_order_does_not_matter() {
        let mut a = ModifierRegistry::new();
        let mut b = ModifierRegistry::new();
        let kind = ModifierKind::ResourceGather;

        for registry in [&mut a, &mut b] {
            registry.apply_effect(kind, percent(150), EffectId::Ability);
            registry.apply_effect(kind, percent(120), EffectId::Plan(PlanType::Economic));
            registry.apply_effect(kind, percent(90), EffectId::External(7));
        }
        a.revert_effect(kind, EffectId::Ability);
        b.revert_effect(kind, EffectId::External(7));
        b.revert_effect(kind, EffectId::Ability);
        b.apply_effect(kind, percent(90), EffectId::External(7));

        assert_eq!(a.get(kind), b.get(kind));
    }

    #[test]
    fn test_reapply_replaces_factor() {
        let mut registry = ModifierRegistry::new();
        let kind = ModifierKind::UnitDamage;
        registry.apply_effect(kind, percent(150), EffectId::Ability);
        registry.apply_effect(kind, percent(150), EffectId::Ability);
        assert_eq!(registry.get(kind), percent(150));
        assert_eq!(registry.effects(kind).len(), 1);

        registry.apply_effect(kind, percent(110), EffectId::Ability);
        assert_eq!(registry.get(kind), percent(110));
    }

    #[test]
    fn test_revert_missing_effect_is_noop() {
        let mut registry = ModifierRegistry::new();
        assert!(!registry.revert_effect(ModifierKind::UnitSpeed, EffectId::Ability));
        assert!(registry.take_dirty().is_empty());
    }

    #[test]
    fn test_baseline_survives_effects() {
        let mut registry = ModifierRegistry::new();
        let kind = ModifierKind::VisionRange;
        registry.apply_effect(kind, percent(150), EffectId::Ability);
        registry.set_baseline(kind, percent(120));
        assert_eq!(registry.get(kind), percent(120).saturating_mul(percent(150)));

        registry.revert_all(EffectId::Ability);
        assert_eq!(registry.get(kind), percent(120));

        registry.add_baseline(kind, percent(10));
        assert_eq!(registry.baseline(kind), percent(130));
    }

    #[test]
    fn test_dirty_set_tracks_changes() {
        let mut registry = ModifierRegistry::new();
        registry.apply_effect(ModifierKind::UnitDamage, percent(110), EffectId::External(1));
        registry.set_baseline(ModifierKind::ResearchSpeed, percent(125));

        let dirty = registry.take_dirty();
        assert!(dirty.contains(ModifierKind::UnitDamage));
        assert!(dirty.contains(ModifierKind::ResearchSpeed));
        assert!(!dirty.contains(ModifierKind::UnitSpeed));
        assert!(dirty.touches_unit_stats());
        assert!(registry.take_dirty().is_empty());
    }
}
