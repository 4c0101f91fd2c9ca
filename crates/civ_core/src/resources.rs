//! Per-participant resource ledger.
//!
//! A ledger holds six non-negative integer quantities. It is mutated only
//! through [`ResourceLedger::add`] and [`ResourceLedger::spend`] (plus the
//! population reserve/release pair used by unit production). Spends are
//! atomic: either every requested amount is available and all are deducted,
//! or nothing changes and every shortfall is reported.

use serde::{Deserialize, Serialize};

use crate::error::{Deficit, GameError, Result};
use crate::math::{tenths, Fixed};

/// A kind of tracked resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Gold, mined by workers.
    Gold,
    /// Wood, chopped by workers.
    Wood,
    /// Food, farmed by workers.
    Food,
    /// Stone, quarried by workers.
    Stone,
    /// Population currently in use.
    Population,
    /// Maximum population.
    PopulationCap,
}

impl ResourceKind {
    /// Number of resource kinds.
    pub const COUNT: usize = 6;

    /// All kinds in ledger order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Gold,
        Self::Wood,
        Self::Food,
        Self::Stone,
        Self::Population,
        Self::PopulationCap,
    ];

    /// Storage slot for this kind.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Gold => 0,
            Self::Wood => 1,
            Self::Food => 2,
            Self::Stone => 3,
            Self::Population => 4,
            Self::PopulationCap => 5,
        }
    }

    /// Base amount a single worker gathers per second, before modifiers.
    ///
    /// Returns `None` for the population counters, which cannot be gathered.
    #[must_use]
    pub fn base_gather_rate(self) -> Option<Fixed> {
        match self {
            Self::Gold => Some(tenths(8)),
            Self::Wood => Some(tenths(6)),
            Self::Food => Some(tenths(7)),
            Self::Stone => Some(tenths(5)),
            Self::Population | Self::PopulationCap => None,
        }
    }
}

/// A set of resource amounts, used both as a cost and as a ledger snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ResourceBundle {
    amounts: [u32; ResourceKind::COUNT],
}

impl ResourceBundle {
    /// An empty bundle.
    pub const EMPTY: Self = Self {
        amounts: [0; ResourceKind::COUNT],
    };

    /// Build a bundle from `(kind, amount)` pairs. Repeated kinds accumulate.
    #[must_use]
    pub fn from_pairs(pairs: &[(ResourceKind, u32)]) -> Self {
        pairs
            .iter()
            .fold(Self::EMPTY, |bundle, &(kind, amount)| {
                bundle.with(kind, bundle.get(kind).saturating_add(amount))
            })
    }

    /// Builder method to set one amount.
    #[must_use]
    pub const fn with(mut self, kind: ResourceKind, amount: u32) -> Self {
        self.amounts[kind.index()] = amount;
        self
    }

    /// Amount of one kind.
    #[must_use]
    pub const fn get(&self, kind: ResourceKind) -> u32 {
        self.amounts[kind.index()]
    }

    /// Whether every amount is zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.amounts.iter().all(|&a| a == 0)
    }

    /// Non-zero entries in ledger order.
    pub fn iter(&self) -> impl Iterator<Item = (ResourceKind, u32)> + '_ {
        ResourceKind::ALL
            .iter()
            .map(|&kind| (kind, self.get(kind)))
            .filter(|&(_, amount)| amount > 0)
    }

    /// Multiply every amount by `factor`, rounding to the nearest unit.
    #[must_use]
    pub fn scaled(&self, factor: Fixed) -> Self {
        let factor = factor.max(Fixed::ZERO);
        let mut out = Self::EMPTY;
        for kind in ResourceKind::ALL {
            let scaled = Fixed::saturating_from_num(self.get(kind)).saturating_mul(factor);
            out.amounts[kind.index()] = scaled.saturating_round().saturating_to_num::<u32>();
        }
        out
    }
}

/// Starting amounts given to a participant on join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartingResources {
    /// Starting gold.
    pub gold: u32,
    /// Starting wood.
    pub wood: u32,
    /// Starting food.
    pub food: u32,
    /// Starting stone.
    pub stone: u32,
    /// Starting population cap.
    pub population_cap: u32,
}

impl Default for StartingResources {
    fn default() -> Self {
        Self {
            gold: 1000,
            wood: 500,
            food: 500,
            stone: 200,
            population_cap: 200,
        }
    }
}

impl StartingResources {
    /// The starting amounts as a bundle (population starts at zero).
    #[must_use]
    pub fn to_bundle(self) -> ResourceBundle {
        ResourceBundle::EMPTY
            .with(ResourceKind::Gold, self.gold)
            .with(ResourceKind::Wood, self.wood)
            .with(ResourceKind::Food, self.food)
            .with(ResourceKind::Stone, self.stone)
            .with(ResourceKind::PopulationCap, self.population_cap)
    }
}

/// Per-participant resource store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceLedger {
    balance: ResourceBundle,
    /// Set whenever a quantity changes; cleared by the replication pass.
    #[serde(skip)]
    changed: bool,
}

impl ResourceLedger {
    /// Create a ledger holding `starting`.
    #[must_use]
    pub fn new(starting: ResourceBundle) -> Self {
        Self {
            balance: starting,
            changed: true,
        }
    }

    /// Current amount of one kind.
    #[must_use]
    pub const fn get(&self, kind: ResourceKind) -> u32 {
        self.balance.get(kind)
    }

    /// Snapshot of every quantity.
    #[must_use]
    pub const fn balance(&self) -> ResourceBundle {
        self.balance
    }

    /// Credit `amount` of `kind`. Saturates rather than wrapping.
    pub fn add(&mut self, kind: ResourceKind, amount: u32) {
        if amount == 0 {
            return;
        }
        let slot = &mut self.balance.amounts[kind.index()];
        *slot = slot.saturating_add(amount);
        self.changed = true;
    }

    /// Credit every amount in `bundle`.
    pub fn add_bundle(&mut self, bundle: &ResourceBundle) {
        for (kind, amount) in bundle.iter() {
            self.add(kind, amount);
        }
    }

    /// Whether every amount in `cost` is available simultaneously.
    #[must_use]
    pub fn can_afford(&self, cost: &ResourceBundle) -> bool {
        cost.iter().all(|(kind, amount)| self.get(kind) >= amount)
    }

    /// Every kind in `cost` the ledger cannot currently cover.
    #[must_use]
    pub fn deficits(&self, cost: &ResourceBundle) -> Vec<Deficit> {
        cost.iter()
            .filter(|&(kind, amount)| self.get(kind) < amount)
            .map(|(kind, required)| Deficit {
                kind,
                required,
                available: self.get(kind),
            })
            .collect()
    }

    /// Atomically deduct `cost`.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InsufficientResources`] naming every deficient
    /// kind. On error the ledger is unchanged.
    pub fn spend(&mut self, cost: &ResourceBundle) -> Result<()> {
        let deficient = self.deficits(cost);
        if !deficient.is_empty() {
            return Err(GameError::InsufficientResources { deficient });
        }
        for (kind, amount) in cost.iter() {
            self.balance.amounts[kind.index()] -= amount;
        }
        if !cost.is_empty() {
            self.changed = true;
        }
        Ok(())
    }

    /// Population headroom under the cap.
    #[must_use]
    pub fn population_headroom(&self) -> u32 {
        self.get(ResourceKind::PopulationCap)
            .saturating_sub(self.get(ResourceKind::Population))
    }

    /// Claim `count` population slots.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InsufficientResources`] naming
    /// [`ResourceKind::Population`] when the cap would be exceeded.
    pub fn reserve_population(&mut self, count: u32) -> Result<()> {
        let headroom = self.population_headroom();
        if count > headroom {
            return Err(GameError::InsufficientResources {
                deficient: vec![Deficit {
                    kind: ResourceKind::Population,
                    required: count,
                    available: headroom,
                }],
            });
        }
        self.add(ResourceKind::Population, count);
        Ok(())
    }

    /// Return `count` population slots (e.g. when a unit dies).
    pub fn release_population(&mut self, count: u32) {
        let slot = &mut self.balance.amounts[ResourceKind::Population.index()];
        let released = (*slot).min(count);
        *slot -= released;
        if released > 0 {
            self.changed = true;
        }
    }

    /// Whether the ledger changed since the last call, clearing the flag.
    pub fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }
}
