//! Unit training.
//!
//! Training spends the unit's cost and claims its population up front,
//! then stores a spawn deadline. The match spawns the unit when the tick
//! loop reaches that deadline.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::components::{Tick, UnitType};
use crate::data::UnitData;
use crate::error::{Deficit, GameError, Result};
use crate::math::{scale_duration, secs_to_ticks, Fixed, Vec2Fixed};
use crate::resources::{ResourceKind, ResourceLedger};

/// A unit in training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrainingOrder {
    /// Archetype being trained.
    pub unit_type: UnitType,
    /// Where the unit appears.
    pub spawn_at: Vec2Fixed,
    /// Tick training began.
    pub started: Tick,
    /// Tick the unit spawns.
    pub ready_at: Tick,
}

/// Per-participant set of units in training.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductionQueue {
    orders: VecDeque<TrainingOrder>,
    max_len: usize,
}

impl ProductionQueue {
    /// Default maximum number of concurrent training orders.
    pub const DEFAULT_MAX_LEN: usize = 10;

    /// An empty queue holding at most `max_len` orders.
    #[must_use]
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            orders: VecDeque::new(),
            max_len,
        }
    }

    /// Number of orders in training.
    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    /// Whether nothing is training.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Whether another order would exceed the limit.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.orders.len() >= self.max_len
    }

    /// Orders in submission order.
    pub fn iter(&self) -> impl Iterator<Item = &TrainingOrder> {
        self.orders.iter()
    }

    /// Pay for and schedule a unit.
    ///
    /// Training takes the unit's build seconds at `tick_rate`, divided by
    /// `production_speed`.
    ///
    /// Cost and population are checked together; on failure nothing is
    /// deducted and every shortfall is reported.
    ///
    /// # Errors
    ///
    /// [`GameError::CapacityExceeded`] when the queue is full, or
    /// [`GameError::InsufficientResources`] naming every deficient kind
    /// (including [`ResourceKind::Population`]).
    pub fn train(
        &mut self,
        data: &UnitData,
        spawn_at: Vec2Fixed,
        now: Tick,
        tick_rate: u32,
        production_speed: Fixed,
        ledger: &mut ResourceLedger,
    ) -> Result<TrainingOrder> {
        if self.is_full() {
            return Err(GameError::CapacityExceeded {
                limit: self.max_len,
            });
        }

        let mut deficient = ledger.deficits(&data.cost);
        let headroom = ledger.population_headroom();
        if data.population > headroom {
            deficient.push(Deficit {
                kind: ResourceKind::Population,
                required: data.population,
                available: headroom,
            });
        }
        if !deficient.is_empty() {
            return Err(GameError::InsufficientResources { deficient });
        }

        ledger.spend(&data.cost)?;
        ledger.reserve_population(data.population)?;

        let duration = scale_duration(secs_to_ticks(data.build_secs, tick_rate), production_speed);
        let order = TrainingOrder {
            unit_type: data.unit_type,
            spawn_at,
            started: now,
            ready_at: now.saturating_add(duration),
        };
        self.orders.push_back(order);
        Ok(order)
    }

    /// Remove and return every order due at `now`, in submission order.
    pub fn take_ready(&mut self, now: Tick) -> Vec<TrainingOrder> {
        let (ready, pending): (Vec<_>, Vec<_>) =
            self.orders.drain(..).partition(|o| now >= o.ready_at);
        self.orders = pending.into();
        ready
    }
}

impl Default for ProductionQueue {
    fn default() -> Self {
        Self::with_max_len(Self::DEFAULT_MAX_LEN)
    }
}
