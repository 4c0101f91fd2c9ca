//! Unit entities and their combat/movement state machine.
//!
//! Every state change goes through [`next_state`], which encodes the full
//! edge set. A unit never mutates another unit: attacks, gathered
//! resources and finished structures are returned as [`UnitAction`]s for
//! the match to apply, in unit id order.
//!
//! # Edge set
//!
//! | From | Trigger | To |
//! |---|---|---|
//! | Idle | enemy sighted | Attacking |
//! | any live | move order | Moving |
//! | Moving | arrived | Idle |
//! | Attacking | target out of range | Moving (chasing) |
//! | Moving (chasing) | target in range | Attacking |
//! | Attacking, Moving | target lost | Idle |
//! | Attacking | attack ready | Attacking |
//! | any live | set-target order | Attacking |
//! | any live | gather order | Gathering |
//! | any live | build order | Building |
//! | Gathering, Building | work finished | Idle |
//! | any live | stop order | Idle |
//! | any live | killed | Dead |

use serde::{Deserialize, Serialize};

use crate::combat::SpatialQuery;
use crate::components::{Health, Ownership, Tick, UnitId, UnitType};
use crate::data::{StructureCatalog, StructureData, UnitStats};
use crate::error::{GameError, Result};
use crate::math::{fixed_serde, millis_to_ticks, secs_to_ticks, Fixed, Vec2Fixed};
use crate::modifiers::{ModifierKind, ModifierRegistry};
use crate::pathfinding::Pathfinder;
use crate::resources::ResourceKind;

/// State tag of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitState {
    /// Waiting for orders; scans for enemies.
    Idle,
    /// Following a route.
    Moving,
    /// Engaging a target.
    Attacking,
    /// Harvesting a resource.
    Gathering,
    /// Constructing a structure.
    Building,
    /// Terminal.
    Dead,
}

/// The kind of an owner-issued order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderKind {
    /// Move to a point.
    Move,
    /// Attack a specific unit.
    SetTarget,
    /// Drop everything.
    Stop,
    /// Start gathering.
    Gather,
    /// Start building.
    Build,
}

/// What caused a state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Trigger {
    /// Targeting found an enemy in sight range.
    EnemySighted,
    /// The owner issued an order.
    Ordered(OrderKind),
    /// Remaining distance fell below the arrival threshold.
    Arrived,
    /// The target left attack range.
    TargetOutOfRange,
    /// A chased target came back into attack range.
    TargetInRange,
    /// The target died or vanished.
    TargetLost,
    /// Target in range and cooldown elapsed.
    AttackReady,
    /// Gathering or building finished.
    WorkFinished,
    /// Health reached zero.
    Killed,
}

/// The transition table. `None` means the edge does not exist.
#[must_use]
pub const fn next_state(from: UnitState, trigger: Trigger) -> Option<UnitState> {
    use UnitState::{Attacking, Building, Dead, Gathering, Idle, Moving};

    match (from, trigger) {
        (Dead, _) => None,
        (_, Trigger::Killed) => Some(Dead),
        (_, Trigger::Ordered(OrderKind::Move)) => Some(Moving),
        (_, Trigger::Ordered(OrderKind::SetTarget)) => Some(Attacking),
        (_, Trigger::Ordered(OrderKind::Stop)) => Some(Idle),
        (_, Trigger::Ordered(OrderKind::Gather)) => Some(Gathering),
        (_, Trigger::Ordered(OrderKind::Build)) => Some(Building),
        (Idle, Trigger::EnemySighted) => Some(Attacking),
        (Moving, Trigger::Arrived) => Some(Idle),
        (Moving, Trigger::TargetInRange) => Some(Attacking),
        (Moving | Attacking, Trigger::TargetLost) => Some(Idle),
        (Attacking, Trigger::TargetOutOfRange) => Some(Moving),
        (Attacking, Trigger::AttackReady) => Some(Attacking),
        (Gathering | Building, Trigger::WorkFinished) => Some(Idle),
        _ => None,
    }
}

/// An owner-issued unit order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitOrder {
    /// Move to a point.
    Move {
        /// Destination.
        destination: Vec2Fixed,
    },
    /// Attack a unit.
    SetTarget {
        /// Unit to attack.
        target: UnitId,
    },
    /// Drop the current task.
    Stop,
    /// Gather a resource.
    Gather {
        /// Resource to gather.
        resource: ResourceKind,
    },
    /// Construct a structure from the match's structure catalog.
    Build {
        /// Catalog name of the structure.
        structure: String,
    },
}

impl UnitOrder {
    /// Kind of this order.
    #[must_use]
    pub const fn kind(&self) -> OrderKind {
        match self {
            Self::Move { .. } => OrderKind::Move,
            Self::SetTarget { .. } => OrderKind::SetTarget,
            Self::Stop => OrderKind::Stop,
            Self::Gather { .. } => OrderKind::Gather,
            Self::Build { .. } => OrderKind::Build,
        }
    }
}

/// Long-running worker task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkTask {
    /// Harvesting `resource`; `carry` holds the fractional remainder.
    Gather {
        /// Resource being gathered.
        resource: ResourceKind,
        /// Not yet credited fraction.
        #[serde(with = "fixed_serde")]
        carry: Fixed,
    },
    /// Constructing `structure`; `progress` counts work ticks done.
    Build {
        /// Structure under construction.
        structure: StructureData,
        /// Work done so far.
        #[serde(with = "fixed_serde")]
        progress: Fixed,
    },
}

/// Something a unit did this tick that the match must apply.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitAction {
    /// Strike `target` for `damage` before armor.
    Attack {
        /// Unit struck.
        target: UnitId,
        /// Attacker's current damage.
        #[serde(with = "fixed_serde")]
        damage: Fixed,
    },
    /// Credit the owner's ledger.
    Gathered {
        /// Resource gathered.
        resource: ResourceKind,
        /// Whole units gathered.
        amount: u32,
    },
    /// A structure finished.
    Constructed {
        /// The finished structure.
        structure: StructureData,
    },
}

/// Shared inputs for one unit step.
pub struct StepContext<'a> {
    /// Current tick.
    pub now: Tick,
    /// Ticks per second.
    pub tick_rate: u32,
    /// Distance under which a move counts as arrived.
    pub arrival_threshold: Fixed,
    /// Target search.
    pub spatial: &'a dyn SpatialQuery,
    /// Route service.
    pub pathfinder: &'a mut dyn Pathfinder,
    /// Owner's modifiers.
    pub registry: &'a ModifierRegistry,
}

impl StepContext<'_> {
    fn per_tick(&self, per_second: Fixed) -> Fixed {
        per_second / Fixed::from_num(self.tick_rate.max(1))
    }
}

/// Base stats scaled by the owner's modifiers.
#[must_use]
pub fn derive_stats(base: &UnitStats, registry: &ModifierRegistry) -> UnitStats {
    UnitStats {
        damage: base.damage.saturating_mul(registry.get(ModifierKind::UnitDamage)),
        armor: base.armor.saturating_mul(registry.get(ModifierKind::UnitDefense)),
        speed: base.speed.saturating_mul(registry.get(ModifierKind::UnitSpeed)),
        sight_range: base
            .sight_range
            .saturating_mul(registry.get(ModifierKind::VisionRange)),
        ..*base
    }
}

/// Look up a build order's structure by name.
///
/// # Errors
///
/// [`GameError::InvalidState`] if the catalog has no such structure.
pub fn resolve_structure<'a>(
    structures: &'a StructureCatalog,
    name: &str,
) -> Result<&'a StructureData> {
    structures
        .get(name)
        .ok_or_else(|| GameError::InvalidState(format!("unknown structure '{name}'")))
}

/// A unit entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Unit {
    id: UnitId,
    unit_type: UnitType,
    ownership: Ownership,
    base: UnitStats,
    current: UnitStats,
    health: Health,
    position: Vec2Fixed,
    state: UnitState,
    target: Option<UnitId>,
    destination: Option<Vec2Fixed>,
    last_attack: Option<Tick>,
    task: Option<WorkTask>,
    died_at: Option<Tick>,
}

impl Unit {
    /// Spawn a unit at full health, deriving stats from `registry`.
    #[must_use]
    pub fn new(
        id: UnitId,
        unit_type: UnitType,
        ownership: Ownership,
        base: UnitStats,
        position: Vec2Fixed,
        registry: &ModifierRegistry,
    ) -> Self {
        Self {
            id,
            unit_type,
            ownership,
            base,
            current: derive_stats(&base, registry),
            health: Health::new(base.health),
            position,
            state: UnitState::Idle,
            target: None,
            destination: None,
            last_attack: None,
            task: None,
            died_at: None,
        }
    }

    /// Unit id.
    #[must_use]
    pub const fn id(&self) -> UnitId {
        self.id
    }

    /// Archetype.
    #[must_use]
    pub const fn unit_type(&self) -> UnitType {
        self.unit_type
    }

    /// Owner and team.
    #[must_use]
    pub const fn ownership(&self) -> Ownership {
        self.ownership
    }

    /// Immutable base stats.
    #[must_use]
    pub const fn base_stats(&self) -> &UnitStats {
        &self.base
    }

    /// Stats after modifiers.
    #[must_use]
    pub const fn current_stats(&self) -> &UnitStats {
        &self.current
    }

    /// Health.
    #[must_use]
    pub const fn health(&self) -> &Health {
        &self.health
    }

    /// World position.
    #[must_use]
    pub const fn position(&self) -> Vec2Fixed {
        self.position
    }

    /// State tag.
    #[must_use]
    pub const fn state(&self) -> UnitState {
        self.state
    }

    /// Current target, if any. May be stale; callers must re-validate.
    #[must_use]
    pub const fn target(&self) -> Option<UnitId> {
        self.target
    }

    /// Move destination, if any.
    #[must_use]
    pub const fn destination(&self) -> Option<Vec2Fixed> {
        self.destination
    }

    /// Worker task, if any.
    #[must_use]
    pub const fn task(&self) -> Option<&WorkTask> {
        self.task.as_ref()
    }

    /// Tick of death, if dead.
    #[must_use]
    pub const fn died_at(&self) -> Option<Tick> {
        self.died_at
    }

    /// Whether the unit is alive.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.state != UnitState::Dead
    }

    /// Recompute current stats from base stats and `registry`.
    pub fn refresh_stats(&mut self, registry: &ModifierRegistry) {
        self.current = derive_stats(&self.base, registry);
    }

    fn transition(&mut self, trigger: Trigger) -> bool {
        match next_state(self.state, trigger) {
            Some(next) => {
                self.state = next;
                true
            }
            None => {
                tracing::warn!(
                    unit = self.id,
                    state = ?self.state,
                    ?trigger,
                    "Illegal unit transition"
                );
                false
            }
        }
    }

    /// Check whether `order` would be accepted, without side effects.
    ///
    /// # Errors
    ///
    /// [`GameError::UnitDead`] for dead units, [`GameError::InvalidOrder`]
    /// for worker orders given to non-workers or ungatherable resources,
    /// [`GameError::InvalidTarget`] for missing, dead or friendly targets,
    /// and [`GameError::InvalidState`] for structures not in `structures`.
    pub fn check_order(
        &self,
        order: &UnitOrder,
        spatial: &dyn SpatialQuery,
        structures: &StructureCatalog,
    ) -> Result<()> {
        if !self.is_alive() {
            return Err(GameError::UnitDead(self.id));
        }
        match order {
            UnitOrder::Move { .. } | UnitOrder::Stop => Ok(()),
            UnitOrder::SetTarget { target } => {
                let valid = *target != self.id
                    && spatial
                        .lookup(*target)
                        .is_some_and(|info| info.is_enemy_of(self.ownership.team()));
                if valid {
                    Ok(())
                } else {
                    Err(GameError::InvalidTarget(*target))
                }
            }
            UnitOrder::Gather { resource } => {
                if !self.unit_type.is_worker() {
                    return Err(GameError::InvalidOrder(format!(
                        "{:?} cannot gather",
                        self.unit_type
                    )));
                }
                if resource.base_gather_rate().is_none() {
                    return Err(GameError::InvalidOrder(format!(
                        "{resource:?} cannot be gathered"
                    )));
                }
                Ok(())
            }
            UnitOrder::Build { structure } => {
                if !self.unit_type.is_worker() {
                    return Err(GameError::InvalidOrder(format!(
                        "{:?} cannot build",
                        self.unit_type
                    )));
                }
                resolve_structure(structures, structure).map(|_| ())
            }
        }
    }

    /// Apply an owner order. A new order supersedes the previous one.
    ///
    /// # Errors
    ///
    /// See [`Unit::check_order`]. On error the unit is unchanged.
    pub fn apply_order(
        &mut self,
        order: UnitOrder,
        spatial: &dyn SpatialQuery,
        structures: &StructureCatalog,
        pathfinder: &mut dyn Pathfinder,
    ) -> Result<()> {
        self.check_order(&order, spatial, structures)?;
        let resolved = match &order {
            UnitOrder::Build { structure } => {
                Some(resolve_structure(structures, structure)?.clone())
            }
            _ => None,
        };

        pathfinder.clear(self.id);
        self.target = None;
        self.destination = None;
        self.task = None;

        let kind = order.kind();
        match order {
            UnitOrder::Move { destination } => {
                pathfinder.set_destination(self.id, self.position, destination);
                self.destination = Some(destination);
            }
            UnitOrder::SetTarget { target } => self.target = Some(target),
            UnitOrder::Stop => {}
            UnitOrder::Gather { resource } => {
                self.task = Some(WorkTask::Gather {
                    resource,
                    carry: Fixed::ZERO,
                });
            }
            UnitOrder::Build { .. } => {
                self.task = resolved.map(|structure| WorkTask::Build {
                    structure,
                    progress: Fixed::ZERO,
                });
            }
        }
        self.transition(Trigger::Ordered(kind));
        Ok(())
    }

    /// Remove health, returning the amount removed. Kills the unit at zero.
    pub fn take_damage(&mut self, amount: Fixed, now: Tick) -> Fixed {
        if !self.is_alive() {
            return Fixed::ZERO;
        }
        let dealt = self.health.apply_damage(amount);
        if self.health.is_dead() {
            self.kill(now);
        }
        dealt
    }

    /// Enter the terminal state.
    pub fn kill(&mut self, now: Tick) {
        if self.transition(Trigger::Killed) {
            self.died_at = Some(now);
            self.target = None;
            self.destination = None;
            self.task = None;
        }
    }

    /// Run one state machine step.
    pub fn step(&mut self, ctx: &mut StepContext<'_>) -> Option<UnitAction> {
        match self.state {
            UnitState::Dead => None,
            UnitState::Idle => {
                self.step_idle(ctx);
                None
            }
            UnitState::Moving => {
                self.step_moving(ctx);
                None
            }
            UnitState::Attacking => self.step_attacking(ctx),
            UnitState::Gathering => self.step_gathering(ctx),
            UnitState::Building => self.step_building(ctx),
        }
    }

    fn valid_target(&self, spatial: &dyn SpatialQuery) -> Option<(UnitId, Vec2Fixed)> {
        let id = self.target?;
        let info = spatial.lookup(id)?;
        info.is_enemy_of(self.ownership.team())
            .then_some((id, info.position))
    }

    fn lose_target(&mut self, ctx: &mut StepContext<'_>) {
        self.target = None;
        self.destination = None;
        ctx.pathfinder.clear(self.id);
        self.transition(Trigger::TargetLost);
    }

    fn step_idle(&mut self, ctx: &mut StepContext<'_>) {
        if !self.unit_type.auto_acquires_targets() {
            return;
        }
        let found = ctx.spatial.nearest_enemy_in_radius(
            self.position,
            self.current.sight_range,
            self.ownership.team(),
        );
        if let Some(enemy) = found {
            self.target = Some(enemy);
            self.transition(Trigger::EnemySighted);
        }
    }

    fn step_moving(&mut self, ctx: &mut StepContext<'_>) {
        if self.target.is_some() {
            let Some((_, target_pos)) = self.valid_target(ctx.spatial) else {
                self.lose_target(ctx);
                return;
            };
            if self.position.within(target_pos, self.current.attack_range) {
                ctx.pathfinder.clear(self.id);
                self.destination = None;
                self.transition(Trigger::TargetInRange);
                return;
            }
            ctx.pathfinder
                .set_destination(self.id, self.position, target_pos);
            self.destination = Some(target_pos);
        }

        let step = ctx.per_tick(self.current.speed);
        self.position = ctx.pathfinder.advance(self.id, self.position, step);

        if self.target.is_none() {
            let arrived = ctx
                .pathfinder
                .remaining_distance(self.id, self.position)
                .map_or(true, |left| left < ctx.arrival_threshold);
            if arrived {
                ctx.pathfinder.clear(self.id);
                self.destination = None;
                self.transition(Trigger::Arrived);
            }
        }
    }

    fn step_attacking(&mut self, ctx: &mut StepContext<'_>) -> Option<UnitAction> {
        let Some((target, target_pos)) = self.valid_target(ctx.spatial) else {
            self.lose_target(ctx);
            return None;
        };

        if !self.position.within(target_pos, self.current.attack_range) {
            ctx.pathfinder
                .set_destination(self.id, self.position, target_pos);
            self.destination = Some(target_pos);
            self.transition(Trigger::TargetOutOfRange);
            return None;
        }

        let ready = self.last_attack.map_or(true, |last| {
            let cooldown = millis_to_ticks(self.current.attack_cooldown_ms, ctx.tick_rate);
            ctx.now >= last.saturating_add(cooldown)
        });
        if !ready {
            return None;
        }

        self.transition(Trigger::AttackReady);
        self.last_attack = Some(ctx.now);
        Some(UnitAction::Attack {
            target,
            damage: self.current.damage,
        })
    }

    fn step_gathering(&mut self, ctx: &mut StepContext<'_>) -> Option<UnitAction> {
        let Some(WorkTask::Gather { resource, carry }) = self.task.as_mut() else {
            self.transition(Trigger::WorkFinished);
            return None;
        };
        let resource = *resource;
        let base = resource.base_gather_rate()?;

        let rate = base
            .saturating_mul(ctx.registry.get(ModifierKind::ResourceGather))
            .saturating_mul(ctx.registry.get(ModifierKind::EconomicEfficiency));
        *carry = carry.saturating_add(ctx.per_tick(rate));

        let whole = carry.int();
        if whole < Fixed::ONE {
            return None;
        }
        *carry -= whole;
        Some(UnitAction::Gathered {
            resource,
            amount: whole.saturating_to_num::<u32>(),
        })
    }

    fn step_building(&mut self, ctx: &mut StepContext<'_>) -> Option<UnitAction> {
        let Some(WorkTask::Build { structure, progress }) = self.task.as_mut() else {
            self.transition(Trigger::WorkFinished);
            return None;
        };

        *progress = progress.saturating_add(ctx.registry.get(ModifierKind::ConstructionSpeed));
        let work = secs_to_ticks(structure.build_secs, ctx.tick_rate);
        if *progress < Fixed::saturating_from_num(work) {
            return None;
        }

        let structure = structure.clone();
        self.task = None;
        self.transition(Trigger::WorkFinished);
        Some(UnitAction::Constructed { structure })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::{SpatialSnapshot, TargetInfo};
    use crate::math::percent;
    use crate::pathfinding::DirectPathfinder;

    fn unit(id: UnitId, unit_type: UnitType, team: u8, x: i32) -> Unit {
        Unit::new(
            id,
            unit_type,
            Ownership::new(u64::from(team), team),
            UnitStats::default(),
            Vec2Fixed::from_ints(x, 0),
            &ModifierRegistry::new(),
        )
    }

    fn snapshot(units: &[&Unit]) -> SpatialSnapshot {
        SpatialSnapshot::new(
            units
                .iter()
                .map(|u| TargetInfo {
                    id: u.id(),
                    position: u.position(),
                    team: u.ownership().team(),
                    alive: u.is_alive(),
                })
                .collect(),
        )
    }

    fn step(
        unit: &mut Unit,
        now: Tick,
        spatial: &SpatialSnapshot,
        nav: &mut DirectPathfinder,
    ) -> Option<UnitAction> {
        step_at(20, unit, now, spatial, nav)
    }

    fn step_at(
        tick_rate: u32,
        unit: &mut Unit,
        now: Tick,
        spatial: &SpatialSnapshot,
        nav: &mut DirectPathfinder,
    ) -> Option<UnitAction> {
        let registry = ModifierRegistry::new();
        let mut ctx = StepContext {
            now,
            tick_rate,
            arrival_threshold: percent(10),
            spatial,
            pathfinder: nav,
            registry: &registry,
        };
        unit.step(&mut ctx)
    }

    #[test]
    fn test_dead_is_terminal() {
        for trigger in [
            Trigger::EnemySighted,
            Trigger::Ordered(OrderKind::Move),
            Trigger::Ordered(OrderKind::Stop),
            Trigger::Killed,
            Trigger::WorkFinished,
        ] {
            assert_eq!(next_state(UnitState::Dead, trigger), None);
        }
        assert_eq!(next_state(UnitState::Gathering, Trigger::Killed), Some(UnitState::Dead));
        assert_eq!(next_state(UnitState::Idle, Trigger::Arrived), None);
        assert_eq!(next_state(UnitState::Moving, Trigger::EnemySighted), None);
    }

    #[test]
    fn test_idle_acquires_enemy_in_one_tick() {
        let mut a = unit(1, UnitType::Melee, 0, 0);
        let b = unit(2, UnitType::Melee, 1, 8);
        let spatial = snapshot(&[&a, &b]);
        let mut nav = DirectPathfinder::new();

        step(&mut a, 0, &spatial, &mut nav);
        assert_eq!(a.state(), UnitState::Attacking);
        assert_eq!(a.target(), Some(2));
    }

    #[test]
    fn test_worker_does_not_auto_attack() {
        let mut worker = unit(1, UnitType::Worker, 0, 0);
        let enemy = unit(2, UnitType::Melee, 1, 2);
        let spatial = snapshot(&[&worker, &enemy]);
        let mut nav = DirectPathfinder::new();

        step(&mut worker, 0, &spatial, &mut nav);
        assert_eq!(worker.state(), UnitState::Idle);
    }

    #[test]
    fn test_attack_respects_cooldown() {
        let mut a = unit(1, UnitType::Melee, 0, 0);
        let b = unit(2, UnitType::Melee, 1, 3);
        let spatial = snapshot(&[&a, &b]);
        let mut nav = DirectPathfinder::new();

        step(&mut a, 0, &spatial, &mut nav);
        let first = step(&mut a, 1, &spatial, &mut nav);
        assert_eq!(
            first,
            Some(UnitAction::Attack {
                target: 2,
                damage: Fixed::from_num(10)
            })
        );
        assert_eq!(step(&mut a, 2, &spatial, &mut nav), None);
        assert_eq!(step(&mut a, 20, &spatial, &mut nav), None);
        assert!(step(&mut a, 21, &spatial, &mut nav).is_some());
    }

    #[test]
    fn test_cooldown_is_wall_clock() {
        // One second between attacks is 10 ticks at 10 Hz.
        let mut a = unit(1, UnitType::Melee, 0, 0);
        let b = unit(2, UnitType::Melee, 1, 3);
        let spatial = snapshot(&[&a, &b]);
        let mut nav = DirectPathfinder::new();

        step_at(10, &mut a, 0, &spatial, &mut nav);
        assert!(step_at(10, &mut a, 1, &spatial, &mut nav).is_some());
        assert_eq!(step_at(10, &mut a, 10, &spatial, &mut nav), None);
        assert!(step_at(10, &mut a, 11, &spatial, &mut nav).is_some());
    }

    #[test]
    fn test_chase_then_resume_attack() {
        let mut a = unit(1, UnitType::Melee, 0, 0);
        let mut b = unit(2, UnitType::Melee, 1, 8);
        let mut nav = DirectPathfinder::new();

        let spatial = snapshot(&[&a, &b]);
        step(&mut a, 0, &spatial, &mut nav);
        assert_eq!(a.state(), UnitState::Attacking);

        let spatial = snapshot(&[&a, &b]);
        step(&mut a, 1, &spatial, &mut nav);
        assert_eq!(a.state(), UnitState::Moving);
        assert_eq!(a.target(), Some(2));

        // 5 units/s at 20 Hz closes 0.25 per tick; 3 units takes 12 ticks.
        for now in 2..40 {
            let spatial = snapshot(&[&a, &b]);
            step(&mut a, now, &spatial, &mut nav);
            if a.state() == UnitState::Attacking {
                break;
            }
        }
        assert_eq!(a.state(), UnitState::Attacking);

        b.kill(40);
        let spatial = snapshot(&[&a, &b]);
        step(&mut a, 41, &spatial, &mut nav);
        assert_eq!(a.state(), UnitState::Idle);
        assert_eq!(a.target(), None);
    }

    #[test]
    fn test_move_order_arrives() {
        let mut a = unit(1, UnitType::Scout, 0, 0);
        let spatial = snapshot(&[&a]);
        let mut nav = DirectPathfinder::new();

        a.apply_order(
            UnitOrder::Move {
                destination: Vec2Fixed::from_ints(1, 0),
            },
            &spatial,
            &StructureCatalog::default(),
            &mut nav,
        )
        .unwrap();
        assert_eq!(a.state(), UnitState::Moving);

        for now in 0..4 {
            step(&mut a, now, &spatial, &mut nav);
        }
        assert_eq!(a.state(), UnitState::Idle);
        assert_eq!(a.position(), Vec2Fixed::from_ints(1, 0));
        assert_eq!(a.destination(), None);
    }

    #[test]
    fn test_order_validation() {
        let mut soldier = unit(1, UnitType::Melee, 0, 0);
        let ally = unit(3, UnitType::Melee, 0, 1);
        let spatial = snapshot(&[&soldier, &ally]);
        let structures = StructureCatalog::default();
        let mut nav = DirectPathfinder::new();
        let gather = UnitOrder::Gather {
            resource: ResourceKind::Gold,
        };

        assert!(matches!(
            soldier.apply_order(gather, &spatial, &structures, &mut nav),
            Err(GameError::InvalidOrder(_))
        ));
        for target in [3, 99] {
            let order = UnitOrder::SetTarget { target };
            assert_eq!(
                soldier.apply_order(order, &spatial, &structures, &mut nav),
                Err(GameError::InvalidTarget(target))
            );
        }
        assert_eq!(soldier.state(), UnitState::Idle);

        soldier.kill(5);
        assert_eq!(
            soldier.apply_order(UnitOrder::Stop, &spatial, &structures, &mut nav),
            Err(GameError::UnitDead(1))
        );
    }

    #[test]
    fn test_gathering_carries_fraction() {
        let mut worker = unit(1, UnitType::Worker, 0, 0);
        let spatial = snapshot(&[&worker]);
        let mut nav = DirectPathfinder::new();
        let gather = UnitOrder::Gather {
            resource: ResourceKind::Gold,
        };
        worker
            .apply_order(gather, &spatial, &StructureCatalog::default(), &mut nav)
            .unwrap();

        // 0.8 gold/s for 50 s; the fixed-point carry may round one unit down.
        let mut total = 0;
        for now in 0..1000 {
            let action = step(&mut worker, now, &spatial, &mut nav);
            if let Some(UnitAction::Gathered { resource, amount }) = action {
                assert_eq!(resource, ResourceKind::Gold);
                total += amount;
            }
        }
        assert!((39..=40).contains(&total), "gathered {total}");
        assert_eq!(worker.state(), UnitState::Gathering);
    }

    #[test]
    fn test_build_completes_and_idles() {
        let mut worker = unit(1, UnitType::Worker, 0, 0);
        let spatial = snapshot(&[&worker]);
        let mut nav = DirectPathfinder::new();
        let mut structures = StructureCatalog::default();
        let mut house = structures.get("House").unwrap().clone();
        house.build_secs = 1;
        structures.insert(house.clone());

        let order = UnitOrder::Build {
            structure: "House".to_string(),
        };
        worker.apply_order(order, &spatial, &structures, &mut nav).unwrap();
        // One second of work at 20 Hz.
        for now in 0..19 {
            assert_eq!(step(&mut worker, now, &spatial, &mut nav), None);
        }
        assert_eq!(
            step(&mut worker, 19, &spatial, &mut nav),
            Some(UnitAction::Constructed { structure: house })
        );
        assert_eq!(worker.state(), UnitState::Idle);
    }

    #[test]
    fn test_build_uses_catalog_definition() {
        let mut worker = unit(1, UnitType::Worker, 0, 0);
        let spatial = snapshot(&[&worker]);
        let mut nav = DirectPathfinder::new();
        let structures = StructureCatalog::default();

        let unknown = UnitOrder::Build {
            structure: "Castle".to_string(),
        };
        assert!(matches!(
            worker.apply_order(unknown, &spatial, &structures, &mut nav),
            Err(GameError::InvalidState(msg)) if msg.contains("Castle")
        ));
        assert_eq!(worker.state(), UnitState::Idle);
        assert_eq!(worker.task(), None);

        let order = UnitOrder::Build {
            structure: "Barracks".to_string(),
        };
        worker.apply_order(order, &spatial, &structures, &mut nav).unwrap();
        let barracks = structures.get("Barracks").unwrap();
        assert!(matches!(
            worker.task(),
            Some(WorkTask::Build { structure, .. }) if structure == barracks
        ));
    }

    #[test]
    fn test_damage_kills_and_clamps() {
        let mut a = unit(1, UnitType::Melee, 0, 0);
        assert_eq!(a.take_damage(Fixed::from_num(60), 3), Fixed::from_num(60));
        assert_eq!(a.take_damage(Fixed::from_num(60), 4), Fixed::from_num(40));
        assert_eq!(a.health().current(), Fixed::ZERO);
        assert_eq!(a.state(), UnitState::Dead);
        assert_eq!(a.died_at(), Some(4));
        assert_eq!(a.take_damage(Fixed::from_num(5), 5), Fixed::ZERO);
    }

    #[test]
    fn test_stats_follow_modifiers() {
        let mut a = unit(1, UnitType::Melee, 0, 0);
        let mut registry = ModifierRegistry::new();
        registry.set_baseline(ModifierKind::UnitDamage, percent(150));
        a.refresh_stats(&registry);
        assert_eq!(a.current_stats().damage, Fixed::from_num(15));
        assert_eq!(a.base_stats().damage, Fixed::from_num(10));
    }
}
