//! The per-match context.
//!
//! A [`Match`] owns every participant's ledger and civilization controller
//! together with all units. It is created per match and passed explicitly;
//! there is no global state, so independent matches can run side by side.
//!
//! # Determinism
//!
//! - No floating-point math (uses fixed-point via [`Fixed`](crate::math::Fixed))
//! - Participants and units iterate in id order (`BTreeMap`)
//! - Long-running effects are stored deadlines checked each tick
//! - Same intents in the same order always produce the same state hash
//!
//! # Tick order
//!
//! 1. Civilization controllers advance (ability expiry, plan purge and
//!    refresh, research completion), then units whose owner's unit-stat
//!    modifiers changed recompute their current stats.
//! 2. Finished training orders spawn.
//! 3. Units step in id order; their actions are applied immediately.
//! 4. Deaths release population; long-dead units are removed.
//! 5. Deltas are queued and the state hash is logged.
//!
//! # Example
//!
//! ```
//! use civ_core::civilization::CivilizationType;
//! use civ_core::components::UnitType;
//! use civ_core::config::MatchConfig;
//! use civ_core::math::Vec2Fixed;
//! use civ_core::simulation::Match;
//!
//! let mut game = Match::new(MatchConfig::default()).unwrap();
//! game.join(1, 0, CivilizationType::Intj).unwrap();
//! let unit = game.spawn_unit(1, UnitType::Scout, Vec2Fixed::ZERO).unwrap();
//!
//! game.tick().unwrap();
//! assert!(game.unit(unit).is_some());
//! ```

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::abilities::AbilityTransition;
use crate::civilization::{CivilizationController, CivilizationType};
use crate::combat::{calculate_damage, DamageEvent, SpatialSnapshot, TargetInfo};
use crate::components::{Ownership, ParticipantId, TeamId, Tick, UnitId, UnitType};
use crate::config::MatchConfig;
use crate::data::{CivilizationData, UnitData};
use crate::error::{GameError, Result};
use crate::math::Vec2Fixed;
use crate::modifiers::ModifierKind;
use crate::pathfinding::{DirectPathfinder, Pathfinder};
use crate::plans::{Plan, PlanType};
use crate::production::{ProductionQueue, TrainingOrder};
use crate::replication::{
    Intent, ObserverSnapshot, Outbox, ParticipantSummary, Role, StateDelta, UnitSummary,
};
use crate::resources::{ResourceBundle, ResourceKind, ResourceLedger};
use crate::unit::{resolve_structure, StepContext, Unit, UnitAction, UnitOrder};

/// Identity of a participant, fixed at join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantInfo {
    /// Participant id.
    pub id: ParticipantId,
    /// Team.
    pub team: TeamId,
    /// Civilization.
    pub civilization: CivilizationType,
}

/// Everything the match holds for one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    info: ParticipantInfo,
    ledger: ResourceLedger,
    controller: CivilizationController,
    production: ProductionQueue,
}

impl Participant {
    /// Identity.
    #[must_use]
    pub const fn info(&self) -> ParticipantInfo {
        self.info
    }

    /// Resource ledger.
    #[must_use]
    pub const fn ledger(&self) -> &ResourceLedger {
        &self.ledger
    }

    /// Civilization controller, including the modifier registry.
    #[must_use]
    pub const fn controller(&self) -> &CivilizationController {
        &self.controller
    }

    /// Units in training.
    #[must_use]
    pub const fn production(&self) -> &ProductionQueue {
        &self.production
    }

    fn summary(&self) -> ParticipantSummary {
        ParticipantSummary {
            id: self.info.id,
            team: self.info.team,
            civilization: self.info.civilization,
            ability: self.controller.ability_state(),
            plans: self.controller.plans().iter().map(|p| p.plan_type).collect(),
        }
    }
}

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickEvents {
    /// The tick that ran.
    pub tick: Tick,
    /// Attacks resolved, in unit id order.
    pub damage: Vec<DamageEvent>,
    /// Units that died.
    pub deaths: Vec<UnitId>,
    /// Units that finished training.
    pub spawned: Vec<UnitId>,
    /// Dead units removed after the removal delay.
    pub removed: Vec<UnitId>,
    /// Technologies completed, by participant.
    pub researched: Vec<(ParticipantId, String)>,
    /// Structures completed, by participant.
    pub constructed: Vec<(ParticipantId, String)>,
    /// Ability timer transitions, by participant, in order.
    pub ability_transitions: Vec<(ParticipantId, AbilityTransition)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MatchState {
    tick: Tick,
    config: MatchConfig,
    next_unit_id: UnitId,
    participants: BTreeMap<ParticipantId, Participant>,
    units: BTreeMap<UnitId, Unit>,
}

/// One match: the explicit context every operation runs against.
pub struct Match {
    role: Role,
    state: MatchState,
    pathfinder: Box<dyn Pathfinder>,
    outbox: Outbox,
}

impl fmt::Debug for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Match")
            .field("role", &self.role)
            .field("tick", &self.state.tick)
            .field("participants", &self.state.participants.len())
            .field("units", &self.state.units.len())
            .finish_non_exhaustive()
    }
}

fn spatial_snapshot(units: &BTreeMap<UnitId, Unit>) -> SpatialSnapshot {
    SpatialSnapshot::new(
        units
            .values()
            .map(|unit| TargetInfo {
                id: unit.id(),
                position: unit.position(),
                team: unit.ownership().team(),
                alive: unit.is_alive(),
            })
            .collect(),
    )
}

impl Match {
    /// Create an authority match with the straight-line pathfinder.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidState`] if `config` does not validate.
    pub fn new(config: MatchConfig) -> Result<Self> {
        Self::with_role(config, Role::Authority)
    }

    /// Create a match in the given role.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidState`] if `config` does not validate.
    pub fn with_role(config: MatchConfig, role: Role) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            role,
            state: MatchState {
                tick: 0,
                config,
                next_unit_id: 1,
                participants: BTreeMap::new(),
                units: BTreeMap::new(),
            },
            pathfinder: Box::new(DirectPathfinder::new()),
            outbox: Outbox::default(),
        })
    }

    /// Replace the navigation service.
    #[must_use]
    pub fn with_pathfinder(mut self, pathfinder: Box<dyn Pathfinder>) -> Self {
        self.pathfinder = pathfinder;
        self.reissue_routes();
        self
    }

    /// This instance's role.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Last completed tick.
    #[must_use]
    pub const fn current_tick(&self) -> Tick {
        self.state.tick
    }

    /// Match configuration.
    #[must_use]
    pub const fn config(&self) -> &MatchConfig {
        &self.state.config
    }

    /// A participant by id.
    #[must_use]
    pub fn participant(&self, id: ParticipantId) -> Option<&Participant> {
        self.state.participants.get(&id)
    }

    /// Every participant in id order.
    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.state.participants.values()
    }

    /// A unit by id, dead or alive.
    #[must_use]
    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.state.units.get(&id)
    }

    /// Every unit in id order.
    pub fn units(&self) -> impl Iterator<Item = &Unit> {
        self.state.units.values()
    }

    /// Number of units, including dead ones awaiting removal.
    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.state.units.len()
    }

    fn ensure_authority(&self) -> Result<()> {
        match self.role {
            Role::Authority => Ok(()),
            Role::Observer => Err(GameError::NotAuthority),
        }
    }

    fn participant_mut(&mut self, id: ParticipantId) -> Result<&mut Participant> {
        self.state
            .participants
            .get_mut(&id)
            .ok_or(GameError::UnknownParticipant(id))
    }

    fn sync_ledger(&mut self, participant: ParticipantId) {
        if let Some(p) = self.state.participants.get_mut(&participant) {
            if p.ledger.take_changed() {
                self.outbox.send(
                    participant,
                    StateDelta::Ledger {
                        participant,
                        balance: p.ledger.balance(),
                    },
                );
            }
        }
    }

    // ------------------------------------------------------------------
    // Participants
    // ------------------------------------------------------------------

    /// Allocate a ledger and civilization controller for a new participant.
    ///
    /// # Errors
    ///
    /// [`GameError::NotAuthority`] on observers, and
    /// [`GameError::InvalidState`] for a duplicate id or an invalid profile.
    pub fn initialize_participant(
        &mut self,
        id: ParticipantId,
        team: TeamId,
        data: &CivilizationData,
    ) -> Result<()> {
        self.ensure_authority()?;
        if self.state.participants.contains_key(&id) {
            return Err(GameError::InvalidState(format!(
                "participant {id} already joined"
            )));
        }
        let problems = data.validate();
        if !problems.is_empty() {
            return Err(GameError::InvalidState(problems.join("; ")));
        }

        let config = &self.state.config;
        let participant = Participant {
            info: ParticipantInfo {
                id,
                team,
                civilization: data.civilization,
            },
            ledger: ResourceLedger::new(config.starting_resources.to_bundle()),
            controller: CivilizationController::new(data, config.plan_limits(), config.tick_rate),
            production: ProductionQueue::with_max_len(config.max_training_orders),
        };
        let summary = participant.summary();
        self.state.participants.insert(id, participant);

        self.outbox.open(id);
        self.outbox
            .broadcast(&StateDelta::ParticipantJoined(summary));
        self.sync_ledger(id);
        tracing::info!(participant = id, team, civ = %data.civilization, "Participant joined");
        Ok(())
    }

    /// Join with the built-in profile of `civilization`.
    ///
    /// # Errors
    ///
    /// See [`Match::initialize_participant`].
    pub fn join(
        &mut self,
        id: ParticipantId,
        team: TeamId,
        civilization: CivilizationType,
    ) -> Result<()> {
        self.initialize_participant(id, team, &CivilizationData::for_type(civilization))
    }

    /// Remove a participant with their ledger, controller and units.
    ///
    /// # Errors
    ///
    /// [`GameError::NotAuthority`] or [`GameError::UnknownParticipant`].
    pub fn remove_participant(&mut self, id: ParticipantId) -> Result<()> {
        self.ensure_authority()?;
        self.state
            .participants
            .remove(&id)
            .ok_or(GameError::UnknownParticipant(id))?;

        let owned: Vec<UnitId> = self
            .state
            .units
            .values()
            .filter(|u| u.ownership().owner() == id)
            .map(Unit::id)
            .collect();
        for unit in &owned {
            self.state.units.remove(unit);
            self.pathfinder.clear(*unit);
        }

        self.outbox.close(id);
        self.outbox
            .broadcast(&StateDelta::ParticipantLeft { participant: id });
        tracing::info!(participant = id, units = owned.len(), "Participant left");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Resources
    // ------------------------------------------------------------------

    /// Credit `amount` of `kind` to a participant.
    ///
    /// # Errors
    ///
    /// [`GameError::NotAuthority`] or [`GameError::UnknownParticipant`].
    pub fn add_resource(
        &mut self,
        participant: ParticipantId,
        kind: ResourceKind,
        amount: u32,
    ) -> Result<()> {
        self.ensure_authority()?;
        self.participant_mut(participant)?.ledger.add(kind, amount);
        self.sync_ledger(participant);
        Ok(())
    }

    /// Atomically spend `cost` from a participant's ledger.
    ///
    /// # Errors
    ///
    /// [`GameError::InsufficientResources`] naming every deficient kind; the
    /// ledger is unchanged on any error.
    pub fn spend_resources(
        &mut self,
        participant: ParticipantId,
        cost: &ResourceBundle,
    ) -> Result<()> {
        self.ensure_authority()?;
        self.participant_mut(participant)?.ledger.spend(cost)?;
        self.sync_ledger(participant);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Civilization
    // ------------------------------------------------------------------

    /// Activate a participant's ability, crediting any resource grants.
    ///
    /// # Errors
    ///
    /// [`GameError::CooldownActive`] unless the ability is ready.
    pub fn activate_ability(&mut self, participant: ParticipantId) -> Result<()> {
        self.ensure_authority()?;
        let now = self.state.tick;
        let p = self.participant_mut(participant)?;
        let grants = p.controller.activate_ability(now)?;
        p.ledger.add_bundle(&grants);
        let state = p.controller.ability_state();

        self.outbox
            .broadcast(&StateDelta::AbilityChanged { participant, state });
        self.sync_ledger(participant);
        Ok(())
    }

    /// End a participant's active ability early.
    ///
    /// # Errors
    ///
    /// [`GameError::InvalidState`] if the ability is not active.
    pub fn deactivate_ability(&mut self, participant: ParticipantId) -> Result<()> {
        self.ensure_authority()?;
        let now = self.state.tick;
        let p = self.participant_mut(participant)?;
        p.controller.deactivate_ability(now)?;
        let state = p.controller.ability_state();

        self.outbox
            .broadcast(&StateDelta::AbilityChanged { participant, state });
        Ok(())
    }

    /// Create a strategic plan.
    ///
    /// # Errors
    ///
    /// [`GameError::CapacityExceeded`] or [`GameError::CooldownActive`].
    pub fn create_plan(&mut self, participant: ParticipantId, plan_type: PlanType) -> Result<Plan> {
        self.ensure_authority()?;
        let now = self.state.tick;
        let plan = self
            .participant_mut(participant)?
            .controller
            .create_plan(plan_type, now)?;

        self.outbox
            .broadcast(&StateDelta::PlanCreated { participant, plan });
        Ok(plan)
    }

    /// Start researching a technology, returning its completion tick.
    ///
    /// # Errors
    ///
    /// [`GameError::UnknownTechnology`], [`GameError::AlreadyResearched`],
    /// [`GameError::ResearchInProgress`], [`GameError::TechRequirementNotMet`]
    /// or [`GameError::InsufficientResources`].
    pub fn start_research(&mut self, participant: ParticipantId, name: &str) -> Result<Tick> {
        self.ensure_authority()?;
        let now = self.state.tick;
        let Participant {
            ledger, controller, ..
        } = self.participant_mut(participant)?;
        let completes_at = controller.start_research(name, now, ledger)?;
        self.sync_ledger(participant);
        Ok(completes_at)
    }

    // ------------------------------------------------------------------
    // Units
    // ------------------------------------------------------------------

    fn insert_unit(
        &mut self,
        owner: ParticipantId,
        data: &UnitData,
        position: Vec2Fixed,
    ) -> Result<UnitId> {
        let participant = self
            .state
            .participants
            .get(&owner)
            .ok_or(GameError::UnknownParticipant(owner))?;

        let id = self.state.next_unit_id;
        self.state.next_unit_id += 1;
        let unit = Unit::new(
            id,
            data.unit_type,
            Ownership::new(owner, participant.info.team),
            data.stats,
            position,
            participant.controller.registry(),
        );
        self.outbox
            .broadcast(&StateDelta::UnitSpawned(UnitSummary::from(&unit)));
        self.state.units.insert(id, unit);
        Ok(id)
    }

    /// Place a unit immediately, claiming its population but charging no cost.
    ///
    /// # Errors
    ///
    /// [`GameError::UnknownParticipant`], or
    /// [`GameError::InsufficientResources`] when the population cap is reached.
    pub fn spawn_unit(
        &mut self,
        owner: ParticipantId,
        unit_type: UnitType,
        position: Vec2Fixed,
    ) -> Result<UnitId> {
        self.ensure_authority()?;
        let data = self.state.config.units.get(unit_type);
        self.participant_mut(owner)?
            .ledger
            .reserve_population(data.population)?;
        self.sync_ledger(owner);
        self.insert_unit(owner, &data, position)
    }

    /// Pay for a unit and schedule it to spawn.
    ///
    /// # Errors
    ///
    /// [`GameError::CapacityExceeded`] when the training queue is full, or
    /// [`GameError::InsufficientResources`] for cost or population.
    pub fn train_unit(
        &mut self,
        participant: ParticipantId,
        unit_type: UnitType,
        position: Vec2Fixed,
    ) -> Result<TrainingOrder> {
        self.ensure_authority()?;
        let now = self.state.tick;
        let data = self.state.config.units.get(unit_type);
        let tick_rate = self.state.config.tick_rate;
        let p = self.participant_mut(participant)?;
        let speed = p.controller.modifier(ModifierKind::UnitProductionSpeed);
        let order = p
            .production
            .train(&data, position, now, tick_rate, speed, &mut p.ledger)?;
        self.sync_ledger(participant);
        Ok(order)
    }

    /// Give an owner order to a unit.
    ///
    /// Build orders name a structure in the match's catalog and pay the
    /// catalog cost.
    ///
    /// # Errors
    ///
    /// [`GameError::UnknownParticipant`], [`GameError::UnknownUnit`],
    /// [`GameError::NotOwner`], anything [`Unit::check_order`] reports, or
    /// [`GameError::InsufficientResources`] for an unaffordable structure.
    pub fn issue_order(
        &mut self,
        participant: ParticipantId,
        unit_id: UnitId,
        order: UnitOrder,
    ) -> Result<()> {
        self.ensure_authority()?;
        let spatial = spatial_snapshot(&self.state.units);
        let MatchState {
            config,
            participants,
            units,
            ..
        } = &mut self.state;
        let structures = &config.structures;

        let issuer = participants
            .get_mut(&participant)
            .ok_or(GameError::UnknownParticipant(participant))?;
        let unit = units
            .get_mut(&unit_id)
            .ok_or(GameError::UnknownUnit(unit_id))?;
        if unit.ownership().owner() != participant {
            return Err(GameError::NotOwner {
                participant,
                unit: unit_id,
            });
        }

        unit.check_order(&order, &spatial, structures)?;
        if let UnitOrder::Build { structure } = &order {
            let cost = &resolve_structure(structures, structure)?.cost;
            issuer.ledger.spend(cost)?;
        }
        unit.apply_order(order, &spatial, structures, self.pathfinder.as_mut())?;

        let summary = UnitSummary::from(&*unit);
        self.outbox.broadcast(&StateDelta::UnitUpdated(summary));
        self.sync_ledger(participant);
        Ok(())
    }

    /// Move order.
    ///
    /// # Errors
    ///
    /// See [`Match::issue_order`].
    pub fn move_to(
        &mut self,
        participant: ParticipantId,
        unit: UnitId,
        destination: Vec2Fixed,
    ) -> Result<()> {
        self.issue_order(participant, unit, UnitOrder::Move { destination })
    }

    /// Attack order.
    ///
    /// # Errors
    ///
    /// See [`Match::issue_order`]; [`GameError::InvalidTarget`] for missing,
    /// dead or friendly targets.
    pub fn set_target(
        &mut self,
        participant: ParticipantId,
        unit: UnitId,
        target: UnitId,
    ) -> Result<()> {
        self.issue_order(participant, unit, UnitOrder::SetTarget { target })
    }

    /// Stop order.
    ///
    /// # Errors
    ///
    /// See [`Match::issue_order`].
    pub fn stop(&mut self, participant: ParticipantId, unit: UnitId) -> Result<()> {
        self.issue_order(participant, unit, UnitOrder::Stop)
    }

    // ------------------------------------------------------------------
    // Replication
    // ------------------------------------------------------------------

    /// Execute an intent from `participant`.
    ///
    /// A rejection is reported to the submitter as
    /// [`StateDelta::IntentRejected`] and also returned; it never affects
    /// the tick loop.
    ///
    /// # Errors
    ///
    /// Whatever the underlying operation reports.
    pub fn submit_intent(&mut self, participant: ParticipantId, intent: Intent) -> Result<()> {
        let result = match &intent {
            Intent::Unit { unit, order } => self.issue_order(participant, *unit, order.clone()),
            Intent::ActivateAbility => self.activate_ability(participant),
            Intent::DeactivateAbility => self.deactivate_ability(participant),
            Intent::CreatePlan(plan_type) => self.create_plan(participant, *plan_type).map(|_| ()),
            Intent::Research(name) => self.start_research(participant, name).map(|_| ()),
            Intent::Train {
                unit_type,
                position,
            } => self
                .train_unit(participant, *unit_type, *position)
                .map(|_| ()),
        };

        if let Err(err) = &result {
            tracing::warn!(participant, kind = err.kind_name(), %err, "Intent rejected");
            self.outbox.send(
                participant,
                StateDelta::IntentRejected {
                    intent,
                    kind: err.kind_name().to_string(),
                    reason: err.to_string(),
                },
            );
        }
        result
    }

    /// Take every delta queued for `participant`, oldest first.
    pub fn drain_deltas(&mut self, participant: ParticipantId) -> Vec<StateDelta> {
        self.outbox.drain(participant)
    }

    /// Full state as seen by `participant`: their own ledger plus the
    /// public view of everything else.
    ///
    /// # Errors
    ///
    /// [`GameError::UnknownParticipant`] for unknown ids.
    pub fn observer_snapshot(&self, participant: ParticipantId) -> Result<ObserverSnapshot> {
        let own = self
            .state
            .participants
            .get(&participant)
            .ok_or(GameError::UnknownParticipant(participant))?;
        Ok(ObserverSnapshot {
            participant,
            tick: self.state.tick,
            ledger: Some(own.ledger.balance()),
            participants: self
                .state
                .participants
                .values()
                .map(Participant::summary)
                .collect(),
            units: self.state.units.values().map(UnitSummary::from).collect(),
        })
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Advance the match by one tick.
    ///
    /// # Errors
    ///
    /// [`GameError::NotAuthority`] on observers. Gameplay failures inside
    /// the tick are logged, never returned.
    pub fn tick(&mut self) -> Result<TickEvents> {
        self.ensure_authority()?;
        self.state.tick += 1;
        let now = self.state.tick;
        let mut events = TickEvents {
            tick: now,
            ..TickEvents::default()
        };

        self.advance_controllers(now, &mut events);
        self.spawn_trained(now, &mut events);

        let before: BTreeMap<UnitId, UnitSummary> = self
            .state
            .units
            .values()
            .map(|u| (u.id(), UnitSummary::from(u)))
            .collect();
        self.step_units(now, &mut events);
        self.process_deaths(now, &mut events);

        for unit in self.state.units.values() {
            let summary = UnitSummary::from(unit);
            if before.get(&unit.id()).is_some_and(|old| *old != summary) {
                self.outbox.broadcast(&StateDelta::UnitUpdated(summary));
            }
        }
        let ids: Vec<ParticipantId> = self.state.participants.keys().copied().collect();
        for id in ids {
            self.sync_ledger(id);
        }

        let state_hash = self.state_hash();
        tracing::debug!(tick = now, state_hash, "Match state hash");
        self.outbox.broadcast(&StateDelta::TickCompleted {
            tick: now,
            state_hash,
        });
        Ok(events)
    }

    fn advance_controllers(&mut self, now: Tick, events: &mut TickEvents) {
        let MatchState {
            participants,
            units,
            ..
        } = &mut self.state;

        for (&id, participant) in participants.iter_mut() {
            let changes = participant.controller.tick(now);

            for &transition in &changes.ability {
                tracing::debug!(
                    participant = id,
                    ?transition,
                    tick = now,
                    "Ability timer transition"
                );
                events.ability_transitions.push((id, transition));
            }
            if !changes.ability.is_empty() {
                self.outbox.broadcast(&StateDelta::AbilityChanged {
                    participant: id,
                    state: participant.controller.ability_state(),
                });
            }
            for plan_type in changes.expired_plans {
                self.outbox.broadcast(&StateDelta::PlanExpired {
                    participant: id,
                    plan_type,
                });
            }
            for tech in changes.researched {
                self.outbox.broadcast(&StateDelta::ResearchCompleted {
                    participant: id,
                    tech: tech.clone(),
                });
                events.researched.push((id, tech));
            }

            if participant.controller.take_dirty_modifiers().touches_unit_stats() {
                let registry = participant.controller.registry();
                for unit in units.values_mut().filter(|u| u.ownership().owner() == id) {
                    unit.refresh_stats(registry);
                }
            }
        }
    }

    fn spawn_trained(&mut self, now: Tick, events: &mut TickEvents) {
        let mut ready = Vec::new();
        for (&id, participant) in &mut self.state.participants {
            ready.extend(participant.production.take_ready(now).into_iter().map(|o| (id, o)));
        }

        for (owner, order) in ready {
            let data = self.state.config.units.get(order.unit_type);
            match self.insert_unit(owner, &data, order.spawn_at) {
                Ok(unit) => {
                    tracing::info!(
                        participant = owner,
                        unit,
                        unit_type = ?order.unit_type,
                        tick = now,
                        "Unit trained"
                    );
                    events.spawned.push(unit);
                }
                Err(err) => {
                    tracing::warn!(participant = owner, %err, "Dropping finished training order");
                }
            }
        }
    }

    fn step_units(&mut self, now: Tick, events: &mut TickEvents) {
        let MatchState {
            config,
            participants,
            units,
            ..
        } = &mut self.state;
        let mut spatial = spatial_snapshot(units);
        let ids: Vec<UnitId> = units.keys().copied().collect();

        for id in ids {
            let Some(unit) = units.get_mut(&id) else {
                continue;
            };
            let owner = unit.ownership().owner();
            let Some(participant) = participants.get_mut(&owner) else {
                continue;
            };

            let action = {
                let mut ctx = StepContext {
                    now,
                    tick_rate: config.tick_rate,
                    arrival_threshold: config.arrival_threshold,
                    spatial: &spatial,
                    pathfinder: self.pathfinder.as_mut(),
                    registry: participant.controller.registry(),
                };
                unit.step(&mut ctx)
            };
            spatial.update_position(id, unit.position());

            match action {
                None => {}
                Some(UnitAction::Attack { target, damage }) => {
                    let Some(victim) = units.get_mut(&target) else {
                        continue;
                    };
                    let raw = calculate_damage(damage, victim.current_stats().armor);
                    let amount = victim.take_damage(raw, now);
                    let killed = !victim.is_alive();
                    if killed {
                        spatial.mark_dead(target);
                    }
                    events.damage.push(DamageEvent {
                        attacker: id,
                        target,
                        amount,
                        killed,
                    });
                }
                Some(UnitAction::Gathered { resource, amount }) => {
                    participant.ledger.add(resource, amount);
                }
                Some(UnitAction::Constructed { structure }) => {
                    participant
                        .ledger
                        .add(ResourceKind::PopulationCap, structure.population_cap_bonus);
                    for effect in &structure.completion_effects {
                        effect.apply(participant.controller.registry_mut());
                    }
                    tracing::info!(
                        participant = owner,
                        structure = %structure.name,
                        tick = now,
                        "Structure completed"
                    );
                    events.constructed.push((owner, structure.name));
                }
            }
        }
    }

    fn process_deaths(&mut self, now: Tick, events: &mut TickEvents) {
        let removal_delay = self.state.config.death_removal_ticks();
        let MatchState {
            config,
            participants,
            units,
            ..
        } = &mut self.state;

        for unit in units.values().filter(|u| u.died_at() == Some(now)) {
            let population = config.units.get(unit.unit_type()).population;
            if let Some(owner) = participants.get_mut(&unit.ownership().owner()) {
                owner.ledger.release_population(population);
            }
            self.pathfinder.clear(unit.id());
            tracing::info!(unit = unit.id(), tick = now, "Unit killed");
            events.deaths.push(unit.id());
        }

        let expired: Vec<UnitId> = units
            .values()
            .filter(|u| {
                u.died_at()
                    .is_some_and(|died| now >= died.saturating_add(removal_delay))
            })
            .map(Unit::id)
            .collect();
        for id in expired {
            units.remove(&id);
            self.outbox.broadcast(&StateDelta::UnitRemoved { unit: id });
            events.removed.push(id);
        }
    }

    // ------------------------------------------------------------------
    // Hashing and snapshots
    // ------------------------------------------------------------------

    /// Compute a hash of the current match state.
    ///
    /// Used to verify that two instances fed the same intents agree.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        self.state.tick.hash(&mut hasher);

        self.state.participants.len().hash(&mut hasher);
        for participant in self.state.participants.values() {
            participant.info.hash(&mut hasher);
            participant.ledger.balance().hash(&mut hasher);
            for kind in ModifierKind::ALL {
                participant
                    .controller
                    .modifier(kind)
                    .to_bits()
                    .hash(&mut hasher);
            }
            participant.controller.ability_state().hash(&mut hasher);
            participant.controller.plans().hash(&mut hasher);
            for tech in participant.controller.tech_tree().technologies() {
                tech.status.hash(&mut hasher);
            }
            participant.production.hash(&mut hasher);
        }

        self.state.units.len().hash(&mut hasher);
        for unit in self.state.units.values() {
            unit.hash(&mut hasher);
        }

        hasher.finish()
    }

    /// Serialize the full authority state.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(&self.state)
            .map_err(|e| GameError::InvalidState(format!("Failed to serialize match: {e}")))
    }

    /// Restore an authority match from [`Match::serialize`] output.
    ///
    /// Routes are re-issued to a fresh straight-line pathfinder and unit
    /// stats are recomputed from each owner's registry.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let mut state: MatchState = bincode::deserialize(data)
            .map_err(|e| GameError::InvalidState(format!("Failed to deserialize match: {e}")))?;
        state.config.validate()?;

        let MatchState {
            participants,
            units,
            ..
        } = &mut state;
        for unit in units.values_mut() {
            if let Some(owner) = participants.get(&unit.ownership().owner()) {
                unit.refresh_stats(owner.controller.registry());
            }
        }

        let mut outbox = Outbox::default();
        for &id in state.participants.keys() {
            outbox.open(id);
        }

        let mut restored = Self {
            role: Role::Authority,
            state,
            pathfinder: Box::new(DirectPathfinder::new()),
            outbox,
        };
        restored.reissue_routes();
        Ok(restored)
    }

    fn reissue_routes(&mut self) {
        for unit in self.state.units.values().filter(|u| u.is_alive()) {
            if let Some(destination) = unit.destination() {
                self.pathfinder
                    .set_destination(unit.id(), unit.position(), destination);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abilities::AbilityState;
    use crate::math::Fixed;

    fn two_player_match() -> Match {
        let mut game = Match::new(MatchConfig::default()).unwrap();
        game.join(1, 0, CivilizationType::Intj).unwrap();
        game.join(2, 1, CivilizationType::Estp).unwrap();
        game
    }

    #[test]
    fn test_new_match() {
        let game = Match::new(MatchConfig::default()).unwrap();
        assert_eq!(game.current_tick(), 0);
        assert_eq!(game.unit_count(), 0);
        assert_eq!(game.role(), Role::Authority);
    }

    #[test]
    fn test_duplicate_join_rejected() {
        let mut game = two_player_match();
        assert!(matches!(
            game.join(1, 0, CivilizationType::Enfp),
            Err(GameError::InvalidState(_))
        ));
    }

    #[test]
    fn test_observer_cannot_mutate() {
        let mut game = Match::with_role(MatchConfig::default(), Role::Observer).unwrap();
        assert_eq!(
            game.join(1, 0, CivilizationType::Intj),
            Err(GameError::NotAuthority)
        );
        assert_eq!(game.tick().unwrap_err(), GameError::NotAuthority);
        assert_eq!(
            game.add_resource(1, ResourceKind::Gold, 5),
            Err(GameError::NotAuthority)
        );
    }

    #[test]
    fn test_spend_is_atomic() {
        let mut game = two_player_match();
        let cost = ResourceBundle::from_pairs(&[(ResourceKind::Gold, 1200)]);
        assert!(matches!(
            game.spend_resources(1, &cost),
            Err(GameError::InsufficientResources { .. })
        ));
        assert_eq!(game.participant(1).unwrap().ledger().get(ResourceKind::Gold), 1000);

        let cost = ResourceBundle::from_pairs(&[(ResourceKind::Gold, 300)]);
        game.spend_resources(1, &cost).unwrap();
        assert_eq!(game.participant(1).unwrap().ledger().get(ResourceKind::Gold), 700);
    }

    #[test]
    fn test_orders_require_ownership() {
        let mut game = two_player_match();
        let unit = game.spawn_unit(1, UnitType::Melee, Vec2Fixed::ZERO).unwrap();
        assert_eq!(
            game.move_to(2, unit, Vec2Fixed::from_ints(5, 5)),
            Err(GameError::NotOwner {
                participant: 2,
                unit
            })
        );
        assert_eq!(game.stop(1, 99), Err(GameError::UnknownUnit(99)));
    }

    #[test]
    fn test_idle_units_fight_to_the_death() {
        let mut game = two_player_match();
        let a = game.spawn_unit(1, UnitType::Melee, Vec2Fixed::ZERO).unwrap();
        let b = game
            .spawn_unit(2, UnitType::Melee, Vec2Fixed::from_ints(2, 0))
            .unwrap();

        game.tick().unwrap();
        assert_eq!(game.unit(a).unwrap().target(), Some(b));
        assert_eq!(game.unit(b).unwrap().target(), Some(a));

        let mut deaths = Vec::new();
        for _ in 0..2000 {
            let events = game.tick().unwrap();
            deaths.extend(events.deaths);
            if !deaths.is_empty() {
                break;
            }
        }
        assert_eq!(deaths.len(), 1);
        let dead = deaths[0];
        let survivor = if dead == a { b } else { a };

        game.tick().unwrap();
        assert_eq!(game.unit(survivor).unwrap().target(), None);
        assert!(game.unit(dead).is_some());

        for _ in 0..game.config().death_removal_ticks() {
            game.tick().unwrap();
        }
        assert!(game.unit(dead).is_none());
    }

    #[test]
    fn test_death_releases_population() {
        let mut game = two_player_match();
        let unit = game.spawn_unit(2, UnitType::Worker, Vec2Fixed::ZERO).unwrap();
        assert_eq!(game.participant(2).unwrap().ledger().get(ResourceKind::Population), 1);

        let attacker = game
            .spawn_unit(1, UnitType::Siege, Vec2Fixed::from_ints(1, 0))
            .unwrap();
        game.set_target(1, attacker, unit).unwrap();
        for _ in 0..2000 {
            game.tick().unwrap();
            if !game.unit(unit).is_some_and(Unit::is_alive) {
                break;
            }
        }
        assert_eq!(game.participant(2).unwrap().ledger().get(ResourceKind::Population), 0);
    }

    #[test]
    fn test_ability_changes_unit_stats_on_next_tick() {
        let mut game = Match::new(MatchConfig::default()).unwrap();
        game.join(1, 0, CivilizationType::Estp).unwrap();
        let unit = game.spawn_unit(1, UnitType::Melee, Vec2Fixed::ZERO).unwrap();
        let before = game.unit(unit).unwrap().current_stats().damage;

        game.activate_ability(1).unwrap();
        assert!(matches!(
            game.participant(1).unwrap().controller().ability_state(),
            AbilityState::Active { .. }
        ));
        game.tick().unwrap();
        let during = game.unit(unit).unwrap().current_stats().damage;
        let damage_mod = game
            .participant(1)
            .unwrap()
            .controller()
            .modifier(ModifierKind::UnitDamage);
        assert_eq!(
            during,
            game.unit(unit).unwrap().base_stats().damage.saturating_mul(damage_mod)
        );
        assert!(during >= before);
    }

    #[test]
    fn test_rejected_intent_is_reported_to_submitter() {
        let mut game = two_player_match();
        game.drain_deltas(1);
        game.drain_deltas(2);

        game.submit_intent(1, Intent::ActivateAbility).unwrap();
        let err = game.submit_intent(1, Intent::ActivateAbility).unwrap_err();
        assert_eq!(err, GameError::CooldownActive);

        let deltas = game.drain_deltas(1);
        assert!(deltas.iter().any(|d| matches!(
            d,
            StateDelta::IntentRejected { kind, .. } if kind == "cooldown_active"
        )));
        assert!(!game
            .drain_deltas(2)
            .iter()
            .any(|d| matches!(d, StateDelta::IntentRejected { .. })));

        game.tick().unwrap();
    }

    #[test]
    fn test_ledger_deltas_go_to_owner_only() {
        let mut game = two_player_match();
        game.drain_deltas(1);
        game.drain_deltas(2);

        game.add_resource(1, ResourceKind::Wood, 10).unwrap();
        assert!(game
            .drain_deltas(1)
            .iter()
            .any(|d| matches!(d, StateDelta::Ledger { participant: 1, .. })));
        assert!(!game
            .drain_deltas(2)
            .iter()
            .any(|d| matches!(d, StateDelta::Ledger { .. })));
    }

    #[test]
    fn test_leave_removes_units() {
        let mut game = two_player_match();
        game.spawn_unit(1, UnitType::Worker, Vec2Fixed::ZERO).unwrap();
        let kept = game.spawn_unit(2, UnitType::Worker, Vec2Fixed::ZERO).unwrap();

        game.remove_participant(1).unwrap();
        assert!(game.participant(1).is_none());
        assert_eq!(game.unit_count(), 1);
        assert!(game.unit(kept).is_some());
        assert_eq!(game.remove_participant(1), Err(GameError::UnknownParticipant(1)));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let mut game = two_player_match();
        let unit = game.spawn_unit(1, UnitType::Scout, Vec2Fixed::ZERO).unwrap();
        game.move_to(1, unit, Vec2Fixed::from_ints(100, 0)).unwrap();
        game.tick().unwrap();

        let bytes = game.serialize().unwrap();
        let mut restored = Match::deserialize(&bytes).unwrap();
        assert_eq!(game.state_hash(), restored.state_hash());

        for _ in 0..20 {
            game.tick().unwrap();
            restored.tick().unwrap();
        }
        assert_eq!(game.state_hash(), restored.state_hash());
        assert!(restored.unit(unit).unwrap().position().x > Fixed::ZERO);
    }

    #[test]
    fn test_truncated_state_is_an_error() {
        let mut game = two_player_match();
        game.spawn_unit(1, UnitType::Melee, Vec2Fixed::ZERO).unwrap();
        game.activate_ability(1).unwrap();
        game.tick().unwrap();
        let bytes = game.serialize().unwrap();

        for cut in 0..bytes.len() {
            assert!(
                matches!(Match::deserialize(&bytes[..cut]), Err(GameError::InvalidState(_))),
                "cut at {cut}"
            );
        }
    }
}
