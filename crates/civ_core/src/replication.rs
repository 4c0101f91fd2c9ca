//! Authority/observer replication records.
//!
//! The authority turns every accepted change into [`StateDelta`]s queued
//! per participant in an [`Outbox`]. Each participant's queue is ordered;
//! nothing is promised across queues. Observers submit [`Intent`]s and
//! rebuild a read-only view with an [`ObserverMirror`].

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::abilities::AbilityState;
use crate::civilization::CivilizationType;
use crate::components::{ParticipantId, TeamId, Tick, UnitId, UnitType};
use crate::error::{GameError, Result};
use crate::math::{fixed_serde, Fixed, Vec2Fixed};
use crate::plans::{Plan, PlanType};
use crate::resources::ResourceBundle;
use crate::unit::{Unit, UnitOrder, UnitState};

/// Which side of a match this instance is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Owns canonical state and executes every mutation.
    Authority,
    /// Mirrors state and may only submit intents.
    Observer,
}

/// A request from a participant for the authority to act.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Intent {
    /// Order one of the participant's units.
    Unit {
        /// Unit to command.
        unit: UnitId,
        /// The order.
        order: UnitOrder,
    },
    /// Activate the civilization ability.
    ActivateAbility,
    /// End the civilization ability early.
    DeactivateAbility,
    /// Create a strategic plan.
    CreatePlan(PlanType),
    /// Start researching a technology.
    Research(String),
    /// Train a unit.
    Train {
        /// Archetype to train.
        unit_type: UnitType,
        /// Spawn point.
        position: Vec2Fixed,
    },
}

/// Replicated view of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitSummary {
    /// Unit id.
    pub id: UnitId,
    /// Owner.
    pub owner: ParticipantId,
    /// Team.
    pub team: TeamId,
    /// Archetype.
    pub unit_type: UnitType,
    /// Position.
    pub position: Vec2Fixed,
    /// Current health.
    #[serde(with = "fixed_serde")]
    pub health: Fixed,
    /// State tag.
    pub state: UnitState,
    /// Target, if any.
    pub target: Option<UnitId>,
}

impl From<&Unit> for UnitSummary {
    fn from(unit: &Unit) -> Self {
        Self {
            id: unit.id(),
            owner: unit.ownership().owner(),
            team: unit.ownership().team(),
            unit_type: unit.unit_type(),
            position: unit.position(),
            health: unit.health().current(),
            state: unit.state(),
            target: unit.target(),
        }
    }
}

/// Replicated view of a participant, minus the private ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantSummary {
    /// Participant id.
    pub id: ParticipantId,
    /// Team.
    pub team: TeamId,
    /// Civilization.
    pub civilization: CivilizationType,
    /// Ability state.
    pub ability: AbilityState,
    /// Live plans.
    pub plans: Vec<PlanType>,
}

/// One replicated change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateDelta {
    /// A participant joined.
    ParticipantJoined(ParticipantSummary),
    /// A participant left; their units are gone.
    ParticipantLeft {
        /// Who left.
        participant: ParticipantId,
    },
    /// The recipient's own ledger changed.
    Ledger {
        /// Ledger owner (always the recipient).
        participant: ParticipantId,
        /// New balance.
        balance: ResourceBundle,
    },
    /// A unit appeared.
    UnitSpawned(UnitSummary),
    /// A unit changed.
    UnitUpdated(UnitSummary),
    /// A unit was removed.
    UnitRemoved {
        /// Removed unit.
        unit: UnitId,
    },
    /// A participant's ability changed state.
    AbilityChanged {
        /// Participant.
        participant: ParticipantId,
        /// New state.
        state: AbilityState,
    },
    /// A participant created a plan.
    PlanCreated {
        /// Participant.
        participant: ParticipantId,
        /// The plan.
        plan: Plan,
    },
    /// A participant's plan expired.
    PlanExpired {
        /// Participant.
        participant: ParticipantId,
        /// Expired plan type.
        plan_type: PlanType,
    },
    /// A participant finished a technology.
    ResearchCompleted {
        /// Participant.
        participant: ParticipantId,
        /// Technology name.
        tech: String,
    },
    /// The authority refused one of the recipient's intents.
    IntentRejected {
        /// The refused intent.
        intent: Intent,
        /// Machine-readable error tag.
        kind: String,
        /// Human-readable reason.
        reason: String,
    },
    /// End of a tick.
    TickCompleted {
        /// Tick just finished.
        tick: Tick,
        /// Authority state hash after the tick.
        state_hash: u64,
    },
}

/// Per-participant ordered delta queues.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outbox {
    queues: BTreeMap<ParticipantId, VecDeque<StateDelta>>,
}

impl Outbox {
    /// Open a queue for `participant`.
    pub fn open(&mut self, participant: ParticipantId) {
        self.queues.entry(participant).or_default();
    }

    /// Drop `participant`'s queue.
    pub fn close(&mut self, participant: ParticipantId) {
        self.queues.remove(&participant);
    }

    /// Queue a delta for one participant.
    pub fn send(&mut self, participant: ParticipantId, delta: StateDelta) {
        if let Some(queue) = self.queues.get_mut(&participant) {
            queue.push_back(delta);
        }
    }

    /// Queue a delta for every participant.
    pub fn broadcast(&mut self, delta: &StateDelta) {
        for queue in self.queues.values_mut() {
            queue.push_back(delta.clone());
        }
    }

    /// Take everything queued for `participant`, oldest first.
    pub fn drain(&mut self, participant: ParticipantId) -> Vec<StateDelta> {
        self.queues
            .get_mut(&participant)
            .map(|q| q.drain(..).collect())
            .unwrap_or_default()
    }

    /// Number of deltas waiting for `participant`.
    #[must_use]
    pub fn pending(&self, participant: ParticipantId) -> usize {
        self.queues.get(&participant).map_or(0, VecDeque::len)
    }
}

/// Full state as seen by one participant, for late joiners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObserverSnapshot {
    /// Recipient.
    pub participant: ParticipantId,
    /// Tick the snapshot was taken.
    pub tick: Tick,
    /// Recipient's own ledger.
    pub ledger: Option<ResourceBundle>,
    /// Every participant.
    pub participants: Vec<ParticipantSummary>,
    /// Every unit.
    pub units: Vec<UnitSummary>,
}

impl ObserverSnapshot {
    /// Encode with bincode.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidState`] if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| GameError::InvalidState(format!("snapshot encode: {e}")))
    }

    /// Decode from bincode.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::DataParseError`] if the bytes are malformed.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| GameError::DataParseError {
            source_name: "observer snapshot".to_string(),
            message: e.to_string(),
        })
    }
}

/// Read-only match view rebuilt from deltas.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObserverMirror {
    participant: ParticipantId,
    tick: Tick,
    last_hash: Option<u64>,
    ledger: Option<ResourceBundle>,
    participants: BTreeMap<ParticipantId, ParticipantSummary>,
    units: BTreeMap<UnitId, UnitSummary>,
    rejections: Vec<(Intent, String)>,
}

impl ObserverMirror {
    /// An empty mirror for `participant`.
    #[must_use]
    pub fn new(participant: ParticipantId) -> Self {
        Self {
            participant,
            ..Self::default()
        }
    }

    /// Replace the view with a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidState`] if the snapshot was taken for
    /// another participant.
    pub fn load_snapshot(&mut self, snapshot: ObserverSnapshot) -> Result<()> {
        if snapshot.participant != self.participant {
            return Err(GameError::InvalidState(format!(
                "snapshot for participant {} applied to mirror of {}",
                snapshot.participant, self.participant
            )));
        }
        self.tick = snapshot.tick;
        self.ledger = snapshot.ledger;
        self.participants = snapshot
            .participants
            .into_iter()
            .map(|p| (p.id, p))
            .collect();
        self.units = snapshot.units.into_iter().map(|u| (u.id, u)).collect();
        Ok(())
    }

    /// Apply one delta.
    pub fn apply(&mut self, delta: StateDelta) {
        match delta {
            StateDelta::ParticipantJoined(summary) => {
                self.participants.insert(summary.id, summary);
            }
            StateDelta::ParticipantLeft { participant } => {
                self.participants.remove(&participant);
                self.units.retain(|_, u| u.owner != participant);
            }
            StateDelta::Ledger {
                participant,
                balance,
            } => {
                if participant == self.participant {
                    self.ledger = Some(balance);
                }
            }
            StateDelta::UnitSpawned(summary) | StateDelta::UnitUpdated(summary) => {
                self.units.insert(summary.id, summary);
            }
            StateDelta::UnitRemoved { unit } => {
                self.units.remove(&unit);
            }
            StateDelta::AbilityChanged { participant, state } => {
                if let Some(p) = self.participants.get_mut(&participant) {
                    p.ability = state;
                }
            }
            StateDelta::PlanCreated { participant, plan } => {
                if let Some(p) = self.participants.get_mut(&participant) {
                    p.plans.retain(|t| *t != plan.plan_type);
                    p.plans.push(plan.plan_type);
                }
            }
            StateDelta::PlanExpired {
                participant,
                plan_type,
            } => {
                if let Some(p) = self.participants.get_mut(&participant) {
                    p.plans.retain(|t| *t != plan_type);
                }
            }
            StateDelta::ResearchCompleted { .. } => {}
            StateDelta::IntentRejected { intent, reason, .. } => {
                self.rejections.push((intent, reason));
            }
            StateDelta::TickCompleted { tick, state_hash } => {
                self.tick = tick;
                self.last_hash = Some(state_hash);
            }
        }
    }

    /// Mirror owner.
    #[must_use]
    pub const fn participant(&self) -> ParticipantId {
        self.participant
    }

    /// Last tick seen.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Authority hash reported with the last tick.
    #[must_use]
    pub const fn last_hash(&self) -> Option<u64> {
        self.last_hash
    }

    /// Own ledger, once received.
    #[must_use]
    pub const fn ledger(&self) -> Option<&ResourceBundle> {
        self.ledger.as_ref()
    }

    /// A unit by id.
    #[must_use]
    pub fn unit(&self, id: UnitId) -> Option<&UnitSummary> {
        self.units.get(&id)
    }

    /// Number of known units.
    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// A participant by id.
    #[must_use]
    pub fn participant_summary(&self, id: ParticipantId) -> Option<&ParticipantSummary> {
        self.participants.get(&id)
    }

    /// Intents the authority refused, oldest first.
    #[must_use]
    pub fn rejections(&self) -> &[(Intent, String)] {
        &self.rejections
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: UnitId, owner: ParticipantId) -> UnitSummary {
        UnitSummary {
            id,
            owner,
            team: 0,
            unit_type: UnitType::Melee,
            position: Vec2Fixed::ZERO,
            health: Fixed::from_num(100),
            state: UnitState::Idle,
            target: None,
        }
    }

    #[test]
    fn test_outbox_is_per_participant_and_ordered() {
        let mut outbox = Outbox::default();
        outbox.open(1);
        outbox.open(2);

        outbox.send(1, StateDelta::UnitRemoved { unit: 10 });
        outbox.broadcast(&StateDelta::UnitRemoved { unit: 11 });
        outbox.send(3, StateDelta::UnitRemoved { unit: 12 });

        assert_eq!(
            outbox.drain(1),
            vec![
                StateDelta::UnitRemoved { unit: 10 },
                StateDelta::UnitRemoved { unit: 11 }
            ]
        );
        assert_eq!(outbox.pending(2), 1);
        assert!(outbox.drain(3).is_empty());
        assert_eq!(outbox.pending(1), 0);
    }

    #[test]
    fn test_mirror_ignores_foreign_ledgers() {
        let mut mirror = ObserverMirror::new(1);
        mirror.apply(StateDelta::Ledger {
            participant: 2,
            balance: ResourceBundle::EMPTY,
        });
        assert!(mirror.ledger().is_none());

        mirror.apply(StateDelta::UnitSpawned(summary(5, 2)));
        mirror.apply(StateDelta::ParticipantLeft { participant: 2 });
        assert_eq!(mirror.unit_count(), 0);
    }

    #[test]
    fn test_snapshot_bytes_round_trip() {
        let snapshot = ObserverSnapshot {
            participant: 1,
            tick: 42,
            ledger: Some(ResourceBundle::EMPTY),
            participants: vec![],
            units: vec![summary(1, 1), summary(2, 9)],
        };
        let bytes = snapshot.to_bytes().unwrap();
        let decoded = ObserverSnapshot::from_bytes(&bytes).unwrap();

        let mut mirror = ObserverMirror::new(1);
        mirror.load_snapshot(decoded).unwrap();
        assert_eq!(mirror.tick(), 42);
        assert_eq!(mirror.unit_count(), 2);

        let mut other = ObserverMirror::new(2);
        assert!(other.load_snapshot(snapshot).is_err());
        assert!(ObserverSnapshot::from_bytes(&[1, 2]).is_err());
    }
}
