//! Match hosting over per-participant channels.
//!
//! Each connected participant gets an ordered intent channel into the
//! authority and an ordered delta channel back out. Intents are attributed
//! to the channel they arrive on, never to an id inside the message.

use std::collections::BTreeMap;
use std::time::Duration;

use civ_core::components::{ParticipantId, Tick};
use civ_core::replication::{Intent, ObserverSnapshot, StateDelta};
use civ_core::simulation::{Match, TickEvents};
use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::Result;

/// The participant's end of a connection.
#[derive(Debug)]
pub struct ParticipantLink {
    /// State at connection time. Deltas on `deltas` follow on from it.
    pub snapshot: ObserverSnapshot,
    /// Submit intents to the authority.
    pub intents: mpsc::UnboundedSender<Intent>,
    /// Replicated changes, in order.
    pub deltas: mpsc::UnboundedReceiver<StateDelta>,
}

#[derive(Debug)]
struct Connection {
    intents: mpsc::UnboundedReceiver<Intent>,
    deltas: mpsc::UnboundedSender<StateDelta>,
}

/// Owns one authority match and its connections.
#[derive(Debug)]
pub struct MatchHost {
    game: Match,
    connections: BTreeMap<ParticipantId, Connection>,
}

impl MatchHost {
    /// Host `game`. Nobody is connected yet.
    #[must_use]
    pub fn new(game: Match) -> Self {
        Self {
            game,
            connections: BTreeMap::new(),
        }
    }

    /// The hosted match.
    #[must_use]
    pub fn game(&self) -> &Match {
        &self.game
    }

    /// Mutable access for seating participants between ticks.
    pub fn game_mut(&mut self) -> &mut Match {
        &mut self.game
    }

    /// Whether `participant` has a live connection.
    #[must_use]
    pub fn is_connected(&self, participant: ParticipantId) -> bool {
        self.connections.contains_key(&participant)
    }

    /// Open a connection for a seated participant.
    ///
    /// Deltas queued before the call are superseded by the snapshot and
    /// discarded. Reconnecting replaces the previous connection.
    ///
    /// # Errors
    ///
    /// [`GameError::UnknownParticipant`] if `participant` is not seated.
    ///
    /// [`GameError::UnknownParticipant`]: civ_core::error::GameError::UnknownParticipant
    pub fn connect(&mut self, participant: ParticipantId) -> Result<ParticipantLink> {
        let snapshot = self.game.observer_snapshot(participant)?;
        self.game.drain_deltas(participant);

        let (intent_tx, intent_rx) = mpsc::unbounded_channel();
        let (delta_tx, delta_rx) = mpsc::unbounded_channel();
        let replaced = self
            .connections
            .insert(
                participant,
                Connection {
                    intents: intent_rx,
                    deltas: delta_tx,
                },
            )
            .is_some();
        tracing::info!(participant, tick = snapshot.tick, replaced, "Participant connected");

        Ok(ParticipantLink {
            snapshot,
            intents: intent_tx,
            deltas: delta_rx,
        })
    }

    /// Drop a participant's connection. Their seat stays in the match.
    pub fn disconnect(&mut self, participant: ParticipantId) {
        if self.connections.remove(&participant).is_some() {
            tracing::info!(participant, "Participant disconnected");
        }
    }

    /// Remove a participant from the match and drop their connection.
    ///
    /// # Errors
    ///
    /// [`GameError::UnknownParticipant`] if `participant` is not seated.
    ///
    /// [`GameError::UnknownParticipant`]: civ_core::error::GameError::UnknownParticipant
    pub fn remove(&mut self, participant: ParticipantId) -> Result<()> {
        self.game.remove_participant(participant)?;
        self.disconnect(participant);
        Ok(())
    }

    /// Apply queued intents, advance one tick, then deliver deltas.
    ///
    /// Rejected intents are reported to their submitter and never stop
    /// the tick.
    ///
    /// # Errors
    ///
    /// Only if the hosted match is not the authority.
    pub fn step(&mut self) -> Result<TickEvents> {
        self.collect_intents();
        let events = self.game.tick()?;
        self.deliver();
        Ok(events)
    }

    /// Run `ticks` steps, optionally paced to the match tick rate.
    ///
    /// Returns the tick reached.
    ///
    /// # Errors
    ///
    /// See [`MatchHost::step`].
    pub async fn run(&mut self, ticks: Tick, realtime: bool) -> Result<Tick> {
        let period = Duration::from_secs(1) / self.game.config().tick_rate;
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(ticks, realtime, ?period, "Running match");
        for _ in 0..ticks {
            if realtime {
                interval.tick().await;
            } else {
                tokio::task::yield_now().await;
            }
            self.step()?;
        }
        Ok(self.game.current_tick())
    }

    fn collect_intents(&mut self) {
        let mut closed = Vec::new();
        for (&participant, connection) in &mut self.connections {
            loop {
                match connection.intents.try_recv() {
                    Ok(intent) => {
                        // Rejections are already queued for the submitter.
                        let _ = self.game.submit_intent(participant, intent);
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        closed.push(participant);
                        break;
                    }
                }
            }
        }
        for participant in closed {
            self.disconnect(participant);
        }
    }

    fn deliver(&mut self) {
        let mut closed = Vec::new();
        for (&participant, connection) in &self.connections {
            for delta in self.game.drain_deltas(participant) {
                if connection.deltas.send(delta).is_err() {
                    closed.push(participant);
                    break;
                }
            }
        }
        // Participants that left the match have no queue to drain.
        closed.extend(
            self.connections
                .keys()
                .copied()
                .filter(|id| self.game.participant(*id).is_none()),
        );
        for participant in closed {
            self.disconnect(participant);
        }
    }
}

impl From<Match> for MatchHost {
    fn from(game: Match) -> Self {
        Self::new(game)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ServerError;
    use civ_core::civilization::CivilizationType;
    use civ_core::components::UnitType;
    use civ_core::error::GameError;
    use civ_core::math::Vec2Fixed;
    use civ_core::replication::ObserverMirror;
    use civ_core::unit::UnitOrder;
    use civ_test_utils::fixtures::{two_player_match, BLUE, RED};

    fn hosted() -> MatchHost {
        MatchHost::from(two_player_match(CivilizationType::Intj, CivilizationType::Estp))
    }

    fn drain(link: &mut ParticipantLink) -> Vec<StateDelta> {
        let mut out = Vec::new();
        while let Ok(delta) = link.deltas.try_recv() {
            out.push(delta);
        }
        out
    }

    #[test]
    fn test_connect_unknown_participant() {
        let mut host = hosted();
        assert!(matches!(
            host.connect(99),
            Err(ServerError::Game(GameError::UnknownParticipant(99)))
        ));
    }

    #[test]
    fn test_intents_are_attributed_to_channel() {
        let mut host = hosted();
        let unit = host
            .game_mut()
            .spawn_unit(RED, UnitType::Melee, Vec2Fixed::from_ints(0, 0))
            .unwrap();
        let mut blue = host.connect(BLUE).unwrap();
        let mut red = host.connect(RED).unwrap();

        // Blue tries to move red's unit.
        blue.intents
            .send(Intent::Unit {
                unit,
                order: UnitOrder::Move {
                    destination: Vec2Fixed::from_ints(5, 0),
                },
            })
            .unwrap();
        host.step().unwrap();

        let blue_deltas = drain(&mut blue);
        assert!(blue_deltas.iter().any(|d| matches!(
            d,
            StateDelta::IntentRejected { kind, .. } if kind == "not_owner"
        )));
        assert!(!drain(&mut red)
            .iter()
            .any(|d| matches!(d, StateDelta::IntentRejected { .. })));
    }

    #[test]
    fn test_mirror_follows_link() {
        let mut host = hosted();
        let mut blue = host.connect(BLUE).unwrap();
        let mut mirror = ObserverMirror::new(BLUE);
        mirror.load_snapshot(blue.snapshot.clone()).unwrap();

        blue.intents
            .send(Intent::Train {
                unit_type: UnitType::Worker,
                position: Vec2Fixed::from_ints(2, 2),
            })
            .unwrap();
        for _ in 0..400 {
            host.step().unwrap();
        }
        for delta in drain(&mut blue) {
            mirror.apply(delta);
        }

        assert_eq!(mirror.tick(), host.game().current_tick());
        assert_eq!(mirror.last_hash(), Some(host.game().state_hash()));
        assert_eq!(mirror.unit_count(), host.game().unit_count());
        assert_eq!(
            mirror.ledger(),
            Some(&host.game().participant(BLUE).unwrap().ledger().balance())
        );
    }

    #[test]
    fn test_dropped_link_disconnects() {
        let mut host = hosted();
        let blue = host.connect(BLUE).unwrap();
        drop(blue);
        host.step().unwrap();
        assert!(!host.is_connected(BLUE));
        assert!(host.game().participant(BLUE).is_some());
    }

    #[test]
    fn test_remove_drops_connection() {
        let mut host = hosted();
        let _blue = host.connect(BLUE).unwrap();
        let mut red = host.connect(RED).unwrap();
        host.remove(BLUE).unwrap();
        host.step().unwrap();

        assert!(!host.is_connected(BLUE));
        assert!(drain(&mut red).iter().any(|d| matches!(
            d,
            StateDelta::ParticipantLeft { participant } if *participant == BLUE
        )));
    }

    #[tokio::test]
    async fn test_run_reaches_budget() {
        let mut host = hosted();
        let reached = host.run(25, false).await.unwrap();
        assert_eq!(reached, 25);
    }
}
