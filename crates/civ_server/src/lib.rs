//! # Civ Dedicated Server
//!
//! Headless authority host for matches.
//!
//! Runs the simulation without rendering, routing each participant's
//! intents in and state deltas out over its own ordered channel.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod host;
pub mod store;

use std::convert::Infallible;
use std::path::{Path, PathBuf};

use civ_core::civilization::CivilizationType;
use civ_core::components::{ParticipantId, TeamId, Tick};
use civ_core::config::MatchConfig;
use civ_core::error::GameError;
use civ_core::selection::{recall_civilization, remember_civilization, SelectionStore};
use civ_core::simulation::Match;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Civilization used when neither the roster nor the store names one.
pub const FALLBACK_CIVILIZATION: CivilizationType = CivilizationType::Intj;

/// Errors raised by the host around the simulation.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Reading or writing a file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A RON config file was malformed.
    #[error("Config parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    /// The selection store held malformed JSON.
    #[error("Selection store error: {0}")]
    Json(#[from] serde_json::Error),

    /// The simulation refused an operation.
    #[error(transparent)]
    Game(#[from] GameError),
}

impl From<Infallible> for ServerError {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

/// Result type for host operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// One seat in the match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    /// Participant id.
    pub id: ParticipantId,
    /// Team.
    pub team: TeamId,
    /// Chosen civilization. When absent the stored selection is used.
    #[serde(default)]
    pub civilization: Option<CivilizationType>,
}

/// Server configuration.
///
/// # Example RON
///
/// ```ron
/// ServerConfig(
///     game: (tick_rate: 20),
///     roster: [
///         (id: 1, team: 1, civilization: Some(Intj)),
///         (id: 2, team: 2),
///     ],
///     tick_budget: 1200,
///     selection_store: Some("selections.json"),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Match tunables.
    pub game: MatchConfig,
    /// Participants seated at start.
    pub roster: Vec<RosterEntry>,
    /// Ticks to run before stopping.
    pub tick_budget: Tick,
    /// Pace ticks to wall-clock time at the match tick rate.
    pub realtime: bool,
    /// JSON file remembering civilization selections.
    pub selection_store: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            game: MatchConfig::default(),
            roster: vec![
                RosterEntry {
                    id: 1,
                    team: 1,
                    civilization: None,
                },
                RosterEntry {
                    id: 2,
                    team: 2,
                    civilization: None,
                },
            ],
            tick_budget: 1200,
            realtime: true,
            selection_store: None,
        }
    }
}

impl ServerConfig {
    /// Parse a config from RON text.
    ///
    /// # Errors
    ///
    /// [`ServerError::Ron`] on malformed input, [`ServerError::Game`] when
    /// the match config is unusable.
    pub fn from_ron(source: &str) -> Result<Self> {
        let config: Self = ron::from_str(source)?;
        config.game.validate()?;
        Ok(config)
    }

    /// Load a config file.
    ///
    /// # Errors
    ///
    /// See [`ServerConfig::from_ron`]; also [`ServerError::Io`].
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_ron(&source)
    }
}

/// Build an authority match and seat every roster entry.
///
/// A roster civilization is written back to `store`; a missing one is
/// recalled from it, falling back to [`FALLBACK_CIVILIZATION`].
///
/// # Errors
///
/// Store failures, invalid config, or a duplicate roster id.
pub fn build_match<S>(config: &ServerConfig, store: &mut S) -> Result<Match>
where
    S: SelectionStore,
    ServerError: From<S::Error>,
{
    let mut game = Match::new(config.game.clone())?;
    for entry in &config.roster {
        let civilization = match entry.civilization {
            Some(civ) => {
                remember_civilization(store, entry.id, civ)?;
                civ
            }
            None => recall_civilization(&*store, entry.id)?.unwrap_or_else(|| {
                tracing::info!(
                    participant = entry.id,
                    civ = %FALLBACK_CIVILIZATION,
                    "No stored selection"
                );
                FALLBACK_CIVILIZATION
            }),
        };
        game.join(entry.id, entry.team, civilization)?;
    }
    Ok(game)
}
