//! Test fixtures and helpers.
//!
//! Pre-built matches and unit layouts for consistent testing.

use civ_core::civilization::CivilizationType;
use civ_core::components::{ParticipantId, UnitId, UnitType};
use civ_core::config::MatchConfig;
use civ_core::math::{Fixed, Vec2Fixed};
use civ_core::simulation::Match;

/// Participant id used for the first side in fixtures.
pub const BLUE: ParticipantId = 1;
/// Participant id used for the second side in fixtures.
pub const RED: ParticipantId = 2;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> Fixed {
    Fixed::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> Fixed {
    Fixed::from_num(n)
}

/// A fresh authority match with two participants on opposing teams.
///
/// # Panics
///
/// Panics if the default config fails to validate.
#[must_use]
pub fn two_player_match(blue: CivilizationType, red: CivilizationType) -> Match {
    let mut game = Match::new(MatchConfig::default()).expect("default config is valid");
    game.join(BLUE, 0, blue).expect("blue joins");
    game.join(RED, 1, red).expect("red joins");
    game
}

/// Two opposing lines of `per_side` units, `gap` apart.
///
/// Returns the match and the unit ids of each side.
///
/// # Panics
///
/// Panics if the population cap cannot hold `per_side` units.
#[must_use]
pub fn skirmish(
    per_side: usize,
    unit_type: UnitType,
    gap: i32,
) -> (Match, Vec<UnitId>, Vec<UnitId>) {
    let mut game = two_player_match(CivilizationType::Intj, CivilizationType::Estp);
    let mut blue = Vec::with_capacity(per_side);
    let mut red = Vec::with_capacity(per_side);
    for i in 0..per_side {
        let y = i32::try_from(i).expect("small fixture") * 3;
        blue.push(
            game.spawn_unit(BLUE, unit_type, Vec2Fixed::from_ints(0, y))
                .expect("blue unit"),
        );
        red.push(
            game.spawn_unit(RED, unit_type, Vec2Fixed::from_ints(gap, y))
                .expect("red unit"),
        );
    }
    (game, blue, red)
}

/// One side only, with `workers` workers at the origin.
///
/// # Panics
///
/// Panics if setup fails.
#[must_use]
pub fn economy_match(civilization: CivilizationType, workers: usize) -> (Match, Vec<UnitId>) {
    let mut game = Match::new(MatchConfig::default()).expect("default config is valid");
    game.join(BLUE, 0, civilization).expect("blue joins");
    let ids = (0..workers)
        .map(|_| {
            game.spawn_unit(BLUE, UnitType::Worker, Vec2Fixed::ZERO)
                .expect("worker")
        })
        .collect();
    (game, ids)
}

/// Run `ticks` ticks, panicking on authority errors.
///
/// # Panics
///
/// Panics if the match is not an authority.
pub fn run_ticks(game: &mut Match, ticks: u64) {
    for _ in 0..ticks {
        game.tick().expect("authority tick");
    }
}
