//! Determinism testing utilities.
//!
//! Provides a harness for verifying that a match produces identical
//! results given identical intents.
//!
//! # Testing Strategy
//!
//! One authority drives each match, but the authority must be replayable:
//! a restored snapshot or a second authority fed the same intents has to
//! reach the same state hash. Sources of non-determinism include:
//!
//! - **Floating-point math**: We use fixed-point arithmetic via
//!   [`civ_core::math::Fixed`] throughout.
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   Participants and units live in `BTreeMap`s and iterate in id order.
//!
//! - **Wall-clock time**: Timers are stored tick deadlines, never sleeps.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: Individual components (ledger, registry, state machine)
//! 2. **Property tests**: Random intent scripts must still produce deterministic outputs
//! 3. **Integration tests**: Full match scenarios are reproducible
//! 4. **Parallel tests**: Running N matches on N threads all match

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use civ_core::components::ParticipantId;
use civ_core::replication::Intent;
use civ_core::simulation::Match;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for a deterministic match).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the runs agreed, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Match is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a simulation multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run
/// * `ticks` - Number of ticks to simulate per run
/// * `setup` - Function to create initial state
/// * `step` - Function to advance state by one tick
/// * `hash` - Function to compute state hash
///
/// # Example
///
/// ```
/// use civ_test_utils::determinism::verify_determinism;
///
/// let result = verify_determinism(3, 10, || 0u64, |n| *n += 1, |n| *n);
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..ticks {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Run two matches built by `setup_fn` and compare final hashes.
pub fn verify_match_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Match,
{
    verify_determinism(
        2,
        num_ticks,
        &setup_fn,
        |game| {
            let _ = game.tick();
        },
        Match::state_hash,
    )
    .is_deterministic
}

/// One scheduled intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedIntent {
    /// Tick before which the intent is submitted.
    pub at: u64,
    /// Submitter.
    pub participant: ParticipantId,
    /// The intent.
    pub intent: Intent,
}

/// Run `num_ticks` ticks, submitting each scripted intent before the tick
/// whose number equals its `at`. Rejections are ignored.
pub fn run_script(game: &mut Match, script: &[ScriptedIntent], num_ticks: u64) {
    for tick in 0..num_ticks {
        for entry in script.iter().filter(|s| s.at == tick) {
            let _ = game.submit_intent(entry.participant, entry.intent.clone());
        }
        let _ = game.tick();
    }
}

/// Feed the same script to two fresh matches and compare hashes every
/// tick. Returns the first tick at which they differ.
pub fn find_first_divergence<F>(
    setup_fn: F,
    script: &[ScriptedIntent],
    num_ticks: u64,
) -> Option<u64>
where
    F: Fn() -> Match,
{
    let mut a = setup_fn();
    let mut b = setup_fn();

    if a.state_hash() != b.state_hash() {
        return Some(0);
    }

    for tick in 0..num_ticks {
        for entry in script.iter().filter(|s| s.at == tick) {
            let _ = a.submit_intent(entry.participant, entry.intent.clone());
            let _ = b.submit_intent(entry.participant, entry.intent.clone());
        }
        let _ = a.tick();
        let _ = b.tick();

        if a.state_hash() != b.state_hash() {
            return Some(tick + 1);
        }
    }

    None
}

/// Run N matches on scoped threads and collect final hashes.
///
/// Matches share nothing, so they may run concurrently.
pub fn run_parallel_matches<F>(setup_fn: F, num_matches: usize, num_ticks: u64) -> DeterminismResult
where
    F: Fn() -> Match + Sync,
{
    let hashes = thread::scope(|s| {
        let handles: Vec<_> = (0..num_matches)
            .map(|_| {
                s.spawn(|| {
                    let mut game = setup_fn();
                    for _ in 0..num_ticks {
                        let _ = game.tick();
                    }
                    game.state_hash()
                })
            })
            .collect();

        handles
            .into_iter()
            .filter_map(|h| h.join().ok())
            .collect::<Vec<_>>()
    });

    let is_deterministic =
        hashes.len() == num_matches && hashes.windows(2).all(|w| w[0] == w[1]);
    DeterminismResult {
        is_deterministic,
        hashes,
        ticks: num_ticks,
    }
}

/// Snapshot after `warmup` ticks, then check the restored match stays in
/// lockstep with the original for `num_ticks` more.
pub fn verify_serialization_determinism<F>(setup_fn: F, warmup: u64, num_ticks: u64) -> bool
where
    F: Fn() -> Match,
{
    let mut game = setup_fn();
    for _ in 0..warmup {
        let _ = game.tick();
    }

    let Ok(bytes) = game.serialize() else {
        return false;
    };
    let Ok(mut restored) = Match::deserialize(&bytes) else {
        return false;
    };
    if restored.state_hash() != game.state_hash() {
        return false;
    }

    for _ in 0..num_ticks {
        let _ = game.tick();
        let _ = restored.tick();
        if restored.state_hash() != game.state_hash() {
            return false;
        }
    }
    true
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for match inputs.
pub mod strategies {
    use civ_core::components::UnitType;
    use civ_core::math::{percent, Fixed, Vec2Fixed};
    use civ_core::modifiers::ModifierKind;
    use civ_core::plans::PlanType;
    use civ_core::replication::Intent;
    use civ_core::resources::{ResourceBundle, ResourceKind};
    use civ_core::unit::UnitOrder;
    use proptest::prelude::*;

    use super::ScriptedIntent;

    /// Generate a fixed-point coordinate.
    ///
    /// Range: -200 to 200 (a small skirmish map)
    pub fn arb_fixed_position() -> impl Strategy<Value = Fixed> {
        (-200i32..200i32).prop_map(Fixed::from_num)
    }

    /// Generate a fixed-point 2D position.
    pub fn arb_vec2_position() -> impl Strategy<Value = Vec2Fixed> {
        (arb_fixed_position(), arb_fixed_position()).prop_map(|(x, y)| Vec2Fixed::new(x, y))
    }

    /// Generate any resource kind.
    pub fn arb_resource_kind() -> impl Strategy<Value = ResourceKind> {
        prop::sample::select(ResourceKind::ALL.to_vec())
    }

    /// Generate a cost bundle of up to four kinds, each below `max`.
    pub fn arb_bundle(max: u32) -> impl Strategy<Value = ResourceBundle> {
        proptest::collection::vec((arb_resource_kind(), 0..max), 0..4)
            .prop_map(|pairs| ResourceBundle::from_pairs(&pairs))
    }

    /// Generate any modifier kind.
    pub fn arb_modifier_kind() -> impl Strategy<Value = ModifierKind> {
        prop::sample::select(ModifierKind::ALL.to_vec())
    }

    /// Generate a modifier factor between 0.5 and 3.0.
    pub fn arb_factor() -> impl Strategy<Value = Fixed> {
        (50i32..=300).prop_map(percent)
    }

    /// Generate any plan type.
    pub fn arb_plan_type() -> impl Strategy<Value = PlanType> {
        prop::sample::select(PlanType::ALL.to_vec())
    }

    /// Generate a combat unit type.
    pub fn arb_combat_unit() -> impl Strategy<Value = UnitType> {
        prop::sample::select(vec![
            UnitType::Melee,
            UnitType::Ranged,
            UnitType::Scout,
            UnitType::Siege,
        ])
    }

    /// Generate a move or stop order.
    pub fn arb_movement_order() -> impl Strategy<Value = UnitOrder> {
        prop_oneof![
            arb_vec2_position().prop_map(|destination| UnitOrder::Move { destination }),
            Just(UnitOrder::Stop),
        ]
    }

    /// Generate an intent addressed to units `1..=max_unit`.
    pub fn arb_intent(max_unit: u64) -> impl Strategy<Value = Intent> {
        prop_oneof![
            4 => (1..=max_unit, arb_movement_order())
                .prop_map(|(unit, order)| Intent::Unit { unit, order }),
            2 => (1..=max_unit, 1..=max_unit).prop_map(|(unit, target)| Intent::Unit {
                unit,
                order: UnitOrder::SetTarget { target },
            }),
            1 => Just(Intent::ActivateAbility),
            1 => arb_plan_type().prop_map(Intent::CreatePlan),
            1 => (arb_combat_unit(), arb_vec2_position())
                .prop_map(|(unit_type, position)| Intent::Train { unit_type, position }),
        ]
    }

    /// Generate a script of intents from participants 1 and 2.
    pub fn arb_script(
        max_len: usize,
        max_tick: u64,
        max_unit: u64,
    ) -> impl Strategy<Value = Vec<ScriptedIntent>> {
        proptest::collection::vec(
            (0..max_tick, 1u64..=2, arb_intent(max_unit)).prop_map(|(at, participant, intent)| {
                ScriptedIntent {
                    at,
                    participant,
                    intent,
                }
            }),
            0..max_len,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{economy_match, skirmish, two_player_match, BLUE, RED};
    use civ_core::civilization::CivilizationType;
    use civ_core::components::UnitType;
    use civ_core::math::Vec2Fixed;
    use civ_core::plans::PlanType;
    use civ_core::resources::ResourceKind;
    use civ_core::unit::UnitOrder;
    use proptest::prelude::*;

    #[test]
    fn test_verify_determinism_simple() {
        let result = verify_determinism(3, 100, || 0u64, |n| *n += 1, |n| *n);

        assert!(result.is_deterministic);
        assert_eq!(result.hashes, vec![100, 100, 100]);
    }

    #[test]
    fn test_empty_match_determinism() {
        assert!(verify_match_determinism(
            || two_player_match(CivilizationType::Intj, CivilizationType::Infp),
            100
        ));
    }

    #[test]
    fn test_skirmish_determinism() {
        assert!(verify_match_determinism(
            || skirmish(4, UnitType::Melee, 6).0,
            600
        ));
    }

    #[test]
    fn test_economy_determinism() {
        let setup = || {
            let (mut game, workers) = economy_match(CivilizationType::Estj, 3);
            for (i, worker) in workers.iter().enumerate() {
                let resource = [ResourceKind::Gold, ResourceKind::Wood, ResourceKind::Food][i];
                game.issue_order(BLUE, *worker, UnitOrder::Gather { resource })
                    .unwrap();
            }
            game
        };
        assert!(verify_match_determinism(setup, 400));
    }

    #[test]
    fn test_hash_changes_with_state() {
        let mut game = two_player_match(CivilizationType::Intj, CivilizationType::Estp);
        let before = game.state_hash();
        game.add_resource(RED, ResourceKind::Stone, 1).unwrap();
        assert_ne!(before, game.state_hash());
    }

    #[test]
    fn test_scripted_divergence_none() {
        let script = vec![
            ScriptedIntent {
                at: 0,
                participant: BLUE,
                intent: Intent::ActivateAbility,
            },
            ScriptedIntent {
                at: 5,
                participant: BLUE,
                intent: Intent::CreatePlan(PlanType::Military),
            },
            ScriptedIntent {
                at: 10,
                participant: BLUE,
                intent: Intent::Unit {
                    unit: 1,
                    order: UnitOrder::Move {
                        destination: Vec2Fixed::from_ints(20, 20),
                    },
                },
            },
        ];
        let divergence =
            find_first_divergence(|| skirmish(2, UnitType::Ranged, 30).0, &script, 200);
        assert!(divergence.is_none(), "diverged at {divergence:?}");
    }

    #[test]
    fn test_serialization_mid_battle() {
        assert!(verify_serialization_determinism(
            || skirmish(3, UnitType::Ranged, 10).0,
            50,
            300
        ));
    }

    #[test]
    fn test_parallel_matches() {
        run_parallel_matches(|| skirmish(3, UnitType::Melee, 5).0, 4, 300).assert_deterministic();
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_scripts_are_deterministic(script in strategies::arb_script(40, 100, 8)) {
            let divergence = find_first_divergence(
                || skirmish(3, UnitType::Melee, 20).0,
                &script,
                120,
            );
            prop_assert!(divergence.is_none());
        }
    }
}
