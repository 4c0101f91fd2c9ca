//! Match tick benchmarks for civ_core.
//!
//! Run with: `cargo bench -p civ_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use civ_core::components::UnitType;
use civ_core::modifiers::{EffectId, ModifierKind, ModifierRegistry};
use civ_core::math::percent;
use civ_test_utils::fixtures::{run_ticks, skirmish};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

/// Full tick of a skirmish at several sizes.
pub fn simulation_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("match_tick");
    for per_side in [8usize, 32, 64] {
        group.bench_function(format!("skirmish_{per_side}v{per_side}"), |b| {
            b.iter_batched(
                || skirmish(per_side, UnitType::Melee, 8).0,
                |mut game| {
                    run_ticks(&mut game, 20);
                    black_box(game.state_hash())
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

/// Apply and revert layered effects on one kind.
pub fn modifier_benchmark(c: &mut Criterion) {
    c.bench_function("modifier_apply_revert", |b| {
        b.iter(|| {
            let mut registry = ModifierRegistry::new();
            for id in 0..16u32 {
                registry.apply_effect(
                    ModifierKind::UnitDamage,
                    percent(110),
                    EffectId::External(id),
                );
            }
            for id in 0..16u32 {
                registry.revert_effect(ModifierKind::UnitDamage, EffectId::External(id));
            }
            black_box(registry.get(ModifierKind::UnitDamage))
        });
    });
}

criterion_group!(benches, simulation_benchmark, modifier_benchmark);
criterion_main!(benches);
