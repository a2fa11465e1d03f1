//! Performance benchmarks for forage

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use forage::behavior::mutation::random_condition;
use forage::behavior::{Context, OptimizationParameters, Preset};
use forage::grid::Pos;
use forage::pathfinder::{AllPairsPathfinder, Pathfinder};
use forage::{Brain, Config, Map, Simulation};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn benchmark_simulation_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("simulation_step");

    for creatures in [15, 50, 200].iter() {
        let mut config = Config::default();
        config.map.creature_count = *creatures;
        let map = Map::generate(&config.map).unwrap();

        for preset in [Preset::BaseAutomaton, Preset::CommunicatingTree] {
            let mut sim = Simulation::new(&map, Brain::from_preset(preset), &config, 42);

            // Warm up
            sim.run(10);

            group.bench_with_input(
                BenchmarkId::new(format!("{:?}", preset), creatures),
                creatures,
                |b, _| {
                    b.iter(|| {
                        sim.step();
                    });
                },
            );
        }
    }

    group.finish();
}

fn benchmark_pathfinder(c: &mut Criterion) {
    let config = Config::default();
    let map = Map::generate(&config.map).unwrap();

    c.bench_function("pathfinder_build", |b| {
        b.iter(|| Pathfinder::new(black_box(map.walls.clone()), map.colony));
    });

    // A cell on the east corridor, toggled back and forth
    let pos = Pos::new(map.colony.x + 9, map.colony.y);
    let mut field = Pathfinder::new(map.walls.clone(), map.colony);
    c.bench_function("pathfinder_wall_toggle", |b| {
        b.iter(|| {
            field.add_wall(black_box(pos));
            field.remove_wall(black_box(pos));
        });
    });

    let mut small = config.map.clone();
    small.shape = forage::map::MapShape::Circle {
        r: 8,
        big_r: 9,
        food_amount: 5,
        density_min: 1,
        density_max: 5,
    };
    let small = Map::generate(&small).unwrap();
    c.bench_function("all_pairs_build", |b| {
        b.iter(|| AllPairsPathfinder::build(black_box(&small)));
    });
}

fn benchmark_condition(c: &mut Criterion) {
    let config = Config::default();
    let map = Map::generate(&config.map).unwrap();
    let mut sim = Simulation::new(&map, Brain::from_preset(Preset::BaseTree), &config, 42);
    sim.run(50);

    let op = OptimizationParameters::default();
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let mut condition = random_condition(&op, false, &mut rng);
    for _ in 0..8 {
        condition.expand(&op, false, &mut rng);
    }

    c.bench_function("condition_evaluate", |b| {
        b.iter(|| {
            let mut ctx = Context::new(&mut sim.world, &mut sim.agents, 0);
            condition.evaluate(black_box(&mut ctx))
        });
    });

    c.bench_function("condition_mutate", |b| {
        b.iter(|| {
            let mut copy = condition.copy();
            copy.expand(&op, false, &mut rng);
            copy.reduce(&mut rng);
            copy
        });
    });
}

criterion_group!(
    benches,
    benchmark_simulation_step,
    benchmark_pathfinder,
    benchmark_condition,
);

criterion_main!(benches);
