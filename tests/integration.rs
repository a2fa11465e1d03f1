//! Integration tests for forage

use forage::behavior::mutation::random_condition;
use forage::behavior::{
    Action, Automaton, BehaviourTree, BoolSensor, BtNode, Condition, Expression, OptimizationParameters, Preset,
    Target, Task, ValueSensor,
};
use forage::config::RunnerConfig;
use forage::grid::Pos;
use forage::map::{MapConfig, MapShape};
use forage::pathfinder::cache::{cache_dir, DIRECTION_FILE, DISTANCE_FILE};
use forage::pathfinder::{AllPairsPathfinder, Navigator, Pathfinder, PathfinderPool, POOL_CAPACITY};
use forage::results::ResultStore;
use forage::simulation::run_hidden;
use forage::{runner, Brain, Config, Map, Simulation};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

/// Colony at the west end of a corridor, density-3 food five cells east
const CORRIDOR: &str = "
    #########
    #C....3.#
    #########
";

fn small_circle(creatures: usize) -> Map {
    let config = MapConfig {
        shape: MapShape::Circle {
            r: 6,
            big_r: 7,
            food_amount: 5,
            density_min: 1,
            density_max: 5,
        },
        creature_count: creatures,
        seed: 3,
    };
    Map::generate(&config).unwrap()
}

fn custom_brain(root: BtNode) -> Brain {
    Brain::BehaviourTree(BehaviourTree::new(root))
}

fn counter(index: usize) -> BtNode {
    BtNode::Action(Action::IncrementCounter { index })
}

fn never() -> Condition {
    Condition::greater(Expression::constant(0.0), Expression::constant(1.0))
}

#[test]
fn test_single_forager_scores_on_deposit_tick() {
    let map = Map::from_ascii(CORRIDOR, 1, 1).unwrap();
    let mut config = Config::default();
    config.simulation.smell_range = 10;

    for preset in [
        Preset::BaseTree,
        Preset::MemorizingTree,
        Preset::CommunicatingTree,
        Preset::BaseAutomaton,
    ] {
        let mut sim = Simulation::new(&map, Brain::from_preset(preset), &config, 1);
        let mut scores = Vec::new();
        let mut carrying = Vec::new();
        sim.run_with_callback(15, |s| {
            scores.push(s.score());
            carrying.push(s.agents()[0].is_holding_food);
        });

        // Food is smelled on the first tick and lies 5 steps away
        assert_eq!(carrying.iter().position(|&c| c), Some(4), "{:?}", preset);
        // ...and the colony is 5 steps back
        assert!(scores[..9].iter().all(|&s| s == 0.0), "{:?}: {:?}", preset, scores);
        assert_eq!(scores[9], 3.0, "{:?}", preset);
        assert!(scores[9..].iter().all(|&s| s == 3.0));
        assert_eq!(sim.world.food_collected, 1);
        assert_eq!(sim.result().best_density, 3.0);
    }
}

#[test]
fn test_sequence_stops_at_failure() {
    let map = Map::from_ascii(CORRIDOR, 1, 1).unwrap();
    let brain = custom_brain(BtNode::Sequence(vec![
        counter(0),
        BtNode::Condition(never()),
        counter(1),
    ]));
    let mut sim = Simulation::new(&map, brain, &Config::default(), 1);
    sim.run(3);
    assert_eq!(sim.agents()[0].counters[0], 3);
    assert_eq!(sim.agents()[0].counters[1], 0);
}

#[test]
fn test_selector_stops_at_success() {
    let map = Map::from_ascii(CORRIDOR, 1, 1).unwrap();
    let brain = custom_brain(BtNode::Selector(vec![
        BtNode::Condition(never()),
        counter(0),
        counter(1),
    ]));
    let mut sim = Simulation::new(&map, brain, &Config::default(), 1);
    sim.run(3);
    assert_eq!(sim.agents()[0].counters[0], 3);
    assert_eq!(sim.agents()[0].counters[1], 0);
}

#[test]
fn test_task_ends_the_tick() {
    let map = Map::from_ascii(CORRIDOR, 1, 1).unwrap();
    let brain = custom_brain(BtNode::Selector(vec![
        BtNode::Sequence(vec![counter(0), BtNode::Task(Task::Stay), counter(1)]),
        counter(2),
    ]));
    let mut sim = Simulation::new(&map, brain, &Config::default(), 1);
    sim.run(4);
    let agent = &sim.agents()[0];
    assert_eq!(agent.counters[..3], [4, 0, 0]);
}

#[test]
fn test_skipper_and_loop() {
    let map = Map::from_ascii(CORRIDOR, 1, 1).unwrap();
    let below_five = Condition::greater(
        Expression::constant(5.0),
        Expression::value(ValueSensor::Counter(0), Target::Own),
    );
    let brain = custom_brain(BtNode::Sequence(vec![
        BtNode::Skipper {
            child: Box::new(BtNode::Condition(never())),
            value: true,
        },
        BtNode::Loop {
            condition: below_five,
            child: Box::new(counter(0)),
            max_iterations: 100,
        },
        counter(1),
    ]));
    let mut sim = Simulation::new(&map, brain, &Config::default(), 1);
    sim.step();
    assert_eq!(sim.agents()[0].counters[0], 5);
    assert_eq!(sim.agents()[0].counters[1], 1);
}

#[test]
fn test_communication_loop_cardinality() {
    let creatures = 10;
    let map = Map::from_ascii(CORRIDOR, creatures, 1).unwrap();
    let brain = custom_brain(BtNode::Sequence(vec![
        BtNode::CommunicationLoop {
            child: Box::new(counter(0)),
        },
        BtNode::Task(Task::Stay),
    ]));

    // Every eligible peer is visited when the mean is far above the population
    let mut config = Config::default();
    config.simulation.n_comm = 1000.0;
    let mut sim = Simulation::new(&map, brain.clone(), &config, 5);
    sim.run(20);
    assert!(sim.agents().iter().all(|a| a.counters[0] == 20 * (creatures as i64 - 1)));

    // Nobody is visited with a zero mean
    config.simulation.n_comm = 0.0;
    let mut sim = Simulation::new(&map, brain.clone(), &config, 5);
    sim.run(20);
    assert!(sim.agents().iter().all(|a| a.counters[0] == 0));

    // Otherwise the count follows the Poisson mean
    config.simulation.n_comm = 2.0;
    let mut sim = Simulation::new(&map, brain, &config, 5);
    let ticks = 200;
    sim.run(ticks);
    let total: i64 = sim.agents().iter().map(|a| a.counters[0]).sum();
    let mean = total as f64 / (ticks as f64 * creatures as f64);
    assert!((mean - 2.0).abs() < 0.2, "mean partners {}", mean);
}

#[test]
fn test_automaton_determinism() {
    let map = small_circle(6);
    let op = OptimizationParameters {
        condition_amount_mutate_rate: 2.0,
        ..OptimizationParameters::default()
    };
    let mut rng = ChaCha8Rng::seed_from_u64(17);
    let brain = Brain::from_preset(Preset::BaseAutomaton).create_offspring(&op, &mut rng);

    let trace = |seed: u64| {
        let mut sim = Simulation::new(&map, brain.clone(), &Config::default(), seed);
        let mut nodes = Vec::new();
        sim.run_with_callback(150, |s| {
            nodes.extend(s.agents().iter().map(|a| a.current_node));
        });
        (nodes, sim.result())
    };
    assert_eq!(trace(4), trace(4));
}

#[test]
fn test_condition_copy_and_size_laws() {
    let op = OptimizationParameters::default();
    let mut rng = ChaCha8Rng::seed_from_u64(99);

    for _ in 0..100 {
        let mut c = random_condition(&op, true, &mut rng);
        for _ in 0..rng.gen_range(0..5) {
            c.expand(&op, true, &mut rng);
        }
        let before = c.size();
        let text = c.to_string();

        let copy = c.copy();
        assert_eq!(copy.to_string(), text);

        let mut grown = c.copy();
        grown.expand(&op, true, &mut rng);
        assert_eq!(grown.size(), before + 1);
        assert_eq!(c.to_string(), text, "mutating a copy changed the original");

        grown.reduce(&mut rng);
        assert_eq!(grown.size(), before);
    }
}

#[test]
fn test_incremental_walls_match_recompute() {
    let map = small_circle(0);
    let colony = map.colony;
    let mut walls = map.walls.clone();
    let mut field = Pathfinder::new(walls.clone(), colony);
    let mut rng = ChaCha8Rng::seed_from_u64(8);

    for _ in 0..60 {
        let pos = Pos::new(rng.gen_range(0..map.width), rng.gen_range(0..map.height));
        if pos == colony {
            continue;
        }
        if walls[[pos.x, pos.y]] {
            walls[[pos.x, pos.y]] = false;
            field.remove_wall(pos);
        } else {
            walls[[pos.x, pos.y]] = true;
            field.add_wall(pos);
        }
        let fresh = Pathfinder::new(walls.clone(), colony);
        assert_eq!(field.distances(), fresh.distances(), "after toggling {}", pos);
        assert_eq!(field.directions(), fresh.directions(), "after toggling {}", pos);
    }
}

#[test]
fn test_dynamic_walls_during_run() {
    let map = small_circle(8);
    let mut sim = Simulation::new(&map, Brain::from_preset(Preset::MemorizingTree), &Config::default(), 6);
    sim.run(20);

    let colony = map.colony;
    let mut added = Vec::new();
    for x in 1..map.width - 1 {
        let pos = Pos::new(x, colony.y + 2);
        if sim.world.set_wall(pos) {
            added.push(pos);
        }
    }
    assert!(!added.is_empty());
    assert!(!sim.world.set_wall(colony));
    sim.run(20);
    assert!(sim.world.clear_wall(added[added.len() / 2]));
    sim.run(20);

    let fresh = Pathfinder::new(sim.walls().clone(), colony);
    for x in 0..map.width {
        for y in 0..map.height {
            let pos = Pos::new(x, y);
            assert_eq!(sim.world.navigator.distance(colony, pos), fresh.distance(pos), "at {}", pos);
        }
    }
    assert_eq!(sim.time(), 60);
}

#[test]
fn test_precomputed_tables_match_fields_and_cache() {
    let map = small_circle(0);
    let table = AllPairsPathfinder::build(&map);

    let sources = [map.colony, Pos::new(map.colony.x + 3, map.colony.y - 2)];
    for source in sources {
        let field = Pathfinder::new(map.walls.clone(), source);
        for x in 0..map.width {
            for y in 0..map.height {
                let pos = Pos::new(x, y);
                assert_eq!(table.distance(source, pos), field.distance(pos));
            }
        }
    }

    let cache = tempfile::tempdir().unwrap();
    let built = AllPairsPathfinder::load_or_build(&map, cache.path());
    let loaded = AllPairsPathfinder::load_or_build(&map, cache.path());
    assert_eq!(built.cell_count(), loaded.cell_count());
    assert_eq!(loaded.distance(map.colony, sources[1]), table.distance(map.colony, sources[1]));
}

#[test]
fn test_cache_for_other_layout_is_rebuilt() {
    let a = Map::from_ascii("######\n#C..##\n#.#..#\n#....#\n######", 1, 1).unwrap();
    let b = Map::from_ascii("######\n#C...#\n#.##.#\n#....#\n######", 1, 1).unwrap();
    assert_eq!(a.name, b.name);
    assert_eq!(a.open_cell_count(), b.open_cell_count());

    // A's tables sitting where B looks for its own
    let root = tempfile::tempdir().unwrap();
    let dir = cache_dir(root.path(), &b);
    AllPairsPathfinder::build(&a).save(&dir).unwrap();
    assert!(AllPairsPathfinder::load(&b, &dir).is_err());

    let fresh = AllPairsPathfinder::build(&b);
    let table = AllPairsPathfinder::load_or_build(&b, root.path());
    for x in 0..b.width {
        for y in 0..b.height {
            let pos = Pos::new(x, y);
            assert_eq!(table.distance(b.colony, pos), fresh.distance(b.colony, pos), "at {}", pos);
        }
    }
    assert_eq!(table.distance(b.colony, Pos::new(2, 3)), 3);

    // The stale tables were replaced
    let reloaded = AllPairsPathfinder::load(&b, &dir).unwrap();
    assert!(reloaded.is_mapped());
    assert_eq!(reloaded.distance(b.colony, Pos::new(4, 2)), 4);
}

#[test]
fn test_corrupt_cache_is_rebuilt() {
    let map = small_circle(0);
    let root = tempfile::tempdir().unwrap();
    let reference = AllPairsPathfinder::load_or_build(&map, root.path());
    let dir = cache_dir(root.path(), &map);
    let far = Pos::new(map.colony.x + 3, map.colony.y - 2);
    let expected = reference.distance(map.colony, far);

    let damage: [(&str, fn(Vec<u8>) -> Vec<u8>); 3] = [
        (DISTANCE_FILE, |bytes| bytes[..bytes.len() / 2].to_vec()),
        (DIRECTION_FILE, |_| Vec::new()),
        (DISTANCE_FILE, |mut bytes| {
            bytes.truncate(8);
            bytes.extend_from_slice(b"not a header at all");
            bytes
        }),
    ];
    for (file, corrupt) in damage {
        let path = dir.join(file);
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, corrupt(bytes)).unwrap();
        assert!(AllPairsPathfinder::load(&map, &dir).is_err());

        let rebuilt = AllPairsPathfinder::load_or_build(&map, root.path());
        assert_eq!(rebuilt.distance(map.colony, far), expected);
        assert_eq!(rebuilt.cell_count(), reference.cell_count());

        let reloaded = AllPairsPathfinder::load(&map, &dir).unwrap();
        assert_eq!(reloaded.distance(map.colony, far), expected);
    }
}

#[test]
fn test_long_run_keeps_field_pool_bounded() {
    let map = small_circle(8);
    let config = Config::default();
    let brain = Brain::from_preset(Preset::CommunicatingTree);

    let mut sim = Simulation::new(&map, brain.clone(), &config, 11);
    for _ in 0..12 {
        sim.run(50);
        assert!(sim.world.navigator.cached_fields() <= POOL_CAPACITY);
    }

    // Evicting fields only costs rebuilds, never changes a run
    let tight = Navigator::Incremental(PathfinderPool::with_capacity(map.walls.clone(), 2));
    let (_, bounded) = run_hidden(1, &map, &brain, &config, 300, tight);
    let (_, roomy) = run_hidden(1, &map, &brain, &config, 300, Navigator::incremental(map.walls.clone()));
    assert_eq!(bounded, roomy);
}

#[test]
fn test_precomputed_and_incremental_runs_agree() {
    let map = small_circle(5);
    let config = Config::default();
    let brain = Brain::from_preset(Preset::CommunicatingTree);
    let table = Arc::new(AllPairsPathfinder::build(&map));

    let (_, lazy) = run_hidden(2, &map, &brain, &config, 200, Navigator::incremental(map.walls.clone()));
    let (_, shared) = run_hidden(2, &map, &brain, &config, 200, Navigator::precomputed(table));
    assert_eq!(lazy, shared);
}

#[test]
fn test_batch_runs_and_records() {
    let map = small_circle(4);
    let mut config = Config::default();
    config.simulation.stats_interval = 25;
    let brain = Brain::from_preset(Preset::BaseTree);
    let runner_config = RunnerConfig {
        runs: 6,
        workers: 2,
        max_in_flight: 4,
    };

    let results = runner::run_batch(runner_config.runs, &runner_config, |id| {
        run_hidden(id, &map, &brain, &config, 100, Navigator::incremental(map.walls.clone()))
    });
    assert_eq!(results.len(), 6);
    for (i, slot) in results.iter().enumerate() {
        let (id, result) = slot.as_ref().unwrap();
        assert_eq!(*id, i);
        assert_eq!(result.collected_series.len(), 4);
    }

    let root = tempfile::tempdir().unwrap();
    let store = ResultStore::new(root.path());
    for (_, result) in results.iter().flatten() {
        store.record(&config, result).unwrap();
    }
    let experiments = store.experiments().unwrap();
    assert_eq!(experiments.len(), 1);
    assert_eq!(store.runs(&experiments[0].1).unwrap().len(), 6);
}

#[test]
fn test_exclusive_cells_never_share() {
    let map = small_circle(12);
    let mut config = Config::default();
    config.simulation.exclusive_cells = true;
    let mut sim = Simulation::new(&map, Brain::from_preset(Preset::BaseTree), &config, 11);
    let colony = map.colony;
    sim.run_with_callback(100, |s| {
        let mut cells: Vec<Pos> = s.agents().iter().map(|a| a.pos).filter(|&p| p != colony).collect();
        let n = cells.len();
        cells.sort();
        cells.dedup();
        assert_eq!(cells.len(), n, "two agents share a cell at t={}", s.time());
    });
}

#[test]
fn test_saved_brain_drives_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("brain.yaml");
    let mut automaton = Automaton::base();
    automaton.edges[1][0] = Some(Condition::not(Condition::flag(BoolSensor::IsHoldingFood, Target::Own)));
    let brain = Brain::Automaton(automaton);
    brain.save(&path).unwrap();

    let mut config = Config::default();
    config.behavior.file = Some(path);
    let loaded = Brain::from_config(&config.behavior).unwrap();
    assert_eq!(loaded, brain);

    let map = small_circle(3);
    let mut sim = Simulation::new(&map, loaded, &config, 1);
    sim.run(50);
    assert_eq!(sim.time(), 50);
}
