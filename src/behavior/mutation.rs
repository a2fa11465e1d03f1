//! Random generation and structural mutation of conditions and actions.

pub use crate::config::OptimizationParameters;

use super::action::Action;
use super::condition::{Condition, Expression};
use super::sensors::{BoolSensor, ValueSensor};
use super::Target;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::{Distribution, Poisson};

/// Poisson draw; a non-positive mean always yields zero
pub fn poisson(lambda: f64, rng: &mut impl Rng) -> u64 {
    if lambda <= 0.0 || !lambda.is_finite() {
        return 0;
    }
    match Poisson::new(lambda) {
        Ok(dist) => {
            let sample: f64 = dist.sample(rng);
            sample as u64
        }
        Err(_) => 0,
    }
}

/// Whose state a freshly generated sensor reads
pub fn random_target(op: &OptimizationParameters, queried: bool, rng: &mut impl Rng) -> Target {
    if queried && rng.gen::<f64>() < op.p_queried {
        Target::Queried
    } else if rng.gen::<f64>() < op.p_target_self {
        Target::Own
    } else {
        Target::Saved
    }
}

pub fn random_value(op: &OptimizationParameters, queried: bool, rng: &mut impl Rng) -> Expression {
    let sensor = ValueSensor::RANDOM_POOL[rng.gen_range(0..ValueSensor::RANDOM_POOL.len())];
    Expression::value(sensor, random_target(op, queried, rng))
}

/// A random atom: a boolean sensor, or a comparison of two values where one
/// side may be an integer constant
pub fn random_condition(op: &OptimizationParameters, queried: bool, rng: &mut impl Rng) -> Condition {
    let n_bool = BoolSensor::RANDOM_POOL.len();
    let n_value = ValueSensor::RANDOM_POOL.len();
    let p_bool = n_bool as f64 / (n_bool + n_value) as f64;

    if rng.gen::<f64>() < p_bool {
        let sensor = BoolSensor::RANDOM_POOL[rng.gen_range(0..n_bool)];
        return Condition::flag(sensor, random_target(op, queried, rng));
    }

    if rng.gen::<f64>() < op.p_const {
        let constant = if op.const_min < op.const_max {
            rng.gen_range(op.const_min..op.const_max)
        } else {
            op.const_min
        };
        let constant = Expression::constant(constant as f64);
        let value = random_value(op, queried, rng);
        if rng.gen_bool(0.5) {
            Condition::greater(constant, value)
        } else {
            Condition::greater(value, constant)
        }
    } else {
        let left = random_value(op, queried, rng);
        let right = random_value(op, queried, rng);
        Condition::greater(left, right)
    }
}

/// Grow or shrink a condition by the difference of two Poisson draws.
/// Growing a missing condition creates a random atom; shrinking never
/// removes the last atom.
pub fn mutate_condition(
    condition: Option<Condition>,
    op: &OptimizationParameters,
    queried: bool,
    rng: &mut impl Rng,
) -> Option<Condition> {
    let grow = poisson(op.condition_mutate_rate, rng) as i64;
    let shrink = poisson(op.condition_mutate_rate, rng) as i64;
    let mutations = grow - shrink;

    let mut condition = condition;
    if mutations > 0 {
        for _ in 0..mutations {
            condition = Some(match condition {
                None => random_condition(op, queried, rng),
                Some(mut c) => {
                    c.expand(op, queried, rng);
                    c
                }
            });
        }
    } else if let Some(c) = condition.as_mut() {
        for _ in 0..(-mutations) {
            c.reduce(rng);
        }
    }
    condition
}

/// A random action with default parameters
pub fn random_action(rng: &mut impl Rng) -> Action {
    let pool = [
        Action::SetWaypoint,
        Action::ResetWaypoint { register: None },
        Action::SelectTargetAgent { condition: None },
        Action::CopyWaypoint { from: Target::Saved },
        Action::ForgetTarget,
    ];
    pool.choose(rng).cloned().unwrap_or(Action::SetWaypoint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_poisson_mean() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let n = 5000;
        let total: u64 = (0..n).map(|_| poisson(2.0, &mut rng)).sum();
        let mean = total as f64 / n as f64;
        assert!((mean - 2.0).abs() < 0.1, "mean {}", mean);
        assert_eq!(poisson(0.0, &mut rng), 0);
    }

    #[test]
    fn test_random_conditions_are_atoms() {
        let op = OptimizationParameters::default();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..200 {
            let c = random_condition(&op, true, &mut rng);
            assert_eq!(c.size(), 1);
            assert!(c.removables().is_empty());
        }
    }

    #[test]
    fn test_queried_targets_only_when_allowed() {
        let op = OptimizationParameters {
            p_queried: 1.0,
            ..OptimizationParameters::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        assert!((0..100).all(|_| random_target(&op, true, &mut rng) == Target::Queried));
        assert!((0..100).all(|_| random_target(&op, false, &mut rng) != Target::Queried));
    }

    #[test]
    fn test_mutate_missing_condition() {
        let op = OptimizationParameters {
            condition_mutate_rate: 3.0,
            ..OptimizationParameters::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let mut grew = false;
        for _ in 0..50 {
            if let Some(c) = mutate_condition(None, &op, false, &mut rng) {
                assert!(c.size() >= 1);
                grew = true;
            }
        }
        assert!(grew);
    }

    #[test]
    fn test_mutation_disabled_keeps_condition() {
        let op = OptimizationParameters {
            condition_mutate_rate: 0.0,
            ..OptimizationParameters::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let c = Condition::flag(BoolSensor::IsHoldingFood, Target::Own);
        assert_eq!(mutate_condition(Some(c.clone()), &op, false, &mut rng), Some(c));
        assert_eq!(mutate_condition(None, &op, false, &mut rng), None);
    }
}
