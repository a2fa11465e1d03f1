//! Bounded parallel batch runner.
//!
//! Runs are independent closures farmed out to a rayon pool, at most
//! `max_in_flight` at a time. A run that panics is logged and its slot stays
//! `None`; the other runs carry on and nothing is retried.

use crate::config::RunnerConfig;
use rayon::prelude::*;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Run `f(0..count)` in parallel, returning results in id order
pub fn run_batch<T, F>(count: usize, config: &RunnerConfig, f: F) -> Vec<Option<T>>
where
    T: Send,
    F: Fn(usize) -> T + Sync,
{
    let batch = || {
        let chunk = config.max_in_flight.max(1);
        let mut results = Vec::with_capacity(count);
        for start in (0..count).step_by(chunk) {
            let end = (start + chunk).min(count);
            let mut part: Vec<Option<T>> = (start..end).into_par_iter().map(|id| guarded(id, &f)).collect();
            results.append(&mut part);
            log::debug!("batch progress: {} / {}", end, count);
        }
        results
    };

    match rayon::ThreadPoolBuilder::new().num_threads(config.workers).build() {
        Ok(pool) => pool.install(batch),
        Err(e) => {
            log::warn!("Could not build a pool of {} workers ({}), using the global pool", config.workers, e);
            batch()
        }
    }
}

fn guarded<T, F>(id: usize, f: &F) -> Option<T>
where
    F: Fn(usize) -> T,
{
    match catch_unwind(AssertUnwindSafe(|| f(id))) {
        Ok(value) => Some(value),
        Err(payload) => {
            log::error!("run {} failed: {}", id, panic_message(payload.as_ref()));
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(workers: usize, max_in_flight: usize) -> RunnerConfig {
        RunnerConfig {
            runs: 0,
            workers,
            max_in_flight,
        }
    }

    #[test]
    fn test_results_in_order() {
        let results = run_batch(10, &config(3, 4), |id| id * id);
        let expected: Vec<Option<usize>> = (0..10).map(|i| Some(i * i)).collect();
        assert_eq!(results, expected);
    }

    #[test]
    fn test_failed_run_leaves_empty_slot() {
        let results = run_batch(5, &config(2, 2), |id| {
            if id == 3 {
                panic!("run {} exploded", id);
            }
            id
        });
        assert_eq!(results, vec![Some(0), Some(1), Some(2), None, Some(4)]);
    }

    #[test]
    fn test_empty_batch() {
        let results: Vec<Option<u8>> = run_batch(0, &config(0, 0), |_| 1);
        assert!(results.is_empty());
    }
}
