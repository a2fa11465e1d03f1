//! Result persistence in numbered experiment directories.
//!
//! ```text
//! results/
//!   experiment_0000/
//!     settings.yaml
//!     run_0000.json
//!     run_0001.json
//!   experiment_0001/
//!     ...
//! ```
//!
//! A run is filed under the experiment whose settings match its config, or
//! under a fresh experiment when none does.

use crate::config::Config;
use crate::stats::RunResult;
use std::path::{Path, PathBuf};

const EXPERIMENT_PREFIX: &str = "experiment_";
const RUN_PREFIX: &str = "run_";
const SETTINGS_FILE: &str = "settings.yaml";

pub struct ResultStore {
    root: PathBuf,
}

/// Parse the number out of `<prefix>NNNN[.ext]`
fn numbered(name: &str, prefix: &str) -> Option<usize> {
    let rest = name.strip_prefix(prefix)?;
    let digits = rest.split('.').next()?;
    digits.parse().ok()
}

/// Settings that change what a run produces. Runner, logging and navigation
/// settings do not.
fn same_experiment(a: &Config, b: &Config) -> bool {
    a.map == b.map
        && a.simulation == b.simulation
        && a.behavior == b.behavior
        && a.distortion == b.distortion
        && a.food == b.food
        && a.mutation == b.mutation
}

impl ResultStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Experiment directories in number order
    pub fn experiments(&self) -> std::io::Result<Vec<(usize, PathBuf)>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut dirs = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(n) = numbered(&name.to_string_lossy(), EXPERIMENT_PREFIX) {
                if entry.path().is_dir() {
                    dirs.push((n, entry.path()));
                }
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    /// Directory for this config, created if no existing experiment matches
    pub fn experiment_dir(&self, config: &Config) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let experiments = self.experiments()?;
        for (_, dir) in &experiments {
            let settings = dir.join(SETTINGS_FILE);
            match Config::from_file(&settings) {
                Ok(existing) if same_experiment(&existing, config) => {
                    log::debug!("Reusing {}", dir.display());
                    return Ok(dir.clone());
                }
                Ok(_) => {}
                Err(e) => log::warn!("Skipping {}: {}", settings.display(), e),
            }
        }

        let next = experiments.last().map_or(0, |(n, _)| n + 1);
        let dir = self.root.join(format!("{}{:04}", EXPERIMENT_PREFIX, next));
        std::fs::create_dir_all(&dir)?;
        config.save(dir.join(SETTINGS_FILE))?;
        log::info!("New experiment directory {}", dir.display());
        Ok(dir)
    }

    /// Append a run result, returning the file it was written to
    pub fn record(&self, config: &Config, result: &RunResult) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let dir = self.experiment_dir(config)?;
        let next = Self::run_numbers(&dir)?.last().map_or(0, |n| n + 1);
        let path = dir.join(format!("{}{:04}.json", RUN_PREFIX, next));
        result.save_json(&path)?;
        log::info!("Result saved to {}", path.display());
        Ok(path)
    }

    fn run_numbers(dir: &Path) -> std::io::Result<Vec<usize>> {
        let mut numbers = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if name.ends_with(".json") {
                if let Some(n) = numbered(&name, RUN_PREFIX) {
                    numbers.push(n);
                }
            }
        }
        numbers.sort_unstable();
        Ok(numbers)
    }

    /// All results stored for an experiment, in run order
    pub fn runs(&self, dir: &Path) -> std::io::Result<Vec<RunResult>> {
        Self::run_numbers(dir)?
            .into_iter()
            .map(|n| RunResult::load_json(dir.join(format!("{}{:04}.json", RUN_PREFIX, n))))
            .collect()
    }
}
