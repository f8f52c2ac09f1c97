//! Seeded scenario batches.
//!
//! Each run gets its own world and pipeline seeded with `base_seed + index`, so a batch is
//! reproducible regardless of how Rayon schedules it.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::data::{run_scenario, DataError, Scenario, ScenarioOutcome};
use crate::parallel::pool::WorkerPool;

/// Split `total` items into up to `num_batches` ranges `[start, end)`.
/// Earlier batches take the remainder.
///
/// # Example
/// ```
/// # use qdnd::parallel::batch_ranges;
/// let ranges = batch_ranges(100, 4);
/// assert_eq!(ranges, vec![(0, 25), (25, 50), (50, 75), (75, 100)]);
/// ```
pub fn batch_ranges(total: usize, num_batches: usize) -> Vec<(usize, usize)> {
    if total == 0 || num_batches == 0 {
        return Vec::new();
    }
    let num_batches = num_batches.min(total);
    let base = total / num_batches;
    let remainder = total % num_batches;
    let mut start = 0;
    (0..num_batches)
        .map(|i| {
            let end = start + base + usize::from(i < remainder);
            let range = (start, end);
            start = end;
            range
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchRun {
    pub seed: u64,
    pub total_damage: i32,
    pub successful_steps: usize,
    pub survivors: BTreeMap<String, usize>,
}

impl From<&ScenarioOutcome> for BatchRun {
    fn from(outcome: &ScenarioOutcome) -> Self {
        Self {
            seed: outcome.seed,
            total_damage: outcome.total_damage,
            successful_steps: outcome.successful_steps(),
            survivors: outcome.survivors.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub scenario: String,
    pub runs: usize,
    pub base_seed: u64,
    pub mean_damage: f64,
    pub min_damage: i32,
    pub max_damage: i32,
    /// Faction to the share of runs where it had at least one survivor.
    pub survival_rate: BTreeMap<String, f64>,
    /// Faction to the share of runs where it was the only faction standing.
    pub win_rate: BTreeMap<String, f64>,
    pub per_run: Vec<BatchRun>,
}

impl BatchSummary {
    fn from_runs(scenario: &Scenario, base_seed: u64, per_run: Vec<BatchRun>) -> Self {
        let runs = per_run.len();
        let mut summary = BatchSummary {
            scenario: scenario.name.clone(),
            runs,
            base_seed,
            ..BatchSummary::default()
        };
        if runs == 0 {
            return summary;
        }

        let factions: Vec<&str> = {
            let mut names: Vec<&str> =
                scenario.combatants.iter().map(|c| c.faction.as_str()).collect();
            names.sort_unstable();
            names.dedup();
            names
        };
        let mut survived: BTreeMap<String, usize> = BTreeMap::new();
        let mut won: BTreeMap<String, usize> = BTreeMap::new();
        for run in &per_run {
            let standing: Vec<&str> = factions
                .iter()
                .copied()
                .filter(|f| run.survivors.get(*f).copied().unwrap_or(0) > 0)
                .collect();
            for faction in &standing {
                *survived.entry(faction.to_string()).or_insert(0) += 1;
            }
            if let [only] = standing.as_slice() {
                *won.entry(only.to_string()).or_insert(0) += 1;
            }
        }

        let total: i64 = per_run.iter().map(|r| i64::from(r.total_damage)).sum();
        summary.mean_damage = total as f64 / runs as f64;
        summary.min_damage = per_run.iter().map(|r| r.total_damage).min().unwrap_or(0);
        summary.max_damage = per_run.iter().map(|r| r.total_damage).max().unwrap_or(0);
        for faction in factions {
            let rate = |counts: &BTreeMap<String, usize>| {
                counts.get(faction).copied().unwrap_or(0) as f64 / runs as f64
            };
            summary.survival_rate.insert(faction.to_string(), rate(&survived));
            summary.win_rate.insert(faction.to_string(), rate(&won));
        }
        summary.per_run = per_run;
        summary
    }
}

/// Runs `scenario` `runs` times in parallel and aggregates the outcomes in seed order.
pub fn run_scenario_batch(
    scenario: &Scenario,
    config: &EngineConfig,
    runs: usize,
    base_seed: u64,
    pool: &WorkerPool,
) -> Result<BatchSummary, DataError> {
    info!(scenario = %scenario.name, runs, base_seed, "running scenario batch");
    let outcomes: Result<Vec<BatchRun>, DataError> = pool.install(|| {
        (0..runs)
            .into_par_iter()
            .map(|index| {
                let seed = base_seed.wrapping_add(index as u64);
                let outcome = run_scenario(scenario, &config.clone().with_seed(seed))?;
                debug!(seed, damage = outcome.total_damage, "batch run finished");
                Ok(BatchRun::from(&outcome))
            })
            .collect()
    });
    Ok(BatchSummary::from_runs(scenario, base_seed, outcomes?))
}
