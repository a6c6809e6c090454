//! Ordering of genomes by their run results, and racing.
//!
//! Racing stops evaluating a genome as soon as it provably cannot end up
//! among the winners of its tournament: even if every outstanding run of the
//! genome finished with the best possible result, it would still be worse
//! than the genome at winner position `k - 1` under the assumption that all
//! outstanding runs of that one finish with the worst possible result.

use super::genome_stats::GenomeStats;
use crate::engines::generation::genome::Genome;
use crate::error::{Result, TunerError};
use crate::types::{Instance, RunResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Weights of the terms making up a genome's evaluation priority
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorityWeights {
    pub cancelled: f64,
    pub running: f64,
    pub runtime: f64,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            cancelled: 1.0,
            running: 0.5,
            runtime: 0.25,
        }
    }
}

pub trait RunEvaluator: Send + Sync {
    /// Aggregated objective of the finished results, lower is better.
    /// Genomes without finished results score `f64::INFINITY`.
    fn score(&self, stats: &GenomeStats) -> f64;

    /// Result assumed for an unfinished run in the pessimistic extension
    fn worst_case_result(&self, instance: &Instance) -> RunResult;

    /// Result assumed for an unfinished run in the optimistic extension
    fn best_case_result(&self, instance: &Instance) -> RunResult;

    fn racing_enabled(&self) -> bool;

    fn priority_weights(&self) -> PriorityWeights {
        PriorityWeights::default()
    }

    /// Share of the evaluation budget of this genome already spent, in [0, 1]
    fn runtime_rate(&self, _stats: &GenomeStats) -> f64 {
        0.0
    }

    /// Best first: more finished instances, then lower score, then genome
    /// content as a deterministic tie breaker.
    fn compare(&self, a: &GenomeStats, b: &GenomeStats) -> Ordering {
        b.finished_count()
            .cmp(&a.finished_count())
            .then_with(|| self.score(a).total_cmp(&self.score(b)))
            .then_with(|| a.genome().cmp(b.genome()))
    }

    fn sort(&self, stats: &mut [GenomeStats]) {
        stats.sort_by(|a, b| self.compare(a, b));
    }

    /// Lower values are dispatched first
    fn compute_evaluation_priority_of_genome(&self, stats: &GenomeStats) -> f64 {
        let total = stats.number_of_instances().max(1) as f64;
        let weights = self.priority_weights();
        weights.cancelled * stats.cancelled_count() as f64 / total
            + weights.running * stats.running_count() as f64 / total
            + weights.runtime * self.runtime_rate(stats)
    }

    /// Genomes of a tournament that can no longer become one of its
    /// `number_of_winners` winners.
    ///
    /// Previously cancelled genomes are reported again, so the result always
    /// covers every cancellable participant. At most
    /// `participants - number_of_winners` genomes can be cancellable;
    /// anything else means the evaluator's ordering is inconsistent and is
    /// reported as [`TunerError::RacingInvariant`].
    fn genomes_that_can_be_cancelled_by_racing(
        &self,
        stats: &[GenomeStats],
        number_of_winners: usize,
    ) -> Result<Vec<Genome>> {
        if !self.racing_enabled() || number_of_winners == 0 || number_of_winners >= stats.len() {
            return Ok(Vec::new());
        }

        let mut pessimistic: Vec<GenomeStats> = stats
            .iter()
            .map(|s| s.extended_with(|i| self.worst_case_result(i)))
            .collect();
        self.sort(&mut pessimistic);
        let racing_incumbent = &pessimistic[number_of_winners - 1];

        let cancellable: Vec<Genome> = stats
            .iter()
            .filter(|s| {
                let optimistic = s.extended_with(|i| self.best_case_result(i));
                self.compare(&optimistic, racing_incumbent) == Ordering::Greater
            })
            .map(|s| s.genome().clone())
            .collect();

        let allowed = stats.len() - number_of_winners;
        if cancellable.len() > allowed {
            return Err(TunerError::RacingInvariant {
                cancellable: cancellable.len(),
                allowed,
            });
        }
        Ok(cancellable)
    }
}
