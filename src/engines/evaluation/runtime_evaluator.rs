use super::genome_stats::GenomeStats;
use super::run_evaluator::{PriorityWeights, RunEvaluator};
use crate::types::{Instance, RunResult};
use std::time::Duration;

/// Penalized average runtime (PAR-k).
///
/// Successful runs count with their runtime, timeouts and crashes with
/// `penalization_factor * cutoff`. Every unfinished run can at worst time
/// out, so racing is always possible.
#[derive(Debug, Clone)]
pub struct RuntimeEvaluator {
    cutoff: Duration,
    penalization_factor: f64,
    weights: PriorityWeights,
}

impl RuntimeEvaluator {
    pub fn new(cutoff: Duration, penalization_factor: f64) -> Self {
        Self {
            cutoff,
            penalization_factor,
            weights: PriorityWeights::default(),
        }
    }

    pub fn with_priority_weights(mut self, weights: PriorityWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn cutoff(&self) -> Duration {
        self.cutoff
    }

    pub fn penalized_runtime(&self, result: &RunResult) -> f64 {
        if result.is_success() {
            result.runtime.min(self.cutoff).as_secs_f64()
        } else {
            self.penalization_factor * self.cutoff.as_secs_f64()
        }
    }
}

impl RunEvaluator for RuntimeEvaluator {
    fn score(&self, stats: &GenomeStats) -> f64 {
        let penalized: Vec<f64> = stats
            .finished_results()
            .map(|(_, result)| self.penalized_runtime(result))
            .collect();
        if penalized.is_empty() {
            return f64::INFINITY;
        }
        penalized.iter().sum::<f64>() / penalized.len() as f64
    }

    fn worst_case_result(&self, _instance: &Instance) -> RunResult {
        RunResult::timeout(self.cutoff)
    }

    fn best_case_result(&self, _instance: &Instance) -> RunResult {
        RunResult::success(Duration::ZERO)
    }

    fn racing_enabled(&self) -> bool {
        true
    }

    fn priority_weights(&self) -> PriorityWeights {
        self.weights
    }

    fn runtime_rate(&self, stats: &GenomeStats) -> f64 {
        let budget = self.cutoff.as_secs_f64() * stats.number_of_instances() as f64;
        if budget <= 0.0 {
            return 0.0;
        }
        (stats.total_finished_runtime().as_secs_f64() / budget).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::generation::domain::Allele;
    use crate::engines::generation::genome::Genome;

    fn genome(value: i64) -> Genome {
        let mut genome = Genome::new(0);
        genome.set_gene("x", Allele::Integer(value));
        genome
    }

    fn instances() -> Vec<Instance> {
        vec![Instance::new("i1"), Instance::new("i2")]
    }

    #[test]
    fn test_par10_score() {
        let evaluator = RuntimeEvaluator::new(Duration::from_secs(5), 10.0);
        let mut stats = GenomeStats::new(genome(1), &instances());
        stats.finish(&Instance::new("i1"), RunResult::success(Duration::from_secs(2))).unwrap();
        stats.finish(&Instance::new("i2"), RunResult::timeout(Duration::from_secs(5))).unwrap();
        assert!((evaluator.score(&stats) - 26.0).abs() < 1e-12);
    }

    #[test]
    fn test_more_finished_instances_rank_first() {
        let evaluator = RuntimeEvaluator::new(Duration::from_secs(5), 10.0);
        let mut slow = GenomeStats::new(genome(1), &instances());
        slow.finish(&Instance::new("i1"), RunResult::success(Duration::from_secs(4))).unwrap();
        slow.finish(&Instance::new("i2"), RunResult::success(Duration::from_secs(4))).unwrap();
        let mut fast = GenomeStats::new(genome(2), &instances());
        fast.finish(&Instance::new("i1"), RunResult::success(Duration::from_secs(1))).unwrap();

        let mut all = vec![fast.clone(), slow.clone()];
        evaluator.sort(&mut all);
        assert_eq!(all[0].genome(), slow.genome());
    }

    #[test]
    fn test_clearly_worse_genome_is_raced() {
        let evaluator = RuntimeEvaluator::new(Duration::from_secs(5), 10.0);
        let mut good = GenomeStats::new(genome(1), &instances());
        good.finish(&Instance::new("i1"), RunResult::success(Duration::from_secs(1))).unwrap();
        good.finish(&Instance::new("i2"), RunResult::success(Duration::from_secs(1))).unwrap();
        let mut bad = GenomeStats::new(genome(2), &instances());
        bad.finish(&Instance::new("i1"), RunResult::timeout(Duration::from_secs(5))).unwrap();
        let undecided = GenomeStats::new(genome(3), &instances());

        let cancellable = evaluator
            .genomes_that_can_be_cancelled_by_racing(&[good, bad.clone(), undecided], 1)
            .unwrap();
        assert_eq!(cancellable, vec![bad.genome().clone()]);
    }
}
