use super::genome_stats::GenomeStats;
use super::run_evaluator::{PriorityWeights, RunEvaluator};
use crate::error::{Result, TunerError};
use crate::types::{Instance, RunResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizationDirection {
    Minimize,
    Maximize,
}

/// Average solution quality reported by the target algorithm.
///
/// Racing needs an a-priori range of possible qualities; without one every
/// genome is evaluated on every instance.
#[derive(Debug, Clone)]
pub struct QualityEvaluator {
    direction: OptimizationDirection,
    bounds: Option<(f64, f64)>,
    weights: PriorityWeights,
}

impl QualityEvaluator {
    pub fn new(direction: OptimizationDirection) -> Self {
        Self {
            direction,
            bounds: None,
            weights: PriorityWeights::default(),
        }
    }

    /// Known range `[lower, upper]` of qualities; enables racing
    pub fn with_bounds(mut self, lower: f64, upper: f64) -> Result<Self> {
        if !(lower.is_finite() && upper.is_finite()) || lower > upper {
            return Err(TunerError::InvalidArgument(format!(
                "Invalid quality bounds [{}, {}]",
                lower, upper
            )));
        }
        self.bounds = Some((lower, upper));
        Ok(self)
    }

    pub fn with_priority_weights(mut self, weights: PriorityWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn direction(&self) -> OptimizationDirection {
        self.direction
    }

    fn worst_quality(&self) -> f64 {
        match (self.direction, self.bounds) {
            (OptimizationDirection::Minimize, Some((_, upper))) => upper,
            (OptimizationDirection::Maximize, Some((lower, _))) => lower,
            (OptimizationDirection::Minimize, None) => f64::INFINITY,
            (OptimizationDirection::Maximize, None) => f64::NEG_INFINITY,
        }
    }

    fn best_quality(&self) -> f64 {
        match (self.direction, self.bounds) {
            (OptimizationDirection::Minimize, Some((lower, _))) => lower,
            (OptimizationDirection::Maximize, Some((_, upper))) => upper,
            (OptimizationDirection::Minimize, None) => f64::NEG_INFINITY,
            (OptimizationDirection::Maximize, None) => f64::INFINITY,
        }
    }

    /// Quality of a result as a cost; failed runs count as the worst quality
    fn cost(&self, result: &RunResult) -> f64 {
        let quality = match result.quality {
            Some(q) if result.is_success() && !q.is_nan() => q,
            _ => self.worst_quality(),
        };
        match self.direction {
            OptimizationDirection::Minimize => quality,
            OptimizationDirection::Maximize => -quality,
        }
    }
}

impl RunEvaluator for QualityEvaluator {
    fn score(&self, stats: &GenomeStats) -> f64 {
        let costs: Vec<f64> = stats
            .finished_results()
            .map(|(_, result)| self.cost(result))
            .collect();
        if costs.is_empty() {
            return f64::INFINITY;
        }
        costs.iter().sum::<f64>() / costs.len() as f64
    }

    fn worst_case_result(&self, _instance: &Instance) -> RunResult {
        RunResult::with_quality(Duration::ZERO, self.worst_quality())
    }

    fn best_case_result(&self, _instance: &Instance) -> RunResult {
        RunResult::with_quality(Duration::ZERO, self.best_quality())
    }

    fn racing_enabled(&self) -> bool {
        self.bounds.is_some()
    }

    fn priority_weights(&self) -> PriorityWeights {
        self.weights
    }
}
