use super::traits::ConfigSection;
use crate::engines::evaluation::coordinator::CoordinatorConfig;
use crate::engines::evaluation::quality_evaluator::{OptimizationDirection, QualityEvaluator};
use crate::engines::evaluation::run_evaluator::{PriorityWeights, RunEvaluator};
use crate::engines::evaluation::runtime_evaluator::RuntimeEvaluator;
use crate::error::{Result, TunerError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Objective {
    Runtime,
    Quality,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub worker_count: usize,
    pub evaluation_limit: Option<usize>,
    pub objective: Objective,
    pub cutoff_seconds: f64,
    /// k in PAR-k
    pub penalization_factor: f64,
    pub quality_direction: OptimizationDirection,
    pub quality_lower_bound: Option<f64>,
    pub quality_upper_bound: Option<f64>,
    pub priority_weights: PriorityWeights,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            evaluation_limit: None,
            objective: Objective::Runtime,
            cutoff_seconds: 10.0,
            penalization_factor: 10.0,
            quality_direction: OptimizationDirection::Minimize,
            quality_lower_bound: None,
            quality_upper_bound: None,
            priority_weights: PriorityWeights::default(),
        }
    }
}

impl EvaluationConfig {
    pub fn to_coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            worker_count: self.worker_count,
            evaluation_limit: self.evaluation_limit,
        }
    }

    pub fn cutoff(&self) -> Duration {
        Duration::from_secs_f64(self.cutoff_seconds)
    }

    /// Run evaluator for the configured objective
    pub fn build_evaluator(&self) -> Result<Arc<dyn RunEvaluator>> {
        match self.objective {
            Objective::Runtime => Ok(Arc::new(
                RuntimeEvaluator::new(self.cutoff(), self.penalization_factor)
                    .with_priority_weights(self.priority_weights),
            )),
            Objective::Quality => {
                let mut evaluator =
                    QualityEvaluator::new(self.quality_direction).with_priority_weights(self.priority_weights);
                if let (Some(lower), Some(upper)) = (self.quality_lower_bound, self.quality_upper_bound) {
                    evaluator = evaluator.with_bounds(lower, upper)?;
                }
                Ok(Arc::new(evaluator))
            }
        }
    }
}

impl ConfigSection for EvaluationConfig {
    fn section_name() -> &'static str {
        "evaluation"
    }

    fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(TunerError::Configuration(
                "At least one evaluation worker is required".to_string(),
            ));
        }
        if !(self.cutoff_seconds.is_finite() && self.cutoff_seconds > 0.0) {
            return Err(TunerError::Configuration(
                "Cutoff must be a positive number of seconds".to_string(),
            ));
        }
        if self.penalization_factor < 1.0 {
            return Err(TunerError::Configuration(
                "Penalization factor must be at least 1".to_string(),
            ));
        }
        if self.quality_lower_bound.is_some() != self.quality_upper_bound.is_some() {
            return Err(TunerError::Configuration(
                "Quality bounds must be given together".to_string(),
            ));
        }
        if let (Some(lower), Some(upper)) = (self.quality_lower_bound, self.quality_upper_bound) {
            if !(lower < upper) {
                return Err(TunerError::Configuration(format!(
                    "Quality bounds [{}, {}] are empty",
                    lower, upper
                )));
            }
        }
        Ok(())
    }
}
