use super::traits::{check_unit_interval, ConfigSection};
use crate::engines::continuous::JadeParameters;
use crate::engines::strategies::ContinuousOptimizationMethod;
use crate::error::{Result, TunerError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContinuousConfig {
    pub method: ContinuousOptimizationMethod,
    pub max_generations_per_phase: usize,
    /// Share of the competitive group replaced at the end of a phase
    pub replacement_rate: f64,
    /// Parameters with fewer values stay fixed to the base genome
    pub minimum_domain_size: usize,
    /// Start around the incumbent instead of the whole competitive group
    pub focus_on_incumbent: bool,
    pub lower_bound: f64,
    pub upper_bound: f64,
    /// λ; derived from the dimension when unset
    pub cma_es_population_size: Option<usize>,
    pub cma_es_initial_step_size: f64,
    pub jade: JadeParameters,
    pub jade_population_size: usize,
    /// Standard deviation of local sampling, relative to the bound range
    pub local_sampling_deviation: f64,
    pub max_initial_point_attempts: usize,
}

impl Default for ContinuousConfig {
    fn default() -> Self {
        Self {
            method: ContinuousOptimizationMethod::None,
            max_generations_per_phase: 5,
            replacement_rate: 0.5,
            minimum_domain_size: 20,
            focus_on_incumbent: false,
            lower_bound: 0.0,
            upper_bound: 10.0,
            cma_es_population_size: None,
            cma_es_initial_step_size: 3.0,
            jade: JadeParameters::default(),
            jade_population_size: 8,
            local_sampling_deviation: 0.1,
            max_initial_point_attempts: 1000,
        }
    }
}

impl ConfigSection for ContinuousConfig {
    fn section_name() -> &'static str {
        "continuous"
    }

    fn validate(&self) -> Result<()> {
        if self.max_generations_per_phase == 0 {
            return Err(TunerError::Configuration(
                "A continuous phase must last at least one generation".to_string(),
            ));
        }
        check_unit_interval(Self::section_name(), "replacement_rate", self.replacement_rate)?;
        if !(self.lower_bound.is_finite() && self.upper_bound.is_finite() && self.lower_bound < self.upper_bound) {
            return Err(TunerError::Configuration(format!(
                "Search bounds [{}, {}] are not a finite interval",
                self.lower_bound, self.upper_bound
            )));
        }
        if !(self.cma_es_initial_step_size > 0.0) {
            return Err(TunerError::Configuration(
                "CMA-ES initial step size must be positive".to_string(),
            ));
        }
        if let Some(lambda) = self.cma_es_population_size {
            if lambda < 2 {
                return Err(TunerError::Configuration(
                    "CMA-ES needs a population of at least 2".to_string(),
                ));
            }
        }
        if self.jade_population_size < 3 {
            return Err(TunerError::Configuration(
                "JADE needs a population of at least 3".to_string(),
            ));
        }
        if !(self.local_sampling_deviation > 0.0) {
            return Err(TunerError::Configuration(
                "Local sampling deviation must be positive".to_string(),
            ));
        }
        if self.max_initial_point_attempts == 0 {
            return Err(TunerError::Configuration(
                "At least one initial point attempt is required".to_string(),
            ));
        }
        self.jade
            .validate()
            .map_err(|e| TunerError::Configuration(e.to_string()))
    }
}
