//! Covariance matrix adaptation evolution strategy.
//!
//! Each generation runs three steps:
//!
//! ```text
//! Sampling:  x_k = m + σ B D z_k,  z_k ~ N(0, I),  k = 1..λ
//! Ranking:   x_{1:λ}, ..., x_{λ:λ} via mini tournaments
//! Adapting:  m, p_σ, p_c, C and σ from the μ best points
//! ```
//!
//! Learning rates follow Hansen's default formulae. The update uses the
//! sampled coordinates even when the decoded genome had to be repaired.

pub mod elements;
pub mod termination;

pub use elements::{CmaEsElements, EigenDecomposition};
pub use termination::{
    default_termination_criteria, ConditionCov, MaxIterations, NoEffectAxis, NoEffectCoord,
    TerminationCriterion, TolUpSigma,
};

use super::search_point::{SearchPoint, SearchSpace};
use super::SearchPointRanking;
use crate::error::{Result, TunerError};
use log::{debug, warn};
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

/// Strategy parameters of CMA-ES
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CmaEsConfiguration {
    /// λ
    pub population_size: usize,
    /// μ
    pub parent_number: usize,
    pub dimension: usize,
    /// Positive, decreasing, summing to one
    pub weights: DVector<f64>,
    /// μ_eff
    pub variance_effective_selection_mass: f64,
    /// c_c
    pub cumulation_learning_rate: f64,
    /// c_σ
    pub step_size_learning_rate: f64,
    /// d_σ
    pub step_size_damping: f64,
    /// c_1
    pub rank_one_learning_rate: f64,
    /// c_μ
    pub rank_mu_learning_rate: f64,
    /// E‖N(0, I)‖
    pub expected_norm: f64,
    /// σ₀
    pub initial_step_size: f64,
}

impl CmaEsConfiguration {
    pub fn new(population_size: usize, dimension: usize, initial_step_size: f64) -> Result<Self> {
        if population_size < 2 {
            return Err(TunerError::InvalidArgument(format!(
                "CMA-ES needs a population size of at least 2, got {}",
                population_size
            )));
        }
        if dimension == 0 {
            return Err(TunerError::InvalidArgument(
                "CMA-ES needs at least one dimension".to_string(),
            ));
        }
        if !(initial_step_size.is_finite() && initial_step_size > 0.0) {
            return Err(TunerError::InvalidArgument(format!(
                "Initial step size must be positive, got {}",
                initial_step_size
            )));
        }

        let n = dimension as f64;
        let mu = population_size / 2;

        let raw_weights: Vec<f64> = (0..mu)
            .map(|i| (mu as f64 + 0.5).ln() - ((i + 1) as f64).ln())
            .collect();
        let weight_sum: f64 = raw_weights.iter().sum();
        let weights = DVector::from_iterator(mu, raw_weights.iter().map(|w| w / weight_sum));
        let mu_eff = 1.0 / weights.iter().map(|w| w * w).sum::<f64>();

        let c_sigma = (mu_eff + 2.0) / (n + mu_eff + 5.0);
        let d_sigma = 1.0 + 2.0 * (((mu_eff - 1.0) / (n + 1.0)).sqrt() - 1.0).max(0.0) + c_sigma;
        let c_c = (4.0 + mu_eff / n) / (n + 4.0 + 2.0 * mu_eff / n);
        let c_1 = 2.0 / ((n + 1.3).powi(2) + mu_eff);
        let c_mu = (2.0 * (mu_eff - 2.0 + 1.0 / mu_eff) / ((n + 2.0).powi(2) + mu_eff)).min(1.0 - c_1);
        let expected_norm = n.sqrt() * (1.0 - 1.0 / (4.0 * n) + 1.0 / (21.0 * n.powi(2)));

        Ok(Self {
            population_size,
            parent_number: mu,
            dimension,
            weights,
            variance_effective_selection_mass: mu_eff,
            cumulation_learning_rate: c_c,
            step_size_learning_rate: c_sigma,
            step_size_damping: d_sigma,
            rank_one_learning_rate: c_1,
            rank_mu_learning_rate: c_mu,
            expected_norm,
            initial_step_size,
        })
    }

    /// λ = 4 + ⌊3 ln n⌋
    pub fn default_population_size(dimension: usize) -> usize {
        4 + (3.0 * (dimension.max(1) as f64).ln()).floor() as usize
    }
}

pub struct CmaEs {
    elements: CmaEsElements,
    termination_criteria: Vec<Box<dyn TerminationCriterion>>,
    most_recent_sorting: Vec<SearchPoint>,
}

impl CmaEs {
    pub fn new(termination_criteria: Vec<Box<dyn TerminationCriterion>>) -> Self {
        Self {
            elements: CmaEsElements::default(),
            termination_criteria,
            most_recent_sorting: Vec::new(),
        }
    }

    /// Continues a run from a stored state
    pub fn from_elements(
        elements: CmaEsElements,
        termination_criteria: Vec<Box<dyn TerminationCriterion>>,
    ) -> Result<Self> {
        if !elements.is_consistent() {
            return Err(TunerError::Precondition(
                "CMA-ES state is incomplete or has mismatching dimensions".to_string(),
            ));
        }
        Ok(Self {
            elements,
            termination_criteria,
            most_recent_sorting: Vec::new(),
        })
    }

    /// Starts a fresh run: `C = I`, empty evolution paths, `σ = σ₀`
    pub fn initialize(&mut self, configuration: CmaEsConfiguration, initial_mean: DVector<f64>) -> Result<()> {
        let n = configuration.dimension;
        if initial_mean.len() != n {
            return Err(TunerError::Precondition(format!(
                "initial mean has dimension {}, expected {}",
                initial_mean.len(),
                n
            )));
        }
        let covariances = DMatrix::identity(n, n);
        self.elements = CmaEsElements {
            generation: 0,
            distribution_mean: Some(initial_mean),
            step_size: Some(configuration.initial_step_size),
            covariances_decomposition: Some(EigenDecomposition::new(&covariances)),
            covariances: Some(covariances),
            evolution_path: Some(DVector::zeros(n)),
            conjugate_evolution_path: Some(DVector::zeros(n)),
            configuration: Some(configuration),
        };
        self.most_recent_sorting.clear();
        Ok(())
    }

    pub fn elements(&self) -> &CmaEsElements {
        &self.elements
    }

    pub fn generation(&self) -> usize {
        self.elements.generation
    }

    /// Points of the last generation, best first
    pub fn most_recent_sorting(&self) -> &[SearchPoint] {
        &self.most_recent_sorting
    }

    pub fn any_termination_criterion_met(&self) -> Result<bool> {
        for criterion in &self.termination_criteria {
            if criterion.is_met(&self.elements)? {
                debug!("CMA-ES termination criterion {} is met", criterion.name());
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Samples, ranks and adapts once. Returns the ranked points, best first.
    pub fn next_generation(
        &mut self,
        ranking: &mut dyn SearchPointRanking,
        space: &SearchSpace,
        rng: &mut StdRng,
    ) -> Result<Vec<SearchPoint>> {
        let configuration = self.elements.configuration()?.clone();
        if space.dimension() != configuration.dimension {
            return Err(TunerError::Precondition(format!(
                "search space has dimension {}, CMA-ES runs in {}",
                space.dimension(),
                configuration.dimension
            )));
        }

        let sampled = self.sample(&configuration, rng)?;
        let points = space.decode_all(
            &sampled
                .iter()
                .map(|x| x.iter().copied().collect())
                .collect::<Vec<Vec<f64>>>(),
        )?;

        let genomes: Vec<_> = points.iter().map(|p| p.genome().clone()).collect();
        let order = ranking.rank_population(&genomes, configuration.parent_number)?;
        if order.len() != sampled.len() {
            return Err(TunerError::Precondition(format!(
                "ranking returned {} indices for {} points",
                order.len(),
                sampled.len()
            )));
        }

        let ranked: Vec<&DVector<f64>> = order.iter().map(|&i| &sampled[i]).collect();
        self.adapt(&configuration, &ranked)?;

        self.most_recent_sorting = order.iter().map(|&i| points[i].clone()).collect();
        Ok(self.most_recent_sorting.clone())
    }

    fn sample(&self, configuration: &CmaEsConfiguration, rng: &mut StdRng) -> Result<Vec<DVector<f64>>> {
        let mean = self.elements.distribution_mean()?;
        let sigma = self.elements.step_size()?;
        let transformation = self.elements.covariances_decomposition()?.transformation();
        let n = configuration.dimension;

        Ok((0..configuration.population_size)
            .map(|_| {
                let z: DVector<f64> = DVector::from_iterator(n, (0..n).map(|_| StandardNormal.sample(rng)));
                mean + sigma * &transformation * z
            })
            .collect())
    }

    fn adapt(&mut self, configuration: &CmaEsConfiguration, ranked: &[&DVector<f64>]) -> Result<()> {
        let n = configuration.dimension;
        let mu = configuration.parent_number;
        let mu_eff = configuration.variance_effective_selection_mass;
        let c_sigma = configuration.step_size_learning_rate;
        let c_c = configuration.cumulation_learning_rate;
        let c_1 = configuration.rank_one_learning_rate;
        let c_mu = configuration.rank_mu_learning_rate;

        let old_mean = self.elements.distribution_mean()?.clone();
        let sigma = self.elements.step_size()?;
        let covariances = self.elements.covariances()?.clone();
        let inverse_sqrt = self.elements.covariances_decomposition()?.inverse_sqrt();
        let p_sigma = self.elements.conjugate_evolution_path()?.clone();
        let p_c = self.elements.evolution_path()?.clone();

        let mut new_mean: DVector<f64> = DVector::zeros(n);
        for (i, x) in ranked.iter().take(mu).enumerate() {
            new_mean += configuration.weights[i] * *x;
        }
        let mean_shift = (&new_mean - &old_mean) / sigma;

        let p_sigma = (1.0 - c_sigma) * p_sigma
            + (c_sigma * (2.0 - c_sigma) * mu_eff).sqrt() * &inverse_sqrt * &mean_shift;

        let generation_factor = 1.0 - (1.0 - c_sigma).powi(2 * (self.elements.generation as i32 + 1));
        let p_sigma_norm = p_sigma.norm();
        let h_sigma_threshold = (1.4 + 2.0 / (n as f64 + 1.0)) * configuration.expected_norm;
        let h_sigma = if p_sigma_norm / generation_factor.sqrt() < h_sigma_threshold {
            1.0
        } else {
            0.0
        };

        let p_c = (1.0 - c_c) * p_c + h_sigma * (c_c * (2.0 - c_c) * mu_eff).sqrt() * &mean_shift;

        let mut rank_mu: DMatrix<f64> = DMatrix::zeros(n, n);
        for (i, x) in ranked.iter().take(mu).enumerate() {
            let y = (*x - &old_mean) / sigma;
            rank_mu += configuration.weights[i] * &y * y.transpose();
        }

        let delta_h_sigma = (1.0 - h_sigma) * c_c * (2.0 - c_c);
        let keep = 1.0 - c_1 - c_mu + c_1 * delta_h_sigma;
        let covariances = keep * covariances + c_1 * &p_c * p_c.transpose() + c_mu * rank_mu;
        let covariances = (&covariances + covariances.transpose()) * 0.5;

        let sigma = sigma * ((c_sigma / configuration.step_size_damping) * (p_sigma_norm / configuration.expected_norm - 1.0)).exp();

        let diverged = new_mean.iter().any(|v| !v.is_finite())
            || !sigma.is_finite()
            || covariances.iter().any(|v| !v.is_finite());
        if diverged {
            warn!(
                "CMA-ES generation {}: non-finite state, resetting distribution around the old mean",
                self.elements.generation
            );
            let identity = DMatrix::identity(n, n);
            self.elements.distribution_mean = Some(old_mean);
            self.elements.step_size = Some(configuration.initial_step_size);
            self.elements.covariances_decomposition = Some(EigenDecomposition::new(&identity));
            self.elements.covariances = Some(identity);
            self.elements.evolution_path = Some(DVector::zeros(n));
            self.elements.conjugate_evolution_path = Some(DVector::zeros(n));
        } else {
            self.elements.distribution_mean = Some(new_mean);
            self.elements.step_size = Some(sigma);
            self.elements.covariances_decomposition = Some(EigenDecomposition::new(&covariances));
            self.elements.covariances = Some(covariances);
            self.elements.evolution_path = Some(p_c);
            self.elements.conjugate_evolution_path = Some(p_sigma);
        }

        self.elements.generation += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configuration_follows_hansen() {
        let configuration = CmaEsConfiguration::new(10, 5, 0.5).unwrap();
        assert_eq!(configuration.parent_number, 5);
        assert!((configuration.weights.sum() - 1.0).abs() < 1e-12);
        assert!(configuration.weights.iter().zip(configuration.weights.iter().skip(1)).all(|(a, b)| a > b));
        assert!(configuration.variance_effective_selection_mass > 1.0);
        assert!(configuration.variance_effective_selection_mass <= 5.0);
        assert!(configuration.rank_one_learning_rate + configuration.rank_mu_learning_rate <= 1.0);
    }

    #[test]
    fn test_configuration_rejects_tiny_population() {
        assert!(CmaEsConfiguration::new(1, 3, 0.5).is_err());
        assert_eq!(CmaEsConfiguration::default_population_size(10), 10);
    }

    #[test]
    fn test_initialize_checks_dimension() {
        let mut cma_es = CmaEs::new(default_termination_criteria(10));
        let configuration = CmaEsConfiguration::new(6, 2, 1.0).unwrap();
        assert!(cma_es.initialize(configuration.clone(), DVector::zeros(3)).is_err());
        cma_es.initialize(configuration, DVector::zeros(2)).unwrap();
        assert!(cma_es.elements().is_consistent());
        assert!(!cma_es.any_termination_criterion_met().unwrap());
    }
}
