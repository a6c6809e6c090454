//! Termination criteria for CMA-ES, after Hansen's "The CMA Evolution
//! Strategy: A Tutorial" (section B.3).

use super::elements::CmaEsElements;
use crate::error::{Result, TunerError};
use std::fmt::Debug;

pub trait TerminationCriterion: Debug + Send + Sync {
    fn is_met(&self, elements: &CmaEsElements) -> Result<bool>;

    fn name(&self) -> &'static str;
}

/// Stops after a fixed number of generations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxIterations {
    pub maximum: usize,
}

impl MaxIterations {
    pub fn new(maximum: usize) -> Self {
        Self { maximum }
    }
}

impl TerminationCriterion for MaxIterations {
    fn is_met(&self, elements: &CmaEsElements) -> Result<bool> {
        Ok(elements.generation >= self.maximum)
    }

    fn name(&self) -> &'static str {
        "MaxIterations"
    }
}

/// Condition number of the covariance matrix exceeds 1e14
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConditionCov;

impl ConditionCov {
    pub const MAX_CONDITION: f64 = 1e14;
}

impl TerminationCriterion for ConditionCov {
    fn is_met(&self, elements: &CmaEsElements) -> Result<bool> {
        let decomposition = elements.covariances_decomposition()?;
        let max = decomposition.max_eigenvalue();
        let min = decomposition.min_eigenvalue();
        if min <= 0.0 {
            return Ok(max > 0.0);
        }
        Ok(max / min > Self::MAX_CONDITION)
    }

    fn name(&self) -> &'static str {
        "ConditionCov"
    }
}

/// Adding 0.1 standard deviations along one principal axis does not change
/// the mean. The axis cycles with the generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoEffectAxis;

impl TerminationCriterion for NoEffectAxis {
    fn is_met(&self, elements: &CmaEsElements) -> Result<bool> {
        let mean = elements.distribution_mean()?;
        let step_size = elements.step_size()?;
        let decomposition = elements.covariances_decomposition()?;
        let n = mean.len();
        if n == 0 || decomposition.dimension() != n {
            return Err(TunerError::Precondition(format!(
                "mean of dimension {} does not fit a decomposition of dimension {}",
                n,
                decomposition.dimension()
            )));
        }

        let axis = elements.generation % n;
        let scale = 0.1 * step_size * decomposition.eigenvalues[axis].sqrt();
        let direction = decomposition.eigenvectors.column(axis);
        let shifted = mean + direction * scale;
        Ok(shifted == *mean)
    }

    fn name(&self) -> &'static str {
        "NoEffectAxis"
    }
}

/// Adding 0.2 standard deviations in some coordinate does not change the
/// mean in that coordinate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoEffectCoord;

impl TerminationCriterion for NoEffectCoord {
    fn is_met(&self, elements: &CmaEsElements) -> Result<bool> {
        let mean = elements.distribution_mean()?;
        let step_size = elements.step_size()?;
        let covariances = elements.covariances()?;
        if covariances.nrows() != mean.len() {
            return Err(TunerError::Precondition(format!(
                "mean of dimension {} does not fit a {}x{} covariance matrix",
                mean.len(),
                covariances.nrows(),
                covariances.ncols()
            )));
        }

        Ok((0..mean.len()).any(|i| {
            let shift = 0.2 * step_size * covariances[(i, i)].max(0.0).sqrt();
            mean[i] + shift == mean[i]
        }))
    }

    fn name(&self) -> &'static str {
        "NoEffectCoord"
    }
}

/// The step size grew by more than `MAX_FACTOR · √λ_max` relative to the
/// initial step size. Usually means the initial step size was far too small
/// or the search diverges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TolUpSigma;

impl TolUpSigma {
    pub const MAX_FACTOR: f64 = 1e4;
}

impl TerminationCriterion for TolUpSigma {
    fn is_met(&self, elements: &CmaEsElements) -> Result<bool> {
        let step_size = elements.step_size()?;
        let initial_step_size = elements.configuration()?.initial_step_size;
        let max_eigenvalue = elements.covariances_decomposition()?.max_eigenvalue();
        Ok(step_size > Self::MAX_FACTOR * max_eigenvalue.sqrt() * initial_step_size)
    }

    fn name(&self) -> &'static str {
        "TolUpSigma"
    }
}

/// Criteria used when nothing else is configured
pub fn default_termination_criteria(max_iterations: usize) -> Vec<Box<dyn TerminationCriterion>> {
    vec![
        Box::new(MaxIterations::new(max_iterations)),
        Box::new(ConditionCov),
        Box::new(NoEffectAxis),
        Box::new(NoEffectCoord),
        Box::new(TolUpSigma),
    ]
}
