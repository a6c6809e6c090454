//! JADE: adaptive differential evolution with an optional external archive.
//!
//! ```text
//! For each target x_i:
//!   F_i  ~ Cauchy(μ_F, 0.1), regenerated while ≤ 0, truncated to 1
//!   CR_i ~ N(μ_CR, 0.1), clamped to [0, 1]
//!   v_i  = x_i + F_i (x_pbest - x_i) + F_i (x_r1 - x̃_r2)
//!   u_i  = binomial crossover of x_i and v_i with rate CR_i
//!   x_i' = u_i if u_i wins its mini tournament against x_i
//! ```
//!
//! `x_pbest` is drawn from the best `best_percentage` of the ranked
//! population, `x̃_r2` from the population and the archive of replaced
//! targets. Successful F and CR values pull μ_F (Lehmer mean) and μ_CR
//! (arithmetic mean) with rate `learning_rate`. A trial keeps the
//! parameters of its target that are not encoded.
//!
//! Reference: Zhang & Sanderson (2009), "JADE: Adaptive Differential
//! Evolution With Optional External Archive".

use super::search_point::{SearchPoint, SearchSpace};
use super::SearchPointRanking;
use crate::engines::generation::genome::Genome;
use crate::error::{Result, TunerError};
use log::debug;
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Cauchy, Distribution, Normal};
use serde::{Deserialize, Serialize};

const MAX_MUTATION_FACTOR_DRAWS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JadeParameters {
    /// Share of the population pbest is drawn from, in (0, 1]
    pub best_percentage: f64,
    pub initial_mean_mutation_factor: f64,
    pub initial_mean_crossover_rate: f64,
    /// c
    pub learning_rate: f64,
}

impl Default for JadeParameters {
    fn default() -> Self {
        Self {
            best_percentage: 0.1,
            initial_mean_mutation_factor: 0.5,
            initial_mean_crossover_rate: 0.5,
            learning_rate: 0.1,
        }
    }
}

impl JadeParameters {
    pub fn validate(&self) -> Result<()> {
        if !(self.best_percentage > 0.0 && self.best_percentage <= 1.0) {
            return Err(TunerError::InvalidArgument(format!(
                "best_percentage must be in (0, 1], got {}",
                self.best_percentage
            )));
        }
        for (name, value) in [
            ("initial_mean_mutation_factor", self.initial_mean_mutation_factor),
            ("initial_mean_crossover_rate", self.initial_mean_crossover_rate),
            ("learning_rate", self.learning_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(TunerError::InvalidArgument(format!(
                    "{} must be in [0, 1], got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifferentialEvolution {
    parameters: JadeParameters,
    population: Vec<SearchPoint>,
    /// Population is ordered best first
    sorted: bool,
    archive: Vec<Vec<f64>>,
    mean_mutation_factor: f64,
    mean_crossover_rate: f64,
    generation: usize,
}

impl DifferentialEvolution {
    pub fn new(initial_points: Vec<SearchPoint>, parameters: JadeParameters) -> Result<Self> {
        if initial_points.len() < 3 {
            return Err(TunerError::InvalidArgument(format!(
                "Differential evolution needs at least 3 points, got {}",
                initial_points.len()
            )));
        }
        let dimension = initial_points[0].values().len();
        if initial_points.iter().any(|p| p.values().len() != dimension) {
            return Err(TunerError::InvalidArgument(
                "All initial points must have the same dimension".to_string(),
            ));
        }
        parameters.validate()?;

        Ok(Self {
            mean_mutation_factor: parameters.initial_mean_mutation_factor,
            mean_crossover_rate: parameters.initial_mean_crossover_rate,
            parameters,
            population: initial_points,
            sorted: false,
            archive: Vec::new(),
            generation: 0,
        })
    }

    pub fn population(&self) -> &[SearchPoint] {
        &self.population
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    pub fn archive(&self) -> &[Vec<f64>] {
        &self.archive
    }

    pub fn mean_mutation_factor(&self) -> f64 {
        self.mean_mutation_factor
    }

    pub fn mean_crossover_rate(&self) -> f64 {
        self.mean_crossover_rate
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn parameters(&self) -> &JadeParameters {
        &self.parameters
    }

    fn pbest_count(&self) -> usize {
        ((self.parameters.best_percentage * self.population.len() as f64).ceil() as usize)
            .clamp(1, self.population.len())
    }

    /// Orders the population best first
    pub fn sort_population(&mut self, ranking: &mut dyn SearchPointRanking) -> Result<()> {
        let genomes: Vec<_> = self.population.iter().map(|p| p.genome().clone()).collect();
        let order = ranking.rank_population(&genomes, self.pbest_count())?;
        if order.len() != self.population.len() {
            return Err(TunerError::Precondition(format!(
                "ranking returned {} indices for {} points",
                order.len(),
                self.population.len()
            )));
        }
        self.population = order.iter().map(|&i| self.population[i].clone()).collect();
        self.sorted = true;
        Ok(())
    }

    /// One JADE generation. Returns the new population, best first.
    pub fn next_generation(
        &mut self,
        ranking: &mut dyn SearchPointRanking,
        space: &SearchSpace,
        rng: &mut StdRng,
    ) -> Result<Vec<SearchPoint>> {
        if space.dimension() != self.population[0].values().len() {
            return Err(TunerError::Precondition(format!(
                "search space has dimension {}, population has {}",
                space.dimension(),
                self.population[0].values().len()
            )));
        }
        if !self.sorted {
            self.sort_population(ranking)?;
        }

        let size = self.population.len();
        let pbest_count = self.pbest_count();
        let mut mutation_factors = Vec::with_capacity(size);
        let mut crossover_rates = Vec::with_capacity(size);
        let mut trials = Vec::with_capacity(size);
        for i in 0..size {
            let f = self.sample_mutation_factor(rng)?;
            let cr = self.sample_crossover_rate(rng)?;
            let pbest = rng.gen_range(0..pbest_count);
            let mutant = self.mutant(i, pbest, f, space, rng);
            trials.push(self.crossover(i, &mutant, cr, rng));
            mutation_factors.push(f);
            crossover_rates.push(cr);
        }
        let targets: Vec<&Genome> = self.population.iter().map(|p| p.genome()).collect();
        let trials = space.decode_all_onto(&trials, &targets)?;

        let groups: Vec<Vec<_>> = self
            .population
            .iter()
            .zip(&trials)
            .map(|(target, trial)| vec![target.genome().clone(), trial.genome().clone()])
            .collect();
        let orders = ranking.rank_groups(&groups, 1)?;
        if orders.len() != size {
            return Err(TunerError::Precondition(format!(
                "ranking returned {} groups for {} targets",
                orders.len(),
                size
            )));
        }

        let mut successful_factors = Vec::new();
        let mut successful_rates = Vec::new();
        for (i, (order, trial)) in orders.iter().zip(trials).enumerate() {
            if order.first() != Some(&1) {
                continue;
            }
            let replaced = std::mem::replace(&mut self.population[i], trial);
            self.archive.push(replaced.values().to_vec());
            successful_factors.push(mutation_factors[i]);
            successful_rates.push(crossover_rates[i]);
        }
        while self.archive.len() > size {
            let victim = rng.gen_range(0..self.archive.len());
            self.archive.swap_remove(victim);
        }

        self.update_adaptation(&successful_factors, &successful_rates);
        debug!(
            "JADE generation {}: {} of {} trials replaced their target, mu_F = {:.3}, mu_CR = {:.3}",
            self.generation,
            successful_factors.len(),
            size,
            self.mean_mutation_factor,
            self.mean_crossover_rate
        );

        self.sorted = false;
        self.sort_population(ranking)?;
        self.generation += 1;
        Ok(self.population.clone())
    }

    fn sample_mutation_factor(&self, rng: &mut StdRng) -> Result<f64> {
        let cauchy = Cauchy::new(self.mean_mutation_factor, 0.1)
            .map_err(|e| TunerError::InvalidArgument(format!("Cauchy distribution: {}", e)))?;
        for _ in 0..MAX_MUTATION_FACTOR_DRAWS {
            let f: f64 = cauchy.sample(rng);
            if f > 0.0 {
                return Ok(f.min(1.0));
            }
        }
        // μ_F close to zero keeps drawing non-positive factors.
        Ok(self.mean_mutation_factor.clamp(f64::EPSILON, 1.0))
    }

    fn sample_crossover_rate(&self, rng: &mut StdRng) -> Result<f64> {
        let normal = Normal::new(self.mean_crossover_rate, 0.1)
            .map_err(|e| TunerError::InvalidArgument(format!("Normal distribution: {}", e)))?;
        let cr: f64 = normal.sample(rng);
        Ok(cr.clamp(0.0, 1.0))
    }

    /// current-to-pbest/1 with midpoint bound handling
    fn mutant(&self, i: usize, pbest: usize, f: f64, space: &SearchSpace, rng: &mut StdRng) -> Vec<f64> {
        let size = self.population.len();
        let r1 = loop {
            let r = rng.gen_range(0..size);
            if r != i {
                break r;
            }
        };
        let r2 = loop {
            let r = rng.gen_range(0..size + self.archive.len());
            if r != i && r != r1 {
                break r;
            }
        };

        let target = self.population[i].values();
        let best = self.population[pbest].values();
        let first = self.population[r1].values();
        let second: &[f64] = if r2 < size {
            self.population[r2].values()
        } else {
            &self.archive[r2 - size]
        };

        (0..target.len())
            .map(|j| {
                let v = target[j] + f * (best[j] - target[j]) + f * (first[j] - second[j]);
                let (lower, upper) = (space.lower_bounds()[j], space.upper_bounds()[j]);
                if v < lower {
                    (lower + target[j]) / 2.0
                } else if v > upper {
                    (upper + target[j]) / 2.0
                } else {
                    v
                }
            })
            .collect()
    }

    fn crossover(&self, i: usize, mutant: &[f64], cr: f64, rng: &mut StdRng) -> Vec<f64> {
        let target = self.population[i].values();
        let forced = rng.gen_range(0..target.len());
        (0..target.len())
            .map(|j| {
                if j == forced || rng.gen::<f64>() < cr {
                    mutant[j]
                } else {
                    target[j]
                }
            })
            .collect()
    }

    fn update_adaptation(&mut self, successful_factors: &[f64], successful_rates: &[f64]) {
        if successful_factors.is_empty() {
            return;
        }
        let c = self.parameters.learning_rate;

        let sum: f64 = successful_factors.iter().sum();
        let square_sum: f64 = successful_factors.iter().map(|f| f * f).sum();
        if sum > 0.0 {
            let lehmer_mean = square_sum / sum;
            self.mean_mutation_factor = (1.0 - c) * self.mean_mutation_factor + c * lehmer_mean;
        }

        let arithmetic_mean = successful_rates.iter().sum::<f64>() / successful_rates.len() as f64;
        self.mean_crossover_rate = (1.0 - c) * self.mean_crossover_rate + c * arithmetic_mean;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adaptation_moves_towards_successes() {
        let parameters = JadeParameters::default();
        let mut de = DifferentialEvolution {
            mean_mutation_factor: 0.5,
            mean_crossover_rate: 0.5,
            parameters,
            population: Vec::new(),
            sorted: false,
            archive: Vec::new(),
            generation: 0,
        };
        de.update_adaptation(&[1.0, 1.0], &[0.9, 0.7]);
        assert!((de.mean_mutation_factor() - 0.55).abs() < 1e-12);
        assert!((de.mean_crossover_rate() - 0.53).abs() < 1e-12);

        de.update_adaptation(&[], &[]);
        assert!((de.mean_mutation_factor() - 0.55).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_parameters_are_rejected() {
        let parameters = JadeParameters {
            best_percentage: 0.0,
            ..JadeParameters::default()
        };
        assert!(parameters.validate().is_err());
        assert!(JadeParameters::default().validate().is_ok());
    }
}
