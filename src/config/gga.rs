use super::traits::{check_unit_interval, ConfigSection};
use crate::engines::generation::genome_builder::GenomeBuilderConfig;
use crate::error::{Result, TunerError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GgaConfig {
    pub population_size: usize,
    pub max_genome_age: usize,
    pub max_genomes_per_tournament: usize,
    pub tournament_winner_percentage: f64,
    pub mutation_rate: f64,
    pub mutation_variance_percentage: f64,
    pub crossover_switch_probability: f64,
    pub population_mutant_ratio: f64,
    pub max_repair_attempts: usize,
    pub max_gga_generations_per_phase: usize,
    pub max_gga_generations_with_same_incumbent: usize,
    /// Upper share of offspring a genetic engineering model may propose
    pub engineered_proportion: f64,
}

impl Default for GgaConfig {
    fn default() -> Self {
        Self {
            population_size: 64,
            max_genome_age: 3,
            max_genomes_per_tournament: 8,
            tournament_winner_percentage: 0.125,
            mutation_rate: 0.1,
            mutation_variance_percentage: 0.1,
            crossover_switch_probability: 0.1,
            population_mutant_ratio: 0.25,
            max_repair_attempts: 100,
            max_gga_generations_per_phase: 10,
            max_gga_generations_with_same_incumbent: 3,
            engineered_proportion: 0.5,
        }
    }
}

impl GgaConfig {
    pub fn builder_config(&self) -> GenomeBuilderConfig {
        GenomeBuilderConfig {
            mutation_rate: self.mutation_rate,
            mutation_variance_percentage: self.mutation_variance_percentage,
            crossover_switch_probability: self.crossover_switch_probability,
            max_repair_attempts: self.max_repair_attempts,
        }
    }
}

impl ConfigSection for GgaConfig {
    fn section_name() -> &'static str {
        "gga"
    }

    fn validate(&self) -> Result<()> {
        if self.population_size < 2 {
            return Err(TunerError::Configuration(
                "Population size must be at least 2".to_string(),
            ));
        }
        if self.max_genomes_per_tournament < 1 {
            return Err(TunerError::Configuration(
                "Tournaments need room for at least one genome".to_string(),
            ));
        }
        if self.max_repair_attempts == 0 {
            return Err(TunerError::Configuration(
                "At least one repair attempt is required".to_string(),
            ));
        }
        if self.max_gga_generations_per_phase == 0 {
            return Err(TunerError::Configuration(
                "A GGA phase must last at least one generation".to_string(),
            ));
        }
        if !(self.tournament_winner_percentage > 0.0 && self.tournament_winner_percentage <= 1.0) {
            return Err(TunerError::Configuration(
                "Tournament winner percentage must be in (0, 1]".to_string(),
            ));
        }
        let section = Self::section_name();
        check_unit_interval(section, "mutation_rate", self.mutation_rate)?;
        check_unit_interval(section, "crossover_switch_probability", self.crossover_switch_probability)?;
        check_unit_interval(section, "population_mutant_ratio", self.population_mutant_ratio)?;
        check_unit_interval(section, "engineered_proportion", self.engineered_proportion)?;
        if self.mutation_variance_percentage <= 0.0 {
            return Err(TunerError::Configuration(
                "Mutation variance percentage must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
