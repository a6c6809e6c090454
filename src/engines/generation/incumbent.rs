use super::genome::Genome;
use crate::types::{Instance, RunResult};
use serde::{Deserialize, Serialize};

/// Best genome found so far, carried from phase to phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncumbentGenomeWrapper {
    pub incumbent_genome: Genome,
    /// Generation in which the genome became incumbent
    pub incumbent_generation: usize,
    pub incumbent_instance_results: Vec<(Instance, RunResult)>,
}

impl IncumbentGenomeWrapper {
    pub fn new(
        incumbent_genome: Genome,
        incumbent_generation: usize,
        incumbent_instance_results: Vec<(Instance, RunResult)>,
    ) -> Self {
        Self {
            incumbent_genome,
            incumbent_generation,
            incumbent_instance_results,
        }
    }

    /// Keeps the generation of `previous` if the genome did not change
    pub fn succeed(
        previous: Option<&IncumbentGenomeWrapper>,
        genome: Genome,
        generation: usize,
        results: Vec<(Instance, RunResult)>,
    ) -> Self {
        let incumbent_generation = match previous {
            Some(previous) if previous.incumbent_genome == genome => previous.incumbent_generation,
            _ => generation,
        };
        Self::new(genome, incumbent_generation, results)
    }
}
