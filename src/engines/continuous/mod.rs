pub mod cma_es;
pub mod differential_evolution;
pub mod search_point;

pub use cma_es::{CmaEs, CmaEsConfiguration, CmaEsElements, TerminationCriterion};
pub use differential_evolution::{DifferentialEvolution, JadeParameters};
pub use search_point::{GenomeEncoding, SearchPoint, SearchSpace};

use crate::engines::generation::genome::Genome;
use crate::error::Result;

/// Orders genomes by the quality of their target algorithm runs.
///
/// Implemented on top of the evaluation coordinator by the population update
/// strategies and by simple objective functions in tests.
pub trait SearchPointRanking {
    /// Ranks all genomes in one tournament. Returns indices into `genomes`,
    /// best first; equal genomes share a position and keep their order.
    fn rank_population(&mut self, genomes: &[Genome], number_of_winners: usize) -> Result<Vec<usize>>;

    /// One independent tournament per group. Returns, per group, indices
    /// into that group, best first.
    fn rank_groups(&mut self, groups: &[Vec<Genome>], number_of_winners: usize) -> Result<Vec<Vec<usize>>>;
}
