use super::genome::Genome;
use super::population::Population;
use super::tournament_rank::AllKnownRanks;
use crate::error::Result;
use rand::rngs::StdRng;

/// Surrogate model that suggests offspring from historical tournament ranks.
///
/// Only biases crossover; the GGA runs correctly without one.
pub trait GeneticEngineering: Send {
    fn train_forest(&mut self, ranks: &AllKnownRanks) -> Result<()>;

    /// Proposes offspring for the given competitive parents. Returned
    /// genomes are flagged as engineered by the caller.
    fn engineer_genomes(
        &mut self,
        parents: &[Genome],
        mates: &[Genome],
        population: &Population,
        rng: &mut StdRng,
    ) -> Result<Vec<Genome>>;

    /// Non-negative mating weight per mate
    fn attractiveness_measure(&self, mates: &[Genome]) -> Vec<f64>;
}
