use super::genome::Genome;
use super::genome_builder::GenomeBuilder;
use crate::error::{Result, TunerError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Genomes removed by one call to [`Population::age`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgeingReport {
    pub competitive_removed: usize,
    pub non_competitive_removed: usize,
}

impl AgeingReport {
    pub fn total(&self) -> usize {
        self.competitive_removed + self.non_competitive_removed
    }
}

/// Population split into a competitive group (candidates that get evaluated
/// and optimized) and a non-competitive group (mating pool only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Population {
    competitive: Vec<Genome>,
    non_competitive: Vec<Genome>,
    max_age: usize,
}

impl Population {
    pub fn new(competitive: Vec<Genome>, non_competitive: Vec<Genome>, max_age: usize) -> Result<Self> {
        if competitive.is_empty() {
            return Err(TunerError::InvalidArgument(
                "Population needs at least one competitive genome".to_string(),
            ));
        }
        Ok(Self {
            competitive,
            non_competitive,
            max_age,
        })
    }

    /// Random population with alternating genders and ages spread evenly
    /// over `0..=max_age`.
    pub fn create_random<R: Rng + ?Sized>(
        builder: &GenomeBuilder,
        size: usize,
        max_age: usize,
        rng: &mut R,
    ) -> Result<Self> {
        if size < 2 {
            return Err(TunerError::InvalidArgument(format!(
                "Population size must be at least 2, got {}",
                size
            )));
        }

        let mut competitive = Vec::with_capacity(size / 2 + 1);
        let mut non_competitive = Vec::with_capacity(size / 2);
        for i in 0..size {
            let age = (i / 2) % (max_age + 1);
            let genome = builder.create_random_genome(age, rng)?;
            if i % 2 == 0 {
                competitive.push(genome);
            } else {
                non_competitive.push(genome);
            }
        }

        Self::new(competitive, non_competitive, max_age)
    }

    pub fn add_genome(&mut self, genome: Genome, is_competitive: bool) {
        if is_competitive {
            self.competitive.push(genome);
        } else {
            self.non_competitive.push(genome);
        }
    }

    pub fn competitive_individuals(&self) -> &[Genome] {
        &self.competitive
    }

    pub fn non_competitive_mates(&self) -> &[Genome] {
        &self.non_competitive
    }

    pub fn max_age(&self) -> usize {
        self.max_age
    }

    pub fn len(&self) -> usize {
        self.competitive.len() + self.non_competitive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all_genomes(&self) -> impl Iterator<Item = &Genome> {
        self.competitive.iter().chain(self.non_competitive.iter())
    }

    /// Increments every genome's age and removes those older than `max_age`.
    ///
    /// The incumbent is never removed. The population shrinks by the
    /// reported counts; callers refill it.
    pub fn age(&mut self, incumbent: Option<&Genome>) -> AgeingReport {
        let max_age = self.max_age;
        let survive = |genome: &mut Genome| {
            genome.increment_age();
            genome.age() <= max_age || incumbent.map(|i| i == genome).unwrap_or(false)
        };

        let before_competitive = self.competitive.len();
        let before_non_competitive = self.non_competitive.len();
        self.competitive.retain_mut(|g| survive(g));
        self.non_competitive.retain_mut(|g| survive(g));

        AgeingReport {
            competitive_removed: before_competitive - self.competitive.len(),
            non_competitive_removed: before_non_competitive - self.non_competitive.len(),
        }
    }

    /// Replaces each genome except the incumbent, with probability
    /// `mutant_ratio`, by a random genome of the same age. Returns the
    /// number of replaced genomes.
    pub fn replace_individuals_with_mutants<R: Rng + ?Sized>(
        &mut self,
        builder: &GenomeBuilder,
        mutant_ratio: f64,
        incumbent: Option<&Genome>,
        rng: &mut R,
    ) -> Result<usize> {
        let mut replaced = 0;
        for genome in self.competitive.iter_mut().chain(self.non_competitive.iter_mut()) {
            if incumbent.map(|i| i == genome).unwrap_or(false) {
                continue;
            }
            if rng.gen::<f64>() < mutant_ratio {
                *genome = builder.create_random_genome(genome.age(), rng)?;
                replaced += 1;
            }
        }
        Ok(replaced)
    }

    /// Swaps in a new competitive group, keeping the mating pool.
    pub fn replace_competitive(&mut self, genomes: Vec<Genome>) -> Result<()> {
        if genomes.is_empty() {
            return Err(TunerError::InvalidArgument(
                "Cannot replace the competitive group by an empty one".to_string(),
            ));
        }
        self.competitive = genomes;
        Ok(())
    }

    /// Number of genomes per age over both groups
    pub fn age_histogram(&self) -> BTreeMap<usize, usize> {
        let mut histogram = BTreeMap::new();
        for genome in self.all_genomes() {
            *histogram.entry(genome.age()).or_insert(0) += 1;
        }
        histogram
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::generation::domain::{Allele, Domain};
    use crate::engines::generation::genome_builder::{AcceptAllGenomes, GenomeBuilderConfig};
    use crate::engines::generation::parameter_tree::{ParameterNode, ParameterTree};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn genome(value: i64, age: usize) -> Genome {
        let mut genome = Genome::new(age);
        genome.set_gene("x", Allele::Integer(value));
        genome
    }

    #[test]
    fn test_empty_competitive_group_is_rejected() {
        let result = Population::new(Vec::new(), vec![genome(1, 0)], 3);
        assert!(matches!(result, Err(TunerError::InvalidArgument(_))));
    }

    #[test]
    fn test_age_removes_old_genomes_per_group() {
        let mut population = Population::new(
            vec![genome(1, 3), genome(2, 1)],
            vec![genome(3, 3), genome(4, 3), genome(5, 0)],
            3,
        )
        .unwrap();

        let report = population.age(None);
        assert_eq!(report.competitive_removed, 1);
        assert_eq!(report.non_competitive_removed, 2);
        assert_eq!(population.len(), 2);
        assert!(population.all_genomes().all(|g| g.age() <= 3));
    }

    #[test]
    fn test_age_keeps_incumbent() {
        let incumbent = genome(1, 3);
        let mut population =
            Population::new(vec![incumbent.clone(), genome(2, 3)], vec![genome(3, 0)], 3).unwrap();

        let report = population.age(Some(&incumbent));
        assert_eq!(report.competitive_removed, 1);
        assert!(population.competitive_individuals().contains(&incumbent));
    }

    #[test]
    fn test_mutants_keep_ages() {
        let tree = ParameterTree::new(ParameterNode::value("x", Domain::integer(0, 1000).unwrap()))
            .unwrap();
        let builder = GenomeBuilder::new(
            Arc::new(tree),
            GenomeBuilderConfig::default(),
            Arc::new(AcceptAllGenomes),
        );
        let mut rng = StdRng::seed_from_u64(9);
        let mut population = Population::create_random(&builder, 12, 2, &mut rng).unwrap();
        let histogram = population.age_histogram();

        let replaced = population
            .replace_individuals_with_mutants(&builder, 1.0, None, &mut rng)
            .unwrap();
        assert_eq!(replaced, 12);
        assert_eq!(population.age_histogram(), histogram);
    }
}
