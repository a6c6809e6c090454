//! Pieces shared by the CMA-ES and JADE phases.

use super::tournament_ranking::TournamentRanking;
use crate::config::ContinuousConfig;
use crate::engines::continuous::SearchSpace;
use crate::engines::generation::genome::Genome;
use crate::engines::generation::genome_builder::GenomeBuilder;
use crate::engines::generation::incumbent::IncumbentGenomeWrapper;
use crate::engines::generation::population::Population;
use crate::engines::generation::repair::RepairOperator;
use crate::error::{Result, TunerError};
use log::debug;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;

/// Search space over the continuous-looking parameters, filled up from
/// `base_genome` for everything else.
pub fn build_search_space(
    config: &ContinuousConfig,
    builder: &Arc<GenomeBuilder>,
    repair: &Arc<dyn RepairOperator>,
    base_genome: Genome,
) -> Result<SearchSpace> {
    SearchSpace::with_uniform_bounds(
        Arc::clone(builder.tree()),
        Arc::clone(builder),
        Arc::clone(repair),
        config.lower_bound,
        config.upper_bound,
        config.minimum_domain_size,
        base_genome,
    )
}

/// Genome the search space is anchored on: the incumbent if there is one,
/// otherwise the first competitive genome.
pub fn base_genome_of(population: &Population, incumbent: Option<&IncumbentGenomeWrapper>) -> Result<Genome> {
    incumbent
        .map(|i| i.incumbent_genome.clone())
        .or_else(|| population.competitive_individuals().first().cloned())
        .ok_or_else(|| {
            TunerError::Precondition("continuous phase started without competitive genomes".to_string())
        })
}

/// Incumbent after a population ranking that included the old incumbent
pub fn incumbent_after_ranking(
    ranking: &TournamentRanking,
    previous: Option<&IncumbentGenomeWrapper>,
    generation: usize,
) -> Option<IncumbentGenomeWrapper> {
    match ranking.best() {
        Some(best) => Some(IncumbentGenomeWrapper::succeed(
            previous,
            best.clone(),
            generation,
            ranking.results_of(best),
        )),
        None => previous.cloned(),
    }
}

/// Replaces competitive genomes of `base` by the best genomes of a
/// continuous phase.
///
/// The incumbent is never replaced, so at most `n - 1` of `n` competitive
/// genomes change; `replacement_rate` scales that number further. An
/// incumbent missing from the competitive group is always brought in. Each
/// new genome takes over the age of the genome it replaces, which keeps the
/// age histogram of the population intact.
pub fn replace_competitive_genomes<R: Rng + ?Sized>(
    mut base: Population,
    best_genomes: &[Genome],
    incumbent: Option<&Genome>,
    replacement_rate: f64,
    rng: &mut R,
) -> Result<Population> {
    let competitive = base.competitive_individuals().to_vec();
    let n = competitive.len();

    let present: HashSet<&Genome> = competitive.iter().collect();
    let missing_incumbent = incumbent.filter(|i| !present.contains(*i));
    let mut seen = HashSet::new();
    let candidates: Vec<&Genome> = missing_incumbent
        .into_iter()
        .chain(best_genomes.iter())
        .filter(|g| !present.contains(*g))
        .filter(|g| seen.insert(*g))
        .collect();

    let mut replaceable: Vec<usize> = (0..n).filter(|&i| incumbent != Some(&competitive[i])).collect();
    replaceable.shuffle(rng);

    let wanted = (replacement_rate * n as f64).round() as usize;
    let mut count = wanted.min(n.saturating_sub(1));
    if missing_incumbent.is_some() {
        count = count.max(1);
    }
    let count = count.min(replaceable.len()).min(candidates.len());

    let mut updated = competitive;
    for (slot, candidate) in replaceable.into_iter().zip(candidates).take(count) {
        let mut genome = candidate.clone();
        genome.set_age(updated[slot].age());
        updated[slot] = genome;
    }

    debug!("Replaced {} of {} competitive genomes", count, n);
    base.replace_competitive(updated)?;
    Ok(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::generation::domain::Allele;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn genome(value: i64, age: usize) -> Genome {
        let mut g = Genome::new(age);
        g.set_gene("x", Allele::Integer(value));
        g
    }

    fn population() -> Population {
        Population::new(
            vec![genome(0, 0), genome(1, 1), genome(2, 2), genome(3, 3)],
            vec![genome(10, 0), genome(11, 2)],
            3,
        )
        .unwrap()
    }

    #[test]
    fn test_replacement_keeps_incumbent_and_ages() {
        let mut rng = StdRng::seed_from_u64(3);
        let base = population();
        let histogram = base.age_histogram();
        let incumbent = genome(2, 0);
        let best = vec![genome(20, 0), genome(21, 0), genome(22, 0), genome(23, 0), genome(24, 0)];

        let updated = replace_competitive_genomes(base, &best, Some(&incumbent), 1.0, &mut rng).unwrap();
        assert_eq!(updated.age_histogram(), histogram);
        assert!(updated.competitive_individuals().contains(&incumbent));
        let replaced = updated
            .competitive_individuals()
            .iter()
            .filter(|g| best.contains(g))
            .count();
        assert_eq!(replaced, 3);
    }

    #[test]
    fn test_replacement_rate_scales_count() {
        let mut rng = StdRng::seed_from_u64(5);
        let best = vec![genome(20, 0), genome(21, 0), genome(22, 0)];
        let updated = replace_competitive_genomes(population(), &best, None, 0.5, &mut rng).unwrap();
        let replaced = updated
            .competitive_individuals()
            .iter()
            .filter(|g| best.contains(g))
            .count();
        assert_eq!(replaced, 2);
    }

    #[test]
    fn test_known_genomes_are_not_duplicated() {
        let mut rng = StdRng::seed_from_u64(1);
        let best = vec![genome(0, 0), genome(1, 0)];
        let updated = replace_competitive_genomes(population(), &best, None, 1.0, &mut rng).unwrap();
        assert_eq!(updated.competitive_individuals(), population().competitive_individuals());
    }

    #[test]
    fn test_missing_incumbent_is_brought_in() {
        let mut rng = StdRng::seed_from_u64(9);
        let incumbent = genome(42, 0);
        let updated =
            replace_competitive_genomes(population(), &[incumbent.clone()], Some(&incumbent), 0.0, &mut rng).unwrap();
        assert!(updated.competitive_individuals().contains(&incumbent));
        assert_eq!(updated.age_histogram(), population().age_histogram());
    }
}
