use algotune::engines::generation::{Allele, Genome, Population};
use proptest::prelude::*;

fn genome(value: i64, age: usize) -> Genome {
    let mut genome = Genome::new(age);
    genome.set_gene("value", Allele::Integer(value));
    genome
}

/// `per_age` genomes of every age in both groups
fn uniform_population(max_age: usize, per_age: usize) -> Population {
    let mut competitive = Vec::new();
    let mut non_competitive = Vec::new();
    let mut next = 0;
    for age in 0..=max_age {
        for _ in 0..per_age {
            competitive.push(genome(next, age));
            non_competitive.push(genome(next + 1, age));
            next += 2;
        }
    }
    Population::new(competitive, non_competitive, max_age).unwrap()
}

proptest! {
    #[test]
    fn prop_ageing_and_refilling_preserves_uniform_histogram(
        max_age in 0usize..6,
        per_age in 1usize..5,
        generations in 1usize..8,
    ) {
        let mut population = uniform_population(max_age, per_age);
        let histogram = population.age_histogram();
        let size = population.len();
        let mut next = 10_000;

        for _ in 0..generations {
            let report = population.age(None);
            prop_assert_eq!(report.competitive_removed, per_age);
            prop_assert_eq!(report.non_competitive_removed, per_age);
            prop_assert_eq!(population.len() + report.total(), size);

            for i in 0..report.total() {
                population.add_genome(genome(next, 0), i < report.competitive_removed);
                next += 1;
            }
            prop_assert_eq!(population.age_histogram(), histogram.clone());
        }
    }

    #[test]
    fn prop_incumbent_survives_any_number_of_generations(
        max_age in 0usize..4,
        generations in 1usize..10,
    ) {
        let mut population = uniform_population(max_age, 2);
        let incumbent = population.competitive_individuals()[0].clone();
        for _ in 0..generations {
            population.age(Some(&incumbent));
            prop_assert!(population.competitive_individuals().contains(&incumbent));
        }
    }
}
