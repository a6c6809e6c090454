use algotune::engines::continuous::cma_es::default_termination_criteria;
use algotune::engines::continuous::{
    CmaEs, CmaEsConfiguration, DifferentialEvolution, JadeParameters, SearchPoint, SearchPointRanking, SearchSpace,
};
use algotune::engines::generation::{
    AcceptAllGenomes, Allele, Domain, Genome, GenomeBuilder, GenomeBuilderConfig, MutationRepair, ParameterNode,
    ParameterTree, RepairOperator,
};
use algotune::TunerError;
use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

const TARGET: (f64, f64) = (1.0, -1.0);

/// Ranks genomes by their squared distance to `TARGET`
#[derive(Default)]
struct SphereRanking {
    populations_ranked: usize,
    groups_ranked: usize,
}

fn distance(genome: &Genome) -> f64 {
    let x = genome.gene("x").and_then(Allele::as_f64).unwrap_or(f64::MAX);
    let y = genome.gene("y").and_then(Allele::as_f64).unwrap_or(f64::MAX);
    (x - TARGET.0).powi(2) + (y - TARGET.1).powi(2)
}

fn order(genomes: &[Genome]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..genomes.len()).collect();
    indices.sort_by(|a, b| distance(&genomes[*a]).total_cmp(&distance(&genomes[*b])));
    indices
}

impl SearchPointRanking for SphereRanking {
    fn rank_population(&mut self, genomes: &[Genome], _number_of_winners: usize) -> algotune::Result<Vec<usize>> {
        self.populations_ranked += 1;
        Ok(order(genomes))
    }

    fn rank_groups(&mut self, groups: &[Vec<Genome>], _number_of_winners: usize) -> algotune::Result<Vec<Vec<usize>>> {
        self.groups_ranked += groups.len();
        Ok(groups.iter().map(|group| order(group)).collect())
    }
}

fn space() -> SearchSpace {
    let tree = Arc::new(
        ParameterTree::new(ParameterNode::and(vec![
            ParameterNode::value("x", Domain::continuous(-5.0, 5.0).unwrap()),
            ParameterNode::value("y", Domain::continuous(-5.0, 5.0).unwrap()),
        ]))
        .unwrap(),
    );
    let builder = Arc::new(GenomeBuilder::new(
        Arc::clone(&tree),
        GenomeBuilderConfig::default(),
        Arc::new(AcceptAllGenomes),
    ));
    let repair: Arc<dyn RepairOperator> = Arc::new(MutationRepair { seed: 3 });
    let base = builder.create_random_genome(0, &mut StdRng::seed_from_u64(3)).unwrap();
    SearchSpace::with_uniform_bounds(tree, builder, repair, 0.0, 10.0, 20, base).unwrap()
}

fn random_points(space: &SearchSpace, count: usize, rng: &mut StdRng) -> Vec<SearchPoint> {
    (0..count)
        .map(|_| {
            let values: Vec<f64> = (0..space.dimension()).map(|_| rng.gen_range(0.0..10.0)).collect();
            space.decode(&values).unwrap()
        })
        .collect()
}

#[test]
fn test_cma_es_approaches_the_optimum() {
    let space = space();
    let mut rng = StdRng::seed_from_u64(11);
    let mut ranking = SphereRanking::default();

    let mut cma_es = CmaEs::new(default_termination_criteria(100));
    let configuration = CmaEsConfiguration::new(8, space.dimension(), 2.0).unwrap();
    cma_es.initialize(configuration, DVector::from_vec(vec![1.5, 1.5])).unwrap();
    let start = distance(space.decode(&[1.5, 1.5]).unwrap().genome());

    let mut best = f64::MAX;
    for _ in 0..40 {
        let sorted = cma_es.next_generation(&mut ranking, &space, &mut rng).unwrap();
        assert_eq!(sorted.len(), 8);
        best = best.min(distance(sorted[0].genome()));
    }

    assert_eq!(ranking.populations_ranked, 40);
    assert_eq!(cma_es.generation(), 40);
    assert!(cma_es.elements().is_consistent());
    assert!(best < start / 10.0, "best {} did not improve on {}", best, start);
}

#[test]
fn test_jade_never_loses_its_best_point() {
    let space = space();
    let mut rng = StdRng::seed_from_u64(5);
    let points = random_points(&space, 10, &mut rng);
    let mut ranking = SphereRanking::default();

    let mut jade = DifferentialEvolution::new(points, JadeParameters::default()).unwrap();
    jade.sort_population(&mut ranking).unwrap();
    let mut best = distance(jade.population()[0].genome());
    let start = best;

    for _ in 0..25 {
        let population = jade.next_generation(&mut ranking, &space, &mut rng).unwrap();
        assert_eq!(population.len(), 10);
        let current = distance(population[0].genome());
        assert!(current <= best);
        best = current;
    }

    assert_eq!(ranking.groups_ranked, 250);
    assert!(jade.archive().len() <= 10);
    assert!(jade.mean_mutation_factor() > 0.0 && jade.mean_mutation_factor() <= 1.0);
    assert!((0.0..=1.0).contains(&jade.mean_crossover_rate()));
    assert!(best <= start);
}

#[test]
fn test_jade_needs_three_points() {
    let space = space();
    let mut rng = StdRng::seed_from_u64(9);

    let outcome = DifferentialEvolution::new(random_points(&space, 2, &mut rng), JadeParameters::default());
    assert!(matches!(outcome, Err(TunerError::InvalidArgument(_))));
    assert!(DifferentialEvolution::new(random_points(&space, 3, &mut rng), JadeParameters::default()).is_ok());
}
