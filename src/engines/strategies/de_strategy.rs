use super::continuous_phase::{base_genome_of, build_search_space, incumbent_after_ranking, replace_competitive_genomes};
use super::tournament_ranking::TournamentRanking;
use super::{position_of, read_status, write_status, PopulationUpdateStrategy, StrategyKind};
use crate::config::ContinuousConfig;
use crate::engines::continuous::{DifferentialEvolution, SearchPoint, SearchSpace};
use crate::engines::evaluation::coordinator::EvaluationCoordinator;
use crate::engines::generation::genome::Genome;
use crate::engines::generation::genome_builder::GenomeBuilder;
use crate::engines::generation::incumbent::IncumbentGenomeWrapper;
use crate::engines::generation::population::Population;
use crate::engines::generation::repair::RepairOperator;
use crate::error::{Result, TunerError};
use crate::types::Instance;
use chrono::{DateTime, Utc};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

/// Where the initial JADE population comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitialPointMode {
    /// The competitive genomes
    Global,
    /// The incumbent and random points close to it
    Local,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifferentialEvolutionStatus {
    pub differential_evolution: DifferentialEvolution,
    pub base_genome: Genome,
    pub instances: Vec<Instance>,
    pub incumbent: Option<IncumbentGenomeWrapper>,
    pub most_recent_sorting: Vec<Genome>,
    pub generations_in_phase: usize,
    pub next_tournament_id: usize,
    pub written_at: DateTime<Utc>,
}

impl DifferentialEvolutionStatus {
    pub fn write(&self, path: &Path) -> Result<()> {
        write_status(path, self)
    }

    pub fn read(path: &Path) -> Result<Self> {
        read_status(path)
    }
}

/// Runs JADE on the numerical parameters of the competitive genomes.
pub struct DifferentialEvolutionStrategy {
    config: ContinuousConfig,
    builder: Arc<GenomeBuilder>,
    repair: Arc<dyn RepairOperator>,
    coordinator: Arc<EvaluationCoordinator>,
    differential_evolution: Option<DifferentialEvolution>,
    space: Option<SearchSpace>,
    ranking: Option<TournamentRanking>,
    incumbent: Option<IncumbentGenomeWrapper>,
    generations_in_phase: usize,
    next_tournament_id: usize,
    rng: StdRng,
}

impl DifferentialEvolutionStrategy {
    pub fn new(
        config: ContinuousConfig,
        builder: Arc<GenomeBuilder>,
        repair: Arc<dyn RepairOperator>,
        coordinator: Arc<EvaluationCoordinator>,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            config,
            builder,
            repair,
            coordinator,
            differential_evolution: None,
            space: None,
            ranking: None,
            incumbent: None,
            generations_in_phase: 0,
            next_tournament_id: 0,
            rng,
        }
    }

    pub fn differential_evolution(&self) -> Option<&DifferentialEvolution> {
        self.differential_evolution.as_ref()
    }

    pub fn initial_point_mode(&self, incumbent: Option<&IncumbentGenomeWrapper>) -> InitialPointMode {
        if self.config.focus_on_incumbent && incumbent.is_some() {
            InitialPointMode::Local
        } else {
            InitialPointMode::Global
        }
    }

    /// Starting points of a phase. Needs at least three competitive genomes.
    ///
    /// Global mode encodes every competitive genome. Local mode
    /// starts from the incumbent and adds points drawn from a normal
    /// distribution around it until `jade_population_size` distinct points
    /// decode to valid genomes without repair.
    pub fn determine_initial_points(
        &mut self,
        space: &SearchSpace,
        population: &Population,
        incumbent: Option<&IncumbentGenomeWrapper>,
    ) -> Result<Vec<SearchPoint>> {
        let competitive = population.competitive_individuals();
        if competitive.len() < 3 {
            return Err(TunerError::InvalidArgument(format!(
                "JADE needs at least 3 competitive genomes, got {}",
                competitive.len()
            )));
        }
        let incumbent = match (self.initial_point_mode(incumbent), incumbent) {
            (InitialPointMode::Local, Some(incumbent)) => incumbent,
            _ => {
                return competitive
                    .iter()
                    .map(|genome| space.create_from_genome(genome))
                    .collect();
            }
        };

        let center = space.create_from_genome(&incumbent.incumbent_genome)?;
        let mut seen: HashSet<Genome> = HashSet::new();
        seen.insert(center.genome().clone());
        let mut points = vec![center];

        let normals = space
            .lower_bounds()
            .iter()
            .zip(space.upper_bounds())
            .map(|(lower, upper)| Normal::new(0.0, self.config.local_sampling_deviation * (upper - lower)))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| TunerError::InvalidArgument(format!("local sampling deviation: {}", e)))?;

        let mut attempts = 0;
        while points.len() < self.config.jade_population_size {
            if attempts >= self.config.max_initial_point_attempts {
                return Err(TunerError::RepairExhausted {
                    attempts,
                    message: format!(
                        "found only {} of {} valid initial points around the incumbent",
                        points.len(),
                        self.config.jade_population_size
                    ),
                });
            }
            attempts += 1;

            let values: Vec<f64> = points[0]
                .values()
                .iter()
                .zip(&normals)
                .zip(space.lower_bounds().iter().zip(space.upper_bounds()))
                .map(|((center, normal), (lower, upper))| {
                    (center + normal.sample(&mut self.rng)).clamp(*lower, *upper)
                })
                .collect();
            let point = space.decode(&values)?;
            if point.is_repaired() || !seen.insert(point.genome().clone()) {
                continue;
            }
            points.push(point);
        }
        debug!("Sampled {} initial points in {} attempts", points.len(), attempts);
        Ok(points)
    }

    fn status(&self) -> Result<DifferentialEvolutionStatus> {
        let (Some(differential_evolution), Some(space), Some(ranking)) =
            (&self.differential_evolution, &self.space, &self.ranking)
        else {
            return Err(TunerError::Precondition(
                "JADE status requested outside of a phase".to_string(),
            ));
        };
        Ok(DifferentialEvolutionStatus {
            differential_evolution: differential_evolution.clone(),
            base_genome: space.base_genome().clone(),
            instances: ranking.instances().to_vec(),
            incumbent: self.incumbent.clone(),
            most_recent_sorting: ranking.most_recent_sorting().to_vec(),
            generations_in_phase: self.generations_in_phase,
            next_tournament_id: ranking.next_tournament_id(),
            written_at: Utc::now(),
        })
    }
}

impl PopulationUpdateStrategy for DifferentialEvolutionStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::DifferentialEvolution
    }

    fn initialize(
        &mut self,
        base_population: Population,
        incumbent: Option<IncumbentGenomeWrapper>,
        instances: &[Instance],
    ) -> Result<()> {
        let base_genome = base_genome_of(&base_population, incumbent.as_ref())?;
        let space = build_search_space(&self.config, &self.builder, &self.repair, base_genome)?;
        let points = self.determine_initial_points(&space, &base_population, incumbent.as_ref())?;

        info!(
            "Starting JADE phase in {} dimensions with {} points ({:?} initialization)",
            space.dimension(),
            points.len(),
            self.initial_point_mode(incumbent.as_ref())
        );

        self.differential_evolution = Some(DifferentialEvolution::new(points, self.config.jade.clone())?);
        self.ranking = Some(TournamentRanking::new(
            Arc::clone(&self.coordinator),
            instances.to_vec(),
            incumbent.as_ref().map(|i| i.incumbent_genome.clone()),
            self.next_tournament_id,
        ));
        self.space = Some(space);
        self.incumbent = incumbent;
        self.generations_in_phase = 0;
        Ok(())
    }

    fn perform_iteration(&mut self, generation_index: usize, _instances: &[Instance]) -> Result<()> {
        let (Some(differential_evolution), Some(space), Some(ranking)) = (
            self.differential_evolution.as_mut(),
            self.space.as_ref(),
            self.ranking.as_mut(),
        ) else {
            return Err(TunerError::Precondition(
                "JADE iteration outside of a phase".to_string(),
            ));
        };

        differential_evolution.next_generation(ranking, space, &mut self.rng)?;
        self.incumbent = incumbent_after_ranking(ranking, self.incumbent.as_ref(), generation_index);
        ranking.set_incumbent(self.incumbent.as_ref().map(|i| i.incumbent_genome.clone()));
        self.generations_in_phase += 1;
        Ok(())
    }

    fn finish_phase(&mut self, base_population: Population) -> Result<Population> {
        let best: Vec<Genome> = self
            .ranking
            .as_ref()
            .map(|r| r.most_recent_sorting().to_vec())
            .unwrap_or_default();
        if let Some(ranking) = &self.ranking {
            self.next_tournament_id = ranking.next_tournament_id();
        }

        let incumbent = self.incumbent.as_ref().map(|i| i.incumbent_genome.clone());
        let population = replace_competitive_genomes(
            base_population,
            &best,
            incumbent.as_ref(),
            self.config.replacement_rate,
            &mut self.rng,
        )?;

        info!("Finished JADE phase after {} generations", self.generations_in_phase);
        self.differential_evolution = None;
        self.space = None;
        self.ranking = None;
        Ok(population)
    }

    fn find_incumbent_genome(&self) -> Option<IncumbentGenomeWrapper> {
        self.incumbent.clone()
    }

    fn has_terminated(&self) -> bool {
        self.generations_in_phase >= self.config.max_generations_per_phase
    }

    fn next_strategy(&self, candidates: &[StrategyKind]) -> usize {
        position_of(StrategyKind::Gga, candidates)
    }

    fn dump_status(&self, path: &Path) -> Result<()> {
        self.status()?.write(path)
    }

    fn use_status_dump(&mut self, path: &Path) -> Result<()> {
        let status = DifferentialEvolutionStatus::read(path)?;
        let space = build_search_space(&self.config, &self.builder, &self.repair, status.base_genome)?;
        let mut ranking = TournamentRanking::new(
            Arc::clone(&self.coordinator),
            status.instances,
            status.incumbent.as_ref().map(|i| i.incumbent_genome.clone()),
            status.next_tournament_id,
        );
        ranking.restore_sorting(status.most_recent_sorting);

        self.differential_evolution = Some(status.differential_evolution);
        self.space = Some(space);
        self.ranking = Some(ranking);
        self.incumbent = status.incumbent;
        self.generations_in_phase = status.generations_in_phase;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::evaluation::coordinator::CoordinatorConfig;
    use crate::engines::evaluation::quality_evaluator::{OptimizationDirection, QualityEvaluator};
    use crate::engines::evaluation::storage::InMemoryResultStorage;
    use crate::engines::evaluation::target_algorithm::{CancellationToken, TargetAlgorithm, TargetAlgorithmFactory};
    use crate::engines::generation::domain::{Allele, Domain};
    use crate::engines::generation::genome_builder::{AcceptAllGenomes, GenomeBuilderConfig};
    use crate::engines::generation::parameter_tree::{ParameterNode, ParameterTree};
    use crate::engines::generation::repair::MutationRepair;
    use crate::types::RunResult;
    use std::time::Duration;

    struct Idle;

    impl TargetAlgorithm for Idle {
        fn run(&mut self, _instance: &Instance, _cancellation: &CancellationToken) -> Result<RunResult> {
            Ok(RunResult::with_quality(Duration::from_millis(1), 0.0))
        }
    }

    struct InstantFactory;

    impl TargetAlgorithmFactory for InstantFactory {
        fn configure(&self, _genome: &Genome) -> Result<Box<dyn TargetAlgorithm>> {
            Ok(Box::new(Idle))
        }
    }

    fn fixture(config: ContinuousConfig) -> (DifferentialEvolutionStrategy, Arc<GenomeBuilder>, Arc<dyn RepairOperator>) {
        let tree = ParameterTree::new(ParameterNode::and(vec![
            ParameterNode::value("x", Domain::continuous(-5.0, 5.0).unwrap()),
            ParameterNode::value("y", Domain::continuous(-5.0, 5.0).unwrap()),
        ]))
        .unwrap();
        let builder = Arc::new(GenomeBuilder::new(
            Arc::new(tree),
            GenomeBuilderConfig::default(),
            Arc::new(AcceptAllGenomes),
        ));
        let repair: Arc<dyn RepairOperator> = Arc::new(MutationRepair { seed: 0 });
        let coordinator = EvaluationCoordinator::new(
            CoordinatorConfig {
                worker_count: 1,
                evaluation_limit: None,
            },
            Arc::new(InstantFactory),
            Arc::new(InMemoryResultStorage::new()),
            Arc::new(QualityEvaluator::new(OptimizationDirection::Minimize)),
        )
        .unwrap();
        let strategy = DifferentialEvolutionStrategy::new(
            config,
            Arc::clone(&builder),
            Arc::clone(&repair),
            Arc::new(coordinator),
            Some(9),
        );
        (strategy, builder, repair)
    }

    fn genome(x: f64, y: f64) -> Genome {
        let mut genome = Genome::new(0);
        genome.set_gene("x", Allele::Float(x));
        genome.set_gene("y", Allele::Float(y));
        genome
    }

    #[test]
    fn test_global_points_need_three_competitive_genomes() {
        let config = ContinuousConfig::default();
        let (mut strategy, builder, repair) = fixture(config.clone());
        let space = build_search_space(&config, &builder, &repair, genome(0.0, 0.0)).unwrap();

        let two = Population::new(vec![genome(1.0, 1.0), genome(2.0, 2.0)], vec![genome(0.0, 0.0)], 3).unwrap();
        assert!(matches!(
            strategy.determine_initial_points(&space, &two, None),
            Err(TunerError::InvalidArgument(_))
        ));

        let three = Population::new(
            vec![genome(1.0, 1.0), genome(2.0, 2.0), genome(2.0, 2.0)],
            vec![genome(0.0, 0.0)],
            3,
        )
        .unwrap();
        let points = strategy.determine_initial_points(&space, &three, None).unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].genome(), &genome(1.0, 1.0));
    }

    #[test]
    fn test_local_points_surround_the_incumbent() {
        let config = ContinuousConfig {
            focus_on_incumbent: true,
            jade_population_size: 6,
            ..ContinuousConfig::default()
        };
        let (mut strategy, builder, repair) = fixture(config.clone());
        let incumbent = IncumbentGenomeWrapper::new(genome(0.5, -0.5), 0, Vec::new());
        let space = build_search_space(&config, &builder, &repair, incumbent.incumbent_genome.clone()).unwrap();
        let population = Population::new(
            vec![genome(1.0, 1.0), genome(2.0, 2.0), genome(3.0, 3.0)],
            vec![genome(0.0, 0.0)],
            3,
        )
        .unwrap();

        assert_eq!(strategy.initial_point_mode(Some(&incumbent)), InitialPointMode::Local);
        let points = strategy.determine_initial_points(&space, &population, Some(&incumbent)).unwrap();
        assert_eq!(points.len(), 6);
        assert_eq!(points[0].genome(), &incumbent.incumbent_genome);
        let distinct: HashSet<&Genome> = points.iter().map(SearchPoint::genome).collect();
        assert_eq!(distinct.len(), 6);
        assert!(points.iter().all(|p| !p.is_repaired()));
    }
}
