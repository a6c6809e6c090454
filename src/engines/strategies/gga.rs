//! Gender-based genetic algorithm.
//!
//! Competitive genomes are raced against each other in mini tournaments; the
//! winners mate with genomes of the non-competitive group. Every genome ages
//! by one per generation and dies after `max_genome_age`, keeping the
//! population fresh without ever losing the incumbent.

use super::{position_of, read_status, write_status, ContinuousOptimizationMethod, PopulationUpdateStrategy, StrategyKind};
use crate::config::GgaConfig;
use crate::engines::evaluation::coordinator::{EvaluationCoordinator, MiniTournament, MiniTournamentResult};
use crate::engines::evaluation::genome_stats::GenomeStats;
use crate::engines::generation::engineering::GeneticEngineering;
use crate::engines::generation::genome::Genome;
use crate::engines::generation::genome_builder::GenomeBuilder;
use crate::engines::generation::incumbent::IncumbentGenomeWrapper;
use crate::engines::generation::population::Population;
use crate::engines::generation::tournament_rank::{AllKnownRanks, GenomeTournamentRank};
use crate::error::{Result, TunerError};
use crate::types::Instance;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rand::distributions::WeightedIndex;
use rand::prelude::Distribution;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

/// Everything needed to continue a GGA phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GgaStatus {
    pub population: Population,
    pub iteration_counter: usize,
    pub incumbent_kept_counter: usize,
    pub all_known_ranks: AllKnownRanks,
    pub incumbent: Option<IncumbentGenomeWrapper>,
    /// Id of the next mini tournament, so ids stay unique across a resume
    #[serde(default)]
    pub next_tournament_id: usize,
    pub written_at: DateTime<Utc>,
}

impl GgaStatus {
    pub fn write(&self, path: &Path) -> Result<()> {
        write_status(path, self)
    }

    pub fn read(path: &Path) -> Result<Self> {
        read_status(path)
    }
}

pub struct GgaStrategy {
    config: GgaConfig,
    continuous_method: ContinuousOptimizationMethod,
    builder: Arc<GenomeBuilder>,
    coordinator: Arc<EvaluationCoordinator>,
    engineering: Option<Box<dyn GeneticEngineering>>,
    population: Option<Population>,
    incumbent: Option<IncumbentGenomeWrapper>,
    iteration_counter: usize,
    incumbent_kept_counter: usize,
    all_known_ranks: AllKnownRanks,
    next_tournament_id: usize,
    rng: StdRng,
}

impl GgaStrategy {
    pub fn new(
        config: GgaConfig,
        continuous_method: ContinuousOptimizationMethod,
        builder: Arc<GenomeBuilder>,
        coordinator: Arc<EvaluationCoordinator>,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            config,
            continuous_method,
            builder,
            coordinator,
            engineering: None,
            population: None,
            incumbent: None,
            iteration_counter: 0,
            incumbent_kept_counter: 0,
            all_known_ranks: AllKnownRanks::new(),
            next_tournament_id: 0,
            rng,
        }
    }

    pub fn with_genetic_engineering(mut self, engineering: Box<dyn GeneticEngineering>) -> Self {
        self.engineering = Some(engineering);
        self
    }

    pub fn set_genetic_engineering(&mut self, engineering: Box<dyn GeneticEngineering>) {
        self.engineering = Some(engineering);
    }

    pub fn population(&self) -> Option<&Population> {
        self.population.as_ref()
    }

    pub fn iteration_counter(&self) -> usize {
        self.iteration_counter
    }

    pub fn incumbent_kept_counter(&self) -> usize {
        self.incumbent_kept_counter
    }

    pub fn all_known_ranks(&self) -> &AllKnownRanks {
        &self.all_known_ranks
    }

    pub fn status(&self) -> Result<GgaStatus> {
        let population = self.population.clone().ok_or_else(|| {
            TunerError::Precondition("GGA status requested before initialization".to_string())
        })?;
        Ok(GgaStatus {
            population,
            iteration_counter: self.iteration_counter,
            incumbent_kept_counter: self.incumbent_kept_counter,
            all_known_ranks: self.all_known_ranks.clone(),
            incumbent: self.incumbent.clone(),
            next_tournament_id: self.next_tournament_id,
            written_at: Utc::now(),
        })
    }

    /// Splits `genomes` into as few groups as the tournament size allows,
    /// with group sizes differing by at most one.
    fn split_into_tournaments(&self, genomes: Vec<Genome>) -> Vec<Vec<Genome>> {
        let count = genomes.len().div_ceil(self.config.max_genomes_per_tournament.max(1));
        if count == 0 {
            return Vec::new();
        }
        let base = genomes.len() / count;
        let larger = genomes.len() % count;

        let mut groups = Vec::with_capacity(count);
        let mut remaining = genomes.into_iter();
        for i in 0..count {
            let size = base + usize::from(i < larger);
            groups.push(remaining.by_ref().take(size).collect());
        }
        groups
    }

    fn winners_for(&self, tournament_size: usize) -> usize {
        let winners = (tournament_size as f64 * self.config.tournament_winner_percentage).ceil() as usize;
        winners.clamp(1, tournament_size.max(1))
    }

    fn run_tournaments(
        &mut self,
        generation_index: usize,
        instances: &[Instance],
    ) -> Result<Vec<MiniTournamentResult>> {
        let population = self.population.as_ref().ok_or_else(|| {
            TunerError::Precondition("GGA iteration before initialization".to_string())
        })?;
        let mut competitive = population.competitive_individuals().to_vec();
        competitive.shuffle(&mut self.rng);

        let groups = self.split_into_tournaments(competitive);
        let mut handles = Vec::with_capacity(groups.len());
        for participants in groups {
            let tournament = MiniTournament {
                id: self.next_tournament_id,
                number_of_winners: self.winners_for(participants.len()),
                participants,
                instances: instances.to_vec(),
            };
            self.next_tournament_id += 1;
            handles.push(self.coordinator.submit(tournament)?);
        }
        debug!("Generation {}: submitted {} tournaments", generation_index, handles.len());

        handles.into_iter().map(|handle| handle.wait()).collect()
    }

    fn record_ranks(&mut self, generation_index: usize, results: &[MiniTournamentResult]) {
        for result in results {
            for (position, genome) in result.ranking.iter().enumerate() {
                self.all_known_ranks.record(
                    genome,
                    GenomeTournamentRank {
                        generation_id: generation_index,
                        tournament_id: result.tournament_id,
                        tournament_rank: position + 1,
                    },
                );
            }
        }
    }

    /// Best first-placed genome over all tournaments, judged on everything
    /// stored for the current instances
    fn update_incumbent(
        &mut self,
        generation_index: usize,
        instances: &[Instance],
        results: &[MiniTournamentResult],
    ) {
        let storage = self.coordinator.storage();
        let mut stats: Vec<GenomeStats> = results
            .iter()
            .filter_map(|result| result.ranking.first())
            .map(|genome| {
                let mut stats = GenomeStats::new(genome.clone(), instances);
                for instance in instances {
                    if let Some(result) = storage.query(genome, instance) {
                        let _ = stats.finish(instance, result);
                    }
                }
                stats
            })
            .collect();
        self.coordinator.evaluator().sort(&mut stats);

        let Some(best) = stats.first() else {
            return;
        };
        let genome = best.genome().clone();
        let results: Vec<_> = best
            .finished_results()
            .map(|(instance, result)| (instance.clone(), result.clone()))
            .collect();

        let kept = self
            .incumbent
            .as_ref()
            .map(|i| i.incumbent_genome == genome)
            .unwrap_or(false);
        if kept {
            self.incumbent_kept_counter += 1;
        } else {
            self.incumbent_kept_counter = 0;
            info!("New incumbent in generation {}: {}", generation_index, genome);
        }
        self.incumbent = Some(IncumbentGenomeWrapper::succeed(
            self.incumbent.as_ref(),
            genome,
            generation_index,
            results,
        ));
    }

    /// Offspring of the tournament winners, `count` in total
    fn create_offspring(&mut self, winners: &[Genome], count: usize) -> Result<Vec<Genome>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        if winners.is_empty() {
            return Err(TunerError::Precondition(
                "GGA needs at least one tournament winner to create offspring".to_string(),
            ));
        }
        let population = self.population.as_ref().ok_or_else(|| {
            TunerError::Precondition("GGA offspring before initialization".to_string())
        })?;

        let mut mates = population.non_competitive_mates().to_vec();
        if mates.is_empty() {
            mates = winners.to_vec();
        }

        let mut offspring = Vec::with_capacity(count);
        let mut mate_weights = None;
        if let Some(engineering) = self.engineering.as_mut() {
            engineering.train_forest(&self.all_known_ranks)?;
            let limit = (count as f64 * self.config.engineered_proportion).floor() as usize;
            let engineered = engineering.engineer_genomes(winners, &mates, population, &mut self.rng)?;
            for mut genome in engineered.into_iter().take(limit) {
                genome.set_age(0);
                genome.set_engineered(true);
                self.builder.make_genome_valid(&mut genome, &mut self.rng)?;
                offspring.push(genome);
            }

            let weights = engineering.attractiveness_measure(&mates);
            mate_weights = match WeightedIndex::new(&weights) {
                Ok(index) => Some(index),
                Err(e) => {
                    warn!("Ignoring mate attractiveness ({}), mating uniformly", e);
                    None
                }
            };
        }

        let mut i = 0;
        while offspring.len() < count {
            let parent = &winners[i % winners.len()];
            i += 1;
            let mate = match &mate_weights {
                Some(index) => &mates[index.sample(&mut self.rng)],
                None => &mates[self.rng.gen_range(0..mates.len())],
            };
            let mut child = self.builder.crossover(parent, mate, &mut self.rng);
            self.builder.mutate(&mut child, &mut self.rng);
            self.builder.make_genome_valid(&mut child, &mut self.rng)?;
            offspring.push(child);
        }
        Ok(offspring)
    }
}

impl PopulationUpdateStrategy for GgaStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Gga
    }

    fn initialize(
        &mut self,
        base_population: Population,
        incumbent: Option<IncumbentGenomeWrapper>,
        _instances: &[Instance],
    ) -> Result<()> {
        info!(
            "Starting GGA phase with {} competitive and {} non-competitive genomes",
            base_population.competitive_individuals().len(),
            base_population.non_competitive_mates().len()
        );
        self.population = Some(base_population);
        self.incumbent = incumbent;
        self.iteration_counter = 0;
        self.incumbent_kept_counter = 0;
        Ok(())
    }

    fn perform_iteration(&mut self, generation_index: usize, instances: &[Instance]) -> Result<()> {
        let results = self.run_tournaments(generation_index, instances)?;
        self.record_ranks(generation_index, &results);
        self.update_incumbent(generation_index, instances, &results);

        let mut winners = Vec::new();
        let mut seen = HashSet::new();
        for genome in results.iter().flat_map(|r| r.winners.iter()) {
            if seen.insert(genome.clone()) {
                winners.push(genome.clone());
            }
        }

        let incumbent = self.incumbent.as_ref().map(|i| i.incumbent_genome.clone());
        let report = match self.population.as_mut() {
            Some(population) => population.age(incumbent.as_ref()),
            None => {
                return Err(TunerError::Precondition(
                    "GGA iteration before initialization".to_string(),
                ))
            }
        };

        let offspring = self.create_offspring(&winners, report.total())?;
        let population = self.population.as_mut().ok_or_else(|| {
            TunerError::Precondition("GGA iteration before initialization".to_string())
        })?;
        for (i, child) in offspring.into_iter().enumerate() {
            population.add_genome(child, i < report.competitive_removed);
        }

        let mutants = population.replace_individuals_with_mutants(
            &self.builder,
            self.config.population_mutant_ratio,
            incumbent.as_ref(),
            &mut self.rng,
        )?;
        debug!(
            "Generation {}: {} died of age, {} winners, {} mutants",
            generation_index,
            report.total(),
            winners.len(),
            mutants
        );

        self.iteration_counter += 1;
        Ok(())
    }

    fn finish_phase(&mut self, base_population: Population) -> Result<Population> {
        Ok(self.population.take().unwrap_or(base_population))
    }

    fn find_incumbent_genome(&self) -> Option<IncumbentGenomeWrapper> {
        self.incumbent.clone()
    }

    fn has_terminated(&self) -> bool {
        if self.continuous_method == ContinuousOptimizationMethod::None {
            return false;
        }
        self.iteration_counter >= self.config.max_gga_generations_per_phase
            || self.incumbent_kept_counter >= self.config.max_gga_generations_with_same_incumbent
    }

    fn next_strategy(&self, candidates: &[StrategyKind]) -> usize {
        let next = self.continuous_method.strategy_kind().unwrap_or(StrategyKind::Gga);
        position_of(next, candidates)
    }

    fn dump_status(&self, path: &Path) -> Result<()> {
        self.status()?.write(path)
    }

    fn use_status_dump(&mut self, path: &Path) -> Result<()> {
        let status = GgaStatus::read(path)?;
        self.population = Some(status.population);
        self.iteration_counter = status.iteration_counter;
        self.incumbent_kept_counter = status.incumbent_kept_counter;
        self.all_known_ranks = status.all_known_ranks;
        self.incumbent = status.incumbent;
        self.next_tournament_id = status.next_tournament_id;
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
    use crate::engines::generation::genome_builder::AcceptAllGenomes;
    use crate::engines::generation::parameter_tree::{ParameterNode, ParameterTree};
    use crate::types::RunResult;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Constant(f64);

    impl TargetAlgorithm for Constant {
        fn run(&mut self, _instance: &Instance, _cancellation: &CancellationToken) -> Result<RunResult> {
            Ok(RunResult::with_quality(Duration::from_millis(1), self.0))
        }
    }

    struct GeneValue;

    impl TargetAlgorithmFactory for GeneValue {
        fn configure(&self, genome: &Genome) -> Result<Box<dyn TargetAlgorithm>> {
            let x = genome.gene("x").and_then(Allele::as_f64).unwrap_or(0.0);
            Ok(Box::new(Constant(x)))
        }
    }

    /// Proposes copies of the parents and counts trainings
    struct Cloner {
        trainings: Arc<AtomicUsize>,
    }

    impl GeneticEngineering for Cloner {
        fn train_forest(&mut self, ranks: &AllKnownRanks) -> Result<()> {
            assert!(!ranks.is_empty());
            self.trainings.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn engineer_genomes(
            &mut self,
            parents: &[Genome],
            _mates: &[Genome],
            _population: &Population,
            _rng: &mut StdRng,
        ) -> Result<Vec<Genome>> {
            Ok(parents.to_vec())
        }

        fn attractiveness_measure(&self, mates: &[Genome]) -> Vec<f64> {
            vec![1.0; mates.len()]
        }
    }

    fn strategy(method: ContinuousOptimizationMethod, config: GgaConfig) -> (GgaStrategy, Arc<GenomeBuilder>) {
        let tree = ParameterTree::new(ParameterNode::and(vec![
            ParameterNode::value("x", Domain::continuous(0.0, 100.0).unwrap()),
            ParameterNode::value("y", Domain::integer(0, 9).unwrap()),
        ]))
        .unwrap();
        let builder = Arc::new(GenomeBuilder::new(
            Arc::new(tree),
            config.builder_config(),
            Arc::new(AcceptAllGenomes),
        ));
        let coordinator = EvaluationCoordinator::new(
            CoordinatorConfig {
                worker_count: 2,
                evaluation_limit: None,
            },
            Arc::new(GeneValue),
            Arc::new(InMemoryResultStorage::new()),
            Arc::new(QualityEvaluator::new(OptimizationDirection::Minimize)),
        )
        .unwrap();
        let strategy = GgaStrategy::new(config, method, Arc::clone(&builder), Arc::new(coordinator), Some(4));
        (strategy, builder)
    }

    fn small_config() -> GgaConfig {
        GgaConfig {
            population_size: 8,
            max_genomes_per_tournament: 4,
            max_gga_generations_per_phase: 2,
            ..GgaConfig::default()
        }
    }

    fn instances() -> Vec<Instance> {
        vec![Instance::new("a"), Instance::new("b")]
    }

    #[test]
    fn test_tournament_groups_are_balanced() {
        let (strategy, builder) = strategy(ContinuousOptimizationMethod::None, small_config());
        let mut rng = StdRng::seed_from_u64(1);
        let genomes: Vec<Genome> = (0..10).map(|_| builder.create_random_genome(0, &mut rng).unwrap()).collect();

        let sizes: Vec<usize> = strategy.split_into_tournaments(genomes).iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![4, 3, 3]);
        assert_eq!(strategy.winners_for(4), 1);
        assert_eq!(strategy.winners_for(1), 1);
    }

    #[test]
    fn test_iteration_keeps_population_size() {
        let trainings = Arc::new(AtomicUsize::new(0));
        let (strategy, builder) = strategy(ContinuousOptimizationMethod::None, small_config());
        let mut strategy = strategy.with_genetic_engineering(Box::new(Cloner {
            trainings: Arc::clone(&trainings),
        }));
        let mut rng = StdRng::seed_from_u64(2);
        let population = Population::create_random(&builder, 8, 3, &mut rng).unwrap();
        strategy.initialize(population, None, &instances()).unwrap();

        for generation in 0..3 {
            strategy.perform_iteration(generation, &instances()).unwrap();
            assert_eq!(strategy.population().unwrap().len(), 8);
        }

        assert_eq!(strategy.iteration_counter(), 3);
        assert!(trainings.load(Ordering::SeqCst) >= 1);
        assert!(strategy.all_known_ranks().total_rank_count() >= 12);
        let incumbent = strategy.find_incumbent_genome().unwrap();
        assert_eq!(incumbent.incumbent_instance_results.len(), 2);
        assert!(!strategy.has_terminated());
    }

    #[test]
    fn test_phase_ends_after_configured_generations() {
        let (mut strategy, builder) = strategy(ContinuousOptimizationMethod::CmaEs, small_config());
        let mut rng = StdRng::seed_from_u64(3);
        let population = Population::create_random(&builder, 8, 3, &mut rng).unwrap();
        strategy.initialize(population, None, &instances()).unwrap();

        strategy.perform_iteration(0, &instances()).unwrap();
        assert!(!strategy.has_terminated());
        strategy.perform_iteration(1, &instances()).unwrap();
        assert!(strategy.has_terminated());

        let candidates = [StrategyKind::Gga, StrategyKind::CmaEs, StrategyKind::DifferentialEvolution];
        assert_eq!(strategy.next_strategy(&candidates), 1);
        let dump_before = strategy.status().unwrap();
        let population = strategy.finish_phase(dump_before.population.clone()).unwrap();
        assert_eq!(population, dump_before.population);
    }

    #[test]
    fn test_status_dump_restores_the_phase() {
        let (mut gga, builder) = strategy(ContinuousOptimizationMethod::CmaEs, small_config());
        let mut rng = StdRng::seed_from_u64(5);
        let population = Population::create_random(&builder, 8, 3, &mut rng).unwrap();
        gga.initialize(population, None, &instances()).unwrap();
        gga.perform_iteration(0, &instances()).unwrap();
        gga.perform_iteration(1, &instances()).unwrap();

        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("gga_status.json");
        gga.dump_status(&path).unwrap();

        let (mut restored, _) = strategy(ContinuousOptimizationMethod::CmaEs, small_config());
        restored.use_status_dump(&path).unwrap();

        let before = gga.status().unwrap();
        let mut after = restored.status().unwrap();
        after.written_at = before.written_at;
        assert_eq!(after, before);
        assert_eq!(after.iteration_counter, 2);
        assert!(after.next_tournament_id >= 2);
        assert!(!after.all_known_ranks.is_empty());
        assert!(restored.has_terminated());
    }
}
