//! Top-level tuning loop.
//!
//! Owns the evaluation coordinator and one instance of every population
//! update strategy, and moves the population from phase to phase.

use crate::config::TunerConfig;
use crate::engines::evaluation::coordinator::EvaluationCoordinator;
use crate::engines::evaluation::run_evaluator::RunEvaluator;
use crate::engines::evaluation::storage::{InMemoryResultStorage, ResultStorage};
use crate::engines::evaluation::target_algorithm::TargetAlgorithmFactory;
use crate::engines::generation::engineering::GeneticEngineering;
use crate::engines::generation::genome_builder::{GenomeBuilder, GenomeValidator};
use crate::engines::generation::incumbent::IncumbentGenomeWrapper;
use crate::engines::generation::parameter_tree::ParameterTree;
use crate::engines::generation::population::Population;
use crate::engines::generation::progress::ProgressCallback;
use crate::engines::generation::repair::{MutationRepair, RepairOperator};
use crate::engines::strategies::{
    read_status, validate_strategy_cycle, write_status, CmaEsStrategy, DifferentialEvolutionStrategy,
    GgaStrategy, PopulationUpdateStrategy, StrategyKind,
};
use crate::error::{Result, TunerError};
use crate::types::Instance;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

pub const TUNER_STATUS_FILE: &str = "tuner_status.json";

/// Strategies in the order they are registered with the tuner
pub const STRATEGY_KINDS: [StrategyKind; 3] =
    [StrategyKind::Gga, StrategyKind::CmaEs, StrategyKind::DifferentialEvolution];

/// Tuner state written next to the active strategy's own dump
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunerStatus {
    /// Next generation to run
    pub generation: usize,
    pub current_strategy: StrategyKind,
    /// Population the current phase started from
    pub population: Population,
    pub incumbent: Option<IncumbentGenomeWrapper>,
    /// Instances of the running continuous phase
    pub phase_instances: Option<Vec<Instance>>,
    pub written_at: DateTime<Utc>,
}

pub struct AlgorithmTuner {
    config: TunerConfig,
    builder: Arc<GenomeBuilder>,
    repair: Arc<dyn RepairOperator>,
    coordinator: Arc<EvaluationCoordinator>,
    instances: Vec<Instance>,
    engineering: Option<Box<dyn GeneticEngineering>>,
    strategies: Vec<Box<dyn PopulationUpdateStrategy>>,
    current: usize,
    phase_started: bool,
    population: Option<Population>,
    incumbent: Option<IncumbentGenomeWrapper>,
    phase_instances: Option<Vec<Instance>>,
    generation: usize,
    rng: StdRng,
}

impl AlgorithmTuner {
    pub fn new(
        config: TunerConfig,
        tree: Arc<ParameterTree>,
        factory: Arc<dyn TargetAlgorithmFactory>,
        evaluator: Arc<dyn RunEvaluator>,
        validator: Arc<dyn GenomeValidator>,
        instances: Vec<Instance>,
    ) -> Result<Self> {
        config.validate()?;
        if instances.is_empty() {
            return Err(TunerError::InvalidArgument(
                "Tuning needs at least one instance".to_string(),
            ));
        }
        validate_strategy_cycle(config.continuous.method, &STRATEGY_KINDS)?;

        let builder = Arc::new(GenomeBuilder::new(tree, config.gga.builder_config(), validator));
        let seed = config.tuning.seed;
        let repair: Arc<dyn RepairOperator> = Arc::new(MutationRepair {
            seed: seed.unwrap_or_default(),
        });
        let storage: Arc<dyn ResultStorage> = Arc::new(InMemoryResultStorage::new());
        let coordinator = Arc::new(EvaluationCoordinator::new(
            config.evaluation.to_coordinator_config(),
            factory,
            storage,
            evaluator,
        )?);
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            config,
            builder,
            repair,
            coordinator,
            instances,
            engineering: None,
            strategies: Vec::new(),
            current: 0,
            phase_started: false,
            population: None,
            incumbent: None,
            phase_instances: None,
            generation: 0,
            rng,
        })
    }

    /// Lets a surrogate model bias GGA crossover
    pub fn with_genetic_engineering(mut self, engineering: Box<dyn GeneticEngineering>) -> Self {
        self.engineering = Some(engineering);
        self
    }

    pub fn config(&self) -> &TunerConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &Arc<EvaluationCoordinator> {
        &self.coordinator
    }

    pub fn incumbent(&self) -> Option<&IncumbentGenomeWrapper> {
        self.incumbent.as_ref()
    }

    pub fn population(&self) -> Option<&Population> {
        self.population.as_ref()
    }

    /// Number of generations run so far
    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn current_strategy(&self) -> StrategyKind {
        STRATEGY_KINDS[self.current]
    }

    fn ensure_strategies(&mut self) {
        if !self.strategies.is_empty() {
            return;
        }
        let seed = self.config.tuning.seed;
        let derived = |offset: u64| seed.map(|s| s.wrapping_add(offset));

        let mut gga = GgaStrategy::new(
            self.config.gga.clone(),
            self.config.continuous.method,
            Arc::clone(&self.builder),
            Arc::clone(&self.coordinator),
            derived(1),
        );
        if let Some(engineering) = self.engineering.take() {
            gga.set_genetic_engineering(engineering);
        }
        let cma_es = CmaEsStrategy::new(
            self.config.continuous.clone(),
            Arc::clone(&self.builder),
            Arc::clone(&self.repair),
            Arc::clone(&self.coordinator),
            derived(2),
        );
        let jade = DifferentialEvolutionStrategy::new(
            self.config.continuous.clone(),
            Arc::clone(&self.builder),
            Arc::clone(&self.repair),
            Arc::clone(&self.coordinator),
            derived(3),
        );
        self.strategies = vec![Box::new(gga), Box::new(cma_es), Box::new(jade)];
    }

    /// Random subset of the instances, sized by the instance schedule
    fn sample_instances(&mut self, generation: usize) -> Vec<Instance> {
        let count = self
            .config
            .tuning
            .instances_for_generation(generation)
            .clamp(1, self.instances.len());
        let mut chosen: Vec<Instance> = self.instances.choose_multiple(&mut self.rng, count).cloned().collect();
        chosen.sort();
        chosen
    }

    fn instances_for(&mut self, generation: usize) -> Vec<Instance> {
        match &self.phase_instances {
            Some(instances) => instances.clone(),
            None => self.sample_instances(generation),
        }
    }

    fn start_phase(&mut self, population: Population) -> Result<()> {
        let kind = STRATEGY_KINDS[self.current];
        let instances = self.sample_instances(self.generation);
        self.phase_instances = kind.is_continuous().then(|| instances.clone());
        self.strategies[self.current].initialize(population.clone(), self.incumbent.clone(), &instances)?;
        self.population = Some(population);
        self.phase_started = true;
        Ok(())
    }

    fn switch_phase(&mut self, progress: &mut dyn ProgressCallback) -> Result<()> {
        let base = self.population.take().ok_or_else(|| {
            TunerError::Precondition("phase switch without a population".to_string())
        })?;
        let from = STRATEGY_KINDS[self.current];
        let finished = self.strategies[self.current].finish_phase(base)?;
        let next = self.strategies[self.current].next_strategy(&STRATEGY_KINDS);
        let to = STRATEGY_KINDS[next];

        progress.on_phase_switch(self.generation.saturating_sub(1), from, to);
        self.current = next;
        self.start_phase(finished)
    }

    /// Runs generations until `max_generations` or the evaluation budget is
    /// used up. Returns the final incumbent.
    pub fn run(&mut self, progress: &mut dyn ProgressCallback) -> Result<IncumbentGenomeWrapper> {
        self.ensure_strategies();
        if !self.phase_started {
            let population = match self.population.take() {
                Some(population) => population,
                None => Population::create_random(
                    &self.builder,
                    self.config.gga.population_size,
                    self.config.gga.max_genome_age,
                    &mut self.rng,
                )?,
            };
            self.start_phase(population)?;
        }

        while self.generation < self.config.tuning.max_generations {
            if self.coordinator.is_budget_exhausted() {
                warn!("Evaluation limit reached after {} generations", self.generation);
                break;
            }

            let generation = self.generation;
            let kind = STRATEGY_KINDS[self.current];
            progress.on_generation_start(generation, kind);

            let instances = self.instances_for(generation);
            debug!("Generation {} uses {} instances", generation, instances.len());
            self.strategies[self.current].perform_iteration(generation, &instances)?;
            if let Some(incumbent) = self.strategies[self.current].find_incumbent_genome() {
                self.incumbent = Some(incumbent);
            }
            if let Some(incumbent) = &self.incumbent {
                progress.on_generation_complete(generation, incumbent);
            }
            self.generation += 1;

            if self.strategies[self.current].has_terminated() && self.generation < self.config.tuning.max_generations {
                self.switch_phase(progress)?;
            }
            if let Some(directory) = self.config.tuning.status_directory.clone() {
                self.dump_status(&directory)?;
            }
        }

        info!(
            "Tuning finished after {} generations and {} evaluations",
            self.generation,
            self.coordinator.evaluations_started()
        );
        self.incumbent.clone().ok_or_else(|| {
            TunerError::Precondition("tuning finished without an incumbent".to_string())
        })
    }

    /// Writes the tuner status and the active strategy's status to
    /// `directory`
    pub fn dump_status(&self, directory: &Path) -> Result<()> {
        let population = self.population.clone().ok_or_else(|| {
            TunerError::Precondition("status dump before the first phase".to_string())
        })?;
        let kind = STRATEGY_KINDS[self.current];
        let status = TunerStatus {
            generation: self.generation,
            current_strategy: kind,
            population,
            incumbent: self.incumbent.clone(),
            phase_instances: self.phase_instances.clone(),
            written_at: Utc::now(),
        };
        write_status(&directory.join(TUNER_STATUS_FILE), &status)?;
        self.strategies[self.current].dump_status(&directory.join(kind.status_file_name()))?;
        debug!("Wrote status of generation {} to {}", self.generation, directory.display());
        Ok(())
    }

    /// Continues from the dumps in `directory`. Evaluation results are not
    /// part of the dump and are recomputed on demand.
    pub fn resume_from(&mut self, directory: &Path) -> Result<()> {
        self.ensure_strategies();
        let status: TunerStatus = read_status(&directory.join(TUNER_STATUS_FILE))?;
        let current = STRATEGY_KINDS
            .iter()
            .position(|k| *k == status.current_strategy)
            .ok_or_else(|| TunerError::StatusDump(format!("unknown strategy {}", status.current_strategy)))?;

        self.strategies[current].use_status_dump(&directory.join(status.current_strategy.status_file_name()))?;
        self.current = current;
        self.generation = status.generation;
        self.population = Some(status.population);
        self.incumbent = status.incumbent;
        self.phase_instances = status.phase_instances;
        self.phase_started = true;
        info!(
            "Resumed {} phase at generation {} from {}",
            status.current_strategy,
            status.generation,
            directory.display()
        );
        Ok(())
    }
}
