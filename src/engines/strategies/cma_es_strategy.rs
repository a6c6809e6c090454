use super::continuous_phase::{base_genome_of, build_search_space, incumbent_after_ranking, replace_competitive_genomes};
use super::tournament_ranking::TournamentRanking;
use super::{position_of, read_status, write_status, PopulationUpdateStrategy, StrategyKind};
use crate::config::ContinuousConfig;
use crate::engines::continuous::cma_es::default_termination_criteria;
use crate::engines::continuous::{CmaEs, CmaEsConfiguration, CmaEsElements, SearchSpace};
use crate::engines::evaluation::coordinator::EvaluationCoordinator;
use crate::engines::generation::genome::Genome;
use crate::engines::generation::genome_builder::GenomeBuilder;
use crate::engines::generation::incumbent::IncumbentGenomeWrapper;
use crate::engines::generation::population::Population;
use crate::engines::generation::repair::RepairOperator;
use crate::error::{Result, TunerError};
use crate::types::Instance;
use chrono::{DateTime, Utc};
use log::info;
use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CmaEsStatus {
    pub elements: CmaEsElements,
    pub base_genome: Genome,
    /// Instances of the phase; fixed until the phase ends
    pub instances: Vec<Instance>,
    pub incumbent: Option<IncumbentGenomeWrapper>,
    pub most_recent_sorting: Vec<Genome>,
    pub generations_in_phase: usize,
    pub next_tournament_id: usize,
    pub written_at: DateTime<Utc>,
}

impl CmaEsStatus {
    pub fn write(&self, path: &Path) -> Result<()> {
        write_status(path, self)
    }

    pub fn read(path: &Path) -> Result<Self> {
        read_status(path)
    }
}

/// Runs CMA-ES on the numerical parameters of the competitive genomes.
pub struct CmaEsStrategy {
    config: ContinuousConfig,
    builder: Arc<GenomeBuilder>,
    repair: Arc<dyn RepairOperator>,
    coordinator: Arc<EvaluationCoordinator>,
    cma_es: CmaEs,
    space: Option<SearchSpace>,
    ranking: Option<TournamentRanking>,
    incumbent: Option<IncumbentGenomeWrapper>,
    generations_in_phase: usize,
    next_tournament_id: usize,
    terminated: bool,
    rng: StdRng,
}

impl CmaEsStrategy {
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
        let criteria = default_termination_criteria(config.max_generations_per_phase);

        Self {
            config,
            builder,
            repair,
            coordinator,
            cma_es: CmaEs::new(criteria),
            space: None,
            ranking: None,
            incumbent: None,
            generations_in_phase: 0,
            next_tournament_id: 0,
            terminated: false,
            rng,
        }
    }

    pub fn cma_es(&self) -> &CmaEs {
        &self.cma_es
    }

    pub fn search_space(&self) -> Option<&SearchSpace> {
        self.space.as_ref()
    }

    fn initial_mean(
        &self,
        space: &SearchSpace,
        population: &Population,
        incumbent: Option<&IncumbentGenomeWrapper>,
    ) -> Result<DVector<f64>> {
        if self.config.focus_on_incumbent {
            if let Some(incumbent) = incumbent {
                let point = space.create_from_genome(&incumbent.incumbent_genome)?;
                return Ok(DVector::from_vec(point.values().to_vec()));
            }
        }

        let competitive = population.competitive_individuals();
        let mut mean: DVector<f64> = DVector::zeros(space.dimension());
        for genome in competitive {
            let point = space.create_from_genome(genome)?;
            mean += DVector::from_column_slice(point.values());
        }
        Ok(mean / competitive.len().max(1) as f64)
    }

    fn status(&self) -> Result<CmaEsStatus> {
        let (Some(space), Some(ranking)) = (&self.space, &self.ranking) else {
            return Err(TunerError::Precondition(
                "CMA-ES status requested outside of a phase".to_string(),
            ));
        };
        Ok(CmaEsStatus {
            elements: self.cma_es.elements().clone(),
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

impl PopulationUpdateStrategy for CmaEsStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::CmaEs
    }

    fn initialize(
        &mut self,
        base_population: Population,
        incumbent: Option<IncumbentGenomeWrapper>,
        instances: &[Instance],
    ) -> Result<()> {
        let base_genome = base_genome_of(&base_population, incumbent.as_ref())?;
        let space = build_search_space(&self.config, &self.builder, &self.repair, base_genome)?;

        let dimension = space.dimension();
        let population_size = self
            .config
            .cma_es_population_size
            .unwrap_or_else(|| CmaEsConfiguration::default_population_size(dimension));
        let configuration =
            CmaEsConfiguration::new(population_size, dimension, self.config.cma_es_initial_step_size)?;
        let mean = self.initial_mean(&space, &base_population, incumbent.as_ref())?;
        self.cma_es.initialize(configuration, mean)?;

        info!(
            "Starting CMA-ES phase in {} dimensions with population size {}",
            dimension, population_size
        );

        self.ranking = Some(TournamentRanking::new(
            Arc::clone(&self.coordinator),
            instances.to_vec(),
            incumbent.as_ref().map(|i| i.incumbent_genome.clone()),
            self.next_tournament_id,
        ));
        self.space = Some(space);
        self.incumbent = incumbent;
        self.generations_in_phase = 0;
        self.terminated = false;
        Ok(())
    }

    fn perform_iteration(&mut self, generation_index: usize, _instances: &[Instance]) -> Result<()> {
        let (Some(space), Some(ranking)) = (self.space.as_ref(), self.ranking.as_mut()) else {
            return Err(TunerError::Precondition(
                "CMA-ES iteration outside of a phase".to_string(),
            ));
        };

        self.cma_es.next_generation(ranking, space, &mut self.rng)?;
        self.incumbent = incumbent_after_ranking(ranking, self.incumbent.as_ref(), generation_index);
        ranking.set_incumbent(self.incumbent.as_ref().map(|i| i.incumbent_genome.clone()));

        self.generations_in_phase += 1;
        self.terminated = self.generations_in_phase >= self.config.max_generations_per_phase
            || self.cma_es.any_termination_criterion_met()?;
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

        info!("Finished CMA-ES phase after {} generations", self.generations_in_phase);
        self.space = None;
        self.ranking = None;
        Ok(population)
    }

    fn find_incumbent_genome(&self) -> Option<IncumbentGenomeWrapper> {
        self.incumbent.clone()
    }

    fn has_terminated(&self) -> bool {
        self.terminated
    }

    fn next_strategy(&self, candidates: &[StrategyKind]) -> usize {
        position_of(StrategyKind::Gga, candidates)
    }

    fn dump_status(&self, path: &Path) -> Result<()> {
        self.status()?.write(path)
    }

    fn use_status_dump(&mut self, path: &Path) -> Result<()> {
        let status = CmaEsStatus::read(path)?;
        let space = build_search_space(&self.config, &self.builder, &self.repair, status.base_genome)?;
        let criteria = default_termination_criteria(self.config.max_generations_per_phase);
        let cma_es = CmaEs::from_elements(status.elements, criteria)?;

        let mut ranking = TournamentRanking::new(
            Arc::clone(&self.coordinator),
            status.instances,
            status.incumbent.as_ref().map(|i| i.incumbent_genome.clone()),
            status.next_tournament_id,
        );
        ranking.restore_sorting(status.most_recent_sorting);

        self.cma_es = cma_es;
        self.space = Some(space);
        self.ranking = Some(ranking);
        self.incumbent = status.incumbent;
        self.generations_in_phase = status.generations_in_phase;
        self.terminated = self.generations_in_phase >= self.config.max_generations_per_phase
            || self.cma_es.any_termination_criterion_met()?;
        Ok(())
    }
}
