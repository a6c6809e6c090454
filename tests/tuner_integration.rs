use algotune::config::{Objective, TunerConfig};
use algotune::engines::evaluation::{CancellationToken, OptimizationDirection, TargetAlgorithm, TargetAlgorithmFactory};
use algotune::engines::generation::{
    AcceptAllGenomes, Allele, ChannelProgressCallback, Domain, Genome, ParameterNode, ParameterTree, ProgressMessage,
};
use algotune::engines::strategies::{ContinuousOptimizationMethod, GgaStatus, StrategyKind};
use algotune::tuner::{TunerStatus, TUNER_STATUS_FILE};
use algotune::types::{Instance, RunResult};
use algotune::{AlgorithmTuner, TunerError};
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Quality is the distance of (x, y, k) to a fixed optimum
struct Bowl {
    x: f64,
    y: f64,
    k: f64,
}

impl TargetAlgorithm for Bowl {
    fn run(&mut self, instance: &Instance, _cancellation: &CancellationToken) -> algotune::Result<RunResult> {
        let offset = instance.name.len() as f64 / 100.0;
        let quality = (self.x - 1.0).powi(2) + (self.y + 1.0).powi(2) + (self.k - 30.0).powi(2) / 1000.0 + offset;
        Ok(RunResult::with_quality(Duration::from_millis(1), quality))
    }
}

struct BowlFactory;

impl TargetAlgorithmFactory for BowlFactory {
    fn configure(&self, genome: &Genome) -> algotune::Result<Box<dyn TargetAlgorithm>> {
        let number = |id: &str| genome.gene(id).and_then(Allele::as_f64).unwrap_or(0.0);
        Ok(Box::new(Bowl {
            x: number("x"),
            y: number("y"),
            k: number("k"),
        }))
    }
}

fn tree() -> Arc<ParameterTree> {
    Arc::new(
        ParameterTree::new(ParameterNode::and(vec![
            ParameterNode::value("x", Domain::continuous(-5.0, 5.0).unwrap()),
            ParameterNode::value("y", Domain::continuous(-5.0, 5.0).unwrap()),
            ParameterNode::value("k", Domain::integer(0, 100).unwrap()),
            ParameterNode::value("flag", Domain::categorical(vec![Allele::Bool(false), Allele::Bool(true)]).unwrap()),
        ]))
        .unwrap(),
    )
}

fn config(method: ContinuousOptimizationMethod, max_generations: usize) -> TunerConfig {
    let mut config = TunerConfig::default();
    config.tuning.seed = Some(17);
    config.tuning.max_generations = max_generations;
    config.tuning.start_num_instances = 2;
    config.tuning.end_num_instances = 4;
    config.tuning.goal_generation = 4;
    config.gga.population_size = 12;
    config.gga.max_genomes_per_tournament = 4;
    config.gga.max_gga_generations_per_phase = 2;
    config.continuous.method = method;
    config.continuous.max_generations_per_phase = 2;
    config.evaluation.worker_count = 2;
    config.evaluation.objective = Objective::Quality;
    config.evaluation.quality_direction = OptimizationDirection::Minimize;
    config
}

fn tuner(config: TunerConfig) -> AlgorithmTuner {
    let evaluator = config.evaluation.build_evaluator().unwrap();
    let instances: Vec<Instance> = (0..6).map(|i| Instance::new(format!("inst_{}", i))).collect();
    AlgorithmTuner::new(
        config,
        tree(),
        Arc::new(BowlFactory),
        evaluator,
        Arc::new(AcceptAllGenomes),
        instances,
    )
    .unwrap()
}

fn phase_switches(messages: &[ProgressMessage]) -> Vec<(StrategyKind, StrategyKind)> {
    messages
        .iter()
        .filter_map(|message| match message {
            ProgressMessage::PhaseSwitch { from, to, .. } => Some((*from, *to)),
            _ => None,
        })
        .collect()
}

#[test]
fn test_gga_only_run_reports_every_generation() {
    let mut tuner = tuner(config(ContinuousOptimizationMethod::None, 4));
    let (sender, receiver) = channel();
    let incumbent = tuner.run(&mut ChannelProgressCallback::new(sender)).unwrap();
    let messages: Vec<ProgressMessage> = receiver.try_iter().collect();

    assert_eq!(tuner.generation(), 4);
    assert_eq!(tuner.current_strategy(), StrategyKind::Gga);
    assert!(phase_switches(&messages).is_empty());
    let completed = messages
        .iter()
        .filter(|m| matches!(m, ProgressMessage::GenerationComplete { .. }))
        .count();
    assert_eq!(completed, 4);
    assert!(!incumbent.incumbent_instance_results.is_empty());
    assert!(incumbent.incumbent_generation < 4);
}

#[test]
fn test_cma_es_phases_alternate_with_gga() {
    let mut tuner = tuner(config(ContinuousOptimizationMethod::CmaEs, 6));
    let (sender, receiver) = channel();
    tuner.run(&mut ChannelProgressCallback::new(sender)).unwrap();
    let switches = phase_switches(&receiver.try_iter().collect::<Vec<_>>());

    assert_eq!(switches.first(), Some(&(StrategyKind::Gga, StrategyKind::CmaEs)));
    assert!(switches.contains(&(StrategyKind::CmaEs, StrategyKind::Gga)));
    assert_eq!(tuner.generation(), 6);

    let population = tuner.population().unwrap();
    assert_eq!(population.len(), 12);
    assert!(!tuner.incumbent().unwrap().incumbent_instance_results.is_empty());
}

#[test]
fn test_jade_phase_runs_on_competitive_genomes() {
    let mut tuner = tuner(config(ContinuousOptimizationMethod::Jade, 5));
    let (sender, receiver) = channel();
    tuner.run(&mut ChannelProgressCallback::new(sender)).unwrap();
    let switches = phase_switches(&receiver.try_iter().collect::<Vec<_>>());

    assert_eq!(
        switches.first(),
        Some(&(StrategyKind::Gga, StrategyKind::DifferentialEvolution))
    );
    assert!(tuner.incumbent().is_some());
}

#[test]
fn test_evaluation_limit_stops_tuning_early() {
    let mut config = config(ContinuousOptimizationMethod::None, 10);
    config.evaluation.evaluation_limit = Some(20);
    let mut tuner = tuner(config);

    let (sender, _receiver) = channel();
    tuner.run(&mut ChannelProgressCallback::new(sender)).unwrap();

    assert!(tuner.coordinator().is_budget_exhausted());
    assert!(tuner.coordinator().evaluations_started() <= 20);
    assert!(tuner.generation() < 10);
}

#[test]
fn test_gga_status_is_dumped_every_generation() {
    let directory = TempDir::new().unwrap();
    let mut config = config(ContinuousOptimizationMethod::None, 3);
    config.tuning.status_directory = Some(directory.path().to_path_buf());
    let mut tuner = tuner(config);
    let (sender, _receiver) = channel();
    tuner.run(&mut ChannelProgressCallback::new(sender)).unwrap();

    let status = GgaStatus::read(&directory.path().join(StrategyKind::Gga.status_file_name())).unwrap();
    assert_eq!(status.iteration_counter, 3);
    assert_eq!(status.population.len(), 12);
    assert!(!status.all_known_ranks.is_empty());
    assert_eq!(status.incumbent.as_ref(), tuner.incumbent());
}

#[test]
fn test_resume_continues_a_continuous_phase() {
    let directory = TempDir::new().unwrap();
    let mut first = config(ContinuousOptimizationMethod::CmaEs, 3);
    first.tuning.status_directory = Some(directory.path().to_path_buf());
    let mut tuner_a = tuner(first);
    let (sender, _receiver) = channel();
    tuner_a.run(&mut ChannelProgressCallback::new(sender)).unwrap();
    assert_eq!(tuner_a.current_strategy(), StrategyKind::CmaEs);

    let status: TunerStatus =
        serde_json::from_str(&std::fs::read_to_string(directory.path().join(TUNER_STATUS_FILE)).unwrap()).unwrap();
    assert_eq!(status.generation, 3);
    assert_eq!(status.current_strategy, StrategyKind::CmaEs);
    assert!(status.phase_instances.is_some());
    assert!(directory.path().join(StrategyKind::CmaEs.status_file_name()).exists());

    let mut tuner_b = tuner(config(ContinuousOptimizationMethod::CmaEs, 5));
    tuner_b.resume_from(directory.path()).unwrap();
    assert_eq!(tuner_b.generation(), 3);
    assert_eq!(tuner_b.current_strategy(), StrategyKind::CmaEs);

    let (sender, _receiver) = channel();
    tuner_b.run(&mut ChannelProgressCallback::new(sender)).unwrap();
    assert_eq!(tuner_b.generation(), 5);
}

#[test]
fn test_resume_without_dump_fails() {
    let directory = TempDir::new().unwrap();
    let mut tuner = tuner(config(ContinuousOptimizationMethod::None, 3));
    let outcome = tuner.resume_from(directory.path());
    assert!(matches!(outcome, Err(TunerError::StatusDump(_))));
}

#[test]
fn test_tuner_rejects_missing_instances() {
    let config = config(ContinuousOptimizationMethod::None, 3);
    let evaluator = config.evaluation.build_evaluator().unwrap();
    let outcome = AlgorithmTuner::new(
        config,
        tree(),
        Arc::new(BowlFactory),
        evaluator,
        Arc::new(AcceptAllGenomes),
        Vec::new(),
    );
    assert!(matches!(outcome, Err(TunerError::InvalidArgument(_))));
}
