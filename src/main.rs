use algotune::config::{ConfigManager, TunerConfig};
use algotune::engines::evaluation::{CancellationToken, TargetAlgorithm, TargetAlgorithmFactory};
use algotune::engines::generation::{
    AcceptAllGenomes, Allele, Domain, Genome, LoggingProgressCallback, ParameterNode, ParameterTree,
};
use algotune::engines::strategies::ContinuousOptimizationMethod;
use algotune::types::{Instance, RunResult};
use algotune::AlgorithmTuner;
use anyhow::Context;
use log::info;
use std::sync::Arc;
use std::time::Duration;

/// Stand-in solver whose runtime is a smooth function of its configuration
struct SyntheticSolver {
    cutoff: Duration,
    step: f64,
    restarts: f64,
    slow_mode: bool,
}

impl TargetAlgorithm for SyntheticSolver {
    fn run(&mut self, instance: &Instance, _cancellation: &CancellationToken) -> algotune::Result<RunResult> {
        let difficulty = instance
            .name
            .trim_start_matches("instance_")
            .parse::<f64>()
            .unwrap_or(0.0)
            / 10.0;
        let mut seconds = 0.5 + (self.step - 1.5).powi(2) + (self.restarts - 40.0).abs() / 20.0 + difficulty;
        if self.slow_mode {
            seconds += 2.0;
        }
        if seconds >= self.cutoff.as_secs_f64() {
            return Ok(RunResult::timeout(self.cutoff));
        }
        Ok(RunResult::success(Duration::from_secs_f64(seconds)))
    }
}

struct SyntheticSolverFactory {
    cutoff: Duration,
}

impl TargetAlgorithmFactory for SyntheticSolverFactory {
    fn configure(&self, genome: &Genome) -> algotune::Result<Box<dyn TargetAlgorithm>> {
        let number = |id: &str| genome.gene(id).and_then(Allele::as_f64).unwrap_or(0.0);
        Ok(Box::new(SyntheticSolver {
            cutoff: self.cutoff,
            step: number("step"),
            restarts: number("restarts"),
            slow_mode: genome.gene("mode") == Some(&Allele::Text("slow".to_string())),
        }))
    }
}

fn parameter_tree() -> algotune::Result<ParameterTree> {
    ParameterTree::new(ParameterNode::and(vec![
        ParameterNode::value("step", Domain::continuous(-5.0, 5.0)?),
        ParameterNode::value("restarts", Domain::integer(0, 100)?),
        ParameterNode::value(
            "mode",
            Domain::categorical(vec![Allele::Text("fast".to_string()), Allele::Text("slow".to_string())])?,
        ),
    ]))
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let manager = ConfigManager::new();
    match std::env::args().nth(1) {
        Some(path) => manager
            .load_from_file(&path)
            .with_context(|| format!("loading configuration from {}", path))?,
        None => manager.update(|config: &mut TunerConfig| {
            config.tuning.seed = Some(42);
            config.tuning.max_generations = 12;
            config.gga.population_size = 16;
            config.gga.max_gga_generations_per_phase = 4;
            config.continuous.method = ContinuousOptimizationMethod::CmaEs;
            config.continuous.max_generations_per_phase = 3;
            config.continuous.minimum_domain_size = 10;
        })?,
    }
    let config = manager.get();

    let evaluator = config.evaluation.build_evaluator()?;
    let factory = Arc::new(SyntheticSolverFactory {
        cutoff: config.evaluation.cutoff(),
    });
    let instances: Vec<Instance> = (0..20).map(|i| Instance::new(format!("instance_{}", i))).collect();
    let mut tuner = AlgorithmTuner::new(
        config,
        Arc::new(parameter_tree()?),
        factory,
        evaluator,
        Arc::new(AcceptAllGenomes),
        instances,
    )?;

    let incumbent = tuner.run(&mut LoggingProgressCallback)?;
    info!(
        "Best configuration (since generation {}): {}",
        incumbent.incumbent_generation + 1,
        incumbent.incumbent_genome
    );
    println!("{}", incumbent.incumbent_genome);
    Ok(())
}
