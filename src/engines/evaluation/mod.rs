pub mod coordinator;
pub mod genome_stats;
pub mod quality_evaluator;
pub mod run_evaluator;
pub mod runtime_evaluator;
pub mod storage;
pub mod target_algorithm;

pub use coordinator::{
    CoordinatorConfig, EvaluationCoordinator, MiniTournament, MiniTournamentResult, TournamentHandle,
};
pub use genome_stats::{GenomeStats, InstanceState};
pub use quality_evaluator::{OptimizationDirection, QualityEvaluator};
pub use run_evaluator::{PriorityWeights, RunEvaluator};
pub use runtime_evaluator::RuntimeEvaluator;
pub use storage::{InMemoryResultStorage, ResultStorage};
pub use target_algorithm::{CancellationToken, TargetAlgorithm, TargetAlgorithmFactory};
