pub mod domain;
pub mod engineering;
pub mod genome;
pub mod genome_builder;
pub mod incumbent;
pub mod parameter_tree;
pub mod population;
pub mod progress;
pub mod repair;
pub mod tournament_rank;

pub use domain::{Allele, Domain};
pub use engineering::GeneticEngineering;
pub use genome::Genome;
pub use genome_builder::{AcceptAllGenomes, GenomeBuilder, GenomeBuilderConfig, GenomeValidator};
pub use incumbent::IncumbentGenomeWrapper;
pub use parameter_tree::{ParameterNode, ParameterTree};
pub use population::{AgeingReport, Population};
pub use progress::{ChannelProgressCallback, LoggingProgressCallback, ProgressCallback, ProgressMessage};
pub use repair::{MutationRepair, RepairOperator};
pub use tournament_rank::{AllKnownRanks, GenomeTournamentRank, KnownRankEntry};
