//! Population update strategies and the switching between them.
//!
//! The tuner alternates phases: the GGA evolves the whole population, then
//! optionally a continuous optimizer (CMA-ES or JADE) refines the
//! competitive group, then the GGA takes over again.

pub mod cma_es_strategy;
pub mod continuous_phase;
pub mod de_strategy;
pub mod gga;
pub mod tournament_ranking;

pub use cma_es_strategy::{CmaEsStatus, CmaEsStrategy};
pub use de_strategy::{DifferentialEvolutionStatus, DifferentialEvolutionStrategy, InitialPointMode};
pub use gga::{GgaStatus, GgaStrategy};
pub use tournament_ranking::TournamentRanking;

use crate::engines::generation::incumbent::IncumbentGenomeWrapper;
use crate::engines::generation::population::Population;
use crate::error::{Result, TunerError};
use crate::types::Instance;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyKind {
    Gga,
    CmaEs,
    DifferentialEvolution,
}

impl StrategyKind {
    pub fn is_continuous(&self) -> bool {
        !matches!(self, StrategyKind::Gga)
    }

    /// File name of the strategy's status dump
    pub fn status_file_name(&self) -> &'static str {
        match self {
            StrategyKind::Gga => "gga_status.json",
            StrategyKind::CmaEs => "cma_es_status.json",
            StrategyKind::DifferentialEvolution => "differential_evolution_status.json",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Gga => write!(f, "GGA"),
            StrategyKind::CmaEs => write!(f, "CMA-ES"),
            StrategyKind::DifferentialEvolution => write!(f, "JADE"),
        }
    }
}

/// Continuous optimizer run between GGA phases
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContinuousOptimizationMethod {
    #[default]
    None,
    Jade,
    CmaEs,
}

impl ContinuousOptimizationMethod {
    pub fn strategy_kind(&self) -> Option<StrategyKind> {
        match self {
            ContinuousOptimizationMethod::None => None,
            ContinuousOptimizationMethod::Jade => Some(StrategyKind::DifferentialEvolution),
            ContinuousOptimizationMethod::CmaEs => Some(StrategyKind::CmaEs),
        }
    }
}

pub trait PopulationUpdateStrategy: Send {
    fn kind(&self) -> StrategyKind;

    /// Starts a phase on `base_population`
    fn initialize(
        &mut self,
        base_population: Population,
        incumbent: Option<IncumbentGenomeWrapper>,
        instances: &[Instance],
    ) -> Result<()>;

    fn perform_iteration(&mut self, generation_index: usize, instances: &[Instance]) -> Result<()>;

    /// Ends the phase and hands the population to the next strategy
    fn finish_phase(&mut self, base_population: Population) -> Result<Population>;

    fn find_incumbent_genome(&self) -> Option<IncumbentGenomeWrapper>;

    fn has_terminated(&self) -> bool;

    /// Index into `candidates` of the strategy to run next
    fn next_strategy(&self, candidates: &[StrategyKind]) -> usize;

    fn dump_status(&self, path: &Path) -> Result<()>;

    fn use_status_dump(&mut self, path: &Path) -> Result<()>;
}

/// Checks that every phase switch lands on an available strategy
pub fn validate_strategy_cycle(
    method: ContinuousOptimizationMethod,
    candidates: &[StrategyKind],
) -> Result<()> {
    if !candidates.contains(&StrategyKind::Gga) {
        return Err(TunerError::Configuration(
            "The GGA strategy must always be available".to_string(),
        ));
    }
    if let Some(kind) = method.strategy_kind() {
        if !candidates.contains(&kind) {
            return Err(TunerError::Configuration(format!(
                "Continuous optimization method {:?} has no {} strategy to switch to",
                method, kind
            )));
        }
    }
    Ok(())
}

pub(crate) fn position_of(kind: StrategyKind, candidates: &[StrategyKind]) -> usize {
    candidates.iter().position(|k| *k == kind).unwrap_or(0)
}

pub(crate) fn write_status<T: Serialize>(path: &Path, status: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(status)?;
    fs::write(path, json)?;
    Ok(())
}

pub(crate) fn read_status<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path).map_err(|e| {
        TunerError::StatusDump(format!("cannot read {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&contents)
        .map_err(|e| TunerError::StatusDump(format!("cannot parse {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_validation() {
        let all = [StrategyKind::Gga, StrategyKind::CmaEs, StrategyKind::DifferentialEvolution];
        assert!(validate_strategy_cycle(ContinuousOptimizationMethod::Jade, &all).is_ok());
        assert!(validate_strategy_cycle(
            ContinuousOptimizationMethod::Jade,
            &[StrategyKind::Gga, StrategyKind::CmaEs]
        )
        .is_err());
        assert!(validate_strategy_cycle(ContinuousOptimizationMethod::None, &[StrategyKind::Gga]).is_ok());
    }
}
