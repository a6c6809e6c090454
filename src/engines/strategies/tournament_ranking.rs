use crate::engines::continuous::SearchPointRanking;
use crate::engines::evaluation::coordinator::{EvaluationCoordinator, MiniTournament, MiniTournamentResult};
use crate::engines::generation::genome::Genome;
use crate::error::Result;
use crate::types::{Instance, RunResult};
use std::collections::HashMap;
use std::sync::Arc;

/// Ranks search points through mini tournaments of the evaluation
/// coordinator.
///
/// Population rankings always include the current incumbent, so the best
/// genome of a continuous phase is never worse than the one it started from.
pub struct TournamentRanking {
    coordinator: Arc<EvaluationCoordinator>,
    instances: Vec<Instance>,
    incumbent: Option<Genome>,
    next_tournament_id: usize,
    most_recent_sorting: Vec<Genome>,
    most_recent_results: HashMap<Genome, Vec<(Instance, RunResult)>>,
}

impl TournamentRanking {
    pub fn new(
        coordinator: Arc<EvaluationCoordinator>,
        instances: Vec<Instance>,
        incumbent: Option<Genome>,
        first_tournament_id: usize,
    ) -> Self {
        Self {
            coordinator,
            instances,
            incumbent,
            next_tournament_id: first_tournament_id,
            most_recent_sorting: Vec::new(),
            most_recent_results: HashMap::new(),
        }
    }

    pub fn set_incumbent(&mut self, incumbent: Option<Genome>) {
        self.incumbent = incumbent;
    }

    pub fn incumbent(&self) -> Option<&Genome> {
        self.incumbent.as_ref()
    }

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    pub fn next_tournament_id(&self) -> usize {
        self.next_tournament_id
    }

    /// Distinct genomes of the last population ranking, incumbent included,
    /// best first
    pub fn most_recent_sorting(&self) -> &[Genome] {
        &self.most_recent_sorting
    }

    /// Reinstates the sorting of a resumed phase. Run results are looked up
    /// again on the next ranking.
    pub fn restore_sorting(&mut self, sorting: Vec<Genome>) {
        self.most_recent_sorting = sorting;
        self.most_recent_results.clear();
    }

    pub fn results_of(&self, genome: &Genome) -> Vec<(Instance, RunResult)> {
        self.most_recent_results.get(genome).cloned().unwrap_or_default()
    }

    /// Best genome of the last population ranking
    pub fn best(&self) -> Option<&Genome> {
        self.most_recent_sorting.first()
    }

    fn tournament(&mut self, participants: Vec<Genome>, number_of_winners: usize) -> MiniTournament {
        let id = self.next_tournament_id;
        self.next_tournament_id += 1;
        MiniTournament {
            id,
            participants,
            instances: self.instances.clone(),
            number_of_winners,
        }
    }
}

/// Indices into `genomes`, ordered by the genomes' positions in `result`
fn order_by_ranking(genomes: &[Genome], result: &MiniTournamentResult) -> Vec<usize> {
    let positions: HashMap<&Genome, usize> = result
        .ranking
        .iter()
        .enumerate()
        .map(|(position, genome)| (genome, position))
        .collect();
    let mut order: Vec<usize> = (0..genomes.len()).collect();
    order.sort_by_key(|&i| positions.get(&genomes[i]).copied().unwrap_or(usize::MAX));
    order
}

impl SearchPointRanking for TournamentRanking {
    fn rank_population(&mut self, genomes: &[Genome], number_of_winners: usize) -> Result<Vec<usize>> {
        let mut participants = genomes.to_vec();
        let mut number_of_winners = number_of_winners;
        if let Some(incumbent) = &self.incumbent {
            participants.push(incumbent.clone());
            number_of_winners += 1;
        }

        let tournament = self.tournament(participants, number_of_winners);
        let result = self.coordinator.evaluate(tournament)?;

        let order = order_by_ranking(genomes, &result);
        self.most_recent_sorting = result.ranking.clone();
        self.most_recent_results = result.results;
        Ok(order)
    }

    fn rank_groups(&mut self, groups: &[Vec<Genome>], number_of_winners: usize) -> Result<Vec<Vec<usize>>> {
        let mut handles = Vec::with_capacity(groups.len());
        for group in groups {
            let tournament = self.tournament(group.clone(), number_of_winners);
            handles.push(self.coordinator.submit(tournament)?);
        }

        let mut orders = Vec::with_capacity(groups.len());
        for (group, handle) in groups.iter().zip(handles) {
            let result = handle.wait()?;
            orders.push(order_by_ranking(group, &result));
        }
        Ok(orders)
    }
}
