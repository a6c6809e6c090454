use super::genome::Genome;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Finishing position of one genome in one mini tournament
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenomeTournamentRank {
    pub generation_id: usize,
    pub tournament_id: usize,
    pub tournament_rank: usize,
}

/// Persisted form of one genome's rank history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownRankEntry {
    pub genome: Genome,
    pub ranks: Vec<GenomeTournamentRank>,
}

/// Historical tournament ranks of every genome evaluated so far.
///
/// Keyed by genome content. Persisted as an explicit list of
/// (genome, ranks) entries and regrouped on load, so a reload never depends
/// on map key encoding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<KnownRankEntry>", into = "Vec<KnownRankEntry>")]
pub struct AllKnownRanks {
    ranks: HashMap<Genome, Vec<GenomeTournamentRank>>,
}

impl AllKnownRanks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, genome: &Genome, rank: GenomeTournamentRank) {
        self.ranks.entry(genome.clone()).or_default().push(rank);
    }

    pub fn ranks_of(&self, genome: &Genome) -> &[GenomeTournamentRank] {
        self.ranks.get(genome).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Genome, &Vec<GenomeTournamentRank>)> {
        self.ranks.iter()
    }

    /// Number of distinct genomes with at least one rank
    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    pub fn total_rank_count(&self) -> usize {
        self.ranks.values().map(Vec::len).sum()
    }
}

impl From<Vec<KnownRankEntry>> for AllKnownRanks {
    fn from(entries: Vec<KnownRankEntry>) -> Self {
        let mut known = AllKnownRanks::new();
        for entry in entries {
            known.ranks.entry(entry.genome).or_default().extend(entry.ranks);
        }
        known
    }
}

impl From<AllKnownRanks> for Vec<KnownRankEntry> {
    fn from(known: AllKnownRanks) -> Self {
        let mut entries: Vec<KnownRankEntry> = known
            .ranks
            .into_iter()
            .map(|(genome, ranks)| KnownRankEntry { genome, ranks })
            .collect();
        entries.sort_by(|a, b| a.genome.cmp(&b.genome));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::generation::domain::Allele;

    #[test]
    fn test_ranks_regroup_after_reload() {
        let mut young = Genome::new(0);
        young.set_gene("x", Allele::Integer(1));
        let mut old = young.clone();
        old.set_age(4);

        let mut known = AllKnownRanks::new();
        known.record(&young, GenomeTournamentRank { generation_id: 0, tournament_id: 1, tournament_rank: 2 });
        known.record(&old, GenomeTournamentRank { generation_id: 3, tournament_id: 0, tournament_rank: 0 });
        assert_eq!(known.len(), 1);

        let json = serde_json::to_string(&known).unwrap();
        let restored: AllKnownRanks = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, known);
        assert_eq!(restored.ranks_of(&young).len(), 2);
    }
}
