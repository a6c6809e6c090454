use super::domain::Allele;
use super::parameter_tree::ParameterTree;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Genome representation for algorithm configuration
///
/// A genome is one complete parameter assignment: every identifier of the
/// [`ParameterTree`] maps to an allele, including identifiers that sit in an
/// inactive OR branch. On top of the genes it carries
/// - an `age`, the number of generations it survived
/// - an origin flag telling natural offspring from surrogate-engineered ones
///
/// # Equality
///
/// Two genomes are equal iff their gene maps are equal. Age and origin are
/// bookkeeping and never take part in equality, ordering or hashing, so a
/// genome can be used as a key for stored results and tournament ranks, and
/// that key survives serialization unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Genome {
    genes: BTreeMap<String, Allele>,
    age: usize,
    #[serde(default)]
    is_engineered: bool,
}

impl Genome {
    pub fn new(age: usize) -> Self {
        Self {
            genes: BTreeMap::new(),
            age,
            is_engineered: false,
        }
    }

    pub fn from_genes(genes: BTreeMap<String, Allele>, age: usize) -> Self {
        Self {
            genes,
            age,
            is_engineered: false,
        }
    }

    pub fn gene(&self, identifier: &str) -> Option<&Allele> {
        self.genes.get(identifier)
    }

    pub fn set_gene(&mut self, identifier: impl Into<String>, allele: Allele) {
        self.genes.insert(identifier.into(), allele);
    }

    pub fn genes(&self) -> &BTreeMap<String, Allele> {
        &self.genes
    }

    pub fn age(&self) -> usize {
        self.age
    }

    pub fn set_age(&mut self, age: usize) {
        self.age = age;
    }

    pub fn increment_age(&mut self) {
        self.age += 1;
    }

    pub fn is_engineered(&self) -> bool {
        self.is_engineered
    }

    pub fn set_engineered(&mut self, is_engineered: bool) {
        self.is_engineered = is_engineered;
    }

    /// Genes that are active given the OR choices of this genome
    pub fn active_genes(&self, tree: &ParameterTree) -> BTreeMap<String, Allele> {
        tree.active_identifiers(&self.genes)
            .into_iter()
            .filter_map(|id| self.genes.get(&id).map(|allele| (id, allele.clone())))
            .collect()
    }

    pub fn content_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

impl PartialEq for Genome {
    fn eq(&self, other: &Self) -> bool {
        self.genes == other.genes
    }
}

impl Eq for Genome {}

impl Hash for Genome {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.genes.hash(state);
    }
}

impl Ord for Genome {
    fn cmp(&self, other: &Self) -> Ordering {
        self.genes.cmp(&other.genes)
    }
}

impl PartialOrd for Genome {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Genome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let genes: Vec<String> = self
            .genes
            .iter()
            .map(|(id, allele)| format!("{}: {}", id, allele))
            .collect();
        write!(
            f,
            "[{}](Age: {})[Engineered: {}]",
            genes.join(", "),
            self.age,
            if self.is_engineered { "yes" } else { "no" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_equality_ignores_age_and_origin() {
        let mut a = Genome::new(1);
        a.set_gene("x", Allele::Integer(4));
        let mut b = Genome::new(5);
        b.set_gene("x", Allele::Integer(4));
        b.set_engineered(true);

        assert_eq!(a, b);
        assert_eq!(a.content_hash(), b.content_hash());

        let set: HashSet<Genome> = vec![a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_equality_survives_json_round_trip() {
        let mut genome = Genome::new(2);
        genome.set_gene("alpha", Allele::Float(0.25));
        genome.set_gene("mode", Allele::Text("fast".into()));

        let json = serde_json::to_string(&genome).unwrap();
        let restored: Genome = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, genome);
        assert_eq!(restored.content_hash(), genome.content_hash());
        assert_eq!(restored.age(), 2);
    }
}
