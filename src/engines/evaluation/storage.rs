use crate::engines::generation::genome::Genome;
use crate::types::{Instance, RunResult};
use std::collections::HashMap;
use std::sync::RwLock;

/// Persistent store of finished run results, keyed by genome content and
/// instance.
///
/// Writes for the same key replace each other (last write wins). Reads never
/// change the store.
pub trait ResultStorage: Send + Sync {
    fn store(&self, genome: &Genome, instance: &Instance, result: RunResult);
    fn query(&self, genome: &Genome, instance: &Instance) -> Option<RunResult>;
    fn results_of(&self, genome: &Genome) -> HashMap<Instance, RunResult>;
    fn all_results(&self) -> HashMap<Genome, HashMap<Instance, RunResult>>;

    /// Total number of stored (genome, instance) results
    fn len(&self) -> usize {
        self.all_results().values().map(HashMap::len).sum()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
pub struct InMemoryResultStorage {
    results: RwLock<HashMap<Genome, HashMap<Instance, RunResult>>>,
}

impl InMemoryResultStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultStorage for InMemoryResultStorage {
    fn store(&self, genome: &Genome, instance: &Instance, result: RunResult) {
        // A poisoned lock still holds consistent data: every write is a single insert.
        let mut results = self.results.write().unwrap_or_else(|e| e.into_inner());
        results
            .entry(genome.clone())
            .or_default()
            .insert(instance.clone(), result);
    }

    fn query(&self, genome: &Genome, instance: &Instance) -> Option<RunResult> {
        let results = self.results.read().unwrap_or_else(|e| e.into_inner());
        results.get(genome).and_then(|r| r.get(instance)).cloned()
    }

    fn results_of(&self, genome: &Genome) -> HashMap<Instance, RunResult> {
        let results = self.results.read().unwrap_or_else(|e| e.into_inner());
        results.get(genome).cloned().unwrap_or_default()
    }

    fn all_results(&self) -> HashMap<Genome, HashMap<Instance, RunResult>> {
        self.results.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn len(&self) -> usize {
        let results = self.results.read().unwrap_or_else(|e| e.into_inner());
        results.values().map(HashMap::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::generation::domain::Allele;
    use std::time::Duration;

    #[test]
    fn test_last_write_wins() {
        let storage = InMemoryResultStorage::new();
        let mut genome = Genome::new(0);
        genome.set_gene("x", Allele::Bool(true));
        let instance = Instance::new("a.cnf");

        storage.store(&genome, &instance, RunResult::success(Duration::from_secs(3)));
        storage.store(&genome, &instance, RunResult::success(Duration::from_secs(1)));

        assert_eq!(
            storage.query(&genome, &instance),
            Some(RunResult::success(Duration::from_secs(1)))
        );
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn test_lookup_ignores_age() {
        let storage = InMemoryResultStorage::new();
        let mut young = Genome::new(0);
        young.set_gene("x", Allele::Integer(2));
        let mut old = young.clone();
        old.set_age(7);
        let instance = Instance::new("b.cnf");

        storage.store(&young, &instance, RunResult::timeout(Duration::from_secs(10)));
        assert!(storage.query(&old, &instance).is_some());
        assert!(storage.query(&old, &Instance::new("c.cnf")).is_none());
    }
}
