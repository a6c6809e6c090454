use super::domain::Domain;
use super::genome::Genome;
use super::parameter_tree::{ParameterNode, ParameterTree};
use crate::error::{Result, TunerError};
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;

/// Domain-specific validity predicate on complete genomes
pub trait GenomeValidator: Send + Sync {
    fn is_valid(&self, genome: &Genome) -> bool;
}

impl<F> GenomeValidator for F
where
    F: Fn(&Genome) -> bool + Send + Sync,
{
    fn is_valid(&self, genome: &Genome) -> bool {
        self(genome)
    }
}

/// Validator for configuration spaces without forbidden combinations
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllGenomes;

impl GenomeValidator for AcceptAllGenomes {
    fn is_valid(&self, _genome: &Genome) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
pub struct GenomeBuilderConfig {
    pub mutation_rate: f64,
    pub mutation_variance_percentage: f64,
    pub crossover_switch_probability: f64,
    pub max_repair_attempts: usize,
}

impl Default for GenomeBuilderConfig {
    fn default() -> Self {
        Self {
            mutation_rate: 0.1,
            mutation_variance_percentage: 0.1,
            crossover_switch_probability: 0.1,
            max_repair_attempts: 100,
        }
    }
}

/// Creates, mutates and recombines genomes over a parameter tree
pub struct GenomeBuilder {
    tree: Arc<ParameterTree>,
    config: GenomeBuilderConfig,
    validator: Arc<dyn GenomeValidator>,
}

impl GenomeBuilder {
    pub fn new(
        tree: Arc<ParameterTree>,
        config: GenomeBuilderConfig,
        validator: Arc<dyn GenomeValidator>,
    ) -> Self {
        Self {
            tree,
            config,
            validator,
        }
    }

    pub fn tree(&self) -> &Arc<ParameterTree> {
        &self.tree
    }

    pub fn config(&self) -> &GenomeBuilderConfig {
        &self.config
    }

    /// Every parameter is set to a value of its domain and the domain
    /// predicate accepts the genome.
    pub fn is_genome_valid(&self, genome: &Genome) -> bool {
        let complete = self.tree.parameters().all(|(id, domain)| {
            genome
                .gene(id)
                .map(|allele| domain.contains(allele))
                .unwrap_or(false)
        });
        complete && self.validator.is_valid(genome)
    }

    pub fn create_random_genome<R: Rng + ?Sized>(&self, age: usize, rng: &mut R) -> Result<Genome> {
        for _ in 0..self.config.max_repair_attempts.max(1) {
            let mut genome = Genome::new(age);
            for (id, domain) in self.tree.parameters() {
                genome.set_gene(id, domain.generate_random(rng));
            }
            if self.is_genome_valid(&genome) {
                return Ok(genome);
            }
        }
        Err(TunerError::RepairExhausted {
            attempts: self.config.max_repair_attempts,
            message: "could not sample a valid random genome".to_string(),
        })
    }

    /// Mutates every active gene with probability `mutation_rate`
    pub fn mutate<R: Rng + ?Sized>(&self, genome: &mut Genome, rng: &mut R) {
        for id in self.tree.active_identifiers(genome.genes()) {
            if rng.gen::<f64>() >= self.config.mutation_rate {
                continue;
            }
            if let Some(domain) = self.tree.domain(&id) {
                let mutated = match genome.gene(&id) {
                    Some(current) => {
                        domain.mutate(current, self.config.mutation_variance_percentage, rng)
                    }
                    None => domain.generate_random(rng),
                };
                genome.set_gene(id, mutated);
            }
        }
    }

    /// GGA crossover: walks the parameter tree and copies each gene from the
    /// parent currently followed, switching parents per node with
    /// `crossover_switch_probability`. The child is a newborn (age 0).
    pub fn crossover<R: Rng + ?Sized>(
        &self,
        competitive: &Genome,
        mate: &Genome,
        rng: &mut R,
    ) -> Genome {
        let mut child = Genome::new(0);
        let follow_competitive = rng.gen_bool(0.5);
        self.crossover_node(self.tree.root(), competitive, mate, follow_competitive, &mut child, rng);
        child
    }

    fn crossover_node<R: Rng + ?Sized>(
        &self,
        node: &ParameterNode,
        first: &Genome,
        second: &Genome,
        follow_first: bool,
        child: &mut Genome,
        rng: &mut R,
    ) {
        match node {
            ParameterNode::And { children } => {
                for node in children {
                    let follow = self.maybe_switch(follow_first, rng);
                    self.crossover_node(node, first, second, follow, child, rng);
                }
            }
            ParameterNode::Value { identifier, domain } => {
                self.inherit(identifier, domain, first, second, follow_first, child, rng);
            }
            ParameterNode::Or {
                identifier,
                domain,
                branches,
            } => {
                self.inherit(identifier, domain, first, second, follow_first, child, rng);
                for (_, node) in branches {
                    let follow = self.maybe_switch(follow_first, rng);
                    self.crossover_node(node, first, second, follow, child, rng);
                }
            }
        }
    }

    fn maybe_switch<R: Rng + ?Sized>(&self, follow_first: bool, rng: &mut R) -> bool {
        if rng.gen::<f64>() < self.config.crossover_switch_probability {
            !follow_first
        } else {
            follow_first
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn inherit<R: Rng + ?Sized>(
        &self,
        identifier: &str,
        domain: &Domain,
        first: &Genome,
        second: &Genome,
        follow_first: bool,
        child: &mut Genome,
        rng: &mut R,
    ) {
        let (preferred, fallback) = if follow_first {
            (first, second)
        } else {
            (second, first)
        };
        let allele = preferred
            .gene(identifier)
            .or_else(|| fallback.gene(identifier))
            .cloned()
            .unwrap_or_else(|| domain.generate_random(rng));
        child.set_gene(identifier, allele);
    }

    /// Changes as few active genes as possible until the genome is valid.
    ///
    /// The number of changed genes grows with the attempt count. Fails with
    /// [`TunerError::RepairExhausted`] after `max_repair_attempts`.
    pub fn make_genome_valid<R: Rng + ?Sized>(&self, genome: &mut Genome, rng: &mut R) -> Result<()> {
        if self.is_genome_valid(genome) {
            return Ok(());
        }

        // Fill genes that are missing or out of domain first.
        for (id, domain) in self.tree.parameters() {
            let in_domain = genome.gene(id).map(|a| domain.contains(a)).unwrap_or(false);
            if !in_domain {
                genome.set_gene(id, domain.generate_random(rng));
            }
        }
        if self.is_genome_valid(genome) {
            return Ok(());
        }

        for attempt in 0..self.config.max_repair_attempts {
            let mut candidate = genome.clone();
            let mut active = self.tree.active_identifiers(candidate.genes());
            active.shuffle(rng);
            let changes = (1 + attempt / 10).min(active.len());
            for id in active.into_iter().take(changes) {
                if let (Some(domain), Some(current)) = (self.tree.domain(&id), candidate.gene(&id)) {
                    let mutated = domain.mutate(current, self.config.mutation_variance_percentage, rng);
                    candidate.set_gene(id, mutated);
                }
            }
            if self.is_genome_valid(&candidate) {
                *genome = candidate;
                return Ok(());
            }
        }

        Err(TunerError::RepairExhausted {
            attempts: self.config.max_repair_attempts,
            message: format!("genome {} could not be repaired", genome),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::generation::domain::Allele;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn builder_with(validator: Arc<dyn GenomeValidator>) -> GenomeBuilder {
        let tree = ParameterTree::new(ParameterNode::and(vec![
            ParameterNode::value("a", Domain::integer(0, 20).unwrap()),
            ParameterNode::value("b", Domain::integer(0, 20).unwrap()),
            ParameterNode::value("c", Domain::continuous(-1.0, 1.0).unwrap()),
        ]))
        .unwrap();
        GenomeBuilder::new(Arc::new(tree), GenomeBuilderConfig::default(), validator)
    }

    #[test]
    fn test_random_genome_is_valid() {
        let builder = builder_with(Arc::new(AcceptAllGenomes));
        let mut rng = StdRng::seed_from_u64(3);
        let genome = builder.create_random_genome(2, &mut rng).unwrap();
        assert!(builder.is_genome_valid(&genome));
        assert_eq!(genome.age(), 2);
    }

    #[test]
    fn test_crossover_without_switching_copies_one_parent() {
        let tree = builder_with(Arc::new(AcceptAllGenomes)).tree().clone();
        let config = GenomeBuilderConfig {
            crossover_switch_probability: 0.0,
            ..GenomeBuilderConfig::default()
        };
        let builder = GenomeBuilder::new(tree, config, Arc::new(AcceptAllGenomes));
        let mut rng = StdRng::seed_from_u64(11);
        let first = builder.create_random_genome(3, &mut rng).unwrap();
        let second = builder.create_random_genome(1, &mut rng).unwrap();

        let child = builder.crossover(&first, &second, &mut rng);
        assert!(child == first || child == second);
        assert_eq!(child.age(), 0);
    }

    #[test]
    fn test_make_genome_valid_repairs_forbidden_combination() {
        let validator = |g: &Genome| match (g.gene("a"), g.gene("b")) {
            (Some(Allele::Integer(a)), Some(Allele::Integer(b))) => a + b <= 20,
            _ => false,
        };
        let builder = builder_with(Arc::new(validator));
        let mut genome = Genome::new(0);
        genome.set_gene("a", Allele::Integer(12));
        genome.set_gene("b", Allele::Integer(12));
        genome.set_gene("c", Allele::Float(0.0));

        let mut rng = StdRng::seed_from_u64(5);
        builder.make_genome_valid(&mut genome, &mut rng).unwrap();
        assert!(builder.is_genome_valid(&genome));
    }

    #[test]
    fn test_make_genome_valid_gives_up() {
        let builder = builder_with(Arc::new(|_: &Genome| false));
        let mut genome = Genome::new(0);
        let mut rng = StdRng::seed_from_u64(5);
        let result = builder.make_genome_valid(&mut genome, &mut rng);
        assert!(matches!(result, Err(TunerError::RepairExhausted { .. })));
    }
}
