use super::genome::Genome;
use super::genome_builder::GenomeBuilder;
use crate::error::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Turns an invalid genome into a valid one.
///
/// Implementations must be deterministic: repairing the same genome twice
/// yields the same result.
pub trait RepairOperator: Send + Sync {
    fn repair(&self, genome: Genome, builder: &GenomeBuilder) -> Result<Genome>;
}

/// Repairs via [`GenomeBuilder::make_genome_valid`] with a random stream
/// seeded from the genome's content, so the outcome only depends on the genes.
#[derive(Debug, Clone, Copy, Default)]
pub struct MutationRepair {
    pub seed: u64,
}

impl RepairOperator for MutationRepair {
    fn repair(&self, mut genome: Genome, builder: &GenomeBuilder) -> Result<Genome> {
        let mut rng = StdRng::seed_from_u64(genome.content_hash() ^ self.seed);
        builder.make_genome_valid(&mut genome, &mut rng)?;
        Ok(genome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::generation::domain::{Allele, Domain};
    use crate::engines::generation::genome_builder::GenomeBuilderConfig;
    use crate::engines::generation::parameter_tree::{ParameterNode, ParameterTree};
    use std::sync::Arc;

    #[test]
    fn test_repair_is_deterministic() {
        let tree = ParameterTree::new(ParameterNode::and(vec![
            ParameterNode::value("x", Domain::integer(0, 100).unwrap()),
            ParameterNode::value("y", Domain::integer(0, 100).unwrap()),
        ]))
        .unwrap();
        let validator = |g: &Genome| g.gene("x") != g.gene("y");
        let builder = GenomeBuilder::new(
            Arc::new(tree),
            GenomeBuilderConfig::default(),
            Arc::new(validator),
        );

        let mut broken = Genome::new(0);
        broken.set_gene("x", Allele::Integer(42));
        broken.set_gene("y", Allele::Integer(42));

        let repair = MutationRepair::default();
        let first = repair.repair(broken.clone(), &builder).unwrap();
        let second = repair.repair(broken, &builder).unwrap();
        assert_eq!(first, second);
        assert!(builder.is_genome_valid(&first));
    }
}
