//! Mapping between genomes and real-valued search points.
//!
//! Every encoded parameter becomes one coordinate. A coordinate inside
//! `[lower_i, upper_i]` is mapped affinely onto the parameter's unit
//! interval (log-scaled domains in log space) and from there into the native
//! domain. Parameters with too few values to profit from a continuous search
//! are not encoded; a decoded point takes them from an underlying genome,
//! the space's base genome unless the caller names another one.

use crate::engines::generation::genome::Genome;
use crate::engines::generation::genome_builder::GenomeBuilder;
use crate::engines::generation::parameter_tree::ParameterTree;
use crate::engines::generation::repair::RepairOperator;
use crate::error::{Result, TunerError};
use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which parameters are encoded as coordinates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenomeEncoding {
    identifiers: Vec<String>,
}

impl GenomeEncoding {
    /// Encodes continuous parameters and every parameter with at least
    /// `minimum_domain_size` values.
    pub fn new(tree: &ParameterTree, minimum_domain_size: usize) -> Self {
        let identifiers = tree
            .parameters()
            .filter(|(_, domain)| {
                domain
                    .size()
                    .map(|size| size >= minimum_domain_size)
                    .unwrap_or(true)
            })
            .map(|(id, _)| id.to_string())
            .collect();
        Self { identifiers }
    }

    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }

    pub fn dimension(&self) -> usize {
        self.identifiers.len()
    }
}

pub struct SearchSpace {
    tree: Arc<ParameterTree>,
    builder: Arc<GenomeBuilder>,
    repair: Arc<dyn RepairOperator>,
    encoding: GenomeEncoding,
    lower_bounds: Vec<f64>,
    upper_bounds: Vec<f64>,
    base_genome: Genome,
}

impl SearchSpace {
    pub fn new(
        tree: Arc<ParameterTree>,
        builder: Arc<GenomeBuilder>,
        repair: Arc<dyn RepairOperator>,
        lower_bounds: Vec<f64>,
        upper_bounds: Vec<f64>,
        minimum_domain_size: usize,
        base_genome: Genome,
    ) -> Result<Self> {
        let encoding = GenomeEncoding::new(&tree, minimum_domain_size);
        let dimension = encoding.dimension();
        if dimension == 0 {
            return Err(TunerError::InvalidArgument(format!(
                "No parameter has a domain of at least {} values",
                minimum_domain_size
            )));
        }
        if lower_bounds.len() != dimension || upper_bounds.len() != dimension {
            return Err(TunerError::Boundary(format!(
                "Expected {} lower and upper bounds, got {} and {}",
                dimension,
                lower_bounds.len(),
                upper_bounds.len()
            )));
        }
        for (i, (lower, upper)) in lower_bounds.iter().zip(&upper_bounds).enumerate() {
            if !(lower.is_finite() && upper.is_finite()) || lower > upper {
                return Err(TunerError::Boundary(format!(
                    "Invalid bounds [{}, {}] for coordinate {} ({})",
                    lower,
                    upper,
                    i,
                    encoding.identifiers()[i]
                )));
            }
        }

        Ok(Self {
            tree,
            builder,
            repair,
            encoding,
            lower_bounds,
            upper_bounds,
            base_genome,
        })
    }

    /// Same bounds on every coordinate
    pub fn with_uniform_bounds(
        tree: Arc<ParameterTree>,
        builder: Arc<GenomeBuilder>,
        repair: Arc<dyn RepairOperator>,
        lower: f64,
        upper: f64,
        minimum_domain_size: usize,
        base_genome: Genome,
    ) -> Result<Self> {
        let dimension = GenomeEncoding::new(&tree, minimum_domain_size).dimension();
        Self::new(
            tree,
            builder,
            repair,
            vec![lower; dimension],
            vec![upper; dimension],
            minimum_domain_size,
            base_genome,
        )
    }

    pub fn dimension(&self) -> usize {
        self.encoding.dimension()
    }

    pub fn encoding(&self) -> &GenomeEncoding {
        &self.encoding
    }

    pub fn lower_bounds(&self) -> &[f64] {
        &self.lower_bounds
    }

    pub fn upper_bounds(&self) -> &[f64] {
        &self.upper_bounds
    }

    pub fn builder(&self) -> &Arc<GenomeBuilder> {
        &self.builder
    }

    pub fn base_genome(&self) -> &Genome {
        &self.base_genome
    }

    /// Encodes a valid genome. Deterministic.
    pub fn create_from_genome(&self, genome: &Genome) -> Result<SearchPoint> {
        let mut values = Vec::with_capacity(self.dimension());
        for (i, id) in self.encoding.identifiers().iter().enumerate() {
            let domain = self.tree.domain(id).ok_or_else(|| {
                TunerError::Precondition(format!("unknown parameter {}", id))
            })?;
            let allele = genome.gene(id).ok_or_else(|| {
                TunerError::Precondition(format!("genome {} misses gene {}", genome, id))
            })?;
            let t = domain.to_unit(allele)?;
            let (lower, upper) = (self.lower_bounds[i], self.upper_bounds[i]);
            values.push(lower + t * (upper - lower));
        }
        Ok(SearchPoint {
            values,
            genome: genome.clone(),
            repaired: false,
        })
    }

    /// Decodes a coordinate vector onto the base genome, repairing the
    /// result if it is invalid.
    pub fn decode(&self, values: &[f64]) -> Result<SearchPoint> {
        self.decode_onto(values, &self.base_genome)
    }

    /// Decodes a coordinate vector. Parameters that are not encoded keep
    /// the values of `underlying`.
    pub fn decode_onto(&self, values: &[f64], underlying: &Genome) -> Result<SearchPoint> {
        if values.len() != self.dimension() {
            return Err(TunerError::Precondition(format!(
                "search point has {} coordinates, the space has {}",
                values.len(),
                self.dimension()
            )));
        }

        let mut genome = underlying.clone();
        genome.set_age(0);
        genome.set_engineered(false);
        for (i, id) in self.encoding.identifiers().iter().enumerate() {
            let Some(domain) = self.tree.domain(id) else {
                continue;
            };
            let (lower, upper) = (self.lower_bounds[i], self.upper_bounds[i]);
            let t = if upper > lower {
                (values[i] - lower) / (upper - lower)
            } else {
                0.0
            };
            genome.set_gene(id.clone(), domain.from_unit(t));
        }

        let repaired = !self.builder.is_genome_valid(&genome);
        if repaired {
            debug!("Repairing decoded genome {}", genome);
            genome = self.repair.repair(genome, &self.builder)?;
        }

        Ok(SearchPoint {
            values: values.to_vec(),
            genome,
            repaired,
        })
    }

    /// Decodes many points in parallel, keeping their order
    pub fn decode_all(&self, points: &[Vec<f64>]) -> Result<Vec<SearchPoint>> {
        points.par_iter().map(|values| self.decode(values)).collect()
    }

    /// Like `decode_all`, with one underlying genome per point
    pub fn decode_all_onto(&self, points: &[Vec<f64>], underlying: &[&Genome]) -> Result<Vec<SearchPoint>> {
        if points.len() != underlying.len() {
            return Err(TunerError::Precondition(format!(
                "{} points but {} underlying genomes",
                points.len(),
                underlying.len()
            )));
        }
        points
            .par_iter()
            .zip(underlying.par_iter())
            .map(|(values, genome)| self.decode_onto(values, genome))
            .collect()
    }
}

/// A coordinate vector together with the genome it decodes to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPoint {
    values: Vec<f64>,
    genome: Genome,
    repaired: bool,
}

impl SearchPoint {
    pub fn new(values: Vec<f64>, space: &SearchSpace) -> Result<Self> {
        space.decode(&values)
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn genome(&self) -> &Genome {
        &self.genome
    }

    pub fn into_genome(self) -> Genome {
        self.genome
    }

    /// The decoded genome was invalid and had to be repaired
    pub fn is_repaired(&self) -> bool {
        self.repaired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::generation::domain::{Allele, Domain};
    use crate::engines::generation::genome_builder::{AcceptAllGenomes, GenomeBuilderConfig};
    use crate::engines::generation::parameter_tree::ParameterNode;
    use crate::engines::generation::repair::MutationRepair;

    fn tree() -> Arc<ParameterTree> {
        Arc::new(
            ParameterTree::new(ParameterNode::and(vec![
                ParameterNode::value("alpha", Domain::continuous(0.0, 2.0).unwrap()),
                ParameterNode::value("depth", Domain::integer(1, 50).unwrap()),
                ParameterNode::value("restart", Domain::categorical(vec![Allele::Bool(false), Allele::Bool(true)]).unwrap()),
            ]))
            .unwrap(),
        )
    }

    fn space(lower: Vec<f64>, upper: Vec<f64>) -> Result<SearchSpace> {
        let tree = tree();
        let builder = Arc::new(GenomeBuilder::new(
            Arc::clone(&tree),
            GenomeBuilderConfig::default(),
            Arc::new(AcceptAllGenomes),
        ));
        let mut base = Genome::new(0);
        base.set_gene("alpha", Allele::Float(1.0));
        base.set_gene("depth", Allele::Integer(10));
        base.set_gene("restart", Allele::Bool(true));
        SearchSpace::new(tree, builder, Arc::new(MutationRepair::default()), lower, upper, 3, base)
    }

    #[test]
    fn test_small_domains_are_not_encoded() {
        let encoding = GenomeEncoding::new(&tree(), 3);
        assert_eq!(encoding.identifiers(), &["alpha".to_string(), "depth".to_string()]);
    }

    #[test]
    fn test_bound_mismatch_is_a_boundary_error() {
        assert!(matches!(space(vec![0.0], vec![10.0]), Err(TunerError::Boundary(_))));
        assert!(matches!(
            space(vec![0.0, 5.0], vec![10.0, 1.0]),
            Err(TunerError::Boundary(_))
        ));
    }

    #[test]
    fn test_decode_caps_coordinates_and_keeps_fixed_genes() {
        let space = space(vec![0.0, 0.0], vec![10.0, 10.0]).unwrap();
        let point = space.decode(&[15.0, -3.0]).unwrap();
        assert_eq!(point.genome().gene("alpha"), Some(&Allele::Float(2.0)));
        assert_eq!(point.genome().gene("depth"), Some(&Allele::Integer(1)));
        assert_eq!(point.genome().gene("restart"), Some(&Allele::Bool(true)));
        assert!(!point.is_repaired());
    }

    #[test]
    fn test_decode_onto_keeps_the_underlying_fixed_genes() {
        let space = space(vec![0.0, 0.0], vec![10.0, 10.0]).unwrap();
        let mut genome = space.base_genome().clone();
        genome.set_gene("alpha", Allele::Float(0.5));
        genome.set_gene("restart", Allele::Bool(false));

        let point = space.create_from_genome(&genome).unwrap();
        let decoded = space.decode_onto(point.values(), point.genome()).unwrap();
        assert_eq!(decoded.genome(), &genome);
        assert_eq!(
            space.decode(point.values()).unwrap().genome().gene("restart"),
            Some(&Allele::Bool(true))
        );
    }

    #[test]
    fn test_wrong_dimension_is_a_precondition_error() {
        let space = space(vec![0.0, 0.0], vec![10.0, 10.0]).unwrap();
        assert!(matches!(space.decode(&[1.0]), Err(TunerError::Precondition(_))));
    }
}
