//! AND/OR parameter tree describing the configuration space of the target
//! algorithm.
//!
//! AND-node children are independent of each other. An OR-node is itself a
//! categorical parameter; only the branch keyed by its current value is
//! active, all other branches are ignored for that genome.

use super::domain::{Allele, Domain};
use crate::error::{Result, TunerError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterNode {
    And {
        children: Vec<ParameterNode>,
    },
    Value {
        identifier: String,
        domain: Domain,
    },
    Or {
        identifier: String,
        domain: Domain,
        branches: Vec<(Allele, ParameterNode)>,
    },
}

impl ParameterNode {
    pub fn and(children: Vec<ParameterNode>) -> Self {
        ParameterNode::And { children }
    }

    pub fn value(identifier: impl Into<String>, domain: Domain) -> Self {
        ParameterNode::Value {
            identifier: identifier.into(),
            domain,
        }
    }

    pub fn or(
        identifier: impl Into<String>,
        domain: Domain,
        branches: Vec<(Allele, ParameterNode)>,
    ) -> Self {
        ParameterNode::Or {
            identifier: identifier.into(),
            domain,
            branches,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterTree {
    root: ParameterNode,
    identifiers: Vec<String>,
    domains: HashMap<String, Domain>,
}

impl ParameterTree {
    pub fn new(root: ParameterNode) -> Result<Self> {
        let mut identifiers = Vec::new();
        let mut domains = HashMap::new();
        let mut seen = HashSet::new();
        collect_parameters(&root, &mut identifiers, &mut domains, &mut seen)?;

        if identifiers.is_empty() {
            return Err(TunerError::InvalidArgument(
                "Parameter tree does not contain any parameter".to_string(),
            ));
        }

        Ok(Self {
            root,
            identifiers,
            domains,
        })
    }

    pub fn root(&self) -> &ParameterNode {
        &self.root
    }

    /// All parameter identifiers in depth-first traversal order
    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }

    pub fn domain(&self, identifier: &str) -> Option<&Domain> {
        self.domains.get(identifier)
    }

    /// Parameters in traversal order together with their domains
    pub fn parameters(&self) -> impl Iterator<Item = (&str, &Domain)> {
        self.identifiers
            .iter()
            .filter_map(move |id| self.domains.get(id).map(|d| (id.as_str(), d)))
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    /// Identifiers reachable from the root when following only the OR
    /// branches selected by `genes`.
    pub fn active_identifiers(&self, genes: &BTreeMap<String, Allele>) -> Vec<String> {
        let mut active = Vec::new();
        collect_active(&self.root, genes, &mut active);
        active
    }
}

fn collect_parameters(
    node: &ParameterNode,
    identifiers: &mut Vec<String>,
    domains: &mut HashMap<String, Domain>,
    seen: &mut HashSet<String>,
) -> Result<()> {
    match node {
        ParameterNode::And { children } => {
            for child in children {
                collect_parameters(child, identifiers, domains, seen)?;
            }
        }
        ParameterNode::Value { identifier, domain } => {
            register(identifier, domain, identifiers, domains, seen)?;
        }
        ParameterNode::Or {
            identifier,
            domain,
            branches,
        } => {
            if !domain.is_categorical() {
                return Err(TunerError::InvalidArgument(format!(
                    "OR node {} must have a categorical domain",
                    identifier
                )));
            }
            register(identifier, domain, identifiers, domains, seen)?;
            for (key, child) in branches {
                if !domain.contains(key) {
                    return Err(TunerError::InvalidArgument(format!(
                        "Branch {} of OR node {} is not part of its domain",
                        key, identifier
                    )));
                }
                collect_parameters(child, identifiers, domains, seen)?;
            }
        }
    }
    Ok(())
}

fn register(
    identifier: &str,
    domain: &Domain,
    identifiers: &mut Vec<String>,
    domains: &mut HashMap<String, Domain>,
    seen: &mut HashSet<String>,
) -> Result<()> {
    if !seen.insert(identifier.to_string()) {
        return Err(TunerError::InvalidArgument(format!(
            "Parameter identifier {} is used more than once",
            identifier
        )));
    }
    identifiers.push(identifier.to_string());
    domains.insert(identifier.to_string(), domain.clone());
    Ok(())
}

fn collect_active(node: &ParameterNode, genes: &BTreeMap<String, Allele>, active: &mut Vec<String>) {
    match node {
        ParameterNode::And { children } => {
            for child in children {
                collect_active(child, genes, active);
            }
        }
        ParameterNode::Value { identifier, .. } => active.push(identifier.clone()),
        ParameterNode::Or {
            identifier,
            branches,
            ..
        } => {
            active.push(identifier.clone());
            if let Some(choice) = genes.get(identifier) {
                for (key, child) in branches {
                    if key == choice {
                        collect_active(child, genes, active);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solver_tree() -> ParameterTree {
        ParameterTree::new(ParameterNode::and(vec![
            ParameterNode::value("seed_strategy", Domain::integer(0, 3).unwrap()),
            ParameterNode::or(
                "heuristic",
                Domain::categorical(vec![Allele::Text("greedy".into()), Allele::Text("tabu".into())])
                    .unwrap(),
                vec![
                    (
                        Allele::Text("tabu".into()),
                        ParameterNode::value("tenure", Domain::integer(1, 50).unwrap()),
                    ),
                    (
                        Allele::Text("greedy".into()),
                        ParameterNode::value("alpha", Domain::continuous(0.0, 1.0).unwrap()),
                    ),
                ],
            ),
        ]))
        .unwrap()
    }

    #[test]
    fn test_identifiers_in_traversal_order() {
        let tree = solver_tree();
        assert_eq!(tree.identifiers(), &["seed_strategy", "heuristic", "tenure", "alpha"]);
    }

    #[test]
    fn test_active_identifiers_follow_or_choice() {
        let tree = solver_tree();
        let mut genes = BTreeMap::new();
        genes.insert("heuristic".to_string(), Allele::Text("tabu".into()));
        assert_eq!(
            tree.active_identifiers(&genes),
            vec!["seed_strategy", "heuristic", "tenure"]
        );
    }

    #[test]
    fn test_duplicate_identifiers_are_rejected() {
        let result = ParameterTree::new(ParameterNode::and(vec![
            ParameterNode::value("x", Domain::integer(0, 3).unwrap()),
            ParameterNode::value("x", Domain::integer(0, 3).unwrap()),
        ]));
        assert!(matches!(result, Err(TunerError::InvalidArgument(_))));
    }

    #[test]
    fn test_or_node_requires_categorical_domain() {
        let result = ParameterTree::new(ParameterNode::or(
            "x",
            Domain::integer(0, 3).unwrap(),
            Vec::new(),
        ));
        assert!(result.is_err());
    }
}
