//! Element-wise domain partitioning

use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use crate::domain::Domain;
use crate::elements::Element;
use crate::error::{AnalysisError, AnalysisResult};
use crate::loads::LoadPattern;

/// Splits a domain into sub-domains of contiguous element ranges.
///
/// Nodes on a partition boundary are copied into every sub-domain that
/// touches them, together with their single-point constraints. Each nodal
/// load is kept by the lowest-numbered partition holding its node so that
/// summing the partitions' residuals counts it once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partitioner {
    num_partitions: usize,
}

impl Partitioner {
    pub fn new(num_partitions: usize) -> Self {
        Self {
            num_partitions: num_partitions.max(1),
        }
    }

    pub fn num_partitions(&self) -> usize {
        self.num_partitions
    }

    /// Consume `domain` and return at most `num_partitions` sub-domains,
    /// each at the committed time of the original
    pub fn partition(&self, domain: Domain) -> AnalysisResult<Vec<Domain>> {
        if domain.mp_constraints().next().is_some() {
            return Err(AnalysisError::Constraint(
                "multi-point constraints cannot span partitions".to_string(),
            ));
        }
        let time = domain.committed_time();
        let parts = domain.into_parts();
        let num_elements = parts.elements.len();
        if num_elements == 0 {
            return Err(AnalysisError::InvalidInput("cannot partition a domain without elements".to_string()));
        }
        let count = self.num_partitions.min(num_elements);

        let mut groups: Vec<Vec<Box<dyn Element>>> = (0..count).map(|_| Vec::new()).collect();
        let mut owner: BTreeMap<usize, usize> = BTreeMap::new();
        for (i, (_, element)) in parts.elements.into_iter().enumerate() {
            let p = i * count / num_elements;
            for &node in element.connected_nodes() {
                owner.entry(node).or_insert(p);
            }
            groups[p].push(element);
        }
        let owner_of = |node: usize| owner.get(&node).copied().unwrap_or(0);

        let mut domains = Vec::with_capacity(count);
        for (p, elements) in groups.into_iter().enumerate() {
            let mut node_tags: BTreeSet<usize> = elements
                .iter()
                .flat_map(|e| e.connected_nodes().iter().copied())
                .collect();
            if p == 0 {
                // free-standing nodes go with the first partition
                node_tags.extend(parts.nodes.keys().filter(|t| !owner.contains_key(t)));
            }

            let mut sub = Domain::new();
            for &tag in &node_tags {
                let node = parts.nodes.get(&tag).ok_or(AnalysisError::NodeNotFound(tag))?;
                sub.add_node(node.clone())?;
            }
            let num_local = elements.len();
            for element in elements {
                sub.add_element(element)?;
            }
            for sp in parts.sp_constraints.values().filter(|sp| node_tags.contains(&sp.node)) {
                sub.add_sp_constraint(sp.clone())?;
            }
            for pattern in parts.patterns.values() {
                let mut local = LoadPattern::new(pattern.tag, pattern.series.clone());
                for load in pattern.node_loads.iter().filter(|l| owner_of(l.node) == p) {
                    local.add_load(load.clone());
                }
                sub.add_load_pattern(local)?;
            }
            sub.apply_load(time);
            sub.commit();

            debug!("partition {}: {} elements, {} nodes", p, num_local, node_tags.len());
            domains.push(sub);
        }
        Ok(domains)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MpConstraint, Node};
    use crate::elements::{Spring, SpringLaw};
    use crate::loads::{NodeLoad, TimeSeries};

    /// Four springs in series between nodes 1..5, node 1 fixed, load at 3 and 5
    fn chain() -> Domain {
        let mut domain = Domain::new();
        for tag in 1..=5 {
            domain.add_node(Node::new(tag, 1, &[tag as f64])).unwrap();
        }
        for tag in 1..=4 {
            domain
                .add_element(Box::new(Spring::new(tag, tag, tag + 1, 0, SpringLaw::Linear { k: 1.0 })))
                .unwrap();
        }
        domain.fix(1, &[0], 1).unwrap();
        domain
            .add_load_pattern(
                LoadPattern::new(1, TimeSeries::linear())
                    .with_load(NodeLoad::new(3, &[1.0]))
                    .with_load(NodeLoad::new(5, &[2.0])),
            )
            .unwrap();
        domain
    }

    #[test]
    fn test_boundary_nodes_are_shared_and_loads_counted_once() {
        let parts = Partitioner::new(2).partition(chain()).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].num_elements(), 2);
        assert_eq!(parts[1].num_elements(), 2);
        // node 3 sits on the boundary
        assert!(parts[0].node(3).is_some());
        assert!(parts[1].node(3).is_some());
        assert_eq!(parts[0].sp_constraints().count(), 1);
        assert_eq!(parts[1].sp_constraints().count(), 0);

        let total: f64 = parts
            .iter()
            .flat_map(|d| d.nodal_loads_at(1.0).into_values())
            .map(|v| v.sum())
            .sum();
        assert_eq!(total, 3.0);
        assert!(parts[0].nodal_loads_at(1.0).contains_key(&3));
        assert!(!parts[1].nodal_loads_at(1.0).contains_key(&3));
    }

    #[test]
    fn test_more_partitions_than_elements() {
        let parts = Partitioner::new(10).partition(chain()).unwrap();
        assert_eq!(parts.len(), 4);
        assert!(parts.iter().all(|d| d.num_elements() == 1));
    }

    #[test]
    fn test_multi_point_constraints_are_rejected() {
        let mut domain = chain();
        domain
            .add_mp_constraint(MpConstraint::equal_dof(1, 2, 4, &[0]))
            .unwrap();
        assert!(matches!(
            Partitioner::new(2).partition(domain),
            Err(AnalysisError::Constraint(_))
        ));
    }
}
