//! DOF numbering

use log::debug;
use serde::{Deserialize, Serialize};

use super::model::AnalysisModel;
use crate::error::AnalysisResult;
use crate::graph::Graph;
use crate::math::reverse_cuthill_mckee;

/// Equation numbering strategy over the DOF-group graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DofNumberer {
    /// Number groups in the order the handler created them
    Plain,
    /// Reverse Cuthill-McKee ordering to reduce bandwidth
    #[default]
    ReverseCuthillMckee,
}

impl DofNumberer {
    /// Vertex visiting order for a graph
    pub fn order(&self, graph: &Graph) -> Vec<usize> {
        match self {
            DofNumberer::Plain => (0..graph.num_vertices()).collect(),
            DofNumberer::ReverseCuthillMckee => reverse_cuthill_mckee(graph),
        }
    }

    /// Assign equation numbers to every free dof and return the equation count
    pub fn number(&self, model: &mut AnalysisModel) -> AnalysisResult<usize> {
        let graph = model.dof_group_graph();
        let order = self.order(&graph);
        let mut eq = 0usize;
        for group in order {
            for dof in 0..model.dof_groups()[group].num_dof() {
                if model.dof_groups()[group].ids()[dof] == super::model::TO_NUMBER {
                    model.number_dof(group, dof, eq);
                    eq += 1;
                }
            }
        }
        let n = model.finalize_equations()?;
        debug!(
            "{:?} numbered {} equations, group bandwidth {}",
            self,
            n,
            graph.bandwidth()
        );
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ConstraintHandler;
    use crate::domain::{Domain, Node};
    use crate::elements::{Spring, SpringLaw};

    /// Chain of springs added with scrambled node tags
    fn chain() -> AnalysisModel {
        let mut d = Domain::new();
        let tags = [1, 5, 2, 4, 3];
        for &t in &tags {
            d.add_node(Node::new(t, 1, &[t as f64])).unwrap();
        }
        for (i, pair) in tags.windows(2).enumerate() {
            d.add_element(Box::new(Spring::new(i + 1, pair[0], pair[1], 0, SpringLaw::Linear { k: 1.0 })))
                .unwrap();
        }
        AnalysisModel::new(d)
    }

    #[test]
    fn test_numbering_is_contiguous() {
        for numberer in [DofNumberer::Plain, DofNumberer::ReverseCuthillMckee] {
            let mut model = chain();
            ConstraintHandler::Plain.handle(&mut model).unwrap();
            assert_eq!(numberer.number(&mut model).unwrap(), 5);
            let mut ids: Vec<isize> = model.dof_groups().iter().map(|g| g.ids()[0]).collect();
            ids.sort_unstable();
            assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        }
    }

    #[test]
    fn test_rcm_reduces_bandwidth() {
        let mut model = chain();
        ConstraintHandler::Plain.handle(&mut model).unwrap();
        DofNumberer::ReverseCuthillMckee.number(&mut model).unwrap();
        assert_eq!(model.equation_graph().bandwidth(), 1);

        let mut plain = chain();
        ConstraintHandler::Plain.handle(&mut plain).unwrap();
        DofNumberer::Plain.number(&mut plain).unwrap();
        assert!(plain.equation_graph().bandwidth() > 1);
    }

    #[test]
    fn test_order_is_deterministic() {
        let mut g = Graph::new(4);
        g.add_edge(0, 1);
        g.add_edge(2, 3);
        let a = DofNumberer::ReverseCuthillMckee.order(&g);
        let b = DofNumberer::ReverseCuthillMckee.order(&g);
        assert_eq!(a, b);
        assert_eq!(a.len(), 4);
    }
}
