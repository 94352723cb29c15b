//! Collecting system used by distributed workers
//!
//! Nothing is factored here: matrix contributions are recorded with their
//! global equation ids and shipped to the coordinator, which replays them
//! into its own system. The right-hand side is accumulated densely.

use nalgebra::{DMatrix, DVector};

use super::{check_ids, LinearSoe};
use crate::error::{AnalysisError, AnalysisResult};
use crate::graph::Graph;

/// One recorded `add_a` call
#[derive(Debug, Clone)]
pub struct Contribution {
    pub matrix: DMatrix<f64>,
    pub ids: Vec<isize>,
    pub factor: f64,
}

#[derive(Debug, Clone)]
pub struct ContributionSoe {
    matrices: Vec<Contribution>,
    b: DVector<f64>,
    x: DVector<f64>,
}

impl Default for ContributionSoe {
    fn default() -> Self {
        Self::new()
    }
}

impl ContributionSoe {
    pub fn new() -> Self {
        Self {
            matrices: Vec::new(),
            b: DVector::zeros(0),
            x: DVector::zeros(0),
        }
    }

    /// Size without a graph; workers only know the global equation count
    pub fn resize(&mut self, n: usize) {
        self.matrices.clear();
        self.b = DVector::zeros(n);
        self.x = DVector::zeros(n);
    }

    /// Hand over the recorded matrix contributions
    pub fn take_matrices(&mut self) -> Vec<Contribution> {
        std::mem::take(&mut self.matrices)
    }

    /// Replay the recorded contributions into another system
    pub fn replay_into(contributions: &[Contribution], soe: &mut dyn LinearSoe) -> AnalysisResult<()> {
        for c in contributions {
            soe.add_a(&c.matrix, &c.ids, c.factor)?;
        }
        Ok(())
    }
}

impl LinearSoe for ContributionSoe {
    fn set_size(&mut self, graph: &Graph) -> AnalysisResult<()> {
        self.resize(graph.num_vertices());
        Ok(())
    }

    fn num_equations(&self) -> usize {
        self.b.len()
    }

    fn zero_a(&mut self) {
        self.matrices.clear();
    }

    fn add_a(&mut self, m: &DMatrix<f64>, ids: &[isize], factor: f64) -> AnalysisResult<()> {
        check_ids(m.nrows(), ids)?;
        if ids.iter().any(|&id| id >= 0) {
            self.matrices.push(Contribution {
                matrix: m.clone(),
                ids: ids.to_vec(),
                factor,
            });
        }
        Ok(())
    }

    fn solve(&mut self) -> AnalysisResult<()> {
        Err(AnalysisError::Configuration(
            "a contribution system only collects terms; solve on the coordinator".to_string(),
        ))
    }

    fn x(&self) -> &DVector<f64> {
        &self.x
    }

    fn b(&self) -> &DVector<f64> {
        &self.b
    }

    fn x_mut(&mut self) -> &mut DVector<f64> {
        &mut self.x
    }

    fn b_mut(&mut self) -> &mut DVector<f64> {
        &mut self.b
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soe::FullGenLinSoe;
    use approx::assert_relative_eq;

    #[test]
    fn test_replay_matches_direct_assembly() {
        let mut collector = ContributionSoe::new();
        collector.resize(2);
        let k = DMatrix::from_row_slice(2, 2, &[1.0, -1.0, -1.0, 1.0]);
        collector.add_a(&k, &[0, 1], 2.0).unwrap();
        collector.add_a(&DMatrix::from_element(1, 1, 3.0), &[-1], 1.0).unwrap();
        collector.add_a(&DMatrix::from_element(1, 1, 1.0), &[0], 1.0).unwrap();
        assert!(collector.solve().is_err());

        let parts = collector.take_matrices();
        assert_eq!(parts.len(), 2);

        let mut full = FullGenLinSoe::new();
        full.set_size(&Graph::new(2)).unwrap();
        ContributionSoe::replay_into(&parts, &mut full).unwrap();
        assert_relative_eq!(full.a()[(0, 0)], 3.0);
        assert_relative_eq!(full.a()[(1, 0)], -2.0);
    }
}
