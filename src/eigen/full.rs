//! Dense generalized eigen solver

use nalgebra::{DMatrix, DVector};

use super::{solve_generalized, EigenSoe};
use crate::error::{AnalysisError, AnalysisResult};
use crate::graph::Graph;
use crate::soe::{FullGenLinSoe, LinearSoe};

#[derive(Debug, Clone, Default)]
pub struct FullGenEigenSoe {
    a: FullGenLinSoe,
    m: FullGenLinSoe,
    values: Vec<f64>,
    vectors: Vec<DVector<f64>>,
}

impl FullGenEigenSoe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn a(&self) -> &DMatrix<f64> {
        self.a.a()
    }

    pub fn m(&self) -> &DMatrix<f64> {
        self.m.a()
    }
}

impl EigenSoe for FullGenEigenSoe {
    fn set_size(&mut self, graph: &Graph) -> AnalysisResult<()> {
        self.a.set_size(graph)?;
        self.m.set_size(graph)?;
        self.values.clear();
        self.vectors.clear();
        Ok(())
    }

    fn num_equations(&self) -> usize {
        self.a.num_equations()
    }

    fn zero_a(&mut self) {
        self.a.zero_a();
    }

    fn zero_m(&mut self) {
        self.m.zero_a();
    }

    fn add_a(&mut self, m: &DMatrix<f64>, ids: &[isize], factor: f64) -> AnalysisResult<()> {
        self.a.add_a(m, ids, factor)
    }

    fn add_m(&mut self, m: &DMatrix<f64>, ids: &[isize], factor: f64) -> AnalysisResult<()> {
        self.m.add_a(m, ids, factor)
    }

    fn solve(&mut self, num_modes: usize) -> AnalysisResult<()> {
        let pairs = solve_generalized(self.a.a(), self.m.a())?;
        let wanted = if num_modes == 0 { pairs.len() } else { num_modes };
        if wanted > pairs.len() {
            return Err(AnalysisError::EigenSolver(format!(
                "{} modes requested but only {} finite eigenpairs exist",
                wanted,
                pairs.len()
            )));
        }
        let (values, vectors) = pairs.into_iter().take(wanted).unzip();
        self.values = values;
        self.vectors = vectors;
        Ok(())
    }

    fn eigenvalues(&self) -> &[f64] {
        &self.values
    }

    fn eigenvector(&self, mode: usize) -> Option<&DVector<f64>> {
        self.vectors.get(mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_two_dof_chain() {
        let mut g = Graph::new(2);
        g.add_edge(0, 1);
        let mut soe = FullGenEigenSoe::new();
        soe.set_size(&g).unwrap();
        soe.add_a(&DMatrix::from_row_slice(2, 2, &[2.0, -1.0, -1.0, 2.0]), &[0, 1], 1.0)
            .unwrap();
        soe.add_m(&DMatrix::identity(2, 2), &[0, 1], 1.0).unwrap();
        soe.solve(0).unwrap();
        assert_relative_eq!(soe.eigenvalues()[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(soe.eigenvalues()[1], 3.0, epsilon = 1e-12);
        let phi = soe.eigenvector(0).unwrap();
        assert_relative_eq!(phi.norm(), 1.0, epsilon = 1e-12);
        assert!(soe.solve(3).is_err());
    }
}
