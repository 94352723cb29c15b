//! Symmetric positive definite system in skyline storage

use nalgebra::{DMatrix, DVector};

use super::{check_ids, out_of_range, scatter, LinearSoe};
use crate::error::{AnalysisError, AnalysisResult};
use crate::graph::Graph;
use crate::math::SkylineMatrix;

#[derive(Debug, Clone)]
pub struct ProfileSpdLinSoe {
    matrix: SkylineMatrix,
    factor: Option<SkylineMatrix>,
    b: DVector<f64>,
    x: DVector<f64>,
}

impl Default for ProfileSpdLinSoe {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileSpdLinSoe {
    pub fn new() -> Self {
        Self {
            matrix: SkylineMatrix::default(),
            factor: None,
            b: DVector::zeros(0),
            x: DVector::zeros(0),
        }
    }

    /// Stored coefficients of the profile
    pub fn profile_size(&self) -> usize {
        self.matrix.profile_size()
    }
}

impl LinearSoe for ProfileSpdLinSoe {
    fn requires_spd(&self) -> bool {
        true
    }

    fn set_size(&mut self, graph: &Graph) -> AnalysisResult<()> {
        self.matrix = SkylineMatrix::from_graph(graph);
        self.factor = None;
        let n = graph.num_vertices();
        self.b = DVector::zeros(n);
        self.x = DVector::zeros(n);
        Ok(())
    }

    fn num_equations(&self) -> usize {
        self.matrix.size()
    }

    fn zero_a(&mut self) {
        self.matrix.zero();
        self.factor = None;
    }

    fn add_a(&mut self, m: &DMatrix<f64>, ids: &[isize], factor: f64) -> AnalysisResult<()> {
        check_ids(m.nrows(), ids)?;
        let n = self.matrix.size();
        for (r, c, v) in scatter(m, ids) {
            if r >= n || c >= n {
                return Err(out_of_range(r.max(c), n));
            }
            if !self.matrix.add(r, c, factor * v) {
                return Err(AnalysisError::InvalidInput(format!(
                    "entry ({}, {}) lies outside the allocated profile",
                    r, c
                )));
            }
        }
        self.factor = None;
        Ok(())
    }

    fn solve(&mut self) -> AnalysisResult<()> {
        if self.factor.is_none() {
            let mut l = self.matrix.clone();
            l.factorize().map_err(|e| AnalysisError::Solver(e.to_string()))?;
            self.factor = Some(l);
        }
        if let Some(l) = &self.factor {
            self.x = l.solve(&self.b);
        }
        Ok(())
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
