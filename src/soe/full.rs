//! Dense general system solved by LU decomposition

use nalgebra::linalg::LU;
use nalgebra::{DMatrix, DVector, Dyn};

use super::{check_ids, out_of_range, scatter, LinearSoe};
use crate::error::{AnalysisError, AnalysisResult};
use crate::graph::Graph;

/// Dense storage with partial-pivoting LU; handles indefinite systems
#[derive(Debug, Clone)]
pub struct FullGenLinSoe {
    a: DMatrix<f64>,
    b: DVector<f64>,
    x: DVector<f64>,
    lu: Option<LU<f64, Dyn, Dyn>>,
}

impl Default for FullGenLinSoe {
    fn default() -> Self {
        Self::new()
    }
}

impl FullGenLinSoe {
    pub fn new() -> Self {
        Self {
            a: DMatrix::zeros(0, 0),
            b: DVector::zeros(0),
            x: DVector::zeros(0),
            lu: None,
        }
    }

    /// Assembled matrix
    pub fn a(&self) -> &DMatrix<f64> {
        &self.a
    }
}

impl LinearSoe for FullGenLinSoe {
    fn set_size(&mut self, graph: &Graph) -> AnalysisResult<()> {
        let n = graph.num_vertices();
        self.a = DMatrix::zeros(n, n);
        self.b = DVector::zeros(n);
        self.x = DVector::zeros(n);
        self.lu = None;
        Ok(())
    }

    fn num_equations(&self) -> usize {
        self.b.len()
    }

    fn zero_a(&mut self) {
        self.a.fill(0.0);
        self.lu = None;
    }

    fn add_a(&mut self, m: &DMatrix<f64>, ids: &[isize], factor: f64) -> AnalysisResult<()> {
        check_ids(m.nrows(), ids)?;
        let n = self.a.nrows();
        for (r, c, v) in scatter(m, ids) {
            if r >= n || c >= n {
                return Err(out_of_range(r.max(c), n));
            }
            self.a[(r, c)] += factor * v;
        }
        self.lu = None;
        Ok(())
    }

    fn solve(&mut self) -> AnalysisResult<()> {
        let n = self.a.nrows();
        if n == 0 {
            return Ok(());
        }
        if self.lu.is_none() {
            let lu = self.a.clone().lu();
            let u = lu.u();
            let scale = u.diagonal().amax().max(f64::MIN_POSITIVE);
            if let Some(i) = (0..n).find(|&i| u[(i, i)].abs() <= 1e-14 * scale) {
                return Err(AnalysisError::Solver(format!(
                    "matrix is singular, zero pivot at equation {}",
                    i
                )));
            }
            self.lu = Some(lu);
        }
        let lu = self
            .lu
            .as_ref()
            .ok_or_else(|| AnalysisError::Solver("missing factorization".to_string()))?;
        let x = lu
            .solve(&self.b)
            .ok_or_else(|| AnalysisError::Solver("LU solve failed".to_string()))?;
        if x.iter().any(|v| !v.is_finite()) {
            return Err(AnalysisError::Solver("solution is not finite".to_string()));
        }
        self.x = x;
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
