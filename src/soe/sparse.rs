//! Symmetric positive definite system in compressed sparse row storage

use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::factorization::CscCholesky;
use nalgebra_sparse::{CscMatrix, CsrMatrix};
use serde::{Deserialize, Serialize};

use super::{check_ids, out_of_range, scatter, LinearSoe};
use crate::error::{AnalysisError, AnalysisResult};
use crate::graph::Graph;
use crate::math::solve_pcg;

/// Solver behind the sparse system
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SparseSolver {
    Cholesky,
    Pcg { tol: f64, max_iterations: usize },
}

pub struct SparseSpdLinSoe {
    solver: SparseSolver,
    a: CsrMatrix<f64>,
    cholesky: Option<CscCholesky<f64>>,
    b: DVector<f64>,
    x: DVector<f64>,
}

impl std::fmt::Debug for SparseSpdLinSoe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SparseSpdLinSoe")
            .field("solver", &self.solver)
            .field("size", &self.b.len())
            .field("nnz", &self.a.nnz())
            .field("factored", &self.cholesky.is_some())
            .finish()
    }
}

impl SparseSpdLinSoe {
    pub fn new(solver: SparseSolver) -> Self {
        Self {
            solver,
            a: CsrMatrix::zeros(0, 0),
            cholesky: None,
            b: DVector::zeros(0),
            x: DVector::zeros(0),
        }
    }

    pub fn nnz(&self) -> usize {
        self.a.nnz()
    }

    pub fn a(&self) -> &CsrMatrix<f64> {
        &self.a
    }

    fn entry_mut(&mut self, row: usize, col: usize) -> Option<&mut f64> {
        let (offsets, cols, values) = self.a.csr_data_mut();
        let (start, end) = (offsets[row], offsets[row + 1]);
        let pos = cols[start..end].binary_search(&col).ok()?;
        Some(&mut values[start + pos])
    }
}

impl LinearSoe for SparseSpdLinSoe {
    fn requires_spd(&self) -> bool {
        true
    }

    fn set_size(&mut self, graph: &Graph) -> AnalysisResult<()> {
        let n = graph.num_vertices();
        let mut offsets = Vec::with_capacity(n + 1);
        let mut cols = Vec::new();
        offsets.push(0);
        for row in 0..n {
            let mut pattern: Vec<usize> = graph.neighbors(row).collect();
            pattern.push(row);
            pattern.sort_unstable();
            pattern.dedup();
            cols.extend(pattern);
            offsets.push(cols.len());
        }
        let values = vec![0.0; cols.len()];
        self.a = CsrMatrix::try_from_csr_data(n, n, offsets, cols, values)
            .map_err(|e| AnalysisError::Solver(format!("invalid sparsity pattern: {}", e)))?;
        self.cholesky = None;
        self.b = DVector::zeros(n);
        self.x = DVector::zeros(n);
        Ok(())
    }

    fn num_equations(&self) -> usize {
        self.b.len()
    }

    fn zero_a(&mut self) {
        self.a.values_mut().fill(0.0);
        self.cholesky = None;
    }

    fn add_a(&mut self, m: &DMatrix<f64>, ids: &[isize], factor: f64) -> AnalysisResult<()> {
        check_ids(m.nrows(), ids)?;
        let n = self.b.len();
        for (r, c, v) in scatter(m, ids) {
            if r >= n || c >= n {
                return Err(out_of_range(r.max(c), n));
            }
            match self.entry_mut(r, c) {
                Some(entry) => *entry += factor * v,
                None if v == 0.0 => {}
                None => {
                    return Err(AnalysisError::InvalidInput(format!(
                        "entry ({}, {}) lies outside the sparsity pattern",
                        r, c
                    )))
                }
            }
        }
        self.cholesky = None;
        Ok(())
    }

    fn solve(&mut self) -> AnalysisResult<()> {
        let n = self.b.len();
        if n == 0 {
            return Ok(());
        }
        match self.solver {
            SparseSolver::Cholesky => {
                if self.cholesky.is_none() {
                    let csc = CscMatrix::from(&self.a);
                    let chol = CscCholesky::factor(&csc).map_err(|e| {
                        AnalysisError::Solver(format!("sparse Cholesky failed: {:?}", e))
                    })?;
                    self.cholesky = Some(chol);
                }
                if let Some(chol) = &self.cholesky {
                    let rhs = DMatrix::from_column_slice(n, 1, self.b.as_slice());
                    let sol = chol.solve(&rhs);
                    if sol.iter().any(|v| !v.is_finite()) {
                        return Err(AnalysisError::Solver("solution is not finite".to_string()));
                    }
                    self.x = DVector::from_column_slice(sol.as_slice());
                }
            }
            SparseSolver::Pcg {
                tol,
                max_iterations,
            } => {
                self.x = solve_pcg(&self.a, &self.b, tol, max_iterations).ok_or_else(|| {
                    AnalysisError::Solver(format!(
                        "conjugate gradient did not reach {:e} in {} iterations",
                        tol, max_iterations
                    ))
                })?;
            }
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
