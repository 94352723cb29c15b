//! Subspace iteration on sparse storage
//!
//! Iterates a block of `q = min(2p, p + 8, n)` vectors: `K Xbar = M X`,
//! projects `K` and `M` onto the block, solves the small dense problem and
//! rotates the block onto its eigenvectors until the lowest `p` eigenvalues
//! stop moving.

use log::debug;
use nalgebra::{DMatrix, DVector};

use super::{fix_sign, solve_generalized, EigenSoe};
use crate::error::{AnalysisError, AnalysisResult};
use crate::graph::Graph;
use crate::math::sparse::sparse_matvec;
use crate::soe::{LinearSoe, SparseSolver, SparseSpdLinSoe};

#[derive(Debug)]
pub struct SubspaceEigenSoe {
    k: SparseSpdLinSoe,
    m: SparseSpdLinSoe,
    tol: f64,
    max_iterations: usize,
    values: Vec<f64>,
    vectors: Vec<DVector<f64>>,
    iterations: usize,
}

impl SubspaceEigenSoe {
    pub fn new(tol: f64, max_iterations: usize) -> Self {
        Self {
            k: SparseSpdLinSoe::new(SparseSolver::Cholesky),
            m: SparseSpdLinSoe::new(SparseSolver::Cholesky),
            tol,
            max_iterations,
            values: Vec::new(),
            vectors: Vec::new(),
            iterations: 0,
        }
    }

    /// Iterations used by the last solve
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    fn diagonal(soe: &SparseSpdLinSoe) -> DVector<f64> {
        let n = soe.num_equations();
        let mut d = DVector::zeros(n);
        for (r, c, v) in soe.a().triplet_iter() {
            if r == c {
                d[r] = *v;
            }
        }
        d
    }

    /// Mass diagonal plus unit vectors at the largest `m_ii / k_ii`
    fn starting_block(&self, n: usize, q: usize) -> DMatrix<f64> {
        let k_diag = Self::diagonal(&self.k);
        let m_diag = Self::diagonal(&self.m);
        let mut x = DMatrix::zeros(n, q);
        if m_diag.iter().any(|v| *v != 0.0) {
            x.set_column(0, &m_diag);
        } else {
            x.column_mut(0).fill(1.0);
        }
        let mut ratios: Vec<(usize, f64)> = (0..n)
            .map(|i| (i, if k_diag[i] > 0.0 { m_diag[i] / k_diag[i] } else { 0.0 }))
            .collect();
        ratios.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        for (col, (i, _)) in (1..q).zip(ratios.iter()) {
            x[(*i, col)] = 1.0;
        }
        x
    }
}

impl EigenSoe for SubspaceEigenSoe {
    fn set_size(&mut self, graph: &Graph) -> AnalysisResult<()> {
        self.k.set_size(graph)?;
        self.m.set_size(graph)?;
        self.values.clear();
        self.vectors.clear();
        Ok(())
    }

    fn num_equations(&self) -> usize {
        self.k.num_equations()
    }

    fn zero_a(&mut self) {
        self.k.zero_a();
    }

    fn zero_m(&mut self) {
        self.m.zero_a();
    }

    fn add_a(&mut self, m: &DMatrix<f64>, ids: &[isize], factor: f64) -> AnalysisResult<()> {
        self.k.add_a(m, ids, factor)
    }

    fn add_m(&mut self, m: &DMatrix<f64>, ids: &[isize], factor: f64) -> AnalysisResult<()> {
        self.m.add_a(m, ids, factor)
    }

    fn solve(&mut self, num_modes: usize) -> AnalysisResult<()> {
        let n = self.num_equations();
        let p = if num_modes == 0 { n } else { num_modes };
        if p > n {
            return Err(AnalysisError::EigenSolver(format!(
                "{} modes requested from {} equations",
                p, n
            )));
        }
        if p == 0 {
            return Ok(());
        }
        let q = (2 * p).min(p + 8).min(n);

        let mut x = self.starting_block(n, q);
        let mut previous: Vec<f64> = vec![f64::INFINITY; p];
        let mut pairs = Vec::new();
        let mut converged = false;
        let mut x_bar = DMatrix::zeros(n, q);
        let mut y = DMatrix::zeros(n, q);

        for iteration in 1..=self.max_iterations {
            for j in 0..q {
                let mx = sparse_matvec(self.m.a(), &x.column(j).into_owned());
                self.k.set_b(&mx)?;
                self.k.solve().map_err(|e| {
                    AnalysisError::EigenSolver(format!("stiffness is not positive definite: {}", e))
                })?;
                y.set_column(j, &mx);
                x_bar.set_column(j, self.k.x());
            }

            let k_r = x_bar.transpose() * &y;
            let mut m_bar = DMatrix::zeros(n, q);
            for j in 0..q {
                m_bar.set_column(j, &sparse_matvec(self.m.a(), &x_bar.column(j).into_owned()));
            }
            let m_r = x_bar.transpose() * &m_bar;

            pairs = solve_generalized(&k_r, &m_r)?;
            if pairs.len() < p {
                return Err(AnalysisError::EigenSolver(format!(
                    "subspace holds {} finite modes, {} requested",
                    pairs.len(),
                    p
                )));
            }
            let mut rotation = DMatrix::zeros(q, pairs.len());
            for (j, (_, v)) in pairs.iter().enumerate() {
                rotation.set_column(j, v);
            }
            x = &x_bar * rotation;
            if x.ncols() < q {
                // keep the block width when reduced modes were dropped
                let mut padded = DMatrix::zeros(n, q);
                padded.columns_mut(0, x.ncols()).copy_from(&x);
                x = padded;
            }

            let change = (0..p)
                .map(|i| ((pairs[i].0 - previous[i]) / pairs[i].0).abs())
                .fold(0.0, f64::max);
            debug!("subspace iteration {}: relative eigenvalue change {:e}", iteration, change);
            previous = pairs.iter().take(p).map(|pair| pair.0).collect();
            self.iterations = iteration;
            if change <= self.tol {
                converged = true;
                break;
            }
        }

        if !converged {
            return Err(AnalysisError::EigenSolver(format!(
                "subspace iteration did not converge in {} iterations",
                self.max_iterations
            )));
        }

        self.values = previous;
        self.vectors = (0..p)
            .map(|j| {
                let mut v = x.column(j).into_owned();
                fix_sign(&mut v);
                v
            })
            .collect();
        debug!("subspace solver found {} modes", pairs.len().min(p));
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
    use crate::eigen::FullGenEigenSoe;
    use approx::assert_relative_eq;

    fn chain(soe: &mut dyn EigenSoe, n: usize) {
        let mut g = Graph::new(n);
        for i in 1..n {
            g.add_edge(i - 1, i);
        }
        soe.set_size(&g).unwrap();
        let k = DMatrix::from_row_slice(2, 2, &[1.0, -1.0, -1.0, 1.0]);
        for i in 1..n {
            soe.add_a(&k, &[(i - 1) as isize, i as isize], 100.0).unwrap();
        }
        soe.add_a(&DMatrix::from_element(1, 1, 100.0), &[0], 1.0).unwrap();
        for i in 0..n {
            soe.add_m(&DMatrix::from_element(1, 1, 1.0 + i as f64 * 0.1), &[i as isize], 1.0)
                .unwrap();
        }
    }

    #[test]
    fn test_matches_dense_solver() {
        let mut dense = FullGenEigenSoe::new();
        chain(&mut dense, 12);
        dense.solve(3).unwrap();

        let mut subspace = SubspaceEigenSoe::new(1e-12, 100);
        chain(&mut subspace, 12);
        subspace.solve(3).unwrap();

        for i in 0..3 {
            assert_relative_eq!(subspace.eigenvalues()[i], dense.eigenvalues()[i], max_relative = 1e-8);
            let a = subspace.eigenvector(i).unwrap();
            let b = dense.eigenvector(i).unwrap();
            assert_relative_eq!(a.clone(), b.clone(), epsilon = 1e-5);
        }
    }

    #[test]
    fn test_diagonal_problem() {
        let mut soe = SubspaceEigenSoe::new(1e-10, 50);
        soe.set_size(&Graph::new(3)).unwrap();
        for (i, k) in [8.0, 2.0, 18.0].iter().enumerate() {
            soe.add_a(&DMatrix::from_element(1, 1, *k), &[i as isize], 1.0).unwrap();
            soe.add_m(&DMatrix::from_element(1, 1, 2.0), &[i as isize], 1.0).unwrap();
        }
        soe.solve(2).unwrap();
        assert_relative_eq!(soe.eigenvalues()[0], 1.0, epsilon = 1e-10);
        assert_relative_eq!(soe.eigenvalues()[1], 4.0, epsilon = 1e-10);
    }
}
