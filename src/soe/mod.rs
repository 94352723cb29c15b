//! Linear systems of equations `A x = b` and their solvers
//!
//! A system is sized from the equation graph, accumulates element
//! contributions until it is zeroed, and keeps its factorization until `A`
//! changes, so repeated solves against new right-hand sides are cheap.

mod contribution;
mod full;
mod profile;
mod sparse;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, AnalysisResult};
use crate::graph::Graph;

pub use contribution::{Contribution, ContributionSoe};
pub use full::FullGenLinSoe;
pub use profile::ProfileSpdLinSoe;
pub use sparse::{SparseSolver, SparseSpdLinSoe};

/// Assembled linear system and its solver
pub trait LinearSoe: std::fmt::Debug + Send {
    /// Resize for the given equation graph and clear everything
    fn set_size(&mut self, graph: &Graph) -> AnalysisResult<()>;

    fn num_equations(&self) -> usize;

    fn zero_a(&mut self);

    /// `A[ids, ids] += factor * m`; negative ids are skipped
    fn add_a(&mut self, m: &DMatrix<f64>, ids: &[isize], factor: f64) -> AnalysisResult<()>;

    /// Factor if needed and solve for `x`
    fn solve(&mut self) -> AnalysisResult<()>;

    fn x(&self) -> &DVector<f64>;

    fn b(&self) -> &DVector<f64>;

    fn x_mut(&mut self) -> &mut DVector<f64>;

    fn b_mut(&mut self) -> &mut DVector<f64>;

    /// Whether `solve` needs a positive definite matrix
    fn requires_spd(&self) -> bool {
        false
    }

    fn zero_b(&mut self) {
        self.b_mut().fill(0.0);
    }

    /// `b[ids] += factor * v`; negative ids are skipped
    fn add_b(&mut self, v: &DVector<f64>, ids: &[isize], factor: f64) -> AnalysisResult<()> {
        check_ids(v.len(), ids)?;
        let b = self.b_mut();
        for (value, &id) in v.iter().zip(ids) {
            if id >= 0 {
                let i = id as usize;
                if i >= b.len() {
                    return Err(out_of_range(i, b.len()));
                }
                b[i] += factor * value;
            }
        }
        Ok(())
    }

    fn set_b(&mut self, v: &DVector<f64>) -> AnalysisResult<()> {
        let b = self.b_mut();
        if v.len() != b.len() {
            return Err(AnalysisError::InvalidInput(format!(
                "right-hand side has {} entries, system has {}",
                v.len(),
                b.len()
            )));
        }
        b.copy_from(v);
        Ok(())
    }

    fn set_x(&mut self, v: &DVector<f64>) -> AnalysisResult<()> {
        let x = self.x_mut();
        if v.len() != x.len() {
            return Err(AnalysisError::InvalidInput(format!(
                "solution has {} entries, system has {}",
                v.len(),
                x.len()
            )));
        }
        x.copy_from(v);
        Ok(())
    }
}

pub(crate) fn check_ids(len: usize, ids: &[isize]) -> AnalysisResult<()> {
    if len != ids.len() {
        return Err(AnalysisError::InvalidInput(format!(
            "contribution of size {} with {} equation ids",
            len,
            ids.len()
        )));
    }
    Ok(())
}

pub(crate) fn out_of_range(id: usize, n: usize) -> AnalysisError {
    AnalysisError::InvalidInput(format!("equation {} outside system of size {}", id, n))
}

/// Iterate `(row, col, value)` of a contribution over non-negative ids
pub(crate) fn scatter<'a>(
    m: &'a DMatrix<f64>,
    ids: &'a [isize],
) -> impl Iterator<Item = (usize, usize, f64)> + 'a {
    ids.iter().enumerate().filter(|(_, &r)| r >= 0).flat_map(move |(a, &r)| {
        ids.iter()
            .enumerate()
            .filter(|(_, &c)| c >= 0)
            .map(move |(b, &c)| (r as usize, c as usize, m[(a, b)]))
    })
}

/// Selectable linear system type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SystemKind {
    /// Dense LU, works for indefinite (Lagrange) systems
    FullGeneral,
    /// Skyline Cholesky
    ProfileSpd,
    /// Sparse Cholesky
    SparseSpd,
    /// Sparse storage with Jacobi-preconditioned CG
    SparsePcg { tol: f64, max_iterations: usize },
}

impl Default for SystemKind {
    fn default() -> Self {
        SystemKind::ProfileSpd
    }
}

impl SystemKind {
    pub fn build(&self) -> Box<dyn LinearSoe> {
        match *self {
            SystemKind::FullGeneral => Box::new(FullGenLinSoe::new()),
            SystemKind::ProfileSpd => Box::new(ProfileSpdLinSoe::new()),
            SystemKind::SparseSpd => Box::new(SparseSpdLinSoe::new(SparseSolver::Cholesky)),
            SystemKind::SparsePcg {
                tol,
                max_iterations,
            } => Box::new(SparseSpdLinSoe::new(SparseSolver::Pcg {
                tol,
                max_iterations,
            })),
        }
    }

    /// Whether the system needs a positive definite matrix
    pub fn requires_spd(&self) -> bool {
        !matches!(self, SystemKind::FullGeneral)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// 4x4 SPD matrix assembled from two overlapping 3x3 blocks
    fn assemble(soe: &mut dyn LinearSoe) {
        let mut graph = Graph::new(4);
        graph.add_clique(&[0, 1, 2]);
        graph.add_clique(&[1, 2, 3]);
        soe.set_size(&graph).unwrap();

        let block = DMatrix::from_row_slice(3, 3, &[4.0, -1.0, 0.0, -1.0, 4.0, -1.0, 0.0, -1.0, 4.0]);
        soe.add_a(&block, &[0, 1, 2], 1.0).unwrap();
        soe.add_a(&block, &[1, 2, 3], 1.0).unwrap();
        // constrained row is skipped
        soe.add_a(&block, &[-1, 3, 2], 0.5).unwrap();
    }

    #[test]
    fn test_spd_round_trip_on_every_system() {
        let kinds = [
            SystemKind::FullGeneral,
            SystemKind::ProfileSpd,
            SystemKind::SparseSpd,
            SystemKind::SparsePcg {
                tol: 1e-14,
                max_iterations: 100,
            },
        ];
        let expected = DVector::from_vec(vec![0.5, -1.0, 2.0, 0.25]);
        let mut reference: Option<DVector<f64>> = None;
        for kind in kinds {
            let mut soe = kind.build();
            assemble(soe.as_mut());
            let a = {
                let mut full = FullGenLinSoe::new();
                assemble(&mut full);
                full.a().clone()
            };
            soe.set_b(&(&a * &expected)).unwrap();
            soe.solve().unwrap();
            assert_relative_eq!(soe.x().clone(), expected.clone(), epsilon = 1e-9);
            if let Some(r) = &reference {
                assert_relative_eq!(soe.x().clone(), r.clone(), epsilon = 1e-9);
            }
            reference = Some(soe.x().clone());
        }
    }

    #[test]
    fn test_add_b_skips_constrained_ids() {
        let mut soe = FullGenLinSoe::new();
        soe.set_size(&Graph::new(2)).unwrap();
        soe.add_b(&DVector::from_vec(vec![1.0, 2.0, 3.0]), &[1, -1, 0], 2.0)
            .unwrap();
        assert_relative_eq!(soe.b()[0], 6.0);
        assert_relative_eq!(soe.b()[1], 2.0);
        assert!(soe.add_b(&DVector::from_vec(vec![1.0]), &[0, 1], 1.0).is_err());
    }
}
