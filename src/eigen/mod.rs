//! Generalized symmetric eigenproblems `A phi = lambda M phi`

mod full;
mod subspace;

use nalgebra::linalg::SymmetricEigen;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, AnalysisResult};
use crate::graph::Graph;

pub use full::FullGenEigenSoe;
pub use subspace::SubspaceEigenSoe;

/// Assembled eigenproblem and its solver
pub trait EigenSoe: std::fmt::Debug + Send {
    fn set_size(&mut self, graph: &Graph) -> AnalysisResult<()>;

    fn num_equations(&self) -> usize;

    fn zero_a(&mut self);

    fn zero_m(&mut self);

    fn add_a(&mut self, m: &DMatrix<f64>, ids: &[isize], factor: f64) -> AnalysisResult<()>;

    fn add_m(&mut self, m: &DMatrix<f64>, ids: &[isize], factor: f64) -> AnalysisResult<()>;

    /// Solve for the lowest `num_modes` pairs; `0` asks for every finite pair
    fn solve(&mut self, num_modes: usize) -> AnalysisResult<()>;

    /// Ascending eigenvalues of the last solve
    fn eigenvalues(&self) -> &[f64];

    /// M-normalized eigenvector of `mode` (0-based)
    fn eigenvector(&self, mode: usize) -> Option<&DVector<f64>>;
}

/// Selectable eigen solver
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EigenSystemKind {
    FullGeneral,
    Subspace { tol: f64, max_iterations: usize },
}

impl Default for EigenSystemKind {
    fn default() -> Self {
        EigenSystemKind::FullGeneral
    }
}

impl EigenSystemKind {
    pub fn build(&self) -> Box<dyn EigenSoe> {
        match *self {
            EigenSystemKind::FullGeneral => Box::new(FullGenEigenSoe::new()),
            EigenSystemKind::Subspace {
                tol,
                max_iterations,
            } => Box::new(SubspaceEigenSoe::new(tol, max_iterations)),
        }
    }
}

/// Flip `v` so its largest-magnitude component is positive
pub(crate) fn fix_sign(v: &mut DVector<f64>) {
    let pivot = v.iter().copied().fold(0.0_f64, |acc, x| if x.abs() > acc.abs() { x } else { acc });
    if pivot < 0.0 {
        v.neg_mut();
    }
}

fn symmetrize(m: DMatrix<f64>) -> DMatrix<f64> {
    (&m + m.transpose()) * 0.5
}

/// Every finite pair of a dense symmetric problem, ascending, with
/// `phi^T M phi = 1`.
///
/// Reduces through the Cholesky factor of `M`; when `M` is singular the
/// roles swap and the reciprocal eigenvalues of `M phi = nu A phi` are
/// returned, dropping pairs with `nu` at round-off (infinite eigenvalues).
pub(crate) fn solve_generalized(
    a: &DMatrix<f64>,
    m: &DMatrix<f64>,
) -> AnalysisResult<Vec<(f64, DVector<f64>)>> {
    let n = a.nrows();
    if n == 0 {
        return Ok(Vec::new());
    }

    let mut pairs: Vec<(f64, DVector<f64>)> = if let Some(chol) = m.clone().cholesky() {
        let l_inv = chol
            .l()
            .try_inverse()
            .ok_or_else(|| AnalysisError::EigenSolver("mass factor is singular".to_string()))?;
        let reduced = symmetrize(&l_inv * a * l_inv.transpose());
        let eig = SymmetricEigen::new(reduced);
        let back = l_inv.transpose();
        (0..n)
            .map(|i| (eig.eigenvalues[i], &back * eig.eigenvectors.column(i)))
            .collect()
    } else if let Some(chol) = a.clone().cholesky() {
        let l_inv = chol.l().try_inverse().ok_or_else(|| {
            AnalysisError::EigenSolver("stiffness factor is singular".to_string())
        })?;
        let reduced = symmetrize(&l_inv * m * l_inv.transpose());
        let eig = SymmetricEigen::new(reduced);
        let largest = eig.eigenvalues.amax();
        let back = l_inv.transpose();
        (0..n)
            .filter(|&i| eig.eigenvalues[i] > 1e-12 * largest.max(f64::MIN_POSITIVE))
            .map(|i| {
                let phi = &back * eig.eigenvectors.column(i);
                let modal_mass = phi.dot(&(m * &phi));
                (1.0 / eig.eigenvalues[i], phi / modal_mass.sqrt())
            })
            .collect()
    } else {
        return Err(AnalysisError::EigenSolver(
            "neither matrix of the eigenproblem is positive definite".to_string(),
        ));
    };

    if pairs.iter().any(|(l, v)| !l.is_finite() || v.iter().any(|x| !x.is_finite())) {
        return Err(AnalysisError::EigenSolver("non-finite eigenpair".to_string()));
    }
    pairs.sort_by(|x, y| x.0.total_cmp(&y.0));
    for (_, v) in pairs.iter_mut() {
        fix_sign(v);
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_diagonal_problem() {
        let a = DMatrix::from_diagonal(&DVector::from_vec(vec![8.0, 2.0, 18.0]));
        let m = DMatrix::from_diagonal(&DVector::from_vec(vec![2.0, 2.0, 2.0]));
        let pairs = solve_generalized(&a, &m).unwrap();
        let values: Vec<f64> = pairs.iter().map(|p| p.0).collect();
        assert_relative_eq!(values[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(values[1], 4.0, epsilon = 1e-12);
        assert_relative_eq!(values[2], 9.0, epsilon = 1e-12);
        assert_relative_eq!(pairs[0].1[1], 1.0 / 2.0_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_singular_mass_drops_infinite_modes() {
        let a = DMatrix::from_diagonal(&DVector::from_vec(vec![4.0, 1.0]));
        let m = DMatrix::from_diagonal(&DVector::from_vec(vec![1.0, 0.0]));
        let pairs = solve_generalized(&a, &m).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_relative_eq!(pairs[0].0, 4.0, epsilon = 1e-12);
        assert_relative_eq!(pairs[0].1[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sign_convention() {
        let mut v = DVector::from_vec(vec![0.2, -0.9, 0.5]);
        fix_sign(&mut v);
        assert!(v[1] > 0.0);
    }
}
