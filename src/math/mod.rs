//! Mathematical utilities shared by the equation solvers and the analysis model

pub mod sparse;

use nalgebra::{DMatrix, DVector};

pub use sparse::{inverse_permutation, reverse_cuthill_mckee, solve_pcg, SkylineMatrix};

/// Pick the entries of an equation-space vector addressed by `ids`.
/// Negative ids read as zero.
pub fn gather(x: &DVector<f64>, ids: &[isize]) -> DVector<f64> {
    DVector::from_iterator(
        ids.len(),
        ids.iter().map(|&id| {
            if id >= 0 {
                x.get(id as usize).copied().unwrap_or(0.0)
            } else {
                0.0
            }
        }),
    )
}

/// `T^T * m * T`, or `m` itself when there is no transformation
pub fn congruent(m: &DMatrix<f64>, t: Option<&DMatrix<f64>>) -> DMatrix<f64> {
    match t {
        Some(t) => t.transpose() * m * t,
        None => m.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_gather_skips_negative_ids() {
        let x = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let g = gather(&x, &[2, -1, 0]);
        assert_eq!(g.as_slice(), &[3.0, 0.0, 1.0]);
    }

    #[test]
    fn test_congruent_projects_onto_retained_dof() {
        let m = DMatrix::from_row_slice(2, 2, &[2.0, -1.0, -1.0, 2.0]);
        // both dofs follow a single retained dof
        let t = DMatrix::from_row_slice(2, 1, &[1.0, 1.0]);
        let reduced = congruent(&m, Some(&t));
        assert_eq!(reduced.shape(), (1, 1));
        assert_relative_eq!(reduced[(0, 0)], 2.0, epsilon = 1e-14);
        assert_eq!(congruent(&m, None), m);
    }
}
