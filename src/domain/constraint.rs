//! Single-point and multi-point constraints

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Prescribed value on one degree of freedom: `u[node, dof] = value`
///
/// When `pattern` is set the value is scaled by that load pattern's time
/// series, otherwise it is constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpConstraint {
    pub tag: usize,
    pub node: usize,
    pub dof: usize,
    pub value: f64,
    pub pattern: Option<usize>,
}

impl SpConstraint {
    /// Homogeneous constraint `u = 0`
    pub fn fixed(tag: usize, node: usize, dof: usize) -> Self {
        Self {
            tag,
            node,
            dof,
            value: 0.0,
            pattern: None,
        }
    }

    /// Prescribed displacement scaled by a load pattern
    pub fn prescribed(tag: usize, node: usize, dof: usize, value: f64, pattern: usize) -> Self {
        Self {
            tag,
            node,
            dof,
            value,
            pattern: Some(pattern),
        }
    }

    pub fn is_homogeneous(&self) -> bool {
        self.value == 0.0
    }
}

/// Linear relation `u_c = C * u_r` between the constrained dofs of one node
/// and the retained dofs of another
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MpConstraint {
    pub tag: usize,
    pub retained_node: usize,
    pub constrained_node: usize,
    pub retained_dofs: Vec<usize>,
    pub constrained_dofs: Vec<usize>,
    /// `constrained_dofs.len() x retained_dofs.len()`
    pub matrix: DMatrix<f64>,
}

impl MpConstraint {
    pub fn new(
        tag: usize,
        retained_node: usize,
        constrained_node: usize,
        retained_dofs: Vec<usize>,
        constrained_dofs: Vec<usize>,
        matrix: DMatrix<f64>,
    ) -> Self {
        Self {
            tag,
            retained_node,
            constrained_node,
            retained_dofs,
            constrained_dofs,
            matrix,
        }
    }

    /// Tie the listed dofs of two nodes together
    pub fn equal_dof(tag: usize, retained_node: usize, constrained_node: usize, dofs: &[usize]) -> Self {
        Self::new(
            tag,
            retained_node,
            constrained_node,
            dofs.to_vec(),
            dofs.to_vec(),
            DMatrix::identity(dofs.len(), dofs.len()),
        )
    }

    /// Constraint gradient `G = [I, -C]` over (constrained, retained) dofs
    pub fn gradient(&self) -> DMatrix<f64> {
        let nc = self.constrained_dofs.len();
        let nr = self.retained_dofs.len();
        let mut g = DMatrix::zeros(nc, nc + nr);
        for i in 0..nc {
            g[(i, i)] = 1.0;
            for j in 0..nr {
                g[(i, nc + j)] = -self.matrix[(i, j)];
            }
        }
        g
    }
}
