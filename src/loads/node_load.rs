//! Node loads - reference forces applied directly to node dofs

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// A reference load on a node, scaled by its pattern's time series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeLoad {
    pub node: usize,
    /// One value per node dof
    pub values: DVector<f64>,
}

impl NodeLoad {
    pub fn new(node: usize, values: &[f64]) -> Self {
        Self {
            node,
            values: DVector::from_column_slice(values),
        }
    }

    /// Load acting on a single dof of an `ndf`-dof node
    pub fn on_dof(node: usize, ndf: usize, dof: usize, value: f64) -> Self {
        let mut values = DVector::zeros(ndf);
        values[dof] = value;
        Self { node, values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_on_dof() {
        let load = NodeLoad::on_dof(3, 6, 1, -10.0);
        assert_eq!(load.values.len(), 6);
        assert_eq!(load.values[1], -10.0);
        assert_eq!(load.values[0], 0.0);
    }
}
