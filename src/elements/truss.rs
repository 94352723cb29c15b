//! Linear elastic truss bar in 1, 2 or 3 dimensions

use nalgebra::{DMatrix, DVector};

use super::{Element, Material};
use crate::domain::Node;
use crate::error::{AnalysisError, AnalysisResult};

#[derive(Debug, Clone)]
pub struct Truss {
    tag: usize,
    nodes: [usize; 2],
    material: Material,
    area: f64,
    ndf: [usize; 2],
    length: f64,
    cosines: Vec<f64>,
    trial_disp: DVector<f64>,
    committed_disp: DVector<f64>,
}

impl Truss {
    pub fn new(tag: usize, node_i: usize, node_j: usize, material: Material, area: f64) -> Self {
        Self {
            tag,
            nodes: [node_i, node_j],
            material,
            area,
            ndf: [0, 0],
            length: 0.0,
            cosines: Vec::new(),
            trial_disp: DVector::zeros(0),
            committed_disp: DVector::zeros(0),
        }
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    /// Axial force, tension positive
    pub fn axial_force(&self) -> f64 {
        self.material.e * self.area / self.length * self.elongation(&self.trial_disp)
    }

    fn elongation(&self, u: &DVector<f64>) -> f64 {
        let offset = self.ndf[0];
        self.cosines
            .iter()
            .enumerate()
            .map(|(d, c)| c * (u[offset + d] - u[d]))
            .sum()
    }

    fn stiffness(&self) -> DMatrix<f64> {
        let n = self.num_dof();
        let offset = self.ndf[0];
        let k = self.material.e * self.area / self.length;
        let mut m = DMatrix::zeros(n, n);
        for (a, ca) in self.cosines.iter().enumerate() {
            for (b, cb) in self.cosines.iter().enumerate() {
                let v = k * ca * cb;
                m[(a, b)] += v;
                m[(offset + a, offset + b)] += v;
                m[(a, offset + b)] -= v;
                m[(offset + a, b)] -= v;
            }
        }
        m
    }
}

impl Element for Truss {
    fn tag(&self) -> usize {
        self.tag
    }

    fn connected_nodes(&self) -> &[usize] {
        &self.nodes
    }

    fn set_nodes(&mut self, nodes: &[&Node]) -> AnalysisResult<()> {
        let [i, j] = nodes else {
            return Err(AnalysisError::InvalidInput(format!(
                "truss {} needs exactly two nodes",
                self.tag
            )));
        };
        let dim = i.coords().len();
        if j.coords().len() != dim || i.ndf() < dim || j.ndf() < dim {
            return Err(AnalysisError::InvalidInput(format!(
                "truss {} nodes must share dimension {} with at least that many dofs",
                self.tag, dim
            )));
        }
        let delta: Vec<f64> = (0..dim).map(|d| j.coords()[d] - i.coords()[d]).collect();
        let length = delta.iter().map(|d| d * d).sum::<f64>().sqrt();
        if length < 1e-12 {
            return Err(AnalysisError::InvalidInput(format!(
                "truss {} has zero length",
                self.tag
            )));
        }
        self.length = length;
        self.cosines = delta.iter().map(|d| d / length).collect();
        self.ndf = [i.ndf(), j.ndf()];
        self.trial_disp = DVector::zeros(self.num_dof());
        self.committed_disp = self.trial_disp.clone();
        Ok(())
    }

    fn num_dof(&self) -> usize {
        self.ndf[0] + self.ndf[1]
    }

    fn update(&mut self, trial_disp: &DVector<f64>) -> AnalysisResult<()> {
        self.trial_disp.copy_from(trial_disp);
        Ok(())
    }

    fn tangent_stiff(&self) -> DMatrix<f64> {
        self.stiffness()
    }

    fn initial_stiff(&self) -> DMatrix<f64> {
        self.stiffness()
    }

    fn mass(&self) -> DMatrix<f64> {
        let n = self.num_dof();
        let half = 0.5 * self.material.rho * self.area * self.length;
        let mut m = DMatrix::zeros(n, n);
        for d in 0..self.cosines.len() {
            m[(d, d)] = half;
            m[(self.ndf[0] + d, self.ndf[0] + d)] = half;
        }
        m
    }

    fn resisting_force(&self) -> DVector<f64> {
        self.stiffness() * &self.trial_disp
    }

    fn commit_state(&mut self) {
        self.committed_disp.copy_from(&self.trial_disp);
    }

    fn revert_to_last_commit(&mut self) {
        self.trial_disp.copy_from(&self.committed_disp);
    }

    fn revert_to_start(&mut self) {
        self.trial_disp.fill(0.0);
        self.committed_disp.fill(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_inclined_truss_axial_force() {
        let a = Node::new(1, 2, &[0.0, 0.0]);
        let b = Node::new(2, 2, &[3.0, 4.0]);
        let mut t = Truss::new(1, 1, 2, Material::new(100.0, 40.0, 0.25, 1.0), 2.0);
        t.set_nodes(&[&a, &b]).unwrap();
        assert_relative_eq!(t.length(), 5.0);

        // stretch along the bar by 0.05
        t.update(&DVector::from_vec(vec![0.0, 0.0, 0.03, 0.04])).unwrap();
        assert_relative_eq!(t.axial_force(), 100.0 * 2.0 / 5.0 * 0.05, epsilon = 1e-12);

        let f = t.resisting_force();
        assert_relative_eq!(f[2], 2.0 * 0.6, epsilon = 1e-12);
        assert_relative_eq!(f[3], 2.0 * 0.8, epsilon = 1e-12);
        assert_relative_eq!(f[0] + f[2], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_lumped_mass() {
        let a = Node::new(1, 3, &[0.0, 0.0, 0.0]);
        let b = Node::new(2, 3, &[2.0, 0.0, 0.0]);
        let mut t = Truss::new(1, 1, 2, Material::new(1.0, 1.0, 0.0, 3.0), 0.5);
        t.set_nodes(&[&a, &b]).unwrap();
        let m = t.mass();
        assert_relative_eq!(m.trace(), 6.0 * 1.5);
    }
}
