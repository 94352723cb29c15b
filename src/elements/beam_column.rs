//! Elastic 3D beam-column with optional P-Delta geometric stiffness

use nalgebra::{DMatrix, DVector};

use super::{Element, Material, Section};
use crate::domain::Node;
use crate::error::{AnalysisError, AnalysisResult};
use super::frame::{self, Mat12, Vec12};

/// 12-dof frame element between two 6-dof nodes
#[derive(Debug, Clone)]
pub struct ElasticBeamColumn3d {
    tag: usize,
    nodes: [usize; 2],
    material: Material,
    section: Section,
    rotation: f64,
    p_delta: bool,
    length: f64,
    transform: Mat12,
    k_local: Mat12,
    trial_local: Vec12,
    committed_local: Vec12,
}

impl ElasticBeamColumn3d {
    pub fn new(tag: usize, node_i: usize, node_j: usize, material: Material, section: Section) -> Self {
        Self {
            tag,
            nodes: [node_i, node_j],
            material,
            section,
            rotation: 0.0,
            p_delta: false,
            length: 0.0,
            transform: Mat12::identity(),
            k_local: Mat12::zeros(),
            trial_local: Vec12::zeros(),
            committed_local: Vec12::zeros(),
        }
    }

    /// Roll angle about the member axis, in radians
    pub fn with_rotation(mut self, rotation: f64) -> Self {
        self.rotation = rotation;
        self
    }

    /// Include the geometric stiffness of the current axial force
    pub fn with_p_delta(mut self) -> Self {
        self.p_delta = true;
        self
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    /// Axial force, tension positive
    pub fn axial_force(&self) -> f64 {
        self.axial_of(&self.trial_local)
    }

    /// Local end forces `[Fx, Fy, Fz, Mx, My, Mz]` at i then j
    pub fn local_forces(&self) -> Vec12 {
        self.local_stiffness(&self.trial_local) * self.trial_local
    }

    fn axial_of(&self, u_local: &Vec12) -> f64 {
        self.material.e * self.section.a / self.length * (u_local[6] - u_local[0])
    }

    fn local_stiffness(&self, u_local: &Vec12) -> Mat12 {
        if !self.p_delta {
            return self.k_local;
        }
        let n = self.axial_of(u_local);
        self.k_local + frame::geometric_stiffness(n, &self.section, self.length)
    }

    fn to_global(&self, k: &Mat12) -> DMatrix<f64> {
        let kg = self.transform.transpose() * k * self.transform;
        DMatrix::from_column_slice(12, 12, kg.as_slice())
    }
}

impl Element for ElasticBeamColumn3d {
    fn tag(&self) -> usize {
        self.tag
    }

    fn connected_nodes(&self) -> &[usize] {
        &self.nodes
    }

    fn set_nodes(&mut self, nodes: &[&Node]) -> AnalysisResult<()> {
        let [i, j] = nodes else {
            return Err(AnalysisError::InvalidInput(format!(
                "beam-column {} needs exactly two nodes",
                self.tag
            )));
        };
        if i.ndf() != 6 || j.ndf() != 6 {
            return Err(AnalysisError::InvalidInput(format!(
                "beam-column {} needs 6-dof nodes",
                self.tag
            )));
        }
        let (ci, cj) = (i.coords3(), j.coords3());
        self.transform = frame::transformation(&ci, &cj, self.rotation)?;
        self.length = (0..3).map(|d| (cj[d] - ci[d]).powi(2)).sum::<f64>().sqrt();
        self.k_local = frame::elastic_stiffness(&self.material, &self.section, self.length);
        Ok(())
    }

    fn num_dof(&self) -> usize {
        12
    }

    fn update(&mut self, trial_disp: &DVector<f64>) -> AnalysisResult<()> {
        let u = Vec12::from_column_slice(trial_disp.as_slice());
        self.trial_local = self.transform * u;
        Ok(())
    }

    fn tangent_stiff(&self) -> DMatrix<f64> {
        self.to_global(&self.local_stiffness(&self.trial_local))
    }

    fn initial_stiff(&self) -> DMatrix<f64> {
        self.to_global(&self.k_local)
    }

    fn committed_stiff(&self) -> DMatrix<f64> {
        self.to_global(&self.local_stiffness(&self.committed_local))
    }

    fn mass(&self) -> DMatrix<f64> {
        let half = 0.5 * self.material.rho * self.section.a * self.length;
        let mut m = DMatrix::zeros(12, 12);
        for d in [0, 1, 2, 6, 7, 8] {
            m[(d, d)] = half;
        }
        m
    }

    fn resisting_force(&self) -> DVector<f64> {
        let f = self.transform.transpose() * self.local_forces();
        DVector::from_column_slice(f.as_slice())
    }

    fn commit_state(&mut self) {
        self.committed_local = self.trial_local;
    }

    fn revert_to_last_commit(&mut self) {
        self.trial_local = self.committed_local;
    }

    fn revert_to_start(&mut self) {
        self.trial_local = Vec12::zeros();
        self.committed_local = Vec12::zeros();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cantilever(p_delta: bool) -> ElasticBeamColumn3d {
        let a = Node::new(1, 6, &[0.0, 0.0, 0.0]);
        let b = Node::new(2, 6, &[0.0, 0.0, 2.0]);
        let mut e = ElasticBeamColumn3d::new(1, 1, 2, Material::steel(), Section::rectangular(0.1, 0.1));
        if p_delta {
            e = e.with_p_delta();
        }
        e.set_nodes(&[&a, &b]).unwrap();
        e
    }

    #[test]
    fn test_global_stiffness_is_symmetric() {
        let e = cantilever(false);
        let k = e.tangent_stiff();
        assert_relative_eq!(k.clone(), k.transpose(), max_relative = 1e-10);
        assert_relative_eq!(e.length(), 2.0);
    }

    #[test]
    fn test_compression_softens_tangent() {
        let mut e = cantilever(true);
        let mut u = DVector::zeros(12);
        // shorten the member along global Z
        u[8] = -1e-4;
        e.update(&u).unwrap();
        assert!(e.axial_force() < 0.0);

        let kt = e.tangent_stiff();
        let k0 = e.initial_stiff();
        // lateral stiffness at the tip drops under compression
        assert!(kt[(6, 6)] < k0[(6, 6)]);
        assert_relative_eq!(e.committed_stiff(), k0, max_relative = 1e-12);
    }

    #[test]
    fn test_lumped_mass_total() {
        let e = cantilever(false);
        let expected = Material::steel().rho * 0.01 * 2.0;
        assert_relative_eq!(e.mass().trace(), 3.0 * expected, max_relative = 1e-12);
    }
}
