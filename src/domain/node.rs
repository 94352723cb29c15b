//! Node - a point carrying degrees of freedom and their response history

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Trial and committed values of one response quantity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub trial: DVector<f64>,
    pub committed: DVector<f64>,
}

impl Response {
    fn zeros(ndf: usize) -> Self {
        Self {
            trial: DVector::zeros(ndf),
            committed: DVector::zeros(ndf),
        }
    }

    fn commit(&mut self) {
        self.committed.copy_from(&self.trial);
    }

    fn revert(&mut self) {
        self.trial.copy_from(&self.committed);
    }

    fn reset(&mut self) {
        self.trial.fill(0.0);
        self.committed.fill(0.0);
    }
}

/// A node of the structural model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    tag: usize,
    coords: Vec<f64>,
    ndf: usize,
    mass: Option<DMatrix<f64>>,
    disp: Response,
    vel: Response,
    accel: Response,
    #[serde(skip)]
    unbalanced_load: Option<DVector<f64>>,
    eigenvectors: Vec<DVector<f64>>,
}

impl Node {
    /// Create a node with `ndf` degrees of freedom at the given coordinates
    pub fn new(tag: usize, ndf: usize, coords: &[f64]) -> Self {
        Self {
            tag,
            coords: coords.to_vec(),
            ndf,
            mass: None,
            disp: Response::zeros(ndf),
            vel: Response::zeros(ndf),
            accel: Response::zeros(ndf),
            unbalanced_load: None,
            eigenvectors: Vec::new(),
        }
    }

    /// Lumped translational mass on the first `coords.len()` dofs
    pub fn with_lumped_mass(mut self, mass: f64) -> Self {
        let mut m = DMatrix::zeros(self.ndf, self.ndf);
        for d in 0..self.coords.len().min(self.ndf) {
            m[(d, d)] = mass;
        }
        self.mass = Some(m);
        self
    }

    pub fn with_mass(mut self, mass: DMatrix<f64>) -> Self {
        self.mass = Some(mass);
        self
    }

    pub fn tag(&self) -> usize {
        self.tag
    }

    pub fn ndf(&self) -> usize {
        self.ndf
    }

    pub fn coords(&self) -> &[f64] {
        &self.coords
    }

    /// Coordinates padded to three dimensions
    pub fn coords3(&self) -> [f64; 3] {
        let mut c = [0.0; 3];
        for (dst, src) in c.iter_mut().zip(&self.coords) {
            *dst = *src;
        }
        c
    }

    pub fn mass(&self) -> Option<&DMatrix<f64>> {
        self.mass.as_ref()
    }

    pub fn trial_disp(&self) -> &DVector<f64> {
        &self.disp.trial
    }

    pub fn committed_disp(&self) -> &DVector<f64> {
        &self.disp.committed
    }

    pub fn trial_vel(&self) -> &DVector<f64> {
        &self.vel.trial
    }

    pub fn committed_vel(&self) -> &DVector<f64> {
        &self.vel.committed
    }

    pub fn trial_accel(&self) -> &DVector<f64> {
        &self.accel.trial
    }

    pub fn committed_accel(&self) -> &DVector<f64> {
        &self.accel.committed
    }

    pub fn set_trial_disp_component(&mut self, dof: usize, value: f64) {
        self.disp.trial[dof] = value;
    }

    pub fn set_trial_vel_component(&mut self, dof: usize, value: f64) {
        self.vel.trial[dof] = value;
    }

    pub fn set_trial_accel_component(&mut self, dof: usize, value: f64) {
        self.accel.trial[dof] = value;
    }

    pub fn incr_trial_disp_component(&mut self, dof: usize, delta: f64) {
        self.disp.trial[dof] += delta;
    }

    pub fn unbalanced_load(&self) -> Option<&DVector<f64>> {
        self.unbalanced_load.as_ref()
    }

    pub(crate) fn zero_unbalanced_load(&mut self) {
        self.unbalanced_load = None;
    }

    pub(crate) fn add_unbalanced_load(&mut self, load: &DVector<f64>, factor: f64) {
        let ndf = self.ndf;
        let current = self
            .unbalanced_load
            .get_or_insert_with(|| DVector::zeros(ndf));
        for (dst, src) in current.iter_mut().zip(load.iter()) {
            *dst += factor * src;
        }
    }

    pub fn eigenvector(&self, mode: usize) -> Option<&DVector<f64>> {
        self.eigenvectors.get(mode)
    }

    pub(crate) fn set_eigenvectors(&mut self, vectors: Vec<DVector<f64>>) {
        self.eigenvectors = vectors;
    }

    pub(crate) fn commit_state(&mut self) {
        self.disp.commit();
        self.vel.commit();
        self.accel.commit();
    }

    pub(crate) fn revert_to_last_commit(&mut self) {
        self.disp.revert();
        self.vel.revert();
        self.accel.revert();
    }

    pub(crate) fn revert_to_start(&mut self) {
        self.disp.reset();
        self.vel.reset();
        self.accel.reset();
        self.unbalanced_load = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_and_revert() {
        let mut node = Node::new(1, 2, &[0.0, 0.0]);
        node.incr_trial_disp_component(0, 0.5);
        node.commit_state();
        node.incr_trial_disp_component(0, 0.25);
        assert_eq!(node.trial_disp()[0], 0.75);

        node.revert_to_last_commit();
        assert_eq!(node.trial_disp()[0], 0.5);
        assert_eq!(node.committed_disp()[0], 0.5);

        node.revert_to_start();
        assert_eq!(node.committed_disp()[0], 0.0);
    }

    #[test]
    fn test_lumped_mass_only_on_translations() {
        let node = Node::new(1, 6, &[0.0, 0.0, 0.0]).with_lumped_mass(2.0);
        let m = node.mass().unwrap();
        assert_eq!(m[(2, 2)], 2.0);
        assert_eq!(m[(3, 3)], 0.0);
    }
}
