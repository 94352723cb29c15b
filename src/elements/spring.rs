//! Zero-length spring acting along one dof

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::Element;
use crate::domain::Node;
use crate::error::{AnalysisError, AnalysisResult};

/// Force-deformation law of a spring
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SpringLaw {
    /// `f = k * d`
    Linear { k: f64 },
    /// `f = k1 * d + k2 * d^2 + k3 * d^3`
    Polynomial { k1: f64, k2: f64, k3: f64 },
    /// Elastoplastic with kinematic hardening; `b` in `[0, 1]` is the
    /// post-yield stiffness ratio, `b = 1` never yields
    Bilinear { k: f64, fy: f64, b: f64 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct SpringState {
    deformation: f64,
    force: f64,
    tangent: f64,
    plastic: f64,
    back_force: f64,
}

impl SpringLaw {
    fn initial_tangent(&self) -> f64 {
        match *self {
            SpringLaw::Linear { k } => k,
            SpringLaw::Polynomial { k1, .. } => k1,
            SpringLaw::Bilinear { k, .. } => k,
        }
    }

    fn validate(&self) -> AnalysisResult<()> {
        match *self {
            SpringLaw::Bilinear { fy, b, .. } if !(0.0..=1.0).contains(&b) || fy < 0.0 => {
                Err(AnalysisError::InvalidInput(format!(
                    "bilinear spring needs 0 <= b <= 1 and fy >= 0, got b = {}, fy = {}",
                    b, fy
                )))
            }
            _ => Ok(()),
        }
    }

    fn evaluate(&self, d: f64, committed: &SpringState) -> SpringState {
        match *self {
            SpringLaw::Linear { k } => SpringState {
                deformation: d,
                force: k * d,
                tangent: k,
                ..Default::default()
            },
            SpringLaw::Polynomial { k1, k2, k3 } => SpringState {
                deformation: d,
                force: k1 * d + k2 * d * d + k3 * d * d * d,
                tangent: k1 + 2.0 * k2 * d + 3.0 * k3 * d * d,
                ..Default::default()
            },
            SpringLaw::Bilinear { k, b, .. } if b >= 1.0 => SpringLaw::Linear { k }.evaluate(d, committed),
            SpringLaw::Bilinear { k, fy, b } => {
                let h = b * k / (1.0 - b);
                let trial = k * (d - committed.plastic);
                let xi = trial - committed.back_force;
                let overshoot = xi.abs() - fy;
                if overshoot <= 0.0 {
                    SpringState {
                        deformation: d,
                        force: trial,
                        tangent: k,
                        plastic: committed.plastic,
                        back_force: committed.back_force,
                    }
                } else {
                    let dg = overshoot / (k + h);
                    let s = xi.signum();
                    SpringState {
                        deformation: d,
                        force: trial - k * dg * s,
                        tangent: k * h / (k + h),
                        plastic: committed.plastic + dg * s,
                        back_force: committed.back_force + h * dg * s,
                    }
                }
            }
        }
    }
}

/// Spring between two nodes, or between a node and the ground
#[derive(Debug, Clone)]
pub struct Spring {
    tag: usize,
    nodes: Vec<usize>,
    dof: usize,
    law: SpringLaw,
    ndfs: Vec<usize>,
    trial: SpringState,
    committed: SpringState,
}

impl Spring {
    /// Spring with deformation `u_j[dof] - u_i[dof]`
    pub fn new(tag: usize, node_i: usize, node_j: usize, dof: usize, law: SpringLaw) -> Self {
        Self::with_nodes(tag, vec![node_i, node_j], dof, law)
    }

    /// Spring to ground with deformation `u[dof]`
    pub fn grounded(tag: usize, node: usize, dof: usize, law: SpringLaw) -> Self {
        Self::with_nodes(tag, vec![node], dof, law)
    }

    fn with_nodes(tag: usize, nodes: Vec<usize>, dof: usize, law: SpringLaw) -> Self {
        let state = law.evaluate(0.0, &SpringState::default());
        Self {
            tag,
            nodes,
            dof,
            law,
            ndfs: Vec::new(),
            trial: state,
            committed: state,
        }
    }

    pub fn force(&self) -> f64 {
        self.trial.force
    }

    pub fn deformation(&self) -> f64 {
        self.trial.deformation
    }

    /// Deformation-to-dof map
    fn direction(&self) -> DVector<f64> {
        let mut b = DVector::zeros(self.num_dof());
        match self.ndfs.as_slice() {
            [_] => b[self.dof] = 1.0,
            [ndf_i, _] => {
                b[self.dof] = -1.0;
                b[ndf_i + self.dof] = 1.0;
            }
            _ => {}
        }
        b
    }

    fn stiffness(&self, k: f64) -> DMatrix<f64> {
        let b = self.direction();
        &b * b.transpose() * k
    }
}

impl Element for Spring {
    fn tag(&self) -> usize {
        self.tag
    }

    fn connected_nodes(&self) -> &[usize] {
        &self.nodes
    }

    fn set_nodes(&mut self, nodes: &[&Node]) -> AnalysisResult<()> {
        self.law.validate()?;
        if let Some(node) = nodes.iter().find(|n| self.dof >= n.ndf()) {
            return Err(AnalysisError::InvalidInput(format!(
                "spring {} acts on dof {} but node {} has {} dofs",
                self.tag,
                self.dof,
                node.tag(),
                node.ndf()
            )));
        }
        self.ndfs = nodes.iter().map(|n| n.ndf()).collect();
        Ok(())
    }

    fn num_dof(&self) -> usize {
        self.ndfs.iter().sum()
    }

    fn update(&mut self, trial_disp: &DVector<f64>) -> AnalysisResult<()> {
        let d = self.direction().dot(trial_disp);
        if !d.is_finite() {
            return Err(AnalysisError::formulation(
                crate::error::Stage::Update,
                format!("spring {} received a non-finite deformation", self.tag),
            ));
        }
        self.trial = self.law.evaluate(d, &self.committed);
        Ok(())
    }

    fn tangent_stiff(&self) -> DMatrix<f64> {
        self.stiffness(self.trial.tangent)
    }

    fn initial_stiff(&self) -> DMatrix<f64> {
        self.stiffness(self.law.initial_tangent())
    }

    fn committed_stiff(&self) -> DMatrix<f64> {
        self.stiffness(self.committed.tangent)
    }

    fn resisting_force(&self) -> DVector<f64> {
        self.direction() * self.trial.force
    }

    fn commit_state(&mut self) {
        self.committed = self.trial;
    }

    fn revert_to_last_commit(&mut self) {
        self.trial = self.committed;
    }

    fn revert_to_start(&mut self) {
        self.committed = self.law.evaluate(0.0, &SpringState::default());
        self.trial = self.committed;
    }
}
