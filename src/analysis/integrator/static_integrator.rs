//! Static integrators: load control and displacement control

use log::debug;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use super::{assemble_static_unbalance, assemble_stiffness, IncrementalIntegrator};
use crate::analysis::model::{AnalysisModel, TangentKind};
use crate::error::{AnalysisError, AnalysisResult, Stage};
use crate::soe::LinearSoe;

/// How the load factor advances per step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum StaticScheme {
    /// Advance the load factor by `increment`, scaled by
    /// `desired_iterations / last_iterations` after each step when
    /// `desired_iterations > 0`
    LoadControl {
        increment: f64,
        desired_iterations: usize,
        min_increment: f64,
        max_increment: f64,
    },
    /// Advance the displacement of one node dof by `increment`; the load
    /// factor becomes an unknown
    DisplacementControl {
        node: usize,
        dof: usize,
        increment: f64,
        desired_iterations: usize,
        min_increment: f64,
        max_increment: f64,
    },
}

impl StaticScheme {
    pub fn load_control(increment: f64) -> Self {
        StaticScheme::LoadControl {
            increment,
            desired_iterations: 0,
            min_increment: increment,
            max_increment: increment,
        }
    }

    pub fn displacement_control(node: usize, dof: usize, increment: f64) -> Self {
        StaticScheme::DisplacementControl {
            node,
            dof,
            increment,
            desired_iterations: 0,
            min_increment: increment,
            max_increment: increment,
        }
    }

    /// Adapt the increment toward `desired_iterations`, bounded by `[min, max]`
    pub fn adaptive(self, desired_iterations: usize, min_increment: f64, max_increment: f64) -> Self {
        match self {
            StaticScheme::LoadControl { increment, .. } => StaticScheme::LoadControl {
                increment,
                desired_iterations,
                min_increment,
                max_increment,
            },
            StaticScheme::DisplacementControl {
                node, dof, increment, ..
            } => StaticScheme::DisplacementControl {
                node,
                dof,
                increment,
                desired_iterations,
                min_increment,
                max_increment,
            },
        }
    }

    fn increment(&self) -> f64 {
        match *self {
            StaticScheme::LoadControl { increment, .. }
            | StaticScheme::DisplacementControl { increment, .. } => increment,
        }
    }

    fn bounds(&self) -> (usize, f64, f64) {
        match *self {
            StaticScheme::LoadControl {
                desired_iterations,
                min_increment,
                max_increment,
                ..
            }
            | StaticScheme::DisplacementControl {
                desired_iterations,
                min_increment,
                max_increment,
                ..
            } => (desired_iterations, min_increment, max_increment),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StaticIntegrator {
    scheme: StaticScheme,
    current_increment: f64,
    /// Equation of the controlled dof
    control_eq: Option<usize>,
    /// Reference load pattern `P(1) - P(0)`
    p_ref: DVector<f64>,
    /// Tangent response to `p_ref`
    du_ref: DVector<f64>,
}

impl StaticIntegrator {
    pub fn new(scheme: StaticScheme) -> Self {
        Self {
            current_increment: scheme.increment(),
            scheme,
            control_eq: None,
            p_ref: DVector::zeros(0),
            du_ref: DVector::zeros(0),
        }
    }

    pub fn load_control(increment: f64) -> Self {
        Self::new(StaticScheme::load_control(increment))
    }

    pub fn displacement_control(node: usize, dof: usize, increment: f64) -> Self {
        Self::new(StaticScheme::displacement_control(node, dof, increment))
    }

    pub fn scheme(&self) -> &StaticScheme {
        &self.scheme
    }

    pub fn current_increment(&self) -> f64 {
        self.current_increment
    }

    /// Start a step with `scale` times the current increment.
    /// Returns the load factor the step aims for.
    pub fn new_step(
        &mut self,
        model: &mut AnalysisModel,
        soe: &mut dyn LinearSoe,
        scale: f64,
    ) -> AnalysisResult<f64> {
        let increment = self.current_increment * scale;
        let lambda = model.domain().committed_time();
        match self.scheme {
            StaticScheme::LoadControl { .. } => {
                model.apply_load(lambda + increment)?;
                Ok(lambda + increment)
            }
            StaticScheme::DisplacementControl { .. } => {
                let eq = self.control_eq()?;
                model.apply_load(lambda)?;
                self.form_tangent(model, soe, TangentKind::Current)?;
                let d_lambda = increment / self.du_ref[eq];
                let du = &self.du_ref * d_lambda;
                model.increment_trial_disp(&du);
                model.apply_load(lambda + d_lambda)?;
                debug!("displacement control predictor: dlambda {:e}", d_lambda);
                Ok(lambda + d_lambda)
            }
        }
    }

    /// Adapt the increment after a converged step
    pub fn adapt_increment(&mut self, iterations: usize) {
        let (desired, min, max) = self.scheme.bounds();
        if desired == 0 || iterations == 0 {
            return;
        }
        let scaled = self.current_increment * desired as f64 / iterations as f64;
        let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
        self.current_increment = if self.current_increment >= 0.0 {
            scaled.clamp(lo.abs(), hi.abs())
        } else {
            -(scaled.abs().clamp(lo.abs(), hi.abs()))
        };
        debug!("static increment adapted to {:e}", self.current_increment);
    }

    fn control_eq(&self) -> AnalysisResult<usize> {
        self.control_eq.ok_or_else(|| {
            AnalysisError::Configuration("displacement control has no equation".to_string())
        })
    }
}

impl IncrementalIntegrator for StaticIntegrator {
    fn domain_changed(&mut self, model: &AnalysisModel) -> AnalysisResult<()> {
        if let StaticScheme::DisplacementControl { node, dof, .. } = self.scheme {
            let group = model.node_group(node).ok_or(AnalysisError::NodeNotFound(node))?;
            let id = model.dof_groups()[group]
                .ids()
                .get(dof)
                .copied()
                .ok_or_else(|| {
                    AnalysisError::Configuration(format!("node {} has no dof {}", node, dof))
                })?;
            if id < 0 {
                return Err(AnalysisError::Configuration(format!(
                    "controlled dof {} of node {} is constrained",
                    dof, node
                )));
            }
            self.control_eq = Some(id as usize);
            self.p_ref = model.load_vector_at(1.0) - model.load_vector_at(0.0);
            if self.p_ref.iter().all(|v| *v == 0.0) {
                return Err(AnalysisError::Configuration(
                    "displacement control needs a reference load".to_string(),
                ));
            }
            self.du_ref = DVector::zeros(model.num_equations());
        }
        Ok(())
    }

    fn form_tangent(
        &mut self,
        model: &AnalysisModel,
        soe: &mut dyn LinearSoe,
        kind: TangentKind,
    ) -> AnalysisResult<()> {
        soe.zero_a();
        assemble_stiffness(model, soe, kind, 1.0)?;
        if let StaticScheme::DisplacementControl { .. } = self.scheme {
            let eq = self.control_eq()?;
            let saved = soe.b().clone();
            soe.set_b(&self.p_ref)?;
            soe.solve()?;
            self.du_ref = soe.x().clone();
            soe.set_b(&saved)?;
            if self.du_ref[eq].abs() < f64::EPSILON * self.du_ref.amax().max(f64::MIN_POSITIVE) {
                return Err(AnalysisError::formulation(
                    Stage::Tangent,
                    "reference load does not move the controlled dof",
                ));
            }
        }
        Ok(())
    }

    fn form_unbalance(&mut self, model: &AnalysisModel, soe: &mut dyn LinearSoe) -> AnalysisResult<()> {
        assemble_static_unbalance(model, soe)
    }

    fn update(&mut self, model: &mut AnalysisModel, dx: &DVector<f64>) -> AnalysisResult<()> {
        match self.scheme {
            StaticScheme::LoadControl { .. } => {
                model.increment_trial_disp(dx);
                model.update_domain()
            }
            StaticScheme::DisplacementControl { .. } => {
                let eq = self.control_eq()?;
                let d_lambda = -dx[eq] / self.du_ref[eq];
                let du = dx + &self.du_ref * d_lambda;
                model.increment_trial_disp(&du);
                let lambda = model.domain().current_time() + d_lambda;
                model.apply_load(lambda)
            }
        }
    }

    fn commit(&mut self, model: &mut AnalysisModel) -> AnalysisResult<()> {
        model.commit()
    }

    fn revert_to_last_step(&mut self, model: &mut AnalysisModel) -> AnalysisResult<()> {
        model.revert_to_last_commit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adaptive_increment_is_bounded() {
        let mut integrator = StaticIntegrator::new(StaticScheme::load_control(0.1).adaptive(4, 0.05, 0.2));
        integrator.adapt_increment(2);
        assert!((integrator.current_increment() - 0.2).abs() < 1e-12);
        integrator.adapt_increment(16);
        assert!((integrator.current_increment() - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_fixed_increment_is_kept() {
        let mut integrator = StaticIntegrator::load_control(0.25);
        integrator.adapt_increment(7);
        assert_eq!(integrator.current_increment(), 0.25);
    }
}
