//! Secant methods: the tangent factorization of the step start is corrected
//! by low-rank updates built from `(s, y)` pairs, where `s` is an applied
//! increment and `y = R_k - R_{k+1}` the matching drop in residual.

use std::collections::VecDeque;

use log::debug;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use super::{apply_increment, judge, IterationReport, IterationState, LineSearch, SolutionAlgorithm};
use crate::analysis::convergence::ConvergenceTest;
use crate::analysis::integrator::SystemAssembler;
use crate::analysis::model::TangentKind;
use crate::error::{AnalysisError, AnalysisResult};
use crate::soe::LinearSoe;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SecantUpdate {
    /// Limited-memory BFGS, rank two per pair
    #[default]
    Bfgs,
    /// Broyden's inverse update, rank one per pair
    Broyden,
}

/// Pairs whose curvature `y . s` falls below this fraction of `|y| |s|`
/// carry no usable information
const MIN_CURVATURE: f64 = 1e-12;

#[derive(Debug, Clone)]
struct SecantPair {
    s: DVector<f64>,
    y: DVector<f64>,
    /// `1 / (y . s)` for BFGS, unused by Broyden
    rho: f64,
    /// Broyden correction `(s - H y) / (s . H y)`
    u: DVector<f64>,
}

#[derive(Debug, Clone)]
pub struct QuasiNewton {
    update: SecantUpdate,
    /// Pairs kept before the tangent is reformed
    count: usize,
    line_search: Option<LineSearch>,
    history: VecDeque<SecantPair>,
    state: IterationState,
}

impl QuasiNewton {
    pub fn new(update: SecantUpdate, count: usize) -> Self {
        Self {
            update,
            count: count.max(1),
            line_search: None,
            history: VecDeque::new(),
            state: IterationState::Idle,
        }
    }

    pub fn bfgs(count: usize) -> Self {
        Self::new(SecantUpdate::Bfgs, count)
    }

    pub fn broyden(count: usize) -> Self {
        Self::new(SecantUpdate::Broyden, count)
    }

    pub fn with_line_search(mut self, line_search: Option<LineSearch>) -> Self {
        self.line_search = line_search;
        self
    }

    pub fn update_kind(&self) -> SecantUpdate {
        self.update
    }

    /// `K^-1 v` with the factorization held by `soe`
    fn base_solve(soe: &mut dyn LinearSoe, v: &DVector<f64>) -> AnalysisResult<DVector<f64>> {
        soe.set_b(v)?;
        soe.solve()?;
        Ok(soe.x().clone())
    }

    /// Apply the current inverse-tangent approximation to `v`
    fn apply_inverse(&self, soe: &mut dyn LinearSoe, v: &DVector<f64>) -> AnalysisResult<DVector<f64>> {
        match self.update {
            SecantUpdate::Bfgs => {
                // two-loop recursion
                let mut q = v.clone();
                let mut alphas = Vec::with_capacity(self.history.len());
                for pair in self.history.iter().rev() {
                    let alpha = pair.rho * pair.s.dot(&q);
                    q.axpy(-alpha, &pair.y, 1.0);
                    alphas.push(alpha);
                }
                let mut z = Self::base_solve(soe, &q)?;
                for (pair, alpha) in self.history.iter().zip(alphas.iter().rev()) {
                    let beta = pair.rho * pair.y.dot(&z);
                    z.axpy(alpha - beta, &pair.s, 1.0);
                }
                Ok(z)
            }
            SecantUpdate::Broyden => {
                let mut p = Self::base_solve(soe, v)?;
                for pair in &self.history {
                    let coefficient = pair.s.dot(&p);
                    p.axpy(coefficient, &pair.u, 1.0);
                }
                Ok(p)
            }
        }
    }

    /// Record a pair; returns false when it was discarded
    fn push_pair(&mut self, soe: &mut dyn LinearSoe, s: DVector<f64>, y: DVector<f64>) -> AnalysisResult<bool> {
        let scale = s.norm() * y.norm();
        match self.update {
            SecantUpdate::Bfgs => {
                let curvature = y.dot(&s);
                if scale == 0.0 || curvature <= MIN_CURVATURE * scale {
                    return Ok(false);
                }
                self.history.push_back(SecantPair {
                    rho: 1.0 / curvature,
                    u: DVector::zeros(0),
                    s,
                    y,
                });
            }
            SecantUpdate::Broyden => {
                let hy = self.apply_inverse(soe, &y)?;
                let denominator = s.dot(&hy);
                if scale == 0.0 || denominator.abs() <= MIN_CURVATURE * s.norm() * hy.norm() {
                    return Ok(false);
                }
                let u = (&s - &hy) / denominator;
                self.history.push_back(SecantPair { s, y, rho: 0.0, u });
            }
        }
        Ok(true)
    }

    fn iterate(
        &mut self,
        system: &mut dyn SystemAssembler,
        soe: &mut dyn LinearSoe,
        test: &mut ConvergenceTest,
    ) -> AnalysisResult<IterationReport> {
        self.history.clear();
        system.form_tangent(soe, TangentKind::Current)?;
        let mut tangent_formations = 1;
        self.state = IterationState::TangentFormed;

        system.form_unbalance(soe)?;
        let mut residual = soe.b().clone();
        test.start(&residual);
        self.state = IterationState::ResidualFormed;

        let mut iterations = 0;
        loop {
            iterations += 1;
            let dx = self.apply_inverse(soe, &residual)?;
            if dx.iter().any(|v| !v.is_finite()) {
                return Err(AnalysisError::Solver("secant increment is not finite".to_string()));
            }
            self.state = IterationState::Solved;

            let (applied, next) = apply_increment(system, soe, &dx, &residual, self.line_search.as_ref())?;
            self.state = IterationState::Updated;

            let outcome = test.test(&applied, &residual, &next);
            self.state = IterationState::Tested;
            let y = &residual - &next;
            residual = next;

            self.state = judge(outcome)?;
            if self.state == IterationState::Converged {
                break;
            }

            if self.history.len() >= self.count {
                debug!("secant history full after {} pairs, reforming tangent", self.history.len());
                self.history.clear();
                system.form_tangent(soe, TangentKind::Current)?;
                tangent_formations += 1;
            } else if !self.push_pair(soe, applied, y)? {
                debug!("secant pair discarded at iteration {}", iterations);
            }
        }
        debug!(
            "{:?} converged in {} iterations, {} tangents",
            self.update, iterations, tangent_formations
        );

        Ok(IterationReport {
            iterations,
            tangent_formations,
            norms: test.history().to_vec(),
        })
    }
}

impl SolutionAlgorithm for QuasiNewton {
    fn solve_step(
        &mut self,
        system: &mut dyn SystemAssembler,
        soe: &mut dyn LinearSoe,
        test: &mut ConvergenceTest,
    ) -> AnalysisResult<IterationReport> {
        self.iterate(system, soe, test).inspect_err(|_| self.state = IterationState::Failed)
    }

    fn state(&self) -> IterationState {
        self.state
    }

    fn domain_changed(&mut self) {
        self.history.clear();
    }
}
