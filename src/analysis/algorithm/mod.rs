//! Solution algorithms - the iteration loop of one step
//!
//! Every algorithm walks the same states: form the tangent, form the
//! residual, solve, update, test. The residual tested is the one of the
//! updated trial state, and it is the right-hand side of the next iteration.

mod line_search;
mod linear;
mod newton;
mod quasi_newton;

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use super::convergence::{ConvergenceTest, TestOutcome};
use super::integrator::SystemAssembler;
use crate::error::{AnalysisError, AnalysisResult};
use crate::soe::LinearSoe;

pub use line_search::{LineSearch, LineSearchMethod};
pub use linear::Linear;
pub use newton::{NewtonRaphson, TangentPolicy};
pub use quasi_newton::{QuasiNewton, SecantUpdate};

/// Where an algorithm is in its iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IterationState {
    #[default]
    Idle,
    TangentFormed,
    ResidualFormed,
    Solved,
    Updated,
    Tested,
    Converged,
    Iterate,
    Failed,
}

/// Summary of one solved step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IterationReport {
    pub iterations: usize,
    pub tangent_formations: usize,
    /// Convergence test history of the step
    pub norms: Vec<f64>,
}

pub trait SolutionAlgorithm: std::fmt::Debug + Send {
    /// Iterate the current step to convergence
    fn solve_step(
        &mut self,
        system: &mut dyn SystemAssembler,
        soe: &mut dyn LinearSoe,
        test: &mut ConvergenceTest,
    ) -> AnalysisResult<IterationReport>;

    fn state(&self) -> IterationState;

    /// Forget anything tied to the previous equation numbering
    fn domain_changed(&mut self) {}
}

/// Selectable algorithm
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AlgorithmKind {
    Linear {
        factor_once: bool,
    },
    NewtonRaphson {
        policy: TangentPolicy,
        line_search: Option<LineSearch>,
    },
    QuasiNewton {
        update: SecantUpdate,
        count: usize,
        line_search: Option<LineSearch>,
    },
}

impl Default for AlgorithmKind {
    fn default() -> Self {
        AlgorithmKind::NewtonRaphson {
            policy: TangentPolicy::EveryIteration,
            line_search: None,
        }
    }
}

impl AlgorithmKind {
    pub fn build(&self) -> Box<dyn SolutionAlgorithm> {
        match *self {
            AlgorithmKind::Linear { factor_once } => Box::new(Linear::new(factor_once)),
            AlgorithmKind::NewtonRaphson {
                policy,
                line_search,
            } => Box::new(NewtonRaphson::new(policy).with_line_search(line_search)),
            AlgorithmKind::QuasiNewton {
                update,
                count,
                line_search,
            } => Box::new(QuasiNewton::new(update, count).with_line_search(line_search)),
        }
    }
}

/// Solve, rejecting non-finite increments
fn solve_increment(soe: &mut dyn LinearSoe) -> AnalysisResult<DVector<f64>> {
    soe.solve()?;
    let dx = soe.x().clone();
    if dx.iter().any(|v| !v.is_finite()) {
        return Err(AnalysisError::Solver("increment is not finite".to_string()));
    }
    Ok(dx)
}

/// Apply `dx`, optionally through a line search, and form the new residual.
/// Returns the increment actually applied and the new residual.
fn apply_increment(
    system: &mut dyn SystemAssembler,
    soe: &mut dyn LinearSoe,
    dx: &DVector<f64>,
    residual: &DVector<f64>,
    line_search: Option<&LineSearch>,
) -> AnalysisResult<(DVector<f64>, DVector<f64>)> {
    let applied = match line_search {
        Some(ls) => ls.search(system, soe, dx, residual)?,
        None => {
            system.update(dx)?;
            system.form_unbalance(soe)?;
            dx.clone()
        }
    };
    Ok((applied, soe.b().clone()))
}

/// Turn a test outcome into the next state, or a convergence error
fn judge(outcome: TestOutcome) -> AnalysisResult<IterationState> {
    match outcome {
        TestOutcome::Continue => Ok(IterationState::Iterate),
        TestOutcome::Converged { .. } => Ok(IterationState::Converged),
        TestOutcome::Failed { iterations, norm } => Err(AnalysisError::Convergence { iterations, norm }),
    }
}
