//! Per-iteration acceptance tests

use log::{debug, info};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// Quantity a convergence test measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestKind {
    /// Norm of the solved increment
    NormDispIncr,
    /// Norm of the residual after the update
    NormUnbalance,
    /// `0.5 * |dx . R|` with the residual the increment was solved against
    EnergyIncr,
    RelativeNormDispIncr,
    RelativeNormUnbalance,
    RelativeEnergyIncr,
}

impl TestKind {
    pub fn is_relative(&self) -> bool {
        matches!(
            self,
            TestKind::RelativeNormDispIncr
                | TestKind::RelativeNormUnbalance
                | TestKind::RelativeEnergyIncr
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NormType {
    #[default]
    Euclidean,
    Max,
}

impl NormType {
    pub fn norm(&self, v: &DVector<f64>) -> f64 {
        match self {
            NormType::Euclidean => v.norm(),
            NormType::Max => v.amax(),
        }
    }
}

/// Result of one `test` call
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TestOutcome {
    Continue,
    Converged { iterations: usize },
    Failed { iterations: usize, norm: f64 },
}

/// Below this fraction of the step's initial unbalance the trial state is in
/// equilibrium to round-off
const EXACT_EQUILIBRIUM: f64 = 1e-12;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvergenceTest {
    pub kind: TestKind,
    pub tol: f64,
    pub max_iterations: usize,
    #[serde(default)]
    pub norm_type: NormType,
    /// Log every iteration at info level instead of debug
    #[serde(default)]
    pub print: bool,
    #[serde(skip)]
    history: Vec<f64>,
    #[serde(skip)]
    reference: Option<f64>,
    #[serde(skip)]
    initial_unbalance: f64,
}

impl Default for ConvergenceTest {
    fn default() -> Self {
        Self::new(TestKind::NormUnbalance, 1e-8, 25)
    }
}

impl ConvergenceTest {
    pub fn new(kind: TestKind, tol: f64, max_iterations: usize) -> Self {
        Self {
            kind,
            tol,
            max_iterations,
            norm_type: NormType::Euclidean,
            print: false,
            history: Vec::new(),
            reference: None,
            initial_unbalance: 0.0,
        }
    }

    pub fn with_norm(mut self, norm_type: NormType) -> Self {
        self.norm_type = norm_type;
        self
    }

    pub fn with_print(mut self, print: bool) -> Self {
        self.print = print;
        self
    }

    /// Reset for a new step given the step's first residual
    pub fn start(&mut self, initial_residual: &DVector<f64>) {
        self.history.clear();
        self.reference = None;
        self.initial_unbalance = initial_residual.norm();
    }

    /// Norms recorded since `start`
    pub fn history(&self) -> &[f64] {
        &self.history
    }

    pub fn take_history(&mut self) -> Vec<f64> {
        std::mem::take(&mut self.history)
    }

    pub fn iterations(&self) -> usize {
        self.history.len()
    }

    /// Judge one iteration.
    ///
    /// `increment` is the solved correction, `solved_residual` the residual it
    /// was solved against and `residual` the residual of the updated state.
    pub fn test(
        &mut self,
        increment: &DVector<f64>,
        solved_residual: &DVector<f64>,
        residual: &DVector<f64>,
    ) -> TestOutcome {
        let raw = match self.kind {
            TestKind::NormDispIncr | TestKind::RelativeNormDispIncr => self.norm_type.norm(increment),
            TestKind::NormUnbalance | TestKind::RelativeNormUnbalance => self.norm_type.norm(residual),
            TestKind::EnergyIncr | TestKind::RelativeEnergyIncr => {
                0.5 * increment.dot(solved_residual).abs()
            }
        };
        let value = if self.kind.is_relative() {
            let reference = *self.reference.get_or_insert(raw);
            if reference > 0.0 {
                raw / reference
            } else {
                0.0
            }
        } else {
            raw
        };
        self.history.push(value);
        let iterations = self.history.len();

        if self.print {
            info!("{:?} iteration {}: {:e} (tol {:e})", self.kind, iterations, value, self.tol);
        } else {
            debug!("{:?} iteration {}: {:e} (tol {:e})", self.kind, iterations, value, self.tol);
        }

        // a vanished unbalance is equilibrium whatever the measure
        let floor = EXACT_EQUILIBRIUM * self.initial_unbalance.max(f64::MIN_POSITIVE);
        let exact = residual.norm() <= floor;

        // relative measures compare against their first value, so the first
        // iteration can only converge through the exact-equilibrium floor
        let within = if self.kind.is_relative() && iterations == 1 {
            false
        } else {
            value <= self.tol
        };

        if within || exact {
            TestOutcome::Converged { iterations }
        } else if iterations >= self.max_iterations {
            TestOutcome::Failed {
                iterations,
                norm: value,
            }
        } else {
            TestOutcome::Continue
        }
    }
}
