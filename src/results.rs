//! Result types for analysis runs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Stage};

/// Outcome of one analysis step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    /// Step index, counting from 0
    pub step: usize,
    /// Pseudo-time (load factor) or time the step committed at
    pub time: f64,
    /// Iterations summed over every sub-step
    pub iterations: usize,
    /// Tangent formations summed over every sub-step
    pub tangent_formations: usize,
    /// Times the increment was split before the step went through
    pub subdivisions: usize,
    /// Convergence history of the last sub-step
    pub norms: Vec<f64>,
    /// 0 on success, the failure's status code otherwise
    pub status: i32,
}

impl StepReport {
    pub fn converged(&self) -> bool {
        self.status == 0
    }
}

/// Why an analysis stopped early
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureSummary {
    /// Step that failed
    pub step: usize,
    /// Pipeline stage the failure came from
    pub stage: Stage,
    /// Negative status code
    pub status: i32,
    pub message: String,
}

impl FailureSummary {
    pub fn new(step: usize, error: &AnalysisError) -> Self {
        Self {
            step,
            stage: error.stage(),
            status: error.status_code(),
            message: error.to_string(),
        }
    }
}

/// Outcome of a multi-step run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Every attempted step in order; a failed step is the last entry
    pub steps: Vec<StepReport>,
    /// Set when the run stopped on a failed step
    pub failure: Option<FailureSummary>,
}

impl AnalysisReport {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    /// Number of committed steps
    pub fn committed_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.converged()).count()
    }

    pub fn total_iterations(&self) -> usize {
        self.steps.iter().map(|s| s.iterations).sum()
    }

    pub fn total_subdivisions(&self) -> usize {
        self.steps.iter().map(|s| s.subdivisions).sum()
    }

    /// Status of the run: 0, or the failing step's code
    pub fn status(&self) -> i32 {
        self.failure.as_ref().map_or(0, |f| f.status)
    }
}

/// Participation of one mode along one translational direction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModeParticipation {
    /// `phi^T M r` with unit-mass-normalized `phi`
    pub factor: f64,
    /// `factor^2`
    pub effective_mass: f64,
    /// Effective mass over the total mass of the direction
    pub mass_ratio: f64,
    /// Running sum of `mass_ratio` up to and including this mode
    pub cumulative_ratio: f64,
}

/// Natural modes of a model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModalResults {
    /// Eigenvalues `omega^2`, ascending
    pub eigenvalues: Vec<f64>,
    /// Circular frequencies (rad/s)
    pub angular_frequencies: Vec<f64>,
    /// Frequencies (Hz)
    pub frequencies: Vec<f64>,
    /// Periods (s)
    pub periods: Vec<f64>,
    /// Total mass per direction, `r^T M r`
    pub total_mass: Vec<f64>,
    /// `participation[direction][mode]`
    pub participation: Vec<Vec<ModeParticipation>>,
    /// Mode shapes per node tag
    pub mode_shapes: BTreeMap<usize, Vec<Vec<f64>>>,
}

impl ModalResults {
    pub fn num_modes(&self) -> usize {
        self.eigenvalues.len()
    }

    /// Fundamental period, if any mode was found
    pub fn fundamental_period(&self) -> Option<f64> {
        self.periods.first().copied()
    }
}

/// Linear buckling load factors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BucklingResults {
    /// Positive load factors relative to the reference load, ascending
    pub load_factors: Vec<f64>,
    /// Buckled shapes per node tag, one entry per load factor
    pub mode_shapes: BTreeMap<usize, Vec<Vec<f64>>>,
}

impl BucklingResults {
    /// Lowest critical load factor
    pub fn critical(&self) -> Option<f64> {
        self.load_factors.first().copied()
    }
}
