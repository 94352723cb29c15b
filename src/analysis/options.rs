//! Analysis options

use serde::{Deserialize, Serialize};

use super::algorithm::AlgorithmKind;
use super::convergence::ConvergenceTest;
use super::handler::ConstraintHandler;
use super::numberer::DofNumberer;
use crate::eigen::EigenSystemKind;
use crate::error::{AnalysisError, AnalysisResult};
use crate::soe::SystemKind;

/// Step retry policy applied by the drivers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubdivisionPolicy {
    /// Nesting depth of splits before a step is given up; 0 disables retries
    pub max_subdivisions: usize,
    /// Fraction of the failed increment each sub-step takes
    pub reduction_factor: f64,
}

impl Default for SubdivisionPolicy {
    fn default() -> Self {
        Self {
            max_subdivisions: 4,
            reduction_factor: 0.5,
        }
    }
}

impl SubdivisionPolicy {
    pub fn none() -> Self {
        Self {
            max_subdivisions: 0,
            reduction_factor: 0.5,
        }
    }

    pub fn new(max_subdivisions: usize, reduction_factor: f64) -> Self {
        Self {
            max_subdivisions,
            reduction_factor,
        }
    }

    /// Sub-steps replacing one failed step
    pub fn sub_steps(&self) -> usize {
        (1.0 / self.reduction_factor).round().max(2.0) as usize
    }

    pub fn validate(&self) -> AnalysisResult<()> {
        if !(self.reduction_factor > 0.0 && self.reduction_factor < 1.0) {
            return Err(AnalysisError::Configuration(format!(
                "reduction factor must lie in (0, 1), got {}",
                self.reduction_factor
            )));
        }
        Ok(())
    }
}

/// Options for an analysis
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisOptions {
    /// Constraint enforcement
    pub handler: ConstraintHandler,
    /// Equation numbering
    pub numberer: DofNumberer,
    /// Linear system storage and solver
    pub system: SystemKind,
    /// Eigen solver for modal and buckling runs
    pub eigen_system: EigenSystemKind,
    /// Iteration scheme
    pub algorithm: AlgorithmKind,
    /// Acceptance test
    pub test: ConvergenceTest,
    /// Retry policy on failed steps
    pub subdivision: SubdivisionPolicy,
}

impl AnalysisOptions {
    /// Linear algorithm, no retries
    pub fn linear() -> Self {
        Self {
            algorithm: AlgorithmKind::Linear { factor_once: false },
            subdivision: SubdivisionPolicy::none(),
            ..Self::default()
        }
    }

    pub fn with_handler(mut self, handler: ConstraintHandler) -> Self {
        self.handler = handler;
        self
    }

    pub fn with_numberer(mut self, numberer: DofNumberer) -> Self {
        self.numberer = numberer;
        self
    }

    pub fn with_system(mut self, system: SystemKind) -> Self {
        self.system = system;
        self
    }

    pub fn with_eigen_system(mut self, eigen_system: EigenSystemKind) -> Self {
        self.eigen_system = eigen_system;
        self
    }

    pub fn with_algorithm(mut self, algorithm: AlgorithmKind) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_test(mut self, test: ConvergenceTest) -> Self {
        self.test = test;
        self
    }

    pub fn with_subdivision(mut self, subdivision: SubdivisionPolicy) -> Self {
        self.subdivision = subdivision;
        self
    }

    /// Reject combinations that cannot work
    pub fn validate(&self) -> AnalysisResult<()> {
        self.subdivision.validate()?;
        if !self.handler.keeps_definiteness() && self.system.requires_spd() {
            return Err(AnalysisError::Configuration(format!(
                "{:?} handler makes the system indefinite; {:?} needs a positive definite matrix",
                self.handler, self.system
            )));
        }
        if self.test.max_iterations == 0 {
            return Err(AnalysisError::Configuration(
                "convergence test needs at least one iteration".to_string(),
            ));
        }
        Ok(())
    }

    /// Read options from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> AnalysisResult<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn to_json(&self) -> AnalysisResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::convergence::TestKind;

    #[test]
    fn test_defaults() {
        let options = AnalysisOptions::default();
        assert_eq!(options.handler, ConstraintHandler::Plain);
        assert_eq!(options.system, SystemKind::ProfileSpd);
        assert_eq!(options.test.kind, TestKind::NormUnbalance);
        assert_eq!(options.subdivision.sub_steps(), 2);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let options = AnalysisOptions::from_json(
            r#"{ "system": "FullGeneral", "subdivision": { "max_subdivisions": 2, "reduction_factor": 0.25 } }"#,
        )
        .unwrap();
        assert_eq!(options.system, SystemKind::FullGeneral);
        assert_eq!(options.subdivision.sub_steps(), 4);
        assert_eq!(options.numberer, DofNumberer::ReverseCuthillMckee);
    }

    #[test]
    fn test_lagrange_with_spd_system_is_rejected() {
        let options = AnalysisOptions::default().with_handler(ConstraintHandler::Lagrange {
            alpha_sp: 1.0,
            alpha_mp: 1.0,
        });
        assert!(matches!(options.validate(), Err(AnalysisError::Configuration(_))));
        assert!(options.with_system(SystemKind::FullGeneral).validate().is_ok());
    }

    #[test]
    fn test_bad_reduction_factor() {
        let options = AnalysisOptions::default().with_subdivision(SubdivisionPolicy::new(3, 1.5));
        assert!(options.validate().is_err());
    }
}
