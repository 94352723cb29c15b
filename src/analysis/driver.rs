//! Pieces shared by the incremental drivers: the owned collaborators and
//! the subdivide-and-retry loop

use log::{debug, info, warn};

use super::algorithm::{IterationReport, SolutionAlgorithm};
use super::convergence::ConvergenceTest;
use super::handler::ConstraintHandler;
use super::integrator::{IncrementalIntegrator, ModelAssembler};
use super::model::AnalysisModel;
use super::numberer::DofNumberer;
use super::options::{AnalysisOptions, SubdivisionPolicy};
use crate::error::{AnalysisError, AnalysisResult};
use crate::soe::LinearSoe;

/// Handler, numberer, system, algorithm and test of one driver
#[derive(Debug)]
pub(crate) struct Pipeline {
    pub handler: ConstraintHandler,
    pub numberer: DofNumberer,
    pub soe: Box<dyn LinearSoe>,
    pub algorithm: Box<dyn SolutionAlgorithm>,
    pub test: ConvergenceTest,
    pub subdivision: SubdivisionPolicy,
}

impl Pipeline {
    pub fn from_options(options: &AnalysisOptions) -> Self {
        Self {
            handler: options.handler,
            numberer: options.numberer,
            soe: options.system.build(),
            algorithm: options.algorithm.build(),
            test: options.test.clone(),
            subdivision: options.subdivision,
        }
    }

    /// Re-handle, renumber and resize when the domain changed.
    /// Returns whether anything was rebuilt.
    pub fn ensure_numbered(
        &mut self,
        model: &mut AnalysisModel,
        integrator: &mut dyn IncrementalIntegrator,
    ) -> AnalysisResult<bool> {
        if !self.handler.keeps_definiteness() && self.soe.requires_spd() {
            return Err(AnalysisError::Configuration(format!(
                "{:?} handler makes the system indefinite; the linear system needs a positive definite matrix",
                self.handler
            )));
        }
        if !model.domain_changed() {
            return Ok(false);
        }
        let to_number = self.handler.handle(model)?;
        let n = self.numberer.number(model)?;
        self.soe.set_size(&model.equation_graph())?;
        integrator.domain_changed(model)?;
        self.algorithm.domain_changed();
        info!(
            "equations rebuilt: {} dofs numbered into {} equations ({:?}, {:?})",
            to_number, n, self.handler, self.numberer
        );
        Ok(true)
    }

    /// Iterate the current step to convergence
    pub fn solve(
        &mut self,
        model: &mut AnalysisModel,
        integrator: &mut dyn IncrementalIntegrator,
    ) -> AnalysisResult<IterationReport> {
        let mut system = ModelAssembler::new(model, integrator);
        self.algorithm
            .solve_step(&mut system, self.soe.as_mut(), &mut self.test)
    }
}

/// Iterations and splits accumulated over the sub-steps of one step
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct StepTally {
    pub iterations: usize,
    pub tangent_formations: usize,
    pub subdivisions: usize,
    pub norms: Vec<f64>,
    /// Iterations of the last sub-step alone
    pub last_iterations: usize,
}

impl StepTally {
    fn from_report(report: IterationReport) -> Self {
        Self {
            iterations: report.iterations,
            tangent_formations: report.tangent_formations,
            subdivisions: 0,
            last_iterations: report.iterations,
            norms: report.norms,
        }
    }

    fn absorb(&mut self, other: StepTally) {
        self.iterations += other.iterations;
        self.tangent_formations += other.tangent_formations;
        self.subdivisions += other.subdivisions;
        self.last_iterations = other.last_iterations;
        self.norms = other.norms;
    }
}

/// Run `attempt(scale)`; when it fails with a retryable error, replace it by
/// `policy.sub_steps()` attempts of `scale / sub_steps`, recursing up to
/// `policy.max_subdivisions` levels.
///
/// `attempt` must leave the model at its last commit when it fails and
/// commit when it succeeds.
pub(crate) fn with_subdivision<F>(
    policy: &SubdivisionPolicy,
    scale: f64,
    depth: usize,
    attempt: &mut F,
) -> AnalysisResult<StepTally>
where
    F: FnMut(f64) -> AnalysisResult<IterationReport>,
{
    match attempt(scale) {
        Ok(report) => Ok(StepTally::from_report(report)),
        Err(e) if e.is_retryable() && depth < policy.max_subdivisions => {
            let n = policy.sub_steps();
            warn!(
                "step at scale {:.4} failed during {} ({}); retrying as {} sub-steps",
                scale,
                e.stage(),
                e,
                n
            );
            let mut tally = StepTally {
                subdivisions: 1,
                ..StepTally::default()
            };
            for i in 0..n {
                debug!("sub-step {}/{} at depth {}", i + 1, n, depth + 1);
                let sub = with_subdivision(policy, scale / n as f64, depth + 1, attempt)?;
                tally.absorb(sub);
            }
            Ok(tally)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(iterations: usize) -> IterationReport {
        IterationReport {
            iterations,
            tangent_formations: 1,
            norms: vec![0.0],
        }
    }

    #[test]
    fn test_success_needs_no_subdivision() {
        let policy = SubdivisionPolicy::default();
        let tally = with_subdivision(&policy, 1.0, 0, &mut |_| Ok(report(3))).unwrap();
        assert_eq!(tally.subdivisions, 0);
        assert_eq!(tally.iterations, 3);
    }

    #[test]
    fn test_failure_above_half_splits_once() {
        let policy = SubdivisionPolicy::new(3, 0.5);
        let mut scales = Vec::new();
        let tally = with_subdivision(&policy, 1.0, 0, &mut |scale| {
            scales.push(scale);
            if scale > 0.6 {
                Err(AnalysisError::Convergence {
                    iterations: 10,
                    norm: 1.0,
                })
            } else {
                Ok(report(2))
            }
        })
        .unwrap();
        assert_eq!(tally.subdivisions, 1);
        assert_eq!(tally.iterations, 4);
        assert_eq!(scales, vec![1.0, 0.5, 0.5]);
    }

    #[test]
    fn test_bounded_depth() {
        let policy = SubdivisionPolicy::new(2, 0.5);
        let mut calls = 0;
        let result = with_subdivision(&policy, 1.0, 0, &mut |_| {
            calls += 1;
            Err(AnalysisError::Solver("singular".into()))
        });
        assert!(matches!(result, Err(AnalysisError::Solver(_))));
        // 1.0 fails, 0.5 fails, 0.25 fails at the depth limit
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_configuration_errors_are_not_retried() {
        let policy = SubdivisionPolicy::default();
        let mut calls = 0;
        let result = with_subdivision(&policy, 1.0, 0, &mut |_| {
            calls += 1;
            Err(AnalysisError::Configuration("bad".into()))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
