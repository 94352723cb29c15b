//! Static load-stepping driver

use log::{error, info};

use super::algorithm::{AlgorithmKind, IterationReport, SolutionAlgorithm};
use super::convergence::ConvergenceTest;
use super::driver::{with_subdivision, Pipeline};
use super::handler::ConstraintHandler;
use super::integrator::{IncrementalIntegrator, StaticIntegrator};
use super::model::AnalysisModel;
use super::numberer::DofNumberer;
use super::options::{AnalysisOptions, SubdivisionPolicy};
use crate::domain::Domain;
use crate::error::AnalysisResult;
use crate::results::{AnalysisReport, FailureSummary, StepReport};
use crate::soe::{LinearSoe, SystemKind};

/// Steps a model through static load (or displacement) increments
#[derive(Debug)]
pub struct StaticAnalysis {
    model: AnalysisModel,
    integrator: StaticIntegrator,
    pipeline: Pipeline,
    step: usize,
}

impl StaticAnalysis {
    /// Driver with default options
    pub fn new(domain: Domain, integrator: StaticIntegrator) -> Self {
        Self {
            model: AnalysisModel::new(domain),
            integrator,
            pipeline: Pipeline::from_options(&AnalysisOptions::default()),
            step: 0,
        }
    }

    pub fn from_options(
        domain: Domain,
        integrator: StaticIntegrator,
        options: &AnalysisOptions,
    ) -> AnalysisResult<Self> {
        options.validate()?;
        Ok(Self {
            model: AnalysisModel::new(domain),
            integrator,
            pipeline: Pipeline::from_options(options),
            step: 0,
        })
    }

    pub fn with_handler(mut self, handler: ConstraintHandler) -> Self {
        self.pipeline.handler = handler;
        self
    }

    pub fn with_numberer(mut self, numberer: DofNumberer) -> Self {
        self.pipeline.numberer = numberer;
        self
    }

    pub fn with_system(self, system: SystemKind) -> Self {
        self.with_soe(system.build())
    }

    /// Use a caller-built system of equations
    pub fn with_soe(mut self, soe: Box<dyn LinearSoe>) -> Self {
        self.pipeline.soe = soe;
        self
    }

    pub fn with_algorithm(self, algorithm: AlgorithmKind) -> Self {
        self.with_solution_algorithm(algorithm.build())
    }

    pub fn with_solution_algorithm(mut self, algorithm: Box<dyn SolutionAlgorithm>) -> Self {
        self.pipeline.algorithm = algorithm;
        self
    }

    pub fn with_test(mut self, test: ConvergenceTest) -> Self {
        self.pipeline.test = test;
        self
    }

    pub fn with_subdivision(mut self, subdivision: SubdivisionPolicy) -> Self {
        self.pipeline.subdivision = subdivision;
        self
    }

    pub fn model(&self) -> &AnalysisModel {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut AnalysisModel {
        &mut self.model
    }

    pub fn domain(&self) -> &Domain {
        self.model.domain()
    }

    /// Topology edits made here are picked up by the next step
    pub fn domain_mut(&mut self) -> &mut Domain {
        self.model.domain_mut()
    }

    pub fn into_model(self) -> AnalysisModel {
        self.model
    }

    pub fn into_domain(self) -> Domain {
        self.model.into_domain()
    }

    pub fn integrator(&self) -> &StaticIntegrator {
        &self.integrator
    }

    pub fn soe(&self) -> &dyn LinearSoe {
        self.pipeline.soe.as_ref()
    }

    pub fn test(&self) -> &ConvergenceTest {
        &self.pipeline.test
    }

    /// Steps committed so far
    pub fn steps(&self) -> usize {
        self.step
    }

    /// Handle and number the model without stepping; returns the equation count
    pub fn initialize(&mut self) -> AnalysisResult<usize> {
        self.pipeline.ensure_numbered(&mut self.model, &mut self.integrator)?;
        Ok(self.model.num_equations())
    }

    fn try_step(&mut self, scale: f64) -> AnalysisResult<IterationReport> {
        self.pipeline.ensure_numbered(&mut self.model, &mut self.integrator)?;
        let target = self
            .integrator
            .new_step(&mut self.model, self.pipeline.soe.as_mut(), scale)?;
        let report = self.pipeline.solve(&mut self.model, &mut self.integrator)?;
        self.integrator.commit(&mut self.model)?;
        info!(
            "static step {} converged at load factor {:.6} (target {:.6}) in {} iterations",
            self.step,
            self.model.domain().committed_time(),
            target,
            report.iterations
        );
        Ok(report)
    }

    fn attempt(&mut self, scale: f64) -> AnalysisResult<IterationReport> {
        match self.try_step(scale) {
            Ok(report) => Ok(report),
            Err(e) => {
                self.integrator.revert_to_last_step(&mut self.model)?;
                Err(e)
            }
        }
    }

    /// Advance one increment, subdividing on retryable failures
    pub fn analyze_step(&mut self) -> AnalysisResult<StepReport> {
        let policy = self.pipeline.subdivision;
        policy.validate()?;
        let result = with_subdivision(&policy, 1.0, 0, &mut |scale| self.attempt(scale));
        match result {
            Ok(tally) => {
                if tally.subdivisions == 0 {
                    self.integrator.adapt_increment(tally.last_iterations);
                }
                let report = StepReport {
                    step: self.step,
                    time: self.model.domain().committed_time(),
                    iterations: tally.iterations,
                    tangent_formations: tally.tangent_formations,
                    subdivisions: tally.subdivisions,
                    norms: tally.norms,
                    status: 0,
                };
                self.step += 1;
                Ok(report)
            }
            Err(e) => {
                error!("static step {} failed during {}: {}", self.step, e.stage(), e);
                Err(e)
            }
        }
    }

    /// Run `num_steps` steps, stopping at the first failure. Steps committed
    /// before the failure stay committed.
    pub fn analyze(&mut self, num_steps: usize) -> AnalysisReport {
        let mut report = AnalysisReport::default();
        for _ in 0..num_steps {
            match self.analyze_step() {
                Ok(step) => report.steps.push(step),
                Err(e) => {
                    report.steps.push(StepReport {
                        step: self.step,
                        time: self.model.domain().committed_time(),
                        status: e.status_code(),
                        ..StepReport::default()
                    });
                    report.failure = Some(FailureSummary::new(self.step, &e));
                    break;
                }
            }
        }
        report
    }

    /// Trial displacement of a node dof
    pub fn response(&self, node: usize, dof: usize) -> Option<f64> {
        self.model.response(node, dof)
    }
}
