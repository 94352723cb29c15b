//! Static load-control driver over partition workers

use log::{error, info};

use super::coordinator::Coordinator;
use super::partitioner::Partitioner;
use crate::analysis::{
    with_subdivision, AnalysisOptions, ConstraintHandler, ConvergenceTest, DofNumberer, IterationReport,
    SolutionAlgorithm, SubdivisionPolicy,
};
use crate::domain::Domain;
use crate::error::{AnalysisError, AnalysisResult};
use crate::results::{AnalysisReport, FailureSummary, StepReport};
use crate::soe::LinearSoe;

/// Load-control static analysis whose element work runs on partition
/// workers while the coordinator solves the global system.
///
/// Only the plain constraint handler is supported, and the increment is
/// fixed: there is no adaptive load control across partitions.
#[derive(Debug)]
pub struct DistributedStaticAnalysis {
    coordinator: Coordinator,
    numberer: DofNumberer,
    soe: Box<dyn LinearSoe>,
    algorithm: Box<dyn SolutionAlgorithm>,
    test: ConvergenceTest,
    subdivision: SubdivisionPolicy,
    numbered: bool,
    step: usize,
    /// Load factor of the last commit
    load_factor: f64,
}

impl DistributedStaticAnalysis {
    pub fn new(domain: Domain, partitions: usize, increment: f64) -> AnalysisResult<Self> {
        Self::from_options(domain, partitions, increment, &AnalysisOptions::default())
    }

    pub fn from_options(
        domain: Domain,
        partitions: usize,
        increment: f64,
        options: &AnalysisOptions,
    ) -> AnalysisResult<Self> {
        options.validate()?;
        if options.handler != ConstraintHandler::Plain {
            return Err(AnalysisError::Configuration(format!(
                "distributed analysis needs the plain handler, got {:?}",
                options.handler
            )));
        }
        let coordinator = Coordinator::spawn(domain, &Partitioner::new(partitions), increment)?;
        Ok(Self {
            coordinator,
            numberer: options.numberer,
            soe: options.system.build(),
            algorithm: options.algorithm.build(),
            test: options.test.clone(),
            subdivision: options.subdivision,
            numbered: false,
            step: 0,
            load_factor: 0.0,
        })
    }

    pub fn num_partitions(&self) -> usize {
        self.coordinator.num_partitions()
    }

    pub fn steps(&self) -> usize {
        self.step
    }

    pub fn load_factor(&self) -> f64 {
        self.load_factor
    }

    /// Handle and number all partitions; returns the global equation count
    pub fn initialize(&mut self) -> AnalysisResult<usize> {
        if !self.numbered {
            let graph = self.coordinator.number(&self.numberer)?;
            self.soe.set_size(&graph)?;
            self.algorithm.domain_changed();
            self.numbered = true;
        }
        Ok(self.soe.num_equations())
    }

    fn try_step(&mut self, scale: f64) -> AnalysisResult<IterationReport> {
        self.initialize()?;
        let target = self.coordinator.new_step(scale)?;
        let report = self
            .algorithm
            .solve_step(&mut self.coordinator, self.soe.as_mut(), &mut self.test)?;
        self.coordinator.commit()?;
        self.load_factor = target;
        info!(
            "distributed step {} converged at load factor {:.6} in {} iterations",
            self.step, target, report.iterations
        );
        Ok(report)
    }

    fn attempt(&mut self, scale: f64) -> AnalysisResult<IterationReport> {
        match self.try_step(scale) {
            Ok(report) => Ok(report),
            Err(e) => {
                self.coordinator.revert()?;
                Err(e)
            }
        }
    }

    pub fn analyze_step(&mut self) -> AnalysisResult<StepReport> {
        let policy = self.subdivision;
        policy.validate()?;
        let result = with_subdivision(&policy, 1.0, 0, &mut |scale| self.attempt(scale));
        match result {
            Ok(tally) => {
                let report = StepReport {
                    step: self.step,
                    time: self.load_factor,
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
                error!("distributed step {} failed during {}: {}", self.step, e.stage(), e);
                Err(e)
            }
        }
    }

    /// Run `num_steps` steps, stopping at the first failure
    pub fn analyze(&mut self, num_steps: usize) -> AnalysisReport {
        let mut report = AnalysisReport::default();
        for _ in 0..num_steps {
            match self.analyze_step() {
                Ok(step) => report.steps.push(step),
                Err(e) => {
                    report.steps.push(StepReport {
                        step: self.step,
                        time: self.load_factor,
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

    pub fn response(&self, node: usize, dof: usize) -> Option<f64> {
        self.coordinator.response(node, dof)
    }
}
