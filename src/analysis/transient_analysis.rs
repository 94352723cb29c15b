//! Direct-integration transient driver

use log::{error, info};

use super::algorithm::{AlgorithmKind, IterationReport, SolutionAlgorithm};
use super::convergence::ConvergenceTest;
use super::driver::{with_subdivision, Pipeline};
use super::handler::ConstraintHandler;
use super::integrator::{IncrementalIntegrator, TransientIntegrator};
use super::model::AnalysisModel;
use super::numberer::DofNumberer;
use super::options::{AnalysisOptions, SubdivisionPolicy};
use crate::domain::Domain;
use crate::error::{AnalysisError, AnalysisResult};
use crate::results::{AnalysisReport, FailureSummary, StepReport};
use crate::soe::{LinearSoe, SystemKind};

#[derive(Debug)]
pub struct TransientAnalysis {
    model: AnalysisModel,
    integrator: TransientIntegrator,
    pipeline: Pipeline,
    step: usize,
    /// Time step the algorithm's cached tangent was formed for
    last_dt: Option<f64>,
}

impl TransientAnalysis {
    pub fn new(domain: Domain, integrator: TransientIntegrator) -> Self {
        Self {
            model: AnalysisModel::new(domain),
            integrator,
            pipeline: Pipeline::from_options(&AnalysisOptions::default()),
            step: 0,
            last_dt: None,
        }
    }

    pub fn from_options(
        domain: Domain,
        integrator: TransientIntegrator,
        options: &AnalysisOptions,
    ) -> AnalysisResult<Self> {
        options.validate()?;
        Ok(Self {
            model: AnalysisModel::new(domain),
            integrator,
            pipeline: Pipeline::from_options(options),
            step: 0,
            last_dt: None,
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

    pub fn with_system(mut self, system: SystemKind) -> Self {
        self.pipeline.soe = system.build();
        self
    }

    pub fn with_algorithm(mut self, algorithm: AlgorithmKind) -> Self {
        self.pipeline.algorithm = algorithm.build();
        self
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

    pub fn domain(&self) -> &Domain {
        self.model.domain()
    }

    pub fn domain_mut(&mut self) -> &mut Domain {
        self.model.domain_mut()
    }

    pub fn into_domain(self) -> Domain {
        self.model.into_domain()
    }

    pub fn integrator(&self) -> &TransientIntegrator {
        &self.integrator
    }

    pub fn soe(&self) -> &dyn LinearSoe {
        self.pipeline.soe.as_ref()
    }

    pub fn steps(&self) -> usize {
        self.step
    }

    fn try_step(&mut self, dt: f64) -> AnalysisResult<IterationReport> {
        self.pipeline.ensure_numbered(&mut self.model, &mut self.integrator)?;
        if self.last_dt != Some(dt) {
            // dt enters the system matrix
            self.pipeline.algorithm.domain_changed();
            self.last_dt = Some(dt);
        }
        let t = self.integrator.new_step(&mut self.model, dt)?;
        let report = self.pipeline.solve(&mut self.model, &mut self.integrator)?;
        self.integrator.commit(&mut self.model)?;
        info!(
            "transient step {} converged at t = {:.6} in {} iterations",
            self.step, t, report.iterations
        );
        Ok(report)
    }

    fn attempt(&mut self, dt: f64) -> AnalysisResult<IterationReport> {
        match self.try_step(dt) {
            Ok(report) => Ok(report),
            Err(e) => {
                self.integrator.revert_to_last_step(&mut self.model)?;
                Err(e)
            }
        }
    }

    /// Advance by `dt`, subdividing on retryable failures
    pub fn analyze_step(&mut self, dt: f64) -> AnalysisResult<StepReport> {
        if !(dt > 0.0) {
            return Err(AnalysisError::Configuration(format!("time step must be positive, got {}", dt)));
        }
        let policy = self.pipeline.subdivision;
        policy.validate()?;
        let result = with_subdivision(&policy, 1.0, 0, &mut |scale| self.attempt(dt * scale));
        match result {
            Ok(tally) => {
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
                error!("transient step {} failed during {}: {}", self.step, e.stage(), e);
                Err(e)
            }
        }
    }

    /// Run `num_steps` steps of size `dt`, stopping at the first failure
    pub fn analyze(&mut self, num_steps: usize, dt: f64) -> AnalysisReport {
        let mut report = AnalysisReport::default();
        for _ in 0..num_steps {
            match self.analyze_step(dt) {
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

    pub fn response(&self, node: usize, dof: usize) -> Option<f64> {
        self.model.response(node, dof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::integrator::TransientScheme;
    use crate::domain::Node;
    use crate::elements::{Spring, SpringLaw};
    use approx::assert_relative_eq;

    /// Undamped SDOF with k = m = 1 released from u = 1
    fn oscillator() -> Domain {
        let mut domain = Domain::new();
        domain
            .add_node(Node::new(1, 1, &[0.0]).with_lumped_mass(1.0))
            .unwrap();
        domain
            .add_element(Box::new(Spring::grounded(1, 1, 0, SpringLaw::Linear { k: 1.0 })))
            .unwrap();
        domain
    }

    fn released(domain: Domain, scheme: TransientScheme) -> TransientAnalysis {
        let mut analysis = TransientAnalysis::new(domain, TransientIntegrator::new(scheme));
        let node = analysis.domain_mut().node_mut(1).unwrap();
        node.set_trial_disp_component(0, 1.0);
        // initial acceleration from equilibrium: a = -k u / m
        node.set_trial_accel_component(0, -1.0);
        analysis.domain_mut().commit();
        analysis
    }

    #[test]
    fn test_average_acceleration_tracks_free_vibration() {
        let mut analysis = released(oscillator(), TransientScheme::average_acceleration());
        let dt = 0.01;
        let report = analysis.analyze(100, dt);
        assert!(report.succeeded());
        // period elongation of the trapezoidal rule is O(dt^2)
        assert_relative_eq!(analysis.response(1, 0).unwrap(), 1.0_f64.cos(), epsilon = 1e-4);
        assert_relative_eq!(analysis.domain().committed_time(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_average_acceleration_conserves_energy() {
        let mut analysis = released(oscillator(), TransientScheme::average_acceleration());
        analysis.analyze(237, 0.05);
        let node = analysis.domain().node(1).unwrap();
        let energy = 0.5 * node.committed_disp()[0].powi(2) + 0.5 * node.committed_vel()[0].powi(2);
        assert_relative_eq!(energy, 0.5, epsilon = 1e-10);
    }

    #[test]
    fn test_hht_dissipates() {
        let mut analysis = released(oscillator(), TransientScheme::hht(0.7));
        analysis.analyze(200, 0.5);
        let node = analysis.domain().node(1).unwrap();
        let energy = 0.5 * node.committed_disp()[0].powi(2) + 0.5 * node.committed_vel()[0].powi(2);
        assert!(energy < 0.5);
    }

    /// `|u(1) - cos(1)|` after stepping to `t = 1`
    fn error_at_one(scheme: TransientScheme, dt: f64) -> f64 {
        let mut analysis = released(oscillator(), scheme);
        let steps = (1.0 / dt).round() as usize;
        assert!(analysis.analyze(steps, dt).succeeded());
        (analysis.response(1, 0).unwrap() - 1.0_f64.cos()).abs()
    }

    fn assert_second_order(scheme: TransientScheme) {
        let coarse = error_at_one(scheme, 0.01);
        let fine = error_at_one(scheme, 0.005);
        assert!(coarse < 1e-4, "{:?}: error {:e}", scheme, coarse);
        let ratio = coarse / fine;
        assert!(ratio > 3.5 && ratio < 4.5, "{:?}: error ratio {}", scheme, ratio);
    }

    #[test]
    fn test_generalized_alpha_is_second_order() {
        // spectral radius 0.8 at infinite frequency
        let rho: f64 = 0.8;
        assert_second_order(TransientScheme::generalized_alpha((2.0 - rho) / (1.0 + rho), 1.0 / (1.0 + rho)));
    }

    #[test]
    fn test_generalized_alpha_without_dissipation_is_newmark() {
        let mut newmark = released(oscillator(), TransientScheme::average_acceleration());
        let mut alpha = released(oscillator(), TransientScheme::generalized_alpha(1.0, 1.0));
        newmark.analyze(50, 0.05);
        alpha.analyze(50, 0.05);
        assert_relative_eq!(
            alpha.response(1, 0).unwrap(),
            newmark.response(1, 0).unwrap(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_alpha_os_is_second_order() {
        assert_second_order(TransientScheme::alpha_os(0.9));
    }

    #[test]
    fn test_alpha_os_matches_hht_on_a_linear_model() {
        // the predictor force must include the initial displacement from the first step on
        let mut split = released(oscillator(), TransientScheme::alpha_os(0.9));
        let mut hht = released(oscillator(), TransientScheme::hht(0.9));
        split.analyze_step(0.01).unwrap();
        hht.analyze_step(0.01).unwrap();
        assert_relative_eq!(split.response(1, 0).unwrap(), hht.response(1, 0).unwrap(), epsilon = 1e-12);

        split.analyze(99, 0.01);
        hht.analyze(99, 0.01);
        let (a, b) = (split.domain().node(1).unwrap(), hht.domain().node(1).unwrap());
        assert_relative_eq!(a.committed_disp()[0], b.committed_disp()[0], epsilon = 1e-10);
        assert_relative_eq!(a.committed_vel()[0], b.committed_vel()[0], epsilon = 1e-10);
    }

    #[test]
    fn test_rejects_non_positive_dt() {
        let mut analysis = released(oscillator(), TransientScheme::average_acceleration());
        assert!(matches!(
            analysis.analyze_step(0.0),
            Err(AnalysisError::Configuration(_))
        ));
    }
}
