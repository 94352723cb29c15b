use log::debug;

use super::{solve_increment, IterationReport, IterationState, SolutionAlgorithm};
use crate::analysis::convergence::ConvergenceTest;
use crate::analysis::integrator::SystemAssembler;
use crate::analysis::model::TangentKind;
use crate::error::AnalysisResult;
use crate::soe::LinearSoe;

/// One solve per step, no iteration.
///
/// With `factor_once` the tangent is formed and factored on the first step
/// only and reused until the model is renumbered.
#[derive(Debug, Clone, Default)]
pub struct Linear {
    factor_once: bool,
    factored: bool,
    state: IterationState,
}

impl Linear {
    pub fn new(factor_once: bool) -> Self {
        Self {
            factor_once,
            factored: false,
            state: IterationState::Idle,
        }
    }

    fn step(
        &mut self,
        system: &mut dyn SystemAssembler,
        soe: &mut dyn LinearSoe,
        test: &mut ConvergenceTest,
    ) -> AnalysisResult<IterationReport> {
        let mut tangent_formations = 0;
        if !(self.factor_once && self.factored) {
            system.form_tangent(soe, TangentKind::Current)?;
            tangent_formations += 1;
            self.factored = true;
            self.state = IterationState::TangentFormed;
        }

        system.form_unbalance(soe)?;
        let residual = soe.b().clone();
        test.start(&residual);
        self.state = IterationState::ResidualFormed;

        let dx = solve_increment(soe)?;
        self.state = IterationState::Solved;
        system.update(&dx)?;
        self.state = IterationState::Updated;
        debug!("linear step: |dx| = {:e}", dx.norm());

        Ok(IterationReport {
            iterations: 1,
            tangent_formations,
            norms: vec![dx.norm()],
        })
    }
}

impl SolutionAlgorithm for Linear {
    fn solve_step(
        &mut self,
        system: &mut dyn SystemAssembler,
        soe: &mut dyn LinearSoe,
        test: &mut ConvergenceTest,
    ) -> AnalysisResult<IterationReport> {
        match self.step(system, soe, test) {
            Ok(report) => {
                self.state = IterationState::Converged;
                Ok(report)
            }
            Err(e) => {
                self.state = IterationState::Failed;
                Err(e)
            }
        }
    }

    fn state(&self) -> IterationState {
        self.state
    }

    fn domain_changed(&mut self) {
        self.factored = false;
    }
}
