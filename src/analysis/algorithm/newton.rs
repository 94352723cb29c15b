use log::debug;
use serde::{Deserialize, Serialize};

use super::{apply_increment, judge, solve_increment, IterationReport, IterationState, LineSearch, SolutionAlgorithm};
use crate::analysis::convergence::ConvergenceTest;
use crate::analysis::integrator::SystemAssembler;
use crate::analysis::model::TangentKind;
use crate::error::AnalysisResult;
use crate::soe::LinearSoe;

/// When a Newton iteration reforms its tangent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TangentPolicy {
    /// Full Newton-Raphson
    #[default]
    EveryIteration,
    /// Modified Newton: once at the start of each step
    OncePerStep,
    /// Initial-stiffness Newton: the initial tangent, formed once
    InitialOnly,
}

#[derive(Debug, Clone, Default)]
pub struct NewtonRaphson {
    policy: TangentPolicy,
    line_search: Option<LineSearch>,
    factored: bool,
    state: IterationState,
}

impl NewtonRaphson {
    pub fn new(policy: TangentPolicy) -> Self {
        Self {
            policy,
            line_search: None,
            factored: false,
            state: IterationState::Idle,
        }
    }

    pub fn with_line_search(mut self, line_search: Option<LineSearch>) -> Self {
        self.line_search = line_search;
        self
    }

    pub fn policy(&self) -> TangentPolicy {
        self.policy
    }

    fn form_tangent(&mut self, system: &mut dyn SystemAssembler, soe: &mut dyn LinearSoe) -> AnalysisResult<()> {
        let kind = match self.policy {
            TangentPolicy::InitialOnly => TangentKind::Initial,
            _ => TangentKind::Current,
        };
        system.form_tangent(soe, kind)?;
        self.factored = true;
        self.state = IterationState::TangentFormed;
        Ok(())
    }

    fn iterate(
        &mut self,
        system: &mut dyn SystemAssembler,
        soe: &mut dyn LinearSoe,
        test: &mut ConvergenceTest,
    ) -> AnalysisResult<IterationReport> {
        let mut tangent_formations = 0;
        if self.policy != TangentPolicy::InitialOnly || !self.factored {
            self.form_tangent(system, soe)?;
            tangent_formations += 1;
        }

        system.form_unbalance(soe)?;
        let mut residual = soe.b().clone();
        test.start(&residual);
        self.state = IterationState::ResidualFormed;

        let mut iterations = 0;
        loop {
            if iterations > 0 && self.policy == TangentPolicy::EveryIteration {
                self.form_tangent(system, soe)?;
                soe.set_b(&residual)?;
                tangent_formations += 1;
            }
            iterations += 1;

            let dx = solve_increment(soe)?;
            self.state = IterationState::Solved;

            let (applied, next) = apply_increment(system, soe, &dx, &residual, self.line_search.as_ref())?;
            self.state = IterationState::Updated;

            let outcome = test.test(&applied, &residual, &next);
            self.state = IterationState::Tested;
            residual = next;

            self.state = judge(outcome)?;
            if self.state == IterationState::Converged {
                break;
            }
        }
        debug!(
            "newton ({:?}) converged in {} iterations, {} tangents",
            self.policy, iterations, tangent_formations
        );

        Ok(IterationReport {
            iterations,
            tangent_formations,
            norms: test.history().to_vec(),
        })
    }
}

impl SolutionAlgorithm for NewtonRaphson {
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
        self.factored = false;
    }
}
