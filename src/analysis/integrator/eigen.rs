//! Matrix formation for modal and buckling eigenproblems

use crate::analysis::model::{AnalysisModel, TangentKind};
use crate::eigen::EigenSoe;
use crate::error::{AnalysisError, AnalysisResult, Stage};

#[derive(Debug, Clone, Copy, Default)]
pub struct EigenIntegrator;

impl EigenIntegrator {
    pub fn new() -> Self {
        Self
    }

    /// `A = K` of the given kind
    pub fn form_k(&self, model: &AnalysisModel, soe: &mut dyn EigenSoe, kind: TangentKind) -> AnalysisResult<()> {
        soe.zero_a();
        model
            .visit_stiffness(kind, |k, ids| soe.add_a(k, ids, 1.0))
            .map_err(|e| AnalysisError::formulation(Stage::Tangent, e.to_string()))
    }

    /// `M` from element and nodal masses
    pub fn form_m(&self, model: &AnalysisModel, soe: &mut dyn EigenSoe) -> AnalysisResult<()> {
        soe.zero_m();
        model
            .visit_mass(|m, ids| soe.add_m(m, ids, 1.0))
            .map_err(|e| AnalysisError::formulation(Stage::Mass, e.to_string()))
    }

    /// Tangent at the reference state into `A`, initial stiffness into `M`
    pub fn form_buckling(&self, model: &AnalysisModel, soe: &mut dyn EigenSoe) -> AnalysisResult<()> {
        self.form_k(model, soe, TangentKind::Current)?;
        soe.zero_m();
        model
            .visit_stiffness(TangentKind::Initial, |k, ids| soe.add_m(k, ids, 1.0))
            .map_err(|e| AnalysisError::formulation(Stage::Tangent, e.to_string()))
    }
}
