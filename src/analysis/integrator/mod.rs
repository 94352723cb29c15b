//! Integrators - turn the model state into tangents and residuals
//!
//! An integrator decides which combination of stiffness, damping and mass
//! forms the system matrix, what the residual is, and how a solved
//! increment moves the trial state. Algorithms never see the model; they
//! drive an integrator through [`SystemAssembler`].

mod eigen;
mod static_integrator;
mod transient;

use nalgebra::DVector;

use super::model::{AnalysisModel, TangentKind};
use crate::error::{AnalysisError, AnalysisResult, Stage};
use crate::math;
use crate::soe::LinearSoe;

pub use eigen::EigenIntegrator;
pub use static_integrator::{StaticIntegrator, StaticScheme};
pub use transient::{RayleighDamping, TransientIntegrator, TransientScheme};

/// The narrow interface solution algorithms iterate through
pub trait SystemAssembler {
    fn num_equations(&self) -> usize;

    /// Assemble the system matrix into `soe`
    fn form_tangent(&mut self, soe: &mut dyn LinearSoe, kind: TangentKind) -> AnalysisResult<()>;

    /// Assemble the residual of the current trial state into `soe.b`
    fn form_unbalance(&mut self, soe: &mut dyn LinearSoe) -> AnalysisResult<()>;

    /// Apply a solved increment to the trial state
    fn update(&mut self, dx: &DVector<f64>) -> AnalysisResult<()>;
}

/// Integrator stepping a model through static or transient increments
pub trait IncrementalIntegrator: std::fmt::Debug + Send {
    /// Refresh equation-dependent state after the model was renumbered
    fn domain_changed(&mut self, model: &AnalysisModel) -> AnalysisResult<()>;

    fn form_tangent(
        &mut self,
        model: &AnalysisModel,
        soe: &mut dyn LinearSoe,
        kind: TangentKind,
    ) -> AnalysisResult<()>;

    fn form_unbalance(&mut self, model: &AnalysisModel, soe: &mut dyn LinearSoe) -> AnalysisResult<()>;

    fn update(&mut self, model: &mut AnalysisModel, dx: &DVector<f64>) -> AnalysisResult<()>;

    /// Make the converged trial state the committed state
    fn commit(&mut self, model: &mut AnalysisModel) -> AnalysisResult<()>;

    /// Drop the trial state of a failed step
    fn revert_to_last_step(&mut self, model: &mut AnalysisModel) -> AnalysisResult<()>;
}

/// A model paired with the integrator that forms its equations
pub struct ModelAssembler<'a> {
    pub model: &'a mut AnalysisModel,
    pub integrator: &'a mut dyn IncrementalIntegrator,
}

impl<'a> ModelAssembler<'a> {
    pub fn new(model: &'a mut AnalysisModel, integrator: &'a mut dyn IncrementalIntegrator) -> Self {
        Self { model, integrator }
    }
}

impl SystemAssembler for ModelAssembler<'_> {
    fn num_equations(&self) -> usize {
        self.model.num_equations()
    }

    fn form_tangent(&mut self, soe: &mut dyn LinearSoe, kind: TangentKind) -> AnalysisResult<()> {
        self.integrator.form_tangent(self.model, soe, kind)
    }

    fn form_unbalance(&mut self, soe: &mut dyn LinearSoe) -> AnalysisResult<()> {
        self.integrator.form_unbalance(self.model, soe)
    }

    fn update(&mut self, dx: &DVector<f64>) -> AnalysisResult<()> {
        self.integrator.update(self.model, dx)
    }
}

fn tag_stage(stage: Stage) -> impl Fn(AnalysisError) -> AnalysisError {
    move |e| match e {
        AnalysisError::Formulation { .. } => e,
        other => AnalysisError::formulation(stage, other.to_string()),
    }
}

/// `A += factor * K` over every FE element
pub(crate) fn assemble_stiffness(
    model: &AnalysisModel,
    soe: &mut dyn LinearSoe,
    kind: TangentKind,
    factor: f64,
) -> AnalysisResult<()> {
    if factor == 0.0 {
        return Ok(());
    }
    model
        .visit_stiffness(kind, |k, ids| soe.add_a(k, ids, factor))
        .map_err(tag_stage(Stage::Tangent))
}

/// `A += factor * M` over elements and nodes
pub(crate) fn assemble_mass(model: &AnalysisModel, soe: &mut dyn LinearSoe, factor: f64) -> AnalysisResult<()> {
    if factor == 0.0 {
        return Ok(());
    }
    model
        .visit_mass(|m, ids| soe.add_a(m, ids, factor))
        .map_err(tag_stage(Stage::Mass))
}

/// `b = P - F_int` for the model's current loads and trial state
pub(crate) fn assemble_static_unbalance(model: &AnalysisModel, soe: &mut dyn LinearSoe) -> AnalysisResult<()> {
    soe.zero_b();
    model
        .visit_nodal_loads(|p, ids| soe.add_b(p, ids, 1.0))
        .and_then(|_| model.visit_resisting_forces(|f, ids| soe.add_b(f, ids, -1.0)))
        .map_err(tag_stage(Stage::Unbalance))?;
    if soe.b().iter().any(|v| !v.is_finite()) {
        return Err(AnalysisError::formulation(Stage::Unbalance, "residual is not finite"));
    }
    Ok(())
}

fn scatter_add(out: &mut DVector<f64>, v: &DVector<f64>, ids: &[isize], factor: f64) {
    for (value, &id) in v.iter().zip(ids) {
        if id >= 0 {
            out[id as usize] += factor * value;
        }
    }
}

/// `out += factor * K x` without assembling `K`
pub(crate) fn add_stiffness_product(
    model: &AnalysisModel,
    kind: TangentKind,
    x: &DVector<f64>,
    factor: f64,
    out: &mut DVector<f64>,
) -> AnalysisResult<()> {
    if factor == 0.0 {
        return Ok(());
    }
    model.visit_stiffness(kind, |k, ids| {
        scatter_add(out, &(k * math::gather(x, ids)), ids, factor);
        Ok(())
    })
}

/// `out += factor * M x` without assembling `M`
pub(crate) fn add_mass_product(
    model: &AnalysisModel,
    x: &DVector<f64>,
    factor: f64,
    out: &mut DVector<f64>,
) -> AnalysisResult<()> {
    if factor == 0.0 {
        return Ok(());
    }
    model.visit_mass(|m, ids| {
        scatter_add(out, &(m * math::gather(x, ids)), ids, factor);
        Ok(())
    })
}

/// Assembled resisting force vector of the current trial state
pub(crate) fn resisting_force_vector(model: &AnalysisModel) -> AnalysisResult<DVector<f64>> {
    let mut out = DVector::zeros(model.num_equations());
    model.visit_resisting_forces(|f, ids| {
        scatter_add(&mut out, f, ids, 1.0);
        Ok(())
    })?;
    Ok(out)
}
