//! Modal and linear buckling drivers

use std::collections::BTreeMap;
use std::f64::consts::PI;

use log::info;
use nalgebra::DVector;

use super::handler::ConstraintHandler;
use super::integrator::{add_mass_product, EigenIntegrator};
use super::model::{AnalysisModel, TangentKind};
use super::numberer::DofNumberer;
use super::options::AnalysisOptions;
use crate::domain::Domain;
use crate::eigen::{EigenSoe, EigenSystemKind};
use crate::error::{AnalysisError, AnalysisResult};
use crate::results::{BucklingResults, ModalResults, ModeParticipation};

/// Buckling eigenvalues this close to 1 belong to modes the reference load
/// does not soften
const UNSOFTENED: f64 = 1e-10;

/// Handle and number when needed, then size the eigen system
fn prepare(
    model: &mut AnalysisModel,
    handler: &ConstraintHandler,
    numberer: &DofNumberer,
    soe: &mut dyn EigenSoe,
) -> AnalysisResult<()> {
    if !handler.supports_eigen() {
        return Err(AnalysisError::Configuration(format!(
            "{:?} handler cannot form an eigenproblem",
            handler
        )));
    }
    if model.domain_changed() {
        handler.handle(model)?;
        numberer.number(model)?;
    }
    soe.set_size(&model.equation_graph())
}

/// Collect the first `count` eigenvectors per node tag
fn node_shapes(model: &AnalysisModel, soe: &dyn EigenSoe, count: usize) -> BTreeMap<usize, Vec<DVector<f64>>> {
    let mut shapes: BTreeMap<usize, Vec<DVector<f64>>> = BTreeMap::new();
    for mode in 0..count {
        let Some(phi) = soe.eigenvector(mode) else { break };
        for (tag, v) in model.node_vectors(phi) {
            shapes.entry(tag).or_default().push(v);
        }
    }
    shapes
}

fn as_plain(shapes: &BTreeMap<usize, Vec<DVector<f64>>>) -> BTreeMap<usize, Vec<Vec<f64>>> {
    shapes
        .iter()
        .map(|(tag, modes)| (*tag, modes.iter().map(|v| v.iter().copied().collect()).collect()))
        .collect()
}

/// Natural frequencies and mode shapes from `K phi = omega^2 M phi`
#[derive(Debug)]
pub struct ModalAnalysis {
    model: AnalysisModel,
    handler: ConstraintHandler,
    numberer: DofNumberer,
    soe: Box<dyn EigenSoe>,
    integrator: EigenIntegrator,
}

impl ModalAnalysis {
    pub fn new(domain: Domain) -> Self {
        Self::with_model(AnalysisModel::new(domain))
    }

    /// Reuse a model, e.g. one left at a loaded state by a static analysis
    pub fn with_model(model: AnalysisModel) -> Self {
        Self {
            model,
            handler: ConstraintHandler::default(),
            numberer: DofNumberer::default(),
            soe: EigenSystemKind::default().build(),
            integrator: EigenIntegrator::new(),
        }
    }

    pub fn from_options(domain: Domain, options: &AnalysisOptions) -> AnalysisResult<Self> {
        if !options.handler.supports_eigen() {
            return Err(AnalysisError::Configuration(format!(
                "{:?} handler cannot form an eigenproblem",
                options.handler
            )));
        }
        Ok(Self::new(domain)
            .with_handler(options.handler)
            .with_numberer(options.numberer)
            .with_eigen_system(options.eigen_system))
    }

    pub fn with_handler(mut self, handler: ConstraintHandler) -> Self {
        self.handler = handler;
        self
    }

    pub fn with_numberer(mut self, numberer: DofNumberer) -> Self {
        self.numberer = numberer;
        self
    }

    pub fn with_eigen_system(mut self, kind: EigenSystemKind) -> Self {
        self.soe = kind.build();
        self
    }

    pub fn model(&self) -> &AnalysisModel {
        &self.model
    }

    pub fn domain(&self) -> &Domain {
        self.model.domain()
    }

    pub fn into_domain(self) -> Domain {
        self.model.into_domain()
    }

    /// Solve for the lowest `num_modes` modes (`0` for all) and store the
    /// eigenvalues and node mode shapes in the domain
    pub fn analyze(&mut self, num_modes: usize) -> AnalysisResult<ModalResults> {
        prepare(&mut self.model, &self.handler, &self.numberer, self.soe.as_mut())?;
        self.integrator
            .form_k(&self.model, self.soe.as_mut(), TangentKind::Current)?;
        self.integrator.form_m(&self.model, self.soe.as_mut())?;
        self.soe.solve(num_modes)?;

        let eigenvalues = self.soe.eigenvalues().to_vec();
        let count = eigenvalues.len();
        let angular: Vec<f64> = eigenvalues.iter().map(|l| l.max(0.0).sqrt()).collect();
        let frequencies = angular.iter().map(|w| w / (2.0 * PI)).collect();
        let periods = angular
            .iter()
            .map(|&w| if w > 0.0 { 2.0 * PI / w } else { f64::INFINITY })
            .collect();

        let (total_mass, participation) = self.participation(count)?;
        let shapes = node_shapes(&self.model, self.soe.as_ref(), count);
        let mode_shapes = as_plain(&shapes);
        self.model.domain_mut().set_eigen(eigenvalues.clone(), shapes);

        info!(
            "modal analysis: {} modes, fundamental period {:.6}",
            count,
            angular.first().map_or(0.0, |&w| if w > 0.0 { 2.0 * PI / w } else { f64::INFINITY })
        );

        Ok(ModalResults {
            eigenvalues,
            angular_frequencies: angular,
            frequencies,
            periods,
            total_mass,
            participation,
            mode_shapes,
        })
    }

    /// Participation factors `phi^T M r` per translational direction
    fn participation(&self, count: usize) -> AnalysisResult<(Vec<f64>, Vec<Vec<ModeParticipation>>)> {
        let directions = self
            .model
            .domain()
            .nodes()
            .map(|n| n.coords().len())
            .max()
            .unwrap_or(0);
        let mut totals = Vec::with_capacity(directions);
        let mut table = Vec::with_capacity(directions);

        for direction in 0..directions {
            let r = self.model.influence_vector(direction);
            let mut mr = DVector::zeros(r.len());
            add_mass_product(&self.model, &r, 1.0, &mut mr)?;
            let total = r.dot(&mr);

            let mut cumulative = 0.0;
            let mut row = Vec::with_capacity(count);
            for mode in 0..count {
                let factor = self.soe.eigenvector(mode).map_or(0.0, |phi| phi.dot(&mr));
                let effective_mass = factor * factor;
                let mass_ratio = if total > 0.0 { effective_mass / total } else { 0.0 };
                cumulative += mass_ratio;
                row.push(ModeParticipation {
                    factor,
                    effective_mass,
                    mass_ratio,
                    cumulative_ratio: cumulative,
                });
            }
            totals.push(total);
            table.push(row);
        }
        Ok((totals, table))
    }
}

/// Linear buckling about the model's current (reference) state.
///
/// With `K_t` the tangent at the reference load and `K_0` the initial
/// stiffness, `K_t phi = gamma K_0 phi` gives load factors
/// `lambda = 1 / (1 - gamma)`.
#[derive(Debug)]
pub struct BucklingAnalysis {
    model: AnalysisModel,
    handler: ConstraintHandler,
    numberer: DofNumberer,
    soe: Box<dyn EigenSoe>,
    integrator: EigenIntegrator,
}

impl BucklingAnalysis {
    /// `model` should hold the converged state under the reference load
    pub fn new(model: AnalysisModel) -> Self {
        Self {
            model,
            handler: ConstraintHandler::default(),
            numberer: DofNumberer::default(),
            soe: EigenSystemKind::FullGeneral.build(),
            integrator: EigenIntegrator::new(),
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

    pub fn with_eigen_system(mut self, kind: EigenSystemKind) -> Self {
        self.soe = kind.build();
        self
    }

    pub fn model(&self) -> &AnalysisModel {
        &self.model
    }

    pub fn into_model(self) -> AnalysisModel {
        self.model
    }

    /// Lowest `num_modes` positive load factors (`0` for all)
    pub fn analyze(&mut self, num_modes: usize) -> AnalysisResult<BucklingResults> {
        prepare(&mut self.model, &self.handler, &self.numberer, self.soe.as_mut())?;
        self.integrator.form_buckling(&self.model, self.soe.as_mut())?;
        self.soe.solve(0)?;

        let mut factors: Vec<(f64, usize)> = self
            .soe
            .eigenvalues()
            .iter()
            .enumerate()
            .filter(|(_, &gamma)| gamma < 1.0 - UNSOFTENED)
            .map(|(mode, &gamma)| (1.0 / (1.0 - gamma), mode))
            .filter(|(lambda, _)| lambda.is_finite() && *lambda > 0.0)
            .collect();
        factors.sort_by(|a, b| a.0.total_cmp(&b.0));
        if num_modes > 0 {
            factors.truncate(num_modes);
        }
        if factors.is_empty() {
            return Err(AnalysisError::EigenSolver(
                "no positive buckling load factor; is the reference state loaded?".to_string(),
            ));
        }

        let mut mode_shapes: BTreeMap<usize, Vec<Vec<f64>>> = BTreeMap::new();
        for &(_, mode) in &factors {
            let Some(phi) = self.soe.eigenvector(mode) else { continue };
            for (tag, v) in self.model.node_vectors(phi) {
                mode_shapes.entry(tag).or_default().push(v.iter().copied().collect());
            }
        }
        let load_factors: Vec<f64> = factors.iter().map(|(lambda, _)| *lambda).collect();
        info!(
            "buckling analysis: {} load factors, critical {:.6}",
            load_factors.len(),
            load_factors[0]
        );

        Ok(BucklingResults {
            load_factors,
            mode_shapes,
        })
    }
}
