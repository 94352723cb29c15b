//! Transient integrators: Newmark, HHT, generalized-alpha and alpha-OS
//!
//! All schemes iterate on displacement increments. With `(gamma, beta)` the
//! Newmark relations give `dV = gamma / (beta dt) dU` and
//! `dA = 1 / (beta dt^2) dU`; the alpha schemes evaluate the equation of
//! motion at weighted states `U_af = (1 - af) U_n + af U_n+1` (and `A_am`
//! for the inertia term).

use log::debug;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use super::{
    add_mass_product, add_stiffness_product, assemble_mass, assemble_static_unbalance,
    assemble_stiffness, resisting_force_vector, IncrementalIntegrator,
};
use crate::analysis::model::{AnalysisModel, ResponseKind, TangentKind};
use crate::error::{AnalysisError, AnalysisResult};
use crate::soe::LinearSoe;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TransientScheme {
    Newmark { gamma: f64, beta: f64 },
    /// Hilber-Hughes-Taylor, `alpha` in `[2/3, 1]`; `alpha = 1` is Newmark
    Hht { alpha: f64, gamma: f64, beta: f64 },
    GeneralizedAlpha {
        alpha_m: f64,
        alpha_f: f64,
        gamma: f64,
        beta: f64,
    },
    /// Operator splitting: explicit predictor, restoring force evaluated
    /// once at the predictor and corrected with the initial stiffness
    AlphaOs { alpha: f64, gamma: f64, beta: f64 },
}

impl TransientScheme {
    /// Constant average acceleration
    pub fn average_acceleration() -> Self {
        TransientScheme::Newmark {
            gamma: 0.5,
            beta: 0.25,
        }
    }

    pub fn newmark(gamma: f64, beta: f64) -> Self {
        TransientScheme::Newmark { gamma, beta }
    }

    pub fn hht(alpha: f64) -> Self {
        TransientScheme::Hht {
            alpha,
            gamma: 1.5 - alpha,
            beta: (2.0 - alpha).powi(2) / 4.0,
        }
    }

    pub fn generalized_alpha(alpha_m: f64, alpha_f: f64) -> Self {
        TransientScheme::GeneralizedAlpha {
            alpha_m,
            alpha_f,
            gamma: 0.5 + alpha_m - alpha_f,
            beta: 0.25 * (1.0 + alpha_m - alpha_f).powi(2),
        }
    }

    pub fn alpha_os(alpha: f64) -> Self {
        TransientScheme::AlphaOs {
            alpha,
            gamma: 1.5 - alpha,
            beta: (2.0 - alpha).powi(2) / 4.0,
        }
    }

    fn gamma_beta(&self) -> (f64, f64) {
        match *self {
            TransientScheme::Newmark { gamma, beta }
            | TransientScheme::Hht { gamma, beta, .. }
            | TransientScheme::GeneralizedAlpha { gamma, beta, .. }
            | TransientScheme::AlphaOs { gamma, beta, .. } => (gamma, beta),
        }
    }

    /// `(alpha_f, alpha_m)` weights of the force and inertia states
    fn weights(&self) -> (f64, f64) {
        match *self {
            TransientScheme::Newmark { .. } => (1.0, 1.0),
            TransientScheme::Hht { alpha, .. } | TransientScheme::AlphaOs { alpha, .. } => (alpha, 1.0),
            TransientScheme::GeneralizedAlpha { alpha_m, alpha_f, .. } => (alpha_f, alpha_m),
        }
    }

    fn validate(&self) -> AnalysisResult<()> {
        let (gamma, beta) = self.gamma_beta();
        let (af, am) = self.weights();
        if !(beta > 0.0 && gamma > 0.0) {
            return Err(AnalysisError::Configuration(format!(
                "transient scheme needs positive gamma and beta, got {} and {}",
                gamma, beta
            )));
        }
        if !(af > 0.0 && af <= 1.0 && am > 0.0) {
            return Err(AnalysisError::Configuration(format!(
                "transient scheme weights out of range: alpha_f {}, alpha_m {}",
                af, am
            )));
        }
        Ok(())
    }
}

/// `C = alpha_m M + beta_k K + beta_k0 K_0 + beta_kc K_c`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RayleighDamping {
    pub alpha_m: f64,
    pub beta_k: f64,
    pub beta_k0: f64,
    pub beta_kc: f64,
}

impl RayleighDamping {
    pub fn new(alpha_m: f64, beta_k: f64, beta_k0: f64, beta_kc: f64) -> Self {
        Self {
            alpha_m,
            beta_k,
            beta_k0,
            beta_kc,
        }
    }

    /// Mass and current-stiffness proportional coefficients giving damping
    /// ratio `zeta` at circular frequencies `w1` and `w2`
    pub fn from_modes(zeta: f64, w1: f64, w2: f64) -> Self {
        let alpha_m = 2.0 * zeta * w1 * w2 / (w1 + w2);
        let beta_k = 2.0 * zeta / (w1 + w2);
        Self::new(alpha_m, beta_k, 0.0, 0.0)
    }

    pub fn is_zero(&self) -> bool {
        self.alpha_m == 0.0 && self.beta_k == 0.0 && self.beta_k0 == 0.0 && self.beta_kc == 0.0
    }
}

#[derive(Debug, Clone)]
pub struct TransientIntegrator {
    scheme: TransientScheme,
    damping: RayleighDamping,
    dt: f64,
    u: DVector<f64>,
    v: DVector<f64>,
    a: DVector<f64>,
    ut: DVector<f64>,
    vt: DVector<f64>,
    at: DVector<f64>,
    // operator-splitting state
    u_pred: DVector<f64>,
    f_pred: DVector<f64>,
    f_committed: Option<DVector<f64>>,
    p_next: DVector<f64>,
    p_prev: DVector<f64>,
}

impl TransientIntegrator {
    pub fn new(scheme: TransientScheme) -> Self {
        let empty = DVector::zeros(0);
        Self {
            scheme,
            damping: RayleighDamping::default(),
            dt: 0.0,
            u: empty.clone(),
            v: empty.clone(),
            a: empty.clone(),
            ut: empty.clone(),
            vt: empty.clone(),
            at: empty.clone(),
            u_pred: empty.clone(),
            f_pred: empty.clone(),
            f_committed: None,
            p_next: empty.clone(),
            p_prev: empty,
        }
    }

    pub fn with_damping(mut self, damping: RayleighDamping) -> Self {
        self.damping = damping;
        self
    }

    pub fn scheme(&self) -> &TransientScheme {
        &self.scheme
    }

    pub fn damping(&self) -> &RayleighDamping {
        &self.damping
    }

    /// Committed response in equation space
    pub fn committed(&self) -> (&DVector<f64>, &DVector<f64>, &DVector<f64>) {
        (&self.u, &self.v, &self.a)
    }

    /// `(c_K, c_C, c_M)` of the system matrix
    fn coefficients(&self) -> (f64, f64, f64) {
        let (gamma, beta) = self.scheme.gamma_beta();
        let (af, am) = self.scheme.weights();
        let dt = self.dt;
        (af, af * gamma / (beta * dt), am / (beta * dt * dt))
    }

    fn weighted(&self) -> (DVector<f64>, DVector<f64>, DVector<f64>) {
        let (af, am) = self.scheme.weights();
        (
            &self.u * (1.0 - af) + &self.ut * af,
            &self.v * (1.0 - af) + &self.vt * af,
            &self.a * (1.0 - am) + &self.at * am,
        )
    }

    fn push_weighted_response(&self, model: &mut AnalysisModel) {
        let (u, v, a) = self.weighted();
        model.set_response(Some(&u), Some(&v), Some(&a));
    }

    /// `out -= C v`
    fn subtract_damping(&self, model: &AnalysisModel, v: &DVector<f64>, out: &mut DVector<f64>) -> AnalysisResult<()> {
        let d = &self.damping;
        add_mass_product(model, v, -d.alpha_m, out)?;
        add_stiffness_product(model, TangentKind::Current, v, -d.beta_k, out)?;
        add_stiffness_product(model, TangentKind::Initial, v, -d.beta_k0, out)?;
        add_stiffness_product(model, TangentKind::Committed, v, -d.beta_kc, out)
    }

    /// Start a step of size `dt`. Returns the time the step ends at.
    pub fn new_step(&mut self, model: &mut AnalysisModel, dt: f64) -> AnalysisResult<f64> {
        if !(dt > 0.0) {
            return Err(AnalysisError::Configuration(format!("time step must be positive, got {}", dt)));
        }
        self.scheme.validate()?;
        self.dt = dt;
        let (gamma, beta) = self.scheme.gamma_beta();
        let t = model.domain().committed_time();

        if let TransientScheme::AlphaOs { .. } = self.scheme {
            if self.f_committed.is_none() {
                // element state may lag initial conditions set on the nodes
                model.set_response(Some(&self.u), None, None);
                model.update_domain()?;
                self.f_committed = Some(resisting_force_vector(model)?);
            }
            self.u_pred = &self.u + &self.v * dt + &self.a * (dt * dt * (0.5 - beta));
            self.ut = self.u_pred.clone();
            self.vt = &self.v + &self.a * (dt * (1.0 - gamma));
            self.at = DVector::zeros(self.u.len());
            model.set_response(Some(&self.ut), Some(&self.vt), Some(&self.at));
            model.apply_load(t + dt)?;
            self.f_pred = resisting_force_vector(model)?;
            self.p_next = model.load_vector_at(t + dt);
            self.p_prev = model.load_vector_at(t);
        } else {
            self.ut = self.u.clone();
            self.vt = &self.v * (1.0 - gamma / beta) + &self.a * (dt * (1.0 - gamma / (2.0 * beta)));
            self.at = &self.v * (-1.0 / (beta * dt)) + &self.a * (1.0 - 1.0 / (2.0 * beta));
            let (af, _) = self.scheme.weights();
            self.push_weighted_response(model);
            model.apply_load(t + af * dt)?;
        }
        debug!("{:?} step to t = {}", self.scheme, t + dt);
        Ok(t + dt)
    }
}

impl IncrementalIntegrator for TransientIntegrator {
    fn domain_changed(&mut self, model: &AnalysisModel) -> AnalysisResult<()> {
        self.u = model.eq_response(ResponseKind::Disp);
        self.v = model.eq_response(ResponseKind::Vel);
        self.a = model.eq_response(ResponseKind::Accel);
        self.ut = self.u.clone();
        self.vt = self.v.clone();
        self.at = self.a.clone();
        self.f_committed = None;
        Ok(())
    }

    fn form_tangent(
        &mut self,
        model: &AnalysisModel,
        soe: &mut dyn LinearSoe,
        kind: TangentKind,
    ) -> AnalysisResult<()> {
        if self.dt <= 0.0 {
            return Err(AnalysisError::Configuration(
                "transient tangent formed before new_step".to_string(),
            ));
        }
        let (c_k, c_c, c_m) = self.coefficients();
        let kind = match self.scheme {
            TransientScheme::AlphaOs { .. } => TangentKind::Initial,
            _ => kind,
        };
        let d = &self.damping;
        soe.zero_a();
        assemble_stiffness(model, soe, kind, c_k)?;
        assemble_stiffness(model, soe, TangentKind::Current, c_c * d.beta_k)?;
        assemble_stiffness(model, soe, TangentKind::Initial, c_c * d.beta_k0)?;
        assemble_stiffness(model, soe, TangentKind::Committed, c_c * d.beta_kc)?;
        assemble_mass(model, soe, c_m + c_c * d.alpha_m)
    }

    fn form_unbalance(&mut self, model: &AnalysisModel, soe: &mut dyn LinearSoe) -> AnalysisResult<()> {
        let (_, v_w, a_w) = self.weighted();
        let mut extra = DVector::zeros(model.num_equations());

        if let TransientScheme::AlphaOs { alpha, .. } = self.scheme {
            let f_committed = self.f_committed.as_ref().ok_or_else(|| {
                AnalysisError::Configuration("operator splitting step was not started".to_string())
            })?;
            // alpha (P_n+1 - F~ - K_I (U - U~)) + (1 - alpha)(P_n - F_n)
            extra += (&self.p_next - &self.f_pred) * alpha + (&self.p_prev - f_committed) * (1.0 - alpha);
            let correction = &self.ut - &self.u_pred;
            add_stiffness_product(model, TangentKind::Initial, &correction, -alpha, &mut extra)?;
            soe.zero_b();
        } else {
            assemble_static_unbalance(model, soe)?;
        }

        self.subtract_damping(model, &v_w, &mut extra)?;
        add_mass_product(model, &a_w, -1.0, &mut extra)?;
        let ids: Vec<isize> = (0..extra.len() as isize).collect();
        soe.add_b(&extra, &ids, 1.0)
    }

    fn update(&mut self, model: &mut AnalysisModel, dx: &DVector<f64>) -> AnalysisResult<()> {
        let (gamma, beta) = self.scheme.gamma_beta();
        let dt = self.dt;
        self.ut += dx;
        self.vt += dx * (gamma / (beta * dt));
        self.at += dx * (1.0 / (beta * dt * dt));
        match self.scheme {
            TransientScheme::AlphaOs { .. } => Ok(()),
            _ => {
                self.push_weighted_response(model);
                model.update_domain()
            }
        }
    }

    fn commit(&mut self, model: &mut AnalysisModel) -> AnalysisResult<()> {
        let t = model.domain().committed_time() + self.dt;
        model.set_response(Some(&self.ut), Some(&self.vt), Some(&self.at));
        model.apply_load(t)?;
        if let TransientScheme::AlphaOs { .. } = self.scheme {
            let mut f = self.f_pred.clone();
            let correction = &self.ut - &self.u_pred;
            add_stiffness_product(model, TangentKind::Initial, &correction, 1.0, &mut f)?;
            self.f_committed = Some(f);
        }
        model.commit()?;
        self.u.copy_from(&self.ut);
        self.v.copy_from(&self.vt);
        self.a.copy_from(&self.at);
        Ok(())
    }

    fn revert_to_last_step(&mut self, model: &mut AnalysisModel) -> AnalysisResult<()> {
        model.revert_to_last_commit()?;
        self.ut.copy_from(&self.u);
        self.vt.copy_from(&self.v);
        self.at.copy_from(&self.a);
        Ok(())
    }
}
