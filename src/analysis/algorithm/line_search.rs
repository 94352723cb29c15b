//! Line searches along a solved increment

use log::debug;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::analysis::integrator::SystemAssembler;
use crate::error::AnalysisResult;
use crate::soe::LinearSoe;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineSearchMethod {
    Bisection,
    Secant,
    RegulaFalsi,
    InitialInterpolated,
}

/// Search for a step length `eta` that makes the merit
/// `s(eta) = dx . R(u + eta dx)` small relative to `s(0)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineSearch {
    pub method: LineSearchMethod,
    /// Accept when `|s(eta)| <= tol * |s(0)|`
    pub tol: f64,
    pub max_iterations: usize,
    pub min_eta: f64,
    pub max_eta: f64,
}

impl LineSearch {
    pub fn new(method: LineSearchMethod) -> Self {
        Self {
            method,
            tol: 0.8,
            max_iterations: 10,
            min_eta: 0.1,
            max_eta: 1.0,
        }
    }

    /// Apply `dx` with a searched step length. On return the system holds
    /// the updated state and `soe.b` its residual. Returns the increment
    /// actually applied.
    pub fn search(
        &self,
        system: &mut dyn SystemAssembler,
        soe: &mut dyn LinearSoe,
        dx: &DVector<f64>,
        residual: &DVector<f64>,
    ) -> AnalysisResult<DVector<f64>> {
        let s0 = dx.dot(residual);
        system.update(dx)?;
        system.form_unbalance(soe)?;
        let mut s = dx.dot(soe.b());
        let mut eta = 1.0;

        // no sign change up to the largest allowed step: take the full step
        if s0 == 0.0 || (s / s0).abs() <= self.tol || (s0 * s > 0.0 && eta >= self.max_eta) {
            return Ok(dx.clone());
        }

        // lower carries the sign of s0, upper the opposite sign
        let (mut lower, mut s_lower) = (0.0, s0);
        let (mut upper, mut s_upper) = (eta, s);
        let (mut prev, mut s_prev) = (0.0, s0);

        for iteration in 1..=self.max_iterations {
            let candidate = match self.method {
                LineSearchMethod::Bisection => 0.5 * (lower + upper),
                LineSearchMethod::Secant => {
                    if s == s_prev {
                        break;
                    }
                    eta - s * (prev - eta) / (s_prev - s)
                }
                LineSearchMethod::RegulaFalsi => {
                    if s_lower == s_upper {
                        break;
                    }
                    upper - s_upper * (lower - upper) / (s_lower - s_upper)
                }
                LineSearchMethod::InitialInterpolated => {
                    if s == s0 {
                        break;
                    }
                    -s0 * eta / (s - s0)
                }
            };
            let next = if candidate.is_finite() {
                candidate.clamp(self.min_eta, self.max_eta)
            } else {
                self.min_eta
            };

            system.update(&(dx * (next - eta)))?;
            system.form_unbalance(soe)?;
            prev = eta;
            s_prev = s;
            eta = next;
            s = dx.dot(soe.b());
            debug!("line search iteration {}: eta {:.4}, s/s0 {:e}", iteration, eta, s / s0);

            // keep the sign change between lower and upper
            if s * s0 > 0.0 {
                lower = eta;
                s_lower = s;
            } else {
                upper = eta;
                s_upper = s;
            }

            if (s / s0).abs() <= self.tol {
                break;
            }
        }
        Ok(dx * eta)
    }
}
