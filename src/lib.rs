//! FEA Analysis - nonlinear equilibrium solution engine for finite element
//! structural models
//!
//! The engine turns a [`domain::Domain`] (nodes, elements, constraints and
//! load patterns) into systems of equations and drives them to equilibrium:
//! - Constraint handling (plain, transformation, penalty, Lagrange)
//! - Equation numbering with bandwidth reduction
//! - Dense, skyline and sparse linear systems
//! - Static load and displacement control, Newmark-family transient schemes
//! - Newton-Raphson, modified Newton, BFGS and Broyden with line search
//! - Modal and linear buckling eigen analyses
//! - Step subdivision on failure and versioned state persistence
//!
//! ## Example
//! ```rust
//! use fea_analysis::prelude::*;
//!
//! let mut domain = Domain::new();
//! domain.add_node(Node::new(1, 1, &[0.0])).unwrap();
//! domain
//!     .add_element(Box::new(Spring::grounded(1, 1, 0, SpringLaw::Linear { k: 4.0 })))
//!     .unwrap();
//! domain
//!     .add_load_pattern(LoadPattern::new(1, TimeSeries::linear()).with_load(NodeLoad::new(1, &[2.0])))
//!     .unwrap();
//!
//! let mut analysis = StaticAnalysis::new(domain, StaticIntegrator::load_control(0.5));
//! let report = analysis.analyze(2);
//! assert!(report.succeeded());
//! assert!((analysis.response(1, 0).unwrap() - 0.5).abs() < 1e-12);
//! ```

pub mod analysis;
pub mod domain;
pub mod eigen;
pub mod elements;
pub mod error;
pub mod graph;
pub mod loads;
pub mod math;
pub mod persist;
pub mod results;
pub mod soe;

#[cfg(feature = "distributed")]
pub mod distributed;

// Re-export common types
pub mod prelude {
    pub use crate::analysis::{
        AlgorithmKind, AnalysisOptions, BucklingAnalysis, ConstraintHandler, ConvergenceTest, DofNumberer,
        LineSearch, LineSearchMethod, ModalAnalysis, NormType, RayleighDamping, SecantUpdate, StaticAnalysis,
        StaticIntegrator, SubdivisionPolicy, TangentPolicy, TestKind, TransientAnalysis, TransientIntegrator,
        TransientScheme,
    };
    #[cfg(feature = "distributed")]
    pub use crate::distributed::DistributedStaticAnalysis;
    pub use crate::domain::{Domain, MpConstraint, Node, SpConstraint};
    pub use crate::eigen::EigenSystemKind;
    pub use crate::elements::{ElasticBeamColumn3d, Element, Material, Section, Spring, SpringLaw, Truss};
    pub use crate::error::{AnalysisError, AnalysisResult};
    pub use crate::loads::{LoadPattern, NodeLoad, TimeSeries};
    pub use crate::persist::{Persist, ResponseSnapshot};
    pub use crate::results::{AnalysisReport, BucklingResults, ModalResults, StepReport};
    pub use crate::soe::SystemKind;
}
