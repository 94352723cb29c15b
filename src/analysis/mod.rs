//! Analysis pipeline: model bookkeeping, constraint handling, numbering,
//! integrators, solution algorithms, convergence tests and the drivers that
//! wire them into a step loop

pub mod algorithm;
mod convergence;
mod driver;
mod eigen_analysis;
mod handler;
pub mod integrator;
mod model;
mod numberer;
mod options;
mod static_analysis;
mod transient_analysis;

pub use algorithm::{
    AlgorithmKind, IterationReport, IterationState, LineSearch, LineSearchMethod, Linear, NewtonRaphson,
    QuasiNewton, SecantUpdate, SolutionAlgorithm, TangentPolicy,
};
pub(crate) use driver::with_subdivision;
pub use convergence::{ConvergenceTest, NormType, TestKind, TestOutcome};
pub use eigen_analysis::{BucklingAnalysis, ModalAnalysis};
pub use handler::ConstraintHandler;
pub use integrator::{
    EigenIntegrator, IncrementalIntegrator, ModelAssembler, RayleighDamping, StaticIntegrator, StaticScheme,
    SystemAssembler, TransientIntegrator, TransientScheme,
};
pub use model::{
    AnalysisModel, ConstraintRef, DofGroup, DofGroupKind, DofMap, DofRef, FeElement, FeKind, ResponseKind,
    TangentKind, CONSTRAINED, TO_NUMBER,
};
pub use numberer::DofNumberer;
pub use options::{AnalysisOptions, SubdivisionPolicy};
pub use static_analysis::StaticAnalysis;
pub use transient_analysis::TransientAnalysis;
