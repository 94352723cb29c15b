//! Element interface and a small reference element library
//!
//! Elements are the force/stiffness providers the solution engine consumes.
//! Each element works on the concatenated dofs of its connected nodes, in
//! connection order, and reports matrices and vectors in global coordinates.

mod beam_column;
mod frame;
mod material;
mod section;
mod spring;
mod truss;

use nalgebra::{DMatrix, DVector};

use crate::domain::Node;
use crate::error::AnalysisResult;

pub use beam_column::ElasticBeamColumn3d;
pub use material::Material;
pub use section::Section;
pub use spring::{Spring, SpringLaw};
pub use truss::Truss;

/// A force/stiffness provider connected to one or more nodes
pub trait Element: std::fmt::Debug + Send {
    fn tag(&self) -> usize;

    fn connected_nodes(&self) -> &[usize];

    /// Resolve geometry and dof layout. Called once when the element is
    /// added to a domain, with the nodes in connection order.
    fn set_nodes(&mut self, nodes: &[&Node]) -> AnalysisResult<()>;

    fn num_dof(&self) -> usize;

    /// Move the element to the given trial displacements
    fn update(&mut self, trial_disp: &DVector<f64>) -> AnalysisResult<()>;

    fn tangent_stiff(&self) -> DMatrix<f64>;

    fn initial_stiff(&self) -> DMatrix<f64>;

    /// Tangent at the last committed state
    fn committed_stiff(&self) -> DMatrix<f64> {
        self.tangent_stiff()
    }

    fn mass(&self) -> DMatrix<f64> {
        DMatrix::zeros(self.num_dof(), self.num_dof())
    }

    fn resisting_force(&self) -> DVector<f64>;

    fn commit_state(&mut self);

    fn revert_to_last_commit(&mut self);

    fn revert_to_start(&mut self);
}
