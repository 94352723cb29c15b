//! Coordinator/worker execution over a partitioned domain
//!
//! Each worker owns one sub-domain and forms its share of the tangent and
//! residual into a collecting system keyed by global equation ids. The
//! coordinator numbers the merged graph, assembles and solves, and
//! broadcasts increments, commits and reverts.

mod analysis;
mod coordinator;
mod partitioner;
mod worker;

pub use analysis::DistributedStaticAnalysis;
pub use coordinator::Coordinator;
pub use partitioner::Partitioner;
