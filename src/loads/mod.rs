//! Load patterns and node loads

mod node_load;
mod pattern;

pub use node_load::NodeLoad;
pub use pattern::{LoadPattern, TimeSeries};
