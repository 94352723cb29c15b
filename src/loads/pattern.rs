//! Load patterns and the time series that scale them

use serde::{Deserialize, Serialize};

use super::NodeLoad;
use crate::error::{AnalysisError, AnalysisResult};

/// Load factor as a function of pseudo-time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TimeSeries {
    /// `factor` at all times
    Constant { factor: f64 },
    /// `factor * t`; with load control the pseudo-time is the load factor
    Linear { factor: f64 },
    /// Piecewise linear through `(times[i], values[i])`, constant outside
    Path { times: Vec<f64>, values: Vec<f64> },
}

impl TimeSeries {
    pub fn linear() -> Self {
        Self::Linear { factor: 1.0 }
    }

    pub fn constant() -> Self {
        Self::Constant { factor: 1.0 }
    }

    pub fn path(times: Vec<f64>, values: Vec<f64>) -> AnalysisResult<Self> {
        if times.len() != values.len() || times.is_empty() {
            return Err(AnalysisError::InvalidInput(
                "path series needs matching, non-empty times and values".to_string(),
            ));
        }
        if times.windows(2).any(|w| w[1] <= w[0]) {
            return Err(AnalysisError::InvalidInput(
                "path series times must be strictly increasing".to_string(),
            ));
        }
        Ok(Self::Path { times, values })
    }

    pub fn factor(&self, time: f64) -> f64 {
        match self {
            TimeSeries::Constant { factor } => *factor,
            TimeSeries::Linear { factor } => factor * time,
            TimeSeries::Path { times, values } => {
                let last = times.len() - 1;
                if time <= times[0] {
                    return values[0];
                }
                if time >= times[last] {
                    return values[last];
                }
                let i = times.partition_point(|&t| t <= time) - 1;
                let s = (time - times[i]) / (times[i + 1] - times[i]);
                values[i] + s * (values[i + 1] - values[i])
            }
        }
    }
}

/// A set of node loads sharing one time series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadPattern {
    pub tag: usize,
    pub series: TimeSeries,
    pub node_loads: Vec<NodeLoad>,
}

impl LoadPattern {
    pub fn new(tag: usize, series: TimeSeries) -> Self {
        Self {
            tag,
            series,
            node_loads: Vec::new(),
        }
    }

    pub fn with_load(mut self, load: NodeLoad) -> Self {
        self.node_loads.push(load);
        self
    }

    pub fn add_load(&mut self, load: NodeLoad) {
        self.node_loads.push(load);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_linear_series() {
        let s = TimeSeries::Linear { factor: 2.0 };
        assert_relative_eq!(s.factor(0.25), 0.5);
    }

    #[test]
    fn test_path_series_interpolates_and_clamps() {
        let s = TimeSeries::path(vec![0.0, 1.0, 2.0], vec![0.0, 10.0, 0.0]).unwrap();
        assert_relative_eq!(s.factor(0.5), 5.0);
        assert_relative_eq!(s.factor(1.5), 5.0);
        assert_relative_eq!(s.factor(3.0), 0.0);
        assert_relative_eq!(s.factor(-1.0), 0.0);
    }

    #[test]
    fn test_path_series_rejects_unordered_times() {
        assert!(TimeSeries::path(vec![0.0, 0.0], vec![1.0, 2.0]).is_err());
    }
}
