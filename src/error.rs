//! Error types for the analysis engine

use thiserror::Error;

/// Stage of the solution pipeline a failure originated in
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Stage {
    Setup,
    Handler,
    Numberer,
    Tangent,
    Unbalance,
    Mass,
    Update,
    LinearSolve,
    EigenSolve,
    Convergence,
    Commit,
    Persistence,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Setup => "setup",
            Stage::Handler => "constraint handler",
            Stage::Numberer => "dof numberer",
            Stage::Tangent => "form tangent",
            Stage::Unbalance => "form unbalance",
            Stage::Mass => "form mass",
            Stage::Update => "update",
            Stage::LinearSolve => "linear solve",
            Stage::EigenSolve => "eigen solve",
            Stage::Convergence => "convergence test",
            Stage::Commit => "commit",
            Stage::Persistence => "persistence",
        };
        f.write_str(name)
    }
}

/// Main error type for analysis operations
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Inconsistent constraints: {0}")]
    Constraint(String),

    #[error("Formulation failed during {stage}: {reason}")]
    Formulation { stage: Stage, reason: String },

    #[error("Linear solver failed: {0}")]
    Solver(String),

    #[error("Eigen solver failed: {0}")]
    EigenSolver(String),

    #[error("Convergence failed after {iterations} iterations (norm {norm:e})")]
    Convergence { iterations: usize, norm: f64 },

    #[error("Node {0} not found in domain")]
    NodeNotFound(usize),

    #[error("Element {0} not found in domain")]
    ElementNotFound(usize),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AnalysisError {
    pub fn formulation(stage: Stage, reason: impl Into<String>) -> Self {
        Self::Formulation {
            stage,
            reason: reason.into(),
        }
    }

    /// Negative status code reported per failed step
    pub fn status_code(&self) -> i32 {
        match self {
            AnalysisError::Configuration(_) => -1,
            AnalysisError::Constraint(_) => -2,
            AnalysisError::Formulation { stage, .. } => match stage {
                Stage::Tangent => -3,
                Stage::Unbalance => -4,
                Stage::Mass => -5,
                _ => -6,
            },
            AnalysisError::Solver(_) => -7,
            AnalysisError::EigenSolver(_) => -8,
            AnalysisError::Convergence { .. } => -9,
            AnalysisError::NodeNotFound(_) | AnalysisError::ElementNotFound(_) => -10,
            AnalysisError::InvalidInput(_) => -11,
            AnalysisError::Serialization(_) => -12,
        }
    }

    /// Pipeline stage the failure is attributed to
    pub fn stage(&self) -> Stage {
        match self {
            AnalysisError::Configuration(_) | AnalysisError::InvalidInput(_) => Stage::Setup,
            AnalysisError::Constraint(_) => Stage::Handler,
            AnalysisError::Formulation { stage, .. } => *stage,
            AnalysisError::Solver(_) => Stage::LinearSolve,
            AnalysisError::EigenSolver(_) => Stage::EigenSolve,
            AnalysisError::Convergence { .. } => Stage::Convergence,
            AnalysisError::NodeNotFound(_) | AnalysisError::ElementNotFound(_) => Stage::Setup,
            AnalysisError::Serialization(_) => Stage::Persistence,
        }
    }

    /// Whether a driver may retry the step with a smaller increment
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AnalysisError::Formulation { .. }
                | AnalysisError::Solver(_)
                | AnalysisError::Convergence { .. }
        )
    }
}

/// Result type for analysis operations
pub type AnalysisResult<T> = Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_are_negative_and_distinct() {
        let errors = [
            AnalysisError::Configuration("x".into()),
            AnalysisError::Constraint("x".into()),
            AnalysisError::formulation(Stage::Tangent, "x"),
            AnalysisError::formulation(Stage::Unbalance, "x"),
            AnalysisError::Solver("x".into()),
            AnalysisError::EigenSolver("x".into()),
            AnalysisError::Convergence {
                iterations: 3,
                norm: 1.0,
            },
        ];
        let mut codes: Vec<i32> = errors.iter().map(|e| e.status_code()).collect();
        assert!(codes.iter().all(|&c| c < 0));
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn only_numeric_failures_are_retryable() {
        assert!(AnalysisError::Solver("singular".into()).is_retryable());
        assert!(AnalysisError::Convergence {
            iterations: 10,
            norm: 1.0
        }
        .is_retryable());
        assert!(!AnalysisError::Configuration("no soe".into()).is_retryable());
        assert_eq!(
            AnalysisError::formulation(Stage::Unbalance, "x").stage(),
            Stage::Unbalance
        );
    }
}
