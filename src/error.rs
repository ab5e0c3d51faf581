use crate::validation::Violation;

/// Everything the engine can refuse to do, distinguishable for the caller.
/// None of these conditions are expected to crash the hosting process.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("validation failed: {}", format_violations(.0))]
    Validation(Vec<Violation>),

    #[error("illegal transition: {0}")]
    IllegalTransition(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Store/IO failure passed through unmodified; retry policy, if any,
    /// belongs to the store client.
    #[error("dependency failure: {0}")]
    Dependency(#[source] anyhow::Error),
}

impl EngineError {
    pub fn illegal(msg: impl Into<String>) -> Self {
        Self::IllegalTransition(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn dependency(err: impl Into<anyhow::Error>) -> Self {
        Self::Dependency(err.into())
    }

    /// Stable wire code for this condition.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_failed",
            Self::IllegalTransition(_) => "illegal_transition",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Dependency(_) => "dependency_failed",
        }
    }
}

fn format_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
