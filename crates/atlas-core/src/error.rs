//! Error taxonomy shared by every atlas component.
//!
//! Analyzers and parsers never surface these across their boundary; they
//! report [`ParseDiagnostic`](crate::types::ParseDiagnostic)s inside results.
//! Storage and scheduler errors propagate to the operation boundary, where
//! they are converted into the `{ok:false, kind, message}` envelope.

/// Errors that can occur across the engine core.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unsupported language for extension: {0}")]
    UnsupportedLanguage(String),

    #[error("parse timed out after {0} ms")]
    ParseTimeout(u64),

    #[error("parse failed: {0}")]
    Parse(String),

    #[error("circuit breaker tripped: {0}")]
    CircuitBreaker(String),

    #[error("i/o error: {0}")]
    Io(String),

    #[error("schema mismatch: found v{found}, expected v{expected}")]
    Schema { found: u32, expected: u32 },

    #[error("vector dimension mismatch: store is {store}, got {got}")]
    DimensionMismatch { store: usize, got: usize },

    #[error("agent busy: {0}")]
    AgentBusy(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation timed out after {0} ms")]
    Timeout(u64),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl EngineError {
    /// The stable kind tag used in the `{ok:false, kind, ...}` envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::UnsupportedLanguage(_) => "UnsupportedLanguage",
            EngineError::ParseTimeout(_) => "ParseTimeout",
            EngineError::Parse(_) => "ParseError",
            EngineError::CircuitBreaker(_) => "CircuitBreaker",
            EngineError::Io(_) => "IOError",
            EngineError::Schema { .. } => "SchemaError",
            EngineError::DimensionMismatch { .. } => "DimensionMismatch",
            EngineError::AgentBusy(_) => "AgentBusy",
            EngineError::Cancelled => "Cancelled",
            EngineError::Timeout(_) => "Timeout",
            EngineError::InvalidArgument(_) => "InvalidArgument",
        }
    }

    /// Whether a caller may retry the failed operation without a reset.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Io(_) | EngineError::AgentBusy(_) | EngineError::Timeout(_)
        )
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        EngineError::Io(e.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Io(e.to_string())
    }
}
