//! Error types for the research orchestrator
//!
//! Only conditions that abort a whole query live here. Failures that stay
//! inside a single task are values (`FailureReason`, `ToolFailure`).

use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, ResearchError>;

#[derive(Error, Debug)]
pub enum ResearchError {

    // =============================
    // Planning Errors
    // =============================

    /// A template needs an entity the query did not provide.
    #[error("Plan construction error: {0}")]
    PlanConstruction(String),

    #[error("No prior analysis in this session to build a {0} from")]
    NoPriorAnalysis(String),

    #[error("Task graph contains a dependency cycle through: {0:?}")]
    CycleDetected(Vec<String>),

    #[error("Task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    #[error("Duplicate task id: {0}")]
    DuplicateTask(String),

    #[error("Task '{task}' references output of '{reference}' without depending on it")]
    UnresolvedReference { task: String, reference: String },

    // =============================
    // Registry / Startup Errors
    // =============================

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Address parse error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),
}
