//! Research Orchestrator
//!
//! Answers natural-language investment-research questions by:
//! - classifying the query into an intent with extracted entities
//! - expanding the intent into a validated task graph over registered tools
//! - executing the graph with per-task failure isolation
//! - folding results into session memory for follow-up queries
//!
//! PIPELINE:
//! TEXT → CLASSIFY → PLAN → EXECUTE → SESSION

pub mod agent;
pub mod api;
pub mod classifier;
pub mod config;
pub mod error;
pub mod execution;
pub mod memory;
pub mod models;
pub mod planner;
pub mod presenter;
pub mod tools;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{ResearchError, Result};

// Re-export common types
pub use agent::{DirectReply, QueryOutcome, ResearchAgent};
pub use classifier::IntentClassifier;
pub use config::Config;
pub use memory::Session;
pub use models::*;
pub use planner::{Planner, TaskGraph, TemplatePlanner};
pub use tools::{Tool, ToolId, ToolRegistry};
