//! Core data models for the research engine

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

//
// ================= Intent =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    StockAnalysis,
    TechnicalAnalysis,
    Comparison,
    Backtest,
    Report,
    Presentation,
    Status,
    Help,
    Unknown,
}

impl Intent {
    /// Intents whose results a later report can be built from.
    pub fn is_analysis(self) -> bool {
        matches!(
            self,
            Intent::StockAnalysis
                | Intent::TechnicalAnalysis
                | Intent::Comparison
                | Intent::Backtest
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Intent::StockAnalysis => "stock_analysis",
            Intent::TechnicalAnalysis => "technical_analysis",
            Intent::Comparison => "comparison",
            Intent::Backtest => "backtest",
            Intent::Report => "report",
            Intent::Presentation => "presentation",
            Intent::Status => "status",
            Intent::Help => "help",
            Intent::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ================= Entities =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Entities {
    /// Tickers in order of first appearance, no duplicates
    pub symbols: Vec<String>,
    pub date_range: Option<DateRange>,
    /// Lookback token understood by the data-fetch tool ("6mo", "1y", ...)
    pub period: Option<String>,
    pub indicator_hint: Option<String>,
    #[serde(default)]
    pub chart_requested: bool,
}

impl Entities {
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
            && self.date_range.is_none()
            && self.period.is_none()
            && self.indicator_hint.is_none()
            && !self.chart_requested
    }
}

/// Recorded when the detected intent had to be degraded
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ambiguity {
    pub requested: Intent,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Classification {
    pub intent: Intent,
    pub entities: Entities,
    pub ambiguity: Option<Ambiguity>,
}

impl Classification {
    pub fn unknown() -> Self {
        Self {
            intent: Intent::Unknown,
            entities: Entities::default(),
            ambiguity: None,
        }
    }
}

/// A classified query. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub query_id: Uuid,
    pub text: String,
    pub intent: Intent,
    pub entities: Entities,
    pub ambiguity: Option<Ambiguity>,
    pub received_at: DateTime<Utc>,
}

impl Query {
    pub fn new(text: impl Into<String>, classification: Classification) -> Self {
        Self {
            query_id: Uuid::new_v4(),
            text: text.into(),
            intent: classification.intent,
            entities: classification.entities,
            ambiguity: classification.ambiguity,
            received_at: Utc::now(),
        }
    }
}

//
// ================= Tasks =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    DataFetch,
    Analysis,
    Visualization,
    Reporting,
}

impl TaskType {
    /// Visualization and reporting tasks may fail without failing the plan.
    pub fn is_optional_by_default(self) -> bool {
        matches!(self, TaskType::Visualization | TaskType::Reporting)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::DataFetch => "data_fetch",
            TaskType::Analysis => "analysis",
            TaskType::Visualization => "visualization",
            TaskType::Reporting => "reporting",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task parameter: either a literal or a reference to another task's output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskInput {
    Literal { value: Value },
    Output {
        task_id: String,
        /// JSON pointer into the referenced output, whole output when absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pointer: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub tool_name: String,
    pub task_type: TaskType,
    pub inputs: BTreeMap<String, TaskInput>,
    pub depends_on: BTreeSet<String>,
    pub optional: bool,
}

impl Task {
    pub fn new(id: impl Into<String>, tool_name: impl Into<String>, task_type: TaskType) -> Self {
        Self {
            id: id.into(),
            tool_name: tool_name.into(),
            task_type,
            inputs: BTreeMap::new(),
            depends_on: BTreeSet::new(),
            optional: task_type.is_optional_by_default(),
        }
    }

    pub fn literal(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.inputs
            .insert(key.to_string(), TaskInput::Literal { value: value.into() });
        self
    }

    /// Bind the whole output of `task_id`; also adds the dependency edge.
    pub fn output(self, key: &str, task_id: &str) -> Self {
        self.bind(key, task_id, None)
    }

    /// Bind one field of the output of `task_id` (JSON pointer, e.g. "/prices").
    pub fn output_field(self, key: &str, task_id: &str, pointer: &str) -> Self {
        self.bind(key, task_id, Some(pointer.to_string()))
    }

    fn bind(mut self, key: &str, task_id: &str, pointer: Option<String>) -> Self {
        self.inputs.insert(
            key.to_string(),
            TaskInput::Output {
                task_id: task_id.to_string(),
                pointer,
            },
        );
        self.depends_on.insert(task_id.to_string());
        self
    }

    pub fn after(mut self, task_id: &str) -> Self {
        self.depends_on.insert(task_id.to_string());
        self
    }

    pub fn required(mut self) -> Self {
        self.optional = false;
        self
    }

    /// Literal "symbol" input, if the task has one
    pub fn symbol(&self) -> Option<&str> {
        match self.inputs.get("symbol") {
            Some(TaskInput::Literal { value }) => value.as_str(),
            _ => None,
        }
    }
}

/// Per-task lifecycle inside one execution
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Ready,
    Running,
    Succeeded,
    Failed,
}

impl TaskState {
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Pending, Ready)
                | (Pending, Failed)
                | (Ready, Running)
                | (Ready, Failed)
                | (Running, Succeeded)
                | (Running, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }
}

//
// ================= Tool I/O =================
//

/// Parameters handed to a tool after reference substitution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInput {
    pub task_id: String,
    pub tool_name: String,
    pub parameters: Map<String, Value>,
}

impl ToolInput {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.parameters.get(key)
    }

    pub fn require(&self, key: &str) -> std::result::Result<&Value, ToolFailure> {
        self.parameters
            .get(key)
            .ok_or_else(|| ToolFailure::InvalidInput(format!("missing '{}'", key)))
    }

    pub fn require_str(&self, key: &str) -> std::result::Result<&str, ToolFailure> {
        self.require(key)?
            .as_str()
            .ok_or_else(|| ToolFailure::InvalidInput(format!("'{}' must be a string", key)))
    }

    pub fn str_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).and_then(Value::as_str).unwrap_or(default)
    }

    pub fn f64_or(&self, key: &str, default: f64) -> f64 {
        self.get(key).and_then(Value::as_f64).unwrap_or(default)
    }
}

/// Why a tool could not produce its output
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ToolFailure {
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("Data source unavailable: {0}")]
    DataSourceUnavailable(String),

    #[error("Invalid tool input: {0}")]
    InvalidInput(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Tool failed: {0}")]
    Failed(String),
}

impl From<std::io::Error> for ToolFailure {
    fn from(err: std::io::Error) -> Self {
        ToolFailure::Io(err.to_string())
    }
}

/// Outcome of exactly one tool invocation; never partially successful
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<ToolFailure>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl ToolResult {
    pub fn success(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn failure(error: ToolFailure) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

impl From<std::result::Result<Value, ToolFailure>> for ToolResult {
    fn from(outcome: std::result::Result<Value, ToolFailure>) -> Self {
        match outcome {
            Ok(data) => ToolResult::success(data),
            Err(e) => ToolResult::failure(e),
        }
    }
}

//
// ================= Execution =================
//

#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FailureReason {
    #[error("dependency '{dependency}' failed")]
    DependencyFailed { dependency: String },

    #[error("tool '{tool}' is not registered")]
    ToolNotFound { tool: String },

    #[error("required input '{key}' could not be resolved")]
    MissingInput { key: String },

    #[error("{failure}")]
    ToolExecution { failure: ToolFailure },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Succeeded,
    Failed { reason: FailureReason },
}

impl TaskOutcome {
    pub fn state(&self) -> TaskState {
        match self {
            TaskOutcome::Succeeded => TaskState::Succeeded,
            TaskOutcome::Failed { .. } => TaskState::Failed,
        }
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            TaskOutcome::Succeeded => None,
            TaskOutcome::Failed { reason } => Some(reason),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task: Task,
    pub outcome: TaskOutcome,
    pub result: ToolResult,
    pub execution_time_ms: u64,
    pub completed_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn succeeded(&self) -> bool {
        self.outcome == TaskOutcome::Succeeded
    }
}

/// Records in completion order plus the overall outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub report_id: Uuid,
    pub query_id: Uuid,
    pub intent: Intent,
    pub plan_fingerprint: String,
    pub records: Vec<TaskRecord>,
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionReport {
    pub fn record(&self, task_id: &str) -> Option<&TaskRecord> {
        self.records.iter().find(|r| r.task.id == task_id)
    }

    pub fn task_order(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.task.id.as_str()).collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &TaskRecord> {
        self.records.iter().filter(|r| !r.succeeded())
    }

    /// Failed tasks that did not affect the overall outcome
    pub fn warnings(&self) -> impl Iterator<Item = &TaskRecord> {
        self.failures().filter(|r| r.task.optional)
    }

    pub fn succeeded_records(&self) -> impl Iterator<Item = &TaskRecord> {
        self.records.iter().filter(|r| r.succeeded())
    }

    pub fn has_succeeded_task(&self) -> bool {
        self.records.iter().any(TaskRecord::succeeded)
    }
}

//
// ================= Market Data =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Signal {
    pub date: NaiveDate,
    pub action: SignalAction,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}
