//! Execution engine for task graphs
//!
//! Walks a validated graph in order, one task at a time. Failures stay local
//! to their task and its dependents; nothing is retried here.

use crate::memory::Session;
use crate::models::{
    ExecutionReport, FailureReason, Query, Task, TaskInput, TaskOutcome, TaskRecord, TaskState,
    TaskType, ToolFailure, ToolInput, ToolResult,
};
use crate::planner::TaskGraph;
use crate::tools::{ToolDescriptor, ToolRegistry};
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Executes task graphs against a read-only tool registry
pub struct ExecutionEngine {
    tool_registry: Arc<ToolRegistry>,
}

/// Per-run task states and successful outputs
struct RunState {
    states: HashMap<String, TaskState>,
    outputs: HashMap<String, Value>,
}

impl RunState {
    fn new(graph: &TaskGraph) -> Self {
        Self {
            states: graph
                .tasks()
                .iter()
                .map(|t| (t.id.clone(), TaskState::Pending))
                .collect(),
            outputs: HashMap::with_capacity(graph.len()),
        }
    }

    fn state(&self, task_id: &str) -> TaskState {
        self.states
            .get(task_id)
            .copied()
            .unwrap_or(TaskState::Pending)
    }

    fn transition(&mut self, task_id: &str, next: TaskState) {
        let current = self.state(task_id);
        debug_assert!(
            current.can_transition_to(next),
            "illegal transition {:?} -> {:?} for {}",
            current,
            next,
            task_id
        );
        debug!(task_id, from = ?current, to = ?next, "Task state change");
        self.states.insert(task_id.to_string(), next);
    }
}

impl ExecutionEngine {
    pub fn new(tool_registry: Arc<ToolRegistry>) -> Self {
        Self { tool_registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.tool_registry
    }

    /// Execute every task of `graph`, fold results into `session` and
    /// append the query to its history.
    pub async fn execute_plan(
        &self,
        graph: &TaskGraph,
        query: &Query,
        session: &mut Session,
    ) -> ExecutionReport {
        let started_at = Utc::now();
        let mut run = RunState::new(graph);
        let mut records = Vec::with_capacity(graph.len());

        debug!(query_id = %query.query_id, tasks = graph.len(), "Starting plan execution");

        for task in graph.tasks() {
            let start = Instant::now();
            let (outcome, result) = self.run_task(task, &mut run).await;

            if outcome == TaskOutcome::Succeeded {
                let data = result.data.clone().unwrap_or(Value::Null);
                apply_side_effects(task, &data, session);
                run.outputs.insert(task.id.clone(), data);
            }

            records.push(TaskRecord {
                task: task.clone(),
                outcome,
                result,
                execution_time_ms: start.elapsed().as_millis() as u64,
                completed_at: Utc::now(),
            });
        }

        debug_assert!(graph.tasks().iter().all(|t| run.state(&t.id).is_terminal()));

        // Optional tasks may fail without failing the plan
        let success = records.iter().all(|r| r.task.optional || r.succeeded());

        let report = ExecutionReport {
            report_id: Uuid::new_v4(),
            query_id: query.query_id,
            intent: query.intent,
            plan_fingerprint: graph.fingerprint(),
            records,
            success,
            started_at,
            finished_at: Utc::now(),
        };

        info!(
            query_id = %query.query_id,
            intent = %query.intent,
            tasks = report.records.len(),
            failed = report.failures().count(),
            success,
            "Plan execution completed"
        );

        session.append_history(query.clone(), report.clone());
        report
    }

    async fn run_task(&self, task: &Task, run: &mut RunState) -> (TaskOutcome, ToolResult) {
        // -------------------------------------------------
        // 1. DEPENDENCY CHECK (short-circuit on failure)
        // -------------------------------------------------
        if let Some(dependency) = task
            .depends_on
            .iter()
            .find(|d| run.state(d) != TaskState::Succeeded)
        {
            warn!(task_id = %task.id, %dependency, "Skipping task, dependency failed");
            run.transition(&task.id, TaskState::Failed);
            return fail(FailureReason::DependencyFailed {
                dependency: dependency.clone(),
            });
        }
        run.transition(&task.id, TaskState::Ready);

        // -------------------------------------------------
        // 2. TOOL LOOKUP + INPUT RESOLUTION
        // -------------------------------------------------
        let descriptor = match self.tool_registry.resolve(&task.tool_name) {
            Ok(descriptor) => descriptor,
            Err(_) => {
                warn!(task_id = %task.id, tool_name = %task.tool_name, "Tool not registered");
                run.transition(&task.id, TaskState::Failed);
                return fail(FailureReason::ToolNotFound {
                    tool: task.tool_name.clone(),
                });
            }
        };

        let input = match resolve_inputs(task, descriptor, &run.outputs) {
            Ok(input) => input,
            Err(key) => {
                warn!(task_id = %task.id, %key, "Required input unresolved");
                run.transition(&task.id, TaskState::Failed);
                return fail(FailureReason::MissingInput { key });
            }
        };

        // -------------------------------------------------
        // 3. INVOKE ONCE
        // -------------------------------------------------
        run.transition(&task.id, TaskState::Running);
        let result = descriptor.tool.execute(&input).await;

        if result.success {
            run.transition(&task.id, TaskState::Succeeded);
            (TaskOutcome::Succeeded, result)
        } else {
            let failure = result.error.clone().unwrap_or_else(|| {
                ToolFailure::Failed("tool reported failure without a reason".to_string())
            });
            warn!(task_id = %task.id, tool_name = %task.tool_name, error = %failure, "Tool execution failed");
            run.transition(&task.id, TaskState::Failed);
            (
                TaskOutcome::Failed {
                    reason: FailureReason::ToolExecution { failure },
                },
                result,
            )
        }
    }
}

fn fail(reason: FailureReason) -> (TaskOutcome, ToolResult) {
    let result = ToolResult::failure(ToolFailure::Failed(reason.to_string()));
    (TaskOutcome::Failed { reason }, result)
}

/// Substitute output references. Fails with the first declared input that
/// has no value.
fn resolve_inputs(
    task: &Task,
    descriptor: &ToolDescriptor,
    outputs: &HashMap<String, Value>,
) -> std::result::Result<ToolInput, String> {
    let mut parameters = Map::new();

    for (key, input) in &task.inputs {
        let value = match input {
            TaskInput::Literal { value } => Some(value.clone()),
            TaskInput::Output { task_id, pointer } => {
                let output = outputs.get(task_id);
                match pointer {
                    Some(p) => output.and_then(|o| o.pointer(p)).cloned(),
                    None => output.cloned(),
                }
            }
        };

        if let Some(value) = value.filter(|v| !v.is_null()) {
            parameters.insert(key.clone(), value);
        }
    }

    if let Some(missing) = descriptor
        .required_inputs
        .iter()
        .find(|k| !parameters.contains_key(k.as_str()))
    {
        return Err(missing.clone());
    }

    Ok(ToolInput {
        task_id: task.id.clone(),
        tool_name: task.tool_name.clone(),
        parameters,
    })
}

fn apply_side_effects(task: &Task, data: &Value, session: &mut Session) {
    let symbol = task
        .symbol()
        .or_else(|| data.get("symbol").and_then(Value::as_str))
        .map(str::to_string);

    if let Some(symbol) = &symbol {
        if task.task_type == TaskType::DataFetch {
            session.cache_dataset(symbol, data.clone());
            debug!(%symbol, "Dataset cached");
        }
        if task.task_type == TaskType::Analysis {
            session.store_analysis_result(symbol, &task.tool_name, data.clone());
        }
        if task.symbol().is_some() {
            session.remember_symbol(symbol);
        }
    }

    if matches!(
        task.task_type,
        TaskType::Visualization | TaskType::Reporting
    ) {
        if let Some(path) = data.get("file_path").and_then(Value::as_str) {
            session.record_artifact(path);
            debug!(path, "Artifact recorded");
        }
    }
}
