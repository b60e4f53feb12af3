//! Human-readable rendering of outcomes, session state and tools

use crate::agent::{DirectReply, QueryOutcome};
use crate::memory::{Session, SessionSummary};
use crate::models::{TaskRecord, TaskType};
use crate::tools::ToolRegistry;
use serde_json::Value;
use std::fmt::Write as _;

const HISTORY_LIMIT: usize = 5;

const EXAMPLES: &[&str] = &[
    "analyze AAPL",
    "show me technical analysis for TSLA with a chart",
    "compare AAPL vs MSFT",
    "backtest a strategy for NVDA over the last 2 years",
    "create a report for my recent analysis",
    "make a presentation",
];

pub fn render_help() -> String {
    let mut out = String::from("Ask a research question in plain English, for example:\n\n");
    for example in EXAMPLES {
        let _ = writeln!(out, "  - {}", example);
    }
    out.push_str(
        "\nCommands: help, status, history, tools, clear, quit\n\
         Charts, reports and slide decks are written under the output directory.\n",
    );
    out
}

pub fn render_status(summary: &SessionSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Session {}", summary.session_id);
    let _ = writeln!(
        out,
        "  started:       {} ({}s ago)",
        summary.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        summary.duration_secs
    );
    let _ = writeln!(out, "  interactions:  {}", summary.interactions);
    let _ = writeln!(
        out,
        "  recent:        {}",
        list_or_none(&summary.recent_symbols)
    );
    let _ = writeln!(
        out,
        "  analyzed:      {}",
        list_or_none(&summary.symbols_analyzed)
    );
    let _ = writeln!(out, "  artifacts:     {}", summary.artifacts.len());
    out
}

/// Last few queries, newest first
pub fn render_history(session: &Session) -> String {
    if session.history().is_empty() {
        return "No queries yet.\n".to_string();
    }

    let mut out = String::new();
    for entry in session.recent_history(HISTORY_LIMIT) {
        let _ = writeln!(
            out,
            "[{}] {} -> {} ({} task(s), {})",
            entry.query.received_at.format("%H:%M:%S"),
            entry.query.text,
            entry.query.intent,
            entry.report.records.len(),
            if entry.report.success { "ok" } else { "failed" }
        );
    }
    out
}

/// Registered tools grouped by task type
pub fn render_tools(registry: &ToolRegistry) -> String {
    let mut out = String::new();
    for task_type in [
        TaskType::DataFetch,
        TaskType::Analysis,
        TaskType::Visualization,
        TaskType::Reporting,
    ] {
        let tools = registry.list_by_type(task_type);
        if tools.is_empty() {
            continue;
        }
        let _ = writeln!(out, "{}:", task_type);
        for descriptor in tools {
            let _ = writeln!(
                out,
                "  {:<24} {} (needs: {})",
                descriptor.name,
                descriptor.tool.description(),
                descriptor.required_inputs.join(", ")
            );
        }
    }
    out
}

pub fn render_outcome(outcome: &QueryOutcome) -> String {
    match &outcome.reply {
        Some(DirectReply::Help) => return render_help(),
        Some(DirectReply::Status { summary }) => return render_status(summary),
        Some(DirectReply::Usage { text }) => {
            return format!(
                "I couldn't tell what to do with \"{}\".\n\n{}",
                text,
                render_help()
            )
        }
        None => {}
    }

    let query = &outcome.query;
    let report = &outcome.report;
    let mut out = String::new();

    let _ = write!(out, "Intent: {}", query.intent);
    if !query.entities.symbols.is_empty() {
        let _ = write!(out, " ({})", query.entities.symbols.join(", "));
    }
    out.push('\n');
    if let Some(ambiguity) = &query.ambiguity {
        let _ = writeln!(
            out,
            "Note: treated as {} instead of {}: {}",
            query.intent, ambiguity.requested, ambiguity.reason
        );
    }
    out.push('\n');

    for record in &report.records {
        let _ = writeln!(out, "{}", task_line(record));
    }

    let highlights: Vec<String> = report
        .succeeded_records()
        .filter_map(highlight)
        .collect();
    if !highlights.is_empty() {
        out.push('\n');
        for line in highlights {
            let _ = writeln!(out, "{}", line);
        }
    }

    let artifacts: Vec<&str> = report
        .succeeded_records()
        .filter(|r| {
            matches!(
                r.task.task_type,
                TaskType::Visualization | TaskType::Reporting
            )
        })
        .filter_map(|r| r.result.data.as_ref()?.get("file_path")?.as_str())
        .collect();
    if !artifacts.is_empty() {
        out.push_str("\nCreated:\n");
        for path in artifacts {
            let _ = writeln!(out, "  {}", path);
        }
    }

    let warnings = report.warnings().count();
    let _ = writeln!(
        out,
        "\n{}{}",
        if report.success {
            "Completed"
        } else {
            "Completed with failures"
        },
        if warnings > 0 {
            format!(" ({} warning(s))", warnings)
        } else {
            String::new()
        }
    );
    out
}

fn task_line(record: &TaskRecord) -> String {
    match record.outcome.failure() {
        None => format!(
            "  [ok]   {:<28} {:>6} ms",
            record.task.id, record.execution_time_ms
        ),
        Some(reason) => format!(
            "  [{}] {:<28} {}",
            if record.task.optional { "warn" } else { "fail" },
            record.task.id,
            reason
        ),
    }
}

/// One-line summary of the most useful output fields
fn highlight(record: &TaskRecord) -> Option<String> {
    let data = record.result.data.as_ref()?;
    let symbol = data
        .get("symbol")
        .and_then(Value::as_str)
        .or_else(|| record.task.symbol())
        .unwrap_or("");
    let f = |pointer: &str| data.pointer(pointer).and_then(Value::as_f64);

    if let Some(action) = data.get("latest_action").and_then(Value::as_str) {
        let count = data.get("signal_count").and_then(Value::as_u64).unwrap_or(0);
        return Some(format!(
            "{} signal: {} ({} signal(s) in period)",
            symbol,
            action.to_uppercase(),
            count
        ));
    }
    if let Some(total_return) = f("/performance_metrics/total_return") {
        return Some(format!(
            "{} backtest: return {:.2}%, Sharpe {:.2}, max drawdown {:.2}%, {} trade(s)",
            symbol,
            total_return * 100.0,
            f("/performance_metrics/sharpe_ratio").unwrap_or(0.0),
            f("/performance_metrics/max_drawdown").unwrap_or(0.0) * 100.0,
            f("/performance_metrics/trades").unwrap_or(0.0)
        ));
    }
    if let Some(leader) = data.get("leader").and_then(Value::as_str) {
        return Some(format!(
            "Leader: {} (return spread {:.2}%)",
            leader,
            f("/return_spread").unwrap_or(0.0) * 100.0
        ));
    }
    if let Some(close) = f("/latest/close") {
        let rsi = f("/latest/rsi")
            .map(|v| format!(", RSI {:.1}", v))
            .unwrap_or_default();
        return Some(format!("{} last close {:.2}{}", symbol, close, rsi));
    }
    None
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ResearchAgent;
    use crate::config::Config;
    use crate::models::ToolFailure;
    use crate::planner::TemplatePlanner;
    use crate::test_support::{stub_registry, StubTool};
    use crate::tools::ToolId;
    use std::sync::Arc;

    async fn outcome(text: &str, chart_fails: bool) -> (QueryOutcome, Session) {
        let overrides = if chart_fails {
            vec![(
                ToolId::ChartGenerator,
                StubTool::failing(ToolId::ChartGenerator, ToolFailure::Io("read-only".into())),
            )]
        } else {
            vec![]
        };
        let (registry, _) = stub_registry(overrides);
        let agent = ResearchAgent::new(
            Box::new(TemplatePlanner::new(&Config::default())),
            Arc::new(registry),
        )
        .unwrap();
        let mut session = Session::default();
        let outcome = agent.process(text, &mut session).await.unwrap();
        (outcome, session)
    }

    #[tokio::test]
    async fn test_outcome_lists_tasks_and_highlights() {
        let (outcome, _) = outcome("analyze AAPL", false).await;
        let text = render_outcome(&outcome);

        assert!(text.starts_with("Intent: stock_analysis (AAPL)"));
        assert!(text.contains("[ok]   data_AAPL"));
        assert!(text.contains("AAPL signal: HOLD"));
        assert!(text.trim_end().ends_with("Completed"));
    }

    #[tokio::test]
    async fn test_optional_failures_render_as_warnings() {
        let (outcome, _) = outcome("analyze AAPL with a chart", true).await;
        let text = render_outcome(&outcome);

        assert!(text.contains("[warn] chart_AAPL"));
        assert!(text.contains("(1 warning(s))"));
    }

    #[tokio::test]
    async fn test_direct_replies() {
        let (help, _) = outcome("help", false).await;
        assert!(render_outcome(&help).contains("compare AAPL vs MSFT"));

        let (unknown, session) = outcome("xyzzy plugh", false).await;
        assert!(render_outcome(&unknown).contains("\"xyzzy plugh\""));
        assert!(render_history(&session).contains("xyzzy plugh -> unknown"));
    }

    #[test]
    fn test_tools_grouped_by_type() {
        let (registry, _) = stub_registry(vec![]);
        let text = render_tools(&registry);

        let data_fetch = text.find("data_fetch:").unwrap();
        let reporting = text.find("reporting:").unwrap();
        assert!(data_fetch < reporting);
        assert!(text.contains("stock_aggregator"));
    }
}
