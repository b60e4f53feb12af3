//! Markdown reports and slide decks
//!
//! Both tools take `analysis`: a map from task id to that task's output, as
//! assembled by the planner from the latest analysis in the session.

use crate::models::{ToolFailure, ToolInput, ToolResult};
use crate::tools::charts::write_artifact;
use crate::tools::Tool;
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::fmt::Write as _;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub title: String,
    pub bullets: Vec<String>,
}

fn pct(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.2}%", v * 100.0))
        .unwrap_or_else(|| "n/a".to_string())
}

fn num(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.2}", v))
        .unwrap_or_else(|| "n/a".to_string())
}

fn technical_section(symbol: &str, output: &Value) -> Section {
    let latest = |key: &str| output.pointer(&format!("/latest/{}", key)).and_then(Value::as_f64);
    let mut bullets = vec![format!("Last close: {}", num(latest("close")))];
    for (key, label) in [
        ("sma_20", "SMA 20"),
        ("sma_50", "SMA 50"),
        ("rsi", "RSI 14"),
        ("macd", "MACD"),
    ] {
        if let Some(v) = latest(key) {
            bullets.push(format!("{}: {:.2}", label, v));
        }
    }
    Section {
        title: format!("{} technical analysis", symbol),
        bullets,
    }
}

fn signals_section(symbol: &str, output: &Value) -> Section {
    let mut bullets = vec![format!(
        "Latest action: {}",
        output
            .get("latest_action")
            .and_then(Value::as_str)
            .unwrap_or("hold")
    )];
    let signals = output
        .get("signals")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for signal in signals.iter().rev().take(5) {
        bullets.push(format!(
            "{} {}: {}",
            signal.get("date").and_then(Value::as_str).unwrap_or("?"),
            signal.get("action").and_then(Value::as_str).unwrap_or("?"),
            signal.get("reason").and_then(Value::as_str).unwrap_or("")
        ));
    }
    Section {
        title: format!("{} trading signals", symbol),
        bullets,
    }
}

fn performance_section(symbol: &str, output: &Value) -> Section {
    let metric = |key: &str| {
        output
            .pointer(&format!("/performance_metrics/{}", key))
            .and_then(Value::as_f64)
    };
    Section {
        title: format!("{} backtest performance", symbol),
        bullets: vec![
            format!("Total return: {}", pct(metric("total_return"))),
            format!("Sharpe ratio: {}", num(metric("sharpe_ratio"))),
            format!("Max drawdown: {}", pct(metric("max_drawdown"))),
            format!("Win rate: {}", pct(metric("win_rate"))),
            format!("Trades: {}", num(metric("trades"))),
            format!("Final value: {}", num(metric("final_value"))),
        ],
    }
}

fn comparison_section(output: &Value) -> Section {
    let mut bullets = Vec::new();
    if let Some(metrics) = output.get("metrics").and_then(Value::as_object) {
        for (symbol, stats) in metrics {
            let stat = |key: &str| stats.get(key).and_then(Value::as_f64);
            bullets.push(format!(
                "{}: return {}, volatility {}, RSI {}",
                symbol,
                pct(stat("period_return")),
                pct(stat("volatility")),
                num(stat("latest_rsi"))
            ));
        }
    }
    if let Some(leader) = output.get("leader").and_then(Value::as_str) {
        bullets.push(format!("Leader: {}", leader));
    }
    Section {
        title: "Comparison".to_string(),
        bullets,
    }
}

/// One section per recognised output, in task-id order
pub fn build_sections(analysis: &Map<String, Value>) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut charts = Vec::new();

    for (task_id, output) in analysis {
        let symbol = output
            .get("symbol")
            .and_then(Value::as_str)
            .unwrap_or(task_id.as_str());

        if output.get("performance_metrics").is_some() {
            sections.push(performance_section(symbol, output));
        } else if output.get("leader").is_some() {
            sections.push(comparison_section(output));
        } else if output.get("latest_action").is_some() {
            sections.push(signals_section(symbol, output));
        } else if output.get("latest").is_some() {
            sections.push(technical_section(symbol, output));
        } else if let Some(path) = output.get("file_path").and_then(Value::as_str) {
            charts.push(path.to_string());
        }
    }

    if !charts.is_empty() {
        sections.push(Section {
            title: "Charts".to_string(),
            bullets: charts,
        });
    }
    sections
}

fn analysis_map(input: &ToolInput) -> Result<&Map<String, Value>, ToolFailure> {
    let analysis = input
        .require("analysis")?
        .as_object()
        .ok_or_else(|| ToolFailure::InvalidInput("'analysis' must be an object".to_string()))?;
    if analysis.is_empty() {
        return Err(ToolFailure::InsufficientData(
            "no analysis results to report on".to_string(),
        ));
    }
    Ok(analysis)
}

pub fn render_report(title: &str, source_query: Option<&str>, sections: &[Section]) -> String {
    let mut doc = String::new();
    let _ = writeln!(doc, "# {}\n", title);
    let _ = writeln!(doc, "Generated {}", Utc::now().format("%Y-%m-%d %H:%M UTC"));
    if let Some(query) = source_query {
        let _ = writeln!(doc, "\nBased on: \"{}\"", query);
    }
    for section in sections {
        let _ = writeln!(doc, "\n## {}\n", section.title);
        for bullet in &section.bullets {
            let _ = writeln!(doc, "- {}", bullet);
        }
    }
    doc
}

pub fn render_slides(title: &str, sections: &[Section]) -> String {
    let mut slides = vec![format!(
        "# {}\n\n{}\n",
        title,
        Utc::now().format("%B %d, %Y")
    )];
    for section in sections {
        let mut slide = format!("# {}\n\n", section.title);
        for bullet in &section.bullets {
            let _ = writeln!(slide, "- {}", bullet);
        }
        slides.push(slide);
    }
    slides.join("\n---\n\n")
}

/// `{analysis, output_path, title?, source_query?}` → `{file_path}`
pub struct ReportGeneratorTool;

impl ReportGeneratorTool {
    async fn report(&self, input: &ToolInput) -> Result<Value, ToolFailure> {
        let sections = build_sections(analysis_map(input)?);
        let output_path = input.require_str("output_path")?;
        let title = input.str_or("title", "Investment Analysis Report");
        let source = input.get("source_query").and_then(Value::as_str);

        write_artifact(output_path, &render_report(title, source, &sections)).await?;
        debug!(path = %output_path, sections = sections.len(), "Report written");

        Ok(json!({ "file_path": output_path, "sections": sections.len() }))
    }
}

#[async_trait::async_trait]
impl Tool for ReportGeneratorTool {
    fn description(&self) -> &'static str {
        "Write a Markdown research report from the latest analysis"
    }

    async fn execute(&self, input: &ToolInput) -> ToolResult {
        self.report(input).await.into()
    }
}

/// `{analysis, output_path, title?}` → `{file_path, slides}`
pub struct PresentationGeneratorTool;

impl PresentationGeneratorTool {
    async fn present(&self, input: &ToolInput) -> Result<Value, ToolFailure> {
        let sections = build_sections(analysis_map(input)?);
        let output_path = input.require_str("output_path")?;
        let title = input.str_or("title", "Investment Analysis");

        write_artifact(output_path, &render_slides(title, &sections)).await?;
        debug!(path = %output_path, slides = sections.len() + 1, "Slide deck written");

        Ok(json!({ "file_path": output_path, "slides": sections.len() + 1 }))
    }
}

#[async_trait::async_trait]
impl Tool for PresentationGeneratorTool {
    fn description(&self) -> &'static str {
        "Write a Markdown slide deck from the latest analysis"
    }

    async fn execute(&self, input: &ToolInput) -> ToolResult {
        self.present(input).await.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn analysis() -> Value {
        json!({
            "backtest_TSLA": {
                "symbol": "TSLA",
                "performance_metrics": {"total_return": 0.125, "sharpe_ratio": 1.4,
                    "max_drawdown": 0.08, "win_rate": 0.5, "trades": 4, "final_value": 11250.0}
            },
            "chart_TSLA": {"file_path": "charts/chart_TSLA.svg"},
            "technical_TSLA": {"symbol": "TSLA", "latest": {"close": 210.5, "rsi": 48.2}},
        })
    }

    fn input(analysis: Value, path: &str) -> ToolInput {
        let params = json!({"analysis": analysis, "output_path": path});
        ToolInput {
            task_id: "report_TSLA".to_string(),
            tool_name: "pdf_report_generator".to_string(),
            parameters: params.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_sections_follow_outputs() {
        let sections = build_sections(analysis().as_object().unwrap());
        let titles: Vec<_> = sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["TSLA backtest performance", "TSLA technical analysis", "Charts"]
        );
        assert!(sections[0].bullets.contains(&"Total return: 12.50%".to_string()));
    }

    #[tokio::test]
    async fn test_report_written() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reports/report_TSLA.md");
        let path = path.to_str().unwrap();

        let result = ReportGeneratorTool.execute(&input(analysis(), path)).await;
        assert!(result.success, "{:?}", result.error);

        let doc = std::fs::read_to_string(path).unwrap();
        assert!(doc.starts_with("# Investment Analysis Report"));
        assert!(doc.contains("## TSLA technical analysis"));
    }

    #[tokio::test]
    async fn test_slides_separated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("deck.md");
        let path = path.to_str().unwrap();

        let result = PresentationGeneratorTool
            .execute(&input(analysis(), path))
            .await;
        assert_eq!(result.data.unwrap()["slides"], 4);

        let deck = std::fs::read_to_string(path).unwrap();
        assert_eq!(deck.matches("\n---\n").count(), 3);
    }

    #[tokio::test]
    async fn test_empty_analysis_rejected() {
        let result = ReportGeneratorTool
            .execute(&input(json!({}), "unused.md"))
            .await;
        assert!(matches!(
            result.error,
            Some(ToolFailure::InsufficientData(_))
        ));
    }
}
