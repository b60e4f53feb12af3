//! SVG line charts

use crate::models::{ToolFailure, ToolInput, ToolResult};
use crate::tools::{number_series, Tool};
use serde_json::{json, Value};
use std::fmt::Write as _;
use std::path::Path;
use tracing::debug;

const WIDTH: f64 = 900.0;
const HEIGHT: f64 = 420.0;
const MARGIN: f64 = 40.0;
const PALETTE: &[&str] = &["#1f77b4", "#ff7f0e", "#2ca02c", "#d62728"];

/// A named line, gaps kept as `None`
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub name: String,
    pub points: Vec<Option<f64>>,
}

/// Pick the lines to draw for a chart type
fn lines_for(chart_type: &str, analysis: &Value) -> Result<Vec<Line>, ToolFailure> {
    let line = |name: &str, value: Option<&Value>| Line {
        name: name.to_string(),
        points: number_series(value),
    };

    let lines = match chart_type {
        "technical_chart" => {
            let series = analysis.get("series");
            let mut lines = vec![line("close", analysis.get("close"))];
            for name in ["sma_20", "sma_50", "bb_upper", "bb_lower"] {
                if let Some(values) = series.and_then(|s| s.get(name)) {
                    lines.push(line(name, Some(values)));
                }
            }
            lines
        }
        "performance_chart" => vec![line("equity", analysis.get("equity_curve"))],
        "comparison_chart" => analysis
            .get("normalized")
            .and_then(Value::as_object)
            .map(|by_symbol| {
                by_symbol
                    .iter()
                    .map(|(symbol, values)| line(symbol.as_str(), Some(values)))
                    .collect()
            })
            .unwrap_or_default(),
        other => {
            return Err(ToolFailure::InvalidInput(format!(
                "unknown chart type '{}'",
                other
            )))
        }
    };

    let lines: Vec<Line> = lines
        .into_iter()
        .filter(|l| l.points.iter().any(Option::is_some))
        .collect();
    if lines.is_empty() {
        return Err(ToolFailure::InsufficientData(format!(
            "nothing to plot for {}",
            chart_type
        )));
    }
    Ok(lines)
}

/// Render lines sharing one y axis. Gaps split a line into segments.
pub fn render_svg(title: &str, lines: &[Line]) -> String {
    let values = lines.iter().flat_map(|l| l.points.iter().flatten().copied());
    let (min, max) = values.fold((f64::MAX, f64::MIN), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let span = if max > min { max - min } else { 1.0 };
    let len = lines.iter().map(|l| l.points.len()).max().unwrap_or(0);
    let step = (WIDTH - 2.0 * MARGIN) / (len.saturating_sub(1).max(1)) as f64;

    let x = |i: usize| MARGIN + i as f64 * step;
    let y = |v: f64| HEIGHT - MARGIN - (v - min) / span * (HEIGHT - 2.0 * MARGIN);

    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = WIDTH,
        h = HEIGHT
    );
    let _ = writeln!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#);
    let _ = writeln!(
        svg,
        r#"<text x="{}" y="24" font-family="sans-serif" font-size="16">{}</text>"#,
        MARGIN,
        escape(title)
    );

    for (n, line) in lines.iter().enumerate() {
        let color = PALETTE[n % PALETTE.len()];
        let mut segment: Vec<String> = Vec::new();
        let flush = |segment: &mut Vec<String>, svg: &mut String| {
            if segment.len() > 1 {
                let _ = writeln!(
                    svg,
                    r#"<polyline fill="none" stroke="{}" stroke-width="1.5" points="{}"/>"#,
                    color,
                    segment.join(" ")
                );
            }
            segment.clear();
        };

        for (i, point) in line.points.iter().enumerate() {
            match point {
                Some(v) => segment.push(format!("{:.1},{:.1}", x(i), y(*v))),
                None => flush(&mut segment, &mut svg),
            }
        }
        flush(&mut segment, &mut svg);

        let _ = writeln!(
            svg,
            r#"<text x="{}" y="{}" font-family="sans-serif" font-size="12" fill="{}">{}</text>"#,
            WIDTH - MARGIN - 120.0,
            MARGIN + 14.0 * n as f64,
            color,
            escape(&line.name)
        );
    }

    svg.push_str("</svg>\n");
    svg
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub(crate) async fn write_artifact(path: &str, contents: &str) -> Result<(), ToolFailure> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, contents).await?;
    Ok(())
}

/// `{analysis, chart_type, output_path}` → `{file_path}`
pub struct ChartGeneratorTool;

impl ChartGeneratorTool {
    async fn chart(&self, input: &ToolInput) -> Result<Value, ToolFailure> {
        let analysis = input.require("analysis")?;
        let chart_type = input.require_str("chart_type")?;
        let output_path = input.require_str("output_path")?;

        let lines = lines_for(chart_type, analysis)?;
        let title = match analysis.get("symbol").and_then(Value::as_str) {
            Some(symbol) => format!("{} {}", symbol, chart_type.replace('_', " ")),
            None => chart_type.replace('_', " "),
        };

        write_artifact(output_path, &render_svg(&title, &lines)).await?;
        debug!(path = %output_path, chart_type, "Chart written");

        Ok(json!({
            "file_path": output_path,
            "chart_type": chart_type,
            "series": lines.iter().map(|l| l.name.as_str()).collect::<Vec<_>>(),
        }))
    }
}

#[async_trait::async_trait]
impl Tool for ChartGeneratorTool {
    fn description(&self) -> &'static str {
        "Render price, indicator, equity or comparison lines to an SVG file"
    }

    async fn execute(&self, input: &ToolInput) -> ToolResult {
        self.chart(input).await.into()
    }
}
