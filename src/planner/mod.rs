//! Planner trait and the template planner
//!
//! Each intent has a small builder that emits tasks in a fixed order; the
//! result is validated into an immutable `TaskGraph`. Planning never talks
//! to tools. Unknown symbols are caught later by the data-fetch tool.

use crate::config::Config;
use crate::error::ResearchError;
use crate::memory::Session;
use crate::models::{Entities, Intent, Task, TaskType};
use crate::tools::ToolId;
use crate::Result;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub mod graph;
pub use graph::TaskGraph;

/// Indicators always computed so signals and backtests have their inputs
const BASE_INDICATORS: &[&str] = &["sma_20", "sma_50"];

/// Turns an intent plus entities into a task graph
pub trait Planner: Send + Sync {
    fn plan(&self, intent: Intent, entities: &Entities, session: &Session) -> Result<TaskGraph>;

    /// Every tool name any plan from this planner may reference
    fn required_tools(&self) -> Vec<String>;
}

/// Deterministic per-intent templates over the built-in tools
#[derive(Debug, Clone)]
pub struct TemplatePlanner {
    charts_dir: PathBuf,
    reports_dir: PathBuf,
    presentations_dir: PathBuf,
    default_period: String,
    backtest_period: String,
    initial_capital: f64,
    commission_rate: f64,
}

impl TemplatePlanner {
    pub fn new(config: &Config) -> Self {
        Self {
            charts_dir: config.charts_dir(),
            reports_dir: config.reports_dir(),
            presentations_dir: config.presentations_dir(),
            default_period: config.default_period.clone(),
            backtest_period: config.backtest_period.clone(),
            initial_capital: config.backtest_initial_capital,
            commission_rate: config.backtest_commission_rate,
        }
    }

    // =============================
    // Templates
    // =============================

    fn stock_analysis(&self, symbols: &[String], entities: &Entities) -> Vec<Task> {
        let mut tasks = Vec::new();
        for symbol in symbols {
            tasks.push(self.fetch(symbol, &self.default_period, entities));
            tasks.push(technical(symbol, None));
            tasks.push(signals(symbol));
            if entities.chart_requested {
                tasks.push(self.chart(symbol, "technical_chart", &format!("technical_{}", symbol)));
            }
        }
        tasks
    }

    fn technical_analysis(&self, symbols: &[String], entities: &Entities) -> Vec<Task> {
        let indicators = indicators_for(entities.indicator_hint.as_deref());

        let mut tasks = Vec::new();
        for symbol in symbols {
            tasks.push(self.fetch(symbol, &self.default_period, entities));
            tasks.push(technical(symbol, indicators.clone()));
            tasks.push(signals(symbol));
            tasks.push(self.chart(symbol, "technical_chart", &format!("technical_{}", symbol)));
        }
        tasks
    }

    fn comparison(&self, entities: &Entities) -> Result<Vec<Task>> {
        let [left, right] = entities.symbols.as_slice() else {
            return Err(ResearchError::PlanConstruction(format!(
                "comparison needs exactly two symbols, got {}",
                entities.symbols.len()
            )));
        };

        let merge_id = format!("comparison_{}_{}", left, right);
        let merge = Task::new(
            merge_id.clone(),
            ToolId::StrategyComparison.name(),
            TaskType::Analysis,
        )
        .output("left", &format!("technical_{}", left))
        .output("right", &format!("technical_{}", right));

        let mut tasks = vec![
            self.fetch(left, &self.default_period, entities),
            self.fetch(right, &self.default_period, entities),
            technical(left, None),
            technical(right, None),
            merge,
        ];
        if entities.chart_requested {
            tasks.push(self.chart(
                &format!("{}_{}", left, right),
                "comparison_chart",
                &merge_id,
            ));
        }
        Ok(tasks)
    }

    fn backtest(&self, symbols: &[String], entities: &Entities) -> Vec<Task> {
        let mut tasks = Vec::new();
        for symbol in symbols {
            let backtest_id = format!("backtest_{}", symbol);

            tasks.push(self.fetch(symbol, &self.backtest_period, entities));
            tasks.push(technical(symbol, Some(BASE_INDICATORS.to_vec())));
            tasks.push(
                Task::new(
                    backtest_id.clone(),
                    ToolId::SimpleBacktester.name(),
                    TaskType::Analysis,
                )
                .output("analysis", &format!("technical_{}", symbol))
                .literal("symbol", symbol.as_str())
                .literal("initial_capital", self.initial_capital)
                .literal("commission_rate", self.commission_rate),
            );
            if entities.chart_requested {
                tasks.push(self.chart(symbol, "performance_chart", &backtest_id));
            }
        }
        tasks
    }

    /// Single required reporting task over the latest analysis in the session
    fn document(&self, intent: Intent, session: &Session) -> Result<Vec<Task>> {
        let latest = session
            .latest_analysis()
            .ok_or_else(|| ResearchError::NoPriorAnalysis(intent.as_str().to_string()))?;

        let mut analysis = Map::new();
        let mut symbols: Vec<&str> = Vec::new();
        for record in latest.report.succeeded_records() {
            if record.task.task_type == TaskType::DataFetch {
                continue;
            }
            if let Some(symbol) = record.task.symbol() {
                if !symbols.contains(&symbol) {
                    symbols.push(symbol);
                }
            }
            if let Some(data) = &record.result.data {
                analysis.insert(record.task.id.clone(), data.clone());
            }
        }

        let (tool, prefix, dir, title) = match intent {
            Intent::Presentation => (
                ToolId::PresentationGenerator,
                "presentation",
                &self.presentations_dir,
                "Investment Analysis",
            ),
            _ => (
                ToolId::PdfReportGenerator,
                "report",
                &self.reports_dir,
                "Investment Analysis Report",
            ),
        };

        let task_id = if symbols.is_empty() {
            prefix.to_string()
        } else {
            format!("{}_{}", prefix, symbols.join("_"))
        };

        Ok(vec![Task::new(task_id.clone(), tool.name(), TaskType::Reporting)
            .literal("analysis", Value::Object(analysis))
            .literal("output_path", artifact_path(dir, &task_id, "md"))
            .literal("title", title)
            .literal("source_query", latest.query.text.as_str())
            .required()])
    }

    // =============================
    // Task builders
    // =============================

    fn fetch(&self, symbol: &str, default_period: &str, entities: &Entities) -> Task {
        let period = entities.period.as_deref().unwrap_or(default_period);

        let mut task = Task::new(
            format!("data_{}", symbol),
            ToolId::StockAggregator.name(),
            TaskType::DataFetch,
        )
        .literal("symbol", symbol)
        .literal("period", period);

        if let Some(range) = &entities.date_range {
            task = task
                .literal("start", range.start.to_string())
                .literal("end", range.end.to_string());
        }
        task
    }

    fn chart(&self, suffix: &str, chart_type: &str, source_task: &str) -> Task {
        let task_id = format!("chart_{}", suffix);
        Task::new(
            task_id.clone(),
            ToolId::ChartGenerator.name(),
            TaskType::Visualization,
        )
        .output("analysis", source_task)
        .literal("chart_type", chart_type)
        .literal("output_path", artifact_path(&self.charts_dir, &task_id, "svg"))
    }
}

fn technical(symbol: &str, indicators: Option<Vec<&str>>) -> Task {
    let mut task = Task::new(
        format!("technical_{}", symbol),
        ToolId::TechnicalAnalyzer.name(),
        TaskType::Analysis,
    )
    .output_field("prices", &format!("data_{}", symbol), "/prices")
    .literal("symbol", symbol);

    if let Some(list) = indicators {
        task = task.literal("indicators", list);
    }
    task
}

fn signals(symbol: &str) -> Task {
    Task::new(
        format!("signals_{}", symbol),
        ToolId::TradingSignals.name(),
        TaskType::Analysis,
    )
    .output("analysis", &format!("technical_{}", symbol))
    .literal("symbol", symbol)
}

/// Narrow the indicator list to a hint, keeping the signal inputs
fn indicators_for(hint: Option<&str>) -> Option<Vec<&'static str>> {
    let extra: &[&'static str] = match hint? {
        "rsi" => &["rsi"],
        "macd" => &["macd"],
        "bollinger_bands" => &["bollinger_bands"],
        "ema" => &["ema_12", "ema_26"],
        "sma" => &[],
        _ => return None,
    };
    Some(BASE_INDICATORS.iter().chain(extra).copied().collect())
}

fn artifact_path(dir: &Path, task_id: &str, extension: &str) -> String {
    dir.join(format!("{}.{}", task_id, extension))
        .to_string_lossy()
        .into_owned()
}

/// Named symbols, or the most recently used one when none were named
fn symbols_or_recent(intent: Intent, entities: &Entities, session: &Session) -> Result<Vec<String>> {
    if !entities.symbols.is_empty() {
        return Ok(entities.symbols.clone());
    }

    match session.most_recent_symbol() {
        Some(symbol) => {
            debug!(%intent, symbol, "No symbol in query, using most recent");
            Ok(vec![symbol.to_string()])
        }
        None => Err(ResearchError::PlanConstruction(format!(
            "{} needs a ticker symbol (e.g. AAPL)",
            intent
        ))),
    }
}

impl Planner for TemplatePlanner {
    fn plan(&self, intent: Intent, entities: &Entities, session: &Session) -> Result<TaskGraph> {
        let tasks = match intent {
            Intent::StockAnalysis => {
                let symbols = symbols_or_recent(intent, entities, session)?;
                self.stock_analysis(&symbols, entities)
            }
            Intent::TechnicalAnalysis => {
                let symbols = symbols_or_recent(intent, entities, session)?;
                self.technical_analysis(&symbols, entities)
            }
            Intent::Backtest => {
                let symbols = symbols_or_recent(intent, entities, session)?;
                self.backtest(&symbols, entities)
            }
            Intent::Comparison => self.comparison(entities)?,
            Intent::Report | Intent::Presentation => self.document(intent, session)?,
            Intent::Status | Intent::Help | Intent::Unknown => return Ok(TaskGraph::empty()),
        };

        let graph = TaskGraph::new(tasks)?;

        info!(
            %intent,
            tasks = graph.len(),
            fingerprint = %graph.fingerprint(),
            "Plan created"
        );
        Ok(graph)
    }

    fn required_tools(&self) -> Vec<String> {
        ToolId::ALL.iter().map(|id| id.name().to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::IntentClassifier;
    use crate::models::TaskInput;

    fn planner() -> TemplatePlanner {
        TemplatePlanner::new(&Config {
            output_dir: PathBuf::from("out"),
            ..Config::default()
        })
    }

    fn plan_text(text: &str, session: &Session) -> Result<TaskGraph> {
        let c = IntentClassifier::classify(text);
        planner().plan(c.intent, &c.entities, session)
    }

    #[test]
    fn test_stock_analysis_plan() {
        let graph = plan_text("analyze AAPL", &Session::default()).unwrap();

        assert_eq!(
            graph.task_ids(),
            vec!["data_AAPL", "technical_AAPL", "signals_AAPL"]
        );
        assert!(graph.get("data_AAPL").unwrap().depends_on.is_empty());
        assert!(graph.get("technical_AAPL").unwrap().depends_on.contains("data_AAPL"));
        assert!(graph.get("signals_AAPL").unwrap().depends_on.contains("technical_AAPL"));

        let fetch = graph.get("data_AAPL").unwrap();
        assert_eq!(fetch.symbol(), Some("AAPL"));
        assert_eq!(
            fetch.inputs.get("period"),
            Some(&TaskInput::Literal { value: "1y".into() })
        );
    }

    #[test]
    fn test_comparison_plan_has_independent_fetches() {
        let graph = plan_text("compare TSLA vs F", &Session::default()).unwrap();

        assert_eq!(
            graph.task_ids(),
            vec![
                "data_TSLA",
                "data_F",
                "technical_TSLA",
                "technical_F",
                "comparison_TSLA_F"
            ]
        );
        assert!(graph.get("data_TSLA").unwrap().depends_on.is_empty());
        assert!(graph.get("data_F").unwrap().depends_on.is_empty());

        let merge = graph.get("comparison_TSLA_F").unwrap();
        let deps: Vec<_> = merge.depends_on.iter().map(String::as_str).collect();
        assert_eq!(deps, vec!["technical_F", "technical_TSLA"]);
    }

    #[test]
    fn test_report_on_fresh_session() {
        let result = plan_text("create a report", &Session::default());
        assert!(matches!(result, Err(ResearchError::NoPriorAnalysis(_))));
    }

    #[test]
    fn test_missing_symbol_falls_back_to_recent() {
        let mut session = Session::default();
        assert!(matches!(
            plan_text("backtest a strategy", &session),
            Err(ResearchError::PlanConstruction(_))
        ));

        session.remember_symbol("NVDA");
        let graph = plan_text("backtest a strategy", &session).unwrap();
        assert_eq!(
            graph.task_ids(),
            vec!["data_NVDA", "technical_NVDA", "backtest_NVDA"]
        );

        let fetch = graph.get("data_NVDA").unwrap();
        assert_eq!(
            fetch.inputs.get("period"),
            Some(&TaskInput::Literal { value: "2y".into() })
        );
    }

    #[test]
    fn test_chart_tasks_are_optional_with_fixed_paths() {
        let graph = plan_text("show me the RSI chart for MSFT", &Session::default()).unwrap();
        let chart = graph.get("chart_MSFT").unwrap();

        assert!(chart.optional);
        assert_eq!(
            chart.inputs.get("output_path"),
            Some(&TaskInput::Literal {
                value: artifact_path(Path::new("out/charts"), "chart_MSFT", "svg").into()
            })
        );

        let technical = graph.get("technical_MSFT").unwrap();
        assert_eq!(
            technical.inputs.get("indicators"),
            Some(&TaskInput::Literal {
                value: serde_json::json!(["sma_20", "sma_50", "rsi"])
            })
        );
    }

    #[test]
    fn test_empty_plans() {
        for text in ["help", "status", "xyzzy plugh"] {
            assert!(plan_text(text, &Session::default()).unwrap().is_empty(), "{}", text);
        }
    }

    #[test]
    fn test_planning_is_deterministic() {
        let session = Session::default();
        let a = plan_text("compare AAPL vs MSFT with a chart", &session).unwrap();
        let b = plan_text("compare AAPL vs MSFT with a chart", &session).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.tasks().last().unwrap().id, "chart_AAPL_MSFT");
    }

    #[test]
    fn test_required_tools_cover_builtins() {
        assert_eq!(planner().required_tools().len(), ToolId::ALL.len());
    }
}
