//! Tool trait and registry
//!
//! Tools are the external capabilities the executor invokes: data fetch,
//! analysis, visualization and reporting. The registry is filled once at
//! startup and only read afterwards.

use crate::config::Config;
use crate::error::ResearchError;
use crate::models::{TaskType, ToolInput, ToolResult};
use crate::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub mod backtest;
pub mod charts;
pub mod market_data;
pub mod reports;
pub mod technical;

pub use backtest::{SimpleBacktesterTool, StrategyComparisonTool};
pub use charts::ChartGeneratorTool;
pub use market_data::StockAggregatorTool;
pub use reports::{PresentationGeneratorTool, ReportGeneratorTool};
pub use technical::{TechnicalAnalyzerTool, TradingSignalsTool};

/// A single tool. Failures are reported through `ToolResult`, never by panicking.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn description(&self) -> &'static str;
    async fn execute(&self, input: &ToolInput) -> ToolResult;
}

/// The built-in tool kinds the planner templates refer to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ToolId {
    StockAggregator,
    TechnicalAnalyzer,
    TradingSignals,
    SimpleBacktester,
    StrategyComparison,
    ChartGenerator,
    PdfReportGenerator,
    PresentationGenerator,
}

impl ToolId {
    pub const ALL: [ToolId; 8] = [
        ToolId::StockAggregator,
        ToolId::TechnicalAnalyzer,
        ToolId::TradingSignals,
        ToolId::SimpleBacktester,
        ToolId::StrategyComparison,
        ToolId::ChartGenerator,
        ToolId::PdfReportGenerator,
        ToolId::PresentationGenerator,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ToolId::StockAggregator => "stock_aggregator",
            ToolId::TechnicalAnalyzer => "technical_analyzer",
            ToolId::TradingSignals => "trading_signals",
            ToolId::SimpleBacktester => "simple_backtester",
            ToolId::StrategyComparison => "strategy_comparison",
            ToolId::ChartGenerator => "chart_generator",
            ToolId::PdfReportGenerator => "pdf_report_generator",
            ToolId::PresentationGenerator => "presentation_generator",
        }
    }

    pub fn task_type(self) -> TaskType {
        match self {
            ToolId::StockAggregator => TaskType::DataFetch,
            ToolId::TechnicalAnalyzer
            | ToolId::TradingSignals
            | ToolId::SimpleBacktester
            | ToolId::StrategyComparison => TaskType::Analysis,
            ToolId::ChartGenerator => TaskType::Visualization,
            ToolId::PdfReportGenerator | ToolId::PresentationGenerator => TaskType::Reporting,
        }
    }

    pub fn required_inputs(self) -> &'static [&'static str] {
        match self {
            ToolId::StockAggregator => &["symbol"],
            ToolId::TechnicalAnalyzer => &["prices"],
            ToolId::TradingSignals | ToolId::SimpleBacktester => &["analysis"],
            ToolId::StrategyComparison => &["left", "right"],
            ToolId::ChartGenerator => &["analysis", "chart_type", "output_path"],
            ToolId::PdfReportGenerator | ToolId::PresentationGenerator => {
                &["analysis", "output_path"]
            }
        }
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A registered tool with its declared contract
#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub task_type: TaskType,
    pub required_inputs: Vec<String>,
    pub tool: Arc<dyn Tool>,
}

impl ToolDescriptor {
    pub fn summary(&self) -> ToolSummary {
        ToolSummary {
            name: self.name.clone(),
            task_type: self.task_type,
            required_inputs: self.required_inputs.clone(),
            description: self.tool.description().to_string(),
        }
    }
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("task_type", &self.task_type)
            .field("required_inputs", &self.required_inputs)
            .finish()
    }
}

/// Serializable view of a descriptor
#[derive(Debug, Clone, Serialize)]
pub struct ToolSummary {
    pub name: String,
    pub task_type: TaskType,
    pub required_inputs: Vec<String>,
    pub description: String,
}

/// Tool registry for looking up tools by exact name
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, ToolDescriptor>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    pub fn register(
        &mut self,
        name: &str,
        tool: Arc<dyn Tool>,
        task_type: TaskType,
        required_inputs: &[&str],
    ) -> Result<()> {
        if self.tools.contains_key(name) {
            return Err(ResearchError::DuplicateTool(name.to_string()));
        }

        self.tools.insert(
            name.to_string(),
            ToolDescriptor {
                name: name.to_string(),
                task_type,
                required_inputs: required_inputs.iter().map(|s| s.to_string()).collect(),
                tool,
            },
        );
        Ok(())
    }

    /// Register a built-in kind with its declared type and inputs
    pub fn register_builtin(&mut self, id: ToolId, tool: Arc<dyn Tool>) -> Result<()> {
        self.register(id.name(), tool, id.task_type(), id.required_inputs())
    }

    pub fn resolve(&self, name: &str) -> Result<&ToolDescriptor> {
        self.tools
            .get(name)
            .ok_or_else(|| ResearchError::ToolNotFound(name.to_string()))
    }

    /// Descriptors sorted by name
    pub fn list(&self) -> Vec<&ToolDescriptor> {
        self.tools.values().collect()
    }

    pub fn list_by_type(&self, task_type: TaskType) -> Vec<&ToolDescriptor> {
        self.tools
            .values()
            .filter(|d| d.task_type == task_type)
            .collect()
    }

    /// Fails with the first missing name
    pub fn ensure_registered<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Result<()> {
        for name in names {
            self.resolve(name)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Registry with every built-in tool wired to the given configuration
pub fn create_default_registry(config: &Config) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();

    registry.register_builtin(
        ToolId::StockAggregator,
        Arc::new(StockAggregatorTool::from_config(config)?),
    )?;
    registry.register_builtin(ToolId::TechnicalAnalyzer, Arc::new(TechnicalAnalyzerTool))?;
    registry.register_builtin(ToolId::TradingSignals, Arc::new(TradingSignalsTool))?;
    registry.register_builtin(ToolId::SimpleBacktester, Arc::new(SimpleBacktesterTool))?;
    registry.register_builtin(ToolId::StrategyComparison, Arc::new(StrategyComparisonTool))?;
    registry.register_builtin(ToolId::ChartGenerator, Arc::new(ChartGeneratorTool))?;
    registry.register_builtin(ToolId::PdfReportGenerator, Arc::new(ReportGeneratorTool))?;
    registry.register_builtin(
        ToolId::PresentationGenerator,
        Arc::new(PresentationGeneratorTool),
    )?;

    Ok(registry)
}

/// Parse a JSON array of optional numbers (nulls kept as `None`)
pub(crate) fn number_series(value: Option<&serde_json::Value>) -> Vec<Option<f64>> {
    value
        .and_then(serde_json::Value::as_array)
        .map(|items| items.iter().map(serde_json::Value::as_f64).collect())
        .unwrap_or_default()
}
