//! Research agent - the query pipeline
//!
//! TEXT → CLASSIFY → PLAN → EXECUTE → SESSION

use crate::classifier::IntentClassifier;
use crate::config::Config;
use crate::execution::ExecutionEngine;
use crate::memory::{Session, SessionSummary};
use crate::models::{ExecutionReport, Intent, Query};
use crate::planner::{Planner, TemplatePlanner};
use crate::tools::{create_default_registry, ToolRegistry};
use crate::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Answer for queries that need no tools
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DirectReply {
    Help,
    /// Session state as it was when the query arrived
    Status { summary: SessionSummary },
    /// The query was not understood
    Usage { text: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub query: Query,
    pub report: ExecutionReport,
    pub reply: Option<DirectReply>,
}

pub struct ResearchAgent {
    planner: Box<dyn Planner>,
    execution_engine: ExecutionEngine,
}

impl ResearchAgent {
    /// Fails if any tool the planner can emit is missing from the registry
    pub fn new(planner: Box<dyn Planner>, registry: Arc<ToolRegistry>) -> Result<Self> {
        let required = planner.required_tools();
        registry.ensure_registered(required.iter().map(String::as_str))?;

        debug!(tools = registry.len(), "Tool registry verified");

        Ok(Self {
            planner,
            execution_engine: ExecutionEngine::new(registry),
        })
    }

    /// Template planner over the built-in tools
    pub fn from_config(config: &Config) -> Result<Self> {
        let registry = create_default_registry(config)?;
        Self::new(Box::new(TemplatePlanner::new(config)), Arc::new(registry))
    }

    pub fn registry(&self) -> &ToolRegistry {
        self.execution_engine.registry()
    }

    /// Run one query to completion.
    ///
    /// Planning errors (`PlanConstruction`, `NoPriorAnalysis`, malformed
    /// graphs) are returned before any task runs and leave the session
    /// untouched. Task failures are inside the returned report.
    pub async fn process(&self, text: &str, session: &mut Session) -> Result<QueryOutcome> {
        let classification = IntentClassifier::classify(text);
        let query = Query::new(text.trim(), classification);

        info!(
            query_id = %query.query_id,
            intent = %query.intent,
            symbols = ?query.entities.symbols,
            "Processing query"
        );

        let reply = match query.intent {
            Intent::Help => Some(DirectReply::Help),
            Intent::Status => Some(DirectReply::Status {
                summary: session.summary(),
            }),
            Intent::Unknown => Some(DirectReply::Usage {
                text: query.text.clone(),
            }),
            _ => None,
        };

        let graph = self
            .planner
            .plan(query.intent, &query.entities, session)?;

        let report = self
            .execution_engine
            .execute_plan(&graph, &query, session)
            .await;

        Ok(QueryOutcome {
            query,
            report,
            reply,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResearchError;
    use crate::models::ToolFailure;
    use crate::test_support::{stub_for, stub_registry, StubTool};
    use crate::tools::{
        ChartGeneratorTool, PresentationGeneratorTool, ReportGeneratorTool,
        SimpleBacktesterTool, StrategyComparisonTool, TechnicalAnalyzerTool, ToolId,
        TradingSignalsTool,
    };
    use std::path::PathBuf;
    use tempfile::tempdir;
    use tokio_test::{assert_err, assert_ok};

    fn agent(registry: ToolRegistry) -> ResearchAgent {
        ResearchAgent::new(
            Box::new(TemplatePlanner::new(&Config::default())),
            Arc::new(registry),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_analyze_end_to_end() {
        let (registry, _) = stub_registry(vec![]);
        let agent = agent(registry);
        let mut session = Session::default();

        let outcome = assert_ok!(agent.process("analyze AAPL", &mut session).await);

        assert_eq!(outcome.query.intent, Intent::StockAnalysis);
        assert_eq!(outcome.query.entities.symbols, vec!["AAPL"]);
        assert_eq!(outcome.report.records.len(), 3);
        assert!(outcome.report.success);
        assert!(outcome.reply.is_none());
        assert!(session.cached("AAPL").is_some());
    }

    #[tokio::test]
    async fn test_comparison_with_failed_branch() {
        let fetch = StubTool::failing_for(
            ToolId::StockAggregator,
            "TSLA",
            ToolFailure::SymbolNotFound("TSLA".to_string()),
        );
        let (registry, stubs) = stub_registry(vec![(ToolId::StockAggregator, fetch)]);
        let agent = agent(registry);
        let mut session = Session::default();

        let outcome = assert_ok!(agent.process("compare TSLA vs F", &mut session).await);

        assert!(!outcome.report.success);
        assert!(outcome.report.record("technical_F").unwrap().succeeded());
        assert_eq!(stub_for(&stubs, ToolId::StrategyComparison).calls(), 0);
        assert_eq!(stub_for(&stubs, ToolId::TechnicalAnalyzer).calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_query_is_usage() {
        let (registry, _) = stub_registry(vec![]);
        let agent = agent(registry);
        let mut session = Session::default();

        let outcome = assert_ok!(agent.process("xyzzy plugh", &mut session).await);

        assert_eq!(outcome.query.intent, Intent::Unknown);
        assert!(outcome.query.entities.is_empty());
        assert!(outcome.report.records.is_empty());
        assert!(outcome.report.success);
        assert!(matches!(outcome.reply, Some(DirectReply::Usage { .. })));
    }

    #[tokio::test]
    async fn test_report_needs_prior_analysis() {
        let (registry, stubs) = stub_registry(vec![]);
        let agent = agent(registry);
        let mut session = Session::default();

        let err = assert_err!(agent.process("create a report", &mut session).await);
        assert!(matches!(err, ResearchError::NoPriorAnalysis(_)));
        assert!(session.history().is_empty());
        assert!(stubs.iter().all(|s| s.calls() == 0));

        assert_ok!(agent.process("analyze AAPL", &mut session).await);
        let outcome = assert_ok!(agent.process("create a report", &mut session).await);

        assert_eq!(outcome.report.task_order(), vec!["report_AAPL"]);
        assert!(!outcome.report.records[0].task.optional);
        assert!(outcome.report.success);
        assert_eq!(session.artifacts().len(), 1);

        let seen = stub_for(&stubs, ToolId::PdfReportGenerator).seen();
        let analysis = seen[0].get("analysis").unwrap();
        assert!(analysis.get("technical_AAPL").is_some());
        assert!(analysis.get("data_AAPL").is_none());
    }

    #[tokio::test]
    async fn test_status_reports_state_before_query() {
        let (registry, _) = stub_registry(vec![]);
        let agent = agent(registry);
        let mut session = Session::default();

        assert_ok!(agent.process("analyze MSFT", &mut session).await);
        let outcome = assert_ok!(agent.process("status", &mut session).await);

        match outcome.reply {
            Some(DirectReply::Status { summary }) => {
                assert_eq!(summary.interactions, 1);
                assert_eq!(summary.recent_symbols, vec!["MSFT"]);
            }
            other => panic!("expected status reply, got {:?}", other),
        }
        assert_eq!(session.history().len(), 2);
    }

    #[test]
    fn test_startup_rejects_incomplete_registry() {
        let mut registry = ToolRegistry::new();
        registry
            .register_builtin(ToolId::StockAggregator, StubTool::canned(ToolId::StockAggregator))
            .unwrap();

        let result = ResearchAgent::new(
            Box::new(TemplatePlanner::new(&Config::default())),
            Arc::new(registry),
        );
        assert!(matches!(result, Err(ResearchError::ToolNotFound(_))));
    }

    #[tokio::test]
    async fn test_backtest_and_report_with_builtin_tools() {
        let dir = tempdir().unwrap();
        let config = Config {
            output_dir: PathBuf::from(dir.path()),
            ..Config::default()
        };

        let mut registry = ToolRegistry::new();
        registry
            .register_builtin(ToolId::StockAggregator, StubTool::canned(ToolId::StockAggregator))
            .unwrap();
        registry.register_builtin(ToolId::TechnicalAnalyzer, Arc::new(TechnicalAnalyzerTool)).unwrap();
        registry.register_builtin(ToolId::TradingSignals, Arc::new(TradingSignalsTool)).unwrap();
        registry.register_builtin(ToolId::SimpleBacktester, Arc::new(SimpleBacktesterTool)).unwrap();
        registry.register_builtin(ToolId::StrategyComparison, Arc::new(StrategyComparisonTool)).unwrap();
        registry.register_builtin(ToolId::ChartGenerator, Arc::new(ChartGeneratorTool)).unwrap();
        registry.register_builtin(ToolId::PdfReportGenerator, Arc::new(ReportGeneratorTool)).unwrap();
        registry
            .register_builtin(ToolId::PresentationGenerator, Arc::new(PresentationGeneratorTool))
            .unwrap();

        let agent = ResearchAgent::new(
            Box::new(TemplatePlanner::new(&config)),
            Arc::new(registry),
        )
        .unwrap();
        let mut session = Session::new(config.max_recent_symbols);

        let backtest = assert_ok!(agent.process("backtest TSLA and plot it", &mut session).await);
        assert!(backtest.report.success, "{:?}", backtest.report.failures().collect::<Vec<_>>());
        assert!(backtest.report.record("chart_TSLA").unwrap().succeeded());

        let deck = assert_ok!(agent.process("make slides", &mut session).await);
        assert!(deck.report.success);

        let path = config.presentations_dir().join("presentation_TSLA.md");
        assert!(path.exists());
        assert_eq!(session.artifacts().len(), 2);
    }
}
