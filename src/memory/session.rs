//! Session memory
//!
//! Process-lifetime state for one interactive session: query history, the
//! latest dataset per symbol, generated artifacts and recent symbols.
//! Only the execution engine mutates it; callers read it.

use crate::models::{ExecutionReport, Query};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use tracing::debug;
use uuid::Uuid;

/// Number of recent symbols shown in a summary
const SUMMARY_RECENT_SYMBOLS: usize = 3;

/// One processed query and what came of it
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub query: Query,
    pub report: ExecutionReport,
}

/// Most recent fetch output for a symbol
#[derive(Debug, Clone, Serialize)]
pub struct CachedDataset {
    pub symbol: String,
    pub data: Value,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_secs: i64,
    pub interactions: usize,
    pub symbols_analyzed: Vec<String>,
    pub recent_symbols: Vec<String>,
    pub artifacts: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    max_recent_symbols: usize,
    history: Vec<HistoryEntry>,
    cache: BTreeMap<String, CachedDataset>,
    artifacts: Vec<String>,
    /// Oldest first, unique
    recent_symbols: VecDeque<String>,
    /// symbol → tool name → latest output
    analysis_results: BTreeMap<String, BTreeMap<String, Value>>,
}

impl Session {
    pub fn new(max_recent_symbols: usize) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            started_at: Utc::now(),
            max_recent_symbols: max_recent_symbols.max(1),
            history: Vec::new(),
            cache: BTreeMap::new(),
            artifacts: Vec::new(),
            recent_symbols: VecDeque::new(),
            analysis_results: BTreeMap::new(),
        }
    }

    // =============================
    // Reads
    // =============================

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Newest first
    pub fn recent_history(&self, count: usize) -> impl Iterator<Item = &HistoryEntry> {
        self.history.iter().rev().take(count)
    }

    pub fn cached(&self, symbol: &str) -> Option<&CachedDataset> {
        self.cache.get(symbol)
    }

    pub fn cached_symbols(&self) -> impl Iterator<Item = &str> {
        self.cache.keys().map(String::as_str)
    }

    pub fn artifacts(&self) -> &[String] {
        &self.artifacts
    }

    /// Oldest first
    pub fn recent_symbols(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.recent_symbols.iter().map(String::as_str)
    }

    pub fn most_recent_symbol(&self) -> Option<&str> {
        self.recent_symbols.back().map(String::as_str)
    }

    pub fn analysis_for(&self, symbol: &str) -> Option<&BTreeMap<String, Value>> {
        self.analysis_results.get(symbol)
    }

    /// Latest history entry from an analysis intent with at least one
    /// succeeded task
    pub fn latest_analysis(&self) -> Option<&HistoryEntry> {
        self.history
            .iter()
            .rev()
            .find(|e| e.query.intent.is_analysis() && e.report.has_succeeded_task())
    }

    pub fn summary(&self) -> SessionSummary {
        let now = Utc::now();
        let skip = self
            .recent_symbols
            .len()
            .saturating_sub(SUMMARY_RECENT_SYMBOLS);

        SessionSummary {
            session_id: self.session_id,
            started_at: self.started_at,
            duration_secs: (now - self.started_at).num_seconds(),
            interactions: self.history.len(),
            symbols_analyzed: self.analysis_results.keys().cloned().collect(),
            recent_symbols: self.recent_symbols.iter().skip(skip).cloned().collect(),
            artifacts: self.artifacts.clone(),
        }
    }

    pub fn export_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reset to a fresh session with a new id
    pub fn clear(&mut self) {
        debug!(session_id = %self.session_id, "Clearing session");
        *self = Session::new(self.max_recent_symbols);
    }

    // =============================
    // Writes (execution engine only)
    // =============================

    /// Replace whatever was cached for `symbol`
    pub(crate) fn cache_dataset(&mut self, symbol: &str, data: Value) {
        self.cache.insert(
            symbol.to_string(),
            CachedDataset {
                symbol: symbol.to_string(),
                data,
                fetched_at: Utc::now(),
            },
        );
    }

    /// Move `symbol` to the most recent position, evicting the oldest past the cap
    pub(crate) fn remember_symbol(&mut self, symbol: &str) {
        self.recent_symbols.retain(|s| s != symbol);
        self.recent_symbols.push_back(symbol.to_string());
        while self.recent_symbols.len() > self.max_recent_symbols {
            self.recent_symbols.pop_front();
        }
    }

    pub(crate) fn store_analysis_result(&mut self, symbol: &str, tool_name: &str, data: Value) {
        self.analysis_results
            .entry(symbol.to_string())
            .or_default()
            .insert(tool_name.to_string(), data);
    }

    pub(crate) fn record_artifact(&mut self, path: &str) {
        self.artifacts.push(path.to_string());
    }

    pub(crate) fn append_history(&mut self, query: Query, report: ExecutionReport) {
        self.history.push(HistoryEntry { query, report });
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(50)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Classification, Entities, Intent, Task, TaskOutcome, TaskRecord, TaskType, ToolResult,
    };
    use serde_json::json;

    fn entry(intent: Intent, succeeded: bool) -> (Query, ExecutionReport) {
        let query = Query::new(
            "test",
            Classification {
                intent,
                entities: Entities::default(),
                ambiguity: None,
            },
        );
        let records = if succeeded {
            vec![TaskRecord {
                task: Task::new("data_AAPL", "stock_aggregator", TaskType::DataFetch),
                outcome: TaskOutcome::Succeeded,
                result: ToolResult::success(json!({})),
                execution_time_ms: 1,
                completed_at: Utc::now(),
            }]
        } else {
            Vec::new()
        };
        let report = ExecutionReport {
            report_id: Uuid::new_v4(),
            query_id: query.query_id,
            intent,
            plan_fingerprint: String::new(),
            records,
            success: true,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };
        (query, report)
    }

    #[test]
    fn test_cache_overwrites() {
        let mut session = Session::default();
        session.cache_dataset("AAPL", json!({"prices": [1]}));
        session.cache_dataset("AAPL", json!({"prices": [2, 3]}));

        assert_eq!(session.cached("AAPL").unwrap().data, json!({"prices": [2, 3]}));
        assert_eq!(session.cached_symbols().count(), 1);
    }

    #[test]
    fn test_recent_symbols_are_unique_and_capped() {
        let mut session = Session::new(3);
        for symbol in ["AAPL", "MSFT", "AAPL", "TSLA", "F"] {
            session.remember_symbol(symbol);
        }

        let recent: Vec<_> = session.recent_symbols().collect();
        assert_eq!(recent, vec!["AAPL", "TSLA", "F"]);
        assert_eq!(session.most_recent_symbol(), Some("F"));
    }

    #[test]
    fn test_latest_analysis_skips_non_analysis() {
        let mut session = Session::default();
        assert!(session.latest_analysis().is_none());

        let (q, r) = entry(Intent::StockAnalysis, true);
        let analysis_id = q.query_id;
        session.append_history(q, r);

        let (q, r) = entry(Intent::Help, true);
        session.append_history(q, r);
        let (q, r) = entry(Intent::Comparison, false);
        session.append_history(q, r);

        let latest = session.latest_analysis().unwrap();
        assert_eq!(latest.query.query_id, analysis_id);
    }

    #[test]
    fn test_summary_and_clear() {
        let mut session = Session::default();
        for symbol in ["A", "B", "C", "D"] {
            session.remember_symbol(symbol);
        }
        session.store_analysis_result("D", "technical_analyzer", json!({}));
        session.record_artifact("charts/chart_D.svg");

        let summary = session.summary();
        assert_eq!(summary.recent_symbols, vec!["B", "C", "D"]);
        assert_eq!(summary.symbols_analyzed, vec!["D"]);
        assert_eq!(summary.artifacts.len(), 1);

        let exported: Value = serde_json::from_str(&session.export_json().unwrap()).unwrap();
        assert_eq!(exported["artifacts"][0], "charts/chart_D.svg");

        let old_id = session.session_id;
        session.clear();
        assert_ne!(session.session_id, old_id);
        assert!(session.artifacts().is_empty());
        assert!(session.most_recent_symbol().is_none());
    }
}
