//! Deterministic stub tools for tests

use crate::models::{PriceBar, ToolFailure, ToolInput, ToolResult};
use crate::tools::{Tool, ToolId, ToolRegistry};
use chrono::{Duration, NaiveDate};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Daily bars with a slow wave so moving averages cross
pub fn sample_prices(count: usize) -> Vec<PriceBar> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    (0..count)
        .map(|i| {
            let close = 100.0 + 10.0 * (i as f64 / 8.0).sin() + i as f64 * 0.1;
            PriceBar {
                date: start + Duration::days(i as i64),
                open: close - 0.5,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1_000_000 + i as u64 * 1_000,
            }
        })
        .collect()
}

enum Behavior {
    Canned,
    Fail(ToolFailure),
    /// Fail only when the `symbol` input equals this value
    FailFor(String, ToolFailure),
}

/// Counts calls and returns canned output shaped like the real tool's
pub struct StubTool {
    id: ToolId,
    behavior: Behavior,
    calls: AtomicUsize,
    seen: Mutex<Vec<ToolInput>>,
}

impl StubTool {
    fn with(id: ToolId, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            id,
            behavior,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn canned(id: ToolId) -> Arc<Self> {
        Self::with(id, Behavior::Canned)
    }

    pub fn failing(id: ToolId, failure: ToolFailure) -> Arc<Self> {
        Self::with(id, Behavior::Fail(failure))
    }

    pub fn failing_for(id: ToolId, symbol: &str, failure: ToolFailure) -> Arc<Self> {
        Self::with(id, Behavior::FailFor(symbol.to_string(), failure))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<ToolInput> {
        self.seen.lock().unwrap().clone()
    }

    fn canned_output(&self, input: &ToolInput) -> Value {
        let symbol = input.get("symbol").cloned().unwrap_or(Value::Null);
        match self.id {
            ToolId::StockAggregator => json!({
                "symbol": symbol,
                "prices": sample_prices(5),
                "company_meta": {"name": "Stub Corp"},
            }),
            ToolId::TechnicalAnalyzer => json!({
                "symbol": symbol,
                "close": [1.0, 2.0, 3.0],
                "series": {"sma_20": [null, 1.5, 2.5]},
                "latest": {"close": 3.0, "rsi": 55.0},
            }),
            ToolId::TradingSignals => json!({
                "symbol": symbol,
                "signals": [],
                "latest_action": "hold",
                "signal_count": 0,
            }),
            ToolId::SimpleBacktester => json!({
                "symbol": symbol,
                "performance_metrics": {"total_return": 0.1, "trades": 1},
            }),
            ToolId::StrategyComparison => json!({"leader": "stub", "return_spread": 0.0}),
            ToolId::ChartGenerator
            | ToolId::PdfReportGenerator
            | ToolId::PresentationGenerator => json!({
                "file_path": input.get("output_path").cloned().unwrap_or(Value::Null),
            }),
        }
    }
}

#[async_trait::async_trait]
impl Tool for StubTool {
    fn description(&self) -> &'static str {
        "stub"
    }

    async fn execute(&self, input: &ToolInput) -> ToolResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(input.clone());

        let symbol = input.get("symbol").and_then(Value::as_str);
        match &self.behavior {
            Behavior::Fail(failure) => ToolResult::failure(failure.clone()),
            Behavior::FailFor(target, failure) if symbol == Some(target.as_str()) => {
                ToolResult::failure(failure.clone())
            }
            _ => ToolResult::success(self.canned_output(input)),
        }
    }
}

/// Registry of canned stubs for every built-in, with overrides swapped in
pub fn stub_registry(overrides: Vec<(ToolId, Arc<StubTool>)>) -> (ToolRegistry, Vec<Arc<StubTool>>) {
    let mut registry = ToolRegistry::new();
    let mut stubs = Vec::new();

    for id in ToolId::ALL {
        let stub = overrides
            .iter()
            .find(|(o, _)| *o == id)
            .map(|(_, s)| s.clone())
            .unwrap_or_else(|| StubTool::canned(id));
        registry.register_builtin(id, stub.clone()).unwrap();
        stubs.push(stub);
    }

    (registry, stubs)
}

/// Stub for `id` from the list returned by `stub_registry`
pub fn stub_for(stubs: &[Arc<StubTool>], id: ToolId) -> Arc<StubTool> {
    stubs.iter().find(|s| s.id == id).cloned().unwrap()
}
