//! Backtesting and two-symbol comparison

use crate::models::{ToolFailure, ToolInput, ToolResult};
use crate::tools::{number_series, Tool};
use serde::Serialize;
use serde_json::{json, Value};

const TRADING_DAYS: f64 = 252.0;

fn closes(analysis: &Value) -> Vec<f64> {
    number_series(analysis.get("close"))
        .into_iter()
        .flatten()
        .collect()
}

fn daily_returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect()
}

fn mean_and_std(values: &[f64]) -> (f64, f64) {
    if values.len() < 2 {
        return (values.first().copied().unwrap_or(0.0), 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Trade {
    pub entry_date: Value,
    pub exit_date: Value,
    pub entry_price: f64,
    pub exit_price: f64,
    pub pnl: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub trades: usize,
    pub final_value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestRun {
    pub metrics: PerformanceMetrics,
    pub equity_curve: Vec<f64>,
    pub trades: Vec<Trade>,
}

/// Long-only: enter when SMA 20 is above SMA 50, exit when it falls below.
/// An open position is closed on the last bar.
pub fn run_crossover_backtest(
    dates: &[Value],
    close: &[f64],
    fast: &[Option<f64>],
    slow: &[Option<f64>],
    initial_capital: f64,
    commission_rate: f64,
) -> BacktestRun {
    let mut cash = initial_capital;
    let mut shares = 0.0;
    let mut entry: Option<(usize, f64, f64)> = None; // (bar, price, cost basis)
    let mut trades = Vec::new();
    let mut equity_curve = Vec::with_capacity(close.len());

    let date_at = |i: usize| dates.get(i).cloned().unwrap_or(Value::Null);
    let last = close.len().saturating_sub(1);

    for (i, &price) in close.iter().enumerate() {
        let above = match (fast.get(i).copied().flatten(), slow.get(i).copied().flatten()) {
            (Some(f), Some(s)) => Some(f > s),
            _ => None,
        };

        if entry.is_none() && above == Some(true) && i < last {
            let cost = cash;
            shares = cash * (1.0 - commission_rate) / price;
            cash = 0.0;
            entry = Some((i, price, cost));
        } else if let Some((entry_bar, entry_price, cost)) = entry {
            if above == Some(false) || i == last {
                cash = shares * price * (1.0 - commission_rate);
                shares = 0.0;
                trades.push(Trade {
                    entry_date: date_at(entry_bar),
                    exit_date: date_at(i),
                    entry_price,
                    exit_price: price,
                    pnl: cash - cost,
                });
                entry = None;
            }
        }

        equity_curve.push(cash + shares * price);
    }

    let final_value = equity_curve.last().copied().unwrap_or(initial_capital);
    let (mean, std) = mean_and_std(&daily_returns(&equity_curve));
    let sharpe_ratio = if std > 0.0 {
        mean / std * TRADING_DAYS.sqrt()
    } else {
        0.0
    };

    let mut peak = f64::MIN;
    let mut max_drawdown: f64 = 0.0;
    for &value in &equity_curve {
        peak = peak.max(value);
        if peak > 0.0 {
            max_drawdown = max_drawdown.max((peak - value) / peak);
        }
    }

    let wins = trades.iter().filter(|t| t.pnl > 0.0).count();
    let win_rate = if trades.is_empty() {
        0.0
    } else {
        wins as f64 / trades.len() as f64
    };

    BacktestRun {
        metrics: PerformanceMetrics {
            total_return: final_value / initial_capital - 1.0,
            sharpe_ratio,
            max_drawdown,
            win_rate,
            trades: trades.len(),
            final_value,
        },
        equity_curve,
        trades,
    }
}

/// `{analysis, initial_capital?, commission_rate?}` → `{performance_metrics, equity_curve, trades}`
pub struct SimpleBacktesterTool;

impl SimpleBacktesterTool {
    fn backtest(&self, input: &ToolInput) -> Result<Value, ToolFailure> {
        let analysis = input.require("analysis")?;
        let close = closes(analysis);
        if close.len() < 2 {
            return Err(ToolFailure::InsufficientData(format!(
                "backtest needs at least 2 bars, got {}",
                close.len()
            )));
        }

        let initial_capital = input.f64_or("initial_capital", 10_000.0);
        if initial_capital <= 0.0 {
            return Err(ToolFailure::InvalidInput(
                "initial_capital must be positive".to_string(),
            ));
        }
        let commission_rate = input.f64_or("commission_rate", 0.001);

        let series = analysis.get("series");
        let dates = analysis
            .get("dates")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let run = run_crossover_backtest(
            &dates,
            &close,
            &number_series(series.and_then(|s| s.get("sma_20"))),
            &number_series(series.and_then(|s| s.get("sma_50"))),
            initial_capital,
            commission_rate,
        );

        Ok(json!({
            "symbol": analysis.get("symbol").cloned().unwrap_or(Value::Null),
            "strategy": "sma_crossover",
            "initial_capital": initial_capital,
            "commission_rate": commission_rate,
            "performance_metrics": run.metrics,
            "equity_curve": run.equity_curve,
            "trades": run.trades,
        }))
    }
}

#[async_trait::async_trait]
impl Tool for SimpleBacktesterTool {
    fn description(&self) -> &'static str {
        "Backtest a long-only SMA crossover strategy with commission"
    }

    async fn execute(&self, input: &ToolInput) -> ToolResult {
        self.backtest(input).into()
    }
}

/// `{left, right}` technical outputs → side-by-side performance
pub struct StrategyComparisonTool;

fn symbol_stats(analysis: &Value) -> Result<(String, Value, f64, Vec<f64>), ToolFailure> {
    let symbol = analysis
        .get("symbol")
        .and_then(Value::as_str)
        .unwrap_or("?")
        .to_string();
    let close = closes(analysis);
    let (first, latest) = match (close.first(), close.last()) {
        (Some(&f), Some(&l)) if f != 0.0 => (f, l),
        _ => {
            return Err(ToolFailure::InsufficientData(format!(
                "no usable prices for {}",
                symbol
            )))
        }
    };

    let period_return = latest / first - 1.0;
    let (_, std) = mean_and_std(&daily_returns(&close));
    let normalized: Vec<f64> = close.iter().map(|c| c / first * 100.0).collect();

    let stats = json!({
        "latest_close": latest,
        "period_return": period_return,
        "volatility": std * TRADING_DAYS.sqrt(),
        "latest_rsi": analysis.pointer("/latest/rsi").cloned().unwrap_or(Value::Null),
    });

    Ok((symbol, stats, period_return, normalized))
}

impl StrategyComparisonTool {
    fn compare(&self, input: &ToolInput) -> Result<Value, ToolFailure> {
        let (left, left_stats, left_return, left_norm) = symbol_stats(input.require("left")?)?;
        let (right, right_stats, right_return, right_norm) =
            symbol_stats(input.require("right")?)?;

        let leader = if left_return >= right_return {
            &left
        } else {
            &right
        };

        Ok(json!({
            "symbols": [left, right],
            "metrics": { left.as_str(): left_stats, right.as_str(): right_stats },
            "normalized": { left.as_str(): left_norm, right.as_str(): right_norm },
            "leader": leader,
            "return_spread": left_return - right_return,
        }))
    }
}

#[async_trait::async_trait]
impl Tool for StrategyComparisonTool {
    fn description(&self) -> &'static str {
        "Compare returns, volatility and RSI of two analysed symbols"
    }

    async fn execute(&self, input: &ToolInput) -> ToolResult {
        self.compare(input).into()
    }
}
