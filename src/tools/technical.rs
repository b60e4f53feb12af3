//! Technical indicators and trading signals

use crate::models::{PriceBar, Signal, SignalAction, ToolFailure, ToolInput, ToolResult};
use crate::tools::{number_series, Tool};
use chrono::NaiveDate;
use serde_json::{json, Map, Value};
use ta::indicators::{
    BollingerBands, ExponentialMovingAverage, RelativeStrengthIndex, SimpleMovingAverage,
};
use ta::Next;

pub const DEFAULT_INDICATORS: &[&str] = &[
    "sma_20",
    "sma_50",
    "ema_12",
    "ema_26",
    "rsi",
    "macd",
    "bollinger_bands",
];

const RSI_PERIOD: usize = 14;
const RSI_OVERSOLD: f64 = 30.0;
const RSI_OVERBOUGHT: f64 = 70.0;

fn indicator_error(e: impl std::fmt::Display) -> ToolFailure {
    ToolFailure::Failed(format!("indicator setup failed: {}", e))
}

/// Blank out the first `warmup` values and anything non-finite
fn with_warmup(values: Vec<f64>, warmup: usize) -> Vec<Option<f64>> {
    values
        .into_iter()
        .enumerate()
        .map(|(i, v)| (i >= warmup && v.is_finite()).then_some(v))
        .collect()
}

fn sma(closes: &[f64], period: usize) -> Result<Vec<Option<f64>>, ToolFailure> {
    let mut ind = SimpleMovingAverage::new(period).map_err(indicator_error)?;
    let values = closes.iter().map(|&c| ind.next(c)).collect();
    Ok(with_warmup(values, period - 1))
}

fn ema_raw(values: &[f64], period: usize) -> Result<Vec<f64>, ToolFailure> {
    let mut ind = ExponentialMovingAverage::new(period).map_err(indicator_error)?;
    Ok(values.iter().map(|&c| ind.next(c)).collect())
}

fn parse_prices(value: &Value) -> Result<Vec<PriceBar>, ToolFailure> {
    serde_json::from_value(value.clone())
        .map_err(|e| ToolFailure::InvalidInput(format!("prices: {}", e)))
}

fn latest(series: &[Option<f64>]) -> Option<f64> {
    series.iter().rev().find_map(|v| *v)
}

/// `{prices, indicators?}` → `{symbol, dates, close, series, latest}`
pub struct TechnicalAnalyzerTool;

impl TechnicalAnalyzerTool {
    fn analyze(&self, input: &ToolInput) -> Result<Value, ToolFailure> {
        let bars = parse_prices(input.require("prices")?)?;
        if bars.is_empty() {
            return Err(ToolFailure::InsufficientData("no price bars".to_string()));
        }

        let requested: Vec<String> = match input.get("indicators").and_then(Value::as_array) {
            Some(list) => list
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            None => DEFAULT_INDICATORS.iter().map(|s| s.to_string()).collect(),
        };

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let mut series: Map<String, Value> = Map::new();
        let mut latest_values: Map<String, Value> = Map::new();

        let mut put = |name: &str, values: Vec<Option<f64>>| {
            latest_values.insert(name.to_string(), json!(latest(&values)));
            series.insert(name.to_string(), json!(values));
        };

        for indicator in &requested {
            match indicator.as_str() {
                "sma_20" => put("sma_20", sma(&closes, 20)?),
                "sma_50" => put("sma_50", sma(&closes, 50)?),
                "ema_12" => put("ema_12", with_warmup(ema_raw(&closes, 12)?, 11)),
                "ema_26" => put("ema_26", with_warmup(ema_raw(&closes, 26)?, 25)),
                "rsi" => {
                    let mut rsi = RelativeStrengthIndex::new(RSI_PERIOD).map_err(indicator_error)?;
                    let values = closes.iter().map(|&c| rsi.next(c)).collect();
                    put("rsi", with_warmup(values, RSI_PERIOD));
                }
                "macd" => {
                    let fast = ema_raw(&closes, 12)?;
                    let slow = ema_raw(&closes, 26)?;
                    let line: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
                    let signal = ema_raw(&line, 9)?;
                    let histogram: Vec<f64> =
                        line.iter().zip(&signal).map(|(l, s)| l - s).collect();
                    put("macd", with_warmup(line, 25));
                    put("macd_signal", with_warmup(signal, 33));
                    put("macd_histogram", with_warmup(histogram, 33));
                }
                "bollinger_bands" => {
                    let mut bb = BollingerBands::new(20, 2.0).map_err(indicator_error)?;
                    let (mut upper, mut middle, mut lower) = (vec![], vec![], vec![]);
                    for &close in &closes {
                        let out = bb.next(close);
                        upper.push(out.upper);
                        middle.push(out.average);
                        lower.push(out.lower);
                    }
                    put("bb_upper", with_warmup(upper, 19));
                    put("bb_middle", with_warmup(middle, 19));
                    put("bb_lower", with_warmup(lower, 19));
                }
                other => {
                    return Err(ToolFailure::InvalidInput(format!(
                        "unknown indicator '{}'",
                        other
                    )))
                }
            }
        }

        latest_values.insert("close".to_string(), json!(closes.last()));

        Ok(json!({
            "symbol": input.get("symbol").cloned().unwrap_or(Value::Null),
            "indicators": requested,
            "dates": bars.iter().map(|b| b.date).collect::<Vec<_>>(),
            "close": closes,
            "series": series,
            "latest": latest_values,
        }))
    }
}

#[async_trait::async_trait]
impl Tool for TechnicalAnalyzerTool {
    fn description(&self) -> &'static str {
        "Compute moving averages, RSI, MACD and Bollinger Bands aligned to prices"
    }

    async fn execute(&self, input: &ToolInput) -> ToolResult {
        let indicators = input.get("indicators").cloned().unwrap_or(Value::Null);
        ToolResult::from(self.analyze(input)).with_metadata("indicators_requested", indicators)
    }
}

/// `{analysis}` (technical output) → `{symbol, signals, latest_action}`
pub struct TradingSignalsTool;

impl TradingSignalsTool {
    fn signals(&self, input: &ToolInput) -> Result<Value, ToolFailure> {
        let analysis = input.require("analysis")?;
        let dates: Vec<NaiveDate> = analysis
            .get("dates")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| ToolFailure::InvalidInput(format!("dates: {}", e)))?
            .unwrap_or_default();

        let series = analysis.get("series");
        let fast = number_series(series.and_then(|s| s.get("sma_20")));
        let slow = number_series(series.and_then(|s| s.get("sma_50")));
        let rsi = number_series(series.and_then(|s| s.get("rsi")));

        let signals = generate_signals(&dates, &fast, &slow, &rsi);
        let latest_action = signals
            .last()
            .map(|s| s.action)
            .unwrap_or(SignalAction::Hold);

        Ok(json!({
            "symbol": analysis.get("symbol").cloned().unwrap_or(Value::Null),
            "signal_count": signals.len(),
            "latest_action": latest_action,
            "signals": signals,
        }))
    }
}

/// SMA 20/50 crossovers plus RSI threshold crossings, in date order
pub fn generate_signals(
    dates: &[NaiveDate],
    fast: &[Option<f64>],
    slow: &[Option<f64>],
    rsi: &[Option<f64>],
) -> Vec<Signal> {
    let at = |s: &[Option<f64>], i: usize| s.get(i).copied().flatten();
    let mut signals = Vec::new();

    for (i, date) in dates.iter().enumerate().skip(1) {
        if let (Some(f0), Some(s0), Some(f1), Some(s1)) =
            (at(fast, i - 1), at(slow, i - 1), at(fast, i), at(slow, i))
        {
            if f0 <= s0 && f1 > s1 {
                signals.push(Signal {
                    date: *date,
                    action: SignalAction::Buy,
                    reason: "SMA 20 crossed above SMA 50".to_string(),
                });
            } else if f0 >= s0 && f1 < s1 {
                signals.push(Signal {
                    date: *date,
                    action: SignalAction::Sell,
                    reason: "SMA 20 crossed below SMA 50".to_string(),
                });
            }
        }

        if let (Some(r0), Some(r1)) = (at(rsi, i - 1), at(rsi, i)) {
            if r0 >= RSI_OVERSOLD && r1 < RSI_OVERSOLD {
                signals.push(Signal {
                    date: *date,
                    action: SignalAction::Buy,
                    reason: format!("RSI oversold ({:.1})", r1),
                });
            } else if r0 <= RSI_OVERBOUGHT && r1 > RSI_OVERBOUGHT {
                signals.push(Signal {
                    date: *date,
                    action: SignalAction::Sell,
                    reason: format!("RSI overbought ({:.1})", r1),
                });
            }
        }
    }

    signals
}

#[async_trait::async_trait]
impl Tool for TradingSignalsTool {
    fn description(&self) -> &'static str {
        "Derive buy/sell signals from moving-average crossovers and RSI extremes"
    }

    async fn execute(&self, input: &ToolInput) -> ToolResult {
        self.signals(input).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_prices;

    fn input(params: Value) -> ToolInput {
        ToolInput {
            task_id: "technical_TEST".to_string(),
            tool_name: "technical_analyzer".to_string(),
            parameters: params.as_object().cloned().unwrap_or_default(),
        }
    }

    #[tokio::test]
    async fn test_series_aligned_to_prices() {
        let result = TechnicalAnalyzerTool
            .execute(&input(json!({"symbol": "TEST", "prices": sample_prices(80)})))
            .await;
        assert!(result.success, "{:?}", result.error);

        let data = result.data.unwrap();
        let sma_20 = data["series"]["sma_20"].as_array().unwrap();
        assert_eq!(sma_20.len(), 80);
        assert!(sma_20[18].is_null());
        assert!(sma_20[19].is_number());

        let sma_50 = data["series"]["sma_50"].as_array().unwrap();
        assert!(sma_50[48].is_null());
        assert!(sma_50[49].is_number());

        assert!(data["series"]["bb_upper"].is_array());
        assert!(data["latest"]["rsi"].is_number());
        assert_eq!(data["dates"].as_array().unwrap().len(), 80);
    }

    #[tokio::test]
    async fn test_indicator_selection_and_rejection() {
        let narrowed = TechnicalAnalyzerTool
            .execute(&input(json!({
                "prices": sample_prices(30),
                "indicators": ["rsi"],
            })))
            .await;
        let data = narrowed.data.unwrap();
        assert!(data["series"].get("rsi").is_some());
        assert!(data["series"].get("sma_20").is_none());

        let bad = TechnicalAnalyzerTool
            .execute(&input(json!({
                "prices": sample_prices(30),
                "indicators": ["stochastic"],
            })))
            .await;
        assert!(matches!(bad.error, Some(ToolFailure::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_empty_prices_is_insufficient() {
        let result = TechnicalAnalyzerTool
            .execute(&input(json!({"prices": []})))
            .await;
        assert!(matches!(
            result.error,
            Some(ToolFailure::InsufficientData(_))
        ));
    }

    #[test]
    fn test_crossover_signals() {
        let d = |day| NaiveDate::from_ymd_opt(2024, 3, day).unwrap();
        let dates = vec![d(1), d(2), d(3), d(4)];
        let fast = vec![Some(9.0), Some(11.0), Some(12.0), Some(8.0)];
        let slow = vec![Some(10.0), Some(10.0), Some(10.0), Some(10.0)];
        let rsi = vec![Some(50.0), Some(75.0), Some(60.0), Some(25.0)];

        let signals = generate_signals(&dates, &fast, &slow, &rsi);
        let actions: Vec<_> = signals.iter().map(|s| (s.date, s.action)).collect();

        assert_eq!(
            actions,
            vec![
                (d(2), SignalAction::Buy),
                (d(2), SignalAction::Sell),
                (d(4), SignalAction::Sell),
                (d(4), SignalAction::Buy),
            ]
        );
    }
}
