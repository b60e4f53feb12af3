//! Intent Classifier
//!
//! Maps free query text to one `Intent` plus extracted entities.
//! Keyword and pattern based: the same text always yields the same result.

use crate::models::{Ambiguity, Classification, DateRange, Entities, Intent};
use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use tracing::debug;

/// Uppercase words that look like tickers but are not
const STOP_WORDS: &[&str] = &[
    // English
    "A", "AN", "THE", "AND", "OR", "FOR", "TO", "OF", "IN", "ON", "AT", "BY", "IS", "ARE",
    "WAS", "WERE", "I", "ME", "MY", "IT", "BE", "DO", "VS", "AM", "PM", "OK",
    // Indicators
    "RSI", "MACD", "SMA", "EMA", "ATR",
    // Documents / misc
    "PDF", "PPT", "PPTX", "YTD", "USD", "CEO", "EPS", "PE",
    // Markets / macro
    "ETF", "IPO", "GDP", "CPI", "FX", "AI", "NYSE", "NASDAQ", "US", "UK", "EU",
];

const HELP_COMMANDS: &[&str] = &["help", "h", "?", "usage", "commands"];
const STATUS_COMMANDS: &[&str] = &["status", "session", "session status"];

lazy_static! {
    static ref SYMBOL_RE: Regex = Regex::new(r"\b[A-Z]{1,5}(?:\.[A-Z]{1,3})?\b").unwrap();
    static ref ISO_DATE_RE: Regex = Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").unwrap();
    static ref LOOKBACK_RE: Regex =
        Regex::new(r"\b(?:last|past|previous)\s+(\d+)?\s*(day|week|month|year)s?\b").unwrap();
    static ref PERIOD_TOKEN_RE: Regex = Regex::new(r"\b(\d{1,2}(?:d|wk|mo|y)|ytd|max)\b").unwrap();

    static ref COMPARISON_RE: Regex =
        Regex::new(r"\b(?:vs\.?|versus|compare|comparing|comparison)\b|difference between").unwrap();
    static ref BACKTEST_RE: Regex = Regex::new(
        r"back[\s-]?test|historical performance|strategy performance|test(?:ing)?\s+(?:a\s+|the\s+|my\s+)?strateg"
    ).unwrap();
    static ref PRESENTATION_RE: Regex =
        Regex::new(r"\bpresentations?\b|\bslides?\b|slide deck|powerpoint|\bppt\b|\bdeck\b").unwrap();
    static ref REPORT_RE: Regex =
        Regex::new(r"\breports?\b|\bpdf\b|\bexport\b|summari[sz]e").unwrap();
    static ref TECHNICAL_RE: Regex = Regex::new(
        r"technical|indicators?|\brsi\b|\bmacd\b|bollinger|moving average|\bsma\b|\bema\b|signals?\b"
    ).unwrap();
    static ref STOCK_RE: Regex =
        Regex::new(r"analy[sz]|research|tell me about|look at|outlook|how is|performing").unwrap();
    static ref CHART_RE: Regex = Regex::new(r"\bchart|\bplot|\bgraph|visuali[sz]").unwrap();

    static ref INDICATOR_HINTS: Vec<(Regex, &'static str)> = vec![
        (Regex::new(r"\brsi\b").unwrap(), "rsi"),
        (Regex::new(r"\bmacd\b").unwrap(), "macd"),
        (Regex::new(r"bollinger").unwrap(), "bollinger_bands"),
        (Regex::new(r"\bsma\b|moving average").unwrap(), "sma"),
        (Regex::new(r"\bema\b").unwrap(), "ema"),
    ];
}

/// Intent classifier
pub struct IntentClassifier;

impl IntentClassifier {
    /// Classify query text. Never fails; unrecognised text is `Unknown`.
    pub fn classify(text: &str) -> Classification {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Classification::unknown();
        }

        let lower = trimmed.to_lowercase();

        if HELP_COMMANDS.contains(&lower.as_str()) {
            return simple(Intent::Help);
        }
        if STATUS_COMMANDS.contains(&lower.as_str()) {
            return simple(Intent::Status);
        }

        let entities = Entities {
            symbols: extract_symbols(trimmed),
            date_range: extract_date_range(&lower),
            period: extract_period(&lower),
            indicator_hint: extract_indicator_hint(&lower),
            chart_requested: CHART_RE.is_match(&lower),
        };

        let mut ambiguity = None;

        let intent = if COMPARISON_RE.is_match(&lower) {
            if entities.symbols.len() == 2 {
                Intent::Comparison
            } else {
                ambiguity = Some(Ambiguity {
                    requested: Intent::Comparison,
                    reason: format!(
                        "comparison needs exactly two distinct symbols, found {}",
                        entities.symbols.len()
                    ),
                });
                Intent::StockAnalysis
            }
        } else if BACKTEST_RE.is_match(&lower) {
            Intent::Backtest
        } else if PRESENTATION_RE.is_match(&lower) {
            Intent::Presentation
        } else if REPORT_RE.is_match(&lower) {
            Intent::Report
        } else if TECHNICAL_RE.is_match(&lower) {
            Intent::TechnicalAnalysis
        } else if STOCK_RE.is_match(&lower)
            || entities.chart_requested
            || !entities.symbols.is_empty()
        {
            Intent::StockAnalysis
        } else {
            Intent::Unknown
        };

        if let Some(amb) = &ambiguity {
            debug!(requested = %amb.requested, reason = %amb.reason, "Classification degraded");
        }

        let entities = if intent == Intent::Unknown {
            Entities::default()
        } else {
            entities
        };

        debug!(
            %intent,
            symbols = ?entities.symbols,
            period = ?entities.period,
            "Query classified"
        );

        Classification {
            intent,
            entities,
            ambiguity,
        }
    }
}

fn simple(intent: Intent) -> Classification {
    Classification {
        intent,
        entities: Entities::default(),
        ambiguity: None,
    }
}

/// Uppercase ticker-like tokens in order of first appearance, deduplicated
pub fn extract_symbols(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();

    SYMBOL_RE
        .find_iter(text)
        .map(|m| m.as_str())
        .filter(|token| !STOP_WORDS.contains(token))
        .filter(|token| seen.insert(*token))
        .map(str::to_string)
        .collect()
}

fn extract_date_range(lower: &str) -> Option<DateRange> {
    let dates: Vec<NaiveDate> = ISO_DATE_RE
        .captures_iter(lower)
        .filter_map(|c| NaiveDate::parse_from_str(&c[1], "%Y-%m-%d").ok())
        .take(2)
        .collect();

    match dates.as_slice() {
        [a, b] => Some(DateRange {
            start: *a.min(b),
            end: *a.max(b),
        }),
        _ => None,
    }
}

fn extract_period(lower: &str) -> Option<String> {
    if let Some(caps) = LOOKBACK_RE.captures(lower) {
        let count: u32 = caps
            .get(1)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(1);
        let unit = match &caps[2] {
            "day" => "d",
            "week" => "wk",
            "month" => "mo",
            _ => "y",
        };
        return Some(format!("{}{}", count, unit));
    }

    PERIOD_TOKEN_RE
        .captures(lower)
        .map(|caps| caps[1].to_string())
}

fn extract_indicator_hint(lower: &str) -> Option<String> {
    INDICATOR_HINTS
        .iter()
        .filter_map(|(re, name)| re.find(lower).map(|m| (m.start(), *name)))
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, name)| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparison_keeps_symbol_order() {
        let cases = vec![
            "AAPL vs MSFT",
            "compare AAPL vs MSFT",
            "How does AAPL stack up versus MSFT?",
            "AAPL vs MSFT vs AAPL",
        ];

        for c in cases {
            let result = IntentClassifier::classify(c);
            assert_eq!(result.intent, Intent::Comparison, "{}", c);
            assert_eq!(result.entities.symbols, vec!["AAPL", "MSFT"], "{}", c);
        }
    }

    #[test]
    fn test_single_symbol_comparison_degrades() {
        let result = IntentClassifier::classify("compare TSLA");
        assert_eq!(result.intent, Intent::StockAnalysis);
        assert_eq!(result.entities.symbols, vec!["TSLA"]);

        let ambiguity = result.ambiguity.expect("degradation recorded");
        assert_eq!(ambiguity.requested, Intent::Comparison);
    }

    #[test]
    fn test_symbol_extraction() {
        assert_eq!(
            extract_symbols("Is THE outlook FOR BARC.L better than AAPL and AAPL?"),
            vec!["BARC.L", "AAPL"]
        );
        assert_eq!(extract_symbols("compare TSLA vs F"), vec!["TSLA", "F"]);
        assert!(extract_symbols("analyze apple please").is_empty());
        assert!(extract_symbols("show RSI and MACD in a PDF").is_empty());
    }

    #[test]
    fn test_stock_analysis() {
        let result = IntentClassifier::classify("analyze AAPL");
        assert_eq!(result.intent, Intent::StockAnalysis);
        assert_eq!(result.entities.symbols, vec!["AAPL"]);
        assert!(!result.entities.chart_requested);
        assert!(result.ambiguity.is_none());

        let bare = IntentClassifier::classify("NVDA");
        assert_eq!(bare.intent, Intent::StockAnalysis);
    }

    #[test]
    fn test_keyword_intents() {
        let cases = vec![
            ("backtest a strategy for TSLA", Intent::Backtest),
            ("Show me technical analysis for TSLA", Intent::TechnicalAnalysis),
            ("what is the RSI of GOOG", Intent::TechnicalAnalysis),
            ("create a report for my recent analysis", Intent::Report),
            ("export to pdf", Intent::Report),
            ("make a powerpoint presentation", Intent::Presentation),
            ("help", Intent::Help),
            ("status", Intent::Status),
        ];

        for (text, expected) in cases {
            assert_eq!(IntentClassifier::classify(text).intent, expected, "{}", text);
        }
    }

    #[test]
    fn test_unknown_has_empty_entities() {
        for text in ["xyzzy plugh", "", "   ", "good morning"] {
            let result = IntentClassifier::classify(text);
            assert_eq!(result.intent, Intent::Unknown, "{:?}", text);
            assert!(result.entities.is_empty());
        }
    }

    #[test]
    fn test_entity_extras() {
        let result = IntentClassifier::classify(
            "plot the bollinger bands for MSFT from 2024-06-30 to 2024-01-02",
        );
        assert_eq!(result.intent, Intent::TechnicalAnalysis);
        assert!(result.entities.chart_requested);
        assert_eq!(result.entities.indicator_hint.as_deref(), Some("bollinger_bands"));

        let range = result.entities.date_range.expect("date range");
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(range.end, NaiveDate::from_ymd_opt(2024, 6, 30).unwrap());

        let lookback = IntentClassifier::classify("analyze AMZN over the last 6 months");
        assert_eq!(lookback.entities.period.as_deref(), Some("6mo"));

        let year = IntentClassifier::classify("backtest GOOGL for the past year");
        assert_eq!(year.entities.period.as_deref(), Some("1y"));

        let token = IntentClassifier::classify("analyze AMD ytd");
        assert_eq!(token.entities.period.as_deref(), Some("ytd"));

        let full = IntentClassifier::classify("analyze AAPL max");
        assert_eq!(full.entities.period.as_deref(), Some("max"));
    }

    #[test]
    fn test_presentation_needs_whole_word() {
        let result = IntentClassifier::classify("give me a representation of AAPL");
        assert_ne!(result.intent, Intent::Presentation);
        assert_eq!(result.entities.symbols, vec!["AAPL"]);

        assert_eq!(
            IntentClassifier::classify("build presentations for my analysis").intent,
            Intent::Presentation
        );
    }

    #[test]
    fn test_market_acronyms_are_not_symbols() {
        let result = IntentClassifier::classify("compare AAPL vs MSFT for my ETF");
        assert_eq!(result.intent, Intent::Comparison);
        assert_eq!(result.entities.symbols, vec!["AAPL", "MSFT"]);

        assert_eq!(
            extract_symbols("How is the US economy affecting AAPL"),
            vec!["AAPL"]
        );
        assert!(extract_symbols("GDP and CPI after the IPO on NYSE").is_empty());
    }

    #[test]
    fn test_classification_is_deterministic() {
        let a = IntentClassifier::classify("compare TSLA vs F with a chart");
        let b = IntentClassifier::classify("compare TSLA vs F with a chart");
        assert_eq!(a, b);
    }
}
