//! Boundary between producer payloads and the typed `Signal` record.
//!
//! Producers report in their own shapes: ML services send a label and a
//! probability, indicator engines send a value plus thresholds, pattern
//! detectors send bullish/bearish labels, sentiment feeds send a score in
//! [-1, 1]. Everything is normalized here so the aggregator only ever sees
//! `Signal`s.

use chrono::{DateTime, Utc};
use decision_core::{Action, EngineError, EngineResult, Signal, SignalSource};
use serde::{Deserialize, Serialize};

/// Sentiment scores within +/- this band count as hold.
pub const DEFAULT_SENTIMENT_BAND: f64 = 0.2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlPrediction {
    pub model: String,
    pub signal: String,
    pub confidence: f64,
    #[serde(default)]
    pub strength: Option<f64>,
    #[serde(default)]
    pub computed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorReading {
    pub indicator: String,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub buy_below: Option<f64>,
    #[serde(default)]
    pub sell_above: Option<f64>,
    /// Explicit evaluation from the indicator engine, wins over thresholds
    #[serde(default)]
    pub signal: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub strength: Option<f64>,
    #[serde(default)]
    pub computed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternDetection {
    pub pattern: String,
    pub signal: String,
    pub confidence: f64,
    #[serde(default)]
    pub computed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentReading {
    pub name: String,
    /// -1.0 (bearish) to 1.0 (bullish)
    pub score: f64,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub computed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProducerPayload {
    Ml(MlPrediction),
    Indicator(IndicatorReading),
    Pattern(PatternDetection),
    Sentiment(SentimentReading),
}

/// Parse a producer's action label.
pub fn parse_action(label: &str) -> EngineResult<Action> {
    let normalized: String = label
        .trim()
        .to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();

    match normalized.as_str() {
        "buy" | "strongbuy" | "weakbuy" | "bullish" | "long" => Ok(Action::Buy),
        "sell" | "strongsell" | "weaksell" | "bearish" | "short" => Ok(Action::Sell),
        "hold" | "neutral" => Ok(Action::Hold),
        _ => Err(EngineError::InvalidSignal(format!(
            "unrecognized action label '{}'",
            label
        ))),
    }
}

/// Patterns are lenient: anything that is not bullish or bearish holds.
fn pattern_action(label: &str) -> Action {
    match label.trim().to_ascii_lowercase().as_str() {
        "bullish" => Action::Buy,
        "bearish" => Action::Sell,
        _ => Action::Hold,
    }
}

fn threshold_strength(value: f64, threshold: f64) -> f64 {
    if threshold == 0.0 {
        return 1.0;
    }
    ((value - threshold).abs() / threshold.abs()).min(1.0)
}

fn adapt_indicator(reading: &IndicatorReading, timestamp: DateTime<Utc>) -> EngineResult<Signal> {
    let confidence = reading.confidence.unwrap_or(0.0);

    if let Some(label) = &reading.signal {
        let action = parse_action(label)?;
        return Ok(Signal::new(
            SignalSource::Indicator,
            &reading.indicator,
            action,
            confidence,
            reading.strength,
            timestamp,
        ));
    }

    let value = reading.value.ok_or_else(|| {
        EngineError::InvalidSignal(format!(
            "indicator '{}' has neither a signal nor a value",
            reading.indicator
        ))
    })?;

    let (action, derived_strength) = match (reading.buy_below, reading.sell_above) {
        (Some(low), _) if value < low => (Action::Buy, Some(threshold_strength(value, low))),
        (_, Some(high)) if value > high => (Action::Sell, Some(threshold_strength(value, high))),
        _ => (Action::Hold, None),
    };

    Ok(Signal::new(
        SignalSource::Indicator,
        &reading.indicator,
        action,
        confidence,
        reading.strength.or(derived_strength),
        timestamp,
    ))
}

fn adapt_sentiment(
    reading: &SentimentReading,
    source: SignalSource,
    timestamp: DateTime<Utc>,
) -> EngineResult<Signal> {
    if !matches!(source, SignalSource::Social | SignalSource::News) {
        return Err(EngineError::InvalidSignal(format!(
            "sentiment reading '{}' delivered by a {} producer",
            reading.name, source
        )));
    }

    let score = if reading.score.is_nan() { 0.0 } else { reading.score };
    let action = if score > DEFAULT_SENTIMENT_BAND {
        Action::Buy
    } else if score < -DEFAULT_SENTIMENT_BAND {
        Action::Sell
    } else {
        Action::Hold
    };
    let confidence = reading.confidence.unwrap_or_else(|| score.abs());

    Ok(Signal::new(source, &reading.name, action, confidence, None, timestamp))
}

/// Convert one payload into a `Signal`.
///
/// `producer_source` decides between social and news for sentiment payloads;
/// other payload kinds carry their own source. `collected_at` stamps payloads
/// that did not report when they were computed.
pub fn adapt(
    payload: &ProducerPayload,
    producer_source: SignalSource,
    collected_at: DateTime<Utc>,
) -> EngineResult<Signal> {
    match payload {
        ProducerPayload::Ml(p) => {
            let action = parse_action(&p.signal)?;
            Ok(Signal::new(
                SignalSource::Ml,
                &p.model,
                action,
                p.confidence,
                p.strength,
                p.computed_at.unwrap_or(collected_at),
            ))
        }
        ProducerPayload::Indicator(r) => adapt_indicator(r, r.computed_at.unwrap_or(collected_at)),
        ProducerPayload::Pattern(p) => Ok(Signal::new(
            SignalSource::Pattern,
            &p.pattern,
            pattern_action(&p.signal),
            p.confidence,
            None,
            p.computed_at.unwrap_or(collected_at),
        )),
        ProducerPayload::Sentiment(r) => {
            adapt_sentiment(r, producer_source, r.computed_at.unwrap_or(collected_at))
        }
    }
}

/// Adapt a producer's batch, dropping payloads that cannot be normalized.
pub fn adapt_batch(
    payloads: &[ProducerPayload],
    producer_source: SignalSource,
    collected_at: DateTime<Utc>,
) -> Vec<Signal> {
    payloads
        .iter()
        .filter_map(|payload| match adapt(payload, producer_source, collected_at) {
            Ok(signal) => Some(signal),
            Err(e) => {
                tracing::warn!("Dropping {} payload: {}", producer_source, e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn test_parse_action_variants() {
        assert_eq!(parse_action("BUY").unwrap(), Action::Buy);
        assert_eq!(parse_action("Strong Buy").unwrap(), Action::Buy);
        assert_eq!(parse_action("strong_sell").unwrap(), Action::Sell);
        assert_eq!(parse_action("bearish").unwrap(), Action::Sell);
        assert_eq!(parse_action(" neutral ").unwrap(), Action::Hold);
        assert!(parse_action("moon").is_err());
    }

    #[test]
    fn test_pattern_maps_bullish_bearish_else_hold() {
        let payload = |signal: &str| {
            ProducerPayload::Pattern(PatternDetection {
                pattern: "head_and_shoulders".to_string(),
                signal: signal.to_string(),
                confidence: 0.65,
                computed_at: None,
            })
        };
        let ts = now();
        assert_eq!(adapt(&payload("bullish"), SignalSource::Pattern, ts).unwrap().action, Action::Buy);
        assert_eq!(adapt(&payload("Bearish"), SignalSource::Pattern, ts).unwrap().action, Action::Sell);
        let neutral = adapt(&payload("continuation"), SignalSource::Pattern, ts).unwrap();
        assert_eq!(neutral.action, Action::Hold);
        assert_eq!(neutral.strength, 0.65);
    }

    #[test]
    fn test_ml_strength_defaults_to_confidence() {
        let payload = ProducerPayload::Ml(MlPrediction {
            model: "xgboost_v3".to_string(),
            signal: "buy".to_string(),
            confidence: 0.8,
            strength: None,
            computed_at: None,
        });
        let s = adapt(&payload, SignalSource::Ml, now()).unwrap();
        assert_eq!(s.source, SignalSource::Ml);
        assert_eq!(s.strength, 0.8);
    }

    #[test]
    fn test_indicator_threshold_evaluation() {
        let rsi = |value: f64| IndicatorReading {
            indicator: "rsi".to_string(),
            value: Some(value),
            buy_below: Some(30.0),
            sell_above: Some(70.0),
            signal: None,
            confidence: Some(0.6),
            strength: None,
            computed_at: None,
        };
        let ts = now();

        let oversold = adapt(&ProducerPayload::Indicator(rsi(24.0)), SignalSource::Indicator, ts).unwrap();
        assert_eq!(oversold.action, Action::Buy);
        assert_relative_eq!(oversold.strength, 0.2, epsilon = 1e-12);

        let overbought = adapt(&ProducerPayload::Indicator(rsi(84.0)), SignalSource::Indicator, ts).unwrap();
        assert_eq!(overbought.action, Action::Sell);
        assert_relative_eq!(overbought.strength, 0.2, epsilon = 1e-12);

        let mid = adapt(&ProducerPayload::Indicator(rsi(50.0)), SignalSource::Indicator, ts).unwrap();
        assert_eq!(mid.action, Action::Hold);
        assert_eq!(mid.strength, 0.6);
    }

    #[test]
    fn test_indicator_explicit_signal_wins() {
        let reading = IndicatorReading {
            indicator: "macd".to_string(),
            value: Some(10.0),
            buy_below: Some(30.0),
            sell_above: None,
            signal: Some("sell".to_string()),
            confidence: None,
            strength: Some(0.4),
            computed_at: None,
        };
        let s = adapt(&ProducerPayload::Indicator(reading), SignalSource::Indicator, now()).unwrap();
        assert_eq!(s.action, Action::Sell);
        assert_eq!(s.confidence, 0.0);
        assert_eq!(s.strength, 0.4);
    }

    #[test]
    fn test_indicator_without_value_is_invalid() {
        let reading = IndicatorReading {
            indicator: "adx".to_string(),
            value: None,
            buy_below: None,
            sell_above: None,
            signal: None,
            confidence: Some(0.5),
            strength: None,
            computed_at: None,
        };
        let err = adapt(&ProducerPayload::Indicator(reading), SignalSource::Indicator, now());
        assert!(matches!(err, Err(EngineError::InvalidSignal(_))));
    }

    #[test]
    fn test_sentiment_band_and_source() {
        let reading = |score: f64| {
            ProducerPayload::Sentiment(SentimentReading {
                name: "reddit".to_string(),
                score,
                confidence: None,
                computed_at: None,
            })
        };
        let ts = now();
        let bullish = adapt(&reading(0.6), SignalSource::Social, ts).unwrap();
        assert_eq!(bullish.source, SignalSource::Social);
        assert_eq!(bullish.action, Action::Buy);
        assert_relative_eq!(bullish.confidence, 0.6);

        let bearish = adapt(&reading(-0.5), SignalSource::News, ts).unwrap();
        assert_eq!(bearish.source, SignalSource::News);
        assert_eq!(bearish.action, Action::Sell);

        assert_eq!(adapt(&reading(0.1), SignalSource::News, ts).unwrap().action, Action::Hold);
        assert!(adapt(&reading(0.6), SignalSource::Ml, ts).is_err());
    }

    #[test]
    fn test_payload_json_shape() {
        let json = r#"[
            {"kind": "ml", "model": "lgbm", "signal": "BUY", "confidence": 0.72},
            {"kind": "pattern", "pattern": "cup_and_handle", "signal": "bullish", "confidence": 0.5},
            {"kind": "ml", "model": "broken", "signal": "???", "confidence": 0.9}
        ]"#;
        let payloads: Vec<ProducerPayload> = serde_json::from_str(json).unwrap();
        let signals = adapt_batch(&payloads, SignalSource::Ml, now());
        assert_eq!(signals.len(), 2);
        assert_eq!(signals[0].name, "lgbm");
        assert_eq!(signals[1].source, SignalSource::Pattern);
    }
}
