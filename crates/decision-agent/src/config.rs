use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};
use decision_core::{OverrideAction, RiskPolicy, SignalSource, SourceWeights};
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub bot_id: String,
    pub watchlist: Vec<String>,

    // Scheduling
    pub cycle_interval_seconds: u64,   // 300 (5 minutes)
    pub producer_timeout_ms: u64,      // 2000
    pub metrics_log_interval_cycles: u64,

    // Producers
    pub ml_signals_url: String,
    pub indicator_signals_url: String,
    pub pattern_signals_url: String,
    pub social_sentiment_url: String,
    pub news_sentiment_url: String,
    pub risk_inputs_url: String,
    pub enable_social_analysis: bool,
    pub enable_news_analysis: bool,

    // Source weight overrides (None = documented default)
    pub weight_ml: Option<f64>,
    pub weight_indicator: Option<f64>,
    pub weight_pattern: Option<f64>,
    pub weight_social: Option<f64>,
    pub weight_news: Option<f64>,

    // Risk policy
    pub risk_policy: String,           // conservative | moderate | aggressive
    pub risk_score_threshold: Option<f64>,
    pub risk_adjustment_factor: Option<f64>,
    pub min_position_scale: Option<f64>,
    pub risk_based_override: Option<bool>,
    pub risk_based_position_scaling: Option<bool>,
    pub risk_override_action: Option<String>,
    pub min_confidence: Option<f64>,

    // Sizing / execution
    pub total_budget: f64,
    pub base_order_notional: Decimal,
    pub trading_enabled: bool,
    pub paper_trading: bool,

    // Database
    pub database_url: String,
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var_or(key, default)
        .trim()
        .parse()
        .with_context(|| format!("{} is not valid", key))
}

fn parse_opt<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{} is not valid", key)),
        _ => Ok(None),
    }
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            bot_id: var_or("BOT_ID", "bot-1"),
            watchlist: var_or("WATCHLIST", "AAPL,MSFT,GOOGL,AMZN,NVDA,TSLA,META,AMD,NFLX,SPY")
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect(),

            cycle_interval_seconds: parse_or("CYCLE_INTERVAL_SECONDS", "300")?,
            producer_timeout_ms: parse_or("PRODUCER_TIMEOUT_MS", "2000")?,
            metrics_log_interval_cycles: parse_or("METRICS_LOG_INTERVAL_CYCLES", "12")?,

            ml_signals_url: var_or("ML_SIGNALS_URL", "http://localhost:8004"),
            indicator_signals_url: var_or("INDICATOR_SIGNALS_URL", "http://localhost:8010"),
            pattern_signals_url: var_or("PATTERN_SIGNALS_URL", "http://localhost:8011"),
            social_sentiment_url: var_or("SOCIAL_SENTIMENT_URL", "http://localhost:8001"),
            news_sentiment_url: var_or("NEWS_SENTIMENT_URL", "http://localhost:8012"),
            risk_inputs_url: var_or("RISK_INPUTS_URL", "http://localhost:8013"),
            enable_social_analysis: parse_or("ENABLE_SOCIAL_ANALYSIS", "false")?,
            enable_news_analysis: parse_or("ENABLE_NEWS_ANALYSIS", "false")?,

            weight_ml: parse_opt("WEIGHT_ML")?,
            weight_indicator: parse_opt("WEIGHT_INDICATOR")?,
            weight_pattern: parse_opt("WEIGHT_PATTERN")?,
            weight_social: parse_opt("WEIGHT_SOCIAL")?,
            weight_news: parse_opt("WEIGHT_NEWS")?,

            risk_policy: var_or("RISK_POLICY", "moderate"),
            risk_score_threshold: parse_opt("RISK_SCORE_THRESHOLD")?,
            risk_adjustment_factor: parse_opt("RISK_ADJUSTMENT_FACTOR")?,
            min_position_scale: parse_opt("MIN_POSITION_SCALE")?,
            risk_based_override: parse_opt("RISK_BASED_OVERRIDE")?,
            risk_based_position_scaling: parse_opt("RISK_BASED_POSITION_SCALING")?,
            risk_override_action: env::var("RISK_OVERRIDE_ACTION").ok(),
            min_confidence: parse_opt("MIN_CONFIDENCE")?,

            total_budget: parse_or("TOTAL_BUDGET", "10000.0")?,
            base_order_notional: Decimal::from_str(&var_or("BASE_ORDER_NOTIONAL", "500.00"))
                .context("BASE_ORDER_NOTIONAL is not a valid decimal")?,
            trading_enabled: parse_or("TRADING_ENABLED", "true")?,
            paper_trading: parse_or("PAPER_TRADING", "true")?,

            database_url: var_or("DATABASE_URL", "sqlite:decisions.db?mode=rwc"),
        };

        // Fail fast on malformed weights or policy
        config.source_weights().validate()?;
        config.risk_policy()?.validate()?;

        Ok(config)
    }

    /// Weights handed to every cycle. Social and news are only present when
    /// their analysis is enabled.
    pub fn source_weights(&self) -> SourceWeights {
        let mut weights = SourceWeights::default();
        if self.enable_social_analysis {
            weights = weights.with_social();
        }
        if self.enable_news_analysis {
            weights = weights.with_news();
        }

        let overrides = [
            (SignalSource::Ml, self.weight_ml),
            (SignalSource::Indicator, self.weight_indicator),
            (SignalSource::Pattern, self.weight_pattern),
            (SignalSource::Social, self.weight_social),
            (SignalSource::News, self.weight_news),
        ];
        for (source, weight) in overrides {
            if let Some(w) = weight {
                if weights.is_enabled(source) {
                    weights = weights.set(source, w);
                }
            }
        }
        weights
    }

    pub fn risk_policy(&self) -> Result<RiskPolicy> {
        let mut policy = RiskPolicy::preset(&self.risk_policy)?;

        if let Some(v) = self.risk_score_threshold {
            policy.risk_score_threshold = v;
        }
        if let Some(v) = self.risk_adjustment_factor {
            policy.risk_adjustment_factor = v;
        }
        if let Some(v) = self.min_position_scale {
            policy.min_position_scale = v;
        }
        if let Some(v) = self.risk_based_override {
            policy.risk_based_override = v;
        }
        if let Some(v) = self.risk_based_position_scaling {
            policy.risk_based_position_scaling = v;
        }
        if let Some(v) = self.min_confidence {
            policy.min_confidence = v;
        }
        if let Some(action) = &self.risk_override_action {
            policy.override_action = match action.trim().to_ascii_lowercase().as_str() {
                "hold" => OverrideAction::Hold,
                "skip" => OverrideAction::Skip,
                other => anyhow::bail!("RISK_OVERRIDE_ACTION must be hold or skip, got '{}'", other),
            };
        }

        Ok(policy)
    }
}
