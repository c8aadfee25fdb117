use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use decision_core::{EngineError, EngineResult, Signal, SignalProducer, SignalSource};
use risk_scorer::RiskInputs;
use signal_aggregator::{adapt_batch, ProducerPayload};

use crate::config::AgentConfig;

/// Pulls pre-computed payloads for one source from an upstream service.
///
/// The service answers `GET {base_url}/signals/{symbol}` with a JSON array of
/// producer payloads; each is normalized through the adapter.
pub struct HttpSignalProducer {
    name: String,
    source: SignalSource,
    client: reqwest::Client,
    base_url: String,
}

impl HttpSignalProducer {
    pub fn new(
        name: impl Into<String>,
        source: SignalSource,
        client: reqwest::Client,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl SignalProducer for HttpSignalProducer {
    fn source(&self) -> SignalSource {
        self.source
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn collect(&self, symbol: &str) -> EngineResult<Vec<Signal>> {
        let url = format!("{}/signals/{}", self.base_url, symbol);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EngineError::Producer(format!("{}: {}", self.name, e)))?;

        if !response.status().is_success() {
            return Err(EngineError::Producer(format!(
                "{} returned {}",
                self.name,
                response.status()
            )));
        }

        let payloads = response
            .json::<Vec<ProducerPayload>>()
            .await
            .map_err(|e| EngineError::Producer(format!("{}: invalid payload: {}", self.name, e)))?;

        let signals = adapt_batch(&payloads, self.source, Utc::now());
        tracing::debug!(
            "{} produced {} signals for {} ({} payloads)",
            self.name,
            signals.len(),
            symbol,
            payloads.len()
        );
        Ok(signals)
    }
}

/// Build one producer per source from the agent configuration.
pub fn build_producers(
    config: &AgentConfig,
    client: &reqwest::Client,
) -> Vec<Arc<dyn SignalProducer>> {
    let endpoints = [
        ("ml-signals", SignalSource::Ml, &config.ml_signals_url),
        ("indicator-engine", SignalSource::Indicator, &config.indicator_signals_url),
        ("pattern-detector", SignalSource::Pattern, &config.pattern_signals_url),
        ("social-sentiment", SignalSource::Social, &config.social_sentiment_url),
        ("news-sentiment", SignalSource::News, &config.news_sentiment_url),
    ];

    endpoints
        .into_iter()
        .map(|(name, source, url)| {
            Arc::new(HttpSignalProducer::new(name, source, client.clone(), url.as_str()))
                as Arc<dyn SignalProducer>
        })
        .collect()
}

/// Fetches pre-computed risk sub-inputs. Never fails: an unreachable service
/// yields empty inputs, which score as zero risk points.
pub struct HttpRiskInputs {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    total_budget: f64,
}

impl HttpRiskInputs {
    pub fn new(client: reqwest::Client, base_url: &str, timeout: Duration, total_budget: f64) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            total_budget,
        }
    }

    async fn try_fetch(&self, symbol: &str) -> EngineResult<RiskInputs> {
        let url = format!("{}/risk-inputs/{}", self.base_url, symbol);
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| EngineError::RiskInputMissing(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EngineError::RiskInputMissing(format!(
                "risk service returned {}",
                response.status()
            )));
        }

        response
            .json::<RiskInputs>()
            .await
            .map_err(|e| EngineError::RiskInputMissing(e.to_string()))
    }

    pub async fn fetch(&self, symbol: &str) -> RiskInputs {
        let mut inputs = match self.try_fetch(symbol).await {
            Ok(inputs) => inputs,
            Err(e) => {
                tracing::warn!("Risk inputs unavailable for {}: {}", symbol, e);
                RiskInputs::default()
            }
        };
        // The bot's own budget fills in when the service does not know it.
        if inputs.total_budget.is_none() && self.total_budget > 0.0 {
            inputs.total_budget = Some(self.total_budget);
        }
        inputs
    }
}

/// Warn-only reachability probe for an upstream service.
pub async fn check_health(client: &reqwest::Client, name: &str, base_url: &str) {
    match client
        .get(format!("{}/health", base_url.trim_end_matches('/')))
        .timeout(Duration::from_secs(5))
        .send()
        .await
    {
        Ok(resp) if resp.status().is_success() => {
            tracing::info!("Startup check: {} OK", name);
        }
        Ok(resp) => {
            tracing::warn!(
                "Startup check: {} returned {}; its signals will be missing",
                name,
                resp.status()
            );
        }
        Err(e) => {
            tracing::warn!(
                "Startup check: {} unreachable ({}); its signals will be missing",
                name,
                e
            );
        }
    }
}
