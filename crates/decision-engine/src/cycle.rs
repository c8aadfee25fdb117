use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use decision_core::{
    AuditRecord, Decision, EngineError, EngineResult, RiskPolicy, Signal, SignalProducer,
    SignalSource, SourceWeights,
};
use futures_util::future::join_all;
use risk_scorer::{RiskInputs, RiskScorer};
use serde::{Deserialize, Serialize};
use signal_aggregator::aggregate;
use uuid::Uuid;

use crate::resolver::resolve;

/// Per-cycle state, visited in order. `Terminal` is always reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleState {
    Collecting,
    Aggregating,
    RiskScoring,
    Resolving,
    Decided,
    Overridden,
    Terminal,
}

/// Shared flag a scheduler flips to abort in-flight cycles (e.g. bot paused).
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Caller-supplied configuration and inputs for one (bot, symbol) cycle.
#[derive(Debug, Clone)]
pub struct CycleRequest {
    pub bot_id: String,
    pub symbol: String,
    pub weights: SourceWeights,
    pub policy: RiskPolicy,
    pub risk_inputs: RiskInputs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProducerOutcome {
    Collected,
    Failed { error: String },
    TimedOut,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerReport {
    pub producer: String,
    pub source: SignalSource,
    pub signals: usize,
    pub outcome: ProducerOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub bot_id: String,
    pub symbol: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub states: Vec<CycleState>,
    pub producers: Vec<ProducerReport>,
    pub signals: Vec<Signal>,
    pub decision: Decision,
    pub collect_duration_ms: u64,
}

impl CycleReport {
    pub fn audit_record(&self) -> AuditRecord {
        AuditRecord {
            cycle_id: self.cycle_id,
            bot_id: self.bot_id.clone(),
            symbol: self.symbol.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            signals: self.signals.clone(),
            decision: self.decision.clone(),
        }
    }

    pub fn final_state(&self) -> CycleState {
        self.states.last().copied().unwrap_or(CycleState::Terminal)
    }
}

#[derive(Debug, Clone)]
pub enum CycleOutcome {
    Completed(Box<CycleReport>),
    /// Aborted before `at`; nothing from the cycle is kept.
    Cancelled {
        cycle_id: Uuid,
        at: CycleState,
        states: Vec<CycleState>,
    },
}

impl CycleOutcome {
    pub fn report(&self) -> Option<&CycleReport> {
        match self {
            CycleOutcome::Completed(report) => Some(report),
            CycleOutcome::Cancelled { .. } => None,
        }
    }
}

/// Runs execution cycles over a fixed set of producers.
///
/// The engine holds no per-cycle state; one instance can drive any number of
/// concurrent cycles for different (bot, symbol) pairs.
pub struct DecisionEngine {
    producers: Vec<Arc<dyn SignalProducer>>,
    producer_timeout: Duration,
    scorer: RiskScorer,
}

impl DecisionEngine {
    pub fn new(producers: Vec<Arc<dyn SignalProducer>>, producer_timeout: Duration) -> Self {
        Self {
            producers,
            producer_timeout,
            scorer: RiskScorer::default(),
        }
    }

    pub fn producer_count(&self) -> usize {
        self.producers.len()
    }

    /// Fetch from every enabled producer concurrently. A producer that fails
    /// or exceeds the timeout contributes zero signals.
    async fn collect(
        &self,
        symbol: &str,
        weights: &SourceWeights,
    ) -> (Vec<Signal>, Vec<ProducerReport>) {
        let timeout = self.producer_timeout;

        let fetches = self.producers.iter().map(|producer| {
            let producer = Arc::clone(producer);
            async move {
                let source = producer.source();
                let name = producer.name().to_string();

                if !weights.is_enabled(source) {
                    tracing::debug!("Skipping producer {} ({} analysis disabled)", name, source);
                    let report = ProducerReport {
                        producer: name,
                        source,
                        signals: 0,
                        outcome: ProducerOutcome::Disabled,
                    };
                    return (Vec::new(), report);
                }

                let (signals, outcome) =
                    match tokio::time::timeout(timeout, producer.collect(symbol)).await {
                        Ok(Ok(signals)) => (signals, ProducerOutcome::Collected),
                        Ok(Err(e)) => {
                            tracing::warn!("Producer {} failed for {}: {}", name, symbol, e);
                            (Vec::new(), ProducerOutcome::Failed { error: e.to_string() })
                        }
                        Err(_) => {
                            tracing::warn!(
                                "Producer {} for {}: {}",
                                name,
                                symbol,
                                EngineError::Timeout(timeout.as_millis() as u64)
                            );
                            (Vec::new(), ProducerOutcome::TimedOut)
                        }
                    };

                let report = ProducerReport {
                    producer: name,
                    source,
                    signals: signals.len(),
                    outcome,
                };
                (signals, report)
            }
        });

        let mut signals = Vec::new();
        let mut reports = Vec::with_capacity(self.producers.len());
        // join_all keeps producer order, so the snapshot is deterministic.
        for (batch, report) in join_all(fetches).await {
            signals.extend(batch);
            reports.push(report);
        }
        (signals, reports)
    }

    /// Run one cycle: Collecting -> Aggregating -> RiskScoring -> Resolving ->
    /// Decided | Overridden -> Terminal.
    ///
    /// Only configuration errors are returned as `Err`. Cancellation is
    /// honoured up to (not after) the Resolving state.
    pub async fn run_cycle(
        &self,
        request: &CycleRequest,
        cancel: &CancellationFlag,
    ) -> EngineResult<CycleOutcome> {
        request.weights.validate()?;
        request.policy.validate()?;

        let cycle_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut states = vec![CycleState::Collecting];

        let cancelled = |at: CycleState, mut states: Vec<CycleState>| -> EngineResult<CycleOutcome> {
            tracing::info!(
                "Cycle {} for {}/{} cancelled before {:?}",
                cycle_id,
                request.bot_id,
                request.symbol,
                at
            );
            states.push(CycleState::Terminal);
            Ok(CycleOutcome::Cancelled { cycle_id, at, states })
        };

        let collect_start = Instant::now();
        let (signals, producers) = self.collect(&request.symbol, &request.weights).await;
        let collect_duration_ms = collect_start.elapsed().as_millis() as u64;

        if cancel.is_cancelled() {
            return cancelled(CycleState::Aggregating, states);
        }
        states.push(CycleState::Aggregating);
        let aggregated = aggregate(&signals, &request.weights);

        if cancel.is_cancelled() {
            return cancelled(CycleState::RiskScoring, states);
        }
        states.push(CycleState::RiskScoring);
        let risk = self.scorer.score(&request.risk_inputs);

        if cancel.is_cancelled() {
            return cancelled(CycleState::Resolving, states);
        }
        states.push(CycleState::Resolving);
        let decision = resolve(&aggregated, &risk, &request.policy);

        states.push(if decision.risk_override_applied {
            CycleState::Overridden
        } else {
            CycleState::Decided
        });
        states.push(CycleState::Terminal);

        tracing::info!(
            "Cycle {} {}/{}: {} (confidence {:.2}, risk {:.1}, scale {:.2}) in {}ms",
            cycle_id,
            request.bot_id,
            request.symbol,
            decision.action,
            decision.confidence,
            decision.risk_score,
            decision.position_scale_factor,
            collect_duration_ms
        );

        Ok(CycleOutcome::Completed(Box::new(CycleReport {
            cycle_id,
            bot_id: request.bot_id.clone(),
            symbol: request.symbol.clone(),
            started_at,
            finished_at: Utc::now(),
            states,
            producers,
            signals,
            decision,
            collect_duration_ms,
        })))
    }
}
