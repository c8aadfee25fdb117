use decision_core::{DecisionAction, ExecutionStatus};
use decision_engine::{CycleReport, ProducerOutcome};

/// Running counters for the agent, logged as a structured summary every
/// `log_interval_cycles` completed cycles.
#[derive(Debug, Default)]
pub struct AgentMetrics {
    pub cycles_completed: u64,
    pub cycles_cancelled: u64,
    pub cycles_failed: u64,

    pub decisions_buy: u64,
    pub decisions_sell: u64,
    pub decisions_hold: u64,
    pub decisions_skip: u64,
    pub risk_overrides: u64,
    pub confidence_gated: u64,

    pub orders_submitted: u64,
    pub orders_rejected: u64,
    pub audit_failures: u64,

    pub producer_failures: u64,
    pub producer_timeouts: u64,
    pub signals_collected: u64,

    pub last_collect_duration_ms: u64,
    log_interval_cycles: u64,
}

impl AgentMetrics {
    pub fn new(log_interval_cycles: u64) -> Self {
        Self {
            log_interval_cycles,
            ..Self::default()
        }
    }

    pub fn record_report(&mut self, report: &CycleReport) {
        self.cycles_completed += 1;
        self.signals_collected += report.signals.len() as u64;
        self.last_collect_duration_ms = report.collect_duration_ms;

        for producer in &report.producers {
            match producer.outcome {
                ProducerOutcome::Failed { .. } => self.producer_failures += 1,
                ProducerOutcome::TimedOut => self.producer_timeouts += 1,
                ProducerOutcome::Collected | ProducerOutcome::Disabled => {}
            }
        }

        let decision = &report.decision;
        match decision.action {
            DecisionAction::Buy => self.decisions_buy += 1,
            DecisionAction::Sell => self.decisions_sell += 1,
            DecisionAction::Hold => self.decisions_hold += 1,
            DecisionAction::Skip => self.decisions_skip += 1,
        }
        if decision.risk_override_applied {
            self.risk_overrides += 1;
        }
        if decision.confidence_gate_applied {
            self.confidence_gated += 1;
        }

        if self.log_interval_cycles > 0 && self.cycles_completed % self.log_interval_cycles == 0 {
            self.log_metrics();
        }
    }

    pub fn record_cancelled(&mut self) {
        self.cycles_cancelled += 1;
    }

    pub fn record_failed(&mut self) {
        self.cycles_failed += 1;
    }

    pub fn record_audit_failure(&mut self) {
        self.audit_failures += 1;
    }

    pub fn record_execution(&mut self, status: &ExecutionStatus) {
        match status {
            ExecutionStatus::Submitted { .. } => self.orders_submitted += 1,
            ExecutionStatus::Rejected { .. } => self.orders_rejected += 1,
            ExecutionStatus::NotSubmitted => {}
        }
    }

    /// Share of completed cycles whose decision was flipped by the risk override (0-100%)
    pub fn override_rate(&self) -> f64 {
        if self.cycles_completed == 0 {
            return 0.0;
        }
        (self.risk_overrides as f64 / self.cycles_completed as f64) * 100.0
    }

    pub fn log_metrics(&self) {
        tracing::info!(
            cycles = self.cycles_completed,
            cancelled = self.cycles_cancelled,
            failed = self.cycles_failed,
            buy = self.decisions_buy,
            sell = self.decisions_sell,
            hold = self.decisions_hold,
            skip = self.decisions_skip,
            risk_overrides = self.risk_overrides,
            override_rate = format!("{:.1}%", self.override_rate()),
            confidence_gated = self.confidence_gated,
            orders_submitted = self.orders_submitted,
            orders_rejected = self.orders_rejected,
            audit_failures = self.audit_failures,
            producer_failures = self.producer_failures,
            producer_timeouts = self.producer_timeouts,
            signals_collected = self.signals_collected,
            last_collect_ms = self.last_collect_duration_ms,
            "Agent metrics summary"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::Utc;
    use decision_core::{Action, RiskComponents, RiskPolicy, Signal, SignalSource, SourceWeights};
    use decision_engine::{CycleState, ProducerReport};
    use uuid::Uuid;

    fn report(action: Action, risk: RiskComponents, producers: Vec<ProducerOutcome>) -> CycleReport {
        let signals = vec![Signal::new(SignalSource::Ml, "lgbm", action, 0.9, None, Utc::now())];
        let aggregated = signal_aggregator::aggregate(&signals, &SourceWeights::default());
        let decision = decision_engine::resolve(&aggregated, &risk, &RiskPolicy::default());
        CycleReport {
            cycle_id: Uuid::new_v4(),
            bot_id: "bot-1".to_string(),
            symbol: "AAPL".to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            states: vec![CycleState::Terminal],
            producers: producers
                .into_iter()
                .map(|outcome| ProducerReport {
                    producer: "mock".to_string(),
                    source: SignalSource::Ml,
                    signals: 0,
                    outcome,
                })
                .collect(),
            signals,
            decision,
            collect_duration_ms: 12,
        }
    }

    #[test]
    fn counts_decisions_and_producer_outcomes() {
        let mut metrics = AgentMetrics::new(0);
        metrics.record_report(&report(
            Action::Buy,
            RiskComponents::default(),
            vec![
                ProducerOutcome::Collected,
                ProducerOutcome::TimedOut,
                ProducerOutcome::Failed { error: "down".to_string() },
            ],
        ));
        metrics.record_report(&report(Action::Sell, RiskComponents::default(), vec![]));
        metrics.record_cancelled();

        assert_eq!(metrics.cycles_completed, 2);
        assert_eq!(metrics.cycles_cancelled, 1);
        assert_eq!(metrics.decisions_buy, 1);
        assert_eq!(metrics.decisions_sell, 1);
        assert_eq!(metrics.producer_timeouts, 1);
        assert_eq!(metrics.producer_failures, 1);
        assert_eq!(metrics.signals_collected, 2);
        assert_eq!(metrics.last_collect_duration_ms, 12);
    }

    #[test]
    fn tracks_overrides() {
        let mut metrics = AgentMetrics::new(0);
        let high = RiskComponents {
            volatility: 30.0,
            concentration: 20.0,
            drawdown: 25.0,
            position_size: 25.0,
            missing_inputs: vec![],
        };
        metrics.record_report(&report(Action::Buy, high, vec![]));
        metrics.record_report(&report(Action::Buy, RiskComponents::default(), vec![]));

        assert_eq!(metrics.risk_overrides, 1);
        assert_eq!(metrics.decisions_hold, 1);
        assert_relative_eq!(metrics.override_rate(), 50.0);
    }

    #[test]
    fn execution_statuses() {
        let mut metrics = AgentMetrics::new(0);
        metrics.record_execution(&ExecutionStatus::Submitted { order_id: "paper-1".to_string() });
        metrics.record_execution(&ExecutionStatus::Rejected { reason: "zero".to_string() });
        metrics.record_execution(&ExecutionStatus::NotSubmitted);
        assert_eq!(metrics.orders_submitted, 1);
        assert_eq!(metrics.orders_rejected, 1);
    }
}
