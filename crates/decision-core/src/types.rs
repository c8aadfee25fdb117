use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, EngineResult};

/// Scores closer than this are considered tied.
pub const TIE_EPSILON: f64 = 1e-12;

/// Origin of a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalSource {
    Ml,
    Indicator,
    Pattern,
    Social,
    News,
}

impl SignalSource {
    pub const ALL: [SignalSource; 5] = [
        SignalSource::Ml,
        SignalSource::Indicator,
        SignalSource::Pattern,
        SignalSource::Social,
        SignalSource::News,
    ];

    pub fn default_weight(&self) -> f64 {
        match self {
            SignalSource::Ml => 0.40,
            SignalSource::Indicator => 0.30,
            SignalSource::Pattern => 0.15,
            SignalSource::Social => 0.10,
            SignalSource::News => 0.05,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalSource::Ml => "ml",
            SignalSource::Indicator => "indicator",
            SignalSource::Pattern => "pattern",
            SignalSource::Social => "social",
            SignalSource::News => "news",
        }
    }
}

impl std::fmt::Display for SignalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action a signal votes for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl Action {
    pub const ALL: [Action; 3] = [Action::Buy, Action::Sell, Action::Hold];

    /// Lower value wins a tie: hold, then buy, then sell.
    pub fn tie_priority(&self) -> u8 {
        match self {
            Action::Hold => 0,
            Action::Buy => 1,
            Action::Sell => 2,
        }
    }

    pub fn is_directional(&self) -> bool {
        !matches!(self, Action::Hold)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy => "buy",
            Action::Sell => "sell",
            Action::Hold => "hold",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action emitted by a decision. `Skip` means the cycle produced nothing to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionAction {
    Buy,
    Sell,
    Hold,
    Skip,
}

impl DecisionAction {
    pub fn is_directional(&self) -> bool {
        matches!(self, DecisionAction::Buy | DecisionAction::Sell)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionAction::Buy => "buy",
            DecisionAction::Sell => "sell",
            DecisionAction::Hold => "hold",
            DecisionAction::Skip => "skip",
        }
    }
}

impl From<Action> for DecisionAction {
    fn from(action: Action) -> Self {
        match action {
            Action::Buy => DecisionAction::Buy,
            Action::Sell => DecisionAction::Sell,
            Action::Hold => DecisionAction::Hold,
        }
    }
}

impl std::fmt::Display for DecisionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Clamp to [0, 1], mapping NaN to 0.
pub fn unit_clamp(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// One producer's vote about one instant. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub source: SignalSource,
    pub name: String,
    pub action: Action,
    pub confidence: f64,
    pub strength: f64,
    pub timestamp: DateTime<Utc>,
}

impl Signal {
    /// Strength falls back to confidence for sources without an independent notion of it.
    pub fn new(
        source: SignalSource,
        name: impl Into<String>,
        action: Action,
        confidence: f64,
        strength: Option<f64>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            source,
            name: name.into(),
            action,
            confidence,
            strength: strength.unwrap_or(confidence),
            timestamp,
        }
    }

    pub fn clamped_confidence(&self) -> f64 {
        unit_clamp(self.confidence)
    }

    pub fn clamped_strength(&self) -> f64 {
        unit_clamp(self.strength)
    }
}

/// Per-source weights. Not required to sum to 1; an absent source weighs 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceWeights {
    weights: BTreeMap<SignalSource, f64>,
}

impl Default for SourceWeights {
    fn default() -> Self {
        let mut weights = BTreeMap::new();
        for source in [SignalSource::Ml, SignalSource::Indicator, SignalSource::Pattern] {
            weights.insert(source, source.default_weight());
        }
        Self { weights }
    }
}

impl SourceWeights {
    pub fn empty() -> Self {
        Self {
            weights: BTreeMap::new(),
        }
    }

    /// Enable social sentiment with its default weight.
    pub fn with_social(mut self) -> Self {
        self.weights
            .insert(SignalSource::Social, SignalSource::Social.default_weight());
        self
    }

    /// Enable news sentiment with its default weight.
    pub fn with_news(mut self) -> Self {
        self.weights
            .insert(SignalSource::News, SignalSource::News.default_weight());
        self
    }

    pub fn set(mut self, source: SignalSource, weight: f64) -> Self {
        self.weights.insert(source, weight);
        self
    }

    pub fn weight(&self, source: SignalSource) -> f64 {
        self.weights.get(&source).copied().unwrap_or(0.0)
    }

    pub fn is_enabled(&self, source: SignalSource) -> bool {
        self.weights.contains_key(&source)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SignalSource, f64)> + '_ {
        self.weights.iter().map(|(s, w)| (*s, *w))
    }

    pub fn validate(&self) -> EngineResult<()> {
        for (source, weight) in &self.weights {
            if weight.is_nan() || *weight < 0.0 || *weight > 1.0 {
                return Err(EngineError::ConfigurationError(format!(
                    "weight for {} must be within [0, 1], got {}",
                    source, weight
                )));
            }
        }
        Ok(())
    }
}

/// Risk input that was absent or unusable when scoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskInput {
    Volatility,
    PositionValue,
    TotalBudget,
    Drawdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Moderate,
    Elevated,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s < 25.0 => RiskLevel::Low,
            s if s < 45.0 => RiskLevel::Moderate,
            s if s < 65.0 => RiskLevel::Elevated,
            s if s < 80.0 => RiskLevel::High,
            _ => RiskLevel::Critical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Moderate => "Moderate",
            RiskLevel::Elevated => "Elevated",
            RiskLevel::High => "High",
            RiskLevel::Critical => "Critical",
        }
    }
}

/// Four risk sub-scores in points. Volatility max 30, concentration max 20,
/// drawdown max 25, position size max 25.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskComponents {
    pub volatility: f64,
    pub concentration: f64,
    pub drawdown: f64,
    pub position_size: f64,
    #[serde(default)]
    pub missing_inputs: Vec<RiskInput>,
}

impl RiskComponents {
    /// Composite 0-100 risk score.
    pub fn total(&self) -> f64 {
        let sum = [
            self.volatility,
            self.concentration,
            self.drawdown,
            self.position_size,
        ]
        .iter()
        .map(|p| if p.is_nan() { 0.0 } else { p.max(0.0) })
        .sum::<f64>();
        sum.min(100.0)
    }

    pub fn level(&self) -> RiskLevel {
        RiskLevel::from_score(self.total())
    }
}

/// Audit row for one input signal, zero-contribution signals included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalContribution {
    pub source: SignalSource,
    pub name: String,
    pub action: Action,
    pub confidence: f64,
    pub strength: f64,
    pub weight: f64,
    pub contribution: f64,
}

/// Normalized support per action. Sums to 1 or is all zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionScores {
    pub buy: f64,
    pub sell: f64,
    pub hold: f64,
}

impl ActionScores {
    pub fn get(&self, action: Action) -> f64 {
        match action {
            Action::Buy => self.buy,
            Action::Sell => self.sell,
            Action::Hold => self.hold,
        }
    }

    pub fn sum(&self) -> f64 {
        self.buy + self.sell + self.hold
    }

    pub fn max(&self) -> f64 {
        self.buy.max(self.sell).max(self.hold)
    }

    /// Winning action with the conservative tie-break: a tie involving hold
    /// resolves to hold, a buy/sell deadlock also resolves to hold, otherwise
    /// the lowest tie priority wins.
    pub fn top_action(&self) -> Action {
        let top = self.max();
        let tied: Vec<Action> = Action::ALL
            .into_iter()
            .filter(|a| (self.get(*a) - top).abs() <= TIE_EPSILON)
            .collect();

        if tied.contains(&Action::Hold) {
            return Action::Hold;
        }
        if tied.contains(&Action::Buy) && tied.contains(&Action::Sell) {
            return Action::Hold;
        }
        tied.into_iter()
            .min_by_key(|a| a.tie_priority())
            .unwrap_or(Action::Hold)
    }
}

/// Output of one aggregation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub action_scores: ActionScores,
    pub confidence: f64,
    /// Signals with a contribution above zero.
    pub signals_used: usize,
    /// Every signal handed to the aggregator.
    pub signals_considered: usize,
    /// Signals rejected as invalid after clamping.
    pub signals_dropped: usize,
    pub total_contribution: f64,
    pub contributions: Vec<SignalContribution>,
    pub source_counts: BTreeMap<SignalSource, usize>,
    pub reason: String,
}

impl AggregatedResult {
    pub fn winning_action(&self) -> Action {
        self.action_scores.top_action()
    }

    pub fn is_degenerate(&self) -> bool {
        self.signals_used == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverrideAction {
    Hold,
    Skip,
}

impl From<OverrideAction> for DecisionAction {
    fn from(action: OverrideAction) -> Self {
        match action {
            OverrideAction::Hold => DecisionAction::Hold,
            OverrideAction::Skip => DecisionAction::Skip,
        }
    }
}

/// How risk folds into the decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskPolicy {
    /// Risk score above which a directional decision is overridden (0-100)
    pub risk_score_threshold: f64,
    /// Scale = 1 - (risk / 100) * factor
    pub risk_adjustment_factor: f64,
    /// Floor for the position scale factor, never 0
    pub min_position_scale: f64,
    pub risk_based_override: bool,
    pub risk_based_position_scaling: bool,
    pub override_action: OverrideAction,
    /// Directional decisions below this aggregated confidence become hold
    #[serde(default)]
    pub min_confidence: f64,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self::moderate()
    }
}

impl RiskPolicy {
    pub fn conservative() -> Self {
        Self {
            risk_score_threshold: 50.0,
            risk_adjustment_factor: 0.7,
            ..Self::moderate()
        }
    }

    pub fn moderate() -> Self {
        Self {
            risk_score_threshold: 60.0,
            risk_adjustment_factor: 0.5,
            min_position_scale: 0.1,
            risk_based_override: true,
            risk_based_position_scaling: true,
            override_action: OverrideAction::Hold,
            min_confidence: 0.0,
        }
    }

    pub fn aggressive() -> Self {
        Self {
            risk_score_threshold: 70.0,
            risk_adjustment_factor: 0.3,
            ..Self::moderate()
        }
    }

    /// Look up a preset by name.
    pub fn preset(name: &str) -> EngineResult<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "conservative" => Ok(Self::conservative()),
            "moderate" | "default" => Ok(Self::moderate()),
            "aggressive" => Ok(Self::aggressive()),
            other => Err(EngineError::ConfigurationError(format!(
                "unknown risk policy preset '{}'",
                other
            ))),
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        let bad = |msg: String| Err(EngineError::ConfigurationError(msg));

        if !(0.0..=100.0).contains(&self.risk_score_threshold) {
            return bad(format!(
                "risk_score_threshold must be within [0, 100], got {}",
                self.risk_score_threshold
            ));
        }
        if !(self.risk_adjustment_factor > 0.0 && self.risk_adjustment_factor < 1.0) {
            return bad(format!(
                "risk_adjustment_factor must be within (0, 1), got {}",
                self.risk_adjustment_factor
            ));
        }
        let max_floor = 1.0 - self.risk_adjustment_factor;
        if self.min_position_scale.is_nan()
            || self.min_position_scale <= 0.0
            || self.min_position_scale > max_floor
        {
            return bad(format!(
                "min_position_scale must be within (0, {:.4}], got {}",
                max_floor, self.min_position_scale
            ));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return bad(format!(
                "min_confidence must be within [0, 1], got {}",
                self.min_confidence
            ));
        }
        Ok(())
    }
}

/// Terminal artifact of one execution cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: DecisionAction,
    /// Winner before any override or gate
    pub winning_action: Action,
    pub confidence: f64,
    pub position_scale_factor: f64,
    pub risk_override_applied: bool,
    pub confidence_gate_applied: bool,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub aggregated: AggregatedResult,
    pub risk: RiskComponents,
    pub reason: String,
}

impl Decision {
    pub fn is_actionable(&self) -> bool {
        self.action.is_directional()
    }

    /// Order notional for a base budget, zero for non-directional decisions.
    pub fn order_notional(&self, budget: Decimal) -> Decimal {
        if !self.is_actionable() {
            return Decimal::ZERO;
        }
        let scale = Decimal::from_f64(self.position_scale_factor).unwrap_or(Decimal::ZERO);
        (budget * scale).round_dp(2)
    }
}

/// Result reported back by an execution gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionStatus {
    Submitted { order_id: String },
    Rejected { reason: String },
    NotSubmitted,
}

/// Everything needed to reconstruct a cycle's decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub cycle_id: Uuid,
    pub bot_id: String,
    pub symbol: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub signals: Vec<Signal>,
    pub decision: Decision,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn scores(buy: f64, sell: f64, hold: f64) -> ActionScores {
        ActionScores { buy, sell, hold }
    }

    #[test]
    fn test_signal_strength_defaults_to_confidence() {
        let s = Signal::new(SignalSource::Pattern, "double_bottom", Action::Buy, 0.7, None, Utc::now());
        assert_eq!(s.strength, 0.7);
    }

    #[test]
    fn test_clamping_handles_nan_and_range() {
        let mut s = Signal::new(SignalSource::Ml, "lstm", Action::Buy, f64::NAN, Some(1.5), Utc::now());
        assert_eq!(s.clamped_confidence(), 0.0);
        assert_eq!(s.clamped_strength(), 1.0);
        s.confidence = -0.2;
        assert_eq!(s.clamped_confidence(), 0.0);
    }

    #[test]
    fn test_default_weights() {
        let w = SourceWeights::default();
        assert_eq!(w.weight(SignalSource::Ml), 0.40);
        assert_eq!(w.weight(SignalSource::Indicator), 0.30);
        assert_eq!(w.weight(SignalSource::Pattern), 0.15);
        assert!(!w.is_enabled(SignalSource::Social));
        assert_eq!(w.weight(SignalSource::News), 0.0);

        let w = w.with_social().with_news();
        assert_eq!(w.weight(SignalSource::Social), 0.10);
        assert_eq!(w.weight(SignalSource::News), 0.05);
    }

    #[test]
    fn test_negative_weight_rejected() {
        let w = SourceWeights::default().set(SignalSource::Ml, -0.1);
        assert!(matches!(w.validate(), Err(EngineError::ConfigurationError(_))));
        let w = SourceWeights::default().set(SignalSource::News, f64::NAN);
        assert!(w.validate().is_err());
    }

    #[test]
    fn test_risk_total_is_capped() {
        let r = RiskComponents {
            volatility: 90.0,
            concentration: 40.0,
            drawdown: f64::NAN,
            position_size: -5.0,
            missing_inputs: vec![],
        };
        assert_eq!(r.total(), 100.0);
        assert_eq!(r.level(), RiskLevel::Critical);
    }

    #[test]
    fn test_tie_prefers_hold() {
        assert_eq!(scores(0.5, 0.0, 0.5).top_action(), Action::Hold);
        assert_eq!(scores(0.0, 0.5, 0.5).top_action(), Action::Hold);
    }

    #[test]
    fn test_buy_sell_deadlock_resolves_to_hold() {
        assert_eq!(scores(0.5, 0.5, 0.0).top_action(), Action::Hold);
    }

    #[test]
    fn test_clear_winner() {
        assert_eq!(scores(0.6, 0.3, 0.1).top_action(), Action::Buy);
        assert_eq!(scores(0.2, 0.7, 0.1).top_action(), Action::Sell);
        assert_eq!(ActionScores::default().top_action(), Action::Hold);
    }

    #[test]
    fn test_policy_presets_validate() {
        for p in [RiskPolicy::conservative(), RiskPolicy::moderate(), RiskPolicy::aggressive()] {
            assert!(p.validate().is_ok());
        }
        assert_eq!(RiskPolicy::preset("Conservative").unwrap().risk_score_threshold, 50.0);
        assert!(RiskPolicy::preset("yolo").is_err());
    }

    #[test]
    fn test_policy_rejects_zero_floor_and_full_factor() {
        let p = RiskPolicy { min_position_scale: 0.0, ..RiskPolicy::default() };
        assert!(p.validate().is_err());
        let p = RiskPolicy { risk_adjustment_factor: 1.0, ..RiskPolicy::default() };
        assert!(p.validate().is_err());
        let p = RiskPolicy { risk_score_threshold: 120.0, ..RiskPolicy::default() };
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_policy_rejects_flat_scaling() {
        let p = RiskPolicy { risk_adjustment_factor: 0.0, ..RiskPolicy::default() };
        assert!(matches!(p.validate(), Err(EngineError::ConfigurationError(_))));
        let p = RiskPolicy { risk_adjustment_factor: f64::NAN, ..RiskPolicy::default() };
        assert!(p.validate().is_err());
        let p = RiskPolicy { risk_adjustment_factor: 0.01, ..RiskPolicy::default() };
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_weights_serde_uses_lowercase_keys() {
        let json = serde_json::to_string(&SourceWeights::default().with_news()).unwrap();
        assert!(json.contains("\"ml\":0.4"));
        assert!(json.contains("\"news\":0.05"));
        let back: SourceWeights = serde_json::from_str(&json).unwrap();
        assert_eq!(back.weight(SignalSource::News), 0.05);
    }

    #[test]
    fn test_order_notional_scales_directional_only() {
        let aggregated = AggregatedResult {
            action_scores: scores(1.0, 0.0, 0.0),
            confidence: 1.0,
            signals_used: 1,
            signals_considered: 1,
            signals_dropped: 0,
            total_contribution: 0.256,
            contributions: vec![],
            source_counts: BTreeMap::new(),
            reason: String::new(),
        };
        let mut decision = Decision {
            action: DecisionAction::Buy,
            winning_action: Action::Buy,
            confidence: 1.0,
            position_scale_factor: 0.75,
            risk_override_applied: false,
            confidence_gate_applied: false,
            risk_score: 50.0,
            risk_level: RiskLevel::Elevated,
            aggregated,
            risk: RiskComponents::default(),
            reason: String::new(),
        };
        assert_eq!(decision.order_notional(dec!(1000)), dec!(750.00));

        decision.action = DecisionAction::Hold;
        assert_eq!(decision.order_notional(dec!(1000)), Decimal::ZERO);
    }

    #[test]
    fn test_order_notional_unrepresentable_scale_is_zero() {
        let aggregated = AggregatedResult {
            action_scores: scores(0.0, 1.0, 0.0),
            confidence: 1.0,
            signals_used: 1,
            signals_considered: 1,
            signals_dropped: 0,
            total_contribution: 0.3,
            contributions: vec![],
            source_counts: BTreeMap::new(),
            reason: String::new(),
        };
        let decision = Decision {
            action: DecisionAction::Sell,
            winning_action: Action::Sell,
            confidence: 1.0,
            position_scale_factor: f64::NAN,
            risk_override_applied: false,
            confidence_gate_applied: false,
            risk_score: 10.0,
            risk_level: RiskLevel::Low,
            aggregated,
            risk: RiskComponents::default(),
            reason: String::new(),
        };
        assert_eq!(decision.order_notional(dec!(1000)), Decimal::ZERO);
    }
}
