use decision_core::{AggregatedResult, Decision, DecisionAction, RiskComponents, RiskPolicy};

/// Position multiplier for a risk score: `1 - (risk / 100) * factor`, floored
/// at the policy minimum. 1.0 when scaling is disabled.
pub fn position_scale_factor(risk_score: f64, policy: &RiskPolicy) -> f64 {
    if !policy.risk_based_position_scaling {
        return 1.0;
    }
    let risk = if risk_score.is_nan() { 0.0 } else { risk_score.clamp(0.0, 100.0) };
    let scaled = 1.0 - (risk / 100.0) * policy.risk_adjustment_factor;
    let floor = if policy.min_position_scale > 0.0 { policy.min_position_scale } else { f64::MIN_POSITIVE };
    scaled.clamp(floor, 1.0)
}

/// Pick the winning action and fold in the risk model.
///
/// The policy is expected to be validated by the caller; `resolve` itself
/// never fails. The returned decision embeds the aggregation and risk inputs
/// untouched, including the original winning action when an override fires.
pub fn resolve(aggregated: &AggregatedResult, risk: &RiskComponents, policy: &RiskPolicy) -> Decision {
    let risk_score = risk.total();
    let risk_level = risk.level();
    let scale = position_scale_factor(risk_score, policy);
    let winner = aggregated.winning_action();
    let winner_score = aggregated.action_scores.get(winner);

    let mut reason = format!(
        "winner={} score={:.4} confidence={:.4}; risk={:.2} ({}); scale={:.4}",
        winner,
        winner_score,
        aggregated.confidence,
        risk_score,
        risk_level.as_str(),
        scale
    );

    let mut action = DecisionAction::from(winner);
    let mut risk_override_applied = false;
    let mut confidence_gate_applied = false;

    if aggregated.is_degenerate() {
        action = DecisionAction::Skip;
        reason.push_str("; no contributing signals -> skip");
    } else if winner.is_directional() {
        if policy.risk_based_override && risk_score > policy.risk_score_threshold {
            action = policy.override_action.into();
            risk_override_applied = true;
            reason.push_str(&format!(
                "; override: risk {:.2} > threshold {:.2} -> {}",
                risk_score, policy.risk_score_threshold, action
            ));
        } else if aggregated.confidence < policy.min_confidence {
            action = DecisionAction::Hold;
            confidence_gate_applied = true;
            reason.push_str(&format!(
                "; gate: confidence {:.4} < min {:.4} -> hold",
                aggregated.confidence, policy.min_confidence
            ));
        }
    }

    if risk_override_applied {
        tracing::info!(
            "Risk override: {} downgraded to {} (risk {:.2} > {:.2})",
            winner,
            action,
            risk_score,
            policy.risk_score_threshold
        );
    }

    Decision {
        action,
        winning_action: winner,
        confidence: aggregated.confidence,
        position_scale_factor: scale,
        risk_override_applied,
        confidence_gate_applied,
        risk_score,
        risk_level,
        aggregated: aggregated.clone(),
        risk: risk.clone(),
        reason,
    }
}
