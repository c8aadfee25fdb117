use std::collections::BTreeMap;

use decision_core::{
    Action, ActionScores, AggregatedResult, EngineError, EngineResult, Signal,
    SignalContribution, SignalSource, SourceWeights,
};

/// Clamp a signal's inputs and confirm they landed in range.
fn sanitize(signal: &Signal) -> EngineResult<(f64, f64)> {
    let confidence = signal.clamped_confidence();
    let strength = signal.clamped_strength();
    if !(0.0..=1.0).contains(&confidence) || !(0.0..=1.0).contains(&strength) {
        return Err(EngineError::InvalidSignal(format!(
            "{}:{} confidence={} strength={} outside [0, 1] after clamping",
            signal.source, signal.name, confidence, strength
        )));
    }
    Ok((confidence, strength))
}

fn count_summary(counts: &BTreeMap<SignalSource, usize>) -> String {
    counts
        .iter()
        .map(|(source, n)| format!("{}:{}", source, n))
        .collect::<Vec<_>>()
        .join(",")
}

/// Combine a frozen snapshot of signals into normalized per-action scores.
///
/// Each signal contributes `confidence * strength * weight[source]`. Scores are
/// normalized by the realized total contribution, not by the sum of weights, so
/// the three scores sum to 1 whenever anything contributed. When nothing did,
/// every score and the confidence are 0.
pub fn aggregate(signals: &[Signal], weights: &SourceWeights) -> AggregatedResult {
    let mut buy_total = 0.0;
    let mut sell_total = 0.0;
    let mut hold_total = 0.0;
    let mut total_contribution = 0.0;
    let mut signals_used = 0;
    let mut signals_dropped = 0;
    let mut contributions = Vec::with_capacity(signals.len());
    let mut source_counts: BTreeMap<SignalSource, usize> = BTreeMap::new();

    for signal in signals {
        *source_counts.entry(signal.source).or_insert(0) += 1;

        let (confidence, strength) = match sanitize(signal) {
            Ok(values) => values,
            Err(e) => {
                tracing::error!("{}", e);
                signals_dropped += 1;
                continue;
            }
        };

        // Unvalidated maps can carry NaN or negative weights; those count as 0.
        let weight = match weights.weight(signal.source) {
            w if w > 0.0 && w.is_finite() => w,
            _ => 0.0,
        };
        let contribution = confidence * strength * weight;

        contributions.push(SignalContribution {
            source: signal.source,
            name: signal.name.clone(),
            action: signal.action,
            confidence,
            strength,
            weight,
            contribution,
        });

        if contribution <= 0.0 {
            continue;
        }

        match signal.action {
            Action::Buy => buy_total += contribution,
            Action::Sell => sell_total += contribution,
            Action::Hold => hold_total += contribution,
        }
        total_contribution += contribution;
        signals_used += 1;
    }

    let signals_considered = signals.len();

    if total_contribution <= 0.0 {
        return AggregatedResult {
            action_scores: ActionScores::default(),
            confidence: 0.0,
            signals_used: 0,
            signals_considered,
            signals_dropped,
            total_contribution: 0.0,
            contributions,
            reason: format!(
                "no signals contributed (0/{}) [{}]",
                signals_considered,
                count_summary(&source_counts)
            ),
            source_counts,
        };
    }

    let action_scores = ActionScores {
        buy: buy_total / total_contribution,
        sell: sell_total / total_contribution,
        hold: hold_total / total_contribution,
    };
    let confidence = action_scores.max();

    let reason = format!(
        "buy={:.4} sell={:.4} hold={:.4} from {}/{} signals [{}]",
        action_scores.buy,
        action_scores.sell,
        action_scores.hold,
        signals_used,
        signals_considered,
        count_summary(&source_counts)
    );

    tracing::debug!(
        "Aggregated {} signals: total_contribution={:.6}, {}",
        signals_considered,
        total_contribution,
        reason
    );

    AggregatedResult {
        action_scores,
        confidence,
        signals_used,
        signals_considered,
        signals_dropped,
        total_contribution,
        contributions,
        source_counts,
        reason,
    }
}
