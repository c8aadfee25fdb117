use decision_core::{unit_clamp as unit, EngineError, RiskComponents, RiskInput};
use serde::{Deserialize, Serialize};

pub const VOLATILITY_MAX_POINTS: f64 = 30.0;
pub const CONCENTRATION_MAX_POINTS: f64 = 20.0;
pub const DRAWDOWN_MAX_POINTS: f64 = 25.0;
pub const POSITION_SIZE_MAX_POINTS: f64 = 25.0;

/// Pre-computed risk inputs for one cycle. Any field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskInputs {
    /// Normalized volatility metric, 0.0 to 1.0
    #[serde(default)]
    pub volatility: Option<f64>,
    /// Value of the position being considered
    #[serde(default)]
    pub position_value: Option<f64>,
    /// Total budget the bot trades with
    #[serde(default)]
    pub total_budget: Option<f64>,
    /// Current drawdown as a fraction, 0.0 to 1.0
    #[serde(default)]
    pub drawdown: Option<f64>,
}

/// Composite position/portfolio risk scorer.
///
/// Volatility and drawdown map linearly onto their point budgets. Concentration
/// and position size both look at `position_value / total_budget` with
/// different multipliers, so position size saturates first (at 20% of budget
/// with the defaults) and concentration at 50%.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskScorer {
    pub concentration_multiplier: f64,
    pub position_size_multiplier: f64,
}

impl Default for RiskScorer {
    fn default() -> Self {
        Self {
            concentration_multiplier: 2.0,
            position_size_multiplier: 5.0,
        }
    }
}

fn usable(value: Option<f64>) -> Option<f64> {
    value.filter(|v| !v.is_nan())
}

impl RiskScorer {
    pub fn score(&self, inputs: &RiskInputs) -> RiskComponents {
        let mut missing = Vec::new();

        let volatility = match usable(inputs.volatility) {
            Some(v) => unit(v) * VOLATILITY_MAX_POINTS,
            None => {
                missing.push(RiskInput::Volatility);
                0.0
            }
        };

        let drawdown = match usable(inputs.drawdown) {
            Some(d) => unit(d) * DRAWDOWN_MAX_POINTS,
            None => {
                missing.push(RiskInput::Drawdown);
                0.0
            }
        };

        let ratio = match (usable(inputs.position_value), usable(inputs.total_budget)) {
            (Some(value), Some(budget)) if budget > 0.0 => Some(value / budget),
            (value, budget) => {
                if value.is_none() {
                    missing.push(RiskInput::PositionValue);
                }
                if budget.map_or(true, |b| b <= 0.0) {
                    missing.push(RiskInput::TotalBudget);
                }
                None
            }
        };

        let (concentration, position_size) = match ratio {
            Some(r) => (
                unit(r * self.concentration_multiplier) * CONCENTRATION_MAX_POINTS,
                unit(r * self.position_size_multiplier) * POSITION_SIZE_MAX_POINTS,
            ),
            None => (0.0, 0.0),
        };

        for input in &missing {
            tracing::debug!(
                "{}",
                EngineError::RiskInputMissing(format!("{:?} degraded to 0 points", input))
            );
        }

        RiskComponents {
            volatility,
            concentration,
            drawdown,
            position_size,
            missing_inputs: missing,
        }
    }
}

/// Score with the default multipliers.
pub fn score(inputs: &RiskInputs) -> RiskComponents {
    RiskScorer::default().score(inputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn inputs(vol: f64, value: f64, budget: f64, dd: f64) -> RiskInputs {
        RiskInputs {
            volatility: Some(vol),
            position_value: Some(value),
            total_budget: Some(budget),
            drawdown: Some(dd),
        }
    }

    #[test]
    fn test_component_formulas() {
        let r = score(&inputs(0.5, 1_000.0, 10_000.0, 0.2));
        assert_relative_eq!(r.volatility, 15.0, epsilon = 1e-12);
        // ratio 0.1 -> concentration 0.2 * 20, position 0.5 * 25
        assert_relative_eq!(r.concentration, 4.0, epsilon = 1e-12);
        assert_relative_eq!(r.position_size, 12.5, epsilon = 1e-12);
        assert_relative_eq!(r.drawdown, 5.0, epsilon = 1e-12);
        assert_relative_eq!(r.total(), 36.5, epsilon = 1e-12);
        assert!(r.missing_inputs.is_empty());
    }

    #[test]
    fn test_saturated_inputs_hit_max_points() {
        let r = score(&inputs(1.0, 10_000.0, 10_000.0, 1.0));
        assert_eq!(r.volatility, VOLATILITY_MAX_POINTS);
        assert_eq!(r.concentration, CONCENTRATION_MAX_POINTS);
        assert_eq!(r.drawdown, DRAWDOWN_MAX_POINTS);
        assert_eq!(r.position_size, POSITION_SIZE_MAX_POINTS);
        assert_eq!(r.total(), 100.0);
    }

    #[test]
    fn test_adversarial_inputs_stay_in_range() {
        let cases = [
            inputs(1e9, 1e12, 1.0, 50.0),
            inputs(-4.0, -100.0, 10.0, -1.0),
            inputs(f64::INFINITY, f64::NAN, 10.0, f64::NEG_INFINITY),
        ];
        for case in &cases {
            let total = score(case).total();
            assert!((0.0..=100.0).contains(&total), "total {} for {:?}", total, case);
        }
    }

    #[test]
    fn test_missing_inputs_degrade_to_zero() {
        let r = score(&RiskInputs::default());
        assert_eq!(r.total(), 0.0);
        assert_eq!(
            r.missing_inputs,
            vec![
                RiskInput::Volatility,
                RiskInput::Drawdown,
                RiskInput::PositionValue,
                RiskInput::TotalBudget
            ]
        );

        let partial = RiskInputs {
            volatility: Some(0.4),
            position_value: Some(500.0),
            total_budget: Some(0.0),
            drawdown: None,
        };
        let r = score(&partial);
        assert_relative_eq!(r.volatility, 12.0, epsilon = 1e-12);
        assert_eq!(r.concentration, 0.0);
        assert_eq!(r.position_size, 0.0);
        assert!(r.missing_inputs.contains(&RiskInput::TotalBudget));
        assert!(r.missing_inputs.contains(&RiskInput::Drawdown));
    }

    #[test]
    fn test_custom_multipliers() {
        let scorer = RiskScorer {
            concentration_multiplier: 1.0,
            position_size_multiplier: 1.0,
        };
        let r = scorer.score(&inputs(0.0, 2_500.0, 10_000.0, 0.0));
        assert_relative_eq!(r.concentration, 5.0, epsilon = 1e-12);
        assert_relative_eq!(r.position_size, 6.25, epsilon = 1e-12);
    }
}
