pub mod scorer;

pub use scorer::{
    score, RiskInputs, RiskScorer, CONCENTRATION_MAX_POINTS, DRAWDOWN_MAX_POINTS,
    POSITION_SIZE_MAX_POINTS, VOLATILITY_MAX_POINTS,
};
