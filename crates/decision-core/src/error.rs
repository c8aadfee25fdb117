use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid signal: {0}")]
    InvalidSignal(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Risk input missing: {0}")]
    RiskInputMissing(String),

    #[error("Producer error: {0}")]
    Producer(String),

    #[error("Producer timed out after {0} ms")]
    Timeout(u64),

    #[error("Audit error: {0}")]
    Audit(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
