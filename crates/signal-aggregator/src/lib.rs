pub mod adapter;
pub mod aggregator;

pub use adapter::{
    adapt, adapt_batch, parse_action, IndicatorReading, MlPrediction, PatternDetection,
    ProducerPayload, SentimentReading, DEFAULT_SENTIMENT_BAND,
};
pub use aggregator::aggregate;
