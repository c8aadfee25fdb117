use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::{AuditRecord, Decision, EngineResult, ExecutionStatus, Signal, SignalSource};

/// Upstream producer of signals for one source (ML service, indicator engine, ...).
#[async_trait]
pub trait SignalProducer: Send + Sync {
    fn source(&self) -> SignalSource;

    fn name(&self) -> &str;

    async fn collect(&self, symbol: &str) -> EngineResult<Vec<Signal>>;
}

/// Write-only persistence of a finished cycle.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: &AuditRecord) -> EngineResult<()>;
}

/// Turns an accepted decision into an order.
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    async fn submit(
        &self,
        symbol: &str,
        decision: &Decision,
        notional: Decimal,
    ) -> EngineResult<ExecutionStatus>;
}
