use async_trait::async_trait;
use decision_core::{Decision, EngineResult, ExecutionGateway, ExecutionStatus};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Simulated order router. Directional decisions with a positive notional are
/// "filled" immediately under a synthetic order id.
pub struct PaperGateway;

#[async_trait]
impl ExecutionGateway for PaperGateway {
    async fn submit(
        &self,
        symbol: &str,
        decision: &Decision,
        notional: Decimal,
    ) -> EngineResult<ExecutionStatus> {
        if !decision.is_actionable() {
            return Ok(ExecutionStatus::NotSubmitted);
        }

        if notional <= Decimal::ZERO {
            tracing::warn!("Rejecting {} {}: notional ${} is not positive", decision.action, symbol, notional);
            return Ok(ExecutionStatus::Rejected {
                reason: format!("non-positive notional {}", notional),
            });
        }

        let order_id = format!("paper-{}", Uuid::new_v4());
        tracing::info!(
            "[PAPER] {} {} ${} (scale {:.2}, risk {:.1}) -> {}",
            decision.action,
            symbol,
            notional,
            decision.position_scale_factor,
            decision.risk_score,
            order_id
        );
        Ok(ExecutionStatus::Submitted { order_id })
    }
}
