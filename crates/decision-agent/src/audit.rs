use anyhow::{Context, Result};
use async_trait::async_trait;
use decision_core::{AuditRecord, AuditSink, Decision, EngineError, EngineResult, ExecutionStatus, Signal};
use uuid::Uuid;

/// SQLite-backed audit trail. One `decision_audit` row per cycle plus one
/// `signal_audit` row per signal contribution.
pub struct SqliteAuditSink {
    pool: sqlx::AnyPool,
}

/// Decision as stored, with the raw signals needed to replay it.
#[derive(Debug, Clone)]
pub struct StoredDecision {
    pub cycle_id: String,
    pub symbol: String,
    pub decision: Decision,
    pub signals: Vec<Signal>,
    pub execution_status: Option<ExecutionStatus>,
}

impl SqliteAuditSink {
    pub fn new(pool: sqlx::AnyPool) -> Self {
        Self { pool }
    }

    pub async fn init_tables(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS decision_audit (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                cycle_id TEXT NOT NULL UNIQUE,
                bot_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                started_at TEXT NOT NULL,
                finished_at TEXT NOT NULL,
                action TEXT NOT NULL,
                winning_action TEXT NOT NULL,
                confidence REAL NOT NULL,
                buy_score REAL NOT NULL,
                sell_score REAL NOT NULL,
                hold_score REAL NOT NULL,
                signals_used INTEGER NOT NULL,
                signals_considered INTEGER NOT NULL,
                total_contribution REAL NOT NULL,
                risk_score REAL NOT NULL,
                volatility_points REAL NOT NULL,
                concentration_points REAL NOT NULL,
                drawdown_points REAL NOT NULL,
                position_size_points REAL NOT NULL,
                position_scale_factor REAL NOT NULL,
                risk_override_applied INTEGER NOT NULL DEFAULT 0,
                reason TEXT NOT NULL,
                decision_json TEXT NOT NULL,
                signals_json TEXT NOT NULL,
                execution_status TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
        )
        .execute(&self.pool)
        .await
        .context("creating decision_audit")?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS signal_audit (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                cycle_id TEXT NOT NULL,
                source TEXT NOT NULL,
                name TEXT NOT NULL,
                action TEXT NOT NULL,
                confidence REAL NOT NULL,
                strength REAL NOT NULL,
                weight REAL NOT NULL,
                contribution REAL NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .context("creating signal_audit")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_decision_audit_symbol ON decision_audit(symbol)")
            .execute(&self.pool)
            .await
            .ok();
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_signal_audit_cycle ON signal_audit(cycle_id)")
            .execute(&self.pool)
            .await
            .ok();

        Ok(())
    }

    pub async fn update_execution_status(&self, cycle_id: Uuid, status: &ExecutionStatus) -> Result<()> {
        let status_json = serde_json::to_string(status)?;
        sqlx::query("UPDATE decision_audit SET execution_status = ? WHERE cycle_id = ?")
            .bind(status_json)
            .bind(cycle_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Most recent decisions for a symbol, newest first.
    pub async fn recent_decisions(&self, symbol: &str, limit: i64) -> Result<Vec<StoredDecision>> {
        let rows: Vec<(String, String, String, String, Option<String>)> = sqlx::query_as(
            "SELECT cycle_id, symbol, decision_json, signals_json, execution_status
             FROM decision_audit
             WHERE symbol = ?
             ORDER BY id DESC
             LIMIT ?",
        )
        .bind(symbol)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(cycle_id, symbol, decision_json, signals_json, status_json)| {
                let execution_status = match status_json {
                    Some(s) => Some(serde_json::from_str(&s)?),
                    None => None,
                };
                Ok(StoredDecision {
                    cycle_id,
                    symbol,
                    decision: serde_json::from_str(&decision_json)?,
                    signals: serde_json::from_str(&signals_json)?,
                    execution_status,
                })
            })
            .collect()
    }

    async fn write(&self, record: &AuditRecord) -> Result<()> {
        let decision = &record.decision;
        let aggregated = &decision.aggregated;
        let cycle_id = record.cycle_id.to_string();
        let decision_json = serde_json::to_string(decision)?;
        let signals_json = serde_json::to_string(&record.signals)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO decision_audit (
                cycle_id, bot_id, symbol, started_at, finished_at,
                action, winning_action, confidence,
                buy_score, sell_score, hold_score,
                signals_used, signals_considered, total_contribution,
                risk_score, volatility_points, concentration_points,
                drawdown_points, position_size_points, position_scale_factor,
                risk_override_applied, reason, decision_json, signals_json
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&cycle_id)
        .bind(&record.bot_id)
        .bind(&record.symbol)
        .bind(record.started_at.to_rfc3339())
        .bind(record.finished_at.to_rfc3339())
        .bind(decision.action.as_str())
        .bind(decision.winning_action.as_str())
        .bind(decision.confidence)
        .bind(aggregated.action_scores.buy)
        .bind(aggregated.action_scores.sell)
        .bind(aggregated.action_scores.hold)
        .bind(aggregated.signals_used as i64)
        .bind(aggregated.signals_considered as i64)
        .bind(aggregated.total_contribution)
        .bind(decision.risk_score)
        .bind(decision.risk.volatility)
        .bind(decision.risk.concentration)
        .bind(decision.risk.drawdown)
        .bind(decision.risk.position_size)
        .bind(decision.position_scale_factor)
        .bind(if decision.risk_override_applied { 1i64 } else { 0i64 })
        .bind(&decision.reason)
        .bind(decision_json)
        .bind(signals_json)
        .execute(&mut *tx)
        .await?;

        for c in &aggregated.contributions {
            sqlx::query(
                "INSERT INTO signal_audit (cycle_id, source, name, action, confidence, strength, weight, contribution)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&cycle_id)
            .bind(c.source.as_str())
            .bind(&c.name)
            .bind(c.action.as_str())
            .bind(c.confidence)
            .bind(c.strength)
            .bind(c.weight)
            .bind(c.contribution)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl AuditSink for SqliteAuditSink {
    async fn record(&self, record: &AuditRecord) -> EngineResult<()> {
        self.write(record)
            .await
            .map_err(|e| EngineError::Audit(format!("cycle {}: {:#}", record.cycle_id, e)))
    }
}
