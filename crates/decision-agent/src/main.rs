use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use decision_core::{AuditSink, ExecutionGateway, ExecutionStatus, SignalSource};
use decision_engine::{CancellationFlag, CycleOutcome, CycleRequest, DecisionEngine};
use tokio::signal::unix::SignalKind;
use tokio::sync::Notify;
use tokio::time;

mod audit;
mod config;
mod gateway;
mod metrics;
mod producers;

use audit::SqliteAuditSink;
use config::AgentConfig;
use gateway::PaperGateway;
use metrics::AgentMetrics;
use producers::{build_producers, check_health, HttpRiskInputs};

/// Shared handles for one tick's worth of per-symbol cycles.
struct Runtime {
    config: AgentConfig,
    engine: DecisionEngine,
    risk_inputs: HttpRiskInputs,
    audit: SqliteAuditSink,
    gateway: PaperGateway,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load .env, init tracing
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    tracing::info!("Starting decision agent");

    // 2. Configuration
    let config = AgentConfig::from_env().context("loading agent configuration")?;
    let weights = config.source_weights();
    let policy = config.risk_policy()?;
    tracing::info!("Configuration loaded and validated");
    tracing::info!("  Bot: {} ({} symbols)", config.bot_id, config.watchlist.len());
    tracing::info!("  Cycle interval: {}s", config.cycle_interval_seconds);
    tracing::info!("  Producer timeout: {}ms", config.producer_timeout_ms);
    tracing::info!(
        "  Weights: {}",
        weights
            .iter()
            .map(|(source, w)| format!("{}={:.2}", source, w))
            .collect::<Vec<_>>()
            .join(" ")
    );
    tracing::info!(
        "  Risk policy: {} (threshold {:.0}, factor {:.2}, min scale {:.2}, override {} -> {:?})",
        config.risk_policy,
        policy.risk_score_threshold,
        policy.risk_adjustment_factor,
        policy.min_position_scale,
        policy.risk_based_override,
        policy.override_action
    );

    if config.trading_enabled && !config.paper_trading {
        anyhow::bail!("PAPER_TRADING=false is not supported; only the paper gateway is available");
    }
    if config.trading_enabled {
        tracing::info!("Paper execution enabled (base notional ${})", config.base_order_notional);
    } else {
        tracing::info!("Execution disabled; decisions are audited only");
    }

    // 3. Producers and engine
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(config.producer_timeout_ms))
        .build()
        .context("building HTTP client")?;
    let producers = build_producers(&config, &client);
    let producer_timeout = Duration::from_millis(config.producer_timeout_ms);
    let engine = DecisionEngine::new(producers, producer_timeout);
    tracing::info!("Decision engine initialized ({} producers)", engine.producer_count());

    let risk_inputs = HttpRiskInputs::new(
        client.clone(),
        &config.risk_inputs_url,
        producer_timeout,
        config.total_budget,
    );

    // 4. Audit database
    sqlx::any::install_default_drivers();
    let db_pool = sqlx::AnyPool::connect(&config.database_url)
        .await
        .with_context(|| format!("connecting to {}", config.database_url))?;
    let audit = SqliteAuditSink::new(db_pool.clone());
    audit.init_tables().await?;
    tracing::info!("Audit sink initialized");

    // 5. Startup connectivity checks
    sqlx::query("SELECT 1")
        .execute(&db_pool)
        .await
        .map_err(|e| anyhow::anyhow!("Database connectivity check failed: {}", e))?;
    tracing::info!("Startup check: database OK");

    let upstreams = [
        (SignalSource::Ml, "ml-signals", &config.ml_signals_url),
        (SignalSource::Indicator, "indicator-engine", &config.indicator_signals_url),
        (SignalSource::Pattern, "pattern-detector", &config.pattern_signals_url),
        (SignalSource::Social, "social-sentiment", &config.social_sentiment_url),
        (SignalSource::News, "news-sentiment", &config.news_sentiment_url),
    ];
    for (source, name, url) in upstreams {
        if weights.is_enabled(source) {
            check_health(&client, name, url).await;
        }
    }
    check_health(&client, "risk-inputs", &config.risk_inputs_url).await;

    for symbol in &config.watchlist {
        match audit.recent_decisions(symbol, 1).await {
            Ok(previous) => {
                if let Some(last) = previous.first() {
                    tracing::info!(
                        "Last decision for {}: {} (cycle {}, execution {:?})",
                        last.symbol,
                        last.decision.action,
                        last.cycle_id,
                        last.execution_status
                    );
                }
            }
            Err(e) => tracing::warn!("Could not load previous decisions for {}: {:#}", symbol, e),
        }
    }

    let runtime = Arc::new(Runtime {
        config,
        engine,
        risk_inputs,
        audit,
        gateway: PaperGateway,
    });
    let mut agent_metrics = AgentMetrics::new(runtime.config.metrics_log_interval_cycles);

    // 6. Shutdown: flip the cancellation flag so in-flight cycles stop at
    // their next transition, then leave the loop.
    let cancel = CancellationFlag::new();
    let shutdown = Arc::new(Notify::new());
    {
        let cancel = cancel.clone();
        let shutdown = Arc::clone(&shutdown);
        let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received SIGINT");
                }
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM");
                }
            }
            cancel.cancel();
            shutdown.notify_one();
        });
    }

    tracing::info!(
        "Agent is now running. Deciding every {}s. Press Ctrl+C to stop.",
        runtime.config.cycle_interval_seconds
    );

    let mut interval = time::interval(Duration::from_secs(runtime.config.cycle_interval_seconds));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_tick(&runtime, &cancel, &mut agent_metrics).await;
                if cancel.is_cancelled() {
                    break;
                }
            }
            _ = shutdown.notified() => {
                break;
            }
        }
    }

    agent_metrics.log_metrics();
    db_pool.close().await;
    tracing::info!("Decision agent stopped");
    Ok(())
}

/// One scheduler tick: an independent cycle per watchlist symbol, all
/// running concurrently.
async fn run_tick(runtime: &Arc<Runtime>, cancel: &CancellationFlag, metrics: &mut AgentMetrics) {
    let weights = runtime.config.source_weights();
    let policy = match runtime.config.risk_policy() {
        Ok(policy) => policy,
        Err(e) => {
            tracing::error!("Invalid risk policy, skipping tick: {:#}", e);
            return;
        }
    };

    let handles: Vec<_> = runtime
        .config
        .watchlist
        .iter()
        .map(|symbol| {
            let runtime = Arc::clone(runtime);
            let cancel = cancel.clone();
            let weights = weights.clone();
            let policy = policy.clone();
            let symbol = symbol.clone();
            tokio::spawn(async move {
                let risk_inputs = runtime.risk_inputs.fetch(&symbol).await;
                let request = CycleRequest {
                    bot_id: runtime.config.bot_id.clone(),
                    symbol,
                    weights,
                    policy,
                    risk_inputs,
                };
                runtime.engine.run_cycle(&request, &cancel).await
            })
        })
        .collect();

    for handle in handles {
        let outcome = match handle.await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                tracing::error!("Cycle rejected: {}", e);
                metrics.record_failed();
                continue;
            }
            Err(e) => {
                tracing::error!("Cycle task failed: {}", e);
                metrics.record_failed();
                continue;
            }
        };

        let report = match outcome {
            CycleOutcome::Completed(report) => report,
            CycleOutcome::Cancelled { .. } => {
                metrics.record_cancelled();
                continue;
            }
        };
        metrics.record_report(&report);

        if let Err(e) = runtime.audit.record(&report.audit_record()).await {
            tracing::error!("Failed to audit decision for {}: {}", report.symbol, e);
            metrics.record_audit_failure();
            // No audit row, no order.
            continue;
        }

        if !runtime.config.trading_enabled {
            continue;
        }

        let notional = report.decision.order_notional(runtime.config.base_order_notional);
        let status = match runtime
            .gateway
            .submit(&report.symbol, &report.decision, notional)
            .await
        {
            Ok(status) => status,
            Err(e) => {
                tracing::error!("Execution failed for {}: {}", report.symbol, e);
                ExecutionStatus::Rejected {
                    reason: e.to_string(),
                }
            }
        };
        metrics.record_execution(&status);

        if let Err(e) = runtime.audit.update_execution_status(report.cycle_id, &status).await {
            tracing::warn!("Failed to store execution status for {}: {:#}", report.symbol, e);
        }
    }
}
