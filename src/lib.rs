pub mod config;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod metrics;
pub mod rate_limit;

use crate::config::{GateConfig, LogFormat};
use crate::error::{GateError, Result};
use crate::metrics::{metrics_handler, MetricsService};
use crate::rate_limit::{
    admission_middleware, AdmissionGate, RedisWindowStore, SlidingWindowEvaluator, WindowStore,
};
use axum::{middleware::from_fn_with_state, routing::get, Router as AxumRouter};
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Build the admission gate from configuration and a window store
pub fn build_gate(config: &GateConfig, store: Arc<dyn WindowStore>) -> Result<AdmissionGate> {
    let matcher = config.rule_matcher()?;
    let evaluator = SlidingWindowEvaluator::new(store, config.redis.cluster_hash_tag);
    Ok(AdmissionGate::new(
        matcher,
        evaluator,
        config.rate_limiting.on_store_error,
    ))
}

/// Build the HTTP application with every route behind the gate
pub fn build_app(gate: Arc<AdmissionGate>) -> AxumRouter {
    handlers::routes()
        .layer(from_fn_with_state(gate, admission_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Initialize the rate limiting server
pub async fn serve(config: GateConfig) -> Result<()> {
    // Validate configuration
    config.validate()?;

    info!(
        rules = config.rate_limiting.rules.len(),
        timeout_ms = config.redis.timeout_ms,
        "Starting rategate"
    );

    let store = RedisWindowStore::connect(&config.redis).await?;
    if let Err(e) = store.ping().await {
        warn!(
            error = %e,
            policy = ?config.rate_limiting.on_store_error,
            "Redis ping failed, store failure policy applies until it recovers"
        );
    }

    let gate = Arc::new(build_gate(&config, Arc::new(store))?);
    info!(
        rules = gate.matcher().rules().len(),
        policy = ?gate.on_store_error(),
        "Admission gate ready"
    );

    if let Some(port) = config.server.metrics_port {
        serve_metrics(&config.server.host, port).await?;
    }

    let app = build_app(gate);

    // Bind and serve
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| GateError::Internal(format!("Server error: {}", e)))?;

    info!("rategate stopped");
    Ok(())
}

/// Expose Prometheus metrics on a separate listener
async fn serve_metrics(host: &str, port: u16) -> Result<()> {
    let service = MetricsService::new()?;
    let app = AxumRouter::new()
        .route("/metrics", get(metrics_handler))
        .with_state(service);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Metrics listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Metrics server stopped");
        }
    });
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

/// Initialize tracing/logging
pub fn init_tracing(format: LogFormat) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rategate=debug,tower_http=debug".into()),
        )
        .with_target(false);

    match format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Compact => subscriber.compact().init(),
    }
}
