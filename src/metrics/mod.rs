//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Chain connection status
//! - Intent construction and submission
//! - Double-check outcomes
//! - Fulfillment waits

use crate::error::{FundingError, FundingResult};
use crate::state::RecoveryStore;

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec, CounterVec,
    Encoder, Gauge, GaugeVec, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

lazy_static! {
    // Chain metrics
    pub static ref CHAIN_CONNECTED: GaugeVec = register_gauge_vec!(
        "rff_chain_connected",
        "Chain connection status (1=connected, 0=disconnected)",
        &["chain_id"]
    ).unwrap();

    // Intent metrics
    pub static ref INTENTS_BUILT: CounterVec = register_counter_vec!(
        "rff_intents_built_total",
        "Total intents built per destination chain",
        &["destination_chain_id"]
    ).unwrap();

    pub static ref INTENTS_INSUFFICIENT: CounterVec = register_counter_vec!(
        "rff_intents_insufficient_total",
        "Total intents rejected for insufficient balance",
        &["destination_chain_id"]
    ).unwrap();

    pub static ref RFF_SUBMITTED: CounterVec = register_counter_vec!(
        "rff_requests_submitted_total",
        "Total requests for funds accepted by the coordination chain",
        &[]
    ).unwrap();

    // Double-check metrics
    pub static ref DOUBLE_CHECK_VERIFIED: CounterVec = register_counter_vec!(
        "rff_double_check_verified_total",
        "Total double-check transactions included",
        &["chain_id"]
    ).unwrap();

    pub static ref DOUBLE_CHECK_FAILED: CounterVec = register_counter_vec!(
        "rff_double_check_failed_total",
        "Total double-check transactions that failed",
        &["chain_id"]
    ).unwrap();

    // Fulfillment metrics
    pub static ref FILLS_OBSERVED: CounterVec = register_counter_vec!(
        "rff_fills_observed_total",
        "Total fills observed per destination chain",
        &["chain_id"]
    ).unwrap();

    pub static ref FILL_LATENCY: HistogramVec = register_histogram_vec!(
        "rff_fill_wait_seconds",
        "Time between starting a fill wait and observing the fill",
        &["chain_id"],
        vec![1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]
    ).unwrap();

    pub static ref PENDING_INTENTS: Gauge = register_gauge!(
        "rff_pending_intents",
        "Intents recorded for recovery and not yet filled"
    ).unwrap();

    // Health metrics
    pub static ref HEALTH_CHECK_SUCCESS: CounterVec = register_counter_vec!(
        "rff_health_check_success_total",
        "Total successful health checks",
        &[]
    ).unwrap();

    pub static ref HEALTH_CHECK_FAILURE: CounterVec = register_counter_vec!(
        "rff_health_check_failure_total",
        "Total failed health checks",
        &[]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> FundingResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| FundingError::Config(format!("cannot bind metrics port: {}", e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| FundingError::Internal(format!("metrics server: {}", e)))?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, StatusCode> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

// Helper functions to record metrics

pub fn record_chain_health(chain_id: u64, healthy: bool) {
    CHAIN_CONNECTED
        .with_label_values(&[&chain_id.to_string()])
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_intent_built(destination_chain_id: u64) {
    INTENTS_BUILT
        .with_label_values(&[&destination_chain_id.to_string()])
        .inc();
}

pub fn record_intent_insufficient(destination_chain_id: u64) {
    INTENTS_INSUFFICIENT
        .with_label_values(&[&destination_chain_id.to_string()])
        .inc();
}

/// Start the pending gauge from what the store already holds
pub async fn seed_pending_intents(store: &dyn RecoveryStore) -> FundingResult<u64> {
    let pending = store.pending_count().await?;
    PENDING_INTENTS.set(pending as f64);
    Ok(pending)
}

pub fn record_rff_submitted() {
    RFF_SUBMITTED.with_label_values(&[]).inc();
    PENDING_INTENTS.inc();
}

pub fn record_double_check(chain_id: u64, verified: bool) {
    let label = chain_id.to_string();
    if verified {
        DOUBLE_CHECK_VERIFIED.with_label_values(&[&label]).inc();
    } else {
        DOUBLE_CHECK_FAILED.with_label_values(&[&label]).inc();
    }
}

pub fn record_fill(chain_id: u64, waited: Duration) {
    let label = chain_id.to_string();
    FILLS_OBSERVED.with_label_values(&[&label]).inc();
    FILL_LATENCY
        .with_label_values(&[&label])
        .observe(waited.as_secs_f64());
    PENDING_INTENTS.dec();
}

pub fn record_health_check() {
    HEALTH_CHECK_SUCCESS.with_label_values(&[]).inc();
}

pub fn record_health_check_failure() {
    HEALTH_CHECK_FAILURE.with_label_values(&[]).inc();
}
