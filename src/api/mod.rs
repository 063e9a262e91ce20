//! HTTP API for health checks, chain status, quotes and recovery listings

use crate::chain::{ChainFamily, ChainRegistry};
use crate::config::ApiConfig;
use crate::error::{FundingError, FundingResult};
use crate::fees::FeeStore;
use crate::intent::{BridgeAsset, DestinationAllocation, IntentBuilder, IntentPlan};
use crate::state::{PendingIntent, PgRecoveryStore, RecoveryStore};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ChainRegistry>,
    pub store: Arc<dyn RecoveryStore>,
    pub fee_store: Arc<dyn FeeStore>,
    /// Present when recovery entries are persisted
    pub database: Option<Arc<PgRecoveryStore>>,
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/chains", get(get_chains))
        .route("/intents/quote", post(quote_intent))
        .route("/intents/pending/:address", get(get_pending))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP API server until `shutdown` fires
pub async fn run_server(
    config: ApiConfig,
    state: AppState,
    shutdown: CancellationToken,
) -> FundingResult<()> {
    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| FundingError::Config(format!("cannot bind API address {}: {}", addr, e)))?;

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| FundingError::Internal(format!("API server: {}", e)))?;

    Ok(())
}

/// Health check endpoint - basic liveness
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check - verify all dependencies
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = match &state.database {
        Some(db) => db.health_check().await.is_ok(),
        None => true,
    };

    let chain_health = state.registry.health_check().await;
    let chains = chain_health.iter().all(|(_, healthy)| *healthy);
    let ready = database && chains;

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            ready,
            database,
            chains,
            details: chain_health
                .into_iter()
                .map(|(id, h)| ChainHealth {
                    chain_id: id,
                    healthy: h,
                })
                .collect(),
        }),
    )
}

/// Get registered chains
async fn get_chains(State(state): State<AppState>) -> impl IntoResponse {
    let chains = state
        .registry
        .connected_chains()
        .into_iter()
        .filter_map(|id| state.registry.chain(id).ok())
        .map(|c| ChainSummary {
            chain_id: c.chain_id,
            name: c.name,
            family: c.family,
            vault_address: c.vault_address,
        })
        .collect();

    Json(ChainsResponse { chains })
}

/// Build an intent against the configured fee schedule without signing it
async fn quote_intent(
    State(state): State<AppState>,
    Json(request): Json<QuoteRequest>,
) -> Result<Json<IntentPlan>, (StatusCode, Json<ErrorResponse>)> {
    if let Err(e) = state.registry.chain(request.destination.chain_id) {
        return Err(error_response(StatusCode::NOT_FOUND, e));
    }

    request
        .validate()
        .and_then(|_| {
            IntentBuilder::new(state.fee_store.as_ref())
                .create_intent(&request.assets, &request.destination)
        })
        .map(Json)
        .map_err(|e| match e {
            FundingError::InvalidAmount(_) => error_response(StatusCode::BAD_REQUEST, e),
            other => error_response(StatusCode::INTERNAL_SERVER_ERROR, other),
        })
}

/// Pending intents recorded for a requester
async fn get_pending(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<PendingResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.store.list_entries(&address).await {
        Ok(intents) => Ok(Json(PendingResponse { address, intents })),
        Err(e) => {
            warn!("Failed to list pending intents for {}: {}", address, e);
            Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e))
        }
    }
}

fn error_response(status: StatusCode, error: FundingError) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

// Request and response types

#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    pub assets: Vec<BridgeAsset>,
    pub destination: DestinationAllocation,
}

impl QuoteRequest {
    /// Balances and amounts must not be negative
    fn validate(&self) -> FundingResult<()> {
        let destination = &self.destination;
        non_negative("destination amount", destination.amount)?;
        non_negative("destination gas", destination.gas)?;
        for asset in &self.assets {
            non_negative("EOA balance", asset.eoa_balance)?;
            non_negative("ephemeral balance", asset.ephemeral_balance)?;
        }
        Ok(())
    }
}

fn non_negative(field: &str, value: Decimal) -> FundingResult<()> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(FundingError::InvalidAmount(format!(
            "{} is negative: {}",
            field, value
        )));
    }
    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct ReadinessResponse {
    ready: bool,
    database: bool,
    chains: bool,
    details: Vec<ChainHealth>,
}

#[derive(Serialize)]
struct ChainHealth {
    chain_id: u64,
    healthy: bool,
}

#[derive(Serialize)]
struct ChainSummary {
    chain_id: u64,
    name: String,
    family: ChainFamily,
    vault_address: String,
}

#[derive(Serialize)]
struct ChainsResponse {
    chains: Vec<ChainSummary>,
}

#[derive(Serialize)]
struct PendingResponse {
    address: String,
    intents: Vec<PendingIntent>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::tests::evm_chain;
    use crate::config::FeeScheduleConfig;
    use crate::fees::ScheduleFeeStore;
    use crate::state::MemoryRecoveryStore;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use std::str::FromStr;
    use tower::ServiceExt;

    const VAULT: &str = "0x2222222222222222222222222222222222222222";

    fn state(store: Arc<MemoryRecoveryStore>) -> AppState {
        AppState {
            registry: Arc::new(ChainRegistry::from_configs(vec![
                evm_chain(1, VAULT),
                evm_chain(10, VAULT),
            ])),
            store,
            fee_store: Arc::new(ScheduleFeeStore::new(&FeeScheduleConfig {
                protocol_fee_bps: 100,
                default_solver_fee_bps: 0,
                fulfilment: vec![],
                solver_routes: vec![],
            })),
            database: None,
        }
    }

    fn decimal(value: &Value) -> Decimal {
        Decimal::from_str(value.as_str().unwrap()).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn quote(eoa: &str, ephemeral: &str) -> Request<Body> {
        let request = json!({
            "assets": [{
                "chain_id": 10,
                "contract_address": "0x3333333333333333333333333333333333333333",
                "decimals": 6,
                "eoa_balance": eoa,
                "ephemeral_balance": ephemeral,
                "holder_address": "0x4444444444444444444444444444444444444444",
                "chain_family": "evm"
            }],
            "destination": {
                "chain_id": 1,
                "token_contract": "0x3333333333333333333333333333333333333333",
                "amount": "100",
                "decimals": 6,
                "gas": "0"
            }
        });
        Request::post("/intents/quote")
            .header("content-type", "application/json")
            .body(Body::from(request.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = router(state(Arc::new(MemoryRecoveryStore::new())));
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_chains_are_listed_in_order() {
        let app = router(state(Arc::new(MemoryRecoveryStore::new())));
        let response = app
            .oneshot(Request::get("/chains").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let body = body_json(response).await;
        let ids: Vec<u64> = body["chains"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["chain_id"].as_u64().unwrap())
            .collect();
        assert_eq!(ids, vec![1, 10]);
        assert_eq!(body["chains"][0]["family"], "evm");
    }

    #[tokio::test]
    async fn test_pending_intents_listing() {
        let store = Arc::new(MemoryRecoveryStore::new());
        store.put("0xABC", 9).await.unwrap();
        store.put("0xabc", 3).await.unwrap();
        let app = router(state(store));

        let response = app
            .oneshot(
                Request::get("/intents/pending/0xAbC")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let ids: Vec<u64> = body["intents"]
            .as_array()
            .unwrap()
            .iter()
            .map(|i| i["intent_id"].as_u64().unwrap())
            .collect();
        assert_eq!(ids, vec![3, 9]);
    }

    #[tokio::test]
    async fn test_quote_runs_the_intent_builder() {
        let app = router(state(Arc::new(MemoryRecoveryStore::new())));
        let response = app.oneshot(quote("30", "80")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["intent"]["is_available_balance_insufficient"], false);
        assert_eq!(decimal(&body["intent"]["sources"][0]["amount"]), Decimal::from(101));
        assert_eq!(decimal(&body["eoa_to_ephemeral_calls"]["10"]["amount"]), Decimal::from(21));
    }

    #[tokio::test]
    async fn test_quote_with_overflowing_balance_is_bad_request() {
        let app = router(state(Arc::new(MemoryRecoveryStore::new())));
        let response = app
            .oneshot(quote(&Decimal::MAX.to_string(), "1"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("overflows"));
    }

    #[tokio::test]
    async fn test_quote_with_negative_balance_is_bad_request() {
        let app = router(state(Arc::new(MemoryRecoveryStore::new())));
        let response = app.oneshot(quote("-5", "80")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_quote_for_unknown_destination_is_not_found() {
        let app = router(state(Arc::new(MemoryRecoveryStore::new())));
        let request = json!({
            "assets": [],
            "destination": {
                "chain_id": 42,
                "token_contract": "0x0",
                "amount": "1",
                "decimals": 6,
                "gas": "0"
            }
        });

        let response = app
            .oneshot(
                Request::post("/intents/quote")
                    .header("content-type", "application/json")
                    .body(Body::from(request.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
