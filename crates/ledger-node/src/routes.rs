//! HTTP surface: append, audit query, and the peer exchange endpoints.

use crate::constants::MAX_BLOCKS_PER_REQUEST;
use crate::error::ApiError;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use ledger_core::chain::Violation;
use ledger_core::{Block, Chain, ChainSummary, Transaction, TransactionKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub chain: Arc<Chain>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/chain/head", get(head))
        .route("/chain/blocks", get(blocks))
        .route("/chain/validate", get(validate))
        .route("/transactions", post(append))
        .route("/orders/{order_id}/history", get(history))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

async fn head(State(state): State<AppState>) -> Result<Json<ChainSummary>, ApiError> {
    Ok(Json(state.chain.summary()?))
}

#[derive(Debug, Default, Deserialize)]
struct BlocksQuery {
    from: Option<u64>,
    limit: Option<usize>,
}

/// Without paging parameters the whole chain is returned, which is what peers fetch.
async fn blocks(
    State(state): State<AppState>,
    Query(q): Query<BlocksQuery>,
) -> Json<Vec<Block>> {
    let blocks = match (q.from, q.limit) {
        (None, None) => state.chain.snapshot(),
        (from, limit) => state.chain.blocks_range(
            from.unwrap_or(0),
            limit.unwrap_or(MAX_BLOCKS_PER_REQUEST).min(MAX_BLOCKS_PER_REQUEST),
        ),
    };
    Json(blocks)
}

#[derive(Serialize, Deserialize)]
pub struct ValidateResp {
    pub valid: bool,
    pub checked: usize,
    pub violations: Vec<Violation>,
}

async fn validate(State(state): State<AppState>) -> Json<ValidateResp> {
    let report = state.chain.validate();
    Json(ValidateResp {
        valid: report.is_valid(),
        checked: report.checked,
        violations: report.violations,
    })
}

#[derive(Debug, Deserialize)]
pub struct TxIn {
    pub order_id: String,
    pub kind: String,
    pub actor: String,
    #[serde(default)]
    pub counterparty: Option<String>,
    #[serde(default)]
    pub payload: String,
    #[serde(default)]
    pub off_chain_digest: Option<String>,
}

impl TryFrom<TxIn> for Transaction {
    type Error = ledger_core::LedgerError;

    fn try_from(tx: TxIn) -> Result<Self, Self::Error> {
        let kind: TransactionKind = tx.kind.parse()?;
        Transaction::new(
            tx.order_id,
            kind,
            tx.actor,
            tx.counterparty,
            tx.payload,
            tx.off_chain_digest,
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct AppendReq {
    pub transactions: Vec<TxIn>,
}

/// POST /transactions: the whole batch is rejected if any entry is malformed.
async fn append(
    State(state): State<AppState>,
    Json(req): Json<AppendReq>,
) -> Result<Json<Block>, ApiError> {
    let transactions = req
        .transactions
        .into_iter()
        .map(Transaction::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    // Mining may be CPU-bound, so keep it off the async workers.
    let chain = Arc::clone(&state.chain);
    let block = tokio::task::spawn_blocking(move || chain.append(transactions))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(Json(block))
}

#[derive(Serialize, Deserialize)]
pub struct HistoryResp {
    pub order_id: String,
    pub transactions: Vec<Transaction>,
}

async fn history(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Json<HistoryResp> {
    let transactions = state.chain.transactions_for_order(&order_id);
    Json(HistoryResp {
        order_id,
        transactions,
    })
}
