use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::entities::{transaction_event, transaction_item};
use crate::services::transactions::{
    TransactionActionRequest, TransactionInitializeRequest, TransactionProcessRequest,
    TransactionSessionOutcome,
};
use crate::{ApiResponse, ApiResult, AppState};

#[derive(Debug, Serialize)]
pub struct TransactionDetails {
    pub transaction: transaction_item::Model,
    pub events: Vec<transaction_event::Model>,
}

#[utoipa::path(
    post,
    path = "/api/v1/transactions/initialize",
    request_body = TransactionInitializeRequest,
    responses(
        (status = 200, description = "Session result recorded"),
        (status = 409, description = "Idempotency key reused with a different amount")
    ),
    tag = "transactions"
)]
pub async fn initialize(
    State(state): State<AppState>,
    Json(req): Json<TransactionInitializeRequest>,
) -> ApiResult<TransactionSessionOutcome> {
    let outcome = state.transaction_service.initialize(req).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

#[utoipa::path(
    post,
    path = "/api/v1/transactions/{id}/process",
    request_body = TransactionProcessRequest,
    responses(
        (status = 200, description = "Session continued"),
        (status = 409, description = "Transaction already finalized")
    ),
    tag = "transactions"
)]
pub async fn process(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<TransactionProcessRequest>,
) -> ApiResult<TransactionSessionOutcome> {
    let outcome = state.transaction_service.process(id, req).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

#[utoipa::path(
    get,
    path = "/api/v1/transactions/{id}",
    responses((status = 200, description = "Transaction with its event log")),
    tag = "transactions"
)]
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<TransactionDetails> {
    let (transaction, events) = state.transaction_service.get_transaction(id).await?;
    Ok(Json(ApiResponse::success(TransactionDetails {
        transaction,
        events,
    })))
}

#[utoipa::path(
    post,
    path = "/api/v1/transactions/{id}/request-charge",
    request_body = TransactionActionRequest,
    responses(
        (status = 200, description = "Charge requested from the responsible app"),
        (status = 402, description = "No app handles this action on the channel")
    ),
    tag = "transactions"
)]
pub async fn request_charge(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<TransactionActionRequest>,
) -> ApiResult<transaction_event::Model> {
    let event = state.transaction_service.request_charge(id, req).await?;
    Ok(Json(ApiResponse::success(event)))
}

#[utoipa::path(
    post,
    path = "/api/v1/transactions/{id}/request-refund",
    request_body = TransactionActionRequest,
    responses((status = 200, description = "Refund requested from the responsible app")),
    tag = "transactions"
)]
pub async fn request_refund(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<TransactionActionRequest>,
) -> ApiResult<transaction_event::Model> {
    let event = state.transaction_service.request_refund(id, req).await?;
    Ok(Json(ApiResponse::success(event)))
}

#[utoipa::path(
    post,
    path = "/api/v1/transactions/{id}/request-cancel",
    request_body = TransactionActionRequest,
    responses((status = 200, description = "Cancellation requested from the responsible app")),
    tag = "transactions"
)]
pub async fn request_cancel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<TransactionActionRequest>,
) -> ApiResult<transaction_event::Model> {
    let event = state.transaction_service.request_cancel(id, req).await?;
    Ok(Json(ApiResponse::success(event)))
}
