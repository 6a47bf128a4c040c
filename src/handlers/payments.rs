use axum::{
    extract::{Path, State},
    response::Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::{payment, payment_transaction};
use crate::{ApiResponse, ApiResult, AppState};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreatePaymentRequest {
    pub order_id: Uuid,
    #[validate(length(min = 1, max = 255))]
    pub gateway: String,
    pub total: Decimal,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct TokenRequest {
    pub token: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct AmountRequest {
    /// Defaults to the full outstanding amount.
    pub amount: Option<Decimal>,
}

#[utoipa::path(
    post,
    path = "/api/v1/payments",
    request_body = CreatePaymentRequest,
    responses(
        (status = 200, description = "Payment created"),
        (status = 404, description = "Order not found")
    ),
    tag = "payments"
)]
pub async fn create_payment(
    State(state): State<AppState>,
    Json(req): Json<CreatePaymentRequest>,
) -> ApiResult<payment::Model> {
    req.validate()?;
    let created = state
        .payment_gateway
        .create_payment(req.order_id, req.gateway, req.total)
        .await?;
    Ok(Json(ApiResponse::success(created)))
}

#[utoipa::path(
    get,
    path = "/api/v1/payments/{id}",
    params(("id" = Uuid, Path, description = "Payment id")),
    responses((status = 200, description = "Payment details")),
    tag = "payments"
)]
pub async fn get_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<payment::Model> {
    let found = state.payment_gateway.get_payment(id).await?;
    Ok(Json(ApiResponse::success(found)))
}

#[utoipa::path(
    get,
    path = "/api/v1/payments/{id}/transactions",
    responses((status = 200, description = "Transactions recorded for the payment")),
    tag = "payments"
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<payment_transaction::Model>> {
    let txns = state.payment_gateway.list_transactions(id).await?;
    Ok(Json(ApiResponse::success(txns)))
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/{id}/process",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Payment processed"),
        (status = 402, description = "Gateway declined the payment")
    ),
    tag = "payments"
)]
pub async fn process(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<TokenRequest>,
) -> ApiResult<payment_transaction::Model> {
    let record = state.payment_gateway.process_payment(id, req.token).await?;
    Ok(Json(ApiResponse::success(record)))
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/{id}/authorize",
    request_body = TokenRequest,
    responses((status = 200, description = "Funds authorized")),
    tag = "payments"
)]
pub async fn authorize(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<TokenRequest>,
) -> ApiResult<payment_transaction::Model> {
    let record = state.payment_gateway.authorize(id, req.token).await?;
    Ok(Json(ApiResponse::success(record)))
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/{id}/capture",
    request_body = AmountRequest,
    responses(
        (status = 200, description = "Funds captured"),
        (status = 400, description = "Amount exceeds the un-captured balance")
    ),
    tag = "payments"
)]
pub async fn capture(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AmountRequest>,
) -> ApiResult<payment_transaction::Model> {
    let record = state.payment_gateway.capture(id, req.amount).await?;
    Ok(Json(ApiResponse::success(record)))
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/{id}/refund",
    request_body = AmountRequest,
    responses(
        (status = 200, description = "Funds refunded"),
        (status = 400, description = "Amount exceeds the captured balance")
    ),
    tag = "payments"
)]
pub async fn refund(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AmountRequest>,
) -> ApiResult<payment_transaction::Model> {
    let record = state.payment_gateway.refund(id, req.amount).await?;
    Ok(Json(ApiResponse::success(record)))
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/{id}/void",
    responses((status = 200, description = "Authorization voided")),
    tag = "payments"
)]
pub async fn void(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<payment_transaction::Model> {
    let record = state.payment_gateway.void(id).await?;
    Ok(Json(ApiResponse::success(record)))
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/{id}/confirm",
    request_body = TokenRequest,
    responses((status = 200, description = "Pending payment confirmed")),
    tag = "payments"
)]
pub async fn confirm(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<TokenRequest>,
) -> ApiResult<payment_transaction::Model> {
    let record = state.payment_gateway.confirm(id, req.token).await?;
    Ok(Json(ApiResponse::success(record)))
}
