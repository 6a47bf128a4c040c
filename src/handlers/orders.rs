use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use uuid::Uuid;

use crate::services::orders::{
    AttachVoucherRequest, CreateOrderLineRequest, CreateOrderRequest, ManualDiscountRequest,
    OrderDetails,
};
use crate::{entities::order, ApiResponse, ApiResult, AppState, ListQuery, PaginatedResponse};

#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 200, description = "Draft order created"),
        (status = 400, description = "Invalid order payload")
    ),
    tag = "orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    Json(req): Json<CreateOrderRequest>,
) -> ApiResult<OrderDetails> {
    let details = state.order_service.create_draft_order(req).await?;
    Ok(Json(ApiResponse::success(details)))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders",
    responses((status = 200, description = "Paginated orders")),
    tag = "orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<PaginatedResponse<order::Model>> {
    let page = query.page.max(1);
    let limit = query.limit.clamp(1, 100);
    let (orders, total) = state.order_service.list_orders(page, limit).await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        orders, total, page, limit,
    ))))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with lines and discounts"),
        (status = 404, description = "Order not found")
    ),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderDetails> {
    let details = state.order_service.get_order(id).await?;
    Ok(Json(ApiResponse::success(details)))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/lines",
    request_body = CreateOrderLineRequest,
    responses((status = 200, description = "Line added and order repriced")),
    tag = "orders"
)]
pub async fn add_order_line(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateOrderLineRequest>,
) -> ApiResult<OrderDetails> {
    let details = state.order_service.add_order_line(id, req).await?;
    Ok(Json(ApiResponse::success(details)))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/voucher",
    request_body = AttachVoucherRequest,
    responses(
        (status = 200, description = "Voucher attached and order repriced"),
        (status = 409, description = "Order already has a voucher")
    ),
    tag = "orders"
)]
pub async fn attach_voucher(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AttachVoucherRequest>,
) -> ApiResult<OrderDetails> {
    let details = state.order_service.attach_voucher(id, req).await?;
    Ok(Json(ApiResponse::success(details)))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/discounts",
    request_body = ManualDiscountRequest,
    responses((status = 200, description = "Manual discount added")),
    tag = "orders"
)]
pub async fn add_manual_discount(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ManualDiscountRequest>,
) -> ApiResult<OrderDetails> {
    let details = state.order_service.add_manual_discount(id, req).await?;
    Ok(Json(ApiResponse::success(details)))
}

#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}/discounts/{discount_id}",
    request_body = ManualDiscountRequest,
    responses((status = 200, description = "Discount updated")),
    tag = "orders"
)]
pub async fn update_discount(
    State(state): State<AppState>,
    Path((id, discount_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<ManualDiscountRequest>,
) -> ApiResult<OrderDetails> {
    let details = state
        .order_service
        .update_discount(id, discount_id, req)
        .await?;
    Ok(Json(ApiResponse::success(details)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/orders/{id}/discounts/{discount_id}",
    responses((status = 200, description = "Discount removed")),
    tag = "orders"
)]
pub async fn remove_discount(
    State(state): State<AppState>,
    Path((id, discount_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<OrderDetails> {
    let details = state.order_service.remove_discount(id, discount_id).await?;
    Ok(Json(ApiResponse::success(details)))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/recalculate",
    responses((status = 200, description = "Discounts and totals recomputed")),
    tag = "orders"
)]
pub async fn recalculate_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderDetails> {
    let details = state.order_service.recalculate(id).await?;
    Ok(Json(ApiResponse::success(details)))
}
