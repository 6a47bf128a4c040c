pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod handlers;
pub mod openapi;
pub mod pricing;
pub mod services;

use axum::{
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use sea_orm::{ConnectionTrait, Statement};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use utoipa::ToSchema;

use errors::ServiceError;
use gateway::extensions::ExtensionRegistry;
use gateway::PaymentGateway;
use services::orders::OrderService;
use services::thumbnails::ThumbnailService;
use services::transactions::TransactionSessionService;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<db::DbPool>,
    pub config: Arc<config::AppConfig>,
    pub event_sender: Option<Arc<events::EventSender>>,
    pub registry: Arc<ExtensionRegistry>,
    pub order_service: OrderService,
    pub transaction_service: TransactionSessionService,
    pub thumbnail_service: ThumbnailService,
    pub payment_gateway: PaymentGateway,
}

impl AppState {
    pub fn new(
        db: Arc<db::DbPool>,
        config: Arc<config::AppConfig>,
        registry: Arc<ExtensionRegistry>,
        event_sender: Option<Arc<events::EventSender>>,
    ) -> Self {
        let order_service = OrderService::new(db.clone(), event_sender.clone());
        let transaction_service = TransactionSessionService::new(
            db.clone(),
            registry.clone(),
            config.clone(),
            event_sender.clone(),
        );
        let thumbnail_service = ThumbnailService::new(
            db.clone(),
            Arc::new(services::thumbnails::StorageRenderer),
            config.media_base_url.clone(),
            event_sender.clone(),
        );
        let payment_gateway =
            PaymentGateway::new(db.clone(), registry.clone(), event_sender.clone());
        Self {
            db,
            config,
            event_sender,
            registry,
            order_service,
            transaction_service,
            thumbnail_service,
            payment_gateway,
        }
    }
}

/// Common query parameters for list endpoints.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 {
    1
}
fn default_limit() -> u64 {
    20
}

#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, page: u64, limit: u64) -> Self {
        let total_pages = if limit == 0 { 0 } else { total.div_ceil(limit) };
        Self {
            items,
            total,
            page,
            limit,
            total_pages,
        }
    }
}

/// Standard API result type for JSON responses.
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ServiceError>;

pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", post(handlers::orders::create_order))
        .route("/orders", get(handlers::orders::list_orders))
        .route("/orders/:id", get(handlers::orders::get_order))
        .route("/orders/:id/lines", post(handlers::orders::add_order_line))
        .route("/orders/:id/voucher", post(handlers::orders::attach_voucher))
        .route(
            "/orders/:id/discounts",
            post(handlers::orders::add_manual_discount),
        )
        .route(
            "/orders/:id/discounts/:discount_id",
            axum::routing::put(handlers::orders::update_discount),
        )
        .route(
            "/orders/:id/discounts/:discount_id",
            delete(handlers::orders::remove_discount),
        )
        .route(
            "/orders/:id/recalculate",
            post(handlers::orders::recalculate_order),
        )
        .route("/payments", post(handlers::payments::create_payment))
        .route("/payments/:id", get(handlers::payments::get_payment))
        .route(
            "/payments/:id/transactions",
            get(handlers::payments::list_transactions),
        )
        .route("/payments/:id/process", post(handlers::payments::process))
        .route("/payments/:id/authorize", post(handlers::payments::authorize))
        .route("/payments/:id/capture", post(handlers::payments::capture))
        .route("/payments/:id/refund", post(handlers::payments::refund))
        .route("/payments/:id/void", post(handlers::payments::void))
        .route("/payments/:id/confirm", post(handlers::payments::confirm))
        .route(
            "/transactions/initialize",
            post(handlers::transactions::initialize),
        )
        .route(
            "/transactions/:id/process",
            post(handlers::transactions::process),
        )
        .route(
            "/transactions/:id",
            get(handlers::transactions::get_transaction),
        )
        .route(
            "/transactions/:id/request-charge",
            post(handlers::transactions::request_charge),
        )
        .route(
            "/transactions/:id/request-refund",
            post(handlers::transactions::request_refund),
        )
        .route(
            "/transactions/:id/request-cancel",
            post(handlers::transactions::request_cancel),
        )
        .route(
            "/thumbnail/:owner_type/:owner_id/:size",
            get(handlers::thumbnails::resolve_thumbnail),
        )
        .route(
            "/thumbnail/:owner_type/:owner_id/:size/:format",
            get(handlers::thumbnails::resolve_thumbnail_with_format),
        )
        .route("/health", get(health_check))
        .route("/status", get(status))
}

async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> ApiResult<serde_json::Value> {
    let db_status = match state
        .db
        .execute(Statement::from_string(
            state.db.get_database_backend(),
            "SELECT 1".to_string(),
        ))
        .await
    {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    Ok(Json(ApiResponse::success(json!({
        "status": db_status,
        "database": db_status,
        "timestamp": Utc::now().to_rfc3339(),
    }))))
}

async fn status() -> ApiResult<serde_json::Value> {
    Ok(Json(ApiResponse::success(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))))
}
