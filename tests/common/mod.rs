#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use storefront_api::config::AppConfig;
use storefront_api::db::{self, DbPool};
use storefront_api::entities::checkout;
use storefront_api::errors::ServiceError;
use storefront_api::gateway::extensions::{
    ExtensionRegistry, GatewayResponse, PaymentData, PaymentExtension, TransactionAction,
    TransactionKind, TransactionResultCode, TransactionSessionData, TransactionSessionResult,
};
use storefront_api::services::orders::{CreateOrderLineRequest, CreateOrderRequest, OrderService};

pub async fn setup_db() -> Arc<DbPool> {
    let pool = db::establish_connection("sqlite::memory:")
        .await
        .expect("in-memory database");
    db::setup_schema(&pool).await.expect("schema setup");
    Arc::new(pool)
}

pub fn test_config() -> Arc<AppConfig> {
    let config: AppConfig = serde_json::from_value(serde_json::json!({
        "database_url": "sqlite::memory:"
    }))
    .expect("test config");
    Arc::new(config)
}

pub fn test_config_with_limit(transaction_items_limit: u64) -> Arc<AppConfig> {
    let config: AppConfig = serde_json::from_value(serde_json::json!({
        "database_url": "sqlite::memory:",
        "transaction_items_limit": transaction_items_limit
    }))
    .expect("test config");
    Arc::new(config)
}

/// Creates a draft order with one hundred of subtotal and twenty of
/// shipping, the worked example used across the pricing tests.
pub async fn create_standard_order(
    service: &OrderService,
) -> storefront_api::services::orders::OrderDetails {
    service
        .create_draft_order(CreateOrderRequest {
            number: format!("ORD-{}", Uuid::new_v4().simple()),
            channel_slug: "default-channel".to_string(),
            currency: "USD".to_string(),
            shipping_price: Decimal::new(2000, 2),
            lines: vec![
                CreateOrderLineRequest {
                    product_name: "Sneaker".to_string(),
                    sku: Some("SNK-1".to_string()),
                    quantity: 3,
                    unit_price: Decimal::new(2000, 2),
                },
                CreateOrderLineRequest {
                    product_name: "Sock".to_string(),
                    sku: Some("SCK-1".to_string()),
                    quantity: 4,
                    unit_price: Decimal::new(1000, 2),
                },
            ],
        })
        .await
        .expect("order created")
}

pub async fn create_checkout(db: &DbPool, total: Decimal) -> checkout::Model {
    checkout::ActiveModel {
        id: Set(Uuid::new_v4()),
        channel_slug: Set("default-channel".to_string()),
        currency: Set("USD".to_string()),
        total_net: Set(total),
        charge_status: Set("none".to_string()),
        authorize_status: Set("none".to_string()),
        created_at: Set(Utc::now()),
        updated_at: Set(None),
    }
    .insert(db)
    .await
    .expect("checkout created")
}

pub const SCRIPTED_EXTENSION_ID: &str = "gateway.scripted";

/// Test extension that replays queued responses and counts calls. When a
/// queue is empty it answers with a success matching the requested
/// operation.
pub struct ScriptedExtension {
    identifier: String,
    supported_actions: Vec<TransactionAction>,
    pub gateway_responses: Mutex<VecDeque<GatewayResponse>>,
    pub session_results: Mutex<VecDeque<TransactionSessionResult>>,
    pub session_calls: AtomicUsize,
    pub gateway_calls: AtomicUsize,
    pub action_requests: Mutex<Vec<(TransactionAction, Uuid, Decimal)>>,
}

impl ScriptedExtension {
    pub fn new() -> Self {
        Self {
            identifier: SCRIPTED_EXTENSION_ID.to_string(),
            supported_actions: vec![
                TransactionAction::Charge,
                TransactionAction::Refund,
                TransactionAction::Cancel,
            ],
            gateway_responses: Mutex::new(VecDeque::new()),
            session_results: Mutex::new(VecDeque::new()),
            session_calls: AtomicUsize::new(0),
            gateway_calls: AtomicUsize::new(0),
            action_requests: Mutex::new(Vec::new()),
        }
    }

    pub fn without_actions() -> Self {
        let mut ext = Self::new();
        ext.supported_actions.clear();
        ext
    }

    pub fn queue_gateway_response(&self, response: GatewayResponse) {
        self.gateway_responses.lock().unwrap().push_back(response);
    }

    pub fn queue_session_result(&self, result: TransactionSessionResult) {
        self.session_results.lock().unwrap().push_back(result);
    }

    pub fn session_call_count(&self) -> usize {
        self.session_calls.load(Ordering::SeqCst)
    }

    fn next_gateway_response(
        &self,
        payment: &PaymentData,
        kind: TransactionKind,
    ) -> GatewayResponse {
        self.gateway_calls.fetch_add(1, Ordering::SeqCst);
        self.gateway_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| success_response(payment, kind))
    }

    fn next_session_result(&self, session: &TransactionSessionData) -> TransactionSessionResult {
        self.session_calls.fetch_add(1, Ordering::SeqCst);
        self.session_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| TransactionSessionResult {
                result: match session.flow_strategy {
                    storefront_api::gateway::extensions::TransactionFlowStrategy::Charge => {
                        TransactionResultCode::ChargeSuccess
                    }
                    storefront_api::gateway::extensions::TransactionFlowStrategy::Authorization => {
                        TransactionResultCode::AuthorizationSuccess
                    }
                },
                amount: session.amount,
                psp_reference: Some(format!("psp-{}", session.transaction_id.simple())),
                message: None,
                data: None,
            })
    }
}

impl Default for ScriptedExtension {
    fn default() -> Self {
        Self::new()
    }
}

pub fn success_response(payment: &PaymentData, kind: TransactionKind) -> GatewayResponse {
    GatewayResponse {
        kind,
        transaction_id: Uuid::new_v4().to_string(),
        amount: payment.amount,
        currency: payment.currency.clone(),
        is_success: true,
        action_required: false,
        error: None,
        raw_response: None,
        psp_reference: None,
    }
}

pub fn failed_response(payment: &PaymentData, kind: TransactionKind, error: &str) -> GatewayResponse {
    GatewayResponse {
        kind,
        transaction_id: Uuid::new_v4().to_string(),
        amount: payment.amount,
        currency: payment.currency.clone(),
        is_success: false,
        action_required: false,
        error: Some(error.to_string()),
        raw_response: None,
        psp_reference: None,
    }
}

#[async_trait]
impl PaymentExtension for ScriptedExtension {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn supports_action(&self, action: TransactionAction, _channel_slug: &str) -> bool {
        self.supported_actions.contains(&action)
    }

    async fn authorize(&self, payment: PaymentData) -> Result<GatewayResponse, ServiceError> {
        Ok(self.next_gateway_response(&payment, TransactionKind::Auth))
    }

    async fn capture(&self, payment: PaymentData) -> Result<GatewayResponse, ServiceError> {
        Ok(self.next_gateway_response(&payment, TransactionKind::Capture))
    }

    async fn refund(&self, payment: PaymentData) -> Result<GatewayResponse, ServiceError> {
        Ok(self.next_gateway_response(&payment, TransactionKind::Refund))
    }

    async fn void(&self, payment: PaymentData) -> Result<GatewayResponse, ServiceError> {
        Ok(self.next_gateway_response(&payment, TransactionKind::Void))
    }

    async fn confirm(&self, payment: PaymentData) -> Result<GatewayResponse, ServiceError> {
        Ok(self.next_gateway_response(&payment, TransactionKind::Confirm))
    }

    async fn process_payment(&self, payment: PaymentData) -> Result<GatewayResponse, ServiceError> {
        Ok(self.next_gateway_response(&payment, TransactionKind::Capture))
    }

    async fn transaction_initialize_session(
        &self,
        session: TransactionSessionData,
    ) -> Result<TransactionSessionResult, ServiceError> {
        Ok(self.next_session_result(&session))
    }

    async fn transaction_process_session(
        &self,
        session: TransactionSessionData,
    ) -> Result<TransactionSessionResult, ServiceError> {
        Ok(self.next_session_result(&session))
    }

    async fn request_transaction_action(
        &self,
        action: TransactionAction,
        transaction_id: Uuid,
        amount: Decimal,
    ) -> Result<(), ServiceError> {
        self.action_requests
            .lock()
            .unwrap()
            .push((action, transaction_id, amount));
        Ok(())
    }
}

pub fn registry_with(extension: Arc<ScriptedExtension>) -> Arc<ExtensionRegistry> {
    let mut registry = ExtensionRegistry::new();
    registry.register(extension);
    Arc::new(registry)
}
