use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::entities::{checkout, order, transaction_event, transaction_item};
use crate::errors::{ServiceError, GENERIC_TRANSACTION_ERROR};
use crate::events::{Event, EventSender};
use crate::gateway::extensions::{
    ExtensionRegistry, TransactionAction, TransactionFlowStrategy, TransactionResultCode,
    TransactionSessionData, TransactionSessionResult,
};

/// Message returned when no registered extension can handle a requested
/// action for the source's channel.
pub const NO_APP_CONFIGURED: &str =
    "No app or plugin is configured to handle payment action requests.";

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct TransactionInitializeRequest {
    pub order_id: Option<Uuid>,
    pub checkout_id: Option<Uuid>,
    #[validate(length(min = 1, max = 255))]
    pub extension_id: String,
    /// Defaults to the source's outstanding total.
    pub amount: Option<Decimal>,
    #[serde(default = "default_flow_strategy")]
    pub flow_strategy: TransactionFlowStrategy,
    pub idempotency_key: Option<String>,
    pub data: Option<Value>,
}

fn default_flow_strategy() -> TransactionFlowStrategy {
    TransactionFlowStrategy::Charge
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TransactionProcessRequest {
    pub data: Option<Value>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TransactionActionRequest {
    pub amount: Option<Decimal>,
}

#[derive(Debug, Serialize)]
pub struct TransactionSessionOutcome {
    pub transaction: transaction_item::Model,
    pub event: transaction_event::Model,
}

/// Payment source a transaction is attached to.
enum Source {
    Order(order::Model),
    Checkout(checkout::Model),
}

impl Source {
    fn id(&self) -> Uuid {
        match self {
            Source::Order(o) => o.id,
            Source::Checkout(c) => c.id,
        }
    }

    fn currency(&self) -> &str {
        match self {
            Source::Order(o) => &o.currency,
            Source::Checkout(c) => &c.currency,
        }
    }

    fn channel_slug(&self) -> &str {
        match self {
            Source::Order(o) => &o.channel_slug,
            Source::Checkout(c) => &c.channel_slug,
        }
    }

    fn total(&self) -> Decimal {
        match self {
            Source::Order(o) => o.total_gross,
            Source::Checkout(c) => c.total_net,
        }
    }
}

/// Orchestrates transaction initialize/process sessions and app action
/// requests against transaction items.
#[derive(Clone)]
pub struct TransactionSessionService {
    db: Arc<DbPool>,
    registry: Arc<ExtensionRegistry>,
    config: Arc<AppConfig>,
    event_sender: Option<Arc<EventSender>>,
}

impl TransactionSessionService {
    pub fn new(
        db: Arc<DbPool>,
        registry: Arc<ExtensionRegistry>,
        config: Arc<AppConfig>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db,
            registry,
            config,
            event_sender,
        }
    }

    /// Starts a payment session for an order or checkout.
    ///
    /// Requests repeating an idempotency key replay the stored outcome
    /// when amount and flow match and conflict when they do not; a novel
    /// key creates exactly one transaction with one request/response event
    /// pair.
    #[instrument(skip(self, req), fields(extension = %req.extension_id))]
    pub async fn initialize(
        &self,
        req: TransactionInitializeRequest,
    ) -> Result<TransactionSessionOutcome, ServiceError> {
        req.validate()?;
        let source = self.resolve_source(req.order_id, req.checkout_id).await?;

        let amount = req.amount.unwrap_or_else(|| source.total());
        if amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Transaction amount must be positive".to_string(),
            ));
        }

        let idempotency_key = match req.idempotency_key {
            Some(key) if key.is_empty() => {
                return Err(ServiceError::ValidationError(
                    "The idempotency key cannot be empty.".to_string(),
                ));
            }
            Some(key) => key,
            None => Uuid::new_v4().to_string(),
        };

        let extension = self.registry.require(&req.extension_id)?;

        // Cap check, replay lookup and the pending insert share one
        // transaction; the unique (source, key) index catches the race two
        // concurrent novel keys would otherwise win together. The pending
        // record is committed before the extension call so a crash
        // mid-session leaves an auditable trail.
        let txn = self.db.begin().await?;

        let existing_count = transaction_item::Entity::find()
            .filter(source_filter(&source))
            .count(&txn)
            .await?;
        if existing_count >= self.config.transaction_items_limit {
            return Err(ServiceError::ValidationError(format!(
                "Transaction limit of {} reached for this source.",
                self.config.transaction_items_limit
            )));
        }

        if let Some(outcome) = self
            .find_replay(&txn, &source, &idempotency_key, amount, req.flow_strategy)
            .await?
        {
            txn.commit().await?;
            info!(transaction_id = %outcome.transaction.id, "idempotent replay");
            return Ok(outcome);
        }

        let (item, _request_event) = self
            .create_pending(
                &txn,
                &source,
                &req.extension_id,
                amount,
                req.flow_strategy,
                &idempotency_key,
            )
            .await?;
        txn.commit().await?;

        let session = TransactionSessionData {
            transaction_id: item.id,
            source_id: source.id(),
            amount,
            currency: source.currency().to_string(),
            flow_strategy: req.flow_strategy,
            idempotency_key: idempotency_key.clone(),
            data: req.data,
        };

        let result = match extension.transaction_initialize_session(session).await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, transaction_id = %item.id, "initialize session failed");
                failure_result(req.flow_strategy, amount)
            }
        };

        let outcome = self.record_result(&source, item, result).await?;
        self.emit(Event::TransactionItemCreated {
            transaction_id: outcome.transaction.id,
        })
        .await;
        Ok(outcome)
    }

    /// Continues a previously initialized session, e.g. after a 3-D Secure
    /// challenge.
    #[instrument(skip(self, req))]
    pub async fn process(
        &self,
        transaction_id: Uuid,
        req: TransactionProcessRequest,
    ) -> Result<TransactionSessionOutcome, ServiceError> {
        let item = self.require_item(transaction_id).await?;
        let source = self.resolve_source(item.order_id, item.checkout_id).await?;

        if item.charged_value > Decimal::ZERO || item.authorized_value > Decimal::ZERO {
            return Err(ServiceError::Conflict(
                "Transaction has already been processed.".to_string(),
            ));
        }

        let request_event = transaction_event::Entity::find()
            .filter(transaction_event::Column::TransactionId.eq(item.id))
            .filter(transaction_event::Column::IncludeInCalculations.eq(false))
            .order_by_asc(transaction_event::Column::CreatedAt)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| {
                ServiceError::Conflict("Transaction was never initialized.".to_string())
            })?;

        let flow_strategy = if request_event.event_type.starts_with("authorization") {
            TransactionFlowStrategy::Authorization
        } else {
            TransactionFlowStrategy::Charge
        };
        let amount = request_event.amount_value;

        let extension = self.registry.require(&item.app_identifier)?;
        let session = TransactionSessionData {
            transaction_id: item.id,
            source_id: source.id(),
            amount,
            currency: source.currency().to_string(),
            flow_strategy,
            idempotency_key: item.idempotency_key.clone(),
            data: req.data,
        };

        let result = match extension.transaction_process_session(session).await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, transaction_id = %item.id, "process session failed");
                failure_result(flow_strategy, amount)
            }
        };

        self.record_result(&source, item, result).await
    }

    pub async fn request_charge(
        &self,
        transaction_id: Uuid,
        req: TransactionActionRequest,
    ) -> Result<transaction_event::Model, ServiceError> {
        self.request_action(transaction_id, TransactionAction::Charge, req.amount)
            .await
    }

    pub async fn request_refund(
        &self,
        transaction_id: Uuid,
        req: TransactionActionRequest,
    ) -> Result<transaction_event::Model, ServiceError> {
        self.request_action(transaction_id, TransactionAction::Refund, req.amount)
            .await
    }

    pub async fn request_cancel(
        &self,
        transaction_id: Uuid,
        req: TransactionActionRequest,
    ) -> Result<transaction_event::Model, ServiceError> {
        self.request_action(transaction_id, TransactionAction::Cancel, req.amount)
            .await
    }

    pub async fn get_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<(transaction_item::Model, Vec<transaction_event::Model>), ServiceError> {
        let item = self.require_item(transaction_id).await?;
        let events = transaction_event::Entity::find()
            .filter(transaction_event::Column::TransactionId.eq(item.id))
            .order_by_asc(transaction_event::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        Ok((item, events))
    }

    /// Asks the responsible extension to act on a stored transaction. The
    /// capability check runs before anything is recorded or dispatched.
    #[instrument(skip(self))]
    async fn request_action(
        &self,
        transaction_id: Uuid,
        action: TransactionAction,
        amount: Option<Decimal>,
    ) -> Result<transaction_event::Model, ServiceError> {
        let item = self.require_item(transaction_id).await?;
        let source = self.resolve_source(item.order_id, item.checkout_id).await?;

        if !self
            .registry
            .is_action_supported(action, source.channel_slug())
        {
            return Err(ServiceError::PaymentFailed(NO_APP_CONFIGURED.to_string()));
        }

        let amount = amount.unwrap_or(match action {
            TransactionAction::Charge | TransactionAction::Cancel => item.authorized_value,
            TransactionAction::Refund => item.charged_value,
        });
        if amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Requested action amount must be positive".to_string(),
            ));
        }

        let extension = self
            .registry
            .extension_for_action(action, source.channel_slug())
            .ok_or_else(|| ServiceError::PaymentFailed(NO_APP_CONFIGURED.to_string()))?;

        let event_type = match action {
            TransactionAction::Charge => "charge_request",
            TransactionAction::Refund => "refund_request",
            TransactionAction::Cancel => "cancel_request",
        };
        let event = self
            .insert_event(
                self.db.as_ref(),
                &item,
                event_type,
                amount,
                None,
                None,
                false,
            )
            .await?;

        extension
            .request_transaction_action(action, item.id, amount)
            .await
            .map_err(|e| {
                error!(error = %e, transaction_id = %item.id, action = %action,
                    "transaction action dispatch failed");
                ServiceError::GatewayError(e.to_string())
            })?;

        Ok(event)
    }

    async fn resolve_source(
        &self,
        order_id: Option<Uuid>,
        checkout_id: Option<Uuid>,
    ) -> Result<Source, ServiceError> {
        match (order_id, checkout_id) {
            (Some(order_id), None) => {
                let order = order::Entity::find_by_id(order_id)
                    .one(self.db.as_ref())
                    .await?
                    .ok_or_else(|| ServiceError::NotFound("Order".to_string()))?;
                Ok(Source::Order(order))
            }
            (None, Some(checkout_id)) => {
                let checkout = checkout::Entity::find_by_id(checkout_id)
                    .one(self.db.as_ref())
                    .await?
                    .ok_or_else(|| ServiceError::NotFound("Checkout".to_string()))?;
                Ok(Source::Checkout(checkout))
            }
            _ => Err(ServiceError::ValidationError(
                "Exactly one of order_id and checkout_id is required".to_string(),
            )),
        }
    }

    async fn require_item(
        &self,
        transaction_id: Uuid,
    ) -> Result<transaction_item::Model, ServiceError> {
        transaction_item::Entity::find_by_id(transaction_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound("Transaction".to_string()))
    }

    /// Replays the stored outcome when the key was already used with the
    /// same amount and flow. A reused key with different data is a
    /// conflict.
    async fn find_replay<C: ConnectionTrait>(
        &self,
        conn: &C,
        source: &Source,
        idempotency_key: &str,
        amount: Decimal,
        flow_strategy: TransactionFlowStrategy,
    ) -> Result<Option<TransactionSessionOutcome>, ServiceError> {
        let existing = transaction_item::Entity::find()
            .filter(source_filter(source))
            .filter(transaction_item::Column::IdempotencyKey.eq(idempotency_key))
            .one(conn)
            .await?;
        let Some(item) = existing else {
            return Ok(None);
        };

        let request_event = transaction_event::Entity::find()
            .filter(transaction_event::Column::TransactionId.eq(item.id))
            .filter(transaction_event::Column::IdempotencyKey.eq(idempotency_key))
            .order_by_asc(transaction_event::Column::CreatedAt)
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::InternalError("transaction without a request event".to_string())
            })?;
        if request_event.amount_value != amount {
            return Err(ServiceError::Conflict(
                "Transaction with this idempotency key exists with a different amount."
                    .to_string(),
            ));
        }
        if request_event.event_type != flow_strategy.request_event_type() {
            return Err(ServiceError::Conflict(
                "Transaction with this idempotency key exists with a different flow."
                    .to_string(),
            ));
        }

        let latest_event = transaction_event::Entity::find()
            .filter(transaction_event::Column::TransactionId.eq(item.id))
            .order_by_desc(transaction_event::Column::CreatedAt)
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::InternalError("transaction without events".to_string())
            })?;

        Ok(Some(TransactionSessionOutcome {
            transaction: item,
            event: latest_event,
        }))
    }

    async fn create_pending(
        &self,
        txn: &DatabaseTransaction,
        source: &Source,
        extension_id: &str,
        amount: Decimal,
        flow_strategy: TransactionFlowStrategy,
        idempotency_key: &str,
    ) -> Result<(transaction_item::Model, transaction_event::Model), ServiceError> {
        let now = Utc::now();
        let (order_id, checkout_id) = match source {
            Source::Order(o) => (Some(o.id), None),
            Source::Checkout(c) => (None, Some(c.id)),
        };

        let inserted = transaction_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            checkout_id: Set(checkout_id),
            name: Set(None),
            app_identifier: Set(extension_id.to_string()),
            psp_reference: Set(None),
            idempotency_key: Set(idempotency_key.to_string()),
            currency: Set(source.currency().to_string()),
            authorized_value: Set(Decimal::ZERO),
            charged_value: Set(Decimal::ZERO),
            refunded_value: Set(Decimal::ZERO),
            canceled_value: Set(Decimal::ZERO),
            authorize_pending_value: Set(Decimal::ZERO),
            charge_pending_value: Set(Decimal::ZERO),
            refund_pending_value: Set(Decimal::ZERO),
            cancel_pending_value: Set(Decimal::ZERO),
            created_at: Set(now),
            modified_at: Set(None),
        }
        .insert(txn)
        .await;

        let item = match inserted {
            Ok(item) => item,
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                return Err(ServiceError::Conflict(
                    "Transaction with this idempotency key already exists.".to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        let event = self
            .insert_event(
                txn,
                &item,
                flow_strategy.request_event_type(),
                amount,
                None,
                Some(idempotency_key.to_string()),
                false,
            )
            .await?;

        Ok((item, event))
    }

    /// Records the extension's answer and moves the transaction's amount
    /// columns accordingly.
    async fn record_result(
        &self,
        source: &Source,
        item: transaction_item::Model,
        result: TransactionSessionResult,
    ) -> Result<TransactionSessionOutcome, ServiceError> {
        let txn = self.db.begin().await?;

        let message = match &result.message {
            Some(m) => Some(m.clone()),
            None if !result.result.is_success() && !result.result.is_pending() => {
                Some(GENERIC_TRANSACTION_ERROR.to_string())
            }
            None => None,
        };
        let event = transaction_event::ActiveModel {
            id: Set(Uuid::new_v4()),
            transaction_id: Set(item.id),
            event_type: Set(result.result.event_type().to_string()),
            amount_value: Set(result.amount),
            currency: Set(item.currency.clone()),
            psp_reference: Set(result.psp_reference.clone()),
            message: Set(message),
            idempotency_key: Set(None),
            include_in_calculations: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await?;

        let mut authorized = item.authorized_value;
        let mut charged = item.charged_value;
        let mut authorize_pending = item.authorize_pending_value;
        let mut charge_pending = item.charge_pending_value;
        match result.result {
            code if code.is_success() => {
                if code.is_charge_flow() {
                    charged += result.amount;
                } else {
                    authorized += result.amount;
                }
            }
            code if code.is_pending() => {
                if code.is_charge_flow() {
                    charge_pending += result.amount;
                } else {
                    authorize_pending += result.amount;
                }
            }
            _ => {
                warn!(transaction_id = %item.id, result = %result.result,
                    "session ended without moving funds");
            }
        }

        let item_id = item.id;
        let mut active: transaction_item::ActiveModel = item.into();
        active.authorized_value = Set(authorized);
        active.charged_value = Set(charged);
        active.authorize_pending_value = Set(authorize_pending);
        active.charge_pending_value = Set(charge_pending);
        if result.psp_reference.is_some() {
            active.psp_reference = Set(result.psp_reference.clone());
        }
        active.modified_at = Set(Some(Utc::now()));
        let item = active.update(&txn).await?;

        if let Source::Checkout(checkout_model) = source {
            self.refresh_checkout_statuses(&txn, checkout_model.id).await?;
        }

        txn.commit().await?;
        info!(transaction_id = %item_id, result = %result.result, "session result recorded");
        Ok(TransactionSessionOutcome {
            transaction: item,
            event,
        })
    }

    /// Derives "none" / "partial" / "full" charge and authorize statuses
    /// from the checkout's transactions.
    async fn refresh_checkout_statuses<C: ConnectionTrait>(
        &self,
        conn: &C,
        checkout_id: Uuid,
    ) -> Result<(), ServiceError> {
        let checkout_model = checkout::Entity::find_by_id(checkout_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Checkout".to_string()))?;
        let items = transaction_item::Entity::find()
            .filter(transaction_item::Column::CheckoutId.eq(checkout_id))
            .all(conn)
            .await?;

        let charged: Decimal = items.iter().map(|i| i.charged_value).sum();
        let authorized: Decimal =
            items.iter().map(|i| i.authorized_value + i.charged_value).sum();
        let total = checkout_model.total_net;

        let mut active: checkout::ActiveModel = checkout_model.into();
        active.charge_status = Set(coverage_status(charged, total).to_string());
        active.authorize_status = Set(coverage_status(authorized, total).to_string());
        active.updated_at = Set(Some(Utc::now()));
        active.update(conn).await?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_event<C: ConnectionTrait>(
        &self,
        conn: &C,
        item: &transaction_item::Model,
        event_type: &str,
        amount: Decimal,
        psp_reference: Option<String>,
        idempotency_key: Option<String>,
        include_in_calculations: bool,
    ) -> Result<transaction_event::Model, ServiceError> {
        let event = transaction_event::ActiveModel {
            id: Set(Uuid::new_v4()),
            transaction_id: Set(item.id),
            event_type: Set(event_type.to_string()),
            amount_value: Set(amount),
            currency: Set(item.currency.clone()),
            psp_reference: Set(psp_reference),
            message: Set(None),
            idempotency_key: Set(idempotency_key),
            include_in_calculations: Set(include_in_calculations),
            created_at: Set(Utc::now()),
        }
        .insert(conn)
        .await?;
        Ok(event)
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                error!(error = %e, "failed to emit transaction event");
            }
        }
    }
}

fn source_filter(source: &Source) -> sea_orm::Condition {
    match source {
        Source::Order(o) => {
            sea_orm::Condition::all().add(transaction_item::Column::OrderId.eq(o.id))
        }
        Source::Checkout(c) => {
            sea_orm::Condition::all().add(transaction_item::Column::CheckoutId.eq(c.id))
        }
    }
}

fn failure_result(
    flow_strategy: TransactionFlowStrategy,
    amount: Decimal,
) -> TransactionSessionResult {
    let result = match flow_strategy {
        TransactionFlowStrategy::Charge => TransactionResultCode::ChargeFailure,
        TransactionFlowStrategy::Authorization => TransactionResultCode::AuthorizationFailure,
    };
    TransactionSessionResult {
        result,
        amount,
        psp_reference: None,
        message: Some(GENERIC_TRANSACTION_ERROR.to_string()),
        data: None,
    }
}

fn coverage_status(covered: Decimal, total: Decimal) -> &'static str {
    if covered <= Decimal::ZERO {
        "none"
    } else if covered < total {
        "partial"
    } else {
        "full"
    }
}
