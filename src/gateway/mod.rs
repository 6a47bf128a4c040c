pub mod extensions;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::{order, payment, payment_transaction};
use crate::errors::{ServiceError, GENERIC_TRANSACTION_ERROR};
use crate::events::{Event, EventSender};
use extensions::{
    validate_gateway_response, ExtensionRegistry, GatewayResponse, PaymentData, TransactionKind,
};

pub const CHARGE_STATUS_NOT_CHARGED: &str = "not_charged";
pub const CHARGE_STATUS_PARTIALLY_CHARGED: &str = "partially_charged";
pub const CHARGE_STATUS_FULLY_CHARGED: &str = "fully_charged";
pub const CHARGE_STATUS_PARTIALLY_REFUNDED: &str = "partially_refunded";
pub const CHARGE_STATUS_FULLY_REFUNDED: &str = "fully_refunded";

/// Gateway identifier for payments settled outside any extension.
pub const MANUAL_GATEWAY: &str = "manual";

/// Orchestrates legacy payment operations. Every mutation runs inside a
/// transaction holding an exclusive lock on the payment row, so concurrent
/// captures or refunds against the same payment serialize.
#[derive(Clone)]
pub struct PaymentGateway {
    db: Arc<DbPool>,
    registry: Arc<ExtensionRegistry>,
    event_sender: Option<Arc<EventSender>>,
}

impl PaymentGateway {
    pub fn new(
        db: Arc<DbPool>,
        registry: Arc<ExtensionRegistry>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db,
            registry,
            event_sender,
        }
    }

    #[instrument(skip(self))]
    pub async fn create_payment(
        &self,
        order_id: Uuid,
        gateway: String,
        total: Decimal,
    ) -> Result<payment::Model, ServiceError> {
        let order = order::Entity::find_by_id(order_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order".to_string()))?;

        if total <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Payment total must be positive".to_string(),
            ));
        }
        if gateway != MANUAL_GATEWAY && self.registry.get(&gateway).is_none() {
            return Err(ServiceError::ValidationError(format!(
                "Unknown payment gateway: {}",
                gateway
            )));
        }

        let model = payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            gateway: Set(gateway),
            channel_slug: Set(order.channel_slug.clone()),
            is_active: Set(true),
            to_confirm: Set(false),
            charge_status: Set(CHARGE_STATUS_NOT_CHARGED.to_string()),
            total: Set(total),
            captured_amount: Set(Decimal::ZERO),
            currency: Set(order.currency.clone()),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
            version: Set(1),
        };
        let created = model.insert(self.db.as_ref()).await?;
        info!(payment_id = %created.id, order_id = %order.id, "payment created");
        Ok(created)
    }

    pub async fn get_payment(&self, payment_id: Uuid) -> Result<payment::Model, ServiceError> {
        payment::Entity::find_by_id(payment_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound("Payment".to_string()))
    }

    pub async fn list_transactions(
        &self,
        payment_id: Uuid,
    ) -> Result<Vec<payment_transaction::Model>, ServiceError> {
        let txns = payment_transaction::Entity::find()
            .filter(payment_transaction::Column::PaymentId.eq(payment_id))
            .order_by_asc(payment_transaction::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        Ok(txns)
    }

    /// One-step authorize-and-capture.
    #[instrument(skip(self))]
    pub async fn process_payment(
        &self,
        payment_id: Uuid,
        token: Option<String>,
    ) -> Result<payment_transaction::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let payment = self.lock_payment(&txn, payment_id).await?;
        require_active(&payment)?;

        let extension = self.registry.require(&payment.gateway)?;
        let data = payment_data(&payment, payment.total, token);
        let response = self
            .fetch_gateway_response(extension.process_payment(data), &payment)
            .await?;

        let record = self.store_transaction(&txn, &payment, response).await?;
        self.postprocess(&txn, payment, &record).await?;
        txn.commit().await?;

        self.emit(Event::PaymentCaptured {
            payment_id: record.payment_id,
        })
        .await;
        raise_payment_error(record)
    }

    #[instrument(skip(self))]
    pub async fn authorize(
        &self,
        payment_id: Uuid,
        token: Option<String>,
    ) -> Result<payment_transaction::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let payment = self.lock_payment(&txn, payment_id).await?;
        require_active(&payment)?;
        clean_authorize(&payment)?;

        let extension = self.registry.require(&payment.gateway)?;
        let data = payment_data(&payment, payment.total, token);
        let response = self
            .fetch_gateway_response(extension.authorize(data), &payment)
            .await?;

        let record = self.store_transaction(&txn, &payment, response).await?;
        self.postprocess(&txn, payment, &record).await?;
        txn.commit().await?;

        self.emit(Event::PaymentAuthorized {
            payment_id: record.payment_id,
        })
        .await;
        raise_payment_error(record)
    }

    #[instrument(skip(self))]
    pub async fn capture(
        &self,
        payment_id: Uuid,
        amount: Option<Decimal>,
    ) -> Result<payment_transaction::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let payment = self.lock_payment(&txn, payment_id).await?;
        require_active(&payment)?;
        let amount = amount.unwrap_or_else(|| payment.uncaptured_amount());
        clean_capture(&payment, amount)?;

        let extension = self.registry.require(&payment.gateway)?;
        let token = self
            .past_transaction_token(&txn, &payment, TransactionKind::Auth)
            .await?;
        let data = payment_data(&payment, amount, Some(token));
        let response = self
            .fetch_gateway_response(extension.capture(data), &payment)
            .await?;

        let record = self.store_transaction(&txn, &payment, response).await?;
        self.postprocess(&txn, payment, &record).await?;
        txn.commit().await?;

        self.emit(Event::PaymentCaptured {
            payment_id: record.payment_id,
        })
        .await;
        raise_payment_error(record)
    }

    #[instrument(skip(self))]
    pub async fn refund(
        &self,
        payment_id: Uuid,
        amount: Option<Decimal>,
    ) -> Result<payment_transaction::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let payment = self.lock_payment(&txn, payment_id).await?;
        let amount = amount.unwrap_or(payment.captured_amount);
        clean_refund(&payment, amount)?;

        let record = if payment.is_manual() {
            // Manual payments never reach an extension; record the refund
            // directly.
            self.insert_transaction(
                &txn,
                &payment,
                GatewayResponse {
                    kind: TransactionKind::Refund,
                    transaction_id: Uuid::new_v4().to_string(),
                    amount,
                    currency: payment.currency.clone(),
                    is_success: true,
                    action_required: false,
                    error: None,
                    raw_response: None,
                    psp_reference: None,
                },
            )
            .await?
        } else {
            let extension = self.registry.require(&payment.gateway)?;
            let token = self
                .past_transaction_token(&txn, &payment, TransactionKind::Capture)
                .await?;
            let data = payment_data(&payment, amount, Some(token));
            let response = self
                .fetch_gateway_response(extension.refund(data), &payment)
                .await?;
            self.store_transaction(&txn, &payment, response).await?
        };

        self.postprocess(&txn, payment, &record).await?;
        txn.commit().await?;

        self.emit(Event::PaymentRefunded {
            payment_id: record.payment_id,
        })
        .await;
        raise_payment_error(record)
    }

    #[instrument(skip(self))]
    pub async fn void(&self, payment_id: Uuid) -> Result<payment_transaction::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let payment = self.lock_payment(&txn, payment_id).await?;

        let extension = self.registry.require(&payment.gateway)?;
        let token = self
            .past_transaction_token(&txn, &payment, TransactionKind::Auth)
            .await?;
        let data = payment_data(&payment, payment.total, Some(token));
        let response = self
            .fetch_gateway_response(extension.void(data), &payment)
            .await?;

        let record = self.store_transaction(&txn, &payment, response).await?;
        self.postprocess(&txn, payment, &record).await?;
        txn.commit().await?;

        self.emit(Event::PaymentVoided {
            payment_id: record.payment_id,
        })
        .await;
        raise_payment_error(record)
    }

    #[instrument(skip(self))]
    pub async fn confirm(
        &self,
        payment_id: Uuid,
        token: Option<String>,
    ) -> Result<payment_transaction::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let payment = self.lock_payment(&txn, payment_id).await?;
        require_active(&payment)?;

        let extension = self.registry.require(&payment.gateway)?;
        let token = match token {
            Some(t) => t,
            None => {
                self.past_transaction_token(&txn, &payment, TransactionKind::ActionToConfirm)
                    .await?
            }
        };
        let data = payment_data(&payment, payment.total, Some(token));
        let response = self
            .fetch_gateway_response(extension.confirm(data), &payment)
            .await?;

        let record = self.store_transaction(&txn, &payment, response).await?;
        self.postprocess(&txn, payment, &record).await?;
        txn.commit().await?;

        self.emit(Event::PaymentCaptured {
            payment_id: record.payment_id,
        })
        .await;
        raise_payment_error(record)
    }

    /// Refunds when funds were captured, voids when only authorized. A
    /// release that already succeeded is returned as-is instead of being
    /// dispatched again.
    #[instrument(skip(self))]
    pub async fn refund_or_void(
        &self,
        payment_id: Uuid,
    ) -> Result<payment_transaction::Model, ServiceError> {
        let payment = self.get_payment(payment_id).await?;
        if payment.can_refund() {
            if let Some(existing) = self
                .prior_success(&payment, TransactionKind::Refund, Some(payment.captured_amount))
                .await?
            {
                info!(payment_id = %payment.id, "refund already recorded, skipping dispatch");
                return Ok(existing);
            }
            return self.refund(payment_id, None).await;
        }

        if let Some(existing) = self
            .prior_success(&payment, TransactionKind::Void, None)
            .await?
        {
            info!(payment_id = %payment.id, "void already recorded, skipping dispatch");
            return Ok(existing);
        }
        // A fully refunded payment holds nothing left to void.
        if let Some(existing) = self
            .prior_success(&payment, TransactionKind::Refund, None)
            .await?
        {
            return Ok(existing);
        }
        self.void(payment_id).await
    }

    async fn prior_success(
        &self,
        payment: &payment::Model,
        kind: TransactionKind,
        amount: Option<Decimal>,
    ) -> Result<Option<payment_transaction::Model>, ServiceError> {
        let mut query = payment_transaction::Entity::find()
            .filter(payment_transaction::Column::PaymentId.eq(payment.id))
            .filter(payment_transaction::Column::Kind.eq(kind.to_string()))
            .filter(payment_transaction::Column::IsSuccess.eq(true));
        if let Some(amount) = amount {
            query = query.filter(payment_transaction::Column::Amount.eq(amount));
        }
        let record = query
            .order_by_desc(payment_transaction::Column::CreatedAt)
            .one(self.db.as_ref())
            .await?;
        Ok(record)
    }

    async fn lock_payment(
        &self,
        txn: &DatabaseTransaction,
        payment_id: Uuid,
    ) -> Result<payment::Model, ServiceError> {
        payment::Entity::find_by_id(payment_id)
            .lock_exclusive()
            .one(txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Payment".to_string()))
    }

    /// Token of the latest successful transaction of the given kind. A
    /// missing one means the operation has no predecessor to act on, so
    /// the gateway is never contacted.
    async fn past_transaction_token(
        &self,
        txn: &DatabaseTransaction,
        payment: &payment::Model,
        kind: TransactionKind,
    ) -> Result<String, ServiceError> {
        let record = payment_transaction::Entity::find()
            .filter(payment_transaction::Column::PaymentId.eq(payment.id))
            .filter(payment_transaction::Column::Kind.eq(kind.to_string()))
            .filter(payment_transaction::Column::IsSuccess.eq(true))
            .order_by_desc(payment_transaction::Column::CreatedAt)
            .one(txn)
            .await?;
        record.map(|r| r.token).ok_or_else(|| {
            ServiceError::PaymentFailed(format!("Cannot find successful {} transaction.", kind))
        })
    }

    /// Awaits the extension call, validates the response and masks any
    /// failure behind the generic gateway error. Details go to the log.
    async fn fetch_gateway_response(
        &self,
        call: impl std::future::Future<Output = Result<GatewayResponse, ServiceError>>,
        payment: &payment::Model,
    ) -> Result<GatewayResponse, ServiceError> {
        let response = call.await.map_err(|e| {
            error!(error = %e, payment_id = %payment.id, gateway = %payment.gateway,
                "gateway call failed");
            ServiceError::GatewayError(e.to_string())
        })?;
        validate_gateway_response(&response, &payment.currency).map_err(|e| {
            error!(error = %e, payment_id = %payment.id, gateway = %payment.gateway,
                "gateway returned a malformed response");
            e
        })?;
        Ok(response)
    }

    /// Reuses an existing transaction when the gateway reports a result the
    /// database already holds, otherwise records a new one. Retried webhook
    /// deliveries must not double-apply amounts.
    async fn store_transaction(
        &self,
        txn: &DatabaseTransaction,
        payment: &payment::Model,
        response: GatewayResponse,
    ) -> Result<payment_transaction::Model, ServiceError> {
        let existing = payment_transaction::Entity::find()
            .filter(payment_transaction::Column::PaymentId.eq(payment.id))
            .filter(payment_transaction::Column::Token.eq(response.transaction_id.clone()))
            .filter(payment_transaction::Column::Kind.eq(response.kind.to_string()))
            .filter(payment_transaction::Column::IsSuccess.eq(response.is_success))
            .one(txn)
            .await?;

        if let Some(existing) = existing {
            warn!(payment_id = %payment.id, token = %existing.token,
                "gateway response already processed");
            let mut active: payment_transaction::ActiveModel = existing.into();
            active.already_processed = Set(true);
            let updated = active.update(txn).await?;
            return Ok(updated);
        }

        self.insert_transaction(txn, payment, response).await
    }

    async fn insert_transaction(
        &self,
        txn: &DatabaseTransaction,
        payment: &payment::Model,
        response: GatewayResponse,
    ) -> Result<payment_transaction::Model, ServiceError> {
        let model = payment_transaction::ActiveModel {
            id: Set(Uuid::new_v4()),
            payment_id: Set(payment.id),
            kind: Set(response.kind.to_string()),
            token: Set(response.transaction_id),
            amount: Set(response.amount),
            currency: Set(response.currency),
            is_success: Set(response.is_success),
            action_required: Set(response.action_required),
            already_processed: Set(false),
            error: Set(response.error),
            gateway_response: Set(response.raw_response),
            created_at: Set(Utc::now()),
        };
        let record = model.insert(txn).await?;
        Ok(record)
    }

    /// Applies a successful transaction to the payment's amounts and
    /// status. Replayed responses change nothing.
    async fn postprocess(
        &self,
        txn: &DatabaseTransaction,
        payment: payment::Model,
        record: &payment_transaction::Model,
    ) -> Result<(), ServiceError> {
        if !record.is_success || record.already_processed || record.action_required {
            return Ok(());
        }

        let kind: TransactionKind = record
            .kind
            .parse()
            .map_err(|_| ServiceError::InternalError(format!("unknown kind {}", record.kind)))?;

        let total = payment.total;
        let previously_captured = payment.captured_amount;
        let mut active: payment::ActiveModel = payment.into();
        match kind {
            TransactionKind::Capture | TransactionKind::Confirm => {
                let captured = previously_captured + record.amount;
                active.captured_amount = Set(captured);
                active.charge_status = Set(if captured >= total {
                    CHARGE_STATUS_FULLY_CHARGED.to_string()
                } else {
                    CHARGE_STATUS_PARTIALLY_CHARGED.to_string()
                });
            }
            TransactionKind::Refund => {
                let captured = previously_captured - record.amount;
                active.captured_amount = Set(captured);
                active.charge_status = Set(if captured <= Decimal::ZERO {
                    CHARGE_STATUS_FULLY_REFUNDED.to_string()
                } else {
                    CHARGE_STATUS_PARTIALLY_REFUNDED.to_string()
                });
                if captured <= Decimal::ZERO {
                    active.is_active = Set(false);
                }
            }
            TransactionKind::Void => {
                active.is_active = Set(false);
            }
            TransactionKind::Auth
            | TransactionKind::ActionToConfirm
            | TransactionKind::External => {}
        }
        active.updated_at = Set(Some(Utc::now()));
        active.update(txn).await?;
        Ok(())
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                error!(error = %e, "failed to emit payment event");
            }
        }
    }
}

fn payment_data(payment: &payment::Model, amount: Decimal, token: Option<String>) -> PaymentData {
    PaymentData {
        payment_id: payment.id,
        order_id: payment.order_id,
        amount,
        currency: payment.currency.clone(),
        gateway: payment.gateway.clone(),
        token,
    }
}

fn require_active(payment: &payment::Model) -> Result<(), ServiceError> {
    if !payment.is_active {
        return Err(ServiceError::PaymentFailed(
            "This payment is no longer active.".to_string(),
        ));
    }
    Ok(())
}

fn clean_authorize(payment: &payment::Model) -> Result<(), ServiceError> {
    if payment.captured_amount > Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Charged payments cannot be authorized again.".to_string(),
        ));
    }
    Ok(())
}

fn clean_capture(payment: &payment::Model, amount: Decimal) -> Result<(), ServiceError> {
    if amount <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Amount should be a positive number.".to_string(),
        ));
    }
    if amount > payment.uncaptured_amount() {
        return Err(ServiceError::ValidationError(
            "Unable to charge more than un-captured amount.".to_string(),
        ));
    }
    Ok(())
}

fn clean_refund(payment: &payment::Model, amount: Decimal) -> Result<(), ServiceError> {
    if amount <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Amount should be a positive number.".to_string(),
        ));
    }
    if amount > payment.captured_amount {
        return Err(ServiceError::ValidationError(
            "Cannot refund more than captured.".to_string(),
        ));
    }
    Ok(())
}

/// Failed transactions surface as payment errors carrying the recorded
/// message; the caller still has the stored transaction row.
fn raise_payment_error(
    record: payment_transaction::Model,
) -> Result<payment_transaction::Model, ServiceError> {
    if !record.is_success {
        let message = record
            .error
            .clone()
            .unwrap_or_else(|| GENERIC_TRANSACTION_ERROR.to_string());
        return Err(ServiceError::PaymentFailed(message));
    }
    Ok(record)
}
