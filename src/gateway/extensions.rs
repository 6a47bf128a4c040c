use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use strum::{Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::ServiceError;

/// Kinds recorded on legacy payment transactions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Auth,
    Capture,
    Refund,
    Void,
    Confirm,
    ActionToConfirm,
    External,
}

/// Actions an app can be asked to perform on a transaction item.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionAction {
    Charge,
    Refund,
    Cancel,
}

/// Whether a session should authorize funds or charge them outright.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionFlowStrategy {
    Authorization,
    Charge,
}

impl TransactionFlowStrategy {
    /// Event type recorded before the extension is called.
    pub fn request_event_type(&self) -> &'static str {
        match self {
            TransactionFlowStrategy::Authorization => "authorization_request",
            TransactionFlowStrategy::Charge => "charge_request",
        }
    }
}

/// Result reported by an extension for an initialize/process session call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionResultCode {
    ChargeSuccess,
    ChargeFailure,
    ChargeRequested,
    ChargeActionRequired,
    AuthorizationSuccess,
    AuthorizationFailure,
    AuthorizationRequested,
    AuthorizationActionRequired,
}

impl TransactionResultCode {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            TransactionResultCode::ChargeSuccess | TransactionResultCode::AuthorizationSuccess
        )
    }

    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            TransactionResultCode::ChargeRequested | TransactionResultCode::AuthorizationRequested
        )
    }

    pub fn is_charge_flow(&self) -> bool {
        matches!(
            self,
            TransactionResultCode::ChargeSuccess
                | TransactionResultCode::ChargeFailure
                | TransactionResultCode::ChargeRequested
                | TransactionResultCode::ChargeActionRequired
        )
    }

    /// Event type recorded for the response event.
    pub fn event_type(&self) -> &'static str {
        match self {
            TransactionResultCode::ChargeSuccess => "charge_success",
            TransactionResultCode::ChargeFailure => "charge_failure",
            TransactionResultCode::ChargeRequested => "charge_request",
            TransactionResultCode::ChargeActionRequired => "charge_action_required",
            TransactionResultCode::AuthorizationSuccess => "authorization_success",
            TransactionResultCode::AuthorizationFailure => "authorization_failure",
            TransactionResultCode::AuthorizationRequested => "authorization_request",
            TransactionResultCode::AuthorizationActionRequired => "authorization_action_required",
        }
    }
}

/// Snapshot of a payment handed to an extension for a legacy operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentData {
    pub payment_id: Uuid,
    pub order_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub gateway: String,
    /// Token of the transaction being acted on, when one exists.
    pub token: Option<String>,
}

/// What an extension reports back for a legacy gateway call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayResponse {
    pub kind: TransactionKind,
    pub transaction_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub is_success: bool,
    pub action_required: bool,
    pub error: Option<String>,
    pub raw_response: Option<Value>,
    pub psp_reference: Option<String>,
}

/// Rejects malformed extension responses before they touch the database.
/// The caller maps any failure here to the generic user-facing error.
pub fn validate_gateway_response(
    response: &GatewayResponse,
    expected_currency: &str,
) -> Result<(), ServiceError> {
    if response.transaction_id.is_empty() {
        return Err(ServiceError::GatewayError(
            "gateway response is missing a transaction id".to_string(),
        ));
    }
    if response.currency != expected_currency {
        return Err(ServiceError::GatewayError(format!(
            "gateway response currency {} does not match payment currency {}",
            response.currency, expected_currency
        )));
    }
    if response.amount < Decimal::ZERO {
        return Err(ServiceError::GatewayError(
            "gateway response amount is negative".to_string(),
        ));
    }
    Ok(())
}

/// Input for transaction initialize/process session calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionSessionData {
    pub transaction_id: Uuid,
    pub source_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub flow_strategy: TransactionFlowStrategy,
    pub idempotency_key: String,
    pub data: Option<Value>,
}

/// What an extension reports back for a session call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionSessionResult {
    pub result: TransactionResultCode,
    pub amount: Decimal,
    pub psp_reference: Option<String>,
    pub message: Option<String>,
    pub data: Option<Value>,
}

/// A registered payment app or plugin. One implementation per gateway
/// identifier.
#[async_trait]
pub trait PaymentExtension: Send + Sync {
    /// Stable identifier, e.g. "gateway.dummy".
    fn identifier(&self) -> &str;

    /// Whether this extension handles the given action for a channel.
    fn supports_action(&self, action: TransactionAction, channel_slug: &str) -> bool;

    async fn authorize(&self, payment: PaymentData) -> Result<GatewayResponse, ServiceError>;
    async fn capture(&self, payment: PaymentData) -> Result<GatewayResponse, ServiceError>;
    async fn refund(&self, payment: PaymentData) -> Result<GatewayResponse, ServiceError>;
    async fn void(&self, payment: PaymentData) -> Result<GatewayResponse, ServiceError>;
    async fn confirm(&self, payment: PaymentData) -> Result<GatewayResponse, ServiceError>;

    /// One-step authorize-and-capture.
    async fn process_payment(&self, payment: PaymentData) -> Result<GatewayResponse, ServiceError>;

    async fn transaction_initialize_session(
        &self,
        session: TransactionSessionData,
    ) -> Result<TransactionSessionResult, ServiceError>;

    async fn transaction_process_session(
        &self,
        session: TransactionSessionData,
    ) -> Result<TransactionSessionResult, ServiceError>;

    /// Fire-and-forget request for an app to act on a stored transaction.
    async fn request_transaction_action(
        &self,
        action: TransactionAction,
        transaction_id: Uuid,
        amount: Decimal,
    ) -> Result<(), ServiceError>;
}

/// Registry of payment extensions keyed by identifier.
#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    extensions: HashMap<String, Arc<dyn PaymentExtension>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, extension: Arc<dyn PaymentExtension>) {
        self.extensions
            .insert(extension.identifier().to_string(), extension);
    }

    pub fn get(&self, identifier: &str) -> Option<Arc<dyn PaymentExtension>> {
        self.extensions.get(identifier).cloned()
    }

    /// Looks up an extension or fails the way a misconfigured gateway
    /// should: as a gateway error with a masked message.
    pub fn require(&self, identifier: &str) -> Result<Arc<dyn PaymentExtension>, ServiceError> {
        self.get(identifier).ok_or_else(|| {
            ServiceError::GatewayError(format!("no extension registered for {}", identifier))
        })
    }

    /// True when at least one registered extension handles the action on
    /// the given channel.
    pub fn is_action_supported(&self, action: TransactionAction, channel_slug: &str) -> bool {
        self.extensions
            .values()
            .any(|ext| ext.supports_action(action, channel_slug))
    }

    /// Finds the extension that handles the action on the given channel.
    pub fn extension_for_action(
        &self,
        action: TransactionAction,
        channel_slug: &str,
    ) -> Option<Arc<dyn PaymentExtension>> {
        self.extensions
            .values()
            .find(|ext| ext.supports_action(action, channel_slug))
            .cloned()
    }
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("extensions", &self.extensions.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn response(currency: &str, transaction_id: &str, amount: Decimal) -> GatewayResponse {
        GatewayResponse {
            kind: TransactionKind::Capture,
            transaction_id: transaction_id.to_string(),
            amount,
            currency: currency.to_string(),
            is_success: true,
            action_required: false,
            error: None,
            raw_response: None,
            psp_reference: None,
        }
    }

    #[test]
    fn validate_accepts_well_formed_response() {
        assert!(validate_gateway_response(&response("USD", "tok-1", dec!(10)), "USD").is_ok());
    }

    #[test]
    fn validate_rejects_missing_token() {
        let err = validate_gateway_response(&response("USD", "", dec!(10)), "USD").unwrap_err();
        assert!(matches!(err, ServiceError::GatewayError(_)));
    }

    #[test]
    fn validate_rejects_currency_mismatch() {
        let err = validate_gateway_response(&response("EUR", "tok-1", dec!(10)), "USD").unwrap_err();
        assert!(matches!(err, ServiceError::GatewayError(_)));
    }

    #[test]
    fn validate_rejects_negative_amount() {
        let err = validate_gateway_response(&response("USD", "tok-1", dec!(-1)), "USD").unwrap_err();
        assert!(matches!(err, ServiceError::GatewayError(_)));
    }

    #[test]
    fn result_code_event_types() {
        assert_eq!(
            TransactionResultCode::ChargeSuccess.event_type(),
            "charge_success"
        );
        assert_eq!(
            TransactionFlowStrategy::Authorization.request_event_type(),
            "authorization_request"
        );
        assert!(TransactionResultCode::ChargeRequested.is_pending());
        assert!(!TransactionResultCode::ChargeFailure.is_success());
    }
}
