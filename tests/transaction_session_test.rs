mod common;

use rust_decimal_macros::dec;
use std::sync::Arc;
use uuid::Uuid;

use common::{ScriptedExtension, SCRIPTED_EXTENSION_ID};
use storefront_api::entities::{transaction_event, transaction_item};
use storefront_api::errors::ServiceError;
use storefront_api::gateway::extensions::{TransactionResultCode, TransactionSessionResult};
use storefront_api::services::orders::OrderService;
use storefront_api::services::transactions::{
    TransactionActionRequest, TransactionInitializeRequest, TransactionProcessRequest,
    TransactionSessionService, NO_APP_CONFIGURED,
};

use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};

fn init_request(checkout_id: Uuid, key: Option<&str>) -> TransactionInitializeRequest {
    serde_json::from_value(serde_json::json!({
        "checkout_id": checkout_id,
        "extension_id": SCRIPTED_EXTENSION_ID,
        "idempotency_key": key,
    }))
    .unwrap()
}

async fn setup() -> (
    Arc<storefront_api::db::DbPool>,
    Arc<ScriptedExtension>,
    TransactionSessionService,
) {
    let db = common::setup_db().await;
    let extension = Arc::new(ScriptedExtension::new());
    let registry = common::registry_with(extension.clone());
    let service =
        TransactionSessionService::new(db.clone(), registry, common::test_config(), None);
    (db, extension, service)
}

#[tokio::test]
async fn novel_key_creates_one_transaction_with_event_pair() {
    let (db, extension, service) = setup().await;
    let checkout = common::create_checkout(&db, dec!(100)).await;

    let outcome = service
        .initialize(init_request(checkout.id, Some("key-1")))
        .await
        .unwrap();

    assert_eq!(outcome.transaction.charged_value, dec!(100));
    assert_eq!(outcome.event.event_type, "charge_success");
    assert_eq!(extension.session_call_count(), 1);

    let items = transaction_item::Entity::find()
        .filter(transaction_item::Column::CheckoutId.eq(checkout.id))
        .count(db.as_ref())
        .await
        .unwrap();
    assert_eq!(items, 1);

    let events = transaction_event::Entity::find()
        .filter(transaction_event::Column::TransactionId.eq(outcome.transaction.id))
        .all(db.as_ref())
        .await
        .unwrap();
    assert_eq!(events.len(), 2);
    let request_event = events
        .iter()
        .find(|e| !e.include_in_calculations)
        .expect("request event");
    assert_eq!(request_event.event_type, "charge_request");
    assert_eq!(request_event.amount_value, dec!(100));
    assert_eq!(request_event.idempotency_key.as_deref(), Some("key-1"));
    assert!(events.iter().any(|e| e.include_in_calculations));
}

#[tokio::test]
async fn same_key_and_amount_replays_without_extension_call() {
    let (db, extension, service) = setup().await;
    let checkout = common::create_checkout(&db, dec!(100)).await;

    let first = service
        .initialize(init_request(checkout.id, Some("key-1")))
        .await
        .unwrap();
    let second = service
        .initialize(init_request(checkout.id, Some("key-1")))
        .await
        .unwrap();

    assert_eq!(first.transaction.id, second.transaction.id);
    assert_eq!(extension.session_call_count(), 1);

    let items = transaction_item::Entity::find()
        .filter(transaction_item::Column::CheckoutId.eq(checkout.id))
        .count(db.as_ref())
        .await
        .unwrap();
    assert_eq!(items, 1);
}

#[tokio::test]
async fn same_key_different_amount_conflicts() {
    let (db, _extension, service) = setup().await;
    let checkout = common::create_checkout(&db, dec!(100)).await;

    service
        .initialize(init_request(checkout.id, Some("key-1")))
        .await
        .unwrap();

    let mut retry = init_request(checkout.id, Some("key-1"));
    retry.amount = Some(dec!(55));
    let err = service.initialize(retry).await.unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
}

#[tokio::test]
async fn same_key_different_flow_conflicts() {
    let (db, extension, service) = setup().await;
    let checkout = common::create_checkout(&db, dec!(100)).await;

    service
        .initialize(init_request(checkout.id, Some("key-1")))
        .await
        .unwrap();

    let retry: TransactionInitializeRequest = serde_json::from_value(serde_json::json!({
        "checkout_id": checkout.id,
        "extension_id": SCRIPTED_EXTENSION_ID,
        "idempotency_key": "key-1",
        "flow_strategy": "authorization",
    }))
    .unwrap();
    let err = service.initialize(retry).await.unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
    assert_eq!(extension.session_call_count(), 1);
}

#[tokio::test]
async fn empty_idempotency_key_rejected() {
    let (db, extension, service) = setup().await;
    let checkout = common::create_checkout(&db, dec!(100)).await;

    let err = service
        .initialize(init_request(checkout.id, Some("")))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));
    assert_eq!(extension.session_call_count(), 0);
}

#[tokio::test]
async fn missing_key_is_generated() {
    let (db, _extension, service) = setup().await;
    let checkout = common::create_checkout(&db, dec!(100)).await;

    let first = service
        .initialize(init_request(checkout.id, None))
        .await
        .unwrap();
    let second = service
        .initialize(init_request(checkout.id, None))
        .await
        .unwrap();
    // Generated keys never collide, so two transactions exist.
    assert_ne!(first.transaction.id, second.transaction.id);
}

#[tokio::test]
async fn transaction_limit_enforced_per_source() {
    let db = common::setup_db().await;
    let extension = Arc::new(ScriptedExtension::new());
    let registry = common::registry_with(extension.clone());
    let service = TransactionSessionService::new(
        db.clone(),
        registry,
        common::test_config_with_limit(2),
        None,
    );
    let checkout = common::create_checkout(&db, dec!(100)).await;

    for _ in 0..2 {
        service
            .initialize(init_request(checkout.id, None))
            .await
            .unwrap();
    }
    let calls_at_limit = extension.session_call_count();
    let err = service
        .initialize(init_request(checkout.id, None))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));

    // The rejection created nothing and never reached the extension.
    let items = transaction_item::Entity::find()
        .filter(transaction_item::Column::CheckoutId.eq(checkout.id))
        .count(db.as_ref())
        .await
        .unwrap();
    assert_eq!(items, 2);
    assert_eq!(extension.session_call_count(), calls_at_limit);

    // A different source is unaffected.
    let other = common::create_checkout(&db, dec!(100)).await;
    service
        .initialize(init_request(other.id, None))
        .await
        .unwrap();
}

#[tokio::test]
async fn amount_defaults_to_source_total_and_must_be_positive() {
    let (db, _extension, service) = setup().await;
    let checkout = common::create_checkout(&db, dec!(42.50)).await;

    let outcome = service
        .initialize(init_request(checkout.id, None))
        .await
        .unwrap();
    assert_eq!(outcome.transaction.charged_value, dec!(42.50));

    let mut bad = init_request(checkout.id, None);
    bad.amount = Some(dec!(0));
    let err = service.initialize(bad).await.unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn failure_result_moves_no_funds() {
    let (db, extension, service) = setup().await;
    let checkout = common::create_checkout(&db, dec!(100)).await;

    extension.queue_session_result(TransactionSessionResult {
        result: TransactionResultCode::ChargeFailure,
        amount: dec!(100),
        psp_reference: None,
        message: Some("card declined".to_string()),
        data: None,
    });

    let outcome = service
        .initialize(init_request(checkout.id, None))
        .await
        .unwrap();
    assert_eq!(outcome.transaction.charged_value, dec!(0));
    assert_eq!(outcome.transaction.authorized_value, dec!(0));
    assert_eq!(outcome.event.event_type, "charge_failure");
}

#[tokio::test]
async fn pending_result_fills_pending_column() {
    let (db, extension, service) = setup().await;
    let checkout = common::create_checkout(&db, dec!(100)).await;

    extension.queue_session_result(TransactionSessionResult {
        result: TransactionResultCode::ChargeRequested,
        amount: dec!(100),
        psp_reference: Some("psp-pending".to_string()),
        message: None,
        data: None,
    });

    let outcome = service
        .initialize(init_request(checkout.id, None))
        .await
        .unwrap();
    assert_eq!(outcome.transaction.charged_value, dec!(0));
    assert_eq!(outcome.transaction.charge_pending_value, dec!(100));
}

#[tokio::test]
async fn checkout_statuses_refresh_after_session() {
    let (db, extension, service) = setup().await;
    let checkout = common::create_checkout(&db, dec!(100)).await;

    extension.queue_session_result(TransactionSessionResult {
        result: TransactionResultCode::ChargeSuccess,
        amount: dec!(40),
        psp_reference: None,
        message: None,
        data: None,
    });
    let mut partial = init_request(checkout.id, None);
    partial.amount = Some(dec!(40));
    service.initialize(partial).await.unwrap();

    let reloaded = storefront_api::entities::checkout::Entity::find_by_id(checkout.id)
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.charge_status, "partial");
    assert_eq!(reloaded.authorize_status, "partial");

    let mut rest = init_request(checkout.id, None);
    rest.amount = Some(dec!(60));
    service.initialize(rest).await.unwrap();

    let reloaded = storefront_api::entities::checkout::Entity::find_by_id(checkout.id)
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.charge_status, "full");
    assert_eq!(reloaded.authorize_status, "full");
}

#[tokio::test]
async fn process_continues_pending_session() {
    let (db, extension, service) = setup().await;
    let checkout = common::create_checkout(&db, dec!(100)).await;

    extension.queue_session_result(TransactionSessionResult {
        result: TransactionResultCode::ChargeActionRequired,
        amount: dec!(100),
        psp_reference: None,
        message: None,
        data: None,
    });
    let outcome = service
        .initialize(init_request(checkout.id, None))
        .await
        .unwrap();
    assert_eq!(outcome.transaction.charged_value, dec!(0));

    let processed = service
        .process(outcome.transaction.id, TransactionProcessRequest { data: None })
        .await
        .unwrap();
    assert_eq!(processed.transaction.charged_value, dec!(100));
    assert_eq!(processed.event.event_type, "charge_success");

    let err = service
        .process(outcome.transaction.id, TransactionProcessRequest { data: None })
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
}

#[tokio::test]
async fn request_refund_records_event_and_dispatches() {
    let (db, extension, service) = setup().await;
    let checkout = common::create_checkout(&db, dec!(100)).await;

    let outcome = service
        .initialize(init_request(checkout.id, None))
        .await
        .unwrap();

    let event = service
        .request_refund(
            outcome.transaction.id,
            TransactionActionRequest { amount: None },
        )
        .await
        .unwrap();
    assert_eq!(event.event_type, "refund_request");
    // Defaults to the charged value.
    assert_eq!(event.amount_value, dec!(100));
    assert!(!event.include_in_calculations);

    let requests = extension.action_requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].1, outcome.transaction.id);
    assert_eq!(requests[0].2, dec!(100));
}

#[tokio::test]
async fn action_without_capable_extension_fails_before_dispatch() {
    let db = common::setup_db().await;
    let extension = Arc::new(ScriptedExtension::without_actions());
    let registry = common::registry_with(extension.clone());
    let service =
        TransactionSessionService::new(db.clone(), registry, common::test_config(), None);
    let checkout = common::create_checkout(&db, dec!(100)).await;

    let outcome = service
        .initialize(init_request(checkout.id, None))
        .await
        .unwrap();

    let err = service
        .request_charge(
            outcome.transaction.id,
            TransactionActionRequest { amount: None },
        )
        .await
        .unwrap_err();
    match err {
        ServiceError::PaymentFailed(message) => assert_eq!(message, NO_APP_CONFIGURED),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(extension.action_requests.lock().unwrap().is_empty());

    // No request event was recorded either.
    let events = transaction_event::Entity::find()
        .filter(transaction_event::Column::TransactionId.eq(outcome.transaction.id))
        .filter(transaction_event::Column::EventType.eq("charge_request"))
        .count(db.as_ref())
        .await
        .unwrap();
    // Only the initialize request event carries this type.
    assert_eq!(events, 1);
}

#[tokio::test]
async fn order_can_back_a_transaction() {
    let (db, _extension, service) = setup().await;
    let order_service = OrderService::new(db.clone(), None);
    let details = common::create_standard_order(&order_service).await;

    let req: TransactionInitializeRequest = serde_json::from_value(serde_json::json!({
        "order_id": details.order.id,
        "extension_id": SCRIPTED_EXTENSION_ID,
    }))
    .unwrap();
    let outcome = service.initialize(req).await.unwrap();
    assert_eq!(outcome.transaction.order_id, Some(details.order.id));
    assert_eq!(outcome.transaction.charged_value, dec!(120));
}
