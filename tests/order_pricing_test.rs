mod common;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use storefront_api::errors::ServiceError;
use storefront_api::services::orders::{
    AttachVoucherRequest, CreateOrderLineRequest, ManualDiscountRequest, OrderService,
};

fn voucher_request(value: Decimal) -> AttachVoucherRequest {
    AttachVoucherRequest {
        code: "SAVE10".to_string(),
        scope: "entire_order".to_string(),
        value_type: "fixed".to_string(),
        value,
    }
}

#[tokio::test]
async fn draft_order_totals_start_undiscounted() {
    let db = common::setup_db().await;
    let service = OrderService::new(db, None);

    let details = common::create_standard_order(&service).await;
    assert_eq!(details.order.subtotal_gross, dec!(100));
    assert_eq!(details.order.shipping_price_gross, dec!(20));
    assert_eq!(details.order.total_gross, dec!(120));
    assert_eq!(details.order.undiscounted_total_gross, dec!(120));
    assert_eq!(details.lines.len(), 2);
}

#[tokio::test]
async fn entire_order_voucher_reduces_subtotal_and_lines() {
    let db = common::setup_db().await;
    let service = OrderService::new(db, None);
    let details = common::create_standard_order(&service).await;

    let details = service
        .attach_voucher(details.order.id, voucher_request(dec!(10)))
        .await
        .unwrap();

    assert_eq!(details.order.subtotal_gross, dec!(90));
    assert_eq!(details.order.shipping_price_gross, dec!(20));
    assert_eq!(details.order.total_gross, dec!(110));
    assert_eq!(details.order.undiscounted_total_gross, dec!(120));

    // 60/100 and 40/100 of the ten units of discount.
    assert_eq!(details.lines[0].total_price_gross, dec!(54));
    assert_eq!(details.lines[1].total_price_gross, dec!(36));
    let discounted_subtotal: Decimal =
        details.lines.iter().map(|l| l.total_price_gross).sum();
    assert_eq!(discounted_subtotal, details.order.subtotal_gross);

    assert_eq!(details.discounts.len(), 1);
    assert_eq!(details.discounts[0].amount_value, dec!(10));
}

#[tokio::test]
async fn shipping_voucher_leaves_lines_untouched() {
    let db = common::setup_db().await;
    let service = OrderService::new(db, None);
    let details = common::create_standard_order(&service).await;

    let details = service
        .attach_voucher(
            details.order.id,
            AttachVoucherRequest {
                code: "FREESHIP".to_string(),
                scope: "shipping".to_string(),
                value_type: "percentage".to_string(),
                value: dec!(100),
            },
        )
        .await
        .unwrap();

    assert_eq!(details.order.subtotal_gross, dec!(100));
    assert_eq!(details.order.shipping_price_gross, dec!(0));
    assert_eq!(details.order.total_gross, dec!(100));
    assert_eq!(details.lines[0].total_price_gross, dec!(60));
    assert_eq!(details.discounts[0].amount_value, dec!(20));
}

#[tokio::test]
async fn second_voucher_conflicts() {
    let db = common::setup_db().await;
    let service = OrderService::new(db, None);
    let details = common::create_standard_order(&service).await;

    service
        .attach_voucher(details.order.id, voucher_request(dec!(10)))
        .await
        .unwrap();
    let err = service
        .attach_voucher(details.order.id, voucher_request(dec!(5)))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
}

#[tokio::test]
async fn manual_fixed_discount_splits_between_subtotal_and_shipping() {
    let db = common::setup_db().await;
    let service = OrderService::new(db, None);
    let details = common::create_standard_order(&service).await;

    let details = service
        .add_manual_discount(
            details.order.id,
            ManualDiscountRequest {
                value_type: "fixed".to_string(),
                value: dec!(12),
                name: Some("Goodwill".to_string()),
            },
        )
        .await
        .unwrap();

    // 12 * 100/120 = 10 against subtotal, remainder 2 against shipping.
    assert_eq!(details.order.subtotal_gross, dec!(90));
    assert_eq!(details.order.shipping_price_gross, dec!(18));
    assert_eq!(details.order.total_gross, dec!(108));
    assert_eq!(details.discounts[0].amount_value, dec!(12));
}

#[tokio::test]
async fn voucher_applies_before_manual_discount() {
    let db = common::setup_db().await;
    let service = OrderService::new(db, None);
    let details = common::create_standard_order(&service).await;

    // Attach the manual discount first; application order must still put
    // the voucher ahead of it.
    let order_id = details.order.id;
    service
        .add_manual_discount(
            order_id,
            ManualDiscountRequest {
                value_type: "percentage".to_string(),
                value: dec!(50),
                name: None,
            },
        )
        .await
        .unwrap();
    let details = service
        .attach_voucher(order_id, voucher_request(dec!(20)))
        .await
        .unwrap();

    // Voucher: 100 -> 80 subtotal. Manual 50%: subtotal 40, shipping 10.
    assert_eq!(details.order.subtotal_gross, dec!(40));
    assert_eq!(details.order.shipping_price_gross, dec!(10));
    assert_eq!(details.order.total_gross, dec!(50));
}

#[tokio::test]
async fn removing_discount_restores_totals() {
    let db = common::setup_db().await;
    let service = OrderService::new(db, None);
    let details = common::create_standard_order(&service).await;

    let details = service
        .attach_voucher(details.order.id, voucher_request(dec!(10)))
        .await
        .unwrap();
    assert_eq!(details.order.total_gross, dec!(110));

    let discount_id = details.discounts[0].id;
    let details = service
        .remove_discount(details.order.id, discount_id)
        .await
        .unwrap();
    assert_eq!(details.order.total_gross, dec!(120));
    assert_eq!(details.lines[0].total_price_gross, dec!(60));
    assert_eq!(details.lines[0].unit_discount_amount, dec!(0));
    assert!(details.discounts.is_empty());
}

#[tokio::test]
async fn adding_line_reprices_existing_discount() {
    let db = common::setup_db().await;
    let service = OrderService::new(db, None);
    let details = common::create_standard_order(&service).await;
    let order_id = details.order.id;

    service
        .attach_voucher(
            order_id,
            AttachVoucherRequest {
                code: "TEN-PCT".to_string(),
                scope: "entire_order".to_string(),
                value_type: "percentage".to_string(),
                value: dec!(10),
            },
        )
        .await
        .unwrap();

    let details = service
        .add_order_line(
            order_id,
            CreateOrderLineRequest {
                product_name: "Cap".to_string(),
                sku: None,
                quantity: 1,
                unit_price: dec!(50),
            },
        )
        .await
        .unwrap();

    // Subtotal 150, 10% voucher -> 135.
    assert_eq!(details.order.subtotal_gross, dec!(135));
    assert_eq!(details.order.total_gross, dec!(155));
    assert_eq!(details.discounts[0].amount_value, dec!(15));
}

#[tokio::test]
async fn uneven_allocation_lands_remainder_on_last_line() {
    let db = common::setup_db().await;
    let service = OrderService::new(db.clone(), None);

    let details = service
        .create_draft_order(storefront_api::services::orders::CreateOrderRequest {
            number: "ORD-UNEVEN".to_string(),
            channel_slug: "default-channel".to_string(),
            currency: "USD".to_string(),
            shipping_price: dec!(0),
            lines: vec![
                CreateOrderLineRequest {
                    product_name: "A".to_string(),
                    sku: None,
                    quantity: 1,
                    unit_price: dec!(10),
                },
                CreateOrderLineRequest {
                    product_name: "B".to_string(),
                    sku: None,
                    quantity: 1,
                    unit_price: dec!(10),
                },
                CreateOrderLineRequest {
                    product_name: "C".to_string(),
                    sku: None,
                    quantity: 1,
                    unit_price: dec!(10),
                },
            ],
        })
        .await
        .unwrap();

    let details = service
        .attach_voucher(details.order.id, voucher_request(dec!(10)))
        .await
        .unwrap();

    // 3.33 + 3.33, last line absorbs 3.34.
    assert_eq!(details.lines[0].total_price_gross, dec!(6.67));
    assert_eq!(details.lines[1].total_price_gross, dec!(6.67));
    assert_eq!(details.lines[2].total_price_gross, dec!(6.66));
    let discounted: Decimal = details.lines.iter().map(|l| l.total_price_gross).sum();
    assert_eq!(discounted, details.order.subtotal_gross);
}

#[tokio::test]
async fn line_numbers_fix_allocation_order() {
    let db = common::setup_db().await;
    let service = OrderService::new(db.clone(), None);

    // Two lines land in one request, the third later; positions must not
    // depend on shared timestamps.
    let details = common::create_standard_order(&service).await;
    let details = service
        .add_order_line(
            details.order.id,
            CreateOrderLineRequest {
                product_name: "Cap".to_string(),
                sku: None,
                quantity: 1,
                unit_price: dec!(10),
            },
        )
        .await
        .unwrap();

    let numbers: Vec<i32> = details.lines.iter().map(|l| l.line_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    assert_eq!(details.lines[2].product_name, "Cap");

    // Subtotal 110, fixed 10 off: shares 5.45 + 3.64, and the remainder
    // 0.91 lands on the highest-numbered line.
    let details = service
        .attach_voucher(details.order.id, voucher_request(dec!(10)))
        .await
        .unwrap();
    assert_eq!(details.lines[0].total_price_gross, dec!(54.55));
    assert_eq!(details.lines[1].total_price_gross, dec!(36.36));
    assert_eq!(details.lines[2].total_price_gross, dec!(9.09));
    assert_eq!(details.lines[2].line_number, 3);
}

#[tokio::test]
async fn metadata_only_discount_update_reprices_on_the_worker() {
    use sea_orm::{ActiveModelTrait, EntityTrait, Set};
    use std::sync::Arc;
    use storefront_api::entities::order;
    use storefront_api::events::{event_channel, process_events};

    let db = common::setup_db().await;
    let (sender, receiver) = event_channel(32);
    let service = OrderService::new(db.clone(), Some(Arc::new(sender)));

    let details = common::create_standard_order(&service).await;
    let order_id = details.order.id;
    let details = service
        .attach_voucher(order_id, voucher_request(dec!(10)))
        .await
        .unwrap();
    let discount_id = details.discounts[0].id;
    assert_eq!(details.order.total_gross, dec!(110));

    // Corrupt the stored totals so a later recalculation is observable.
    let stored = order::Entity::find_by_id(order_id)
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    let mut active: order::ActiveModel = stored.into();
    active.total_gross = Set(dec!(999));
    active.update(db.as_ref()).await.unwrap();

    // A rename keeps the amounts, so the request path leaves the totals
    // alone and queues the repricing instead.
    let details = service
        .update_discount(
            order_id,
            discount_id,
            ManualDiscountRequest {
                value_type: "fixed".to_string(),
                value: dec!(10),
                name: Some("Spring promo".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(details.order.total_gross, dec!(999));
    assert_eq!(details.discounts[0].name.as_deref(), Some("Spring promo"));

    // The worker drains the queue once every sender is gone.
    drop(service);
    process_events(receiver, db.clone()).await;

    let reloaded = order::Entity::find_by_id(order_id)
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.total_gross, dec!(110));
}

#[tokio::test]
async fn percentage_over_hundred_rejected() {
    let db = common::setup_db().await;
    let service = OrderService::new(db, None);
    let details = common::create_standard_order(&service).await;

    let err = service
        .add_manual_discount(
            details.order.id,
            ManualDiscountRequest {
                value_type: "percentage".to_string(),
                value: dec!(150),
                name: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));
}
