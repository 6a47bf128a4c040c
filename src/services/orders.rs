use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::{order, order_discount, order_line};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::pricing::{
    allocate_subtotal_discount, apply_order_discounts, quantize_price, DiscountSpec, DiscountType,
    DiscountValueType, OrderAmounts, VoucherScope,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateOrderLineRequest {
    #[validate(length(min = 1, max = 255))]
    pub product_name: String,
    pub sku: Option<String>,
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub unit_price: Decimal,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, max = 50))]
    pub number: String,
    #[validate(length(min = 1, max = 100))]
    pub channel_slug: String,
    #[validate(length(min = 3, max = 3))]
    pub currency: String,
    pub shipping_price: Decimal,
    #[validate]
    pub lines: Vec<CreateOrderLineRequest>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AttachVoucherRequest {
    #[validate(length(min = 1, max = 255))]
    pub code: String,
    /// "entire_order" or "shipping".
    pub scope: String,
    /// "fixed" or "percentage".
    pub value_type: String,
    pub value: Decimal,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ManualDiscountRequest {
    /// "fixed" or "percentage".
    pub value_type: String,
    pub value: Decimal,
    #[validate(length(max = 255))]
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderDetails {
    pub order: order::Model,
    pub lines: Vec<order_line::Model>,
    pub discounts: Vec<order_discount::Model>,
}

/// Draft order management plus the discount recalculation pipeline.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderService {
    pub fn new(db: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, req), fields(number = %req.number))]
    pub async fn create_draft_order(
        &self,
        req: CreateOrderRequest,
    ) -> Result<OrderDetails, ServiceError> {
        req.validate()?;
        if req.shipping_price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Shipping price cannot be negative".to_string(),
            ));
        }
        for line in &req.lines {
            if line.unit_price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Unit price cannot be negative".to_string(),
                ));
            }
        }

        let txn = self.db.begin().await?;
        let order_id = Uuid::new_v4();
        let now = Utc::now();
        let currency = req.currency.to_uppercase();

        let order_model = order::ActiveModel {
            id: Set(order_id),
            number: Set(req.number.clone()),
            status: Set("draft".to_string()),
            channel_slug: Set(req.channel_slug),
            currency: Set(currency.clone()),
            total_net: Set(Decimal::ZERO),
            total_gross: Set(Decimal::ZERO),
            subtotal_net: Set(Decimal::ZERO),
            subtotal_gross: Set(Decimal::ZERO),
            shipping_price_net: Set(req.shipping_price),
            shipping_price_gross: Set(req.shipping_price),
            base_shipping_price: Set(req.shipping_price),
            undiscounted_total_net: Set(Decimal::ZERO),
            undiscounted_total_gross: Set(Decimal::ZERO),
            created_at: Set(now),
            updated_at: Set(None),
            version: Set(1),
        };
        order_model.insert(&txn).await?;

        for (position, line) in req.lines.into_iter().enumerate() {
            let unit_price = quantize_price(line.unit_price, &currency);
            let line_total = unit_price * Decimal::from(line.quantity);
            let model = order_line::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                line_number: Set(position as i32 + 1),
                product_name: Set(line.product_name),
                sku: Set(line.sku),
                quantity: Set(line.quantity),
                currency: Set(currency.clone()),
                base_unit_price: Set(unit_price),
                unit_price_net: Set(unit_price),
                unit_price_gross: Set(unit_price),
                total_price_net: Set(line_total),
                total_price_gross: Set(line_total),
                unit_discount_amount: Set(Decimal::ZERO),
                created_at: Set(now),
            };
            model.insert(&txn).await?;
        }

        self.recalculate_in(&txn, order_id).await?;
        txn.commit().await?;

        info!(order_id = %order_id, "draft order created");
        self.emit(Event::OrderCreated { order_id }).await;
        self.get_order(order_id).await
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderDetails, ServiceError> {
        self.load_details(self.db.as_ref(), order_id).await
    }

    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        let per_page = per_page.clamp(1, 100);
        let paginator = order::Entity::find()
            .order_by_desc(order::Column::CreatedAt)
            .paginate(self.db.as_ref(), per_page);
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((orders, total))
    }

    #[instrument(skip(self, req))]
    pub async fn add_order_line(
        &self,
        order_id: Uuid,
        req: CreateOrderLineRequest,
    ) -> Result<OrderDetails, ServiceError> {
        req.validate()?;
        if req.unit_price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Unit price cannot be negative".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        let order = self.require_order(&txn, order_id).await?;
        let next_number = order_line::Entity::find()
            .filter(order_line::Column::OrderId.eq(order_id))
            .count(&txn)
            .await? as i32
            + 1;
        let unit_price = quantize_price(req.unit_price, &order.currency);
        let line_total = unit_price * Decimal::from(req.quantity);
        let line_id = Uuid::new_v4();
        let model = order_line::ActiveModel {
            id: Set(line_id),
            order_id: Set(order_id),
            line_number: Set(next_number),
            product_name: Set(req.product_name),
            sku: Set(req.sku),
            quantity: Set(req.quantity),
            currency: Set(order.currency.clone()),
            base_unit_price: Set(unit_price),
            unit_price_net: Set(unit_price),
            unit_price_gross: Set(unit_price),
            total_price_net: Set(line_total),
            total_price_gross: Set(line_total),
            unit_discount_amount: Set(Decimal::ZERO),
            created_at: Set(Utc::now()),
        };
        model.insert(&txn).await?;

        self.recalculate_in(&txn, order_id).await?;
        txn.commit().await?;

        self.emit(Event::OrderLineAdded { order_id, line_id }).await;
        self.get_order(order_id).await
    }

    #[instrument(skip(self, req), fields(code = %req.code))]
    pub async fn attach_voucher(
        &self,
        order_id: Uuid,
        req: AttachVoucherRequest,
    ) -> Result<OrderDetails, ServiceError> {
        req.validate()?;
        let scope = VoucherScope::from_str(&req.scope).map_err(|_| {
            ServiceError::ValidationError(format!("Unknown voucher scope: {}", req.scope))
        })?;
        let value_type = parse_value_type(&req.value_type)?;
        validate_discount_value(value_type, req.value)?;

        let txn = self.db.begin().await?;
        let order = self.require_order(&txn, order_id).await?;

        let existing = order_discount::Entity::find()
            .filter(order_discount::Column::OrderId.eq(order_id))
            .filter(order_discount::Column::DiscountType.eq(DiscountType::Voucher.to_string()))
            .one(&txn)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(
                "Order already has a voucher attached".to_string(),
            ));
        }

        let model = order_discount::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            discount_type: Set(DiscountType::Voucher.to_string()),
            value_type: Set(value_type.to_string()),
            value: Set(req.value),
            voucher_scope: Set(Some(scope.to_string())),
            voucher_code: Set(Some(req.code)),
            name: Set(None),
            currency: Set(order.currency.clone()),
            amount_value: Set(Decimal::ZERO),
            created_at: Set(Utc::now()),
        };
        model.insert(&txn).await?;

        self.recalculate_in(&txn, order_id).await?;
        txn.commit().await?;
        self.emit(Event::OrderDiscountsRecalculated { order_id }).await;
        self.get_order(order_id).await
    }

    #[instrument(skip(self, req))]
    pub async fn add_manual_discount(
        &self,
        order_id: Uuid,
        req: ManualDiscountRequest,
    ) -> Result<OrderDetails, ServiceError> {
        req.validate()?;
        let value_type = parse_value_type(&req.value_type)?;
        validate_discount_value(value_type, req.value)?;

        let txn = self.db.begin().await?;
        let order = self.require_order(&txn, order_id).await?;

        let model = order_discount::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            discount_type: Set(DiscountType::Manual.to_string()),
            value_type: Set(value_type.to_string()),
            value: Set(req.value),
            voucher_scope: Set(None),
            voucher_code: Set(None),
            name: Set(req.name),
            currency: Set(order.currency.clone()),
            amount_value: Set(Decimal::ZERO),
            created_at: Set(Utc::now()),
        };
        model.insert(&txn).await?;

        self.recalculate_in(&txn, order_id).await?;
        txn.commit().await?;
        self.emit(Event::OrderDiscountsRecalculated { order_id }).await;
        self.get_order(order_id).await
    }

    #[instrument(skip(self, req))]
    pub async fn update_discount(
        &self,
        order_id: Uuid,
        discount_id: Uuid,
        req: ManualDiscountRequest,
    ) -> Result<OrderDetails, ServiceError> {
        req.validate()?;
        let value_type = parse_value_type(&req.value_type)?;
        validate_discount_value(value_type, req.value)?;

        let txn = self.db.begin().await?;
        let discount = order_discount::Entity::find_by_id(discount_id)
            .filter(order_discount::Column::OrderId.eq(order_id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order discount".to_string()))?;

        let metadata_only =
            discount.value == req.value && discount.value_type == value_type.to_string();

        let mut active: order_discount::ActiveModel = discount.into();
        active.value_type = Set(value_type.to_string());
        active.value = Set(req.value);
        if req.name.is_some() {
            active.name = Set(req.name);
        }
        active.update(&txn).await?;

        if metadata_only {
            // Amounts are unaffected, so repricing runs off the request
            // path on the event worker.
            txn.commit().await?;
            self.emit(Event::OrderRepricingRequested { order_id }).await;
        } else {
            self.recalculate_in(&txn, order_id).await?;
            txn.commit().await?;
            self.emit(Event::OrderDiscountsRecalculated { order_id }).await;
        }
        self.get_order(order_id).await
    }

    #[instrument(skip(self))]
    pub async fn remove_discount(
        &self,
        order_id: Uuid,
        discount_id: Uuid,
    ) -> Result<OrderDetails, ServiceError> {
        let txn = self.db.begin().await?;
        let discount = order_discount::Entity::find_by_id(discount_id)
            .filter(order_discount::Column::OrderId.eq(order_id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order discount".to_string()))?;
        order_discount::Entity::delete_by_id(discount.id)
            .exec(&txn)
            .await?;

        self.recalculate_in(&txn, order_id).await?;
        txn.commit().await?;
        self.emit(Event::OrderDiscountsRecalculated { order_id }).await;
        self.get_order(order_id).await
    }

    /// Reruns the full discount pipeline for an order.
    #[instrument(skip(self))]
    pub async fn recalculate(&self, order_id: Uuid) -> Result<OrderDetails, ServiceError> {
        let txn = self.db.begin().await?;
        self.recalculate_in(&txn, order_id).await?;
        txn.commit().await?;
        self.get_order(order_id).await
    }

    /// Recomputes realized discount amounts, per-line prices and order
    /// totals from the undiscounted bases. Vouchers apply before manual
    /// discounts; the remaining subtotal reduction is redistributed across
    /// lines with the last line absorbing rounding drift.
    async fn recalculate_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
    ) -> Result<(), ServiceError> {
        let order = self.require_order(conn, order_id).await?;
        let lines = order_line::Entity::find()
            .filter(order_line::Column::OrderId.eq(order_id))
            .order_by_asc(order_line::Column::LineNumber)
            .all(conn)
            .await?;
        let discounts = order_discount::Entity::find()
            .filter(order_discount::Column::OrderId.eq(order_id))
            .order_by_asc(order_discount::Column::CreatedAt)
            .all(conn)
            .await?;

        let currency = order.currency.clone();
        let base_subtotal: Decimal = lines.iter().map(|l| l.undiscounted_total()).sum();
        let base_shipping = order.base_shipping_price;

        let specs = discounts
            .iter()
            .map(discount_spec)
            .collect::<Result<Vec<_>, _>>()?;
        let result = apply_order_discounts(
            &OrderAmounts {
                subtotal: base_subtotal,
                shipping: base_shipping,
                currency: currency.clone(),
            },
            &specs,
        );

        for (discount_id, amount) in &result.realized {
            let model = discounts
                .iter()
                .find(|d| d.id == *discount_id)
                .ok_or_else(|| ServiceError::InternalError("discount vanished".to_string()))?;
            if model.amount_value != *amount {
                let mut active: order_discount::ActiveModel = model.clone().into();
                active.amount_value = Set(*amount);
                active.update(conn).await?;
            }
        }

        let subtotal_discount = base_subtotal - result.subtotal;
        let line_totals: Vec<Decimal> = lines.iter().map(|l| l.undiscounted_total()).collect();
        let shares = allocate_subtotal_discount(&line_totals, subtotal_discount, &currency);

        for (line, share) in lines.iter().zip(shares.iter()) {
            let discounted_total = line.undiscounted_total() - share;
            let unit_price = if line.quantity > 0 {
                quantize_price(discounted_total / Decimal::from(line.quantity), &currency)
            } else {
                Decimal::ZERO
            };
            let unit_discount = line.base_unit_price - unit_price;

            let mut active: order_line::ActiveModel = line.clone().into();
            active.total_price_net = Set(discounted_total);
            active.total_price_gross = Set(discounted_total);
            active.unit_price_net = Set(unit_price);
            active.unit_price_gross = Set(unit_price);
            active.unit_discount_amount = Set(unit_discount);
            active.update(conn).await?;
        }

        let total = result.subtotal + result.shipping;
        let version = order.version;
        let mut active: order::ActiveModel = order.into();
        active.subtotal_net = Set(result.subtotal);
        active.subtotal_gross = Set(result.subtotal);
        active.shipping_price_net = Set(result.shipping);
        active.shipping_price_gross = Set(result.shipping);
        active.total_net = Set(total);
        active.total_gross = Set(total);
        active.undiscounted_total_net = Set(base_subtotal + base_shipping);
        active.undiscounted_total_gross = Set(base_subtotal + base_shipping);
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(version + 1);
        active.update(conn).await?;

        Ok(())
    }

    async fn require_order<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
    ) -> Result<order::Model, ServiceError> {
        order::Entity::find_by_id(order_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order".to_string()))
    }

    async fn load_details<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
    ) -> Result<OrderDetails, ServiceError> {
        let order = self.require_order(conn, order_id).await?;
        let lines = order_line::Entity::find()
            .filter(order_line::Column::OrderId.eq(order_id))
            .order_by_asc(order_line::Column::LineNumber)
            .all(conn)
            .await?;
        let discounts = order_discount::Entity::find()
            .filter(order_discount::Column::OrderId.eq(order_id))
            .order_by_asc(order_discount::Column::CreatedAt)
            .all(conn)
            .await?;
        Ok(OrderDetails {
            order,
            lines,
            discounts,
        })
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                error!(error = %e, "failed to emit order event");
            }
        }
    }
}

fn parse_value_type(raw: &str) -> Result<DiscountValueType, ServiceError> {
    DiscountValueType::from_str(raw).map_err(|_| {
        ServiceError::ValidationError(format!("Unknown discount value type: {}", raw))
    })
}

fn validate_discount_value(
    value_type: DiscountValueType,
    value: Decimal,
) -> Result<(), ServiceError> {
    if value <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Discount value must be positive".to_string(),
        ));
    }
    if value_type == DiscountValueType::Percentage && value > Decimal::ONE_HUNDRED {
        return Err(ServiceError::ValidationError(
            "Percentage discount cannot exceed 100".to_string(),
        ));
    }
    Ok(())
}

fn discount_spec(model: &order_discount::Model) -> Result<DiscountSpec, ServiceError> {
    let discount_type = DiscountType::from_str(&model.discount_type).map_err(|_| {
        ServiceError::InternalError(format!("unknown discount type {}", model.discount_type))
    })?;
    let value_type = DiscountValueType::from_str(&model.value_type).map_err(|_| {
        ServiceError::InternalError(format!("unknown value type {}", model.value_type))
    })?;
    let voucher_scope = match &model.voucher_scope {
        Some(raw) => Some(VoucherScope::from_str(raw).map_err(|_| {
            ServiceError::InternalError(format!("unknown voucher scope {}", raw))
        })?),
        None => None,
    };
    Ok(DiscountSpec {
        id: model.id,
        discount_type,
        value_type,
        value: model.value,
        voucher_scope,
    })
}
