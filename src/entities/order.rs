use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, Validate)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[validate(length(
        min = 1,
        max = 50,
        message = "Order number must be between 1 and 50 characters"
    ))]
    pub number: String,

    pub status: String,
    pub channel_slug: String,
    pub currency: String,

    // Net/gross pairs stay equal until a tax layer diverges them.
    pub total_net: Decimal,
    pub total_gross: Decimal,
    pub subtotal_net: Decimal,
    pub subtotal_gross: Decimal,
    pub shipping_price_net: Decimal,
    pub shipping_price_gross: Decimal,

    /// Shipping price before any discount is applied.
    pub base_shipping_price: Decimal,

    /// Totals before discount application; never touched by recalculation.
    pub undiscounted_total_net: Decimal,
    pub undiscounted_total_gross: Decimal,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_line::Entity")]
    OrderLine,
    #[sea_orm(has_many = "super::order_discount::Entity")]
    OrderDiscount,
    #[sea_orm(has_many = "super::transaction_item::Entity")]
    TransactionItem,
}

impl Related<super::order_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderLine.def()
    }
}

impl Related<super::order_discount::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderDiscount.def()
    }
}

impl Related<super::transaction_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TransactionItem.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {}
