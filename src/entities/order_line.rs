use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_lines")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub order_id: Uuid,

    /// Position within the order, starting at 1. Discount allocation and
    /// listing order both follow it; timestamps alone cannot break ties
    /// for lines created in one request.
    pub line_number: i32,

    pub product_name: String,
    pub sku: Option<String>,
    pub quantity: i32,
    pub currency: String,

    /// Unit price before any order-level discount lands on the line.
    pub base_unit_price: Decimal,

    pub unit_price_net: Decimal,
    pub unit_price_gross: Decimal,
    pub total_price_net: Decimal,
    pub total_price_gross: Decimal,

    /// Per-unit slice of the order-level discount allocated to this line.
    pub unit_discount_amount: Decimal,

    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl Model {
    /// Line total before discounts.
    pub fn undiscounted_total(&self) -> Decimal {
        self.base_unit_price * Decimal::from(self.quantity)
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {}
