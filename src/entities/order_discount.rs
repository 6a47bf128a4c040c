use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A voucher or staff-applied discount attached to an order.
///
/// `amount_value` holds the realized monetary amount and is written only by
/// order recalculation.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_discounts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub order_id: Uuid,

    /// "voucher" or "manual".
    pub discount_type: String,
    /// "fixed" or "percentage".
    pub value_type: String,
    pub value: Decimal,

    /// Voucher-only: "entire_order" or "shipping".
    pub voucher_scope: Option<String>,
    pub voucher_code: Option<String>,

    pub name: Option<String>,
    pub currency: String,
    pub amount_value: Decimal,

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

#[async_trait]
impl ActiveModelBehavior for ActiveModel {}
