use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Legacy gateway payment: one per order, mutated only under a row lock.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub order_id: Uuid,

    /// Extension identifier, e.g. "gateway.dummy"; "manual" payments never
    /// reach a gateway.
    pub gateway: String,
    pub channel_slug: String,

    pub is_active: bool,
    pub to_confirm: bool,

    /// "not_charged", "partially_charged", "fully_charged",
    /// "partially_refunded", "fully_refunded".
    pub charge_status: String,

    pub total: Decimal,
    pub captured_amount: Decimal,
    pub currency: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
    #[sea_orm(has_many = "super::payment_transaction::Entity")]
    PaymentTransaction,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl Related<super::payment_transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PaymentTransaction.def()
    }
}

impl Model {
    pub fn is_manual(&self) -> bool {
        self.gateway == "manual"
    }

    /// Amount still available for capture.
    pub fn uncaptured_amount(&self) -> Decimal {
        self.total - self.captured_amount
    }

    pub fn can_refund(&self) -> bool {
        self.captured_amount > Decimal::ZERO
    }

    pub fn can_void(&self) -> bool {
        self.is_active && self.captured_amount == Decimal::ZERO
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {}
