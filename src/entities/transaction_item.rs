use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single transaction attached to an order or a checkout (exactly one of
/// the two). The amount columns are derived from the event log; events with
/// `include_in_calculations` unset are pending-side bookkeeping only.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transaction_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub order_id: Option<Uuid>,
    pub checkout_id: Option<Uuid>,

    pub name: Option<String>,
    pub app_identifier: String,
    pub psp_reference: Option<String>,

    /// Client-supplied (or generated) token; unique per source object.
    pub idempotency_key: String,

    pub currency: String,
    pub authorized_value: Decimal,
    pub charged_value: Decimal,
    pub refunded_value: Decimal,
    pub canceled_value: Decimal,
    pub authorize_pending_value: Decimal,
    pub charge_pending_value: Decimal,
    pub refund_pending_value: Decimal,
    pub cancel_pending_value: Decimal,

    pub created_at: DateTime<Utc>,
    pub modified_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
    #[sea_orm(
        belongs_to = "super::checkout::Entity",
        from = "Column::CheckoutId",
        to = "super::checkout::Column::Id"
    )]
    Checkout,
    #[sea_orm(has_many = "super::transaction_event::Entity")]
    TransactionEvent,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl Related<super::checkout::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Checkout.def()
    }
}

impl Related<super::transaction_event::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TransactionEvent.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {}
