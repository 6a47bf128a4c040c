use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only log entry recording one state transition of a transaction.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transaction_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub transaction_id: Uuid,

    /// e.g. "charge_request", "charge_success", "authorization_failure".
    pub event_type: String,
    pub amount_value: Decimal,
    pub currency: String,

    pub psp_reference: Option<String>,
    pub message: Option<String>,
    pub idempotency_key: Option<String>,

    /// Request events are excluded from amount calculations until the
    /// matching response event arrives.
    pub include_in_calculations: bool,

    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::transaction_item::Entity",
        from = "Column::TransactionId",
        to = "super::transaction_item::Column::Id"
    )]
    TransactionItem,
}

impl Related<super::transaction_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TransactionItem.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {}
