use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One gateway attempt for a legacy payment. The latest successful
/// transaction of a given kind is authoritative.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payment_transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub payment_id: Uuid,

    /// "auth", "capture", "refund", "void", "confirm", "action_to_confirm"
    /// or "external".
    pub kind: String,

    /// Gateway-issued token identifying the remote transaction.
    pub token: String,

    pub amount: Decimal,
    pub currency: String,

    pub is_success: bool,
    pub action_required: bool,

    /// Set when a retried gateway response matched an existing record
    /// instead of creating a new one.
    pub already_processed: bool,

    pub error: Option<String>,
    #[sea_orm(column_type = "Json", nullable)]
    pub gateway_response: Option<Json>,

    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::payment::Entity",
        from = "Column::PaymentId",
        to = "super::payment::Column::Id"
    )]
    Payment,
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payment.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {}
