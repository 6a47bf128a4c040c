use sea_orm::sea_query::Index;
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use sea_orm::{ConnectionTrait, Schema};
use std::time::Duration;
use tracing::info;

use crate::config::AppConfig;
use crate::entities;

pub type DbPool = DatabaseConnection;

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
}

impl DbConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            url: config.database_url.clone(),
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            connect_timeout: Duration::from_secs(config.db_connect_timeout_secs),
        }
    }
}

pub async fn establish_connection(database_url: &str) -> Result<DbPool, DbErr> {
    establish_connection_with_config(DbConfig {
        url: database_url.to_string(),
        max_connections: 100,
        min_connections: 5,
        connect_timeout: Duration::from_secs(10),
    })
    .await
}

pub async fn establish_connection_with_config(config: DbConfig) -> Result<DbPool, DbErr> {
    let mut options = ConnectOptions::new(config.url);
    options
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .sqlx_logging(false);

    let pool = Database::connect(options).await?;
    info!("database connection established");
    Ok(pool)
}

/// Creates every table from the entity definitions. Used by the test
/// harness and by development deployments with `auto_migrate` enabled.
pub async fn setup_schema(db: &DbPool) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    macro_rules! create_table {
        ($entity:path) => {
            let mut stmt = schema.create_table_from_entity($entity);
            stmt.if_not_exists();
            db.execute(backend.build(&stmt)).await?;
        };
    }

    create_table!(entities::order::Entity);
    create_table!(entities::order_line::Entity);
    create_table!(entities::order_discount::Entity);
    create_table!(entities::checkout::Entity);
    create_table!(entities::payment::Entity);
    create_table!(entities::payment_transaction::Entity);
    create_table!(entities::transaction_item::Entity);
    create_table!(entities::transaction_event::Entity);
    create_table!(entities::media_asset::Entity);
    create_table!(entities::thumbnail::Entity);

    // Idempotency keys are unique per source object; NULL source columns
    // never collide, so each index only binds its own source type.
    let mut order_key = Index::create();
    order_key
        .name("ux_transaction_items_order_idempotency_key")
        .table(entities::transaction_item::Entity)
        .col(entities::transaction_item::Column::OrderId)
        .col(entities::transaction_item::Column::IdempotencyKey)
        .unique()
        .if_not_exists();
    db.execute(backend.build(&order_key)).await?;

    let mut checkout_key = Index::create();
    checkout_key
        .name("ux_transaction_items_checkout_idempotency_key")
        .table(entities::transaction_item::Entity)
        .col(entities::transaction_item::Column::CheckoutId)
        .col(entities::transaction_item::Column::IdempotencyKey)
        .unique()
        .if_not_exists();
    db.execute(backend.build(&checkout_key)).await?;

    info!("schema setup complete");
    Ok(())
}
