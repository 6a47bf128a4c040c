use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::DbPool;
use crate::errors::ServiceError;

/// Domain events emitted by the services. Handlers run on a dedicated task
/// so request paths never block on side effects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    OrderCreated { order_id: Uuid },
    OrderLineAdded { order_id: Uuid, line_id: Uuid },
    /// Asks the background worker to rerun discount recalculation.
    OrderRepricingRequested { order_id: Uuid },
    OrderDiscountsRecalculated { order_id: Uuid },
    PaymentAuthorized { payment_id: Uuid },
    PaymentCaptured { payment_id: Uuid },
    PaymentRefunded { payment_id: Uuid },
    PaymentVoided { payment_id: Uuid },
    TransactionItemCreated { transaction_id: Uuid },
    ThumbnailCreated { thumbnail_id: Uuid },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, event: Event) -> Result<(), ServiceError> {
        self.sender
            .send(event)
            .await
            .map_err(|e| ServiceError::EventError(format!("Failed to send event: {}", e)))
    }
}

pub fn event_channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

/// Drains the event channel until all senders are dropped.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>, db: Arc<DbPool>) {
    info!("event processor started");
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderRepricingRequested { order_id } => {
                let service = crate::services::orders::OrderService::new(db.clone(), None);
                if let Err(e) = service.recalculate(*order_id).await {
                    error!(error = %e, order_id = %order_id, "background repricing failed");
                }
            }
            Event::OrderCreated { order_id } => {
                info!(order_id = %order_id, "order created");
            }
            other => {
                info!(event = ?other, "event processed");
            }
        }
    }
    warn!("event channel closed, processor exiting");
}
