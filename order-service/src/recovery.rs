use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tracing::{error, info, warn};

use crate::error::OrderError;
use crate::models::{NewOrder, OrderStatus, ReservationStage};
use crate::store::{OrderJournal, ReservationLog};

/// Settles reservations interrupted between the stock decrement and the
/// journal append. A marker that reached the reserved stage means stock was
/// taken, so the matching order is appended (idempotent by key) before the
/// marker is dropped; a marker still in the reserving stage means no stock
/// moved and the key is simply freed.
pub struct Reconciler<S> {
    store: Arc<S>,
    stale_after: chrono::Duration,
}

impl<S: OrderJournal + ReservationLog> Reconciler<S> {
    pub fn new(store: Arc<S>, stale_after_secs: i64) -> Self {
        Self {
            store,
            stale_after: chrono::Duration::seconds(stale_after_secs),
        }
    }

    pub async fn run(&self, interval: Duration) {
        let mut ticker = time::interval(interval);

        loop {
            ticker.tick().await;

            if let Err(e) = self.sweep().await {
                error!("Reconciliation sweep failed: {}", e);
            }
        }
    }

    /// Returns the number of interrupted reservations completed into the
    /// journal.
    pub async fn sweep(&self) -> Result<usize, OrderError> {
        let markers = self.store.stale(self.stale_after).await?;
        let mut recovered = 0;

        for marker in markers {
            match marker.stage.as_str() {
                s if s == ReservationStage::Reserved.as_str() => {
                    let record = NewOrder {
                        id: marker.id,
                        user_id: marker.user_id,
                        product_id: marker.product_id,
                        quantity: marker.quantity,
                        status: OrderStatus::Committed.as_str().to_string(),
                        idempotency_key: marker.idempotency_key,
                    };
                    self.store
                        .append(record)
                        .await
                        .map_err(OrderError::Durability)?;
                    self.store.clear(marker.id).await?;
                    info!("Completed interrupted reservation as order {}", marker.id);
                    recovered += 1;
                }
                s if s == ReservationStage::Reserving.as_str() => {
                    self.store.clear(marker.id).await?;
                    info!(
                        "Dropped interrupted reservation attempt for key {}",
                        marker.idempotency_key
                    );
                }
                other => {
                    warn!(
                        "Skipping pending reservation {} with unknown stage {:?}",
                        marker.id, other
                    );
                }
            }
        }

        Ok(recovered)
    }
}
