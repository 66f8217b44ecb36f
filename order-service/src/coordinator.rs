use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::{ReservationEngine, RetryPolicy};
use crate::error::OrderError;
use crate::models::{NewOrder, Order, OrderStatus, PendingReservation, ReservationStage};
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub idempotency_key: String,
}

/// Sequences one order request: idempotency lookup, pending marker, engine
/// reservation, journal append. Rejections are journaled too, so a retried
/// key always replays the original decision.
pub struct OrderCoordinator<S> {
    store: Arc<S>,
    engine: ReservationEngine<S>,
}

impl<S: Store> OrderCoordinator<S> {
    pub fn new(store: Arc<S>, policy: RetryPolicy) -> Self {
        Self {
            engine: ReservationEngine::new(store.clone(), policy),
            store,
        }
    }

    pub async fn place_order(&self, request: PlaceOrder) -> Result<Order, OrderError> {
        if request.quantity <= 0 {
            return Err(OrderError::InvalidQuantity(request.quantity));
        }

        if let Some(existing) = self
            .store
            .find_by_idempotency_key(&request.idempotency_key)
            .await?
        {
            info!(
                "Replaying journaled order {} for idempotency key {}",
                existing.id, request.idempotency_key
            );
            return Ok(existing);
        }

        if !self.store.user_exists(request.user_id).await? {
            return Err(OrderError::UserNotFound(request.user_id));
        }

        let marker = PendingReservation {
            id: Uuid::new_v4(),
            idempotency_key: request.idempotency_key.clone(),
            user_id: request.user_id,
            product_id: request.product_id,
            quantity: request.quantity,
            stage: ReservationStage::Reserving.as_str().to_string(),
            created_at: Utc::now(),
        };
        let marker_id = marker.id;

        if !self.store.begin(marker).await? {
            // Another request holds this key. It may have finished between
            // our journal lookup and now.
            if let Some(existing) = self
                .store
                .find_by_idempotency_key(&request.idempotency_key)
                .await?
            {
                return Ok(existing);
            }
            return Err(OrderError::InFlight(request.idempotency_key));
        }

        match self
            .engine
            .reserve(marker_id, request.product_id, request.quantity)
            .await
        {
            Ok(reservation) => {
                let record = NewOrder {
                    id: marker_id,
                    user_id: request.user_id,
                    product_id: request.product_id,
                    quantity: request.quantity,
                    status: OrderStatus::Committed.as_str().to_string(),
                    idempotency_key: request.idempotency_key,
                };
                let stored = self
                    .store
                    .append(record)
                    .await
                    .map_err(OrderError::Durability)?;
                self.finish_marker(marker_id).await;
                info!(
                    "Committed order {}: product {} x{}, {} remaining",
                    stored.id, reservation.product_id, reservation.quantity, reservation.remaining
                );
                Ok(stored)
            }
            Err(OrderError::InsufficientStock {
                product_id,
                requested,
                available,
            }) => {
                let record = NewOrder {
                    id: marker_id,
                    user_id: request.user_id,
                    product_id: request.product_id,
                    quantity: request.quantity,
                    status: OrderStatus::Rejected.as_str().to_string(),
                    idempotency_key: request.idempotency_key,
                };
                let stored = self
                    .store
                    .append(record)
                    .await
                    .map_err(OrderError::Durability)?;
                self.finish_marker(marker_id).await;
                info!(
                    "Rejected order {}: product {} has {} on hand, {} requested",
                    stored.id, product_id, available, requested
                );
                Ok(stored)
            }
            Err(err @ (OrderError::ProductNotFound(_) | OrderError::Contention { .. })) => {
                // Nothing was decremented; free the key for a clean retry.
                self.store.clear(marker_id).await?;
                Err(err)
            }
            Err(err) => {
                // Outcome unknown. The marker stage records whether stock was
                // taken; the reconciler settles it either way.
                Err(err)
            }
        }
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, OrderError> {
        Ok(self.store.find(order_id).await?)
    }

    pub async fn list_orders(&self) -> Result<Vec<Order>, OrderError> {
        Ok(self.store.list().await?)
    }

    async fn finish_marker(&self, marker_id: Uuid) {
        // The order is already durable; a failed clear just leaves the
        // marker for the reconciler.
        if let Err(e) = self.store.clear(marker_id).await {
            warn!("Failed to clear reservation marker {}: {}", marker_id, e);
        }
    }
}
