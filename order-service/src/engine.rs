use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::debug;
use uuid::Uuid;

use crate::error::OrderError;
use crate::store::StockLedger;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base: Duration::from_millis(10),
            backoff_cap: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self, lost_attempts: u32) -> Duration {
        let exp = self
            .backoff_base
            .saturating_mul(1u32 << lost_attempts.min(16));
        let jitter_ms = {
            let mut rng = rand::thread_rng();
            rng.gen_range(0..=self.backoff_base.as_millis() as u64)
        };
        exp.min(self.backoff_cap) + Duration::from_millis(jitter_ms)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Reservation {
    pub product_id: Uuid,
    pub quantity: i32,
    pub remaining: i32,
    pub version: i64,
}

pub struct ReservationEngine<S> {
    ledger: Arc<S>,
    policy: RetryPolicy,
}

impl<S: StockLedger> ReservationEngine<S> {
    pub fn new(ledger: Arc<S>, policy: RetryPolicy) -> Self {
        Self { ledger, policy }
    }

    /// Atomically test-and-decrement stock for one product.
    ///
    /// Ties between concurrent reservations are broken first-committer-wins:
    /// whoever lands the conditional write first keeps the stock, and the
    /// loser re-evaluates against the new quantity. Version races below the
    /// retry bound are absorbed here and never surface to the caller.
    pub async fn reserve(
        &self,
        marker_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<Reservation, OrderError> {
        let mut attempt = 0;

        loop {
            let stock = self
                .ledger
                .product_stock(product_id)
                .await?
                .ok_or(OrderError::ProductNotFound(product_id))?;

            if stock.quantity_on_hand < quantity {
                return Err(OrderError::InsufficientStock {
                    product_id,
                    requested: quantity,
                    available: stock.quantity_on_hand,
                });
            }

            if self
                .ledger
                .apply_decrement(marker_id, product_id, quantity, stock.version)
                .await?
            {
                return Ok(Reservation {
                    product_id,
                    quantity,
                    remaining: stock.quantity_on_hand - quantity,
                    version: stock.version + 1,
                });
            }

            attempt += 1;
            if attempt >= self.policy.max_attempts {
                return Err(OrderError::Contention {
                    product_id,
                    attempts: attempt,
                });
            }

            debug!(
                "Lost version race on product {} (attempt {}), backing off",
                product_id, attempt
            );
            tokio::time::sleep(self.policy.backoff(attempt - 1)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff_base: Duration::from_micros(100),
            backoff_cap: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn reserve_decrements_and_bumps_version() {
        let store = Arc::new(MemoryStore::new());
        let product_id = Uuid::new_v4();
        store.insert_product(product_id, "widget", 10).await;

        let engine = ReservationEngine::new(store.clone(), fast_policy(3));
        let reservation = engine
            .reserve(Uuid::new_v4(), product_id, 4)
            .await
            .unwrap();

        assert_eq!(reservation.remaining, 6);
        assert_eq!(reservation.version, 1);

        use crate::store::StockLedger;
        let stock = store.product_stock(product_id).await.unwrap().unwrap();
        assert_eq!(stock.quantity_on_hand, 6);
        assert_eq!(stock.version, 1);
    }

    #[tokio::test]
    async fn unknown_product_is_not_retried() {
        let store = Arc::new(MemoryStore::new());
        let engine = ReservationEngine::new(store, fast_policy(3));

        let err = engine
            .reserve(Uuid::new_v4(), Uuid::new_v4(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::ProductNotFound(_)));
    }

    #[tokio::test]
    async fn insufficient_stock_reports_available() {
        let store = Arc::new(MemoryStore::new());
        let product_id = Uuid::new_v4();
        store.insert_product(product_id, "widget", 3).await;

        let engine = ReservationEngine::new(store, fast_policy(3));
        let err = engine
            .reserve(Uuid::new_v4(), product_id, 5)
            .await
            .unwrap_err();

        match err {
            OrderError::InsufficientStock {
                requested,
                available,
                ..
            } => {
                assert_eq!(requested, 5);
                assert_eq!(available, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn version_races_below_the_bound_are_absorbed() {
        let store = Arc::new(MemoryStore::new());
        let product_id = Uuid::new_v4();
        store.insert_product(product_id, "widget", 10).await;
        store.set_conflict_faults(2).await;

        let engine = ReservationEngine::new(store.clone(), fast_policy(5));
        let reservation = engine
            .reserve(Uuid::new_v4(), product_id, 1)
            .await
            .unwrap();
        assert_eq!(reservation.remaining, 9);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_as_contention_without_stock_change() {
        let store = Arc::new(MemoryStore::new());
        let product_id = Uuid::new_v4();
        store.insert_product(product_id, "widget", 10).await;
        store.set_conflict_faults(10).await;

        let engine = ReservationEngine::new(store.clone(), fast_policy(3));
        let err = engine
            .reserve(Uuid::new_v4(), product_id, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::Contention { attempts: 3, .. }));

        use crate::store::StockLedger;
        let stock = store.product_stock(product_id).await.unwrap().unwrap();
        assert_eq!(stock.quantity_on_hand, 10);
        assert_eq!(stock.version, 0);
    }
}
