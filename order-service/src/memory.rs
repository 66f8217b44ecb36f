use std::collections::{HashMap, HashSet};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use shared::models::Product;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{NewOrder, Order, PendingReservation, ReservationStage};
use crate::store::{OrderJournal, ReservationLog, StockLedger, UserDirectory};

#[derive(Default)]
struct MemState {
    users: HashSet<Uuid>,
    products: HashMap<Uuid, Product>,
    orders: Vec<Order>,
    markers: HashMap<Uuid, PendingReservation>,
    conflict_faults: u32,
}

/// In-memory store with the same atomicity contract as the postgres store:
/// every mutation happens under one write lock, so a decrement and its
/// marker-stage flip are indivisible. Backs the concurrency and recovery
/// test suites; the fault knobs simulate lost version races.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user_id: Uuid) {
        self.state.write().await.users.insert(user_id);
    }

    pub async fn insert_product(&self, product_id: Uuid, name: &str, quantity_on_hand: i32) {
        let product = Product {
            id: product_id,
            name: name.to_string(),
            quantity_on_hand,
            version: 0,
            created_at: Some(Utc::now()),
            updated_at: None,
        };
        self.state.write().await.products.insert(product_id, product);
    }

    /// The next `n` conditional decrements report a lost version race.
    pub async fn set_conflict_faults(&self, n: u32) {
        self.state.write().await.conflict_faults = n;
    }

    /// Ages a pending marker so recovery sweeps treat it as stale.
    pub async fn backdate_pending(&self, marker_id: Uuid, seconds: i64) {
        let mut state = self.state.write().await;
        if let Some(marker) = state.markers.get_mut(&marker_id) {
            marker.created_at = marker.created_at - chrono::Duration::seconds(seconds);
        }
    }

    pub async fn pending_count(&self) -> usize {
        self.state.read().await.markers.len()
    }
}

#[async_trait]
impl StockLedger for MemoryStore {
    async fn product_stock(&self, product_id: Uuid) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(&product_id).cloned())
    }

    async fn apply_decrement(
        &self,
        marker_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        expected_version: i64,
    ) -> Result<bool> {
        let mut state = self.state.write().await;

        if state.conflict_faults > 0 {
            state.conflict_faults -= 1;
            return Ok(false);
        }

        let applied = match state.products.get_mut(&product_id) {
            Some(product)
                if product.version == expected_version
                    && product.quantity_on_hand >= quantity =>
            {
                product.quantity_on_hand -= quantity;
                product.version += 1;
                true
            }
            _ => false,
        };

        if applied {
            if let Some(marker) = state.markers.get_mut(&marker_id) {
                marker.stage = ReservationStage::Reserved.as_str().to_string();
            }
        }

        Ok(applied)
    }
}

#[async_trait]
impl OrderJournal for MemoryStore {
    async fn append(&self, order: NewOrder) -> Result<Order> {
        let mut state = self.state.write().await;

        if let Some(existing) = state
            .orders
            .iter()
            .find(|o| o.idempotency_key == order.idempotency_key)
        {
            return Ok(existing.clone());
        }

        let stored = Order {
            id: order.id,
            user_id: order.user_id,
            product_id: order.product_id,
            quantity: order.quantity,
            status: order.status,
            idempotency_key: order.idempotency_key,
            created_at: Some(Utc::now()),
        };
        state.orders.push(stored.clone());
        Ok(stored)
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Order>> {
        Ok(self
            .state
            .read()
            .await
            .orders
            .iter()
            .find(|o| o.idempotency_key == key)
            .cloned())
    }

    async fn find(&self, order_id: Uuid) -> Result<Option<Order>> {
        Ok(self
            .state
            .read()
            .await
            .orders
            .iter()
            .find(|o| o.id == order_id)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Order>> {
        Ok(self.state.read().await.orders.clone())
    }
}

#[async_trait]
impl ReservationLog for MemoryStore {
    async fn begin(&self, marker: PendingReservation) -> Result<bool> {
        let mut state = self.state.write().await;

        if state
            .markers
            .values()
            .any(|m| m.idempotency_key == marker.idempotency_key)
        {
            return Ok(false);
        }

        state.markers.insert(marker.id, marker);
        Ok(true)
    }

    async fn stale(&self, older_than: chrono::Duration) -> Result<Vec<PendingReservation>> {
        let cutoff = Utc::now() - older_than;
        let mut stale: Vec<PendingReservation> = self
            .state
            .read()
            .await
            .markers
            .values()
            .filter(|m| m.created_at < cutoff)
            .cloned()
            .collect();
        stale.sort_by_key(|m| m.created_at);
        Ok(stale)
    }

    async fn clear(&self, marker_id: Uuid) -> Result<()> {
        self.state.write().await.markers.remove(&marker_id);
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn user_exists(&self, user_id: Uuid) -> Result<bool> {
        Ok(self.state.read().await.users.contains(&user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderStatus;

    fn order(key: &str) -> NewOrder {
        NewOrder {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            quantity: 1,
            status: OrderStatus::Committed.as_str().to_string(),
            idempotency_key: key.to_string(),
        }
    }

    #[tokio::test]
    async fn decrement_requires_matching_version() {
        let store = MemoryStore::new();
        let product_id = Uuid::new_v4();
        store.insert_product(product_id, "widget", 5).await;

        assert!(!store
            .apply_decrement(Uuid::new_v4(), product_id, 1, 7)
            .await
            .unwrap());
        assert!(store
            .apply_decrement(Uuid::new_v4(), product_id, 1, 0)
            .await
            .unwrap());

        let stock = store.product_stock(product_id).await.unwrap().unwrap();
        assert_eq!(stock.quantity_on_hand, 4);
        assert_eq!(stock.version, 1);
    }

    #[tokio::test]
    async fn decrement_never_oversells() {
        let store = MemoryStore::new();
        let product_id = Uuid::new_v4();
        store.insert_product(product_id, "widget", 2).await;

        assert!(!store
            .apply_decrement(Uuid::new_v4(), product_id, 3, 0)
            .await
            .unwrap());

        let stock = store.product_stock(product_id).await.unwrap().unwrap();
        assert_eq!(stock.quantity_on_hand, 2);
    }

    #[tokio::test]
    async fn append_returns_existing_record_for_duplicate_key() {
        let store = MemoryStore::new();

        let first = store.append(order("key-1")).await.unwrap();
        let second = store.append(order("key-1")).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn begin_rejects_duplicate_idempotency_key() {
        let store = MemoryStore::new();
        let marker = PendingReservation {
            id: Uuid::new_v4(),
            idempotency_key: "key-1".to_string(),
            user_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            quantity: 1,
            stage: ReservationStage::Reserving.as_str().to_string(),
            created_at: Utc::now(),
        };

        assert!(store.begin(marker.clone()).await.unwrap());
        let duplicate = PendingReservation {
            id: Uuid::new_v4(),
            ..marker
        };
        assert!(!store.begin(duplicate).await.unwrap());
    }
}
