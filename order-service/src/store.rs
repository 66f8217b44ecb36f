use anyhow::Result;
use async_trait::async_trait;
use shared::models::Product;
use uuid::Uuid;

use crate::models::{NewOrder, Order, PendingReservation};

/// Authoritative quantity-on-hand per product.
#[async_trait]
pub trait StockLedger: Send + Sync {
    async fn product_stock(&self, product_id: Uuid) -> Result<Option<Product>>;

    /// Conditional decrement guarded by the row version. Returns false when
    /// the version no longer matches or the remaining stock is insufficient.
    ///
    /// On success the decrement, the version bump, and the pending marker's
    /// move to the reserved stage land in a single transaction, so the
    /// marker stage is an exact record of whether stock was taken.
    async fn apply_decrement(
        &self,
        marker_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        expected_version: i64,
    ) -> Result<bool>;
}

/// Append-only record of decided orders, unique per idempotency key.
#[async_trait]
pub trait OrderJournal: Send + Sync {
    /// Insert the record unless its idempotency key is already present;
    /// either way, return the stored record for that key.
    async fn append(&self, order: NewOrder) -> Result<Order>;

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Order>>;

    async fn find(&self, order_id: Uuid) -> Result<Option<Order>>;

    async fn list(&self) -> Result<Vec<Order>>;
}

/// Pending-reservation markers bracketing the decrement/journal dual write.
#[async_trait]
pub trait ReservationLog: Send + Sync {
    /// Returns false when a marker with the same idempotency key exists.
    async fn begin(&self, marker: PendingReservation) -> Result<bool>;

    async fn stale(&self, older_than: chrono::Duration) -> Result<Vec<PendingReservation>>;

    async fn clear(&self, marker_id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn user_exists(&self, user_id: Uuid) -> Result<bool>;
}

pub trait Store: StockLedger + OrderJournal + ReservationLog + UserDirectory {}

impl<T: StockLedger + OrderJournal + ReservationLog + UserDirectory> Store for T {}
