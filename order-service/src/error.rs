use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("product {0} not found")]
    ProductNotFound(Uuid),

    #[error("user {0} not found")]
    UserNotFound(Uuid),

    #[error("quantity must be positive, got {0}")]
    InvalidQuantity(i32),

    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error("gave up reserving product {product_id} after {attempts} version conflicts")]
    Contention { product_id: Uuid, attempts: u32 },

    #[error("a request with idempotency key {0} is already in flight")]
    InFlight(String),

    #[error("failed to journal order: {0}")]
    Durability(anyhow::Error),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl OrderError {
    /// Whether the caller may safely retry with the same idempotency key.
    pub fn is_retryable(&self) -> bool {
        matches!(self, OrderError::Contention { .. } | OrderError::InFlight(_))
    }
}
