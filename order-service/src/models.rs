use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::orders)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub status: String,
    pub idempotency_key: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn is_committed(&self) -> bool {
        self.status == OrderStatus::Committed.as_str()
    }

    pub fn is_rejected(&self) -> bool {
        self.status == OrderStatus::Rejected.as_str()
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::orders)]
pub struct NewOrder {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub status: String,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Committed,
    Rejected,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Committed => "committed",
            OrderStatus::Rejected => "rejected",
        }
    }
}

// One row per in-flight reservation. The row id becomes the order id, so a
// crash-interrupted reservation can be completed under the same identity.
#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::pending_reservations)]
pub struct PendingReservation {
    pub id: Uuid,
    pub idempotency_key: String,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub stage: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationStage {
    Reserving,
    Reserved,
}

impl ReservationStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStage::Reserving => "reserving",
            ReservationStage::Reserved => "reserved",
        }
    }
}
