use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{pooled_connection::bb8::Pool, AsyncConnection, AsyncPgConnection, RunQueryDsl};
use shared::models::{Product, User};
use shared::schema::{products, users};
use uuid::Uuid;

use crate::models::{NewOrder, Order, PendingReservation, ReservationStage};
use crate::schema::{orders, pending_reservations};
use crate::store::{OrderJournal, ReservationLog, StockLedger, UserDirectory};

type DbPool = Pool<AsyncPgConnection>;

/// Storage against the shared relational database.
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StockLedger for PgStore {
    async fn product_stock(&self, product_id: Uuid) -> Result<Option<Product>> {
        let mut conn = self.pool.get().await?;

        let product = products::table
            .filter(products::id.eq(product_id))
            .first::<Product>(&mut conn)
            .await
            .optional()?;

        Ok(product)
    }

    async fn apply_decrement(
        &self,
        marker_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        expected_version: i64,
    ) -> Result<bool> {
        let mut conn = self.pool.get().await?;

        let applied = conn
            .transaction::<_, anyhow::Error, _>(|conn| {
                Box::pin(async move {
                    let updated = diesel::update(
                        products::table
                            .filter(products::id.eq(product_id))
                            .filter(products::version.eq(expected_version))
                            .filter(products::quantity_on_hand.ge(quantity)),
                    )
                    .set((
                        products::quantity_on_hand.eq(products::quantity_on_hand - quantity),
                        products::version.eq(products::version + 1),
                    ))
                    .execute(conn)
                    .await?;

                    if updated == 0 {
                        return Ok(false);
                    }

                    diesel::update(
                        pending_reservations::table.filter(pending_reservations::id.eq(marker_id)),
                    )
                    .set(pending_reservations::stage.eq(ReservationStage::Reserved.as_str()))
                    .execute(conn)
                    .await?;

                    Ok(true)
                })
            })
            .await?;

        Ok(applied)
    }
}

#[async_trait]
impl OrderJournal for PgStore {
    async fn append(&self, order: NewOrder) -> Result<Order> {
        let mut conn = self.pool.get().await?;

        diesel::insert_into(orders::table)
            .values(&order)
            .on_conflict(orders::idempotency_key)
            .do_nothing()
            .execute(&mut conn)
            .await?;

        let stored = orders::table
            .filter(orders::idempotency_key.eq(&order.idempotency_key))
            .first::<Order>(&mut conn)
            .await?;

        Ok(stored)
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Order>> {
        let mut conn = self.pool.get().await?;

        let order = orders::table
            .filter(orders::idempotency_key.eq(key))
            .first::<Order>(&mut conn)
            .await
            .optional()?;

        Ok(order)
    }

    async fn find(&self, order_id: Uuid) -> Result<Option<Order>> {
        let mut conn = self.pool.get().await?;

        let order = orders::table
            .filter(orders::id.eq(order_id))
            .first::<Order>(&mut conn)
            .await
            .optional()?;

        Ok(order)
    }

    async fn list(&self) -> Result<Vec<Order>> {
        let mut conn = self.pool.get().await?;

        let all = orders::table
            .order(orders::created_at.asc())
            .load::<Order>(&mut conn)
            .await?;

        Ok(all)
    }
}

#[async_trait]
impl ReservationLog for PgStore {
    async fn begin(&self, marker: PendingReservation) -> Result<bool> {
        let mut conn = self.pool.get().await?;

        let inserted = diesel::insert_into(pending_reservations::table)
            .values(&marker)
            .on_conflict(pending_reservations::idempotency_key)
            .do_nothing()
            .execute(&mut conn)
            .await?;

        Ok(inserted > 0)
    }

    async fn stale(&self, older_than: chrono::Duration) -> Result<Vec<PendingReservation>> {
        let mut conn = self.pool.get().await?;

        let cutoff = Utc::now() - older_than;
        let markers = pending_reservations::table
            .filter(pending_reservations::created_at.lt(cutoff))
            .order(pending_reservations::created_at.asc())
            .load::<PendingReservation>(&mut conn)
            .await?;

        Ok(markers)
    }

    async fn clear(&self, marker_id: Uuid) -> Result<()> {
        let mut conn = self.pool.get().await?;

        diesel::delete(pending_reservations::table.filter(pending_reservations::id.eq(marker_id)))
            .execute(&mut conn)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn user_exists(&self, user_id: Uuid) -> Result<bool> {
        let mut conn = self.pool.get().await?;

        let user = users::table
            .filter(users::id.eq(user_id))
            .first::<User>(&mut conn)
            .await
            .optional()?;

        Ok(user.is_some())
    }
}
