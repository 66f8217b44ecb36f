diesel::table! {
    orders (id) {
        id -> Uuid,
        user_id -> Uuid,
        product_id -> Uuid,
        quantity -> Int4,
        status -> Varchar,
        idempotency_key -> Varchar,
        created_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    pending_reservations (id) {
        id -> Uuid,
        idempotency_key -> Varchar,
        user_id -> Uuid,
        product_id -> Uuid,
        quantity -> Int4,
        stage -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(orders, pending_reservations);
