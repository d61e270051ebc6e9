use chrono::Utc;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::auth::new_id;

// 2026-03-02 is a Monday; the fixture salon is closed on Sundays.
pub const MONDAY: &str = "2026-03-02";
pub const SUNDAY: &str = "2026-03-08";

pub struct Fixture {
    pub salon_id: String,
    pub staff_id: String,
    pub service_id: String,
    pub client_id: String,
    pub price_cents: i64,
}

/// In-memory pool with the schema applied. Single connection so every
/// query sees the same database.
pub async fn pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    crate::db::run_migrations(&pool).await.expect("migrations");
    pool
}

/// One salon open 09:00-18:00 Monday-Saturday, one stylist, one
/// 60-minute service at 45.00, one client account.
pub async fn seed(pool: &SqlitePool) -> Fixture {
    let now = Utc::now().to_rfc3339();
    let owner_id = insert_user(pool, "owner", "owner").await;
    let client_id = insert_user(pool, "client1", "client").await;

    let salon_id = new_id();
    sqlx::query(
        "INSERT INTO salons (id, owner_id, name, rating, review_count, created_at) VALUES (?, ?, ?, 0, 0, ?)",
    )
    .bind(&salon_id)
    .bind(&owner_id)
    .bind("Test Salon")
    .bind(&now)
    .execute(pool)
    .await
    .unwrap();

    for weekday in 0..7i64 {
        sqlx::query(
            "INSERT INTO salon_hours (salon_id, weekday, opens_at, closes_at, closed) VALUES (?, ?, '09:00', '18:00', ?)",
        )
        .bind(&salon_id)
        .bind(weekday)
        .bind(if weekday == 6 { 1i64 } else { 0i64 })
        .execute(pool)
        .await
        .unwrap();
    }

    let staff_id = new_id();
    sqlx::query(
        "INSERT INTO staff (id, salon_id, name, specialties, rating, review_count) VALUES (?, ?, ?, '[]', 0, 0)",
    )
    .bind(&staff_id)
    .bind(&salon_id)
    .bind("Test Stylist")
    .execute(pool)
    .await
    .unwrap();

    let service_id = new_id();
    let price_cents = 4500i64;
    sqlx::query(
        "INSERT INTO services (id, salon_id, name, price_cents, duration_minutes) VALUES (?, ?, ?, ?, 60)",
    )
    .bind(&service_id)
    .bind(&salon_id)
    .bind("Test Cut")
    .bind(price_cents)
    .execute(pool)
    .await
    .unwrap();

    Fixture {
        salon_id,
        staff_id,
        service_id,
        client_id,
        price_cents,
    }
}

pub struct SecondSalon {
    pub salon_id: String,
    pub staff_id: String,
    pub service_id: String,
}

/// A second salon whose staff/service must never satisfy bookings
/// against the first one.
pub async fn seed_second_salon(pool: &SqlitePool) -> SecondSalon {
    let now = Utc::now().to_rfc3339();
    let owner_id = insert_user(pool, "owner2", "owner").await;

    let salon_id = new_id();
    sqlx::query(
        "INSERT INTO salons (id, owner_id, name, rating, review_count, created_at) VALUES (?, ?, ?, 0, 0, ?)",
    )
    .bind(&salon_id)
    .bind(&owner_id)
    .bind("Other Salon")
    .bind(&now)
    .execute(pool)
    .await
    .unwrap();

    let staff_id = new_id();
    sqlx::query(
        "INSERT INTO staff (id, salon_id, name, specialties, rating, review_count) VALUES (?, ?, ?, '[]', 0, 0)",
    )
    .bind(&staff_id)
    .bind(&salon_id)
    .bind("Other Stylist")
    .execute(pool)
    .await
    .unwrap();

    let service_id = new_id();
    sqlx::query(
        "INSERT INTO services (id, salon_id, name, price_cents, duration_minutes) VALUES (?, ?, ?, 3000, 30)",
    )
    .bind(&service_id)
    .bind(&salon_id)
    .bind("Other Service")
    .execute(pool)
    .await
    .unwrap();

    SecondSalon {
        salon_id,
        staff_id,
        service_id,
    }
}

async fn insert_user(pool: &SqlitePool, username: &str, role: &str) -> String {
    let id = new_id();
    sqlx::query(
        "INSERT INTO users (id, username, display_name, role, password_hash, active, created_at) VALUES (?, ?, ?, ?, 'x', 1, ?)",
    )
    .bind(&id)
    .bind(username)
    .bind(username)
    .bind(role)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await
    .unwrap();
    id
}

pub async fn insert_appointment(
    pool: &SqlitePool,
    fx: &Fixture,
    date: &str,
    start: &str,
    end: &str,
    status: &str,
) -> String {
    let id = new_id();
    sqlx::query(
        r#"INSERT INTO appointments
           (id, salon_id, service_id, staff_id, client_id, date, start_time, end_time,
            price_cents, duration_minutes, status, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 60, ?, ?)"#,
    )
    .bind(&id)
    .bind(&fx.salon_id)
    .bind(&fx.service_id)
    .bind(&fx.staff_id)
    .bind(&fx.client_id)
    .bind(date)
    .bind(start)
    .bind(end)
    .bind(fx.price_cents)
    .bind(status)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await
    .unwrap();
    id
}

/// Legacy-style review with no linked appointment, for aggregate tests.
pub async fn insert_review(pool: &SqlitePool, fx: &Fixture, rating: i64) -> String {
    let id = new_id();
    sqlx::query(
        r#"INSERT INTO reviews (id, appointment_id, client_id, salon_id, staff_id, rating, comment, deleted, created_at)
           VALUES (?, NULL, ?, ?, ?, ?, '', 0, ?)"#,
    )
    .bind(&id)
    .bind(&fx.client_id)
    .bind(&fx.salon_id)
    .bind(&fx.staff_id)
    .bind(rating)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await
    .unwrap();
    id
}
