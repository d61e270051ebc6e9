use std::{env, fs, path::Path};

use chrono::Utc;
use sqlx::SqlitePool;

use crate::{
    auth::{hash_password, new_id},
    error::CoreError,
    models::{AppointmentRow, AppointmentStatus, ROLE_OWNER, ROLE_STAFF},
};

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

pub fn ensure_sqlite_dir(db_url: &str) -> std::io::Result<()> {
    let path = if let Some(path) = db_url.strip_prefix("sqlite://") {
        Some(path)
    } else if let Some(path) = db_url.strip_prefix("sqlite:") {
        Some(path)
    } else {
        None
    };

    let Some(path) = path else {
        return Ok(());
    };

    let path = path.split('?').next().unwrap_or(path);
    if path == ":memory:" || path.is_empty() {
        return Ok(());
    }

    let path = path.strip_prefix("file:").unwrap_or(path);
    let db_path = Path::new(path);
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub async fn fetch_appointment(
    pool: &SqlitePool,
    appointment_id: &str,
) -> Result<AppointmentRow, CoreError> {
    sqlx::query_as::<_, AppointmentRow>("SELECT * FROM appointments WHERE id = ? LIMIT 1")
        .bind(appointment_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| CoreError::NotFound {
            entity: "appointment",
            id: appointment_id.to_string(),
        })
}

/// Appends one record to the audit trail. The trail is part of the
/// lifecycle contract, so failures propagate to the caller.
pub async fn record_transition(
    pool: &SqlitePool,
    appointment_id: &str,
    from: Option<AppointmentStatus>,
    to: AppointmentStatus,
    actor: &str,
    note: Option<&str>,
) -> Result<(), CoreError> {
    sqlx::query(
        r#"INSERT INTO appointment_transitions (id, appointment_id, from_status, to_status, actor, note, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(new_id())
    .bind(appointment_id)
    .bind(from.map(AppointmentStatus::as_str))
    .bind(to.as_str())
    .bind(actor)
    .bind(note)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn seed_defaults(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    seed_owner(pool).await?;
    seed_demo_salon(pool).await?;
    Ok(())
}

async fn seed_owner(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let existing =
        sqlx::query_as::<_, (String,)>("SELECT id FROM users WHERE role = ? LIMIT 1")
            .bind(ROLE_OWNER)
            .fetch_optional(pool)
            .await?;

    if existing.is_some() {
        return Ok(());
    }

    let username = env::var("OWNER_USER").unwrap_or_else(|_| "owner".to_string());
    let password = env::var("OWNER_PASSWORD").unwrap_or_else(|_| "owner".to_string());
    let display_name =
        env::var("OWNER_DISPLAY_NAME").unwrap_or_else(|_| "Salon Owner".to_string());

    if password == "owner" {
        log::warn!("OWNER_PASSWORD not set. Using default password 'owner'. Set OWNER_PASSWORD in production.");
    }

    let password_hash = hash_password(&password)
        .map_err(|_| sqlx::Error::Protocol("password hash failed".into()))?;
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"INSERT INTO users (id, username, display_name, role, password_hash, active, created_at)
           VALUES (?, ?, ?, ?, ?, 1, ?)"#,
    )
    .bind(new_id())
    .bind(username)
    .bind(display_name)
    .bind(ROLE_OWNER)
    .bind(password_hash)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

async fn seed_demo_salon(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let demo_seed = env::var("SEED_DEMO").unwrap_or_else(|_| "false".to_string());
    if demo_seed != "true" {
        return Ok(());
    }

    let existing = sqlx::query_as::<_, (String,)>("SELECT id FROM salons LIMIT 1")
        .fetch_optional(pool)
        .await?;
    if existing.is_some() {
        return Ok(());
    }

    let owner = sqlx::query_as::<_, (String,)>("SELECT id FROM users WHERE role = ? LIMIT 1")
        .bind(ROLE_OWNER)
        .fetch_optional(pool)
        .await?;
    let Some((owner_id,)) = owner else {
        return Ok(());
    };

    let now = Utc::now().to_rfc3339();
    let salon_id = new_id();

    sqlx::query(
        r#"INSERT INTO salons (id, owner_id, name, rating, review_count, created_at)
           VALUES (?, ?, ?, 0, 0, ?)"#,
    )
    .bind(&salon_id)
    .bind(&owner_id)
    .bind("Studio Luma")
    .bind(&now)
    .execute(pool)
    .await?;

    // Open Monday through Saturday, closed Sunday.
    for weekday in 0..7i64 {
        sqlx::query(
            r#"INSERT INTO salon_hours (salon_id, weekday, opens_at, closes_at, closed)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(&salon_id)
        .bind(weekday)
        .bind("09:00")
        .bind("18:00")
        .bind(if weekday == 6 { 1i64 } else { 0i64 })
        .execute(pool)
        .await?;
    }

    let services = [
        ("Signature Cut", 4500i64, 45i64),
        ("Color & Gloss", 12000, 90),
        ("Blowout", 3500, 30),
    ];
    for (name, price_cents, duration_minutes) in services {
        sqlx::query(
            r#"INSERT INTO services (id, salon_id, name, price_cents, duration_minutes)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(new_id())
        .bind(&salon_id)
        .bind(name)
        .bind(price_cents)
        .bind(duration_minutes)
        .execute(pool)
        .await?;
    }

    let stylist_id = new_id();
    sqlx::query(
        r#"INSERT INTO staff (id, salon_id, name, specialties, rating, review_count)
           VALUES (?, ?, ?, ?, 0, 0)"#,
    )
    .bind(&stylist_id)
    .bind(&salon_id)
    .bind("Dana Reyes")
    .bind(r#"["cut","color"]"#)
    .execute(pool)
    .await?;

    let staff_username = env::var("STAFF_USER").unwrap_or_else(|_| "stylist1".to_string());
    let staff_password = env::var("STAFF_PASSWORD").unwrap_or_else(|_| "change-me".to_string());
    if staff_password == "change-me" {
        log::warn!("STAFF_PASSWORD not set. Using default password 'change-me'. Set STAFF_PASSWORD in production.");
    }
    let password_hash = hash_password(&staff_password)
        .map_err(|_| sqlx::Error::Protocol("password hash failed".into()))?;
    sqlx::query(
        r#"INSERT INTO users (id, username, display_name, role, password_hash, active, created_at)
           VALUES (?, ?, ?, ?, ?, 1, ?)"#,
    )
    .bind(new_id())
    .bind(staff_username)
    .bind("Dana Reyes")
    .bind(ROLE_STAFF)
    .bind(password_hash)
    .bind(&now)
    .execute(pool)
    .await?;

    log::info!("Seeded demo salon {salon_id}");
    Ok(())
}
