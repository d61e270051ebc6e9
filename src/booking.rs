use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex},
};

use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use crate::{
    auth::new_id,
    availability::{self, SlotCheck, SlotRequest},
    db::record_transition,
    error::CoreError,
    lifecycle,
    models::{AppointmentRow, UserRow},
    state::AppState,
};

/// Per-(staff, date) critical sections. The outer map guard is held only
/// long enough to hand out the entry; the per-slot mutex is what callers
/// hold across the check-and-insert, so bookings for different staff or
/// dates never wait on each other.
pub struct SlotLocks {
    inner: StdMutex<HashMap<(String, String), Arc<Mutex<()>>>>,
}

impl SlotLocks {
    pub fn new() -> Self {
        Self {
            inner: StdMutex::new(HashMap::new()),
        }
    }

    pub fn entry(&self, staff_id: &str, date: &str) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock().expect("slot lock map poisoned");
        // Entries nobody holds anymore (strong count 1: the map's own
        // Arc) are dead days; drop them so the map tracks in-flight
        // bookings instead of every date ever seen.
        map.retain(|_, lock| Arc::strong_count(lock) > 1);
        map.entry((staff_id.to_string(), date.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().expect("slot lock map poisoned").len()
    }
}

impl Default for SlotLocks {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct BookingRequest {
    pub salon_id: String,
    pub staff_id: String,
    pub service_id: String,
    pub date: String,
    pub start_time: String,
}

/// Books a slot: validates the references, then runs the availability
/// check and the insert as one critical section keyed by (staff, date).
/// Payment creation, when configured to happen at booking time, runs
/// after the lock is released.
pub async fn book(
    state: &AppState,
    client_id: &str,
    req: &BookingRequest,
) -> Result<AppointmentRow, CoreError> {
    fetch_client(&state.db, client_id).await?;

    // One canonical date spelling keys the lock, the conflict scan, and
    // the stored row; anything else would let `2026-3-2` and
    // `2026-03-02` book the same slot twice.
    let date = availability::canonical_date(&req.date)?;

    // check_slot resolves salon/staff/service and their membership.
    let slot_req = SlotRequest {
        salon_id: req.salon_id.clone(),
        staff_id: req.staff_id.clone(),
        service_id: req.service_id.clone(),
        date: date.clone(),
        start_time: req.start_time.clone(),
    };

    let lock = state.slots.entry(&req.staff_id, &date);
    let row = {
        let _guard = lock.lock().await;

        let check = availability::check_slot(&state.db, &slot_req).await?;
        let (start, end) = match check {
            SlotCheck::Available { start, end } => (start, end),
            SlotCheck::OutsideHours { window } => {
                return Err(CoreError::OutsideHours { window })
            }
            SlotCheck::Conflict { start, end } => {
                return Err(CoreError::SlotUnavailable { start, end })
            }
        };

        let service = availability::fetch_service(&state.db, &req.service_id).await?;
        let status = state.config.initial_status();
        let row = AppointmentRow {
            id: new_id(),
            salon_id: req.salon_id.clone(),
            service_id: req.service_id.clone(),
            staff_id: req.staff_id.clone(),
            client_id: client_id.to_string(),
            date: date.clone(),
            start_time: start,
            end_time: end,
            price_cents: service.price_cents,
            duration_minutes: service.duration_minutes,
            status: status.as_str().to_string(),
            created_at: Utc::now().to_rfc3339(),
        };

        sqlx::query(
            r#"INSERT INTO appointments
               (id, salon_id, service_id, staff_id, client_id, date, start_time, end_time,
                price_cents, duration_minutes, status, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&row.id)
        .bind(&row.salon_id)
        .bind(&row.service_id)
        .bind(&row.staff_id)
        .bind(&row.client_id)
        .bind(&row.date)
        .bind(&row.start_time)
        .bind(&row.end_time)
        .bind(row.price_cents)
        .bind(row.duration_minutes)
        .bind(&row.status)
        .bind(&row.created_at)
        .execute(&state.db)
        .await?;

        record_transition(&state.db, &row.id, None, status, client_id, None).await?;
        row
    };

    if state.config.payment_at_booking {
        lifecycle::create_payment(&state.db, &row).await?;
    }

    Ok(row)
}

async fn fetch_client(pool: &SqlitePool, client_id: &str) -> Result<UserRow, CoreError> {
    sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = ? AND active = 1 LIMIT 1")
        .bind(client_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| CoreError::NotFound {
            entity: "client",
            id: client_id.to_string(),
        })
}
