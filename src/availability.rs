use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::{
    error::CoreError,
    models::{AppointmentStatus, SalonHoursRow, SalonRow, ServiceRow, StaffRow},
};

#[derive(Clone, Debug)]
pub struct SlotRequest {
    pub salon_id: String,
    pub staff_id: String,
    pub service_id: String,
    pub date: String,
    pub start_time: String,
}

/// Outcome of an availability check. `OutsideHours` and `Conflict` are
/// ordinary answers here; the orchestrator turns them into errors when a
/// booking is actually attempted.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SlotCheck {
    Available { start: String, end: String },
    OutsideHours { window: String },
    Conflict { start: String, end: String },
}

impl SlotCheck {
    pub fn is_available(&self) -> bool {
        matches!(self, SlotCheck::Available { .. })
    }
}

pub(crate) fn parse_date(value: &str) -> Result<NaiveDate, CoreError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| CoreError::InvalidInput(format!("bad date '{value}', expected YYYY-MM-DD")))
}

/// Canonical zero-padded YYYY-MM-DD spelling. chrono accepts unpadded
/// input like `2026-3-2`, so every stored date, lock key, and date-bound
/// query must go through this or two spellings of one day would pass
/// each other unseen.
pub(crate) fn canonical_date(value: &str) -> Result<String, CoreError> {
    Ok(parse_date(value)?.format("%Y-%m-%d").to_string())
}

/// Minutes since midnight from an HH:MM string.
pub(crate) fn parse_hhmm(value: &str) -> Result<i64, CoreError> {
    let time = NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|_| CoreError::InvalidInput(format!("bad time '{value}', expected HH:MM")))?;
    Ok(i64::from(time.hour()) * 60 + i64::from(time.minute()))
}

pub(crate) fn format_hhmm(minutes: i64) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

pub async fn fetch_salon(pool: &SqlitePool, salon_id: &str) -> Result<SalonRow, CoreError> {
    sqlx::query_as::<_, SalonRow>("SELECT * FROM salons WHERE id = ? LIMIT 1")
        .bind(salon_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| CoreError::NotFound {
            entity: "salon",
            id: salon_id.to_string(),
        })
}

pub async fn fetch_staff(pool: &SqlitePool, staff_id: &str) -> Result<StaffRow, CoreError> {
    sqlx::query_as::<_, StaffRow>("SELECT * FROM staff WHERE id = ? LIMIT 1")
        .bind(staff_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| CoreError::NotFound {
            entity: "staff",
            id: staff_id.to_string(),
        })
}

pub async fn fetch_service(pool: &SqlitePool, service_id: &str) -> Result<ServiceRow, CoreError> {
    sqlx::query_as::<_, ServiceRow>("SELECT * FROM services WHERE id = ? LIMIT 1")
        .bind(service_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| CoreError::NotFound {
            entity: "service",
            id: service_id.to_string(),
        })
}

/// Resolves every reference, checks the salon's window for that weekday,
/// then scans the staff member's non-canceled appointments for the date.
/// Intervals are half-open, so a booking ending at 10:00 never conflicts
/// with one starting at 10:00.
pub async fn check_slot(pool: &SqlitePool, req: &SlotRequest) -> Result<SlotCheck, CoreError> {
    let salon = fetch_salon(pool, &req.salon_id).await?;
    let staff = fetch_staff(pool, &req.staff_id).await?;
    let service = fetch_service(pool, &req.service_id).await?;

    if staff.salon_id != salon.id {
        return Err(CoreError::NotFound {
            entity: "staff",
            id: format!("{} (not at salon {})", staff.id, salon.id),
        });
    }
    if service.salon_id != salon.id {
        return Err(CoreError::NotFound {
            entity: "service",
            id: format!("{} (not at salon {})", service.id, salon.id),
        });
    }

    let date = parse_date(&req.date)?;
    let date_key = date.format("%Y-%m-%d").to_string();
    let start = parse_hhmm(&req.start_time)?;
    let end = start + service.duration_minutes;

    let weekday = i64::from(date.weekday().num_days_from_monday());
    let hours = sqlx::query_as::<_, SalonHoursRow>(
        "SELECT * FROM salon_hours WHERE salon_id = ? AND weekday = ? LIMIT 1",
    )
    .bind(&salon.id)
    .bind(weekday)
    .fetch_optional(pool)
    .await?;

    let window = match hours {
        Some(row) if row.closed == 0 => row,
        _ => {
            return Ok(SlotCheck::OutsideHours {
                window: "closed".to_string(),
            })
        }
    };

    let opens = parse_hhmm(&window.opens_at)?;
    let closes = parse_hhmm(&window.closes_at)?;
    if start < opens || end > closes {
        return Ok(SlotCheck::OutsideHours {
            window: format!("{}-{}", window.opens_at, window.closes_at),
        });
    }

    let existing = sqlx::query_as::<_, (String, String)>(
        r#"SELECT start_time, end_time FROM appointments
           WHERE staff_id = ? AND date = ? AND status != ?
           ORDER BY start_time"#,
    )
    .bind(&staff.id)
    .bind(&date_key)
    .bind(AppointmentStatus::Canceled.as_str())
    .fetch_all(pool)
    .await?;

    for (existing_start, existing_end) in existing {
        let es = parse_hhmm(&existing_start)?;
        let ee = parse_hhmm(&existing_end)?;
        if es < end && start < ee {
            return Ok(SlotCheck::Conflict {
                start: existing_start,
                end: existing_end,
            });
        }
    }

    Ok(SlotCheck::Available {
        start: format_hhmm(start),
        end: format_hhmm(end),
    })
}
