use std::{env, sync::Arc};

use sqlx::SqlitePool;

use crate::{booking::SlotLocks, models::AppointmentStatus};

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: BookingConfig,
    pub slots: Arc<SlotLocks>,
}

impl AppState {
    pub fn new(db: SqlitePool, config: BookingConfig) -> Self {
        Self {
            db,
            config,
            slots: Arc::new(SlotLocks::new()),
        }
    }
}

/// Booking policy knobs. Payments default to creation at completion;
/// PAYMENT_AT_BOOKING=true opens a pending payment as soon as the
/// appointment row is committed.
#[derive(Clone, Debug, Default)]
pub struct BookingConfig {
    pub payment_at_booking: bool,
    pub auto_confirm: bool,
}

impl BookingConfig {
    pub fn from_env() -> Self {
        Self {
            payment_at_booking: env_flag("PAYMENT_AT_BOOKING"),
            auto_confirm: env_flag("BOOKING_AUTO_CONFIRM"),
        }
    }

    pub fn initial_status(&self) -> AppointmentStatus {
        if self.auto_confirm {
            AppointmentStatus::Confirmed
        } else {
            AppointmentStatus::Pending
        }
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name).map(|value| value == "true").unwrap_or(false)
}
