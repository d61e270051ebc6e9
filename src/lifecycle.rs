use chrono::Utc;
use sqlx::SqlitePool;

use crate::{
    auth::new_id,
    db::{fetch_appointment, record_transition},
    error::CoreError,
    models::{AppointmentRow, AppointmentStatus, PaymentRow, PaymentStatus, ReviewRow},
    rating,
};

/// The single place deciding which status edges are legal.
pub fn transition(
    from: AppointmentStatus,
    to: AppointmentStatus,
) -> Result<(), CoreError> {
    use AppointmentStatus::*;
    let legal = !from.is_terminal()
        && matches!(
            (from, to),
            (Pending, Confirmed) | (Confirmed, Completed) | (Pending | Confirmed, Canceled)
        );
    if legal {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

fn status_of(row: &AppointmentRow) -> Result<AppointmentStatus, CoreError> {
    AppointmentStatus::parse(&row.status)
        .ok_or_else(|| CoreError::InvalidInput(format!("unknown status '{}'", row.status)))
}

async fn apply(
    pool: &SqlitePool,
    appointment_id: &str,
    to: AppointmentStatus,
    actor: &str,
) -> Result<AppointmentRow, CoreError> {
    let mut row = fetch_appointment(pool, appointment_id).await?;
    let from = status_of(&row)?;
    transition(from, to)?;

    // Guard against a concurrent transition between the load above and
    // this write: the update only lands if the status is still `from`.
    let result = sqlx::query("UPDATE appointments SET status = ? WHERE id = ? AND status = ?")
        .bind(to.as_str())
        .bind(appointment_id)
        .bind(from.as_str())
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        let current = fetch_appointment(pool, appointment_id).await?;
        return Err(CoreError::InvalidTransition {
            from: current.status,
            to: to.to_string(),
        });
    }
    record_transition(pool, appointment_id, Some(from), to, actor, None).await?;

    row.status = to.as_str().to_string();
    Ok(row)
}

pub async fn confirm(
    pool: &SqlitePool,
    appointment_id: &str,
    actor: &str,
) -> Result<AppointmentRow, CoreError> {
    apply(pool, appointment_id, AppointmentStatus::Confirmed, actor).await
}

/// Completes a confirmed appointment and opens its payment. The payment
/// amount is the price snapshot taken at booking time, never the current
/// service price. A payment opened at booking time is left as is.
pub async fn complete(
    pool: &SqlitePool,
    appointment_id: &str,
    actor: &str,
) -> Result<AppointmentRow, CoreError> {
    let row = apply(pool, appointment_id, AppointmentStatus::Completed, actor).await?;
    if fetch_payment(pool, appointment_id).await?.is_none() {
        create_payment(pool, &row).await?;
    }
    Ok(row)
}

#[derive(Debug)]
pub struct CancelOutcome {
    pub appointment: AppointmentRow,
    /// Set when a paid payment could not be refunded. The cancellation
    /// itself has already succeeded.
    pub refund_warning: Option<String>,
}

pub async fn cancel(
    pool: &SqlitePool,
    appointment_id: &str,
    actor: &str,
) -> Result<CancelOutcome, CoreError> {
    let row = apply(pool, appointment_id, AppointmentStatus::Canceled, actor).await?;

    let mut refund_warning = None;
    if let Some(payment) = fetch_payment(pool, appointment_id).await? {
        if PaymentStatus::parse(&payment.status) == Some(PaymentStatus::Paid) {
            if let Err(err) = mark_refunded(pool, &payment.id).await {
                log::warn!("Refund failed for payment {}: {err}", payment.id);
                let note = format!("refund failed: {err}");
                let _ = record_transition(
                    pool,
                    appointment_id,
                    Some(AppointmentStatus::Canceled),
                    AppointmentStatus::Canceled,
                    actor,
                    Some(&note),
                )
                .await;
                refund_warning = Some(note);
            }
        }
    }

    Ok(CancelOutcome {
        appointment: row,
        refund_warning,
    })
}

async fn mark_refunded(pool: &SqlitePool, payment_id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE payments SET status = ? WHERE id = ?")
        .bind(PaymentStatus::Refunded.as_str())
        .bind(payment_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn fetch_payment(
    pool: &SqlitePool,
    appointment_id: &str,
) -> Result<Option<PaymentRow>, CoreError> {
    Ok(
        sqlx::query_as::<_, PaymentRow>(
            "SELECT * FROM payments WHERE appointment_id = ? LIMIT 1",
        )
        .bind(appointment_id)
        .fetch_optional(pool)
        .await?,
    )
}

pub async fn create_payment(
    pool: &SqlitePool,
    appointment: &AppointmentRow,
) -> Result<PaymentRow, CoreError> {
    let payment = PaymentRow {
        id: new_id(),
        appointment_id: appointment.id.clone(),
        amount_cents: appointment.price_cents,
        method: "unspecified".to_string(),
        status: PaymentStatus::Pending.as_str().to_string(),
        transaction_id: None,
        created_at: Utc::now().to_rfc3339(),
    };
    sqlx::query(
        r#"INSERT INTO payments (id, appointment_id, amount_cents, method, status, transaction_id, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&payment.id)
    .bind(&payment.appointment_id)
    .bind(payment.amount_cents)
    .bind(&payment.method)
    .bind(&payment.status)
    .bind(&payment.transaction_id)
    .bind(&payment.created_at)
    .execute(pool)
    .await?;
    Ok(payment)
}

/// Creates the one review an appointment may carry. Only the client who
/// booked may review, and only once the appointment is completed. The
/// salon and staff aggregates are recomputed afterwards; a recomputation
/// failure is logged but does not undo the review.
pub async fn create_review(
    pool: &SqlitePool,
    appointment_id: &str,
    client_id: &str,
    rating_value: i64,
    comment: &str,
) -> Result<ReviewRow, CoreError> {
    if !(1..=5).contains(&rating_value) {
        return Err(CoreError::InvalidInput(format!(
            "rating must be 1-5, got {rating_value}"
        )));
    }

    let appointment = fetch_appointment(pool, appointment_id).await?;
    let status = status_of(&appointment)?;
    if status != AppointmentStatus::Completed {
        return Err(CoreError::ReviewNotAllowed {
            reason: format!("appointment is {status}, not completed"),
        });
    }
    if appointment.client_id != client_id {
        return Err(CoreError::Forbidden(
            "only the booking client may review".to_string(),
        ));
    }

    let existing = sqlx::query_scalar::<_, String>(
        "SELECT id FROM reviews WHERE appointment_id = ? AND deleted = 0 LIMIT 1",
    )
    .bind(appointment_id)
    .fetch_optional(pool)
    .await?;
    if existing.is_some() {
        return Err(CoreError::ReviewNotAllowed {
            reason: "appointment already reviewed".to_string(),
        });
    }

    let review = ReviewRow {
        id: new_id(),
        appointment_id: Some(appointment.id.clone()),
        client_id: client_id.to_string(),
        salon_id: appointment.salon_id.clone(),
        staff_id: appointment.staff_id.clone(),
        rating: rating_value,
        comment: comment.to_string(),
        deleted: 0,
        created_at: Utc::now().to_rfc3339(),
    };
    sqlx::query(
        r#"INSERT INTO reviews (id, appointment_id, client_id, salon_id, staff_id, rating, comment, deleted, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?)"#,
    )
    .bind(&review.id)
    .bind(&review.appointment_id)
    .bind(&review.client_id)
    .bind(&review.salon_id)
    .bind(&review.staff_id)
    .bind(review.rating)
    .bind(&review.comment)
    .bind(&review.created_at)
    .execute(pool)
    .await?;

    recompute_after_change(pool, &review.salon_id, &review.staff_id).await;
    Ok(review)
}

/// Soft-deletes a review so the aggregates recompute over what remains.
pub async fn remove_review(pool: &SqlitePool, review_id: &str) -> Result<(), CoreError> {
    let review = sqlx::query_as::<_, ReviewRow>("SELECT * FROM reviews WHERE id = ? LIMIT 1")
        .bind(review_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| CoreError::NotFound {
            entity: "review",
            id: review_id.to_string(),
        })?;

    sqlx::query("UPDATE reviews SET deleted = 1 WHERE id = ?")
        .bind(review_id)
        .execute(pool)
        .await?;

    recompute_after_change(pool, &review.salon_id, &review.staff_id).await;
    Ok(())
}

async fn recompute_after_change(pool: &SqlitePool, salon_id: &str, staff_id: &str) {
    if let Err(err) = rating::recompute_salon(pool, salon_id).await {
        log::warn!("Rating recompute failed for salon {salon_id}: {err}");
    }
    if let Err(err) = rating::recompute_staff(pool, staff_id).await {
        log::warn!("Rating recompute failed for staff {staff_id}: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    #[test]
    fn transition_table() {
        use AppointmentStatus::*;
        assert!(transition(Pending, Confirmed).is_ok());
        assert!(transition(Confirmed, Completed).is_ok());
        assert!(transition(Pending, Canceled).is_ok());
        assert!(transition(Confirmed, Canceled).is_ok());

        assert!(transition(Pending, Completed).is_err());
        assert!(transition(Confirmed, Pending).is_err());
        for terminal in [Completed, Canceled] {
            for to in [Pending, Confirmed, Completed, Canceled] {
                assert!(transition(terminal, to).is_err(), "{terminal} -> {to}");
            }
        }
    }

    #[tokio::test]
    async fn confirm_then_complete_creates_payment() {
        let pool = testutil::pool().await;
        let fx = testutil::seed(&pool).await;
        let id = testutil::insert_appointment(
            &pool, &fx, testutil::MONDAY, "10:00", "11:00", "pending",
        )
        .await;

        confirm(&pool, &id, "owner-1").await.unwrap();
        let row = complete(&pool, &id, "owner-1").await.unwrap();
        assert_eq!(row.status, "completed");

        let payment = fetch_payment(&pool, &id).await.unwrap().unwrap();
        assert_eq!(payment.amount_cents, fx.price_cents);
        assert_eq!(payment.status, "pending");

        // Completing twice is illegal.
        let err = complete(&pool, &id, "owner-1").await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn complete_requires_confirmed() {
        let pool = testutil::pool().await;
        let fx = testutil::seed(&pool).await;
        let id = testutil::insert_appointment(
            &pool, &fx, testutil::MONDAY, "10:00", "11:00", "pending",
        )
        .await;

        let err = complete(&pool, &id, "owner-1").await.unwrap_err();
        match err {
            CoreError::InvalidTransition { from, to } => {
                assert_eq!(from, "pending");
                assert_eq!(to, "completed");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancel_reachable_from_pending_and_confirmed_only() {
        let pool = testutil::pool().await;
        let fx = testutil::seed(&pool).await;

        let pending = testutil::insert_appointment(
            &pool, &fx, testutil::MONDAY, "09:00", "10:00", "pending",
        )
        .await;
        assert!(cancel(&pool, &pending, "client-1").await.is_ok());

        let confirmed = testutil::insert_appointment(
            &pool, &fx, testutil::MONDAY, "10:00", "11:00", "confirmed",
        )
        .await;
        assert!(cancel(&pool, &confirmed, "client-1").await.is_ok());

        // Terminal now.
        let err = cancel(&pool, &confirmed, "client-1").await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
        let err = confirm(&pool, &pending, "owner-1").await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn concurrent_complete_and_cancel_admit_one() {
        let pool = testutil::pool().await;
        let fx = testutil::seed(&pool).await;
        let id = testutil::insert_appointment(
            &pool, &fx, testutil::MONDAY, "10:00", "11:00", "confirmed",
        )
        .await;

        let completing = complete(&pool, &id, "owner-1");
        let canceling = cancel(&pool, &id, "client-1");
        let (completed, canceled) = tokio::join!(completing, canceling);

        let successes = completed.is_ok() as usize + canceled.is_ok() as usize;
        assert_eq!(successes, 1, "confirmed may leave by exactly one edge");

        // Exactly one departure from confirmed in the trail.
        let departures = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM appointment_transitions WHERE appointment_id = ? AND from_status = 'confirmed'",
        )
        .bind(&id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(departures, 1);

        let row = fetch_appointment(&pool, &id).await.unwrap();
        assert!(AppointmentStatus::parse(&row.status).unwrap().is_terminal());
    }

    #[tokio::test]
    async fn cancel_refunds_paid_payment() {
        let pool = testutil::pool().await;
        let fx = testutil::seed(&pool).await;
        let id = testutil::insert_appointment(
            &pool, &fx, testutil::MONDAY, "10:00", "11:00", "confirmed",
        )
        .await;

        let appointment = fetch_appointment(&pool, &id).await.unwrap();
        let payment = create_payment(&pool, &appointment).await.unwrap();
        sqlx::query("UPDATE payments SET status = 'paid' WHERE id = ?")
            .bind(&payment.id)
            .execute(&pool)
            .await
            .unwrap();

        let outcome = cancel(&pool, &id, "client-1").await.unwrap();
        assert!(outcome.refund_warning.is_none());

        let payment = fetch_payment(&pool, &id).await.unwrap().unwrap();
        assert_eq!(payment.status, "refunded");
    }

    #[tokio::test]
    async fn audit_trail_preserves_order() {
        let pool = testutil::pool().await;
        let fx = testutil::seed(&pool).await;
        let id = testutil::insert_appointment(
            &pool, &fx, testutil::MONDAY, "10:00", "11:00", "pending",
        )
        .await;

        confirm(&pool, &id, "owner-1").await.unwrap();
        complete(&pool, &id, "staff-1").await.unwrap();

        let trail = sqlx::query_as::<_, (Option<String>, String, String)>(
            r#"SELECT from_status, to_status, actor FROM appointment_transitions
               WHERE appointment_id = ? ORDER BY created_at, rowid"#,
        )
        .bind(&id)
        .fetch_all(&pool)
        .await
        .unwrap();

        assert_eq!(
            trail,
            vec![
                (Some("pending".into()), "confirmed".into(), "owner-1".into()),
                (Some("confirmed".into()), "completed".into(), "staff-1".into()),
            ]
        );
    }

    #[tokio::test]
    async fn review_gated_on_completed_and_unique() {
        let pool = testutil::pool().await;
        let fx = testutil::seed(&pool).await;
        let id = testutil::insert_appointment(
            &pool, &fx, testutil::MONDAY, "10:00", "11:00", "pending",
        )
        .await;

        let err = create_review(&pool, &id, &fx.client_id, 5, "great")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ReviewNotAllowed { .. }));

        confirm(&pool, &id, "owner-1").await.unwrap();
        complete(&pool, &id, "owner-1").await.unwrap();

        // Wrong client is rejected before the uniqueness check.
        let err = create_review(&pool, &id, "someone-else", 5, "great")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));

        let review = create_review(&pool, &id, &fx.client_id, 5, "great")
            .await
            .unwrap();
        assert_eq!(review.rating, 5);

        let err = create_review(&pool, &id, &fx.client_id, 4, "again")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ReviewNotAllowed { .. }));

        // Aggregates were recomputed synchronously.
        let salon = crate::availability::fetch_salon(&pool, &fx.salon_id)
            .await
            .unwrap();
        assert_eq!(salon.rating, 5.0);
        assert_eq!(salon.review_count, 1);
    }

    #[tokio::test]
    async fn removing_review_recomputes_aggregates() {
        let pool = testutil::pool().await;
        let fx = testutil::seed(&pool).await;
        let id = testutil::insert_appointment(
            &pool, &fx, testutil::MONDAY, "10:00", "11:00", "confirmed",
        )
        .await;
        complete(&pool, &id, "owner-1").await.unwrap();
        let review = create_review(&pool, &id, &fx.client_id, 4, "fine")
            .await
            .unwrap();

        remove_review(&pool, &review.id).await.unwrap();
        let salon = crate::availability::fetch_salon(&pool, &fx.salon_id)
            .await
            .unwrap();
        assert_eq!(salon.rating, 0.0);
        assert_eq!(salon.review_count, 0);

        let err = remove_review(&pool, "missing").await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }
}
