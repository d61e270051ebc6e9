use actix_web::{web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{salon_validator, AuthUser},
    error::CoreError,
    lifecycle,
    models::{AppointmentRow, AppointmentStatus, TransitionRow},
    state::AppState,
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/salon")
            .wrap(HttpAuthentication::basic(salon_validator))
            .service(
                web::resource("/appointments/{id}/confirm").route(web::post().to(confirm)),
            )
            .service(
                web::resource("/appointments/{id}/complete").route(web::post().to(complete)),
            )
            .service(
                web::resource("/appointments/{id}/history").route(web::get().to(history)),
            )
            .service(web::resource("/schedule/{staff_id}").route(web::get().to(day_schedule))),
    );
}

/// Ordered audit trail for one appointment, for dispute resolution.
async fn history(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, CoreError> {
    let appointment_id = path.into_inner();
    crate::db::fetch_appointment(&state.db, &appointment_id).await?;
    let rows = sqlx::query_as::<_, TransitionRow>(
        r#"SELECT appointment_id, from_status, to_status, actor, note, created_at
           FROM appointment_transitions
           WHERE appointment_id = ?
           ORDER BY created_at, rowid"#,
    )
    .bind(&appointment_id)
    .fetch_all(&state.db)
    .await?;
    Ok(HttpResponse::Ok().json(rows))
}

async fn confirm(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse, CoreError> {
    let row = lifecycle::confirm(&state.db, &path.into_inner(), &auth.id).await?;
    Ok(HttpResponse::Ok().json(row))
}

async fn complete(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse, CoreError> {
    let appointment_id = path.into_inner();
    let row = lifecycle::complete(&state.db, &appointment_id, &auth.id).await?;
    let payment = lifecycle::fetch_payment(&state.db, &appointment_id).await?;
    Ok(HttpResponse::Ok().json(json!({
        "appointment": row,
        "payment": payment,
    })))
}

#[derive(Deserialize)]
struct ScheduleQuery {
    date: String,
}

/// A staff member's bookings for one day, canceled ones excluded.
async fn day_schedule(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<ScheduleQuery>,
) -> Result<HttpResponse, CoreError> {
    let staff_id = path.into_inner();
    let rows = sqlx::query_as::<_, AppointmentRow>(
        r#"SELECT * FROM appointments
           WHERE staff_id = ? AND date = ? AND status != ?
           ORDER BY start_time"#,
    )
    .bind(&staff_id)
    .bind(&query.date)
    .bind(AppointmentStatus::Canceled.as_str())
    .fetch_all(&state.db)
    .await?;
    Ok(HttpResponse::Ok().json(rows))
}
