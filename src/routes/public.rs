use actix_web::{web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{basic_validator, client_validator, AuthUser},
    availability::{self, SlotRequest},
    booking::{self, BookingRequest},
    db::fetch_appointment,
    error::CoreError,
    lifecycle,
    models::ROLE_CLIENT,
    state::AppState,
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/availability").route(web::get().to(check_availability)))
        .service(
            web::resource("/book")
                .wrap(HttpAuthentication::basic(client_validator))
                .route(web::post().to(book)),
        )
        .service(web::resource("/appointments/{id}").route(web::get().to(appointment_status)))
        .service(
            web::resource("/appointments/{id}/cancel")
                .wrap(HttpAuthentication::basic(basic_validator))
                .route(web::post().to(cancel)),
        )
        .service(
            web::resource("/appointments/{id}/review")
                .wrap(HttpAuthentication::basic(client_validator))
                .route(web::post().to(create_review)),
        );
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("ok")
}

#[derive(Deserialize)]
struct AvailabilityQuery {
    salon_id: String,
    staff_id: String,
    service_id: String,
    date: String,
    start_time: String,
}

/// Read-only pre-check for a UI; a free answer here is not a
/// reservation, only `/book` takes the slot.
async fn check_availability(
    state: web::Data<AppState>,
    query: web::Query<AvailabilityQuery>,
) -> Result<HttpResponse, CoreError> {
    let query = query.into_inner();
    let req = SlotRequest {
        salon_id: query.salon_id,
        staff_id: query.staff_id,
        service_id: query.service_id,
        date: query.date,
        start_time: query.start_time,
    };
    let check = availability::check_slot(&state.db, &req).await?;
    Ok(HttpResponse::Ok().json(json!({
        "available": check.is_available(),
        "detail": check,
    })))
}

async fn book(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    body: web::Json<BookingRequest>,
) -> Result<HttpResponse, CoreError> {
    let row = booking::book(&state, &auth.id, &body.into_inner()).await?;
    log::info!("Appointment {} booked by {}", row.id, auth.display_name);
    Ok(HttpResponse::Created().json(row))
}

async fn appointment_status(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, CoreError> {
    let row = fetch_appointment(&state.db, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(row))
}

async fn cancel(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse, CoreError> {
    let appointment_id = path.into_inner();

    // Clients may only cancel their own bookings; salon roles may cancel any.
    let row = fetch_appointment(&state.db, &appointment_id).await?;
    if auth.role == ROLE_CLIENT && row.client_id != auth.id {
        return Err(CoreError::Forbidden(
            "appointment belongs to another client".to_string(),
        ));
    }

    let outcome = lifecycle::cancel(&state.db, &appointment_id, &auth.id).await?;
    Ok(HttpResponse::Ok().json(json!({
        "appointment": outcome.appointment,
        "refund_warning": outcome.refund_warning,
    })))
}

#[derive(Deserialize)]
struct ReviewForm {
    rating: i64,
    comment: Option<String>,
}

async fn create_review(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    body: web::Json<ReviewForm>,
) -> Result<HttpResponse, CoreError> {
    let form = body.into_inner();
    let review = lifecycle::create_review(
        &state.db,
        &path.into_inner(),
        &auth.id,
        form.rating,
        form.comment.as_deref().unwrap_or(""),
    )
    .await?;
    Ok(HttpResponse::Created().json(review))
}
