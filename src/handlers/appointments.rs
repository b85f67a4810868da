use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Appointment, AppointmentStatus};
use crate::services::availability::parse_date;
use crate::services::booking::{reserve_slot, BookingRequest};
use crate::state::AppState;

// POST /api/appointments
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingResponse {
    #[serde(flatten)]
    appointment: Appointment,
    calendar_synced: bool,
    message: &'static str,
}

pub async fn create_appointment(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<BookingResponse>), AppError> {
    let Json(body) = payload.map_err(|e| AppError::InvalidInput(e.body_text()))?;
    let request = BookingRequest::from_json(&body)?;

    let outcome = reserve_slot(&state, &request, Local::now().naive_local()).await?;

    let message = match (outcome.calendar_synced, outcome.whatsapp_sent) {
        (true, true) => "Appointment confirmed, added to the calendar and confirmation sent",
        (true, false) => "Appointment confirmed and added to the calendar",
        (false, true) => "Appointment confirmed and confirmation sent",
        (false, false) => "Appointment confirmed",
    };

    Ok((
        StatusCode::CREATED,
        Json(BookingResponse {
            appointment: outcome.appointment,
            calendar_synced: outcome.calendar_synced,
            message,
        }),
    ))
}

// GET /api/appointments?startDate&endDate
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Serialize)]
pub struct AppointmentsResponse {
    appointments: Vec<Appointment>,
}

pub async fn list_appointments(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<AppointmentsResponse>, AppError> {
    let (Some(start), Some(end)) = (query.start_date, query.end_date) else {
        return Err(AppError::InvalidInput(
            "startDate and endDate are required".to_string(),
        ));
    };
    let start = parse_date(&start)?;
    let end = parse_date(&end)?;

    let conn = state.db()?;
    let appointments = queries::get_confirmed_in_range(&conn, start, end)?;
    Ok(Json(AppointmentsResponse { appointments }))
}

// GET /api/appointments/:id
pub async fn get_appointment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Appointment>, AppError> {
    let conn = state.db()?;
    queries::get_appointment(&conn, id)?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("appointment {id}")))
}

// POST /api/appointments/:id/cancel
pub async fn cancel_appointment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Appointment>, AppError> {
    let appointment = {
        let conn = state.db()?;
        if !queries::update_appointment_status(&conn, id, AppointmentStatus::Cancelled)? {
            return Err(AppError::NotFound(format!("appointment {id}")));
        }
        queries::get_appointment(&conn, id)?
            .ok_or_else(|| AppError::NotFound(format!("appointment {id}")))?
    };

    tracing::info!(id, date = %appointment.date, time = %appointment.time, "appointment cancelled");
    state.notifier.info(
        "Appointment cancelled",
        format!(
            "{} on {} at {}",
            appointment.name,
            appointment.date.format("%d/%m/%Y"),
            appointment.time
        ),
    );
    Ok(Json(appointment))
}

// DELETE /api/appointments/:id
pub async fn delete_appointment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let conn = state.db()?;
    if !queries::delete_appointment(&conn, id)? {
        return Err(AppError::NotFound(format!("appointment {id}")));
    }
    tracing::info!(id, "appointment deleted");
    Ok(StatusCode::NO_CONTENT)
}
