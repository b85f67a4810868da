use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::Local;
use serde::Serialize;

use crate::errors::AppError;
use crate::models::SlotTime;
use crate::services::availability::{compute_available_slots, parse_date};
use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityResponse {
    available_slots: Vec<SlotTime>,
}

// GET /api/availability/:date
pub async fn get_availability(
    State(state): State<Arc<AppState>>,
    Path(date): Path<String>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let date = parse_date(&date)?;
    let now = Local::now().naive_local();

    let conn = state.db()?;
    let available_slots =
        compute_available_slots(&conn, date, now, state.config.same_day_lead_hhmm)?;

    Ok(Json(AvailabilityResponse { available_slots }))
}
