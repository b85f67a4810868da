use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;

use crate::errors::{AppError, FieldError};
use crate::models::IntegrationSettings;
use crate::services::settings;
use crate::state::AppState;

// GET /api/config
pub async fn get_config(
    State(state): State<Arc<AppState>>,
) -> Result<Json<IntegrationSettings>, AppError> {
    let conn = state.db()?;
    Ok(Json(settings::load_settings(&conn, &state.cipher)?))
}

// POST /api/config
pub async fn save_config(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<IntegrationSettings>, JsonRejection>,
) -> Result<Json<IntegrationSettings>, AppError> {
    let Json(new_settings) = payload.map_err(|e| AppError::InvalidInput(e.body_text()))?;
    let problems = new_settings.validate();
    if !problems.is_empty() {
        return Err(AppError::Validation(
            problems
                .into_iter()
                .map(|p| FieldError::new("config", p))
                .collect(),
        ));
    }

    {
        let conn = state.db()?;
        settings::save_settings(&conn, &state.cipher, &new_settings)?;
    }

    tracing::info!(
        calendar_enabled = new_settings.google_calendar.enabled,
        whatsapp_enabled = new_settings.whatsapp.enabled,
        "integration settings saved"
    );
    state
        .notifier
        .success("Settings saved", "Integration settings were updated");
    Ok(Json(new_settings))
}
