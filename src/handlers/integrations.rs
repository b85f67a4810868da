use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::models::WhatsappSettings;
use crate::state::AppState;

fn probe_failed(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "message": message.into() })),
    )
        .into_response()
}

// POST /api/test-google
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleProbe {
    #[serde(default)]
    pub calendar_id: String,
    #[serde(default)]
    pub access_token: String,
}

pub async fn test_google(
    State(state): State<Arc<AppState>>,
    Json(probe): Json<GoogleProbe>,
) -> Response {
    let token = probe.access_token.trim();
    if token.is_empty() {
        return probe_failed("an access token is required to test Google Calendar");
    }
    let calendar_id = match probe.calendar_id.trim() {
        "" => "primary",
        id => id,
    };

    match state.calendar.calendar_summary(token, calendar_id).await {
        Ok(summary) => Json(json!({
            "success": true,
            "message": "Google Calendar connection succeeded",
            "data": summary,
        }))
        .into_response(),
        Err(e) => {
            tracing::warn!(calendar_id, error = %e, "Google Calendar probe failed");
            probe_failed(e.to_string())
        }
    }
}

// POST /api/test-whatsapp
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhatsappProbe {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub instance: String,
    #[serde(default)]
    pub api_key: String,
}

pub async fn test_whatsapp(
    State(state): State<Arc<AppState>>,
    Json(probe): Json<WhatsappProbe>,
) -> Response {
    let gateway = WhatsappSettings {
        enabled: true,
        base_url: probe.base_url.trim().to_string(),
        instance: probe.instance.trim().to_string(),
        api_key: probe.api_key.trim().to_string(),
    };
    if !gateway.is_configured() {
        return probe_failed("gateway URL, instance name and API key are required");
    }

    match state.messaging.connection_state(&gateway).await {
        Ok(info) => {
            let instance = info["instance"]["instanceName"]
                .as_str()
                .unwrap_or(&gateway.instance)
                .to_string();
            let status = info["instance"]["state"]
                .as_str()
                .or_else(|| info["instance"]["connectionStatus"].as_str())
                .unwrap_or("connected")
                .to_string();
            Json(json!({
                "success": true,
                "message": "Messaging gateway connection succeeded",
                "instance": instance,
                "status": status,
            }))
            .into_response()
        }
        Err(e) => {
            tracing::warn!(instance = %gateway.instance, error = %e, "messaging gateway probe failed");
            probe_failed(e.to_string())
        }
    }
}
