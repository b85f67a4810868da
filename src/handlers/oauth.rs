use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::errors::AppError;
use crate::services::oauth::OAuthClientCredentials;
use crate::services::settings;
use crate::state::AppState;

const CALLBACK_PATH: &str = "/api/oauth/google/callback";

/// Public base URL, or one rebuilt from the proxy/host headers.
fn redirect_uri(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(base) = &state.config.public_base_url {
        return format!("{base}{CALLBACK_PATH}");
    }
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    let proto = header("x-forwarded-proto").unwrap_or("http");
    let host = header("x-forwarded-host")
        .or_else(|| header("host"))
        .map(str::to_string)
        .unwrap_or_else(|| format!("localhost:{}", state.config.port));
    format!("{proto}://{host}{CALLBACK_PATH}")
}

fn stored_credentials(state: &AppState) -> Result<OAuthClientCredentials, AppError> {
    let conn = state.db()?;
    let calendar = settings::load_settings(&conn, &state.cipher)?.google_calendar;
    Ok(OAuthClientCredentials {
        client_id: calendar.client_id,
        client_secret: calendar.client_secret,
    })
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn result_page(status: StatusCode, ok: bool, title: &str, detail: &str) -> Response {
    let color = if ok { "green" } else { "red" };
    let close = if ok {
        "<script>setTimeout(() => window.close(), 3000);</script>"
    } else {
        ""
    };
    let body = format!(
        r#"<html>
  <body style="font-family: Arial; text-align: center; padding: 50px;">
    <h2 style="color: {color};">{}</h2>
    <p>{}</p>
    <p>You can close this tab and return to the application.</p>
    {close}
  </body>
</html>"#,
        escape_html(title),
        escape_html(detail),
    );
    (status, Html(body)).into_response()
}

// POST /api/oauth/google/start
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
}

pub async fn start(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<StartRequest>,
) -> Result<Response, AppError> {
    let client_id = req.client_id.trim();
    let client_secret = req.client_secret.trim();
    if client_id.is_empty() || client_secret.is_empty() {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "message": "client ID and client secret are required" })),
        )
            .into_response());
    }

    // The callback reads the client credentials back from the settings store
    {
        let conn = state.db()?;
        let mut current = settings::load_settings(&conn, &state.cipher)?;
        current.google_calendar.client_id = client_id.to_string();
        current.google_calendar.client_secret = client_secret.to_string();
        current.google_calendar.use_oauth = true;
        settings::save_settings(&conn, &state.cipher, &current)?;
    }

    let redirect = redirect_uri(&state, &headers);
    let auth_url = state.tokens.authorization_url(client_id, &redirect)?;
    tracing::info!(redirect_uri = %redirect, "OAuth authorization started");

    Ok(Json(json!({ "success": true, "authUrl": auth_url })).into_response())
}

// GET /api/oauth/google/callback
#[derive(Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub error: Option<String>,
}

pub async fn callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> Response {
    if let Some(error) = query.error {
        tracing::warn!(error = %error, "OAuth authorization denied");
        state
            .notifier
            .error("Google Calendar authorization failed", format!("Provider returned: {error}"));
        return result_page(StatusCode::BAD_REQUEST, false, "Authorization error", &error);
    }

    let Some(code) = query.code.filter(|c| !c.is_empty()) else {
        return result_page(
            StatusCode::BAD_REQUEST,
            false,
            "Missing authorization code",
            "The provider did not return an authorization code.",
        );
    };

    let credentials = match stored_credentials(&state) {
        Ok(c) if !c.client_id.trim().is_empty() && !c.client_secret.trim().is_empty() => c,
        Ok(_) => {
            return result_page(
                StatusCode::BAD_REQUEST,
                false,
                "Incomplete configuration",
                "Client ID or client secret is not configured.",
            )
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to load settings for OAuth callback");
            return result_page(
                StatusCode::INTERNAL_SERVER_ERROR,
                false,
                "Server error",
                "Could not load the integration settings.",
            );
        }
    };

    let redirect = redirect_uri(&state, &headers);
    let saved = match state.tokens.exchange_code(&credentials, &redirect, &code).await {
        Ok(response) => state.tokens.save_tokens(&response, Utc::now().naive_utc()),
        Err(e) => Err(e),
    };

    match saved {
        Ok(token) => {
            tracing::info!(expires_at = %token.expires_at, "OAuth tokens stored");
            state.notifier.success(
                "Google Calendar authorized",
                "Tokens were stored and will be renewed automatically",
            );
            result_page(
                StatusCode::OK,
                true,
                "Authorization complete",
                "Google Calendar was authorized. Tokens will be renewed automatically.",
            )
        }
        Err(e) => {
            tracing::error!(error = %e, "OAuth callback failed");
            state
                .notifier
                .error("Google Calendar authorization failed", e.to_string());
            result_page(
                StatusCode::INTERNAL_SERVER_ERROR,
                false,
                "Server error",
                &format!("Failed to process authorization: {e}"),
            )
        }
    }
}

// GET /api/oauth/google/status
pub async fn status(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, AppError> {
    let credentials = stored_credentials(&state)?;
    let token = state.tokens.get_valid_access_token(&credentials).await;

    let connection = match &token {
        None => json!({ "success": false, "message": "no token found, authorize first" }),
        Some(token) => match state.calendar.count_calendars(token).await {
            Ok(count) => json!({
                "success": true,
                "message": format!("Connection succeeded, {count} calendars found"),
            }),
            Err(e) => json!({ "success": false, "message": format!("Connection failed: {e}") }),
        },
    };

    Ok(Json(json!({
        "authorized": token.is_some(),
        "connection": connection,
    })))
}

// POST /api/oauth/google/revoke
pub async fn revoke(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, AppError> {
    let revoked = state.tokens.revoke().await?;
    if revoked {
        state
            .notifier
            .info("Google Calendar disconnected", "OAuth tokens were revoked");
    }
    Ok(Json(json!({ "success": true, "revoked": revoked })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<script>"x" & y</script>"#),
            "&lt;script&gt;&quot;x&quot; &amp; y&lt;/script&gt;"
        );
    }
}
