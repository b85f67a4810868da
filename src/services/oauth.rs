//! OAuth token lifecycle for the calendar provider.
//!
//! Tokens live in the `oauth_tokens` table, one row per provider. Reads go
//! through [`TokenManager::get_valid_access_token`], which refreshes tokens
//! that are inside the expiry margin. Concurrent refreshes are collapsed
//! behind a single async lock so a burst of requests spends the refresh
//! token once.

use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use anyhow::Context;
use chrono::{Duration, NaiveDateTime, Utc};
use rusqlite::Connection;
use serde::Deserialize;

use crate::db::{self, queries};
use crate::errors::AppError;
use crate::models::oauth_token::GOOGLE_CALENDAR_PROVIDER;
use crate::models::OAuthToken;

pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";

/// Tokens this close to expiry are refreshed before use.
pub const EXPIRY_MARGIN_SECS: i64 = 5 * 60;

#[derive(Debug, Clone)]
pub struct OAuthEndpoints {
    pub auth_url: String,
    pub token_url: String,
    pub revoke_url: String,
}

#[derive(Debug, Clone)]
pub struct OAuthClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    pub scope: Option<String>,
    pub token_type: Option<String>,
}

pub struct TokenManager {
    db: Arc<Mutex<Connection>>,
    endpoints: OAuthEndpoints,
    client: reqwest::Client,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl TokenManager {
    pub fn new(
        db: Arc<Mutex<Connection>>,
        endpoints: OAuthEndpoints,
        timeout: StdDuration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build OAuth HTTP client")?;
        Ok(Self {
            db,
            endpoints,
            client,
            refresh_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Consent URL requesting offline access. `prompt=consent` makes the
    /// provider issue a refresh token even when the user authorized before.
    pub fn authorization_url(&self, client_id: &str, redirect_uri: &str) -> anyhow::Result<String> {
        let url = reqwest::Url::parse_with_params(
            &self.endpoints.auth_url,
            &[
                ("client_id", client_id),
                ("redirect_uri", redirect_uri),
                ("scope", CALENDAR_SCOPE),
                ("response_type", "code"),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .context("invalid OAuth authorization endpoint")?;
        Ok(url.to_string())
    }

    pub async fn exchange_code(
        &self,
        credentials: &OAuthClientCredentials,
        redirect_uri: &str,
        code: &str,
    ) -> Result<TokenResponse, AppError> {
        self.token_request(&[
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
            ("code", code),
        ])
        .await
        .map_err(|e| AppError::Token(format!("OAuth token exchange failed: {e}")))
    }

    async fn refresh(
        &self,
        credentials: &OAuthClientCredentials,
        refresh_token: &str,
    ) -> anyhow::Result<TokenResponse> {
        self.token_request(&[
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .await
        .context("token refresh failed")
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> anyhow::Result<TokenResponse> {
        let resp = self
            .client
            .post(&self.endpoints.token_url)
            .form(form)
            .send()
            .await
            .context("failed to call OAuth token endpoint")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("{status}: {body}");
        }

        resp.json()
            .await
            .context("failed to parse OAuth token response")
    }

    /// Upserts the provider's token row. Expiry is `now + expires_in`; the
    /// previous refresh token is kept when the response carries none.
    pub fn save_tokens(
        &self,
        response: &TokenResponse,
        now: NaiveDateTime,
    ) -> Result<OAuthToken, AppError> {
        let expires_at = Duration::try_seconds(response.expires_in)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| {
                AppError::Token(format!("invalid token lifetime: {}s", response.expires_in))
            })?;

        let conn = db::lock(&self.db)?;
        let existing = queries::get_oauth_token(&conn, GOOGLE_CALENDAR_PROVIDER)?;

        let refresh_token = match (&response.refresh_token, &existing) {
            (Some(new), _) if !new.is_empty() => new.clone(),
            (_, Some(old)) => old.refresh_token.clone(),
            _ => {
                tracing::warn!("provider issued no refresh token, token will not auto-renew");
                String::new()
            }
        };

        let token = OAuthToken {
            provider: GOOGLE_CALENDAR_PROVIDER.to_string(),
            access_token: response.access_token.clone(),
            refresh_token,
            expires_at,
            scope: response.scope.clone(),
            created_at: existing.as_ref().map(|t| t.created_at).unwrap_or(now),
            updated_at: now,
        };
        queries::upsert_oauth_token(&conn, &token)?;
        Ok(token)
    }

    pub fn stored_token(&self) -> anyhow::Result<Option<OAuthToken>> {
        let conn = db::lock(&self.db)?;
        queries::get_oauth_token(&conn, GOOGLE_CALENDAR_PROVIDER)
    }

    fn load_token(&self) -> Option<OAuthToken> {
        self.stored_token()
            .map_err(|e| tracing::error!(error = %e, "failed to load OAuth token"))
            .ok()
            .flatten()
    }

    /// Returns a usable access token, refreshing it when it is inside the
    /// expiry margin. Every failure is logged and yields `None`.
    pub async fn get_valid_access_token(
        &self,
        credentials: &OAuthClientCredentials,
    ) -> Option<String> {
        let margin = Duration::seconds(EXPIRY_MARGIN_SECS);

        let token = self.load_token()?;
        if token.is_fresh(Utc::now().naive_utc(), margin) {
            return Some(token.access_token);
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited.
        let token = self.load_token()?;
        if token.is_fresh(Utc::now().naive_utc(), margin) {
            return Some(token.access_token);
        }

        if token.refresh_token.is_empty() {
            tracing::warn!("OAuth token expired and no refresh token is stored");
            return None;
        }

        tracing::info!("OAuth token near expiry, refreshing");
        let refreshed = match self.refresh(credentials, &token.refresh_token).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "OAuth refresh failed");
                return None;
            }
        };

        match self.save_tokens(&refreshed, Utc::now().naive_utc()) {
            Ok(saved) => Some(saved.access_token),
            Err(e) => {
                tracing::error!(error = %e, "failed to persist refreshed OAuth token");
                None
            }
        }
    }

    /// Asks the provider to revoke the refresh token, then deletes the local
    /// row regardless of the remote outcome. Returns whether a row existed.
    pub async fn revoke(&self) -> anyhow::Result<bool> {
        let Some(token) = self.stored_token()? else {
            return Ok(false);
        };

        let result = self
            .client
            .post(&self.endpoints.revoke_url)
            .query(&[("token", token.refresh_token.as_str())])
            .send()
            .await;
        match result {
            Ok(resp) => tracing::info!(status = %resp.status(), "OAuth revocation requested"),
            Err(e) => tracing::warn!(error = %e, "OAuth revocation request failed"),
        }

        let conn = db::lock(&self.db)?;
        queries::delete_oauth_token(&conn, GOOGLE_CALENDAR_PROVIDER)
    }
}
