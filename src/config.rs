use std::env;

pub const DEFAULT_ENCRYPTION_KEY: &str = "slotbook-development-key-change-me";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub encryption_key: String,
    pub public_base_url: Option<String>,
    pub google_auth_url: String,
    pub google_token_url: String,
    pub google_revoke_url: String,
    pub google_calendar_api: String,
    pub integration_timeout_secs: u64,
    pub same_day_lead_hhmm: u32,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "slotbook.db".to_string()),
            encryption_key: env::var("ENCRYPTION_KEY")
                .unwrap_or_else(|_| DEFAULT_ENCRYPTION_KEY.to_string()),
            public_base_url: env::var("PUBLIC_BASE_URL")
                .ok()
                .map(|v| v.trim_end_matches('/').to_string())
                .filter(|v| !v.is_empty()),
            google_auth_url: env::var("GOOGLE_AUTH_URL")
                .unwrap_or_else(|_| "https://accounts.google.com/o/oauth2/v2/auth".to_string()),
            google_token_url: env::var("GOOGLE_TOKEN_URL")
                .unwrap_or_else(|_| "https://oauth2.googleapis.com/token".to_string()),
            google_revoke_url: env::var("GOOGLE_REVOKE_URL")
                .unwrap_or_else(|_| "https://oauth2.googleapis.com/revoke".to_string()),
            google_calendar_api: env::var("GOOGLE_CALENDAR_API")
                .unwrap_or_else(|_| "https://www.googleapis.com/calendar/v3".to_string()),
            integration_timeout_secs: env::var("INTEGRATION_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(8),
            same_day_lead_hhmm: env::var("SAME_DAY_LEAD_HHMM")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(100),
        }
    }

    pub fn integration_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.integration_timeout_secs)
    }
}
