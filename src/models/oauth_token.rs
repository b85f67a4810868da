use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

pub const GOOGLE_CALENDAR_PROVIDER: &str = "google_calendar";

/// Stored OAuth credentials for one provider. Timestamps are UTC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthToken {
    pub provider: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: NaiveDateTime,
    pub scope: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl OAuthToken {
    /// True while `now` is still before `expires_at - margin`.
    pub fn is_fresh(&self, now: NaiveDateTime, margin: Duration) -> bool {
        now < self.expires_at - margin
    }
}
