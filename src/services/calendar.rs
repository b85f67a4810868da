use std::time::Duration as StdDuration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::models::Appointment;

/// Appointments are booked in a single fixed zone, UTC-3.
pub const BOOKING_UTC_OFFSET_SECS: i32 = -3 * 3600;
pub const EVENT_TIME_ZONE: &str = "America/Sao_Paulo";
pub const APPOINTMENT_MINUTES: i64 = 60;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CalendarEvent {
    pub summary: String,
    pub description: String,
    pub start: EventTime,
    pub end: EventTime,
    pub attendees: Vec<Attendee>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    pub date_time: String,
    pub time_zone: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Attendee {
    pub email: String,
}

#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// Creates the event and returns its provider id.
    async fn create_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event: &CalendarEvent,
    ) -> anyhow::Result<String>;

    /// Fetches one calendar and returns its display name.
    async fn calendar_summary(&self, access_token: &str, calendar_id: &str)
        -> anyhow::Result<String>;

    /// Number of calendars visible to the token.
    async fn count_calendars(&self, access_token: &str) -> anyhow::Result<usize>;
}

pub fn appointment_start(appointment: &Appointment) -> DateTime<FixedOffset> {
    let offset = FixedOffset::east_opt(BOOKING_UTC_OFFSET_SECS).expect("UTC-3 is a valid offset");
    let local = appointment.date.and_time(appointment.time.to_naive_time());
    let utc = local - Duration::seconds(offset.local_minus_utc() as i64);
    DateTime::from_naive_utc_and_offset(utc, offset)
}

pub fn build_event(appointment: &Appointment) -> CalendarEvent {
    let start = appointment_start(appointment);
    let end = start + Duration::minutes(APPOINTMENT_MINUTES);

    let mut lines = vec![
        format!("Paciente: {}", appointment.name),
        format!("Telefone: {}", appointment.phone),
    ];
    let optional = [
        ("Email", &appointment.email),
        ("Serviço", &appointment.service),
        ("Observações", &appointment.notes),
    ];
    for (label, value) in optional {
        if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            lines.push(format!("{label}: {v}"));
        }
    }

    let attendees = appointment
        .email
        .iter()
        .filter(|e| !e.trim().is_empty())
        .map(|e| Attendee { email: e.trim().to_string() })
        .collect();

    CalendarEvent {
        summary: format!("Agendamento - {}", appointment.name),
        description: lines.join("\n"),
        start: EventTime {
            date_time: start.to_rfc3339(),
            time_zone: EVENT_TIME_ZONE.to_string(),
        },
        end: EventTime {
            date_time: end.to_rfc3339(),
            time_zone: EVENT_TIME_ZONE.to_string(),
        },
        attendees,
    }
}

/// Turns a Google API error status into a message an operator can act on.
pub fn describe_google_error(status: u16, body: &str) -> String {
    match status {
        401 => "invalid or expired access token".to_string(),
        403 => "access denied, check that the Calendar API is enabled for the project".to_string(),
        404 => "calendar not found, check the calendar id or use 'primary'".to_string(),
        _ => format!("Google Calendar API error ({status}): {body}"),
    }
}

pub struct GoogleCalendarClient {
    base_url: String,
    client: reqwest::Client,
}

impl GoogleCalendarClient {
    pub fn new(base_url: String, timeout: StdDuration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build calendar HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Appends percent-encoded path segments to the API base.
    fn endpoint(&self, segments: &[&str]) -> anyhow::Result<reqwest::Url> {
        let mut url =
            reqwest::Url::parse(&self.base_url).context("invalid calendar API base URL")?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("calendar API base URL cannot take a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[derive(Deserialize)]
struct CreatedEvent {
    id: String,
}

#[derive(Deserialize)]
struct CalendarResource {
    id: String,
    summary: Option<String>,
}

#[derive(Deserialize)]
struct CalendarList {
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

#[async_trait]
impl CalendarProvider for GoogleCalendarClient {
    async fn create_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event: &CalendarEvent,
    ) -> anyhow::Result<String> {
        let url = self.endpoint(&["calendars", calendar_id, "events"])?;

        let resp = self
            .client
            .post(url)
            .bearer_auth(access_token)
            .json(event)
            .send()
            .await
            .context("failed to call Google Calendar API")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Google Calendar API error ({}): {}", status, body);
        }

        let created: CreatedEvent = resp
            .json()
            .await
            .context("failed to parse Google Calendar response")?;
        Ok(created.id)
    }

    async fn calendar_summary(
        &self,
        access_token: &str,
        calendar_id: &str,
    ) -> anyhow::Result<String> {
        let url = self.endpoint(&["calendars", calendar_id])?;

        let resp = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .context("failed to call Google Calendar API")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!(describe_google_error(status.as_u16(), &body));
        }

        let calendar: CalendarResource = resp
            .json()
            .await
            .context("failed to parse Google Calendar response")?;
        Ok(calendar.summary.unwrap_or(calendar.id))
    }

    async fn count_calendars(&self, access_token: &str) -> anyhow::Result<usize> {
        let url = self.endpoint(&["users", "me", "calendarList"])?;

        let resp = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .context("failed to call Google Calendar API")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!(describe_google_error(status.as_u16(), &body));
        }

        let list: CalendarList = resp
            .json()
            .await
            .context("failed to parse calendar list")?;
        Ok(list.items.len())
    }
}
