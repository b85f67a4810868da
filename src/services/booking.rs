//! Reservation of a slot and the best-effort side effects that follow it.

use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::anyhow;
use chrono::NaiveDateTime;
use regex::Regex;
use serde_json::{Map, Value};

use crate::db::queries;
use crate::errors::{AppError, FieldError};
use crate::models::{Appointment, CalendarSettings, IntegrationSettings, NewAppointment, SlotTime};
use crate::services::availability::parse_date;
use crate::services::calendar::build_event;
use crate::services::messaging::{confirmation_message, normalize_phone};
use crate::services::oauth::OAuthClientCredentials;
use crate::services::settings;
use crate::state::AppState;

const MIN_NAME_CHARS: usize = 2;
const MIN_PHONE_DIGITS: usize = 10;

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"))
}

/// Booking form as submitted by the client.
#[derive(Debug, Clone, Default)]
pub struct BookingRequest {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub service: Option<String>,
    pub notes: Option<String>,
    pub date: String,
    pub time: String,
}

/// Absent and `null` read as `None`; any non-string value is a field error.
fn text_field(body: &Map<String, Value>, field: &'static str, errors: &mut Vec<FieldError>) -> Option<String> {
    match body.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            errors.push(FieldError::new(field, format!("{field} must be a string")));
            None
        }
    }
}

impl BookingRequest {
    /// Reads the form from a JSON body. Wrongly typed fields are reported
    /// together with every other invalid field.
    pub fn from_json(body: &Value) -> Result<Self, AppError> {
        let Some(body) = body.as_object() else {
            return Err(AppError::InvalidInput(
                "request body must be a JSON object".to_string(),
            ));
        };

        let mut errors = vec![];
        let request = BookingRequest {
            name: text_field(body, "name", &mut errors).unwrap_or_default(),
            phone: text_field(body, "phone", &mut errors).unwrap_or_default(),
            email: text_field(body, "email", &mut errors),
            service: text_field(body, "service", &mut errors),
            notes: text_field(body, "notes", &mut errors),
            date: text_field(body, "date", &mut errors).unwrap_or_default(),
            time: text_field(body, "time", &mut errors).unwrap_or_default(),
        };
        if errors.is_empty() {
            return Ok(request);
        }

        let mistyped: Vec<&'static str> = errors.iter().map(|e| e.field).collect();
        if let Err(AppError::Validation(rest)) = request.validate() {
            errors.extend(rest.into_iter().filter(|e| !mistyped.contains(&e.field)));
        }
        Err(AppError::Validation(errors))
    }

    /// Checks every field and reports all violations at once.
    pub fn validate(&self) -> Result<NewAppointment, AppError> {
        let mut errors = vec![];

        let name = self.name.trim();
        if name.chars().count() < MIN_NAME_CHARS {
            errors.push(FieldError::new(
                "name",
                format!("name must have at least {MIN_NAME_CHARS} characters"),
            ));
        }

        let phone = self.phone.trim();
        if phone.chars().filter(char::is_ascii_digit).count() < MIN_PHONE_DIGITS {
            errors.push(FieldError::new(
                "phone",
                format!("phone must have at least {MIN_PHONE_DIGITS} digits"),
            ));
        }

        let email = optional(&self.email);
        if let Some(email) = &email {
            if !email_pattern().is_match(email) {
                errors.push(FieldError::new("email", "invalid email address"));
            }
        }

        let date = match parse_date(self.date.trim()) {
            Ok(date) => Some(date),
            Err(_) => {
                errors.push(FieldError::new("date", "date must be a valid YYYY-MM-DD date"));
                None
            }
        };

        let time = match self.time.trim().parse::<SlotTime>() {
            Ok(time) if time.is_on_grid() => Some(time),
            Ok(_) => {
                errors.push(FieldError::new("time", "time is not an available booking slot"));
                None
            }
            Err(_) => {
                errors.push(FieldError::new("time", "time must be in HH:MM format"));
                None
            }
        };

        match (date, time) {
            (Some(date), Some(time)) if errors.is_empty() => Ok(NewAppointment {
                name: name.to_string(),
                phone: phone.to_string(),
                email,
                service: optional(&self.service),
                notes: optional(&self.notes),
                date,
                time,
            }),
            _ => Err(AppError::Validation(errors)),
        }
    }
}

fn optional(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone)]
pub struct BookingOutcome {
    pub appointment: Appointment,
    pub calendar_synced: bool,
    pub whatsapp_sent: bool,
}

/// Validates the request, claims the slot and then runs calendar sync and
/// the confirmation message concurrently. Side-effect failures are logged
/// and reported through the outcome flags, never as an error.
pub async fn reserve_slot(
    state: &AppState,
    request: &BookingRequest,
    now: NaiveDateTime,
) -> Result<BookingOutcome, AppError> {
    let new = request.validate()?;

    let mut appointment = {
        let conn = state.db()?;
        if queries::is_slot_taken(&conn, new.date, new.time)? {
            return Err(AppError::SlotConflict);
        }
        // The partial unique index catches anything that slipped past the check
        queries::create_appointment(&conn, &new, now)?.ok_or(AppError::SlotConflict)?
    };

    tracing::info!(
        id = appointment.id,
        date = %appointment.date,
        time = %appointment.time,
        "appointment booked"
    );

    let settings = current_settings(state);
    let limit = state.config.integration_timeout();

    let (calendar, whatsapp) = tokio::join!(
        bounded(limit, "calendar sync", sync_calendar(state, &settings, &appointment)),
        bounded(limit, "whatsapp confirmation", send_confirmation(state, &settings, &appointment)),
    );

    let calendar_synced = match calendar {
        Ok(Some(event_id)) => {
            match state.db().and_then(|conn| queries::set_google_event_id(&conn, appointment.id, &event_id)) {
                Ok(_) => {}
                Err(e) => tracing::error!(id = appointment.id, error = %e, "failed to store calendar event id"),
            }
            tracing::info!(id = appointment.id, event_id = %event_id, "calendar event created");
            appointment.google_event_id = Some(event_id);
            true
        }
        Ok(None) => false,
        Err(e) => {
            let reason = format!("{e:#}");
            tracing::warn!(id = appointment.id, error = %reason, "calendar sync failed");
            state.notifier.warning(
                "Calendar sync failed",
                format!("Appointment #{} was saved but not added to the calendar: {reason}", appointment.id),
            );
            false
        }
    };

    let whatsapp_sent = match whatsapp {
        Ok(true) => {
            if let Err(e) = state.db().and_then(|conn| queries::set_whatsapp_sent(&conn, appointment.id, true)) {
                tracing::error!(id = appointment.id, error = %e, "failed to store whatsapp flag");
            }
            tracing::info!(id = appointment.id, "whatsapp confirmation sent");
            appointment.whatsapp_sent = true;
            true
        }
        Ok(false) => false,
        Err(e) => {
            let reason = format!("{e:#}");
            tracing::warn!(id = appointment.id, error = %reason, "whatsapp confirmation failed");
            state.notifier.warning(
                "WhatsApp message failed",
                format!("Appointment #{} was saved but no confirmation was sent: {reason}", appointment.id),
            );
            false
        }
    };

    state.notifier.success(
        "New appointment",
        format!(
            "{} booked {} at {}",
            appointment.name,
            appointment.date.format("%d/%m/%Y"),
            appointment.time
        ),
    );

    Ok(BookingOutcome {
        appointment,
        calendar_synced,
        whatsapp_sent,
    })
}

fn current_settings(state: &AppState) -> IntegrationSettings {
    state
        .db()
        .and_then(|conn| settings::load_settings(&conn, &state.cipher))
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to load integration settings, side effects use defaults");
            IntegrationSettings::default()
        })
}

async fn bounded<T>(
    limit: Duration,
    what: &str,
    fut: impl Future<Output = anyhow::Result<T>>,
) -> anyhow::Result<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| anyhow!("{what} timed out after {}s", limit.as_secs()))?
}

/// OAuth token first, then the manually configured one.
pub async fn resolve_calendar_token(state: &AppState, calendar: &CalendarSettings) -> Option<String> {
    if calendar.use_oauth && calendar.has_oauth_client() {
        let credentials = OAuthClientCredentials {
            client_id: calendar.client_id.clone(),
            client_secret: calendar.client_secret.clone(),
        };
        if let Some(token) = state.tokens.get_valid_access_token(&credentials).await {
            return Some(token);
        }
        tracing::warn!("no valid OAuth token, falling back to the configured access token");
    }

    let manual = calendar.access_token.trim();
    (!manual.is_empty()).then(|| manual.to_string())
}

/// `Ok(None)` when sync is disabled.
async fn sync_calendar(
    state: &AppState,
    settings: &IntegrationSettings,
    appointment: &Appointment,
) -> anyhow::Result<Option<String>> {
    let calendar = &settings.google_calendar;
    if !calendar.enabled {
        tracing::debug!("calendar sync disabled");
        return Ok(None);
    }

    let token = resolve_calendar_token(state, calendar)
        .await
        .ok_or_else(|| anyhow!("no calendar access token configured"))?;

    let event = build_event(appointment);
    let id = state
        .calendar
        .create_event(&token, calendar.calendar_id_or_primary(), &event)
        .await?;
    Ok(Some(id))
}

/// `Ok(false)` when messaging is disabled.
async fn send_confirmation(
    state: &AppState,
    settings: &IntegrationSettings,
    appointment: &Appointment,
) -> anyhow::Result<bool> {
    let gateway = &settings.whatsapp;
    if !gateway.enabled {
        tracing::debug!("whatsapp confirmation disabled");
        return Ok(false);
    }
    if !gateway.is_configured() {
        anyhow::bail!("whatsapp gateway is not configured");
    }

    let number = normalize_phone(&appointment.phone);
    let text = confirmation_message(appointment);
    let ack = state.messaging.send_text(gateway, &number, &text).await?;
    tracing::debug!(ack = %ack, "gateway acknowledged message");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> BookingRequest {
        BookingRequest {
            name: "Ana Silva".to_string(),
            phone: "(11) 99999-8888".to_string(),
            email: Some(String::new()),
            service: Some("Consulta".to_string()),
            notes: None,
            date: "2025-03-10".to_string(),
            time: "10:00".to_string(),
        }
    }

    fn fields(err: AppError) -> Vec<&'static str> {
        match err {
            AppError::Validation(errors) => errors.into_iter().map(|e| e.field).collect(),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_request() {
        let new = request().validate().unwrap();
        assert_eq!(new.name, "Ana Silva");
        assert_eq!(new.email, None);
        assert_eq!(new.service.as_deref(), Some("Consulta"));
        assert_eq!(new.time.to_string(), "10:00");
    }

    #[test]
    fn test_collects_every_invalid_field() {
        let req = BookingRequest {
            name: " A ".to_string(),
            phone: "12345".to_string(),
            email: Some("not-an-email".to_string()),
            service: None,
            notes: None,
            date: "2025-02-30".to_string(),
            time: "9:00".to_string(),
        };
        assert_eq!(
            fields(req.validate().unwrap_err()),
            vec!["name", "phone", "email", "date", "time"]
        );
    }

    #[test]
    fn test_from_json_reads_strings_and_nulls() {
        let body = serde_json::json!({
            "name": "Ana Silva",
            "phone": "11999998888",
            "email": null,
            "date": "2025-03-10",
            "time": "10:00",
        });
        let req = BookingRequest::from_json(&body).unwrap();
        assert_eq!(req.phone, "11999998888");
        assert_eq!(req.email, None);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_from_json_reports_mistyped_with_other_fields() {
        let body = serde_json::json!({
            "name": "A",
            "phone": 11999998888u64,
            "date": "2025-03-10",
            "time": 10,
        });
        let err = BookingRequest::from_json(&body).unwrap_err();
        assert_eq!(fields(err), vec!["phone", "time", "name"]);

        let err = BookingRequest::from_json(&serde_json::json!(["Ana"])).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn test_off_grid_time_rejected() {
        let mut req = request();
        req.time = "10:15".to_string();
        assert_eq!(fields(req.validate().unwrap_err()), vec!["time"]);

        req.time = "18:00".to_string();
        assert_eq!(fields(req.validate().unwrap_err()), vec!["time"]);
    }

    #[test]
    fn test_valid_email_accepted() {
        let mut req = request();
        req.email = Some("ana@example.com".to_string());
        assert_eq!(req.validate().unwrap().email.as_deref(), Some("ana@example.com"));
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let result: anyhow::Result<()> = bounded(Duration::from_millis(10), "slow call", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(result.unwrap_err().to_string().contains("slow call timed out"));
    }
}
