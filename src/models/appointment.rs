use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::SlotTime;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: i64,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub service: Option<String>,
    pub notes: Option<String>,
    pub date: NaiveDate,
    pub time: SlotTime,
    pub status: AppointmentStatus,
    pub google_event_id: Option<String>,
    pub whatsapp_sent: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Confirmed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "cancelled" => AppointmentStatus::Cancelled,
            _ => AppointmentStatus::Confirmed,
        }
    }
}

/// A booking that has passed validation and is ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAppointment {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub service: Option<String>,
    pub notes: Option<String>,
    pub date: NaiveDate,
    pub time: SlotTime,
}
