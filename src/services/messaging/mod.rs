pub mod evolution;

use async_trait::async_trait;

use crate::models::{Appointment, WhatsappSettings};

pub const COUNTRY_CODE: &str = "55";

#[async_trait]
pub trait MessagingProvider: Send + Sync {
    /// Sends a text message and returns the gateway's acknowledgment.
    async fn send_text(
        &self,
        gateway: &WhatsappSettings,
        number: &str,
        text: &str,
    ) -> anyhow::Result<serde_json::Value>;

    /// Reads the gateway instance's connection state.
    async fn connection_state(&self, gateway: &WhatsappSettings)
        -> anyhow::Result<serde_json::Value>;
}

/// Strips everything but digits and prefixes the country code when missing.
pub fn normalize_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    if digits.starts_with(COUNTRY_CODE) {
        digits
    } else {
        format!("{COUNTRY_CODE}{digits}")
    }
}

pub fn confirmation_message(appointment: &Appointment) -> String {
    let mut lines = vec![
        "🗓️ *Agendamento Confirmado!*".to_string(),
        String::new(),
        format!("📅 Data: {}", appointment.date.format("%d/%m/%Y")),
        format!("🕐 Horário: {}", appointment.time),
        format!("👤 Nome: {}", appointment.name),
    ];
    if let Some(service) = non_blank(&appointment.service) {
        lines.push(format!("🏥 Serviço: {service}"));
    }
    lines.push(String::new());
    lines.push("Seu agendamento foi confirmado com sucesso!".to_string());
    if let Some(notes) = non_blank(&appointment.notes) {
        lines.push(String::new());
        lines.push(format!("📝 Observações: {notes}"));
    }
    lines.push(String::new());
    lines.push("Para cancelar ou reagendar, entre em contato conosco.".to_string());
    lines.join("\n")
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
