use serde::{Deserialize, Serialize};

/// Settings for the calendar and messaging integrations. Missing fields
/// take their defaults, so a partial document merges over the defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct IntegrationSettings {
    pub google_calendar: CalendarSettings,
    pub whatsapp: WhatsappSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CalendarSettings {
    pub enabled: bool,
    pub calendar_id: String,
    /// Manually pasted access token, used when OAuth yields nothing.
    pub access_token: String,
    pub use_oauth: bool,
    pub client_id: String,
    pub client_secret: String,
}

impl Default for CalendarSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            calendar_id: "primary".to_string(),
            access_token: String::new(),
            use_oauth: false,
            client_id: String::new(),
            client_secret: String::new(),
        }
    }
}

impl CalendarSettings {
    pub fn calendar_id_or_primary(&self) -> &str {
        let id = self.calendar_id.trim();
        if id.is_empty() {
            "primary"
        } else {
            id
        }
    }

    pub fn has_oauth_client(&self) -> bool {
        !self.client_id.trim().is_empty() && !self.client_secret.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct WhatsappSettings {
    pub enabled: bool,
    /// Base URL of the messaging gateway.
    pub base_url: String,
    /// Gateway instance that sends the message.
    pub instance: String,
    pub api_key: String,
}

impl Default for WhatsappSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: String::new(),
            instance: String::new(),
            api_key: String::new(),
        }
    }
}

impl WhatsappSettings {
    pub fn is_configured(&self) -> bool {
        !self.base_url.trim().is_empty()
            && !self.instance.trim().is_empty()
            && !self.api_key.trim().is_empty()
    }
}

impl IntegrationSettings {
    /// Returns one message per invalid field; empty when the settings are usable.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = vec![];
        let url = self.whatsapp.base_url.trim();
        if !url.is_empty() && !(url.starts_with("http://") || url.starts_with("https://")) {
            problems.push(format!("whatsapp.baseUrl must be an http(s) URL: {url}"));
        }
        if self.google_calendar.calendar_id.contains('/') {
            problems.push("googleCalendar.calendarId must not contain '/'".to_string());
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_document_merges_defaults() {
        let json = r#"{"whatsapp":{"baseUrl":"https://gw.example.com"}}"#;
        let settings: IntegrationSettings = serde_json::from_str(json).unwrap();
        assert!(settings.google_calendar.enabled);
        assert_eq!(settings.google_calendar.calendar_id, "primary");
        assert_eq!(settings.whatsapp.base_url, "https://gw.example.com");
        assert!(settings.whatsapp.enabled);
        assert!(!settings.whatsapp.is_configured());
    }

    #[test]
    fn test_validate_rejects_bad_gateway_url() {
        let mut settings = IntegrationSettings::default();
        settings.whatsapp.base_url = "ftp://gw".to_string();
        assert_eq!(settings.validate().len(), 1);

        settings.whatsapp.base_url = "http://gw".to_string();
        assert!(settings.validate().is_empty());
    }

    #[test]
    fn test_calendar_id_fallback() {
        let mut cal = CalendarSettings::default();
        cal.calendar_id = "  ".to_string();
        assert_eq!(cal.calendar_id_or_primary(), "primary");
    }
}
