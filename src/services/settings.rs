use rusqlite::Connection;

use crate::db::queries;
use crate::models::IntegrationSettings;
use crate::services::crypto::ConfigCipher;

const SETTINGS_KEY: &str = "app_config";

/// Loads the integration settings, falling back to defaults when nothing is
/// stored or the stored blob cannot be decrypted or parsed.
pub fn load_settings(conn: &Connection, cipher: &ConfigCipher) -> anyhow::Result<IntegrationSettings> {
    let Some(blob) = queries::get_config_value(conn, SETTINGS_KEY)? else {
        tracing::debug!("no integration settings stored, using defaults");
        return Ok(IntegrationSettings::default());
    };

    let json = match cipher.decrypt(&blob) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(error = %e, "failed to decrypt integration settings, using defaults");
            return Ok(IntegrationSettings::default());
        }
    };

    match serde_json::from_str(&json) {
        Ok(settings) => Ok(settings),
        Err(e) => {
            tracing::error!(error = %e, "failed to parse integration settings, using defaults");
            Ok(IntegrationSettings::default())
        }
    }
}

pub fn save_settings(
    conn: &Connection,
    cipher: &ConfigCipher,
    settings: &IntegrationSettings,
) -> anyhow::Result<()> {
    let json = serde_json::to_string(settings)?;
    let blob = cipher.encrypt(&json)?;
    queries::save_config_value(conn, SETTINGS_KEY, &blob)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn test_defaults_when_empty() {
        let conn = db::init_db(":memory:").unwrap();
        let cipher = ConfigCipher::new("k");
        assert_eq!(load_settings(&conn, &cipher).unwrap(), IntegrationSettings::default());
    }

    #[test]
    fn test_save_and_load_encrypted() {
        let conn = db::init_db(":memory:").unwrap();
        let cipher = ConfigCipher::new("k");

        let mut settings = IntegrationSettings::default();
        settings.whatsapp.api_key = "super-secret".to_string();
        settings.google_calendar.calendar_id = "team@group.calendar.google.com".to_string();
        save_settings(&conn, &cipher, &settings).unwrap();

        let raw = queries::get_config_value(&conn, SETTINGS_KEY).unwrap().unwrap();
        assert!(!raw.contains("super-secret"));

        assert_eq!(load_settings(&conn, &cipher).unwrap(), settings);
    }

    #[test]
    fn test_wrong_key_falls_back_to_defaults() {
        let conn = db::init_db(":memory:").unwrap();
        let mut settings = IntegrationSettings::default();
        settings.whatsapp.instance = "clinic".to_string();
        save_settings(&conn, &ConfigCipher::new("one"), &settings).unwrap();

        let loaded = load_settings(&conn, &ConfigCipher::new("two")).unwrap();
        assert_eq!(loaded, IntegrationSettings::default());
    }
}
