use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use crate::config::AppConfig;
use crate::services::calendar::CalendarProvider;
use crate::services::crypto::ConfigCipher;
use crate::services::messaging::MessagingProvider;
use crate::services::notifications::Notifier;
use crate::services::oauth::TokenManager;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub cipher: ConfigCipher,
    pub calendar: Box<dyn CalendarProvider>,
    pub messaging: Box<dyn MessagingProvider>,
    pub tokens: TokenManager,
    pub notifier: Notifier,
}

impl AppState {
    pub fn db(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        crate::db::lock(&self.db)
    }
}
