use std::sync::{Arc, Mutex};

use tracing_subscriber::EnvFilter;

use slotbook::config::{AppConfig, DEFAULT_ENCRYPTION_KEY};
use slotbook::db;
use slotbook::routes;
use slotbook::services::calendar::GoogleCalendarClient;
use slotbook::services::crypto::ConfigCipher;
use slotbook::services::messaging::evolution::EvolutionGateway;
use slotbook::services::notifications::Notifier;
use slotbook::services::oauth::{OAuthEndpoints, TokenManager};
use slotbook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .init();

    let config = AppConfig::from_env();
    if config.encryption_key == DEFAULT_ENCRYPTION_KEY {
        tracing::warn!("ENCRYPTION_KEY not set, stored credentials use the built-in development key");
    }

    let db = Arc::new(Mutex::new(db::init_db(&config.database_url)?));

    let timeout = config.integration_timeout();
    let calendar = GoogleCalendarClient::new(config.google_calendar_api.clone(), timeout)?;
    let messaging = EvolutionGateway::new(timeout)?;
    let tokens = TokenManager::new(
        db.clone(),
        OAuthEndpoints {
            auth_url: config.google_auth_url.clone(),
            token_url: config.google_token_url.clone(),
            revoke_url: config.google_revoke_url.clone(),
        },
        timeout,
    )?;

    let state = Arc::new(AppState {
        db,
        config: config.clone(),
        cipher: ConfigCipher::new(&config.encryption_key),
        calendar: Box::new(calendar),
        messaging: Box::new(messaging),
        tokens,
        notifier: Notifier::new(),
    });

    state
        .notifier
        .info("Service started", format!("Listening on port {}", config.port));

    let app = routes::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
