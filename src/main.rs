use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use pitchbook::config::AppConfig;
use pitchbook::db;
use pitchbook::handlers;
use pitchbook::services::auth::SessionAuth;
use pitchbook::services::notify::webhook::WebhookNotifier;
use pitchbook::services::notify::{LogNotifier, Notifier};
use pitchbook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();
    config.validate()?;
    if config.admin_token.is_empty() {
        tracing::warn!("ADMIN_TOKEN is not set, bootstrap admin disabled");
    }

    let db = Arc::new(Mutex::new(db::init_db(&config.database_url)?));

    let notifier: Arc<dyn Notifier> = match &config.notify_webhook_url {
        Some(url) => {
            tracing::info!("sending booking notifications to webhook (url: {url})");
            Arc::new(WebhookNotifier::new(
                url.clone(),
                config.notify_webhook_secret.clone(),
            ))
        }
        None => {
            tracing::info!("no NOTIFY_WEBHOOK_URL set, booking notifications are logged only");
            Arc::new(LogNotifier)
        }
    };

    let (events_tx, _) = broadcast::channel(256);

    let state = Arc::new(AppState {
        db: Arc::clone(&db),
        auth: Box::new(SessionAuth::new(Arc::clone(&db), config.admin_token.clone())),
        config: config.clone(),
        notifier,
        events_tx,
    });

    let app = handlers::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
