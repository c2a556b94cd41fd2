use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use referral_server::config::{Config, StoreBackend};
use referral_server::graph::GraphClient;
use referral_server::lifecycle::{InterpreterContext, ReferralController, SystemClock};
use referral_server::relay::{Relay, WebhookRelay};
use referral_server::slack::SlackClient;
use referral_server::store::{ChannelStore, InMemoryStore, ReferralStore, SpreadsheetStore};
use referral_server::{app, get_service_version, AppState, RecordingLogger};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is normal in deployed environments
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting referral desk {}", get_service_version());

    let config = Config::from_env().context("Failed to load configuration from environment variables")?;

    // Initialize recording logger if enabled
    let recording_logger = if config.recording_enabled {
        match RecordingLogger::new(PathBuf::from(&config.recording_log_path)) {
            Ok(logger) => {
                info!("Recording enabled, logging to: {}", config.recording_log_path);
                Some(logger)
            }
            Err(e) => {
                error!("Failed to initialize recording logger: {}", e);
                None
            }
        }
    } else {
        None
    };
    let middleware_logger = || {
        recording_logger
            .as_ref()
            .map(|l: &RecordingLogger| l.clone_for_middleware())
    };

    let slack = Arc::new(SlackClient::new_with_recording(
        config.slack_bot_token.clone(),
        middleware_logger(),
    ));
    let graph = Arc::new(GraphClient::new(
        config.graph_credentials.clone(),
        config.workbook.clone(),
        config.calendar_email.clone(),
        middleware_logger(),
    ));

    let store: Arc<dyn ReferralStore> = match config.store_backend {
        StoreBackend::Spreadsheet => Arc::new(SpreadsheetStore::new(graph.clone())),
        StoreBackend::Channel => Arc::new(ChannelStore::new(
            slack.clone(),
            config
                .records_channel
                .clone()
                .context("CHANNEL_REFERRAL_RECORDS is required for the channel store")?,
        )),
        StoreBackend::Memory => {
            warn!("Using the in-memory store; referrals are lost on restart");
            Arc::new(InMemoryStore::new())
        }
    };
    info!("Referral records kept in the {} store", store.backend_name());

    let relay: Option<Arc<dyn Relay>> = config.relay_webhook_url.clone().map(|url| {
        info!("Relaying referral events to {}", url);
        Arc::new(WebhookRelay::new(url, config.relay_timeout, middleware_logger())) as Arc<dyn Relay>
    });

    for (name, missing) in [
        ("SLACK_BOT_TOKEN", config.slack_bot_token.is_none()),
        ("SLACK_SIGNING_SECRET", config.slack_signing_secret.is_none()),
        ("CHANNEL_ACCOUNTING_SERVICES", config.services_channel.is_none()),
        ("CHANNEL_ACCOUNTING_ADMIN", config.admin_channel.is_none()),
        ("CALENDAR_EMAIL", config.calendar_email.is_none()),
    ] {
        if missing {
            warn!("{} is not configured", name);
        }
    }

    let controller = ReferralController::new(
        InterpreterContext {
            messaging: slack,
            calendar: graph,
            store,
            relay,
            services_channel: config.services_channel.clone(),
            admin_channel: config.admin_channel.clone(),
            timezone: config.timezone,
            approval_reaction: config.approval_reaction.clone(),
        },
        config.working_hours.clone(),
        config.availability_window_days,
        Arc::new(SystemClock),
    );

    let port = config.port;
    let app_state = Arc::new(AppState {
        controller,
        config,
        recording_logger,
    });

    let app = app(app_state).layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    let listener = TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("Server listening on port {}", port);

    axum::serve(listener, app).await?;

    Ok(())
}
