//! `/health`: which integrations are configured, and whether that is enough to serve.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use std::sync::Arc;

use crate::config::Config;
use crate::{get_service_version, AppState};

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct EnvironmentReport {
    pub slack_configured: bool,
    pub signing_secret_configured: bool,
    pub azure_configured: bool,
    pub excel_configured: bool,
    pub calendar_configured: bool,
    pub store_backend: &'static str,
    pub store_configured: bool,
    pub relay_configured: bool,
}

impl EnvironmentReport {
    pub fn from_config(config: &Config) -> Self {
        Self {
            slack_configured: config.slack_bot_token.is_some(),
            signing_secret_configured: config.slack_signing_secret.is_some(),
            azure_configured: config.graph_credentials.is_some(),
            excel_configured: config.workbook.is_some(),
            calendar_configured: config.graph_credentials.is_some() && config.calendar_email.is_some(),
            store_backend: config.store_backend.as_str(),
            store_configured: config.store_configured(),
            relay_configured: config.relay_webhook_url.is_some(),
        }
    }

    /// Calendar and relay are optional; without them referrals are recorded
    /// unscheduled and nothing is forwarded.
    pub fn ready(&self) -> bool {
        self.slack_configured && self.signing_secret_configured && self.store_configured
    }
}

async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    let environment = EnvironmentReport::from_config(&state.config);
    let ready = environment.ready();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": get_service_version(),
        "environment": environment,
        "ready": ready,
        "message": if ready {
            "All systems operational"
        } else {
            "Missing configuration - check environment variables"
        },
    });

    (status, Json(body)).into_response()
}

pub fn health_router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health_check))
}
