use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use referral_core::referral::APPOINTMENT_FORMAT;
use referral_core::ReferralRecord;

use crate::recording::{create_http_client_from, RecordingLogger, UpstreamService};

/// Why a record is being relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayReason {
    Created,
    Completed,
}

impl RelayReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayReason::Created => "referral_created",
            RelayReason::Completed => "service_completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    Acknowledged { status: u16 },
    /// The request went out but no response arrived in time; delivery is unknown.
    TimedOutAfterSend,
    Failed { error: String },
}

/// Outbound notification to an external automation.
#[async_trait]
pub trait Relay: Send + Sync {
    async fn dispatch(&self, payload: &Value) -> RelayOutcome;
}

pub struct WebhookRelay {
    client: ClientWithMiddleware,
    url: String,
    timeout: Duration,
}

impl WebhookRelay {
    /// `timeout` bounds the whole dispatch. Connecting gets half of it, so a
    /// relay that cannot be reached reports `Failed` rather than
    /// `TimedOutAfterSend`.
    pub fn new(url: String, timeout: Duration, recording_logger: Option<RecordingLogger>) -> Self {
        let builder = reqwest::Client::builder().connect_timeout(timeout / 2);
        Self {
            client: create_http_client_from(UpstreamService::Relay, builder, recording_logger),
            url,
            timeout,
        }
    }
}

#[async_trait]
impl Relay for WebhookRelay {
    async fn dispatch(&self, payload: &Value) -> RelayOutcome {
        let body = match serde_json::to_string(payload) {
            Ok(body) => body,
            Err(e) => {
                return RelayOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        let deadline = Instant::now() + self.timeout;
        let send = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .body(body)
            .send();

        let response = match tokio::time::timeout_at(deadline, send).await {
            Err(_) => {
                info!(
                    "Relay did not answer within {}ms; assuming it is still processing",
                    self.timeout.as_millis()
                );
                return RelayOutcome::TimedOutAfterSend;
            }
            Ok(Err(e)) => {
                return RelayOutcome::Failed {
                    error: e.to_string(),
                }
            }
            Ok(Ok(response)) => response,
        };

        let status = response.status();
        if status.is_success() {
            return RelayOutcome::Acknowledged {
                status: status.as_u16(),
            };
        }

        // The error body is informational; whatever arrives before the deadline is kept
        let error_text = match tokio::time::timeout_at(deadline, response.text()).await {
            Ok(Ok(text)) => text,
            Ok(Err(_)) => String::new(),
            Err(_) => "<body not received in time>".to_string(),
        };
        warn!("Relay rejected payload: {} - {}", status, error_text);
        RelayOutcome::Failed {
            error: format!("{} - {}", status, error_text),
        }
    }
}

/// Flat payload consumed by the downstream automation.
pub fn relay_payload(record: &ReferralRecord, reason: RelayReason) -> Value {
    json!({
        "event": reason.as_str(),
        "referralId": record.id.as_str(),
        "clientName": record.client_name,
        "clientEmail": record.client_email,
        "clientPhone": record.client_phone,
        "serviceType": record.service_type.as_str(),
        "notes": record.notes,
        "brokerName": record.broker_name,
        "referralDate": record.referral_date.to_string(),
        "appointmentDateTime": record
            .appointment_date_time
            .map(|at| at.format(APPOINTMENT_FORMAT).to_string())
            .unwrap_or_default(),
        "status": record.status.as_str(),
        "completedDate": record.completed_date.map(|d| d.to_string()).unwrap_or_default(),
        "invoiceStatus": record.invoice_status.as_str(),
    })
}
