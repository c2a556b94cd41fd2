use axum::{
    body::Bytes,
    extract::{Query, Request, State},
    http::HeaderMap,
    middleware::{self, Next},
    response::{Json, Response},
    routing::post,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use referral_core::signature::{self, SIGNATURE_HEADER, TIMESTAMP_HEADER};

use crate::blocks::{
    ButtonVariant, COMPLETION_CALLBACK, OPEN_COMPLETION_MODAL, OPEN_REFERRAL_MODAL,
    REFERRAL_CALLBACK,
};
use crate::error::{AppError, FlowError};
use crate::forms::{
    BlockActionsPayload, CompletionFormInput, InteractionPayload, ReferralFormInput,
    ViewSubmissionPayload,
};
use crate::lifecycle::ReactionOutcome;
use crate::recording::CorrelationId;
use crate::AppState;

/// Slack never sends anything close to this.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Outer envelope of an Events API request.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventEnvelope {
    UrlVerification {
        challenge: String,
    },
    EventCallback {
        event: SlackEvent,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlackEvent {
    ReactionAdded {
        reaction: String,
        item: ReactedItem,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct ReactedItem {
    /// Reactions on files carry no channel.
    pub channel: Option<String>,
    pub ts: Option<String>,
}

async fn verify_slack_signature(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let secret = state
        .config
        .slack_signing_secret
        .as_deref()
        .ok_or(AppError::NotConfigured("SLACK_SIGNING_SECRET"))?;

    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| AppError::PayloadTooLarge)?;

    let header = |name: &str| parts.headers.get(name).and_then(|h| h.to_str().ok());
    let (Some(timestamp), Some(signature)) = (header(TIMESTAMP_HEADER), header(SIGNATURE_HEADER))
    else {
        warn!("Slack request to {} without signature headers", parts.uri.path());
        return Err(AppError::Unauthorized("missing signature headers"));
    };

    if !signature::verify(secret, &bytes, timestamp, signature, chrono::Utc::now().timestamp()) {
        error!("Invalid Slack signature on {}", parts.uri.path());
        return Err(AppError::Unauthorized("invalid signature"));
    }

    let correlation_id = CorrelationId(Uuid::new_v4().to_string());
    if let Some(ref logger) = state.recording_logger {
        logger.record_inbound(parts.uri.path(), &correlation_id.0, &bytes);
    }

    let mut new_request = Request::from_parts(parts, axum::body::Body::from(bytes));
    new_request.extensions_mut().insert(correlation_id);

    Ok(next.run(new_request).await)
}

pub async fn events_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let envelope: EventEnvelope = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("invalid event payload: {}", e)))?;

    match envelope {
        EventEnvelope::UrlVerification { challenge } => {
            info!("Answering Slack URL verification");
            Ok(Json(json!({ "challenge": challenge })))
        }
        EventEnvelope::EventCallback {
            event: SlackEvent::ReactionAdded { reaction, item },
        } => {
            let (Some(channel), Some(ts)) = (item.channel, item.ts) else {
                return Ok(Json(json!({ "ok": true })));
            };
            match state.controller.handle_reaction(&reaction, &channel, &ts).await {
                ReactionOutcome::Ignored(reason) => {
                    info!("Ignoring :{}: on {} in {}: {}", reaction, ts, channel, reason)
                }
                ReactionOutcome::Paid(id) => info!("Referral {} approved as paid", id),
                ReactionOutcome::NotAwaitingPayment(id, status) => {
                    info!("Approval for {} ignored; status is {}", id, status)
                }
                ReactionOutcome::Failed(reason) => {
                    error!("Approval on {} in {} failed: {}", ts, channel, reason)
                }
            }
            Ok(Json(json!({ "ok": true })))
        }
        EventEnvelope::EventCallback { .. } | EventEnvelope::Other => Ok(Json(json!({ "ok": true }))),
    }
}

/// Pull the JSON `payload` field out of a form-encoded interaction body.
fn interaction_payload(body: &[u8]) -> Result<InteractionPayload, AppError> {
    let raw = url::form_urlencoded::parse(body)
        .find(|(key, _)| key == "payload")
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| AppError::BadRequest("missing payload".to_string()))?;

    serde_json::from_str(&raw)
        .map_err(|e| AppError::BadRequest(format!("invalid interaction payload: {}", e)))
}

pub async fn interactions_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    match interaction_payload(&body)? {
        InteractionPayload::BlockActions(payload) => {
            handle_block_actions(&state, payload).await?;
            Ok(Json(json!({})))
        }
        InteractionPayload::ViewSubmission(payload) => {
            Ok(Json(handle_view_submission(&state, payload).await))
        }
        InteractionPayload::Unsupported => Err(AppError::BadRequest(
            "unsupported interaction type".to_string(),
        )),
    }
}

async fn handle_block_actions(state: &AppState, payload: BlockActionsPayload) -> Result<(), AppError> {
    for action in &payload.actions {
        match action.action_id.as_str() {
            OPEN_REFERRAL_MODAL => {
                info!("User {} opened the referral form", payload.user.id);
                state
                    .controller
                    .open_referral_modal(&payload.trigger_id)
                    .await?;
            }
            OPEN_COMPLETION_MODAL => {
                info!("User {} opened the completion form", payload.user.id);
                state
                    .controller
                    .open_completion_modal(&payload.trigger_id, action.value.as_deref())
                    .await?;
            }
            other => info!("Ignoring block action {}", other),
        }
    }
    Ok(())
}

/// Always answers 200: `{}` closes the modal, an errors body keeps it open.
async fn handle_view_submission(state: &AppState, payload: ViewSubmissionPayload) -> Value {
    let user_id = payload.user.id;
    let view = payload.view;

    let result: Result<(), FlowError> = match view.callback_id.as_str() {
        REFERRAL_CALLBACK => match ReferralFormInput::from_state(&view.state) {
            Ok(input) => state
                .controller
                .submit_referral(&user_id, input)
                .await
                .map(|record| info!("Referral {} submitted by {}", record.id, user_id)),
            Err(e) => Err(e.into()),
        },
        COMPLETION_CALLBACK => match CompletionFormInput::from_view(&view, state.controller.today()) {
            Ok(input) => state
                .controller
                .complete_service(&user_id, input)
                .await
                .map(|record| info!("Referral {} completed by {}", record.id, user_id)),
            Err(e) => Err(e.into()),
        },
        other => {
            warn!("Submission for unknown view {}", other);
            Ok(())
        }
    };

    match result {
        Ok(()) => json!({}),
        Err(e) => {
            match &e {
                FlowError::Downstream { .. } => error!("Form submission failed: {}", e),
                _ => info!("Form submission rejected: {}", e),
            }
            e.to_form_error().to_response_body()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PostButtonQuery {
    pub channel: Option<String>,
    pub variant: Option<String>,
}

/// Admin endpoint that posts a start button; authorised with the signing secret.
pub async fn post_button_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<PostButtonQuery>,
) -> Result<Json<Value>, AppError> {
    let secret = state
        .config
        .slack_signing_secret
        .as_deref()
        .ok_or(AppError::NotConfigured("SLACK_SIGNING_SECRET"))?;

    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));
    if !token.is_some_and(|token| signature::secrets_match(secret, token)) {
        return Err(AppError::Unauthorized("invalid bearer token"));
    }

    let variant = match query.variant.as_deref() {
        None => ButtonVariant::Referral,
        Some(raw) => ButtonVariant::parse(raw)
            .ok_or_else(|| AppError::BadRequest(format!("unknown variant {:?}", raw)))?,
    };
    let default_channel = match variant {
        ButtonVariant::Referral => state.config.referral_channel.clone(),
        ButtonVariant::Completion => state.config.services_channel.clone(),
    };
    let channel = query
        .channel
        .filter(|channel| !channel.trim().is_empty())
        .or(default_channel)
        .ok_or_else(|| AppError::BadRequest("channel is required".to_string()))?;

    let posted = state.controller.post_start_button(&channel, variant).await?;
    info!("Posted {:?} button to {} (ts {})", variant, posted.channel, posted.ts);

    Ok(Json(json!({
        "ok": true,
        "message": "Button posted",
        "channel": posted.channel,
        "ts": posted.ts,
    })))
}

pub fn slack_router(middleware_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/slack/events", post(events_handler))
        .route("/slack/interactions", post(interactions_handler))
        .route_layer(middleware::from_fn_with_state(
            middleware_state,
            verify_slack_signature,
        ))
        .route("/slack/post-button", post(post_button_handler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::lifecycle::{Clock, InterpreterContext, ReferralController, SystemClock};
    use crate::relay::RelayOutcome;
    use crate::slack::{HistoryQuery, MessagingApi};
    use crate::store::InMemoryStore;
    use crate::test_support::{FakeCalendar, FakeMessaging, FakeRelay};
    use axum::body::Body;
    use axum::http::StatusCode;
    use chrono::NaiveDate;
    use http_body_util::BodyExt;
    use referral_core::{
        InvoiceStatus, ReferralDraft, ReferralId, ReferralRecord, ReferralStatus, ServiceType,
        WorkingHours,
    };
    use std::collections::HashMap;
    use tower::ServiceExt;

    const SECRET: &str = "8f742231b10e8888abcd99yyyzzz85a5";

    struct TestApp {
        router: Router,
        messaging: Arc<FakeMessaging>,
        store: Arc<InMemoryStore>,
    }

    fn test_app(records: Vec<ReferralRecord>, signing_secret: Option<&str>) -> TestApp {
        let mut vars: HashMap<String, String> = [
            ("STORE_BACKEND", "memory"),
            ("SLACK_BOT_TOKEN", "xoxb-1234-abcd"),
            ("CHANNEL_ACCOUNTANT_REFERRAL", "C_REFERRAL"),
            ("CHANNEL_ACCOUNTING_SERVICES", "C_SERVICES"),
            ("CHANNEL_ACCOUNTING_ADMIN", "C_ADMIN"),
        ]
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
        if let Some(secret) = signing_secret {
            vars.insert("SLACK_SIGNING_SECRET".to_string(), secret.to_string());
        }
        let config = Config::from_lookup(|key| vars.get(key).cloned()).unwrap();

        let messaging = Arc::new(FakeMessaging::default());
        let store = Arc::new(InMemoryStore::with_records(records));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let controller = ReferralController::new(
            InterpreterContext {
                messaging: messaging.clone(),
                calendar: Arc::new(FakeCalendar::default()),
                store: store.clone(),
                relay: Some(Arc::new(FakeRelay::new(RelayOutcome::Acknowledged { status: 200 }))),
                services_channel: config.services_channel.clone(),
                admin_channel: config.admin_channel.clone(),
                timezone: config.timezone,
                approval_reaction: config.approval_reaction.clone(),
            },
            WorkingHours::default(),
            config.availability_window_days,
            clock,
        );

        let state = Arc::new(AppState {
            controller,
            config,
            recording_logger: None,
        });

        TestApp {
            router: crate::app(state),
            messaging,
            store,
        }
    }

    fn completed_record() -> ReferralRecord {
        let mut record = ReferralRecord::new(
            ReferralId::parse("REF-ABCD1234").unwrap(),
            ReferralDraft {
                client_name: "Jane Doe".to_string(),
                client_email: "jane@example.com".to_string(),
                client_phone: "555-0100".to_string(),
                service_type: ServiceType::Payroll,
                notes: String::new(),
                broker_name: "Sam Broker".to_string(),
            },
            NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
        );
        record.status = ReferralStatus::Completed;
        record.completed_date = NaiveDate::from_ymd_opt(2024, 6, 5);
        record.invoice_status = InvoiceStatus::Sent;
        record
    }

    fn signed_request(uri: &str, content_type: &str, body: String) -> Request {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = signature::sign(SECRET, &timestamp, body.as_bytes());
        axum::http::Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", content_type)
            .header(TIMESTAMP_HEADER, timestamp)
            .header(SIGNATURE_HEADER, signature)
            .body(Body::from(body))
            .unwrap()
    }

    fn signed_event(body: Value) -> Request {
        signed_request("/slack/events", "application/json", body.to_string())
    }

    fn signed_interaction(payload: Value) -> Request {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("payload", &payload.to_string())
            .finish();
        signed_request(
            "/slack/interactions",
            "application/x-www-form-urlencoded",
            body,
        )
    }

    async fn send(router: &Router, request: Request) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn test_url_verification_echoes_challenge() {
        let app = test_app(vec![], Some(SECRET));
        let (status, body) = send(
            &app.router,
            signed_event(json!({ "type": "url_verification", "challenge": "abc123" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["challenge"], "abc123");
    }

    #[tokio::test]
    async fn test_unsigned_request_is_rejected() {
        let app = test_app(vec![], Some(SECRET));
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/slack/events")
            .body(Body::from(r#"{"type":"url_verification","challenge":"x"}"#))
            .unwrap();

        let (status, body) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_tampered_body_is_rejected() {
        let app = test_app(vec![], Some(SECRET));
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = signature::sign(SECRET, &timestamp, br#"{"type":"url_verification","challenge":"a"}"#);
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/slack/events")
            .header(TIMESTAMP_HEADER, timestamp)
            .header(SIGNATURE_HEADER, signature)
            .body(Body::from(r#"{"type":"url_verification","challenge":"b"}"#))
            .unwrap();

        let (status, _) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_stale_timestamp_is_rejected() {
        let app = test_app(vec![], Some(SECRET));
        let body = r#"{"type":"url_verification","challenge":"a"}"#;
        let timestamp = (chrono::Utc::now().timestamp() - 301).to_string();
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/slack/events")
            .header(TIMESTAMP_HEADER, timestamp.clone())
            .header(SIGNATURE_HEADER, signature::sign(SECRET, &timestamp, body.as_bytes()))
            .body(Body::from(body))
            .unwrap();

        let (status, _) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_missing_signing_secret_is_unavailable() {
        let app = test_app(vec![], None);
        let (status, _) = send(
            &app.router,
            signed_event(json!({ "type": "url_verification", "challenge": "abc" })),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let app = test_app(vec![], Some(SECRET));
        let body = "x".repeat(MAX_BODY_BYTES + 1);
        let (status, _) = send(&app.router, signed_request("/slack/events", "application/json", body)).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_approval_reaction_marks_paid() {
        let app = test_app(vec![completed_record()], Some(SECRET));
        app.messaging
            .post_message(&crate::blocks::completion_notification(
                "C_ADMIN",
                &completed_record(),
                "Ran payroll",
                "Alex",
                "white_check_mark",
            ))
            .await
            .unwrap();
        let notice_ts = app
            .messaging
            .conversation_history(&HistoryQuery::page("C_ADMIN", 1, None))
            .await
            .unwrap()
            .messages[0]
            .ts
            .clone();

        let (status, body) = send(
            &app.router,
            signed_event(json!({
                "type": "event_callback",
                "event": {
                    "type": "reaction_added",
                    "user": "U_ADMIN",
                    "reaction": "white_check_mark",
                    "item": { "type": "message", "channel": "C_ADMIN", "ts": notice_ts },
                },
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        let stored = &app.store.snapshot().await[0];
        assert_eq!(stored.status, ReferralStatus::Paid);
        assert_eq!(stored.invoice_status, InvoiceStatus::Paid);
    }

    #[tokio::test]
    async fn test_other_events_are_acknowledged() {
        let app = test_app(vec![], Some(SECRET));
        let (status, body) = send(
            &app.router,
            signed_event(json!({
                "type": "event_callback",
                "event": { "type": "app_mention", "text": "hi" },
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(app.messaging.history_calls().await, 0);
    }

    #[tokio::test]
    async fn test_button_click_opens_referral_modal() {
        let app = test_app(vec![], Some(SECRET));
        let (status, body) = send(
            &app.router,
            signed_interaction(json!({
                "type": "block_actions",
                "trigger_id": "trigger-1",
                "user": { "id": "U_BROKER" },
                "actions": [{ "action_id": OPEN_REFERRAL_MODAL }],
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({}));
        let views = app.messaging.views().await;
        assert_eq!(views[0].0, "trigger-1");
        assert_eq!(views[0].1["callback_id"], REFERRAL_CALLBACK);
    }

    fn referral_submission(email: &str) -> Value {
        json!({
            "type": "view_submission",
            "user": { "id": "U_BROKER" },
            "view": {
                "callback_id": REFERRAL_CALLBACK,
                "private_metadata": "",
                "state": { "values": {
                    "client_name_block": { "client_name_input": { "type": "plain_text_input", "value": "Jane Doe" } },
                    "client_email_block": { "client_email_input": { "type": "email_text_input", "value": email } },
                    "client_phone_block": { "client_phone_input": { "type": "plain_text_input", "value": "555-0100" } },
                    "service_type_block": { "service_type_select": {
                        "type": "static_select",
                        "selected_option": { "value": "tax_preparation" },
                    } },
                } },
            },
        })
    }

    #[tokio::test]
    async fn test_referral_submission_is_recorded() {
        let app = test_app(vec![], Some(SECRET));
        let (status, body) = send(&app.router, signed_interaction(referral_submission("jane@example.com"))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({}));
        let records = app.store.snapshot().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, ReferralStatus::Pending);
        assert_eq!(records[0].service_type, ServiceType::TaxPreparation);
    }

    #[tokio::test]
    async fn test_invalid_submission_keeps_modal_open() {
        let app = test_app(vec![], Some(SECRET));
        let (status, body) = send(&app.router, signed_interaction(referral_submission("not-an-email"))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response_action"], "errors");
        assert!(body["errors"]["client_email_block"].is_string());
        assert!(app.store.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_second_completion_shows_field_error() {
        let app = test_app(vec![completed_record()], Some(SECRET));
        let (status, body) = send(
            &app.router,
            signed_interaction(json!({
                "type": "view_submission",
                "user": { "id": "U_ACCT" },
                "view": {
                    "callback_id": COMPLETION_CALLBACK,
                    "private_metadata": r#"{"referral_id":"REF-ABCD1234"}"#,
                    "state": { "values": {
                        "completion_notes_block": { "completion_notes_input": { "type": "plain_text_input", "value": "Again" } },
                    } },
                },
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response_action"], "errors");
        assert!(body["errors"]["completion_notes_block"]
            .as_str()
            .unwrap()
            .contains("already been completed"));
    }

    #[tokio::test]
    async fn test_unknown_interaction_type_is_bad_request() {
        let app = test_app(vec![], Some(SECRET));
        let (status, body) = send(
            &app.router,
            signed_interaction(json!({ "type": "shortcut", "callback_id": "x" })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    fn post_button(query: &str, token: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder()
            .method("POST")
            .uri(format!("/slack/post-button{}", query));
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_post_button_requires_bearer_token() {
        let app = test_app(vec![], Some(SECRET));
        let (status, _) = send(&app.router, post_button("", Some("wrong"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = send(&app.router, post_button("", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let truncated = &SECRET[..SECRET.len() - 1];
        let (status, _) = send(&app.router, post_button("", Some(truncated))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_post_button_defaults_channel_by_variant() {
        let app = test_app(vec![], Some(SECRET));

        let (status, body) = send(&app.router, post_button("", Some(SECRET))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["channel"], "C_REFERRAL");
        assert!(body["ts"].is_string());

        let (_, body) = send(&app.router, post_button("?variant=completion", Some(SECRET))).await;
        assert_eq!(body["channel"], "C_SERVICES");

        let (_, body) = send(
            &app.router,
            post_button("?variant=completion&channel=C_OTHER", Some(SECRET)),
        )
        .await;
        assert_eq!(body["channel"], "C_OTHER");
    }

    #[tokio::test]
    async fn test_post_button_rejects_unknown_variant() {
        let app = test_app(vec![], Some(SECRET));
        let (status, _) = send(&app.router, post_button("?variant=invoice", Some(SECRET))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health_reports_readiness() {
        let app = test_app(vec![], Some(SECRET));
        let request = axum::http::Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, body) = send(&app.router, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ready"], true);
        assert_eq!(body["environment"]["store_backend"], "memory");

        let app = test_app(vec![], None);
        let request = axum::http::Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, body) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["ready"], false);
    }
}
