use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest_middleware::{ClientWithMiddleware, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use crate::recording::{create_http_client, RecordingLogger, UpstreamService};

const SLACK_API_BASE: &str = "https://slack.com/api";

/// Structured metadata attached to a posted message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub event_type: String,
    #[serde(default)]
    pub event_payload: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OutgoingMessage {
    pub channel: String,
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PostedMessage {
    pub channel: String,
    pub ts: String,
}

/// A message as returned by `conversations.history`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HistoryMessage {
    #[serde(default)]
    pub ts: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub blocks: Vec<Value>,
    #[serde(default)]
    pub metadata: Option<MessageMetadata>,
}

impl HistoryMessage {
    /// Fallback text plus every text fragment found in the blocks, one per line.
    pub fn searchable_text(&self) -> String {
        let mut fragments = vec![self.text.clone()];
        for block in &self.blocks {
            collect_text(block, &mut fragments);
        }
        fragments.retain(|fragment| !fragment.is_empty());
        fragments.join("\n")
    }

    pub fn metadata_of_type(&self, event_type: &str) -> Option<&Value> {
        self.metadata
            .as_ref()
            .filter(|metadata| metadata.event_type == event_type)
            .map(|metadata| &metadata.event_payload)
    }
}

fn collect_text(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, inner) in map {
                match inner {
                    Value::String(text) if key == "text" => out.push(text.clone()),
                    _ => collect_text(inner, out),
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_text(item, out)),
        _ => {}
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryQuery {
    pub channel: String,
    pub latest: Option<String>,
    pub inclusive: bool,
    pub limit: u32,
    pub cursor: Option<String>,
}

impl HistoryQuery {
    /// Exactly the message with timestamp `ts`.
    pub fn single(channel: &str, ts: &str) -> Self {
        Self {
            channel: channel.to_string(),
            latest: Some(ts.to_string()),
            inclusive: true,
            limit: 1,
            cursor: None,
        }
    }

    /// A page of the most recent messages.
    pub fn page(channel: &str, limit: u32, cursor: Option<String>) -> Self {
        Self {
            channel: channel.to_string(),
            latest: None,
            inclusive: false,
            limit,
            cursor,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryPage {
    pub messages: Vec<HistoryMessage>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub real_name: Option<String>,
}

impl UserProfile {
    /// Real name, then handle, then the raw user ID.
    pub fn display_name(&self) -> String {
        self.real_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .or(self.name.as_deref().filter(|name| !name.trim().is_empty()))
            .unwrap_or(&self.id)
            .to_string()
    }
}

/// The subset of the Slack Web API the workflow uses.
#[async_trait]
pub trait MessagingApi: Send + Sync {
    async fn post_message(&self, message: &OutgoingMessage) -> Result<PostedMessage>;

    async fn open_view(&self, trigger_id: &str, view: &Value) -> Result<()>;

    async fn user_info(&self, user_id: &str) -> Result<UserProfile>;

    async fn conversation_history(&self, query: &HistoryQuery) -> Result<HistoryPage>;
}

#[derive(Clone)]
pub struct SlackClient {
    client: ClientWithMiddleware,
    bot_token: Option<String>,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    user: UserProfile,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    messages: Vec<HistoryMessage>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

impl SlackClient {
    pub fn new(bot_token: Option<String>) -> Self {
        Self::new_with_recording(bot_token, None)
    }

    pub fn new_with_recording(
        bot_token: Option<String>,
        recording_logger: Option<RecordingLogger>,
    ) -> Self {
        Self {
            client: create_http_client(UpstreamService::Slack, recording_logger),
            bot_token,
            base_url: SLACK_API_BASE.to_string(),
        }
    }

    fn token(&self) -> Result<&str> {
        self.bot_token
            .as_deref()
            .ok_or_else(|| anyhow!("SLACK_BOT_TOKEN is not configured"))
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    fn post_json(&self, method: &str, body: &Value) -> Result<RequestBuilder> {
        Ok(self
            .client
            .post(self.url(method))
            .header("Authorization", format!("Bearer {}", self.token()?))
            .header("Content-Type", "application/json; charset=utf-8")
            .body(serde_json::to_string(body)?))
    }

    fn get(&self, method: &str, query: &[(&str, String)]) -> Result<RequestBuilder> {
        Ok(self
            .client
            .get(self.url(method))
            .header("Authorization", format!("Bearer {}", self.token()?))
            .query(query))
    }

    /// Send a Web API call and unwrap Slack's `{ok, error}` envelope.
    async fn call<T: DeserializeOwned>(&self, method: &str, request: RequestBuilder) -> Result<T> {
        debug!("Calling Slack API method {}", method);

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to send Slack {} request", method))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Slack {} failed: {} - {}", method, status, error_text);
            return Err(anyhow!("Slack {} failed: {} - {}", method, status, error_text));
        }

        let body: Value = response
            .json()
            .await
            .with_context(|| format!("Failed to parse Slack {} response", method))?;

        check_envelope(method, body)
    }
}

fn check_envelope<T: DeserializeOwned>(method: &str, body: Value) -> Result<T> {
    if body.get("ok").and_then(Value::as_bool) != Some(true) {
        let reason = body
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error");
        error!("Slack {} returned error: {}", method, reason);
        return Err(anyhow!("Slack {} returned error: {}", method, reason));
    }

    serde_json::from_value(body)
        .with_context(|| format!("Unexpected Slack {} response shape", method))
}

#[async_trait]
impl MessagingApi for SlackClient {
    async fn post_message(&self, message: &OutgoingMessage) -> Result<PostedMessage> {
        let request = self.post_json("chat.postMessage", &serde_json::to_value(message)?)?;
        self.call("chat.postMessage", request).await
    }

    async fn open_view(&self, trigger_id: &str, view: &Value) -> Result<()> {
        let body = serde_json::json!({ "trigger_id": trigger_id, "view": view });
        let request = self.post_json("views.open", &body)?;
        let _: Value = self.call("views.open", request).await?;
        Ok(())
    }

    async fn user_info(&self, user_id: &str) -> Result<UserProfile> {
        let request = self.get("users.info", &[("user", user_id.to_string())])?;
        let response: UserInfoResponse = self.call("users.info", request).await?;
        Ok(response.user)
    }

    async fn conversation_history(&self, query: &HistoryQuery) -> Result<HistoryPage> {
        let mut params = vec![
            ("channel", query.channel.clone()),
            ("limit", query.limit.to_string()),
            ("inclusive", query.inclusive.to_string()),
            ("include_all_metadata", "true".to_string()),
        ];
        if let Some(latest) = &query.latest {
            params.push(("latest", latest.clone()));
        }
        if let Some(cursor) = &query.cursor {
            params.push(("cursor", cursor.clone()));
        }

        let request = self.get("conversations.history", &params)?;
        let response: HistoryResponse = self.call("conversations.history", request).await?;

        Ok(HistoryPage {
            messages: response.messages,
            next_cursor: response
                .response_metadata
                .map(|metadata| metadata.next_cursor)
                .filter(|cursor| !cursor.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_not_ok_is_error() {
        let result: Result<PostedMessage> = check_envelope(
            "chat.postMessage",
            json!({ "ok": false, "error": "channel_not_found" }),
        );
        let err = result.unwrap_err().to_string();
        assert!(err.contains("channel_not_found"));
    }

    #[test]
    fn test_envelope_missing_ok_is_error() {
        let result: Result<Value> = check_envelope("views.open", json!({ "view": {} }));
        assert!(result.is_err());
    }

    #[test]
    fn test_envelope_ok_parses_payload() {
        let posted: PostedMessage = check_envelope(
            "chat.postMessage",
            json!({ "ok": true, "channel": "C1", "ts": "1718000000.000100" }),
        )
        .unwrap();
        assert_eq!(posted.ts, "1718000000.000100");
    }

    #[test]
    fn test_outgoing_message_omits_empty_fields() {
        let message = OutgoingMessage {
            channel: "C1".to_string(),
            text: "hello".to_string(),
            ..Default::default()
        };
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value, json!({ "channel": "C1", "text": "hello" }));
    }

    #[test]
    fn test_searchable_text_includes_block_text() {
        let message: HistoryMessage = serde_json::from_value(json!({
            "ts": "1.0",
            "text": "New Referral: Jane Doe",
            "blocks": [
                { "type": "header", "text": { "type": "plain_text", "text": "New Referral" } },
                { "type": "section", "fields": [
                    { "type": "mrkdwn", "text": "*Referral ID:*\nREF-ABCD1234" }
                ] }
            ]
        }))
        .unwrap();

        let text = message.searchable_text();
        assert!(text.contains("New Referral: Jane Doe"));
        assert!(text.contains("*Referral ID:*\nREF-ABCD1234"));
    }

    #[test]
    fn test_metadata_of_type_filters() {
        let message: HistoryMessage = serde_json::from_value(json!({
            "ts": "1.0",
            "text": "",
            "metadata": { "event_type": "service_completion", "event_payload": { "referral_id": "REF-ABCD1234" } }
        }))
        .unwrap();

        assert!(message.metadata_of_type("service_completion").is_some());
        assert!(message.metadata_of_type("referral_record").is_none());
    }

    #[test]
    fn test_display_name_fallbacks() {
        let full = UserProfile {
            id: "U1".to_string(),
            name: Some("jdoe".to_string()),
            real_name: Some("Jane Doe".to_string()),
        };
        assert_eq!(full.display_name(), "Jane Doe");

        let handle_only = UserProfile {
            id: "U1".to_string(),
            name: Some("jdoe".to_string()),
            real_name: Some(" ".to_string()),
        };
        assert_eq!(handle_only.display_name(), "jdoe");

        let bare = UserProfile {
            id: "U1".to_string(),
            name: None,
            real_name: None,
        };
        assert_eq!(bare.display_name(), "U1");
    }

    #[tokio::test]
    async fn test_missing_token_fails_without_network() {
        let client = SlackClient::new(None);
        let err = client.user_info("U1").await.unwrap_err();
        assert!(err.to_string().contains("SLACK_BOT_TOKEN"));
    }
}
