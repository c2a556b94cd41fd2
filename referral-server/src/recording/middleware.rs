use super::{
    CorrelationId, Direction, RecordedEvent, RecordingLogger, Sanitizer, UpstreamService,
    CORRELATION_ID_HEADER,
};
use axum::http;
use reqwest::{Client, Request, Response};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, Middleware, Next, Result as MiddlewareResult};
use std::collections::HashMap;
use tracing::warn;
use uuid::Uuid;

/// Build the HTTP client used for one upstream service, recording traffic when a logger is given.
pub fn create_http_client(
    service: UpstreamService,
    recording_logger: Option<RecordingLogger>,
) -> ClientWithMiddleware {
    create_http_client_from(service, Client::builder(), recording_logger)
}

/// As `create_http_client`, starting from a caller-configured builder.
pub fn create_http_client_from(
    service: UpstreamService,
    builder: reqwest::ClientBuilder,
    recording_logger: Option<RecordingLogger>,
) -> ClientWithMiddleware {
    let base_client = builder
        .user_agent(concat!("referral-desk/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|e| {
            warn!("Falling back to default HTTP client for {:?}: {}", service, e);
            Client::new()
        });

    let mut builder = ClientBuilder::new(base_client);

    if let Some(logger) = recording_logger {
        builder = builder.with(RecordingMiddleware::new(logger, service));
    }

    builder.build()
}

pub struct RecordingMiddleware {
    logger: RecordingLogger,
    service: UpstreamService,
}

impl RecordingMiddleware {
    pub fn new(logger: RecordingLogger, service: UpstreamService) -> Self {
        Self { logger, service }
    }
}

#[async_trait::async_trait]
impl Middleware for RecordingMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> MiddlewareResult<Response> {
        let correlation_id = match req.headers().get(CORRELATION_ID_HEADER) {
            Some(existing) => existing
                .to_str()
                .map(str::to_string)
                .unwrap_or_else(|_| Uuid::new_v4().to_string()),
            None => extensions
                .get::<CorrelationId>()
                .map(|id| id.0.clone())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
        };

        if !req.headers().contains_key(CORRELATION_ID_HEADER) {
            if let Ok(value) = correlation_id.parse() {
                req.headers_mut().insert(CORRELATION_ID_HEADER, value);
            }
        }

        let request_data = extract_request_data(&req);
        self.record(
            Direction::Request,
            format!("{} {}", request_data.method, extract_path(&request_data.url)),
            serde_json::to_value(&request_data).unwrap_or(serde_json::Value::Null),
            &correlation_id,
        );

        let response = next.run(req, extensions).await;

        match &response {
            Ok(resp) => {
                let response_data = extract_response_data(resp);
                self.record(
                    Direction::Response,
                    format!("response_{}", response_data.status_code),
                    serde_json::to_value(&response_data).unwrap_or(serde_json::Value::Null),
                    &correlation_id,
                );
            }
            Err(err) => {
                self.record(
                    Direction::Response,
                    "error".to_string(),
                    serde_json::json!({
                        "error": err.to_string(),
                        "error_type": format!("{:?}", err)
                    }),
                    &correlation_id,
                );
            }
        }

        response
    }
}

impl RecordingMiddleware {
    fn record(
        &self,
        direction: Direction,
        operation: String,
        data: serde_json::Value,
        correlation_id: &str,
    ) {
        self.logger.record(RecordedEvent {
            timestamp: chrono::Utc::now().to_rfc3339(),
            correlation_id: correlation_id.to_string(),
            event_type: self.service.event_type(),
            direction,
            operation,
            data,
            metadata: HashMap::new(),
        });
    }
}

fn header_map(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.to_string(), value.to_string()))
        })
        .collect()
}

fn extract_request_data(request: &Request) -> RequestData {
    // Bodies may carry client contact details or OAuth secrets, so only JSON is kept (sanitized)
    let body = match request.body().and_then(|body| body.as_bytes()) {
        Some(bytes) if bytes.len() > 10_000 => format!("[LARGE_BODY_{}b]", bytes.len()),
        Some(bytes) => match serde_json::from_slice::<serde_json::Value>(bytes) {
            Ok(json) => Sanitizer::sanitize_json(&json).to_string(),
            Err(_) => format!("[NON_JSON_BODY_{}b]", bytes.len()),
        },
        None if request.body().is_some() => "[STREAM_BODY]".to_string(),
        None => "[NO_BODY]".to_string(),
    };

    RequestData {
        method: request.method().to_string(),
        url: request.url().to_string(),
        headers: Sanitizer::sanitize_headers(&header_map(request.headers())),
        body,
    }
}

fn extract_response_data(response: &Response) -> ResponseData {
    ResponseData {
        status_code: response.status().as_u16(),
        headers: Sanitizer::sanitize_headers(&header_map(response.headers())),
        body_size: response.content_length().unwrap_or(0),
    }
}

#[derive(Debug, serde::Serialize)]
struct RequestData {
    method: String,
    url: String,
    headers: HashMap<String, String>,
    body: String,
}

#[derive(Debug, serde::Serialize)]
struct ResponseData {
    status_code: u16,
    headers: HashMap<String, String>,
    body_size: u64,
}

fn extract_path(url: &str) -> String {
    url::Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_path_drops_query() {
        assert_eq!(
            extract_path("https://slack.com/api/conversations.history?channel=C1&limit=200"),
            "/api/conversations.history"
        );
        assert_eq!(extract_path("not a url"), "not a url");
    }

    #[test]
    fn test_request_body_is_sanitized() {
        let mut request = Request::new(
            reqwest::Method::POST,
            "https://slack.com/api/chat.postMessage".parse().unwrap(),
        );
        *request.body_mut() = Some(reqwest::Body::from(r#"{"channel":"C1","token":"xoxb-1"}"#));
        request
            .headers_mut()
            .insert("authorization", "Bearer xoxb-1".parse().unwrap());

        let data = extract_request_data(&request);
        assert!(data.body.contains("[REDACTED]"));
        assert!(!data.body.contains("xoxb-1"));
        assert_eq!(data.headers["authorization"], "[REDACTED]");
    }

    #[test]
    fn test_form_body_is_not_recorded() {
        let mut request = Request::new(
            reqwest::Method::POST,
            "https://login.microsoftonline.com/t/oauth2/v2.0/token".parse().unwrap(),
        );
        *request.body_mut() = Some(reqwest::Body::from("client_secret=hunter2&grant_type=client_credentials"));

        let data = extract_request_data(&request);
        assert!(!data.body.contains("hunter2"));
    }
}
