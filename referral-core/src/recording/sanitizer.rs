use serde_json::Value;
use std::collections::HashMap;

/// Headers that contain security-sensitive values and must be redacted.
pub const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "cookie",
    "set-cookie",
    "x-slack-signature",
];

/// JSON keys whose values are credentials in Slack and Graph payloads.
pub const SENSITIVE_JSON_KEYS: &[&str] = &[
    "access_token",
    "client_secret",
    "password",
    "secret",
    "token",
];

pub struct Sanitizer;

impl Sanitizer {
    /// Check if a header name is sensitive and should be redacted.
    pub fn is_sensitive_header(header_name: &str) -> bool {
        let lower = header_name.to_lowercase();
        SENSITIVE_HEADERS.contains(&lower.as_str())
    }

    /// Remove sensitive data from headers
    pub fn sanitize_headers(headers: &HashMap<String, String>) -> HashMap<String, String> {
        headers
            .iter()
            .map(|(key, value)| {
                let sanitized_value = if Self::is_sensitive_header(key) {
                    "[REDACTED]".to_string()
                } else {
                    value.clone()
                };
                (key.clone(), sanitized_value)
            })
            .collect()
    }

    /// Remove sensitive data from JSON payloads
    pub fn sanitize_json(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut sanitized = serde_json::Map::new();
                for (key, val) in map {
                    let sanitized_val = if SENSITIVE_JSON_KEYS.contains(&key.as_str()) {
                        Value::String("[REDACTED]".to_string())
                    } else {
                        Self::sanitize_json(val)
                    };
                    sanitized.insert(key.clone(), sanitized_val);
                }
                Value::Object(sanitized)
            }
            Value::Array(arr) => Value::Array(arr.iter().map(Self::sanitize_json).collect()),
            _ => value.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_signature_header_redacted() {
        let mut headers = HashMap::new();
        headers.insert("X-Slack-Signature".to_string(), "v0=abc".to_string());
        headers.insert("x-slack-request-timestamp".to_string(), "1700000000".to_string());

        let sanitized = Sanitizer::sanitize_headers(&headers);
        assert_eq!(sanitized["X-Slack-Signature"], "[REDACTED]");
        assert_eq!(sanitized["x-slack-request-timestamp"], "1700000000");
    }

    #[test]
    fn test_nested_tokens_redacted() {
        // Interaction payloads carry a verification token at the top level.
        let payload = json!({
            "type": "view_submission",
            "token": "legacy-verification-token",
            "view": { "state": { "values": {} } },
            "items": [{ "client_secret": "shh", "name": "ok" }]
        });

        let sanitized = Sanitizer::sanitize_json(&payload);
        assert_eq!(sanitized["token"], "[REDACTED]");
        assert_eq!(sanitized["items"][0]["client_secret"], "[REDACTED]");
        assert_eq!(sanitized["items"][0]["name"], "ok");
        assert_eq!(sanitized["type"], "view_submission");
    }
}
