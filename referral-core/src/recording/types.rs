use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecordedEvent {
    pub timestamp: String,      // ISO 8601 timestamp
    pub correlation_id: String, // Unique ID to group related events
    pub event_type: EventType,
    pub direction: Direction,
    pub operation: String,       // e.g., "slack_interaction", "POST /api/chat.postMessage"
    pub data: serde_json::Value, // Sanitized request/response data
    pub metadata: HashMap<String, String>, // referral id, channel, etc.
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum EventType {
    WebhookReceived,
    SlackApiCall,
    GraphApiCall,
    RelayCall,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Direction {
    Request,
    Response,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamService {
    Slack,
    Graph,
    Relay,
}

impl UpstreamService {
    pub fn event_type(&self) -> EventType {
        match self {
            UpstreamService::Slack => EventType::SlackApiCall,
            UpstreamService::Graph => EventType::GraphApiCall,
            UpstreamService::Relay => EventType::RelayCall,
        }
    }
}

// Correlation ID type for better type safety
#[derive(Clone, Debug)]
pub struct CorrelationId(pub String);

// Header name for correlation ID propagation
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";
