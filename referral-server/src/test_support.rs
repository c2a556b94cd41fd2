//! In-process fakes for the outbound collaborators.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

use referral_core::BusyInterval;

use crate::graph::{CalendarApi, CalendarEventRequest, CreatedEvent};
use crate::relay::{Relay, RelayOutcome};
use crate::slack::{
    HistoryMessage, HistoryPage, HistoryQuery, MessagingApi, OutgoingMessage, PostedMessage,
    UserProfile,
};

fn ts_value(ts: &str) -> f64 {
    ts.parse().unwrap_or(0.0)
}

/// Slack stand-in: posted messages become channel history, newest first.
#[derive(Default)]
pub struct FakeMessaging {
    posted: Mutex<Vec<OutgoingMessage>>,
    history: Mutex<HashMap<String, Vec<HistoryMessage>>>,
    // History pushed without a channel is visible in every channel
    shared_history: Mutex<Vec<HistoryMessage>>,
    views: Mutex<Vec<(String, Value)>>,
    users: Mutex<HashMap<String, UserProfile>>,
    failing_channels: Mutex<HashSet<String>>,
    history_calls: Mutex<usize>,
    fail_history: Mutex<bool>,
    fail_views: Mutex<bool>,
    page_size: Option<usize>,
    counter: Mutex<u64>,
}

impl FakeMessaging {
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub async fn posted(&self) -> Vec<OutgoingMessage> {
        self.posted.lock().await.clone()
    }

    pub async fn posted_to(&self, channel: &str) -> Vec<OutgoingMessage> {
        self.posted
            .lock()
            .await
            .iter()
            .filter(|message| message.channel == channel)
            .cloned()
            .collect()
    }

    pub async fn views(&self) -> Vec<(String, Value)> {
        self.views.lock().await.clone()
    }

    pub async fn history_calls(&self) -> usize {
        *self.history_calls.lock().await
    }

    /// Add a message to every channel's history as the newest entry.
    pub async fn push_history(&self, message: HistoryMessage) {
        self.shared_history.lock().await.insert(0, message);
    }

    /// Add a message to one channel's history as the newest entry.
    pub async fn push_channel_history(&self, channel: &str, message: HistoryMessage) {
        self.history
            .lock()
            .await
            .entry(channel.to_string())
            .or_default()
            .insert(0, message);
    }

    pub async fn add_user(&self, id: &str, real_name: &str) {
        self.users.lock().await.insert(
            id.to_string(),
            UserProfile {
                id: id.to_string(),
                name: None,
                real_name: Some(real_name.to_string()),
            },
        );
    }

    pub async fn fail_posts_to(&self, channel: &str) {
        self.failing_channels.lock().await.insert(channel.to_string());
    }

    pub async fn fail_history(&self, fail: bool) {
        *self.fail_history.lock().await = fail;
    }

    pub async fn fail_views(&self, fail: bool) {
        *self.fail_views.lock().await = fail;
    }
}

#[async_trait]
impl MessagingApi for FakeMessaging {
    async fn post_message(&self, message: &OutgoingMessage) -> Result<PostedMessage> {
        if self.failing_channels.lock().await.contains(&message.channel) {
            return Err(anyhow!("Slack chat.postMessage returned error: channel_not_found"));
        }

        let ts = {
            let mut counter = self.counter.lock().await;
            *counter += 1;
            format!("{}.{:06}", 1_718_000_000 + *counter, 100)
        };

        self.posted.lock().await.push(message.clone());
        self.history
            .lock()
            .await
            .entry(message.channel.clone())
            .or_default()
            .insert(
                0,
                HistoryMessage {
                    ts: ts.clone(),
                    text: message.text.clone(),
                    blocks: message.blocks.clone(),
                    metadata: message.metadata.clone(),
                },
            );

        Ok(PostedMessage {
            channel: message.channel.clone(),
            ts,
        })
    }

    async fn open_view(&self, trigger_id: &str, view: &Value) -> Result<()> {
        if *self.fail_views.lock().await {
            return Err(anyhow!("Slack views.open returned error: expired_trigger_id"));
        }
        self.views
            .lock()
            .await
            .push((trigger_id.to_string(), view.clone()));
        Ok(())
    }

    async fn user_info(&self, user_id: &str) -> Result<UserProfile> {
        self.users
            .lock()
            .await
            .get(user_id)
            .cloned()
            .ok_or_else(|| anyhow!("Slack users.info returned error: user_not_found"))
    }

    async fn conversation_history(&self, query: &HistoryQuery) -> Result<HistoryPage> {
        *self.history_calls.lock().await += 1;
        if *self.fail_history.lock().await {
            return Err(anyhow!("Slack conversations.history returned error: ratelimited"));
        }

        let mut messages = self.shared_history.lock().await.clone();
        messages.extend(
            self.history
                .lock()
                .await
                .get(&query.channel)
                .cloned()
                .unwrap_or_default(),
        );

        if let Some(latest) = &query.latest {
            let latest = ts_value(latest);
            messages.retain(|message| {
                let ts = ts_value(&message.ts);
                ts < latest || (query.inclusive && ts == latest)
            });
        }

        let offset: usize = query
            .cursor
            .as_deref()
            .and_then(|cursor| cursor.parse().ok())
            .unwrap_or(0);
        let limit = self
            .page_size
            .unwrap_or(query.limit as usize)
            .min(query.limit.max(1) as usize);
        let page: Vec<HistoryMessage> = messages.iter().skip(offset).take(limit).cloned().collect();
        let next_offset = offset + page.len();

        Ok(HistoryPage {
            messages: page,
            next_cursor: (next_offset < messages.len()).then(|| next_offset.to_string()),
        })
    }
}

#[derive(Default)]
pub struct FakeCalendar {
    busy: Mutex<Vec<BusyInterval>>,
    created: Mutex<Vec<CalendarEventRequest>>,
    fail_create: Mutex<bool>,
    fail_view: Mutex<bool>,
}

impl FakeCalendar {
    pub async fn set_busy(&self, busy: Vec<BusyInterval>) {
        *self.busy.lock().await = busy;
    }

    pub async fn created(&self) -> Vec<CalendarEventRequest> {
        self.created.lock().await.clone()
    }

    pub async fn fail_create(&self, fail: bool) {
        *self.fail_create.lock().await = fail;
    }

    pub async fn fail_view(&self, fail: bool) {
        *self.fail_view.lock().await = fail;
    }
}

#[async_trait]
impl CalendarApi for FakeCalendar {
    async fn create_event(&self, event: &CalendarEventRequest) -> Result<CreatedEvent> {
        if *self.fail_create.lock().await {
            return Err(anyhow!("Graph event creation failed: 403 - ErrorAccessDenied"));
        }
        let mut created = self.created.lock().await;
        created.push(event.clone());
        Ok(CreatedEvent {
            id: format!("event-{}", created.len()),
        })
    }

    async fn calendar_view(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<BusyInterval>> {
        if *self.fail_view.lock().await {
            return Err(anyhow!("Graph calendar view failed: 401 - InvalidAuthenticationToken"));
        }
        Ok(self
            .busy
            .lock()
            .await
            .iter()
            .filter(|busy| busy.start < end && busy.end > start)
            .copied()
            .collect())
    }
}

pub struct FakeRelay {
    outcome: RelayOutcome,
    payloads: Mutex<Vec<Value>>,
}

impl FakeRelay {
    pub fn new(outcome: RelayOutcome) -> Self {
        Self {
            outcome,
            payloads: Mutex::new(Vec::new()),
        }
    }

    pub async fn payloads(&self) -> Vec<Value> {
        self.payloads.lock().await.clone()
    }
}

#[async_trait]
impl Relay for FakeRelay {
    async fn dispatch(&self, payload: &Value) -> RelayOutcome {
        self.payloads.lock().await.push(payload.clone());
        self.outcome.clone()
    }
}
