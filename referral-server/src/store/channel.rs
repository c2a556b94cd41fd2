//! Referral records kept as messages in a dedicated records channel.
//!
//! Every write posts a complete record message; the newest message for an
//! ID is the current version.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use referral_core::{ReferralId, ReferralRecord, ReferralUpdate};

use super::locator::{default_locators, Fidelity, LocatedRecord, RecordLocator};
use super::{ReferralStore, StoreError};
use crate::blocks::record_message;
use crate::slack::{HistoryQuery, MessagingApi};

const HISTORY_PAGE_SIZE: u32 = 200;
const DEFAULT_MAX_PAGES: usize = 25;

pub struct ChannelStore {
    messaging: Arc<dyn MessagingApi>,
    channel: String,
    locators: Vec<Box<dyn RecordLocator>>,
    max_pages: usize,
}

impl ChannelStore {
    pub fn new(messaging: Arc<dyn MessagingApi>, channel: String) -> Self {
        Self {
            messaging,
            channel,
            locators: default_locators(),
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Page through history newest first. A metadata hit wins outright; otherwise
    /// the newest best-effort hit is used.
    async fn locate(&self, id: &ReferralId) -> Result<LocatedRecord, StoreError> {
        let mut fallback: Option<LocatedRecord> = None;
        let mut cursor = None;

        for _ in 0..self.max_pages {
            let page = self
                .messaging
                .conversation_history(&HistoryQuery::page(&self.channel, HISTORY_PAGE_SIZE, cursor.take()))
                .await
                .map_err(|e| StoreError::backend("read records channel", e))?;

            for message in &page.messages {
                for locator in &self.locators {
                    let Some(located) = locator.locate(message, id) else {
                        continue;
                    };
                    match located.fidelity {
                        Fidelity::Exact => return Ok(located),
                        Fidelity::BestEffort => {
                            if fallback.is_none() {
                                warn!(
                                    "Referral {} only recoverable from message text via {} locator (ts {})",
                                    id,
                                    locator.name(),
                                    message.ts
                                );
                                fallback = Some(located);
                            }
                        }
                    }
                    break;
                }
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        fallback.ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn post_record(&self, record: &ReferralRecord, heading: &str) -> Result<(), StoreError> {
        let message = record_message(&self.channel, record, heading);
        self.messaging
            .post_message(&message)
            .await
            .map_err(|e| StoreError::backend("post record message", e))?;
        Ok(())
    }
}

#[async_trait]
impl ReferralStore for ChannelStore {
    fn backend_name(&self) -> &'static str {
        "channel"
    }

    async fn append(&self, record: &ReferralRecord) -> Result<(), StoreError> {
        self.post_record(record, "New Referral").await?;
        info!("Posted referral {} to records channel", record.id);
        Ok(())
    }

    async fn find_by_id(&self, id: &ReferralId) -> Result<ReferralRecord, StoreError> {
        self.locate(id).await.map(|located| located.record)
    }

    async fn update_fields(
        &self,
        id: &ReferralId,
        update: &ReferralUpdate,
    ) -> Result<ReferralRecord, StoreError> {
        let located = self.locate(id).await?;
        if !located.is_complete() {
            warn!(
                "Refusing to rewrite referral {} from partial text; missing {}",
                id,
                located.missing.join(", ")
            );
            return Err(StoreError::Incomplete {
                id: id.clone(),
                missing: located.missing,
            });
        }
        let mut record = located.record;
        record.apply(update);
        self.post_record(&record, "Referral Updated").await?;
        info!("Posted updated referral {} with status {}", id, record.status);
        Ok(record)
    }
}
