//! In-memory implementation of `ReferralStore`.
//!
//! All records are lost on restart.

use async_trait::async_trait;
use tokio::sync::RwLock;

use referral_core::{ReferralId, ReferralRecord, ReferralUpdate};

use super::{ReferralStore, StoreError};

/// Records kept in insertion order; like a sheet, duplicate IDs are
/// possible and lookups see the first one.
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<Vec<ReferralRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<ReferralRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    pub async fn snapshot(&self) -> Vec<ReferralRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl ReferralStore for InMemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn append(&self, record: &ReferralRecord) -> Result<(), StoreError> {
        self.records.write().await.push(record.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &ReferralId) -> Result<ReferralRecord, StoreError> {
        self.records
            .read()
            .await
            .iter()
            .find(|record| &record.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn update_fields(
        &self,
        id: &ReferralId,
        update: &ReferralUpdate,
    ) -> Result<ReferralRecord, StoreError> {
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|record| &record.id == id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        record.apply(update);
        Ok(record.clone())
    }
}
