//! Persistence for referral records.
//!
//! `ReferralStore` abstracts the system of record. Three backends exist:
//! - `SpreadsheetStore`: rows in the practice workbook (canonical)
//! - `ChannelStore`: messages in a records channel, newest version wins
//! - `InMemoryStore`: for tests and local development
//!
//! Stores perform no deduplication; callers guard against double writes
//! through the lifecycle status checks.

mod channel;
mod locator;
mod memory;
mod spreadsheet;

pub use channel::ChannelStore;
pub use locator::{
    default_locators, Fidelity, LocatedRecord, MetadataLocator, RecordLocator, TextPatternLocator,
    RECORD_METADATA_TYPE,
};
pub use memory::InMemoryStore;
pub use spreadsheet::{SpreadsheetStore, LOOKUP_RANGE};

use async_trait::async_trait;
use std::fmt::Display;

use referral_core::{ReferralId, ReferralRecord, ReferralUpdate};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("referral {0} not found")]
    NotFound(ReferralId),

    #[error("{operation} failed: {message}")]
    Backend {
        operation: &'static str,
        message: String,
    },

    #[error("stored record {reference} is unreadable: {reason}")]
    Corrupt { reference: String, reason: String },

    /// The record was only recovered from message text and some fields could
    /// not be read, so writing it back would store placeholders as facts.
    #[error("referral {id} is only partially readable (missing {})", .missing.join(", "))]
    Incomplete {
        id: ReferralId,
        missing: Vec<&'static str>,
    },
}

impl StoreError {
    pub fn backend(operation: &'static str, err: impl Display) -> Self {
        StoreError::Backend {
            operation,
            message: format!("{:#}", err),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

#[async_trait]
pub trait ReferralStore: Send + Sync {
    /// Short name used in logs and the health report.
    fn backend_name(&self) -> &'static str;

    /// Persist a new record.
    async fn append(&self, record: &ReferralRecord) -> Result<(), StoreError>;

    /// Load the current version of a record.
    async fn find_by_id(&self, id: &ReferralId) -> Result<ReferralRecord, StoreError>;

    /// Change the lifecycle fields of a record, returning the updated record.
    async fn update_fields(
        &self,
        id: &ReferralId,
        update: &ReferralUpdate,
    ) -> Result<ReferralRecord, StoreError>;
}
