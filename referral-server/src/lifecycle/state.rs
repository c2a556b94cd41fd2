use referral_core::{ReferralRecord, SlotSelection};

/// Where a single referral is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleState {
    /// The form has not produced a record yet.
    Unsubmitted,

    /// A slot was picked; the calendar booking decides the initial status.
    AwaitingBooking {
        record: ReferralRecord,
        slot: SlotSelection,
    },

    /// The record exists in the store.
    Recorded { record: ReferralRecord },
}

impl LifecycleState {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleState::Unsubmitted => "unsubmitted",
            LifecycleState::AwaitingBooking { .. } => "awaiting_booking",
            LifecycleState::Recorded { .. } => "recorded",
        }
    }

    pub fn record(&self) -> Option<&ReferralRecord> {
        match self {
            LifecycleState::Unsubmitted => None,
            LifecycleState::AwaitingBooking { record, .. } | LifecycleState::Recorded { record } => {
                Some(record)
            }
        }
    }
}
