//! Side effects as data, executed by the interpreter.

use referral_core::{ReferralId, ReferralRecord, ReferralUpdate, SlotSelection};

use crate::relay::RelayReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Create the practice calendar event for the chosen slot.
    BookAppointment {
        record: ReferralRecord,
        slot: SlotSelection,
    },

    /// Write the new record to the store.
    AppendRecord {
        record: ReferralRecord,
        /// Calendar event already created for this record, if any.
        calendar_event_id: Option<String>,
    },

    /// Change lifecycle fields of a stored record.
    UpdateRecord {
        id: ReferralId,
        update: ReferralUpdate,
    },

    /// Tell the admin channel a service is done and can be invoiced.
    NotifyCompletion {
        record: ReferralRecord,
        summary: String,
        completed_by: String,
    },

    /// Offer a "Complete Service" button in the services channel.
    PostCompletionButton { record: ReferralRecord },

    /// Forward the record to the external automation.
    RelayRecord {
        record: ReferralRecord,
        reason: RelayReason,
    },

    /// Confirm payment in the thread of the completion notification.
    PostThreadReply {
        channel: String,
        thread_ts: String,
        record: ReferralRecord,
    },

    Log { level: LogLevel, message: String },
}

impl Effect {
    /// A failed critical effect aborts the flow; anything else is logged and skipped.
    pub fn is_critical(&self) -> bool {
        matches!(self, Effect::AppendRecord { .. } | Effect::UpdateRecord { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Effect::BookAppointment { .. } => "BookAppointment",
            Effect::AppendRecord { .. } => "AppendRecord",
            Effect::UpdateRecord { .. } => "UpdateRecord",
            Effect::NotifyCompletion { .. } => "NotifyCompletion",
            Effect::PostCompletionButton { .. } => "PostCompletionButton",
            Effect::RelayRecord { .. } => "RelayRecord",
            Effect::PostThreadReply { .. } => "PostThreadReply",
            Effect::Log { .. } => "Log",
        }
    }
}
