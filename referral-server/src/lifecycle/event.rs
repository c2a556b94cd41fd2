//! Inputs to the transition function: form submissions, reactions, and
//! results of effects.

use chrono::{NaiveDate, NaiveDateTime};

use referral_core::{ReferralRecord, SlotSelection};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The referral form passed validation.
    ReferralSubmitted {
        record: ReferralRecord,
        slot: Option<SlotSelection>,
    },

    /// Result of `BookAppointment`.
    AppointmentBooked {
        event_id: String,
        start: NaiveDateTime,
    },

    /// Result of `BookAppointment`; the referral is recorded unscheduled.
    AppointmentBookingFailed { error: String },

    /// The completion form passed validation.
    ServiceCompleted {
        completed_date: NaiveDate,
        summary: String,
        completed_by: String,
    },

    /// The approval reaction was added to a completion notification.
    PaymentApproved { channel: String, message_ts: String },
}

impl Event {
    pub fn log_summary(&self) -> String {
        match self {
            Event::ReferralSubmitted { record, slot } => match slot {
                Some(slot) => format!("ReferralSubmitted({}, slot {})", record.id, slot),
                None => format!("ReferralSubmitted({}, no slot)", record.id),
            },
            Event::AppointmentBooked { event_id, start } => {
                format!("AppointmentBooked({} at {})", event_id, start)
            }
            Event::AppointmentBookingFailed { .. } => "AppointmentBookingFailed".to_string(),
            Event::ServiceCompleted { completed_date, .. } => {
                format!("ServiceCompleted({})", completed_date)
            }
            Event::PaymentApproved { message_ts, .. } => format!("PaymentApproved({})", message_ts),
        }
    }
}
