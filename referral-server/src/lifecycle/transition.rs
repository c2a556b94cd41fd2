//! Pure state transition function.
//!
//! Given the current state and an event, returns the new state and the
//! effects to execute. No I/O happens here.

use referral_core::{InvoiceStatus, ReferralRecord, ReferralStatus, ReferralUpdate};

use super::effect::{Effect, LogLevel};
use super::event::Event;
use super::state::LifecycleState;
use crate::relay::RelayReason;

/// Why an event left the state unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Completion submitted for a referral that is already completed or beyond.
    AlreadyCompleted { status: ReferralStatus },
    /// Approval for a referral that is not waiting on payment.
    NotAwaitingPayment { status: ReferralStatus },
    /// The event has no meaning in the current state.
    Unexpected {
        state: &'static str,
        event: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionResult {
    pub state: LifecycleState,
    pub effects: Vec<Effect>,
    pub ignored: Option<IgnoreReason>,
}

impl TransitionResult {
    pub fn new(state: LifecycleState, effects: Vec<Effect>) -> Self {
        Self {
            state,
            effects,
            ignored: None,
        }
    }

    fn ignore(state: LifecycleState, reason: IgnoreReason, level: LogLevel, message: String) -> Self {
        Self {
            state,
            effects: vec![Effect::Log { level, message }],
            ignored: Some(reason),
        }
    }
}

/// Effects for a record that has just reached its initial status.
fn record_created(
    record: ReferralRecord,
    calendar_event_id: Option<String>,
    mut effects: Vec<Effect>,
) -> TransitionResult {
    effects.push(Effect::AppendRecord {
        record: record.clone(),
        calendar_event_id,
    });
    effects.push(Effect::PostCompletionButton {
        record: record.clone(),
    });
    effects.push(Effect::RelayRecord {
        record: record.clone(),
        reason: RelayReason::Created,
    });
    TransitionResult::new(LifecycleState::Recorded { record }, effects)
}

pub fn transition(state: LifecycleState, event: Event) -> TransitionResult {
    match (state, event) {
        (LifecycleState::Unsubmitted, Event::ReferralSubmitted { record, slot: None }) => {
            record_created(record, None, vec![])
        }

        (
            LifecycleState::Unsubmitted,
            Event::ReferralSubmitted {
                record,
                slot: Some(slot),
            },
        ) => TransitionResult::new(
            LifecycleState::AwaitingBooking {
                record: record.clone(),
                slot,
            },
            vec![Effect::BookAppointment { record, slot }],
        ),

        (
            LifecycleState::AwaitingBooking { mut record, .. },
            Event::AppointmentBooked { event_id, start },
        ) => {
            record.status = ReferralStatus::Scheduled;
            record.appointment_date_time = Some(start);
            let log = Effect::Log {
                level: LogLevel::Info,
                message: format!("Booked calendar event {} for referral {}", event_id, record.id),
            };
            record_created(record, Some(event_id), vec![log])
        }

        (LifecycleState::AwaitingBooking { record, slot }, Event::AppointmentBookingFailed { error }) => {
            let log = Effect::Log {
                level: LogLevel::Warn,
                message: format!(
                    "Could not book {} for referral {}; recording it unscheduled: {}",
                    slot, record.id, error
                ),
            };
            record_created(record, None, vec![log])
        }

        (
            LifecycleState::Recorded { record },
            Event::ServiceCompleted {
                completed_date,
                summary,
                completed_by,
            },
        ) => {
            if !record.status.is_open() {
                let status = record.status;
                let message = format!(
                    "Referral {} is already {}; ignoring completion",
                    record.id, status
                );
                return TransitionResult::ignore(
                    LifecycleState::Recorded { record },
                    IgnoreReason::AlreadyCompleted { status },
                    LogLevel::Info,
                    message,
                );
            }

            let update = ReferralUpdate {
                status: Some(ReferralStatus::Completed),
                completed_date: Some(completed_date),
                invoice_status: Some(InvoiceStatus::Sent),
            };
            let mut completed = record;
            completed.apply(&update);

            TransitionResult::new(
                LifecycleState::Recorded {
                    record: completed.clone(),
                },
                vec![
                    Effect::UpdateRecord {
                        id: completed.id.clone(),
                        update,
                    },
                    Effect::NotifyCompletion {
                        record: completed.clone(),
                        summary,
                        completed_by,
                    },
                    Effect::RelayRecord {
                        record: completed,
                        reason: RelayReason::Completed,
                    },
                ],
            )
        }

        (LifecycleState::Recorded { record }, Event::PaymentApproved { channel, message_ts }) => {
            if !record.status.awaits_payment() {
                let status = record.status;
                let message = format!(
                    "Approval for referral {} ignored: status is {}",
                    record.id, status
                );
                return TransitionResult::ignore(
                    LifecycleState::Recorded { record },
                    IgnoreReason::NotAwaitingPayment { status },
                    LogLevel::Info,
                    message,
                );
            }

            let update = ReferralUpdate {
                status: Some(ReferralStatus::Paid),
                completed_date: None,
                invoice_status: Some(InvoiceStatus::Paid),
            };
            let mut paid = record;
            paid.apply(&update);

            TransitionResult::new(
                LifecycleState::Recorded { record: paid.clone() },
                vec![
                    Effect::UpdateRecord {
                        id: paid.id.clone(),
                        update,
                    },
                    Effect::PostThreadReply {
                        channel,
                        thread_ts: message_ts,
                        record: paid.clone(),
                    },
                    Effect::Log {
                        level: LogLevel::Info,
                        message: format!("Referral {} marked as paid", paid.id),
                    },
                ],
            )
        }

        (state, event) => {
            let state_name = state.name();
            let summary = event.log_summary();
            let message = format!("Ignoring {} in state {}", summary, state_name);
            TransitionResult::ignore(
                state,
                IgnoreReason::Unexpected {
                    state: state_name,
                    event: summary,
                },
                LogLevel::Warn,
                message,
            )
        }
    }
}
