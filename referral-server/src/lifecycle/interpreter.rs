//! Effect interpreter that executes effects against the collaborators.
//!
//! Critical effects (record writes) abort the remaining effects on failure;
//! everything else is logged and skipped.

use chrono_tz::Tz;
use serde_json::Value;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use referral_core::{ReferralId, ReferralRecord, ReferralUpdate, SlotSelection};

use super::effect::{Effect, LogLevel};
use super::event::Event;
use crate::blocks::{completion_button_message, completion_notification, payment_confirmation};
use crate::graph::{CalendarApi, CalendarEventRequest};
use crate::relay::{relay_payload, Relay, RelayOutcome, RelayReason};
use crate::slack::MessagingApi;
use crate::store::{ReferralStore, StoreError};

/// Collaborators and settings needed to execute effects.
pub struct InterpreterContext {
    pub messaging: Arc<dyn MessagingApi>,
    pub calendar: Arc<dyn CalendarApi>,
    pub store: Arc<dyn ReferralStore>,
    pub relay: Option<Arc<dyn Relay>>,
    /// Where "Complete Service" buttons go.
    pub services_channel: Option<String>,
    /// Where completion notifications go.
    pub admin_channel: Option<String>,
    pub timezone: Tz,
    pub approval_reaction: String,
}

#[derive(Debug, thiserror::Error)]
pub enum EffectError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Downstream(#[from] anyhow::Error),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}

/// A critical effect failed; effects after it were not executed.
#[derive(Debug, thiserror::Error)]
#[error("{effect} failed: {source}")]
pub struct CriticalEffectFailed {
    pub effect: &'static str,
    #[source]
    pub source: EffectError,
}

/// Execute effects in order and collect result events.
pub async fn execute_effects(
    ctx: &InterpreterContext,
    effects: Vec<Effect>,
) -> Result<Vec<Event>, CriticalEffectFailed> {
    let mut result_events = Vec::new();

    for effect in effects {
        let name = effect.name();
        let critical = effect.is_critical();

        match execute_effect(ctx, effect).await {
            Ok(events) => result_events.extend(events),
            Err(source) if critical => {
                error!("Critical effect {} failed: {}", name, source);
                return Err(CriticalEffectFailed {
                    effect: name,
                    source,
                });
            }
            Err(e) => warn!("Effect {} failed, continuing: {}", name, e),
        }
    }

    Ok(result_events)
}

async fn execute_effect(ctx: &InterpreterContext, effect: Effect) -> Result<Vec<Event>, EffectError> {
    match effect {
        Effect::BookAppointment { record, slot } => {
            Ok(vec![execute_book_appointment(ctx, &record, &slot).await])
        }

        Effect::AppendRecord {
            record,
            calendar_event_id,
        } => {
            execute_append_record(ctx, &record, calendar_event_id.as_deref()).await?;
            Ok(vec![])
        }

        Effect::UpdateRecord { id, update } => {
            execute_update_record(ctx, &id, &update).await?;
            Ok(vec![])
        }

        Effect::NotifyCompletion {
            record,
            summary,
            completed_by,
        } => {
            let channel = ctx
                .admin_channel
                .as_deref()
                .ok_or(EffectError::NotConfigured("CHANNEL_ACCOUNTING_ADMIN"))?;
            let message = completion_notification(
                channel,
                &record,
                &summary,
                &completed_by,
                &ctx.approval_reaction,
            );
            let posted = ctx.messaging.post_message(&message).await?;
            info!(
                "Posted completion notification for {} to {} (ts {})",
                record.id, posted.channel, posted.ts
            );
            Ok(vec![])
        }

        Effect::PostCompletionButton { record } => {
            let channel = ctx
                .services_channel
                .as_deref()
                .ok_or(EffectError::NotConfigured("CHANNEL_ACCOUNTING_SERVICES"))?;
            ctx.messaging
                .post_message(&completion_button_message(channel, &record))
                .await?;
            info!("Posted completion button for {} to {}", record.id, channel);
            Ok(vec![])
        }

        Effect::RelayRecord { record, reason } => {
            execute_relay(ctx, &record, reason).await?;
            Ok(vec![])
        }

        Effect::PostThreadReply {
            channel,
            thread_ts,
            record,
        } => {
            ctx.messaging
                .post_message(&payment_confirmation(&channel, &thread_ts, &record))
                .await?;
            Ok(vec![])
        }

        Effect::Log { level, message } => {
            match level {
                LogLevel::Info => info!("{}", message),
                LogLevel::Warn => warn!("{}", message),
                LogLevel::Error => error!("{}", message),
            }
            Ok(vec![])
        }
    }
}

fn appointment_body(record: &ReferralRecord) -> String {
    let mut body = format!(
        "<p><strong>Referral ID:</strong> {}</p>\
         <p><strong>Client:</strong> {}</p>\
         <p><strong>Email:</strong> {}</p>\
         <p><strong>Phone:</strong> {}</p>\
         <p><strong>Service:</strong> {}</p>\
         <p><strong>Referred by:</strong> {}</p>",
        record.id,
        record.client_name,
        record.client_email,
        record.client_phone,
        record.service_type.label(),
        record.broker_name
    );
    if !record.notes.is_empty() {
        body.push_str(&format!("<p><strong>Notes:</strong> {}</p>", record.notes));
    }
    body
}

/// Booking never fails the flow; the outcome comes back as an event.
async fn execute_book_appointment(
    ctx: &InterpreterContext,
    record: &ReferralRecord,
    slot: &SlotSelection,
) -> Event {
    let request = CalendarEventRequest {
        subject: format!(
            "Referral: {} - {}",
            record.client_name,
            record.service_type.label()
        ),
        body_html: appointment_body(record),
        start: slot.start(),
        end: slot.end(),
        time_zone: ctx.timezone.name().to_string(),
        attendee_email: record.client_email.clone(),
        attendee_name: record.client_name.clone(),
    };

    match ctx.calendar.create_event(&request).await {
        Ok(created) => Event::AppointmentBooked {
            event_id: created.id,
            start: slot.start(),
        },
        Err(e) => Event::AppointmentBookingFailed {
            error: format!("{:#}", e),
        },
    }
}

async fn execute_append_record(
    ctx: &InterpreterContext,
    record: &ReferralRecord,
    calendar_event_id: Option<&str>,
) -> Result<(), EffectError> {
    match ctx.store.append(record).await {
        Ok(()) => {
            info!(
                "Recorded referral {} ({}) in {} store",
                record.id,
                record.status,
                ctx.store.backend_name()
            );
            Ok(())
        }
        Err(e) => {
            if let Some(event_id) = calendar_event_id {
                error!(
                    "Calendar event {} for referral {} is orphaned: the record was not saved",
                    event_id, record.id
                );
            }
            Err(e.into())
        }
    }
}

async fn execute_update_record(
    ctx: &InterpreterContext,
    id: &ReferralId,
    update: &ReferralUpdate,
) -> Result<(), EffectError> {
    let updated = ctx.store.update_fields(id, update).await?;
    info!("Updated referral {} to status {}", id, updated.status);
    Ok(())
}

async fn execute_relay(
    ctx: &InterpreterContext,
    record: &ReferralRecord,
    reason: RelayReason,
) -> Result<(), EffectError> {
    let Some(relay) = &ctx.relay else {
        debug!("No relay configured; skipping {} for {}", reason.as_str(), record.id);
        return Ok(());
    };

    let payload: Value = relay_payload(record, reason);
    match relay.dispatch(&payload).await {
        RelayOutcome::Acknowledged { status } => {
            info!("Relay acknowledged {} for {} ({})", reason.as_str(), record.id, status);
            Ok(())
        }
        RelayOutcome::TimedOutAfterSend => {
            warn!(
                "Relay of {} for {} timed out after sending; delivery unknown",
                reason.as_str(),
                record.id
            );
            Ok(())
        }
        RelayOutcome::Failed { error } => Err(EffectError::Downstream(anyhow::anyhow!(
            "relay of {} for {} failed: {}",
            reason.as_str(),
            record.id,
            error
        ))),
    }
}
