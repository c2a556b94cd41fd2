//! Entry points for the referral workflow.
//!
//! Each inbound interaction loads whatever state it needs, then drives the
//! transition/interpreter loop until no result events remain.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

use referral_core::{
    compute_availability, ReferralDraft, ReferralId, ReferralRecord, ReferralStatus,
    WorkingHours,
};

use super::event::Event;
use super::interpreter::{execute_effects, CriticalEffectFailed, InterpreterContext};
use super::state::LifecycleState;
use super::transition::{transition, IgnoreReason, TransitionResult};
use crate::blocks::{
    completion_modal, referral_modal, start_button_message, ButtonVariant, SlotChoices,
    CLIENT_NAME_BLOCK, COMPLETION_METADATA_TYPE, COMPLETION_NOTES_BLOCK,
};
use crate::error::{FlowError, FormError};
use crate::forms::{CompletionFormInput, ReferralFormInput};
use crate::slack::{HistoryQuery, PostedMessage};
use crate::store::StoreError;

const UNKNOWN_USER: &str = "Unknown";

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// What an emoji reaction amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactionOutcome {
    /// Not an approval; nothing was read or written.
    Ignored(&'static str),
    Paid(ReferralId),
    NotAwaitingPayment(ReferralId, ReferralStatus),
    /// Reading or writing failed; details are in the logs.
    Failed(String),
}

pub struct ReferralController {
    ctx: InterpreterContext,
    working_hours: WorkingHours,
    window_days: u32,
    clock: Arc<dyn Clock>,
}

impl ReferralController {
    pub fn new(
        ctx: InterpreterContext,
        working_hours: WorkingHours,
        window_days: u32,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ctx,
            working_hours,
            window_days,
            clock,
        }
    }

    pub fn context(&self) -> &InterpreterContext {
        &self.ctx
    }

    /// Today's date in the practice time zone.
    pub fn today(&self) -> NaiveDate {
        self.clock.now().with_timezone(&self.ctx.timezone).date_naive()
    }

    /// Free slots for the referral form. Calendar trouble degrades to a form
    /// without a slot picker.
    pub async fn load_slot_choices(&self) -> SlotChoices {
        let now = self.clock.now();
        let today = self.today();
        let window_start = today
            .and_hms_opt(0, 0, 0)
            .and_then(|midnight| self.ctx.timezone.from_local_datetime(&midnight).earliest())
            .map(|start| start.with_timezone(&Utc))
            .unwrap_or(now);
        let window_end = window_start + Duration::days(i64::from(self.window_days));

        let busy = match self.ctx.calendar.calendar_view(window_start, window_end).await {
            Ok(busy) => busy,
            Err(e) => {
                warn!("Could not load calendar availability: {:#}", e);
                return SlotChoices::Unavailable;
            }
        };

        let slots = compute_availability(
            &busy,
            today,
            self.window_days,
            &self.working_hours,
            self.ctx.timezone,
            now,
        );
        if slots.is_empty() {
            SlotChoices::NoneFree {
                window_days: self.window_days,
            }
        } else {
            SlotChoices::Available(slots)
        }
    }

    pub async fn open_referral_modal(&self, trigger_id: &str) -> anyhow::Result<()> {
        let choices = self.load_slot_choices().await;
        self.ctx
            .messaging
            .open_view(trigger_id, &referral_modal(&choices))
            .await
    }

    /// `button_value` is the referral ID carried by a per-referral button.
    pub async fn open_completion_modal(
        &self,
        trigger_id: &str,
        button_value: Option<&str>,
    ) -> anyhow::Result<()> {
        let referral_id = button_value.and_then(|value| match ReferralId::parse(value) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Ignoring malformed referral ID {:?} on completion button: {}", value, e);
                None
            }
        });
        self.ctx
            .messaging
            .open_view(trigger_id, &completion_modal(referral_id.as_ref(), self.today()))
            .await
    }

    pub async fn post_start_button(
        &self,
        channel: &str,
        variant: ButtonVariant,
    ) -> anyhow::Result<PostedMessage> {
        self.ctx
            .messaging
            .post_message(&start_button_message(channel, variant))
            .await
    }

    async fn user_display_name(&self, user_id: &str) -> String {
        match self.ctx.messaging.user_info(user_id).await {
            Ok(profile) => profile.display_name(),
            Err(e) => {
                warn!("Could not look up Slack user {}: {:#}", user_id, e);
                UNKNOWN_USER.to_string()
            }
        }
    }

    /// Record a new referral, booking the chosen slot first if there is one.
    pub async fn submit_referral(
        &self,
        user_id: &str,
        input: ReferralFormInput,
    ) -> Result<ReferralRecord, FlowError> {
        let broker_name = self.user_display_name(user_id).await;
        let record = ReferralRecord::new(
            ReferralId::generate(),
            ReferralDraft {
                client_name: input.client_name,
                client_email: input.client_email,
                client_phone: input.client_phone,
                service_type: input.service_type,
                notes: input.notes,
                broker_name,
            },
            self.today(),
        );

        let (state, _) = self
            .drive(
                LifecycleState::Unsubmitted,
                Event::ReferralSubmitted {
                    record,
                    slot: input.slot,
                },
            )
            .await
            .map_err(|e| FlowError::Downstream {
                operation: "save the referral",
                block_id: CLIENT_NAME_BLOCK,
                source: e.into(),
            })?;

        match state {
            LifecycleState::Recorded { record } => Ok(record),
            other => Err(FlowError::Downstream {
                operation: "save the referral",
                block_id: CLIENT_NAME_BLOCK,
                source: anyhow::anyhow!("submission stopped in state {}", other.name()),
            }),
        }
    }

    /// Mark a referral's service as completed and notify the admins.
    pub async fn complete_service(
        &self,
        user_id: &str,
        input: CompletionFormInput,
    ) -> Result<ReferralRecord, FlowError> {
        let record = match self.ctx.store.find_by_id(&input.referral_id).await {
            Ok(record) => record,
            Err(StoreError::NotFound(id)) => {
                info!("Completion submitted for unknown referral {}", id);
                return Err(FlowError::NotFound {
                    block_id: input.id_block,
                    id,
                });
            }
            Err(e) => {
                return Err(FlowError::Downstream {
                    operation: "look up the referral",
                    block_id: input.id_block,
                    source: e.into(),
                })
            }
        };

        let completed_by = self.user_display_name(user_id).await;
        let (state, ignored) = self
            .drive(
                LifecycleState::Recorded { record },
                Event::ServiceCompleted {
                    completed_date: input.service_date,
                    summary: input.summary,
                    completed_by,
                },
            )
            .await
            .map_err(|e| FlowError::Downstream {
                operation: "save the completion",
                block_id: COMPLETION_NOTES_BLOCK,
                source: e.into(),
            })?;

        if let Some(IgnoreReason::AlreadyCompleted { status }) = ignored {
            return Err(FormError::new(
                input.id_block,
                format!(
                    "Referral {} has already been completed (status: {}).",
                    input.referral_id, status
                ),
            )
            .into());
        }

        match state {
            LifecycleState::Recorded { record } => Ok(record),
            other => Err(FlowError::Downstream {
                operation: "save the completion",
                block_id: COMPLETION_NOTES_BLOCK,
                source: anyhow::anyhow!("completion stopped in state {}", other.name()),
            }),
        }
    }

    /// Handle a `reaction_added` event. Only the approval symbol in the admin
    /// channel is looked at any further.
    pub async fn handle_reaction(
        &self,
        reaction: &str,
        channel: &str,
        message_ts: &str,
    ) -> ReactionOutcome {
        if reaction != self.ctx.approval_reaction {
            return ReactionOutcome::Ignored("not the approval reaction");
        }
        if self.ctx.admin_channel.as_deref() != Some(channel) {
            return ReactionOutcome::Ignored("not in the admin channel");
        }

        let page = match self
            .ctx
            .messaging
            .conversation_history(&HistoryQuery::single(channel, message_ts))
            .await
        {
            Ok(page) => page,
            Err(e) => {
                error!("Could not fetch reacted message {} in {}: {:#}", message_ts, channel, e);
                return ReactionOutcome::Failed(format!("{:#}", e));
            }
        };

        let referral_id = page
            .messages
            .iter()
            .find(|message| message.ts == message_ts)
            .and_then(|message| message.metadata_of_type(COMPLETION_METADATA_TYPE))
            .and_then(|payload| payload.get("referral_id"))
            .and_then(|id| id.as_str())
            .and_then(|id| ReferralId::parse(id).ok());
        let Some(referral_id) = referral_id else {
            return ReactionOutcome::Ignored("not a completion notification");
        };

        let record = match self.ctx.store.find_by_id(&referral_id).await {
            Ok(record) => record,
            Err(e) => {
                error!("Approval for {} could not load the record: {}", referral_id, e);
                return ReactionOutcome::Failed(e.to_string());
            }
        };

        let result = self
            .drive(
                LifecycleState::Recorded { record },
                Event::PaymentApproved {
                    channel: channel.to_string(),
                    message_ts: message_ts.to_string(),
                },
            )
            .await;

        match result {
            Ok((_, Some(IgnoreReason::NotAwaitingPayment { status }))) => {
                ReactionOutcome::NotAwaitingPayment(referral_id, status)
            }
            Ok(_) => ReactionOutcome::Paid(referral_id),
            Err(e) => ReactionOutcome::Failed(e.to_string()),
        }
    }

    /// Run the transition/effect loop to completion.
    ///
    /// Returns the final state and the first reason an event was ignored, if any.
    async fn drive(
        &self,
        initial: LifecycleState,
        event: Event,
    ) -> Result<(LifecycleState, Option<IgnoreReason>), CriticalEffectFailed> {
        let mut current_state = initial;
        let mut ignored = None;
        let mut events_to_process = vec![event];

        while let Some(event) = events_to_process.pop() {
            info!(
                "Processing event {} in state {}",
                event.log_summary(),
                current_state.name()
            );

            let TransitionResult {
                state,
                effects,
                ignored: reason,
            } = transition(current_state, event);
            current_state = state;
            if ignored.is_none() {
                ignored = reason;
            }

            if !effects.is_empty() {
                let result_events = execute_effects(&self.ctx, effects).await?;

                // Reverse so they're processed in order
                for result_event in result_events.into_iter().rev() {
                    events_to_process.push(result_event);
                }
            }
        }

        Ok((current_state, ignored))
    }
}
