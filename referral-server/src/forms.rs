//! Interaction payloads and form validation.

use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;

use referral_core::referral::DATE_FORMAT;
use referral_core::{ReferralId, ServiceType, SlotSelection};

use crate::blocks::{
    APPOINTMENT_SLOT_BLOCK, CLIENT_EMAIL_BLOCK, CLIENT_NAME_BLOCK, CLIENT_PHONE_BLOCK,
    COMPLETION_NOTES_BLOCK, NOTES_BLOCK, REFERRAL_ID_BLOCK, SERVICE_DATE_BLOCK, SERVICE_TYPE_BLOCK,
};
use crate::error::FormError;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InteractionPayload {
    BlockActions(BlockActionsPayload),
    ViewSubmission(ViewSubmissionPayload),
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlackUser {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockActionsPayload {
    pub trigger_id: String,
    pub user: SlackUser,
    #[serde(default)]
    pub actions: Vec<BlockAction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockAction {
    pub action_id: String,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewSubmissionPayload {
    pub user: SlackUser,
    pub view: SubmittedView,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmittedView {
    pub callback_id: String,
    #[serde(default)]
    pub private_metadata: String,
    #[serde(default)]
    pub state: ViewState,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ViewState {
    #[serde(default)]
    pub values: HashMap<String, HashMap<String, InputValue>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InputValue {
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub selected_option: Option<SelectedOption>,
    #[serde(default)]
    pub selected_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectedOption {
    pub value: String,
}

impl ViewState {
    fn input(&self, block_id: &str) -> Option<&InputValue> {
        self.values.get(block_id).and_then(|actions| actions.values().next())
    }

    /// Trimmed text or selected value of a block, if non-empty.
    pub fn text(&self, block_id: &str) -> Option<String> {
        let input = self.input(block_id)?;
        input
            .value
            .clone()
            .or_else(|| input.selected_option.as_ref().map(|selected| selected.value.clone()))
            .or_else(|| input.selected_date.clone())
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, block_id: &str, label: &str) -> Result<String, FormError> {
        self.text(block_id)
            .ok_or_else(|| FormError::new(block_id, format!("{} is required", label)))
    }
}

/// Validated referral form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferralFormInput {
    pub client_name: String,
    pub client_email: String,
    pub client_phone: String,
    pub service_type: ServiceType,
    pub notes: String,
    pub slot: Option<SlotSelection>,
}

impl ReferralFormInput {
    pub fn from_state(state: &ViewState) -> Result<Self, FormError> {
        let client_name = state.required(CLIENT_NAME_BLOCK, "Client name")?;
        let client_email = state.required(CLIENT_EMAIL_BLOCK, "Client email")?;
        if !client_email.contains('@') {
            return Err(FormError::new(
                CLIENT_EMAIL_BLOCK,
                "Enter a valid email address",
            ));
        }
        let client_phone = state.required(CLIENT_PHONE_BLOCK, "Client phone")?;
        let service_type = ServiceType::parse(&state.required(SERVICE_TYPE_BLOCK, "Service type")?)
            .map_err(|_| FormError::new(SERVICE_TYPE_BLOCK, "Select a service type from the list"))?;
        let slot = state
            .text(APPOINTMENT_SLOT_BLOCK)
            .map(|raw| SlotSelection::parse(&raw))
            .transpose()
            .map_err(|_| FormError::new(APPOINTMENT_SLOT_BLOCK, "Select an appointment time from the list"))?;

        Ok(Self {
            client_name,
            client_email,
            client_phone,
            service_type,
            notes: state.text(NOTES_BLOCK).unwrap_or_default(),
            slot,
        })
    }
}

/// Validated completion form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionFormInput {
    pub referral_id: ReferralId,
    /// Block to attach lookup errors to.
    pub id_block: &'static str,
    pub summary: String,
    pub service_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
struct CompletionMetadata {
    referral_id: String,
}

impl CompletionFormInput {
    pub fn from_view(view: &SubmittedView, today: NaiveDate) -> Result<Self, FormError> {
        let from_metadata = serde_json::from_str::<CompletionMetadata>(&view.private_metadata)
            .ok()
            .map(|metadata| metadata.referral_id);

        let (raw_id, id_block) = match from_metadata {
            Some(id) => (id, COMPLETION_NOTES_BLOCK),
            None => (
                view.state.required(REFERRAL_ID_BLOCK, "Referral ID")?,
                REFERRAL_ID_BLOCK,
            ),
        };
        let referral_id = ReferralId::parse(&raw_id.to_uppercase()).map_err(|e| {
            FormError::new(id_block, format!("{} is not a valid referral ID ({})", raw_id, e))
        })?;

        let summary = view.state.required(COMPLETION_NOTES_BLOCK, "Service summary")?;
        let service_date = match view.state.text(SERVICE_DATE_BLOCK) {
            Some(raw) => NaiveDate::parse_from_str(&raw, DATE_FORMAT)
                .map_err(|_| FormError::new(SERVICE_DATE_BLOCK, "Pick a valid date"))?,
            None => today,
        };

        Ok(Self {
            referral_id,
            id_block,
            summary,
            service_date,
        })
    }
}
