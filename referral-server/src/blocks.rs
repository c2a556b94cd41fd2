//! Block Kit messages and modals.

use chrono::NaiveDate;
use serde_json::{json, Value};

use referral_core::referral::{APPOINTMENT_FORMAT, DATE_FORMAT};
use referral_core::{AvailabilitySlot, ReferralId, ReferralRecord, ServiceType};

use crate::slack::{MessageMetadata, OutgoingMessage};
use crate::store::RECORD_METADATA_TYPE;

pub const OPEN_REFERRAL_MODAL: &str = "open_referral_modal";
pub const OPEN_COMPLETION_MODAL: &str = "open_completion_modal";
pub const REFERRAL_CALLBACK: &str = "referral_form_submit";
pub const COMPLETION_CALLBACK: &str = "completion_form_submit";

pub const CLIENT_NAME_BLOCK: &str = "client_name_block";
pub const CLIENT_EMAIL_BLOCK: &str = "client_email_block";
pub const CLIENT_PHONE_BLOCK: &str = "client_phone_block";
pub const SERVICE_TYPE_BLOCK: &str = "service_type_block";
pub const APPOINTMENT_SLOT_BLOCK: &str = "appointment_slot_block";
pub const NOTES_BLOCK: &str = "notes_block";
pub const REFERRAL_ID_BLOCK: &str = "referral_id_block";
pub const COMPLETION_NOTES_BLOCK: &str = "completion_notes_block";
pub const SERVICE_DATE_BLOCK: &str = "service_date_block";

/// Metadata event type of completion notifications; approval reactions key off it.
pub const COMPLETION_METADATA_TYPE: &str = "service_completion";

/// Slack refuses static selects with more options than this.
const MAX_SELECT_OPTIONS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonVariant {
    Referral,
    Completion,
}

impl ButtonVariant {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "referral" => Some(ButtonVariant::Referral),
            "completion" => Some(ButtonVariant::Completion),
            _ => None,
        }
    }
}

/// What the referral modal can offer in its appointment dropdown.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotChoices {
    Available(Vec<AvailabilitySlot>),
    NoneFree { window_days: u32 },
    Unavailable,
}

fn plain_text(text: &str) -> Value {
    json!({ "type": "plain_text", "text": text, "emoji": true })
}

fn mrkdwn(text: &str) -> Value {
    json!({ "type": "mrkdwn", "text": text })
}

fn button(text: &str, action_id: &str, value: Option<&str>, primary: bool) -> Value {
    let mut button = json!({
        "type": "button",
        "text": plain_text(text),
        "action_id": action_id,
    });
    if let Some(value) = value {
        button["value"] = json!(value);
    }
    if primary {
        button["style"] = json!("primary");
    }
    button
}

fn input(block_id: &str, label: &str, element: Value, optional: bool) -> Value {
    json!({
        "type": "input",
        "block_id": block_id,
        "optional": optional,
        "label": plain_text(label),
        "element": element,
    })
}

fn option(text: &str, value: &str) -> Value {
    json!({ "text": plain_text(text), "value": value })
}

/// Persistent entry-point message with a single button.
pub fn start_button_message(channel: &str, variant: ButtonVariant) -> OutgoingMessage {
    let (prompt, label, action_id) = match variant {
        ButtonVariant::Referral => (
            "*Refer a client to the practice.* Click below to open the referral form.",
            "📝 New Referral",
            OPEN_REFERRAL_MODAL,
        ),
        ButtonVariant::Completion => (
            "*Finished a service?* Click below to mark a referral as completed.",
            "✅ Complete Service",
            OPEN_COMPLETION_MODAL,
        ),
    };

    OutgoingMessage {
        channel: channel.to_string(),
        text: prompt.replace('*', ""),
        blocks: vec![
            json!({ "type": "section", "text": mrkdwn(prompt) }),
            json!({ "type": "actions", "elements": [button(label, action_id, None, true)] }),
        ],
        ..Default::default()
    }
}

pub fn referral_modal(choices: &SlotChoices) -> Value {
    let service_options: Vec<Value> = ServiceType::ALL
        .iter()
        .map(|service| option(service.label(), service.as_str()))
        .collect();

    let mut blocks = vec![
        input(
            CLIENT_NAME_BLOCK,
            "Client Name",
            json!({ "type": "plain_text_input", "action_id": "client_name_input" }),
            false,
        ),
        input(
            CLIENT_EMAIL_BLOCK,
            "Client Email",
            json!({ "type": "email_text_input", "action_id": "client_email_input" }),
            false,
        ),
        input(
            CLIENT_PHONE_BLOCK,
            "Client Phone",
            json!({ "type": "plain_text_input", "action_id": "client_phone_input" }),
            false,
        ),
        input(
            SERVICE_TYPE_BLOCK,
            "Service Type",
            json!({
                "type": "static_select",
                "action_id": "service_type_select",
                "placeholder": plain_text("Select a service"),
                "options": service_options,
            }),
            false,
        ),
    ];

    match choices {
        SlotChoices::Available(slots) => {
            let slot_options: Vec<Value> = slots
                .iter()
                .take(MAX_SELECT_OPTIONS)
                .map(|slot| option(&slot.display_label, &slot.value()))
                .collect();
            blocks.push(input(
                APPOINTMENT_SLOT_BLOCK,
                "Appointment (optional)",
                json!({
                    "type": "static_select",
                    "action_id": "appointment_slot_select",
                    "placeholder": plain_text("Pick a time"),
                    "options": slot_options,
                }),
                true,
            ));
        }
        SlotChoices::NoneFree { window_days } => blocks.push(json!({
            "type": "context",
            "elements": [mrkdwn(&format!(
                "No appointment slots are free in the next {} days. The practice will follow up to schedule.",
                window_days
            ))],
        })),
        SlotChoices::Unavailable => blocks.push(json!({
            "type": "context",
            "elements": [mrkdwn(
                "Availability could not be loaded. Submit without a time and the practice will follow up to schedule."
            )],
        })),
    }

    blocks.push(input(
        NOTES_BLOCK,
        "Notes",
        json!({ "type": "plain_text_input", "action_id": "notes_input", "multiline": true }),
        true,
    ));

    json!({
        "type": "modal",
        "callback_id": REFERRAL_CALLBACK,
        "title": plain_text("New Referral"),
        "submit": plain_text("Submit"),
        "close": plain_text("Cancel"),
        "blocks": blocks,
    })
}

/// Completion form. A known referral ID travels in `private_metadata`;
/// otherwise the form asks for it.
pub fn completion_modal(referral_id: Option<&ReferralId>, today: NaiveDate) -> Value {
    let mut blocks = Vec::new();

    let private_metadata = match referral_id {
        Some(id) => {
            blocks.push(json!({
                "type": "section",
                "text": mrkdwn(&format!("Completing referral *{}*", id)),
            }));
            json!({ "referral_id": id.as_str() }).to_string()
        }
        None => {
            blocks.push(input(
                REFERRAL_ID_BLOCK,
                "Referral ID",
                json!({
                    "type": "plain_text_input",
                    "action_id": "referral_id_input",
                    "placeholder": plain_text("REF-XXXXXXXX"),
                }),
                false,
            ));
            String::new()
        }
    };

    blocks.push(input(
        COMPLETION_NOTES_BLOCK,
        "Service Summary",
        json!({ "type": "plain_text_input", "action_id": "completion_notes_input", "multiline": true }),
        false,
    ));
    blocks.push(input(
        SERVICE_DATE_BLOCK,
        "Service Date",
        json!({
            "type": "datepicker",
            "action_id": "service_date_picker",
            "initial_date": today.format(DATE_FORMAT).to_string(),
        }),
        true,
    ));

    json!({
        "type": "modal",
        "callback_id": COMPLETION_CALLBACK,
        "private_metadata": private_metadata,
        "title": plain_text("Complete Service"),
        "submit": plain_text("Submit"),
        "close": plain_text("Cancel"),
        "blocks": blocks,
    })
}

fn appointment_text(record: &ReferralRecord) -> String {
    record
        .appointment_date_time
        .map(|at| at.format(APPOINTMENT_FORMAT).to_string())
        .unwrap_or_else(|| "Not scheduled".to_string())
}

/// Posted to the services channel once a referral is recorded.
pub fn completion_button_message(channel: &str, record: &ReferralRecord) -> OutgoingMessage {
    let summary = format!(
        "*New referral {}*: {} ({})\nAppointment: {}",
        record.id,
        record.client_name,
        record.service_type.label(),
        appointment_text(record)
    );

    OutgoingMessage {
        channel: channel.to_string(),
        text: format!("New referral {} for {}", record.id, record.client_name),
        blocks: vec![
            json!({ "type": "section", "text": mrkdwn(&summary) }),
            json!({
                "type": "actions",
                "elements": [button("✅ Complete Service", OPEN_COMPLETION_MODAL, Some(record.id.as_str()), true)],
            }),
        ],
        ..Default::default()
    }
}

/// Admin-channel notice that invoicing can start; its metadata identifies the referral.
pub fn completion_notification(
    channel: &str,
    record: &ReferralRecord,
    summary: &str,
    completed_by: &str,
    approval_reaction: &str,
) -> OutgoingMessage {
    let completed = record
        .completed_date
        .map(|date| date.format(DATE_FORMAT).to_string())
        .unwrap_or_default();

    OutgoingMessage {
        channel: channel.to_string(),
        text: format!("Service completed for {} ({})", record.client_name, record.id),
        blocks: vec![
            json!({ "type": "header", "text": plain_text("✅ Service Completed") }),
            json!({
                "type": "section",
                "fields": [
                    mrkdwn(&format!("*Referral ID:*\n{}", record.id)),
                    mrkdwn(&format!("*Client Name:*\n{}", record.client_name)),
                    mrkdwn(&format!("*Service Type:*\n{}", record.service_type.label())),
                    mrkdwn(&format!("*Completed By:*\n{}", completed_by)),
                    mrkdwn(&format!("*Service Date:*\n{}", completed)),
                    mrkdwn(&format!("*Referred By:*\n{}", record.broker_name)),
                ],
            }),
            json!({ "type": "section", "text": mrkdwn(&format!("*Summary:*\n{}", summary)) }),
            json!({
                "type": "context",
                "elements": [mrkdwn(&format!(
                    "Invoice sent. React with :{}: once payment is received.",
                    approval_reaction
                ))],
            }),
        ],
        metadata: Some(MessageMetadata {
            event_type: COMPLETION_METADATA_TYPE.to_string(),
            event_payload: json!({ "referral_id": record.id.as_str() }),
        }),
        ..Default::default()
    }
}

/// Threaded reply confirming payment.
pub fn payment_confirmation(channel: &str, thread_ts: &str, record: &ReferralRecord) -> OutgoingMessage {
    OutgoingMessage {
        channel: channel.to_string(),
        text: format!(
            "💰 Payment received for {} ({}). Referral marked as paid.",
            record.client_name, record.id
        ),
        thread_ts: Some(thread_ts.to_string()),
        ..Default::default()
    }
}

/// Full record as message metadata, with unset fields left out.
pub fn record_metadata(record: &ReferralRecord) -> MessageMetadata {
    let mut payload = serde_json::to_value(record).unwrap_or_else(|_| json!({}));
    if let Value::Object(fields) = &mut payload {
        fields.retain(|_, value| !value.is_null());
        fields.insert("referral_id".to_string(), json!(record.id.as_str()));
    }
    MessageMetadata {
        event_type: RECORD_METADATA_TYPE.to_string(),
        event_payload: payload,
    }
}

/// A record rendered for the records channel.
pub fn record_message(channel: &str, record: &ReferralRecord, heading: &str) -> OutgoingMessage {
    let mut blocks = vec![
        json!({ "type": "header", "text": plain_text(&format!("📋 {}", heading)) }),
        json!({
            "type": "section",
            "fields": [
                mrkdwn(&format!("*Referral ID:*\n{}", record.id)),
                mrkdwn(&format!("*Client Name:*\n{}", record.client_name)),
                mrkdwn(&format!("*Service Type:*\n{}", record.service_type.label())),
                mrkdwn(&format!("*Email:*\n{}", record.client_email)),
                mrkdwn(&format!("*Phone:*\n{}", record.client_phone)),
                mrkdwn(&format!("*Referred By:*\n{}", record.broker_name)),
                mrkdwn(&format!("*Date:*\n{}", record.referral_date.format(DATE_FORMAT))),
                mrkdwn(&format!("*Appointment:*\n{}", appointment_text(record))),
            ],
        }),
    ];

    if !record.notes.trim().is_empty() {
        blocks.push(json!({
            "type": "section",
            "text": mrkdwn(&format!("*Notes:*\n{}", record.notes)),
        }));
    }

    let mut status_line = format!(
        "Status: *{}* | Invoice: *{}*",
        record.status, record.invoice_status
    );
    if let Some(completed) = record.completed_date {
        status_line.push_str(&format!(" | Completed: *{}*", completed.format(DATE_FORMAT)));
    }
    blocks.push(json!({ "type": "context", "elements": [mrkdwn(&status_line)] }));

    OutgoingMessage {
        channel: channel.to_string(),
        text: format!("{}: {} ({})", heading, record.client_name, record.id),
        blocks,
        metadata: Some(record_metadata(record)),
        ..Default::default()
    }
}
