//! Recovering referral records from channel messages.
//!
//! Locators are tried in priority order for each message. Structured
//! metadata yields an exact record; the text pattern fallback reads the
//! labelled fields of the rendered message and is best effort. Fields the
//! text does not carry are listed in `LocatedRecord::missing`.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use referral_core::referral::{APPOINTMENT_FORMAT, DATE_FORMAT};
use referral_core::{
    InvoiceStatus, ReferralId, ReferralRecord, ReferralStatus, ServiceType,
};

use crate::slack::HistoryMessage;

/// Metadata event type of record messages.
pub const RECORD_METADATA_TYPE: &str = "referral_record";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fidelity {
    Exact,
    BestEffort,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocatedRecord {
    pub record: ReferralRecord,
    pub fidelity: Fidelity,
    /// Fields that were absent or unreadable and hold placeholder values in
    /// `record`. Always empty for exact hits.
    pub missing: Vec<&'static str>,
}

impl LocatedRecord {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

pub trait RecordLocator: Send + Sync {
    fn name(&self) -> &'static str;

    fn locate(&self, message: &HistoryMessage, id: &ReferralId) -> Option<LocatedRecord>;
}

/// Reads the full record from `referral_record` message metadata.
pub struct MetadataLocator;

impl RecordLocator for MetadataLocator {
    fn name(&self) -> &'static str {
        "metadata"
    }

    fn locate(&self, message: &HistoryMessage, id: &ReferralId) -> Option<LocatedRecord> {
        let payload = message.metadata_of_type(RECORD_METADATA_TYPE)?;
        let payload_id = payload
            .get("referral_id")
            .or_else(|| payload.get("id"))
            .and_then(Value::as_str)?;
        if payload_id != id.as_str() {
            return None;
        }

        match serde_json::from_value::<ReferralRecord>(payload.clone()) {
            Ok(record) => Some(LocatedRecord {
                record,
                fidelity: Fidelity::Exact,
                missing: Vec::new(),
            }),
            Err(e) => {
                debug!("Metadata for {} on message {} is partial: {}", id, message.ts, e);
                None
            }
        }
    }
}

/// Extracts a record from the rendered message text.
pub struct TextPatternLocator {
    id_pattern: Regex,
    status_pattern: Regex,
    invoice_pattern: Regex,
    completed_pattern: Regex,
    client_name: Regex,
    service_type: Regex,
    email: Regex,
    phone: Regex,
    referred_by: Regex,
    date: Regex,
    appointment: Regex,
    notes: Regex,
}

/// `*Label:*` followed by its value on the same or the next line. An empty
/// value matches the label with no capture.
fn label_pattern(label: &str) -> Regex {
    Regex::new(&format!(
        r"\*{}:\*[ \t]*(?:\n[ \t]*)?([^*\n][^\n]*)?",
        regex::escape(label)
    ))
    .unwrap()
}

impl TextPatternLocator {
    pub fn new() -> Self {
        Self {
            id_pattern: Regex::new(r"\bREF-[A-Z0-9]{8}\b").unwrap(),
            status_pattern: Regex::new(r"Status:\s*\*([a-z_]+)\*").unwrap(),
            invoice_pattern: Regex::new(r"Invoice:\s*\*([a-z_]+)\*").unwrap(),
            completed_pattern: Regex::new(r"Completed:\s*\*(\d{4}-\d{2}-\d{2})\*").unwrap(),
            client_name: label_pattern("Client Name"),
            service_type: label_pattern("Service Type"),
            email: label_pattern("Email"),
            phone: label_pattern("Phone"),
            referred_by: label_pattern("Referred By"),
            date: label_pattern("Date"),
            appointment: label_pattern("Appointment"),
            notes: label_pattern("Notes"),
        }
    }

    /// `None` when the label is absent, `Some("")` when it has no value.
    fn labelled(pattern: &Regex, text: &str) -> Option<String> {
        pattern.captures(text).map(|captures| {
            captures
                .get(1)
                .map(|value| value.as_str().trim().to_string())
                .unwrap_or_default()
        })
    }

    fn captured<'t>(pattern: &Regex, text: &'t str) -> Option<&'t str> {
        pattern
            .captures(text)
            .and_then(|captures| captures.get(1))
            .map(|value| value.as_str())
    }
}

impl Default for TextPatternLocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Calendar date a message was posted, from its `ts` (epoch seconds).
fn posted_on(ts: &str) -> Option<NaiveDate> {
    let seconds = ts.split('.').next()?.parse::<i64>().ok()?;
    DateTime::from_timestamp(seconds, 0).map(|at| at.date_naive())
}

impl RecordLocator for TextPatternLocator {
    fn name(&self) -> &'static str {
        "text_pattern"
    }

    fn locate(&self, message: &HistoryMessage, id: &ReferralId) -> Option<LocatedRecord> {
        let text = message.searchable_text();
        let mentions_id = self
            .id_pattern
            .find_iter(&text)
            .any(|token| token.as_str() == id.as_str());
        if !mentions_id {
            return None;
        }

        let client_name = Self::labelled(&self.client_name, &text).filter(|name| !name.is_empty())?;
        let mut missing = Vec::new();

        let status = Self::captured(&self.status_pattern, &text)
            .and_then(|raw| ReferralStatus::parse(raw).ok());
        let invoice_status = Self::captured(&self.invoice_pattern, &text)
            .and_then(|raw| InvoiceStatus::parse(raw).ok());
        let service_type = Self::labelled(&self.service_type, &text)
            .and_then(|raw| ServiceType::parse(&raw).ok());
        let client_email = Self::labelled(&self.email, &text);
        let client_phone = Self::labelled(&self.phone, &text);
        let broker_name = Self::labelled(&self.referred_by, &text);
        let referral_date = Self::labelled(&self.date, &text)
            .and_then(|raw| NaiveDate::parse_from_str(&raw, DATE_FORMAT).ok());

        if status.is_none() {
            missing.push("status");
        }
        if invoice_status.is_none() {
            missing.push("invoice_status");
        }
        if service_type.is_none() {
            missing.push("service_type");
        }
        if client_email.is_none() {
            missing.push("client_email");
        }
        if client_phone.is_none() {
            missing.push("client_phone");
        }
        if broker_name.is_none() {
            missing.push("broker_name");
        }
        if referral_date.is_none() {
            missing.push("referral_date");
        }

        let status = status.unwrap_or(ReferralStatus::Pending);
        let record = ReferralRecord {
            id: id.clone(),
            client_name,
            client_email: client_email.unwrap_or_default(),
            client_phone: client_phone.unwrap_or_default(),
            service_type: service_type.unwrap_or(ServiceType::Other),
            notes: Self::labelled(&self.notes, &text).unwrap_or_default(),
            broker_name: broker_name.unwrap_or_default(),
            // Without a readable date the posting date is the closest stand-in
            referral_date: match referral_date {
                Some(date) => date,
                None => posted_on(&message.ts)?,
            },
            appointment_date_time: Self::labelled(&self.appointment, &text)
                .and_then(|raw| NaiveDateTime::parse_from_str(&raw, APPOINTMENT_FORMAT).ok()),
            status,
            completed_date: Self::captured(&self.completed_pattern, &text)
                .and_then(|raw| NaiveDate::parse_from_str(raw, DATE_FORMAT).ok()),
            invoice_status: invoice_status.unwrap_or(if status == ReferralStatus::Paid {
                InvoiceStatus::Paid
            } else {
                InvoiceStatus::Pending
            }),
        };

        Some(LocatedRecord {
            record,
            fidelity: Fidelity::BestEffort,
            missing,
        })
    }
}

/// Metadata first, then text.
pub fn default_locators() -> Vec<Box<dyn RecordLocator>> {
    vec![Box::new(MetadataLocator), Box::new(TextPatternLocator::new())]
}
