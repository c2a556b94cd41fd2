//! Referral record types.
//!
//! A referral is created once, from the broker's form submission, and from
//! then on only its lifecycle fields (`status`, `completed_date`,
//! `invoice_status`) change. Everything else is fixed at creation.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Prefix shared by every referral id.
pub const REFERRAL_ID_PREFIX: &str = "REF-";

/// Number of characters after the prefix.
pub const REFERRAL_ID_SUFFIX_LEN: usize = 8;

/// Format used for `appointment_date_time` in stores and calendar requests.
pub const APPOINTMENT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Format used for plain dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferralIdError {
    #[error("referral id must start with REF-")]
    MissingPrefix,
    #[error("referral id must have 8 characters after the prefix")]
    WrongLength,
    #[error("referral id may only contain uppercase letters and digits")]
    InvalidCharacter,
}

/// Newtype for referral id (`REF-` + 8 uppercase alphanumerics).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReferralId(String);

impl ReferralId {
    /// Generate a fresh id from a random v4 UUID.
    pub fn generate() -> Self {
        let simple = Uuid::new_v4().simple().to_string();
        Self(format!(
            "{}{}",
            REFERRAL_ID_PREFIX,
            simple[..REFERRAL_ID_SUFFIX_LEN].to_uppercase()
        ))
    }

    /// Parse and validate an id. Surrounding whitespace is ignored; case is not.
    pub fn parse(raw: &str) -> Result<Self, ReferralIdError> {
        let raw = raw.trim();
        let suffix = raw
            .strip_prefix(REFERRAL_ID_PREFIX)
            .ok_or(ReferralIdError::MissingPrefix)?;
        if suffix.chars().count() != REFERRAL_ID_SUFFIX_LEN {
            return Err(ReferralIdError::WrongLength);
        }
        if !suffix
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        {
            return Err(ReferralIdError::InvalidCharacter);
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReferralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ReferralId {
    type Err = ReferralIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ReferralId {
    type Error = ReferralIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ReferralId> for String {
    fn from(id: ReferralId) -> Self {
        id.0
    }
}

/// Error for any closed-set value that failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value:?}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Services the practice offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    TaxPreparation,
    Bookkeeping,
    Payroll,
    Consulting,
    Other,
}

impl ServiceType {
    pub const ALL: [ServiceType; 5] = [
        Self::TaxPreparation,
        Self::Bookkeeping,
        Self::Payroll,
        Self::Consulting,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaxPreparation => "tax_preparation",
            Self::Bookkeeping => "bookkeeping",
            Self::Payroll => "payroll",
            Self::Consulting => "consulting",
            Self::Other => "other",
        }
    }

    /// Title-cased label shown in messages ("Tax Preparation").
    pub fn label(&self) -> &'static str {
        match self {
            Self::TaxPreparation => "Tax Preparation",
            Self::Bookkeeping => "Bookkeeping",
            Self::Payroll => "Payroll",
            Self::Consulting => "Consulting",
            Self::Other => "Other",
        }
    }

    /// Accepts the wire value or the display label.
    pub fn parse(s: &str) -> Result<Self, UnknownVariant> {
        let normalized = s.trim().to_lowercase().replace(' ', "_");
        Self::ALL
            .into_iter()
            .find(|service| service.as_str() == normalized)
            .ok_or_else(|| UnknownVariant {
                kind: "service type",
                value: s.to_string(),
            })
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a referral.
///
/// Ordered: a referral only ever moves forward through these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferralStatus {
    Pending,
    Scheduled,
    Completed,
    Invoiced,
    Paid,
}

impl ReferralStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Scheduled => "scheduled",
            Self::Completed => "completed",
            Self::Invoiced => "invoiced",
            Self::Paid => "paid",
        }
    }

    pub fn parse(s: &str) -> Result<Self, UnknownVariant> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "scheduled" => Ok(Self::Scheduled),
            "completed" => Ok(Self::Completed),
            "invoiced" => Ok(Self::Invoiced),
            "paid" => Ok(Self::Paid),
            _ => Err(UnknownVariant {
                kind: "referral status",
                value: s.to_string(),
            }),
        }
    }

    /// True once the service has been delivered.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed | Self::Invoiced | Self::Paid)
    }

    /// True while the service can still be marked complete.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Scheduled)
    }

    /// True when a payment approval applies.
    pub fn awaits_payment(&self) -> bool {
        matches!(self, Self::Completed | Self::Invoiced)
    }
}

impl fmt::Display for ReferralStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Billing state, tracked independently of `ReferralStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Pending,
    Sent,
    Paid,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Paid => "paid",
        }
    }

    pub fn parse(s: &str) -> Result<Self, UnknownVariant> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "sent" => Ok(Self::Sent),
            "paid" => Ok(Self::Paid),
            _ => Err(UnknownVariant {
                kind: "invoice status",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The central referral entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralRecord {
    pub id: ReferralId,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: String,
    pub service_type: ServiceType,
    pub notes: String,
    pub broker_name: String,
    pub referral_date: NaiveDate,
    pub appointment_date_time: Option<NaiveDateTime>,
    pub status: ReferralStatus,
    pub completed_date: Option<NaiveDate>,
    pub invoice_status: InvoiceStatus,
}

/// Contact and service details captured by the referral form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferralDraft {
    pub client_name: String,
    pub client_email: String,
    pub client_phone: String,
    pub service_type: ServiceType,
    pub notes: String,
    pub broker_name: String,
}

impl ReferralRecord {
    /// A freshly submitted referral: pending, nothing scheduled, nothing billed.
    pub fn new(id: ReferralId, draft: ReferralDraft, referral_date: NaiveDate) -> Self {
        Self {
            id,
            client_name: draft.client_name,
            client_email: draft.client_email,
            client_phone: draft.client_phone,
            service_type: draft.service_type,
            notes: draft.notes,
            broker_name: draft.broker_name,
            referral_date,
            appointment_date_time: None,
            status: ReferralStatus::Pending,
            completed_date: None,
            invoice_status: InvoiceStatus::Pending,
        }
    }

    /// Apply a partial update to the mutable lifecycle fields.
    pub fn apply(&mut self, update: &ReferralUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(completed_date) = update.completed_date {
            self.completed_date = Some(completed_date);
        }
        if let Some(invoice_status) = update.invoice_status {
            self.invoice_status = invoice_status;
        }
    }

    /// Check the cross-field invariants between status, invoice status and dates.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if self.status == ReferralStatus::Paid && self.invoice_status != InvoiceStatus::Paid {
            return Err(InvariantViolation::PaidWithoutInvoicePaid);
        }
        if self.status.is_completed() && self.completed_date.is_none() {
            return Err(InvariantViolation::CompletedWithoutDate);
        }
        if self.status == ReferralStatus::Pending && self.appointment_date_time.is_some() {
            return Err(InvariantViolation::AppointmentWithoutScheduling);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("status is paid but the invoice is not")]
    PaidWithoutInvoicePaid,
    #[error("status is completed but no completion date is set")]
    CompletedWithoutDate,
    #[error("an appointment is set but the referral was never scheduled")]
    AppointmentWithoutScheduling,
}

/// Partial change to a referral's lifecycle fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralUpdate {
    pub status: Option<ReferralStatus>,
    pub completed_date: Option<NaiveDate>,
    pub invoice_status: Option<InvoiceStatus>,
}

impl ReferralUpdate {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.completed_date.is_none() && self.invoice_status.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> ReferralRecord {
        ReferralRecord::new(
            ReferralId::parse("REF-ABCD1234").unwrap(),
            ReferralDraft {
                client_name: "Dana Client".to_string(),
                client_email: "dana@example.com".to_string(),
                client_phone: "(555) 123-4567".to_string(),
                service_type: ServiceType::TaxPreparation,
                notes: String::new(),
                broker_name: "Bea Broker".to_string(),
            },
            NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
        )
    }

    #[test]
    fn test_generated_ids_are_valid() {
        for _ in 0..100 {
            let id = ReferralId::generate();
            assert_eq!(ReferralId::parse(id.as_str()), Ok(id.clone()));
            assert_eq!(id.as_str().len(), REFERRAL_ID_PREFIX.len() + REFERRAL_ID_SUFFIX_LEN);
        }
    }

    #[test]
    fn test_parse_rejects_malformed_ids() {
        assert_eq!(ReferralId::parse("ABCD1234"), Err(ReferralIdError::MissingPrefix));
        assert_eq!(ReferralId::parse("REF-ABC"), Err(ReferralIdError::WrongLength));
        assert_eq!(ReferralId::parse("REF-ABCD12345"), Err(ReferralIdError::WrongLength));
        assert_eq!(ReferralId::parse("REF-abcd1234"), Err(ReferralIdError::InvalidCharacter));
        assert_eq!(ReferralId::parse("REF-ABCD-234"), Err(ReferralIdError::InvalidCharacter));
    }

    #[test]
    fn test_parse_trims_whitespace() {
        assert_eq!(
            ReferralId::parse("  REF-ABCD1234\n").unwrap().as_str(),
            "REF-ABCD1234"
        );
    }

    #[test]
    fn test_service_type_parse_accepts_wire_and_label() {
        assert_eq!(ServiceType::parse("tax_preparation"), Ok(ServiceType::TaxPreparation));
        assert_eq!(ServiceType::parse("Tax Preparation"), Ok(ServiceType::TaxPreparation));
        assert_eq!(ServiceType::parse("Payroll"), Ok(ServiceType::Payroll));
        assert!(ServiceType::parse("astrology").is_err());
    }

    #[test]
    fn test_status_ordering_is_lifecycle_order() {
        assert!(ReferralStatus::Pending < ReferralStatus::Scheduled);
        assert!(ReferralStatus::Scheduled < ReferralStatus::Completed);
        assert!(ReferralStatus::Completed < ReferralStatus::Invoiced);
        assert!(ReferralStatus::Invoiced < ReferralStatus::Paid);
    }

    #[test]
    fn test_new_record_is_pending_and_consistent() {
        let record = sample_record();
        assert_eq!(record.status, ReferralStatus::Pending);
        assert_eq!(record.invoice_status, InvoiceStatus::Pending);
        assert!(record.appointment_date_time.is_none());
        assert!(record.check_invariants().is_ok());
    }

    #[test]
    fn test_apply_only_touches_given_fields() {
        let mut record = sample_record();
        record.apply(&ReferralUpdate {
            invoice_status: Some(InvoiceStatus::Sent),
            ..Default::default()
        });
        assert_eq!(record.status, ReferralStatus::Pending);
        assert_eq!(record.invoice_status, InvoiceStatus::Sent);
        assert_eq!(record.client_name, "Dana Client");
    }

    #[test]
    fn test_invariants_detect_inconsistent_records() {
        let mut record = sample_record();
        record.status = ReferralStatus::Paid;
        record.completed_date = NaiveDate::from_ymd_opt(2024, 6, 5);
        assert_eq!(
            record.check_invariants(),
            Err(InvariantViolation::PaidWithoutInvoicePaid)
        );

        let mut record = sample_record();
        record.status = ReferralStatus::Completed;
        assert_eq!(
            record.check_invariants(),
            Err(InvariantViolation::CompletedWithoutDate)
        );
    }

    #[test]
    fn test_record_json_uses_wire_values() {
        let json = serde_json::to_value(sample_record()).unwrap();
        assert_eq!(json["id"], "REF-ABCD1234");
        assert_eq!(json["service_type"], "tax_preparation");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["referral_date"], "2024-06-03");
        assert!(json["appointment_date_time"].is_null());
    }

    #[test]
    fn test_record_json_rejects_malformed_id() {
        let mut json = serde_json::to_value(sample_record()).unwrap();
        json["id"] = serde_json::Value::String("REF-1".to_string());
        assert!(serde_json::from_value::<ReferralRecord>(json).is_err());
    }
}
