//! Referral records as rows of the practice workbook.
//!
//! Columns A-L: id, client name, email, phone, service type, notes, broker,
//! referral date, appointment, status, completed date, invoice status.
//! Row 1 holds the headers.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use referral_core::referral::{APPOINTMENT_FORMAT, DATE_FORMAT};
use referral_core::{
    InvoiceStatus, ReferralId, ReferralRecord, ReferralStatus, ReferralUpdate, ServiceType,
};

use super::{ReferralStore, StoreError};
use crate::graph::WorkbookApi;

/// Range read when looking a record up.
pub const LOOKUP_RANGE: &str = "A:L";

const HEADER_ROWS: u32 = 1;
const COLUMN_COUNT: usize = 12;

/// Day zero of the workbook date system (1900 system with the leap-year bug).
fn excel_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

pub struct SpreadsheetStore {
    workbook: Arc<dyn WorkbookApi>,
}

impl SpreadsheetStore {
    pub fn new(workbook: Arc<dyn WorkbookApi>) -> Self {
        Self { workbook }
    }

    /// Locate a record, returning its sheet row number alongside it.
    async fn locate(&self, id: &ReferralId) -> Result<(u32, ReferralRecord), StoreError> {
        let range = self
            .workbook
            .read_used_range(LOOKUP_RANGE)
            .await
            .map_err(|e| StoreError::backend("read referral rows", e))?;

        for (offset, row) in range.values.iter().enumerate() {
            let row_number = range.first_row + offset as u32;
            if row_number <= HEADER_ROWS {
                continue;
            }
            let matches = row
                .first()
                .map(|cell| cell_text(cell).trim() == id.as_str())
                .unwrap_or(false);
            if matches {
                let record = row_to_record(row).map_err(|reason| StoreError::Corrupt {
                    reference: format!("row {}", row_number),
                    reason,
                })?;
                return Ok((row_number, record));
            }
        }

        Err(StoreError::NotFound(id.clone()))
    }
}

#[async_trait]
impl ReferralStore for SpreadsheetStore {
    fn backend_name(&self) -> &'static str {
        "spreadsheet"
    }

    async fn append(&self, record: &ReferralRecord) -> Result<(), StoreError> {
        self.workbook
            .append_rows(vec![record_to_row(record)])
            .await
            .map_err(|e| StoreError::backend("append referral row", e))?;
        info!("Appended referral {} to workbook", record.id);
        Ok(())
    }

    async fn find_by_id(&self, id: &ReferralId) -> Result<ReferralRecord, StoreError> {
        self.locate(id).await.map(|(_, record)| record)
    }

    async fn update_fields(
        &self,
        id: &ReferralId,
        update: &ReferralUpdate,
    ) -> Result<ReferralRecord, StoreError> {
        let (row_number, mut record) = self.locate(id).await?;
        record.apply(update);

        let address = format!("J{}:L{}", row_number, row_number);
        self.workbook
            .patch_range(&address, vec![lifecycle_cells(&record)])
            .await
            .map_err(|e| StoreError::backend("update referral row", e))?;

        info!(
            "Updated referral {} at {} to status {}",
            id, address, record.status
        );
        Ok(record)
    }
}

fn lifecycle_cells(record: &ReferralRecord) -> Vec<String> {
    vec![
        record.status.as_str().to_string(),
        record
            .completed_date
            .map(|date| date.format(DATE_FORMAT).to_string())
            .unwrap_or_default(),
        record.invoice_status.as_str().to_string(),
    ]
}

pub(crate) fn record_to_row(record: &ReferralRecord) -> Vec<String> {
    let mut row = vec![
        record.id.to_string(),
        record.client_name.clone(),
        record.client_email.clone(),
        record.client_phone.clone(),
        record.service_type.as_str().to_string(),
        record.notes.clone(),
        record.broker_name.clone(),
        record.referral_date.format(DATE_FORMAT).to_string(),
        record
            .appointment_date_time
            .map(|at| at.format(APPOINTMENT_FORMAT).to_string())
            .unwrap_or_default(),
    ];
    row.extend(lifecycle_cells(record));
    debug_assert_eq!(row.len(), COLUMN_COUNT);
    row
}

pub(crate) fn row_to_record(row: &[Value]) -> Result<ReferralRecord, String> {
    let cell = |index: usize| row.get(index).unwrap_or(&Value::Null);

    let id = ReferralId::parse(cell_text(cell(0)).trim()).map_err(|e| e.to_string())?;
    let service_type = ServiceType::parse(&cell_text(cell(4))).unwrap_or_else(|e| {
        warn!("Referral {} has {}; treating as other", id, e);
        ServiceType::Other
    });
    let referral_date = cell_date(cell(7)).ok_or_else(|| "missing referral date".to_string())?;
    let status = ReferralStatus::parse(&cell_text(cell(9))).map_err(|e| e.to_string())?;
    let invoice_status = match cell_text(cell(11)).trim() {
        "" => InvoiceStatus::Pending,
        raw => InvoiceStatus::parse(raw).map_err(|e| e.to_string())?,
    };

    Ok(ReferralRecord {
        id,
        client_name: cell_text(cell(1)),
        client_email: cell_text(cell(2)),
        client_phone: cell_text(cell(3)),
        service_type,
        notes: cell_text(cell(5)),
        broker_name: cell_text(cell(6)),
        referral_date,
        appointment_date_time: cell_datetime(cell(8)),
        status,
        completed_date: cell_date(cell(10)),
        invoice_status,
    })
}

/// Text of a cell; the workbook turns numeric-looking input (phone numbers) into numbers.
fn cell_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => match number.as_f64() {
            Some(float) if float.fract() == 0.0 && float.abs() < 1e15 => {
                format!("{}", float as i64)
            }
            _ => number.to_string(),
        },
        Value::Bool(flag) => flag.to_string(),
        _ => String::new(),
    }
}

fn cell_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Number(number) => serial_to_datetime(number.as_f64()?).map(|at| at.date()),
        Value::String(text) => {
            let text = text.trim();
            if text.is_empty() {
                return None;
            }
            NaiveDate::parse_from_str(text, DATE_FORMAT)
                .ok()
                .or_else(|| text.parse::<f64>().ok().and_then(serial_to_datetime).map(|at| at.date()))
        }
        _ => None,
    }
}

fn cell_datetime(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::Number(number) => serial_to_datetime(number.as_f64()?),
        Value::String(text) => {
            let text = text.trim();
            if text.is_empty() {
                return None;
            }
            NaiveDateTime::parse_from_str(text, APPOINTMENT_FORMAT)
                .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M"))
                .ok()
        }
        _ => None,
    }
}

fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial <= 0.0 {
        return None;
    }
    let seconds = (serial * 86_400.0).round() as i64;
    excel_epoch().checked_add_signed(Duration::seconds(seconds))
}
