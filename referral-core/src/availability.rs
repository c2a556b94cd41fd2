//! Bookable appointment slots derived from calendar busy blocks.
//!
//! Everything here is computed in the practice's local timezone. Busy
//! intervals arrive as UTC instants from the calendar API and are converted
//! before any comparison; working-hour blocks are local wall-clock times that
//! are resolved to instants per day, so DST changes are handled per date.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::Serialize;
use thiserror::Error;

/// Length of every bookable block.
pub const SLOT_MINUTES: i64 = 60;

/// Separator between date and start time in a slot selection value.
pub const SELECTION_SEPARATOR: char = '|';

const TIME_FORMAT: &str = "%H:%M";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AvailabilityError {
    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),
    #[error("invalid working-hour block {0:?}: expected HH:MM-HH:MM")]
    MalformedBlock(String),
    #[error("working-hour block {0:?} is not exactly one hour")]
    BlockNotOneHour(String),
    #[error("working-hour blocks must be in order and must not overlap")]
    BlocksOutOfOrder,
    #[error("no working-hour blocks configured")]
    NoBlocks,
    #[error("invalid slot selection {0:?}: expected YYYY-MM-DD|HH:MM")]
    MalformedSelection(String),
}

/// Resolve an IANA timezone name.
pub fn parse_timezone(name: &str) -> Result<Tz, AvailabilityError> {
    Tz::from_str(name.trim()).map_err(|_| AvailabilityError::UnknownTimezone(name.to_string()))
}

/// One bookable hour within the working day (local wall-clock time).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkingBlock {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl WorkingBlock {
    fn at(hour: u32) -> Self {
        Self {
            start: NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN),
            end: NaiveTime::from_hms_opt(hour + 1, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }

    fn parse(raw: &str) -> Result<Self, AvailabilityError> {
        let malformed = || AvailabilityError::MalformedBlock(raw.to_string());
        let (start, end) = raw.trim().split_once('-').ok_or_else(malformed)?;
        let start = NaiveTime::parse_from_str(start.trim(), TIME_FORMAT).map_err(|_| malformed())?;
        let end = NaiveTime::parse_from_str(end.trim(), TIME_FORMAT).map_err(|_| malformed())?;
        if end - start != Duration::minutes(SLOT_MINUTES) {
            return Err(AvailabilityError::BlockNotOneHour(raw.to_string()));
        }
        Ok(Self { start, end })
    }
}

/// Ordered list of one-hour blocks making up a working day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingHours {
    blocks: Vec<WorkingBlock>,
}

impl WorkingHours {
    /// Build from blocks, rejecting empty, unordered or overlapping lists.
    pub fn new(blocks: Vec<WorkingBlock>) -> Result<Self, AvailabilityError> {
        if blocks.is_empty() {
            return Err(AvailabilityError::NoBlocks);
        }
        if blocks.windows(2).any(|pair| pair[1].start < pair[0].end) {
            return Err(AvailabilityError::BlocksOutOfOrder);
        }
        Ok(Self { blocks })
    }

    /// Parse `"09:00-10:00,10:00-11:00,..."`.
    pub fn parse(raw: &str) -> Result<Self, AvailabilityError> {
        let blocks = raw
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(WorkingBlock::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(blocks)
    }

    pub fn blocks(&self) -> &[WorkingBlock] {
        &self.blocks
    }
}

impl Default for WorkingHours {
    /// 09:00-12:00 and 13:00-15:00, with the lunch hour kept free.
    fn default() -> Self {
        Self {
            blocks: [9, 10, 11, 13, 14].into_iter().map(WorkingBlock::at).collect(),
        }
    }
}

/// A period during which the calendar owner is already booked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BusyInterval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Strict intersection; intervals that only touch do not overlap.
    fn overlaps(&self, block_start: &DateTime<Tz>, block_end: &DateTime<Tz>, tz: &Tz) -> bool {
        let busy_start = self.start.with_timezone(tz);
        let busy_end = self.end.with_timezone(tz);
        busy_start < *block_end && busy_end > *block_start
    }
}

/// A free slot offered to the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilitySlot {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub display_label: String,
}

impl AvailabilitySlot {
    /// Value used as the dropdown option; parsed back by `SlotSelection::parse`.
    pub fn value(&self) -> String {
        format!(
            "{}{}{}",
            self.date.format("%Y-%m-%d"),
            SELECTION_SEPARATOR,
            self.start_time.format(TIME_FORMAT)
        )
    }
}

/// A slot chosen in the referral form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotSelection {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
}

impl SlotSelection {
    pub fn parse(value: &str) -> Result<Self, AvailabilityError> {
        let malformed = || AvailabilityError::MalformedSelection(value.to_string());
        let (date, time) = value.trim().split_once(SELECTION_SEPARATOR).ok_or_else(malformed)?;
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| malformed())?;
        let start_time = NaiveTime::parse_from_str(time, TIME_FORMAT).map_err(|_| malformed())?;
        Ok(Self { date, start_time })
    }

    /// Local start of the appointment.
    pub fn start(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }

    /// Local end of the appointment (one slot later).
    pub fn end(&self) -> NaiveDateTime {
        self.start() + Duration::minutes(SLOT_MINUTES)
    }
}

impl fmt::Display for SlotSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.date.format("%Y-%m-%d"),
            SELECTION_SEPARATOR,
            self.start_time.format(TIME_FORMAT)
        )
    }
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Resolve a local wall-clock time to an instant. Times inside a DST gap
/// do not exist and yield `None`; ambiguous times take the earlier instant.
fn localize(tz: &Tz, local: NaiveDateTime) -> Option<DateTime<Tz>> {
    tz.from_local_datetime(&local).earliest()
}

/// Compute free slots for `window_days` days starting at `start_date`.
///
/// Weekends are skipped, blocks overlapping any busy interval are dropped,
/// and on the current day (the date of `now` in `tz`) blocks that have
/// already started are dropped. Output is ordered by date, then start time.
pub fn compute_availability(
    busy: &[BusyInterval],
    start_date: NaiveDate,
    window_days: u32,
    working_hours: &WorkingHours,
    tz: Tz,
    now: DateTime<Utc>,
) -> Vec<AvailabilitySlot> {
    let now_local = now.with_timezone(&tz);
    let today = now_local.date_naive();
    let mut slots = Vec::new();

    for date in start_date.iter_days().take(window_days as usize) {
        if is_weekend(date) {
            continue;
        }

        let day_label = date.format("%a, %b %-d").to_string();

        for block in working_hours.blocks() {
            let (block_start, block_end) = match (
                localize(&tz, date.and_time(block.start)),
                localize(&tz, date.and_time(block.end)),
            ) {
                (Some(start), Some(end)) => (start, end),
                _ => continue,
            };

            if date == today && block_start <= now_local {
                continue;
            }

            if busy
                .iter()
                .any(|interval| interval.overlaps(&block_start, &block_end, &tz))
            {
                continue;
            }

            slots.push(AvailabilitySlot {
                date,
                start_time: block.start,
                end_time: block.end,
                display_label: format!(
                    "{} {} - {}",
                    day_label,
                    block.start.format(TIME_FORMAT),
                    block.end.format(TIME_FORMAT)
                ),
            });
        }
    }

    slots
}
