pub mod availability;
pub mod recording;
pub mod referral;
pub mod signature;

pub use availability::{
    compute_availability, parse_timezone, AvailabilityError, AvailabilitySlot, BusyInterval,
    SlotSelection, WorkingBlock, WorkingHours,
};
pub use recording::{
    CorrelationId, Direction, EventType, RecordedEvent, Sanitizer, UpstreamService,
    CORRELATION_ID_HEADER,
};
pub use referral::{
    InvoiceStatus, ReferralDraft, ReferralId, ReferralIdError, ReferralRecord, ReferralStatus,
    ReferralUpdate, ServiceType, UnknownVariant,
};
