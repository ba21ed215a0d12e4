//! Bulk booking import from a platform CSV export. Update-only: records are
//! matched to existing bookings by confirmation code and unknown codes are
//! skipped, never created. The calendar feed is the source of truth for
//! which reservations exist.

use chrono::NaiveDate;
use serde::Deserialize;

use crate::limits::MAX_IMPORT_RECORDS;
use crate::model::Event;

use super::{Engine, EngineError};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingImport {
    pub confirmation_code: String,
    #[serde(default)]
    pub guest_name: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub check_in_date: Option<String>,
    #[serde(default)]
    pub check_out_date: Option<String>,
    #[serde(default)]
    pub booking_date: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub adults: Option<u32>,
    #[serde(default)]
    pub children: Option<u32>,
    #[serde(default)]
    pub infants: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ImportOutcome {
    pub updated: usize,
    /// Records whose confirmation code matched no existing booking.
    pub skipped: usize,
    pub errors: usize,
}

impl Engine {
    /// Apply a batch of exported records. Per-record failures are counted
    /// and skipped; the batch never aborts part-way.
    pub async fn import_bookings(
        &self,
        records: Vec<BookingImport>,
    ) -> Result<ImportOutcome, EngineError> {
        if records.len() > MAX_IMPORT_RECORDS {
            return Err(EngineError::LimitExceeded("too many import records"));
        }

        let mut outcome = ImportOutcome::default();
        for record in records {
            let code = record.confirmation_code.trim();
            if code.is_empty() {
                outcome.errors += 1;
                continue;
            }
            let Some(existing) = self.find_by_confirmation_code(code).await else {
                outcome.skipped += 1;
                continue;
            };

            match self.apply_import(existing.id, &record).await {
                Ok(()) => outcome.updated += 1,
                Err(e) => {
                    tracing::warn!(code, error = %e, "import record failed");
                    outcome.errors += 1;
                }
            }
        }
        Ok(outcome)
    }

    async fn apply_import(
        &self,
        booking_id: ulid::Ulid,
        record: &BookingImport,
    ) -> Result<(), EngineError> {
        let (_, mut guard) = self.resolve_entity_write(&booking_id).await?;
        let mut booking = guard
            .booking(booking_id)
            .cloned()
            .ok_or(EngineError::NotFound(booking_id))?;

        if let Some(name) = record.guest_name.as_deref().filter(|s| !s.is_empty()) {
            booking.guest_name = name.to_string();
        }
        if let Some(contact) = record.contact.as_deref().filter(|s| !s.is_empty()) {
            booking.contact = contact.to_string();
        }

        // Dates are taken only as a pair, and only when both parse and make
        // a valid half-open range. Otherwise the existing stay is kept.
        let check_in = record.check_in_date.as_deref().and_then(parse_date);
        let check_out = record.check_out_date.as_deref().and_then(parse_date);
        if let (Some(check_in), Some(check_out)) = (check_in, check_out)
            && check_in < check_out
        {
            booking.stay = crate::model::DateRange::new(check_in, check_out);
        }

        if let Some(date) = record.booking_date.as_deref().and_then(parse_date) {
            booking.booking_date = Some(date);
        }
        if let Some(price) = record.price.as_deref().and_then(parse_price) {
            booking.price = price;
        }
        if let Some(status) = record.payment_status.as_deref().filter(|s| !s.is_empty()) {
            booking.payment_status = status.to_string();
        }

        if let Some(adults) = record.adults.filter(|n| *n > 0) {
            booking.adults = adults;
        }
        if let Some(children) = record.children.filter(|n| *n > 0) {
            booking.children = children;
        }
        if let Some(infants) = record.infants.filter(|n| *n > 0) {
            booking.infants = infants;
        }
        booking.number_of_guests = booking.adults + booking.children + booking.infants;

        let event = Event::BookingUpdated { booking };
        self.persist_and_apply(&mut guard, &event).await
    }
}

const DATE_FORMATS: &[&str] = &[
    "%b %d, %Y", // Jan 3, 2025
    "%B %d, %Y", // January 3, 2025
    "%Y-%m-%d",  // 2025-01-03
    "%d/%m/%Y",  // 03/01/2025
    "%m/%d/%Y",  // 01/03/2025
];

/// Try the date formats platforms put in their exports. chrono accepts
/// unpadded day numbers, so "Jan 3, 2025" parses under `%b %d, %Y`.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Parse a price string, stripping currency symbols and thousands
/// separators ("RM1,250.00" → 1250.0). Non-positive values are rejected.
pub fn parse_price(s: &str) -> Option<f64> {
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    let value: f64 = cleaned.parse().ok()?;
    (value > 0.0).then_some(value)
}
