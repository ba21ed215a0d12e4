use std::collections::{HashMap, HashSet};

use serde::Serialize;
use ulid::Ulid;

use crate::extract::{extractor_for, guest_name};
use crate::ics::parse_feed;
use crate::limits::MAX_FEED_BYTES;
use crate::model::*;

use super::{Engine, EngineError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub added: usize,
    pub updated: usize,
    pub cancelled: usize,
}

/// One reservation as the feed currently states it.
struct FeedBooking {
    stay: DateRange,
    guest_name: String,
    description: String,
}

impl Engine {
    /// Merge an external calendar feed into the unit's bookings, keyed by
    /// confirmation code:
    ///
    /// - code present locally and in the feed with different dates → update
    ///   (guest name is only overwritten when still the synthesized
    ///   placeholder, preserving manual edits)
    /// - code present locally but gone from the feed → cancelled, delete
    /// - code only in the feed → new booking with placeholder price/guests
    ///
    /// The whole pass is planned against a consistent snapshot and committed
    /// under the unit write lock with one WAL flush, all or nothing per
    /// (unit, source). No overlap check is applied: the platform's feed is
    /// authoritative for its own reservations.
    pub async fn reconcile_feed(
        &self,
        feed: &[u8],
        unit_id: Ulid,
        source: &str,
    ) -> Result<ReconcileOutcome, EngineError> {
        if feed.len() > MAX_FEED_BYTES {
            return Err(EngineError::LimitExceeded("feed too large"));
        }
        let extractor = extractor_for(source)
            .ok_or(EngineError::Validation("unknown booking source"))?;
        let events = parse_feed(feed).map_err(|e| EngineError::Parse(e.to_string()))?;

        let reconcile_start = std::time::Instant::now();
        let placeholder = format!("Guest from {source}");

        // Step 1: fold the feed into confirmation_code → details, last event
        // wins on duplicate codes.
        let mut current: HashMap<String, FeedBooking> = HashMap::new();
        for ev in events {
            let lower = ev.summary.to_lowercase();
            // Host-side blackouts are not reservations.
            if lower.contains("blocked") || lower.contains("unavailable") {
                continue;
            }
            // Events without an extractable code cannot be reconciled.
            let Some(code) = extractor.extract(&ev.description) else {
                continue;
            };
            if ev.end <= ev.start {
                continue; // zero-night artifact
            }
            let name =
                guest_name(&ev.summary, &ev.description).unwrap_or_else(|| placeholder.clone());
            current.insert(
                code,
                FeedBooking {
                    stay: DateRange::new(ev.start, ev.end),
                    guest_name: name,
                    description: ev.description,
                },
            );
        }

        let us = self.require_unit(&unit_id)?;
        let mut guard = us.write().await;
        let company_unit = guard.unit.clone();

        // Step 2: diff existing bookings for this (unit, source) against the
        // feed. Bookings without a code were entered manually and are left
        // alone.
        let mut outcome = ReconcileOutcome::default();
        let mut plan: Vec<Event> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for booking in guard.bookings.iter().filter(|b| b.booking_source == source) {
            let Some(code) = booking.confirmation_code.as_deref().filter(|c| !c.is_empty())
            else {
                continue;
            };
            seen.insert(code.to_string());

            match current.get(code) {
                Some(feed_booking) => {
                    if booking.stay != feed_booking.stay {
                        let mut updated = booking.clone();
                        updated.stay = feed_booking.stay;
                        if updated.guest_name.is_empty() || updated.guest_name == placeholder {
                            updated.guest_name = feed_booking.guest_name.clone();
                        }
                        append_note(
                            &mut updated.notes,
                            &format!(
                                "Updated from {source} calendar: {}",
                                feed_booking.description
                            ),
                        );
                        plan.push(Event::BookingUpdated { booking: updated });
                        outcome.updated += 1;
                    }
                }
                None => {
                    // Absence means cancellation, no grace period.
                    plan.push(Event::BookingRemoved {
                        id: booking.id,
                        unit_id,
                    });
                    outcome.cancelled += 1;
                }
            }
        }

        // Step 3: everything in the feed we have never seen becomes a new
        // booking. Price and guest counts are placeholders to be corrected
        // manually. Sorted by code so the WAL is deterministic.
        let mut new_codes: Vec<&String> =
            current.keys().filter(|c| !seen.contains(*c)).collect();
        new_codes.sort();
        for code in new_codes {
            let details = &current[code];
            plan.push(Event::BookingAdded {
                booking: Booking {
                    id: Ulid::new(),
                    unit_id,
                    guest_name: details.guest_name.clone(),
                    contact: format!("Imported from {source}"),
                    stay: details.stay,
                    adults: 0,
                    children: 0,
                    infants: 0,
                    number_of_guests: 2,
                    price: 0.0,
                    booking_source: source.to_string(),
                    payment_status: "Pending".into(),
                    confirmation_code: Some(code.clone()),
                    booking_date: None,
                    notes: format!("Imported from {source} calendar: {}", details.description),
                    created_at: chrono::Utc::now().naive_utc(),
                },
            });
            outcome.added += 1;
        }

        self.persist_batch(&mut guard, &plan).await?;

        metrics::counter!(crate::observability::RECONCILE_TOTAL).increment(1);
        metrics::histogram!(crate::observability::RECONCILE_DURATION_SECONDS)
            .record(reconcile_start.elapsed().as_secs_f64());
        tracing::info!(
            unit = %company_unit.number,
            source,
            added = outcome.added,
            updated = outcome.updated,
            cancelled = outcome.cancelled,
            "reconciled calendar feed"
        );

        Ok(outcome)
    }
}

fn append_note(notes: &mut String, line: &str) {
    if !notes.is_empty() {
        notes.push('\n');
    }
    notes.push_str(line);
    if notes.len() > crate::limits::MAX_NOTES_LEN {
        // Keep the newest entries.
        let cut = notes.len() - crate::limits::MAX_NOTES_LEN;
        let boundary = (cut..notes.len())
            .find(|i| notes.is_char_boundary(*i))
            .unwrap_or(notes.len());
        notes.drain(..boundary);
    }
}
