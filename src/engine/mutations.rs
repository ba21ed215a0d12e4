use std::sync::Arc;

use chrono::NaiveDateTime;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::overlap::conflicting;
use super::{Engine, EngineError};

fn validate_booking(booking: &Booking) -> Result<(), EngineError> {
    if booking.guest_name.trim().is_empty() {
        return Err(EngineError::Validation("guest name is required"));
    }
    if booking.guest_name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("guest name too long"));
    }
    if booking.notes.len() > MAX_NOTES_LEN {
        return Err(EngineError::LimitExceeded("notes too long"));
    }
    if booking.stay.check_out <= booking.stay.check_in {
        return Err(EngineError::Validation("check-out must be after check-in"));
    }
    if booking.stay.nights() > MAX_STAY_NIGHTS {
        return Err(EngineError::LimitExceeded("stay too long"));
    }
    if !booking.price.is_finite() || booking.price < 0.0 {
        return Err(EngineError::Validation("price must be a non-negative number"));
    }
    Ok(())
}

impl Engine {
    // ── Units ────────────────────────────────────────────────

    pub async fn create_unit(&self, unit: Unit) -> Result<(), EngineError> {
        if self.units.len() >= MAX_UNITS_PER_COMPANY {
            return Err(EngineError::LimitExceeded("too many units"));
        }
        if unit.number.trim().is_empty() {
            return Err(EngineError::Validation("unit number is required"));
        }
        if unit.number.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("unit number too long"));
        }
        if self.units.contains_key(&unit.id) {
            return Err(EngineError::AlreadyExists(unit.id));
        }

        let event = Event::UnitCreated { unit: unit.clone() };
        self.wal_append(&event).await?;
        self.units
            .insert(unit.id, Arc::new(RwLock::new(UnitState::new(unit))));
        Ok(())
    }

    pub async fn update_unit(&self, unit: Unit) -> Result<(), EngineError> {
        if unit.number.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("unit number too long"));
        }
        let us = self.require_unit(&unit.id)?;
        let mut guard = us.write().await;
        let event = Event::UnitUpdated { unit };
        self.persist_and_apply(&mut guard, &event).await
    }

    pub async fn delete_unit(&self, id: Ulid) -> Result<(), EngineError> {
        let us = self.require_unit(&id)?;
        let guard = us.read().await;
        // Drop the unit's entities from the reverse index first.
        for booking in &guard.bookings {
            self.entity_to_unit.remove(&booking.id);
        }
        for source in &guard.sources {
            self.entity_to_unit.remove(&source.id);
        }
        for issue in &guard.issues {
            self.entity_to_unit.remove(&issue.id);
        }
        drop(guard);

        let event = Event::UnitDeleted { id };
        self.wal_append(&event).await?;
        self.units.remove(&id);
        Ok(())
    }

    // ── Bookings ─────────────────────────────────────────────

    /// Manual booking entry. The overlap check runs under the unit write
    /// lock and must pass before the write lands.
    pub async fn add_booking(&self, booking: Booking) -> Result<(), EngineError> {
        validate_booking(&booking)?;
        let us = self.require_unit(&booking.unit_id)?;
        let mut guard = us.write().await;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_UNIT {
            return Err(EngineError::LimitExceeded("too many bookings on unit"));
        }

        let blockers = conflicting(&guard, &booking.stay, None);
        if !blockers.is_empty() {
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            return Err(EngineError::Conflict(
                blockers.iter().map(|b| ConflictingBooking::from_booking(b)).collect(),
            ));
        }

        let event = Event::BookingAdded { booking };
        self.persist_and_apply(&mut guard, &event).await
    }

    /// Manual booking edit. Revalidates the (possibly changed) date range,
    /// excluding the booking itself from the overlap check. A booking cannot
    /// move between units; delete and re-add instead.
    pub async fn update_booking(&self, booking: Booking) -> Result<(), EngineError> {
        validate_booking(&booking)?;
        let (unit_id, mut guard) = self.resolve_entity_write(&booking.id).await?;
        if unit_id != booking.unit_id {
            return Err(EngineError::Validation("booking cannot change unit"));
        }

        let blockers = conflicting(&guard, &booking.stay, Some(booking.id));
        if !blockers.is_empty() {
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            return Err(EngineError::Conflict(
                blockers.iter().map(|b| ConflictingBooking::from_booking(b)).collect(),
            ));
        }

        let event = Event::BookingUpdated { booking };
        self.persist_and_apply(&mut guard, &event).await
    }

    pub async fn remove_booking(&self, id: Ulid) -> Result<Ulid, EngineError> {
        let (unit_id, mut guard) = self.resolve_entity_write(&id).await?;
        let event = Event::BookingRemoved { id, unit_id };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(unit_id)
    }

    // ── Calendar sources ─────────────────────────────────────

    /// Create or update the feed record for (unit, source_name). Idempotent:
    /// a second upsert with the same name updates the URL in place.
    pub async fn upsert_calendar_source(
        &self,
        unit_id: Ulid,
        source_name: &str,
        url: Option<String>,
    ) -> Result<CalendarSource, EngineError> {
        if source_name.trim().is_empty() {
            return Err(EngineError::Validation("source name is required"));
        }
        if source_name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("source name too long"));
        }
        let us = self.require_unit(&unit_id)?;
        let mut guard = us.write().await;

        let source = match guard.source_by_name(source_name) {
            Some(existing) => CalendarSource {
                url: url.or_else(|| existing.url.clone()),
                ..existing.clone()
            },
            None => {
                if guard.sources.len() >= MAX_SOURCES_PER_UNIT {
                    return Err(EngineError::LimitExceeded("too many sources on unit"));
                }
                CalendarSource {
                    id: Ulid::new(),
                    unit_id,
                    source_name: source_name.to_string(),
                    url,
                    last_synced: None,
                }
            }
        };

        let event = Event::SourceUpserted { source: source.clone() };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(source)
    }

    /// Stamp a source's last successful sync time.
    pub async fn mark_source_synced(
        &self,
        id: Ulid,
        at: NaiveDateTime,
    ) -> Result<(), EngineError> {
        let (unit_id, mut guard) = self.resolve_entity_write(&id).await?;
        let event = Event::SourceSynced { id, unit_id, at };
        self.persist_and_apply(&mut guard, &event).await
    }

    pub async fn delete_calendar_source(&self, id: Ulid) -> Result<(), EngineError> {
        let (unit_id, mut guard) = self.resolve_entity_write(&id).await?;
        let event = Event::SourceDeleted { id, unit_id };
        self.persist_and_apply(&mut guard, &event).await
    }

    // ── Issues ───────────────────────────────────────────────

    pub async fn add_issue(&self, issue: Issue) -> Result<(), EngineError> {
        if issue.description.len() > MAX_NOTES_LEN {
            return Err(EngineError::LimitExceeded("description too long"));
        }
        if let Some(cost) = issue.cost
            && (!cost.is_finite() || cost < 0.0)
        {
            return Err(EngineError::Validation("cost must be a non-negative number"));
        }
        let us = self.require_unit(&issue.unit_id)?;
        let mut guard = us.write().await;
        if guard.issues.len() >= MAX_ISSUES_PER_UNIT {
            return Err(EngineError::LimitExceeded("too many issues on unit"));
        }

        let event = Event::IssueAdded { issue };
        self.persist_and_apply(&mut guard, &event).await
    }

    pub async fn remove_issue(&self, id: Ulid) -> Result<(), EngineError> {
        let (unit_id, mut guard) = self.resolve_entity_write(&id).await?;
        let event = Event::IssueRemoved { id, unit_id };
        self.persist_and_apply(&mut guard, &event).await
    }
}
